//! # itrack-server
//!
//! JSON-over-HTTP surface for the approval pipeline. Every route resolves
//! the caller through the identity context, then hands the request to the
//! internship service.

#![deny(unsafe_code)]

pub mod extract;
pub mod handlers;
pub mod health;
pub mod response;
pub mod server;
pub mod state;

pub use server::{shutdown_signal, ItrackServer};
pub use state::AppState;
