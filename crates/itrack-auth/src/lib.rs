//! # itrack-auth
//!
//! The two layers in front of the approval pipeline:
//!
//! - [`IdentityContext`]: credential → [`Principal`](itrack_core::Principal),
//!   failing closed on any verification fault or timeout
//! - [`RoleAuthority`]: pure allow/deny policy and list scope filters

#![deny(unsafe_code)]

pub mod authority;
pub mod credential;
pub mod errors;
pub mod identity;

pub use authority::{Action, RoleAuthority, Target, Verdict};
pub use credential::JwtCredentialIssuer;
pub use errors::AuthError;
pub use identity::IdentityContext;
