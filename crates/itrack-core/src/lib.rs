//! # itrack-core
//!
//! Shared data model for the internship approval service.
//!
//! - Branded IDs ([`RecordId`](ids::RecordId), [`PrincipalId`](ids::PrincipalId), ...)
//! - Roles, sites and the authenticated [`Principal`]
//! - [`InternshipRecord`] with its status, phase and review trail
//! - [`ApprovalChain`] and [`ScopeFilter`]
//! - The [`PipelineError`] taxonomy
//! - Collaborator traits in [`ports`]

#![deny(unsafe_code)]

pub mod chain;
pub mod errors;
pub mod ids;
pub mod ports;
pub mod principal;
pub mod record;
pub mod roles;
pub mod scope;

pub use chain::ApprovalChain;
pub use errors::{ConflictKind, PipelineError};
pub use principal::Principal;
pub use record::{Decision, InternshipDetails, InternshipRecord, Phase, RecordStatus, ReviewEntry};
pub use roles::{Role, Site};
pub use scope::ScopeFilter;
