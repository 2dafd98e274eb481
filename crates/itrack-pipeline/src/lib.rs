//! # itrack-pipeline
//!
//! The approval state machine ([`ApprovalPipeline`]) and the
//! [`InternshipService`] that runs every request through
//! authorize → transition → commit.

#![deny(unsafe_code)]

pub mod service;
pub mod transition;
pub mod upload;

pub use service::{AmendRequest, ApprovalStatus, ArtifactKind, InternshipService, SubmitRequest};
pub use transition::{ApprovalPipeline, Submission};
pub use upload::{Upload, UploadPolicy};
