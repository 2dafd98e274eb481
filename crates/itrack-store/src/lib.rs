//! # itrack-store
//!
//! SQLite persistence behind a single `parking_lot::Mutex<Connection>`.
//!
//! - [`RecordRepo`](records::RecordRepo): internship records and their
//!   append-only review trail, mutated only through an optimistic
//!   version-checked `commit`
//! - [`SqliteArtifactStore`](artifacts::SqliteArtifactStore): document blobs
//! - [`ProfileRepo`](profiles::ProfileRepo): student and staff directory

#![deny(unsafe_code)]

pub mod artifacts;
pub mod database;
pub mod error;
pub mod profiles;
pub mod records;
pub mod row_helpers;
pub mod schema;

pub use artifacts::SqliteArtifactStore;
pub use database::Database;
pub use error::StoreError;
pub use profiles::ProfileRepo;
pub use records::RecordRepo;
