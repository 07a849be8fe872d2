//! Shared domain types for the shadowforge workspace.
//!
//! This crate contains:
//! - Resource identifiers
//! - The error taxonomy shared across every crate
//! - The persisted data model (projects, tags, versions, deploys, ...)

pub mod error;
pub mod id;
pub mod model;

pub use error::{Error, Result, SourcePos};
pub use id::ResourceId;
