//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Compute notification fan-out from pre-mutation snapshots.
//!
//! # Invariants
//! - Snapshot reads happen before any write in every mutating operation.

pub mod notify;
pub mod topic_service;
