//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Multi-row mutations run inside one immediate transaction.
//! - Repository APIs return semantic errors (`TopicNotFound`) in addition to
//!   DB transport errors.

pub mod notification_repo;
pub mod topic_repo;
pub mod user_repo;
