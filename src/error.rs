//! Caller-facing error types.
//!
//! Internal plumbing (store access, serialization) propagates
//! `anyhow::Error`; these `thiserror` enums exist at the seams callers are
//! expected to match on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("task title must not be empty")]
    EmptyTitle,
}

#[derive(Debug, Error)]
pub enum SyncEngineError {
    #[error("a sync cycle is already running")]
    CycleInProgress,
}
