//! Errors surfaced by the filter engine.

use thiserror::Error;

use crate::options::FilterOptionsBuilderError;

/// Errors returned by the public operations of the engine
#[derive(Debug, Error)]
pub enum FilterError {
    /// The group was never registered
    #[error("unknown group `{0}`")]
    UnknownGroup(String),

    /// No list container is bound to the group
    #[error("no list container bound to group `{0}`")]
    UnknownContainer(String),

    /// Pagination was requested but no page source is configured
    #[error("no page source configured")]
    NoPageSource,

    /// The scorer panicked while running a task; the worker itself survives
    #[error("scoring task panicked: {0}")]
    WorkerPanicked(String),

    /// The worker pool has been shut down
    #[error("worker pool is shut down")]
    PoolClosed,

    /// A worker thread could not be started
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// Invalid options
    #[error(transparent)]
    Options(#[from] FilterOptionsBuilderError),
}
