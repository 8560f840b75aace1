//! Error type for the consolidation engine
//!
//! Almost everything that can go wrong during consolidation is recovered
//! locally (new bucket, single-fragment fallback, skipped fragment) and
//! logged. The one exception is losing merge workers mid-build: the
//! partially merged buffers are unusable, so the whole consolidation is
//! surfaced as failed and the caller falls back to rendering the original
//! fragment list.

/// Fatal consolidation failure
#[derive(Debug, thiserror::Error)]
pub enum ConsolidationError {
    /// The merge worker pool went away before delivering every result.
    /// Partial outputs are discarded.
    #[error("merge worker pool failed: {missing} of {total} task results never arrived")]
    WorkerTask { missing: usize, total: usize },
}
