// src/errors.rs
use thiserror::Error;

/// Typed failures surfaced by the recommendation core.
///
/// Pipeline binaries wrap these in `anyhow` with added context; library
/// callers match on the variant.
#[derive(Debug, Error)]
pub enum RecommenderError {
    /// The vector index is empty, misconfigured, or the search itself failed.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// Feedback arrived for a user with no stored profile.
    #[error("no profile found for user '{0}'")]
    UserNotFound(String),

    /// A vector's length does not match the corpus/bandit dimension.
    #[error("vector has dimension {got}, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    /// The upstream embedding call failed. Propagated as-is; the core
    /// never retries it.
    #[error("embedding request failed: {0}")]
    Embedding(String),

    /// The profile store or journal sink rejected a read or write.
    #[error("store operation failed: {0}")]
    Store(String),

    /// Bandit state is inconsistent (unknown arm, non-PD covariance).
    #[error("bandit error: {0}")]
    Bandit(String),
}

/// Which of the two feedback writes failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStage {
    Journal,
    Profile,
}

/// Non-fatal record of a journal/profile write that did not land.
///
/// Returned on the `FeedbackReceipt` and logged, never silently dropped.
/// The journal entry carries the full profile delta, so a reported warning
/// is always reconcilable by replay.
#[derive(Debug, Clone)]
pub struct PartialWriteWarning {
    pub stage: WriteStage,
    pub detail: String,
}

impl std::fmt::Display for PartialWriteWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self.stage {
            WriteStage::Journal => "journal append",
            WriteStage::Profile => "profile update",
        };
        write!(f, "partial write: {} failed: {}", stage, self.detail)
    }
}
