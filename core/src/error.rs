use thiserror::Error;

/// Errors raised while turning a span list into a critical path.
///
/// Only inputs that would make the computation meaningless are errors.
/// Recoverable defects (negative durations, orphaned spans, several root
/// candidates) are repaired and logged instead.
#[derive(Debug, Error)]
pub enum CriticalPathError {
    #[error("duplicate span id {span_id}")]
    DuplicateSpan { span_id: String },

    #[error("cyclic parent reference involving span {span_id}")]
    CyclicReference { span_id: String },

    #[error("span {span_id} not found in span map")]
    MissingSpan { span_id: String },

    #[error("failed to parse trace document: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CriticalPathError>;
