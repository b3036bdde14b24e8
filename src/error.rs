//! Error taxonomy for the fuzzing campaign.
use thiserror::Error;

/// Errors that can abort or disrupt a running campaign.
#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("analysis error: {0}")]
    Analysis(String),

    #[error(
        "insufficient diversity: elitism promoted {count} chromosome(s), need at least 2. \
         This usually means the initial corpus had identical seeds, or every seed exercises \
         the same basic blocks."
    )]
    InsufficientDiversity { count: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error returned when a builder is missing required configuration.
/// Mirrors the teacher crate's `TryFromXBuilderError` convention: a plain,
/// non-`thiserror` tuple struct for internal construction invariants.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TryFromBuilderError(pub &'static str);

impl std::fmt::Display for TryFromBuilderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TryFromBuilderError {}
