//! Engine error types.

use thiserror::Error;

use crate::store::StoreError;

/// Boxed error returned by a step's side effect.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced to workflow code by [`crate::engine::DurableContext::step`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The step's side effect returned an error; the attempt is recorded
    /// as `FAILED`.
    #[error("step '{step_key}' failed: {source}")]
    StepFailed {
        step_key: String,
        #[source]
        source: BoxError,
    },

    /// The step's result could not be encoded; the attempt is recorded as
    /// `FAILED`.
    #[error("failed to encode output of step '{step_key}': {source}")]
    Encode {
        step_key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A completed step's recorded output does not decode into the type
    /// the caller asked for.
    #[error("failed to decode recorded output of step '{step_key}': {source}")]
    Decode {
        step_key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A single step call passed over more stale attempts than the retry
    /// policy allows.
    #[error("step '{step_name}' gave up after {attempts} stale attempts")]
    RetryLimitExceeded { step_name: String, attempts: u32 },

    /// Step names must be non-empty; nothing is recorded.
    #[error("step name must not be empty")]
    EmptyStepName,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Step key the error is attributed to, if any.
    pub fn step_key(&self) -> Option<&str> {
        match self {
            Self::StepFailed { step_key, .. }
            | Self::Encode { step_key, .. }
            | Self::Decode { step_key, .. } => Some(step_key),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failed_names_key() {
        let err = EngineError::StepFailed {
            step_key: "provisionLaptop-2".to_string(),
            source: "no stock".into(),
        };

        assert_eq!(err.step_key(), Some("provisionLaptop-2"));
        assert_eq!(err.to_string(), "step 'provisionLaptop-2' failed: no stock");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err: EngineError = StoreError::InvalidStepKey("oops".to_string()).into();
        assert_eq!(err.to_string(), "malformed step key 'oops'");
        assert_eq!(err.step_key(), None);
    }
}
