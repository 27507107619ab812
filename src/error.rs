//! Structured error taxonomy for the block kernel.
//!
//! Every fallible public operation returns `Result<_, KernelError>`. Each
//! variant carries the offending identifier (block hash, codec id, field
//! name) so callers and tests can match on kind without string parsing.
//!
//! Two failure classes deserve a note:
//!
//! - Estimator failures are *recovered locally*: the fallback wrapper in
//!   [`crate::estimator`] degrades to a heuristic estimate and logs a
//!   warning instead of propagating `Estimator`.
//! - An impossible query (conflicting `source` values under a merge) is
//!   not an error at all; it simply matches no blocks.

use thiserror::Error;

/// Error type for all kernel operations.
#[derive(Debug, Clone, Error)]
pub enum KernelError {
    /// A codec rejected a payload, or a policy failed its sanity check.
    #[error("validation failed in codec '{codec_id}' on field '{field}': {message}")]
    Validation {
        /// Codec that rejected the payload (or "policy" for policy checks).
        codec_id: String,
        /// Offending field name.
        field: String,
        /// Human-readable description of the violation.
        message: String,
    },

    /// A kind string did not name any member of the closed kind set.
    ///
    /// This is a programmer error, not a malformed user document.
    #[error("unknown block kind: '{0}'")]
    UnknownKind(String),

    /// Registry lookup for an unregistered codec id.
    #[error("unknown codec: '{0}'")]
    UnknownCodec(String),

    /// Attempt to register a codec id that is already registered.
    #[error("codec already registered: '{0}'")]
    DuplicateCodec(String),

    /// A fork result contained a forbidden field after execution.
    #[error("fork output leaked forbidden field '{field}'")]
    ForbiddenFieldLeak {
        /// The forbidden field whose name appeared in the serialized output.
        field: String,
    },

    /// Content above the permitted sensitivity level reached a collaborator
    /// that only accepts public input.
    #[error("sensitivity level '{level}' exceeds maximum '{max}' for block {block_hash}")]
    SensitivityViolation {
        /// Sensitivity of the offending block.
        level: String,
        /// Maximum the collaborator accepts.
        max: String,
        /// Hash of the offending block.
        block_hash: String,
    },

    /// Token estimate exceeded the available budget under the `Error`
    /// overflow strategy.
    #[error("estimated {estimated} tokens exceeds budget of {budget}")]
    Overflow {
        /// Estimated token total.
        estimated: u64,
        /// Available token budget.
        budget: u64,
    },

    /// A token estimator call failed.
    ///
    /// Usually recovered locally; surfaces only when a caller uses an
    /// estimator directly without the fallback wrapper.
    #[error("token estimator unavailable: {0}")]
    Estimator(String),

    /// A persistence back-end operation failed.
    #[error("store error: {0}")]
    Store(String),

    /// A fork executor callback failed.
    #[error("fork executor error: {0}")]
    Executor(String),
}

impl KernelError {
    /// Build a validation error for a codec field.
    pub fn validation(
        codec_id: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            codec_id: codec_id.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_constructor() {
        let err = KernelError::validation("system-rules", "text", "missing required field");
        match err {
            KernelError::Validation { codec_id, field, .. } => {
                assert_eq!(codec_id, "system-rules");
                assert_eq!(field, "text");
            }
            _ => panic!("expected Validation"),
        }
    }

    #[test]
    fn test_error_display_carries_identifier() {
        let err = KernelError::UnknownCodec("mystery".to_string());
        assert!(err.to_string().contains("mystery"));

        let err = KernelError::Overflow { estimated: 5000, budget: 4096 };
        assert!(err.to_string().contains("5000"));
        assert!(err.to_string().contains("4096"));
    }
}
