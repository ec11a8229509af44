//! Error taxonomy shared by every deployment component.

/// Errors raised while validating, deploying, linking or verifying a
/// Universal Token.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Missing RPC URL, key, artifact or chain metadata. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed inbound request, rejected before any side effect.
    #[error("validation error: {0}")]
    Validation(String),

    /// Network, provider, nonce or mined-but-reverted transaction failure.
    #[error("chain {chain_id} RPC error: {message}")]
    ChainRpc {
        /// Chain the failing call was sent to.
        chain_id: u64,
        /// Provider error text.
        message: String,
    },

    /// A call reverted during simulation; permanent for that call.
    #[error("`{method}` reverted on chain {chain_id}: {reason}")]
    ContractRevert {
        /// Chain the call targeted.
        chain_id: u64,
        /// Solidity signature of the reverted method.
        method: String,
        /// Revert reason or decoded failure.
        reason: String,
    },

    /// The explorer rejected the verification request.
    #[error("verification failed on chain {chain_id}: {message}")]
    Verification {
        /// Chain whose explorer rejected the request.
        chain_id: u64,
        /// Explorer response text.
        message: String,
    },

    /// The explorer never reported a terminal verification outcome.
    #[error("verification on chain {chain_id} still pending after {attempts} status checks")]
    VerificationTimeout {
        /// Chain whose explorer was polled.
        chain_id: u64,
        /// Number of status checks performed.
        attempts: u32,
    },

    /// A retried operation failed on every attempt.
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        /// Label of the retried operation.
        operation: String,
        /// Total attempts made, including the first.
        attempts: u32,
        /// Error returned by the last attempt.
        #[source]
        source: Box<Self>,
    },

    /// Rejected deployment state-machine move.
    #[error("invalid deployment status transition from `{from}` to `{to}`")]
    InvalidTransition {
        /// Status before the attempted move.
        from: String,
        /// Requested status.
        to: String,
    },

    /// Record persistence failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// JSON encoding or decoding failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the failure is transient and may succeed on another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ChainRpc { .. })
    }

    /// Shorthand for [`Error::Configuration`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Shorthand for [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for [`Error::ChainRpc`].
    pub fn rpc(chain_id: u64, message: impl ToString) -> Self {
        Self::ChainRpc {
            chain_id,
            message: message.to_string(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rpc_errors_are_retryable() {
        assert!(Error::rpc(1, "connection reset").is_retryable(), "rpc");
        assert!(!Error::config("missing key").is_retryable(), "config");
        assert!(
            !Error::ContractRevert {
                chain_id: 1,
                method: "owner()".into(),
                reason: "nope".into(),
            }
            .is_retryable(),
            "revert"
        );
    }

    #[test]
    fn exhausted_error_names_attempt_count() {
        let err = Error::RetriesExhausted {
            operation: "deploy on chain 97".into(),
            attempts: 3,
            source: Box::new(Error::rpc(97, "nonce too low")),
        };
        let text = err.to_string();
        assert!(text.contains("3 attempt(s)"), "{text}");
        assert!(text.contains("nonce too low"), "{text}");
    }
}
