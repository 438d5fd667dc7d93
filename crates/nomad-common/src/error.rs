/// Errors produced across the orchestration engine.
///
/// Provider failures are split by how the agent loop reacts to them:
/// `Transport`, `Timeout` and `Upstream` are retried, `Schema` triggers the
/// tools-stripped retry, everything else propagates as-is.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("upstream error: status={status}, body={message}")]
    Upstream { status: u16, message: String },

    #[error("provider rejected request schema: status={status}, body={message}")]
    Schema { status: u16, message: String },

    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether a remote call that failed with this error may be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Timeout(_) | Error::Upstream { .. }
        )
    }

    /// Provider refused the payload shape (typically tool calling on a model
    /// that does not support it).
    pub fn is_schema_rejection(&self) -> bool {
        matches!(self, Error::Schema { .. })
    }

    /// Short, categorized message suitable for showing to a guest.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::Timeout(_) => {
                "The assistant is taking too long to respond. Please try again in a moment."
            }
            Error::Upstream { status: 401 | 403, .. } => {
                "The assistant service is not authorized right now. Please contact the front desk."
            }
            Error::Upstream { status: 429, .. } | Error::RateLimited(_) => {
                "Too many requests. Please wait a moment and try again."
            }
            Error::Validation(_) => "The request could not be understood.",
            _ => "Sorry, something went wrong. Please try again.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(Error::Transport("connection reset".into()).is_retryable());
        assert!(Error::Timeout("read".into()).is_retryable());
        assert!(
            Error::Upstream {
                status: 503,
                message: "overloaded".into()
            }
            .is_retryable()
        );
        assert!(
            !Error::Schema {
                status: 400,
                message: "tools unsupported".into()
            }
            .is_retryable()
        );
        assert!(!Error::RateLimited("session".into()).is_retryable());
        assert!(!Error::ToolExecution("boom".into()).is_retryable());
    }

    #[test]
    fn user_messages_are_categorized() {
        let timeout = Error::Timeout("read timeout".into());
        let auth = Error::Upstream {
            status: 401,
            message: "bad key".into(),
        };
        let limited = Error::RateLimited("global".into());
        let generic = Error::Transport("dns error".into());

        assert!(timeout.user_message().contains("too long"));
        assert!(auth.user_message().contains("not authorized"));
        assert!(limited.user_message().contains("Too many requests"));
        assert!(generic.user_message().starts_with("Sorry"));
        assert!(!generic.user_message().contains("dns"));
    }

    #[test]
    fn upstream_display_includes_status() {
        let err = Error::Upstream {
            status: 502,
            message: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "upstream error: status=502, body=bad gateway");
    }
}
