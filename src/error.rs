use thiserror::Error;

/// Maximum number of characters of an upstream body kept in an error.
pub const ERROR_BODY_MAX_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Login or refresh was rejected, or the grant was missing tokens.
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// Non-auth HTTP failure, including a 401 that survived the retry.
    #[error("{endpoint} failed ({status}): {body}")]
    Upstream {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Timeout or connection failure that survived the retry.
    #[error("request to {endpoint} failed: {message}")]
    Network { endpoint: String, message: String },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("unexpected upstream payload: {0}")]
    DataShape(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn upstream(endpoint: &str, status: u16, body: &str) -> Self {
        Self::Upstream {
            endpoint: endpoint.to_string(),
            status,
            body: truncate_chars(body, ERROR_BODY_MAX_CHARS),
        }
    }

    pub fn network(endpoint: &str, message: impl Into<String>) -> Self {
        Self::Network {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Upstream { status: 401, .. })
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

pub(crate) fn truncate_chars(raw: &str, max_chars: usize) -> String {
    raw.chars().take(max_chars).collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_truncates_body() {
        let body = "x".repeat(500);
        let err = ClientError::upstream("BBVAS/UsageSummary", 500, &body);
        match &err {
            ClientError::Upstream { body, status, .. } => {
                assert_eq!(body.chars().count(), ERROR_BODY_MAX_CHARS);
                assert_eq!(*status, 500);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().starts_with("BBVAS/UsageSummary failed (500)"));
    }

    #[test]
    fn truncate_respects_multibyte_chars() {
        assert_eq!(truncate_chars("ආයුබෝවන්", 3).chars().count(), 3);
    }

    #[test]
    fn only_upstream_401_counts_as_unauthorized() {
        assert!(ClientError::upstream("x", 401, "").is_unauthorized());
        assert!(!ClientError::upstream("x", 403, "").is_unauthorized());
        assert!(!ClientError::auth("denied").is_unauthorized());
    }
}
