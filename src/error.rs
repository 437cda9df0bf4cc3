/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Non-success HTTP status code.
    #[error("http error {status}: {detail}")]
    Http {
        status: u16,
        /// Human-readable text pulled from the error body.
        detail: String,
        /// Raw response body.
        body: String,
    },
    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Request body could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),
    /// No request slot became free within the configured wait.
    #[error("no request slot available after {waited_ms} ms")]
    SlotTimeout { waited_ms: u64 },
}

impl ApiError {
    /// HTTP status code, when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            Self::Decode(_) | Self::Encode(_) | Self::SlotTimeout { .. } => None,
        }
    }

    /// Human-readable failure text.
    pub fn detail(&self) -> String {
        match self {
            Self::Http { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the failure happened below HTTP (connect, timeout, I/O).
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Whether the failure carries a status the governor retries.
    pub fn is_retryable_status(&self) -> bool {
        self.status().is_some_and(is_retryable_status)
    }
}

/// Statuses treated as transient: 429, 502, 503, 504.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504)
}
