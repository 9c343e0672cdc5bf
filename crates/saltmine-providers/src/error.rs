use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("upstream request timed out")]
    Timeout,

    /// Non-2xx answer. The body is kept for logs, never shown to clients.
    #[error("upstream returned HTTP {status}")]
    Http { status: u16, body: String },

    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected upstream response: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Request(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Converts a reqwest failure, folding its timeout into `Timeout`.
    pub(crate) fn from_send(e: reqwest::Error) -> Self {
        if e.is_timeout() { Self::Timeout } else { Self::Request(e) }
    }

    /// Reads the body of a failed response into an `Http` error.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Self::Http { status, body }
    }
}
