//! Error types shared across the agent.

/// Errors raised while reading a host counter or fact.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Failed to read a procfs/sysfs file.
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    /// A system file was readable but did not have the expected shape.
    #[error("failed to parse {path}: {detail}")]
    Parse { path: String, detail: String },

    /// The measurement is not available on this platform.
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    /// A metadata or public-IP HTTP request failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// An earlier query on the same source has not returned yet.
    #[error("{0} query is still in progress")]
    Busy(&'static str),

    /// A blocking collection task panicked or was cancelled.
    #[error("collection task failed: {0}")]
    Task(String),
}

impl ProbeError {
    pub fn parse(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

/// Errors returned by a [`Transport`](crate::transport::Transport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The collector rejected the credentials (HTTP 401). Terminal.
    #[error("authentication failed: invalid or expired token")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("rate limited")]
    RateLimited,

    #[error("unexpected status code {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to compress payload: {0}")]
    Compress(#[from] std::io::Error),

    /// The cycle deadline expired before the collector answered.
    #[error("send timed out")]
    Timeout,

    #[error("transport is closed")]
    Closed,
}

impl TransportError {
    /// Only an authentication failure stops the agent; everything else is
    /// retried on the next tick.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

/// Errors from the agent control loop itself.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent is already {0}")]
    AlreadyStarted(&'static str),
}

/// Errors from a full static-fact collection.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("every static probe failed")]
    NothingCollected,

    #[error("static collection missed the cycle deadline")]
    DeadlineExceeded,
}
