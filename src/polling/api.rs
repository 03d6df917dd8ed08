use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Body and encoding of one successful HTTP exchange, still compressed.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub content_encoding: Option<String>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn plain(body: impl Into<Bytes>) -> Self {
        Self {
            content_encoding: None,
            body: body.into(),
        }
    }

    pub fn encoded(encoding: &str, body: impl Into<Bytes>) -> Self {
        Self {
            content_encoding: Some(encoding.to_string()),
            body: body.into(),
        }
    }
}

/// Every way a poll can fail. All of them back the fetcher off.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("cannot decode {encoding} body")]
    Decompress {
        encoding: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported content encoding {0}")]
    UnsupportedEncoding(String),
    #[error("body does not look like a snapshot")]
    Shape,
    #[error("invalid snapshot JSON")]
    Json(#[from] serde_json::Error),
    #[error("snapshot has no timestamp")]
    MissingTimestamp,
    #[error("stale snapshot: {received} is older than {current}")]
    Stale { received: i64, current: i64 },
}

/// Where snapshots come from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// One GET. Only transport failures are reported here; decoding is the
    /// fetcher's job.
    async fn fetch(&self) -> Result<RawResponse, FetchError>;
}
