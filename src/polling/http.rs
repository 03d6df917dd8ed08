use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING};

use crate::polling::api::{FetchError, RawResponse, SnapshotSource};

/// GETs the snapshot URL with reqwest.
///
/// Decompression is left to [`crate::polling::decode`] so the encoding
/// failure is reported like any other fetch failure.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .no_gzip()
            .no_deflate()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn map_error(err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl SnapshotSource for HttpSource {
    async fn fetch(&self) -> Result<RawResponse, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT_ENCODING, "gzip, deflate")
            .send()
            .await
            .map_err(Self::map_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_encoding = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(Self::map_error)?;

        log::trace!("[FETCH] {} bytes from {} ({content_encoding:?})", body.len(), self.url);
        Ok(RawResponse {
            content_encoding,
            body,
        })
    }
}
