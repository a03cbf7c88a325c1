//! Byte-range fetching for preloads and head probes.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use crate::ReelError;
use crate::cache::ByteRange;
use crate::client::create_client;
use crate::config::ClientConfig;

/// Body and headers of a ranged response.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_range: Option<String>,
    pub body: Bytes,
}

impl RangeResponse {
    /// A `206 Partial Content` answer for `range` carrying `body`.
    pub fn partial(body: Bytes, range: ByteRange) -> Self {
        let end = range.start + (body.len() as u64).saturating_sub(1);
        Self {
            status: StatusCode::PARTIAL_CONTENT.as_u16(),
            content_type: Some("video/mp4".to_string()),
            content_range: (!body.is_empty()).then(|| format!("bytes {}-{}/*", range.start, end)),
            body,
        }
    }
}

/// Source of byte ranges.
///
/// Implementations must stop promptly once `token` is cancelled and return
/// [`ReelError::Cancelled`].
#[async_trait]
pub trait RangeFetcher: Send + Sync {
    async fn fetch_range(
        &self,
        url: &Url,
        range: ByteRange,
        token: &CancellationToken,
    ) -> Result<RangeResponse, ReelError>;
}

/// [`RangeFetcher`] over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpRangeFetcher {
    client: Client,
}

impl HttpRangeFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ReelError> {
        Ok(Self::new(create_client(config)?))
    }
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl RangeFetcher for HttpRangeFetcher {
    async fn fetch_range(
        &self,
        url: &Url,
        range: ByteRange,
        token: &CancellationToken,
    ) -> Result<RangeResponse, ReelError> {
        let request = self
            .client
            .get(url.clone())
            .header(RANGE, range.header_value())
            .send();

        let response = tokio::select! {
            _ = token.cancelled() => return Err(ReelError::Cancelled),
            response = request => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ReelError::http_status(status, url.as_str(), "preload"));
        }
        if status != StatusCode::PARTIAL_CONTENT {
            debug!(url = %url, %status, "Server ignored range request, truncating body");
        }

        let content_type = header_string(&response, CONTENT_TYPE);
        let content_range = header_string(&response, CONTENT_RANGE);
        let limit = range.len().unwrap_or(u64::MAX);
        let capacity = response.content_length().unwrap_or(0).min(limit) as usize;
        let mut buffer = BytesMut::with_capacity(capacity);
        let mut stream = response.bytes_stream();

        loop {
            let chunk = tokio::select! {
                _ = token.cancelled() => return Err(ReelError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let chunk = chunk?;
            let remaining = limit.saturating_sub(buffer.len() as u64);
            let take = (chunk.len() as u64).min(remaining) as usize;
            buffer.extend_from_slice(&chunk[..take]);
            trace!(url = %url, received = buffer.len(), "Received range chunk");
            if buffer.len() as u64 >= limit {
                break;
            }
        }

        Ok(RangeResponse {
            status: status.as_u16(),
            content_type,
            content_range,
            body: buffer.freeze(),
        })
    }
}
