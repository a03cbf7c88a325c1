use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Inclusive byte range as sent in a `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    /// Last byte included, `None` for an open-ended range
    pub end: Option<u64>,
}

impl ByteRange {
    /// The first `len` bytes of a resource. `len` must be nonzero.
    pub fn prefix(len: u64) -> Self {
        Self {
            start: 0,
            end: Some(len.saturating_sub(1)),
        }
    }

    pub fn len(&self) -> Option<u64> {
        self.end.map(|end| end.saturating_sub(self.start) + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    pub fn header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}-{}", self.start, end),
            None => write!(f, "{}-", self.start),
        }
    }
}

/// Request identity used by the shared cache: URL plus optional range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub url: String,
    pub range: Option<ByteRange>,
}

impl CacheKey {
    pub fn new(url: impl Into<String>, range: Option<ByteRange>) -> Self {
        Self {
            url: url.into(),
            range,
        }
    }

    /// Whether this entry holds the head of the resource.
    pub fn starts_at_zero(&self) -> bool {
        self.range.is_none_or(|range| range.start == 0)
    }

    /// Stable file stem for the disk tier.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.url.as_bytes());
        hasher.update(b"\n");
        if let Some(range) = &self.range {
            hasher.update(range.to_string().as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.range {
            Some(range) => write!(f, "{} [{}]", self.url, range),
            None => f.write_str(&self.url),
        }
    }
}

/// Response attributes persisted next to a cached body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_range: Option<String>,
    pub size: u64,
    pub stored_at: DateTime<Utc>,
}

impl CacheMetadata {
    pub fn new(size: u64) -> Self {
        Self {
            status: 200,
            content_type: None,
            content_range: None,
            size,
            stored_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_content_range(mut self, content_range: Option<String>) -> Self {
        self.content_range = content_range;
        self
    }
}

/// A cached response body together with its metadata.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub metadata: CacheMetadata,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(body: Bytes, metadata: CacheMetadata) -> Self {
        Self { metadata, body }
    }

    pub fn is_partial(&self) -> bool {
        self.metadata.status == 206
    }
}
