use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ReelError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("proxy configuration error: {reason}")]
    ProxyConfiguration { reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("cache index serialization failed: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    #[error("media probe failed: {source}")]
    Probe {
        #[from]
        source: mp4::ProbeError,
    },

    #[error("failed to load {id}: {reason}")]
    LoadFailed { id: String, reason: String },

    #[error("media item not ready: {reason}")]
    NotReady { reason: String },
}

impl ReelError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn proxy_configuration(reason: impl Into<String>) -> Self {
        Self::ProxyConfiguration {
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn load_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LoadFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn not_ready(reason: impl Into<String>) -> Self {
        Self::NotReady {
            reason: reason.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_cancellation_reports_cancelled() {
        assert!(ReelError::Cancelled.is_cancelled());
        assert!(!ReelError::invalid_url("::", "relative URL without a base").is_cancelled());
        assert!(!ReelError::load_failed("http://a/v.mp4", "moov not found").is_cancelled());
    }

    #[test]
    fn display_includes_context() {
        let err = ReelError::http_status(StatusCode::FORBIDDEN, "http://cdn/x.mp4", "preload");
        assert_eq!(
            err.to_string(),
            "request failed with HTTP 403 Forbidden during preload for http://cdn/x.mp4"
        );
    }
}
