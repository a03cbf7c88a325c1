use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::ReelError;

/// Identifier of a feed item: the media URL as handed over by the feed.
///
/// Construction never fails; the URL is only validated when a player or a
/// fetch needs it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaId(Arc<str>);

impl MediaId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the identifier as an absolute http(s) URL.
    pub fn to_url(&self) -> Result<Url, ReelError> {
        let url = Url::parse(&self.0).map_err(|e| ReelError::invalid_url(&*self.0, e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ReelError::invalid_url(
                &*self.0,
                format!("unsupported scheme `{other}`"),
            )),
        }
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MediaId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl Borrow<str> for MediaId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for MediaId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validation_is_deferred() {
        let id = MediaId::from("not a url");
        assert_eq!(id.as_str(), "not a url");
        assert!(matches!(id.to_url(), Err(ReelError::InvalidUrl { .. })));
    }

    #[test]
    fn only_http_schemes_resolve() {
        assert!(MediaId::from("https://cdn.example.com/a.mp4").to_url().is_ok());
        assert!(MediaId::from("ftp://cdn.example.com/a.mp4").to_url().is_err());
    }

    #[test]
    fn borrows_as_str_for_lookups() {
        let mut set = std::collections::HashSet::new();
        set.insert(MediaId::from("https://a/1.mp4"));
        assert!(set.contains("https://a/1.mp4"));
    }
}
