use std::path::Path;

use url::Url;

use crate::error::{AppError, Result};

/// Parse a feed: one URL per line, blank lines and `#` comments skipped.
pub fn parse_feed(text: &str) -> Result<Vec<String>> {
    let mut feed = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        Url::parse(line).map_err(|e| {
            AppError::InvalidInput(format!("line {}: `{}` is not a URL: {}", line_no + 1, line, e))
        })?;
        feed.push(line.to_string());
    }

    if feed.is_empty() {
        return Err(AppError::InvalidInput("feed is empty".to_string()));
    }
    Ok(feed)
}

pub async fn read_feed(path: &Path) -> Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path).await?;
    parse_feed(&text)
}
