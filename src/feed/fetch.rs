// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use bytes::Bytes;
use tracing::info;
use url::Url;

use crate::error::FeedError;
use crate::http::HttpClient;

use super::parse::{ResolvedFeed, parse_feed};

/// Fetch raw feed bytes from a URL (without parsing)
pub async fn fetch_feed_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Bytes, FeedError> {
    client.get_bytes(url).await.map_err(|e| match e.status() {
        Some(status) => FeedError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        },
        None => FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        },
    })
}

/// Read raw feed bytes from a local file (without parsing)
pub async fn read_feed_file(path: &Path) -> Result<Vec<u8>, FeedError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| FeedError::FileReadFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Construct a file:// URL for a local file path
pub fn file_path_to_url(path: &Path) -> Result<Url, FeedError> {
    let absolute = std::path::absolute(path).map_err(|e| FeedError::FileReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    Url::from_file_path(&absolute)
        .or_else(|_| Url::parse(&format!("file://{}", absolute.display())))
        .map_err(FeedError::from)
}

/// Determine if a string is a URL or a file path
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Load a feed from a URL or a local file and parse it
///
/// This is all-or-nothing: either every entry of the feed is returned, in
/// feed order, or the call fails.
pub async fn resolve<C: HttpClient>(client: &C, source: &str) -> Result<ResolvedFeed, FeedError> {
    let source = source.trim();
    if source.is_empty() {
        return Err(FeedError::EmptySource);
    }

    let feed = if is_url(source) {
        let feed_url = Url::parse(source)?;
        let bytes = fetch_feed_bytes(client, source).await?;
        parse_feed(&bytes, feed_url)?
    } else {
        let path = Path::new(source);
        let bytes = read_feed_file(path).await?;
        parse_feed(&bytes, file_path_to_url(path)?)?
    };

    info!(
        "Loaded feed '{}' with {} episodes",
        feed.podcast.title,
        feed.episodes.len()
    );

    Ok(feed)
}
