// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::DownloadError;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Identifies the task a download belongs to, for progress events
#[derive(Debug, Clone)]
pub struct DownloadContext {
    /// 1-based position in the batch
    pub ordinal: usize,
    pub episode_title: String,
}

/// Stream `url` into `output_path`
///
/// Progress is reported after every chunk when the server declares a content
/// length. A body shorter than the declared length is treated as a failure.
/// Returns the number of bytes written.
pub async fn download_episode<C: HttpClient>(
    client: &C,
    url: &str,
    output_path: &Path,
    context: &DownloadContext,
    cancel: &CancellationToken,
    reporter: &SharedProgressReporter,
) -> Result<u64, DownloadError> {
    let response = client
        .get_stream(url)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    // Nothing touches the disk for a failed request
    if !response.is_success() {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    let content_length = response.content_length.filter(|len| *len > 0);

    reporter.report(ProgressEvent::DownloadStarting {
        ordinal: context.ordinal,
        episode_title: context.episode_title.clone(),
        content_length,
    });

    let mut file =
        File::create(output_path)
            .await
            .map_err(|e| DownloadError::FileCreateFailed {
                path: output_path.to_path_buf(),
                source: e,
            })?;

    let mut bytes_downloaded: u64 = 0;
    let mut stream = response.body;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(DownloadError::Cancelled { url: url.to_string() });
            }
            next = stream.next() => next,
        };

        let Some(chunk_result) = next else {
            break;
        };

        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        if chunk.is_empty() {
            continue;
        }

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: output_path.to_path_buf(),
                source: e,
            })?;

        bytes_downloaded += chunk.len() as u64;

        if let Some(total_bytes) = content_length {
            reporter.report(ProgressEvent::DownloadProgress {
                ordinal: context.ordinal,
                bytes_downloaded,
                total_bytes,
            });
        }
    }

    file.flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: output_path.to_path_buf(),
            source: e,
        })?;

    if let Some(expected) = content_length
        && bytes_downloaded < expected
    {
        return Err(DownloadError::Truncated {
            url: url.to_string(),
            received: bytes_downloaded,
            expected,
        });
    }

    debug!(
        "Downloaded {} bytes from {} to {}",
        bytes_downloaded,
        url,
        output_path.display()
    );

    reporter.report(ProgressEvent::DownloadCompleted {
        ordinal: context.ordinal,
        bytes_downloaded,
    });

    Ok(bytes_downloaded)
}
