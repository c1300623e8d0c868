// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading a podcast feed
///
/// Resolving a feed is all-or-nothing: any of these aborts the whole call.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("No feed URL or path given")]
    EmptySource,

    #[error("Failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} while fetching feed {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to read feed file {path}: {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Failed to parse feed as RSS ({rss}) or Atom ({atom})")]
    ParseFailed {
        rss: rss::Error,
        atom: atom_syndication::Error,
    },
}

/// A selection that does not fit the loaded episode list
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectionError {
    #[error("No episodes selected")]
    Empty,

    #[error("Episode index {index} is out of range (feed has {len} episodes)")]
    OutOfRange { index: usize, len: usize },
}

/// Errors that can occur while streaming an episode to disk
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download of {url} ended after {received} of {expected} bytes")]
    Truncated {
        url: String,
        received: u64,
        expected: u64,
    },

    #[error("Download of {url} was cancelled")]
    Cancelled { url: String },
}

/// Errors from probing or encoding audio
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("FFmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    #[error("FFprobe not found at path: {path}")]
    FfprobeNotFound { path: PathBuf },

    #[error("{path} -version exited unsuccessfully (code {code:?})")]
    BinaryFailed { path: PathBuf, code: Option<i32> },

    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    #[error("Failed to probe audio file: {reason}")]
    ProbeFailed { reason: String },

    #[error("Failed to parse media info: {reason}")]
    ParseError { reason: String },

    #[error("Encoding to MP3 failed: {reason}")]
    EncodeFailed {
        reason: String,
        stderr: Option<String>,
    },

    #[error("FFmpeg/FFprobe timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranscodeError {
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            reason: reason.into(),
        }
    }

    pub fn encode_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::EncodeFailed {
            reason: reason.into(),
            stderr,
        }
    }
}

/// Why a single task in a batch failed
///
/// These are captured into the task's result and never abort the batch.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Episode '{title}' has no audio URL")]
    NoAudioUrl { title: String },

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error("Filesystem error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cancelled before completion")]
    Cancelled,
}

impl TaskError {
    /// Short label for the failure category, used in summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoAudioUrl { .. } => "no-audio-url",
            Self::Download(DownloadError::Cancelled { .. }) | Self::Cancelled => "cancelled",
            Self::Download(_) => "download",
            Self::Transcode(_) => "transcode",
            Self::Io { .. } => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_error_kinds() {
        let no_url = TaskError::NoAudioUrl {
            title: "Ep".to_string(),
        };
        assert_eq!(no_url.kind(), "no-audio-url");

        let status = TaskError::from(DownloadError::HttpStatus {
            url: "https://example.com/a.mp3".to_string(),
            status: 404,
        });
        assert_eq!(status.kind(), "download");

        let cancelled = TaskError::from(DownloadError::Cancelled {
            url: "https://example.com/a.mp3".to_string(),
        });
        assert_eq!(cancelled.kind(), "cancelled");

        let timeout = TaskError::from(TranscodeError::Timeout { timeout_secs: 5 });
        assert_eq!(timeout.kind(), "transcode");
    }

    #[test]
    fn download_errors_are_shown_verbatim_in_task_errors() {
        let err = TaskError::from(DownloadError::HttpStatus {
            url: "https://example.com/a.mp3".to_string(),
            status: 503,
        });
        assert_eq!(err.to_string(), "HTTP error 503 for https://example.com/a.mp3");
    }
}
