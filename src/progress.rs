// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

/// Events emitted while a batch runs
///
/// For any task, its download and transcode events arrive before its
/// `TaskCompleted`/`TaskFailed` event, which in turn arrives before the
/// following `BatchProgress`.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Tasks are about to run against `destination`
    ///
    /// Sent even when the folder could not be created; every task then
    /// fails with an I/O error.
    BatchStarted {
        destination: PathBuf,
        total_tasks: usize,
    },

    /// A task was picked up
    TaskStarted {
        /// 1-based position in the batch
        ordinal: usize,
        total_tasks: usize,
        episode_title: String,
    },

    /// The server answered and the body is about to be streamed
    DownloadStarting {
        ordinal: usize,
        episode_title: String,
        /// Expected content length in bytes, if declared
        content_length: Option<u64>,
    },

    /// A chunk was written; only sent when the content length is known
    DownloadProgress {
        ordinal: usize,
        bytes_downloaded: u64,
        total_bytes: u64,
    },

    /// The body was fully written to the temporary file
    DownloadCompleted {
        ordinal: usize,
        bytes_downloaded: u64,
    },

    /// The downloaded file is being turned into the final MP3
    Transcoding {
        ordinal: usize,
        episode_title: String,
        /// The source already is MP3 and is only renamed
        passthrough: bool,
    },

    /// The task produced its final file
    TaskCompleted {
        ordinal: usize,
        episode_title: String,
        path: PathBuf,
    },

    /// The task failed; the batch continues
    TaskFailed {
        ordinal: usize,
        episode_title: String,
        error: String,
    },

    /// Sent after every task, successful or not
    BatchProgress { completed: usize, total: usize },

    /// All tasks have been processed
    BatchCompleted { succeeded: usize, failed: usize },
}

impl ProgressEvent {
    /// Fraction in `0.0..=1.0` for events that carry one
    pub fn fraction(&self) -> Option<f64> {
        match *self {
            Self::DownloadProgress {
                bytes_downloaded,
                total_bytes,
                ..
            } if total_bytes > 0 => Some((bytes_downloaded as f64 / total_bytes as f64).min(1.0)),
            Self::BatchProgress { completed, total } if total > 0 => {
                Some((completed as f64 / total as f64).min(1.0))
            }
            _ => None,
        }
    }
}

/// Trait for reporting progress events while a batch runs.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {
        // Intentionally empty
    }
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

/// Forwards events over a channel to whoever owns the display
///
/// The worker running the batch never touches presentation state; the
/// receiving side drains the channel and renders.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelReporter {
    /// Create a reporter and the receiver its events arrive on
    pub fn channel() -> (SharedProgressReporter, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, event: ProgressEvent) {
        // A closed receiver only means nobody is watching anymore
        let _ = self.tx.send(event);
    }
}
