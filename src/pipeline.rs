// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::episode::{
    DownloadContext, download_episode, final_filename, generate_filename_stem,
    resolve_audio_url, temp_filename,
};
use crate::error::{SelectionError, TaskError};
use crate::feed::{EpisodeRecord, PodcastMetadata};
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::transcode::{Transcoder, TranscodeOutcome, finalize_mp3, remove_if_exists};

/// Options for a batch run
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Checked before each task and between download chunks
    pub cancel: CancellationToken,
}

/// One selected episode, ready to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// 1-based position in the batch
    pub ordinal: usize,
    pub title: String,
    pub resolved_audio_url: String,
    pub destination_folder: PathBuf,
    stem: String,
}

impl DownloadTask {
    /// Resolve the audio URL and file names for an episode
    pub fn prepare(
        episode: &EpisodeRecord,
        ordinal: usize,
        destination_folder: &Path,
    ) -> Result<Self, TaskError> {
        let title = episode.display_title().to_string();
        let url = resolve_audio_url(episode).ok_or_else(|| TaskError::NoAudioUrl {
            title: title.clone(),
        })?;

        Ok(Self {
            ordinal,
            title,
            resolved_audio_url: url.to_string(),
            destination_folder: destination_folder.to_path_buf(),
            stem: generate_filename_stem(ordinal, episode.title.as_deref()),
        })
    }

    /// Where the raw download is written
    pub fn temp_path(&self) -> PathBuf {
        self.destination_folder.join(temp_filename(&self.stem))
    }

    /// Where the finished MP3 ends up
    pub fn final_path(&self) -> PathBuf {
        self.destination_folder.join(final_filename(&self.stem))
    }
}

/// What happened to a single task
#[derive(Debug)]
pub enum TaskOutcome {
    Success(PathBuf),
    Failure(TaskError),
}

/// The result of one task in a batch
#[derive(Debug)]
pub struct TranscodeResult {
    pub ordinal: usize,
    pub title: String,
    pub outcome: TaskOutcome,
}

impl TranscodeResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Success(_))
    }

    pub fn error(&self) -> Option<&TaskError> {
        match &self.outcome {
            TaskOutcome::Failure(e) => Some(e),
            TaskOutcome::Success(_) => None,
        }
    }
}

/// Everything a batch produced, one result per selected episode, in order
#[derive(Debug)]
pub struct BatchReport {
    /// The per-podcast folder the files were written to
    pub destination: PathBuf,
    pub results: Vec<TranscodeResult>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// Failed tasks with their errors, in batch order
    pub fn failures(&self) -> impl Iterator<Item = (&TranscodeResult, &TaskError)> {
        self.results
            .iter()
            .filter_map(|r| r.error().map(|e| (r, e)))
    }
}

/// Turn 0-based indices into the loaded episode list into batch input
///
/// Ordinals are assigned by position in `indices`, starting at 1.
pub fn select_episodes(
    episodes: &[EpisodeRecord],
    indices: &[usize],
) -> Result<Vec<(EpisodeRecord, usize)>, SelectionError> {
    if indices.is_empty() {
        return Err(SelectionError::Empty);
    }

    indices
        .iter()
        .enumerate()
        .map(|(position, &index)| {
            episodes
                .get(index)
                .cloned()
                .map(|episode| (episode, position + 1))
                .ok_or(SelectionError::OutOfRange {
                    index,
                    len: episodes.len(),
                })
        })
        .collect()
}

/// Download and transcode the selected episodes, one after another
///
/// Files are written to `destination_base/<podcast title>`, which is created
/// if needed. A failing task never stops the batch: the report holds exactly
/// one result per selected episode, in selection order.
pub async fn run_batch<C: HttpClient, T: Transcoder + ?Sized>(
    client: &C,
    transcoder: &T,
    podcast: &PodcastMetadata,
    selection: Vec<(EpisodeRecord, usize)>,
    destination_base: &Path,
    options: &BatchOptions,
    reporter: SharedProgressReporter,
) -> BatchReport {
    let destination = destination_base.join(&podcast.title);
    let total = selection.len();

    let folder_error = tokio::fs::create_dir_all(&destination).await.err();
    if let Some(ref e) = folder_error {
        warn!(
            "Failed to create destination folder {}: {}",
            destination.display(),
            e
        );
    }

    reporter.report(ProgressEvent::BatchStarted {
        destination: destination.clone(),
        total_tasks: total,
    });

    let mut results = Vec::with_capacity(total);

    for (position, (episode, ordinal)) in selection.into_iter().enumerate() {
        let title = episode.display_title().to_string();

        let outcome = if let Some(ref e) = folder_error {
            Err(TaskError::Io {
                path: destination.clone(),
                source: std::io::Error::new(e.kind(), e.to_string()),
            })
        } else if options.cancel.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            reporter.report(ProgressEvent::TaskStarted {
                ordinal,
                total_tasks: total,
                episode_title: title.clone(),
            });
            run_task(
                client,
                transcoder,
                &episode,
                ordinal,
                &destination,
                &options.cancel,
                &reporter,
            )
            .await
        };

        let outcome = match outcome {
            Ok(path) => {
                info!("[{}/{}] {} -> {}", ordinal, total, title, path.display());
                reporter.report(ProgressEvent::TaskCompleted {
                    ordinal,
                    episode_title: title.clone(),
                    path: path.clone(),
                });
                TaskOutcome::Success(path)
            }
            Err(e) => {
                warn!("[{}/{}] {} failed: {}", ordinal, total, title, e);
                reporter.report(ProgressEvent::TaskFailed {
                    ordinal,
                    episode_title: title.clone(),
                    error: e.to_string(),
                });
                TaskOutcome::Failure(e)
            }
        };

        results.push(TranscodeResult {
            ordinal,
            title,
            outcome,
        });

        reporter.report(ProgressEvent::BatchProgress {
            completed: position + 1,
            total,
        });
    }

    let report = BatchReport {
        destination,
        results,
    };

    reporter.report(ProgressEvent::BatchCompleted {
        succeeded: report.succeeded(),
        failed: report.failed(),
    });

    report
}

/// Run a batch on its own tokio task
///
/// The caller keeps its own task free to render the events sent to
/// `reporter` and awaits the handle for the final report.
pub fn spawn_batch<C>(
    client: C,
    transcoder: Arc<dyn Transcoder>,
    podcast: PodcastMetadata,
    selection: Vec<(EpisodeRecord, usize)>,
    destination_base: PathBuf,
    options: BatchOptions,
    reporter: SharedProgressReporter,
) -> JoinHandle<BatchReport>
where
    C: HttpClient + 'static,
{
    tokio::spawn(async move {
        run_batch(
            &client,
            transcoder.as_ref(),
            &podcast,
            selection,
            &destination_base,
            &options,
            reporter,
        )
        .await
    })
}

async fn run_task<C: HttpClient, T: Transcoder + ?Sized>(
    client: &C,
    transcoder: &T,
    episode: &EpisodeRecord,
    ordinal: usize,
    destination: &Path,
    cancel: &CancellationToken,
    reporter: &SharedProgressReporter,
) -> Result<PathBuf, TaskError> {
    let task = DownloadTask::prepare(episode, ordinal, destination)?;
    let temp_path = task.temp_path();

    let result = fetch_and_transcode(client, transcoder, &task, &temp_path, cancel, reporter).await;

    // A failed task leaves nothing behind in the destination folder
    if result.is_err() {
        remove_if_exists(&temp_path).await;
    }

    result
}

async fn fetch_and_transcode<C: HttpClient, T: Transcoder + ?Sized>(
    client: &C,
    transcoder: &T,
    task: &DownloadTask,
    temp_path: &Path,
    cancel: &CancellationToken,
    reporter: &SharedProgressReporter,
) -> Result<PathBuf, TaskError> {
    let context = DownloadContext {
        ordinal: task.ordinal,
        episode_title: task.title.clone(),
    };

    download_episode(
        client,
        &task.resolved_audio_url,
        temp_path,
        &context,
        cancel,
        reporter,
    )
    .await?;

    let media = transcoder.probe(temp_path).await?;

    reporter.report(ProgressEvent::Transcoding {
        ordinal: task.ordinal,
        episode_title: task.title.clone(),
        passthrough: media.is_mp3(),
    });

    let final_path = task.final_path();
    let outcome = finalize_mp3(transcoder, &media, &final_path).await?;
    if outcome == TranscodeOutcome::Encoded {
        info!("Re-encoded {} from {}", task.title, media.format);
    }

    Ok(final_path)
}
