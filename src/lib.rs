pub mod episode;
pub mod error;
pub mod feed;
pub mod http;
pub mod pipeline;
pub mod progress;
pub mod transcode;

// Re-export main types for convenience
pub use episode::{generate_filename_stem, resolve_audio_url, sanitize_title};
pub use error::{DownloadError, FeedError, SelectionError, TaskError, TranscodeError};
pub use feed::{Enclosure, EpisodeRecord, PodcastMetadata, ResolvedFeed, is_url, parse_feed, resolve};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use pipeline::{
    BatchOptions, BatchReport, DownloadTask, TaskOutcome, TranscodeResult, run_batch,
    select_episodes, spawn_batch,
};
pub use progress::{
    ChannelReporter, NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter,
};
pub use transcode::{FfmpegTranscoder, MediaInfo, Transcoder, TranscoderConfig};
