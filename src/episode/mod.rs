mod audio_url;
mod download;
mod filename;

pub use audio_url::resolve_audio_url;
pub use download::{DownloadContext, download_episode};
pub use filename::{
    FINAL_EXTENSION, PARTIAL_SUFFIX, TEMP_EXTENSION, final_filename, generate_filename_stem,
    sanitize_title, temp_filename,
};
