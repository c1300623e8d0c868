// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Turning a downloaded file into the final MP3.

mod config;
mod ffmpeg;
mod traits;

pub use config::TranscoderConfig;
pub use ffmpeg::FfmpegTranscoder;
pub use traits::{MediaInfo, Transcoder};

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::episode::PARTIAL_SUFFIX;
use crate::error::TranscodeError;

/// How the final file was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeOutcome {
    /// The source already was MP3 and was moved into place unchanged
    Passthrough,
    /// The source was re-encoded
    Encoded,
}

fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Produce `final_path` from the probed file at `media.path`
///
/// MP3 sources are renamed without re-encoding. Everything else is encoded
/// next to the final path and renamed over it once complete, so the final
/// path never holds a partial file. On success the source file is gone.
pub async fn finalize_mp3<T: Transcoder + ?Sized>(
    transcoder: &T,
    media: &MediaInfo,
    final_path: &Path,
) -> Result<TranscodeOutcome, TranscodeError> {
    if media.is_mp3() {
        tokio::fs::rename(&media.path, final_path).await?;
        debug!("{} already is MP3, renamed", media.path.display());
        return Ok(TranscodeOutcome::Passthrough);
    }

    let partial = partial_path(final_path);
    if let Err(e) = transcoder.encode_mp3(&media.path, &partial).await {
        remove_if_exists(&partial).await;
        return Err(e);
    }

    if let Err(e) = tokio::fs::rename(&partial, final_path).await {
        remove_if_exists(&partial).await;
        return Err(e.into());
    }

    remove_if_exists(&media.path).await;
    debug!(
        "Encoded {} ({}) to {}",
        media.path.display(),
        media.format,
        final_path.display()
    );
    Ok(TranscodeOutcome::Encoded)
}

/// Best-effort removal; a file that is already gone is not an error
pub(crate) async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;

    pub const MP3_MAGIC: &[u8] = b"ID3";
    pub const ENCODED_PREFIX: &[u8] = b"ID3:encoded:";

    /// Treats files starting with "ID3" as MP3 and anything else as WAV;
    /// "encoding" prefixes the source bytes. Files containing "corrupt" fail
    /// to probe and files containing "unencodable" fail to encode.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct MockTranscoder;

    #[async_trait]
    impl Transcoder for MockTranscoder {
        fn name(&self) -> &str {
            "mock"
        }

        async fn probe(&self, path: &Path) -> Result<MediaInfo, TranscodeError> {
            let data = tokio::fs::read(path).await?;
            if data.windows(7).any(|w| w == b"corrupt") {
                return Err(TranscodeError::probe_failed("unrecognized data"));
            }
            let format = if data.starts_with(MP3_MAGIC) { "mp3" } else { "wav" };
            Ok(MediaInfo {
                path: path.to_path_buf(),
                format: format.to_string(),
                duration_secs: Some(1.0),
                audio_codec: Some(format.to_string()),
            })
        }

        async fn encode_mp3(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
            let data = tokio::fs::read(input).await?;
            // Leave something behind to check that callers clean it up
            tokio::fs::write(output, ENCODED_PREFIX).await?;
            if data.windows(11).any(|w| w == b"unencodable") {
                return Err(TranscodeError::encode_failed("unsupported codec", None));
            }
            tokio::fs::write(output, [ENCODED_PREFIX, data.as_slice()].concat()).await?;
            Ok(())
        }

        async fn validate(&self) -> Result<(), TranscodeError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{ENCODED_PREFIX, MockTranscoder};
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn mp3_source_is_renamed_byte_for_byte() {
        let dir = tempdir().unwrap();
        let temp = dir.path().join("001_a.tmp");
        let final_path = dir.path().join("001_a.mp3");
        let source = b"ID3\x04\x00 pretend frames".to_vec();
        std::fs::write(&temp, &source).unwrap();

        let transcoder = MockTranscoder;
        let media = transcoder.probe(&temp).await.unwrap();
        let outcome = finalize_mp3(&transcoder, &media, &final_path).await.unwrap();

        assert_eq!(outcome, TranscodeOutcome::Passthrough);
        assert!(!temp.exists());
        assert_eq!(std::fs::read(&final_path).unwrap(), source);
    }

    #[tokio::test]
    async fn other_sources_are_encoded_and_temp_removed() {
        let dir = tempdir().unwrap();
        let temp = dir.path().join("001_a.tmp");
        let final_path = dir.path().join("001_a.mp3");
        std::fs::write(&temp, b"RIFF wave data").unwrap();

        let transcoder = MockTranscoder;
        let media = transcoder.probe(&temp).await.unwrap();
        let outcome = finalize_mp3(&transcoder, &media, &final_path).await.unwrap();

        assert_eq!(outcome, TranscodeOutcome::Encoded);
        assert!(!temp.exists());
        assert!(!partial_path(&final_path).exists());
        assert!(std::fs::read(&final_path).unwrap().starts_with(ENCODED_PREFIX));
    }

    #[tokio::test]
    async fn failed_encode_leaves_no_output() {
        let dir = tempdir().unwrap();
        let temp = dir.path().join("001_a.tmp");
        let final_path = dir.path().join("001_a.mp3");
        std::fs::write(&temp, b"RIFF unencodable").unwrap();

        let transcoder = MockTranscoder;
        let media = transcoder.probe(&temp).await.unwrap();
        let result = finalize_mp3(&transcoder, &media, &final_path).await;

        assert!(matches!(result, Err(TranscodeError::EncodeFailed { .. })));
        assert!(!final_path.exists());
        assert!(!partial_path(&final_path).exists());
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/m/005_Ep: Intro_Outro.mp3")),
            PathBuf::from("/m/005_Ep: Intro_Outro.mp3.partial")
        );
    }

    #[tokio::test]
    async fn removing_missing_file_is_quiet() {
        let dir = tempdir().unwrap();
        remove_if_exists(&dir.path().join("never-existed")).await;
    }
}
