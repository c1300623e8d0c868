// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transcoder backed by the ffmpeg and ffprobe binaries.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tokio::time::{Duration, timeout};
use tracing::debug;

use super::config::TranscoderConfig;
use super::traits::{MediaInfo, Transcoder};
use crate::error::TranscodeError;

/// FFmpeg-based transcoder implementation.
pub struct FfmpegTranscoder {
    config: TranscoderConfig,
}

impl FfmpegTranscoder {
    /// Creates a new FFmpeg transcoder with the given configuration.
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    /// Creates a transcoder with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(TranscoderConfig::default())
    }

    pub fn config(&self) -> &TranscoderConfig {
        &self.config
    }

    /// Builds ffmpeg arguments for an MP3 encode.
    ///
    /// The output path carries no usable extension while encoding, so the
    /// muxer is forced with `-f mp3`.
    fn build_mp3_args(&self, input_path: &Path, output_path: &Path) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input_path.to_string_lossy().to_string(),
            // Embedded cover art would otherwise be carried as a video stream
            "-vn".to_string(),
            "-map_metadata".to_string(),
            "0".to_string(),
            "-c:a".to_string(),
            "libmp3lame".to_string(),
            "-b:a".to_string(),
            format!("{}k", self.config.bitrate_kbps),
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
        ];

        args.extend(self.config.extra_ffmpeg_args.iter().cloned());

        args.extend(["-f".to_string(), "mp3".to_string()]);
        args.push(output_path.to_string_lossy().to_string());

        args
    }

    /// Parses ffprobe JSON output into MediaInfo.
    fn parse_probe_output(path: &Path, output: &str) -> Result<MediaInfo, TranscodeError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: String,
            duration: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: String,
            codec_name: Option<String>,
        }

        let probe: ProbeOutput =
            serde_json::from_str(output).map_err(|e| TranscodeError::ParseError {
                reason: format!("Failed to parse ffprobe output: {}", e),
            })?;

        let audio_stream = probe
            .streams
            .iter()
            .find(|s| s.codec_type == "audio")
            .ok_or_else(|| TranscodeError::probe_failed("no audio stream found"))?;

        // ffprobe lists aliases, e.g. "mov,mp4,m4a,3gp,3g2,mj2"
        let format_name = probe
            .format
            .format_name
            .split(',')
            .next()
            .unwrap_or("unknown");

        Ok(MediaInfo {
            path: path.to_path_buf(),
            format: format_name.to_string(),
            duration_secs: probe
                .format
                .duration
                .as_ref()
                .and_then(|d| d.parse::<f64>().ok()),
            audio_codec: audio_stream.codec_name.clone(),
        })
    }

    fn not_found_or_io(e: std::io::Error, missing: TranscodeError) -> TranscodeError {
        if e.kind() == std::io::ErrorKind::NotFound {
            missing
        } else {
            TranscodeError::Io(e)
        }
    }

    fn ffmpeg_missing(&self) -> TranscodeError {
        TranscodeError::FfmpegNotFound {
            path: self.config.ffmpeg_path.clone(),
        }
    }

    fn ffprobe_missing(&self) -> TranscodeError {
        TranscodeError::FfprobeNotFound {
            path: self.config.ffprobe_path.clone(),
        }
    }

    /// Run to completion within `timeout_secs`; the child is killed if the
    /// deadline passes or the future is dropped
    async fn run_bounded(
        &self,
        command: &mut Command,
        missing: TranscodeError,
    ) -> Result<Output, TranscodeError> {
        command.stdin(Stdio::null()).kill_on_drop(true);

        timeout(Duration::from_secs(self.config.timeout_secs), command.output())
            .await
            .map_err(|_| TranscodeError::Timeout {
                timeout_secs: self.config.timeout_secs,
            })?
            .map_err(|e| Self::not_found_or_io(e, missing))
    }

    async fn check_binary(
        &self,
        path: &Path,
        missing: TranscodeError,
    ) -> Result<(), TranscodeError> {
        let mut command = Command::new(path);
        command
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let output = self.run_bounded(&mut command, missing).await?;
        if !output.status.success() {
            return Err(TranscodeError::BinaryFailed {
                path: path.to_path_buf(),
                code: output.status.code(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, TranscodeError> {
        if !path.exists() {
            return Err(TranscodeError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let mut command = Command::new(&self.config.ffprobe_path);
        command
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let output = self.run_bounded(&mut command, self.ffprobe_missing()).await?;

        if !output.status.success() {
            return Err(TranscodeError::probe_failed(format!(
                "ffprobe could not read {} as audio",
                path.display()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_probe_output(path, &stdout)
    }

    async fn encode_mp3(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        let args = self.build_mp3_args(input, output);
        debug!("Running {} {}", self.config.ffmpeg_path.display(), args.join(" "));

        let mut command = Command::new(&self.config.ffmpeg_path);
        command
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let result = self.run_bounded(&mut command, self.ffmpeg_missing()).await?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            return Err(TranscodeError::encode_failed(
                format!("FFmpeg exited with code: {:?}", result.status.code()),
                Some(stderr).filter(|s| !s.is_empty()),
            ));
        }

        Ok(())
    }

    async fn validate(&self) -> Result<(), TranscodeError> {
        self.check_binary(&self.config.ffmpeg_path, self.ffmpeg_missing())
            .await?;
        self.check_binary(&self.config.ffprobe_path, self.ffprobe_missing())
            .await
    }
}
