// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::TranscodeError;

/// What probing a file revealed about its container
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub path: PathBuf,
    /// Container format detected from the content, e.g. "mp3", "mov", "ogg"
    pub format: String,
    pub duration_secs: Option<f64>,
    pub audio_codec: Option<String>,
}

impl MediaInfo {
    /// Whether the container already is MP3 and needs no re-encoding
    pub fn is_mp3(&self) -> bool {
        self.format.eq_ignore_ascii_case("mp3")
    }
}

/// Detects and converts audio containers.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Returns the name of this transcoder implementation.
    fn name(&self) -> &str;

    /// Detects the container format of a file from its content.
    async fn probe(&self, path: &Path) -> Result<MediaInfo, TranscodeError>;

    /// Encodes `input` as MP3 into `output`.
    ///
    /// `output` may be written partially on failure; callers own cleanup.
    async fn encode_mp3(&self, input: &Path, output: &Path) -> Result<(), TranscodeError>;

    /// Validates that the transcoder is properly configured and ready.
    async fn validate(&self) -> Result<(), TranscodeError>;
}
