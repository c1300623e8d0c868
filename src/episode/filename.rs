// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Extension of the finished file
pub const FINAL_EXTENSION: &str = "mp3";

/// Extension of the raw download before transcoding
pub const TEMP_EXTENSION: &str = "tmp";

/// Suffix appended to the final path while an encode is running
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Make a title safe to use as a single path component
///
/// Only path separators are replaced; everything else is kept so that the
/// file name stays recognizable.
pub fn sanitize_title(title: &str) -> String {
    title
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}

/// Generate the file stem for the episode at a 1-based position in the batch
///
/// Format: "NNN_title", with "track_N" standing in for a missing title
pub fn generate_filename_stem(ordinal: usize, title: Option<&str>) -> String {
    let sanitized = title.map(sanitize_title).filter(|t| !t.is_empty());
    match sanitized {
        Some(title) => format!("{:03}_{}", ordinal, title),
        None => format!("{:03}_track_{}", ordinal, ordinal),
    }
}

/// Name of the temporary download file
pub fn temp_filename(stem: &str) -> String {
    format!("{}.{}", stem, TEMP_EXTENSION)
}

/// Name of the finished MP3
pub fn final_filename(stem: &str) -> String {
    format!("{}.{}", stem, FINAL_EXTENSION)
}
