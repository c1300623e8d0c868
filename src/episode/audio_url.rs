// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::feed::{Enclosure, EpisodeRecord};

fn is_audio(enclosure: &Enclosure) -> bool {
    enclosure
        .mime_type
        .as_deref()
        .and_then(|mime| mime.get(..5))
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("audio"))
}

/// Pick the URL to download for an episode
///
/// The first enclosure declared as audio wins, in document order. Episodes
/// without one fall back to their generic link.
pub fn resolve_audio_url(episode: &EpisodeRecord) -> Option<&str> {
    episode
        .enclosures
        .iter()
        .find(|enc| is_audio(enc))
        .map(|enc| enc.url.as_str())
        .or(episode.fallback_link.as_deref())
}
