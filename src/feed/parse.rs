// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Component, Path};

use chrono::{DateTime, FixedOffset};
use tracing::debug;
use url::Url;

use crate::episode::sanitize_title;
use crate::error::FeedError;

/// Folder name used when the feed has no usable title
pub const FALLBACK_PODCAST_TITLE: &str = "Podcast";

/// Shown in place of a missing episode title
pub const UNTITLED_EPISODE: &str = "Untitled Episode";

/// Top-level information about a podcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodcastMetadata {
    /// Sanitized title, safe to use as a folder name
    pub title: String,
    pub feed_url: Url,
}

/// One entry of a feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRecord {
    pub title: Option<String>,
    pub published: Option<DateTime<FixedOffset>>,
    /// Attached media in document order
    pub enclosures: Vec<Enclosure>,
    /// The entry's generic link, used when no audio enclosure exists
    pub fallback_link: Option<String>,
}

impl EpisodeRecord {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(UNTITLED_EPISODE)
    }
}

/// Media declared on a feed entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    pub mime_type: Option<String>,
}

/// The complete result of loading a feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFeed {
    pub podcast: PodcastMetadata,
    pub episodes: Vec<EpisodeRecord>,
}

/// Parse feed bytes, trying RSS 2.0 first and Atom second
pub fn parse_feed(xml_bytes: &[u8], feed_url: Url) -> Result<ResolvedFeed, FeedError> {
    let rss_err = match rss::Channel::read_from(xml_bytes) {
        Ok(channel) => {
            debug!("Parsed feed as RSS, {} items", channel.items().len());
            return Ok(from_rss(&channel, feed_url));
        }
        Err(e) => e,
    };

    debug!("Failed to parse as RSS: {}, trying Atom", rss_err);
    match atom_syndication::Feed::read_from(xml_bytes) {
        Ok(feed) => {
            debug!("Parsed feed as Atom, {} entries", feed.entries().len());
            Ok(from_atom(&feed, feed_url))
        }
        Err(atom_err) => Err(FeedError::ParseFailed {
            rss: rss_err,
            atom: atom_err,
        }),
    }
}

/// The folder name must be exactly one normal path component, so "." and
/// ".." never leave or collapse into the base directory
fn podcast_title(raw: &str) -> String {
    let sanitized = sanitize_title(raw);
    let mut components = Path::new(&sanitized).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => sanitized,
        _ => FALLBACK_PODCAST_TITLE.to_string(),
    }
}

fn non_empty(s: &str) -> Option<String> {
    Some(s.to_string()).filter(|s| !s.trim().is_empty())
}

fn from_rss(channel: &rss::Channel, feed_url: Url) -> ResolvedFeed {
    let episodes = channel.items().iter().map(rss_episode).collect();

    ResolvedFeed {
        podcast: PodcastMetadata {
            title: podcast_title(channel.title()),
            feed_url,
        },
        episodes,
    }
}

fn rss_episode(item: &rss::Item) -> EpisodeRecord {
    let mut enclosures: Vec<Enclosure> = item
        .enclosure()
        .map(|enc| Enclosure {
            url: enc.url().to_string(),
            mime_type: non_empty(enc.mime_type()),
        })
        .into_iter()
        .collect();

    // <media:content url=".." type=".."/> elements count as enclosures too
    if let Some(contents) = item.extensions().get("media").and_then(|m| m.get("content")) {
        enclosures.extend(contents.iter().filter_map(|ext| {
            let attrs = ext.attrs();
            attrs.get("url").map(|url| Enclosure {
                url: url.clone(),
                mime_type: attrs.get("type").cloned(),
            })
        }));
    }

    let published = item
        .pub_date()
        .and_then(|date| DateTime::parse_from_rfc2822(date.trim()).ok());

    EpisodeRecord {
        title: item.title().and_then(non_empty),
        published,
        enclosures,
        fallback_link: item.link().and_then(non_empty),
    }
}

fn from_atom(feed: &atom_syndication::Feed, feed_url: Url) -> ResolvedFeed {
    let episodes = feed.entries().iter().map(atom_episode).collect();

    ResolvedFeed {
        podcast: PodcastMetadata {
            title: podcast_title(feed.title().as_str()),
            feed_url,
        },
        episodes,
    }
}

fn atom_episode(entry: &atom_syndication::Entry) -> EpisodeRecord {
    let enclosures = entry
        .links()
        .iter()
        .filter(|link| link.rel() == "enclosure")
        .map(|link| Enclosure {
            url: link.href().to_string(),
            mime_type: link.mime_type().and_then(non_empty),
        })
        .collect();

    let fallback_link = entry
        .links()
        .iter()
        .find(|link| link.rel() == "alternate")
        .or_else(|| entry.links().iter().find(|link| link.rel() != "enclosure"))
        .map(|link| link.href().to_string());

    EpisodeRecord {
        title: non_empty(entry.title().as_str()),
        published: entry.published().copied().or_else(|| Some(*entry.updated())),
        enclosures,
        fallback_link,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>  Tech/Talk \ Weekly  </title>
    <description>A test podcast</description>
    <link>https://example.com</link>
    <item>
      <title>Episode 1</title>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <link>https://example.com/ep1</link>
      <enclosure url="https://example.com/ep1.mp3" length="1234567" type="audio/mpeg"/>
    </item>
    <item>
      <link>https://example.com/ep2</link>
    </item>
    <item>
      <title>Episode 3</title>
      <enclosure url="https://example.com/ep3.jpg" length="10" type="image/jpeg"/>
      <media:content url="https://example.com/ep3.m4a" type="audio/mp4"/>
    </item>
  </channel>
</rss>"#;

    const SAMPLE_ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Cast</title>
  <id>urn:uuid:feed</id>
  <updated>2024-01-02T00:00:00Z</updated>
  <entry>
    <title>First</title>
    <id>urn:uuid:1</id>
    <updated>2024-01-01T00:00:00Z</updated>
    <link rel="alternate" href="https://example.com/first"/>
    <link rel="enclosure" type="audio/ogg" href="https://example.com/first.ogg"/>
  </entry>
  <entry>
    <title></title>
    <id>urn:uuid:2</id>
    <updated>2024-01-02T00:00:00Z</updated>
    <link rel="related" href="https://example.com/second"/>
  </entry>
</feed>"#;

    fn feed_url() -> Url {
        Url::parse("https://example.com/feed.xml").unwrap()
    }

    #[test]
    fn rss_title_is_sanitized_for_folder_use() {
        let feed = parse_feed(SAMPLE_RSS.as_bytes(), feed_url()).unwrap();
        assert_eq!(feed.podcast.title, "Tech_Talk _ Weekly");
        assert_eq!(feed.podcast.feed_url, feed_url());
    }

    #[test]
    fn rss_keeps_every_item_in_order() {
        let feed = parse_feed(SAMPLE_RSS.as_bytes(), feed_url()).unwrap();
        assert_eq!(feed.episodes.len(), 3);
        assert_eq!(feed.episodes[0].title.as_deref(), Some("Episode 1"));
        assert_eq!(feed.episodes[1].title, None);
        assert_eq!(feed.episodes[1].display_title(), UNTITLED_EPISODE);
        assert_eq!(feed.episodes[2].title.as_deref(), Some("Episode 3"));
    }

    #[test]
    fn rss_collects_enclosures_and_links() {
        let feed = parse_feed(SAMPLE_RSS.as_bytes(), feed_url()).unwrap();

        let ep1 = &feed.episodes[0];
        assert_eq!(
            ep1.enclosures,
            vec![Enclosure {
                url: "https://example.com/ep1.mp3".to_string(),
                mime_type: Some("audio/mpeg".to_string()),
            }]
        );
        assert_eq!(ep1.fallback_link.as_deref(), Some("https://example.com/ep1"));
        assert!(ep1.published.is_some());

        let ep2 = &feed.episodes[1];
        assert!(ep2.enclosures.is_empty());
        assert_eq!(ep2.fallback_link.as_deref(), Some("https://example.com/ep2"));

        let ep3 = &feed.episodes[2];
        assert_eq!(ep3.enclosures.len(), 2);
        assert_eq!(ep3.enclosures[0].mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(ep3.enclosures[1].url, "https://example.com/ep3.m4a");
        assert_eq!(ep3.enclosures[1].mime_type.as_deref(), Some("audio/mp4"));
    }

    #[test]
    fn rss_without_title_falls_back() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>  </title><description>x</description></channel></rss>"#;
        let feed = parse_feed(xml.as_bytes(), feed_url()).unwrap();
        assert_eq!(feed.podcast.title, FALLBACK_PODCAST_TITLE);
        assert!(feed.episodes.is_empty());
    }

    #[test]
    fn dot_titles_fall_back() {
        for title in ["..", ".", " .. "] {
            let xml = format!(
                r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>{title}</title><description>x</description></channel></rss>"#
            );
            let feed = parse_feed(xml.as_bytes(), feed_url()).unwrap();
            assert_eq!(feed.podcast.title, FALLBACK_PODCAST_TITLE, "title {title:?}");
        }
    }

    #[test]
    fn dots_inside_a_title_are_kept() {
        assert_eq!(podcast_title("...And Justice"), "...And Justice");
        assert_eq!(podcast_title("../etc"), ".._etc");
    }

    #[test]
    fn atom_feeds_are_supported() {
        let feed = parse_feed(SAMPLE_ATOM.as_bytes(), feed_url()).unwrap();
        assert_eq!(feed.podcast.title, "Atom Cast");
        assert_eq!(feed.episodes.len(), 2);

        let first = &feed.episodes[0];
        assert_eq!(first.title.as_deref(), Some("First"));
        assert_eq!(first.enclosures[0].url, "https://example.com/first.ogg");
        assert_eq!(first.enclosures[0].mime_type.as_deref(), Some("audio/ogg"));
        assert_eq!(first.fallback_link.as_deref(), Some("https://example.com/first"));

        let second = &feed.episodes[1];
        assert_eq!(second.title, None);
        assert!(second.enclosures.is_empty());
        assert_eq!(
            second.fallback_link.as_deref(),
            Some("https://example.com/second")
        );
    }

    #[test]
    fn garbage_fails_with_both_causes() {
        let result = parse_feed(b"this is not xml at all", feed_url());
        assert!(matches!(result, Err(FeedError::ParseFailed { .. })));
    }

    #[test]
    fn parsing_is_deterministic() {
        let a = parse_feed(SAMPLE_RSS.as_bytes(), feed_url()).unwrap();
        let b = parse_feed(SAMPLE_RSS.as_bytes(), feed_url()).unwrap();
        assert_eq!(a, b);
    }
}
