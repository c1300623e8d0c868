mod fetch;
mod parse;

pub use fetch::{fetch_feed_bytes, file_path_to_url, is_url, read_feed_file, resolve};
pub use parse::{
    Enclosure, EpisodeRecord, FALLBACK_PODCAST_TITLE, PodcastMetadata, ResolvedFeed,
    UNTITLED_EPISODE, parse_feed,
};
