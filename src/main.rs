// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use podmp3::{
    BatchOptions, ChannelReporter, FfmpegTranscoder, ProgressEvent, ReqwestClient, ResolvedFeed,
    Transcoder, TranscoderConfig, resolve, select_episodes, spawn_batch,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static CONVERT: Emoji<'_, '_> = Emoji("🔄 ", "[>] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Download podcast episodes and convert them to MP3
#[derive(Parser, Debug)]
#[command(name = "podmp3")]
#[command(about = "Download podcast episodes from a feed and convert them to MP3")]
#[command(version)]
struct Args {
    /// RSS/Atom feed URL or path to a local feed file
    feed: String,

    /// Base directory; a folder named after the podcast is created inside it
    /// [default: your music directory]
    output_dir: Option<PathBuf>,

    /// List the feed's episodes with their numbers and exit
    #[arg(short, long)]
    list: bool,

    /// Episodes to download, by number as shown by --list (e.g. "1,3,5-7")
    #[arg(short, long, value_parser = parse_selection, conflicts_with = "all")]
    select: Option<Selection>,

    /// Download every episode in the feed
    #[arg(short, long)]
    all: bool,

    /// MP3 bitrate in kbps for episodes that need re-encoding
    #[arg(short, long, default_value = "192")]
    bitrate: u32,

    /// Path to the ffmpeg binary
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Path to the ffprobe binary
    #[arg(long, default_value = "ffprobe")]
    ffprobe: PathBuf,

    /// Upper bound in seconds for converting a single episode
    #[arg(long, default_value = "3600")]
    encode_timeout: u64,

    /// Seconds to wait for a connection to a server
    #[arg(long, default_value = "30")]
    connect_timeout: u64,

    /// Upper bound in seconds for any single HTTP request, downloads included
    #[arg(long)]
    timeout: Option<u64>,

    /// Quiet mode - suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Log more detail to stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// 1-based inclusive ranges in the order they were given
///
/// Ranges stay unexpanded until the feed's episode count is known.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selection(Vec<RangeInclusive<usize>>);

impl Selection {
    /// 0-based indices, without duplicates, with ranges cut at `episode_count`
    fn indices(&self, episode_count: usize) -> Result<Vec<usize>, String> {
        let mut seen = HashSet::new();
        let mut indices = Vec::new();

        for range in &self.0 {
            if *range.start() > episode_count {
                return Err(format!(
                    "episode {} does not exist, the feed has {} episodes",
                    range.start(),
                    episode_count
                ));
            }
            let end = (*range.end()).min(episode_count);
            for n in *range.start()..=end {
                if seen.insert(n - 1) {
                    indices.push(n - 1);
                }
            }
        }
        Ok(indices)
    }
}

/// Parse "1,3,5-7" (1-based, ranges inclusive)
fn parse_selection(input: &str) -> Result<Selection, String> {
    let mut ranges = Vec::new();

    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (start, end) = match part.split_once('-') {
            Some((a, b)) => (parse_number(a)?, parse_number(b)?),
            None => {
                let n = parse_number(part)?;
                (n, n)
            }
        };
        if start > end {
            return Err(format!("range {part} is reversed"));
        }
        ranges.push(start..=end);
    }

    if ranges.is_empty() {
        return Err("no episode numbers given".to_string());
    }
    Ok(Selection(ranges))
}

fn parse_number(s: &str) -> Result<usize, String> {
    match s.trim().parse::<usize>() {
        Ok(0) => Err("episode numbers start at 1".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{}' is not an episode number", s.trim())),
    }
}

fn default_output_dir() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| {
            dirs.audio_dir()
                .map(Path::to_path_buf)
                .or_else(|| Some(dirs.home_dir().join("Music")))
        })
        .unwrap_or_else(|| PathBuf::from("."))
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "error",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("podmp3={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let kept: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn print_episode_list(feed: &ResolvedFeed) {
    println!(
        "{HEADPHONES}{} • {} episodes\n",
        feed.podcast.title.bold().green(),
        feed.episodes.len().to_string().cyan()
    );
    let width = feed.episodes.len().to_string().len();
    for (index, episode) in feed.episodes.iter().enumerate() {
        let date = episode
            .published
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "          ".to_string());
        println!(
            "  {:>width$}  {}  {}",
            (index + 1).to_string().cyan(),
            date.dimmed(),
            episode.display_title()
        );
    }
    println!(
        "\nSelect episodes with {} or download everything with {}",
        "--select 1,3,5-7".yellow(),
        "--all".yellow()
    );
}

/// Renders batch events as a batch bar plus a per-file bar
///
/// Lives on the main task; the batch worker only sends events.
struct IndicatifRenderer {
    multi: MultiProgress,
    batch_bar: ProgressBar,
    file_bar: ProgressBar,
}

impl IndicatifRenderer {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let batch_style = ProgressStyle::default_bar()
            .template("{prefix} [{bar:30.green/white}] {pos}/{len} {wide_msg}")
            .expect("static progress template")
            .progress_chars("█▓░");

        let file_style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .expect("static progress template")
            .progress_chars("█▓░");

        let batch_bar = multi.add(ProgressBar::new(0));
        batch_bar.set_style(batch_style);
        batch_bar.set_prefix("Episodes");

        let file_bar = multi.add(ProgressBar::new(0));
        file_bar.set_style(file_style);

        Self {
            multi,
            batch_bar,
            file_bar,
        }
    }

    fn handle(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::BatchStarted {
                destination,
                total_tasks,
            } => {
                self.batch_bar.set_length(total_tasks as u64);
                self.batch_bar
                    .set_message(format!("{FOLDER}{}", destination.display()));
            }

            ProgressEvent::TaskStarted {
                ordinal,
                total_tasks,
                episode_title,
            } => {
                self.file_bar.reset();
                self.file_bar.set_length(0);
                self.file_bar.set_message(format!(
                    "[{}/{}] {}",
                    ordinal.to_string().cyan(),
                    total_tasks.to_string().cyan(),
                    truncate_title(&episode_title, 40)
                ));
            }

            ProgressEvent::DownloadStarting { content_length, .. } => {
                self.file_bar.set_length(content_length.unwrap_or(0));
                self.file_bar.set_position(0);
            }

            ProgressEvent::DownloadProgress {
                bytes_downloaded,
                total_bytes,
                ..
            } => {
                self.file_bar.set_length(total_bytes);
                self.file_bar.set_position(bytes_downloaded);
            }

            ProgressEvent::DownloadCompleted {
                bytes_downloaded, ..
            } => {
                self.file_bar.set_position(bytes_downloaded);
            }

            ProgressEvent::Transcoding {
                episode_title,
                passthrough,
                ..
            } => {
                let action = if passthrough { "already MP3" } else { "converting" };
                self.file_bar.set_message(format!(
                    "{CONVERT}{} ({})",
                    truncate_title(&episode_title, 40),
                    action.dimmed()
                ));
            }

            ProgressEvent::TaskCompleted { episode_title, .. } => {
                let _ = self
                    .multi
                    .println(format!("{SUCCESS}{}", episode_title.green()));
            }

            ProgressEvent::TaskFailed {
                episode_title,
                error,
                ..
            } => {
                let _ = self.multi.println(format!(
                    "{FAILURE}{} - {}",
                    truncate_title(&episode_title, 40).red(),
                    error.red()
                ));
            }

            ProgressEvent::BatchProgress { completed, .. } => {
                self.batch_bar.set_position(completed as u64);
            }

            ProgressEvent::BatchCompleted { succeeded, failed } => {
                self.file_bar.finish_and_clear();
                self.batch_bar.finish_and_clear();
                println!(
                    "\n{PARTY}{} {} succeeded, {} failed",
                    "Done:".bold().green(),
                    succeeded.to_string().green().bold(),
                    if failed > 0 {
                        failed.to_string().red().bold()
                    } else {
                        failed.to_string().green()
                    }
                );
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "podmp3".bold().magenta(),
            "- Podcast to MP3".dimmed()
        );
    }

    let client = ReqwestClient::with_timeouts(
        Duration::from_secs(args.connect_timeout),
        args.timeout.map(Duration::from_secs),
    )
    .context("Failed to create HTTP client")?;

    let spinner = (!args.quiet).then(|| {
        let spinner = ProgressBar::new_spinner();
        spinner.set_message(format!("{SEARCH}Fetching feed: {}", args.feed.cyan()));
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    });
    let feed = resolve(&client, &args.feed).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let feed = feed.with_context(|| format!("Failed to load feed {}", args.feed))?;

    let indices = match (&args.select, args.all) {
        (Some(selection), _) if !args.list => selection
            .indices(feed.episodes.len())
            .map_err(anyhow::Error::msg)
            .context("Invalid selection")?,
        (None, true) if !args.list => (0..feed.episodes.len()).collect(),
        _ => {
            print_episode_list(&feed);
            return Ok(());
        }
    };

    if feed.episodes.is_empty() {
        bail!("The feed has no episodes");
    }
    let selection = select_episodes(&feed.episodes, &indices).context("Invalid selection")?;

    let transcoder = FfmpegTranscoder::new(
        TranscoderConfig::with_paths(args.ffmpeg.clone(), args.ffprobe.clone())
            .with_bitrate(args.bitrate)
            .with_timeout(args.encode_timeout),
    );
    transcoder
        .validate()
        .await
        .context("ffmpeg and ffprobe are required to convert episodes")?;

    let options = BatchOptions::default();
    let cancel = options.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let output_dir = args.output_dir.clone().unwrap_or_else(default_output_dir);
    let (reporter, mut events) = ChannelReporter::channel();

    let handle = spawn_batch(
        client,
        Arc::new(transcoder),
        feed.podcast.clone(),
        selection,
        output_dir,
        options,
        reporter,
    );

    let renderer = (!args.quiet).then(IndicatifRenderer::new);
    while let Some(event) = events.recv().await {
        if let Some(ref renderer) = renderer {
            renderer.handle(event);
        }
    }

    let report = handle.await.context("Batch worker stopped unexpectedly")?;

    if !args.quiet && report.failed() > 0 {
        println!("\n{}", "Failed episodes:".red().bold());
        for (result, error) in report.failures() {
            println!(
                "  {}{} {} [{}] - {}",
                CROSS,
                format!("{:03}", result.ordinal).dimmed(),
                result.title.yellow(),
                error.kind(),
                error.to_string().dimmed()
            );
        }
    }

    if !args.quiet {
        println!(
            "\n{FOLDER}Output: {}\n",
            report.destination.display().to_string().cyan()
        );
    }

    if report.failed() > 0 && report.succeeded() == 0 {
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(input: &str, episode_count: usize) -> Result<Vec<usize>, String> {
        parse_selection(input)?.indices(episode_count)
    }

    #[test]
    fn selection_accepts_numbers_and_ranges() {
        assert_eq!(indices("1,3,5-7", 10).unwrap(), vec![0, 2, 4, 5, 6]);
        assert_eq!(indices(" 2 , 1 ", 10).unwrap(), vec![1, 0]);
    }

    #[test]
    fn selection_drops_duplicates() {
        assert_eq!(indices("1,1-2,2", 10).unwrap(), vec![0, 1]);
    }

    #[test]
    fn selection_rejects_bad_input() {
        assert!(parse_selection("0").is_err());
        assert!(parse_selection("3-1").is_err());
        assert!(parse_selection("one").is_err());
        assert!(parse_selection(",").is_err());
    }

    #[test]
    fn huge_ranges_stop_at_the_episode_count() {
        let selection = parse_selection("2-18446744073709551615").unwrap();
        assert_eq!(selection.indices(4).unwrap(), vec![1, 2, 3]);
        assert_eq!(indices("3,1-1000000", 5).unwrap(), vec![2, 0, 1, 3, 4]);
    }

    #[test]
    fn selection_past_the_feed_is_rejected() {
        assert!(indices("6", 5).is_err());
        assert!(indices("1,7-9", 5).is_err());
        assert_eq!(indices("5", 5).unwrap(), vec![4]);
    }

    #[test]
    fn truncate_is_char_aware() {
        assert_eq!(truncate_title("short", 10), "short");
        assert_eq!(truncate_title("Épisode numéro un", 10), "Épisode...");
    }

    #[test]
    fn args_parse() {
        let args = Args::try_parse_from(["podmp3", "https://example.com/feed.xml", "/music", "-s", "1-2"])
            .unwrap();
        assert_eq!(args.output_dir, Some(PathBuf::from("/music")));
        assert_eq!(args.select, Some(Selection(vec![1..=2])));
        assert_eq!(args.bitrate, 192);

        assert!(
            Args::try_parse_from(["podmp3", "feed.xml", "--all", "--select", "1"]).is_err()
        );
    }
}
