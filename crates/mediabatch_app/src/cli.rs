use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use mediabatch_core::{MediaFormat, Quality};

/// Batch video and audio downloader for the terminal.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "mediabatch", author, version)]
#[command(about = "Analyze a video or playlist link and download the selected items in order")]
pub struct Args {
    /// Link to analyze on startup
    pub url: Option<String>,

    /// Download directory (defaults to the user's Downloads folder)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Output format: video or audio
    #[arg(short, long, value_parser = parse_format)]
    pub format: Option<MediaFormat>,

    /// Maximum video height: 240p, 360p, 480p, 720p or 1080p
    #[arg(short, long, value_parser = parse_quality)]
    pub quality: Option<Quality>,

    /// Prefer H.264 streams for older players
    #[arg(long)]
    pub compat: bool,

    /// Start downloading everything once analysis finishes, then exit
    #[arg(short, long, requires = "url")]
    pub yes: bool,

    /// Configuration file (RON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the loaded configuration as RON and exit
    #[arg(long)]
    pub print_config: bool,

    /// Where log output goes
    #[arg(long, value_enum, default_value_t = LogTarget::File)]
    pub log: LogTarget,

    /// More log detail (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    /// ./mediabatch.log
    File,
    /// stderr
    Terminal,
    Both,
    Off,
}

pub fn parse_format(raw: &str) -> Result<MediaFormat, String> {
    MediaFormat::parse(raw).ok_or_else(|| format!("unknown format '{raw}' (use video or audio)"))
}

pub fn parse_quality(raw: &str) -> Result<Quality, String> {
    Quality::parse(raw).ok_or_else(|| {
        let tiers: Vec<String> = Quality::ALL.iter().map(ToString::to_string).collect();
        format!("unknown quality '{raw}' (use one of {})", tiers.join(", "))
    })
}
