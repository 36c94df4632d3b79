//! Optional RON configuration file merged with command-line overrides.
//!
//! Looked up in `./mediabatch.ron`, then the platform config directory,
//! unless `--config` names a file explicitly.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use batch_logging::{batch_debug, batch_info};
use mediabatch_core::{DownloadOptions, MediaFormat, Quality};
use mediabatch_engine::{
    default_download_dir, default_fallback_dirs, DirectoryResolver, OrchestratorSettings,
    YtDlpSettings,
};
use serde::{Deserialize, Serialize};

use crate::cli::{parse_format, parse_quality, Args};

pub const CONFIG_FILENAME: &str = "mediabatch.ron";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub download_dir: Option<PathBuf>,
    /// Tried in order when the download directory refuses writes.
    pub fallback_dirs: Option<Vec<PathBuf>>,
    /// `"video"` or `"audio"`.
    pub format: Option<String>,
    /// `"720p"` and friends.
    pub quality: Option<String>,
    pub compatibility_mode: Option<bool>,
    pub yt_dlp: Option<PathBuf>,
    pub ffmpeg_location: Option<PathBuf>,
    pub extra_args: Vec<String>,
    pub settle_delay_ms: Option<u64>,
}

impl AppConfig {
    /// Reads `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                batch_debug!("No config file at {:?}", path);
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("reading config {}", path.display()))
            }
        };
        let config = ron::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        batch_info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// An explicit path must exist; otherwise the first default location found is used.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(anyhow!("config file {} does not exist", path.display()));
            }
            return Self::load(path);
        }
        match default_config_paths().into_iter().find(|path| path.exists()) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_ron(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::new())
            .context("serializing config")
    }
}

pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILENAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("mediabatch").join(CONFIG_FILENAME));
    }
    paths
}

/// Everything the terminal front-end needs, after merging file and flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub url: Option<String>,
    pub directory: PathBuf,
    pub fallback_dirs: Vec<PathBuf>,
    pub options: DownloadOptions,
    pub auto_start: bool,
    pub engine: YtDlpSettings,
    pub orchestrator: OrchestratorSettings,
}

impl Settings {
    /// Command-line flags win over the file; the file wins over built-in defaults.
    pub fn resolve(args: &Args, config: AppConfig) -> Result<Self> {
        let format = match (args.format, config.format.as_deref()) {
            (Some(format), _) => format,
            (None, Some(raw)) => parse_format(raw).map_err(|msg| anyhow!("config: {msg}"))?,
            (None, None) => MediaFormat::default(),
        };
        let quality = match (args.quality, config.quality.as_deref()) {
            (Some(quality), _) => quality,
            (None, Some(raw)) => parse_quality(raw).map_err(|msg| anyhow!("config: {msg}"))?,
            (None, None) => Quality::default(),
        };
        let compatibility_mode = args.compat || config.compatibility_mode.unwrap_or(false);

        let mut engine = YtDlpSettings::default();
        if let Some(program) = config.yt_dlp {
            engine.program = program;
        }
        engine.ffmpeg_location = config.ffmpeg_location;
        engine.extra_args = config.extra_args;

        let mut orchestrator = OrchestratorSettings::default();
        if let Some(ms) = config.settle_delay_ms {
            orchestrator.settle_delay = Duration::from_millis(ms);
        }

        Ok(Self {
            url: args.url.clone(),
            directory: args
                .dir
                .clone()
                .or(config.download_dir)
                .unwrap_or_else(default_download_dir),
            fallback_dirs: config.fallback_dirs.unwrap_or_else(default_fallback_dirs),
            options: DownloadOptions {
                format,
                quality,
                compatibility_mode,
            },
            auto_start: args.yes,
            engine,
            orchestrator,
        })
    }

    pub fn resolver(&self) -> DirectoryResolver {
        DirectoryResolver::new(self.fallback_dirs.clone())
    }
}
