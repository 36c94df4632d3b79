//! Data model shared by the controller and the orchestrator.
use std::fmt;
use std::path::PathBuf;

/// One discoverable media unit, immutable once the catalog is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub title: String,
    pub stable_id: Option<String>,
    pub source_url: String,
}

impl Item {
    pub fn new(title: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            stable_id: None,
            source_url: source_url.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.stable_id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaFormat {
    #[default]
    Video,
    Audio,
}

impl MediaFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "video" | "mp4" => Some(Self::Video),
            "audio" | "mp3" | "m4a" => Some(Self::Audio),
            _ => None,
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaFormat::Video => write!(f, "video"),
            MediaFormat::Audio => write!(f, "audio"),
        }
    }
}

/// Discrete resolution tiers offered for video downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Quality {
    P240,
    P360,
    #[default]
    P480,
    P720,
    P1080,
}

impl Quality {
    pub const ALL: [Quality; 5] = [
        Quality::P1080,
        Quality::P720,
        Quality::P480,
        Quality::P360,
        Quality::P240,
    ];

    pub fn height(self) -> u32 {
        match self {
            Quality::P240 => 240,
            Quality::P360 => 360,
            Quality::P480 => 480,
            Quality::P720 => 720,
            Quality::P1080 => 1080,
        }
    }

    /// Accepts `"720p"`, `"720"` and surrounding whitespace.
    pub fn parse(raw: &str) -> Option<Self> {
        let digits = raw.trim().trim_end_matches(['p', 'P']);
        let height: u32 = digits.parse().ok()?;
        Self::ALL.into_iter().find(|q| q.height() == height)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}p", self.height())
    }
}

/// Options frozen for the lifetime of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadOptions {
    pub format: MediaFormat,
    pub quality: Quality,
    /// Prefer widely decodable codecs (H.264/AAC). Only affects video.
    pub compatibility_mode: bool,
}

/// Classification of a failed transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    PausedSignal,
    CancelledSignal,
    PermissionDenied,
    ContentUnavailable,
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::PausedSignal => write!(f, "paused"),
            FailureKind::CancelledSignal => write!(f, "cancelled"),
            FailureKind::PermissionDenied => write!(f, "permission denied"),
            FailureKind::ContentUnavailable => write!(f, "content unavailable"),
            FailureKind::Other => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemOutcome {
    #[default]
    Pending,
    InProgress,
    Succeeded,
    Failed(FailureKind),
    /// Transfer interrupted by a cancel request.
    Skipped,
}

impl ItemOutcome {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemOutcome::Succeeded | ItemOutcome::Failed(_) | ItemOutcome::Skipped
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Running,
    Paused,
    Cancelled,
    Finished,
}

impl Phase {
    /// Running or Paused: a worker owns the batch.
    pub fn is_active(self) -> bool {
        matches!(self, Phase::Running | Phase::Paused)
    }
}

/// Latest normalized progress for the in-flight item.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressSample {
    /// In `[0, 1]`; `None` when the engine gave nothing parseable.
    pub fraction: Option<f64>,
    pub rate: Option<String>,
    pub eta_seconds: Option<u64>,
}

impl ProgressSample {
    pub fn percent(&self) -> Option<u8> {
        self.fraction.map(|f| (f * 100.0).round().clamp(0.0, 100.0) as u8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub directory: PathBuf,
}

/// Events emitted by the orchestrator worker, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    BatchStarted {
        total: usize,
        directory: PathBuf,
    },
    ItemStarted {
        index: usize,
        total: usize,
        item: Item,
    },
    ItemProgress {
        index: usize,
        sample: ProgressSample,
    },
    ItemFinished {
        index: usize,
        outcome: ItemOutcome,
        message: Option<String>,
    },
    DirectoryChanged {
        directory: PathBuf,
    },
    BatchPaused {
        index: usize,
    },
    BatchResumed {
        index: usize,
    },
    FatalError {
        message: String,
    },
    BatchFinished(BatchSummary),
    BatchCancelled,
}
