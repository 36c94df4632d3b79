//! Progress normalization and the cooperative stop check point.

use std::sync::LazyLock;

use mediabatch_core::ProgressSample;
use regex::Regex;
use serde::Deserialize;

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]").expect("ANSI regex is valid") // Static pattern, safe to panic
});

/// Progress event as reported by the engine.
///
/// Field names follow yt-dlp's progress dictionary so the JSON emitted by its
/// progress template deserializes directly.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawProgress {
    pub status: Option<String>,
    pub downloaded_bytes: Option<f64>,
    pub total_bytes: Option<f64>,
    pub total_bytes_estimate: Option<f64>,
    #[serde(rename = "_percent_str")]
    pub percent_str: Option<String>,
    #[serde(rename = "_speed_str")]
    pub speed_str: Option<String>,
    #[serde(rename = "_eta_str")]
    pub eta_str: Option<String>,
    /// Bytes per second.
    pub speed: Option<f64>,
    /// Seconds.
    pub eta: Option<f64>,
}

impl RawProgress {
    pub fn bytes(downloaded: u64, total: u64) -> Self {
        Self {
            status: Some("downloading".to_string()),
            downloaded_bytes: Some(downloaded as f64),
            total_bytes: Some(total as f64),
            ..Self::default()
        }
    }

    pub fn percent(text: impl Into<String>) -> Self {
        Self {
            status: Some("downloading".to_string()),
            percent_str: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Receives progress from an in-flight transfer.
///
/// Both methods are check points: when either says stop, the engine must
/// abandon the transfer and return `TransferError::Stopped`.
pub trait ProgressSink: Send + Sync {
    fn report(&self, raw: &RawProgress) -> Flow;

    /// Polled by engines while the transfer is silent.
    fn should_stop(&self) -> bool;
}

/// Normalizes a raw event. Never fails; unparseable parts become unknown.
pub fn normalize(raw: &RawProgress) -> ProgressSample {
    ProgressSample {
        fraction: fraction(raw),
        rate: rate(raw),
        eta_seconds: eta_seconds(raw),
    }
}

fn fraction(raw: &RawProgress) -> Option<f64> {
    let total = positive(raw.total_bytes).or_else(|| positive(raw.total_bytes_estimate));
    let downloaded = raw.downloaded_bytes.filter(|d| d.is_finite() && *d >= 0.0);
    if let (Some(downloaded), Some(total)) = (downloaded, total) {
        return Some((downloaded / total).clamp(0.0, 1.0));
    }
    raw.percent_str.as_deref().and_then(parse_percent)
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

/// Parses `" 37.5%"`, with or without terminal color codes, into `0.375`.
pub fn parse_percent(text: &str) -> Option<f64> {
    let cleaned = strip_ansi(text);
    let number = cleaned.trim().trim_end_matches('%').trim();
    let value: f64 = number.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some((value / 100.0).clamp(0.0, 1.0))
}

fn rate(raw: &RawProgress) -> Option<String> {
    if let Some(text) = raw.speed_str.as_deref() {
        let cleaned = strip_ansi(text);
        let cleaned = cleaned.trim();
        if !cleaned.is_empty() && !is_placeholder(cleaned) {
            return Some(cleaned.to_string());
        }
    }
    positive(raw.speed).map(format_rate)
}

fn eta_seconds(raw: &RawProgress) -> Option<u64> {
    if let Some(eta) = raw.eta.filter(|e| e.is_finite() && *e >= 0.0) {
        return Some(eta.round() as u64);
    }
    raw.eta_str
        .as_deref()
        .and_then(|text| parse_clock(strip_ansi(text).trim()))
}

fn is_placeholder(text: &str) -> bool {
    matches!(text, "N/A" | "Unknown" | "Unknown speed" | "-")
}

/// `"1:02:03"`, `"02:03"` or `"3"` into seconds.
fn parse_clock(text: &str) -> Option<u64> {
    if text.is_empty() || is_placeholder(text) {
        return None;
    }
    let mut total = 0u64;
    let mut parts = 0;
    for part in text.split(':') {
        parts += 1;
        if parts > 3 {
            return None;
        }
        let value: u64 = part.trim().parse().ok()?;
        total = total.checked_mul(60)?.checked_add(value)?;
    }
    Some(total)
}

fn format_rate(bytes_per_sec: f64) -> String {
    const UNITS: [&str; 4] = ["B/s", "KiB/s", "MiB/s", "GiB/s"];
    let mut value = bytes_per_sec;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2}{}", UNITS[unit])
}

/// Removes ANSI escape sequences (`ESC [ ... final-byte`).
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}
