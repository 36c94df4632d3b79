use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use batch_logging::{batch_debug, batch_info, batch_trace, batch_warn};
use mediabatch_core::{DownloadOptions, Item, MediaFormat};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::classify::{analysis_error_from_stderr, last_error_line};
use crate::progress::{Flow, ProgressSink, RawProgress};
use crate::storage::ensure_writable;
use crate::{AnalysisError, TransferError, TransferRequest};

const PROGRESS_MARKER: &str = "mediabatch-progress:";
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
const STDERR_TAIL_LINES: usize = 20;

/// The external extraction/download engine.
#[async_trait::async_trait]
pub trait MediaEngine: Send + Sync {
    /// Enumerates the items behind `url`: one for a single video, 1..N for a collection.
    async fn analyze(&self, url: &str) -> Result<Vec<Item>, AnalysisError>;

    /// Downloads one item into `request.directory`, reporting through `sink`.
    async fn download(
        &self,
        request: &TransferRequest,
        sink: &dyn ProgressSink,
    ) -> Result<(), TransferError>;
}

#[derive(Debug, Clone)]
pub struct YtDlpSettings {
    /// Program name or path; looked up on `PATH` when relative.
    pub program: PathBuf,
    /// How often a silent transfer checks for pause/cancel.
    pub stop_poll_interval: Duration,
    pub ffmpeg_location: Option<PathBuf>,
    pub extra_args: Vec<String>,
}

impl Default for YtDlpSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
            stop_poll_interval: Duration::from_millis(200),
            ffmpeg_location: None,
            extra_args: Vec::new(),
        }
    }
}

/// `MediaEngine` backed by the yt-dlp command line tool.
#[derive(Debug, Clone, Default)]
pub struct YtDlpEngine {
    settings: YtDlpSettings,
}

impl YtDlpEngine {
    pub fn new(settings: YtDlpSettings) -> Self {
        Self { settings }
    }

    fn locate(&self) -> Result<PathBuf, String> {
        which::which(&self.settings.program)
            .map_err(|err| format!("{}: {err}", self.settings.program.display()))
    }

    fn download_command(&self, program: &Path, request: &TransferRequest) -> Command {
        let mut cmd = Command::new(program);
        cmd.arg("--newline")
            .arg("--no-playlist")
            .arg("--progress-template")
            .arg(format!("download:{PROGRESS_MARKER}%(progress)j"))
            .arg("--output")
            .arg(request.directory.join(OUTPUT_TEMPLATE))
            .args(format_args(&request.options));
        if let Some(ffmpeg) = &self.settings.ffmpeg_location {
            cmd.arg("--ffmpeg-location").arg(ffmpeg);
        }
        cmd.args(&self.settings.extra_args)
            .arg("--")
            .arg(&request.source_url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait::async_trait]
impl MediaEngine for YtDlpEngine {
    async fn analyze(&self, url: &str) -> Result<Vec<Item>, AnalysisError> {
        let program = self.locate().map_err(AnalysisError::EngineUnavailable)?;
        batch_info!("Analyzing {}", url);
        let output = Command::new(&program)
            .arg("--flat-playlist")
            .arg("--dump-single-json")
            .arg("--no-warnings")
            .args(&self.settings.extra_args)
            .arg("--")
            .arg(url)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| AnalysisError::EngineUnavailable(err.to_string()))?;

        if !output.status.success() {
            return Err(analysis_error_from_stderr(&String::from_utf8_lossy(
                &output.stderr,
            )));
        }
        items_from_json(&String::from_utf8_lossy(&output.stdout))
    }

    async fn download(
        &self,
        request: &TransferRequest,
        sink: &dyn ProgressSink,
    ) -> Result<(), TransferError> {
        let program = self.locate().map_err(TransferError::EngineUnavailable)?;
        ensure_writable(&request.directory)?;

        let mut child = self
            .download_command(&program, request)
            .spawn()
            .map_err(|err| TransferError::EngineUnavailable(err.to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransferError::engine("engine stdout unavailable"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TransferError::engine("engine stderr unavailable"))?;

        let mut out_lines = BufReader::new(stdout).split(b'\n');
        let mut err_lines = BufReader::new(stderr).split(b'\n');
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut ticker = tokio::time::interval(self.settings.stop_poll_interval);
        let mut stdout_done = false;
        let mut stderr_done = false;
        let mut stopped = false;
        let mut read_error: Option<std::io::Error> = None;

        while !(stdout_done && stderr_done) {
            tokio::select! {
                segment = out_lines.next_segment(), if !stdout_done => match segment {
                    Ok(Some(bytes)) => {
                        let line = decode_line(&bytes);
                        if let Some(raw) = parse_progress_line(&line) {
                            if !stopped && sink.report(&raw) == Flow::Stop {
                                stopped = true;
                                let _ = child.start_kill();
                            }
                        } else {
                            batch_trace!("yt-dlp: {}", line);
                        }
                    }
                    Ok(None) => stdout_done = true,
                    Err(err) => {
                        // An undrained pipe would block the child forever.
                        stdout_done = true;
                        let _ = child.start_kill();
                        read_error.get_or_insert(err);
                    }
                },
                segment = err_lines.next_segment(), if !stderr_done => match segment {
                    Ok(Some(bytes)) => {
                        if stderr_tail.len() == STDERR_TAIL_LINES {
                            stderr_tail.pop_front();
                        }
                        stderr_tail.push_back(decode_line(&bytes));
                    }
                    Ok(None) => stderr_done = true,
                    Err(err) => {
                        stderr_done = true;
                        let _ = child.start_kill();
                        read_error.get_or_insert(err);
                    }
                },
                _ = ticker.tick() => {
                    if !stopped && sink.should_stop() {
                        stopped = true;
                        let _ = child.start_kill();
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|err| TransferError::engine(err.to_string()))?;
        if stopped {
            batch_debug!("Transfer of {} stopped", request.source_url);
            return Err(TransferError::Stopped);
        }
        if let Some(err) = read_error {
            batch_warn!("Lost yt-dlp output for {}: {}", request.source_url, err);
            return Err(TransferError::engine(format!("reading engine output: {err}")));
        }
        if status.success() {
            return Ok(());
        }
        let stderr_text = Vec::from(stderr_tail).join("\n");
        let message = last_error_line(&stderr_text);
        batch_warn!("yt-dlp failed ({}): {}", status, message);
        Err(TransferError::engine(message))
    }
}

/// yt-dlp format arguments for the batch options.
pub fn format_args(options: &DownloadOptions) -> Vec<String> {
    match options.format {
        MediaFormat::Audio => vec![
            "--format".to_string(),
            "bestaudio/best".to_string(),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            "mp3".to_string(),
            "--audio-quality".to_string(),
            "192K".to_string(),
        ],
        MediaFormat::Video => {
            let h = options.quality.height();
            let selector = if options.compatibility_mode {
                format!(
                    "bestvideo[height<={h}][vcodec^=avc1]+bestaudio[ext=m4a]/\
                     bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/\
                     best[height<={h}][ext=mp4]/best[height<={h}]"
                )
            } else {
                format!(
                    "bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/\
                     best[height<={h}][ext=mp4]/best[height<={h}]"
                )
            };
            vec![
                "--format".to_string(),
                selector,
                "--merge-output-format".to_string(),
                "mp4".to_string(),
            ]
        }
    }
}

/// Decodes one raw output line; the engine may print in a legacy code page.
fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Parses one stdout line produced by the progress template.
///
/// Lines without the marker, or with malformed JSON, yield `None`.
pub fn parse_progress_line(line: &str) -> Option<RawProgress> {
    let idx = line.find(PROGRESS_MARKER)?;
    let payload = line[idx + PROGRESS_MARKER.len()..].trim();
    serde_json::from_str(payload).ok()
}

#[derive(Debug, Deserialize)]
struct FlatInfo {
    #[serde(default)]
    entries: Option<Vec<Option<FlatEntry>>>,
    #[serde(flatten)]
    entry: FlatEntry,
}

#[derive(Debug, Default, Deserialize)]
struct FlatEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    ie_key: Option<String>,
    extractor_key: Option<String>,
}

impl FlatEntry {
    fn is_youtube(&self) -> bool {
        self.ie_key
            .as_deref()
            .or(self.extractor_key.as_deref())
            .is_some_and(|key| key.to_ascii_lowercase().starts_with("youtube"))
    }

    fn source_url(&self) -> Option<String> {
        if self.is_youtube() {
            if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
                return Some(format!("https://www.youtube.com/watch?v={id}"));
            }
        }
        self.webpage_url
            .as_deref()
            .or(self.url.as_deref())
            .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
            .map(ToOwned::to_owned)
    }

    fn into_item(self) -> Option<Item> {
        let Some(source_url) = self.source_url() else {
            batch_warn!("Skipping catalog entry without a usable URL: {:?}", self.id);
            return None;
        };
        Some(Item {
            title: self
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Untitled".to_string()),
            stable_id: self.id,
            source_url,
        })
    }
}

/// Maps `--dump-single-json` output to catalog items.
pub fn items_from_json(json: &str) -> Result<Vec<Item>, AnalysisError> {
    let info: FlatInfo = serde_json::from_str(json)
        .map_err(|err| AnalysisError::Other(format!("unreadable engine output: {err}")))?;
    let items: Vec<Item> = match info.entries {
        Some(entries) => entries
            .into_iter()
            .flatten()
            .filter_map(FlatEntry::into_item)
            .collect(),
        None => info.entry.into_item().into_iter().collect(),
    };
    if items.is_empty() {
        return Err(AnalysisError::ContentUnavailable(
            "no downloadable items found".to_string(),
        ));
    }
    Ok(items)
}
