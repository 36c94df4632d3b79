//! Plain-text rendering of the view model.

use mediabatch_core::{AppViewModel, FailureKind, ItemOutcome, MediaFormat, Phase, RowView};

/// Catalog table, one line per row, numbered from 1.
pub fn catalog_lines(view: &AppViewModel) -> Vec<String> {
    if view.rows.is_empty() {
        return vec!["No catalog. Type 'analyze <url>'.".to_string()];
    }
    let mut lines: Vec<String> = view
        .rows
        .iter()
        .map(|row| row_line(row, view.current_row == Some(row.index)))
        .collect();
    lines.push(format!(
        "{} of {} checked | {}",
        view.selected_count,
        view.rows.len(),
        options_line(view)
    ));
    lines
}

fn row_line(row: &RowView, current: bool) -> String {
    let check = if row.selected { "[x]" } else { "[ ]" };
    let marker = if current { ">" } else { " " };
    let mut line = format!("{marker}{check} {:>3}. {}", row.index + 1, row.title);
    if let Some(outcome) = row.outcome {
        line.push_str(&format!("  ({})", outcome_label(outcome)));
    }
    line
}

pub fn outcome_label(outcome: ItemOutcome) -> &'static str {
    match outcome {
        ItemOutcome::Pending => "pending",
        ItemOutcome::InProgress => "downloading",
        ItemOutcome::Succeeded => "done",
        ItemOutcome::Failed(FailureKind::ContentUnavailable) => "unavailable",
        ItemOutcome::Failed(FailureKind::PermissionDenied) => "permission denied",
        ItemOutcome::Failed(_) => "failed",
        ItemOutcome::Skipped => "skipped",
    }
}

fn options_line(view: &AppViewModel) -> String {
    let options = view.options;
    match options.format {
        MediaFormat::Audio => "audio (mp3)".to_string(),
        MediaFormat::Video if options.compatibility_mode => {
            format!("video {} compatible", options.quality)
        }
        MediaFormat::Video => format!("video {}", options.quality),
    }
}

pub fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Idle => "idle",
        Phase::Running => "running",
        Phase::Paused => "paused",
        Phase::Cancelled => "cancelled",
        Phase::Finished => "finished",
    }
}

/// The status line: phase plus the controller's latest status text.
pub fn status_line(view: &AppViewModel) -> Option<String> {
    let status = view.status.as_deref()?;
    Some(format!("[{}] {status}", phase_label(view.phase)))
}

/// Progress of the row in flight, e.g. `Two  42% 1.20MiB/s ETA 0:07`.
pub fn progress_line(view: &AppViewModel) -> Option<String> {
    let row = view.rows.get(view.current_row?)?;
    let progress = row.progress.as_ref()?;
    let mut line = match progress.percent() {
        Some(percent) => format!("{}  {percent:>3}%", row.title),
        None => format!("{}  ...", row.title),
    };
    if let Some(rate) = &progress.rate {
        line.push(' ');
        line.push_str(rate);
    }
    if let Some(eta) = progress.eta_seconds {
        line.push_str(&format!(" ETA {}", clock(eta)));
    }
    Some(line)
}

fn clock(seconds: u64) -> String {
    let (h, m, s) = (seconds / 3600, seconds / 60 % 60, seconds % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

/// What changed since the previous render.
#[derive(Debug, Default, PartialEq)]
pub struct Frame {
    /// Lines to print in full.
    pub lines: Vec<String>,
    /// Progress of the item in flight; may overwrite the previous one.
    pub progress: Option<String>,
}

/// Remembers what was last printed so repeated renders only show changes.
#[derive(Debug, Default)]
pub struct Renderer {
    last_status: Option<String>,
    last_progress: Option<String>,
    last_catalog: Vec<String>,
}

impl Renderer {
    pub fn frame(&mut self, view: &AppViewModel) -> Frame {
        let mut frame = Frame::default();

        // A fresh catalog is shown in full; later row changes only via `list`.
        if !view.rows.is_empty() && !view.analyzing {
            let urls: Vec<String> = view.rows.iter().map(|row| row.source_url.clone()).collect();
            if urls != self.last_catalog {
                frame.lines.extend(catalog_lines(view));
                self.last_catalog = urls;
            }
        }

        let status = status_line(view);
        if status.is_some() && status != self.last_status {
            frame.lines.extend(status.clone());
            self.last_status = status;
        }

        let progress = progress_line(view);
        if progress != self.last_progress {
            frame.progress = progress.clone();
        }
        self.last_progress = progress;
        frame
    }
}
