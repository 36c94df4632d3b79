use std::path::PathBuf;

use crate::{BatchSummary, DownloadOptions, ItemOutcome, Phase, ProgressSample};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppViewModel {
    pub phase: Phase,
    pub url_input: String,
    pub analyzing: bool,
    pub rows: Vec<RowView>,
    pub selected_count: usize,
    pub options: DownloadOptions,
    /// Catalog index of the item currently transferring.
    pub current_row: Option<usize>,
    pub status: Option<String>,
    pub directory: Option<PathBuf>,
    pub last_summary: Option<BatchSummary>,
    pub controls: ControlsView,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowView {
    pub index: usize,
    pub title: String,
    pub source_url: String,
    pub selected: bool,
    pub outcome: Option<ItemOutcome>,
    pub progress: Option<ProgressSample>,
}

/// Which controls are enabled for the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlsView {
    pub can_analyze: bool,
    pub can_start: bool,
    pub can_pause: bool,
    pub can_resume: bool,
    pub can_cancel: bool,
}
