use std::path::PathBuf;

use url::Url;

use crate::view_model::{AppViewModel, ControlsView, RowView};
use crate::{BatchSummary, DownloadOptions, Item, ItemOutcome, Phase, ProgressSample};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CatalogRow {
    pub(crate) item: Item,
    pub(crate) selected: bool,
    pub(crate) outcome: Option<ItemOutcome>,
    pub(crate) progress: Option<ProgressSample>,
}

/// Caller-side state: catalog, selection, options and a mirror of the
/// orchestrator phase. Only `update` mutates it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    url_input: String,
    analyzing: bool,
    catalog: Vec<CatalogRow>,
    options: DownloadOptions,
    phase: Phase,
    pause_pending: bool,
    /// Batch index -> catalog index for the running batch.
    batch_rows: Vec<usize>,
    current: Option<usize>,
    status: Option<String>,
    directory: Option<PathBuf>,
    last_summary: Option<BatchSummary>,
    fatal: bool,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: DownloadOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn view(&self) -> AppViewModel {
        let active = self.phase.is_active();
        let selected_count = self.catalog.iter().filter(|row| row.selected).count();
        AppViewModel {
            phase: self.phase,
            url_input: self.url_input.clone(),
            analyzing: self.analyzing,
            rows: self
                .catalog
                .iter()
                .enumerate()
                .map(|(index, row)| RowView {
                    index,
                    title: row.item.title.clone(),
                    source_url: row.item.source_url.clone(),
                    selected: row.selected,
                    outcome: row.outcome,
                    progress: row.progress.clone(),
                })
                .collect(),
            selected_count,
            options: self.options,
            current_row: self.current_row(),
            status: self.status.clone(),
            directory: self.directory.clone(),
            last_summary: self.last_summary.clone(),
            controls: ControlsView {
                can_analyze: !active && !self.analyzing,
                can_start: !active && !self.analyzing && selected_count > 0,
                can_pause: self.phase == Phase::Running && !self.pause_pending,
                can_resume: self.phase == Phase::Paused,
                can_cancel: active,
            },
            dirty: self.dirty,
        }
    }

    /// Returns whether a render is needed and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
        self.dirty = true;
    }

    pub(crate) fn url_input(&self) -> &str {
        &self.url_input
    }

    pub(crate) fn set_url_input(&mut self, input: String) {
        if self.url_input != input {
            self.url_input = input;
            self.dirty = true;
        }
    }

    pub(crate) fn is_analyzing(&self) -> bool {
        self.analyzing
    }

    pub(crate) fn begin_analysis(&mut self) {
        self.analyzing = true;
        self.catalog.clear();
        self.last_summary = None;
        self.dirty = true;
    }

    pub(crate) fn install_catalog(&mut self, items: Vec<Item>) {
        self.analyzing = false;
        self.catalog = items
            .into_iter()
            .map(|item| CatalogRow {
                item,
                selected: true,
                outcome: None,
                progress: None,
            })
            .collect();
        self.dirty = true;
    }

    pub(crate) fn end_analysis(&mut self) {
        self.analyzing = false;
        self.dirty = true;
    }

    pub(crate) fn catalog_len(&self) -> usize {
        self.catalog.len()
    }

    pub(crate) fn toggle_row(&mut self, index: usize) {
        if let Some(row) = self.catalog.get_mut(index) {
            row.selected = !row.selected;
            self.dirty = true;
        }
    }

    pub(crate) fn select_all(&mut self, selected: bool) {
        for row in &mut self.catalog {
            row.selected = selected;
        }
        self.dirty = true;
    }

    pub(crate) fn options_mut(&mut self) -> &mut DownloadOptions {
        self.dirty = true;
        &mut self.options
    }

    /// Freezes the selection into a batch and returns the items in catalog order.
    pub(crate) fn begin_batch(&mut self) -> Vec<Item> {
        self.batch_rows = self
            .catalog
            .iter()
            .enumerate()
            .filter(|(_, row)| row.selected)
            .map(|(index, _)| index)
            .collect();
        let mut items = Vec::with_capacity(self.batch_rows.len());
        for &index in &self.batch_rows {
            let row = &mut self.catalog[index];
            row.outcome = Some(ItemOutcome::Pending);
            row.progress = None;
            items.push(row.item.clone());
        }
        if !items.is_empty() {
            self.phase = Phase::Running;
            self.pause_pending = false;
            self.fatal = false;
            self.current = None;
            self.last_summary = None;
            self.dirty = true;
        }
        items
    }

    pub(crate) fn options(&self) -> DownloadOptions {
        self.options
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            self.phase = phase;
            self.dirty = true;
        }
    }

    pub(crate) fn pause_pending(&self) -> bool {
        self.pause_pending
    }

    pub(crate) fn set_pause_pending(&mut self, pending: bool) {
        self.pause_pending = pending;
        self.dirty = true;
    }

    pub(crate) fn set_directory(&mut self, directory: PathBuf) {
        self.directory = Some(directory);
        self.dirty = true;
    }

    pub(crate) fn set_current(&mut self, index: Option<usize>) {
        self.current = index;
        self.dirty = true;
    }

    fn current_row(&self) -> Option<usize> {
        self.current
            .and_then(|index| self.batch_rows.get(index).copied())
    }

    fn row_for_batch_index(&mut self, index: usize) -> Option<&mut CatalogRow> {
        let catalog_index = *self.batch_rows.get(index)?;
        self.catalog.get_mut(catalog_index)
    }

    pub(crate) fn apply_item_started(&mut self, index: usize) {
        if let Some(row) = self.row_for_batch_index(index) {
            row.outcome = Some(ItemOutcome::InProgress);
            row.progress = Some(ProgressSample {
                fraction: Some(0.0),
                ..ProgressSample::default()
            });
        }
        self.set_current(Some(index));
    }

    pub(crate) fn apply_progress(&mut self, index: usize, sample: ProgressSample) {
        if let Some(row) = self.row_for_batch_index(index) {
            row.progress = Some(sample);
            self.dirty = true;
        }
    }

    pub(crate) fn apply_item_outcome(&mut self, index: usize, outcome: ItemOutcome) {
        if let Some(row) = self.row_for_batch_index(index) {
            row.outcome = Some(outcome);
            if outcome == ItemOutcome::Succeeded {
                row.progress = Some(ProgressSample {
                    fraction: Some(1.0),
                    ..ProgressSample::default()
                });
            }
            // Processed rows are unchecked so a re-run only picks up what is left.
            if outcome.is_terminal() {
                row.selected = false;
            }
            self.dirty = true;
        }
    }

    pub(crate) fn mark_fatal(&mut self) {
        self.fatal = true;
    }

    pub(crate) fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub(crate) fn finish_batch(&mut self, phase: Phase, summary: Option<BatchSummary>) {
        self.phase = phase;
        self.pause_pending = false;
        self.current = None;
        if let Some(summary) = summary {
            self.directory = Some(summary.directory.clone());
            self.last_summary = Some(summary);
        }
        self.dirty = true;
    }
}

/// Normalizes the text typed into the link box.
///
/// Bare hosts get an `https://` scheme; anything that still does not parse as
/// an http(s) URL is rejected.
pub fn normalize_input_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("https://{trimmed}")).ok()?
        }
        Err(_) => return None,
    };
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }
    Some(parsed.to_string())
}
