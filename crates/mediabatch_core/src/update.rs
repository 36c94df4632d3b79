use crate::state::normalize_input_url;
use crate::{AppState, BatchEvent, Effect, FailureKind, ItemOutcome, MediaFormat, Msg, Phase};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::UrlChanged(input) => {
            state.set_url_input(input);
            Vec::new()
        }
        Msg::AnalyzeClicked => {
            if state.phase().is_active() || state.is_analyzing() {
                return (state, Vec::new());
            }
            match normalize_input_url(state.url_input()) {
                Some(url) => {
                    state.begin_analysis();
                    state.set_status("Analyzing...");
                    vec![Effect::Analyze { url }]
                }
                None => {
                    if !state.url_input().trim().is_empty() {
                        state.set_status("Not a valid link.");
                    }
                    Vec::new()
                }
            }
        }
        Msg::CatalogReady(items) => {
            let count = items.len();
            state.install_catalog(items);
            if count == 0 {
                state.set_status("No video");
            } else {
                state.set_status(format!("{count} videos"));
            }
            Vec::new()
        }
        Msg::CatalogFailed {
            message,
            unavailable,
        } => {
            state.end_analysis();
            if unavailable {
                state.set_status(failure_message(FailureKind::ContentUnavailable));
            } else {
                state.set_status(format!("Error: {message}"));
            }
            Vec::new()
        }
        Msg::ItemToggled(index) => {
            if !state.phase().is_active() && index < state.catalog_len() {
                state.toggle_row(index);
            }
            Vec::new()
        }
        Msg::SelectAllToggled(selected) => {
            if !state.phase().is_active() {
                state.select_all(selected);
            }
            Vec::new()
        }
        Msg::FormatChosen(format) => {
            if !state.phase().is_active() {
                state.options_mut().format = format;
            }
            Vec::new()
        }
        Msg::QualityChosen(quality) => {
            if !state.phase().is_active() {
                state.options_mut().quality = quality;
            }
            Vec::new()
        }
        Msg::CompatibilityToggled(enabled) => {
            if !state.phase().is_active() {
                state.options_mut().compatibility_mode = enabled;
            }
            Vec::new()
        }
        Msg::StartClicked => {
            if state.phase().is_active() || state.is_analyzing() {
                return (state, Vec::new());
            }
            let items = state.begin_batch();
            if items.is_empty() {
                return (state, Vec::new());
            }
            let mut options = state.options();
            if options.format == MediaFormat::Audio {
                options.compatibility_mode = false;
            }
            state.set_status(format!("0 / {}", items.len()));
            vec![Effect::StartBatch { items, options }]
        }
        Msg::PauseClicked => {
            if state.phase() == Phase::Running && !state.pause_pending() {
                state.set_pause_pending(true);
                state.set_status("Pausing...");
                vec![Effect::Pause]
            } else {
                Vec::new()
            }
        }
        Msg::ResumeClicked => {
            if state.phase() == Phase::Paused || state.pause_pending() {
                state.set_pause_pending(false);
                state.set_phase(Phase::Running);
                vec![Effect::Resume]
            } else {
                Vec::new()
            }
        }
        Msg::CancelClicked => {
            if state.phase().is_active() {
                state.set_status("Cancelling...");
                vec![Effect::Cancel]
            } else {
                Vec::new()
            }
        }
        Msg::Batch(event) => {
            apply_batch_event(&mut state, event);
            Vec::new()
        }
        Msg::Tick | Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn apply_batch_event(state: &mut AppState, event: BatchEvent) {
    match event {
        BatchEvent::BatchStarted { total, directory } => {
            state.set_phase(Phase::Running);
            state.set_directory(directory);
            state.set_status(format!("0 / {total}"));
        }
        BatchEvent::ItemStarted { index, total, .. } => {
            state.apply_item_started(index);
            state.set_status(format!("{} / {}", index + 1, total));
        }
        BatchEvent::ItemProgress { index, sample } => {
            state.apply_progress(index, sample);
        }
        BatchEvent::ItemFinished {
            index,
            outcome,
            message,
        } => {
            state.apply_item_outcome(index, outcome);
            match (outcome, message) {
                (_, Some(message)) => state.set_status(message),
                (ItemOutcome::Failed(kind), None) => state.set_status(failure_message(kind)),
                _ => {}
            }
        }
        BatchEvent::DirectoryChanged { directory } => {
            state.set_status(format!(
                "Permission denied, saving to {} instead.",
                directory.display()
            ));
            state.set_directory(directory);
        }
        BatchEvent::BatchPaused { index } => {
            state.apply_item_outcome(index, ItemOutcome::Pending);
            state.set_pause_pending(false);
            state.set_phase(Phase::Paused);
            state.set_status("PAUSED");
        }
        BatchEvent::BatchResumed { index } => {
            state.set_phase(Phase::Running);
            state.set_current(Some(index));
            state.mark_dirty();
        }
        BatchEvent::FatalError { message } => {
            state.mark_fatal();
            state.set_status(format!("Error: {message}"));
        }
        BatchEvent::BatchFinished(summary) => {
            state.set_status(format!(
                "Done! {} succeeded, {} failed.",
                summary.succeeded, summary.failed
            ));
            state.finish_batch(Phase::Finished, Some(summary));
        }
        BatchEvent::BatchCancelled => {
            if !state.is_fatal() {
                state.set_status("Cancelled.");
            }
            state.finish_batch(Phase::Cancelled, None);
        }
    }
}

/// Short status text shown after a failed item.
pub fn failure_message(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::ContentUnavailable => "Private/Unavailable video detected. Skipped...",
        FailureKind::PermissionDenied => "Cannot write to the download folder. Skipped...",
        FailureKind::PausedSignal => "PAUSED",
        FailureKind::CancelledSignal => "Cancelled.",
        FailureKind::Other => "Error. Skipped...",
    }
}
