//! Mediabatch core: data model and the pure batch-controller state machine.
mod effect;
mod model;
mod msg;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use model::{
    BatchEvent, BatchSummary, DownloadOptions, FailureKind, Item, ItemOutcome, MediaFormat, Phase,
    ProgressSample, Quality,
};
pub use msg::Msg;
pub use state::{normalize_input_url, AppState};
pub use update::{failure_message, update};
pub use view_model::{AppViewModel, ControlsView, RowView};
