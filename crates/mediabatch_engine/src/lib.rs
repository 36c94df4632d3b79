//! Mediabatch engine: batch orchestration and the external download engine.
mod catalog;
mod classify;
mod media;
mod orchestrator;
mod progress;
mod storage;
mod types;

pub use catalog::{CatalogEvent, CatalogHandle};
pub use classify::{analysis_error_from_stderr, classify, classify_message, Classification};
pub use media::{
    format_args, items_from_json, parse_progress_line, MediaEngine, YtDlpEngine, YtDlpSettings,
};
pub use orchestrator::{Orchestrator, OrchestratorSettings, QueueEntry};
pub use progress::{normalize, parse_percent, strip_ansi, Flow, ProgressSink, RawProgress};
pub use storage::{
    default_download_dir, default_fallback_dirs, ensure_writable, DirectoryResolver, StorageError,
};
pub use types::{AnalysisError, EngineErrorCode, OrchestratorError, TransferError, TransferRequest};
