use std::io;
use std::path::PathBuf;

use mediabatch_core::DownloadOptions;
use thiserror::Error;

/// Everything the external engine needs to fetch one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub source_url: String,
    pub title: String,
    pub directory: PathBuf,
    pub options: DownloadOptions,
}

/// Structured failure codes an engine may attach to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorCode {
    ContentUnavailable,
    PermissionDenied,
    Network,
    Unsupported,
}

#[derive(Debug, Error)]
pub enum TransferError {
    /// The progress sink asked the transfer to stop.
    #[error("transfer stopped on request")]
    Stopped,
    #[error("download engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("cannot write to {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{message}")]
    Engine {
        code: Option<EngineErrorCode>,
        message: String,
    },
}

impl TransferError {
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: EngineErrorCode, message: impl Into<String>) -> Self {
        Self::Engine {
            code: Some(code),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("content unavailable: {0}")]
    ContentUnavailable(String),
    #[error("download engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error("a batch is already running")]
    BatchActive,
    #[error("failed to spawn batch worker: {0}")]
    Spawn(String),
}
