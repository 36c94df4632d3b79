//! Maps transfer failures onto the orchestrator's failure classes.
//!
//! Structured signals win: the stop flag, storage errors raised before the
//! engine runs, and engine error codes. Message matching is the last resort
//! because the engine's wording is not a stable contract.

use mediabatch_core::{FailureKind, Phase};

use crate::{AnalysisError, EngineErrorCode, TransferError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The engine itself is missing or unusable; aborts the whole batch.
    Fatal(String),
    Failure(FailureKind),
}

const PERMISSION_PATTERNS: &[&str] = &[
    "permission denied",
    "eacces",
    "errno 13",
    "read-only file system",
    "erofs",
    "unable to open for writing",
];

const UNAVAILABLE_PATTERNS: &[&str] = &[
    "private video",
    "sign in",
    "video unavailable",
    "this video is unavailable",
    "is not available",
    "not available in your country",
    "has been removed",
    "members-only",
    "account associated with this video has been terminated",
    "http error 404",
    "http error 410",
];

/// Classifies a failed attempt. `phase` is the phase observed when the
/// transfer returned and disambiguates a stop signal.
pub fn classify(err: &TransferError, phase: Phase) -> Classification {
    match err {
        TransferError::Stopped => Classification::Failure(match phase {
            Phase::Cancelled => FailureKind::CancelledSignal,
            // A resume can land between the stop and this check; retry the item.
            Phase::Paused | Phase::Running => FailureKind::PausedSignal,
            Phase::Idle | Phase::Finished => FailureKind::CancelledSignal,
        }),
        TransferError::EngineUnavailable(message) => Classification::Fatal(message.clone()),
        TransferError::Storage { .. } => Classification::Failure(FailureKind::PermissionDenied),
        TransferError::Engine {
            code: Some(code), ..
        } => Classification::Failure(match code {
            EngineErrorCode::ContentUnavailable => FailureKind::ContentUnavailable,
            EngineErrorCode::PermissionDenied => FailureKind::PermissionDenied,
            EngineErrorCode::Network | EngineErrorCode::Unsupported => FailureKind::Other,
        }),
        TransferError::Engine {
            code: None,
            message,
        } => Classification::Failure(classify_message(message)),
    }
}

/// String matching over engine output.
pub fn classify_message(message: &str) -> FailureKind {
    let lowered = message.to_ascii_lowercase();
    if PERMISSION_PATTERNS.iter().any(|p| lowered.contains(p)) {
        FailureKind::PermissionDenied
    } else if UNAVAILABLE_PATTERNS.iter().any(|p| lowered.contains(p)) {
        FailureKind::ContentUnavailable
    } else {
        FailureKind::Other
    }
}

/// Builds an analysis error from the engine's stderr.
pub fn analysis_error_from_stderr(stderr: &str) -> AnalysisError {
    let message = last_error_line(stderr);
    match classify_message(&message) {
        FailureKind::ContentUnavailable => AnalysisError::ContentUnavailable(message),
        _ => AnalysisError::Other(message),
    }
}

/// Last `ERROR:` line, or the last non-empty line when none is tagged.
pub(crate) fn last_error_line(output: &str) -> String {
    let mut last_line = None;
    let mut last_error = None;
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(rest) = line.strip_prefix("ERROR:") {
            last_error = Some(rest.trim());
        }
        last_line = Some(line);
    }
    last_error
        .or(last_line)
        .unwrap_or("engine exited without output")
        .to_string()
}
