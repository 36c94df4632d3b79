use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};

use mediabatch_core::{BatchEvent, DownloadOptions, FailureKind, Item, ItemOutcome, Phase};
use mediabatch_engine::{
    AnalysisError, DirectoryResolver, EngineErrorCode, Flow, MediaEngine, Orchestrator,
    OrchestratorError, OrchestratorSettings, ProgressSink, RawProgress, TransferError,
    TransferRequest,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const STEP: Duration = Duration::from_millis(5);
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(batch_logging::initialize_for_tests);
}

#[derive(Clone)]
enum Script {
    /// Reports `steps` progress samples, then succeeds.
    Succeed { steps: usize },
    /// Fails with a structured engine code.
    FailCode(EngineErrorCode),
    /// Fails with only a message for the classifier to read.
    FailMessage(&'static str),
    /// Reports progress until told to stop on the first attempt, succeeds afterwards.
    BlockFirstAttempt,
    /// Reports progress until told to stop, on every attempt.
    Endless,
    /// Storage failure whenever the target directory is in the list.
    DenyDirs(Vec<PathBuf>),
    /// Engine write failure, reported only as stderr text, in this directory.
    RefuseWriteIn(PathBuf),
    /// First attempt holds on to the stop for `hold` before returning it.
    LingerAfterStop { hold: Duration },
    Missing,
}

#[derive(Default)]
struct FakeEngine {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<(String, PathBuf)>>,
    stop_seen: AtomicBool,
}

impl FakeEngine {
    fn new(scripts: &[(&str, Script)]) -> Arc<Self> {
        Arc::new(Self {
            scripts: scripts
                .iter()
                .map(|(url, script)| (url.to_string(), script.clone()))
                .collect(),
            calls: Mutex::new(Vec::new()),
            stop_seen: AtomicBool::new(false),
        })
    }

    fn calls_for(&self, url: &str) -> Vec<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(called, _)| called == url)
            .map(|(_, dir)| dir.clone())
            .collect()
    }
}

async fn report_until_stopped(sink: &dyn ProgressSink) -> TransferError {
    let mut done = 0u64;
    loop {
        done += 1;
        if sink.report(&RawProgress::bytes(done, 1_000_000)) == Flow::Stop {
            return TransferError::Stopped;
        }
        tokio::time::sleep(STEP).await;
    }
}

#[async_trait::async_trait]
impl MediaEngine for FakeEngine {
    async fn analyze(&self, url: &str) -> Result<Vec<Item>, AnalysisError> {
        Ok(vec![Item::new(url, url)])
    }

    async fn download(
        &self,
        request: &TransferRequest,
        sink: &dyn ProgressSink,
    ) -> Result<(), TransferError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((request.source_url.clone(), request.directory.clone()));
            calls
                .iter()
                .filter(|(url, _)| *url == request.source_url)
                .count()
        };
        let script = self
            .scripts
            .get(&request.source_url)
            .cloned()
            .unwrap_or(Script::Succeed { steps: 2 });
        match script {
            Script::Succeed { steps } => {
                for step in 1..=steps {
                    if sink.report(&RawProgress::bytes(step as u64, steps as u64)) == Flow::Stop {
                        return Err(TransferError::Stopped);
                    }
                    tokio::time::sleep(STEP).await;
                }
                Ok(())
            }
            Script::FailCode(code) => Err(TransferError::with_code(code, "scripted failure")),
            Script::FailMessage(message) => Err(TransferError::engine(message)),
            Script::BlockFirstAttempt if attempt == 1 => Err(report_until_stopped(sink).await),
            Script::BlockFirstAttempt => Ok(()),
            Script::Endless => Err(report_until_stopped(sink).await),
            Script::DenyDirs(denied) => {
                if denied.iter().any(|dir| dir == &request.directory) {
                    Err(TransferError::Storage {
                        path: request.directory.clone(),
                        source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
                    })
                } else {
                    Ok(())
                }
            }
            Script::RefuseWriteIn(dir) if dir == request.directory => {
                Err(TransferError::engine(format!(
                    "ERROR: unable to open for writing: [Errno 13] Permission denied: '{}'",
                    dir.join("clip.mp4").display()
                )))
            }
            Script::RefuseWriteIn(_) => Ok(()),
            Script::LingerAfterStop { hold } if attempt == 1 => {
                let err = report_until_stopped(sink).await;
                self.stop_seen.store(true, Ordering::SeqCst);
                tokio::time::sleep(hold).await;
                Err(err)
            }
            Script::LingerAfterStop { .. } => Ok(()),
            Script::Missing => Err(TransferError::EngineUnavailable("yt-dlp: not found".into())),
        }
    }
}

fn items(urls: &[&str]) -> Vec<Item> {
    urls.iter()
        .map(|url| Item::new(url.to_uppercase(), *url))
        .collect()
}

fn orchestrator(engine: Arc<FakeEngine>, fallbacks: Vec<PathBuf>) -> Orchestrator {
    Orchestrator::new(
        engine,
        DirectoryResolver::new(fallbacks),
        OrchestratorSettings {
            settle_delay: Duration::ZERO,
        },
    )
}

fn next_event(orch: &Orchestrator) -> BatchEvent {
    orch.recv_timeout(EVENT_TIMEOUT)
        .expect("orchestrator went silent")
}

/// Collects events until `stop` matches (inclusive).
fn events_until(orch: &Orchestrator, stop: impl Fn(&BatchEvent) -> bool) -> Vec<BatchEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(orch);
        let done = stop(&event);
        events.push(event);
        if done {
            return events;
        }
    }
}

fn is_terminal(event: &BatchEvent) -> bool {
    matches!(
        event,
        BatchEvent::BatchFinished(_) | BatchEvent::BatchCancelled
    )
}

fn started_indices(events: &[BatchEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|event| match event {
            BatchEvent::ItemStarted { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}

fn outcomes(orch: &mut Orchestrator) -> Vec<ItemOutcome> {
    orch.wait()
        .expect("worker result")
        .into_iter()
        .map(|entry| entry.outcome)
        .collect()
}

#[test]
fn empty_selection_is_a_noop() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let mut orch = orchestrator(FakeEngine::new(&[]), Vec::new());

    let started = orch
        .start_batch(Vec::new(), DownloadOptions::default(), temp.path().into())
        .unwrap();

    assert!(!started);
    assert_eq!(orch.phase(), Phase::Idle);
    assert!(orch.recv_timeout(Duration::from_millis(50)).is_none());
}

#[test]
fn private_item_is_skipped_and_batch_finishes() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let engine = FakeEngine::new(&[(
        "b",
        Script::FailMessage("ERROR: [youtube] b: Private video. Sign in if you've been granted access"),
    )]);
    let mut orch = orchestrator(engine, Vec::new());

    orch.start_batch(items(&["a", "b", "c"]), DownloadOptions::default(), temp.path().into())
        .unwrap();
    let events = events_until(&orch, is_terminal);

    assert_eq!(
        outcomes(&mut orch),
        vec![
            ItemOutcome::Succeeded,
            ItemOutcome::Failed(FailureKind::ContentUnavailable),
            ItemOutcome::Succeeded,
        ]
    );
    assert_eq!(orch.phase(), Phase::Finished);
    assert_eq!(started_indices(&events), vec![0, 1, 2]);
    match events.last() {
        Some(BatchEvent::BatchFinished(summary)) => {
            assert_eq!(summary.succeeded, 2);
            assert_eq!(summary.failed, 1);
            assert_eq!(summary.directory, temp.path());
        }
        other => panic!("unexpected terminal event {other:?}"),
    }
}

#[test]
fn structured_failures_do_not_stop_later_items() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let engine = FakeEngine::new(&[
        ("a", Script::FailCode(EngineErrorCode::ContentUnavailable)),
        ("b", Script::FailCode(EngineErrorCode::Network)),
    ]);
    let mut orch = orchestrator(engine, Vec::new());

    orch.start_batch(items(&["a", "b", "c"]), DownloadOptions::default(), temp.path().into())
        .unwrap();
    let events = events_until(&orch, is_terminal);

    assert_eq!(
        outcomes(&mut orch),
        vec![
            ItemOutcome::Failed(FailureKind::ContentUnavailable),
            ItemOutcome::Failed(FailureKind::Other),
            ItemOutcome::Succeeded,
        ]
    );
    let messages: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            BatchEvent::ItemFinished {
                message: Some(message),
                ..
            } => Some(message.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(messages.len(), 2);
}

#[test]
fn progress_events_carry_normalized_samples() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let engine = FakeEngine::new(&[("a", Script::Succeed { steps: 4 })]);
    let mut orch = orchestrator(engine, Vec::new());

    orch.start_batch(items(&["a"]), DownloadOptions::default(), temp.path().into())
        .unwrap();
    let events = events_until(&orch, is_terminal);

    let fractions: Vec<f64> = events
        .iter()
        .filter_map(|event| match event {
            BatchEvent::ItemProgress { index: 0, sample } => sample.fraction,
            _ => None,
        })
        .collect();
    assert_eq!(fractions, vec![0.25, 0.5, 0.75, 1.0]);
    assert_eq!(outcomes(&mut orch), vec![ItemOutcome::Succeeded]);
}

#[test]
fn pause_retries_the_interrupted_item_on_resume() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let engine = FakeEngine::new(&[("b", Script::BlockFirstAttempt)]);
    let mut orch = orchestrator(engine.clone(), Vec::new());

    orch.start_batch(items(&["a", "b", "c"]), DownloadOptions::default(), temp.path().into())
        .unwrap();
    let mut events = events_until(&orch, |event| {
        matches!(event, BatchEvent::ItemProgress { index: 1, .. })
    });

    assert!(orch.request_pause());
    events.extend(events_until(&orch, |event| {
        matches!(event, BatchEvent::BatchPaused { .. })
    }));
    assert_eq!(events.last(), Some(&BatchEvent::BatchPaused { index: 1 }));
    assert_eq!(orch.phase(), Phase::Paused);
    // Parked: nothing else happens until resume.
    assert!(orch.recv_timeout(Duration::from_millis(100)).is_none());

    assert!(orch.request_resume());
    events.extend(events_until(&orch, is_terminal));

    assert_eq!(
        outcomes(&mut orch),
        vec![ItemOutcome::Succeeded; 3]
    );
    assert_eq!(started_indices(&events), vec![0, 1, 1, 2]);
    assert!(events.contains(&BatchEvent::BatchResumed { index: 1 }));
    // Retried from scratch: a second full transfer call for the same item.
    assert_eq!(engine.calls_for("b").len(), 2);
}

#[test]
fn cursor_never_decreases_or_overruns() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let engine = FakeEngine::new(&[("c", Script::BlockFirstAttempt)]);
    let mut orch = orchestrator(engine, Vec::new());

    orch.start_batch(
        items(&["a", "b", "c", "d"]),
        DownloadOptions::default(),
        temp.path().into(),
    )
    .unwrap();
    let mut events = events_until(&orch, |event| {
        matches!(event, BatchEvent::ItemProgress { index: 2, .. })
    });
    orch.request_pause();
    events.extend(events_until(&orch, |event| {
        matches!(event, BatchEvent::BatchPaused { .. })
    }));
    orch.request_resume();
    events.extend(events_until(&orch, is_terminal));
    orch.wait();

    let started = started_indices(&events);
    assert!(started.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(started.iter().all(|index| *index < 4));
}

#[test]
fn cancel_mid_item_halts_before_the_next_one() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let engine = FakeEngine::new(&[("b", Script::Endless)]);
    let mut orch = orchestrator(engine.clone(), Vec::new());

    orch.start_batch(items(&["a", "b", "c"]), DownloadOptions::default(), temp.path().into())
        .unwrap();
    let mut events = events_until(&orch, |event| {
        matches!(event, BatchEvent::ItemProgress { index: 1, .. })
    });

    let requested = Instant::now();
    assert!(orch.request_cancel());
    events.extend(events_until(&orch, is_terminal));
    let latency = requested.elapsed();

    // One progress interval is 5ms; allow generous scheduling slack.
    assert!(latency < Duration::from_secs(1), "cancel took {latency:?}");
    assert_eq!(events.last(), Some(&BatchEvent::BatchCancelled));
    assert_eq!(started_indices(&events), vec![0, 1]);
    assert_eq!(orch.phase(), Phase::Cancelled);
    assert_eq!(
        outcomes(&mut orch),
        vec![
            ItemOutcome::Succeeded,
            ItemOutcome::Skipped,
            ItemOutcome::Pending
        ]
    );
    assert!(engine.calls_for("c").is_empty());
}

#[test]
fn cancel_while_paused_ends_the_batch() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let engine = FakeEngine::new(&[("a", Script::Endless)]);
    let mut orch = orchestrator(engine, Vec::new());

    orch.start_batch(items(&["a", "b"]), DownloadOptions::default(), temp.path().into())
        .unwrap();
    events_until(&orch, |event| matches!(event, BatchEvent::ItemProgress { .. }));
    orch.request_pause();
    events_until(&orch, |event| matches!(event, BatchEvent::BatchPaused { .. }));

    assert!(orch.request_cancel());
    let events = events_until(&orch, is_terminal);

    assert_eq!(events, vec![BatchEvent::BatchCancelled]);
    assert_eq!(
        outcomes(&mut orch),
        vec![ItemOutcome::Pending, ItemOutcome::Pending]
    );
}

#[test]
fn cancel_during_settle_delay_is_prompt() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let engine = FakeEngine::new(&[("a", Script::FailCode(EngineErrorCode::Network))]);
    let mut orch = Orchestrator::new(
        engine,
        DirectoryResolver::new(Vec::new()),
        OrchestratorSettings {
            settle_delay: Duration::from_secs(30),
        },
    );

    orch.start_batch(items(&["a", "b"]), DownloadOptions::default(), temp.path().into())
        .unwrap();
    events_until(&orch, |event| matches!(event, BatchEvent::ItemFinished { .. }));
    let requested = Instant::now();
    orch.request_cancel();
    let events = events_until(&orch, is_terminal);

    assert!(requested.elapsed() < Duration::from_secs(1));
    assert_eq!(started_indices(&events), Vec::<usize>::new());
}

#[test]
fn permission_failure_retries_once_in_fallback_and_sticks() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let primary = temp.path().join("public");
    let fallback = temp.path().join("private");
    let engine = FakeEngine::new(&[
        ("a", Script::DenyDirs(vec![primary.clone()])),
        ("b", Script::DenyDirs(vec![primary.clone()])),
    ]);
    let mut orch = orchestrator(engine.clone(), vec![fallback.clone()]);

    orch.start_batch(items(&["a", "b"]), DownloadOptions::default(), primary.clone())
        .unwrap();
    let events = events_until(&orch, is_terminal);

    assert_eq!(
        outcomes(&mut orch),
        vec![ItemOutcome::Succeeded, ItemOutcome::Succeeded]
    );
    assert_eq!(engine.calls_for("a"), vec![primary.clone(), fallback.clone()]);
    // The switch is sticky: the next item goes straight to the fallback.
    assert_eq!(engine.calls_for("b"), vec![fallback.clone()]);
    let changes: Vec<_> = events
        .iter()
        .filter(|event| matches!(event, BatchEvent::DirectoryChanged { .. }))
        .collect();
    assert_eq!(
        changes,
        vec![&BatchEvent::DirectoryChanged {
            directory: fallback.clone()
        }]
    );
    assert_eq!(orch.active_directory(), Some(fallback));
}

#[test]
fn exhausted_fallbacks_fail_the_item_only() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let primary = temp.path().join("public");
    let fallback = temp.path().join("private");
    let denied = vec![primary.clone(), fallback.clone()];
    let engine = FakeEngine::new(&[("a", Script::DenyDirs(denied))]);
    let mut orch = orchestrator(engine.clone(), vec![fallback.clone()]);

    orch.start_batch(items(&["a", "b"]), DownloadOptions::default(), primary.clone())
        .unwrap();
    events_until(&orch, is_terminal);

    assert_eq!(
        outcomes(&mut orch),
        vec![
            ItemOutcome::Failed(FailureKind::PermissionDenied),
            ItemOutcome::Succeeded
        ]
    );
    // Exactly one fallback retry for the item.
    assert_eq!(engine.calls_for("a"), vec![primary, fallback]);
    assert_eq!(orch.phase(), Phase::Finished);
}

#[test]
fn engine_write_error_text_moves_the_batch_to_the_fallback() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let primary = temp.path().join("public");
    let fallback = temp.path().join("private");
    let engine = FakeEngine::new(&[
        ("a", Script::RefuseWriteIn(primary.clone())),
        ("b", Script::RefuseWriteIn(primary.clone())),
    ]);
    let mut orch = orchestrator(engine.clone(), vec![fallback.clone()]);

    orch.start_batch(items(&["a", "b"]), DownloadOptions::default(), primary.clone())
        .unwrap();
    let events = events_until(&orch, is_terminal);

    assert_eq!(
        outcomes(&mut orch),
        vec![ItemOutcome::Succeeded, ItemOutcome::Succeeded]
    );
    assert_eq!(engine.calls_for("a"), vec![primary, fallback.clone()]);
    assert_eq!(engine.calls_for("b"), vec![fallback.clone()]);
    assert!(events.contains(&BatchEvent::DirectoryChanged {
        directory: fallback.clone()
    }));
    assert!(matches!(
        events.last(),
        Some(BatchEvent::BatchFinished(summary)) if summary.directory == fallback
    ));
}

#[test]
fn resume_before_the_stop_lands_retries_the_item() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let engine = FakeEngine::new(&[(
        "a",
        Script::LingerAfterStop {
            hold: Duration::from_millis(200),
        },
    )]);
    let mut orch = orchestrator(engine.clone(), Vec::new());

    orch.start_batch(items(&["a", "b"]), DownloadOptions::default(), temp.path().into())
        .unwrap();
    let mut events = events_until(&orch, |event| {
        matches!(event, BatchEvent::ItemProgress { index: 0, .. })
    });

    assert!(orch.request_pause());
    let deadline = Instant::now() + EVENT_TIMEOUT;
    while !engine.stop_seen.load(Ordering::SeqCst) {
        assert!(Instant::now() < deadline, "engine never saw the stop");
        std::thread::sleep(STEP);
    }
    // The engine is still unwinding the stop when the resume arrives.
    assert!(orch.request_resume());
    events.extend(events_until(&orch, is_terminal));

    assert_eq!(
        outcomes(&mut orch),
        vec![ItemOutcome::Succeeded, ItemOutcome::Succeeded]
    );
    assert_eq!(engine.calls_for("a").len(), 2);
    assert_eq!(started_indices(&events), vec![0, 0, 1]);
    assert!(!events.iter().any(|event| matches!(
        event,
        BatchEvent::ItemFinished {
            outcome: ItemOutcome::Skipped,
            ..
        }
    )));
    assert_eq!(orch.phase(), Phase::Finished);
}

#[test]
fn unusable_primary_is_replaced_at_batch_start() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let not_a_dir = temp.path().join("file");
    std::fs::write(&not_a_dir, "x").unwrap();
    let fallback = temp.path().join("fallback");
    let engine = FakeEngine::new(&[]);
    let mut orch = orchestrator(engine.clone(), vec![fallback.clone()]);

    orch.start_batch(items(&["a"]), DownloadOptions::default(), not_a_dir.clone())
        .unwrap();
    let events = events_until(&orch, is_terminal);

    assert_eq!(
        events[..2].to_vec(),
        vec![
            BatchEvent::BatchStarted {
                total: 1,
                directory: fallback.clone()
            },
            BatchEvent::DirectoryChanged {
                directory: fallback.clone()
            },
        ]
    );
    assert_eq!(engine.calls_for("a"), vec![fallback]);
    orch.wait();
}

#[test]
fn missing_engine_aborts_the_batch() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let engine = FakeEngine::new(&[("a", Script::Missing)]);
    let mut orch = orchestrator(engine.clone(), Vec::new());

    orch.start_batch(items(&["a", "b"]), DownloadOptions::default(), temp.path().into())
        .unwrap();
    let events = events_until(&orch, is_terminal);

    assert!(events.contains(&BatchEvent::FatalError {
        message: "yt-dlp: not found".into()
    }));
    assert_eq!(events.last(), Some(&BatchEvent::BatchCancelled));
    assert_eq!(orch.phase(), Phase::Cancelled);
    assert!(engine.calls_for("b").is_empty());
    orch.wait();
}

#[test]
fn second_start_is_rejected_while_running() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let engine = FakeEngine::new(&[("a", Script::Endless)]);
    let mut orch = orchestrator(engine, Vec::new());
    let dir: &Path = temp.path();

    orch.start_batch(items(&["a"]), DownloadOptions::default(), dir.into())
        .unwrap();
    assert_eq!(
        orch.start_batch(items(&["b"]), DownloadOptions::default(), dir.into()),
        Err(OrchestratorError::BatchActive)
    );

    orch.request_cancel();
    events_until(&orch, is_terminal);
    orch.wait();

    // Terminal phases accept a fresh batch.
    assert_eq!(
        orch.start_batch(items(&["b"]), DownloadOptions::default(), dir.into()),
        Ok(true)
    );
    let events = events_until(&orch, is_terminal);
    assert!(matches!(events.last(), Some(BatchEvent::BatchFinished(_))));
    assert_eq!(orch.phase(), Phase::Finished);
}

#[test]
fn control_requests_respect_the_phase() {
    init_logging();
    let orch = orchestrator(FakeEngine::new(&[]), Vec::new());

    assert!(!orch.request_pause());
    assert!(!orch.request_resume());
    assert!(!orch.request_cancel());
    assert_eq!(orch.phase(), Phase::Idle);
}
