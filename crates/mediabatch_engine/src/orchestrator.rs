//! Sequential batch worker with cooperative pause, resume and cancel.
//!
//! The control thread only flips the phase; the worker thread owns the queue
//! and the cursor. Pause and cancel take effect at the next check point: a
//! progress report, the engine's silent-period poll, or an item boundary. The
//! stop latency is therefore bounded by one progress interval, not by the
//! size of the item in flight.
//!
//! A paused worker does not exit. It parks until the phase becomes Running
//! (the interrupted item is retried from scratch) or Cancelled.

use std::path::PathBuf;
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use batch_logging::{batch_debug, batch_error, batch_info, batch_warn};
use mediabatch_core::{
    failure_message, BatchEvent, BatchSummary, DownloadOptions, FailureKind, Item, ItemOutcome,
    Phase,
};
use tokio::runtime::Runtime;

use crate::classify::{classify, Classification};
use crate::progress::{normalize, Flow, ProgressSink, RawProgress};
use crate::{DirectoryResolver, MediaEngine, OrchestratorError, TransferRequest};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Pause after a failed item so its status stays visible.
    pub settle_delay: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(1500),
        }
    }
}

/// One selected item for the duration of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub item: Item,
    pub outcome: ItemOutcome,
}

impl QueueEntry {
    fn pending(item: Item) -> Self {
        Self {
            item,
            outcome: ItemOutcome::Pending,
        }
    }
}

#[derive(Debug, Default)]
struct ControlState {
    phase: Phase,
    active_directory: Option<PathBuf>,
}

/// The only state shared between the control thread and the worker.
#[derive(Debug, Default)]
struct Control {
    state: Mutex<ControlState>,
    wake: Condvar,
}

impl Control {
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn phase(&self) -> Phase {
        self.lock().phase
    }

    fn transition(&self, from: &[Phase], to: Phase) -> bool {
        let mut state = self.lock();
        if !from.contains(&state.phase) {
            return false;
        }
        state.phase = to;
        drop(state);
        self.wake.notify_all();
        true
    }

    fn force(&self, phase: Phase) {
        self.lock().phase = phase;
        self.wake.notify_all();
    }

    fn active_directory(&self) -> Option<PathBuf> {
        self.lock().active_directory.clone()
    }

    fn set_active_directory(&self, directory: PathBuf) {
        self.lock().active_directory = Some(directory);
    }

    /// Blocks while Paused and returns the phase that ended the wait.
    fn wait_while_paused(&self) -> Phase {
        let guard = self.lock();
        let guard = self
            .wake
            .wait_while(guard, |state| state.phase == Phase::Paused)
            .unwrap_or_else(PoisonError::into_inner);
        guard.phase
    }

    /// Sleeps up to `delay`; wakes early once the phase leaves Running.
    fn settle(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        let guard = self.lock();
        let _ = self
            .wake
            .wait_timeout_while(guard, delay, |state| state.phase == Phase::Running);
    }
}

/// Control surface for one batch at a time.
pub struct Orchestrator {
    engine: Arc<dyn MediaEngine>,
    resolver: Arc<DirectoryResolver>,
    settings: OrchestratorSettings,
    control: Arc<Control>,
    event_tx: mpsc::Sender<BatchEvent>,
    event_rx: mpsc::Receiver<BatchEvent>,
    worker: Option<JoinHandle<Vec<QueueEntry>>>,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        resolver: DirectoryResolver,
        settings: OrchestratorSettings,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel();
        Self {
            engine,
            resolver: Arc::new(resolver),
            settings,
            control: Arc::new(Control::default()),
            event_tx,
            event_rx,
            worker: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.control.phase()
    }

    pub fn active_directory(&self) -> Option<PathBuf> {
        self.control.active_directory()
    }

    /// True while a worker thread is still alive, even after a cancel request.
    pub fn is_busy(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Starts processing `items` in order.
    ///
    /// Returns `Ok(false)` for an empty selection (phase is left untouched)
    /// and `Err(BatchActive)` while another batch still owns the worker.
    pub fn start_batch(
        &mut self,
        items: Vec<Item>,
        options: DownloadOptions,
        directory: PathBuf,
    ) -> Result<bool, OrchestratorError> {
        if self.phase().is_active() || self.is_busy() {
            return Err(OrchestratorError::BatchActive);
        }
        if items.is_empty() {
            batch_debug!("Empty selection; batch not started");
            return Ok(false);
        }
        if let Some(previous) = self.worker.take() {
            let _ = previous.join();
        }
        {
            let mut state = self.control.lock();
            state.phase = Phase::Running;
            state.active_directory = Some(directory.clone());
        }

        let worker = Worker {
            engine: self.engine.clone(),
            resolver: self.resolver.clone(),
            settings: self.settings.clone(),
            control: self.control.clone(),
            events: self.event_tx.clone(),
            queue: items.into_iter().map(QueueEntry::pending).collect(),
            cursor: 0,
            options,
            primary: directory,
        };
        let handle = thread::Builder::new()
            .name("mediabatch-worker".to_string())
            .spawn(move || worker.run())
            .map_err(|err| {
                self.control.force(Phase::Idle);
                OrchestratorError::Spawn(err.to_string())
            })?;
        self.worker = Some(handle);
        Ok(true)
    }

    pub fn request_pause(&self) -> bool {
        let accepted = self.control.transition(&[Phase::Running], Phase::Paused);
        if accepted {
            batch_info!("Pause requested");
        }
        accepted
    }

    pub fn request_resume(&self) -> bool {
        let accepted = self.control.transition(&[Phase::Paused], Phase::Running);
        if accepted {
            batch_info!("Resume requested");
        }
        accepted
    }

    pub fn request_cancel(&self) -> bool {
        let accepted = self
            .control
            .transition(&[Phase::Running, Phase::Paused], Phase::Cancelled);
        if accepted {
            batch_info!("Cancel requested");
        }
        accepted
    }

    pub fn try_recv(&self) -> Option<BatchEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<BatchEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Blocks until the worker exits and returns the final queue.
    pub fn wait(&mut self) -> Option<Vec<QueueEntry>> {
        self.worker.take().and_then(|handle| handle.join().ok())
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        // Lets a parked worker exit.
        self.request_cancel();
    }
}

enum LoopExit {
    Finished,
    Paused,
    Cancelled,
    Fatal(String),
}

enum Attempt {
    Succeeded,
    Failed(FailureKind, String),
    Paused,
    Cancelled,
    Fatal(String),
}

struct Worker {
    engine: Arc<dyn MediaEngine>,
    resolver: Arc<DirectoryResolver>,
    settings: OrchestratorSettings,
    control: Arc<Control>,
    events: mpsc::Sender<BatchEvent>,
    queue: Vec<QueueEntry>,
    cursor: usize,
    options: DownloadOptions,
    primary: PathBuf,
}

impl Worker {
    fn run(mut self) -> Vec<QueueEntry> {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                self.abort_fatal(format!("async runtime unavailable: {err}"));
                return self.queue;
            }
        };

        let directory = match self.resolver.resolve(&self.primary) {
            Ok(directory) => directory,
            Err(err) => {
                batch_warn!("No writable download directory: {}", err);
                self.primary.clone()
            }
        };
        self.control.set_active_directory(directory.clone());
        batch_info!(
            "Batch started: {} items into {}",
            self.queue.len(),
            directory.display()
        );
        self.emit(BatchEvent::BatchStarted {
            total: self.queue.len(),
            directory: directory.clone(),
        });
        if directory != self.primary {
            self.emit(BatchEvent::DirectoryChanged { directory });
        }

        loop {
            match self.process(&runtime) {
                LoopExit::Finished => {
                    if self
                        .control
                        .transition(&[Phase::Running, Phase::Paused], Phase::Finished)
                    {
                        let summary = self.summary();
                        batch_info!(
                            "Batch finished: {} succeeded, {} failed",
                            summary.succeeded,
                            summary.failed
                        );
                        self.emit(BatchEvent::BatchFinished(summary));
                    } else {
                        self.emit_cancelled();
                    }
                    break;
                }
                LoopExit::Paused => {
                    batch_info!("Batch paused at item {}", self.cursor + 1);
                    self.emit(BatchEvent::BatchPaused { index: self.cursor });
                    if self.control.wait_while_paused() == Phase::Running {
                        batch_info!("Batch resumed at item {}", self.cursor + 1);
                        self.emit(BatchEvent::BatchResumed { index: self.cursor });
                    } else {
                        self.emit_cancelled();
                        break;
                    }
                }
                LoopExit::Cancelled => {
                    self.emit_cancelled();
                    break;
                }
                LoopExit::Fatal(message) => {
                    self.abort_fatal(message);
                    break;
                }
            }
        }
        self.queue
    }

    fn process(&mut self, runtime: &Runtime) -> LoopExit {
        let total = self.queue.len();
        while self.cursor < total {
            match self.control.phase() {
                Phase::Cancelled => return LoopExit::Cancelled,
                Phase::Paused => return LoopExit::Paused,
                _ => {}
            }

            let index = self.cursor;
            self.queue[index].outcome = ItemOutcome::InProgress;
            let item = self.queue[index].item.clone();
            batch_info!("Item {}/{}: {}", index + 1, total, item.title);
            self.emit(BatchEvent::ItemStarted {
                index,
                total,
                item: item.clone(),
            });

            match self.transfer(runtime, index, &item) {
                Attempt::Succeeded => {
                    self.finish_item(index, ItemOutcome::Succeeded, None);
                }
                Attempt::Failed(kind, detail) => {
                    batch_warn!("Item {} failed ({}): {}", index + 1, kind, detail);
                    self.finish_item(
                        index,
                        ItemOutcome::Failed(kind),
                        Some(failure_message(kind).to_string()),
                    );
                    self.control.settle(self.settings.settle_delay);
                }
                Attempt::Paused => {
                    // Retried from scratch on resume.
                    self.queue[index].outcome = ItemOutcome::Pending;
                    return LoopExit::Paused;
                }
                Attempt::Cancelled => {
                    self.finish_item(index, ItemOutcome::Skipped, None);
                    return LoopExit::Cancelled;
                }
                Attempt::Fatal(message) => {
                    self.finish_item(index, ItemOutcome::Skipped, None);
                    return LoopExit::Fatal(message);
                }
            }
            self.cursor += 1;
        }
        LoopExit::Finished
    }

    /// One attempt, plus at most one retry in a fallback directory.
    fn transfer(&self, runtime: &Runtime, index: usize, item: &Item) -> Attempt {
        let mut fallback_used = false;
        loop {
            let directory = self
                .control
                .active_directory()
                .unwrap_or_else(|| self.primary.clone());
            let request = TransferRequest {
                source_url: item.source_url.clone(),
                title: item.title.clone(),
                directory: directory.clone(),
                options: self.options,
            };
            let sink = WorkerSink {
                index,
                control: self.control.as_ref(),
                events: &self.events,
            };
            let err = match runtime.block_on(self.engine.download(&request, &sink)) {
                Ok(()) => return Attempt::Succeeded,
                Err(err) => err,
            };

            match classify(&err, self.control.phase()) {
                Classification::Fatal(message) => return Attempt::Fatal(message),
                Classification::Failure(FailureKind::PausedSignal) => return Attempt::Paused,
                Classification::Failure(FailureKind::CancelledSignal) => {
                    return Attempt::Cancelled
                }
                Classification::Failure(FailureKind::PermissionDenied) if !fallback_used => {
                    fallback_used = true;
                    let Some(next) = self.resolver.fallback(&directory) else {
                        return Attempt::Failed(FailureKind::PermissionDenied, err.to_string());
                    };
                    batch_warn!(
                        "Cannot write to {} ({}); retrying in {}",
                        directory.display(),
                        err,
                        next.display()
                    );
                    self.control.set_active_directory(next.clone());
                    self.emit(BatchEvent::DirectoryChanged { directory: next });
                }
                Classification::Failure(kind) => return Attempt::Failed(kind, err.to_string()),
            }
        }
    }

    fn finish_item(&mut self, index: usize, outcome: ItemOutcome, message: Option<String>) {
        self.queue[index].outcome = outcome;
        self.emit(BatchEvent::ItemFinished {
            index,
            outcome,
            message,
        });
    }

    fn summary(&self) -> BatchSummary {
        let count = |pred: fn(&ItemOutcome) -> bool| {
            self.queue.iter().filter(|entry| pred(&entry.outcome)).count()
        };
        BatchSummary {
            succeeded: count(|o| *o == ItemOutcome::Succeeded),
            failed: count(|o| matches!(o, ItemOutcome::Failed(_))),
            directory: self
                .control
                .active_directory()
                .unwrap_or_else(|| self.primary.clone()),
        }
    }

    fn emit_cancelled(&self) {
        batch_info!("Batch cancelled at item {}", self.cursor + 1);
        self.emit(BatchEvent::BatchCancelled);
    }

    fn abort_fatal(&self, message: String) {
        batch_error!("Batch aborted: {}", message);
        self.control.force(Phase::Cancelled);
        self.emit(BatchEvent::FatalError { message });
        self.emit(BatchEvent::BatchCancelled);
    }

    fn emit(&self, event: BatchEvent) {
        let _ = self.events.send(event);
    }
}

/// Forwards normalized progress and answers the stop check.
struct WorkerSink<'a> {
    index: usize,
    control: &'a Control,
    events: &'a mpsc::Sender<BatchEvent>,
}

impl ProgressSink for WorkerSink<'_> {
    fn report(&self, raw: &RawProgress) -> Flow {
        if self.should_stop() {
            return Flow::Stop;
        }
        let _ = self.events.send(BatchEvent::ItemProgress {
            index: self.index,
            sample: normalize(raw),
        });
        Flow::Continue
    }

    fn should_stop(&self) -> bool {
        matches!(self.control.phase(), Phase::Paused | Phase::Cancelled)
    }
}
