use std::sync::{mpsc, Arc};
use std::thread;

use batch_logging::{batch_error, batch_info, batch_warn};
use mediabatch_core::Item;

use crate::{AnalysisError, MediaEngine};

enum CatalogCommand {
    Analyze { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
    Ready { url: String, items: Vec<Item> },
    Failed { url: String, error: AnalysisError },
}

/// Runs catalog analysis on a background thread so the caller never blocks.
pub struct CatalogHandle {
    cmd_tx: mpsc::Sender<CatalogCommand>,
    event_rx: mpsc::Receiver<CatalogEvent>,
}

impl CatalogHandle {
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => Some(runtime),
                Err(err) => {
                    batch_error!("Catalog worker has no async runtime: {}", err);
                    None
                }
            };
            while let Ok(command) = cmd_rx.recv() {
                let event = match (&runtime, command) {
                    (Some(runtime), CatalogCommand::Analyze { url }) => {
                        let result = runtime.block_on(engine.analyze(&url));
                        into_event(url, result)
                    }
                    (None, CatalogCommand::Analyze { url }) => CatalogEvent::Failed {
                        url,
                        error: AnalysisError::Other("async runtime unavailable".to_string()),
                    },
                };
                if event_tx.send(event).is_err() {
                    break;
                }
            }
        });

        Self { cmd_tx, event_rx }
    }

    pub fn analyze(&self, url: impl Into<String>) {
        let _ = self.cmd_tx.send(CatalogCommand::Analyze { url: url.into() });
    }

    pub fn try_recv(&self) -> Option<CatalogEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<CatalogEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }
}

fn into_event(url: String, result: Result<Vec<Item>, AnalysisError>) -> CatalogEvent {
    match result {
        Ok(items) => {
            batch_info!("Catalog for {} has {} items", url, items.len());
            CatalogEvent::Ready { url, items }
        }
        Err(error) => {
            batch_warn!("Analysis of {} failed: {}", url, error);
            CatalogEvent::Failed { url, error }
        }
    }
}
