use std::path::PathBuf;
use std::sync::Arc;

use batch_logging::{batch_debug, batch_info, batch_warn};
use mediabatch_core::{BatchEvent, Effect, Msg};
use mediabatch_engine::{
    AnalysisError, CatalogEvent, CatalogHandle, MediaEngine, Orchestrator, YtDlpEngine,
};

use mediabatch_app::config::Settings;

/// Carries controller effects to the catalog worker and the orchestrator,
/// and turns their events back into messages.
pub struct EffectRunner {
    catalog: CatalogHandle,
    orchestrator: Orchestrator,
    directory: PathBuf,
}

impl EffectRunner {
    pub fn new(settings: &Settings) -> Self {
        let engine: Arc<dyn MediaEngine> = Arc::new(YtDlpEngine::new(settings.engine.clone()));
        Self {
            catalog: CatalogHandle::new(engine.clone()),
            orchestrator: Orchestrator::new(
                engine,
                settings.resolver(),
                settings.orchestrator.clone(),
            ),
            directory: settings.directory.clone(),
        }
    }

    /// Runs `effects`; returns messages for requests the engine refused.
    pub fn enqueue(&mut self, effects: Vec<Effect>) -> Vec<Msg> {
        let mut feedback = Vec::new();
        for effect in effects {
            match effect {
                Effect::Analyze { url } => {
                    batch_info!("Analyze url={}", url);
                    self.catalog.analyze(url);
                }
                Effect::StartBatch { items, options } => {
                    batch_info!(
                        "StartBatch items={} format={} quality={} compat={}",
                        items.len(),
                        options.format,
                        options.quality,
                        options.compatibility_mode
                    );
                    match self
                        .orchestrator
                        .start_batch(items, options, self.directory.clone())
                    {
                        Ok(true) => {}
                        Ok(false) => batch_debug!("Nothing selected; no batch started"),
                        Err(err) => {
                            batch_warn!("Batch refused: {}", err);
                            // The controller already switched to Running; bring it back.
                            feedback.push(Msg::Batch(BatchEvent::FatalError {
                                message: err.to_string(),
                            }));
                            feedback.push(Msg::Batch(BatchEvent::BatchCancelled));
                        }
                    }
                }
                Effect::Pause => {
                    if !self.orchestrator.request_pause() {
                        batch_debug!("Pause ignored in phase {:?}", self.orchestrator.phase());
                    }
                }
                Effect::Resume => {
                    if !self.orchestrator.request_resume() {
                        batch_debug!("Resume ignored in phase {:?}", self.orchestrator.phase());
                    }
                }
                Effect::Cancel => {
                    if !self.orchestrator.request_cancel() {
                        batch_debug!("Cancel ignored in phase {:?}", self.orchestrator.phase());
                    }
                }
            }
        }
        feedback
    }

    /// Everything the workers reported since the last call, in order per worker.
    pub fn drain(&self) -> Vec<Msg> {
        let mut msgs = Vec::new();
        while let Some(event) = self.catalog.try_recv() {
            msgs.push(catalog_msg(event));
        }
        while let Some(event) = self.orchestrator.try_recv() {
            msgs.push(Msg::Batch(event));
        }
        msgs
    }

    /// Cancels any batch and waits for the worker to exit.
    pub fn shutdown(&mut self) {
        if self.orchestrator.request_cancel() {
            batch_info!("Cancelling running batch before exit");
        }
        self.orchestrator.wait();
    }
}

fn catalog_msg(event: CatalogEvent) -> Msg {
    match event {
        CatalogEvent::Ready { items, .. } => Msg::CatalogReady(items),
        CatalogEvent::Failed { error, .. } => Msg::CatalogFailed {
            unavailable: matches!(error, AnalysisError::ContentUnavailable(_)),
            message: error.to_string(),
        },
    }
}
