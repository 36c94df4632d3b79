use crate::{BatchEvent, Item, MediaFormat, Quality};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User edited the URL input box.
    UrlChanged(String),
    /// User asked to analyze the current URL.
    AnalyzeClicked,
    /// Catalog analysis finished.
    CatalogReady(Vec<Item>),
    /// Catalog analysis failed; `unavailable` marks private/removed content.
    CatalogFailed { message: String, unavailable: bool },
    /// User toggled one catalog row.
    ItemToggled(usize),
    /// User checked or cleared "select all".
    SelectAllToggled(bool),
    FormatChosen(MediaFormat),
    QualityChosen(Quality),
    CompatibilityToggled(bool),
    /// User clicked Download.
    StartClicked,
    PauseClicked,
    ResumeClicked,
    CancelClicked,
    /// Event relayed from the orchestrator worker.
    Batch(BatchEvent),
    /// UI/render tick to coalesce rendering.
    Tick,
    /// Fallback for placeholder wiring.
    NoOp,
}
