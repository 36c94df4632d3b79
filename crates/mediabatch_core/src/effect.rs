use crate::{DownloadOptions, Item};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Analyze { url: String },
    StartBatch {
        items: Vec<Item>,
        options: DownloadOptions,
    },
    Pause,
    Resume,
    Cancel,
}
