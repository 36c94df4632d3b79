use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use batch_logging::{batch_debug, batch_warn};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::TransferError;

const APP_DIR_NAME: &str = "mediabatch";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{} exists but is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("cannot create or write {}: {source}", path.display())]
    Unwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<StorageError> for TransferError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotADirectory(path) => TransferError::Storage {
                source: io::Error::new(io::ErrorKind::Other, "not a directory"),
                path,
            },
            StorageError::Unwritable { path, source } => TransferError::Storage { path, source },
        }
    }
}

/// Ensure `dir` exists (creating it if missing) and accepts new files.
pub fn ensure_writable(dir: &Path) -> Result<(), StorageError> {
    let unwritable = |source| StorageError::Unwritable {
        path: dir.to_path_buf(),
        source,
    };
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(unwritable)?;
        if !meta.is_dir() {
            return Err(StorageError::NotADirectory(dir.to_path_buf()));
        }
    } else {
        fs::create_dir_all(dir).map_err(unwritable)?;
    }
    // Writability probe: the temp file is removed on drop.
    NamedTempFile::new_in(dir).map_err(unwritable)?;
    Ok(())
}

/// Picks the output directory and supplies alternates after a storage failure.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    fallbacks: Vec<PathBuf>,
}

impl Default for DirectoryResolver {
    fn default() -> Self {
        Self::new(default_fallback_dirs())
    }
}

impl DirectoryResolver {
    /// `fallbacks` are tried in order.
    pub fn new(fallbacks: Vec<PathBuf>) -> Self {
        Self { fallbacks }
    }

    pub fn fallbacks(&self) -> &[PathBuf] {
        &self.fallbacks
    }

    /// The primary directory if usable, otherwise the first usable fallback.
    ///
    /// When nothing is usable the primary's error is returned.
    pub fn resolve(&self, primary: &Path) -> Result<PathBuf, StorageError> {
        let primary_err = match ensure_writable(primary) {
            Ok(()) => return Ok(primary.to_path_buf()),
            Err(err) => err,
        };
        batch_warn!("Primary directory unusable: {}", primary_err);
        match self.first_usable(&self.fallbacks) {
            Some(dir) => Ok(dir),
            None => Err(primary_err),
        }
    }

    /// Next usable directory after `previous` in priority order.
    pub fn fallback(&self, previous: &Path) -> Option<PathBuf> {
        let start = self
            .fallbacks
            .iter()
            .position(|dir| dir == previous)
            .map_or(0, |pos| pos + 1);
        self.first_usable(&self.fallbacks[start..])
    }

    fn first_usable(&self, candidates: &[PathBuf]) -> Option<PathBuf> {
        candidates.iter().find_map(|dir| match ensure_writable(dir) {
            Ok(()) => Some(dir.clone()),
            Err(err) => {
                batch_debug!("Fallback directory rejected: {}", err);
                None
            }
        })
    }
}

/// The user's Downloads folder, or `./downloads` when there is no home.
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("downloads"))
}

/// Application-private directory first, then the system temp directory.
pub fn default_fallback_dirs() -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(2);
    if let Some(data) = dirs::data_local_dir() {
        candidates.push(data.join(APP_DIR_NAME).join("downloads"));
    }
    candidates.push(std::env::temp_dir().join(APP_DIR_NAME));
    candidates
}
