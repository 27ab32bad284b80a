//! Persisted "last known layout".
//!
//! Each node keeps the newest layout it has seen on local storage so it
//! can attempt recovery from it after a restart.

use crate::control::layout::Layout;
use crate::core::error::{TesseraError, TesseraResult};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};

/// Local layout persistence.
pub trait LayoutStore: Send + Sync {
    /// The persisted layout, if one exists.
    fn load(&self) -> TesseraResult<Option<Layout>>;

    /// Persist a layout, replacing the previous one.
    fn save(&self, layout: &Layout) -> TesseraResult<()>;
}

/// Layout store kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryLayoutStore {
    layout: RwLock<Option<Layout>>,
}

impl InMemoryLayoutStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds a layout.
    pub fn with_layout(layout: Layout) -> Self {
        Self {
            layout: RwLock::new(Some(layout)),
        }
    }
}

impl LayoutStore for InMemoryLayoutStore {
    fn load(&self) -> TesseraResult<Option<Layout>> {
        Ok(self.layout.read().clone())
    }

    fn save(&self, layout: &Layout) -> TesseraResult<()> {
        *self.layout.write() = Some(layout.clone());
        Ok(())
    }
}

/// Layout store backed by a JSON file.
///
/// Writes go to a sibling temp file first and are renamed into place, so
/// a crash mid-write leaves the previous layout intact.
#[derive(Debug, Clone)]
pub struct FileLayoutStore {
    path: PathBuf,
}

impl FileLayoutStore {
    /// Store the layout at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the layout file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn storage_error(&self, action: &str, err: impl std::fmt::Display) -> TesseraError {
        TesseraError::Storage {
            message: format!("failed to {action} {}: {err}", self.path.display()),
        }
    }
}

impl LayoutStore for FileLayoutStore {
    fn load(&self) -> TesseraResult<Option<Layout>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.storage_error("read", err)),
        };
        let layout: Layout =
            serde_json::from_str(&content).map_err(|err| self.storage_error("parse", err))?;
        Ok(Some(layout))
    }

    fn save(&self, layout: &Layout) -> TesseraResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|err| self.storage_error("create directory for", err))?;
            }
        }
        let json = serde_json::to_string_pretty(layout)
            .map_err(|err| self.storage_error("serialize", err))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|err| self.storage_error("write", err))?;
        std::fs::rename(&tmp, &self.path).map_err(|err| self.storage_error("replace", err))?;
        Ok(())
    }
}
