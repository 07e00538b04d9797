//! Workflow Identity Persistence
//!
//! A workflow run is found again after a restart by its id, so the id
//! itself is saved to a small side file next to the store.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use log::info;
use uuid::Uuid;

/// Stable identifier of one logical workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkflowId(String);

impl WorkflowId {
    /// Creates an id from caller-supplied text.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh, time-ordered id.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads the id saved at `path`.
    ///
    /// Returns `Ok(None)` if there is no file or it is blank.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Option<Self>> {
        let path = path.as_ref();

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let id = content.trim();
        if id.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::new(id)))
    }

    /// Returns the saved id, or generates and saves a new one.
    pub fn load_or_create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();

        if let Some(id) = Self::load(path)? {
            info!("Workflow ID: {}", id);
            return Ok(id);
        }

        let id = Self::generate();
        id.save(path)?;
        info!("New Workflow ID: {}", id);
        Ok(id)
    }

    /// Saves the id to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &self.0)
    }

    /// Deletes the id file if present.
    pub fn reset(path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        if path.exists() {
            fs::remove_file(path)?;
            info!("Deleted workflow id file: {}", path.display());
        }
        Ok(())
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WorkflowId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
