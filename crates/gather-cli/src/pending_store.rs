//! Pending edits carried between CLI invocations.

use std::path::{Path, PathBuf};

use gather_core::{ActivityId, PendingEdit};
use serde::{Deserialize, Serialize};

use crate::error::CliError;

const PENDING_FILE_NAME: &str = "pending-edits.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingEditsFile {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub edits: Vec<PendingEdit>,
}

const fn default_version() -> u32 {
    1
}

pub fn resolve_pending_path(cli_pending_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    cli_pending_path
        .or_else(|| std::env::var_os("GATHER_PENDING_PATH").map(PathBuf::from))
        .map_or_else(default_pending_path, Ok)
}

pub fn default_pending_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("gather").join(PENDING_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

impl PendingEditsFile {
    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write the file, or remove it once nothing is pending
    pub fn save_to_path(&self, path: &Path) -> Result<(), CliError> {
        if self.edits.is_empty() {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn from_edits(edits: Vec<PendingEdit>) -> Self {
        Self {
            version: default_version(),
            edits,
        }
    }

    pub fn discard(&mut self, activity_id: &ActivityId) -> bool {
        let before = self.edits.len();
        self.edits.retain(|edit| &edit.activity_id != activity_id);
        self.edits.len() != before
    }
}
