//! Published server status.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Point-in-time view of a model server.
///
/// Replaced as a whole at the end of every load attempt, never edited field
/// by field, so a reader always sees one consistent generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub loaded: bool,
    pub device: String,
    pub base_path: PathBuf,
    pub adapter_path: Option<PathBuf>,
    pub last_load_error: Option<String>,
    pub adapter_applied: bool,
}

impl StatusSnapshot {
    pub(crate) fn initial(device: String, base_path: PathBuf, adapter_path: Option<PathBuf>) -> Self {
        Self {
            loaded: false,
            device,
            base_path,
            adapter_path,
            last_load_error: None,
            adapter_applied: false,
        }
    }

    /// Loaded, but the most recent load attempt failed.
    pub fn is_stale(&self) -> bool {
        self.loaded && self.last_load_error.is_some()
    }
}
