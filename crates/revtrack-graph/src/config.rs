/// Configuration and path resolution for the revision graph.
use std::path::{Path, PathBuf};

use crate::graph::Direction;

/// Container part holding the undo-direction graph.
const DEFAULT_UNDO_PART: &str = "undo";

/// Container part holding the redo-direction graph.
const DEFAULT_REDO_PART: &str = "redo";

/// Manifest media type registered for history parts.
const DEFAULT_MEDIA_TYPE: &str = "application/vnd.revtrack.history+json";

/// Version written into the root of every saved tree.
pub const FORMAT_VERSION: u32 = 1;

/// File name of the default container inside the data directory.
const DEFAULT_CONTAINER_FILE: &str = "history.redb";

/// Configuration for loading and saving revision graphs.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Part name of the undo graph inside the container.
    pub undo_part: String,
    /// Part name of the redo graph inside the container.
    pub redo_part: String,
    /// Media type recorded in the container manifest.
    pub media_type: String,
    /// Tree version written on save; newer versions are refused on load.
    pub format_version: u32,
    /// `merge` flag used by bulk commits.
    pub merge_on_commit: bool,
    /// Root directory for containers opened without an explicit path.
    pub data_dir: PathBuf,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            undo_part: DEFAULT_UNDO_PART.to_string(),
            redo_part: DEFAULT_REDO_PART.to_string(),
            media_type: DEFAULT_MEDIA_TYPE.to_string(),
            format_version: FORMAT_VERSION,
            merge_on_commit: true,
            data_dir: resolve_data_dir(),
        }
    }
}

impl GraphConfig {
    /// Part name used for the graph of `direction`.
    pub fn part_name(&self, direction: Direction) -> &str {
        match direction {
            Direction::Undo => &self.undo_part,
            Direction::Redo => &self.redo_part,
        }
    }

    /// Path of the default container file.
    pub fn default_container_path(&self) -> PathBuf {
        self.data_dir.join(DEFAULT_CONTAINER_FILE)
    }
}

/// Resolves the data directory path.
///
/// Resolution order:
/// 1. `REVTRACK_DATA_DIR` environment variable
/// 2. `revtrack/` under the platform's local data directory
/// 3. `.data/` directory next to the executable
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("REVTRACK_DATA_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(dir) = dirs::data_local_dir() {
        return dir.join("revtrack");
    }
    let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("."));
    exe.parent().unwrap_or(Path::new(".")).join(".data")
}
