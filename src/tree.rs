//! Git tree listings returned by the mirror APIs.

use serde::{Deserialize, Serialize};

/// Path fragments that mark a branch's verification file.
const KEY_FILE_MARKERS: [&str; 2] = ["key.vdf", "config.vdf"];

/// One entry in a tree listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    /// `"blob"` for files, `"tree"` for directories.
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.entry_type == "blob"
    }
}

/// A branch's file listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tree {
    #[serde(default)]
    pub tree: Vec<TreeEntry>,
}

impl Tree {
    pub fn new(entries: Vec<TreeEntry>) -> Self {
        Self { tree: entries }
    }

    /// File entries only; directories are never downloaded.
    pub fn blobs(&self) -> impl Iterator<Item = &TreeEntry> {
        self.tree.iter().filter(|e| e.is_blob())
    }

    pub fn blob_count(&self) -> usize {
        self.blobs().count()
    }

    /// The first blob that looks like the branch's key/config file, used
    /// to confirm the branch really belongs to the app id.
    pub fn find_key_file(&self) -> Option<&TreeEntry> {
        self.blobs().find(|e| {
            let lower = e.path.to_lowercase();
            KEY_FILE_MARKERS.iter().any(|m| lower.contains(m))
        })
    }
}
