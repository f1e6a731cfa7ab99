use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotSpec {
    pub name: String,
    pub description: String,
    /// Include the memory state.
    pub memory: bool,
    /// Quiesce the guest file system first. Needs tools in the guest.
    pub quiesce: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotInfo {
    /// Managed object id of the snapshot.
    pub id: String,
    pub name: String,
    pub description: String,
    pub quiesced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRemoval {
    pub remove_children: bool,
    pub consolidate: bool,
}

impl Default for SnapshotRemoval {
    fn default() -> Self {
        Self {
            remove_children: false,
            consolidate: true,
        }
    }
}
