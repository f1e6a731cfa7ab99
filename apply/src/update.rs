use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use vsphere_client::memory::Inventory;

use crate::ApplyError;
use crate::input::ResourceOutput;

/// Operations planned for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedChange {
    pub index: usize,
    pub kind: String,
    pub operations: Vec<String>,
}

/// One line of progress output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "update", rename_all = "snake_case")]
pub enum AppUpdate {
    Changes {
        changes: Vec<PlannedChange>,
    },
    OperationStart {
        index: usize,
        operation: String,
    },
    OperationComplete {
        index: usize,
        operation: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        created: Option<String>,
    },
    Recorded {
        resources: Vec<ResourceOutput>,
    },
    Inventory {
        inventory: Inventory,
    },
}

/// Write an update as a single JSON line and flush.
pub async fn writeln_update<W>(out: &mut W, update: &AppUpdate) -> Result<(), ApplyError>
where
    W: AsyncWrite + Unpin,
{
    let line = serde_json::to_vec(update).map_err(ApplyError::JsonOutput)?;
    out.write_all(&line).await.map_err(ApplyError::Write)?;
    out.write_all(b"\n").await.map_err(ApplyError::Write)?;
    out.flush().await.map_err(ApplyError::Flush)?;
    Ok(())
}
