use async_trait::async_trait;
use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use vsphere_client::{Client, ClientError, wait_for_task};
use vsphere_machine::{SnapshotRemoval, SnapshotSpec};

use crate::{Applied, OperationType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOperation {
    Create {
        vm_uuid: String,
        spec: SnapshotSpec,
    },
    Remove {
        vm_uuid: String,
        snapshot_id: String,
        removal: SnapshotRemoval,
    },
}

impl Display for SnapshotOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotOperation::Create { vm_uuid, spec } => {
                write!(f, "Snapshot::Create({vm_uuid}, name = {})", spec.name)
            }
            SnapshotOperation::Remove {
                vm_uuid,
                snapshot_id,
                ..
            } => write!(f, "Snapshot::Remove({vm_uuid}, {snapshot_id})"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SnapshotApplyError {
    #[error("creating snapshot on {vm_uuid}: {source}")]
    Create {
        vm_uuid: String,
        source: ClientError,
    },

    #[error("snapshot task on {vm_uuid} finished without a snapshot reference")]
    MissingResult { vm_uuid: String },

    #[error("removing snapshot {snapshot_id}: {source}")]
    Remove {
        snapshot_id: String,
        source: ClientError,
    },
}

#[derive(Debug, Clone)]
pub struct Snapshot;

#[async_trait]
impl OperationType for Snapshot {
    type Operation = SnapshotOperation;

    // Removals first so a replaced snapshot is gone before its successor exists.
    fn merge(operations: Vec<Self::Operation>) -> Vec<Self::Operation> {
        let (mut removes, creates): (Vec<_>, Vec<_>) = operations
            .into_iter()
            .partition(|op| matches!(op, SnapshotOperation::Remove { .. }));
        removes.dedup();
        removes.extend(creates);
        removes
    }

    type ApplyError = SnapshotApplyError;

    async fn apply(
        client: &dyn Client,
        task_timeout: Duration,
        operation: &Self::Operation,
    ) -> Result<Applied, Self::ApplyError> {
        match operation {
            SnapshotOperation::Create { vm_uuid, spec } => {
                info!(%vm_uuid, name = %spec.name, "[snapshot] create");
                let error = |source| SnapshotApplyError::Create {
                    vm_uuid: vm_uuid.clone(),
                    source,
                };
                let task = client.create_snapshot(vm_uuid, spec).await.map_err(error)?;
                let result = wait_for_task(client, &task, task_timeout)
                    .await
                    .map_err(error)?;
                let reference = result.ok_or_else(|| SnapshotApplyError::MissingResult {
                    vm_uuid: vm_uuid.clone(),
                })?;
                Ok(Applied::Created(reference.value))
            }
            SnapshotOperation::Remove {
                vm_uuid,
                snapshot_id,
                removal,
            } => {
                info!(%vm_uuid, %snapshot_id, "[snapshot] remove");
                let error = |source| SnapshotApplyError::Remove {
                    snapshot_id: snapshot_id.clone(),
                    source,
                };
                let task = client
                    .remove_snapshot(vm_uuid, snapshot_id, *removal)
                    .await
                    .map_err(error)?;
                wait_for_task(client, &task, task_timeout)
                    .await
                    .map_err(error)?;
                Ok(Applied::Done)
            }
        }
    }
}
