use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};
use vsphere_client::{Client, ClientError};
use vsphere_machine::{SnapshotInfo, SnapshotRemoval, SnapshotSpec};
use vsphere_operation::Operation;
use vsphere_operation::operations::snapshot::SnapshotOperation;
use vsphere_params::{ParamField, ParamType, ParamTypes};
use vsphere_store::{DataError, ResourceData};

use crate::{Ensure, Environment, ResourceType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotChange {
    Create {
        vm_uuid: String,
        spec: SnapshotSpec,
    },
    Remove {
        vm_uuid: String,
        snapshot_id: String,
        removal: SnapshotRemoval,
    },
    /// Remove the old snapshot, then take a new one, possibly of another
    /// machine.
    Replace {
        old_vm_uuid: String,
        snapshot_id: String,
        removal: SnapshotRemoval,
        vm_uuid: String,
        spec: SnapshotSpec,
    },
}

#[derive(Debug, Error)]
#[error("reading snapshot {snapshot_id} of {vm_uuid}: {source}")]
pub struct SnapshotStateError {
    pub vm_uuid: String,
    pub snapshot_id: String,
    pub source: ClientError,
}

#[derive(Debug, Clone)]
pub struct VirtualMachineSnapshot;

fn spec(data: &ResourceData) -> Result<SnapshotSpec, DataError> {
    Ok(SnapshotSpec {
        name: data.get_str("snapshot_name")?.to_string(),
        description: data.get_str("description")?.to_string(),
        memory: data.get_bool("memory")?,
        quiesce: data.get_bool("quiesce")?,
    })
}

fn removal(data: &ResourceData) -> Result<SnapshotRemoval, DataError> {
    Ok(SnapshotRemoval {
        remove_children: data.get_bool("remove_children")?,
        consolidate: data.get_bool("consolidate")?,
    })
}

#[async_trait]
impl ResourceType for VirtualMachineSnapshot {
    const ID: &'static str = "vsphere_virtual_machine_snapshot";

    fn param_types() -> ParamTypes {
        let required_bool = || ParamField::new(ParamType::Boolean).force_new();
        ParamTypes::new()
            .field(
                "virtual_machine_uuid",
                ParamField::new(ParamType::String).force_new(),
            )
            .field("snapshot_name", ParamField::new(ParamType::String).force_new())
            .field("description", ParamField::new(ParamType::String).force_new())
            .field("memory", required_bool())
            .field("quiesce", required_bool())
            .field(
                "remove_children",
                ParamField::new(ParamType::Boolean).default(false).force_new(),
            )
            .field(
                "consolidate",
                ParamField::new(ParamType::Boolean).default(true).force_new(),
            )
    }

    type State = Option<SnapshotInfo>;
    type StateError = SnapshotStateError;

    async fn state(
        client: &dyn Client,
        data: &ResourceData,
    ) -> Result<Self::State, Self::StateError> {
        let snapshot_id = data.id();
        if snapshot_id.is_empty() {
            return Ok(None);
        }
        // Snapshot ids are unique per endpoint, so after a move the old
        // machine is asked as well.
        let mut machines: Vec<&str> = Vec::new();
        let (recorded, current) = data.get_change("virtual_machine_uuid");
        for uuid in [current, recorded].into_iter().flatten() {
            let Some(uuid) = uuid.as_str() else {
                continue;
            };
            if !machines.contains(&uuid) {
                machines.push(uuid);
            }
        }

        for vm_uuid in machines {
            match client.find_snapshot(vm_uuid, snapshot_id).await {
                Ok(Some(found)) => return Ok(Some(found)),
                Ok(None) => {}
                Err(err) if err.is_not_found() => {}
                Err(source) => {
                    return Err(SnapshotStateError {
                        vm_uuid: vm_uuid.to_string(),
                        snapshot_id: snapshot_id.to_string(),
                        source,
                    });
                }
            }
        }
        Ok(None)
    }

    type Change = SnapshotChange;
    type ChangeError = DataError;

    fn change(
        ensure: Ensure,
        data: &mut ResourceData,
        state: &Self::State,
        _env: &Environment,
    ) -> Result<Option<Self::Change>, Self::ChangeError> {
        let vm_uuid = data.get_str("virtual_machine_uuid")?.to_string();
        let old_vm_uuid = match data.get_change("virtual_machine_uuid").0 {
            Some(serde_json::Value::String(uuid)) => uuid.clone(),
            _ => vm_uuid.clone(),
        };

        let change = match (ensure, state) {
            (Ensure::Absent, None) => None,
            (Ensure::Absent, Some(existing)) => Some(SnapshotChange::Remove {
                vm_uuid: old_vm_uuid,
                snapshot_id: existing.id.clone(),
                removal: removal(data)?,
            }),
            (Ensure::Present, None) => Some(SnapshotChange::Create {
                vm_uuid,
                spec: spec(data)?,
            }),
            (Ensure::Present, Some(existing)) => {
                let schema = VirtualMachineSnapshot::param_types();
                let replace = schema.force_new_keys().any(|key| data.has_change(key));
                if replace {
                    Some(SnapshotChange::Replace {
                        old_vm_uuid,
                        snapshot_id: existing.id.clone(),
                        removal: removal(data)?,
                        vm_uuid,
                        spec: spec(data)?,
                    })
                } else {
                    None
                }
            }
        };

        match &change {
            Some(change) => info!(?change, "snapshot change"),
            None => debug!(id = data.id(), "snapshot is up to date"),
        }
        Ok(change)
    }

    fn operations(change: Self::Change) -> Vec<Operation> {
        match change {
            SnapshotChange::Create { vm_uuid, spec } => {
                vec![SnapshotOperation::Create { vm_uuid, spec }.into()]
            }
            SnapshotChange::Remove {
                vm_uuid,
                snapshot_id,
                removal,
            } => vec![
                SnapshotOperation::Remove {
                    vm_uuid,
                    snapshot_id,
                    removal,
                }
                .into(),
            ],
            SnapshotChange::Replace {
                old_vm_uuid,
                snapshot_id,
                removal,
                vm_uuid,
                spec,
            } => vec![
                SnapshotOperation::Remove {
                    vm_uuid: old_vm_uuid,
                    snapshot_id,
                    removal,
                }
                .into(),
                SnapshotOperation::Create { vm_uuid, spec }.into(),
            ],
        }
    }

    type RecordError = DataError;

    fn record(
        data: &mut ResourceData,
        state: &Self::State,
        _env: &Environment,
    ) -> Result<(), Self::RecordError> {
        match state {
            Some(snapshot) => {
                // Only name and description are reported back.
                for (key, _) in VirtualMachineSnapshot::param_types().iter() {
                    if let Some(value) = data.get(key).cloned() {
                        data.set(key.as_str(), value);
                    }
                }
                data.set("snapshot_name", snapshot.name.as_str());
                data.set("description", snapshot.description.as_str());
            }
            None => {
                debug!(id = data.id(), "snapshot is gone");
                data.set_id("");
            }
        }
        Ok(())
    }
}
