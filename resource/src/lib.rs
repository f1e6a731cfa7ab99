mod environment;
mod resource_type;
mod resources;

pub use crate::environment::Environment;
pub use crate::resource_type::{Ensure, ResourceType};
pub use crate::resources::*;

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vsphere_client::Client;
use vsphere_operation::Operation;
use vsphere_params::ParamTypes;
use vsphere_store::{DataError, ResourceData};

use crate::dynamic::{Dynamic, DynamicError};
use crate::snapshot::{SnapshotChange, SnapshotStateError, VirtualMachineSnapshot};
use crate::virtual_machine::{
    CodecError, MachineChange, MachineChangeError, MachineState, MachineStateError, VirtualMachine,
};
use crate::vnic::{Vnic, VnicChange, VnicError, VnicState, VnicStateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    #[serde(rename = "vsphere_virtual_machine")]
    VirtualMachine,
    #[serde(rename = "vsphere_virtual_machine_snapshot")]
    VirtualMachineSnapshot,
    #[serde(rename = "vsphere_vnic")]
    Vnic,
    #[serde(rename = "vsphere_dynamic")]
    Dynamic,
}

impl ResourceKind {
    pub fn id(&self) -> &'static str {
        match self {
            ResourceKind::VirtualMachine => VirtualMachine::ID,
            ResourceKind::VirtualMachineSnapshot => VirtualMachineSnapshot::ID,
            ResourceKind::Vnic => Vnic::ID,
            ResourceKind::Dynamic => Dynamic::ID,
        }
    }

    pub fn param_types(&self) -> ParamTypes {
        match self {
            ResourceKind::VirtualMachine => VirtualMachine::param_types(),
            ResourceKind::VirtualMachineSnapshot => VirtualMachineSnapshot::param_types(),
            ResourceKind::Vnic => Vnic::param_types(),
            ResourceKind::Dynamic => Dynamic::param_types(),
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// One configured resource and its record.
#[derive(Debug, Clone)]
pub struct Resource {
    pub kind: ResourceKind,
    pub ensure: Ensure,
    pub data: ResourceData,
}

#[derive(Debug, Clone)]
pub enum ResourceState {
    VirtualMachine(Option<MachineState>),
    VirtualMachineSnapshot(Option<vsphere_machine::SnapshotInfo>),
    Vnic(Option<VnicState>),
    Dynamic(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceChange {
    VirtualMachine(MachineChange),
    VirtualMachineSnapshot(SnapshotChange),
    Vnic(VnicChange),
}

#[derive(Debug, Error)]
pub enum ResourceStateError {
    #[error(transparent)]
    VirtualMachine(#[from] MachineStateError),

    #[error(transparent)]
    VirtualMachineSnapshot(#[from] SnapshotStateError),

    #[error(transparent)]
    Vnic(#[from] VnicStateError),

    #[error(transparent)]
    Dynamic(#[from] DynamicError),
}

#[derive(Debug, Error)]
pub enum ResourceChangeError {
    #[error(transparent)]
    VirtualMachine(#[from] MachineChangeError),

    #[error("virtual machine snapshot: {0}")]
    VirtualMachineSnapshot(#[from] DataError),

    #[error(transparent)]
    Vnic(#[from] VnicError),

    #[error("{kind} resource was paired with another resource's state")]
    StateMismatch { kind: ResourceKind },
}

#[derive(Debug, Error)]
pub enum ResourceRecordError {
    #[error(transparent)]
    VirtualMachine(#[from] CodecError),

    #[error("virtual machine snapshot: {0}")]
    VirtualMachineSnapshot(#[from] DataError),

    #[error("{kind} resource was paired with another resource's state")]
    StateMismatch { kind: ResourceKind },
}

impl Resource {
    pub fn new(kind: ResourceKind, ensure: Ensure, data: ResourceData) -> Self {
        Self { kind, ensure, data }
    }

    pub async fn state(&self, client: &dyn Client) -> Result<ResourceState, ResourceStateError> {
        let state = match self.kind {
            ResourceKind::VirtualMachine => {
                ResourceState::VirtualMachine(VirtualMachine::state(client, &self.data).await?)
            }
            ResourceKind::VirtualMachineSnapshot => ResourceState::VirtualMachineSnapshot(
                VirtualMachineSnapshot::state(client, &self.data).await?,
            ),
            ResourceKind::Vnic => ResourceState::Vnic(Vnic::state(client, &self.data).await?),
            ResourceKind::Dynamic => {
                ResourceState::Dynamic(Dynamic::state(client, &self.data).await?)
            }
        };
        Ok(state)
    }

    pub fn change(
        &mut self,
        state: &ResourceState,
        env: &Environment,
    ) -> Result<Option<ResourceChange>, ResourceChangeError> {
        let ensure = self.ensure;
        let data = &mut self.data;
        let change = match (self.kind, state) {
            (ResourceKind::VirtualMachine, ResourceState::VirtualMachine(state)) => {
                VirtualMachine::change(ensure, data, state, env)?
                    .map(ResourceChange::VirtualMachine)
            }
            (ResourceKind::VirtualMachineSnapshot, ResourceState::VirtualMachineSnapshot(state)) => {
                VirtualMachineSnapshot::change(ensure, data, state, env)?
                    .map(ResourceChange::VirtualMachineSnapshot)
            }
            (ResourceKind::Vnic, ResourceState::Vnic(state)) => {
                Vnic::change(ensure, data, state, env)?.map(ResourceChange::Vnic)
            }
            (ResourceKind::Dynamic, ResourceState::Dynamic(state)) => {
                match Dynamic::change(ensure, data, state, env) {
                    Ok(None) => None,
                    Ok(Some(never)) | Err(never) => match never {},
                }
            }
            (kind, _) => return Err(ResourceChangeError::StateMismatch { kind }),
        };
        Ok(change)
    }

    /// The id to record for an object created while applying this
    /// resource's operations.
    pub fn created_id(&self, created: &str) -> String {
        match self.kind {
            ResourceKind::VirtualMachine => VirtualMachine::created_id(&self.data, created),
            ResourceKind::VirtualMachineSnapshot => {
                VirtualMachineSnapshot::created_id(&self.data, created)
            }
            ResourceKind::Vnic => Vnic::created_id(&self.data, created),
            ResourceKind::Dynamic => Dynamic::created_id(&self.data, created),
        }
    }

    pub fn record(
        &mut self,
        state: &ResourceState,
        env: &Environment,
    ) -> Result<(), ResourceRecordError> {
        let data = &mut self.data;
        match (self.kind, state) {
            (ResourceKind::VirtualMachine, ResourceState::VirtualMachine(state)) => {
                VirtualMachine::record(data, state, env)?
            }
            (ResourceKind::VirtualMachineSnapshot, ResourceState::VirtualMachineSnapshot(state)) => {
                VirtualMachineSnapshot::record(data, state, env)?
            }
            (ResourceKind::Vnic, ResourceState::Vnic(state)) => {
                Vnic::record(data, state, env).unwrap_or_else(|never| match never {})
            }
            (ResourceKind::Dynamic, ResourceState::Dynamic(state)) => {
                Dynamic::record(data, state, env).unwrap_or_else(|never| match never {})
            }
            (kind, _) => return Err(ResourceRecordError::StateMismatch { kind }),
        }
        Ok(())
    }
}

impl ResourceChange {
    pub fn operations(self) -> Vec<Operation> {
        match self {
            ResourceChange::VirtualMachine(change) => VirtualMachine::operations(change),
            ResourceChange::VirtualMachineSnapshot(change) => {
                VirtualMachineSnapshot::operations(change)
            }
            ResourceChange::Vnic(change) => Vnic::operations(change),
        }
    }
}

/// Step 1: query current state for each resource.
pub async fn query_states(
    client: &dyn Client,
    resources: &[Resource],
) -> Result<Vec<ResourceState>, ResourceStateError> {
    let mut out = Vec::with_capacity(resources.len());
    for resource in resources {
        out.push(resource.state(client).await?);
    }
    Ok(out)
}

/// Step 2: compute changes from resource and state pairs, by resource index.
/// Assumes `states` is a response to `resources` in order.
pub fn resources_to_changes(
    resources: &mut [Resource],
    states: &[ResourceState],
    env: &Environment,
) -> Result<Vec<(usize, ResourceChange)>, ResourceChangeError> {
    let mut out = Vec::new();
    for (index, (resource, state)) in resources.iter_mut().zip(states).enumerate() {
        if let Some(change) = resource.change(state, env)? {
            out.push((index, change));
        }
    }
    Ok(out)
}

/// Step 3: convert changes to operations, keeping the resource index.
pub fn changes_to_operations(changes: Vec<(usize, ResourceChange)>) -> Vec<(usize, Vec<Operation>)> {
    changes
        .into_iter()
        .map(|(index, change)| (index, Operation::merge(change.operations())))
        .filter(|(_, operations)| !operations.is_empty())
        .collect()
}
