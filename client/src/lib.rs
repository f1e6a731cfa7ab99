//! The remote side of reconciliation, as traits.
//!
//! Session handling and wire framing live behind these traits; the rest of
//! the workspace only sees typed shapes from `vsphere-machine`.

pub mod memory;
mod moid;
mod task;

use async_trait::async_trait;
use thiserror::Error;
use vsphere_machine::{
    AttachedObjects, ConfigInfo, GuestInfo, HostVirtualNic, HostVirtualNicSpec, MachineConfig,
    ManagedObjectReference, PowerState, SnapshotInfo, SnapshotRemoval, SnapshotSpec,
    VirtualNicNetConfig, VnicService,
};

pub use crate::moid::resolve_moid;
pub use crate::task::{DEFAULT_TASK_TIMEOUT, Task, TaskClient, wait_for_task};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("{kind} {id:?} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("task {task} failed: {message}")]
    TaskFailed { task: String, message: String },

    #[error("task {task} timed out after {after:?}")]
    Timeout {
        task: String,
        after: std::time::Duration,
    },

    #[error("{operation} failed: {message}")]
    Remote {
        operation: &'static str,
        message: String,
    },
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }
}

#[async_trait]
pub trait VirtualMachineClient: Send + Sync {
    async fn config_info(&self, uuid: &str) -> Result<ConfigInfo, ClientError>;

    async fn guest_info(&self, uuid: &str) -> Result<GuestInfo, ClientError>;

    async fn power_state(&self, uuid: &str) -> Result<PowerState, ClientError>;

    async fn reconfigure(&self, uuid: &str, spec: &MachineConfig) -> Result<Task, ClientError>;

    async fn power_on(&self, uuid: &str) -> Result<Task, ClientError>;

    /// Hard power off, no guest shutdown.
    async fn power_off(&self, uuid: &str) -> Result<Task, ClientError>;
}

#[async_trait]
pub trait SnapshotClient: Send + Sync {
    async fn create_snapshot(&self, vm_uuid: &str, spec: &SnapshotSpec)
    -> Result<Task, ClientError>;

    /// `None` when the machine has no such snapshot.
    async fn find_snapshot(
        &self,
        vm_uuid: &str,
        snapshot_id: &str,
    ) -> Result<Option<SnapshotInfo>, ClientError>;

    async fn remove_snapshot(
        &self,
        vm_uuid: &str,
        snapshot_id: &str,
        removal: SnapshotRemoval,
    ) -> Result<Task, ClientError>;
}

#[async_trait]
pub trait HostNetworkClient: Send + Sync {
    async fn virtual_nics(&self, host: &str) -> Result<Vec<HostVirtualNic>, ClientError>;

    /// Returns the new device name, such as `vmk1`.
    async fn add_virtual_nic(
        &self,
        host: &str,
        portgroup: &str,
        spec: &HostVirtualNicSpec,
    ) -> Result<String, ClientError>;

    async fn update_virtual_nic(
        &self,
        host: &str,
        device: &str,
        spec: &HostVirtualNicSpec,
    ) -> Result<(), ClientError>;

    async fn remove_virtual_nic(&self, host: &str, device: &str) -> Result<(), ClientError>;

    async fn nic_net_configs(&self, host: &str) -> Result<Vec<VirtualNicNetConfig>, ClientError>;

    async fn select_vnic(
        &self,
        host: &str,
        service: VnicService,
        device: &str,
    ) -> Result<(), ClientError>;

    async fn deselect_vnic(
        &self,
        host: &str,
        service: VnicService,
        device: &str,
    ) -> Result<(), ClientError>;
}

#[async_trait]
pub trait TagClient: Send + Sync {
    /// One entry per tag id, in request order.
    async fn attached_objects(&self, tag_ids: &[String])
    -> Result<Vec<AttachedObjects>, ClientError>;

    async fn object_name(&self, object: &ManagedObjectReference) -> Result<String, ClientError>;
}

#[async_trait]
pub trait InventoryClient: Send + Sync {
    async fn virtual_machine_by_uuid(
        &self,
        uuid: &str,
    ) -> Result<ManagedObjectReference, ClientError>;

    async fn distributed_switch_by_uuid(
        &self,
        uuid: &str,
    ) -> Result<ManagedObjectReference, ClientError>;
}

/// Everything a reconciliation cycle may call.
pub trait Client:
    VirtualMachineClient + TaskClient + SnapshotClient + HostNetworkClient + TagClient + InventoryClient
{
}

impl<T> Client for T where
    T: VirtualMachineClient
        + TaskClient
        + SnapshotClient
        + HostNetworkClient
        + TagClient
        + InventoryClient
{
}
