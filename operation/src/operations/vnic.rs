use async_trait::async_trait;
use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use vsphere_client::{Client, ClientError};
use vsphere_machine::{HostVirtualNicSpec, VnicService};

use crate::{Applied, OperationType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VnicOperation {
    /// Services are selected once the new device name is known.
    Add {
        host: String,
        portgroup: String,
        spec: Box<HostVirtualNicSpec>,
        services: Vec<VnicService>,
    },
    Update {
        host: String,
        device: String,
        spec: Box<HostVirtualNicSpec>,
    },
    Remove {
        host: String,
        device: String,
    },
    Deselect {
        host: String,
        device: String,
        service: VnicService,
    },
    Select {
        host: String,
        device: String,
        service: VnicService,
    },
}

impl VnicOperation {
    fn host(&self) -> &str {
        match self {
            VnicOperation::Add { host, .. }
            | VnicOperation::Update { host, .. }
            | VnicOperation::Remove { host, .. }
            | VnicOperation::Deselect { host, .. }
            | VnicOperation::Select { host, .. } => host,
        }
    }
}

impl Display for VnicOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VnicOperation::Add {
                host, portgroup, ..
            } => write!(f, "Vnic::Add({host}, portgroup = {portgroup})"),
            VnicOperation::Update { host, device, .. } => {
                write!(f, "Vnic::Update({host}, {device})")
            }
            VnicOperation::Remove { host, device } => write!(f, "Vnic::Remove({host}, {device})"),
            VnicOperation::Deselect {
                host,
                device,
                service,
            } => write!(f, "Vnic::Deselect({host}, {device}, {service})"),
            VnicOperation::Select {
                host,
                device,
                service,
            } => write!(f, "Vnic::Select({host}, {device}, {service})"),
        }
    }
}

#[derive(Error, Debug)]
#[error("{operation} on host {host}: {source}")]
pub struct VnicApplyError {
    pub operation: &'static str,
    pub host: String,
    pub source: ClientError,
}

#[derive(Debug, Clone)]
pub struct Vnic;

#[async_trait]
impl OperationType for Vnic {
    type Operation = VnicOperation;

    // Adapter changes, then service deselection, then selection. A host's
    // service set is never briefly empty of a device that keeps it.
    fn merge(operations: Vec<Self::Operation>) -> Vec<Self::Operation> {
        let mut changes = Vec::new();
        let mut deselects = Vec::new();
        let mut selects = Vec::new();
        for operation in operations {
            let bucket = match operation {
                VnicOperation::Deselect { .. } => &mut deselects,
                VnicOperation::Select { .. } => &mut selects,
                _ => &mut changes,
            };
            if !bucket.contains(&operation) {
                bucket.push(operation);
            }
        }
        changes.extend(deselects);
        changes.extend(selects);
        changes
    }

    type ApplyError = VnicApplyError;

    async fn apply(
        client: &dyn Client,
        // Host network calls return directly, without a task.
        _task_timeout: Duration,
        operation: &Self::Operation,
    ) -> Result<Applied, Self::ApplyError> {
        let name = match operation {
            VnicOperation::Add { .. } => "add virtual nic",
            VnicOperation::Update { .. } => "update virtual nic",
            VnicOperation::Remove { .. } => "remove virtual nic",
            VnicOperation::Deselect { .. } => "deselect virtual nic",
            VnicOperation::Select { .. } => "select virtual nic",
        };
        let error = |source| VnicApplyError {
            operation: name,
            host: operation.host().to_string(),
            source,
        };

        info!(host = operation.host(), "[vnic] {name}");
        match operation {
            VnicOperation::Add {
                host,
                portgroup,
                spec,
                services,
            } => {
                let device = client
                    .add_virtual_nic(host, portgroup, spec)
                    .await
                    .map_err(error)?;
                for service in services {
                    client
                        .select_vnic(host, *service, &device)
                        .await
                        .map_err(error)?;
                }
                Ok(Applied::Created(device))
            }
            VnicOperation::Update { host, device, spec } => {
                client
                    .update_virtual_nic(host, device, spec)
                    .await
                    .map_err(error)?;
                Ok(Applied::Done)
            }
            VnicOperation::Remove { host, device } => {
                client
                    .remove_virtual_nic(host, device)
                    .await
                    .map_err(error)?;
                Ok(Applied::Done)
            }
            VnicOperation::Deselect {
                host,
                device,
                service,
            } => {
                client
                    .deselect_vnic(host, *service, device)
                    .await
                    .map_err(error)?;
                Ok(Applied::Done)
            }
            VnicOperation::Select {
                host,
                device,
                service,
            } => {
                client
                    .select_vnic(host, *service, device)
                    .await
                    .map_err(error)?;
                Ok(Applied::Done)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use vsphere_client::{DEFAULT_TASK_TIMEOUT, HostNetworkClient};
    use vsphere_client::memory::{HostRecord, Inventory, MemoryClient};

    use super::*;

    fn client() -> MemoryClient {
        let mut inventory = Inventory::default();
        inventory
            .hosts
            .insert("host-1".to_string(), HostRecord::default());
        MemoryClient::new(inventory)
    }

    fn select(service: VnicService) -> VnicOperation {
        VnicOperation::Select {
            host: "host-1".to_string(),
            device: "vmk1".to_string(),
            service,
        }
    }

    fn deselect(service: VnicService) -> VnicOperation {
        VnicOperation::Deselect {
            host: "host-1".to_string(),
            device: "vmk1".to_string(),
            service,
        }
    }

    #[test]
    fn merge_orders_changes_then_deselects_then_selects() {
        let update = VnicOperation::Update {
            host: "host-1".to_string(),
            device: "vmk1".to_string(),
            spec: Box::default(),
        };
        let merged = Vnic::merge(vec![
            select(VnicService::Vmotion),
            deselect(VnicService::Vsan),
            update.clone(),
            select(VnicService::Vmotion),
        ]);
        assert_eq!(
            merged,
            vec![update, deselect(VnicService::Vsan), select(VnicService::Vmotion)]
        );
    }

    #[tokio::test]
    async fn add_selects_services_on_new_device() {
        let client = client();
        let applied = Vnic::apply(
            &client,
            DEFAULT_TASK_TIMEOUT,
            &VnicOperation::Add {
                host: "host-1".to_string(),
                portgroup: "Management Network".to_string(),
                spec: Box::default(),
                services: vec![VnicService::Management],
            },
        )
        .await
        .unwrap();
        assert_eq!(applied, Applied::Created("vmk0".to_string()));

        let configs = client.nic_net_configs("host-1").await.unwrap();
        assert_eq!(configs[0].nic_type, "management");
        assert_eq!(configs[0].selected_vnic, vec!["vmk0"]);
    }

    #[tokio::test]
    async fn update_of_missing_device_names_operation() {
        let client = client();
        let err = Vnic::apply(
            &client,
            DEFAULT_TASK_TIMEOUT,
            &VnicOperation::Update {
                host: "host-1".to_string(),
                device: "vmk5".to_string(),
                spec: Box::default(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.operation, "update virtual nic");
        assert!(err.source.is_not_found());
    }
}
