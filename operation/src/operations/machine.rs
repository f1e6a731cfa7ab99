use async_trait::async_trait;
use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use vsphere_client::{Client, ClientError, wait_for_task};
use vsphere_machine::MachineConfig;

use crate::{Applied, OperationType};

#[derive(Debug, Clone, PartialEq)]
pub enum MachineOperation {
    PowerOff { uuid: String },
    Reconfigure {
        uuid: String,
        spec: Box<MachineConfig>,
    },
    PowerOn { uuid: String },
}

impl MachineOperation {
    pub fn uuid(&self) -> &str {
        match self {
            MachineOperation::PowerOff { uuid }
            | MachineOperation::Reconfigure { uuid, .. }
            | MachineOperation::PowerOn { uuid } => uuid,
        }
    }
}

impl Display for MachineOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachineOperation::PowerOff { uuid } => write!(f, "VirtualMachine::PowerOff({uuid})"),
            MachineOperation::Reconfigure { uuid, spec } => {
                write!(f, "VirtualMachine::Reconfigure({uuid}, name = {})", spec.name)
            }
            MachineOperation::PowerOn { uuid } => write!(f, "VirtualMachine::PowerOn({uuid})"),
        }
    }
}

#[derive(Error, Debug)]
#[error("{operation} of virtual machine {uuid}: {source}")]
pub struct MachineApplyError {
    pub operation: &'static str,
    pub uuid: String,
    pub source: ClientError,
}

#[derive(Debug, Clone)]
pub struct Machine;

#[derive(Default)]
struct PerMachine {
    power_off: bool,
    reconfigure: Option<Box<MachineConfig>>,
    power_on: bool,
}

#[async_trait]
impl OperationType for Machine {
    type Operation = MachineOperation;

    // Per machine, in first-seen order: power off, reconfigure, power on.
    // A later reconfigure replaces an earlier one.
    fn merge(operations: Vec<Self::Operation>) -> Vec<Self::Operation> {
        let mut machines: Vec<(String, PerMachine)> = Vec::new();

        for operation in operations {
            let index = match machines.iter().position(|(uuid, _)| uuid == operation.uuid()) {
                Some(index) => index,
                None => {
                    machines.push((operation.uuid().to_string(), PerMachine::default()));
                    machines.len() - 1
                }
            };
            let entry = &mut machines[index].1;
            match operation {
                MachineOperation::PowerOff { .. } => entry.power_off = true,
                MachineOperation::Reconfigure { spec, .. } => entry.reconfigure = Some(spec),
                MachineOperation::PowerOn { .. } => entry.power_on = true,
            }
        }

        let mut operations = Vec::new();
        for (uuid, entry) in machines {
            if entry.power_off {
                operations.push(MachineOperation::PowerOff { uuid: uuid.clone() });
            }
            if let Some(spec) = entry.reconfigure {
                operations.push(MachineOperation::Reconfigure {
                    uuid: uuid.clone(),
                    spec,
                });
            }
            if entry.power_on {
                operations.push(MachineOperation::PowerOn { uuid });
            }
        }
        operations
    }

    type ApplyError = MachineApplyError;

    async fn apply(
        client: &dyn Client,
        task_timeout: Duration,
        operation: &Self::Operation,
    ) -> Result<Applied, Self::ApplyError> {
        let (name, uuid) = match operation {
            MachineOperation::PowerOff { uuid } => ("power off", uuid),
            MachineOperation::Reconfigure { uuid, .. } => ("reconfigure", uuid),
            MachineOperation::PowerOn { uuid } => ("power on", uuid),
        };
        let error = |source| MachineApplyError {
            operation: name,
            uuid: uuid.clone(),
            source,
        };

        info!(%uuid, "[virtual machine] {name}");
        let task = match operation {
            MachineOperation::PowerOff { uuid } => client.power_off(uuid).await,
            MachineOperation::Reconfigure { uuid, spec } => client.reconfigure(uuid, spec).await,
            MachineOperation::PowerOn { uuid } => client.power_on(uuid).await,
        }
        .map_err(error)?;

        wait_for_task(client, &task, task_timeout)
            .await
            .map_err(error)?;

        Ok(Applied::Done)
    }
}

#[cfg(test)]
mod tests {
    use vsphere_client::DEFAULT_TASK_TIMEOUT;
    use vsphere_client::memory::{Inventory, MachineRecord, MemoryClient};
    use vsphere_machine::PowerState;

    use super::*;

    fn reconfigure(uuid: &str, cpus: i32) -> MachineOperation {
        MachineOperation::Reconfigure {
            uuid: uuid.to_string(),
            spec: Box::new(MachineConfig {
                num_cpus: cpus,
                ..Default::default()
            }),
        }
    }

    fn client() -> MemoryClient {
        let mut inventory = Inventory::default();
        inventory.machines.insert(
            "a".to_string(),
            MachineRecord {
                moid: "vm-1".to_string(),
                power_state: PowerState::PoweredOn,
                ..Default::default()
            },
        );
        MemoryClient::new(inventory)
    }

    #[test]
    fn merge_orders_power_around_reconfigure() {
        let merged = Machine::merge(vec![
            MachineOperation::PowerOn {
                uuid: "a".to_string(),
            },
            reconfigure("a", 2),
            MachineOperation::PowerOff {
                uuid: "a".to_string(),
            },
            reconfigure("b", 1),
            reconfigure("a", 4),
        ]);
        assert_eq!(
            merged,
            vec![
                MachineOperation::PowerOff {
                    uuid: "a".to_string()
                },
                reconfigure("a", 4),
                MachineOperation::PowerOn {
                    uuid: "a".to_string()
                },
                reconfigure("b", 1),
            ]
        );
    }

    #[tokio::test]
    async fn apply_waits_for_task() {
        let client = client();
        let applied = Machine::apply(&client, DEFAULT_TASK_TIMEOUT, &reconfigure("a", 2))
            .await
            .unwrap();
        assert_eq!(applied, Applied::Done);
        assert_eq!(client.calls(), vec!["reconfigure(a)", "wait(reconfigure)"]);
        assert_eq!(client.inventory().machines["a"].config.hardware.num_cpu, 2);
    }

    #[tokio::test]
    async fn apply_gives_up_after_task_timeout() {
        let client = client().slow_tasks(Duration::from_secs(60));
        let timeout = Duration::from_millis(10);
        let err = Machine::apply(&client, timeout, &reconfigure("a", 2))
            .await
            .unwrap_err();
        assert_eq!(err.operation, "reconfigure");
        assert!(matches!(err.source, ClientError::Timeout { after, .. } if after == timeout));
    }

    #[tokio::test]
    async fn apply_reports_which_operation_failed() {
        let client = client().failing_tasks();
        let err = Machine::apply(
            &client,
            DEFAULT_TASK_TIMEOUT,
            &MachineOperation::PowerOff {
                uuid: "a".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.operation, "power off");
        assert_eq!(err.uuid, "a");
    }
}
