mod codec;
mod diff;
mod extra_config;
mod guest;
mod restart;
mod schema;
mod vapp;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};
use vsphere_client::{Client, ClientError, resolve_moid};
use vsphere_machine::{ConfigInfo, GuestInfo, MachineConfig, PowerState, VIRTUAL_MACHINE_TYPE};
use vsphere_operation::Operation;
use vsphere_operation::operations::machine::MachineOperation;
use vsphere_params::ParamTypes;
use vsphere_store::ResourceData;

pub use self::codec::{CodecError, expand, flatten};
pub use self::diff::{Changed, changed};
pub use self::guest::{GuestIpSelection, record_guest_addresses, select_primary};
pub use self::restart::{RestartRequirement, classify_cpu, classify_memory};
pub use self::vapp::{VAppError, VAppPropertyMode};

use crate::{Ensure, Environment, ResourceType};

/// What the endpoint reports for one machine.
#[derive(Debug, Clone)]
pub struct MachineState {
    pub moid: String,
    pub power_state: PowerState,
    pub info: ConfigInfo,
    pub guest: GuestInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MachineChange {
    pub uuid: String,
    pub spec: MachineConfig,
    /// Fields whose change needs the machine powered off.
    pub restart: Vec<String>,
    pub power_state: PowerState,
}

#[derive(Debug, Error)]
#[error("reading virtual machine {uuid}: {source}")]
pub struct MachineStateError {
    pub uuid: String,
    pub source: ClientError,
}

#[derive(Debug, Error)]
pub enum MachineChangeError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("virtual machine {uuid:?} not found, and creating machines is not supported")]
    NotFound { uuid: String },

    #[error("removing virtual machine {uuid} is not supported")]
    RemovalUnsupported { uuid: String },
}

#[derive(Debug, Clone)]
pub struct VirtualMachine;

#[async_trait]
impl ResourceType for VirtualMachine {
    const ID: &'static str = "vsphere_virtual_machine";

    fn param_types() -> ParamTypes {
        schema::param_types()
    }

    type State = Option<MachineState>;
    type StateError = MachineStateError;

    async fn state(
        client: &dyn Client,
        data: &ResourceData,
    ) -> Result<Self::State, Self::StateError> {
        let uuid = data.id();
        if uuid.is_empty() {
            return Ok(None);
        }
        let error = |source| MachineStateError {
            uuid: uuid.to_string(),
            source,
        };

        let info = match client.config_info(uuid).await {
            Ok(info) => info,
            Err(err) if err.is_not_found() => {
                debug!(%uuid, "virtual machine is gone");
                return Ok(None);
            }
            Err(err) => return Err(error(err)),
        };
        let guest = client.guest_info(uuid).await.map_err(error)?;
        let power_state = client.power_state(uuid).await.map_err(error)?;
        let moid = resolve_moid(client, VIRTUAL_MACHINE_TYPE, uuid).await;

        Ok(Some(MachineState {
            moid,
            power_state,
            info,
            guest,
        }))
    }

    type Change = MachineChange;
    type ChangeError = MachineChangeError;

    fn change(
        ensure: Ensure,
        data: &mut ResourceData,
        state: &Self::State,
        env: &Environment,
    ) -> Result<Option<Self::Change>, Self::ChangeError> {
        let uuid = data.id().to_string();
        let state = match (ensure, state) {
            (Ensure::Absent, None) => return Ok(None),
            (Ensure::Absent, Some(_)) => {
                return Err(MachineChangeError::RemovalUnsupported { uuid });
            }
            (Ensure::Present, None) => return Err(MachineChangeError::NotFound { uuid }),
            (Ensure::Present, Some(state)) => state,
        };

        let mut restart = RestartRequirement::new();
        let diff = changed(data, &state.info, env, &mut restart)?;
        data.set("reboot_required", restart.is_required());
        if !diff.changed {
            debug!(%uuid, "virtual machine is up to date");
            return Ok(None);
        }

        info!(
            %uuid,
            differences = ?diff.differences,
            restart = ?restart.reasons(),
            "virtual machine needs reconfiguring"
        );
        Ok(Some(MachineChange {
            uuid,
            spec: diff.spec,
            restart: restart.reasons().to_vec(),
            power_state: state.power_state,
        }))
    }

    fn operations(change: Self::Change) -> Vec<Operation> {
        let MachineChange {
            uuid,
            spec,
            restart,
            power_state,
        } = change;
        let reconfigure = MachineOperation::Reconfigure {
            uuid: uuid.clone(),
            spec: Box::new(spec),
        };
        if restart.is_empty() || power_state != PowerState::PoweredOn {
            return vec![reconfigure.into()];
        }
        vec![
            MachineOperation::PowerOff { uuid: uuid.clone() }.into(),
            reconfigure.into(),
            MachineOperation::PowerOn { uuid }.into(),
        ]
    }

    type RecordError = CodecError;

    fn record(
        data: &mut ResourceData,
        state: &Self::State,
        env: &Environment,
    ) -> Result<(), Self::RecordError> {
        let Some(state) = state else {
            data.set_id("");
            return Ok(());
        };
        flatten(data, &state.info, env)?;
        // Not reported back by the endpoint, so keep what was last sent.
        if let Some(policy) = data.get("storage_policy_id").cloned() {
            data.set("storage_policy_id", policy);
        }
        data.set("moid", state.moid.as_str());
        record_guest_addresses(data, &state.guest);
        Ok(())
    }
}
