use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vsphere_client::Client;
use vsphere_operation::Operation;
use vsphere_params::ParamTypes;
use vsphere_store::ResourceData;

use crate::Environment;

/// Whether a resource should exist after the cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

/// ResourceType:
/// - ParamTypes for the configuration schema
/// - State (read from the endpoint)
/// - Change (delta needed, computed against recorded data)
/// - Conversion from Change -> Operation(s)
/// - Recording of re-read state back into the data
#[async_trait]
pub trait ResourceType {
    const ID: &'static str;

    fn param_types() -> ParamTypes;

    type State: Send + Sync;
    type StateError;
    async fn state(client: &dyn Client, data: &ResourceData)
    -> Result<Self::State, Self::StateError>;

    type Change;
    type ChangeError;
    fn change(
        ensure: Ensure,
        data: &mut ResourceData,
        state: &Self::State,
        env: &Environment,
    ) -> Result<Option<Self::Change>, Self::ChangeError>;

    fn operations(change: Self::Change) -> Vec<Operation>;

    /// The resource id for an object an operation created.
    fn created_id(_data: &ResourceData, created: &str) -> String {
        created.to_string()
    }

    type RecordError;
    fn record(
        data: &mut ResourceData,
        state: &Self::State,
        env: &Environment,
    ) -> Result<(), Self::RecordError>;
}
