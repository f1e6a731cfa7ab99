use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vsphere_client::memory::Inventory;
use vsphere_params::{ParamValidationErrors, ParamValues, validate};
use vsphere_resource::{Ensure, Resource, ResourceKind};
use vsphere_store::{ConnectionInfo, ResourceData};
use vsphere_version::VSphereVersion;

/// A plan file: the endpoint to run against and the resources to reconcile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanInput {
    pub version: Option<VSphereVersion>,
    pub inventory: Inventory,
    pub resources: Vec<ResourceInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInput {
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default)]
    pub id: String,
    /// Desired configuration.
    #[serde(default)]
    pub config: IndexMap<String, Value>,
    /// What the previous cycle recorded.
    #[serde(default)]
    pub state: IndexMap<String, Value>,
}

impl ResourceInput {
    /// Validate the configuration and build the resource with its record.
    pub fn into_resource(self) -> Result<Resource, ParamValidationErrors> {
        let schema = self.kind.param_types();
        let config: ParamValues = self.config.into_iter().collect();
        validate(&schema, &config)?;

        let state: ParamValues = self.state.into_iter().collect();
        let mut data = ResourceData::new(&schema, config, state);
        data.set_id(self.id);
        Ok(Resource::new(self.kind, self.ensure, data))
    }
}

/// A resource's record after the cycle, fed back as `state` next time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutput {
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub id: String,
    pub state: Value,
    #[serde(skip_serializing_if = "IndexMap::is_empty", default)]
    pub conn_info: ConnectionInfo,
}

impl From<&Resource> for ResourceOutput {
    fn from(resource: &Resource) -> Self {
        Self {
            kind: resource.kind,
            id: resource.data.id().to_string(),
            state: resource.data.state().into_value(),
            conn_info: resource.data.conn_info().clone(),
        }
    }
}
