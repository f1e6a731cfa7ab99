use std::convert::Infallible;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use vsphere_client::{Client, ClientError};
use vsphere_machine::AttachedObjects;
use vsphere_operation::Operation;
use vsphere_params::{ParamField, ParamType, ParamTypes};
use vsphere_store::{DataError, ResourceData};

use crate::{Ensure, Environment, ResourceType};

#[derive(Debug, Error)]
pub enum DynamicError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("invalid name_regex: {0}")]
    Regex(#[from] regex::Error),

    #[error("looking up tagged objects: {0}")]
    Client(#[from] ClientError),

    #[error("no resources match filter")]
    NoTagged,

    #[error("no matching resources found")]
    NoMatch,

    #[error("multiple objects match the supplied criteria")]
    Multiple { matches: Vec<String> },
}

/// Finds the one managed object carrying every tag in `filter`.
///
/// A read-only lookup: it never plans operations, and its id is the
/// managed object id of the match.
#[derive(Debug, Clone)]
pub struct Dynamic;

fn tag_ids(data: &ResourceData) -> Result<Vec<String>, DataError> {
    let mut ids: Vec<String> = Vec::new();
    for value in data.get_list("filter")? {
        let Value::String(id) = value else {
            return Err(DataError::WrongType {
                key: "filter".to_string(),
                expected: "string",
                got: value.clone(),
            });
        };
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }
    Ok(ids)
}

#[async_trait]
impl ResourceType for Dynamic {
    const ID: &'static str = "vsphere_dynamic";

    fn param_types() -> ParamTypes {
        ParamTypes::new()
            .field("filter", ParamField::new(ParamType::list(ParamType::String)))
            .field("name_regex", ParamField::new(ParamType::String).optional())
            .field("type", ParamField::new(ParamType::String).optional())
    }

    type State = String;
    type StateError = DynamicError;

    async fn state(
        client: &dyn Client,
        data: &ResourceData,
    ) -> Result<Self::State, Self::StateError> {
        let tag_ids = tag_ids(data)?;
        let name_regex = Regex::new(data.get_str("name_regex")?)?;
        let object_type = data.get_str("type")?;

        let attached = client.attached_objects(&tag_ids).await?;
        let tagged = attached
            .iter()
            .skip(1)
            .fold(attached.first().cloned(), |acc, next| {
                acc.map(|acc: AttachedObjects| acc.intersection(next))
            })
            .map(|objects| objects.object_ids)
            .unwrap_or_default();
        if tagged.is_empty() {
            return Err(DynamicError::NoTagged);
        }

        let mut matches = Vec::new();
        for object in &tagged {
            if !object_type.is_empty() && object.kind != object_type {
                continue;
            }
            let name = client.object_name(object).await?;
            if name_regex.is_match(&name) {
                debug!(%name, moid = %object.value, "tagged object matches");
                matches.push(object.value.clone());
            }
        }

        match matches.len() {
            0 => Err(DynamicError::NoMatch),
            1 => {
                let found = matches.remove(0);
                info!(moid = %found, "located tagged object");
                Ok(found)
            }
            _ => {
                debug!(?matches, "multiple tagged objects match");
                Err(DynamicError::Multiple { matches })
            }
        }
    }

    type Change = Infallible;
    type ChangeError = Infallible;

    fn change(
        _ensure: Ensure,
        _data: &mut ResourceData,
        _state: &Self::State,
        _env: &Environment,
    ) -> Result<Option<Self::Change>, Self::ChangeError> {
        Ok(None)
    }

    fn operations(change: Self::Change) -> Vec<Operation> {
        match change {}
    }

    type RecordError = Infallible;

    fn record(
        data: &mut ResourceData,
        state: &Self::State,
        _env: &Environment,
    ) -> Result<(), Self::RecordError> {
        data.set_id(state.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use vsphere_client::memory::{Inventory, MemoryClient};
    use vsphere_machine::{ManagedObjectReference, VIRTUAL_MACHINE_TYPE};
    use vsphere_params::ParamValues;
    use vsphere_version::VSphereVersion;

    use super::*;

    fn client() -> MemoryClient {
        let vm = |v: &str| ManagedObjectReference::new(VIRTUAL_MACHINE_TYPE, v);
        let folder = ManagedObjectReference::new("Folder", "group-v3");
        let mut inventory = Inventory::default();
        inventory.tags.insert(
            "urn:tag:web".to_string(),
            vec![vm("vm-1"), vm("vm-2"), folder.clone()],
        );
        inventory
            .tags
            .insert("urn:tag:prod".to_string(), vec![vm("vm-2"), vm("vm-1"), folder]);
        for (moid, name) in [("vm-1", "web-01"), ("vm-2", "web-02"), ("group-v3", "web")] {
            inventory.names.insert(moid.to_string(), name.to_string());
        }
        MemoryClient::new(inventory)
    }

    fn data(config: Value) -> ResourceData {
        ResourceData::new(
            &Dynamic::param_types(),
            ParamValues::from_value(config).unwrap(),
            ParamValues::new(),
        )
    }

    #[tokio::test]
    async fn finds_single_match_and_records_id() {
        let client = client();
        let mut data = data(json!({
            "filter": ["urn:tag:web", "urn:tag:prod", "urn:tag:web"],
            "name_regex": "-02$",
        }));
        let state = Dynamic::state(&client, &data).await.unwrap();
        assert_eq!(state, "vm-2");
        let env = Environment::new(VSphereVersion::new("VMware vCenter Server", 8, 0, 0, 0));
        assert_eq!(Dynamic::change(Ensure::Present, &mut data, &state, &env), Ok(None));
        Dynamic::record(&mut data, &state, &env).unwrap();
        assert_eq!(data.id(), "vm-2");
    }

    #[tokio::test]
    async fn type_filter_narrows_matches() {
        let client = client();
        let data = data(json!({ "filter": ["urn:tag:web"], "type": "Folder" }));
        assert_eq!(Dynamic::state(&client, &data).await.unwrap(), "group-v3");
    }

    #[tokio::test]
    async fn ambiguous_or_empty_results_are_errors() {
        let client = client();
        let err = Dynamic::state(&client, &data(json!({ "filter": ["urn:tag:web"] })))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "multiple objects match the supplied criteria");
        assert!(matches!(err, DynamicError::Multiple { matches } if matches.len() == 3));

        let err = Dynamic::state(
            &client,
            &data(json!({ "filter": ["urn:tag:web"], "name_regex": "^db-" })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "no matching resources found");

        let err = Dynamic::state(&client, &data(json!({ "filter": ["urn:tag:none"] })))
            .await
            .unwrap_err();
        assert!(matches!(err, DynamicError::NoTagged));
    }

    #[tokio::test]
    async fn bad_regex_is_rejected_before_lookup() {
        let client = client();
        let err = Dynamic::state(
            &client,
            &data(json!({ "filter": ["urn:tag:web"], "name_regex": "(" })),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DynamicError::Regex(_)));
    }
}
