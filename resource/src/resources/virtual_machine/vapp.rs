use serde_json::{Map, Value, json};
use thiserror::Error;
use vsphere_machine::{
    ArrayUpdateOperation, ConfigInfo, VAppConfigInfo, VAppConfigSpec, VAppPropertyInfo,
    VAppPropertySpec,
};
use vsphere_store::{DataError, ResourceData};

use super::codec::CodecError;
use super::restart::RestartRequirement;

/// Which declared vApp properties an edit may touch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VAppPropertyMode {
    #[default]
    UserConfigurable,
    /// Every declared property, user-configurable or not.
    IncludeHidden,
}

impl VAppPropertyMode {
    pub fn from_data(data: &ResourceData) -> Result<Self, DataError> {
        if data.get_bool("ovf_deploy.0.enable_hidden_properties")? {
            Ok(VAppPropertyMode::IncludeHidden)
        } else {
            Ok(VAppPropertyMode::UserConfigurable)
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VAppError {
    #[error("vApp properties can only be set on cloned virtual machines")]
    NotCloned,

    #[error("this VM lacks a vApp configuration and cannot have vApp properties set on it")]
    Missing,

    #[error("vApp property with userConfigurable=false specified in vapp.properties: {0:?}")]
    NotUserConfigurable(Vec<String>),

    #[error("unsupported vApp properties in vapp.properties: {0:?}")]
    Unsupported(Vec<String>),
}

fn sorted_keys<'a>(keys: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut keys: Vec<String> = keys.cloned().collect();
    keys.sort();
    keys
}

/// One edit per eligible property declared on the live machine, carrying the
/// configured value, else the declared default, else a single space.
///
/// `None` when `vapp` is unchanged. Any change requires a restart.
pub fn expand_vapp_config(
    data: &ResourceData,
    live: Option<&ConfigInfo>,
    restart: &mut RestartRequirement,
) -> Result<Option<VAppConfigSpec>, CodecError> {
    if !data.has_change("vapp") {
        return Ok(None);
    }
    restart.require("vapp");

    let mut wanted = data.get_string_map("vapp.0.properties")?;

    if data.id().is_empty() {
        if wanted.is_empty() {
            return Ok(None);
        }
        return Err(VAppError::NotCloned.into());
    }

    let declared = live
        .and_then(|info| info.v_app_config.as_ref())
        .ok_or(VAppError::Missing)?;
    let mode = VAppPropertyMode::from_data(data)?;

    let mut properties = Vec::new();
    for property in &declared.property {
        let eligible = mode == VAppPropertyMode::IncludeHidden || property.is_user_configurable();
        if !eligible {
            if wanted.contains_key(&property.id) {
                return Err(VAppError::NotUserConfigurable(sorted_keys(wanted.keys())).into());
            }
            continue;
        }

        let value = match wanted.shift_remove(&property.id) {
            Some(value) => value,
            None if property.default_value.is_empty() => " ".to_string(),
            None => property.default_value.clone(),
        };
        let user_configurable = match mode {
            VAppPropertyMode::IncludeHidden => Some(true),
            VAppPropertyMode::UserConfigurable => property.user_configurable,
        };
        properties.push(VAppPropertySpec {
            operation: ArrayUpdateOperation::Edit,
            info: VAppPropertyInfo {
                key: property.key,
                id: property.id.clone(),
                value,
                default_value: String::new(),
                user_configurable,
            },
        });
    }

    if !wanted.is_empty() {
        return Err(VAppError::Unsupported(sorted_keys(wanted.keys())).into());
    }

    Ok(Some(VAppConfigSpec { properties }))
}

/// Record transports, and the user-configurable properties whose value was
/// changed from the declared default.
pub fn flatten_vapp_config(data: &mut ResourceData, config: Option<&VAppConfigInfo>) {
    let Some(config) = config else {
        data.set("vapp_transport", json!([]));
        return;
    };
    data.set("vapp_transport", json!(config.ovf_environment_transport));

    let properties: Map<String, Value> = config
        .property
        .iter()
        .filter(|p| p.is_user_configurable())
        .filter(|p| !p.value.is_empty() && p.value != p.default_value)
        .map(|p| (p.id.clone(), Value::String(p.value.clone())))
        .collect();
    if !properties.is_empty() {
        data.set("vapp", json!([{ "properties": properties }]));
    }
}

#[cfg(test)]
mod tests {
    use vsphere_params::ParamValues;

    use super::*;
    use crate::resources::virtual_machine::schema::param_types;

    fn data(config: Value, state: Value) -> ResourceData {
        let mut data = ResourceData::new(
            &param_types(),
            ParamValues::from_value(config).unwrap(),
            ParamValues::from_value(state).unwrap(),
        );
        data.set_id("4205c7d0");
        data
    }

    fn property(key: i32, id: &str, default: &str, configurable: Option<bool>) -> VAppPropertyInfo {
        VAppPropertyInfo {
            key,
            id: id.to_string(),
            value: String::new(),
            default_value: default.to_string(),
            user_configurable: configurable,
        }
    }

    fn live() -> ConfigInfo {
        ConfigInfo {
            v_app_config: Some(VAppConfigInfo {
                property: vec![
                    property(0, "hostname", "", Some(true)),
                    property(1, "dns", "1.1.1.1", Some(true)),
                    property(2, "appliance.root", "", Some(false)),
                ],
                ovf_environment_transport: vec!["com.vmware.guestInfo".to_string()],
            }),
            ..Default::default()
        }
    }

    #[test]
    fn unchanged_vapp_sends_nothing() {
        let data = data(json!({}), json!({}));
        let mut restart = RestartRequirement::new();
        assert_eq!(expand_vapp_config(&data, Some(&live()), &mut restart).unwrap(), None);
        assert!(!restart.is_required());
    }

    #[test]
    fn edits_every_user_configurable_property() {
        let data = data(
            json!({ "vapp": [{ "properties": { "hostname": "web-01" } }] }),
            json!({}),
        );
        let mut restart = RestartRequirement::new();
        let spec = expand_vapp_config(&data, Some(&live()), &mut restart)
            .unwrap()
            .unwrap();
        let values: Vec<(&str, &str)> = spec
            .properties
            .iter()
            .map(|p| (p.info.id.as_str(), p.info.value.as_str()))
            .collect();
        assert_eq!(values, vec![("hostname", "web-01"), ("dns", "1.1.1.1")]);
        assert!(restart.is_required());
    }

    #[test]
    fn hidden_mode_edits_all_properties() {
        let data = data(
            json!({
                "vapp": [{ "properties": { "appliance.root": "secret" } }],
                "ovf_deploy": [{ "enable_hidden_properties": true }],
            }),
            json!({}),
        );
        let spec = expand_vapp_config(&data, Some(&live()), &mut RestartRequirement::new())
            .unwrap()
            .unwrap();
        assert_eq!(spec.properties.len(), 3);
        assert_eq!(spec.properties[0].info.value, " ");
        assert_eq!(spec.properties[2].info.value, "secret");
        assert!(spec.properties.iter().all(|p| p.info.user_configurable == Some(true)));
    }

    #[test]
    fn rejects_undeclared_properties() {
        let data = data(
            json!({ "vapp": [{ "properties": { "nope": "1", "hostname": "a", "also.nope": "2" } }] }),
            json!({}),
        );
        let err = expand_vapp_config(&data, Some(&live()), &mut RestartRequirement::new())
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::VApp(VAppError::Unsupported(keys)) if keys == ["also.nope", "nope"]
        ));
    }

    #[test]
    fn rejects_non_configurable_properties() {
        let data = data(
            json!({ "vapp": [{ "properties": { "appliance.root": "secret" } }] }),
            json!({}),
        );
        let err = expand_vapp_config(&data, Some(&live()), &mut RestartRequirement::new())
            .unwrap_err();
        assert!(matches!(err, CodecError::VApp(VAppError::NotUserConfigurable(_))));
    }

    #[test]
    fn requires_existing_machine_with_vapp_config() {
        let config = json!({ "vapp": [{ "properties": { "hostname": "a" } }] });

        let mut new = data(config.clone(), json!({}));
        new.set_id("");
        let err = expand_vapp_config(&new, None, &mut RestartRequirement::new()).unwrap_err();
        assert!(matches!(err, CodecError::VApp(VAppError::NotCloned)));

        let existing = data(config, json!({}));
        let err = expand_vapp_config(&existing, Some(&ConfigInfo::default()), &mut RestartRequirement::new())
            .unwrap_err();
        assert!(matches!(err, CodecError::VApp(VAppError::Missing)));
    }

    #[test]
    fn flatten_records_changed_configurable_values() {
        let mut info = live();
        let vapp = info.v_app_config.as_mut().unwrap();
        vapp.property[0].value = "web-01".to_string();
        vapp.property[1].value = "1.1.1.1".to_string();
        vapp.property[2].value = "secret".to_string();

        let mut data = data(json!({}), json!({}));
        flatten_vapp_config(&mut data, info.v_app_config.as_ref());
        assert_eq!(data.get("vapp_transport"), Some(&json!(["com.vmware.guestInfo"])));
        assert_eq!(
            data.get("vapp"),
            Some(&json!([{ "properties": { "hostname": "web-01" } }]))
        );
    }

    #[test]
    fn flatten_without_vapp_config_clears_transport() {
        let mut data = data(json!({}), json!({}));
        flatten_vapp_config(&mut data, None);
        assert_eq!(data.get("vapp_transport"), Some(&json!([])));
        assert!(data.get("vapp").is_none());
    }
}
