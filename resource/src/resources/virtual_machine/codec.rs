//! Mapping between the flat virtual machine record and [`MachineConfig`].
//!
//! [`expand`] reads every field once and tags the [`RestartRequirement`]
//! when a disruptive field changed. [`flatten`] writes a field only when the
//! live object it comes from is present, so an absent sub-object leaves the
//! recorded value alone instead of zeroing it.

use std::str::FromStr;

use thiserror::Error;
use tracing::debug;
use vsphere_machine::{
    BootOptions, ConfigInfo, FlagInfo, HardwareVersion, HardwareVersionError, LatencySensitivity,
    LatencySensitivityLevel, MachineConfig, ResourceAllocation, SharesInfo, SharesLevel,
    ToolsConfig, UnknownValue,
};
use vsphere_store::{DataError, ResourceData};
use vsphere_version::{GatedField, supported};

use super::extra_config::{expand_extra_config, flatten_extra_config};
use super::restart::{RestartRequirement, classify_cpu, classify_memory};
use super::vapp::{VAppError, expand_vapp_config, flatten_vapp_config};
use crate::Environment;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CodecError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("field {key:?}: {source}")]
    Enum { key: String, source: UnknownValue },

    #[error(transparent)]
    HardwareVersion(#[from] HardwareVersionError),

    #[error("field {key:?} is out of range: {value}")]
    OutOfRange { key: String, value: i64 },

    #[error(transparent)]
    VApp(#[from] VAppError),
}

/// `None` when the field has no value in any layer.
pub(crate) fn opt_bool(data: &ResourceData, key: &str) -> Result<Option<bool>, CodecError> {
    if data.get(key).is_none() {
        return Ok(None);
    }
    Ok(Some(data.get_bool(key)?))
}

fn bool_with_restart(
    data: &ResourceData,
    key: &str,
    restart: &mut RestartRequirement,
) -> Result<Option<bool>, CodecError> {
    restart.note_change(data, key);
    opt_bool(data, key)
}

/// An empty string is no value.
fn opt_enum<T>(data: &ResourceData, key: &str) -> Result<Option<T>, CodecError>
where
    T: FromStr<Err = UnknownValue>,
{
    match data.get_str(key)? {
        "" => Ok(None),
        value => value.parse().map(Some).map_err(|source| CodecError::Enum {
            key: key.to_string(),
            source,
        }),
    }
}

fn enum_with_restart<T>(
    data: &ResourceData,
    key: &str,
    restart: &mut RestartRequirement,
) -> Result<Option<T>, CodecError>
where
    T: FromStr<Err = UnknownValue>,
{
    restart.note_change(data, key);
    opt_enum(data, key)
}

fn int32(data: &ResourceData, key: &str) -> Result<i32, CodecError> {
    let value = data.get_int(key)?;
    i32::try_from(value).map_err(|_| CodecError::OutOfRange {
        key: key.to_string(),
        value,
    })
}

/// A missing value is sent as zero.
fn int64_ptr_empty_zero(data: &ResourceData, key: &str) -> Result<Option<i64>, CodecError> {
    Ok(Some(data.get_int(key)?))
}

fn old_bool(data: &ResourceData, key: &str) -> bool {
    matches!(data.get_change(key).0, Some(serde_json::Value::Bool(true)))
}

fn old_int(data: &ResourceData, key: &str) -> i64 {
    data.get_change(key).0.and_then(|v| v.as_i64()).unwrap_or(0)
}

fn expand_cpu_count(
    data: &ResourceData,
    restart: &mut RestartRequirement,
) -> Result<i32, CodecError> {
    let new = int32(data, "num_cpus")?;
    let old = i32::try_from(old_int(data, "num_cpus")).unwrap_or(0);
    let (count, disruptive) = classify_cpu(
        old,
        new,
        old_bool(data, "cpu_hot_add_enabled"),
        old_bool(data, "cpu_hot_remove_enabled"),
    );
    if disruptive {
        restart.require("num_cpus");
    }
    Ok(count)
}

fn expand_memory_size(
    data: &ResourceData,
    restart: &mut RestartRequirement,
) -> Result<i64, CodecError> {
    let new = data.get_int("memory")?;
    let (size, disruptive) = classify_memory(
        old_int(data, "memory"),
        new,
        old_bool(data, "memory_hot_add_enabled"),
    );
    if disruptive {
        restart.require("memory");
    }
    Ok(size)
}

/// `Some(false)` when memory and reservation differ, `Some(true)` when they
/// match and the flag is set, otherwise no value.
fn locked_to_max(data: &ResourceData) -> Result<Option<bool>, CodecError> {
    let memory = data.get_int("memory")?;
    let reservation = data.get_int("memory_reservation")?;
    if memory != reservation {
        return Ok(Some(false));
    }
    if data.get_bool("memory_reservation_locked_to_max")? {
        return Ok(Some(true));
    }
    Ok(None)
}

fn expand_allocation(data: &ResourceData, kind: &str) -> Result<ResourceAllocation, CodecError> {
    let level = opt_enum::<SharesLevel>(data, &format!("{kind}_share_level"))?.unwrap_or_default();
    Ok(ResourceAllocation {
        limit: int64_ptr_empty_zero(data, &format!("{kind}_limit"))?,
        reservation: int64_ptr_empty_zero(data, &format!("{kind}_reservation"))?,
        shares: Some(SharesInfo {
            level,
            shares: int32(data, &format!("{kind}_share_count"))?,
        }),
    })
}

fn flatten_allocation(data: &mut ResourceData, kind: &str, allocation: &ResourceAllocation) {
    if let Some(limit) = allocation.limit {
        data.set(format!("{kind}_limit"), limit);
    }
    if let Some(reservation) = allocation.reservation {
        data.set(format!("{kind}_reservation"), reservation);
    }
    if let Some(shares) = &allocation.shares {
        data.set(format!("{kind}_share_level"), shares.level.as_str());
        data.set(format!("{kind}_share_count"), shares.shares);
    }
}

fn expand_boot_options(
    data: &ResourceData,
    env: &Environment,
    restart: &mut RestartRequirement,
) -> Result<BootOptions, CodecError> {
    let efi_secure_boot_enabled = if supported(GatedField::EfiSecureBootEnabled, &env.version) {
        bool_with_restart(data, "efi_secure_boot_enabled", restart)?
    } else {
        None
    };
    Ok(BootOptions {
        boot_delay: data.get_int("boot_delay")?,
        boot_retry_enabled: opt_bool(data, "boot_retry_enabled")?,
        boot_retry_delay: data.get_int("boot_retry_delay")?,
        efi_secure_boot_enabled,
    })
}

fn expand_flags(
    data: &ResourceData,
    env: &Environment,
    restart: &mut RestartRequirement,
) -> Result<FlagInfo, CodecError> {
    let mut flags = FlagInfo {
        disk_uuid_enabled: bool_with_restart(data, "enable_disk_uuid", restart)?,
        virtual_exec_usage: enum_with_restart(data, "hv_mode", restart)?,
        virtual_mmu_usage: enum_with_restart(data, "ept_rvi_mode", restart)?,
        enable_logging: bool_with_restart(data, "enable_logging", restart)?,
        ..Default::default()
    };
    if supported(GatedField::VbsEnabled, &env.version) {
        flags.vbs_enabled = bool_with_restart(data, "vbs_enabled", restart)?;
    }
    if supported(GatedField::VvtdEnabled, &env.version) {
        flags.vvtd_enabled = bool_with_restart(data, "vvtd_enabled", restart)?;
    }
    Ok(flags)
}

fn expand_tools(
    data: &ResourceData,
    env: &Environment,
    restart: &mut RestartRequirement,
) -> Result<ToolsConfig, CodecError> {
    let mut tools = ToolsConfig {
        tools_upgrade_policy: enum_with_restart(data, "tools_upgrade_policy", restart)?,
        after_power_on: bool_with_restart(data, "run_tools_scripts_after_power_on", restart)?,
        after_resume: bool_with_restart(data, "run_tools_scripts_after_resume", restart)?,
        before_guest_standby: bool_with_restart(
            data,
            "run_tools_scripts_before_guest_standby",
            restart,
        )?,
        before_guest_shutdown: bool_with_restart(
            data,
            "run_tools_scripts_before_guest_shutdown",
            restart,
        )?,
        before_guest_reboot: bool_with_restart(
            data,
            "run_tools_scripts_before_guest_reboot",
            restart,
        )?,
        ..Default::default()
    };
    if supported(GatedField::SyncTimeWithHostPeriodically, &env.version) {
        tools.sync_time_with_host_allowed = opt_bool(data, "sync_time_with_host")?;
        tools.sync_time_with_host = opt_bool(data, "sync_time_with_host_periodically")?;
    } else {
        tools.sync_time_with_host = opt_bool(data, "sync_time_with_host")?;
    }
    Ok(tools)
}

fn expand_hardware_version(data: &ResourceData) -> Result<Option<HardwareVersion>, CodecError> {
    let value = data.get_int("hardware_version")?;
    let number = u32::try_from(value).map_err(|_| CodecError::OutOfRange {
        key: "hardware_version".to_string(),
        value,
    })?;
    Ok(HardwareVersion::from_number(number)?)
}

/// Build the configuration payload for `data`.
///
/// `live` is the machine's current configuration, needed to resolve vApp
/// property edits. It is `None` before the machine exists.
pub fn expand(
    data: &ResourceData,
    env: &Environment,
    live: Option<&ConfigInfo>,
    restart: &mut RestartRequirement,
) -> Result<MachineConfig, CodecError> {
    for key in ["guest_id", "alternate_guest_name", "num_cores_per_socket"] {
        restart.note_change(data, key);
    }

    // Only sent when it changes; the live config does not report it.
    let storage_policy_id = if data.has_change("storage_policy_id") {
        match data.get_str("storage_policy_id")? {
            "" => None,
            id => Some(id.to_string()),
        }
    } else {
        None
    };
    let latency_sensitivity = LatencySensitivity {
        level: opt_enum::<LatencySensitivityLevel>(data, "latency_sensitivity")?
            .unwrap_or_default(),
    };

    let config = MachineConfig {
        name: data.get_str("name")?.to_string(),
        guest_id: data.get_str("guest_id")?.to_string(),
        alternate_guest_name: data.get_str("alternate_guest_name")?.to_string(),
        annotation: data.get_str("annotation")?.to_string(),
        tools: expand_tools(data, env, restart)?,
        flags: expand_flags(data, env, restart)?,
        num_cpus: expand_cpu_count(data, restart)?,
        num_cores_per_socket: int32(data, "num_cores_per_socket")?,
        memory_mb: expand_memory_size(data, restart)?,
        memory_hot_add_enabled: bool_with_restart(data, "memory_hot_add_enabled", restart)?,
        cpu_hot_add_enabled: bool_with_restart(data, "cpu_hot_add_enabled", restart)?,
        cpu_hot_remove_enabled: bool_with_restart(data, "cpu_hot_remove_enabled", restart)?,
        cpu_allocation: expand_allocation(data, "cpu")?,
        memory_allocation: expand_allocation(data, "memory")?,
        memory_reservation_locked_to_max: locked_to_max(data)?,
        extra_config: expand_extra_config(data, restart)?,
        swap_placement: enum_with_restart(data, "swap_placement_policy", restart)?,
        boot_options: expand_boot_options(data, env, restart)?,
        vapp_config: expand_vapp_config(data, live, restart)?,
        firmware: enum_with_restart(data, "firmware", restart)?,
        nested_hv_enabled: bool_with_restart(data, "nested_hv_enabled", restart)?,
        vpmc_enabled: bool_with_restart(data, "cpu_performance_counters_enabled", restart)?,
        latency_sensitivity,
        storage_policy_id,
        version: expand_hardware_version(data)?,
    };
    Ok(config)
}

fn set_opt(data: &mut ResourceData, key: &str, value: Option<bool>) {
    if let Some(value) = value {
        data.set(key, value);
    }
}

fn flatten_tools(data: &mut ResourceData, tools: &ToolsConfig, env: &Environment) {
    if let Some(policy) = tools.tools_upgrade_policy {
        data.set("tools_upgrade_policy", policy.as_str());
    }
    set_opt(data, "run_tools_scripts_after_power_on", tools.after_power_on);
    set_opt(data, "run_tools_scripts_after_resume", tools.after_resume);
    set_opt(data, "run_tools_scripts_before_guest_standby", tools.before_guest_standby);
    set_opt(data, "run_tools_scripts_before_guest_shutdown", tools.before_guest_shutdown);
    set_opt(data, "run_tools_scripts_before_guest_reboot", tools.before_guest_reboot);

    if supported(GatedField::SyncTimeWithHostPeriodically, &env.version) {
        set_opt(data, "sync_time_with_host", tools.sync_time_with_host_allowed);
        set_opt(data, "sync_time_with_host_periodically", tools.sync_time_with_host);
    } else {
        set_opt(data, "sync_time_with_host", tools.sync_time_with_host);
    }
}

fn flatten_flags(data: &mut ResourceData, flags: &FlagInfo, env: &Environment) {
    set_opt(data, "enable_disk_uuid", flags.disk_uuid_enabled);
    if let Some(usage) = flags.virtual_exec_usage {
        data.set("hv_mode", usage.as_str());
    }
    if let Some(usage) = flags.virtual_mmu_usage {
        data.set("ept_rvi_mode", usage.as_str());
    }
    set_opt(data, "enable_logging", flags.enable_logging);
    if supported(GatedField::VbsEnabled, &env.version) {
        set_opt(data, "vbs_enabled", flags.vbs_enabled);
    }
    if supported(GatedField::VvtdEnabled, &env.version) {
        set_opt(data, "vvtd_enabled", flags.vvtd_enabled);
    }
}

fn flatten_boot_options(data: &mut ResourceData, boot: &BootOptions, env: &Environment) {
    data.set("boot_delay", boot.boot_delay);
    data.set("boot_retry_delay", boot.boot_retry_delay);
    set_opt(data, "boot_retry_enabled", boot.boot_retry_enabled);
    if supported(GatedField::EfiSecureBootEnabled, &env.version) {
        set_opt(data, "efi_secure_boot_enabled", boot.efi_secure_boot_enabled);
    }
}

/// Record the live configuration into `data`.
pub fn flatten(
    data: &mut ResourceData,
    info: &ConfigInfo,
    env: &Environment,
) -> Result<(), CodecError> {
    data.set("name", info.name.as_str());
    data.set("guest_id", info.guest_id.as_str());
    data.set("alternate_guest_name", info.alternate_guest_name.as_str());
    data.set("annotation", info.annotation.as_str());
    data.set("num_cpus", info.hardware.num_cpu);
    data.set("num_cores_per_socket", info.hardware.num_cores_per_socket);
    data.set("memory", info.hardware.memory_mb);
    data.set("uuid", info.uuid.as_str());
    data.set("change_version", info.change_version.as_str());

    set_opt(data, "memory_hot_add_enabled", info.memory_hot_add_enabled);
    set_opt(data, "cpu_hot_add_enabled", info.cpu_hot_add_enabled);
    set_opt(data, "cpu_hot_remove_enabled", info.cpu_hot_remove_enabled);
    set_opt(data, "nested_hv_enabled", info.nested_hv_enabled);
    set_opt(data, "cpu_performance_counters_enabled", info.vpmc_enabled);
    set_opt(
        data,
        "memory_reservation_locked_to_max",
        info.memory_reservation_locked_to_max,
    );
    if let Some(placement) = info.swap_placement {
        data.set("swap_placement_policy", placement.as_str());
    }
    if let Some(firmware) = info.firmware {
        data.set("firmware", firmware.as_str());
    }
    if let Some(latency) = &info.latency_sensitivity {
        data.set("latency_sensitivity", latency.level.as_str());
    }

    match HardwareVersion::parse_id(&info.version) {
        Ok(version) => data.set("hardware_version", version.number()),
        Err(err) => debug!(%err, "not recording hardware version"),
    }

    if let Some(boot) = &info.boot_options {
        flatten_boot_options(data, boot, env);
    }
    if let Some(tools) = &info.tools {
        flatten_tools(data, tools, env);
    }
    flatten_flags(data, &info.flags, env);

    if let Some(allocation) = &info.cpu_allocation {
        flatten_allocation(data, "cpu", allocation);
    }
    if let Some(allocation) = &info.memory_allocation {
        flatten_allocation(data, "memory", allocation);
    }

    flatten_extra_config(data, &info.extra_config)?;
    flatten_vapp_config(data, info.v_app_config.as_ref());
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use vsphere_machine::{
        Firmware, HardwareInfo, OptionValue, SwapPlacement, UpgradePolicy, VirtualExecUsage,
    };
    use vsphere_params::ParamValues;
    use vsphere_version::VSphereVersion;

    use super::*;
    use crate::resources::virtual_machine::schema::param_types;

    fn env(major: u32, minor: u32, patch: u32) -> Environment {
        Environment::new(VSphereVersion::new(
            "VMware vCenter Server",
            major,
            minor,
            patch,
            0,
        ))
    }

    fn data(config: Value, state: Value) -> ResourceData {
        ResourceData::new(
            &param_types(),
            ParamValues::from_value(config).unwrap(),
            ParamValues::from_value(state).unwrap(),
        )
    }

    /// Recorded state matching the schema defaults, with overrides.
    fn recorded(overrides: Value) -> Value {
        let mut state = param_types().defaults();
        if let Value::Object(overrides) = overrides {
            for (key, value) in overrides {
                state.insert(key, value);
            }
        }
        state.into_value()
    }

    fn allocation() -> ResourceAllocation {
        ResourceAllocation {
            limit: Some(-1),
            reservation: Some(0),
            shares: Some(SharesInfo {
                level: SharesLevel::Normal,
                shares: 2000,
            }),
        }
    }

    fn live() -> ConfigInfo {
        ConfigInfo {
            name: "web-01".to_string(),
            guest_id: "ubuntu64Guest".to_string(),
            uuid: "4205c7d0".to_string(),
            change_version: "2024-01-01T00:00:00Z".to_string(),
            version: "vmx-19".to_string(),
            hardware: HardwareInfo {
                num_cpu: 2,
                num_cores_per_socket: 1,
                memory_mb: 2048,
            },
            cpu_hot_add_enabled: Some(true),
            cpu_hot_remove_enabled: Some(false),
            memory_hot_add_enabled: Some(false),
            swap_placement: Some(SwapPlacement::Inherit),
            firmware: Some(Firmware::Efi),
            tools: Some(ToolsConfig {
                sync_time_with_host: Some(true),
                sync_time_with_host_allowed: Some(true),
                tools_upgrade_policy: Some(UpgradePolicy::Manual),
                after_power_on: Some(true),
                after_resume: Some(true),
                before_guest_standby: Some(true),
                before_guest_shutdown: Some(true),
                before_guest_reboot: Some(false),
            }),
            flags: FlagInfo {
                disk_uuid_enabled: Some(true),
                virtual_exec_usage: Some(VirtualExecUsage::HvAuto),
                vbs_enabled: Some(false),
                ..Default::default()
            },
            cpu_allocation: Some(allocation()),
            memory_allocation: Some(allocation()),
            extra_config: vec![OptionValue::new("svga.present", "TRUE")],
            boot_options: Some(BootOptions {
                boot_delay: 0,
                boot_retry_enabled: Some(false),
                boot_retry_delay: 10000,
                efi_secure_boot_enabled: Some(true),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn flatten_then_expand_is_stable() {
        let env = env(8, 0, 2);
        let info = live();

        let mut scratch = ResourceData::scratch(&info.uuid);
        flatten(&mut scratch, &info, &env).unwrap();
        let scratch = scratch.settle();

        let mut restart = RestartRequirement::new();
        let spec = expand(&scratch, &env, Some(&info), &mut restart).unwrap();
        assert!(!restart.is_required());
        assert_eq!(spec.name, "web-01");
        assert_eq!(spec.num_cpus, 2);
        assert_eq!(spec.memory_mb, 2048);
        assert_eq!(spec.firmware, Some(Firmware::Efi));
        assert_eq!(spec.tools, info.tools.clone().unwrap());
        assert_eq!(spec.boot_options, info.boot_options.clone().unwrap());
        assert_eq!(spec.cpu_allocation, allocation());
        assert_eq!(spec.flags.virtual_exec_usage, Some(VirtualExecUsage::HvAuto));
        assert_eq!(spec.version, Some(HardwareVersion::new(19).unwrap()));
        assert!(spec.extra_config.is_empty());

        let mut again = ResourceData::scratch(&info.uuid);
        flatten(&mut again, &info, &env).unwrap();
        assert_eq!(again.state(), scratch.state());
    }

    #[test]
    fn time_sync_split_follows_version() {
        let config = json!({
            "sync_time_with_host": true,
            "sync_time_with_host_periodically": false,
            "vbs_enabled": true,
        });

        let old = expand(
            &data(config.clone(), json!({})),
            &env(6, 7, 0),
            None,
            &mut RestartRequirement::new(),
        )
        .unwrap();
        assert_eq!(old.tools.sync_time_with_host, Some(true));
        assert_eq!(old.tools.sync_time_with_host_allowed, None);
        assert_eq!(old.flags.vbs_enabled, Some(true));

        let new = expand(
            &data(config.clone(), json!({})),
            &env(7, 0, 1),
            None,
            &mut RestartRequirement::new(),
        )
        .unwrap();
        assert_eq!(new.tools.sync_time_with_host_allowed, Some(true));
        assert_eq!(new.tools.sync_time_with_host, Some(false));

        let older = expand(
            &data(config, json!({})),
            &env(6, 5, 0),
            None,
            &mut RestartRequirement::new(),
        )
        .unwrap();
        assert_eq!(older.flags.vbs_enabled, None);
    }

    #[test]
    fn flatten_skips_unsupported_fields() {
        let mut info = live();
        info.flags.vbs_enabled = Some(true);

        let mut data = ResourceData::scratch("4205c7d0");
        flatten(&mut data, &info, &env(6, 5, 0)).unwrap();
        assert!(data.get("vbs_enabled").is_none());
        assert!(data.get("sync_time_with_host_periodically").is_none());
        assert_eq!(data.get("efi_secure_boot_enabled"), Some(&json!(true)));

        let mut data = ResourceData::scratch("4205c7d0");
        flatten(&mut data, &info, &env(6, 0, 0)).unwrap();
        assert!(data.get("efi_secure_boot_enabled").is_none());
    }

    #[test]
    fn absent_sub_objects_leave_fields_unset() {
        let info = ConfigInfo {
            version: "garbage".to_string(),
            ..Default::default()
        };
        let mut data = ResourceData::scratch("4205c7d0");
        flatten(&mut data, &info, &env(8, 0, 0)).unwrap();
        assert!(data.get("tools_upgrade_policy").is_none());
        assert!(data.get("cpu_limit").is_none());
        assert!(data.get("boot_retry_delay").is_none());
        assert!(data.get("hardware_version").is_none());
    }

    #[test]
    fn cpu_change_uses_old_hot_add_flag() {
        let env = env(8, 0, 0);

        let data_hot = data(
            recorded(json!({ "num_cpus": 4, "cpu_hot_add_enabled": false })),
            recorded(json!({ "num_cpus": 2, "cpu_hot_add_enabled": true })),
        );
        let mut restart = RestartRequirement::new();
        let spec = expand(&data_hot, &env, None, &mut restart).unwrap();
        assert_eq!(spec.num_cpus, 4);
        assert_eq!(restart.reasons(), ["cpu_hot_add_enabled"]);

        let data_cold = data(
            recorded(json!({ "num_cpus": 4, "cpu_hot_add_enabled": true })),
            recorded(json!({ "num_cpus": 2, "cpu_hot_add_enabled": false })),
        );
        let mut restart = RestartRequirement::new();
        expand(&data_cold, &env, None, &mut restart).unwrap();
        assert_eq!(restart.reasons(), ["num_cpus", "cpu_hot_add_enabled"]);
    }

    #[test]
    fn memory_decrease_requires_restart() {
        let data = data(
            recorded(json!({ "memory": 1024, "memory_hot_add_enabled": true })),
            recorded(json!({ "memory": 2048, "memory_hot_add_enabled": true })),
        );
        let mut restart = RestartRequirement::new();
        let spec = expand(&data, &env(8, 0, 0), None, &mut restart).unwrap();
        assert_eq!(spec.memory_mb, 1024);
        assert_eq!(restart.reasons(), ["memory"]);
    }

    #[test]
    fn unchanged_record_requires_no_restart() {
        let state = recorded(json!({ "name": "web-01" }));
        let data = data(state.clone(), state);
        let mut restart = RestartRequirement::new();
        expand(&data, &env(8, 0, 0), None, &mut restart).unwrap();
        assert!(!restart.is_required(), "{:?}", restart.reasons());
    }

    #[test]
    fn reservation_lock_is_derived() {
        let env = env(8, 0, 0);
        let cases = [
            (json!({ "memory": 2048, "memory_reservation": 1024 }), Some(false)),
            (
                json!({
                    "memory": 2048,
                    "memory_reservation": 2048,
                    "memory_reservation_locked_to_max": true,
                }),
                Some(true),
            ),
            (json!({ "memory": 2048, "memory_reservation": 2048 }), None),
        ];
        for (config, expected) in cases {
            let spec = expand(
                &data(config, json!({})),
                &env,
                None,
                &mut RestartRequirement::new(),
            )
            .unwrap();
            assert_eq!(spec.memory_reservation_locked_to_max, expected);
        }
    }

    #[test]
    fn malformed_values_are_errors() {
        let env = env(8, 0, 0);
        let err = expand(
            &data(json!({ "hv_mode": "hvMaybe" }), json!({})),
            &env,
            None,
            &mut RestartRequirement::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::Enum { key, .. } if key == "hv_mode"));

        let err = expand(
            &data(json!({ "hardware_version": 30 }), json!({})),
            &env,
            None,
            &mut RestartRequirement::new(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            CodecError::HardwareVersion(HardwareVersionError::OutOfRange(30))
        );

        let err = expand(
            &data(json!({ "num_cpus": "two" }), json!({})),
            &env,
            None,
            &mut RestartRequirement::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::Data(_)));
    }
}
