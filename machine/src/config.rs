use serde::{Deserialize, Serialize};

use crate::{
    ArrayUpdateOperation, Firmware, HardwareVersion, LatencySensitivityLevel, SharesLevel,
    SwapPlacement, UpgradePolicy, VirtualExecUsage, VirtualMmuUsage,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BootOptions {
    pub boot_delay: i64,
    pub boot_retry_enabled: Option<bool>,
    pub boot_retry_delay: i64,
    pub efi_secure_boot_enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlagInfo {
    pub disk_uuid_enabled: Option<bool>,
    pub virtual_exec_usage: Option<VirtualExecUsage>,
    pub virtual_mmu_usage: Option<VirtualMmuUsage>,
    pub enable_logging: Option<bool>,
    pub vbs_enabled: Option<bool>,
    pub vvtd_enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolsConfig {
    /// Periodic time sync. Before 7.0.1 this is the only time sync switch.
    pub sync_time_with_host: Option<bool>,
    /// Whether time sync is allowed at all (7.0.1 and later).
    pub sync_time_with_host_allowed: Option<bool>,
    pub tools_upgrade_policy: Option<UpgradePolicy>,
    pub after_power_on: Option<bool>,
    pub after_resume: Option<bool>,
    pub before_guest_standby: Option<bool>,
    pub before_guest_shutdown: Option<bool>,
    pub before_guest_reboot: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SharesInfo {
    pub level: SharesLevel,
    pub shares: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceAllocation {
    pub limit: Option<i64>,
    pub reservation: Option<i64>,
    pub shares: Option<SharesInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LatencySensitivity {
    pub level: LatencySensitivityLevel,
}

/// An extra-config entry. An empty value removes the key remotely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptionValue {
    pub key: String,
    pub value: String,
}

impl OptionValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn removal(key: impl Into<String>) -> Self {
        Self::new(key, "")
    }

    pub fn is_removal(&self) -> bool {
        self.value.is_empty()
    }
}

/// A vApp property as declared on a machine, or as sent in an edit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VAppPropertyInfo {
    pub key: i32,
    pub id: String,
    pub value: String,
    pub default_value: String,
    pub user_configurable: Option<bool>,
}

impl VAppPropertyInfo {
    pub fn is_user_configurable(&self) -> bool {
        self.user_configurable.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VAppPropertySpec {
    pub operation: ArrayUpdateOperation,
    pub info: VAppPropertyInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VAppConfigSpec {
    pub properties: Vec<VAppPropertySpec>,
}

/// The configuration payload sent to create or reconfigure a machine.
///
/// Equality is field by field through [`MachineConfig::differences`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MachineConfig {
    pub name: String,
    pub guest_id: String,
    pub alternate_guest_name: String,
    pub annotation: String,
    pub tools: ToolsConfig,
    pub flags: FlagInfo,
    pub num_cpus: i32,
    pub num_cores_per_socket: i32,
    pub memory_mb: i64,
    pub memory_hot_add_enabled: Option<bool>,
    pub cpu_hot_add_enabled: Option<bool>,
    pub cpu_hot_remove_enabled: Option<bool>,
    pub cpu_allocation: ResourceAllocation,
    pub memory_allocation: ResourceAllocation,
    pub memory_reservation_locked_to_max: Option<bool>,
    pub extra_config: Vec<OptionValue>,
    pub swap_placement: Option<SwapPlacement>,
    pub boot_options: BootOptions,
    pub vapp_config: Option<VAppConfigSpec>,
    pub firmware: Option<Firmware>,
    pub nested_hv_enabled: Option<bool>,
    pub vpmc_enabled: Option<bool>,
    pub latency_sensitivity: LatencySensitivity,
    pub storage_policy_id: Option<String>,
    /// Creation only.
    pub version: Option<HardwareVersion>,
}

impl MachineConfig {
    /// Names of the fields that differ between `self` and `other`.
    pub fn differences(&self, other: &MachineConfig) -> Vec<&'static str> {
        // Exhaustive so that a new field cannot be left out of the comparison.
        let MachineConfig {
            name,
            guest_id,
            alternate_guest_name,
            annotation,
            tools,
            flags,
            num_cpus,
            num_cores_per_socket,
            memory_mb,
            memory_hot_add_enabled,
            cpu_hot_add_enabled,
            cpu_hot_remove_enabled,
            cpu_allocation,
            memory_allocation,
            memory_reservation_locked_to_max,
            extra_config,
            swap_placement,
            boot_options,
            vapp_config,
            firmware,
            nested_hv_enabled,
            vpmc_enabled,
            latency_sensitivity,
            storage_policy_id,
            version,
        } = self;

        let mut out = Vec::new();
        let mut check = |field: &'static str, equal: bool| {
            if !equal {
                out.push(field);
            }
        };

        check("name", *name == other.name);
        check("guest_id", *guest_id == other.guest_id);
        check(
            "alternate_guest_name",
            *alternate_guest_name == other.alternate_guest_name,
        );
        check("annotation", *annotation == other.annotation);
        check("tools", *tools == other.tools);
        check("flags", *flags == other.flags);
        check("num_cpus", *num_cpus == other.num_cpus);
        check(
            "num_cores_per_socket",
            *num_cores_per_socket == other.num_cores_per_socket,
        );
        check("memory_mb", *memory_mb == other.memory_mb);
        check(
            "memory_hot_add_enabled",
            *memory_hot_add_enabled == other.memory_hot_add_enabled,
        );
        check(
            "cpu_hot_add_enabled",
            *cpu_hot_add_enabled == other.cpu_hot_add_enabled,
        );
        check(
            "cpu_hot_remove_enabled",
            *cpu_hot_remove_enabled == other.cpu_hot_remove_enabled,
        );
        check("cpu_allocation", *cpu_allocation == other.cpu_allocation);
        check(
            "memory_allocation",
            *memory_allocation == other.memory_allocation,
        );
        check(
            "memory_reservation_locked_to_max",
            *memory_reservation_locked_to_max == other.memory_reservation_locked_to_max,
        );
        check("extra_config", *extra_config == other.extra_config);
        check("swap_placement", *swap_placement == other.swap_placement);
        check("boot_options", *boot_options == other.boot_options);
        check("vapp_config", *vapp_config == other.vapp_config);
        check("firmware", *firmware == other.firmware);
        check("nested_hv_enabled", *nested_hv_enabled == other.nested_hv_enabled);
        check("vpmc_enabled", *vpmc_enabled == other.vpmc_enabled);
        check(
            "latency_sensitivity",
            *latency_sensitivity == other.latency_sensitivity,
        );
        check("storage_policy_id", *storage_policy_id == other.storage_policy_id);
        check("version", *version == other.version);

        out
    }
}

impl PartialEq for MachineConfig {
    fn eq(&self, other: &Self) -> bool {
        self.differences(other).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_configs_have_no_differences() {
        let config = MachineConfig {
            name: "web-01".to_string(),
            num_cpus: 2,
            memory_mb: 2048,
            ..Default::default()
        };
        assert!(config.differences(&config.clone()).is_empty());
        assert_eq!(config, config.clone());
    }

    #[test]
    fn reports_each_differing_field() {
        let old = MachineConfig {
            num_cpus: 2,
            memory_mb: 2048,
            ..Default::default()
        };
        let mut new = old.clone();
        new.num_cpus = 4;
        new.tools.after_resume = Some(true);
        new.extra_config.push(OptionValue::new("guestinfo.a", "1"));

        assert_eq!(
            old.differences(&new),
            vec!["tools", "num_cpus", "extra_config"]
        );
    }

    #[test]
    fn version_is_compared() {
        let old = MachineConfig::default();
        let new = MachineConfig {
            version: Some(HardwareVersion::new(19).unwrap()),
            ..Default::default()
        };
        assert_eq!(old.differences(&new), vec!["version"]);
    }
}
