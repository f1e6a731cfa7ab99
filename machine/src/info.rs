use serde::{Deserialize, Serialize};

use crate::{
    BootOptions, Firmware, FlagInfo, LatencySensitivity, OptionValue, ResourceAllocation,
    SwapPlacement, ToolsConfig, VAppPropertyInfo,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HardwareInfo {
    #[serde(rename = "numCPU")]
    pub num_cpu: i32,
    pub num_cores_per_socket: i32,
    #[serde(rename = "memoryMB")]
    pub memory_mb: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VAppConfigInfo {
    pub property: Vec<VAppPropertyInfo>,
    pub ovf_environment_transport: Vec<String>,
}

/// The configuration a live machine reports.
///
/// Sub-objects the endpoint may omit are optional here; the codec leaves the
/// matching recorded fields unset instead of zeroing them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigInfo {
    pub name: String,
    pub guest_id: String,
    pub alternate_guest_name: String,
    pub annotation: String,
    pub uuid: String,
    pub change_version: String,
    /// `vmx-NN`.
    pub version: String,
    pub hardware: HardwareInfo,
    pub memory_hot_add_enabled: Option<bool>,
    pub memory_reservation_locked_to_max: Option<bool>,
    pub cpu_hot_add_enabled: Option<bool>,
    pub cpu_hot_remove_enabled: Option<bool>,
    pub swap_placement: Option<SwapPlacement>,
    pub firmware: Option<Firmware>,
    #[serde(rename = "nestedHVEnabled")]
    pub nested_hv_enabled: Option<bool>,
    #[serde(rename = "vPMCEnabled")]
    pub vpmc_enabled: Option<bool>,
    pub tools: Option<ToolsConfig>,
    pub flags: FlagInfo,
    pub cpu_allocation: Option<ResourceAllocation>,
    pub memory_allocation: Option<ResourceAllocation>,
    pub extra_config: Vec<OptionValue>,
    pub v_app_config: Option<VAppConfigInfo>,
    pub latency_sensitivity: Option<LatencySensitivity>,
    pub boot_options: Option<BootOptions>,
}
