use vsphere_machine::{
    Firmware, LatencySensitivityLevel, SharesLevel, SwapPlacement, UpgradePolicy,
    VirtualExecUsage, VirtualMmuUsage,
};
use vsphere_params::{ParamField, ParamType, ParamTypes, Validation};

const ALLOCATION_KINDS: [&str; 2] = ["cpu", "memory"];

fn boolean() -> ParamField {
    ParamField::new(ParamType::Boolean).optional()
}

fn one_of(allowed: &'static [&'static str]) -> Validation {
    Validation::StringInSlice(allowed)
}

fn allocation(mut types: ParamTypes) -> ParamTypes {
    for kind in ALLOCATION_KINDS {
        types = types
            .field(
                format!("{kind}_share_level"),
                ParamField::new(ParamType::String)
                    .default(SharesLevel::Normal.as_str())
                    .validate(one_of(SharesLevel::ALLOWED)),
            )
            .field(
                format!("{kind}_share_count"),
                ParamField::new(ParamType::Integer)
                    .optional_computed()
                    .validate(Validation::IntAtLeast(0)),
            )
            .field(
                format!("{kind}_limit"),
                ParamField::new(ParamType::Integer)
                    .default(-1)
                    .validate(Validation::IntAtLeast(-1)),
            )
            .field(
                format!("{kind}_reservation"),
                ParamField::new(ParamType::Integer)
                    .optional()
                    .validate(Validation::IntAtLeast(0)),
            );
    }
    types
}

/// Every field the virtual machine resource reads or records.
pub fn param_types() -> ParamTypes {
    let types = ParamTypes::new()
        // boot options
        .field("boot_delay", ParamField::new(ParamType::Integer).optional())
        .field("efi_secure_boot_enabled", boolean())
        .field(
            "boot_retry_delay",
            ParamField::new(ParamType::Integer).default(10000),
        )
        .field("boot_retry_enabled", boolean())
        // flags
        .field("enable_disk_uuid", boolean())
        .field("vbs_enabled", boolean())
        .field("vvtd_enabled", boolean())
        .field(
            "hv_mode",
            ParamField::new(ParamType::String)
                .optional_computed()
                .validate(one_of(VirtualExecUsage::ALLOWED)),
        )
        .field(
            "ept_rvi_mode",
            ParamField::new(ParamType::String)
                .optional_computed()
                .validate(one_of(VirtualMmuUsage::ALLOWED)),
        )
        .field("enable_logging", boolean())
        // tools
        .field(
            "sync_time_with_host",
            ParamField::new(ParamType::Boolean).default(true),
        )
        .field("sync_time_with_host_periodically", boolean())
        .field(
            "tools_upgrade_policy",
            ParamField::new(ParamType::String)
                .default(UpgradePolicy::Manual.as_str())
                .validate(one_of(UpgradePolicy::ALLOWED)),
        )
        .field(
            "run_tools_scripts_after_power_on",
            ParamField::new(ParamType::Boolean).default(true),
        )
        .field(
            "run_tools_scripts_after_resume",
            ParamField::new(ParamType::Boolean).default(true),
        )
        .field("run_tools_scripts_before_guest_reboot", boolean())
        .field(
            "run_tools_scripts_before_guest_shutdown",
            ParamField::new(ParamType::Boolean).default(true),
        )
        .field(
            "run_tools_scripts_before_guest_standby",
            ParamField::new(ParamType::Boolean).default(true),
        )
        .field(
            "latency_sensitivity",
            ParamField::new(ParamType::String)
                .default(LatencySensitivityLevel::Normal.as_str())
                .validate(one_of(LatencySensitivityLevel::ALLOWED)),
        )
        // identity and shape
        .field(
            "name",
            ParamField::new(ParamType::String).validate(Validation::StringLenBetween(1, 80)),
        )
        .field("num_cpus", ParamField::new(ParamType::Integer).default(1))
        .field(
            "num_cores_per_socket",
            ParamField::new(ParamType::Integer).default(1),
        )
        .field("cpu_hot_add_enabled", boolean())
        .field("cpu_hot_remove_enabled", boolean())
        .field("nested_hv_enabled", boolean())
        .field("cpu_performance_counters_enabled", boolean())
        .field("memory", ParamField::new(ParamType::Integer).default(1024))
        .field("memory_reservation_locked_to_max", boolean())
        .field("memory_hot_add_enabled", boolean())
        .field(
            "swap_placement_policy",
            ParamField::new(ParamType::String)
                .default(SwapPlacement::Inherit.as_str())
                .validate(one_of(SwapPlacement::ALLOWED)),
        )
        .field(
            "annotation",
            ParamField::new(ParamType::String).optional_computed(),
        )
        .field(
            "guest_id",
            ParamField::new(ParamType::String).optional_computed(),
        )
        .field(
            "alternate_guest_name",
            ParamField::new(ParamType::String).optional(),
        )
        .field(
            "firmware",
            ParamField::new(ParamType::String)
                .default(Firmware::Bios.as_str())
                .validate(one_of(Firmware::ALLOWED)),
        )
        .field(
            "extra_config",
            ParamField::new(ParamType::map(ParamType::String)).optional(),
        )
        .field(
            "extra_config_reboot_required",
            ParamField::new(ParamType::Boolean).default(true),
        )
        .field(
            "vapp",
            ParamField::new(ParamType::block(ParamTypes::new().field(
                "properties",
                ParamField::new(ParamType::map(ParamType::String)).optional(),
            )))
            .optional(),
        )
        .field(
            "ovf_deploy",
            ParamField::new(ParamType::block(ParamTypes::new().field(
                "enable_hidden_properties",
                ParamField::new(ParamType::Boolean).default(false),
            )))
            .optional(),
        )
        .field(
            "storage_policy_id",
            ParamField::new(ParamType::String).optional_computed(),
        )
        .field(
            "hardware_version",
            ParamField::new(ParamType::Integer)
                .optional_computed()
                .validate(Validation::IntBetween(4, 21)),
        )
        // read back
        .field(
            "vapp_transport",
            ParamField::new(ParamType::list(ParamType::String)).computed(),
        )
        .field("change_version", ParamField::new(ParamType::String).computed())
        .field("uuid", ParamField::new(ParamType::String).computed())
        .field("moid", ParamField::new(ParamType::String).computed())
        .field("reboot_required", ParamField::new(ParamType::Boolean).computed())
        .field(
            "default_ip_address",
            ParamField::new(ParamType::String).computed(),
        )
        .field(
            "guest_ip_addresses",
            ParamField::new(ParamType::list(ParamType::String)).computed(),
        );

    allocation(types)
}
