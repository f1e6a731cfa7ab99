//! An in-process inventory implementing every client trait.
//!
//! Used for dry runs and in tests. Tasks complete immediately unless slowed
//! down; `wait` returns their recorded outcome.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vsphere_machine::{
    ArrayUpdateOperation, AttachedObjects, BootOptions, ConfigInfo, GuestInfo, HostIpv6Address,
    HostVirtualNic, HostVirtualNicSpec, IPV6_ORIGIN_MANUAL, MachineConfig, ManagedObjectReference,
    PowerState, ResourceAllocation, SnapshotInfo, SnapshotRemoval, SnapshotSpec,
    VirtualNicNetConfig, VnicService,
};

use crate::{
    ClientError, HostNetworkClient, InventoryClient, SnapshotClient, Task, TaskClient, TagClient,
    VirtualMachineClient,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MachineRecord {
    pub moid: String,
    pub power_state: PowerState,
    pub config: ConfigInfo,
    pub guest: GuestInfo,
    pub snapshots: Vec<SnapshotInfo>,
}

impl Default for MachineRecord {
    fn default() -> Self {
        Self {
            moid: String::new(),
            power_state: PowerState::PoweredOff,
            config: ConfigInfo::default(),
            guest: GuestInfo::default(),
            snapshots: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostRecord {
    pub vnics: Vec<HostVirtualNic>,
    pub net_configs: Vec<VirtualNicNetConfig>,
}

/// Remote objects, keyed the way the client traits look them up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Inventory {
    /// By instance UUID.
    pub machines: IndexMap<String, MachineRecord>,
    /// By host managed object id.
    pub hosts: IndexMap<String, HostRecord>,
    /// Switch UUID to managed object id.
    pub switches: IndexMap<String, String>,
    /// Tag id to attached objects.
    pub tags: IndexMap<String, Vec<ManagedObjectReference>>,
    /// Managed object id to display name.
    pub names: IndexMap<String, String>,
}

#[derive(Debug, Clone)]
struct TaskRecord {
    result: Option<ManagedObjectReference>,
}

#[derive(Debug, Default)]
struct State {
    inventory: Inventory,
    tasks: IndexMap<String, TaskRecord>,
    calls: Vec<String>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn task(&mut self, description: &str, result: Option<ManagedObjectReference>) -> Task {
        let id = format!("task-{}", self.next_id());
        self.tasks.insert(id.clone(), TaskRecord { result });
        Task::new(id, description)
    }

    fn machine(&mut self, uuid: &str) -> Result<&mut MachineRecord, ClientError> {
        self.inventory
            .machines
            .get_mut(uuid)
            .ok_or_else(|| not_found("VirtualMachine", uuid))
    }

    fn host(&mut self, host: &str) -> Result<&mut HostRecord, ClientError> {
        self.inventory
            .hosts
            .get_mut(host)
            .ok_or_else(|| not_found("HostSystem", host))
    }
}

#[derive(Debug, Default)]
pub struct MemoryClient {
    state: Mutex<State>,
    fail_tasks: bool,
    task_delay: Duration,
}

impl MemoryClient {
    pub fn new(inventory: Inventory) -> Self {
        Self {
            state: Mutex::new(State {
                inventory,
                ..Default::default()
            }),
            fail_tasks: false,
            task_delay: Duration::ZERO,
        }
    }

    /// Every task fails on `wait`.
    pub fn failing_tasks(mut self) -> Self {
        self.fail_tasks = true;
        self
    }

    /// Every task takes `delay` to finish.
    pub fn slow_tasks(mut self, delay: Duration) -> Self {
        self.task_delay = delay;
        self
    }

    pub fn inventory(&self) -> Inventory {
        self.lock().inventory.clone()
    }

    /// Calls made so far, as `method(target)`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, method: &str, target: &str) -> MutexGuard<'_, State> {
        debug!(method, target, "memory client call");
        let mut state = self.lock();
        state.calls.push(format!("{method}({target})"));
        state
    }
}

fn not_found(kind: &'static str, id: &str) -> ClientError {
    ClientError::NotFound {
        kind,
        id: id.to_string(),
    }
}

fn remote(operation: &'static str, message: impl Into<String>) -> ClientError {
    ClientError::Remote {
        operation,
        message: message.into(),
    }
}

fn merge<T: Clone>(current: &mut Option<T>, update: &Option<T>) {
    if update.is_some() {
        current.clone_from(update);
    }
}

fn merge_string(current: &mut String, update: &str) {
    if !update.is_empty() {
        *current = update.to_string();
    }
}

fn merge_allocation(current: &mut Option<ResourceAllocation>, update: &ResourceAllocation) {
    let current = current.get_or_insert_with(Default::default);
    merge(&mut current.limit, &update.limit);
    merge(&mut current.reservation, &update.reservation);
    merge(&mut current.shares, &update.shares);
}

/// Apply a reconfigure payload the way the endpoint does: unset and empty
/// values leave the current setting alone.
fn reconfigure_info(info: &mut ConfigInfo, spec: &MachineConfig) -> Result<(), ClientError> {
    if spec.version.is_some() {
        return Err(remote(
            "reconfigure",
            "hardware version cannot be set by reconfigure",
        ));
    }

    merge_string(&mut info.name, &spec.name);
    merge_string(&mut info.guest_id, &spec.guest_id);
    merge_string(&mut info.alternate_guest_name, &spec.alternate_guest_name);
    merge_string(&mut info.annotation, &spec.annotation);
    if spec.num_cpus > 0 {
        info.hardware.num_cpu = spec.num_cpus;
    }
    if spec.num_cores_per_socket > 0 {
        info.hardware.num_cores_per_socket = spec.num_cores_per_socket;
    }
    if spec.memory_mb > 0 {
        info.hardware.memory_mb = spec.memory_mb;
    }
    merge(&mut info.memory_hot_add_enabled, &spec.memory_hot_add_enabled);
    merge(&mut info.cpu_hot_add_enabled, &spec.cpu_hot_add_enabled);
    merge(&mut info.cpu_hot_remove_enabled, &spec.cpu_hot_remove_enabled);
    merge(
        &mut info.memory_reservation_locked_to_max,
        &spec.memory_reservation_locked_to_max,
    );
    merge(&mut info.swap_placement, &spec.swap_placement);
    merge(&mut info.firmware, &spec.firmware);
    merge(&mut info.nested_hv_enabled, &spec.nested_hv_enabled);
    merge(&mut info.vpmc_enabled, &spec.vpmc_enabled);

    let tools = info.tools.get_or_insert_with(Default::default);
    merge(&mut tools.sync_time_with_host, &spec.tools.sync_time_with_host);
    merge(
        &mut tools.sync_time_with_host_allowed,
        &spec.tools.sync_time_with_host_allowed,
    );
    merge(&mut tools.tools_upgrade_policy, &spec.tools.tools_upgrade_policy);
    merge(&mut tools.after_power_on, &spec.tools.after_power_on);
    merge(&mut tools.after_resume, &spec.tools.after_resume);
    merge(&mut tools.before_guest_standby, &spec.tools.before_guest_standby);
    merge(&mut tools.before_guest_shutdown, &spec.tools.before_guest_shutdown);
    merge(&mut tools.before_guest_reboot, &spec.tools.before_guest_reboot);

    let flags = &mut info.flags;
    merge(&mut flags.disk_uuid_enabled, &spec.flags.disk_uuid_enabled);
    merge(&mut flags.virtual_exec_usage, &spec.flags.virtual_exec_usage);
    merge(&mut flags.virtual_mmu_usage, &spec.flags.virtual_mmu_usage);
    merge(&mut flags.enable_logging, &spec.flags.enable_logging);
    merge(&mut flags.vbs_enabled, &spec.flags.vbs_enabled);
    merge(&mut flags.vvtd_enabled, &spec.flags.vvtd_enabled);

    merge_allocation(&mut info.cpu_allocation, &spec.cpu_allocation);
    merge_allocation(&mut info.memory_allocation, &spec.memory_allocation);

    for option in &spec.extra_config {
        let existing = info.extra_config.iter().position(|o| o.key == option.key);
        match (existing, option.is_removal()) {
            (Some(index), true) => {
                info.extra_config.remove(index);
            }
            (Some(index), false) => info.extra_config[index].value = option.value.clone(),
            (None, false) => info.extra_config.push(option.clone()),
            (None, true) => {}
        }
    }

    let boot = info.boot_options.get_or_insert_with(BootOptions::default);
    boot.boot_delay = spec.boot_options.boot_delay;
    boot.boot_retry_delay = spec.boot_options.boot_retry_delay;
    merge(&mut boot.boot_retry_enabled, &spec.boot_options.boot_retry_enabled);
    merge(
        &mut boot.efi_secure_boot_enabled,
        &spec.boot_options.efi_secure_boot_enabled,
    );

    if let Some(vapp) = &spec.vapp_config {
        let Some(current) = info.v_app_config.as_mut() else {
            return Err(remote("reconfigure", "virtual machine has no vApp configuration"));
        };
        for edit in &vapp.properties {
            if edit.operation != ArrayUpdateOperation::Edit {
                continue;
            }
            let Some(property) = current.property.iter_mut().find(|p| p.key == edit.info.key) else {
                return Err(remote(
                    "reconfigure",
                    format!("vApp property key {} not found", edit.info.key),
                ));
            };
            property.value = edit.info.value.clone();
            merge(&mut property.user_configurable, &edit.info.user_configurable);
        }
    }

    info.latency_sensitivity = Some(spec.latency_sensitivity.clone());
    let version: u64 = info.change_version.parse().unwrap_or(0);
    info.change_version = (version + 1).to_string();
    Ok(())
}

/// Fold an update spec into a reported vNIC spec, applying IPv6 address
/// add/remove operations.
fn apply_vnic_spec(current: Option<&HostVirtualNicSpec>, spec: &HostVirtualNicSpec) -> HostVirtualNicSpec {
    let mut addresses: Vec<HostIpv6Address> = current
        .and_then(|c| c.ip.ipv6_config.as_ref())
        .map(|c| c.ipv6_address.clone())
        .unwrap_or_default();
    let mut next = spec.clone();
    if let Some(ipv6) = next.ip.ipv6_config.as_mut() {
        for address in &ipv6.ipv6_address {
            addresses.retain(|a| a.ip_address != address.ip_address);
            if address.operation == "add" {
                addresses.push(HostIpv6Address {
                    ip_address: address.ip_address.clone(),
                    prefix_length: address.prefix_length,
                    origin: IPV6_ORIGIN_MANUAL.to_string(),
                    operation: String::new(),
                });
            }
        }
        ipv6.ipv6_address = addresses;
    }
    next
}

#[async_trait]
impl TaskClient for MemoryClient {
    async fn wait(&self, task: &Task) -> Result<Option<ManagedObjectReference>, ClientError> {
        let record = {
            let mut state = self.record("wait", &task.description);
            state
                .tasks
                .swap_remove(&task.id)
                .ok_or_else(|| not_found("Task", &task.id))?
        };
        if !self.task_delay.is_zero() {
            tokio::time::sleep(self.task_delay).await;
        }
        if self.fail_tasks {
            return Err(ClientError::TaskFailed {
                task: task.id.clone(),
                message: "injected failure".to_string(),
            });
        }
        Ok(record.result)
    }
}

#[async_trait]
impl VirtualMachineClient for MemoryClient {
    async fn config_info(&self, uuid: &str) -> Result<ConfigInfo, ClientError> {
        let mut state = self.lock();
        Ok(state.machine(uuid)?.config.clone())
    }

    async fn guest_info(&self, uuid: &str) -> Result<GuestInfo, ClientError> {
        let mut state = self.lock();
        Ok(state.machine(uuid)?.guest.clone())
    }

    async fn power_state(&self, uuid: &str) -> Result<PowerState, ClientError> {
        let mut state = self.lock();
        Ok(state.machine(uuid)?.power_state)
    }

    async fn reconfigure(&self, uuid: &str, spec: &MachineConfig) -> Result<Task, ClientError> {
        let mut state = self.record("reconfigure", uuid);
        reconfigure_info(&mut state.machine(uuid)?.config, spec)?;
        Ok(state.task("reconfigure", None))
    }

    async fn power_on(&self, uuid: &str) -> Result<Task, ClientError> {
        let mut state = self.record("power_on", uuid);
        let machine = state.machine(uuid)?;
        if machine.power_state == PowerState::PoweredOn {
            return Err(remote("power on", "virtual machine is already powered on"));
        }
        machine.power_state = PowerState::PoweredOn;
        Ok(state.task("power on", None))
    }

    async fn power_off(&self, uuid: &str) -> Result<Task, ClientError> {
        let mut state = self.record("power_off", uuid);
        let machine = state.machine(uuid)?;
        if machine.power_state == PowerState::PoweredOff {
            return Err(remote("power off", "virtual machine is already powered off"));
        }
        machine.power_state = PowerState::PoweredOff;
        Ok(state.task("power off", None))
    }
}

#[async_trait]
impl SnapshotClient for MemoryClient {
    async fn create_snapshot(
        &self,
        vm_uuid: &str,
        spec: &SnapshotSpec,
    ) -> Result<Task, ClientError> {
        let mut state = self.record("create_snapshot", vm_uuid);
        let id = format!("snapshot-{}", state.next_id());
        state.machine(vm_uuid)?.snapshots.push(SnapshotInfo {
            id: id.clone(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            quiesced: spec.quiesce,
        });
        let result = ManagedObjectReference::new("VirtualMachineSnapshot", id);
        Ok(state.task("create snapshot", Some(result)))
    }

    async fn find_snapshot(
        &self,
        vm_uuid: &str,
        snapshot_id: &str,
    ) -> Result<Option<SnapshotInfo>, ClientError> {
        let mut state = self.lock();
        let machine = state.machine(vm_uuid)?;
        Ok(machine.snapshots.iter().find(|s| s.id == snapshot_id).cloned())
    }

    async fn remove_snapshot(
        &self,
        vm_uuid: &str,
        snapshot_id: &str,
        _removal: SnapshotRemoval,
    ) -> Result<Task, ClientError> {
        let mut state = self.record("remove_snapshot", snapshot_id);
        let machine = state.machine(vm_uuid)?;
        let index = machine
            .snapshots
            .iter()
            .position(|s| s.id == snapshot_id)
            .ok_or_else(|| not_found("VirtualMachineSnapshot", snapshot_id))?;
        machine.snapshots.remove(index);
        Ok(state.task("remove snapshot", None))
    }
}

#[async_trait]
impl HostNetworkClient for MemoryClient {
    async fn virtual_nics(&self, host: &str) -> Result<Vec<HostVirtualNic>, ClientError> {
        let mut state = self.lock();
        Ok(state.host(host)?.vnics.clone())
    }

    async fn add_virtual_nic(
        &self,
        host: &str,
        portgroup: &str,
        spec: &HostVirtualNicSpec,
    ) -> Result<String, ClientError> {
        let mut state = self.record("add_virtual_nic", host);
        let record = state.host(host)?;
        let device = format!("vmk{}", record.vnics.len());
        record.vnics.push(HostVirtualNic {
            device: device.clone(),
            portgroup: portgroup.to_string(),
            spec: apply_vnic_spec(None, spec),
        });
        Ok(device)
    }

    async fn update_virtual_nic(
        &self,
        host: &str,
        device: &str,
        spec: &HostVirtualNicSpec,
    ) -> Result<(), ClientError> {
        let mut state = self.record("update_virtual_nic", device);
        let vnic = state
            .host(host)?
            .vnics
            .iter_mut()
            .find(|v| v.device == device)
            .ok_or_else(|| not_found("HostVirtualNic", device))?;
        vnic.spec = apply_vnic_spec(Some(&vnic.spec), spec);
        if !spec.portgroup.is_empty() {
            vnic.portgroup = spec.portgroup.clone();
        }
        Ok(())
    }

    async fn remove_virtual_nic(&self, host: &str, device: &str) -> Result<(), ClientError> {
        let mut state = self.record("remove_virtual_nic", device);
        let record = state.host(host)?;
        let index = record
            .vnics
            .iter()
            .position(|v| v.device == device)
            .ok_or_else(|| not_found("HostVirtualNic", device))?;
        record.vnics.remove(index);
        for config in &mut record.net_configs {
            config.selected_vnic.retain(|v| v != device);
        }
        Ok(())
    }

    async fn nic_net_configs(&self, host: &str) -> Result<Vec<VirtualNicNetConfig>, ClientError> {
        let mut state = self.lock();
        Ok(state.host(host)?.net_configs.clone())
    }

    async fn select_vnic(
        &self,
        host: &str,
        service: VnicService,
        device: &str,
    ) -> Result<(), ClientError> {
        let mut state = self.record("select_vnic", &format!("{service}, {device}"));
        let record = state.host(host)?;
        let position = record
            .net_configs
            .iter()
            .position(|c| c.nic_type == service.as_str());
        let config = match position {
            Some(index) => &mut record.net_configs[index],
            None => {
                record.net_configs.push(VirtualNicNetConfig {
                    nic_type: service.as_str().to_string(),
                    selected_vnic: Vec::new(),
                });
                let last = record.net_configs.len() - 1;
                &mut record.net_configs[last]
            }
        };
        if !config.selected_vnic.iter().any(|v| v == device) {
            config.selected_vnic.push(device.to_string());
        }
        Ok(())
    }

    async fn deselect_vnic(
        &self,
        host: &str,
        service: VnicService,
        device: &str,
    ) -> Result<(), ClientError> {
        let mut state = self.record("deselect_vnic", &format!("{service}, {device}"));
        let record = state.host(host)?;
        for config in &mut record.net_configs {
            if config.nic_type == service.as_str() {
                config.selected_vnic.retain(|v| v != device);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TagClient for MemoryClient {
    async fn attached_objects(
        &self,
        tag_ids: &[String],
    ) -> Result<Vec<AttachedObjects>, ClientError> {
        let state = self.lock();
        Ok(tag_ids
            .iter()
            .map(|tag_id| AttachedObjects {
                tag_id: tag_id.clone(),
                object_ids: state.inventory.tags.get(tag_id).cloned().unwrap_or_default(),
            })
            .collect())
    }

    async fn object_name(&self, object: &ManagedObjectReference) -> Result<String, ClientError> {
        let state = self.lock();
        state
            .inventory
            .names
            .get(&object.value)
            .cloned()
            .ok_or_else(|| not_found("ManagedEntity", &object.value))
    }
}

#[async_trait]
impl InventoryClient for MemoryClient {
    async fn virtual_machine_by_uuid(
        &self,
        uuid: &str,
    ) -> Result<ManagedObjectReference, ClientError> {
        let mut state = self.lock();
        let moid = state.machine(uuid)?.moid.clone();
        Ok(ManagedObjectReference::new(vsphere_machine::VIRTUAL_MACHINE_TYPE, moid))
    }

    async fn distributed_switch_by_uuid(
        &self,
        uuid: &str,
    ) -> Result<ManagedObjectReference, ClientError> {
        let state = self.lock();
        state
            .inventory
            .switches
            .get(uuid)
            .map(|moid| {
                ManagedObjectReference::new(vsphere_machine::DISTRIBUTED_VIRTUAL_SWITCH_TYPE, moid)
            })
            .ok_or_else(|| not_found("DistributedVirtualSwitch", uuid))
    }
}

#[cfg(test)]
mod tests {
    use vsphere_machine::{HostIpConfig, HostIpv6Config, OptionValue};

    use super::*;
    use crate::{DEFAULT_TASK_TIMEOUT, wait_for_task};

    fn inventory() -> Inventory {
        let mut inventory = Inventory::default();
        inventory.machines.insert(
            "4205".to_string(),
            MachineRecord {
                moid: "vm-42".to_string(),
                power_state: PowerState::PoweredOn,
                config: ConfigInfo {
                    name: "web-01".to_string(),
                    extra_config: vec![
                        OptionValue::new("guestinfo.a", "1"),
                        OptionValue::new("guestinfo.b", "2"),
                    ],
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        inventory
            .hosts
            .insert("host-1".to_string(), HostRecord::default());
        inventory
    }

    #[tokio::test]
    async fn reconfigure_merges_extra_config() {
        let client = MemoryClient::new(inventory());
        let spec = MachineConfig {
            num_cpus: 4,
            extra_config: vec![
                OptionValue::removal("guestinfo.a"),
                OptionValue::new("guestinfo.c", "3"),
            ],
            ..Default::default()
        };
        let task = client.reconfigure("4205", &spec).await.unwrap();
        wait_for_task(&client, &task, DEFAULT_TASK_TIMEOUT).await.unwrap();

        let info = client.config_info("4205").await.unwrap();
        assert_eq!(info.hardware.num_cpu, 4);
        assert_eq!(info.name, "web-01");
        assert_eq!(
            info.extra_config,
            vec![
                OptionValue::new("guestinfo.b", "2"),
                OptionValue::new("guestinfo.c", "3"),
            ]
        );
        assert_eq!(info.change_version, "1");
        assert_eq!(client.calls(), vec!["reconfigure(4205)", "wait(reconfigure)"]);
    }

    #[tokio::test]
    async fn reconfigure_rejects_hardware_version() {
        let client = MemoryClient::new(inventory());
        let spec = MachineConfig {
            version: Some(vsphere_machine::HardwareVersion::new(19).unwrap()),
            ..Default::default()
        };
        assert!(client.reconfigure("4205", &spec).await.is_err());
    }

    #[tokio::test]
    async fn power_state_transitions_are_checked() {
        let client = MemoryClient::new(inventory());
        assert!(client.power_on("4205").await.is_err());
        client.power_off("4205").await.unwrap();
        assert_eq!(client.power_state("4205").await.unwrap(), PowerState::PoweredOff);
    }

    #[tokio::test]
    async fn vnic_ipv6_operations_apply() {
        let client = MemoryClient::new(inventory());
        let address = |ip: &str, op: &str| HostIpv6Address {
            ip_address: ip.to_string(),
            prefix_length: 64,
            origin: IPV6_ORIGIN_MANUAL.to_string(),
            operation: op.to_string(),
        };
        let spec = |addresses| HostVirtualNicSpec {
            ip: HostIpConfig {
                ipv6_config: Some(HostIpv6Config {
                    ipv6_address: addresses,
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        let device = client
            .add_virtual_nic("host-1", "pg", &spec(vec![address("fd00::1", "add")]))
            .await
            .unwrap();
        assert_eq!(device, "vmk0");

        client
            .update_virtual_nic(
                "host-1",
                "vmk0",
                &spec(vec![address("fd00::1", "remove"), address("fd00::2", "add")]),
            )
            .await
            .unwrap();

        let vnics = client.virtual_nics("host-1").await.unwrap();
        let addresses = &vnics[0].spec.ip.ipv6_config.as_ref().unwrap().ipv6_address;
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].ip_address, "fd00::2");
        assert_eq!(addresses[0].operation, "");
    }

    #[tokio::test]
    async fn failing_tasks_fail_on_wait() {
        let client = MemoryClient::new(inventory()).failing_tasks();
        let task = client.power_off("4205").await.unwrap();
        let err = wait_for_task(&client, &task, DEFAULT_TASK_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::TaskFailed { .. }));
    }
}
