use std::convert::Infallible;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info};
use vsphere_client::{Client, ClientError};
use vsphere_machine::{
    DEFAULT_TCPIP_STACK, DistributedVirtualPort, HostIpConfig, HostIpRouteConfig, HostIpv6Address,
    HostIpv6Config, HostVirtualNic, HostVirtualNicSpec, IPV6_ORIGIN_MANUAL, UnknownValue,
    VnicService,
};
use vsphere_operation::Operation;
use vsphere_operation::operations::vnic::VnicOperation;
use vsphere_params::{ParamField, ParamType, ParamTypes, Validation};
use vsphere_store::{DataError, ResourceData};

use crate::{Ensure, Environment, ResourceType};

/// Scalar fields sent in an adapter update.
const UPDATE_FIELDS: [&str; 5] = [
    "portgroup",
    "distributed_switch_port",
    "distributed_port_group",
    "mac",
    "mtu",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct Ipv4Settings {
    dhcp: bool,
    ip: String,
    netmask: String,
    gw: String,
}

impl Ipv4Settings {
    fn normalized(self) -> Self {
        if self.dhcp {
            return Self {
                dhcp: true,
                ..Default::default()
            };
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct Ipv6Settings {
    dhcp: bool,
    autoconfig: bool,
    addresses: Vec<String>,
    gw: String,
}

impl Ipv6Settings {
    /// `None` when the block turns nothing on.
    fn normalized(mut self) -> Option<Self> {
        for address in &mut self.addresses {
            *address = address.to_lowercase();
        }
        if !self.dhcp && !self.autoconfig && self.addresses.is_empty() {
            return None;
        }
        Some(self)
    }
}

/// The adapter and the services it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VnicState {
    pub host: String,
    pub vnic: HostVirtualNic,
    pub services: Vec<VnicService>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VnicChange {
    Create {
        host: String,
        portgroup: String,
        spec: HostVirtualNicSpec,
        services: Vec<VnicService>,
    },
    Update {
        host: String,
        device: String,
        spec: Option<HostVirtualNicSpec>,
        deselect: Vec<VnicService>,
        select: Vec<VnicService>,
    },
    Remove {
        host: String,
        device: String,
    },
    /// The host or network stack moved: remove, then add a new adapter.
    Replace {
        old_host: String,
        device: String,
        host: String,
        portgroup: String,
        spec: HostVirtualNicSpec,
        services: Vec<VnicService>,
    },
}

#[derive(Debug, Error)]
pub enum VnicStateError {
    #[error("invalid virtual nic id {id:?}, expected <host>_<device>")]
    InvalidId { id: String },

    #[error("reading virtual nics of host {host}: {source}")]
    Client { host: String, source: ClientError },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum VnicError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("portgroup and distributed_switch_port settings are mutually exclusive")]
    PortgroupConflict,

    #[error("services can only be configured when netstack is set to defaultTcpipStack")]
    ServicesNeedDefaultStack,

    #[error("error while parsing IPv6 address {address:?}")]
    Ipv6Address { address: String },

    #[error(transparent)]
    Service(#[from] UnknownValue),
}

fn split_id(id: &str) -> Option<(&str, &str)> {
    id.rsplit_once('_')
        .filter(|(host, device)| !host.is_empty() && !device.is_empty())
}

fn block<T: DeserializeOwned>(key: &str, value: Option<&Value>) -> Result<Option<T>, DataError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let blocks: Vec<T> =
        serde_json::from_value(value.clone()).map_err(|_| DataError::WrongType {
            key: key.to_string(),
            expected: "block",
            got: value.clone(),
        })?;
    Ok(blocks.into_iter().next())
}

fn ipv4_settings(value: Option<&Value>) -> Result<Option<Ipv4Settings>, DataError> {
    Ok(block::<Ipv4Settings>("ipv4", value)?.map(Ipv4Settings::normalized))
}

fn ipv6_settings(value: Option<&Value>) -> Result<Option<Ipv6Settings>, DataError> {
    Ok(block::<Ipv6Settings>("ipv6", value)?.and_then(Ipv6Settings::normalized))
}

fn settings_changed(data: &ResourceData) -> Result<bool, DataError> {
    if UPDATE_FIELDS.iter().any(|key| data.has_change(key)) {
        return Ok(true);
    }
    let (old, new) = data.get_change("ipv4");
    if ipv4_settings(old)? != ipv4_settings(new)? {
        return Ok(true);
    }
    let (old, new) = data.get_change("ipv6");
    Ok(ipv6_settings(old)? != ipv6_settings(new)?)
}

fn ipv6_address(address: &str, operation: &str) -> Result<HostIpv6Address, VnicError> {
    let parsed = address
        .split_once('/')
        .and_then(|(ip, prefix)| Some((ip, prefix.parse::<i32>().ok()?)));
    let Some((ip, prefix_length)) = parsed else {
        return Err(VnicError::Ipv6Address {
            address: address.to_string(),
        });
    };
    Ok(HostIpv6Address {
        ip_address: ip.to_lowercase(),
        prefix_length,
        origin: IPV6_ORIGIN_MANUAL.to_string(),
        operation: operation.to_string(),
    })
}

/// Removals for addresses no longer configured, then an add for every
/// configured address. Empty when the set is unchanged.
fn ipv6_operations(old: &[String], new: &[String]) -> Result<Vec<HostIpv6Address>, VnicError> {
    let contains =
        |list: &[String], address: &str| list.iter().any(|a| a.eq_ignore_ascii_case(address));
    let removed: Vec<&String> = old.iter().filter(|a| !contains(new, a)).collect();
    let added = new.iter().any(|a| !contains(old, a));
    if removed.is_empty() && !added {
        return Ok(Vec::new());
    }
    removed
        .into_iter()
        .map(|a| ipv6_address(a, "remove"))
        .chain(new.iter().map(|a| ipv6_address(a, "add")))
        .collect()
}

fn nic_spec(data: &ResourceData) -> Result<HostVirtualNicSpec, VnicError> {
    let portgroup = data.get_str("portgroup")?;
    let switch_port = data.get_str("distributed_switch_port")?;
    if !portgroup.is_empty() && !switch_port.is_empty() {
        return Err(VnicError::PortgroupConflict);
    }
    let distributed_virtual_port = if portgroup.is_empty() {
        Some(DistributedVirtualPort {
            switch_uuid: switch_port.to_string(),
            portgroup_key: data.get_str("distributed_port_group")?.to_string(),
        })
    } else {
        None
    };

    let mut ip = HostIpConfig::default();
    let mut route = HostIpRouteConfig::default();
    if let Some(ipv4) = block::<Ipv4Settings>("ipv4", data.get("ipv4"))? {
        if ipv4.dhcp {
            ip.dhcp = true;
        } else if !ipv4.ip.is_empty() && !ipv4.netmask.is_empty() {
            ip.ip_address = ipv4.ip;
            ip.subnet_mask = ipv4.netmask;
            route.default_gateway = ipv4.gw;
        }
    }
    if let Some(ipv6) = block::<Ipv6Settings>("ipv6", data.get("ipv6"))? {
        let old = block::<Ipv6Settings>("ipv6", data.get_change("ipv6").0)?
            .map(|old| old.addresses)
            .unwrap_or_default();
        ip.ipv6_config = Some(HostIpv6Config {
            dhcp_v6_enabled: Some(ipv6.dhcp),
            auto_configuration_enabled: Some(ipv6.autoconfig),
            ipv6_address: ipv6_operations(&old, &ipv6.addresses)?,
        });
        route.ipv6_default_gateway = ipv6.gw;
    }

    let mtu = data.get_int("mtu")?;
    let mtu = i32::try_from(mtu).map_err(|_| DataError::WrongType {
        key: "mtu".to_string(),
        expected: "32-bit integer",
        got: json!(mtu),
    })?;

    Ok(HostVirtualNicSpec {
        ip,
        mac: data.get_str("mac")?.to_string(),
        mtu,
        portgroup: portgroup.to_string(),
        distributed_virtual_port,
        ip_route_spec: Some(route),
        net_stack_instance_key: data.get_str("netstack")?.to_string(),
    })
}

fn services(data: &ResourceData) -> Result<Vec<VnicService>, VnicError> {
    let mut services = Vec::new();
    for value in data.get_list("services")? {
        let Value::String(name) = value else {
            return Err(DataError::WrongType {
                key: "services".to_string(),
                expected: "string",
                got: value.clone(),
            }
            .into());
        };
        let service: VnicService = name.parse()?;
        if !services.contains(&service) {
            services.push(service);
        }
    }
    if !services.is_empty() && data.get_str("netstack")? != DEFAULT_TCPIP_STACK {
        return Err(VnicError::ServicesNeedDefaultStack);
    }
    Ok(services)
}

/// A VMkernel adapter on an ESXi host, identified as `<host>_<device>`.
#[derive(Debug, Clone)]
pub struct Vnic;

#[async_trait]
impl ResourceType for Vnic {
    const ID: &'static str = "vsphere_vnic";

    fn param_types() -> ParamTypes {
        let optional = |typ| ParamField::new(typ).optional();
        let ipv4 = ParamTypes::new()
            .field("dhcp", optional(ParamType::Boolean))
            .field("ip", optional(ParamType::String))
            .field("netmask", optional(ParamType::String))
            .field("gw", optional(ParamType::String));
        let ipv6 = ParamTypes::new()
            .field("dhcp", optional(ParamType::Boolean))
            .field("autoconfig", optional(ParamType::Boolean))
            .field("addresses", optional(ParamType::list(ParamType::String)))
            .field("gw", optional(ParamType::String));
        ParamTypes::new()
            .field("host", ParamField::new(ParamType::String).force_new())
            .field("portgroup", optional(ParamType::String))
            .field("distributed_switch_port", optional(ParamType::String))
            .field("distributed_port_group", optional(ParamType::String))
            .field("ipv4", optional(ParamType::block(ipv4)))
            .field("ipv6", optional(ParamType::block(ipv6)))
            .field("mac", ParamField::new(ParamType::String).optional_computed())
            .field(
                "mtu",
                ParamField::new(ParamType::Integer)
                    .optional_computed()
                    .validate(Validation::IntBetween(1280, 9000)),
            )
            .field(
                "netstack",
                ParamField::new(ParamType::String)
                    .default(DEFAULT_TCPIP_STACK)
                    .force_new(),
            )
            .field(
                "services",
                ParamField::new(ParamType::list(ParamType::String)).optional_computed(),
            )
    }

    type State = Option<VnicState>;
    type StateError = VnicStateError;

    async fn state(
        client: &dyn Client,
        data: &ResourceData,
    ) -> Result<Self::State, Self::StateError> {
        let id = data.id();
        if id.is_empty() {
            return Ok(None);
        }
        let (host, device) = split_id(id).ok_or_else(|| VnicStateError::InvalidId {
            id: id.to_string(),
        })?;
        let error = |source| VnicStateError::Client {
            host: host.to_string(),
            source,
        };

        let vnics = match client.virtual_nics(host).await {
            Ok(vnics) => vnics,
            Err(err) if err.is_not_found() => {
                debug!(%host, "host is gone");
                return Ok(None);
            }
            Err(err) => return Err(error(err)),
        };
        let Some(vnic) = vnics.into_iter().find(|vnic| vnic.device == device) else {
            debug!(%host, %device, "virtual nic is gone");
            return Ok(None);
        };

        let services = client
            .nic_net_configs(host)
            .await
            .map_err(error)?
            .iter()
            .filter(|config| config.selected_vnic.iter().any(|v| v == device))
            .filter_map(|config| config.nic_type.parse::<VnicService>().ok())
            .collect();

        Ok(Some(VnicState {
            host: host.to_string(),
            vnic,
            services,
        }))
    }

    type Change = VnicChange;
    type ChangeError = VnicError;

    fn change(
        ensure: Ensure,
        data: &mut ResourceData,
        state: &Self::State,
        _env: &Environment,
    ) -> Result<Option<Self::Change>, Self::ChangeError> {
        let host = data.get_str("host")?.to_string();
        let portgroup = data.get_str("portgroup")?.to_string();

        let change = match (ensure, state) {
            (Ensure::Absent, None) => None,
            (Ensure::Absent, Some(existing)) => Some(VnicChange::Remove {
                host: existing.host.clone(),
                device: existing.vnic.device.clone(),
            }),
            (Ensure::Present, None) => Some(VnicChange::Create {
                host,
                portgroup,
                spec: nic_spec(data)?,
                services: services(data)?,
            }),
            (Ensure::Present, Some(existing)) => {
                let moved = host != existing.host
                    || data.get_str("netstack")? != existing.vnic.spec.net_stack_instance_key;
                if moved {
                    Some(VnicChange::Replace {
                        old_host: existing.host.clone(),
                        device: existing.vnic.device.clone(),
                        host,
                        portgroup,
                        spec: nic_spec(data)?,
                        services: services(data)?,
                    })
                } else {
                    let spec = if settings_changed(data)? {
                        Some(nic_spec(data)?)
                    } else {
                        None
                    };
                    let desired = services(data)?;
                    let deselect: Vec<VnicService> = existing
                        .services
                        .iter()
                        .filter(|service| !desired.contains(service))
                        .copied()
                        .collect();
                    let select: Vec<VnicService> = desired
                        .iter()
                        .filter(|service| !existing.services.contains(service))
                        .copied()
                        .collect();
                    if spec.is_none() && deselect.is_empty() && select.is_empty() {
                        None
                    } else {
                        Some(VnicChange::Update {
                            host,
                            device: existing.vnic.device.clone(),
                            spec,
                            deselect,
                            select,
                        })
                    }
                }
            }
        };

        match &change {
            Some(change) => info!(?change, "virtual nic change"),
            None => debug!(id = data.id(), "virtual nic is up to date"),
        }
        Ok(change)
    }

    fn operations(change: Self::Change) -> Vec<Operation> {
        match change {
            VnicChange::Create {
                host,
                portgroup,
                spec,
                services,
            } => vec![
                VnicOperation::Add {
                    host,
                    portgroup,
                    spec: Box::new(spec),
                    services,
                }
                .into(),
            ],
            VnicChange::Update {
                host,
                device,
                spec,
                deselect,
                select,
            } => {
                let mut operations: Vec<Operation> = Vec::new();
                if let Some(spec) = spec {
                    operations.push(
                        VnicOperation::Update {
                            host: host.clone(),
                            device: device.clone(),
                            spec: Box::new(spec),
                        }
                        .into(),
                    );
                }
                for service in deselect {
                    operations.push(
                        VnicOperation::Deselect {
                            host: host.clone(),
                            device: device.clone(),
                            service,
                        }
                        .into(),
                    );
                }
                for service in select {
                    operations.push(
                        VnicOperation::Select {
                            host: host.clone(),
                            device: device.clone(),
                            service,
                        }
                        .into(),
                    );
                }
                operations
            }
            VnicChange::Remove { host, device } => {
                vec![VnicOperation::Remove { host, device }.into()]
            }
            VnicChange::Replace {
                old_host,
                device,
                host,
                portgroup,
                spec,
                services,
            } => vec![
                VnicOperation::Remove {
                    host: old_host,
                    device,
                }
                .into(),
                VnicOperation::Add {
                    host,
                    portgroup,
                    spec: Box::new(spec),
                    services,
                }
                .into(),
            ],
        }
    }

    fn created_id(data: &ResourceData, created: &str) -> String {
        format!("{}_{created}", data.get_str("host").unwrap_or_default())
    }

    type RecordError = Infallible;

    fn record(
        data: &mut ResourceData,
        state: &Self::State,
        _env: &Environment,
    ) -> Result<(), Self::RecordError> {
        let Some(state) = state else {
            debug!(id = data.id(), "virtual nic is gone");
            data.set_id("");
            return Ok(());
        };
        let spec = &state.vnic.spec;
        let route = spec.ip_route_spec.clone().unwrap_or_default();

        data.set("host", state.host.as_str());
        data.set("netstack", spec.net_stack_instance_key.as_str());
        data.set("portgroup", state.vnic.portgroup.as_str());
        if let Some(port) = &spec.distributed_virtual_port {
            data.set("distributed_switch_port", port.switch_uuid.as_str());
            data.set("distributed_port_group", port.portgroup_key.as_str());
        }
        data.set("mtu", spec.mtu);
        data.set("mac", spec.mac.as_str());

        if spec.ip.dhcp {
            data.set("ipv4", json!([{ "dhcp": true }]));
        } else if !spec.ip.ip_address.is_empty() {
            data.set(
                "ipv4",
                json!([{
                    "dhcp": false,
                    "ip": spec.ip.ip_address,
                    "netmask": spec.ip.subnet_mask,
                    "gw": route.default_gateway,
                }]),
            );
        } else {
            data.clear("ipv4");
        }

        // Addresses from DHCP, autoconfiguration or link-local are not ours.
        let ipv6 = spec.ip.ipv6_config.as_ref().and_then(|config| {
            let addresses: Vec<String> = config
                .ipv6_address
                .iter()
                .filter(|a| a.origin == IPV6_ORIGIN_MANUAL)
                .map(|a| format!("{}/{}", a.ip_address, a.prefix_length))
                .collect();
            Ipv6Settings {
                dhcp: config.dhcp_v6_enabled.unwrap_or(false),
                autoconfig: config.auto_configuration_enabled.unwrap_or(false),
                addresses,
                gw: route.ipv6_default_gateway.clone(),
            }
            .normalized()
        });
        match ipv6 {
            Some(ipv6) => data.set(
                "ipv6",
                json!([{
                    "dhcp": ipv6.dhcp,
                    "autoconfig": ipv6.autoconfig,
                    "addresses": ipv6.addresses,
                    "gw": ipv6.gw,
                }]),
            ),
            None => data.clear("ipv6"),
        }

        let services: Vec<&str> = state.services.iter().map(|s| s.as_str()).collect();
        data.set("services", json!(services));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use vsphere_client::memory::{HostRecord, Inventory, MemoryClient};
    use vsphere_machine::VirtualNicNetConfig;
    use vsphere_params::ParamValues;
    use vsphere_version::VSphereVersion;

    use super::*;

    const ID: &str = "host-1_vmk1";

    fn env() -> Environment {
        Environment::new(VSphereVersion::new("VMware vCenter Server", 8, 0, 0, 0))
    }

    fn manual(address: &str) -> HostIpv6Address {
        HostIpv6Address {
            ip_address: address.to_string(),
            prefix_length: 64,
            origin: IPV6_ORIGIN_MANUAL.to_string(),
            operation: String::new(),
        }
    }

    fn client() -> MemoryClient {
        let vnic = HostVirtualNic {
            device: "vmk1".to_string(),
            portgroup: "Management Network".to_string(),
            spec: HostVirtualNicSpec {
                ip: HostIpConfig {
                    dhcp: false,
                    ip_address: "10.0.0.10".to_string(),
                    subnet_mask: "255.255.255.0".to_string(),
                    ipv6_config: Some(HostIpv6Config {
                        dhcp_v6_enabled: Some(false),
                        auto_configuration_enabled: Some(false),
                        ipv6_address: vec![
                            manual("2001:db8::10"),
                            HostIpv6Address {
                                origin: "other".to_string(),
                                ..manual("fe80::1")
                            },
                        ],
                    }),
                },
                mac: "00:50:56:aa:bb:cc".to_string(),
                mtu: 1500,
                portgroup: "Management Network".to_string(),
                distributed_virtual_port: None,
                ip_route_spec: Some(HostIpRouteConfig {
                    default_gateway: "10.0.0.1".to_string(),
                    ipv6_default_gateway: String::new(),
                }),
                net_stack_instance_key: DEFAULT_TCPIP_STACK.to_string(),
            },
        };
        let mut inventory = Inventory::default();
        inventory.hosts.insert(
            "host-1".to_string(),
            HostRecord {
                vnics: vec![vnic],
                net_configs: vec![
                    VirtualNicNetConfig {
                        nic_type: "management".to_string(),
                        selected_vnic: vec!["vmk1".to_string()],
                    },
                    VirtualNicNetConfig {
                        nic_type: "vmotion".to_string(),
                        selected_vnic: Vec::new(),
                    },
                ],
            },
        );
        MemoryClient::new(inventory)
    }

    /// A record already holding what `client` reports, with overrides.
    async fn recorded(client: &MemoryClient, overrides: Value) -> ResourceData {
        let mut scratch = ResourceData::scratch(ID);
        let state = Vnic::state(client, &scratch).await.unwrap();
        Vnic::record(&mut scratch, &state, &env()).unwrap();
        let recorded = scratch.state();

        let mut config = recorded.clone();
        if let Value::Object(overrides) = overrides {
            for (key, value) in overrides {
                config.insert(key, value);
            }
        }
        let mut data = ResourceData::new(&Vnic::param_types(), config, recorded);
        data.set_id(ID);
        data
    }

    fn fresh(config: Value) -> ResourceData {
        ResourceData::new(
            &Vnic::param_types(),
            ParamValues::from_value(config).unwrap(),
            ParamValues::new(),
        )
    }

    async fn plan(client: &MemoryClient, data: &mut ResourceData) -> Option<VnicChange> {
        let state = Vnic::state(client, data).await.unwrap();
        Vnic::change(Ensure::Present, data, &state, &env()).unwrap()
    }

    fn names(change: VnicChange) -> Vec<String> {
        Vnic::operations(change)
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[tokio::test]
    async fn records_live_adapter() {
        let client = client();
        let data = recorded(&client, json!({})).await;
        assert_eq!(data.get("portgroup"), Some(&json!("Management Network")));
        assert_eq!(data.get("mtu"), Some(&json!(1500)));
        assert_eq!(
            data.get("ipv4"),
            Some(&json!([{
                "dhcp": false,
                "ip": "10.0.0.10",
                "netmask": "255.255.255.0",
                "gw": "10.0.0.1",
            }]))
        );
        assert_eq!(data.get("ipv6.0.addresses"), Some(&json!(["2001:db8::10/64"])));
        assert_eq!(data.get("services"), Some(&json!(["management"])));
    }

    #[tokio::test]
    async fn unchanged_adapter_plans_nothing() {
        let client = client();
        let mut data = recorded(&client, json!({})).await;
        assert_eq!(plan(&client, &mut data).await, None);
    }

    #[tokio::test]
    async fn address_case_is_not_a_change() {
        let client = client();
        let mut data = recorded(
            &client,
            json!({ "ipv6": [{ "addresses": ["2001:DB8::10/64"] }] }),
        )
        .await;
        assert_eq!(plan(&client, &mut data).await, None);
    }

    #[tokio::test]
    async fn mtu_change_updates_adapter() {
        let client = client();
        let mut data = recorded(&client, json!({ "mtu": 9000 })).await;
        let change = plan(&client, &mut data).await.unwrap();
        let VnicChange::Update { spec: Some(spec), .. } = &change else {
            panic!("expected an update, got {change:?}");
        };
        assert_eq!(spec.mtu, 9000);
        assert_eq!(spec.ip.ip_address, "10.0.0.10");
        assert!(spec.ip.ipv6_config.as_ref().unwrap().ipv6_address.is_empty());
        assert_eq!(names(change), vec!["Vnic::Update(host-1, vmk1)"]);
    }

    #[tokio::test]
    async fn ipv6_addresses_are_replaced() {
        let client = client();
        let mut data = recorded(
            &client,
            json!({ "ipv6": [{ "addresses": ["2001:DB8::20/64"] }] }),
        )
        .await;
        let Some(VnicChange::Update { spec: Some(spec), .. }) = plan(&client, &mut data).await
        else {
            panic!("expected an update");
        };
        let addresses: Vec<(String, String)> = spec
            .ip
            .ipv6_config
            .unwrap()
            .ipv6_address
            .into_iter()
            .map(|a| (a.operation, a.ip_address))
            .collect();
        assert_eq!(
            addresses,
            vec![
                ("remove".to_string(), "2001:db8::10".to_string()),
                ("add".to_string(), "2001:db8::20".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn service_change_deselects_then_selects() {
        let client = client();
        let mut data = recorded(&client, json!({ "services": ["vmotion"] })).await;
        let change = plan(&client, &mut data).await.unwrap();
        assert_eq!(
            names(change),
            vec![
                "Vnic::Deselect(host-1, vmk1, management)",
                "Vnic::Select(host-1, vmk1, vmotion)",
            ]
        );
    }

    #[tokio::test]
    async fn netstack_change_replaces_adapter() {
        let client = client();
        let mut data = recorded(&client, json!({ "netstack": "vmotion", "services": [] })).await;
        let change = plan(&client, &mut data).await.unwrap();
        assert_eq!(
            names(change),
            vec![
                "Vnic::Remove(host-1, vmk1)",
                "Vnic::Add(host-1, portgroup = Management Network)",
            ]
        );
    }

    #[tokio::test]
    async fn new_adapter_is_added_with_services() {
        let client = client();
        let mut data = fresh(json!({
            "host": "host-1",
            "portgroup": "VM Network",
            "ipv4": [{ "dhcp": true, "ip": "10.0.0.99" }],
            "services": ["vsan"],
        }));
        let change = plan(&client, &mut data).await.unwrap();
        let VnicChange::Create { spec, services, .. } = &change else {
            panic!("expected a create, got {change:?}");
        };
        assert!(spec.ip.dhcp);
        assert_eq!(spec.ip.ip_address, "");
        assert_eq!(spec.net_stack_instance_key, DEFAULT_TCPIP_STACK);
        assert_eq!(services, &vec![VnicService::Vsan]);
        assert_eq!(Vnic::created_id(&data, "vmk2"), "host-1_vmk2");
    }

    #[tokio::test]
    async fn distributed_port_is_used_without_portgroup() {
        let client = client();
        let mut data = fresh(json!({
            "host": "host-1",
            "distributed_switch_port": "50 1a 2b",
            "distributed_port_group": "dvportgroup-11",
        }));
        let Some(VnicChange::Create { spec, .. }) = plan(&client, &mut data).await else {
            panic!("expected a create");
        };
        assert_eq!(
            spec.distributed_virtual_port,
            Some(DistributedVirtualPort {
                switch_uuid: "50 1a 2b".to_string(),
                portgroup_key: "dvportgroup-11".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn invalid_settings_are_rejected() {
        let client = client();
        let cases = [
            (
                json!({ "host": "host-1", "portgroup": "pg", "distributed_switch_port": "50 1a" }),
                VnicError::PortgroupConflict,
            ),
            (
                json!({ "host": "host-1", "portgroup": "pg", "netstack": "vmotion", "services": ["vmotion"] }),
                VnicError::ServicesNeedDefaultStack,
            ),
            (
                json!({ "host": "host-1", "portgroup": "pg", "ipv6": [{ "addresses": ["2001:db8::5"] }] }),
                VnicError::Ipv6Address {
                    address: "2001:db8::5".to_string(),
                },
            ),
        ];
        for (config, expected) in cases {
            let mut data = fresh(config);
            let state = Vnic::state(&client, &data).await.unwrap();
            let err = Vnic::change(Ensure::Present, &mut data, &state, &env()).unwrap_err();
            assert_eq!(err, expected);
        }

        let mut data = fresh(json!({ "host": "host-1", "portgroup": "pg", "services": ["ft"] }));
        let err = Vnic::change(Ensure::Present, &mut data, &None, &env()).unwrap_err();
        assert!(matches!(err, VnicError::Service(UnknownValue { .. })));
    }

    #[tokio::test]
    async fn absent_adapter_is_removed() {
        let client = client();
        let mut data = recorded(&client, json!({})).await;
        let state = Vnic::state(&client, &data).await.unwrap();
        let change = Vnic::change(Ensure::Absent, &mut data, &state, &env())
            .unwrap()
            .unwrap();
        assert_eq!(names(change), vec!["Vnic::Remove(host-1, vmk1)"]);
    }

    #[tokio::test]
    async fn missing_adapter_clears_id() {
        let client = client();
        for id in ["host-1_vmk9", "host-9_vmk1"] {
            let mut data = ResourceData::scratch(id);
            let state = Vnic::state(&client, &data).await.unwrap();
            assert!(state.is_none());
            Vnic::record(&mut data, &state, &env()).unwrap();
            assert_eq!(data.id(), "");
        }

        let data = ResourceData::scratch("vmk1");
        assert!(matches!(
            Vnic::state(&client, &data).await,
            Err(VnicStateError::InvalidId { .. })
        ));
    }
}
