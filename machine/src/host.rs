use serde::{Deserialize, Serialize};

pub const DEFAULT_TCPIP_STACK: &str = "defaultTcpipStack";
pub const IPV6_ORIGIN_MANUAL: &str = "manual";

/// A VMkernel network adapter on a host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostVirtualNic {
    pub device: String,
    pub portgroup: String,
    pub spec: HostVirtualNicSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostVirtualNicSpec {
    pub ip: HostIpConfig,
    pub mac: String,
    pub mtu: i32,
    pub portgroup: String,
    pub distributed_virtual_port: Option<DistributedVirtualPort>,
    pub ip_route_spec: Option<HostIpRouteConfig>,
    pub net_stack_instance_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DistributedVirtualPort {
    pub switch_uuid: String,
    pub portgroup_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostIpConfig {
    pub dhcp: bool,
    /// Empty when IPv4 is off.
    pub ip_address: String,
    pub subnet_mask: String,
    #[serde(rename = "ipV6Config")]
    pub ipv6_config: Option<HostIpv6Config>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostIpv6Config {
    #[serde(rename = "dhcpV6Enabled")]
    pub dhcp_v6_enabled: Option<bool>,
    pub auto_configuration_enabled: Option<bool>,
    #[serde(rename = "ipV6Address")]
    pub ipv6_address: Vec<HostIpv6Address>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostIpv6Address {
    pub ip_address: String,
    pub prefix_length: i32,
    pub origin: String,
    /// `add` or `remove` in update specs, empty in reports.
    pub operation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostIpRouteConfig {
    pub default_gateway: String,
    #[serde(rename = "ipV6DefaultGateway")]
    pub ipv6_default_gateway: String,
}

/// Which vNICs are selected for a given service type on a host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VirtualNicNetConfig {
    pub nic_type: String,
    pub selected_vnic: Vec<String>,
}
