use serde::{Deserialize, Serialize};

/// Guest networking as reported by the in-guest tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuestInfo {
    pub ip_stack: Vec<GuestStackInfo>,
    pub net: Vec<GuestNicInfo>,
    /// Flat primary address reported by older tools.
    pub ip_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuestStackInfo {
    pub ip_route_config: Option<IpRouteConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IpRouteConfig {
    pub ip_route: Vec<IpRoute>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IpRoute {
    pub network: String,
    pub prefix_length: i32,
    pub gateway: IpRouteGateway,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IpRouteGateway {
    pub ip_address: String,
    pub device: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuestNicInfo {
    pub device_config_id: i32,
    pub mac_address: String,
    pub ip_config: Option<NetIpConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetIpConfig {
    pub ip_address: Vec<IpAddressInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IpAddressInfo {
    pub ip_address: String,
    pub prefix_length: i32,
}
