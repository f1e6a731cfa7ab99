use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde_json::json;
use tracing::debug;
use vsphere_machine::GuestInfo;
use vsphere_store::{ConnectionInfo, ResourceData};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuestIpSelection {
    pub primary: Option<String>,
    pub addresses: Vec<String>,
}

fn default_gateways(guest: &GuestInfo) -> (Option<Ipv4Addr>, Option<Ipv6Addr>) {
    let mut v4 = None;
    let mut v6 = None;
    let routes = guest
        .ip_stack
        .iter()
        .filter_map(|stack| stack.ip_route_config.as_ref())
        .flat_map(|config| &config.ip_route);
    for route in routes {
        match (route.network.as_str(), route.gateway.ip_address.parse::<IpAddr>()) {
            ("0.0.0.0", Ok(IpAddr::V4(gateway))) => v4 = Some(gateway),
            ("::", Ok(IpAddr::V6(gateway))) => v6 = Some(gateway),
            _ => {}
        }
    }
    (v4, v6)
}

fn v4_mask(prefix: i32) -> Option<u32> {
    match prefix {
        0 => Some(0),
        1..=32 => Some(u32::MAX << (32 - prefix)),
        _ => None,
    }
}

fn v6_mask(prefix: i32) -> Option<u128> {
    match prefix {
        0 => Some(0),
        1..=128 => Some(u128::MAX << (128 - prefix)),
        _ => None,
    }
}

fn same_v4_network(addr: Ipv4Addr, gateway: Option<Ipv4Addr>, prefix: i32) -> bool {
    match (gateway, v4_mask(prefix)) {
        (Some(gateway), Some(mask)) => u32::from(addr) & mask == u32::from(gateway) & mask,
        _ => false,
    }
}

fn same_v6_network(addr: Ipv6Addr, gateway: Option<Ipv6Addr>, prefix: i32) -> bool {
    match (gateway, v6_mask(prefix)) {
        (Some(gateway), Some(mask)) => u128::from(addr) & mask == u128::from(gateway) & mask,
        _ => false,
    }
}

/// Pick the address to reach the guest by.
///
/// The first IPv4 address on the default gateway's network wins, then the
/// first such IPv6 address, then the first address reported at all.
/// Interfaces are visited in device order; each lists its IPv4 addresses
/// before the rest. A primary found on a gateway network is given in
/// canonical form; the full list keeps addresses as reported.
pub fn select_primary(guest: &GuestInfo) -> GuestIpSelection {
    let (v4_gateway, v6_gateway) = default_gateways(guest);

    let mut nics: Vec<_> = guest.net.iter().collect();
    nics.sort_by_key(|nic| nic.device_config_id);

    let mut v4_primary = None;
    let mut v6_primary = None;
    let mut addresses = Vec::new();

    for nic in nics {
        let Some(config) = &nic.ip_config else {
            continue;
        };
        let mut v4 = Vec::new();
        let mut other = Vec::new();
        for info in &config.ip_address {
            match info.ip_address.parse::<IpAddr>() {
                Ok(IpAddr::V4(addr)) => {
                    if v4_primary.is_none()
                        && same_v4_network(addr, v4_gateway, info.prefix_length)
                    {
                        v4_primary = Some(addr.to_string());
                    }
                    v4.push(info.ip_address.clone());
                }
                Ok(IpAddr::V6(addr)) => {
                    if v6_primary.is_none()
                        && same_v6_network(addr, v6_gateway, info.prefix_length)
                    {
                        v6_primary = Some(addr.to_string());
                    }
                    other.push(info.ip_address.clone());
                }
                Err(_) => other.push(info.ip_address.clone()),
            }
        }
        addresses.extend(v4);
        addresses.extend(other);
    }

    if addresses.is_empty() && !guest.ip_address.is_empty() {
        addresses.push(guest.ip_address.clone());
    }

    let primary = v4_primary
        .or(v6_primary)
        .or_else(|| addresses.first().cloned());
    GuestIpSelection { primary, addresses }
}

/// Record the guest's addresses, and the primary as the connection hint.
pub fn record_guest_addresses(data: &mut ResourceData, guest: &GuestInfo) {
    let selection = select_primary(guest);
    data.set("guest_ip_addresses", json!(selection.addresses));

    match selection.primary {
        Some(primary) => {
            debug!(address = %primary, "selected primary guest address");
            let mut conn_info = ConnectionInfo::new();
            conn_info.insert("type".to_string(), "ssh".to_string());
            conn_info.insert("host".to_string(), primary.clone());
            data.set_conn_info(conn_info);
            data.set("default_ip_address", primary);
        }
        None => debug!("guest reported no addresses"),
    }
}
