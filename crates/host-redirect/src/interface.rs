//! Interface address lookup for DNS override answers and for recognising
//! requests addressed to this machine.

use std::net::{IpAddr, Ipv4Addr};

use if_addrs::Interface;

use crate::error::{RedirectError, Result};

/// First non-loopback IPv4 address bound to the named interface.
pub fn ipv4_of(name: &str) -> Result<Ipv4Addr> {
    let interfaces = if_addrs::get_if_addrs().map_err(|source| RedirectError::Interface {
        name: name.to_string(),
        source,
    })?;

    pick_ipv4(name, &interfaces)
}

/// Every address bound to any interface, loopback included.
pub fn all_ips() -> std::io::Result<Vec<IpAddr>> {
    Ok(if_addrs::get_if_addrs()?.iter().map(Interface::ip).collect())
}

fn pick_ipv4(name: &str, interfaces: &[Interface]) -> Result<Ipv4Addr> {
    let mut found = false;
    for iface in interfaces.iter().filter(|iface| iface.name == name) {
        found = true;
        if iface.is_loopback() {
            continue;
        }
        if let IpAddr::V4(ip) = iface.ip() {
            return Ok(ip);
        }
    }

    if found {
        Err(RedirectError::NoIpv4Address {
            name: name.to_string(),
        })
    } else {
        Err(RedirectError::InterfaceNotFound {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_interface_is_an_error() {
        let err = ipv4_of("no-such-iface0").unwrap_err();
        assert!(matches!(err, RedirectError::InterfaceNotFound { .. }));
    }

    #[test]
    fn test_all_ips_includes_loopback() {
        let ips = all_ips().unwrap();
        assert!(ips.iter().any(|ip| ip.is_loopback()));
    }

    #[test]
    fn test_loopback_has_no_usable_address() {
        let interfaces = if_addrs::get_if_addrs().unwrap();
        let Some(lo) = interfaces.iter().find(|iface| iface.is_loopback()) else {
            return;
        };
        let only_loopback: Vec<_> = interfaces
            .iter()
            .filter(|iface| iface.name == lo.name && iface.is_loopback())
            .cloned()
            .collect();

        let err = pick_ipv4(&lo.name, &only_loopback).unwrap_err();
        assert!(matches!(err, RedirectError::NoIpv4Address { .. }));
    }
}
