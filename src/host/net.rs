//! Local address discovery
//!
//! The address is only shown to the user so they know where to point X
//! clients; lookups report "no interface" and "lookup failed" separately.

use std::net::IpAddr;

use nix::ifaddrs::getifaddrs;
use nix::sys::socket::SockaddrStorage;

use crate::install::{ProvisionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalAddress {
    Found(String),
    /// No non-loopback interface of the requested family
    NoInterface,
}

/// First non-loopback address of `family` across all interfaces.
pub fn local_address(family: AddressFamily) -> Result<LocalAddress> {
    let interfaces = getifaddrs().map_err(|source| ProvisionError::Os {
        op: "getifaddrs",
        source,
    })?;
    let ips = interfaces
        .filter_map(|ifa| ifa.address)
        .filter_map(|addr| sockaddr_ip(&addr));
    Ok(select_address(ips, family))
}

fn sockaddr_ip(addr: &SockaddrStorage) -> Option<IpAddr> {
    if let Some(v4) = addr.as_sockaddr_in() {
        return Some(IpAddr::V4(v4.ip()));
    }
    addr.as_sockaddr_in6().map(|v6| IpAddr::V6(v6.ip()))
}

/// Pick the first usable address; IPv6 is rendered uppercase without zone.
pub fn select_address(ips: impl IntoIterator<Item = IpAddr>, family: AddressFamily) -> LocalAddress {
    for ip in ips {
        if ip.is_loopback() {
            continue;
        }
        match (family, ip) {
            (AddressFamily::V4, IpAddr::V4(v4)) => return LocalAddress::Found(v4.to_string()),
            (AddressFamily::V6, IpAddr::V6(v6)) => {
                // Ipv6Addr's Display never carries a %zone suffix
                return LocalAddress::Found(v6.to_string().to_uppercase());
            }
            _ => {}
        }
    }
    LocalAddress::NoInterface
}
