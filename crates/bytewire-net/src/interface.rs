//! Network interface enumeration.

use std::cmp::Ordering;

use crate::{address::IpAddress, protocol::AddressFamily};

/// Default name pattern preferring wired and wireless LAN adapters.
pub const DEFAULT_INTERFACE_MATCH: &str = "eth|lan|wlan";

/// One address bound to a local network interface.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IpInterface {
    /// Adapter name, e.g. `eth0`
    pub name: String,
    /// Interface address (port 0)
    pub addr: IpAddress,
    /// Subnet mask
    pub netmask: IpAddress,
    /// Broadcast address, unset if the interface has none
    pub broadcast: IpAddress,
    /// Default gateway, unset when unknown
    pub gateway: IpAddress,
}

impl IpInterface {
    /// Enumerates interface addresses of `family` (`Unspec` returns all).
    ///
    /// Interfaces with a gateway come first, the rest are ordered by address.
    pub fn all(family: AddressFamily) -> Vec<IpInterface> {
        let mut out = sys::enumerate(family);
        out.sort_by(|a, b| match (a.gateway.has_address(), b.gateway.has_address()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.addr.cmp(&b.addr),
        });
        out
    }

    /// Enumerates interfaces, moving names that match `name_match` to the front.
    ///
    /// `name_match` lists alternatives separated by `|`; an interface whose name
    /// contains an alternative earlier in the name sorts before one with a later match.
    pub fn matching(name_match: &str, family: AddressFamily) -> Vec<IpInterface> {
        let mut out = Self::all(family);
        if !name_match.is_empty() {
            out.sort_by_key(|iface| match_position(&iface.name, name_match));
        }
        out
    }
}

/// Position of the earliest alternative of `pattern` inside `name`.
fn match_position(name: &str, pattern: &str) -> usize {
    pattern
        .split('|')
        .filter(|alt| !alt.is_empty())
        .filter_map(|alt| name.find(alt))
        .min()
        .unwrap_or(usize::MAX)
}

/// Lists local interfaces for `family`, sorted by `name_match` preference.
pub fn get_interfaces(name_match: &str, family: AddressFamily) -> Vec<IpInterface> {
    IpInterface::matching(name_match, family)
}

/// Best interface for `name_match`: the first matching one, else the first listed.
pub fn get_ip_interface(name_match: &str, family: AddressFamily) -> Option<IpInterface> {
    let interfaces = get_interfaces(name_match, family);
    let matched = interfaces
        .iter()
        .position(|iface| match_position(&iface.name, name_match) != usize::MAX)
        .unwrap_or(0);
    interfaces.into_iter().nth(matched)
}

/// Address of the best interface as text, empty if none.
pub fn get_system_ip(name_match: &str, family: AddressFamily) -> String {
    get_ip_interface(name_match, family).map(|iface| iface.addr.to_string()).unwrap_or_default()
}

/// Broadcast address of the best interface as text, empty if none.
pub fn get_broadcast_ip(name_match: &str, family: AddressFamily) -> String {
    get_ip_interface(name_match, family)
        .map(|iface| iface.broadcast.to_string())
        .unwrap_or_default()
}

#[cfg(unix)]
mod sys {
    use std::{
        ffi::CStr,
        net::{Ipv4Addr, Ipv6Addr},
    };

    use tracing::warn;

    use super::IpInterface;
    use crate::{
        address::{IpAddress, RawAddress},
        protocol::AddressFamily,
    };

    pub fn enumerate(family: AddressFamily) -> Vec<IpInterface> {
        let wanted = family.to_raw();
        let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
        // SAFETY: getifaddrs allocates a list we release with freeifaddrs below.
        if unsafe { libc::getifaddrs(&mut head) } != 0 {
            warn!("getifaddrs failed: {}", std::io::Error::last_os_error());
            return Vec::new();
        }

        let mut out = Vec::new();
        let mut cursor = head;
        while !cursor.is_null() {
            // SAFETY: `cursor` walks the list returned by getifaddrs, which stays valid
            // until freeifaddrs.
            let ifa = unsafe { &*cursor };
            cursor = ifa.ifa_next;
            if ifa.ifa_addr.is_null() {
                continue;
            }
            // SAFETY: non-null ifa_addr points to a sockaddr.
            let sa_family = i32::from(unsafe { (*ifa.ifa_addr).sa_family });
            if wanted != 0 && sa_family != wanted {
                continue;
            }
            // SAFETY: ifa_addr is valid for the family it reports.
            let addr = match unsafe { to_ipaddress(ifa.ifa_addr) } {
                Some(addr) => addr,
                None => continue,
            };
            // SAFETY: ifa_name is a NUL terminated string owned by the list.
            let name = unsafe { CStr::from_ptr(ifa.ifa_name) }.to_string_lossy().into_owned();
            // SAFETY: null checked by to_ipaddress.
            let netmask = unsafe { to_ipaddress(ifa.ifa_netmask) }.unwrap_or_default();
            let broadcast = if ifa.ifa_flags & (libc::IFF_BROADCAST as libc::c_uint) != 0 {
                // SAFETY: null checked by to_ipaddress.
                unsafe { to_ipaddress(broadcast_addr(ifa)) }.unwrap_or_default()
            } else {
                IpAddress::default()
            };
            out.push(IpInterface { name, addr, netmask, broadcast, gateway: IpAddress::default() });
        }
        // SAFETY: `head` came from a successful getifaddrs.
        unsafe { libc::freeifaddrs(head) };
        out
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn broadcast_addr(ifa: &libc::ifaddrs) -> *const libc::sockaddr {
        ifa.ifa_ifu
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn broadcast_addr(ifa: &libc::ifaddrs) -> *const libc::sockaddr {
        ifa.ifa_dstaddr
    }

    /// # Safety
    /// `sa` must be null or point to a sockaddr valid for its reported family.
    unsafe fn to_ipaddress(sa: *const libc::sockaddr) -> Option<IpAddress> {
        if sa.is_null() {
            return None;
        }
        match i32::from((*sa).sa_family) {
            libc::AF_INET => {
                let sin = &*(sa as *const libc::sockaddr_in);
                let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
                Some(IpAddress::new(RawAddress::V4(ip), 0))
            }
            libc::AF_INET6 => {
                let sin6 = &*(sa as *const libc::sockaddr_in6);
                let raw = RawAddress::V6 {
                    addr: Ipv6Addr::from(sin6.sin6_addr.s6_addr),
                    flow_info: sin6.sin6_flowinfo,
                    scope_id: sin6.sin6_scope_id,
                };
                Some(IpAddress::new(raw, 0))
            }
            _ => None,
        }
    }
}

#[cfg(not(unix))]
mod sys {
    use super::IpInterface;
    use crate::protocol::AddressFamily;

    pub fn enumerate(_family: AddressFamily) -> Vec<IpInterface> {
        tracing::debug!("Interface enumeration is not supported on this platform");
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_position() {
        assert_eq!(match_position("eth0", DEFAULT_INTERFACE_MATCH), 0);
        assert_eq!(match_position("vlan1", DEFAULT_INTERFACE_MATCH), 1);
        assert_eq!(match_position("lo", DEFAULT_INTERFACE_MATCH), usize::MAX);
        assert_eq!(match_position("eth0", ""), usize::MAX);
    }

    #[test]
    fn test_matching_order_is_stable() {
        let mut names = vec!["lo", "docker0", "wlan0", "eth1"];
        names.sort_by_key(|name| match_position(name, DEFAULT_INTERFACE_MATCH));
        assert_eq!(names, ["wlan0", "eth1", "lo", "docker0"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_loopback_is_listed() {
        let interfaces = IpInterface::all(AddressFamily::IPv4);
        assert!(interfaces.iter().all(|iface| iface.addr.family() == AddressFamily::IPv4));
        assert!(interfaces.iter().any(|iface| iface.addr == IpAddress::localhost(0)));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_ip_falls_back_to_first() {
        let iface = get_ip_interface("no-such-adapter", AddressFamily::IPv4);
        let first = IpInterface::all(AddressFamily::IPv4).into_iter().next();
        assert_eq!(iface, first);
    }
}
