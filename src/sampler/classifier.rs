//! Public/private labelling of network interfaces.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv6Addr};

use crate::error::ProbeError;
use crate::model::InterfaceKind;

/// Labels each interface once, on first sight, and never revisits it.
#[derive(Debug, Default)]
pub struct Classifier {
    labels: HashMap<String, InterfaceKind>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the label for `interface`, calling `lookup` for its addresses
    /// only the first time the name is seen.
    pub fn classify(
        &mut self,
        interface: &str,
        lookup: impl FnOnce(&str) -> Result<Vec<IpAddr>, ProbeError>,
    ) -> InterfaceKind {
        if let Some(kind) = self.labels.get(interface) {
            return *kind;
        }
        let kind = match lookup(interface) {
            Ok(addrs) => kind_of(&addrs),
            Err(e) => {
                tracing::debug!(interface, error = %e, "address lookup failed, assuming private");
                InterfaceKind::Private
            }
        };
        tracing::debug!(interface, ?kind, "classified interface");
        self.labels.insert(interface.to_string(), kind);
        kind
    }

    pub fn get(&self, interface: &str) -> Option<InterfaceKind> {
        self.labels.get(interface).copied()
    }

    pub fn labels(&self) -> HashMap<String, InterfaceKind> {
        self.labels.clone()
    }
}

/// The first usable address decides; none at all means private.
pub fn kind_of(addrs: &[IpAddr]) -> InterfaceKind {
    match addrs.iter().find(|ip| is_usable(ip)) {
        Some(ip) if !is_private(ip) => InterfaceKind::Public,
        _ => InterfaceKind::Private,
    }
}

fn is_usable(ip: &IpAddr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return false;
    }
    match ip {
        IpAddr::V4(v4) => !v4.is_link_local(),
        IpAddr::V6(v6) => !is_ipv6_link_local(v6),
    }
}

pub fn is_private(ip: &IpAddr) -> bool {
    match ip {
        // 10/8, 172.16/12, 192.168/16
        IpAddr::V4(v4) => v4.is_private(),
        // fc00::/7 unique local
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

fn is_ipv6_link_local(ip: &Ipv6Addr) -> bool {
    // fe80::/10
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn ips(list: &[&str]) -> Vec<IpAddr> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn private_ranges() {
        for ip in ["10.1.2.3", "172.16.0.1", "172.31.255.254", "192.168.1.1", "fd12::1"] {
            assert!(is_private(&ip.parse().unwrap()), "{ip} should be private");
        }
        for ip in ["172.32.0.1", "8.8.8.8", "2001:db8::1", "100.64.0.1"] {
            assert!(!is_private(&ip.parse().unwrap()), "{ip} should be public");
        }
    }

    #[test]
    fn first_usable_address_decides() {
        assert_eq!(
            kind_of(&ips(&["127.0.0.1", "fe80::1", "169.254.1.1", "203.0.113.7", "10.0.0.1"])),
            InterfaceKind::Public
        );
        assert_eq!(
            kind_of(&ips(&["::", "192.168.0.10", "203.0.113.7"])),
            InterfaceKind::Private
        );
    }

    #[test]
    fn no_usable_address_is_private() {
        assert_eq!(kind_of(&[]), InterfaceKind::Private);
        assert_eq!(kind_of(&ips(&["127.0.0.1", "::1"])), InterfaceKind::Private);
    }

    #[test]
    fn lookup_failure_is_private() {
        let mut c = Classifier::new();
        let kind = c.classify("eth9", |_| Err(ProbeError::Unsupported("interfaces")));
        assert_eq!(kind, InterfaceKind::Private);
    }

    #[test]
    fn classification_is_sticky() {
        let mut c = Classifier::new();
        let calls = Cell::new(0);
        let public = |_: &str| {
            calls.set(calls.get() + 1);
            Ok(ips(&["198.51.100.4"]))
        };
        assert_eq!(c.classify("eth0", public), InterfaceKind::Public);

        // Address changes to private later; the label does not move.
        let private = |_: &str| {
            calls.set(calls.get() + 1);
            Ok(ips(&["10.0.0.4"]))
        };
        assert_eq!(c.classify("eth0", private), InterfaceKind::Public);
        assert_eq!(calls.get(), 1);
        assert_eq!(c.get("eth0"), Some(InterfaceKind::Public));
    }
}
