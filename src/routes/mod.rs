// Routes module - observed route records, the route cache and invalidation

pub mod cache;
pub mod invalidation;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// One route observed on the event stream.
///
/// `interface_index` is `None` when the kernel did not report an owning
/// interface; such routes are never matched by interface-based invalidation.
/// `gateway` is `None` for directly connected routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub destination: String, // CIDR notation, or "default"
    pub interface_index: Option<u32>,
    pub gateway: Option<IpAddr>,
    pub metric: u32,
}

impl RouteEntry {
    pub fn key(&self) -> RouteKey<'_> {
        RouteKey {
            destination: &self.destination,
            interface_index: self.interface_index,
        }
    }
}

/// Identity of a route inside the cache. Gateway and metric are not part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteKey<'a> {
    pub destination: &'a str,
    pub interface_index: Option<u32>,
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "destination: {} oif: {} gateway: {} metric: {}",
            self.destination,
            OptionalDisplay(self.interface_index.as_ref(), "unknown"),
            OptionalDisplay(self.gateway.as_ref(), "none"),
            self.metric
        )
    }
}

/// Renders `Some(v)` as `v` and `None` as a fixed placeholder.
pub(crate) struct OptionalDisplay<'a, T>(pub Option<&'a T>, pub &'static str);

impl<T: fmt::Display> fmt::Display for OptionalDisplay<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => fmt::Display::fmt(value, f),
            None => f.write_str(self.1),
        }
    }
}

#[cfg(test)]
pub(crate) fn route(
    destination: &str,
    interface_index: Option<u32>,
    gateway: Option<&str>,
    metric: u32,
) -> RouteEntry {
    RouteEntry {
        destination: destination.to_string(),
        interface_index,
        gateway: gateway.map(|gw| gw.parse().unwrap()),
        metric,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_gateway() {
        let entry = route("10.0.0.0/24", Some(3), Some("192.168.1.1"), 100);
        assert_eq!(
            entry.to_string(),
            "destination: 10.0.0.0/24 oif: 3 gateway: 192.168.1.1 metric: 100"
        );
    }

    #[test]
    fn test_display_placeholders() {
        let entry = route("default", None, None, 0);
        assert_eq!(
            entry.to_string(),
            "destination: default oif: unknown gateway: none metric: 0"
        );
    }

    #[test]
    fn test_key_ignores_gateway_and_metric() {
        let a = route("10.0.0.0/24", Some(3), Some("192.168.1.1"), 100);
        let b = route("10.0.0.0/24", Some(3), None, 200);
        assert_eq!(a.key(), b.key());
    }
}
