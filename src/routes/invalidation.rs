// Invalidation engine - reports routes whose owning interface or address went away

use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

use super::cache::RouteCache;
use super::RouteEntry;

/// Why a route was invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    LinkRemoved { interface_index: u32 },
    AddressRemoved { interface_index: u32, address: IpAddr },
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::LinkRemoved { interface_index } => {
                write!(f, "link {} removed", interface_index)
            }
            Trigger::AddressRemoved {
                interface_index,
                address,
            } => write!(f, "address {} removed from interface {}", address, interface_index),
        }
    }
}

/// A cached route that likely no longer works.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invalidation {
    pub route: RouteEntry,
    pub trigger: Trigger,
}

/// Read-only view over the cache that turns interface and address removals
/// into invalidations.
///
/// It never removes entries: the link may come back before the kernel
/// reclaims the route, and the stale entry is still useful for diagnostics.
pub struct InvalidationEngine<'a> {
    cache: &'a RouteCache,
}

impl<'a> InvalidationEngine<'a> {
    pub fn new(cache: &'a RouteCache) -> Self {
        InvalidationEngine { cache }
    }

    /// Emit one invalidation per route owned by the removed link.
    /// Returns how many were emitted.
    pub fn on_link_removed<F>(&self, interface_index: u32, emit: F) -> usize
    where
        F: FnMut(Invalidation),
    {
        self.invalidate(Trigger::LinkRemoved { interface_index }, interface_index, emit)
    }

    /// Emit one invalidation per route owned by the interface the address was
    /// removed from. The address is diagnostic context, not a filter: every
    /// route on that interface is considered affected.
    pub fn on_address_removed<F>(&self, interface_index: u32, address: IpAddr, emit: F) -> usize
    where
        F: FnMut(Invalidation),
    {
        let trigger = Trigger::AddressRemoved {
            interface_index,
            address,
        };
        self.invalidate(trigger, interface_index, emit)
    }

    fn invalidate<F>(&self, trigger: Trigger, interface_index: u32, mut emit: F) -> usize
    where
        F: FnMut(Invalidation),
    {
        let mut count = 0;
        self.cache.find_by_interface(interface_index, |route| {
            count += 1;
            emit(Invalidation {
                route: route.clone(),
                trigger,
            });
        });

        if count > 0 {
            tracing::debug!("{}: {} route(s) invalidated", trigger, count);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::route;

    fn populated() -> RouteCache {
        let mut cache = RouteCache::default();
        cache.insert(route("10.0.0.0/24", Some(3), Some("192.168.1.1"), 100));
        cache.insert(route("10.0.1.0/24", Some(3), None, 0));
        cache.insert(route("172.16.0.0/12", Some(4), Some("172.16.0.1"), 50));
        cache.insert(route("default", None, Some("192.168.1.254"), 600));
        cache
    }

    fn snapshot(cache: &RouteCache) -> Vec<RouteEntry> {
        let mut routes: Vec<RouteEntry> = cache.iter().cloned().collect();
        routes.sort_by(|a, b| a.destination.cmp(&b.destination));
        routes
    }

    #[test]
    fn test_link_removed_reports_dependent_route() {
        let mut cache = RouteCache::default();
        cache.insert(route("10.0.0.0/24", Some(3), Some("192.168.1.1"), 100));

        let mut reports = Vec::new();
        let count = InvalidationEngine::new(&cache).on_link_removed(3, |inv| reports.push(inv));

        assert_eq!(count, 1);
        assert_eq!(reports[0].route.destination, "10.0.0.0/24");
        assert_eq!(reports[0].route.interface_index, Some(3));
        assert_eq!(reports[0].trigger, Trigger::LinkRemoved { interface_index: 3 });
    }

    #[test]
    fn test_link_removed_reports_each_route_once() {
        let cache = populated();

        let mut reports = Vec::new();
        InvalidationEngine::new(&cache).on_link_removed(3, |inv| reports.push(inv));

        let mut destinations: Vec<&str> =
            reports.iter().map(|inv| inv.route.destination.as_str()).collect();
        destinations.sort();
        assert_eq!(destinations, vec!["10.0.0.0/24", "10.0.1.0/24"]);
        assert!(reports.iter().all(|inv| inv.route.interface_index == Some(3)));
    }

    #[test]
    fn test_unrelated_interface_reports_nothing() {
        let cache = populated();
        let count = InvalidationEngine::new(&cache).on_link_removed(9, |_| panic!("unexpected report"));
        assert_eq!(count, 0);
    }

    #[test]
    fn test_address_removed_is_not_a_gateway_filter() {
        let cache = populated();
        let address: IpAddr = "10.0.1.5".parse().unwrap();

        let mut reports = Vec::new();
        InvalidationEngine::new(&cache).on_address_removed(3, address, |inv| reports.push(inv));

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|inv| inv.trigger
            == Trigger::AddressRemoved {
                interface_index: 3,
                address
            }));
    }

    #[test]
    fn test_invalidation_leaves_cache_unchanged() {
        let cache = populated();
        let before = snapshot(&cache);

        let engine = InvalidationEngine::new(&cache);
        engine.on_link_removed(3, |_| {});
        engine.on_address_removed(4, "172.16.0.9".parse().unwrap(), |_| {});

        assert_eq!(snapshot(&cache), before);
        assert_eq!(cache.routes_on(3).count(), 2);
    }

    #[test]
    fn test_trigger_display() {
        let trigger = Trigger::AddressRemoved {
            interface_index: 2,
            address: "192.168.1.10".parse().unwrap(),
        };
        assert_eq!(trigger.to_string(), "address 192.168.1.10 removed from interface 2");
    }
}
