// Events module - typed topology events and the sources that deliver them

pub mod dispatcher;

use std::fmt;
use std::future::Future;
use std::net::IpAddr;

use crate::error::{DecodeError, MonitorError, SourceError};
use crate::routes::RouteEntry;

/// The event categories the monitor subscribes to, one source each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Route,
    Link,
    Address,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Route, Category::Link, Category::Address];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Route => "route",
            Category::Link => "link",
            Category::Address => "address",
        };
        f.write_str(name)
    }
}

/// A decoded topology change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    RouteAdded(RouteEntry),
    RouteDeleted(RouteEntry),
    /// A route replaced in place (new gateway or priority).
    RouteChanged(RouteEntry),
    LinkAdded {
        interface_index: u32,
        name: Option<String>,
    },
    LinkDeleted {
        interface_index: u32,
        name: Option<String>,
    },
    AddressAdded {
        interface_index: u32,
        address: IpAddr,
    },
    AddressDeleted {
        interface_index: u32,
        address: IpAddr,
    },
}

/// One subscribed channel of raw kernel payloads.
///
/// `recv` waits for the source to become readable and returns one payload,
/// which may carry a batch of messages. It must be cancel safe: dropping the
/// future before it resolves must not lose a payload. `Ok(None)` means the
/// source is closed and will never yield again.
pub trait EventSource {
    fn category(&self) -> Category;

    fn recv(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>, SourceError>>;

    /// Decode a payload into events. Fails as a whole on malformed input.
    fn decode(&self, payload: &[u8]) -> Result<Vec<NetworkEvent>, DecodeError>;
}

/// Hands out one event source per category.
pub trait NetworkStateProvider {
    type Source: EventSource;

    fn subscribe(&self, category: Category) -> Result<Self::Source, MonitorError>;
}
