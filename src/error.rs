// Error types for the route monitor

use thiserror::Error;

use crate::events::Category;

/// Errors raised while configuring, subscribing or running the monitor.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to subscribe to {category} events: {source}")]
    Subscribe {
        category: Category,
        #[source]
        source: std::io::Error,
    },

    #[error("Waiting on {category} events failed: {source}")]
    Wait {
        category: Category,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to receive {category} messages: {source}")]
    Receive {
        category: Category,
        #[source]
        source: std::io::Error,
    },

    #[error("{category} datagram of {length} bytes truncated to {capacity}-byte buffer")]
    Truncated {
        category: Category,
        length: usize,
        capacity: usize,
    },
}

impl MonitorError {
    /// Attach the category of the source a receive failure came from.
    pub fn from_source(category: Category, error: SourceError) -> Self {
        match error {
            SourceError::Wait(source) => MonitorError::Wait { category, source },
            SourceError::Receive(source) => MonitorError::Receive { category, source },
            SourceError::Truncated { length, capacity } => MonitorError::Truncated {
                category,
                length,
                capacity,
            },
        }
    }

    /// Whether the monitor must stop. A failed receive loses messages but
    /// leaves the source usable.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            MonitorError::Receive { .. } | MonitorError::Truncated { .. }
        )
    }
}

/// Result type alias using MonitorError
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Failure while pulling a payload off an event source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The readiness wait itself failed. Fatal.
    #[error("wait failed: {0}")]
    Wait(#[source] std::io::Error),

    /// The source was readable but the read failed, e.g. the kernel dropped
    /// messages because the receive buffer overran. The source stays usable.
    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),

    /// The datagram did not fit the receive buffer and was cut short.
    #[error("datagram of {length} bytes truncated to {capacity}-byte buffer")]
    Truncated { length: usize, capacity: usize },
}

/// A payload that could not be decoded into events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated {what}: need {needed} bytes, have {available}")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("invalid message length {length} at offset {offset}")]
    InvalidLength { length: usize, offset: usize },

    #[error("invalid {what} attribute length {length}")]
    InvalidAttribute { what: &'static str, length: usize },

    #[error("kernel reported error {0}")]
    Kernel(i32),

    #[error("kernel reported buffer overrun")]
    Overrun,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_source_error_message() {
        let err = SourceError::Receive(io::Error::from_raw_os_error(libc::ENOBUFS));
        assert!(err.to_string().starts_with("receive failed: "));
    }

    #[test]
    fn test_monitor_error_names_category() {
        let subscribe = MonitorError::Subscribe {
            category: Category::Link,
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(subscribe.to_string().starts_with("Failed to subscribe to link events"));

        let wait = MonitorError::Wait {
            category: Category::Route,
            source: io::Error::from(io::ErrorKind::Other),
        };
        assert!(wait.to_string().starts_with("Waiting on route events failed"));
    }

    #[test]
    fn test_fatal_classification() {
        let receive = MonitorError::from_source(
            Category::Route,
            SourceError::Receive(io::Error::from_raw_os_error(libc::ENOBUFS)),
        );
        assert!(!receive.is_fatal());

        let truncated = MonitorError::from_source(
            Category::Link,
            SourceError::Truncated {
                length: 70000,
                capacity: 32768,
            },
        );
        assert!(!truncated.is_fatal());
        assert_eq!(
            truncated.to_string(),
            "link datagram of 70000 bytes truncated to 32768-byte buffer"
        );

        let wait = MonitorError::from_source(
            Category::Address,
            SourceError::Wait(io::Error::from(io::ErrorKind::Other)),
        );
        assert!(wait.is_fatal());
        assert!(matches!(wait, MonitorError::Wait { category: Category::Address, .. }));

        assert!(MonitorError::Config("bad".to_string()).is_fatal());
        assert!(MonitorError::from(io::Error::from(io::ErrorKind::NotFound)).is_fatal());
    }

    #[test]
    fn test_decode_error_message() {
        let err = DecodeError::Truncated {
            what: "netlink header",
            needed: 16,
            available: 4,
        };
        assert_eq!(err.to_string(), "truncated netlink header: need 16 bytes, have 4");
    }
}
