// Report sink - one line per observed event or invalidated route

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};
use std::net::IpAddr;
use std::str::FromStr;

use crate::routes::invalidation::{Invalidation, Trigger};
use crate::routes::{OptionalDisplay, RouteEntry};

/// Something the monitor tells the outside world about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Report {
    RouteAdded {
        route: RouteEntry,
    },
    RouteDeleted {
        route: RouteEntry,
    },
    RouteChanged {
        route: RouteEntry,
    },
    LinkAdded {
        interface_index: u32,
        name: Option<String>,
    },
    LinkDeleted {
        interface_index: u32,
        name: Option<String>,
    },
    AddressDeleted {
        interface_index: u32,
        address: IpAddr,
    },
    RouteInvalidated {
        route: RouteEntry,
        trigger: Trigger,
    },
}

impl From<Invalidation> for Report {
    fn from(invalidation: Invalidation) -> Self {
        Report::RouteInvalidated {
            route: invalidation.route,
            trigger: invalidation.trigger,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::RouteAdded { route } => write!(f, "Route added: {}", route),
            Report::RouteDeleted { route } => write!(f, "Route deleted: {}", route),
            Report::RouteChanged { route } => write!(f, "Route changed: {}", route),
            Report::LinkAdded {
                interface_index,
                name,
            } => write!(
                f,
                "Link added, index: {} name: {}",
                interface_index,
                OptionalDisplay(name.as_ref(), "unknown")
            ),
            Report::LinkDeleted {
                interface_index,
                name,
            } => write!(
                f,
                "Link deleted, index: {} name: {}",
                interface_index,
                OptionalDisplay(name.as_ref(), "unknown")
            ),
            Report::AddressDeleted {
                interface_index,
                address,
            } => write!(f, "Address deleted: {} on interface {}", address, interface_index),
            Report::RouteInvalidated { route, trigger } => {
                write!(f, "Route invalidated: {} ({})", route, trigger)
            }
        }
    }
}

/// Where reports go.
pub trait ReportSink {
    fn report(&mut self, report: Report);
}

impl ReportSink for Vec<Report> {
    fn report(&mut self, report: Report) {
        self.push(report);
    }
}

/// Rendering of report lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    timestamp: String,
    #[serde(flatten)]
    report: &'a Report,
}

/// Writes one line per report to any `io::Write`, stdout by default.
pub struct LineSink<W: Write> {
    writer: W,
    format: OutputFormat,
}

impl LineSink<io::Stdout> {
    pub fn stdout(format: OutputFormat) -> Self {
        LineSink::new(io::stdout(), format)
    }
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        LineSink { writer, format }
    }

    fn render(&self, report: &Report) -> String {
        match self.format {
            OutputFormat::Text => report.to_string(),
            OutputFormat::Json => {
                let line = JsonLine {
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    report,
                };
                serde_json::to_string(&line).unwrap_or_else(|e| {
                    tracing::warn!("Failed to serialize report: {}", e);
                    report.to_string()
                })
            }
        }
    }
}

impl<W: Write> ReportSink for LineSink<W> {
    fn report(&mut self, report: Report) {
        let line = self.render(&report);
        if let Err(e) = writeln!(self.writer, "{}", line).and_then(|_| self.writer.flush()) {
            tracing::warn!("Failed to write report: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::route;

    fn render_all(format: OutputFormat, reports: Vec<Report>) -> Vec<String> {
        let mut sink = LineSink::new(Vec::new(), format);
        for report in reports {
            sink.report(report);
        }
        String::from_utf8(sink.writer)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_text_lines() {
        let lines = render_all(
            OutputFormat::Text,
            vec![
                Report::RouteAdded {
                    route: route("10.0.0.0/24", Some(3), Some("192.168.1.1"), 100),
                },
                Report::LinkDeleted {
                    interface_index: 3,
                    name: Some("eth1".to_string()),
                },
                Report::AddressDeleted {
                    interface_index: 3,
                    address: "192.168.1.10".parse().unwrap(),
                },
            ],
        );

        assert_eq!(
            lines,
            vec![
                "Route added: destination: 10.0.0.0/24 oif: 3 gateway: 192.168.1.1 metric: 100",
                "Link deleted, index: 3 name: eth1",
                "Address deleted: 192.168.1.10 on interface 3",
            ]
        );
    }

    #[test]
    fn test_invalidated_line_names_trigger() {
        let report = Report::from(Invalidation {
            route: route("10.0.0.0/24", Some(3), None, 0),
            trigger: Trigger::LinkRemoved { interface_index: 3 },
        });
        assert_eq!(
            report.to_string(),
            "Route invalidated: destination: 10.0.0.0/24 oif: 3 gateway: none metric: 0 (link 3 removed)"
        );
    }

    #[test]
    fn test_json_line_fields() {
        let lines = render_all(
            OutputFormat::Json,
            vec![Report::RouteInvalidated {
                route: route("10.0.0.0/24", Some(3), None, 7),
                trigger: Trigger::AddressRemoved {
                    interface_index: 3,
                    address: "10.0.0.1".parse().unwrap(),
                },
            }],
        );

        let value: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(value["event"], "route_invalidated");
        assert_eq!(value["route"]["destination"], "10.0.0.0/24");
        assert_eq!(value["route"]["interface_index"], 3);
        assert!(value["route"]["gateway"].is_null());
        assert_eq!(value["route"]["metric"], 7);
        assert_eq!(value["trigger"]["kind"], "address_removed");
        assert_eq!(value["trigger"]["address"], "10.0.0.1");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_parse_output_format() {
        assert_eq!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("TEXT".parse::<OutputFormat>(), Ok(OutputFormat::Text));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
