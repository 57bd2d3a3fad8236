// Configuration management for the route monitor
// Supports CLI arguments, config file (TOML), and environment variables

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::Level;

use crate::error::{MonitorError, MonitorResult};
use crate::netlink::DEFAULT_RECV_BUFFER;
use crate::report::OutputFormat;
use crate::routes::cache::{DuplicatePolicy, DEFAULT_BUCKETS};

/// Route monitor - watch route, link and address changes and report routes
/// invalidated by interface or address removal
#[derive(Parser, Debug, Clone)]
#[command(name = "route-monitor")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace)
    #[arg(short, long, env = "ROUTE_MONITOR_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Path to configuration file
    #[arg(short, long, env = "ROUTE_MONITOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Report format (text, json)
    #[arg(short, long, env = "ROUTE_MONITOR_FORMAT")]
    pub format: Option<String>,

    /// Also watch IPv6 routes and addresses
    #[arg(long, env = "ROUTE_MONITOR_IPV6")]
    pub ipv6: bool,

    /// Number of route cache buckets
    #[arg(long, env = "ROUTE_MONITOR_BUCKETS")]
    pub buckets: Option<usize>,

    /// What to do with a second route for the same destination and interface (keep, replace)
    #[arg(long, env = "ROUTE_MONITOR_DUPLICATE_POLICY")]
    pub duplicate_policy: Option<String>,
}

/// Configuration file structure (TOML format)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    /// Route cache and subscription settings
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Netlink socket settings
    #[serde(default)]
    pub netlink: NetlinkConfig,

    /// Report output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Subscribe to IPv6 route and address groups as well
    #[serde(default)]
    pub ipv6: bool,

    /// Fixed bucket count of the route cache
    #[serde(default = "default_buckets")]
    pub buckets: usize,

    /// Duplicate key handling in the route cache
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetlinkConfig {
    /// Size of the buffer each datagram is read into
    #[serde(default = "default_recv_buffer")]
    pub recv_buffer_bytes: usize,

    /// Kernel socket receive buffer (SO_RCVBUF), left at the system default when unset
    #[serde(default)]
    pub socket_rcvbuf: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    /// Report line format (text, json)
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_buckets() -> usize {
    DEFAULT_BUCKETS
}
fn default_recv_buffer() -> usize {
    DEFAULT_RECV_BUFFER
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            ipv6: false,
            buckets: default_buckets(),
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl Default for NetlinkConfig {
    fn default() -> Self {
        NetlinkConfig {
            recv_buffer_bytes: default_recv_buffer(),
            socket_rcvbuf: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

/// Merged configuration from all sources
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: Level,
    pub format: OutputFormat,
    pub ipv6: bool,
    pub buckets: usize,
    pub duplicate_policy: DuplicatePolicy,
    pub recv_buffer_bytes: usize,
    pub socket_rcvbuf: Option<usize>,
}

impl Config {
    /// Load configuration from all sources (CLI args, config file, defaults)
    /// Priority: CLI args / environment variables > Config file > Defaults
    pub fn load() -> MonitorResult<Self> {
        let cli_args = CliArgs::parse();

        // Load config file if specified
        let config_file = if let Some(config_path) = &cli_args.config {
            let config_content = std::fs::read_to_string(config_path)?;
            parse_config_file(&config_content)?
        } else {
            // Try loading from default locations
            let default_paths = [
                PathBuf::from("route-monitor.toml"),
                PathBuf::from("config.toml"),
            ];

            let mut loaded_config = None;
            for path in default_paths {
                if path.exists() {
                    let config_content = std::fs::read_to_string(&path)?;
                    loaded_config = Some(parse_config_file(&config_content)?);
                    break;
                }
            }

            loaded_config.unwrap_or_default()
        };

        Self::merge(cli_args, config_file)
    }

    /// Merge configuration (CLI args override config file)
    fn merge(cli_args: CliArgs, config_file: ConfigFile) -> MonitorResult<Self> {
        let log_level =
            parse_log_level(cli_args.log_level.as_deref().unwrap_or(&config_file.logging.level))?;

        let format = match cli_args.format {
            Some(format) => format.parse().map_err(MonitorError::Config)?,
            None => config_file.output.format,
        };

        let duplicate_policy = match cli_args.duplicate_policy {
            Some(policy) => policy.parse().map_err(MonitorError::Config)?,
            None => config_file.monitor.duplicate_policy,
        };

        let buckets = cli_args.buckets.unwrap_or(config_file.monitor.buckets);
        if buckets == 0 {
            return Err(MonitorError::Config(
                "Route cache bucket count must be greater than zero".to_string(),
            ));
        }

        let recv_buffer_bytes = config_file.netlink.recv_buffer_bytes;
        if recv_buffer_bytes == 0 {
            return Err(MonitorError::Config(
                "Netlink receive buffer must be greater than zero".to_string(),
            ));
        }

        Ok(Config {
            log_level,
            format,
            ipv6: cli_args.ipv6 || config_file.monitor.ipv6,
            buckets,
            duplicate_policy,
            recv_buffer_bytes,
            socket_rcvbuf: config_file.netlink.socket_rcvbuf,
        })
    }
}

fn parse_config_file(content: &str) -> MonitorResult<ConfigFile> {
    toml::from_str(content).map_err(|e| MonitorError::Config(e.to_string()))
}

fn parse_log_level(level_str: &str) -> MonitorResult<Level> {
    match level_str.to_lowercase().as_str() {
        "error" => Ok(Level::ERROR),
        "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(MonitorError::Config(format!("Invalid log level: {}", level_str))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliArgs {
        let mut argv = vec!["route-monitor"];
        argv.extend_from_slice(args);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default();
        assert_eq!(config.monitor.buckets, 128);
        assert_eq!(config.monitor.duplicate_policy, DuplicatePolicy::Keep);
        assert!(!config.monitor.ipv6);
        assert_eq!(config.output.format, OutputFormat::Text);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config_file() {
        let config: ConfigFile = toml::from_str(
            r#"
            [monitor]
            ipv6 = true
            duplicate_policy = "replace"

            [netlink]
            socket_rcvbuf = 1048576

            [output]
            format = "json"
            "#,
        )
        .unwrap();

        assert!(config.monitor.ipv6);
        assert_eq!(config.monitor.buckets, 128);
        assert_eq!(config.monitor.duplicate_policy, DuplicatePolicy::Replace);
        assert_eq!(config.netlink.recv_buffer_bytes, DEFAULT_RECV_BUFFER);
        assert_eq!(config.netlink.socket_rcvbuf, Some(1048576));
        assert_eq!(config.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = ConfigFile::default();
        file.monitor.buckets = 64;
        file.logging.level = "debug".to_string();

        let config = Config::merge(
            cli(&["--buckets", "256", "--format", "json", "--duplicate-policy", "replace"]),
            file,
        )
        .unwrap();

        assert_eq!(config.buckets, 256);
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Replace);
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn test_zero_buckets_rejected() {
        assert!(Config::merge(cli(&["--buckets", "0"]), ConfigFile::default()).is_err());
    }

    #[test]
    fn test_invalid_format_rejected() {
        let err = Config::merge(cli(&["--format", "yaml"]), ConfigFile::default()).unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
        assert_eq!(err.to_string(), "Configuration error: Invalid output format: yaml");
    }

    #[test]
    fn test_malformed_config_file_is_config_error() {
        let err = parse_config_file("[monitor]\nbuckets = \"many\"").unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_parse_log_level() {
        assert!(matches!(parse_log_level("info"), Ok(Level::INFO)));
        assert!(matches!(parse_log_level("debug"), Ok(Level::DEBUG)));
        assert!(parse_log_level("invalid").is_err());
    }
}
