//! Configuration for a batch run.
//!
//! What to aggregate comes from seven positional arguments, mirroring the
//! usage line `gab <graphite> <carbon> <regex> <out> <func> <from> <to>`.
//! How to talk to the outside world comes from layered settings:
//! 1. Default configuration (embedded in binary)
//! 2. System-wide configuration file (`/etc/gab/config.toml`)
//! 3. User-specified configuration file (`--config`)
//! 4. Environment variables (prefixed with `GAB_`, `__` between sections,
//!    e.g. `GAB_GRAPHITE__TIMEOUT_SECS=30`)
//!
//! Later sources override earlier ones.

use crate::catalog::Grouping;
use crate::error::ConfigError;
use crate::functions::AggregateFunction;
use clap::Parser;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");
const DEFAULT_CONFIG_PATH: &str = "/etc/gab/config.toml";

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE", env = "GAB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Graphite base url, e.g. http://mygraphiteserver
    pub graphite: String,

    /// Carbon host, with optional port, e.g. yourcarbonhost:2003
    pub carbon: String,

    /// Regex to match incoming metrics
    pub regex: String,

    /// Pattern to construct outgoing metric ($1, ${name}, ...)
    pub out: String,

    /// Function to use, e.g. avg or sum
    pub func: String,

    /// From unix timestamp (empty: 0)
    pub from: String,

    /// To unix timestamp (empty: now)
    pub to: String,
}

/// Layered settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub graphite: GraphiteSettings,
    #[serde(default)]
    pub carbon: CarbonSettings,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphiteSettings {
    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GraphiteSettings {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CarbonSettings {
    /// Port used when the carbon argument has none
    pub default_port: u16,
    /// Connect and write timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CarbonSettings {
    fn default() -> Self {
        Self {
            default_port: 2003,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputSettings {
    /// Decimals in values sent to carbon
    pub precision: usize,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self { precision: 6 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// tracing filter directive, used when RUST_LOG is unset
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from all available sources.
    pub fn new(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Ok(metadata) = std::fs::metadata(DEFAULT_CONFIG_PATH) {
            if metadata.is_file() {
                builder = builder.add_source(File::from(PathBuf::from(DEFAULT_CONFIG_PATH)));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path.to_path_buf()));
        }

        builder = builder.add_source(
            Environment::with_prefix("GAB")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }
}

/// Carbon `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarbonAddress {
    pub host: String,
    pub port: u16,
}

impl CarbonAddress {
    /// Parses `host` or `host:port`.
    pub fn parse(value: &str, default_port: u16) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::CarbonAddress {
            value: value.to_string(),
            reason,
        };

        let (host, port) = match value.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|e| invalid(format!("invalid carbon port: {}", e)))?;
                (host, port)
            }
            None => (value, default_port),
        };

        if host.is_empty() {
            return Err(invalid("missing host".to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl Display for CarbonAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parses one end of the window. Empty means `default`.
pub fn parse_timestamp(field: &'static str, value: &str, default: i64) -> Result<i64, ConfigError> {
    if value.is_empty() {
        return Ok(default);
    }
    value.parse::<i64>().map_err(|source| ConfigError::Timestamp {
        field,
        value: value.to_string(),
        source,
    })
}

/// A fully checked run request.
#[derive(Debug, Clone)]
pub struct Plan {
    pub graphite: String,
    pub carbon: CarbonAddress,
    pub grouping: Grouping,
    pub function: AggregateFunction,
    pub from: i64,
    pub until: i64,
}

impl Plan {
    /// Validates the arguments. `now` is used when `to` is empty.
    pub fn from_args(args: &CliArgs, settings: &Settings, now: i64) -> Result<Self, ConfigError> {
        let carbon = CarbonAddress::parse(&args.carbon, settings.carbon.default_port)?;
        let grouping = Grouping::new(&args.regex, &args.out)?;
        let function = args.func.parse::<AggregateFunction>()?;
        let from = parse_timestamp("from", &args.from, 0)?;
        let until = parse_timestamp("to", &args.to, now)?;

        Ok(Self {
            graphite: args.graphite.clone(),
            carbon,
            grouping,
            function,
            from,
            until,
        })
    }
}
