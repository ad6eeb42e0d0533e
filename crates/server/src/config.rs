//! Server configuration.
//!
//! Settings are layered, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. TOML file given with `--config`
//! 3. Environment variables with the `INFERADB__ISSUES__` prefix, using `__`
//!    for nesting (e.g. `INFERADB__ISSUES__DETECTOR__WORKERS=8`)
//! 4. Command-line flags
//!
//! Single underscores in field names are preserved, so
//! `INFERADB__ISSUES__METRICS_ADDR` sets `metrics_addr`.

use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

use clap::{Parser, Subcommand, ValueEnum};
use inferadb_issues_types::config::{ConfigError, DetectorConfig};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

/// Environment variable prefix shared by the CLI and the layered loader.
pub const ENV_PREFIX: &str = "INFERADB__ISSUES";

const fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 8180)
}

/// Log output format.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    Text,
    /// One JSON object per line.
    Json,
    /// JSON when stdout is not a terminal, text otherwise.
    #[default]
    Auto,
}

/// Admin server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Address the admin HTTP server listens on. Default: 127.0.0.1:8180.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Address for the Prometheus `/metrics` listener. Disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_addr: Option<SocketAddr>,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
    /// File the configuration was loaded from, if any.
    #[serde(skip)]
    #[schemars(skip)]
    pub config_file: Option<PathBuf>,
    /// Detector settings.
    #[serde(default)]
    pub detector: DetectorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            metrics_addr: None,
            log_format: LogFormat::default(),
            config_file: None,
            detector: DetectorConfig::default(),
        }
    }
}

/// Errors raised while loading or rendering configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LoadError {
    /// A configuration source could not be read or deserialized.
    #[snafu(display("failed to load configuration: {source}"))]
    Source {
        /// Error from the layered loader.
        source: config::ConfigError,
    },

    /// The merged configuration failed validation.
    #[snafu(display("invalid configuration: {source}"))]
    Invalid {
        /// Validation failure.
        source: ConfigError,
    },

    /// The example configuration could not be rendered.
    #[snafu(display("failed to render example configuration: {source}"))]
    Render {
        /// Serializer error.
        source: toml::ser::Error,
    },

    /// The configuration schema could not be rendered.
    #[snafu(display("failed to render configuration schema: {source}"))]
    Schema {
        /// Serializer error.
        source: serde_json::Error,
    },
}

/// Command-line interface.
#[derive(Debug, Parser)]
#[command(name = "inferadb-issues", version, about = "InferaDB name-conflict issue detector")]
pub struct Cli {
    /// Optional subcommand; starts the server when absent.
    #[command(subcommand)]
    pub command: Option<CliCommand>,

    /// Server settings.
    #[command(flatten)]
    pub args: ServerArgs,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Inspect the configuration format.
    Config {
        /// What to print.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// `config` subcommand actions.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Print the JSON schema of the configuration file.
    Schema,
    /// Print an example configuration file with every default filled in.
    Example,
}

/// Flags that override file and environment settings.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ServerArgs {
    /// TOML configuration file.
    #[arg(long = "config", env = "INFERADB__ISSUES__CONFIG")]
    pub config_file: Option<PathBuf>,

    /// Admin HTTP listen address.
    #[arg(long = "listen", env = "INFERADB__ISSUES__LISTEN_ADDR")]
    pub listen_addr: Option<SocketAddr>,

    /// Prometheus metrics listen address.
    #[arg(long = "metrics", env = "INFERADB__ISSUES__METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    /// Log output format.
    #[arg(long, value_enum, env = "INFERADB__ISSUES__LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Number of detector apply workers.
    #[arg(long, env = "INFERADB__ISSUES__DETECTOR__WORKERS")]
    pub workers: Option<usize>,
}

impl ServerArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(addr) = self.listen_addr {
            config.listen_addr = addr;
        }
        if let Some(addr) = self.metrics_addr {
            config.metrics_addr = Some(addr);
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if let Some(workers) = self.workers {
            config.detector.workers = workers;
        }
        config.config_file = self.config_file.clone();
    }
}

impl Config {
    /// Loads the layered configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Source`] if the file is missing or malformed, and
    /// [`LoadError::Invalid`] if the merged values fail validation.
    pub fn load(args: &ServerArgs) -> Result<Self, LoadError> {
        Self::load_with_env(args, None)
    }

    /// Like [`load`](Self::load), reading variables from `env` instead of the
    /// process environment when given.
    pub(crate) fn load_with_env(
        args: &ServerArgs,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, LoadError> {
        let mut builder = config::Config::builder();
        if let Some(path) = &args.config_file {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let mut config: Config =
            builder.build().context(SourceSnafu)?.try_deserialize().context(SourceSnafu)?;
        args.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Validates the merged configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Invalid`] if the detector settings are out of range.
    pub fn validate(&self) -> Result<(), LoadError> {
        self.detector.validate().context(InvalidSnafu)
    }

    /// Whether the admin server only accepts local connections.
    pub fn is_localhost_only(&self) -> bool {
        self.listen_addr.ip().is_loopback()
    }
}

/// Renders the JSON schema of the configuration file.
///
/// # Errors
///
/// Returns [`LoadError::Schema`] if serialization fails.
pub fn generate_config_schema() -> Result<String, LoadError> {
    let schema = schemars::schema_for!(Config);
    let mut rendered = serde_json::to_string_pretty(&schema).context(SchemaSnafu)?;
    rendered.push('\n');
    Ok(rendered)
}

/// Renders an example TOML configuration with every default filled in.
///
/// # Errors
///
/// Returns [`LoadError::Render`] if serialization fails.
pub fn generate_config_example() -> Result<String, LoadError> {
    let example = Config {
        metrics_addr: Some(SocketAddr::new(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 9180)),
        ..Config::default()
    };
    toml::to_string_pretty(&example).context(RenderSnafu)
}
