//! # Configuration Module
//!
//! Loads the client configuration from `rpclient.toml` and the environment.
//!
//! ## Configuration Loading Flow (block diagram)
//!
//! ```text
//! +-------------------+     +-------------------+     +-------------------+
//! | RPCLIENT_CONFIG   | --> | Path resolution   | --> | rpclient.toml     |
//! | (optional)        |     | or default ./     |     |                   |
//! +-------------------+     +-------------------+     +-------------------+
//!                                                              |
//!                                                              v
//! +-------------------+     +-------------------+     +-------------------+
//! | .env + env vars   | --> | RPCLIENT_* prefix | --> | Config struct     |
//! | RPCLIENT_KEY=val  |     | overrides         |     | (validated)       |
//! +-------------------+     +-------------------+     +-------------------+
//! ```
//!
//! ## Config File Location
//!
//! 1. If `RPCLIENT_CONFIG` environment variable is set, load from that path
//! 2. Otherwise, load from `rpclient.toml` in the current directory. A missing
//!    default file is not an error; defaults and environment variables apply.
//!
//! ## Configuration Structure
//!
//! ```toml
//! endpoint = "https://reportportal.example.com"
//! project = "my_project"
//! token = "00000000-0000-0000-0000-000000000000"
//! bts_project = "PRJ"
//! bts_url = "https://jira.example.com"
//! timeout = "120s"
//! log_level = "info"
//!
//! [retry]
//! count = 3
//! factor = 2.0
//! jitter = true
//! min_delay = "100ms"
//! max_delay = "10s"
//! ```
//!
//! Every top-level key can be overridden with `RPCLIENT_<KEY>`, e.g.
//! `RPCLIENT_TOKEN=...`. The retry count is overridden with
//! `RPCLIENT_RETRY_COUNT`.

use serde::Deserialize;
use std::{io::Read, path::Path, time::Duration};
use tracing::*;
use url::Url;

use crate::{Error, Result};

/// Environment variable name for specifying the config file path.
const RPCLIENT_CONFIG_ENV: &str = "RPCLIENT_CONFIG";

/// Prefix of environment variables overriding config values.
const ENV_PREFIX: &str = "RPCLIENT_";

/// Client configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base address of the reporting service, e.g. `https://rp.example.com`.
    pub endpoint: String,
    pub project: String,
    /// Bearer credential sent with every request.
    pub token: String,
    /// Project in the external bug tracking system, used when linking issues.
    pub bts_project: String,
    pub bts_url: String,
    /// Path prefix of the service API.
    pub api_path: String,
    pub user_agent: String,
    /// Overall timeout of a single request attempt.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Verbosity of the client's own logs, in `tracing` filter syntax.
    pub log_level: String,
    /// Dump every request and response at debug level.
    pub dump_transport: bool,
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            endpoint: String::new(),
            project: String::new(),
            token: String::new(),
            bts_project: String::new(),
            bts_url: String::new(),
            api_path: "/api/v1".to_string(),
            user_agent: concat!("rpclient/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(120),
            log_level: "info".to_string(),
            dump_transport: false,
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    pub fn new(
        endpoint: impl Into<String>,
        project: impl Into<String>,
        token: impl Into<String>,
    ) -> Config {
        Config {
            endpoint: endpoint.into(),
            project: project.into(),
            token: token.into(),
            ..Default::default()
        }
    }

    /// Load configuration from file and environment.
    ///
    /// Loading order:
    /// 1. If `RPCLIENT_CONFIG` env var is set, load from that path
    /// 2. Otherwise, load from `rpclient.toml` in the current directory
    /// 3. Apply `RPCLIENT_*` environment variables (including those from `.env`)
    pub fn load() -> Result<Config> {
        let _ = dotenv::dotenv();

        let mut cfg = match std::env::var(RPCLIENT_CONFIG_ENV) {
            Ok(path) => {
                let path = Path::new(&path);

                if path.extension().is_none_or(|ext| ext != "toml")
                    && !path.to_string_lossy().contains(std::path::MAIN_SEPARATOR)
                    && !path.to_string_lossy().contains('/')
                {
                    return Err(Error::Config(format!(
                        "{RPCLIENT_CONFIG_ENV} should be a path to a config file, not a config value. \
                         Got: {path:?}. Use RPCLIENT_<KEY>=value for config values instead."
                    )));
                }

                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file specified by {RPCLIENT_CONFIG_ENV} not found: {path:?}"
                    )));
                }

                debug!("Loading config from {RPCLIENT_CONFIG_ENV}={path:?}");
                Config::load_from(path)?
            }
            Err(_) => Config::load_from(Path::new("rpclient.toml"))?,
        };

        cfg.apply_env(std::env::vars())?;
        Ok(cfg)
    }

    /// Load configuration from path. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Config> {
        let Ok(mut file) = std::fs::File::open(path) else {
            return Ok(Config::default());
        };

        let mut buf = String::new();
        file.read_to_string(&mut buf)
            .map_err(|e| Error::Config(e.to_string()))?;

        let cfg: Config = toml::from_str(&buf).map_err(|e| {
            Error::Config(format!("failed to deserialize {path:?} into Config: {e}"))
        })?;

        debug!("{path:?} was successfully loaded");
        Ok(cfg)
    }

    /// Override values with `RPCLIENT_*` variables.
    pub fn apply_env(&mut self, vars: impl IntoIterator<Item = (String, String)>) -> Result<()> {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let invalid = |e: String| Error::Config(format!("{key}: {e}"));

            match name.to_lowercase().as_str() {
                "config" => {}
                "endpoint" => self.endpoint = value,
                "project" => self.project = value,
                "token" => self.token = value,
                "bts_project" => self.bts_project = value,
                "bts_url" => self.bts_url = value,
                "api_path" => self.api_path = value,
                "user_agent" => self.user_agent = value,
                "log_level" => self.log_level = value,
                "timeout" => {
                    self.timeout = humantime_serde::re::humantime::parse_duration(&value)
                        .map_err(|e| invalid(e.to_string()))?;
                }
                "dump_transport" => {
                    self.dump_transport = value
                        .parse::<bool>()
                        .map_err(|e| invalid(e.to_string()))?;
                }
                "retry_count" => {
                    self.retry.count = value
                        .parse::<usize>()
                        .map_err(|e| invalid(e.to_string()))?;
                }
                other => debug!("ignoring unknown configuration variable {ENV_PREFIX}{other}"),
            }
        }

        Ok(())
    }

    /// Checks that the values needed to reach the service are present.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(Error::Config("endpoint is not set".into()));
        }
        if self.project.is_empty() {
            return Err(Error::Config("project is not set".into()));
        }
        self.base_url()?;
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.endpoint)?)
    }
}

/// Retry policy of every request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Number of retries after the first attempt.
    pub count: usize,
    /// Factor to multiply the delay between retries.
    pub factor: f32,
    /// Whether to add jitter to the delay between retries.
    pub jitter: bool,
    /// Minimum delay between retries.
    #[serde(with = "humantime_serde")]
    pub min_delay: Duration,
    /// Maximum delay between retries.
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            count: 3,
            factor: 2.0,
            jitter: false,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Retry `count` times without waiting in between.
    pub fn immediate(count: usize) -> RetryConfig {
        RetryConfig {
            count,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    pub fn backoff(&self) -> backon::ExponentialBuilder {
        let builder = backon::ExponentialBuilder::new()
            .with_max_times(self.count)
            .with_factor(self.factor)
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay);

        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}
