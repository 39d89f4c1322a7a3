//! Gateway configuration
//!
//! Sources, later ones winning: built-in defaults, an optional
//! `router.toml`, `ROUTER_*` environment variables, then per-backend
//! `<NAME>_MCP_URL` overrides. The model credential is `GROQ_API_KEY`.
//!
//! A single `_` follows the prefix and `__` separates nested keys:
//! `ROUTER_API_PORT=6001`, `ROUTER_BACKENDS__WEATHER=http://...`.

use anyhow::{Context, Result};
use router_lib::agent::{BootstrapConfig, ModelSettings, ProbeConfig};
use router_lib::backends::Backend;
use router_lib::models::ServiceEndpoint;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

pub const API_KEY_ENV: &str = "GROQ_API_KEY";

/// Gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Port for the chat, status, health and metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Backend name to MCP endpoint URL; the built-in backends are always
    /// present and configured entries add to or replace them
    #[serde(default = "default_backends")]
    pub backends: BTreeMap<String, String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_model_base_url")]
    pub model_base_url: String,

    /// Serve the system metrics backend from this process
    #[serde(default = "default_true")]
    pub embedded_sys: bool,

    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,

    #[serde(default = "default_probe_max_attempts")]
    pub probe_max_attempts: u32,

    #[serde(default = "default_discovery_attempts")]
    pub discovery_attempts: u32,

    #[serde(default = "default_cool_down")]
    pub cool_down_secs: u64,

    /// 0 disables re-probing after publication
    #[serde(default = "default_watch_interval")]
    pub watch_interval_secs: u64,

    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Read from `GROQ_API_KEY`, never from files
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_api_port() -> u16 {
    5001
}

fn default_backends() -> BTreeMap<String, String> {
    Backend::ALL
        .iter()
        .map(|b| (b.name().to_string(), b.default_url()))
        .collect()
}

fn default_model() -> String {
    ModelSettings::default().model
}

fn default_model_base_url() -> String {
    ModelSettings::default().base_url
}

fn default_true() -> bool {
    true
}

fn default_sample_interval() -> u64 {
    2000
}

fn default_probe_max_attempts() -> u32 {
    40
}

fn default_discovery_attempts() -> u32 {
    10
}

fn default_cool_down() -> u64 {
    5
}

fn default_watch_interval() -> u64 {
    15
}

fn default_max_steps() -> usize {
    8
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            backends: default_backends(),
            model: default_model(),
            model_base_url: default_model_base_url(),
            embedded_sys: default_true(),
            sample_interval_ms: default_sample_interval(),
            probe_max_attempts: default_probe_max_attempts(),
            discovery_attempts: default_discovery_attempts(),
            cool_down_secs: default_cool_down(),
            watch_interval_secs: default_watch_interval(),
            max_steps: default_max_steps(),
            api_key: None,
        }
    }
}

impl RouterConfig {
    /// Load from `router.toml` (if present) and the process environment
    pub fn load() -> Result<Self> {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self::load_from(Path::new("router"), &vars)
    }

    /// Load with an explicit config file stem and environment
    pub fn load_from(file: &Path, vars: &HashMap<String, String>) -> Result<Self> {
        let mut builder = config::Config::builder();
        for backend in Backend::ALL {
            builder = builder
                .set_default(format!("backends.{}", backend.name()), backend.default_url())
                .context("Invalid backend default")?;
        }

        let settings = builder
            .add_source(config::File::from(file).required(false))
            .add_source(
                config::Environment::with_prefix("ROUTER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect())),
            )
            .build()
            .context("Failed to read router configuration")?;

        let mut config: RouterConfig = settings
            .try_deserialize()
            .context("Invalid router configuration")?;
        config.apply_overrides(|key| vars.get(key).cloned());
        Ok(config)
    }

    /// Apply `<NAME>_MCP_URL` and `GROQ_API_KEY`
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        for (name, url) in self.backends.iter_mut() {
            if let Some(value) = env(&format!("{}_MCP_URL", name.to_uppercase())) {
                if !value.trim().is_empty() {
                    *url = value.trim().to_string();
                }
            }
        }
        self.api_key = env(API_KEY_ENV).filter(|k| !k.trim().is_empty());
    }

    pub fn endpoints(&self) -> Vec<ServiceEndpoint> {
        self.backends
            .iter()
            .map(|(name, url)| ServiceEndpoint::new(name.clone(), url.clone()))
            .collect()
    }

    pub fn bootstrap_config(&self) -> BootstrapConfig {
        BootstrapConfig {
            endpoints: self.endpoints(),
            probe: ProbeConfig {
                max_attempts: self.probe_max_attempts,
                ..ProbeConfig::default()
            },
            discovery_attempts: self.discovery_attempts,
            cool_down: Duration::from_secs(self.cool_down_secs),
            watch_interval: (self.watch_interval_secs > 0)
                .then(|| Duration::from_secs(self.watch_interval_secs)),
            max_steps: self.max_steps,
            ..BootstrapConfig::default()
        }
    }

    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            base_url: self.model_base_url.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
        }
    }

    /// Port for the embedded sys backend, taken from its configured URL
    pub fn sys_port(&self) -> u16 {
        self.backends
            .get(Backend::Sys.name())
            .and_then(|url| url::Url::parse(url).ok())
            .and_then(|url| url.port_or_known_default())
            .unwrap_or_else(|| Backend::Sys.default_port())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}
