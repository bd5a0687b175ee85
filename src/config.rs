use crate::error::ConfigError;
use crate::magic::MacAddress;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Longest accepted idle window, in minutes (one year)
pub const MAX_STOP_TIMEOUT_MINUTES: u64 = 60 * 24 * 365;

/// Global configuration for the gate
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Listener and upstream settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Wake, health and sleep settings for the gated backend
    pub gate: GateConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Bind address (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listen port (default: 8080)
    #[serde(default = "default_listen_port")]
    pub port: u16,

    /// Upstream authority (`host:port`) requests are forwarded to once the backend is up
    #[serde(default)]
    pub upstream: String,

    /// Max time in seconds for the upstream to answer a forwarded request
    #[serde(default = "default_forward_timeout")]
    pub forward_timeout_secs: u64,

    /// Maximum idle connections per upstream host (default: 10)
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,

    /// Idle connection timeout in seconds (default: 90)
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_secs: u64,
}

impl ServerConfig {
    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.upstream.trim().is_empty() {
            return Err("server.upstream cannot be empty".to_string());
        }
        if self.forward_timeout_secs == 0 {
            return Err("server.forward_timeout_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_listen_port(),
            upstream: String::new(),
            forward_timeout_secs: default_forward_timeout(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            pool_idle_timeout_secs: default_pool_idle_timeout(),
        }
    }
}

/// HTTP verb used for start and stop calls
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum HttpMethod {
    #[default]
    #[serde(rename = "GET", alias = "get")]
    Get,
    #[serde(rename = "POST", alias = "post")]
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the sleeping backend is woken up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeTarget {
    /// Wake-on-LAN magic packet broadcast
    Broadcast {
        mac_address: MacAddress,
        ip_address: String,
        interface: Option<String>,
    },
    /// Call an HTTP endpoint that powers the backend on
    Http { start_url: String, method: HttpMethod },
}

/// Gate configuration. Keys also accept the camelCase spelling
/// (`healthCheck`, `macAddress`, ...).
#[derive(Debug, Deserialize, Clone)]
pub struct GateConfig {
    /// URL polled for liveness (required)
    #[serde(default, alias = "healthCheck")]
    pub health_check: String,

    /// Hardware address of the backend (broadcast wake)
    #[serde(default, alias = "macAddress")]
    pub mac_address: Option<String>,

    /// IP address of the backend, required together with `mac_address`
    #[serde(default, alias = "ipAddress")]
    pub ip_address: Option<String>,

    /// URL that starts the backend (HTTP wake)
    #[serde(default, alias = "startUrl")]
    pub start_url: Option<String>,

    #[serde(default, alias = "startMethod")]
    pub start_method: HttpMethod,

    /// URL that stops the backend; enables the idle sleep timer
    #[serde(default, alias = "stopUrl")]
    pub stop_url: Option<String>,

    #[serde(default, alias = "stopMethod")]
    pub stop_method: HttpMethod,

    /// Idle window in minutes before the backend is stopped
    #[serde(default = "default_stop_timeout", alias = "stopTimeout")]
    pub stop_timeout: u64,

    /// Per-call HTTP timeout in seconds
    #[serde(default = "default_request_timeout", alias = "requestTimeout")]
    pub request_timeout: u64,

    /// Health polls after a successful wake
    #[serde(default = "default_num_retries", alias = "numRetries")]
    pub num_retries: u32,

    /// Interface whose IPv4 address sources the broadcast
    #[serde(default, alias = "broadcastInterface")]
    pub broadcast_interface: Option<String>,

    /// Sleep between health polls in milliseconds
    #[serde(default = "default_poll_interval", alias = "pollIntervalMs")]
    pub poll_interval_ms: u64,
}

impl GateConfig {
    /// Minimal config for the HTTP wake mode
    pub fn http(health_check: &str, start_url: &str) -> Self {
        Self {
            start_url: Some(start_url.to_string()),
            ..Self::bare(health_check)
        }
    }

    /// Minimal config for the broadcast wake mode
    pub fn broadcast(health_check: &str, mac_address: &str, ip_address: &str) -> Self {
        Self {
            mac_address: Some(mac_address.to_string()),
            ip_address: Some(ip_address.to_string()),
            ..Self::bare(health_check)
        }
    }

    fn bare(health_check: &str) -> Self {
        Self {
            health_check: health_check.to_string(),
            mac_address: None,
            ip_address: None,
            start_url: None,
            start_method: HttpMethod::default(),
            stop_url: None,
            stop_method: HttpMethod::default(),
            stop_timeout: default_stop_timeout(),
            request_timeout: default_request_timeout(),
            num_retries: default_num_retries(),
            broadcast_interface: None,
            poll_interval_ms: default_poll_interval(),
        }
    }

    /// Set the stop URL and method (builder pattern)
    pub fn with_stop(mut self, stop_url: &str, method: HttpMethod) -> Self {
        self.stop_url = Some(stop_url.to_string());
        self.stop_method = method;
        self
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout.saturating_mul(60))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_url(&self) -> Option<&str> {
        non_empty(&self.stop_url)
    }

    pub fn broadcast_interface(&self) -> Option<&str> {
        non_empty(&self.broadcast_interface)
    }

    /// Resolve which wake mode is configured, rejecting conflicting combinations
    pub fn wake_target(&self) -> Result<WakeTarget, ConfigError> {
        let mac = non_empty(&self.mac_address);
        let ip = non_empty(&self.ip_address);
        let start_url = non_empty(&self.start_url);

        match (mac, ip, start_url) {
            (Some(_), None, _) | (None, Some(_), _) => Err(ConfigError::IncompleteBroadcastTarget),
            (None, None, None) => Err(ConfigError::MissingWakeTarget),
            (Some(_), Some(_), Some(_)) => Err(ConfigError::ConflictingWakeTargets),
            (Some(mac), Some(ip), None) => Ok(WakeTarget::Broadcast {
                mac_address: MacAddress::parse(mac)
                    .map_err(|_| ConfigError::InvalidMacAddress(mac.to_string()))?,
                ip_address: ip.to_string(),
                interface: self.broadcast_interface().map(String::from),
            }),
            (None, None, Some(url)) => Ok(WakeTarget::Http {
                start_url: url.to_string(),
                method: self.start_method,
            }),
        }
    }

    /// Validate the gate configuration and return the resolved wake mode
    pub fn validate(&self) -> Result<WakeTarget, ConfigError> {
        if self.health_check.trim().is_empty() {
            return Err(ConfigError::MissingHealthCheck);
        }

        let target = self.wake_target()?;

        if self.stop_timeout < 1 {
            return Err(ConfigError::OutOfRange { field: "stopTimeout" });
        }
        if self.stop_timeout > MAX_STOP_TIMEOUT_MINUTES {
            return Err(ConfigError::TooLarge {
                field: "stopTimeout",
                max: MAX_STOP_TIMEOUT_MINUTES,
            });
        }
        if self.request_timeout < 1 {
            return Err(ConfigError::OutOfRange { field: "requestTimeout" });
        }
        if self.num_retries < 1 {
            return Err(ConfigError::OutOfRange { field: "numRetries" });
        }
        if self.poll_interval_ms < 1 {
            return Err(ConfigError::OutOfRange { field: "pollIntervalMs" });
        }

        Ok(target)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// Default value functions
fn default_listen_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_forward_timeout() -> u64 {
    30
}

fn default_pool_max_idle_per_host() -> usize {
    10
}

fn default_pool_idle_timeout() -> u64 {
    90
}

fn default_stop_timeout() -> u64 {
    5 // minutes
}

fn default_request_timeout() -> u64 {
    5
}

fn default_num_retries() -> u32 {
    10
}

fn default_poll_interval() -> u64 {
    5000
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.server.validate() {
            errors.push(e);
        }
        if let Err(e) = self.gate.validate() {
            errors.push(format!("gate: {}", e));
        }

        if !errors.is_empty() {
            anyhow::bail!("Configuration errors:\n  - {}", errors.join("\n  - "));
        }

        Ok(())
    }
}
