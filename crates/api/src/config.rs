//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::{CompensationFailurePolicy, OrchestratorConfig, RetryPolicy};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Which implementations back the orchestrator's outbound ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// In-process ports, optionally driven by the event simulator.
    #[default]
    Mock,
    /// HTTP ports against the compute backend, services and topic.
    Remote,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `json` for JSON log lines (default: pretty)
/// - `SAGA_BACKEND` — `mock` or `remote` (default: `mock`)
/// - `DATABASE_URL` — Postgres state store when set, in-memory otherwise
/// - `DISPATCH_TIMEOUT_MS` — per-attempt dispatch timeout (default: `5000`)
/// - `DISPATCH_MAX_ATTEMPTS` — dispatch attempts including the first (default: `3`)
/// - `COMPENSATION_FAILURE_POLICY` — `manual` or `page` (default: `manual`)
/// - `SIMULATOR_ENABLED` — run the event simulator in mock mode (default: `true`)
///
/// The remote adapters read their own endpoints (`COMPUTE_BACKEND_URL`,
/// `INVENTORY_SERVICE_URL`, `SHIPPING_SERVICE_URL`, `EVENT_TOPIC_URL`, ...).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub backend: Backend,
    pub database_url: Option<String>,
    pub dispatch_timeout: Duration,
    pub dispatch_max_attempts: usize,
    pub failure_policy: CompensationFailurePolicy,
    pub simulator_enabled: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            backend: match lookup("SAGA_BACKEND").as_deref() {
                Some("remote") => Backend::Remote,
                _ => Backend::Mock,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            dispatch_timeout: lookup("DISPATCH_TIMEOUT_MS")
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.dispatch_timeout),
            dispatch_max_attempts: lookup("DISPATCH_MAX_ATTEMPTS")
                .and_then(|n| n.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.dispatch_max_attempts),
            failure_policy: lookup("COMPENSATION_FAILURE_POLICY")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.failure_policy),
            simulator_enabled: lookup("SIMULATOR_ENABLED")
                .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "false" | "0" | "no"))
                .unwrap_or(defaults.simulator_enabled),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the orchestrator settings derived from this configuration.
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            retry: RetryPolicy {
                max_attempts: self.dispatch_max_attempts,
                ..RetryPolicy::default()
            },
            dispatch_timeout: self.dispatch_timeout,
            failure_policy: self.failure_policy,
            ..OrchestratorConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            backend: Backend::Mock,
            database_url: None,
            dispatch_timeout: Duration::from_secs(5),
            dispatch_max_attempts: 3,
            failure_policy: CompensationFailurePolicy::ManualIntervention,
            simulator_enabled: true,
        }
    }
}
