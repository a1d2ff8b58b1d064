use crate::services::plan_tracer::models::{InstrumentCategory, InstrumentationConfig};
use crate::services::plan_tracer::tree::DEFAULT_MAX_PENDING_NODES;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub probe: ProbeConfig,
    pub database: DatabaseConfig,
    pub agent: AgentConfig,
    pub polling: PollingConfig,
    pub instrumentation: InstrumentationSettings,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Inbound probe event listener
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub listen_addr: String,
    /// Bounded ingestion channel between connections and the routing worker
    pub channel_capacity: usize,
}

/// Metadata lookup database; an empty url disables the lookup
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub lookup_timeout_ms: u64,
}

/// Agent command endpoint; an empty url only logs commands
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub command_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Plan polling interval in seconds (default: 30)
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstrumentationSettings {
    pub categories: Vec<String>,
    /// Script template file; the built-in template is used when unset
    pub template_path: Option<String>,
    pub postgres_bin: String,
    pub max_pending_nodes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Broadcast a final snapshot when a query finishes or is cancelled
    pub on_terminal: bool,
    pub broadcast_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Config {
    /// Load configuration with environment variable override support
    ///
    /// Loading order:
    /// 1. Load from `path` if given, else the first config.toml found
    /// 2. Override with environment variables (prefixed with APP_)
    /// 3. Validate the final configuration
    pub fn load(path: Option<&str>) -> Result<Self, anyhow::Error> {
        // 1. Load from config file
        let mut config = match path {
            Some(path) => Self::from_toml(path)?,
            None => match Self::find_config_file() {
                Some(config_path) => Self::from_toml(&config_path)?,
                None => {
                    tracing::warn!("Configuration file not found, using defaults");
                    Config::default()
                },
            },
        };

        // 2. Override with environment variables
        let _ = dotenvy::dotenv();
        config.apply_env_overrides();

        // 3. Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_SERVER_HOST: HTTP host (default: 0.0.0.0)
    /// - APP_SERVER_PORT: HTTP port (default: 8080)
    /// - APP_PROBE_LISTEN_ADDR: Probe listener address (default: 0.0.0.0:7070)
    /// - APP_DATABASE_URL: Postgres URL for the metadata lookup
    /// - APP_AGENT_COMMAND_URL: Agent command endpoint
    /// - APP_POLLING_INTERVAL_SECS: Polling interval (accepts "30s", "5m")
    /// - APP_LOG_LEVEL: Logging level (e.g., "info,plantap_collector=debug")
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
            tracing::info!("Override server.host from env: {}", self.server.host);
        }

        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
            tracing::info!("Override server.port from env: {}", self.server.port);
        }

        if let Ok(addr) = std::env::var("APP_PROBE_LISTEN_ADDR") {
            self.probe.listen_addr = addr;
            tracing::info!("Override probe.listen_addr from env: {}", self.probe.listen_addr);
        }

        if let Ok(db_url) = std::env::var("APP_DATABASE_URL") {
            self.database.url = db_url;
            tracing::info!("Override database.url from env");
        }

        if let Ok(url) = std::env::var("APP_AGENT_COMMAND_URL") {
            self.agent.command_url = url;
            tracing::info!("Override agent.command_url from env: {}", self.agent.command_url);
        }

        if let Ok(interval) = std::env::var("APP_POLLING_INTERVAL_SECS") {
            match parse_duration_to_secs(&interval) {
                Ok(val) => {
                    self.polling.interval_secs = val;
                    tracing::info!(
                        "Override polling.interval_secs from env: {}",
                        self.polling.interval_secs
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid APP_POLLING_INTERVAL_SECS '{}': {} (keep {})",
                    interval,
                    e,
                    self.polling.interval_secs
                ),
            }
        }

        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.probe.channel_capacity == 0 {
            anyhow::bail!("probe.channel_capacity must be > 0");
        }

        if self.polling.interval_secs == 0 {
            anyhow::bail!("polling.interval_secs must be > 0");
        }

        if self.export.broadcast_capacity == 0 {
            anyhow::bail!("export.broadcast_capacity must be > 0");
        }

        self.instrumentation.to_instrumentation_config()?;

        if self.database.url.is_empty() {
            tracing::warn!("database.url is empty, query metadata lookup is disabled");
        }

        Ok(())
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.database.lookup_timeout_ms)
    }

    fn find_config_file() -> Option<String> {
        let possible_paths = ["conf/config.toml", "config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path, e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, anyhow::Error> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

impl InstrumentationSettings {
    /// Parse the configured category names
    pub fn to_instrumentation_config(&self) -> Result<InstrumentationConfig, anyhow::Error> {
        let categories = self
            .categories
            .iter()
            .map(|name| name.parse::<InstrumentCategory>().map_err(anyhow::Error::msg))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(InstrumentationConfig::new(categories))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { listen_addr: "0.0.0.0:7070".to_string(), channel_capacity: 4096 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: String::new(), max_connections: 2, lookup_timeout_ms: 500 }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { command_url: String::new(), request_timeout_secs: 5 }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

impl Default for InstrumentationSettings {
    fn default() -> Self {
        Self {
            categories: vec!["base".to_string(), "accumulated".to_string()],
            template_path: None,
            postgres_bin: "postgres".to_string(),
            max_pending_nodes: DEFAULT_MAX_PENDING_NODES,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { on_terminal: true, broadcast_capacity: 256 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,plantap_collector=debug".to_string(),
            file: Some("logs/plantap-collector.log".to_string()),
        }
    }
}

// =========================
// Helpers for parsing values
// =========================

fn parse_duration_to_secs(input: &str) -> Result<u64, String> {
    // Accept plain numbers (treated as seconds)
    if let Ok(val) = input.parse::<u64>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: u64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(n),
        "m" | "min" | "mins" | "minute" | "minutes" => Ok(n * 60),
        "h" | "hr" | "hour" | "hours" => Ok(n * 60 * 60),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}

// Accepts a number of seconds or a human-friendly string
fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of seconds or a string like '30s', '5m'")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v >= 0 { Ok(v as u64) } else { Err(E::custom("negative not allowed")) }
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}
