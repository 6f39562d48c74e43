use serde::Deserialize;
use tracing::Level;
use updategate_core::GuardError;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub relay: RelayConfig,
    pub policy: PolicyConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "localhost:3306".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    pub addr: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            addr: "mysql-server:3306".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RelayConfig {
    /// Chunk size for directions that are copied without inspection.
    pub copy_buffer_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            copy_buffer_bytes: 4096,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PolicyConfig {
    /// Also run the classifier over server->client packets.
    pub inspect_server_traffic: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl LoggingConfig {
    pub fn max_level(&self) -> anyhow::Result<Level> {
        Ok(self.level.parse::<Level>()?)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1:9898".into(),
        }
    }
}

impl Config {
    pub fn from_path(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.server.listen_addr.trim().is_empty() {
            return Err(GuardError::Config("server.listen_addr is empty".into()).into());
        }
        if self.upstream.addr.trim().is_empty() {
            return Err(GuardError::Config("upstream.addr is empty".into()).into());
        }
        if self.relay.copy_buffer_bytes == 0 {
            return Err(GuardError::Config("relay.copy_buffer_bytes must be positive".into()).into());
        }
        if self.logging.max_level().is_err() {
            return Err(GuardError::Config(format!(
                "unknown logging.level {:?}",
                self.logging.level
            ))
            .into());
        }
        if self.metrics.enabled && self.metrics.listen_addr.trim().is_empty() {
            return Err(GuardError::Config("metrics enabled but listen_addr missing".into()).into());
        }
        Ok(())
    }
}
