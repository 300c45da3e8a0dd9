use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub events: EventsConfig,
    pub evidence: EvidenceConfig,
    pub retention: RetentionConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let events = EventsConfig {
            listener_buffer: positive("APP_EVENT_BUFFER", 64usize)?,
            heartbeat_interval: Duration::from_secs(positive("APP_HEARTBEAT_SECS", 15u64)?),
            max_missed_heartbeats: positive("APP_MAX_MISSED_HEARTBEATS", 3u32)?,
        };

        let evidence = EvidenceConfig {
            max_image_bytes: positive("APP_EVIDENCE_MAX_BYTES", 5 * 1024 * 1024u64)?,
        };

        let retention = RetentionConfig {
            notification_retention_days: positive("APP_NOTIFICATION_RETENTION_DAYS", 30u32)?,
            sweep_interval: Duration::from_secs(positive("APP_RETENTION_INTERVAL_SECS", 3600u64)?),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            events,
            evidence,
            retention,
        })
    }
}

fn positive<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let value = match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key })?,
        Err(_) => default,
    };

    if value <= T::default() {
        return Err(ConfigError::InvalidNumber { key });
    }
    Ok(value)
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Live event fan-out tuning.
#[derive(Debug, Clone)]
pub struct EventsConfig {
    /// Messages buffered per listener before deliveries to it are dropped.
    pub listener_buffer: usize,
    pub heartbeat_interval: Duration,
    /// Consecutive unacknowledged heartbeats before a listener is evicted.
    pub max_missed_heartbeats: u32,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            listener_buffer: 64,
            heartbeat_interval: Duration::from_secs(15),
            max_missed_heartbeats: 3,
        }
    }
}

/// Limits applied to submitted identity document images.
#[derive(Debug, Clone)]
pub struct EvidenceConfig {
    pub max_image_bytes: u64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Notification retention sweep settings.
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub notification_retention_days: u32,
    pub sweep_interval: Duration,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a positive integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
