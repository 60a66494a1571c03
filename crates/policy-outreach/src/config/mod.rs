use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::matching::MatchSettings;
use crate::workflows::policy::allocation::DEFAULT_LOAD_CAPACITY;

/// Deployment stage the engine runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Everything the API process needs at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub engine: EngineConfig,
    /// Caseworker roster CSV; the bundled roster is used when unset.
    pub roster_path: Option<PathBuf>,
}

impl AppConfig {
    /// Read `.env` (when present) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::parse(&text_var("APP_ENV").unwrap_or_default());
        let server = ServerConfig {
            host: text_var("APP_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_var("APP_PORT", 3000).map_err(|_| ConfigError::InvalidPort)?,
        };
        let telemetry = TelemetryConfig {
            log_level: text_var("APP_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        };

        Ok(Self {
            environment,
            server,
            telemetry,
            engine: EngineConfig::from_env()?,
            roster_path: text_var("OUTREACH_ROSTER_PATH").map(PathBuf::from),
        })
    }
}

/// HTTP binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = if self.host.eq_ignore_ascii_case("localhost") {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            self.host
                .parse()
                .map_err(|source| ConfigError::InvalidHost { source })?
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Time budgets and matching knobs for the outreach engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub collaborator_timeout_ms: u64,
    pub match_top_k: usize,
    pub match_min_score: f64,
    pub match_combination_threshold: f64,
    pub allocation_load_capacity: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let matching = MatchSettings::default();
        Self {
            collaborator_timeout_ms: 2_000,
            match_top_k: matching.top_k,
            match_min_score: matching.min_score,
            match_combination_threshold: matching.combination_threshold,
            allocation_load_capacity: DEFAULT_LOAD_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            collaborator_timeout_ms: parse_var(
                "OUTREACH_COLLABORATOR_TIMEOUT_MS",
                defaults.collaborator_timeout_ms,
            )?,
            match_top_k: parse_var("OUTREACH_MATCH_TOP_K", defaults.match_top_k)?,
            match_min_score: parse_var("OUTREACH_MATCH_MIN_SCORE", defaults.match_min_score)?,
            match_combination_threshold: parse_var(
                "OUTREACH_MATCH_COMBINATION_THRESHOLD",
                defaults.match_combination_threshold,
            )?,
            allocation_load_capacity: parse_var(
                "OUTREACH_ALLOCATION_LOAD_CAPACITY",
                defaults.allocation_load_capacity,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Scores live on 0-100 and every count must be positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let score_range = 0.0..=100.0;
        if !score_range.contains(&self.match_min_score) {
            return Err(ConfigError::OutOfRange {
                variable: "OUTREACH_MATCH_MIN_SCORE",
                expected: "0-100",
            });
        }
        if !score_range.contains(&self.match_combination_threshold) {
            return Err(ConfigError::OutOfRange {
                variable: "OUTREACH_MATCH_COMBINATION_THRESHOLD",
                expected: "0-100",
            });
        }
        if self.match_top_k == 0 {
            return Err(ConfigError::OutOfRange {
                variable: "OUTREACH_MATCH_TOP_K",
                expected: "at least 1",
            });
        }
        if self.allocation_load_capacity == 0 {
            return Err(ConfigError::OutOfRange {
                variable: "OUTREACH_ALLOCATION_LOAD_CAPACITY",
                expected: "at least 1",
            });
        }
        Ok(())
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    pub fn match_settings(&self) -> MatchSettings {
        MatchSettings {
            top_k: self.match_top_k,
            min_score: self.match_min_score,
            combination_threshold: self.match_combination_threshold,
        }
    }
}

fn text_var(variable: &str) -> Option<String> {
    env::var(variable)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parse_var<T: FromStr>(variable: &'static str, default: T) -> Result<T, ConfigError> {
    match text_var(variable) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { variable, value: raw }),
        None => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { variable: &'static str, value: String },
    OutOfRange { variable: &'static str, expected: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must be localhost or an IPv4/IPv6 address")
            }
            ConfigError::InvalidNumber { variable, value } => {
                write!(f, "{variable} must be numeric, got '{value}'")
            }
            ConfigError::OutOfRange { variable, expected } => {
                write!(f, "{variable} out of range, expected {expected}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
