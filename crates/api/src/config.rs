//! Process configuration, read from the environment (and `.env` when present).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use stockbook_invoicing::Company;
use stockbook_observability::LogFormat;
use thiserror::Error;

/// Secret used when `JWT_SECRET` is unset. Only suitable for local development.
pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub jwt_secret: String,
    /// Postgres event store; in-memory when unset.
    pub database_url: Option<String>,
    /// Seed reference and demo data into an empty store.
    pub seed: bool,
    pub company_name: String,
    pub company_address: Option<String>,
    pub currency: String,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            database_url: None,
            seed: false,
            company_name: "Stockbook".to_string(),
            company_address: None,
            currency: "MAD".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` first so a local `.env` file is honoured.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let optional = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = match optional("STOCKBOOK_HOST") {
            Some(v) => v
                .parse::<IpAddr>()
                .map_err(|e| ConfigError::InvalidEnvVar("STOCKBOOK_HOST".to_string(), e.to_string()))?,
            None => defaults.host,
        };
        let port = match optional("STOCKBOOK_PORT") {
            Some(v) => v
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidEnvVar("STOCKBOOK_PORT".to_string(), e.to_string()))?,
            None => defaults.port,
        };
        let seed = match optional("STOCKBOOK_SEED") {
            Some(v) => parse_bool(&v)
                .ok_or_else(|| ConfigError::InvalidEnvVar("STOCKBOOK_SEED".to_string(), format!("not a boolean: {v}")))?,
            None => defaults.seed,
        };
        let currency = optional("CURRENCY").unwrap_or(defaults.currency);
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::InvalidEnvVar(
                "CURRENCY".to_string(),
                "expected a three-letter currency code".to_string(),
            ));
        }

        Ok(Self {
            host,
            port,
            jwt_secret: optional("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            database_url: optional("DATABASE_URL"),
            seed,
            company_name: optional("COMPANY_NAME").unwrap_or(defaults.company_name),
            company_address: optional("COMPANY_ADDRESS"),
            currency: currency.to_ascii_uppercase(),
            log_format: optional("LOG_FORMAT").map(|v| LogFormat::parse(&v)).unwrap_or_default(),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    /// Issuer block printed on invoices.
    pub fn company(&self) -> Company {
        Company {
            name: self.company_name.clone(),
            address: self.company_address.clone(),
            currency: self.currency.clone(),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
