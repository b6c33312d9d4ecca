use std::net::SocketAddr;

use serde::Deserialize;
use thiserror::Error;

/// Startup configuration failures. Any of these stops the process before it binds.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid signing secret: {0}")]
    InvalidSecret(String),
    #[error("JWT_TTL_MINUTES must be between 1 and {max}, got {minutes}")]
    InvalidTtl { minutes: i64, max: i64 },
    #[error("invalid bind address {0}")]
    InvalidAddr(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Base64 encoded HMAC key.
    pub secret: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
        };
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("APP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(8080),
            jwt,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidAddr(format!("{}:{}", self.host, self.port)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: &str) -> AppConfig {
        AppConfig {
            database_url: None,
            host: host.into(),
            port: 8080,
            jwt: JwtConfig {
                secret: String::new(),
                ttl_minutes: 60,
            },
        }
    }

    #[test]
    fn bind_addr_parses_host_and_port() {
        let addr = config("127.0.0.1").bind_addr().expect("valid addr");
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn bind_addr_rejects_garbage_host() {
        let err = config("not a host").bind_addr().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddr(_)));
    }

    #[test]
    fn config_errors_name_the_offending_setting() {
        let ttl = ConfigError::InvalidTtl {
            minutes: 0,
            max: 1440,
        };
        assert!(ttl.to_string().contains("JWT_TTL_MINUTES"));
        assert!(ConfigError::Missing("JWT_SECRET").to_string().contains("JWT_SECRET"));
        assert!(ConfigError::InvalidAddr("x:1".into()).to_string().contains("x:1"));
    }
}
