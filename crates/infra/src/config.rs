//! Process configuration loaded from environment variables.
//!
//! | variable | default | meaning |
//! |----------|---------|---------|
//! | `BIND_ADDR` | `0.0.0.0:8080` | HTTP listen address |
//! | `DATABASE_URL` | unset | Postgres URL; unset runs on in-memory stores |
//! | `ADMIN_API_TOKEN` | dev token | bearer token for admin routes |
//! | `APPLY_SCHEMA` | `false` | apply the bundled schema on start |
//!
//! Blank values count as unset.

use std::net::SocketAddr;

use thiserror::Error;
use tracing::warn;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEV_ADMIN_API_TOKEN: &str = "dev-admin-token";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub admin_api_token: String,
    pub apply_schema: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let database_url = get("DATABASE_URL");
        if database_url.is_none() {
            warn!("DATABASE_URL not set; using in-memory stores (data is lost on restart)");
        }

        let admin_api_token = get("ADMIN_API_TOKEN").unwrap_or_else(|| {
            warn!("ADMIN_API_TOKEN not set; using insecure dev default");
            DEV_ADMIN_API_TOKEN.to_string()
        });

        let apply_schema = match get("APPLY_SCHEMA").as_deref() {
            None => false,
            Some(v) => parse_bool(v).ok_or_else(|| ConfigError::Invalid {
                name: "APPLY_SCHEMA",
                reason: format!("expected true/false, got '{v}'"),
            })?,
        };

        Ok(Self {
            bind_addr,
            database_url,
            admin_api_token,
            apply_schema,
        })
    }

    /// In-memory configuration with the given admin token (tests, local runs).
    pub fn in_memory(admin_api_token: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: None,
            admin_api_token: admin_api_token.into(),
            apply_schema: false,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.database_url, None);
        assert_eq!(config.admin_api_token, DEV_ADMIN_API_TOKEN);
        assert!(!config.apply_schema);
    }

    #[test]
    fn explicit_values_are_used() {
        let config = load(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("DATABASE_URL", "postgres://localhost/travelos"),
            ("ADMIN_API_TOKEN", "s3cret"),
            ("APPLY_SCHEMA", "TRUE"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/travelos"));
        assert_eq!(config.admin_api_token, "s3cret");
        assert!(config.apply_schema);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = load(&[("DATABASE_URL", "   "), ("ADMIN_API_TOKEN", "")]).unwrap();
        assert_eq!(config.database_url, None);
        assert_eq!(config.admin_api_token, DEV_ADMIN_API_TOKEN);
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(matches!(
            load(&[("BIND_ADDR", "not-an-addr")]),
            Err(ConfigError::Invalid { name: "BIND_ADDR", .. })
        ));
        assert!(matches!(
            load(&[("APPLY_SCHEMA", "maybe")]),
            Err(ConfigError::Invalid { name: "APPLY_SCHEMA", .. })
        ));
    }
}
