//! Process settings from environment variables (a `.env` file is honoured by the server binary).

use crate::config::{DeletePolicy, Deployment, IdStrategy, ReferenceFallback};
use crate::error::ConfigError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(format!("invalid storage backend: {} (expected postgres or memory)", s)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    /// Overrides the descriptor schema when set.
    pub db_schema: Option<String>,
    pub storage: StorageBackend,
    pub id_strategy: IdStrategy,
    pub delete_policy: DeletePolicy,
    pub author_fallback: Option<ReferenceFallback>,
    pub max_connections: u32,
    /// Upper bound on acquiring a pooled connection.
    pub connect_timeout: Duration,
    pub body_limit: usize,
    pub bind_addr: SocketAddr,
    /// Descriptor file replacing the embedded one.
    pub resource_config: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup (the environment in production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse(&get, "PORT", 3001)?;
        let bind_addr = format!("{}:{}", host, port)
            .parse()
            .map_err(|e| ConfigError::Setting {
                name: "HOST",
                message: format!("{}", e),
            })?;

        Ok(Settings {
            database_url: get("DATABASE_URL").unwrap_or_else(|| "postgres://localhost/blogsphere".into()),
            db_schema: get("DB_SCHEMA"),
            storage: parse(&get, "STORAGE_BACKEND", StorageBackend::Postgres)?,
            id_strategy: parse(&get, "ID_STRATEGY", IdStrategy::Sequential)?,
            delete_policy: parse(&get, "DELETE_POLICY", DeletePolicy::Hard)?,
            author_fallback: get("AUTHOR_FALLBACK")
                .map(|v| v.parse())
                .transpose()
                .map_err(|message| ConfigError::Setting {
                    name: "AUTHOR_FALLBACK",
                    message,
                })?,
            max_connections: parse(&get, "DB_MAX_CONNECTIONS", 5)?,
            connect_timeout: Duration::from_secs(parse(&get, "DB_CONNECT_TIMEOUT_SECS", 30)?),
            body_limit: parse(&get, "BODY_LIMIT_BYTES", 1024 * 1024)?,
            bind_addr,
            resource_config: get("RESOURCE_CONFIG").map(PathBuf::from),
        })
    }

    pub fn deployment(&self) -> Deployment {
        Deployment {
            id_strategy: self.id_strategy,
            delete_policy: self.delete_policy,
            reference_fallback: self.author_fallback,
        }
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Setting {
            name,
            message: format!("{}: {}", raw, e),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.storage, StorageBackend::Postgres);
        assert_eq!(s.db_schema, None);
        assert_eq!(s.id_strategy, IdStrategy::Sequential);
        assert_eq!(s.delete_policy, DeletePolicy::Hard);
        assert_eq!(s.author_fallback, None);
        assert_eq!(s.max_connections, 5);
        assert_eq!(s.connect_timeout, Duration::from_secs(30));
        assert_eq!(s.bind_addr.port(), 3001);
    }

    #[test]
    fn overrides() {
        let s = settings(&[
            ("STORAGE_BACKEND", "memory"),
            ("ID_STRATEGY", "uuid"),
            ("DELETE_POLICY", "soft"),
            ("AUTHOR_FALLBACK", "none"),
            ("PORT", "8080"),
            ("HOST", "127.0.0.1"),
            ("DB_SCHEMA", "blog"),
        ])
        .unwrap();
        assert_eq!(s.storage, StorageBackend::Memory);
        assert_eq!(s.id_strategy, IdStrategy::Uuid);
        assert_eq!(s.delete_policy, DeletePolicy::Soft);
        assert_eq!(s.author_fallback, Some(ReferenceFallback::None));
        assert_eq!(s.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(s.db_schema.as_deref(), Some("blog"));
        assert_eq!(s.deployment().id_strategy, IdStrategy::Uuid);
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(matches!(
            settings(&[("DELETE_POLICY", "sometimes")]),
            Err(ConfigError::Setting { name: "DELETE_POLICY", .. })
        ));
        assert!(matches!(
            settings(&[("PORT", "http")]),
            Err(ConfigError::Setting { name: "PORT", .. })
        ));
    }
}
