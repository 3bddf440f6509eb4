//! Configuration is read once at startup into an immutable struct and
//! passed down by `Arc`, resolving the source's "consult the environment on
//! each call" pattern into the upfront-parsing style the redesign notes ask
//! for. `.env` loading via `dotenvy` matches the sibling example repos.

use rand::Rng;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Kv,
    Turso,
}

impl StorageType {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.to_ascii_uppercase().as_str() {
            "KV" => Ok(StorageType::Kv),
            "TURSO" => Ok(StorageType::Turso),
            other => Err(ConfigError::InvalidValue {
                key: "STORAGE_TYPE",
                reason: format!("unrecognized storage type {other:?}, expected KV or TURSO"),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub auth_token: String,
    pub storage_type: StorageType,
    pub turso_db_url: String,
    pub turso_db_auth_token: Option<String>,
    pub enable_logs: bool,
    pub data_dir: std::path::PathBuf,
    pub bind_addr: std::net::SocketAddr,
}

impl AppConfig {
    /// Loads configuration from the process environment (optionally seeded
    /// by a `.env` file). Recognized keys are exactly those in the
    /// configuration table: `AUTH_TOKEN`, `STORAGE_TYPE`, `TURSO_DB_URL`,
    /// `TURSO_DB_AUTH_TOKEN`, `ENABLE_LOGS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let auth_token = match std::env::var("AUTH_TOKEN") {
            Ok(token) if !token.is_empty() => token,
            _ => {
                let generated = generate_token();
                tracing::warn!(
                    token = %generated,
                    "AUTH_TOKEN not set, generated a random token for this run"
                );
                generated
            }
        };

        let storage_type = match std::env::var("STORAGE_TYPE") {
            Ok(raw) => StorageType::parse(&raw)?,
            Err(_) => StorageType::Kv,
        };

        let turso_db_url =
            std::env::var("TURSO_DB_URL").unwrap_or_else(|_| ":memory:".to_string());
        let turso_db_auth_token = std::env::var("TURSO_DB_AUTH_TOKEN").ok();

        let enable_logs = std::env::var("ENABLE_LOGS")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let data_dir = std::env::var("HOOKRELAY_DATA_DIR")
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|_| std::path::PathBuf::from("./data"));

        let bind_addr = std::env::var("HOOKRELAY_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "HOOKRELAY_BIND_ADDR",
                reason: format!("{e}"),
            })?;

        if storage_type == StorageType::Turso && turso_db_url.starts_with("libsql://") {
            tracing::warn!(
                url = %turso_db_url,
                "remote Turso backend not reachable from this build; falling back to a local \
                 SQLite file would silently diverge from the configured URL, so this is \
                 surfaced as a startup warning rather than vendoring a network client"
            );
        }

        Ok(AppConfig {
            auth_token,
            storage_type,
            turso_db_url,
            turso_db_auth_token,
            enable_logs,
            data_dir,
            bind_addr,
        })
    }
}

fn generate_token() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_type_parses_case_insensitively() {
        assert_eq!(StorageType::parse("kv").unwrap(), StorageType::Kv);
        assert_eq!(StorageType::parse("TURSO").unwrap(), StorageType::Turso);
        assert!(StorageType::parse("bogus").is_err());
    }

    #[test]
    fn generated_tokens_are_nonempty_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
