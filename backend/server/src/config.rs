use std::{env, fmt::Display, fs::read_to_string, path::Path, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_REGISTRY_KEY: &str = "mindbloom:admin_codes";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Failed to read secret {name}: {source}")]
    Secret {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    /// Single-process only, state is gone on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

/// Bounds on how long a conflicting transaction keeps retrying.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(200),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
    pub registry_key: String,
    pub retry: RetryPolicy,
}

impl StoreConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let max_attempts: u32 = try_load("CLAIM_MAX_ATTEMPTS", "5")?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "CLAIM_MAX_ATTEMPTS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            backend: try_load("STORE_BACKEND", "redis")?,
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379")?,
            registry_key: try_load("REGISTRY_KEY", DEFAULT_REGISTRY_KEY)?,
            retry: RetryPolicy {
                max_attempts,
                initial_backoff: Duration::from_millis(try_load("CLAIM_BACKOFF_MS", "10")?),
                max_backoff: Duration::from_millis(try_load("CLAIM_MAX_BACKOFF_MS", "200")?),
            },
        })
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Shared secret the gateway attaches to every forwarded request.
    pub gateway_token: String,
    pub store: StoreConfig,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let secrets_dir: String = try_load("SECRETS_DIR", "/run/secrets")?;

        Ok(Self {
            port: try_load("RUST_PORT", "1111")?,
            gateway_token: read_secret(&secrets_dir, "GATEWAY_TOKEN")?,
            store: StoreConfig::load()?,
        })
    }
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse::<T>()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key,
                reason: e.to_string(),
            }
        })
}

fn read_secret(secrets_dir: &str, secret_name: &'static str) -> Result<String, ConfigError> {
    let path = Path::new(secrets_dir).join(secret_name);

    let secret = read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|source| {
            warn!("Failed to read {secret_name} from file: {source}");
            ConfigError::Secret {
                name: secret_name,
                source,
            }
        })?;

    if secret.is_empty() {
        return Err(ConfigError::Invalid {
            key: secret_name,
            reason: "secret file is empty".to_string(),
        });
    }

    Ok(secret)
}
