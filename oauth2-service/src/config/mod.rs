use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::net::IpAddr;

#[derive(Debug, Clone, Deserialize)]
pub struct OAuth2Config {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub store: StoreBackend,
    /// Present for the mongo backend.
    pub mongodb: Option<MongoConfig>,
    pub engine: EngineConfig,
    /// Peers whose `x-forwarded-for` header is believed.
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub code_lifetime_seconds: i64,
}

impl OAuth2Config {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let store: StoreBackend = get_env("STORE_BACKEND", Some("mongo"), false)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let mongodb = match store {
            StoreBackend::Mongo => Some(MongoConfig {
                uri: get_env("MONGODB_URI", None, is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("oauth2_db"), is_prod)?,
            }),
            StoreBackend::Memory => None,
        };

        let code_lifetime_seconds = get_env("OAUTH2_CODE_LIFETIME_SECONDS", Some("300"), false)?
            .parse()
            .map_err(|e: std::num::ParseIntError| {
                AppError::ConfigError(anyhow::anyhow!("OAUTH2_CODE_LIFETIME_SECONDS: {}", e))
            })?;
        let trusted_proxies = parse_trusted_proxies(&get_env("TRUSTED_PROXIES", Some(""), false)?)?;

        let config = OAuth2Config {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("oauth2-service"), false)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            store,
            mongodb,
            engine: EngineConfig {
                code_lifetime_seconds,
            },
            trusted_proxies,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.engine.code_lifetime_seconds <= 0
            || chrono::Duration::try_seconds(self.engine.code_lifetime_seconds).is_none()
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "OAUTH2_CODE_LIFETIME_SECONDS must be a positive number of seconds in range"
            )));
        }

        if self.environment == Environment::Prod && self.store == StoreBackend::Memory {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "The memory store is not allowed in production"
            )));
        }

        Ok(())
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}

/// Comma-separated IP list, empty for none.
fn parse_trusted_proxies(raw: &str) -> Result<Vec<IpAddr>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry.parse::<IpAddr>().map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("TRUSTED_PROXIES: {}: {}", entry, e))
            })
        })
        .collect()
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
