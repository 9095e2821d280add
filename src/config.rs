// src/config.rs
use log::warn;
use reqwest::Url;
use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::services::client::Admission;

pub const DEFAULT_BASE_URL: &str = "https://www.lendingclub.com";
pub const DEFAULT_LOGIN_PATH: &str = "/account/login.action";
pub const DEFAULT_SUMMARY_PATH: &str = "/account/summary.action";
pub const DEFAULT_NAR_PATH: &str = "/account/lenderAccountDetail.action";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid marketplace URL '{0}': {1}")]
    InvalidUrl(String, String),
    #[error("{0} must be a number, got '{1}'")]
    NotANumber(&'static str, String),
}

/// Where the marketplace lives and how to talk to it.
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    pub login_url: Url,
    pub summary_url: Url,
    pub nar_url: Url,
    pub user_agent: String,
    pub timeout: Duration,
}

impl MarketplaceConfig {
    /// Default paths resolved against `base_url`.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Self::with_paths(base_url, DEFAULT_LOGIN_PATH, DEFAULT_SUMMARY_PATH, DEFAULT_NAR_PATH)
    }

    pub fn with_paths(
        base_url: &str,
        login_path: &str,
        summary_path: &str,
        nar_path: &str,
    ) -> Result<Self, ConfigError> {
        let base = Url::parse(base_url)
            .map_err(|e| ConfigError::InvalidUrl(base_url.to_string(), e.to_string()))?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| ConfigError::InvalidUrl(path.to_string(), e.to_string()))
        };

        Ok(MarketplaceConfig {
            login_url: join(login_path)?,
            summary_url: join(summary_path)?,
            nar_url: join(nar_path)?,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = env_or("LC_BASE_URL", DEFAULT_BASE_URL);
        let mut config = Self::with_paths(
            &base_url,
            &env_or("LC_LOGIN_PATH", DEFAULT_LOGIN_PATH),
            &env_or("LC_SUMMARY_PATH", DEFAULT_SUMMARY_PATH),
            &env_or("LC_NAR_PATH", DEFAULT_NAR_PATH),
        )?;

        config.user_agent = env_or("LC_USER_AGENT", DEFAULT_USER_AGENT);
        let timeout = env_or("LC_TIMEOUT_SECS", "30");
        let secs: u64 = timeout
            .parse()
            .map_err(|_| ConfigError::NotANumber("LC_TIMEOUT_SECS", timeout.clone()))?;
        config.timeout = Duration::from_secs(secs);

        Ok(config)
    }
}

/// Everything the server binary needs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub marketplace: MarketplaceConfig,
    pub admission: Admission,
}

impl AppConfig {
    /// Reads the environment. Call `dotenv().ok()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port_str = env::var("PORT").unwrap_or_else(|_| {
            warn!("$PORT not set, defaulting to 3030");
            "3030".to_string()
        });
        let port = port_str
            .parse()
            .map_err(|_| ConfigError::NotANumber("PORT", port_str.clone()))?;

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
            warn!("$DATABASE_URL not set, defaulting to sqlite://lending_club.db");
            "sqlite://lending_club.db".to_string()
        });

        let admission = match env_or("LC_ADMISSION", "reject").to_ascii_lowercase().as_str() {
            "queue" => Admission::Queue,
            "reject" => Admission::Reject,
            other => {
                warn!("Unknown LC_ADMISSION '{}', using 'reject'", other);
                Admission::Reject
            }
        };

        Ok(AppConfig {
            port,
            database_url,
            marketplace: MarketplaceConfig::from_env()?,
            admission,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
