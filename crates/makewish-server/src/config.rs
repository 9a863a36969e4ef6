use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub storage_dir: PathBuf,
    pub public_url: String,
    pub reminder_interval_secs: u64,
    pub reminder_lead_days: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = var("MAKEWISH_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("MAKEWISH_JWT_SECRET is unset or still a placeholder");
        }

        let port = var("MAKEWISH_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("MAKEWISH_PORT must be a port number")?;
        let public_url = var("MAKEWISH_PUBLIC_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            jwt_secret,
            db_path: var("MAKEWISH_DB_PATH")
                .unwrap_or_else(|| "makewish.db".into())
                .into(),
            host: var("MAKEWISH_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            storage_dir: var("MAKEWISH_STORAGE_DIR")
                .unwrap_or_else(|| "./storage".into())
                .into(),
            public_url,
            reminder_interval_secs: var("MAKEWISH_REMINDER_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(3600),
            reminder_lead_days: var("MAKEWISH_REMINDER_LEAD_DAYS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
        })
    }
}
