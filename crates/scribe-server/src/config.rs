use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Secrets that ship in docs and sample env files. Refuse to sign sessions with them.
const PLACEHOLDER_SECRETS: &[&str] = &["", "dev-secret-change-me", "change-me", "changeme", "secret"];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub session_days: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = lookup("SCRIBE_JWT_SECRET").context("SCRIBE_JWT_SECRET must be set")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.trim()) {
            bail!("SCRIBE_JWT_SECRET is a placeholder; set a real secret");
        }

        let db_path = lookup("SCRIBE_DB_PATH").unwrap_or_else(|| "scribe.db".into());
        let host = lookup("SCRIBE_HOST").unwrap_or_else(|| "0.0.0.0".into());

        let port = match lookup("SCRIBE_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("SCRIBE_PORT '{}' is not a port number", raw))?,
            None => 3000,
        };

        let session_days = match lookup("SCRIBE_SESSION_DAYS") {
            Some(raw) => raw
                .parse::<i64>()
                .with_context(|| format!("SCRIBE_SESSION_DAYS '{}' is not a number", raw))?,
            None => 1,
        };
        if session_days < 1 {
            bail!("SCRIBE_SESSION_DAYS must be at least 1");
        }

        Ok(Self {
            jwt_secret,
            db_path: PathBuf::from(db_path),
            host,
            port,
            session_days,
        })
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .with_context(|| format!("invalid bind address {}", addr))
    }
}
