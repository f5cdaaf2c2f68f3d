use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    /// PostgreSQL connection URL (when set and starts with postgres://, uses Postgres backend)
    pub database_url: Option<String>,
    /// Secret for HMAC session token signing (MURMUR_SESSION_SECRET env var)
    pub session_secret: String,
    pub bind: String,
    pub port: u16,
    /// Collapse window for repeated like/repost taps on the client.
    pub debounce: Duration,
    /// How often the server recomputes counters. Zero disables the job.
    pub reconcile_interval: Duration,
    /// Server base URL used by client commands.
    pub api_url: String,
    /// Session token client commands authenticate with (MURMUR_TOKEN).
    pub token: Option<String>,
    /// Where client commands persist the membership cache.
    pub session_file: String,
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Invalid value for {name}: {raw:?}")),
        _ => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Everything has a default except the session secret, which is only
    /// required by commands that mint or verify tokens.
    pub fn load() -> Result<Self> {
        Ok(Self {
            db_path: env::var("MURMUR_DB_PATH").unwrap_or_else(|_| "./murmur.db".to_string()),
            database_url: env::var("DATABASE_URL").ok(),
            session_secret: env::var("MURMUR_SESSION_SECRET").unwrap_or_default(),
            bind: env::var("MURMUR_BIND").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("MURMUR_PORT", 8080)?,
            debounce: Duration::from_millis(parse_var(
                "MURMUR_DEBOUNCE_MS",
                crate::client::toggle::DEFAULT_DEBOUNCE.as_millis() as u64,
            )?),
            reconcile_interval: Duration::from_secs(parse_var(
                "MURMUR_RECONCILE_INTERVAL_SECS",
                300,
            )?),
            api_url: env::var("MURMUR_API_URL")
                .unwrap_or_else(|_| crate::client::http::DEFAULT_API_URL.to_string()),
            token: env::var("MURMUR_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            session_file: env::var("MURMUR_SESSION_FILE")
                .unwrap_or_else(|_| "./murmur-session.json".to_string()),
        })
    }

    /// True when DATABASE_URL selects the PostgreSQL backend.
    pub fn uses_postgres(&self) -> bool {
        self.database_url
            .as_deref()
            .is_some_and(|u| u.starts_with("postgres://") || u.starts_with("postgresql://"))
    }

    /// Check that the session secret is configured.
    /// Call this before serving or minting tokens.
    pub fn require_session_secret(&self) -> Result<()> {
        if self.session_secret.len() < 32 {
            anyhow::bail!(
                "MURMUR_SESSION_SECRET must be set to at least 32 characters.\n\
                 Generate one with: openssl rand -hex 32"
            );
        }
        Ok(())
    }

    /// The session token for client commands.
    pub fn require_token(&self) -> Result<&str> {
        self.token.as_deref().context(
            "MURMUR_TOKEN is not set.\n\
             Mint one on the server with: murmur token <user_id>",
        )
    }
}
