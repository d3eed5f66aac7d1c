//! Process configuration read from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::warn;

use chatdesk_infra::{DeleteGuard, ScopeLoader};

const DEV_JWT_SECRET: &str = "dev-secret";

/// Where scoped records, credentials and audit records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres { database_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub store: StoreBackend,
    pub scope_load_timeout: Duration,
    pub audit_write_timeout: Duration,
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR must be a socket address such as 0.0.0.0:8080")?;

        let development = lookup("APP_ENV").is_some_and(|v| v.eq_ignore_ascii_case("development"));
        let jwt_secret = match lookup("JWT_SECRET").filter(|s| !s.trim().is_empty()) {
            Some(secret) => secret,
            None if development => {
                warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
            None => bail!("JWT_SECRET must be set outside APP_ENV=development"),
        };

        let persistent = match lookup("USE_PERSISTENT_STORES").as_deref().map(str::trim) {
            None | Some("") => false,
            Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => true,
            Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => false,
            Some(other) => bail!("USE_PERSISTENT_STORES must be true or false, got '{other}'"),
        };
        let store = if persistent {
            let database_url = lookup("DATABASE_URL")
                .filter(|s| !s.trim().is_empty())
                .context("DATABASE_URL is required when USE_PERSISTENT_STORES=true")?;
            StoreBackend::Postgres { database_url }
        } else {
            StoreBackend::InMemory
        };

        let scope_load_timeout = millis(&lookup, "SCOPE_LOAD_TIMEOUT_MS", ScopeLoader::DEFAULT_TIMEOUT)?;
        let audit_write_timeout = millis(&lookup, "AUDIT_WRITE_TIMEOUT_MS", DeleteGuard::DEFAULT_AUDIT_TIMEOUT)?;

        Ok(Self {
            bind_addr,
            jwt_secret,
            store,
            scope_load_timeout,
            audit_write_timeout,
        })
    }

    /// In-memory configuration bound to an ephemeral local port.
    pub fn for_tests(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: jwt_secret.into(),
            store: StoreBackend::InMemory,
            scope_load_timeout: ScopeLoader::DEFAULT_TIMEOUT,
            audit_write_timeout: DeleteGuard::DEFAULT_AUDIT_TIMEOUT,
        }
    }
}

/// A positive millisecond duration, or `default` when unset.
fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> anyhow::Result<Duration> {
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let ms = raw
        .trim()
        .parse::<u64>()
        .with_context(|| format!("{key} must be a whole number of milliseconds"))?;
    if ms == 0 {
        bail!("{key} must be greater than zero");
    }
    Ok(Duration::from_millis(ms))
}
