//! Process-wide settings resolved from the environment at startup.

use anyhow::{Context, Result, bail};
use std::path::PathBuf;

/// SQL dialect for the job store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseDialect {
    Postgresql,
    Sqlite,
}

impl DatabaseDialect {
    fn from_url(url: &str) -> Result<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Self::Postgresql)
        } else if url.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else {
            bail!("unsupported database URL (expected postgresql:// or sqlite:): {url}")
        }
    }
}

/// Where screenshot artifacts are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Local { dir: PathBuf },
}

/// Resolved service settings. Constructed once in `main` and passed down;
/// no module reads the environment after startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_port: u16,
    pub redis_url: String,
    pub database_url: String,
    pub database_dialect: DatabaseDialect,
    pub min_concurrency: usize,
    pub max_concurrency: usize,
    pub headless: bool,
    pub ignore_ssl_errors: bool,
    pub user_agent: Option<String>,
    pub keep_alive: bool,
    /// Ordered proxy tiers from `ANYCRAWL_PROXY_URL` (comma-separated).
    pub proxy_tiers: Vec<String>,
    /// Optional proxy rules file from `ANYCRAWL_PROXY_CONFIG`.
    pub proxy_rules_path: Option<PathBuf>,
    pub storage: StorageBackend,
    /// TTL for artifact retrieval tokens, seconds.
    pub artifact_token_ttl_secs: u64,
    pub ai_config_path: Option<String>,
    pub default_llm_model: Option<String>,
    pub default_extract_model: Option<String>,
    pub auth_enabled: bool,
    pub credits_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_port: 8080,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            database_url: "sqlite::memory:".to_string(),
            database_dialect: DatabaseDialect::Sqlite,
            min_concurrency: 10,
            max_concurrency: 50,
            headless: true,
            ignore_ssl_errors: false,
            user_agent: None,
            keep_alive: true,
            proxy_tiers: Vec::new(),
            proxy_rules_path: None,
            storage: StorageBackend::Local { dir: PathBuf::from("./artifacts") },
            artifact_token_ttl_secs: 3600,
            ai_config_path: None,
            default_llm_model: None,
            default_extract_model: None,
            auth_enabled: false,
            credits_enabled: false,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_bool(name: &str, default: bool) -> bool {
    match env_var(name) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

impl Settings {
    /// Resolve settings from `ANYCRAWL_*` environment variables, falling
    /// back to defaults where unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let api_port = match env_var("ANYCRAWL_API_PORT") {
            Some(v) => v.parse().context("ANYCRAWL_API_PORT must be a port number")?,
            None => defaults.api_port,
        };

        let redis_url = env_var("ANYCRAWL_REDIS_URL").unwrap_or(defaults.redis_url);
        let database_url = env_var("ANYCRAWL_DATABASE_URL").unwrap_or(defaults.database_url);
        let database_dialect = DatabaseDialect::from_url(&database_url)?;

        let min_concurrency = match env_var("ANYCRAWL_MIN_CONCURRENCY") {
            Some(v) => v.parse().context("ANYCRAWL_MIN_CONCURRENCY must be an integer")?,
            None => defaults.min_concurrency,
        };
        let max_concurrency = match env_var("ANYCRAWL_MAX_CONCURRENCY") {
            Some(v) => v.parse().context("ANYCRAWL_MAX_CONCURRENCY must be an integer")?,
            None => defaults.max_concurrency,
        };
        if min_concurrency == 0 || max_concurrency < min_concurrency {
            bail!(
                "invalid concurrency bounds: min={min_concurrency} max={max_concurrency}"
            );
        }

        let proxy_tiers = env_var("ANYCRAWL_PROXY_URL")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let storage = match env_var("ANYCRAWL_STORAGE").as_deref() {
            None | Some("local") => {
                let dir = env_var("ANYCRAWL_STORAGE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./artifacts"));
                StorageBackend::Local { dir }
            }
            Some(other) => bail!("unsupported ANYCRAWL_STORAGE backend: {other}"),
        };

        let artifact_token_ttl_secs = match env_var("ANYCRAWL_SIGNED_URL_TTL") {
            Some(v) => v.parse().context("ANYCRAWL_SIGNED_URL_TTL must be seconds")?,
            None => defaults.artifact_token_ttl_secs,
        };

        Ok(Self {
            api_port,
            redis_url,
            database_url,
            database_dialect,
            min_concurrency,
            max_concurrency,
            headless: env_bool("ANYCRAWL_HEADLESS", defaults.headless),
            ignore_ssl_errors: env_bool("ANYCRAWL_IGNORE_SSL_ERROR", defaults.ignore_ssl_errors),
            user_agent: env_var("ANYCRAWL_USER_AGENT"),
            keep_alive: env_bool("ANYCRAWL_KEEP_ALIVE", defaults.keep_alive),
            proxy_tiers,
            proxy_rules_path: env_var("ANYCRAWL_PROXY_CONFIG").map(PathBuf::from),
            storage,
            artifact_token_ttl_secs,
            ai_config_path: env_var("ANYCRAWL_AI_CONFIG_PATH"),
            default_llm_model: env_var("DEFAULT_LLM_MODEL"),
            default_extract_model: env_var("DEFAULT_EXTRACT_MODEL"),
            auth_enabled: env_bool("ANYCRAWL_API_AUTH_ENABLED", defaults.auth_enabled),
            credits_enabled: env_bool("ANYCRAWL_API_CREDITS_ENABLED", defaults.credits_enabled),
        })
    }

    /// Worker concurrency for one queue, bounded by the configured range.
    #[must_use]
    pub fn worker_concurrency(&self) -> usize {
        let cores = num_cpus::get().saturating_mul(4);
        cores.clamp(self.min_concurrency, self.max_concurrency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_detection() {
        assert_eq!(
            DatabaseDialect::from_url("postgresql://u@localhost/db").unwrap(),
            DatabaseDialect::Postgresql
        );
        assert_eq!(
            DatabaseDialect::from_url("sqlite://anycrawl.db").unwrap(),
            DatabaseDialect::Sqlite
        );
        assert!(DatabaseDialect::from_url("mysql://nope").is_err());
    }

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.api_port, 8080);
        assert!(s.headless);
        assert!(!s.ignore_ssl_errors);
        assert_eq!(s.artifact_token_ttl_secs, 3600);
        let c = s.worker_concurrency();
        assert!((s.min_concurrency..=s.max_concurrency).contains(&c));
    }
}
