use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

pub const DEFAULT_DB_PATH: &str = "data/threads.db";
pub const DEFAULT_POOL_SIZE: u32 = 10;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_PAGE_SIZE: usize = 50;

// one writer plus at least one open cursor
const MIN_POOL_SIZE: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub database_path: PathBuf,
    pub pool_size: u32,
    pub busy_timeout_ms: u64,
    /// Rows fetched per cursor round trip.
    pub page_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            pool_size: DEFAULT_POOL_SIZE,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl IndexConfig {
    pub fn at_path(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_path = lookup("THREAD_INDEX_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let pool_size: u32 = lookup("THREAD_INDEX_POOL_SIZE")
            .unwrap_or_else(|| DEFAULT_POOL_SIZE.to_string())
            .trim()
            .parse()
            .context("Invalid THREAD_INDEX_POOL_SIZE")?;

        let busy_timeout_ms: u64 = lookup("THREAD_INDEX_BUSY_TIMEOUT_MS")
            .unwrap_or_else(|| DEFAULT_BUSY_TIMEOUT_MS.to_string())
            .trim()
            .parse()
            .context("Invalid THREAD_INDEX_BUSY_TIMEOUT_MS")?;

        let page_size: usize = lookup("THREAD_INDEX_PAGE_SIZE")
            .unwrap_or_else(|| DEFAULT_PAGE_SIZE.to_string())
            .trim()
            .parse()
            .context("Invalid THREAD_INDEX_PAGE_SIZE")?;

        if pool_size < MIN_POOL_SIZE {
            warn!("THREAD_INDEX_POOL_SIZE={} is too small, using {}", pool_size, MIN_POOL_SIZE);
        }
        if page_size == 0 {
            warn!("THREAD_INDEX_PAGE_SIZE=0 is invalid, using 1");
        }

        Ok(Self {
            database_path,
            pool_size: pool_size.max(MIN_POOL_SIZE),
            busy_timeout_ms,
            page_size: page_size.max(1),
        })
    }

    pub fn print_config(&self) {
        info!("Thread index configuration:");
        info!("  Database: {}", self.database_path.display());
        info!("  Pool size: {}", self.pool_size);
        info!("  Busy timeout: {}ms", self.busy_timeout_ms);
        info!("  Page size: {}", self.page_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn create_test_config(vars: &[(&str, &str)]) -> Result<IndexConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        IndexConfig::from_vars(|key| vars.get(key).cloned())
    }

    // ===== Default Tests =====

    #[test]
    fn test_defaults_when_unset() {
        let config = create_test_config(&[]).unwrap();
        assert_eq!(config, IndexConfig::default());
        assert_eq!(config.database_path, PathBuf::from("data/threads.db"));
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.busy_timeout_ms, 5000);
        assert_eq!(config.page_size, 50);
    }

    #[test]
    fn test_at_path_keeps_other_defaults() {
        let config = IndexConfig::at_path("/tmp/x.db");
        assert_eq!(config.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
    }

    // ===== Override Tests =====

    #[test]
    fn test_overrides_are_parsed() {
        let config = create_test_config(&[
            ("THREAD_INDEX_DB_PATH", "/var/lib/threads.db"),
            ("THREAD_INDEX_POOL_SIZE", " 4 "),
            ("THREAD_INDEX_BUSY_TIMEOUT_MS", "250"),
            ("THREAD_INDEX_PAGE_SIZE", "7"),
        ])
        .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/var/lib/threads.db"));
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.page_size, 7);
    }

    #[test]
    fn test_minimums_are_enforced() {
        let config = create_test_config(&[
            ("THREAD_INDEX_POOL_SIZE", "1"),
            ("THREAD_INDEX_PAGE_SIZE", "0"),
        ])
        .unwrap();
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.page_size, 1);
    }

    // ===== Error Tests =====

    #[test]
    fn test_invalid_number_is_an_error() {
        let err = create_test_config(&[("THREAD_INDEX_POOL_SIZE", "lots")]).unwrap_err();
        assert!(err.to_string().contains("THREAD_INDEX_POOL_SIZE"));

        assert!(create_test_config(&[("THREAD_INDEX_BUSY_TIMEOUT_MS", "-5")]).is_err());
    }
}
