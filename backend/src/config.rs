//! Engine configuration.
//!
//! Defaults are overridden by a `.env` file or the process environment:
//!
//! | Variable                       | Default                  |
//! |--------------------------------|--------------------------|
//! | `FLIGHTCHECK_PAGE_SIZE`        | `100`                    |
//! | `FLIGHTCHECK_PORT`             | `3000`                   |
//! | `FLIGHTCHECK_DATA_DIR`         | `.flightcheck/snapshots` |
//! | `FLIGHTCHECK_MAX_UPLOAD_BYTES` | 50 MiB                   |
//! | `FLIGHTCHECK_SESSION_TTL_SECS` | `86400` (one day)        |
//!
//! CLI flags take precedence over both.

use std::path::PathBuf;
use std::str::FromStr;

use crate::cache::DEFAULT_REGISTRY_DIR;
use crate::error::ConfigError;

pub const ENV_PAGE_SIZE: &str = "FLIGHTCHECK_PAGE_SIZE";
pub const ENV_PORT: &str = "FLIGHTCHECK_PORT";
pub const ENV_DATA_DIR: &str = "FLIGHTCHECK_DATA_DIR";
pub const ENV_MAX_UPLOAD_BYTES: &str = "FLIGHTCHECK_MAX_UPLOAD_BYTES";
pub const ENV_SESSION_TTL_SECS: &str = "FLIGHTCHECK_SESSION_TTL_SECS";

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Instances per page
    pub page_size: usize,
    /// HTTP listen port
    pub port: u16,
    /// Snapshot registry directory
    pub data_dir: PathBuf,
    /// Request body limit for snapshot uploads
    pub max_upload_bytes: usize,
    /// Idle time after which an editing session is dropped
    pub session_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_REGISTRY_DIR),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

impl EngineConfig {
    /// Load `.env` (if any), then apply environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = parse_var(&lookup, ENV_PAGE_SIZE)? {
            config.page_size = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_PORT)? {
            config.port = v;
        }
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|d| !d.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_UPLOAD_BYTES)? {
            config.max_upload_bytes = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_SESSION_TTL_SECS)? {
            config.session_ttl_secs = v;
        }

        if config.page_size == 0 {
            return Err(ConfigError::InvalidVar {
                var: ENV_PAGE_SIZE.to_string(),
                value: "0".to_string(),
            });
        }
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar {
                var: var.to_string(),
                value: raw,
            }),
    }
}
