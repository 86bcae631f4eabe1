//! User settings.
//!
//! Stored at `~/.config/stridecache/config.json`. Every field has a default,
//! so a missing or partial file is fine.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{CacheConfig, MAX_WINDOW};
use crate::key::Resource;
use crate::transport::http::DEFAULT_TIMEOUT_SECS;

/// Application name used for config directory paths
const APP_NAME: &str = "stridecache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Overrides `base_url` from the file.
pub const BASE_URL_ENV: &str = "STRIDECACHE_BASE_URL";

const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";

/// Default page size for paginated resources.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Per-resource overrides of the built-in cache table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverride {
    pub stale_time_ms: Option<u64>,
    pub retention_ms: Option<u64>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub default_page_limit: u32,
    /// Timer sweep interval; lazy sweeping only when absent.
    pub gc_interval_secs: Option<u64>,
    /// Keyed by resource name, e.g. `"runDetail"`.
    pub resources: BTreeMap<String, PolicyOverride>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            default_page_limit: DEFAULT_PAGE_LIMIT,
            gc_interval_secs: None,
            resources: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load from the config file, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut settings = Self::load_file()?;
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            settings.base_url = base_url;
        }
        Ok(settings)
    }

    fn load_file() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Self::from_json(&contents).with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The built-in cache table with this file's overrides applied.
    pub fn cache_config(&self) -> CacheConfig {
        let mut config = CacheConfig::default();
        for (name, overrides) in &self.resources {
            let Some(resource) = Resource::from_name(name) else {
                warn!(resource = %name, "Ignoring override for unknown resource");
                continue;
            };
            let policy = config.policy_mut(resource);
            if let Some(ms) = overrides.stale_time_ms {
                policy.stale_time = window(resource, "stale_time_ms", ms);
            }
            if let Some(ms) = overrides.retention_ms {
                policy.retention = window(resource, "retention_ms", ms);
            }
            if let Some(max_retries) = overrides.max_retries {
                policy.retry.max_retries = max_retries;
            }
        }
        if let Some(secs) = self.gc_interval_secs.filter(|s| *s > 0) {
            config = config.with_gc_interval(Duration::from_secs(secs));
        }
        config
    }
}

fn window(resource: Resource, field: &'static str, ms: u64) -> Duration {
    let requested = Duration::from_millis(ms);
    if requested > MAX_WINDOW {
        warn!(%resource, field, ms, "Override too large, capping at one year");
        return MAX_WINDOW;
    }
    requested
}
