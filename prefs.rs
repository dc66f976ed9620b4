/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Application preferences.
//!
//! Tunables for the view lifecycle core, loaded from
//! `<config_dir>/hiveshell/prefs.toml` with environment overrides. Missing
//! file or missing keys fall back to defaults; a malformed file is a startup
//! warning, not a fatal error.

use std::path::PathBuf;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

/// Environment variable naming an alternate prefs file.
pub const PREFS_PATH_ENV: &str = "HIVESHELL_PREFS";
/// Environment override for the hosted web application URL.
pub const APP_URL_ENV: &str = "HIVESHELL_APP_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppPreferences {
    /// URL of the web application every account view loads.
    pub app_url: String,

    /// Maximum number of simultaneously materialized views.
    pub max_concurrent_views: usize,
    /// Capacity of the recycled-view pool.
    pub view_pool_size: usize,
    /// Pooled entries older than this are destroyed by the stale sweep.
    pub pool_max_age_secs: u64,

    /// Connection-probe polling interval.
    pub connection_poll_secs: u64,
    /// Login-probe polling interval.
    pub login_poll_secs: u64,
    /// Upper bound on any single probe evaluation.
    pub probe_timeout_secs: u64,

    /// Memory guardian sampling interval.
    pub memory_sample_secs: u64,
    /// Per-view warning threshold.
    pub memory_soft_limit_mib: u64,
    /// Per-view forced-reload threshold.
    pub memory_hard_limit_mib: u64,
    /// Whether the guardian may force cache-bypassing reloads on its own.
    pub memory_auto_cleanup: bool,

    /// Quiet period before a debounced resize executes.
    pub resize_quiet_period_ms: u64,
    /// Freshness window of the bounds cache.
    pub bounds_cache_ttl_ms: u64,
}

impl Default for AppPreferences {
    fn default() -> Self {
        Self {
            app_url: "https://web.example.com/".to_string(),
            max_concurrent_views: 5,
            view_pool_size: 2,
            pool_max_age_secs: 300,
            connection_poll_secs: 30,
            login_poll_secs: 30,
            probe_timeout_secs: 10,
            memory_sample_secs: 60,
            memory_soft_limit_mib: 512,
            memory_hard_limit_mib: 1024,
            memory_auto_cleanup: true,
            resize_quiet_period_ms: 150,
            bounds_cache_ttl_ms: 1000,
        }
    }
}

impl AppPreferences {
    /// Load preferences from disk, then apply environment overrides and
    /// clamp out-of-range values. Never fails.
    pub fn load() -> Self {
        let mut prefs = match Self::prefs_path() {
            Some(path) if path.is_file() => match std::fs::read_to_string(&path) {
                Ok(raw) => match toml::from_str::<Self>(&raw) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!("prefs: failed to parse {}: {e}; using defaults", path.display());
                        Self::default()
                    }
                },
                Err(e) => {
                    warn!("prefs: failed to read {}: {e}; using defaults", path.display());
                    Self::default()
                }
            },
            _ => Self::default(),
        };
        if let Ok(url) = std::env::var(APP_URL_ENV)
            && !url.is_empty()
        {
            prefs.app_url = url;
        }
        prefs.clamp();
        prefs
    }

    /// Prefs file location: `HIVESHELL_PREFS` when set, otherwise
    /// `<config_dir>/hiveshell/prefs.toml`.
    pub fn prefs_path() -> Option<PathBuf> {
        if let Ok(explicit) = std::env::var(PREFS_PATH_ENV) {
            return Some(PathBuf::from(explicit));
        }
        dirs::config_dir().map(|dir| dir.join("hiveshell").join("prefs.toml"))
    }

    /// Clamp values that would make the core misbehave. Logged, not fatal.
    fn clamp(&mut self) {
        if self.max_concurrent_views == 0 {
            warn!("prefs: max_concurrent_views must be at least 1; clamping");
            self.max_concurrent_views = 1;
        }
        if self.memory_hard_limit_mib < self.memory_soft_limit_mib {
            warn!(
                "prefs: memory_hard_limit_mib {} below soft limit {}; raising to match",
                self.memory_hard_limit_mib, self.memory_soft_limit_mib
            );
            self.memory_hard_limit_mib = self.memory_soft_limit_mib;
        }
        if self.probe_timeout_secs == 0 {
            self.probe_timeout_secs = 1;
        }
        if url::Url::parse(&self.app_url).is_err() {
            warn!("prefs: app_url {:?} is not a valid URL; using default", self.app_url);
            self.app_url = Self::default().app_url;
        }
    }

    pub fn pool_max_age(&self) -> Duration {
        Duration::from_secs(self.pool_max_age_secs)
    }

    pub fn connection_poll_interval(&self) -> Duration {
        Duration::from_secs(self.connection_poll_secs)
    }

    pub fn login_poll_interval(&self) -> Duration {
        Duration::from_secs(self.login_poll_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn memory_sample_interval(&self) -> Duration {
        Duration::from_secs(self.memory_sample_secs)
    }

    pub fn resize_quiet_period(&self) -> Duration {
        Duration::from_millis(self.resize_quiet_period_ms)
    }

    pub fn bounds_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.bounds_cache_ttl_ms)
    }
}
