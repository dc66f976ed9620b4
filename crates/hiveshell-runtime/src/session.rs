/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Session-store capability.
//!
//! A session store is one account's persistent, isolated unit of cookies,
//! local storage, and cache, named by a partition key. Proxy identity is a
//! property of the store, not of any single surface bound to it.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use hiveshell_core::ProxyRules;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("session backend error: {0}")]
    Backend(String),
    #[error("proxy could not be applied: {0}")]
    ProxyApply(String),
    #[error("storage operation failed: {0}")]
    Storage(String),
}

/// Storage categories that can be cleared selectively. Cookies and local
/// storage carry login state and survive eviction; the transient categories
/// do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageCategory {
    Cookies,
    LocalStorage,
    IndexedDb,
    Cache,
    ServiceWorkers,
    WebSql,
}

impl StorageCategory {
    /// Categories safe to clear when recycling a view into the pool.
    pub const TRANSIENT: &'static [StorageCategory] = &[
        StorageCategory::Cache,
        StorageCategory::ServiceWorkers,
        StorageCategory::WebSql,
    ];

    /// Every category, for full stored-data clearing.
    pub const ALL: &'static [StorageCategory] = &[
        StorageCategory::Cookies,
        StorageCategory::LocalStorage,
        StorageCategory::IndexedDb,
        StorageCategory::Cache,
        StorageCategory::ServiceWorkers,
        StorageCategory::WebSql,
    ];
}

/// One account's isolated session store.
pub trait SessionStore: Send + Sync {
    fn partition_key(&self) -> String;

    /// On-disk root of this partition's data.
    fn storage_path(&self) -> PathBuf;

    /// Apply proxy rules, or reset to a direct connection when `None`.
    fn apply_proxy(&self, rules: Option<ProxyRules>)
    -> BoxFuture<'static, Result<(), SessionError>>;

    fn clear_storage(
        &self,
        categories: &[StorageCategory],
    ) -> BoxFuture<'static, Result<(), SessionError>>;

    /// Whether any of the known storage subpaths hold data.
    fn has_stored_data(&self) -> BoxFuture<'static, Result<bool, SessionError>>;
}

/// Engine-side opener for session stores.
pub trait SessionBackend: Send + Sync {
    /// Open (creating if needed) the store named by `partition_key`.
    /// Idempotent: the same key always yields the same underlying store.
    fn open(&self, partition_key: &str) -> Result<Arc<dyn SessionStore>, SessionError>;
}
