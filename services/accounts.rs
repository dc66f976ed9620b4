/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! File-backed adapters for the external account-configuration store.
//!
//! The shell consumes account records and the persisted last-active id; it
//! never owns them. These adapters read a TOML account list and keep the
//! last-active value in a single small file, which is what the desktop
//! embedder provides in production.

use std::path::{Path, PathBuf};

use log::warn;
use parking_lot::Mutex;
use serde::Deserialize;

use hiveshell_core::{AccountId, AccountRecord};
use hiveshell_runtime::{AccountDirectory, ActiveAccountStore};

#[derive(Debug, Default, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<AccountRecord>,
}

/// Account directory backed by a TOML file, in file order.
pub struct TomlAccountDirectory {
    records: Vec<AccountRecord>,
}

impl TomlAccountDirectory {
    /// Load the directory. A missing or malformed file yields an empty
    /// directory with a warning; the shell can still run.
    pub fn load(path: &Path) -> Self {
        let records = match std::fs::read_to_string(path) {
            Ok(raw) => match toml::from_str::<AccountsFile>(&raw) {
                Ok(parsed) => parsed.accounts,
                Err(e) => {
                    warn!("accounts: failed to parse {}: {e}", path.display());
                    Vec::new()
                }
            },
            Err(e) => {
                warn!("accounts: failed to read {}: {e}", path.display());
                Vec::new()
            }
        };
        Self { records }
    }
}

impl AccountDirectory for TomlAccountDirectory {
    fn account(&self, id: &AccountId) -> Option<AccountRecord> {
        self.records.iter().find(|r| r.id == *id).cloned()
    }

    fn list_ordered(&self) -> Vec<AccountId> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }

    fn touch_last_active(&self, _id: &AccountId) {
        // Last-active ordering lives in the configuration store proper; the
        // TOML snapshot has nowhere durable to record it.
    }
}

/// Last-active account id persisted as a one-line file.
pub struct FileActiveAccountStore {
    path: PathBuf,
    cached: Mutex<Option<AccountId>>,
}

impl FileActiveAccountStore {
    pub fn new(path: PathBuf) -> Self {
        let cached = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| AccountId::parse(raw.trim()).ok());
        Self {
            path,
            cached: Mutex::new(cached),
        }
    }
}

impl ActiveAccountStore for FileActiveAccountStore {
    fn load(&self) -> Option<AccountId> {
        self.cached.lock().clone()
    }

    fn store(&self, id: Option<&AccountId>) {
        *self.cached.lock() = id.cloned();
        let result = match id {
            Some(id) => std::fs::write(&self.path, id.as_str()),
            None => match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            },
        };
        if let Err(e) = result {
            warn!("accounts: failed to persist last-active id: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_directory_preserves_file_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("accounts.toml");
        std::fs::write(
            &path,
            r#"
[[accounts]]
id = "beta"

[[accounts]]
id = "alpha"

[[accounts]]
id = "gamma"
[accounts.proxy]
protocol = "socks5"
host = "127.0.0.1"
port = 1080
"#,
        )
        .expect("write accounts file");

        let directory = TomlAccountDirectory::load(&path);
        let ids: Vec<String> = directory
            .list_ordered()
            .iter()
            .map(|id| id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["beta", "alpha", "gamma"]);

        let gamma = directory
            .account(&AccountId::parse("gamma").unwrap())
            .expect("gamma record");
        assert!(gamma.proxy.is_some());
    }

    #[test]
    fn missing_accounts_file_yields_empty_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let directory = TomlAccountDirectory::load(&dir.path().join("nope.toml"));
        assert!(directory.list_ordered().is_empty());
    }

    #[test]
    fn active_store_round_trips_and_clears() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("last_active");
        let id = AccountId::parse("alpha").unwrap();

        let store = FileActiveAccountStore::new(path.clone());
        assert_eq!(store.load(), None);
        store.store(Some(&id));
        assert_eq!(store.load(), Some(id.clone()));

        // A fresh store reads the persisted value back.
        let reread = FileActiveAccountStore::new(path.clone());
        assert_eq!(reread.load(), Some(id));

        reread.store(None);
        assert_eq!(reread.load(), None);
        assert!(!path.exists());
    }
}
