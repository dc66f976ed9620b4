/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Account identity.
//!
//! Account ids are opaque strings owned by the account-configuration store.
//! Every map in the shell is keyed by [`AccountId`]; the partition key that
//! names an account's isolated session store derives solely from it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable prefix for session partition keys. A partition key is
/// `PARTITION_PREFIX` + the account id, and nothing else, so two distinct
/// accounts can never share a partition.
pub const PARTITION_PREFIX: &str = "persist:account-";

const MAX_ACCOUNT_ID_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountIdError {
    #[error("account id is empty")]
    Empty,
    #[error("account id exceeds {MAX_ACCOUNT_ID_LEN} bytes")]
    TooLong,
    #[error("account id contains disallowed character {0:?}")]
    DisallowedCharacter(char),
}

/// Opaque unique account identifier.
///
/// Ids come from the configuration store; this type only enforces the shape
/// required for safe use in partition keys and storage directory names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn parse(raw: &str) -> Result<Self, AccountIdError> {
        if raw.is_empty() {
            return Err(AccountIdError::Empty);
        }
        if raw.len() > MAX_ACCOUNT_ID_LEN {
            return Err(AccountIdError::TooLong);
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(AccountIdError::DisallowedCharacter(bad));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Partition key naming this account's session store.
    pub fn partition_key(&self) -> String {
        format!("{PARTITION_PREFIX}{}", self.0)
    }

    /// Directory name for this account's on-disk storage, derived from the
    /// partition key with the scheme-like prefix removed.
    pub fn storage_dir_name(&self) -> String {
        format!("account-{}", self.0)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-account translation settings, consumed by the content-injection layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub enabled: bool,
    pub target_language: Option<String>,
}

/// Account record as read from the configuration store. Read-mostly input;
/// the shell never mutates these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: AccountId,
    #[serde(default)]
    pub proxy: Option<crate::proxy::ProxyConfig>,
    #[serde(default)]
    pub translation: TranslationConfig,
}
