/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Session isolation provider.
//!
//! Owns the only mapping from account id to session store in the process.
//! Partition keys derive solely from the account id, so two accounts can
//! never share a store; the provider still cross-checks every creation
//! against its live map and fails loudly on a collision instead of handing
//! out an aliased store.
//!
//! Proxy configuration deliberately never hard-fails: a misconfigured proxy
//! must not prevent an account from loading, only from tunneling, so any
//! validation or downstream failure resets the store to a direct connection
//! and reports success with an advisory.

pub mod probe;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use serde::Serialize;

use hiveshell_core::{AccountId, ProxyConfig};
use hiveshell_runtime::{RenderSurface, SessionBackend, SessionStore, StorageCategory};

use crate::error::ShellError;

/// Result of a proxy configuration attempt. Always a success from the
/// caller's point of view; `fallback_direct` records the downgrade.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyOutcome {
    /// True when the requested proxy is actually tunneling.
    pub applied: bool,
    /// True when the store was reset to a direct connection instead.
    pub fallback_direct: bool,
    /// Original error that forced the fallback, for the UI to surface.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<String>,
}

impl ProxyOutcome {
    fn applied() -> Self {
        Self {
            applied: true,
            fallback_direct: false,
            advisory: None,
        }
    }

    fn fallback(advisory: String) -> Self {
        Self {
            applied: false,
            fallback_direct: true,
            advisory: Some(advisory),
        }
    }
}

/// Isolation facts for one account, for verification and diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct IsolationReport {
    pub isolated: bool,
    pub partition_key: String,
    pub storage_path: PathBuf,
}

/// Deterministic account-to-session mapping over an opaque backend.
pub struct SessionProvider {
    backend: Arc<dyn SessionBackend>,
    sessions: HashMap<AccountId, Arc<dyn SessionStore>>,
}

impl SessionProvider {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            backend,
            sessions: HashMap::new(),
        }
    }

    /// Get or create the session store for an account. Idempotent; the
    /// partition key is `persist:account-` + id and nothing else.
    pub fn session_for(&mut self, id: &AccountId) -> Result<Arc<dyn SessionStore>, ShellError> {
        if let Some(existing) = self.sessions.get(id) {
            return Ok(existing.clone());
        }
        let partition = id.partition_key();
        // Cross-check the live map: no other account may already hold this
        // partition. Possible only through a backend defect, and an aliased
        // store would silently merge two accounts' cookies, so fail loudly.
        if let Some((holder, _)) = self
            .sessions
            .iter()
            .find(|(other, store)| *other != id && store.partition_key() == partition)
        {
            error!(
                "sessions: partition {partition} requested for {id} is already bound to {holder}"
            );
            return Err(ShellError::IsolationViolation {
                account: id.clone(),
                holder: holder.clone(),
                partition,
            });
        }
        let store = self.backend.open(&partition)?;
        if store.partition_key() != partition {
            error!(
                "sessions: backend returned partition {} for requested {partition}",
                store.partition_key()
            );
            return Err(ShellError::PartitionMismatch {
                account: id.clone(),
                expected: partition,
                actual: store.partition_key(),
            });
        }
        debug!("sessions: opened partition {partition}");
        self.sessions.insert(id.clone(), store.clone());
        Ok(store)
    }

    /// Drop the account's mapping. The backing store and its data persist;
    /// a later `session_for` reopens the same partition.
    pub fn forget(&mut self, id: &AccountId) {
        self.sessions.remove(id);
    }

    /// Apply an account's proxy settings with the fallback policy.
    pub async fn configure_proxy(
        &mut self,
        id: &AccountId,
        config: &ProxyConfig,
    ) -> Result<ProxyOutcome, ShellError> {
        let session = self.session_for(id)?;
        let rules = match config.to_rules() {
            Ok(rules) => rules,
            Err(e) => {
                warn!("sessions: proxy config for {id} rejected ({e}); falling back to direct");
                return Ok(self.reset_to_direct(&session, e.to_string()).await);
            }
        };
        match session.apply_proxy(Some(rules)).await {
            Ok(()) => Ok(ProxyOutcome::applied()),
            Err(e) => {
                warn!("sessions: proxy apply for {id} failed ({e}); falling back to direct");
                Ok(self.reset_to_direct(&session, e.to_string()).await)
            }
        }
    }

    /// Reset the account's store to a direct connection.
    pub async fn clear_proxy(&mut self, id: &AccountId) -> Result<(), ShellError> {
        let session = self.session_for(id)?;
        session.apply_proxy(None).await?;
        Ok(())
    }

    async fn reset_to_direct(&self, session: &Arc<dyn SessionStore>, advisory: String) -> ProxyOutcome {
        if let Err(reset_err) = session.apply_proxy(None).await {
            // Still a fallback success: the store's previous identity stays
            // in place, which the advisory records.
            error!("sessions: direct-connection reset also failed: {reset_err}");
            return ProxyOutcome::fallback(format!("{advisory}; direct reset failed: {reset_err}"));
        }
        ProxyOutcome::fallback(advisory)
    }

    /// Report isolation facts for an account, creating its store if needed.
    pub fn verify_isolation(&mut self, id: &AccountId) -> Result<IsolationReport, ShellError> {
        let session = self.session_for(id)?;
        let partition_key = session.partition_key();
        let storage_path = session.storage_path();
        let partition_names_account = partition_key.ends_with(id.as_str());
        let unique = !self
            .sessions
            .iter()
            .any(|(other, store)| other != id && store.storage_path() == storage_path);
        let isolated = partition_names_account && unique;
        if !isolated {
            error!(
                "sessions: isolation verification failed for {id} (partition {partition_key}, path {})",
                storage_path.display()
            );
        }
        Ok(IsolationReport {
            isolated,
            partition_key,
            storage_path,
        })
    }

    pub async fn has_stored_data(&mut self, id: &AccountId) -> Result<bool, ShellError> {
        let session = self.session_for(id)?;
        Ok(session.has_stored_data().await?)
    }

    pub async fn clear_stored_data(&mut self, id: &AccountId) -> Result<(), ShellError> {
        let session = self.session_for(id)?;
        session.clear_storage(StorageCategory::ALL).await?;
        Ok(())
    }

    /// Infer login state from a surface bound to this account's session.
    /// Never fails: a missing or destroyed surface, an evaluation error, or
    /// a timeout all read as signed out.
    pub async fn detect_login_state(
        &self,
        id: &AccountId,
        surface: &Arc<dyn RenderSurface>,
        timeout: Duration,
    ) -> bool {
        if surface.partition_key() != id.partition_key() {
            warn!(
                "sessions: login probe for {id} given a surface on partition {}",
                surface.partition_key()
            );
            return false;
        }
        probe::probe_login(surface, timeout).await
    }

    #[cfg(test)]
    pub(crate) fn live_session_count(&self) -> usize {
        self.sessions.len()
    }
}
