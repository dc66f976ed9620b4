/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Recycled-view pool.
//!
//! Evicted views land here as sanitized (surface, session) pairs instead of
//! being destroyed outright. Entries are anonymous capacity: nothing looks
//! them up by account id, and the originating id is kept for diagnostics
//! only. Reuse is last-in-first-out. A surface is permanently bound to its
//! backing store, so an entry can only satisfy a request for the same
//! partition; dead entries found during the walk are destroyed on the spot,
//! mismatched ones stay pooled until overflow or the stale sweep reclaims
//! them.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::time::Instant;

use hiveshell_core::AccountId;
use hiveshell_runtime::{RenderSurface, SessionStore};

/// A sanitized, unbound (surface, session) pair waiting for reuse.
pub struct PooledEntry {
    pub surface: Arc<dyn RenderSurface>,
    pub session: Arc<dyn SessionStore>,
    pub pooled_at: Instant,
    /// Diagnostic only; never used for lookup.
    pub origin: AccountId,
}

pub struct ViewPool {
    entries: Vec<PooledEntry>,
    capacity: usize,
    max_age: Duration,
}

impl ViewPool {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
            max_age,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a recycled entry. Beyond capacity the oldest pooled entry is
    /// destroyed outright; a zero-capacity pool destroys immediately.
    pub fn insert(&mut self, entry: PooledEntry) {
        debug!(
            "view_pool: pooled surface {} (origin {})",
            entry.surface.id(),
            entry.origin
        );
        self.entries.push(entry);
        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.pooled_at)
                .map(|(i, _)| i);
            let Some(index) = oldest else { break };
            let evicted = self.entries.remove(index);
            debug!(
                "view_pool: capacity overflow, destroying surface {} (origin {})",
                evicted.surface.id(),
                evicted.origin
            );
            evicted.surface.destroy();
        }
    }

    /// Take the most recently pooled live entry for `partition_key`. Dead
    /// entries encountered on the walk are destroyed and dropped.
    pub fn acquire(&mut self, partition_key: &str) -> Option<PooledEntry> {
        let mut index = self.entries.len();
        while index > 0 {
            index -= 1;
            if !self.entries[index].surface.is_alive() {
                let dead = self.entries.remove(index);
                debug!(
                    "view_pool: discarding dead pooled surface {} (origin {})",
                    dead.surface.id(),
                    dead.origin
                );
                dead.surface.destroy();
                continue;
            }
            if self.entries[index].session.partition_key() == partition_key {
                let entry = self.entries.remove(index);
                debug!(
                    "view_pool: reusing surface {} for partition {partition_key}",
                    entry.surface.id()
                );
                return Some(entry);
            }
        }
        None
    }

    /// Destroy entries older than the max age or already dead. Returns the
    /// number destroyed.
    pub fn sweep_stale(&mut self) -> usize {
        let max_age = self.max_age;
        let mut destroyed = 0;
        self.entries.retain(|entry| {
            let stale = !entry.surface.is_alive() || entry.pooled_at.elapsed() >= max_age;
            if stale {
                entry.surface.destroy();
                destroyed += 1;
            }
            !stale
        });
        if destroyed > 0 {
            debug!("view_pool: stale sweep destroyed {destroyed} entries");
        }
        destroyed
    }

    /// Destroy everything. Shutdown path.
    pub fn drain(&mut self) {
        for entry in self.entries.drain(..) {
            entry.surface.destroy();
        }
    }
}
