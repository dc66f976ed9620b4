/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Per-view memory sampling and remediation.
//!
//! One supervised worker samples every materialized view on an interval:
//! above the soft threshold it emits a warning, above the hard threshold
//! (with auto-cleanup enabled) it asks the controller for a cache-bypassing
//! reload — a drastic but bounded remediation that keeps the account active.
//! The guardian keeps its own account-keyed copy of surface handles; views
//! are registered on materialization and removed on eviction or destroy, so
//! pooled and absent views are never sampled. A system-level memory pressure
//! sample rides along as an advisory, edge-triggered signal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::RwLock;
use sysinfo::System;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use hiveshell_core::{AccountId, MemoryPressureLevel};
use hiveshell_runtime::RenderSurface;

use crate::shell::desktop::runtime::events::ShellEvent;

const MIB: u64 = 1024 * 1024;

pub struct MemoryGuardian {
    tracked: Arc<RwLock<HashMap<AccountId, Arc<dyn RenderSurface>>>>,
    worker: Option<(CancellationToken, JoinHandle<()>)>,
    events_tx: UnboundedSender<ShellEvent>,
    sample_interval: Duration,
    soft_limit_bytes: u64,
    hard_limit_bytes: u64,
    auto_cleanup: bool,
}

impl MemoryGuardian {
    pub fn new(
        events_tx: UnboundedSender<ShellEvent>,
        sample_interval: Duration,
        soft_limit_mib: u64,
        hard_limit_mib: u64,
        auto_cleanup: bool,
    ) -> Self {
        Self {
            tracked: Arc::new(RwLock::new(HashMap::new())),
            worker: None,
            events_tx,
            sample_interval,
            soft_limit_bytes: soft_limit_mib * MIB,
            hard_limit_bytes: hard_limit_mib * MIB,
            auto_cleanup,
        }
    }

    /// Register a materialized view for sampling.
    pub fn track(&self, account: &AccountId, surface: Arc<dyn RenderSurface>) {
        self.tracked.write().insert(account.clone(), surface);
    }

    /// Remove a view from sampling (evicted, pooled, or destroyed).
    pub fn untrack(&self, account: &AccountId) {
        self.tracked.write().remove(account);
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.read().len()
    }

    /// Spawn the sampling worker. Idempotent.
    pub fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(guardian_worker(
            self.tracked.clone(),
            self.events_tx.clone(),
            self.sample_interval,
            self.soft_limit_bytes,
            self.hard_limit_bytes,
            self.auto_cleanup,
            cancel.clone(),
        ));
        self.worker = Some((cancel, task));
        debug!("memory_guardian: worker started");
    }

    pub fn stop(&mut self) {
        if let Some((cancel, task)) = self.worker.take() {
            cancel.cancel();
            task.abort();
            debug!("memory_guardian: worker stopped");
        }
    }

    /// One-shot sample of every tracked view. Failed samples are skipped.
    pub async fn sample_all(&self) -> HashMap<AccountId, u64> {
        let snapshot: Vec<(AccountId, Arc<dyn RenderSurface>)> = self
            .tracked
            .read()
            .iter()
            .map(|(id, surface)| (id.clone(), surface.clone()))
            .collect();
        let mut samples = HashMap::new();
        for (account, surface) in snapshot {
            if !surface.is_alive() {
                continue;
            }
            match surface.memory_usage_bytes().await {
                Ok(bytes) => {
                    samples.insert(account, bytes);
                }
                Err(e) => debug!("memory_guardian: sample failed for {account}: {e}"),
            }
        }
        samples
    }

    pub fn hard_limit_bytes(&self) -> u64 {
        self.hard_limit_bytes
    }
}

impl Drop for MemoryGuardian {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::too_many_arguments)]
async fn guardian_worker(
    tracked: Arc<RwLock<HashMap<AccountId, Arc<dyn RenderSurface>>>>,
    events_tx: UnboundedSender<ShellEvent>,
    interval: Duration,
    soft_limit_bytes: u64,
    hard_limit_bytes: u64,
    auto_cleanup: bool,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // Skip the immediate first tick so freshly created views get a full
    // interval to settle before their first sample.
    ticker.tick().await;
    let mut last_pressure = MemoryPressureLevel::Unknown;
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("memory_guardian: worker cancelled");
                break;
            }

            _ = ticker.tick() => {
                let (level, available_mib, total_mib) = sample_system_memory();
                if level != last_pressure {
                    last_pressure = level;
                    debug!(
                        "memory_guardian: system pressure now {level:?} ({available_mib} MiB free of {total_mib} MiB)"
                    );
                    let _ = events_tx.send(ShellEvent::MemoryPressureChanged {
                        level,
                        available_mib,
                        total_mib,
                    });
                }

                let snapshot: Vec<(AccountId, Arc<dyn RenderSurface>)> = tracked
                    .read()
                    .iter()
                    .map(|(id, surface)| (id.clone(), surface.clone()))
                    .collect();
                for (account, surface) in snapshot {
                    if !surface.is_alive() {
                        continue;
                    }
                    let bytes = match surface.memory_usage_bytes().await {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            debug!("memory_guardian: sample failed for {account}: {e}");
                            continue;
                        }
                    };
                    if bytes >= hard_limit_bytes && auto_cleanup {
                        warn!(
                            "memory_guardian: {account} at {} MiB, above hard limit; forcing reload",
                            bytes / MIB
                        );
                        let _ = events_tx.send(ShellEvent::MemoryReloadRequested {
                            account,
                            bytes,
                        });
                    } else if bytes >= soft_limit_bytes {
                        warn!(
                            "memory_guardian: {account} at {} MiB, above soft limit",
                            bytes / MIB
                        );
                        let _ = events_tx.send(ShellEvent::MemoryWarning { account, bytes });
                    }
                }
            }
        }
    }
}

/// Sample system memory pressure. Thresholds follow the desktop shell
/// convention: critical under 512 MiB or 8% available, warning under
/// 1024 MiB or 15%.
pub fn sample_system_memory() -> (MemoryPressureLevel, u64, u64) {
    let mut system = System::new();
    system.refresh_memory();

    let total_bytes = system.total_memory();
    let available_bytes = system.available_memory();
    let total_mib = total_bytes / MIB;
    let available_mib = available_bytes / MIB;

    if total_bytes == 0 {
        return (MemoryPressureLevel::Unknown, available_mib, total_mib);
    }

    let available_pct = available_bytes as f64 / total_bytes as f64;
    let level = if available_mib <= 512 || available_pct <= 0.08 {
        MemoryPressureLevel::Critical
    } else if available_mib <= 1024 || available_pct <= 0.15 {
        MemoryPressureLevel::Warning
    } else {
        MemoryPressureLevel::Normal
    };
    (level, available_mib, total_mib)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::{MemorySessionBackend, MemorySurfaceFactory};
    use hiveshell_runtime::{SessionBackend, SurfaceConfig, SurfaceFactory};
    use tokio::sync::mpsc;

    const INTERVAL: Duration = Duration::from_secs(60);

    async fn tracked_surface(
        backend: &MemorySessionBackend,
        factory: &MemorySurfaceFactory,
        account: &str,
    ) -> (AccountId, Arc<dyn RenderSurface>) {
        let id = AccountId::parse(account).unwrap();
        let session = backend.open(&id.partition_key()).expect("session");
        let (tx, _rx) = mpsc::unbounded_channel();
        let surface = factory
            .create_surface(session, SurfaceConfig::default(), tx)
            .await
            .expect("surface");
        (id, surface)
    }

    fn guardian(
        auto_cleanup: bool,
    ) -> (MemoryGuardian, mpsc::UnboundedReceiver<ShellEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MemoryGuardian::new(tx, INTERVAL, 512, 1024, auto_cleanup), rx)
    }

    /// Drain per-view guardian events, ignoring system pressure advisories
    /// (their level depends on the machine running the tests).
    fn drain_view_events(rx: &mut mpsc::UnboundedReceiver<ShellEvent>) -> Vec<ShellEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if !matches!(event, ShellEvent::MemoryPressureChanged { .. }) {
                events.push(event);
            }
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn soft_threshold_emits_warning_hard_forces_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = MemorySessionBackend::new(dir.path());
        let factory = MemorySurfaceFactory::new();
        let (mut guardian, mut rx) = guardian(true);

        let (warm_id, warm) = tracked_surface(&backend, &factory, "warm").await;
        let (hot_id, hot) = tracked_surface(&backend, &factory, "hot").await;
        let (cool_id, cool) = tracked_surface(&backend, &factory, "cool").await;
        factory.surface_by_id(warm.id()).unwrap().set_memory_usage(600 * MIB);
        factory.surface_by_id(hot.id()).unwrap().set_memory_usage(2048 * MIB);
        factory.surface_by_id(cool.id()).unwrap().set_memory_usage(100 * MIB);
        guardian.track(&warm_id, warm);
        guardian.track(&hot_id, hot);
        guardian.track(&cool_id, cool);
        guardian.start();

        // Let the spawned worker arm its interval timer before advancing the
        // paused clock, otherwise the ticker is registered after the jump.
        tokio::task::yield_now().await;
        tokio::time::advance(INTERVAL + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        let events = drain_view_events(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| matches!(
            e,
            ShellEvent::MemoryWarning { account, .. } if *account == warm_id
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            ShellEvent::MemoryReloadRequested { account, .. } if *account == hot_id
        )));
        assert!(!events.iter().any(|e| matches!(
            e,
            ShellEvent::MemoryWarning { account, .. } | ShellEvent::MemoryReloadRequested { account, .. }
                if *account == cool_id
        )));
        guardian.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn hard_threshold_without_auto_cleanup_only_warns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = MemorySessionBackend::new(dir.path());
        let factory = MemorySurfaceFactory::new();
        let (mut guardian, mut rx) = guardian(false);

        let (hot_id, hot) = tracked_surface(&backend, &factory, "hot").await;
        factory.surface_by_id(hot.id()).unwrap().set_memory_usage(2048 * MIB);
        guardian.track(&hot_id, hot);
        guardian.start();

        // Let the spawned worker arm its interval timer before advancing the
        // paused clock, otherwise the ticker is registered after the jump.
        tokio::task::yield_now().await;
        tokio::time::advance(INTERVAL + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        let events = drain_view_events(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            ShellEvent::MemoryWarning { account, .. } if *account == hot_id
        ));
        guardian.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn untracked_views_are_never_sampled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = MemorySessionBackend::new(dir.path());
        let factory = MemorySurfaceFactory::new();
        let (mut guardian, mut rx) = guardian(true);

        let (hot_id, hot) = tracked_surface(&backend, &factory, "hot").await;
        factory.surface_by_id(hot.id()).unwrap().set_memory_usage(2048 * MIB);
        guardian.track(&hot_id, hot);
        guardian.untrack(&hot_id);
        assert_eq!(guardian.tracked_count(), 0);
        guardian.start();

        tokio::time::advance(INTERVAL * 2).await;
        tokio::task::yield_now().await;
        assert!(drain_view_events(&mut rx).is_empty());
        guardian.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn sample_all_skips_dead_surfaces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = MemorySessionBackend::new(dir.path());
        let factory = MemorySurfaceFactory::new();
        let (guardian, _rx) = guardian(true);

        let (live_id, live) = tracked_surface(&backend, &factory, "live").await;
        let (dead_id, dead) = tracked_surface(&backend, &factory, "dead").await;
        factory.surface_by_id(live.id()).unwrap().set_memory_usage(64 * MIB);
        dead.destroy();
        guardian.track(&live_id, live);
        guardian.track(&dead_id, dead);

        let samples = guardian.sample_all().await;
        assert_eq!(samples.len(), 1);
        assert_eq!(samples.get(&live_id), Some(&(64 * MIB)));
    }
}
