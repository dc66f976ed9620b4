/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Per-account view lifecycle.
//!
//! The controller owns the authoritative account-to-view map, the stable
//! creation order, and the active-account pointer; nothing else in the
//! process writes them. Views materialize lazily on first switch, recycle
//! into the pool under capacity pressure, and are destroyed only on explicit
//! request. Background workers communicate exclusively through the event
//! channels drained by [`ViewController::pump_events`], so every mutation of
//! view state happens on the controller's task.
//!
//! Per-account lifecycle: absent → creating → ready ⇄ error, with ready and
//! error able to return to absent via destroy or move to the pool via
//! eviction, and pooled surfaces re-binding to a fresh view state on reuse.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

use hiveshell_core::{AccountId, ConnectionStatus, MemoryPressureLevel, ViewStatus};
use hiveshell_runtime::{
    AccountDirectory, ActiveAccountStore, HostWindow, Rect, RenderSurface, SessionBackend,
    SessionStore, StorageCategory, SurfaceConfig, SurfaceEvent, SurfaceFactory, SurfaceId,
};

use crate::error::ShellError;
use crate::prefs::AppPreferences;
use crate::services::sessions::SessionProvider;
use crate::shell::desktop::host::layout::LayoutCalculator;
use crate::shell::desktop::lifecycle::view_pool::{PooledEntry, ViewPool};
use crate::shell::desktop::runtime::events::ShellEvent;
use crate::shell::desktop::runtime::memory_guardian::{self, MemoryGuardian};
use crate::shell::desktop::runtime::status_monitors::{StatusMonitors, ViewHealth};

/// Neutral content a surface is parked on before pooling.
const NEUTRAL_BLANK_URL: &str = "about:blank";

/// Everything the controller tracks for one materialized account view.
pub struct ViewState {
    pub account_id: AccountId,
    pub surface: Arc<dyn RenderSurface>,
    pub session: Arc<dyn SessionStore>,
    pub visible: bool,
    pub loaded: bool,
    pub status: ViewStatus,
    pub last_bounds: Option<Rect>,
    pub connection: ConnectionStatus,
    pub connection_error: Option<String>,
    pub logged_in: Option<bool>,
    pub last_load_error: Option<String>,
    pub responsive: bool,
    pub last_access: Instant,
    pub health: Arc<ViewHealth>,
}

/// Serializable projection of a view's state for the command boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ViewStateSnapshot {
    pub account_id: AccountId,
    pub status: ViewStatus,
    pub visible: bool,
    pub loaded: bool,
    pub connection: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_error: Option<String>,
    pub logged_in: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_load_error: Option<String>,
    pub responsive: bool,
    pub crash_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_bounds: Option<Rect>,
    pub partition_key: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SwitchOptions {
    /// Materialize the view if the account has none yet. On for interactive
    /// use.
    pub create_if_missing: bool,
}

impl Default for SwitchOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SwitchOutcome {
    pub account_id: Option<AccountId>,
    pub already_active: bool,
    pub created: bool,
}

/// Report returned by the memory-usage query.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryUsageReport {
    pub per_view_bytes: HashMap<AccountId, u64>,
    pub pressure_level: MemoryPressureLevel,
    pub available_mib: u64,
    pub total_mib: u64,
}

/// Options for on-demand memory optimization.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimizeOptions {
    /// Reload every materialized view, not only those above the hard limit.
    pub aggressive: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizeOutcome {
    pub sampled: usize,
    pub reloaded: Vec<AccountId>,
}

pub struct ViewController {
    prefs: AppPreferences,
    window: Arc<dyn HostWindow>,
    factory: Arc<dyn SurfaceFactory>,
    accounts: Arc<dyn AccountDirectory>,
    active_store: Arc<dyn ActiveAccountStore>,
    sessions: SessionProvider,

    views: HashMap<AccountId, ViewState>,
    /// Stable insertion order of materialized views; drives next/previous
    /// navigation and eviction tie-breaking.
    creation_order: Vec<AccountId>,
    surface_index: HashMap<SurfaceId, AccountId>,
    active_account: Option<AccountId>,
    /// Per-account crash counters. Survive view destruction so an embedder
    /// can implement restart backoff; this core never auto-recreates.
    crash_counts: HashMap<AccountId, u32>,
    switch_in_flight: bool,

    pool: ViewPool,
    layout: LayoutCalculator,
    monitors: StatusMonitors,
    guardian: MemoryGuardian,
    last_pressure: (MemoryPressureLevel, u64, u64),

    events_rx: UnboundedReceiver<ShellEvent>,
    surface_events_tx: UnboundedSender<SurfaceEvent>,
    surface_events_rx: UnboundedReceiver<SurfaceEvent>,
}

impl ViewController {
    pub fn new(
        prefs: AppPreferences,
        window: Arc<dyn HostWindow>,
        factory: Arc<dyn SurfaceFactory>,
        session_backend: Arc<dyn SessionBackend>,
        accounts: Arc<dyn AccountDirectory>,
        active_store: Arc<dyn ActiveAccountStore>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (surface_events_tx, surface_events_rx) = mpsc::unbounded_channel();
        let pool = ViewPool::new(prefs.view_pool_size, prefs.pool_max_age());
        let layout = LayoutCalculator::new(
            prefs.bounds_cache_ttl(),
            prefs.resize_quiet_period(),
            events_tx.clone(),
        );
        let monitors = StatusMonitors::new(
            events_tx.clone(),
            prefs.connection_poll_interval(),
            prefs.login_poll_interval(),
            prefs.probe_timeout(),
        );
        let guardian = MemoryGuardian::new(
            events_tx.clone(),
            prefs.memory_sample_interval(),
            prefs.memory_soft_limit_mib,
            prefs.memory_hard_limit_mib,
            prefs.memory_auto_cleanup,
        );
        Self {
            prefs,
            window,
            factory,
            accounts,
            active_store,
            sessions: SessionProvider::new(session_backend),
            views: HashMap::new(),
            creation_order: Vec::new(),
            surface_index: HashMap::new(),
            active_account: None,
            crash_counts: HashMap::new(),
            switch_in_flight: false,
            pool,
            layout,
            monitors,
            guardian,
            last_pressure: (MemoryPressureLevel::Unknown, 0, 0),
            events_rx,
            surface_events_tx,
            surface_events_rx,
        }
    }

    /// Spawn the memory guardian worker. Monitors start per account on
    /// switch.
    pub fn start_background(&mut self) {
        self.guardian.start();
    }

    // ---- switching -------------------------------------------------------

    /// Make `id` the active, visible account. Single-flight: a switch in
    /// progress rejects re-entrant calls rather than interleaving
    /// attach/detach of the same surface.
    pub async fn switch_to(
        &mut self,
        id: &AccountId,
        options: SwitchOptions,
    ) -> Result<SwitchOutcome, ShellError> {
        if self.switch_in_flight {
            return Err(ShellError::SwitchInProgress);
        }
        self.switch_in_flight = true;
        let result = self.switch_to_locked(id, options).await;
        self.switch_in_flight = false;
        result
    }

    async fn switch_to_locked(
        &mut self,
        id: &AccountId,
        options: SwitchOptions,
    ) -> Result<SwitchOutcome, ShellError> {
        if self.window.is_destroyed() {
            error!("view_controller: switch requested against a destroyed window");
            return Err(ShellError::WindowDestroyed);
        }
        if self.active_account.as_ref() == Some(id) {
            if let Some(view) = self.views.get_mut(id) {
                view.last_access = Instant::now();
            }
            return Ok(SwitchOutcome {
                account_id: Some(id.clone()),
                already_active: true,
                created: false,
            });
        }

        let mut created = false;
        if !self.views.contains_key(id) {
            if !options.create_if_missing {
                return Err(ShellError::ViewNotMaterialized(id.clone()));
            }
            self.create_view_inner(id).await?;
            created = true;
        }

        let bounds = self.layout.compute_bounds(None, &*self.window)?;
        let surface = {
            let Some(view) = self.views.get(id) else {
                return Err(ShellError::ViewNotMaterialized(id.clone()));
            };
            if !view.surface.is_alive() {
                warn!("view_controller: surface for {id} died before switch");
                return Err(ShellError::Surface(
                    hiveshell_runtime::SurfaceError::Destroyed,
                ));
            }
            view.surface.clone()
        };
        surface.set_bounds(bounds)?;
        self.window.attach(&*surface)?;
        surface.set_visible(true)?;
        self.window.raise(&*surface)?;
        if let Some(view) = self.views.get_mut(id) {
            view.visible = true;
            view.last_bounds = Some(bounds);
            view.last_access = Instant::now();
        }

        // Promote first, then hide the outgoing view, so the window never
        // shows a gap between accounts.
        let previous = self.active_account.replace(id.clone());
        if let Some(previous) = previous.filter(|prev| prev != id) {
            self.hide_view_internal(&previous);
        }

        self.active_store.store(Some(id));
        self.accounts.touch_last_active(id);
        self.ensure_monitors_for(id);
        info!("view_controller: switched to {id} (created: {created})");
        Ok(SwitchOutcome {
            account_id: Some(id.clone()),
            already_active: false,
            created,
        })
    }

    /// Switch to the next materialized view in creation order, wrapping.
    pub async fn switch_to_next(&mut self) -> Result<SwitchOutcome, ShellError> {
        self.switch_by_offset(1).await
    }

    /// Switch to the previous materialized view in creation order, wrapping.
    pub async fn switch_to_previous(&mut self) -> Result<SwitchOutcome, ShellError> {
        self.switch_by_offset(-1).await
    }

    async fn switch_by_offset(&mut self, offset: isize) -> Result<SwitchOutcome, ShellError> {
        if self.creation_order.is_empty() {
            return Ok(SwitchOutcome {
                account_id: None,
                already_active: false,
                created: false,
            });
        }
        let len = self.creation_order.len() as isize;
        let target = match self
            .active_account
            .as_ref()
            .and_then(|id| self.creation_order.iter().position(|x| x == id))
        {
            Some(current) => {
                let index = (current as isize + offset).rem_euclid(len) as usize;
                self.creation_order[index].clone()
            }
            None if offset >= 0 => self.creation_order[0].clone(),
            None => self.creation_order[(len - 1) as usize].clone(),
        };
        self.switch_to(&target, SwitchOptions::default()).await
    }

    /// Switch to the materialized view at `index` in creation order.
    pub async fn switch_by_index(&mut self, index: usize) -> Result<SwitchOutcome, ShellError> {
        let Some(target) = self.creation_order.get(index).cloned() else {
            return Err(ShellError::IndexOutOfRange {
                index,
                len: self.creation_order.len(),
            });
        };
        self.switch_to(&target, SwitchOptions::default()).await
    }

    /// Restore the persisted last-active account at startup. Clears the
    /// persisted value when the account no longer exists.
    pub async fn restore_last_active(&mut self) -> Option<AccountId> {
        let id = self.active_store.load()?;
        if self.accounts.account(&id).is_none() {
            warn!("view_controller: last-active account {id} no longer exists; clearing");
            self.active_store.store(None);
            return None;
        }
        match self.switch_to(&id, SwitchOptions::default()).await {
            Ok(_) => Some(id),
            Err(e) => {
                warn!("view_controller: failed to restore {id}: {e}");
                None
            }
        }
    }

    // ---- creation and teardown ------------------------------------------

    /// Materialize a view for `id` without switching to it. Idempotent.
    pub async fn create_view(&mut self, id: &AccountId) -> Result<(), ShellError> {
        if self.views.contains_key(id) {
            return Ok(());
        }
        self.create_view_inner(id).await
    }

    async fn create_view_inner(&mut self, id: &AccountId) -> Result<(), ShellError> {
        let record = self
            .accounts
            .account(id)
            .ok_or_else(|| ShellError::UnknownAccount(id.clone()))?;

        if self.views.len() >= self.prefs.max_concurrent_views {
            self.evict_for_capacity().await?;
        }

        let session = self.sessions.session_for(id)?;
        if let Some(proxy) = record.proxy.as_ref() {
            let outcome = self.sessions.configure_proxy(id, proxy).await?;
            if outcome.fallback_direct {
                warn!(
                    "view_controller: proxy for {id} fell back to direct: {}",
                    outcome.advisory.as_deref().unwrap_or("unknown")
                );
            }
        }

        let partition = session.partition_key();
        let (surface, reused) = match self.pool.acquire(&partition) {
            Some(entry) => {
                debug!("view_controller: rebinding pooled surface {} to {id}", entry.surface.id());
                (entry.surface, true)
            }
            None => {
                let config = SurfaceConfig {
                    initial_url: self.prefs.app_url.clone(),
                    user_agent: None,
                };
                let surface = self
                    .factory
                    .create_surface(session.clone(), config, self.surface_events_tx.clone())
                    .await?;
                (surface, false)
            }
        };

        // A host runtime substituting its default shared session here would
        // silently merge accounts; catch it before the view exists.
        if surface.partition_key() != partition {
            error!(
                "view_controller: surface for {id} is bound to partition {}, expected {partition}",
                surface.partition_key()
            );
            surface.destroy();
            return Err(ShellError::PartitionMismatch {
                account: id.clone(),
                expected: partition,
                actual: surface.partition_key(),
            });
        }

        let health = ViewHealth::new();
        let view = ViewState {
            account_id: id.clone(),
            surface: surface.clone(),
            session,
            visible: false,
            loaded: false,
            status: ViewStatus::Created,
            last_bounds: None,
            connection: ConnectionStatus::Offline,
            connection_error: None,
            logged_in: None,
            last_load_error: None,
            responsive: true,
            last_access: Instant::now(),
            health,
        };
        if self.views.insert(id.clone(), view).is_some() {
            // Unreachable given the contains_key gates, but uniqueness of
            // the table is an invariant worth a loud trace.
            error!("view_controller: duplicate view state inserted for {id}");
        }
        self.creation_order.push(id.clone());
        self.surface_index.insert(surface.id(), id.clone());
        self.guardian.track(id, surface.clone());

        if let Err(e) = surface.load_url(&self.prefs.app_url) {
            // The view stays materialized and retryable; only the status
            // records the failure.
            warn!("view_controller: initial load for {id} failed: {e}");
            if let Some(view) = self.views.get_mut(id) {
                view.status = ViewStatus::Error;
                view.last_load_error = Some(e.to_string());
            }
        }
        debug!("view_controller: view for {id} materialized (reused: {reused})");
        Ok(())
    }

    /// Hide a view: detach from the window without destroying content or
    /// session. Hiding the active account clears the active pointer.
    pub fn hide_view(&mut self, id: &AccountId) -> Result<(), ShellError> {
        if !self.views.contains_key(id) {
            return Err(ShellError::ViewNotMaterialized(id.clone()));
        }
        self.hide_view_internal(id);
        Ok(())
    }

    fn hide_view_internal(&mut self, id: &AccountId) {
        let Some(view) = self.views.get_mut(id) else {
            return;
        };
        let surface = view.surface.clone();
        view.visible = false;
        if surface.is_alive() {
            if let Err(e) = surface.set_visible(false) {
                warn!("view_controller: hiding {id} failed: {e}");
            }
            if let Err(e) = self.window.detach(&*surface) {
                warn!("view_controller: detaching {id} failed: {e}");
            }
        }
        if self.active_account.as_ref() == Some(id) {
            self.active_account = None;
        }
    }

    /// Destroy a view: hide first, then release the surface and remove the
    /// entry. The session store and its data persist.
    pub async fn destroy_view(&mut self, id: &AccountId) -> Result<(), ShellError> {
        if !self.views.contains_key(id) {
            return Err(ShellError::ViewNotMaterialized(id.clone()));
        }
        self.monitors.stop_account(id);
        self.guardian.untrack(id);
        self.hide_view_internal(id);
        if let Some(view) = self.views.remove(id) {
            self.creation_order.retain(|x| x != id);
            self.surface_index.remove(&view.surface.id());
            view.surface.destroy();
        }
        info!("view_controller: destroyed view for {id}");
        Ok(())
    }

    /// Destroy every materialized view.
    pub async fn destroy_all_views(&mut self) {
        for id in self.creation_order.clone() {
            if let Err(e) = self.destroy_view(&id).await {
                warn!("view_controller: destroying {id} failed: {e}");
            }
        }
    }

    /// Stop all background work, destroy all views, and drain the pool.
    pub async fn shutdown(&mut self) {
        self.monitors.stop_all();
        self.guardian.stop();
        self.layout.cancel_pending();
        self.destroy_all_views().await;
        self.pool.drain();
        info!("view_controller: shut down");
    }

    // ---- eviction --------------------------------------------------------

    /// Recycle the least-recently-used non-active view into the pool to make
    /// room for one more. The active account is never a candidate.
    async fn evict_for_capacity(&mut self) -> Result<(), ShellError> {
        let candidates: Vec<(AccountId, Instant)> = self
            .creation_order
            .iter()
            .filter_map(|id| {
                self.views
                    .get(id)
                    .map(|view| (id.clone(), view.last_access))
            })
            .collect();
        let Some(victim) = select_eviction_victim(&candidates, self.active_account.as_ref())
        else {
            warn!("view_controller: capacity reached and no evictable view");
            return Err(ShellError::CapacityExhausted);
        };
        self.recycle_view(&victim).await;
        Ok(())
    }

    /// Move a view's (surface, session) pair into the pool after sanitizing:
    /// monitors stopped, surface hidden, transient storage cleared, content
    /// parked on a neutral blank page. Persistent login cookies survive.
    async fn recycle_view(&mut self, id: &AccountId) {
        self.monitors.stop_account(id);
        self.guardian.untrack(id);
        self.hide_view_internal(id);
        let Some(view) = self.views.remove(id) else {
            return;
        };
        self.creation_order.retain(|x| x != id);
        self.surface_index.remove(&view.surface.id());

        if !view.surface.is_alive() {
            debug!("view_controller: surface for {id} already dead; not pooling");
            return;
        }
        if let Err(e) = view
            .session
            .clear_storage(StorageCategory::TRANSIENT)
            .await
        {
            warn!("view_controller: clearing transient storage for {id} failed: {e}");
        }
        if let Err(e) = view.surface.load_url(NEUTRAL_BLANK_URL) {
            warn!("view_controller: parking surface for {id} failed: {e}");
        }
        info!("view_controller: recycled view for {id} into the pool");
        self.pool.insert(PooledEntry {
            surface: view.surface,
            session: view.session,
            pooled_at: Instant::now(),
            origin: id.clone(),
        });
    }

    /// Destroy stale pooled entries.
    pub fn sweep_pool(&mut self) -> usize {
        self.pool.sweep_stale()
    }

    // ---- geometry --------------------------------------------------------

    /// Apply a sidebar resize. Immediate mode recomputes and applies now;
    /// otherwise the recompute is debounced and applied by the event pump.
    /// Returns whether bounds were applied synchronously.
    pub fn resize(&mut self, sidebar_width: u32, immediate: bool) -> Result<bool, ShellError> {
        if immediate {
            self.layout.cancel_pending();
            self.apply_resize(sidebar_width)?;
            Ok(true)
        } else {
            self.layout.schedule_resize(sidebar_width);
            Ok(false)
        }
    }

    /// Recompute bounds and push them to every materialized view, hidden
    /// ones included, so they are correct the instant they become visible.
    fn apply_resize(&mut self, sidebar_width: u32) -> Result<(), ShellError> {
        let bounds = self
            .layout
            .compute_bounds(Some(sidebar_width), &*self.window)?;
        for view in self.views.values_mut() {
            if !view.surface.is_alive() {
                continue;
            }
            if let Err(e) = view.surface.set_bounds(bounds) {
                warn!(
                    "view_controller: applying bounds to {} failed: {e}",
                    view.account_id
                );
                continue;
            }
            view.last_bounds = Some(bounds);
        }
        Ok(())
    }

    // ---- event pump ------------------------------------------------------

    /// Drain surface lifecycle events and worker events, folding them into
    /// view state. Returns the number of events handled.
    pub fn pump_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.surface_events_rx.try_recv() {
            self.apply_surface_event(event);
            handled += 1;
        }
        let mut pending_resize = None;
        while let Ok(event) = self.events_rx.try_recv() {
            handled += 1;
            if let ShellEvent::ResizeRequested { sidebar_width } = event {
                // Coalesce bursts: only the newest width is applied.
                pending_resize = Some(sidebar_width);
                continue;
            }
            self.apply_shell_event(event);
        }
        if let Some(sidebar_width) = pending_resize
            && let Err(e) = self.apply_resize(sidebar_width)
        {
            warn!("view_controller: debounced resize failed: {e}");
        }
        handled
    }

    fn apply_surface_event(&mut self, event: SurfaceEvent) {
        let Some(id) = self.surface_index.get(&event.surface()).cloned() else {
            debug!("view_controller: event for unmapped {}", event.surface());
            return;
        };
        let Some(view) = self.views.get_mut(&id) else {
            return;
        };
        match event {
            SurfaceEvent::LoadStarted { .. } => {
                view.status = ViewStatus::Loading;
            }
            SurfaceEvent::LoadFinished { .. } => {
                view.status = ViewStatus::Ready;
                view.loaded = true;
                view.last_load_error = None;
                view.health.set_loaded(true);
            }
            SurfaceEvent::LoadFailed { description, .. } => {
                warn!("view_controller: load failed for {id}: {description}");
                view.status = ViewStatus::Error;
                view.loaded = false;
                view.last_load_error = Some(description);
                view.health.set_loaded(false);
            }
            SurfaceEvent::Crashed { reason, .. } => {
                let count = self.crash_counts.entry(id.clone()).or_insert(0);
                *count += 1;
                warn!(
                    "view_controller: surface for {id} crashed ({reason}); crash count {count}"
                );
                view.status = ViewStatus::Error;
                view.loaded = false;
                view.health.set_loaded(false);
            }
            SurfaceEvent::Unresponsive { .. } => {
                warn!("view_controller: surface for {id} is unresponsive");
                view.responsive = false;
            }
            SurfaceEvent::Responsive { .. } => {
                view.responsive = true;
            }
            SurfaceEvent::Navigated { url, .. } => {
                debug!("view_controller: {id} navigated to {url}");
            }
        }
    }

    fn apply_shell_event(&mut self, event: ShellEvent) {
        match event {
            ShellEvent::ConnectionChanged {
                account,
                status,
                error,
            } => {
                if let Some(view) = self.views.get_mut(&account) {
                    debug!("view_controller: {account} connection now {status:?}");
                    view.connection = status;
                    view.connection_error = error;
                }
            }
            ShellEvent::LoginChanged { account, logged_in } => {
                if let Some(view) = self.views.get_mut(&account) {
                    info!("view_controller: {account} login state now {logged_in}");
                    view.logged_in = Some(logged_in);
                }
            }
            ShellEvent::MemoryWarning { account, bytes } => {
                warn!(
                    "view_controller: {account} using {} MiB (soft limit {})",
                    bytes / (1024 * 1024),
                    self.prefs.memory_soft_limit_mib
                );
            }
            ShellEvent::MemoryReloadRequested { account, bytes } => {
                let Some(view) = self.views.get(&account) else {
                    return;
                };
                if !view.surface.is_alive() {
                    return;
                }
                warn!(
                    "view_controller: forcing cache-bypassing reload of {account} ({} MiB)",
                    bytes / (1024 * 1024)
                );
                if let Err(e) = view.surface.reload_bypassing_cache() {
                    warn!("view_controller: forced reload of {account} failed: {e}");
                }
            }
            ShellEvent::MemoryPressureChanged {
                level,
                available_mib,
                total_mib,
            } => {
                info!(
                    "view_controller: system memory pressure {level:?} ({available_mib} MiB free)"
                );
                self.last_pressure = (level, available_mib, total_mib);
            }
            ShellEvent::ResizeRequested { sidebar_width } => {
                if let Err(e) = self.apply_resize(sidebar_width) {
                    warn!("view_controller: resize failed: {e}");
                }
            }
        }
    }

    // ---- monitors --------------------------------------------------------

    fn ensure_monitors_for(&mut self, id: &AccountId) {
        let Some(view) = self.views.get(id) else {
            return;
        };
        if !self.monitors.is_connection_monitoring(id) {
            self.monitors
                .start_connection_monitoring(id, view.surface.clone(), view.health.clone());
        }
        if !self.monitors.is_login_monitoring(id) {
            self.monitors
                .start_login_monitoring(id, view.surface.clone(), view.health.clone());
        }
    }

    /// Start (restarting if running) the connection monitor for an account.
    pub fn start_connection_monitoring(&mut self, id: &AccountId) -> Result<(), ShellError> {
        let Some(view) = self.views.get(id) else {
            return Err(ShellError::ViewNotMaterialized(id.clone()));
        };
        self.monitors
            .start_connection_monitoring(id, view.surface.clone(), view.health.clone());
        Ok(())
    }

    pub fn stop_connection_monitoring(&mut self, id: &AccountId) {
        self.monitors.stop_connection_monitoring(id);
    }

    /// Start (restarting if running) the login monitor for an account.
    pub fn start_login_monitoring(&mut self, id: &AccountId) -> Result<(), ShellError> {
        let Some(view) = self.views.get(id) else {
            return Err(ShellError::ViewNotMaterialized(id.clone()));
        };
        self.monitors
            .start_login_monitoring(id, view.surface.clone(), view.health.clone());
        Ok(())
    }

    pub fn stop_login_monitoring(&mut self, id: &AccountId) {
        self.monitors.stop_login_monitoring(id);
    }

    pub fn stop_all_monitoring(&mut self) {
        self.monitors.stop_all();
    }

    // ---- memory ----------------------------------------------------------

    /// Sample every materialized view plus system pressure.
    pub async fn memory_usage(&self) -> MemoryUsageReport {
        let per_view_bytes = self.guardian.sample_all().await;
        let (level, available_mib, total_mib) = memory_guardian::sample_system_memory();
        MemoryUsageReport {
            per_view_bytes,
            pressure_level: level,
            available_mib,
            total_mib,
        }
    }

    /// On-demand remediation: reload views above the hard limit (or all of
    /// them when aggressive). Reload keeps the account materialized and, if
    /// active, visible.
    pub async fn optimize_memory(&mut self, options: OptimizeOptions) -> OptimizeOutcome {
        let samples = self.guardian.sample_all().await;
        let hard_limit = self.guardian.hard_limit_bytes();
        let mut reloaded = Vec::new();
        for (account, bytes) in &samples {
            if !options.aggressive && *bytes < hard_limit {
                continue;
            }
            let Some(view) = self.views.get(account) else {
                continue;
            };
            if !view.surface.is_alive() {
                continue;
            }
            match view.surface.reload_bypassing_cache() {
                Ok(()) => reloaded.push(account.clone()),
                Err(e) => warn!("view_controller: optimize reload of {account} failed: {e}"),
            }
        }
        info!(
            "view_controller: memory optimization sampled {} views, reloaded {}",
            samples.len(),
            reloaded.len()
        );
        OptimizeOutcome {
            sampled: samples.len(),
            reloaded,
        }
    }

    // ---- queries ---------------------------------------------------------

    pub fn active_account_id(&self) -> Option<&AccountId> {
        self.active_account.as_ref()
    }

    /// Materialized accounts in stable creation order.
    pub fn materialized_accounts(&self) -> &[AccountId] {
        &self.creation_order
    }

    pub fn view_snapshot(&self, id: &AccountId) -> Option<ViewStateSnapshot> {
        let view = self.views.get(id)?;
        Some(ViewStateSnapshot {
            account_id: view.account_id.clone(),
            status: view.status,
            visible: view.visible,
            loaded: view.loaded,
            connection: view.connection,
            connection_error: view.connection_error.clone(),
            logged_in: view.logged_in,
            last_load_error: view.last_load_error.clone(),
            responsive: view.responsive,
            crash_count: self.crash_count(id),
            last_bounds: view.last_bounds,
            partition_key: view.session.partition_key(),
        })
    }

    pub fn connection_status(&self, id: &AccountId) -> Option<(ConnectionStatus, Option<String>)> {
        self.views
            .get(id)
            .map(|view| (view.connection, view.connection_error.clone()))
    }

    pub fn login_status(&self, id: &AccountId) -> Option<Option<bool>> {
        self.views.get(id).map(|view| view.logged_in)
    }

    pub fn crash_count(&self, id: &AccountId) -> u32 {
        self.crash_counts.get(id).copied().unwrap_or(0)
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_connection_monitoring(&self, id: &AccountId) -> bool {
        self.monitors.is_connection_monitoring(id)
    }

    pub fn is_login_monitoring(&self, id: &AccountId) -> bool {
        self.monitors.is_login_monitoring(id)
    }

    /// Session isolation provider, for proxy and storage operations driven
    /// by the account-configuration layer.
    pub fn sessions_mut(&mut self) -> &mut SessionProvider {
        &mut self.sessions
    }

    pub fn last_pressure(&self) -> (MemoryPressureLevel, u64, u64) {
        self.last_pressure
    }

    #[cfg(test)]
    pub(crate) fn view_count(&self) -> usize {
        self.views.len()
    }

    #[cfg(test)]
    pub(crate) fn visible_accounts(&self) -> Vec<AccountId> {
        self.views
            .values()
            .filter(|view| view.visible)
            .map(|view| view.account_id.clone())
            .collect()
    }
}

/// Pick the eviction victim: the oldest last-access timestamp among
/// candidates, excluding the active account; ties fall to the earliest
/// candidate (creation order). Pure so the exclusion property can be checked
/// exhaustively.
fn select_eviction_victim<T: Ord + Copy>(
    candidates: &[(AccountId, T)],
    active: Option<&AccountId>,
) -> Option<AccountId> {
    let mut victim: Option<(&AccountId, T)> = None;
    for (id, last_access) in candidates {
        if active == Some(id) {
            continue;
        }
        match &victim {
            Some((_, best)) if *last_access >= *best => {}
            _ => victim = Some((id, *last_access)),
        }
    }
    victim.map(|(id, _)| id.clone())
}
