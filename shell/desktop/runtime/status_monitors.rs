/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Per-account status polling.
//!
//! Two independent interval loops per account — connection and login — each
//! a supervised tokio task with its own cancellation token. A loop skips a
//! tick when the view is not loaded or its surface is gone, probes with a
//! bounded wait, and emits a [`ShellEvent`] only when the derived status
//! differs from the last one it saw. Stopping is always "cancel the stored
//! handle", per monitor, per account, or globally.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use hiveshell_core::{AccountId, ConnectionStatus};
use hiveshell_runtime::RenderSurface;

use crate::services::sessions::probe;
use crate::shell::desktop::runtime::events::ShellEvent;

/// Shared load-state flag for one view, updated by the controller from
/// surface lifecycle events and read by monitor workers.
#[derive(Default)]
pub struct ViewHealth {
    loaded: AtomicBool,
}

impl ViewHealth {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_loaded(&self, loaded: bool) {
        self.loaded.store(loaded, Ordering::SeqCst);
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }
}

struct MonitorHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    fn stop(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

pub struct StatusMonitors {
    connection: HashMap<AccountId, MonitorHandle>,
    login: HashMap<AccountId, MonitorHandle>,
    events_tx: UnboundedSender<ShellEvent>,
    connection_interval: Duration,
    login_interval: Duration,
    probe_timeout: Duration,
}

impl StatusMonitors {
    pub fn new(
        events_tx: UnboundedSender<ShellEvent>,
        connection_interval: Duration,
        login_interval: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            connection: HashMap::new(),
            login: HashMap::new(),
            events_tx,
            connection_interval,
            login_interval,
            probe_timeout,
        }
    }

    /// Start (or restart) the connection monitor for an account.
    pub fn start_connection_monitoring(
        &mut self,
        account: &AccountId,
        surface: Arc<dyn RenderSurface>,
        health: Arc<ViewHealth>,
    ) {
        if let Some(existing) = self.connection.remove(account) {
            existing.stop();
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(connection_monitor_worker(
            account.clone(),
            surface,
            health,
            self.events_tx.clone(),
            self.connection_interval,
            self.probe_timeout,
            cancel.clone(),
        ));
        self.connection
            .insert(account.clone(), MonitorHandle { cancel, task });
        debug!("status_monitors: connection monitor started for {account}");
    }

    /// Start (or restart) the login monitor for an account.
    pub fn start_login_monitoring(
        &mut self,
        account: &AccountId,
        surface: Arc<dyn RenderSurface>,
        health: Arc<ViewHealth>,
    ) {
        if let Some(existing) = self.login.remove(account) {
            existing.stop();
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(login_monitor_worker(
            account.clone(),
            surface,
            health,
            self.events_tx.clone(),
            self.login_interval,
            self.probe_timeout,
            cancel.clone(),
        ));
        self.login
            .insert(account.clone(), MonitorHandle { cancel, task });
        debug!("status_monitors: login monitor started for {account}");
    }

    pub fn stop_connection_monitoring(&mut self, account: &AccountId) {
        if let Some(handle) = self.connection.remove(account) {
            handle.stop();
            debug!("status_monitors: connection monitor stopped for {account}");
        }
    }

    pub fn stop_login_monitoring(&mut self, account: &AccountId) {
        if let Some(handle) = self.login.remove(account) {
            handle.stop();
            debug!("status_monitors: login monitor stopped for {account}");
        }
    }

    /// Stop both monitors for one account.
    pub fn stop_account(&mut self, account: &AccountId) {
        self.stop_connection_monitoring(account);
        self.stop_login_monitoring(account);
    }

    /// Cancel every outstanding monitor task.
    pub fn stop_all(&mut self) {
        let count = self.connection.len() + self.login.len();
        for (_, handle) in self.connection.drain() {
            handle.stop();
        }
        for (_, handle) in self.login.drain() {
            handle.stop();
        }
        if count > 0 {
            debug!("status_monitors: stopped {count} monitors");
        }
    }

    pub fn is_connection_monitoring(&self, account: &AccountId) -> bool {
        self.connection.contains_key(account)
    }

    pub fn is_login_monitoring(&self, account: &AccountId) -> bool {
        self.login.contains_key(account)
    }

    pub fn active_monitor_count(&self) -> usize {
        self.connection.len() + self.login.len()
    }
}

impl Drop for StatusMonitors {
    fn drop(&mut self) {
        self.stop_all();
    }
}

async fn connection_monitor_worker(
    account: AccountId,
    surface: Arc<dyn RenderSurface>,
    health: Arc<ViewHealth>,
    events_tx: UnboundedSender<ShellEvent>,
    interval: Duration,
    probe_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last: Option<ConnectionStatus> = None;
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("status_monitors: connection monitor cancelled for {account}");
                break;
            }

            _ = ticker.tick() => {
                if !health.is_loaded() || !surface.is_alive() {
                    continue;
                }
                let (status, error) = probe::probe_connection(&surface, probe_timeout).await;
                if last != Some(status) {
                    last = Some(status);
                    let _ = events_tx.send(ShellEvent::ConnectionChanged {
                        account: account.clone(),
                        status,
                        error,
                    });
                }
            }
        }
    }
}

async fn login_monitor_worker(
    account: AccountId,
    surface: Arc<dyn RenderSurface>,
    health: Arc<ViewHealth>,
    events_tx: UnboundedSender<ShellEvent>,
    interval: Duration,
    probe_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last: Option<bool> = None;
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("status_monitors: login monitor cancelled for {account}");
                break;
            }

            _ = ticker.tick() => {
                if !health.is_loaded() || !surface.is_alive() {
                    continue;
                }
                let logged_in = probe::probe_login(&surface, probe_timeout).await;
                if last != Some(logged_in) {
                    last = Some(logged_in);
                    let _ = events_tx.send(ShellEvent::LoginChanged {
                        account: account.clone(),
                        logged_in,
                    });
                }
            }
        }
    }
}
