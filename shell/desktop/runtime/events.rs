/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Shell event queue.
//!
//! Background workers (status monitors, memory guardian, the resize
//! debouncer) never touch the view map directly; they emit [`ShellEvent`]s on
//! an unbounded channel that the view controller drains on its own task. The
//! controller stays the single writer of all view state.

use hiveshell_core::{AccountId, ConnectionStatus, MemoryPressureLevel};

/// Event from a background worker, applied by the view controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellEvent {
    /// Connection probe observed a transition. Edge-triggered: the worker
    /// compares against its last known status before emitting.
    ConnectionChanged {
        account: AccountId,
        status: ConnectionStatus,
        error: Option<String>,
    },
    /// Login probe observed a transition. Edge-triggered.
    LoginChanged {
        account: AccountId,
        logged_in: bool,
    },
    /// A view crossed the soft memory threshold.
    MemoryWarning {
        account: AccountId,
        bytes: u64,
    },
    /// A view crossed the hard memory threshold with auto-cleanup enabled;
    /// the controller performs the cache-bypassing reload.
    MemoryReloadRequested {
        account: AccountId,
        bytes: u64,
    },
    /// System-level memory pressure changed level. Advisory.
    MemoryPressureChanged {
        level: MemoryPressureLevel,
        available_mib: u64,
        total_mib: u64,
    },
    /// A debounced resize fired; apply new bounds to every materialized
    /// view.
    ResizeRequested {
        sidebar_width: u32,
    },
}
