/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Hiveshell hosts several isolated instances of the same web application —
//! one per account — inside a single desktop window. The crate's core is the
//! per-account view and session lifecycle manager: bounded lazy view
//! creation, LRU recycling through a sanitized pool, cached and debounced
//! layout, per-account health monitors, and a memory guardian, all over
//! strictly isolated session stores.

pub mod engine;
pub mod error;
pub mod prefs;
pub mod services;
pub mod shell;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use error::ShellError;
pub use prefs::AppPreferences;
pub use shell::desktop::lifecycle::view_controller::{
    MemoryUsageReport, OptimizeOptions, OptimizeOutcome, SwitchOptions, SwitchOutcome,
    ViewController, ViewStateSnapshot,
};
pub use shell::desktop::runtime::commands;
