/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Host-window and configuration-store boundaries.
//!
//! The window chrome, the account-configuration store, and the persisted
//! last-active-account value are external collaborators. The shell consumes
//! them through these traits and never reaches past them.

use hiveshell_core::{AccountId, AccountRecord};
use thiserror::Error;

use crate::geometry::WindowSize;
use crate::surface::RenderSurface;

#[derive(Debug, Clone, Error)]
pub enum WindowError {
    #[error("host window has been destroyed")]
    Destroyed,
    #[error("host window error: {0}")]
    Backend(String),
}

/// The single visible window all account views share.
pub trait HostWindow: Send + Sync {
    fn content_size(&self) -> WindowSize;

    fn sidebar_width(&self) -> u32;

    /// Mount a surface into the window's content area.
    fn attach(&self, surface: &dyn RenderSurface) -> Result<(), WindowError>;

    /// Bring an attached surface to the top of the stacking order.
    fn raise(&self, surface: &dyn RenderSurface) -> Result<(), WindowError>;

    /// Unmount a surface without destroying it.
    fn detach(&self, surface: &dyn RenderSurface) -> Result<(), WindowError>;

    fn is_destroyed(&self) -> bool;
}

/// Read-mostly view of the account-configuration store.
pub trait AccountDirectory: Send + Sync {
    fn account(&self, id: &AccountId) -> Option<AccountRecord>;

    /// All account ids in the store's stable display order.
    fn list_ordered(&self) -> Vec<AccountId>;

    /// Record that the account was just used. Fire-and-forget.
    fn touch_last_active(&self, id: &AccountId);
}

/// Persisted "last active account id" value. Read once at startup, written on
/// every successful switch.
pub trait ActiveAccountStore: Send + Sync {
    fn load(&self) -> Option<AccountId>;

    fn store(&self, id: Option<&AccountId>);
}
