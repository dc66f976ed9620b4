/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Portable runtime boundary traits for Hiveshell hosts.
//!
//! The shell core drives opaque capabilities: a rendering surface that can
//! load a URL, run script, and report lifecycle events; a session store that
//! holds one account's isolated cookies/storage and network identity; and the
//! host window the surfaces are mounted into. Concrete engines implement
//! these traits on the embedder side; the core never names an engine type.

pub mod events;
pub mod geometry;
pub mod session;
pub mod surface;
pub mod window;

pub use events::SurfaceEvent;
pub use geometry::{Rect, WindowSize};
pub use session::{SessionBackend, SessionError, SessionStore, StorageCategory};
pub use surface::{RenderSurface, SurfaceConfig, SurfaceError, SurfaceFactory, SurfaceId};
pub use window::{AccountDirectory, ActiveAccountStore, HostWindow, WindowError};
