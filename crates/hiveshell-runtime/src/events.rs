/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Lifecycle events emitted by rendering surfaces.
//!
//! Engines deliver these on the channel handed to
//! [`crate::surface::SurfaceFactory::create_surface`]; the shell core maps
//! surface ids back to accounts and folds the events into view state.

use crate::surface::SurfaceId;

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    LoadStarted {
        surface: SurfaceId,
    },
    LoadFinished {
        surface: SurfaceId,
    },
    LoadFailed {
        surface: SurfaceId,
        description: String,
    },
    /// The renderer process behind the surface went away.
    Crashed {
        surface: SurfaceId,
        reason: String,
    },
    Unresponsive {
        surface: SurfaceId,
    },
    Responsive {
        surface: SurfaceId,
    },
    Navigated {
        surface: SurfaceId,
        url: String,
    },
}

impl SurfaceEvent {
    pub fn surface(&self) -> SurfaceId {
        match self {
            Self::LoadStarted { surface }
            | Self::LoadFinished { surface }
            | Self::LoadFailed { surface, .. }
            | Self::Crashed { surface, .. }
            | Self::Unresponsive { surface }
            | Self::Responsive { surface }
            | Self::Navigated { surface, .. } => *surface,
        }
    }
}
