/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Rendering-surface capability.
//!
//! A surface is analogous to a sandboxed browser tab: it is bound to exactly
//! one session store at construction time and stays bound for its whole life.
//! Every operation on a destroyed surface is a soft failure
//! ([`SurfaceError::Destroyed`]); callers log and move on, since the surface
//! may have been torn down concurrently by a user action.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::events::SurfaceEvent;
use crate::geometry::Rect;
use crate::session::SessionStore;

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for a rendering surface instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(u64);

impl SurfaceId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

#[derive(Debug, Clone, Error)]
pub enum SurfaceError {
    #[error("surface has been destroyed")]
    Destroyed,
    #[error("script evaluation failed: {0}")]
    Evaluation(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("surface backend error: {0}")]
    Backend(String),
}

/// Construction parameters for a new surface.
#[derive(Debug, Clone, Default)]
pub struct SurfaceConfig {
    /// URL to load once the surface exists.
    pub initial_url: String,
    /// Optional user-agent override.
    pub user_agent: Option<String>,
}

/// An isolated, embeddable rendering surface.
pub trait RenderSurface: Send + Sync {
    fn id(&self) -> SurfaceId;

    /// Partition key of the session store this surface was built against.
    /// Used to verify post-construction that no host-runtime default session
    /// was silently substituted.
    fn partition_key(&self) -> String;

    /// False once the surface has been destroyed (by us or by the host).
    fn is_alive(&self) -> bool;

    fn load_url(&self, url: &str) -> Result<(), SurfaceError>;

    /// Cache-bypassing reload, used by memory remediation.
    fn reload_bypassing_cache(&self) -> Result<(), SurfaceError>;

    fn set_bounds(&self, bounds: Rect) -> Result<(), SurfaceError>;

    fn set_visible(&self, visible: bool) -> Result<(), SurfaceError>;

    /// Evaluate a read-only script in the surface's content and return its
    /// JSON result.
    fn evaluate_script(&self, script: &str)
    -> BoxFuture<'static, Result<serde_json::Value, SurfaceError>>;

    /// Approximate memory attributed to this surface, in bytes.
    fn memory_usage_bytes(&self) -> BoxFuture<'static, Result<u64, SurfaceError>>;

    /// Release the surface. Idempotent; all later operations return
    /// [`SurfaceError::Destroyed`].
    fn destroy(&self);
}

/// Engine-side constructor for surfaces.
pub trait SurfaceFactory: Send + Sync {
    /// Build a surface bound to `session`. Lifecycle events (load
    /// start/finish/fail, crash, responsiveness, navigation) are delivered on
    /// `events` for the surface's whole life.
    fn create_surface(
        &self,
        session: Arc<dyn SessionStore>,
        config: SurfaceConfig,
        events: UnboundedSender<SurfaceEvent>,
    ) -> BoxFuture<'static, Result<Arc<dyn RenderSurface>, SurfaceError>>;
}
