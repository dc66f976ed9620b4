/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Deterministic in-memory engine.
//!
//! Every collaborator the shell consumes has an instrumented double here:
//! surfaces record loads and bounds, sessions record proxy and clear calls,
//! the window counts attach/detach/raise. Failure injection flags let tests
//! drive the soft-failure paths without a real engine.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use hiveshell_core::{AccountId, AccountRecord, ProxyRules};
use hiveshell_runtime::{
    AccountDirectory, ActiveAccountStore, HostWindow, Rect, RenderSurface, SessionBackend,
    SessionError, SessionStore, StorageCategory, SurfaceConfig, SurfaceError, SurfaceEvent,
    SurfaceFactory, SurfaceId, WindowError, WindowSize,
};

/// In-memory session store. Proxy and clear operations are recorded rather
/// than performed.
pub struct MemorySession {
    partition: String,
    path: PathBuf,
    proxy: Mutex<Option<ProxyRules>>,
    cleared: Mutex<Vec<Vec<StorageCategory>>>,
    stored_data: AtomicBool,
    fail_proxy_apply: AtomicBool,
}

impl MemorySession {
    pub fn applied_proxy(&self) -> Option<ProxyRules> {
        self.proxy.lock().clone()
    }

    /// History of `clear_storage` calls, newest last.
    pub fn clear_calls(&self) -> Vec<Vec<StorageCategory>> {
        self.cleared.lock().clone()
    }

    pub fn set_stored_data(&self, present: bool) {
        self.stored_data.store(present, Ordering::SeqCst);
    }

    /// Make the next (and every later) proxy application fail, to exercise
    /// the fallback-to-direct policy.
    pub fn set_fail_proxy_apply(&self, fail: bool) {
        self.fail_proxy_apply.store(fail, Ordering::SeqCst);
    }
}

impl SessionStore for MemorySession {
    fn partition_key(&self) -> String {
        self.partition.clone()
    }

    fn storage_path(&self) -> PathBuf {
        self.path.clone()
    }

    fn apply_proxy(
        &self,
        rules: Option<ProxyRules>,
    ) -> BoxFuture<'static, Result<(), SessionError>> {
        let result = if rules.is_some() && self.fail_proxy_apply.load(Ordering::SeqCst) {
            Err(SessionError::ProxyApply("injected proxy failure".to_string()))
        } else {
            *self.proxy.lock() = rules;
            Ok(())
        };
        Box::pin(async move { result })
    }

    fn clear_storage(
        &self,
        categories: &[StorageCategory],
    ) -> BoxFuture<'static, Result<(), SessionError>> {
        self.cleared.lock().push(categories.to_vec());
        if categories.contains(&StorageCategory::Cookies) {
            self.stored_data.store(false, Ordering::SeqCst);
        }
        Box::pin(async move { Ok(()) })
    }

    fn has_stored_data(&self) -> BoxFuture<'static, Result<bool, SessionError>> {
        let present = self.stored_data.load(Ordering::SeqCst);
        Box::pin(async move { Ok(present) })
    }
}

/// Idempotent opener for [`MemorySession`] stores rooted under one directory.
pub struct MemorySessionBackend {
    root: PathBuf,
    opened: Mutex<HashMap<String, Arc<MemorySession>>>,
}

impl MemorySessionBackend {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            opened: Mutex::new(HashMap::new()),
        }
    }

    pub fn session(&self, partition_key: &str) -> Option<Arc<MemorySession>> {
        self.opened.lock().get(partition_key).cloned()
    }
}

impl SessionBackend for MemorySessionBackend {
    fn open(&self, partition_key: &str) -> Result<Arc<dyn SessionStore>, SessionError> {
        let mut opened = self.opened.lock();
        if let Some(existing) = opened.get(partition_key) {
            return Ok(existing.clone());
        }
        let dir_name = partition_key.replace(':', "-");
        let session = Arc::new(MemorySession {
            partition: partition_key.to_string(),
            path: self.root.join(dir_name),
            proxy: Mutex::new(None),
            cleared: Mutex::new(Vec::new()),
            stored_data: AtomicBool::new(false),
            fail_proxy_apply: AtomicBool::new(false),
        });
        opened.insert(partition_key.to_string(), session.clone());
        Ok(session)
    }
}

/// In-memory rendering surface with scripted probe results.
pub struct MemorySurface {
    id: SurfaceId,
    partition: String,
    alive: AtomicBool,
    visible: AtomicBool,
    bounds: Mutex<Option<Rect>>,
    current_url: Mutex<Option<String>>,
    memory_bytes: AtomicU64,
    load_count: AtomicUsize,
    reload_count: AtomicUsize,
    fail_next_load: AtomicBool,
    eval_delay: Mutex<Option<Duration>>,
    scripted: Mutex<HashMap<String, VecDeque<Result<serde_json::Value, String>>>>,
    default_results: Mutex<HashMap<String, serde_json::Value>>,
    events: UnboundedSender<SurfaceEvent>,
}

impl MemorySurface {
    pub fn current_url(&self) -> Option<String> {
        self.current_url.lock().clone()
    }

    pub fn bounds(&self) -> Option<Rect> {
        *self.bounds.lock()
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }

    pub fn reload_count(&self) -> usize {
        self.reload_count.load(Ordering::SeqCst)
    }

    pub fn set_memory_usage(&self, bytes: u64) {
        self.memory_bytes.store(bytes, Ordering::SeqCst);
    }

    pub fn set_fail_next_load(&self) {
        self.fail_next_load.store(true, Ordering::SeqCst);
    }

    /// Artificial latency for every script evaluation, for timeout tests.
    pub fn set_eval_delay(&self, delay: Duration) {
        *self.eval_delay.lock() = Some(delay);
    }

    /// Queue a one-shot result for an exact script.
    pub fn push_script_result(&self, script: &str, result: Result<serde_json::Value, String>) {
        self.scripted
            .lock()
            .entry(script.to_string())
            .or_default()
            .push_back(result);
    }

    /// Standing result for an exact script, used when the one-shot queue for
    /// it is empty.
    pub fn set_default_script_result(&self, script: &str, value: serde_json::Value) {
        self.default_results
            .lock()
            .insert(script.to_string(), value);
    }

    /// Deliver a crash event as the engine would.
    pub fn inject_crash(&self, reason: &str) {
        let _ = self.events.send(SurfaceEvent::Crashed {
            surface: self.id,
            reason: reason.to_string(),
        });
    }

    pub fn inject_unresponsive(&self) {
        let _ = self.events.send(SurfaceEvent::Unresponsive { surface: self.id });
    }

    pub fn inject_responsive(&self) {
        let _ = self.events.send(SurfaceEvent::Responsive { surface: self.id });
    }
}

impl RenderSurface for MemorySurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn partition_key(&self) -> String {
        self.partition.clone()
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn load_url(&self, url: &str) -> Result<(), SurfaceError> {
        if !self.is_alive() {
            return Err(SurfaceError::Destroyed);
        }
        self.load_count.fetch_add(1, Ordering::SeqCst);
        *self.current_url.lock() = Some(url.to_string());
        let _ = self.events.send(SurfaceEvent::LoadStarted { surface: self.id });
        if self.fail_next_load.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(SurfaceEvent::LoadFailed {
                surface: self.id,
                description: "injected load failure".to_string(),
            });
        } else {
            let _ = self.events.send(SurfaceEvent::Navigated {
                surface: self.id,
                url: url.to_string(),
            });
            let _ = self.events.send(SurfaceEvent::LoadFinished { surface: self.id });
        }
        Ok(())
    }

    fn reload_bypassing_cache(&self) -> Result<(), SurfaceError> {
        if !self.is_alive() {
            return Err(SurfaceError::Destroyed);
        }
        self.reload_count.fetch_add(1, Ordering::SeqCst);
        let _ = self.events.send(SurfaceEvent::LoadStarted { surface: self.id });
        let _ = self.events.send(SurfaceEvent::LoadFinished { surface: self.id });
        Ok(())
    }

    fn set_bounds(&self, bounds: Rect) -> Result<(), SurfaceError> {
        if !self.is_alive() {
            return Err(SurfaceError::Destroyed);
        }
        *self.bounds.lock() = Some(bounds);
        Ok(())
    }

    fn set_visible(&self, visible: bool) -> Result<(), SurfaceError> {
        if !self.is_alive() {
            return Err(SurfaceError::Destroyed);
        }
        self.visible.store(visible, Ordering::SeqCst);
        Ok(())
    }

    fn evaluate_script(
        &self,
        script: &str,
    ) -> BoxFuture<'static, Result<serde_json::Value, SurfaceError>> {
        if !self.is_alive() {
            return Box::pin(async { Err(SurfaceError::Destroyed) });
        }
        let delay = *self.eval_delay.lock();
        let queued = self
            .scripted
            .lock()
            .get_mut(script)
            .and_then(|queue| queue.pop_front());
        let result = match queued {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(SurfaceError::Evaluation(message)),
            None => match self.default_results.lock().get(script) {
                Some(value) => Ok(value.clone()),
                None => Err(SurfaceError::Evaluation(format!(
                    "no scripted result for {script:?}"
                ))),
            },
        };
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }

    fn memory_usage_bytes(&self) -> BoxFuture<'static, Result<u64, SurfaceError>> {
        if !self.is_alive() {
            return Box::pin(async { Err(SurfaceError::Destroyed) });
        }
        let bytes = self.memory_bytes.load(Ordering::SeqCst);
        Box::pin(async move { Ok(bytes) })
    }

    fn destroy(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

/// Factory producing [`MemorySurface`] instances.
#[derive(Default)]
pub struct MemorySurfaceFactory {
    created: Mutex<Vec<Arc<MemorySurface>>>,
    fail_next_create: AtomicBool,
    /// When set, built surfaces report this partition instead of the bound
    /// session's. Exercises the partition-substitution defense.
    substitute_partition: Mutex<Option<String>>,
}

impl MemorySurfaceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }

    /// Most recently created surface, if any.
    pub fn last_surface(&self) -> Option<Arc<MemorySurface>> {
        self.created.lock().last().cloned()
    }

    pub fn surface_by_id(&self, id: SurfaceId) -> Option<Arc<MemorySurface>> {
        self.created.lock().iter().find(|s| s.id == id).cloned()
    }

    /// Every surface this factory has built, in creation order.
    pub fn surfaces(&self) -> Vec<Arc<MemorySurface>> {
        self.created.lock().clone()
    }

    pub fn set_fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    pub fn set_substitute_partition(&self, partition: Option<&str>) {
        *self.substitute_partition.lock() = partition.map(str::to_string);
    }
}

impl SurfaceFactory for MemorySurfaceFactory {
    fn create_surface(
        &self,
        session: Arc<dyn SessionStore>,
        _config: SurfaceConfig,
        events: UnboundedSender<SurfaceEvent>,
    ) -> BoxFuture<'static, Result<Arc<dyn RenderSurface>, SurfaceError>> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Box::pin(async { Err(SurfaceError::Backend("injected creation failure".into())) });
        }
        let partition = self
            .substitute_partition
            .lock()
            .clone()
            .unwrap_or_else(|| session.partition_key());
        let surface = Arc::new(MemorySurface {
            id: SurfaceId::next(),
            partition,
            alive: AtomicBool::new(true),
            visible: AtomicBool::new(false),
            bounds: Mutex::new(None),
            current_url: Mutex::new(None),
            memory_bytes: AtomicU64::new(0),
            load_count: AtomicUsize::new(0),
            reload_count: AtomicUsize::new(0),
            fail_next_load: AtomicBool::new(false),
            eval_delay: Mutex::new(None),
            scripted: Mutex::new(HashMap::new()),
            default_results: Mutex::new(HashMap::new()),
            events,
        });
        self.created.lock().push(surface.clone());
        Box::pin(async move { Ok(surface as Arc<dyn RenderSurface>) })
    }
}

/// Instrumented host window.
pub struct MemoryWindow {
    size: Mutex<WindowSize>,
    sidebar: AtomicU32,
    destroyed: AtomicBool,
    attached: Mutex<Vec<SurfaceId>>,
    attach_count: AtomicUsize,
    detach_count: AtomicUsize,
    raise_count: AtomicUsize,
}

impl MemoryWindow {
    pub fn new(width: u32, height: u32, sidebar: u32) -> Self {
        Self {
            size: Mutex::new(WindowSize::new(width, height)),
            sidebar: AtomicU32::new(sidebar),
            destroyed: AtomicBool::new(false),
            attached: Mutex::new(Vec::new()),
            attach_count: AtomicUsize::new(0),
            detach_count: AtomicUsize::new(0),
            raise_count: AtomicUsize::new(0),
        }
    }

    pub fn set_content_size(&self, width: u32, height: u32) {
        *self.size.lock() = WindowSize::new(width, height);
    }

    pub fn set_sidebar_width(&self, width: u32) {
        self.sidebar.store(width, Ordering::SeqCst);
    }

    pub fn mark_destroyed(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }

    pub fn attached_surfaces(&self) -> Vec<SurfaceId> {
        self.attached.lock().clone()
    }

    pub fn attach_count(&self) -> usize {
        self.attach_count.load(Ordering::SeqCst)
    }

    pub fn detach_count(&self) -> usize {
        self.detach_count.load(Ordering::SeqCst)
    }

    pub fn raise_count(&self) -> usize {
        self.raise_count.load(Ordering::SeqCst)
    }
}

impl HostWindow for MemoryWindow {
    fn content_size(&self) -> WindowSize {
        *self.size.lock()
    }

    fn sidebar_width(&self) -> u32 {
        self.sidebar.load(Ordering::SeqCst)
    }

    fn attach(&self, surface: &dyn RenderSurface) -> Result<(), WindowError> {
        if self.is_destroyed() {
            return Err(WindowError::Destroyed);
        }
        let mut attached = self.attached.lock();
        if !attached.contains(&surface.id()) {
            attached.push(surface.id());
        }
        self.attach_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn raise(&self, surface: &dyn RenderSurface) -> Result<(), WindowError> {
        if self.is_destroyed() {
            return Err(WindowError::Destroyed);
        }
        let mut attached = self.attached.lock();
        attached.retain(|id| *id != surface.id());
        attached.push(surface.id());
        self.raise_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn detach(&self, surface: &dyn RenderSurface) -> Result<(), WindowError> {
        if self.is_destroyed() {
            return Err(WindowError::Destroyed);
        }
        self.attached.lock().retain(|id| *id != surface.id());
        self.detach_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

/// In-memory account directory in insertion order.
#[derive(Default)]
pub struct MemoryAccountDirectory {
    records: Mutex<Vec<AccountRecord>>,
    touched: Mutex<Vec<AccountId>>,
}

impl MemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, record: AccountRecord) {
        self.records.lock().push(record);
    }

    pub fn remove(&self, id: &AccountId) {
        self.records.lock().retain(|r| r.id != *id);
    }

    pub fn touched(&self) -> Vec<AccountId> {
        self.touched.lock().clone()
    }
}

impl AccountDirectory for MemoryAccountDirectory {
    fn account(&self, id: &AccountId) -> Option<AccountRecord> {
        self.records.lock().iter().find(|r| r.id == *id).cloned()
    }

    fn list_ordered(&self) -> Vec<AccountId> {
        self.records.lock().iter().map(|r| r.id.clone()).collect()
    }

    fn touch_last_active(&self, id: &AccountId) {
        self.touched.lock().push(id.clone());
    }
}

/// In-memory last-active-account store.
#[derive(Default)]
pub struct MemoryActiveAccountStore {
    value: Mutex<Option<AccountId>>,
}

impl MemoryActiveAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(id: AccountId) -> Self {
        Self {
            value: Mutex::new(Some(id)),
        }
    }
}

impl ActiveAccountStore for MemoryActiveAccountStore {
    fn load(&self) -> Option<AccountId> {
        self.value.lock().clone()
    }

    fn store(&self, id: Option<&AccountId>) {
        *self.value.lock() = id.cloned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn backend_open_is_idempotent_per_partition() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = MemorySessionBackend::new(dir.path());
        let a = backend.open("persist:account-a").expect("open");
        let b = backend.open("persist:account-a").expect("open again");
        assert_eq!(a.partition_key(), b.partition_key());
        assert_eq!(a.storage_path(), b.storage_path());
        assert_eq!(backend.opened.lock().len(), 1);
    }

    #[tokio::test]
    async fn surface_load_emits_started_and_finished() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = MemorySessionBackend::new(dir.path());
        let session = backend.open("persist:account-a").expect("open");
        let factory = MemorySurfaceFactory::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let surface = factory
            .create_surface(session, SurfaceConfig::default(), tx)
            .await
            .expect("create");
        surface.load_url("https://web.example.com/").expect("load");
        assert!(matches!(rx.recv().await, Some(SurfaceEvent::LoadStarted { .. })));
        assert!(matches!(rx.recv().await, Some(SurfaceEvent::Navigated { .. })));
        assert!(matches!(rx.recv().await, Some(SurfaceEvent::LoadFinished { .. })));
    }

    #[tokio::test]
    async fn destroyed_surface_soft_fails_every_operation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = MemorySessionBackend::new(dir.path());
        let session = backend.open("persist:account-a").expect("open");
        let factory = MemorySurfaceFactory::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let surface = factory
            .create_surface(session, SurfaceConfig::default(), tx)
            .await
            .expect("create");
        surface.destroy();
        assert!(!surface.is_alive());
        assert!(matches!(
            surface.load_url("https://web.example.com/"),
            Err(SurfaceError::Destroyed)
        ));
        assert!(matches!(
            surface.evaluate_script("1 + 1").await,
            Err(SurfaceError::Destroyed)
        ));
    }
}
