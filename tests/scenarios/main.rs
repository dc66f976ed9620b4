/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! End-to-end scenarios over the in-memory engine, driven exclusively
//! through the crate's public API.

use std::sync::Arc;
use std::time::Duration;

use hiveshell::engine::memory::{
    MemoryAccountDirectory, MemoryActiveAccountStore, MemorySessionBackend, MemorySurface,
    MemorySurfaceFactory, MemoryWindow,
};
use hiveshell::services::sessions::probe;
use hiveshell::{AppPreferences, ViewController, commands};
use hiveshell_core::{AccountId, AccountRecord, ConnectionStatus, ProxyConfig, ProxyProtocol};
use hiveshell_runtime::{ActiveAccountStore, RenderSurface, SessionStore};

struct Scenario {
    shell: ViewController,
    factory: Arc<MemorySurfaceFactory>,
    backend: Arc<MemorySessionBackend>,
    window: Arc<MemoryWindow>,
    directory: Arc<MemoryAccountDirectory>,
    active_store: Arc<MemoryActiveAccountStore>,
    _tempdir: tempfile::TempDir,
}

fn account(raw: &str) -> AccountId {
    AccountId::parse(raw).unwrap()
}

fn scenario(prefs: AppPreferences, accounts: &[&str]) -> Scenario {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let factory = Arc::new(MemorySurfaceFactory::new());
    let backend = Arc::new(MemorySessionBackend::new(tempdir.path()));
    let window = Arc::new(MemoryWindow::new(1280, 720, 300));
    let directory = Arc::new(MemoryAccountDirectory::new());
    for raw in accounts {
        directory.add(AccountRecord {
            id: account(raw),
            proxy: None,
            translation: Default::default(),
        });
    }
    let active_store = Arc::new(MemoryActiveAccountStore::new());
    let shell = ViewController::new(
        prefs,
        window.clone(),
        factory.clone(),
        backend.clone(),
        directory.clone(),
        active_store.clone(),
    );
    Scenario {
        shell,
        factory,
        backend,
        window,
        directory,
        active_store,
        _tempdir: tempdir,
    }
}

impl Scenario {
    /// The live surface currently bound to this account's partition.
    fn surface_of(&self, id: &AccountId) -> Arc<MemorySurface> {
        let snapshot = self.shell.view_snapshot(id).expect("view exists");
        self.factory
            .surfaces()
            .into_iter()
            .filter(|s| s.is_alive() && s.partition_key() == snapshot.partition_key)
            .next_back()
            .expect("live surface for partition")
    }
}

#[test]
fn scenarios_binary_smoke_runs() {
    assert!(!hiveshell::VERSION.is_empty());
}

#[tokio::test(start_paused = true)]
async fn multi_account_session_stays_isolated_and_single_active() {
    let mut s = scenario(AppPreferences::default(), &["work", "home", "club"]);

    for raw in ["work", "home", "club"] {
        let outcome = commands::switch_account(&mut s.shell, raw, None).await;
        assert!(outcome.success, "switch to {raw} failed: {:?}", outcome.error);
    }
    s.shell.pump_events();

    // Isolation: pairwise distinct partitions, storage paths name only the
    // owning account.
    let ids = [account("work"), account("home"), account("club")];
    for a in &ids {
        let snapshot = s.shell.view_snapshot(a).expect("snapshot");
        assert!(snapshot.partition_key.contains(a.as_str()));
        let path = s
            .backend
            .session(&snapshot.partition_key)
            .unwrap()
            .storage_path()
            .display()
            .to_string();
        for b in &ids {
            if a == b {
                assert!(path.contains(b.as_str()));
            } else {
                assert!(!path.contains(b.as_str()));
            }
        }
    }

    // Single-active: only the last-switched account is visible.
    assert_eq!(s.shell.active_account_id(), Some(&account("club")));
    let visible: Vec<_> = ids
        .iter()
        .filter(|id| s.surface_of(id).is_visible())
        .collect();
    assert_eq!(visible, vec![&account("club")]);

    // The persisted pointer tracks every successful switch.
    assert_eq!(s.active_store.load(), Some(account("club")));
    assert_eq!(s.directory.touched().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn pool_pressure_cycle_reuses_surfaces_without_mixing_sessions() {
    let mut prefs = AppPreferences::default();
    prefs.max_concurrent_views = 2;
    prefs.view_pool_size = 2;
    let mut s = scenario(prefs, &["a1", "a2", "a3"]);

    // Cycle through the accounts twice; every switch must succeed and the
    // materialized set stays bounded.
    for raw in ["a1", "a2", "a3", "a1", "a2", "a3"] {
        let outcome = commands::switch_account(&mut s.shell, raw, None).await;
        assert!(outcome.success, "switch to {raw}: {:?}", outcome.error);
        assert!(s.shell.materialized_accounts().len() <= 2);
        tokio::time::advance(Duration::from_secs(1)).await;
    }

    // Second pass reused pooled surfaces: strictly fewer creations than
    // switches.
    assert!(s.factory.created_count() <= 4, "created {} surfaces", s.factory.created_count());

    // No surface ever serves a foreign partition.
    for raw in ["a1", "a2", "a3"] {
        let id = account(raw);
        if let Some(snapshot) = s.shell.view_snapshot(&id) {
            assert!(snapshot.partition_key.ends_with(raw));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn misconfigured_proxy_never_blocks_account_startup() {
    let mut s = scenario(AppPreferences::default(), &[]);
    s.directory.add(AccountRecord {
        id: account("proxied"),
        proxy: Some(ProxyConfig {
            protocol: ProxyProtocol::Socks5,
            host: String::new(),
            port: 1080,
            username: None,
            password: None,
        }),
        translation: Default::default(),
    });

    let outcome = commands::switch_account(&mut s.shell, "proxied", None).await;
    assert!(outcome.success, "proxy fallback must not block: {:?}", outcome.error);
    s.shell.pump_events();

    let snapshot = s.shell.view_snapshot(&account("proxied")).expect("view");
    assert!(snapshot.loaded);
    // Direct connection after fallback.
    let session = s.backend.session(&snapshot.partition_key).unwrap();
    assert!(session.applied_proxy().is_none());
}

#[tokio::test(start_paused = true)]
async fn connection_monitor_drives_view_state_through_the_pump() {
    let mut s = scenario(AppPreferences::default(), &["alpha"]);
    commands::switch_account(&mut s.shell, "alpha", None).await;
    s.shell.pump_events();

    let surface = s.surface_of(&account("alpha"));
    surface.set_default_script_result(
        probe::CONNECTION_PROBE,
        serde_json::json!({"online": true, "degraded": false, "error": null}),
    );

    tokio::time::advance(Duration::from_secs(31)).await;
    tokio::task::yield_now().await;
    s.shell.pump_events();

    let status = commands::connection_status(&s.shell, "alpha");
    assert!(status.success);
    assert_eq!(status.data.unwrap().status, ConnectionStatus::Online);

    // Flip to offline; the next poll transitions the state.
    surface.set_default_script_result(
        probe::CONNECTION_PROBE,
        serde_json::json!({"online": false, "degraded": false, "error": null}),
    );
    tokio::time::advance(Duration::from_secs(31)).await;
    tokio::task::yield_now().await;
    s.shell.pump_events();
    assert_eq!(
        commands::connection_status(&s.shell, "alpha").data.unwrap().status,
        ConnectionStatus::Offline
    );

    s.shell.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn destroy_all_views_and_shutdown_leave_nothing_behind() {
    let mut s = scenario(AppPreferences::default(), &["a1", "a2"]);
    commands::switch_account(&mut s.shell, "a1", None).await;
    commands::switch_account(&mut s.shell, "a2", None).await;

    let outcome = commands::destroy_all_views(&mut s.shell).await;
    assert!(outcome.success);
    assert!(s.shell.materialized_accounts().is_empty());
    assert_eq!(
        commands::active_account_id(&s.shell).data.unwrap().account_id,
        None
    );
    assert!(s.window.attached_surfaces().is_empty());

    s.shell.shutdown().await;
}
