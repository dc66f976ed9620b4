/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Headless shell entry point.
//!
//! Wires the view lifecycle core to the in-memory engine: loads preferences
//! and the TOML account directory, restores the persisted last-active
//! account, and reports the resulting state. A platform embedder replaces
//! the engine half by implementing the `hiveshell-runtime` traits against
//! real windows and webviews.

use std::sync::Arc;

use log::{info, warn};

use hiveshell::engine::memory::{MemorySessionBackend, MemorySurfaceFactory, MemoryWindow};
use hiveshell::prefs::AppPreferences;
use hiveshell::services::accounts::{FileActiveAccountStore, TomlAccountDirectory};
use hiveshell::{SwitchOptions, ViewController, commands};
use hiveshell_runtime::AccountDirectory;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("hiveshell {} starting", hiveshell::VERSION);
    let prefs = AppPreferences::load();

    let config_dir = dirs::config_dir()
        .map(|dir| dir.join("hiveshell"))
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let data_dir = dirs::data_dir()
        .map(|dir| dir.join("hiveshell"))
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        warn!("failed to create data dir {}: {e}", data_dir.display());
    }

    let directory = Arc::new(TomlAccountDirectory::load(
        &config_dir.join("accounts.toml"),
    ));
    let active_store = Arc::new(FileActiveAccountStore::new(data_dir.join("last_active")));
    let window = Arc::new(MemoryWindow::new(1280, 720, 300));
    let factory = Arc::new(MemorySurfaceFactory::new());
    let session_backend = Arc::new(MemorySessionBackend::new(&data_dir.join("partitions")));

    let mut shell = ViewController::new(
        prefs,
        window,
        factory,
        session_backend,
        directory.clone(),
        active_store,
    );
    shell.start_background();

    let accounts = directory.list_ordered();
    info!("{} accounts configured", accounts.len());

    if let Some(restored) = shell.restore_last_active().await {
        info!("restored last-active account {restored}");
    } else if let Some(first) = accounts.first() {
        match shell.switch_to(first, SwitchOptions::default()).await {
            Ok(_) => info!("switched to first configured account {first}"),
            Err(e) => warn!("could not switch to {first}: {e}"),
        }
    } else {
        info!("no accounts configured; nothing to show");
    }

    shell.pump_events();
    for id in shell.materialized_accounts().to_vec() {
        if let Some(snapshot) = shell.view_snapshot(&id) {
            info!(
                "view {id}: status {:?}, visible {}, partition {}",
                snapshot.status, snapshot.visible, snapshot.partition_key
            );
        }
    }
    let report = serde_json::to_string_pretty(&commands::active_account_id(&shell))
        .unwrap_or_default();
    println!("{report}");

    shell.shutdown().await;
}
