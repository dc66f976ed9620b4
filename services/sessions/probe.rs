/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Read-only probe scripts and their interpretation.
//!
//! Both probes run inside a surface's loaded content and report plain JSON.
//! They must never mutate page state; everything here is inference over an
//! application we do not control, so interpretation is deliberately
//! pessimistic: anything unrecognizable reads as offline / signed out.

use std::sync::Arc;
use std::time::Duration;

use hiveshell_core::ConnectionStatus;
use hiveshell_runtime::RenderSurface;
use log::debug;
use serde_json::Value;

/// Connectivity probe. Combines the browser's own online flag with the
/// hosted application's degraded-connection banner, if one is showing.
pub const CONNECTION_PROBE: &str = r#"(() => {
    const banner = document.querySelector(
        '[data-status="connection"], .connection-banner, .offline-banner');
    return {
        online: navigator.onLine === true,
        degraded: banner !== null,
        error: banner ? (banner.textContent || '').trim().slice(0, 200) : null,
    };
})()"#;

/// Login probe. Looks for two disjoint signals: the authentication screen
/// and the signed-in main content. Seeing neither means the page is still
/// settling and reads as signed out.
pub const LOGIN_PROBE: &str = r#"(() => {
    const needsAuth = document.querySelector(
        '[data-screen="login"], .login-screen, .qr-login') !== null;
    const mainContent = document.querySelector(
        '[data-screen="main"], .app-main, .conversation-list') !== null;
    return { needsAuth: needsAuth, mainContent: mainContent };
})()"#;

/// Interpret a connection-probe payload.
pub fn interpret_connection(value: &Value) -> (ConnectionStatus, Option<String>) {
    let online = value.get("online").and_then(Value::as_bool);
    let degraded = value
        .get("degraded")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let error = value
        .get("error")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    match online {
        Some(true) if degraded => (ConnectionStatus::Error, error),
        Some(true) => (ConnectionStatus::Online, None),
        Some(false) => (ConnectionStatus::Offline, error),
        None => (
            ConnectionStatus::Error,
            Some("connection probe returned no online flag".to_string()),
        ),
    }
}

/// Interpret a login-probe payload. True only when the signed-in signal is
/// present and the authentication signal is not.
pub fn interpret_login(value: &Value) -> bool {
    let needs_auth = value
        .get("needsAuth")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let main_content = value
        .get("mainContent")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    main_content && !needs_auth
}

/// Run the connection probe with a bounded wait. Timeouts and evaluation
/// failures resolve to a negative result, never an error.
pub async fn probe_connection(
    surface: &Arc<dyn RenderSurface>,
    timeout: Duration,
) -> (ConnectionStatus, Option<String>) {
    if !surface.is_alive() {
        return (
            ConnectionStatus::Offline,
            Some("surface is gone".to_string()),
        );
    }
    match tokio::time::timeout(timeout, surface.evaluate_script(CONNECTION_PROBE)).await {
        Ok(Ok(value)) => interpret_connection(&value),
        Ok(Err(e)) => {
            debug!("probe: connection evaluation failed on {}: {e}", surface.id());
            (ConnectionStatus::Error, Some(e.to_string()))
        }
        Err(_) => (
            ConnectionStatus::Offline,
            Some("connection probe timed out".to_string()),
        ),
    }
}

/// Run the login probe with a bounded wait. Any failure reads as signed out.
pub async fn probe_login(surface: &Arc<dyn RenderSurface>, timeout: Duration) -> bool {
    if !surface.is_alive() {
        return false;
    }
    match tokio::time::timeout(timeout, surface.evaluate_script(LOGIN_PROBE)).await {
        Ok(Ok(value)) => interpret_login(&value),
        Ok(Err(e)) => {
            debug!("probe: login evaluation failed on {}: {e}", surface.id());
            false
        }
        Err(_) => false,
    }
}
