/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Command dispatch boundary.
//!
//! The surface a UI or IPC layer drives. Every command takes raw inputs,
//! validates them, and returns a serializable `{success, error?, ...data}`
//! envelope; no error or panic crosses this boundary. Invariant violations
//! are logged loudly before being folded into the envelope.

use log::{debug, error};
use serde::Serialize;

use hiveshell_core::AccountId;

use crate::error::ShellError;
use crate::shell::desktop::lifecycle::view_controller::{
    MemoryUsageReport, OptimizeOptions, OptimizeOutcome, SwitchOptions, SwitchOutcome,
    ViewController, ViewStateSnapshot,
};

/// Structured result envelope returned by every command.
#[derive(Debug, Serialize)]
pub struct CommandOutcome<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: Option<T>,
}

/// Payload for commands that carry no data.
#[derive(Debug, Serialize)]
pub struct Empty {}

impl<T: Serialize> CommandOutcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn failure(error: &ShellError) -> Self {
        if error.is_invariant_violation() {
            error!("commands: invariant violation surfaced: {error}");
        } else {
            debug!("commands: operation failed: {error}");
        }
        Self {
            success: false,
            error: Some(error.to_string()),
            data: None,
        }
    }
}

fn parse_account(raw: &str) -> Result<AccountId, ShellError> {
    AccountId::parse(raw).map_err(ShellError::from)
}

/// Switch to an account, materializing its view when allowed.
pub async fn switch_account(
    shell: &mut ViewController,
    raw_id: &str,
    create_if_missing: Option<bool>,
) -> CommandOutcome<SwitchOutcome> {
    let id = match parse_account(raw_id) {
        Ok(id) => id,
        Err(e) => return CommandOutcome::failure(&e),
    };
    let options = SwitchOptions {
        create_if_missing: create_if_missing.unwrap_or(true),
    };
    match shell.switch_to(&id, options).await {
        Ok(outcome) => CommandOutcome::ok(outcome),
        Err(e) => CommandOutcome::failure(&e),
    }
}

pub async fn switch_next(shell: &mut ViewController) -> CommandOutcome<SwitchOutcome> {
    match shell.switch_to_next().await {
        Ok(outcome) => CommandOutcome::ok(outcome),
        Err(e) => CommandOutcome::failure(&e),
    }
}

pub async fn switch_previous(shell: &mut ViewController) -> CommandOutcome<SwitchOutcome> {
    match shell.switch_to_previous().await {
        Ok(outcome) => CommandOutcome::ok(outcome),
        Err(e) => CommandOutcome::failure(&e),
    }
}

pub async fn switch_by_index(
    shell: &mut ViewController,
    index: usize,
) -> CommandOutcome<SwitchOutcome> {
    match shell.switch_by_index(index).await {
        Ok(outcome) => CommandOutcome::ok(outcome),
        Err(e) => CommandOutcome::failure(&e),
    }
}

pub fn hide_account_view(shell: &mut ViewController, raw_id: &str) -> CommandOutcome<Empty> {
    let id = match parse_account(raw_id) {
        Ok(id) => id,
        Err(e) => return CommandOutcome::failure(&e),
    };
    match shell.hide_view(&id) {
        Ok(()) => CommandOutcome::ok(Empty {}),
        Err(e) => CommandOutcome::failure(&e),
    }
}

pub async fn destroy_account_view(
    shell: &mut ViewController,
    raw_id: &str,
) -> CommandOutcome<Empty> {
    let id = match parse_account(raw_id) {
        Ok(id) => id,
        Err(e) => return CommandOutcome::failure(&e),
    };
    match shell.destroy_view(&id).await {
        Ok(()) => CommandOutcome::ok(Empty {}),
        Err(e) => CommandOutcome::failure(&e),
    }
}

pub async fn destroy_all_views(shell: &mut ViewController) -> CommandOutcome<Empty> {
    shell.destroy_all_views().await;
    CommandOutcome::ok(Empty {})
}

#[derive(Debug, Serialize)]
pub struct ResizeData {
    /// True when bounds were applied synchronously (immediate mode); false
    /// when the recompute was scheduled behind the debounce.
    pub applied: bool,
}

pub fn resize(
    shell: &mut ViewController,
    sidebar_width: u32,
    immediate: bool,
) -> CommandOutcome<ResizeData> {
    match shell.resize(sidebar_width, immediate) {
        Ok(applied) => CommandOutcome::ok(ResizeData { applied }),
        Err(e) => CommandOutcome::failure(&e),
    }
}

pub fn view_state(shell: &ViewController, raw_id: &str) -> CommandOutcome<ViewStateSnapshot> {
    let id = match parse_account(raw_id) {
        Ok(id) => id,
        Err(e) => return CommandOutcome::failure(&e),
    };
    match shell.view_snapshot(&id) {
        Some(snapshot) => CommandOutcome::ok(snapshot),
        None => CommandOutcome::failure(&ShellError::ViewNotMaterialized(id)),
    }
}

#[derive(Debug, Serialize)]
pub struct ActiveAccountData {
    pub account_id: Option<AccountId>,
}

pub fn active_account_id(shell: &ViewController) -> CommandOutcome<ActiveAccountData> {
    CommandOutcome::ok(ActiveAccountData {
        account_id: shell.active_account_id().cloned(),
    })
}

#[derive(Debug, Serialize)]
pub struct ConnectionStatusData {
    pub status: hiveshell_core::ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn connection_status(
    shell: &ViewController,
    raw_id: &str,
) -> CommandOutcome<ConnectionStatusData> {
    let id = match parse_account(raw_id) {
        Ok(id) => id,
        Err(e) => return CommandOutcome::failure(&e),
    };
    match shell.connection_status(&id) {
        Some((status, error)) => CommandOutcome::ok(ConnectionStatusData { status, error }),
        None => CommandOutcome::failure(&ShellError::ViewNotMaterialized(id)),
    }
}

#[derive(Debug, Serialize)]
pub struct LoginStatusData {
    /// None until the first probe has run.
    pub logged_in: Option<bool>,
}

pub fn login_status(shell: &ViewController, raw_id: &str) -> CommandOutcome<LoginStatusData> {
    let id = match parse_account(raw_id) {
        Ok(id) => id,
        Err(e) => return CommandOutcome::failure(&e),
    };
    match shell.login_status(&id) {
        Some(logged_in) => CommandOutcome::ok(LoginStatusData { logged_in }),
        None => CommandOutcome::failure(&ShellError::ViewNotMaterialized(id)),
    }
}

pub fn start_connection_monitoring(
    shell: &mut ViewController,
    raw_id: &str,
) -> CommandOutcome<Empty> {
    let id = match parse_account(raw_id) {
        Ok(id) => id,
        Err(e) => return CommandOutcome::failure(&e),
    };
    match shell.start_connection_monitoring(&id) {
        Ok(()) => CommandOutcome::ok(Empty {}),
        Err(e) => CommandOutcome::failure(&e),
    }
}

pub fn stop_connection_monitoring(
    shell: &mut ViewController,
    raw_id: &str,
) -> CommandOutcome<Empty> {
    let id = match parse_account(raw_id) {
        Ok(id) => id,
        Err(e) => return CommandOutcome::failure(&e),
    };
    shell.stop_connection_monitoring(&id);
    CommandOutcome::ok(Empty {})
}

pub fn start_login_monitoring(shell: &mut ViewController, raw_id: &str) -> CommandOutcome<Empty> {
    let id = match parse_account(raw_id) {
        Ok(id) => id,
        Err(e) => return CommandOutcome::failure(&e),
    };
    match shell.start_login_monitoring(&id) {
        Ok(()) => CommandOutcome::ok(Empty {}),
        Err(e) => CommandOutcome::failure(&e),
    }
}

pub fn stop_login_monitoring(shell: &mut ViewController, raw_id: &str) -> CommandOutcome<Empty> {
    let id = match parse_account(raw_id) {
        Ok(id) => id,
        Err(e) => return CommandOutcome::failure(&e),
    };
    shell.stop_login_monitoring(&id);
    CommandOutcome::ok(Empty {})
}

pub async fn memory_usage(shell: &ViewController) -> CommandOutcome<MemoryUsageReport> {
    CommandOutcome::ok(shell.memory_usage().await)
}

pub async fn optimize_memory(
    shell: &mut ViewController,
    aggressive: bool,
) -> CommandOutcome<OptimizeOutcome> {
    CommandOutcome::ok(shell.optimize_memory(OptimizeOptions { aggressive }).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::{
        MemoryAccountDirectory, MemoryActiveAccountStore, MemorySessionBackend,
        MemorySurfaceFactory, MemoryWindow,
    };
    use crate::prefs::AppPreferences;
    use hiveshell_core::AccountRecord;
    use std::sync::Arc;

    fn shell(accounts: &[&str]) -> (ViewController, tempfile::TempDir) {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let directory = Arc::new(MemoryAccountDirectory::new());
        for raw in accounts {
            directory.add(AccountRecord {
                id: AccountId::parse(raw).unwrap(),
                proxy: None,
                translation: Default::default(),
            });
        }
        let controller = ViewController::new(
            AppPreferences::default(),
            Arc::new(MemoryWindow::new(1280, 720, 300)),
            Arc::new(MemorySurfaceFactory::new()),
            Arc::new(MemorySessionBackend::new(tempdir.path())),
            directory,
            Arc::new(MemoryActiveAccountStore::new()),
        );
        (controller, tempdir)
    }

    #[tokio::test(start_paused = true)]
    async fn switch_command_envelope_round_trips_through_json() {
        let (mut shell, _dir) = shell(&["alpha"]);
        let outcome = switch_account(&mut shell, "alpha", None).await;
        assert!(outcome.success);
        assert!(outcome.error.is_none());

        let json = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(json["success"], serde_json::json!(true));
        assert_eq!(json["account_id"], serde_json::json!("alpha"));
        assert_eq!(json["already_active"], serde_json::json!(false));
        assert!(json.get("error").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_account_id_is_a_captured_failure_not_a_panic() {
        let (mut shell, _dir) = shell(&["alpha"]);
        let outcome = switch_account(&mut shell, "not/valid", None).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("disallowed"));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_account_failure_is_captured_in_the_envelope() {
        let (mut shell, _dir) = shell(&[]);
        let outcome = switch_account(&mut shell, "ghost", None).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("unknown account"));
    }

    #[tokio::test(start_paused = true)]
    async fn view_state_for_unmaterialized_account_fails_cleanly() {
        let (shell, _dir) = shell(&["alpha"]);
        let outcome = view_state(&shell, "alpha");
        assert!(!outcome.success);
    }

    #[tokio::test(start_paused = true)]
    async fn active_account_query_reports_none_then_some() {
        let (mut shell, _dir) = shell(&["alpha"]);
        assert_eq!(active_account_id(&shell).data.unwrap().account_id, None);

        switch_account(&mut shell, "alpha", None).await;
        let data = active_account_id(&shell).data.unwrap();
        assert_eq!(data.account_id, Some(AccountId::parse("alpha").unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn destroying_the_active_account_leaves_no_active_id() {
        let (mut shell, _dir) = shell(&["alpha"]);
        switch_account(&mut shell, "alpha", None).await;
        let outcome = destroy_account_view(&mut shell, "alpha").await;
        assert!(outcome.success);
        assert_eq!(active_account_id(&shell).data.unwrap().account_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn monitoring_commands_require_a_materialized_view() {
        let (mut shell, _dir) = shell(&["alpha"]);
        assert!(!start_connection_monitoring(&mut shell, "alpha").success);

        switch_account(&mut shell, "alpha", None).await;
        assert!(start_connection_monitoring(&mut shell, "alpha").success);
        assert!(stop_connection_monitoring(&mut shell, "alpha").success);
        assert!(start_login_monitoring(&mut shell, "alpha").success);
        assert!(stop_login_monitoring(&mut shell, "alpha").success);
        shell.stop_all_monitoring();
    }

    #[tokio::test(start_paused = true)]
    async fn memory_usage_command_reports_per_view_samples() {
        let (mut shell, _dir) = shell(&["alpha"]);
        switch_account(&mut shell, "alpha", None).await;
        let outcome = memory_usage(&shell).await;
        assert!(outcome.success);
        let report = outcome.data.unwrap();
        assert!(report.per_view_bytes.contains_key(&AccountId::parse("alpha").unwrap()));
    }
}
