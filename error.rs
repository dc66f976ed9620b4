/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Shell error taxonomy.
//!
//! Four classes of failure flow through the shell:
//! validation errors are rejected before any side effect; transient resource
//! errors are recorded on view state and stay retryable; invariant violations
//! are logged loudly and surfaced as failed results; policy fallbacks (proxy
//! misconfiguration) are downgraded to successful-with-advisory outcomes and
//! never appear here as errors at all.

use hiveshell_core::{AccountId, AccountIdError};
use hiveshell_runtime::{SessionError, SurfaceError, WindowError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    // Validation — rejected before any side effect.
    #[error("invalid account id: {0}")]
    InvalidAccountId(#[from] AccountIdError),
    #[error("unknown account {0}")]
    UnknownAccount(AccountId),
    #[error("no view materialized for account {0}")]
    ViewNotMaterialized(AccountId),
    #[error("view index {index} out of range ({len} materialized views)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("a switch is already in progress")]
    SwitchInProgress,
    #[error("cannot free capacity: every materialized view is protected")]
    CapacityExhausted,

    // Invariant violations — defects, logged loudly at the detection site.
    #[error("host window has been destroyed")]
    WindowDestroyed,
    #[error("session partition {partition} for account {account} is already bound to account {holder}")]
    IsolationViolation {
        account: AccountId,
        holder: AccountId,
        partition: String,
    },
    #[error("surface for account {account} reports partition {actual}, expected {expected}")]
    PartitionMismatch {
        account: AccountId,
        expected: String,
        actual: String,
    },

    // Transient resource errors — recorded on view state, retryable.
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Window(#[from] WindowError),
}

impl ShellError {
    /// True for the defect class that must never be silently swallowed.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::WindowDestroyed | Self::IsolationViolation { .. } | Self::PartitionMismatch { .. }
        )
    }
}
