/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Portable identity and status kernel for Hiveshell.
//!
//! Holds the account identity types, proxy configuration, and the status
//! enums shared between the shell core and host adapters. This crate has no
//! runtime or engine dependencies so it can be consumed from any host.

pub mod account;
pub mod proxy;
pub mod status;

pub use account::{AccountId, AccountIdError, AccountRecord, TranslationConfig, PARTITION_PREFIX};
pub use proxy::{ProxyConfig, ProxyConfigError, ProxyProtocol, ProxyRules};
pub use status::{ConnectionStatus, MemoryPressureLevel, ViewStatus};
