/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Engine adapters implementing the runtime boundary traits.
//!
//! The shell core only ever sees `hiveshell-runtime` traits. The in-memory
//! engine here is the deterministic reference implementation used by the test
//! suites and the headless smoke path; platform webview engines live on the
//! embedder side of the boundary.

pub mod memory;
