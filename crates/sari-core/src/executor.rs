// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The executor abstraction the promise core is built against.
//!
//! The core treats the underlying reactor as a black box: an opaque handle
//! to a single-threaded task runner that can `post` a task for later
//! execution on the loop thread. `sari-reactor` supplies the concrete
//! implementation over a `tokio` current-thread runtime; the core itself
//! never names `tokio`.

/// A single-threaded task scheduler bound to one reactor loop.
///
/// Implementors are expected to be cheap to clone (a handle, not the loop
/// itself) and to schedule `task` to run on the loop thread at some later
/// tick, never synchronously from inside `post`.
pub trait Executor: Clone + 'static {
    /// Schedule `task` for later invocation on the executor thread.
    fn post(&self, task: Box<dyn FnOnce()>);
}
