// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The concrete [`sari_core::Executor`] this crate supplies.
//!
//! The specification treats the reactor as an opaque black box (§1): all
//! the promise core asks of it is `post(task)`. Rather than hand-roll a
//! second scheduler loop next to tokio's own, `Reactor` delegates directly
//! to `tokio::task::spawn_local`: every posted task becomes a `!Send`
//! local task pinned to the current `LocalSet`, which in turn must be
//! driven by a single-threaded (`current_thread`) tokio runtime. That
//! combination is what gives the single-threaded, no-thread-pool guarantee
//! this crate requires, using tokio's own primitives for it instead of
//! reimplementing a timer heap and microtask queue.

use sari_core::Executor;

/// A handle onto the ambient `tokio` `LocalSet`. Stateless and cheap to
/// clone; every `Reactor` posts onto whatever `LocalSet` is current on the
/// calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reactor;

impl Reactor {
    pub fn new() -> Self {
        Self
    }
}

impl Executor for Reactor {
    fn post(&self, task: Box<dyn FnOnce()>) {
        tokio::task::spawn_local(async move { task() });
    }
}
