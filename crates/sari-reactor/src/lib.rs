// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # sari-reactor
//!
//! The concrete, single-threaded reactor `sari-core`'s promises run on:
//! a `tokio` `current_thread`-runtime-backed [`Executor`](sari_core::Executor),
//! the reactor-operation wrappers that turn raw `tokio` I/O into promises
//! (`connect`, `resolve_name`, `read_some`/`write_some`/`read_exact`/
//! `read_until`, `wait`), the [`Exchanger`] rendezvous primitive,
//! bidirectional stream forwarding, and small string utilities used by the
//! demo command proxy.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod exchanger;
pub mod executor;
pub mod io_ops;
pub mod split;
pub mod stream_forward;
pub mod timer;

pub use error::{ReactorError, Result};
pub use exchanger::{Exchanger, Transaction};
pub use executor::Reactor;
