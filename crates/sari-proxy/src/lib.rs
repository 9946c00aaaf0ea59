// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # sari-proxy
//!
//! A line-oriented rendezvous proxy demo: a client sends a bare `CONNECT`
//! or `BIND` command, and the two sides of the rendezvous are paired
//! through a [`sari_reactor::Exchanger`] and forwarded to each other
//! byte-for-byte once matched.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;

pub use command::handle_connection;
