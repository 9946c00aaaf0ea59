// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bidirectional stream forwarding (§4.4): a boundary interface for the
//! demo services, not part of the promise core itself. Copies bytes both
//! ways between two TCP streams through fixed 4 KiB scratch buffers;
//! half-close on one direction drains and closes the opposite direction.

use std::cell::Cell;
use std::rc::Rc;

use sari_core::{DynValue, Promise};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::executor::Reactor;

/// Scratch buffer size for each forwarding direction, matching the
/// source's `Transfer::EndpointBufferSize`.
pub const BUFFER_SIZE: usize = 4096;

/// Forwards bytes in both directions between `a` and `b` until both halves
/// have terminated (peer close, drained write, or I/O error). Fulfills
/// once both directions have finished; never rejects — per-direction
/// errors simply end that direction's copy loop early.
pub fn forward(reactor: Reactor, a: TcpStream, b: TcpStream) -> Promise<Reactor> {
    Promise::new_async(reactor, move |settler| {
        let (mut a_read, mut a_write) = a.into_split();
        let (mut b_read, mut b_write) = b.into_split();
        let remaining = Rc::new(Cell::new(2u8));

        let settler_a = settler.clone();
        let remaining_a = remaining.clone();
        tokio::task::spawn_local(async move {
            let mut buf = vec![0u8; BUFFER_SIZE];
            loop {
                let n = match a_read.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                if b_write.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
            let _ = b_write.shutdown().await;
            remaining_a.set(remaining_a.get() - 1);
            if remaining_a.get() == 0 {
                settler_a.resolve(vec![DynValue::Unit]);
            }
        });

        let settler_b = settler.clone();
        let remaining_b = remaining.clone();
        tokio::task::spawn_local(async move {
            let mut buf = vec![0u8; BUFFER_SIZE];
            loop {
                let n = match b_read.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                if a_write.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
            let _ = a_write.shutdown().await;
            remaining_b.set(remaining_b.get() - 1);
            if remaining_b.get() == 0 {
                settler_b.resolve(vec![DynValue::Unit]);
            }
        });
    })
}
