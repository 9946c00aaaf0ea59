// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Reactor-operation wrappers (§6): for each native async primitive this
//! module turns a `tokio` I/O operation into a promise constructed in
//! async mode, so completion calls `resolve`/`reject` the instant the
//! reactor signals it, with no extra scheduling tick.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use sari_core::{DynValue, ErrorCode, ErrorCodeKind, Extract, Promise};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::executor::Reactor;

/// A shared handle onto a connected TCP stream. Reads and writes borrow it
/// exclusively for the duration of one operation; concurrent read+write
/// (as bidirectional forwarding needs) should go through
/// [`crate::stream_forward::forward`] instead, which splits the stream.
pub type TcpHandle = Rc<RefCell<TcpStream>>;

fn io_error_code(e: &std::io::Error) -> ErrorCode {
    ErrorCode::new(ErrorCodeKind::Io(e.kind()), e.to_string())
}

/// `connect(addr)`: resolves with a [`TcpHandle`] on success, rejects with
/// an [`ErrorCode`] on failure.
pub fn connect(reactor: Reactor, addr: SocketAddr) -> Promise<Reactor> {
    Promise::new_async(reactor, move |settler| {
        tokio::task::spawn_local(async move {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    let handle: TcpHandle = Rc::new(RefCell::new(stream));
                    settler.resolve(vec![DynValue::from(Extract(handle))]);
                }
                Err(e) => settler.reject(vec![DynValue::from(io_error_code(&e))]),
            }
        });
    })
}

/// `connect_list(addrs)`: tries each candidate endpoint in turn (the
/// DNS-resolved-address fallback pattern of the original
/// `AsyncConnectEndpoints`), resolving with the first successful
/// [`TcpHandle`], or rejecting with the last endpoint's error once the
/// list is exhausted.
pub fn connect_list(reactor: Reactor, addrs: Vec<SocketAddr>) -> Promise<Reactor> {
    Promise::new_async(reactor, move |settler| {
        tokio::task::spawn_local(async move {
            let mut last_err = None;
            for addr in addrs {
                match TcpStream::connect(addr).await {
                    Ok(stream) => {
                        let handle: TcpHandle = Rc::new(RefCell::new(stream));
                        settler.resolve(vec![DynValue::from(Extract(handle))]);
                        return;
                    }
                    Err(e) => last_err = Some(io_error_code(&e)),
                }
            }
            let code = last_err.unwrap_or_else(|| {
                ErrorCode::new(ErrorCodeKind::Custom("no_endpoints"), "no candidate endpoints")
            });
            settler.reject(vec![DynValue::from(code)]);
        });
    })
}

/// `resolve_name(host, port)`: resolves with the list of candidate
/// [`SocketAddr`]s (wrapped for typed extraction via [`Extract`]), or
/// rejects with an [`ErrorCode`] if resolution fails.
pub fn resolve_name(reactor: Reactor, host: String, port: u16) -> Promise<Reactor> {
    Promise::new_async(reactor, move |settler| {
        tokio::task::spawn_local(async move {
            match tokio::net::lookup_host((host.as_str(), port)).await {
                Ok(iter) => {
                    let addrs: Vec<SocketAddr> = iter.collect();
                    if addrs.is_empty() {
                        settler.reject(vec![DynValue::from(ErrorCode::new(
                            ErrorCodeKind::Custom("no_resolution"),
                            format!("no addresses found for '{host}'"),
                        ))]);
                    } else {
                        settler.resolve(vec![DynValue::from(Extract(Rc::new(addrs)))]);
                    }
                }
                Err(e) => settler.reject(vec![DynValue::from(io_error_code(&e))]),
            }
        });
    })
}

/// `read_some(handle, max_len)`: a single, possibly-short read. Resolves
/// with the bytes read (empty on EOF), rejects with an [`ErrorCode`] on
/// I/O failure.
pub fn read_some(reactor: Reactor, handle: TcpHandle, max_len: usize) -> Promise<Reactor> {
    Promise::new_async(reactor, move |settler| {
        tokio::task::spawn_local(async move {
            let mut buf = vec![0u8; max_len];
            let mut stream = handle.borrow_mut();
            match stream.read(&mut buf).await {
                Ok(n) => {
                    buf.truncate(n);
                    settler.resolve(vec![DynValue::Bytes(buf)]);
                }
                Err(e) => settler.reject(vec![DynValue::from(io_error_code(&e))]),
            }
        });
    })
}

/// `write_some(handle, data)`: writes `data` in full. Resolves with the
/// byte count written, rejects with an [`ErrorCode`] on I/O failure.
pub fn write_some(reactor: Reactor, handle: TcpHandle, data: Vec<u8>) -> Promise<Reactor> {
    Promise::new_async(reactor, move |settler| {
        tokio::task::spawn_local(async move {
            let len = data.len() as u64;
            let mut stream = handle.borrow_mut();
            match stream.write_all(&data).await {
                Ok(()) => settler.resolve(vec![DynValue::UInt(len)]),
                Err(e) => settler.reject(vec![DynValue::from(io_error_code(&e))]),
            }
        });
    })
}

/// `read_exact(handle, n)`: reads exactly `n` bytes, the primitive the
/// SOCKS5 wire codec builds its fixed-width fields on. Rejects with an
/// `UnexpectedEof`-kinded [`ErrorCode`] if the peer closes early.
pub fn read_exact(reactor: Reactor, handle: TcpHandle, n: usize) -> Promise<Reactor> {
    Promise::new_async(reactor, move |settler| {
        tokio::task::spawn_local(async move {
            let mut buf = vec![0u8; n];
            let mut stream = handle.borrow_mut();
            match stream.read_exact(&mut buf).await {
                Ok(_) => settler.resolve(vec![DynValue::Bytes(buf)]),
                Err(e) => settler.reject(vec![DynValue::from(io_error_code(&e))]),
            }
        });
    })
}

/// `read_until(handle, delimiter)`: reads byte-at-a-time until `delimiter`
/// is seen, resolving with the line (delimiter excluded). Used by the
/// command proxy to read one `\n`-terminated command at a time.
pub fn read_until(reactor: Reactor, handle: TcpHandle, delimiter: u8) -> Promise<Reactor> {
    Promise::new_async(reactor, move |settler| {
        tokio::task::spawn_local(async move {
            let mut line = Vec::new();
            let mut byte = [0u8; 1];
            loop {
                let n = {
                    let mut stream = handle.borrow_mut();
                    match stream.read(&mut byte).await {
                        Ok(n) => n,
                        Err(e) => {
                            settler.reject(vec![DynValue::from(io_error_code(&e))]);
                            return;
                        }
                    }
                };
                if n == 0 {
                    settler.reject(vec![DynValue::from(ErrorCode::new(
                        ErrorCodeKind::Io(std::io::ErrorKind::UnexpectedEof),
                        "connection closed before delimiter",
                    ))]);
                    return;
                }
                if byte[0] == delimiter {
                    settler.resolve(vec![DynValue::Bytes(line)]);
                    return;
                }
                line.push(byte[0]);
            }
        });
    })
}

/// `wait(duration)`: fulfills with no result after `duration` elapses.
pub fn wait(reactor: Reactor, duration: Duration) -> Promise<Reactor> {
    crate::timer::delay(reactor, duration)
}

/// Shuts down both halves of the connection, best-effort. Always
/// fulfills; a shutdown on an already-broken socket is not an error worth
/// surfacing to the promise chain.
pub fn shutdown(reactor: Reactor, handle: TcpHandle) -> Promise<Reactor> {
    Promise::new_async(reactor, move |settler| {
        tokio::task::spawn_local(async move {
            let mut stream = handle.borrow_mut();
            let _ = stream.shutdown().await;
            settler.resolve(vec![DynValue::Unit]);
        });
    })
}
