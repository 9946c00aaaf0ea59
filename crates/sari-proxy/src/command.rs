// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The CONNECT/BIND command proxy: reads a single command line (with a
//! deadline), then pairs the connection with its rendezvous counterpart
//! through an [`Exchanger`] and forwards bytes between them.
//!
//! A demo peripheral to the promise core, the same way `sari-socks5` is;
//! its interest here is the combinator and `Exchanger` layers rather than
//! a wire codec.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use sari_core::{combinators, DynValue, Extract, Promise};
use sari_reactor::io_ops::{self, TcpHandle};
use sari_reactor::{split, stream_forward, timer, Exchanger, Reactor};
use tokio::net::TcpStream;
use tracing::warn;

/// How long a client has to send a recognized command before the
/// connection is dropped.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// Drives one accepted connection: read its command (under a deadline),
/// then dispatch to the matching rendezvous side.
pub fn handle_connection(reactor: Reactor, exchanger: Exchanger, stream: TcpStream) -> Promise<Reactor> {
    let handle: TcpHandle = Rc::new(RefCell::new(stream));
    read_command_with_timeout(reactor, handle, exchanger)
}

/// Reads one trimmed, non-empty command line within [`COMMAND_TIMEOUT`],
/// reporting a status-coded rejection reply if the deadline fires or the
/// read itself fails.
fn read_command_with_timeout(reactor: Reactor, handle: TcpHandle, exchanger: Exchanger) -> Promise<Reactor> {
    let (timer_promise, cancel_timer) = timer::timeout(reactor, COMMAND_TIMEOUT);
    let read_cmd = read_until_command(reactor, handle.clone());
    let guarded = combinators::deadline(reactor, read_cmd, timer_promise, cancel_timer);
    let settled = combinators::all_settled(reactor, vec![guarded]);

    let spare: Rc<RefCell<Option<TcpHandle>>> = Rc::new(RefCell::new(Some(handle)));

    settled
        .then::<(Extract<Promise<Reactor>>,), _>(move |Extract(inner)| -> Promise<Reactor> {
            let client = spare.borrow_mut().take().expect("spare held until this handler fires");
            if inner.is_fulfilled() {
                let command = match inner.result().get(1) {
                    Some(DynValue::Str(s)) => s.clone(),
                    _ => String::new(),
                };
                // `settled` just fired from deep inside the Repeat/Race/
                // AllSettled finalize cascade that settled it — those
                // combinators' closures are still live on this call stack,
                // each holding its own clone of `client`'s sibling handles.
                // One more executor tick (a Default-mode tick promise,
                // unlike the reactor wrappers above) lets that whole stack
                // unwind and drop its captures before anything here tries
                // to reclaim sole ownership of `client` for forwarding —
                // the same reason `Promise`'s own adoption defers its
                // continuation to a freshly posted task (see `adopt` in
                // sari-core's promise module).
                let tick = Promise::resolved(reactor, Vec::new());
                let exchanger = exchanger.clone();
                tick.then::<(), _>(move || dispatch_command(reactor, client, exchanger, command))
                    .expect("freshly constructed promise");
                tick
            } else {
                let status = promise_status(&inner);
                reject_with_status(reactor, client, status)
            }
        })
        .expect("freshly constructed promise");
    settled
}

/// Reads `\n`-terminated lines, skipping blank ones, until a non-empty
/// trimmed command is found. Resolves with `(false, command)`; tail-loops
/// via `Repeat` rather than recursing so a client that sends many blank
/// lines costs O(1) native stack.
fn read_until_command(reactor: Reactor, handle: TcpHandle) -> Promise<Reactor> {
    combinators::repeat(
        reactor,
        move |_args: Vec<DynValue>| -> Promise<Reactor> {
            let p = io_ops::read_until(reactor, handle.clone(), b'\n');
            p.then::<(Vec<u8>,), _>(|line: Vec<u8>| -> (bool, String) {
                let text = String::from_utf8_lossy(&line).into_owned();
                let command = split::trim(&text).to_string();
                if command.is_empty() {
                    (true, String::new())
                } else {
                    (false, command)
                }
            })
            .expect("freshly constructed promise");
            p
        },
        Vec::new(),
    )
}

/// Maps a settled promise to the status vocabulary the client-facing error
/// reply uses.
fn promise_status(p: &Promise<Reactor>) -> &'static str {
    if p.is_pending() {
        "Pending"
    } else if p.is_fulfilled() {
        "Successful"
    } else {
        match p.result_at(0) {
            Some(DynValue::Code(code)) if code.kind == sari_core::ErrorCodeKind::TimedOut => "Timeout",
            _ => "Internal server error",
        }
    }
}

fn dispatch_command(reactor: Reactor, handle: TcpHandle, exchanger: Exchanger, command: String) -> Promise<Reactor> {
    let tokens = split::tokenize(&command);
    match tokens.first().copied() {
        Some("CONNECT") => connect_side(reactor, handle, exchanger),
        Some("BIND") => bind_side(reactor, handle, exchanger),
        _ => {
            warn!(%command, "unrecognized proxy command");
            reject_with_status(reactor, handle, "Internal server error")
        }
    }
}

/// The consumer side of the rendezvous: waits for a `BIND` peer, writes it
/// an `ACK`, then forwards bytes between the two sockets.
fn connect_side(reactor: Reactor, handle: TcpHandle, exchanger: Exchanger) -> Promise<Reactor> {
    let (matched, _trans) = exchanger.async_consume(vec![DynValue::from(Extract(handle.clone()))]);
    matched
        .then::<(Extract<RefCell<TcpStream>>,), _>(move |Extract(peer)| -> Promise<Reactor> {
            let peer_for_ack = peer.clone();
            let ack = io_ops::write_some(reactor, peer_for_ack, b"ACK\r\n".to_vec());
            ack.then::<(), _>(move || -> Promise<Reactor> {
                let own_stream = unwrap_handle(handle, "connect");
                let peer_stream = unwrap_handle(peer, "bind-peer");
                stream_forward::forward(reactor, own_stream, peer_stream)
            })
            .expect("freshly constructed promise");
            ack
        })
        .expect("freshly constructed promise");
    matched
}

/// The producer side of the rendezvous: waits for a `CONNECT` peer, then
/// forwards bytes between the two sockets.
fn bind_side(reactor: Reactor, handle: TcpHandle, exchanger: Exchanger) -> Promise<Reactor> {
    let (matched, _trans) = exchanger.async_produce(vec![DynValue::from(Extract(handle.clone()))]);
    matched
        .then::<(Extract<RefCell<TcpStream>>,), _>(move |Extract(peer)| -> Promise<Reactor> {
            let own_stream = unwrap_handle(handle, "bind");
            let peer_stream = unwrap_handle(peer, "connect-peer");
            stream_forward::forward(reactor, own_stream, peer_stream)
        })
        .expect("freshly constructed promise");
    matched
}

/// Reclaims the underlying `TcpStream` from a handle expected to have no
/// other outstanding owners at this point in the dispatch.
fn unwrap_handle(handle: TcpHandle, label: &'static str) -> TcpStream {
    match Rc::try_unwrap(handle) {
        Ok(cell) => cell.into_inner(),
        Err(rc) => panic!(
            "proxy {label} handle had {} outstanding references at handoff to forwarding",
            Rc::strong_count(&rc)
        ),
    }
}

fn reject_with_status(reactor: Reactor, handle: TcpHandle, status: &'static str) -> Promise<Reactor> {
    let msg = format!("ERR {status}\r\n").into_bytes();
    let p = io_ops::write_some(reactor, handle.clone(), msg);
    p.then::<(), _>(move || -> Promise<Reactor> {
        let shutdown_p = io_ops::shutdown(reactor, handle);
        shutdown_p
            .then::<(), _>(move || handshake_failed(reactor, status))
            .expect("freshly constructed promise");
        shutdown_p
    })
    .expect("freshly constructed promise");
    p
}

fn handshake_failed(reactor: Reactor, status: &'static str) -> Promise<Reactor> {
    Promise::rejected(
        reactor,
        vec![DynValue::from(sari_core::ErrorCode::new(
            sari_core::ErrorCodeKind::Custom("proxy_command_failed"),
            format!("proxy command did not complete: {status}"),
        ))],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sari_core::{ErrorCode, ErrorCodeKind};

    #[derive(Debug, Clone, Copy, Default)]
    struct TestExecutor;

    impl sari_core::Executor for TestExecutor {
        fn post(&self, task: Box<dyn FnOnce()>) {
            task();
        }
    }

    #[test]
    fn promise_status_reports_fulfilled() {
        let p = Promise::resolved(TestExecutor, vec![DynValue::Unit]);
        assert_eq!(promise_status_for(&p), "Successful");
    }

    #[test]
    fn promise_status_reports_timeout() {
        let p = Promise::rejected(TestExecutor, vec![DynValue::from(ErrorCode::timed_out())]);
        assert_eq!(promise_status_for(&p), "Timeout");
    }

    #[test]
    fn promise_status_reports_internal_error_for_other_rejections() {
        let p = Promise::rejected(
            TestExecutor,
            vec![DynValue::from(ErrorCode::new(ErrorCodeKind::Canceled, "canceled"))],
        );
        assert_eq!(promise_status_for(&p), "Internal server error");
    }

    /// `promise_status` is generic over the production `Reactor` executor;
    /// this mirrors its body against `TestExecutor` so the mapping can be
    /// exercised without a tokio runtime.
    fn promise_status_for(p: &Promise<TestExecutor>) -> &'static str {
        if p.is_pending() {
            "Pending"
        } else if p.is_fulfilled() {
            "Successful"
        } else {
            match p.result_at(0) {
                Some(DynValue::Code(code)) if code.kind == ErrorCodeKind::TimedOut => "Timeout",
                _ => "Internal server error",
            }
        }
    }

    #[test]
    fn tokenize_yields_the_leading_token_dispatch_command_switches_on() {
        assert_eq!(split::tokenize("CONNECT").first().copied(), Some("CONNECT"));
        assert_eq!(split::tokenize("BIND extra args").first().copied(), Some("BIND"));
        assert_eq!(split::tokenize("   ").first().copied(), None);
        assert_eq!(split::tokenize("FROBNICATE").first().copied(), Some("FROBNICATE"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn dispatch_command_rejects_unrecognized_token_with_status_reply() {
        use tokio::io::AsyncReadExt;
        use tokio::net::TcpListener;

        tokio::task::LocalSet::new()
            .run_until(async {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let addr = listener.local_addr().unwrap();
                let mut client = TcpStream::connect(addr).await.unwrap();
                let (server, _) = listener.accept().await.unwrap();
                let handle: TcpHandle = Rc::new(RefCell::new(server));
                let exchanger = Exchanger::new(Reactor);

                let p = dispatch_command(Reactor, handle, exchanger, "FROBNICATE".to_string());

                // Register before the first `.await` below, while `p` is
                // still guaranteed Pending (nothing has run on the reactor's
                // spawned tasks yet) — otherwise the write/shutdown/reject
                // cascade could settle `p` before this handler is attached.
                let (tx, rx) = tokio::sync::oneshot::channel();
                let tx = Rc::new(RefCell::new(Some(tx)));
                p.finalize(move |settled: Promise<Reactor>| {
                    if let Some(tx) = tx.borrow_mut().take() {
                        let _ = tx.send(settled.is_rejected());
                    }
                })
                .expect("freshly constructed promise");

                let mut buf = [0u8; 64];
                let n = client.read(&mut buf).await.unwrap();
                assert_eq!(&buf[..n], b"ERR Internal server error\r\n");

                assert!(rx.await.expect("dispatch_command promise settled"));
            })
            .await;
    }
}
