// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The SOCKS5 handshake orchestration: method negotiation, command
//! dispatch, endpoint connection and handoff to stream forwarding. One
//! call to [`handle_connection`] drives a whole client session as a
//! single promise chain; the chain's terminal state (fulfilled once
//! forwarding finishes, rejected if the handshake or connect failed) is
//! what the accept loop logs.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;

use sari_core::{DynValue, ErrorCode, ErrorCodeKind, Extract, Promise};
use sari_reactor::io_ops::{self, TcpHandle};
use sari_reactor::{stream_forward, Reactor};
use tokio::net::TcpStream;
use tracing::warn;

use crate::wire::{self, Command, CommandRequest, Destination, Method, MethodRequest, Reply};

/// The raw `Any` payload `io_ops::connect`/`connect_list` box a [`TcpHandle`]
/// in; see [`sari_core::Extract`]'s doc comment for why the wrapped type is
/// the cell, not the handle alias itself.
type UpstreamCell = RefCell<TcpStream>;

const UNBOUND: &str = "0.0.0.0:0";

fn unbound_addr() -> SocketAddr {
    UNBOUND.parse().expect("valid socket address literal")
}

/// Drives one accepted connection through the full handshake and, on a
/// successful `CONNECT`, forwards bytes until either side closes.
pub fn handle_connection(reactor: Reactor, stream: TcpStream) -> Promise<Reactor> {
    let handle: TcpHandle = Rc::new(RefCell::new(stream));
    negotiate_method(reactor, handle)
}

fn negotiate_method(reactor: Reactor, handle: TcpHandle) -> Promise<Reactor> {
    let h1 = handle.clone();
    let p = wire::recv_method_request(reactor, handle);
    p.then::<(Extract<MethodRequest>,), _>(move |Extract(mr)| -> Promise<Reactor> {
        if !mr.contains(Method::NoAuthRequired) {
            warn!("client offered no acceptable authentication method");
            let reply = wire::send_method_reply(reactor, h1.clone(), Method::NoAcceptableMethods);
            reply
                .then::<(), _>(move || handshake_failed(reactor))
                .expect("freshly constructed promise");
            return reply;
        }
        let h2 = h1.clone();
        let reply = wire::send_method_reply(reactor, h1.clone(), Method::NoAuthRequired);
        reply
            .then::<(), _>(move || negotiate_command(reactor, h2))
            .expect("freshly constructed promise");
        reply
    })
    .expect("freshly constructed promise");
    p
}

fn negotiate_command(reactor: Reactor, handle: TcpHandle) -> Promise<Reactor> {
    let h1 = handle.clone();
    let p = wire::recv_command_request(reactor, handle);
    p.then::<(Extract<CommandRequest>,), _>(move |Extract(req)| -> Promise<Reactor> {
        if req.command != Command::Connect {
            let reply =
                wire::send_command_reply(reactor, h1.clone(), Reply::CommandNotSupported, unbound_addr());
            reply
                .then::<(), _>(move || handshake_failed(reactor))
                .expect("freshly constructed promise");
            return reply;
        }
        connect_endpoint(reactor, h1.clone(), req.dest.clone())
    })
    .expect("freshly constructed promise");
    p
}

/// Connects to `dest`, replies to the client, and on success hands both
/// ends off to [`stream_forward::forward`]. The returned promise's
/// terminal state is the whole session's outcome.
///
/// `spare` holds a second client-handle reference outside of
/// `connect_promise`'s own dispatch tables: on rejection, `resolve_queue`
/// is cleared before finalizers run, so the success branch's own clone
/// would already be gone by the time a failure reply could use it. The
/// success branch releases `spare` before reclaiming sole ownership of
/// the stream for [`complete_connect`]; the failure branch takes it to
/// send a reply.
fn connect_endpoint(reactor: Reactor, handle: TcpHandle, dest: Destination) -> Promise<Reactor> {
    let connect_promise = match dest {
        Destination::Socket(addr) => io_ops::connect(reactor, addr),
        Destination::DomainName { host, port } => {
            let resolved = io_ops::resolve_name(reactor, host, port);
            resolved
                .then::<(Extract<Vec<SocketAddr>>,), _>(move |Extract(addrs)| {
                    io_ops::connect_list(reactor, (*addrs).clone())
                })
                .expect("freshly constructed promise");
            resolved
        }
    };

    let spare: Rc<RefCell<Option<TcpHandle>>> = Rc::new(RefCell::new(Some(handle.clone())));

    let spare_for_then = spare.clone();
    connect_promise
        .then::<(Extract<UpstreamCell>,), _>(move |Extract(upstream)| -> Promise<Reactor> {
            spare_for_then.borrow_mut().take();
            complete_connect(reactor, handle, upstream)
        })
        .expect("freshly constructed promise");

    let spare_for_fail = spare.clone();
    connect_promise
        .finalize(move |settled| {
            if settled.is_rejected() {
                if let Some(client) = spare_for_fail.borrow_mut().take() {
                    let _ = wire::send_command_reply(reactor, client, Reply::HostUnreachable, unbound_addr());
                }
            }
        })
        .expect("freshly constructed promise");

    connect_promise
}

fn complete_connect(reactor: Reactor, client: TcpHandle, upstream: TcpHandle) -> Promise<Reactor> {
    let bound = upstream.borrow().local_addr().unwrap_or_else(|_| unbound_addr());
    let client_reply = client.clone();
    let p = wire::send_command_reply(reactor, client_reply, Reply::Succeeded, bound);
    p.then::<(), _>(move || -> Promise<Reactor> {
        let client_stream = unwrap_handle(client, "client");
        let upstream_stream = unwrap_handle(upstream, "upstream");
        stream_forward::forward(reactor, client_stream, upstream_stream)
    })
    .expect("freshly constructed promise");
    p
}

/// Reclaims the underlying `TcpStream` from a handle expected to have no
/// other outstanding owners at this point in the handshake.
fn unwrap_handle(handle: TcpHandle, label: &'static str) -> TcpStream {
    match Rc::try_unwrap(handle) {
        Ok(cell) => cell.into_inner(),
        Err(rc) => panic!(
            "socks5 {label} handle had {} outstanding references at handoff to forwarding",
            Rc::strong_count(&rc)
        ),
    }
}

fn handshake_failed(reactor: Reactor) -> Promise<Reactor> {
    Promise::rejected(
        reactor,
        vec![DynValue::from(ErrorCode::new(
            ErrorCodeKind::Custom("socks5_handshake_failed"),
            "SOCKS5 handshake did not complete",
        ))],
    )
}
