// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The SOCKS5 wire format (RFC 1928): method negotiation, command
//! request/reply, and the three address encodings (IPv4, domain name,
//! IPv6). A demo peripheral to the promise core (§6); its interface to
//! `sari-core`/`sari-reactor` is a set of functions returning promises
//! that read or write one protocol message, built by chaining the
//! reactor's `read_exact`/`write_some` primitives through `.then`.

use std::any::Any;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::rc::Rc;

use sari_core::{DynValue, Promise, Thrown};
use sari_reactor::io_ops::{self, TcpHandle};
use sari_reactor::Reactor;

pub const PROTOCOL_VERSION: u8 = 0x05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    NoAuthRequired = 0x00,
    GssApi = 0x01,
    UsernamePassword = 0x02,
    NoAcceptableMethods = 0xFF,
}

impl Method {
    fn from_byte(b: u8) -> Option<Method> {
        match b {
            0x00 => Some(Method::NoAuthRequired),
            0x01 => Some(Method::GssApi),
            0x02 => Some(Method::UsernamePassword),
            0xFF => Some(Method::NoAcceptableMethods),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect = 0x01,
    Bind = 0x02,
    Udp = 0x03,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    V4 = 0x01,
    DomainName = 0x03,
    V6 = 0x04,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Succeeded = 0x00,
    GeneralServerFailure = 0x01,
    ConnectionNotAllowed = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TtlExpired = 0x06,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

/// A destination address/port, in any of the three SOCKS5 encodings.
#[derive(Debug, Clone)]
pub enum Destination {
    Socket(SocketAddr),
    DomainName { host: String, port: u16 },
}

impl Destination {
    pub fn port(&self) -> u16 {
        match self {
            Destination::Socket(addr) => addr.port(),
            Destination::DomainName { port, .. } => *port,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MethodRequest {
    pub methods: Vec<Method>,
}

impl MethodRequest {
    pub fn contains(&self, method: Method) -> bool {
        self.methods.contains(&method)
    }
}

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub command: Command,
    pub dest: Destination,
}

/// A protocol-level error distinct from reactor I/O errors, dispatched
/// through `fail` by the same typed-routing mechanism as any other
/// rejection value (§7's "domain error code").
#[derive(Debug, Clone, thiserror::Error)]
pub enum Socks5Error {
    #[error("unsupported SOCKS protocol version {0:#x}")]
    InvalidProtocolVersion(u8),
    #[error("unsupported SOCKS address type {0:#x}")]
    InvalidAddressType(u8),
    #[error("no acceptable authentication method offered")]
    NoAcceptableMethods,
    #[error("unsupported SOCKS command {0:#x}")]
    CommandNotSupported(u8),
}

fn socks5_error_value(e: Socks5Error) -> DynValue {
    DynValue::Other(Rc::new(e) as Rc<dyn Any>)
}

fn method_request_value(mr: MethodRequest) -> DynValue {
    DynValue::Other(Rc::new(mr) as Rc<dyn Any>)
}

fn command_request_value(cmd: u8, dest: Destination) -> DynValue {
    let command = match cmd {
        0x01 => Command::Connect,
        0x02 => Command::Bind,
        0x03 => Command::Udp,
        _ => Command::Connect,
    };
    DynValue::Other(Rc::new(CommandRequest { command, dest }) as Rc<dyn Any>)
}

fn encode_address(dest: &Destination) -> Vec<u8> {
    let mut out = Vec::new();
    match dest {
        Destination::Socket(SocketAddr::V4(a)) => {
            out.push(AddressType::V4 as u8);
            out.extend_from_slice(&a.ip().octets());
            out.extend_from_slice(&a.port().to_be_bytes());
        }
        Destination::Socket(SocketAddr::V6(a)) => {
            out.push(AddressType::V6 as u8);
            out.extend_from_slice(&a.ip().octets());
            out.extend_from_slice(&a.port().to_be_bytes());
        }
        Destination::DomainName { host, port } => {
            out.push(AddressType::DomainName as u8);
            out.push(host.len() as u8);
            out.extend_from_slice(host.as_bytes());
            out.extend_from_slice(&port.to_be_bytes());
        }
    }
    out
}

/// Reads and validates a method-selection request
/// (`VER | NMETHODS | METHODS[]`), fulfilling with a boxed
/// [`MethodRequest`].
pub fn recv_method_request(reactor: Reactor, handle: TcpHandle) -> Promise<Reactor> {
    let h1 = handle.clone();
    let p = io_ops::read_exact(reactor, handle, 2);
    p.then::<(Vec<u8>,), _>(move |header: Vec<u8>| -> Result<Promise<Reactor>, Thrown> {
        let ver = header[0];
        let nmethods = header[1] as usize;
        if ver != PROTOCOL_VERSION {
            return Err(Thrown::Typed(socks5_error_value(Socks5Error::InvalidProtocolVersion(ver))));
        }
        let p2 = io_ops::read_exact(reactor, h1.clone(), nmethods);
        p2.then::<(Vec<u8>,), _>(|raw: Vec<u8>| {
            let methods = raw.iter().filter_map(|b| Method::from_byte(*b)).collect();
            method_request_value(MethodRequest { methods })
        })
        .expect("freshly constructed promise");
        Ok(p2)
    })
    .expect("freshly constructed promise");
    p
}

/// Sends the server's chosen method (`VER | METHOD`).
pub fn send_method_reply(reactor: Reactor, handle: TcpHandle, method: Method) -> Promise<Reactor> {
    io_ops::write_some(reactor, handle, vec![PROTOCOL_VERSION, method as u8])
}

/// Reads a command request (`VER | CMD | RSV | ATYP | DST.ADDR | DST.PORT`),
/// fulfilling with a boxed [`CommandRequest`].
pub fn recv_command_request(reactor: Reactor, handle: TcpHandle) -> Promise<Reactor> {
    let h1 = handle.clone();
    let p = io_ops::read_exact(reactor, handle, 4);
    p.then::<(Vec<u8>,), _>(move |header: Vec<u8>| {
        let ver = header[0];
        let cmd = header[1];
        let atyp = header[3];
        if ver != PROTOCOL_VERSION {
            return Promise::rejected(
                reactor,
                vec![socks5_error_value(Socks5Error::InvalidProtocolVersion(ver))],
            );
        }
        match atyp {
            0x01 => read_v4_dest(reactor, h1.clone(), cmd),
            0x03 => read_domain_dest(reactor, h1.clone(), cmd),
            0x04 => read_v6_dest(reactor, h1.clone(), cmd),
            other => Promise::rejected(
                reactor,
                vec![socks5_error_value(Socks5Error::InvalidAddressType(other))],
            ),
        }
    })
    .expect("freshly constructed promise");
    p
}

fn read_v4_dest(reactor: Reactor, handle: TcpHandle, cmd: u8) -> Promise<Reactor> {
    let p = io_ops::read_exact(reactor, handle, 6);
    p.then::<(Vec<u8>,), _>(move |body: Vec<u8>| {
        let ip = Ipv4Addr::new(body[0], body[1], body[2], body[3]);
        let port = u16::from_be_bytes([body[4], body[5]]);
        command_request_value(cmd, Destination::Socket(SocketAddr::new(IpAddr::V4(ip), port)))
    })
    .expect("freshly constructed promise");
    p
}

fn read_v6_dest(reactor: Reactor, handle: TcpHandle, cmd: u8) -> Promise<Reactor> {
    let p = io_ops::read_exact(reactor, handle, 18);
    p.then::<(Vec<u8>,), _>(move |body: Vec<u8>| {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&body[..16]);
        let ip = Ipv6Addr::from(octets);
        let port = u16::from_be_bytes([body[16], body[17]]);
        command_request_value(cmd, Destination::Socket(SocketAddr::new(IpAddr::V6(ip), port)))
    })
    .expect("freshly constructed promise");
    p
}

fn read_domain_dest(reactor: Reactor, handle: TcpHandle, cmd: u8) -> Promise<Reactor> {
    let h1 = handle.clone();
    let p = io_ops::read_exact(reactor, handle, 1);
    p.then::<(Vec<u8>,), _>(move |len: Vec<u8>| {
        let n = len[0] as usize;
        let p2 = io_ops::read_exact(reactor, h1.clone(), n + 2);
        p2.then::<(Vec<u8>,), _>(move |body: Vec<u8>| {
            let host = String::from_utf8_lossy(&body[..n]).into_owned();
            let port = u16::from_be_bytes([body[n], body[n + 1]]);
            command_request_value(cmd, Destination::DomainName { host, port })
        })
        .expect("freshly constructed promise");
        p2
    })
    .expect("freshly constructed promise");
    p
}

/// Sends a command reply (`VER | REP | RSV | ATYP | BND.ADDR | BND.PORT`).
pub fn send_command_reply(
    reactor: Reactor,
    handle: TcpHandle,
    reply: Reply,
    bound: SocketAddr,
) -> Promise<Reactor> {
    let mut out = vec![PROTOCOL_VERSION, reply as u8, 0x00];
    out.extend_from_slice(&encode_address(&Destination::Socket(bound)));
    io_ops::write_some(reactor, handle, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sari_core::Extract;
    use std::cell::RefCell;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn encodes_ipv4_destination() {
        let dest = Destination::Socket("127.0.0.1:1080".parse().unwrap());
        let bytes = encode_address(&dest);
        assert_eq!(bytes[0], AddressType::V4 as u8);
        assert_eq!(&bytes[1..5], &[127, 0, 0, 1]);
        assert_eq!(u16::from_be_bytes([bytes[5], bytes[6]]), 1080);
    }

    #[test]
    fn encodes_ipv6_destination() {
        let dest = Destination::Socket("[::1]:1080".parse().unwrap());
        let bytes = encode_address(&dest);
        assert_eq!(bytes[0], AddressType::V6 as u8);
        assert_eq!(&bytes[1..17], &Ipv6Addr::LOCALHOST.octets());
        assert_eq!(u16::from_be_bytes([bytes[17], bytes[18]]), 1080);
    }

    #[test]
    fn encodes_domain_name_destination() {
        let dest = Destination::DomainName {
            host: "example.com".to_string(),
            port: 443,
        };
        let bytes = encode_address(&dest);
        assert_eq!(bytes[0], AddressType::DomainName as u8);
        assert_eq!(bytes[1] as usize, "example.com".len());
        assert_eq!(&bytes[2..2 + 11], b"example.com");
    }

    #[test]
    fn method_request_contains() {
        let mr = MethodRequest {
            methods: vec![Method::NoAuthRequired],
        };
        assert!(mr.contains(Method::NoAuthRequired));
        assert!(!mr.contains(Method::UsernamePassword));
    }

    /// Connects a loopback pair and returns the accepted server-side
    /// `TcpHandle`, after writing `wire_bytes` into the client side so a
    /// decode function reading from the handle observes them.
    async fn handle_with_bytes_written(wire_bytes: &[u8]) -> TcpHandle {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        client.write_all(wire_bytes).await.unwrap();
        Rc::new(RefCell::new(server))
    }

    async fn decode_command_request(p: Promise<Reactor>) -> CommandRequest {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Rc::new(RefCell::new(Some(tx)));
        p.then::<(Extract<CommandRequest>,), _>(move |Extract(req)| {
            if let Some(tx) = tx.borrow_mut().take() {
                let _ = tx.send((*req).clone());
            }
        })
        .expect("freshly constructed promise");
        rx.await.expect("decode promise settled")
    }

    #[tokio::test(flavor = "current_thread")]
    async fn round_trips_ipv4_destination() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let mut wire = vec![127u8, 0, 0, 1];
                wire.extend_from_slice(&1080u16.to_be_bytes());
                let handle = handle_with_bytes_written(&wire).await;
                let req = decode_command_request(read_v4_dest(Reactor, handle, 0x01)).await;
                match req.dest {
                    Destination::Socket(addr) => {
                        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
                        assert_eq!(addr.port(), 1080);
                    }
                    other => panic!("expected a socket destination, got {other:?}"),
                }
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn round_trips_ipv6_destination() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let mut wire = Ipv6Addr::LOCALHOST.octets().to_vec();
                wire.extend_from_slice(&1080u16.to_be_bytes());
                let handle = handle_with_bytes_written(&wire).await;
                let req = decode_command_request(read_v6_dest(Reactor, handle, 0x01)).await;
                match req.dest {
                    Destination::Socket(addr) => {
                        assert_eq!(addr.ip(), IpAddr::V6(Ipv6Addr::LOCALHOST));
                        assert_eq!(addr.port(), 1080);
                    }
                    other => panic!("expected a socket destination, got {other:?}"),
                }
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn round_trips_domain_name_destination() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let host = "example.com";
                let mut wire = vec![host.len() as u8];
                wire.extend_from_slice(host.as_bytes());
                wire.extend_from_slice(&443u16.to_be_bytes());
                let handle = handle_with_bytes_written(&wire).await;
                let req = decode_command_request(read_domain_dest(Reactor, handle, 0x01)).await;
                match req.dest {
                    Destination::DomainName { host: got_host, port } => {
                        assert_eq!(got_host, host);
                        assert_eq!(port, 443);
                    }
                    other => panic!("expected a domain-name destination, got {other:?}"),
                }
            })
            .await;
    }
}
