// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! sari - a single-threaded promise-composition library, with SOCKS5 and
//! command-proxy demo services built on it.
//!
//! This binary is a thin dispatcher: `sari socks5` and `sari proxy` hand
//! off to the demo crates' own connection-handling logic, sharing one
//! `current_thread` tokio runtime + `LocalSet` (required so the promise
//! core's executor can post onto it via `spawn_local`).

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use sari_reactor::{Exchanger, Reactor};
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "sari",
    about = "A single-threaded promise-composition library with SOCKS5 and command-proxy demos",
    version,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the SOCKS5 proxy demo
    Socks5 {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:1080")]
        listen: String,
    },
    /// Run the CONNECT/BIND rendezvous proxy demo
    Proxy {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:9050")]
        listen: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "sari=debug" } else { "sari=info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = tokio::task::LocalSet::new();

    let result = rt.block_on(local.run_until(async {
        match cli.command {
            Command::Socks5 { listen } => run_socks5(listen).await,
            Command::Proxy { listen } => run_proxy(listen).await,
        }
    }));

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run_socks5(listen: String) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&listen).await?;
    info!(%listen, "sari socks5 listening");

    let reactor = Reactor;
    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "accepted connection");
        let session = sari_socks5::handle_connection(reactor, stream);
        session
            .then::<(), _>(move || info!(%peer, "session complete"))
            .expect("freshly constructed promise");
        session
            .fail::<(), _>(move || error!(%peer, "session failed"))
            .expect("freshly constructed promise");
    }
}

async fn run_proxy(listen: String) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&listen).await?;
    info!(%listen, "sari proxy listening");

    let reactor = Reactor;
    let exchanger = Exchanger::new(reactor);
    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "accepted connection");
        let session = sari_proxy::handle_connection(reactor, exchanger.clone(), stream);
        session
            .then::<(), _>(move || info!(%peer, "session complete"))
            .expect("freshly constructed promise");
        session
            .fail::<(), _>(move || error!(%peer, "session failed"))
            .expect("freshly constructed promise");
    }
}
