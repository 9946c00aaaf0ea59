// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! sari-proxy CLI - a standalone CONNECT/BIND rendezvous proxy

use clap::Parser;
use owo_colors::OwoColorize;
use sari_proxy::command;
use sari_reactor::{Exchanger, Reactor};
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "sari-proxy",
    about = "A single-threaded CONNECT/BIND rendezvous proxy built on sari-core promises",
    version,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:9050")]
    listen: String,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt().with_env_filter("sari=debug,sari_proxy=debug").init();
    } else {
        tracing_subscriber::fmt().with_env_filter("sari=info,sari_proxy=info").init();
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = tokio::task::LocalSet::new();

    let result = rt.block_on(local.run_until(run(cli.listen)));
    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(listen: String) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&listen).await?;
    info!(%listen, "sari-proxy listening");

    let reactor = Reactor;
    let exchanger = Exchanger::new(reactor);
    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "accepted connection");
        let session = command::handle_connection(reactor, exchanger.clone(), stream);
        session
            .then::<(), _>(move || {
                info!(%peer, "session complete");
            })
            .expect("freshly constructed promise");
        session
            .fail::<(), _>(move || {
                error!(%peer, "session failed");
            })
            .expect("freshly constructed promise");
    }
}
