// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! sari-socks5-server CLI - a standalone SOCKS5 proxy

use clap::Parser;
use owo_colors::OwoColorize;
use sari_reactor::Reactor;
use sari_socks5::server;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "sari-socks5-server",
    about = "A single-threaded SOCKS5 proxy built on sari-core promises",
    version,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:1080")]
    listen: String,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt().with_env_filter("sari=debug,sari_socks5=debug").init();
    } else {
        tracing_subscriber::fmt().with_env_filter("sari=info,sari_socks5=info").init();
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
    info!(%listen, "sari-socks5-server listening");

    let reactor = Reactor;
    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "accepted connection");
        let session = server::handle_connection(reactor, stream);
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
