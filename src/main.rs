// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `voicebridge` entry point: load configuration, assemble the edge
//! router, serve it. Mirrors the pack's `selene_adapter_http` binary
//! shape (`TcpListener::bind` + `axum::serve`), with structured
//! `tracing` output in place of `println!`.

use std::net::SocketAddr;

use tracing::{error, info};

use voicebridge::config::Settings;
use voicebridge::edge::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            error!(%err, "fatal: invalid configuration");
            std::process::exit(1);
        }
    };

    let addr: SocketAddr = settings.bind_addr.parse()?;
    let environment = settings.environment.clone();
    let state = AppState::new(settings);
    let app = build_router(state);

    info!(%addr, environment, "voicebridge listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("voicebridge=info".parse().unwrap()))
        .init();
}
