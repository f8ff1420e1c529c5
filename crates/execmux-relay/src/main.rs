//! Execmux Relay Binary
//!
//! Listens on two addresses and bridges every pair of accepted framed
//! connections, one from each side, with the passive proxy.

use anyhow::{Context, Result};
use execmux::{proxy, CompletionSignal};
use execmux_transport::framed;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

mod config;

use config::RelayConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = RelayConfig::from_env()?;
    info!("Starting execmux relay");

    let listener_a = TcpListener::bind(&config.listen_a)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_a))?;
    let listener_b = TcpListener::bind(&config.listen_b)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_b))?;
    info!(
        "Relaying between {} and {}",
        listener_a.local_addr()?,
        listener_b.local_addr()?
    );

    tokio::select! {
        result = serve(&listener_a, &listener_b, config.max_frame_size) => {
            if let Err(e) = &result {
                error!("Relay error: {}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {}
    }

    info!("Relay shutting down");
    Ok(())
}

type Leg = (TcpStream, SocketAddr);

/// Accept one connection on each listener and bridge them, forever
///
/// Both listeners are accepted at once. A leg that arrives first waits for
/// its peer and is dropped if it hangs up in the meantime.
async fn serve(a: &TcpListener, b: &TcpListener, max_frame_size: usize) -> Result<()> {
    let mut leg_a: Option<Leg> = None;
    let mut leg_b: Option<Leg> = None;

    loop {
        tokio::select! {
            accepted = a.accept(), if leg_a.is_none() => {
                leg_a = Some(accepted.context("Accept failed on first leg")?);
            }
            accepted = b.accept(), if leg_b.is_none() => {
                leg_b = Some(accepted.context("Accept failed on second leg")?);
            }
            _ = hung_up(leg_a.as_ref()) => {
                if let Some((_, peer)) = leg_a.take() {
                    info!("{} hung up before it was paired", peer);
                }
            }
            _ = hung_up(leg_b.as_ref()) => {
                if let Some((_, peer)) = leg_b.take() {
                    info!("{} hung up before it was paired", peer);
                }
            }
        }

        match (leg_a.take(), leg_b.take()) {
            (Some((stream_a, peer_a)), Some((stream_b, peer_b))) => {
                info!("Bridging {} <-> {}", peer_a, peer_b);
                let done = bridge(stream_a, stream_b, max_frame_size);
                tokio::spawn(async move {
                    done.wait().await;
                    info!("Bridge {} <-> {} finished", peer_a, peer_b);
                });
            }
            (a_left, b_left) => {
                leg_a = a_left;
                leg_b = b_left;
            }
        }
    }
}

/// Resolve once a parked leg's peer has gone away
async fn hung_up(leg: Option<&Leg>) {
    let Some((stream, _)) = leg else {
        return std::future::pending().await;
    };

    let mut byte = [0u8; 1];
    match stream.peek(&mut byte).await {
        Ok(0) | Err(_) => {}
        // Early data stays queued for the proxy
        Ok(_) => std::future::pending().await,
    }
}

fn bridge(a: TcpStream, b: TcpStream, max_frame_size: usize) -> CompletionSignal {
    for stream in [&a, &b] {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
    }

    proxy(
        framed::connect_with_max_frame_size(a, max_frame_size),
        framed::connect_with_max_frame_size(b, max_frame_size),
    )
}
