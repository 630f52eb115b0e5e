//! 聊天中继服务端
//!
//! 基于 Tokio，同时提供 TCP 与 UDP 两种传输

mod broadcaster;
mod cli;
mod config;
mod datagram;
mod error;
mod registry;
mod relay;
mod router;
mod stream;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use relay::Relay;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("relay_server=debug".parse()?)
                .add_directive("protocol=debug".parse()?),
        )
        .init();

    let config = Cli::parse().into_config()?;
    info!(
        "Chat relay starting: stream {}, datagram {}, max {} users",
        config.stream.address(),
        config.datagram.address(),
        config.max_capacity
    );

    let relay = Relay::bind(&config).await?;
    info!(
        "Bound stream {} and datagram {}",
        relay.stream_addr(),
        relay.datagram_addr()
    );
    relay
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
