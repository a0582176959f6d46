//! Storage node entry point: parses configuration, binds the client and
//! control ports, starts the heartbeat emitter, and serves forever.

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;

use docspp::config::SnConfig;
use docspp::storage_node::{heartbeat, server, StorageNode};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).with_writer(std::io::stderr).init();

    let config = SnConfig::parse_args(std::env::args().skip(1))?;
    let client_listener = TcpListener::bind(("0.0.0.0", config.client_port)).await?;
    let ss_listener = TcpListener::bind(("0.0.0.0", config.ss_port)).await?;
    tracing::info!(
        ss_id = config.ss_id,
        client_port = config.client_port,
        ss_port = config.ss_port,
        "storage node listening"
    );

    let node = Arc::new(StorageNode::new(config.ss_id, config.base_path.clone()));

    let heartbeat_node_id = node.ss_id;
    let nn_address = config.nn_address.clone();
    let nn_port = config.nn_port;
    let t_beat = config.t_beat;
    tokio::spawn(async move {
        heartbeat::run(heartbeat_node_id, nn_address, nn_port, t_beat).await;
    });

    server::serve(
        node,
        client_listener,
        ss_listener,
        config.nn_address,
        config.nn_port,
        "127.0.0.1".to_string(),
        config.client_port,
        config.ss_port,
    )
    .await
}
