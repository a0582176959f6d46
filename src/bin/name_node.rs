//! Name node entry point: parses configuration, binds the control port, and
//! serves forever (mirrors the reference's `mirror_fs::main` structure).

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;

use docspp::config::NnConfig;
use docspp::name_node::{server, NameNode};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).with_writer(std::io::stderr).init();

    let config = NnConfig::parse_args(std::env::args().skip(1))?;
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    server::log_startup(&listener.local_addr()?);

    let nn = Arc::new(NameNode::new(config));
    server::serve(nn, listener).await
}
