//! Periodic heartbeat emitter: sends `HEARTBEAT\nSS_ID:<id>\n\n` to the name
//! node every `t_beat` (spec §5). Grounded in the original storage server's
//! `heartbeat_thread_func`, reimplemented as a `tokio::time::interval` task
//! instead of a dedicated OS thread with a sleep loop.

use std::time::Duration;

use anyhow::{Context as _, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::warn;

/// Runs forever, emitting one heartbeat per tick. A failed send is logged
/// and retried on the next tick rather than treated as fatal — a brief NN
/// outage should not bring the storage node down.
pub async fn run(ss_id: u32, nn_address: String, nn_port: u16, t_beat: Duration) -> ! {
    let mut interval = tokio::time::interval(t_beat);
    loop {
        interval.tick().await;
        if let Err(err) = send_once(ss_id, &nn_address, nn_port).await {
            warn!(ss_id, error = %err, "heartbeat failed");
        }
    }
}

async fn send_once(ss_id: u32, nn_address: &str, nn_port: u16) -> Result<()> {
    let stream = TcpStream::connect((nn_address, nn_port)).await.context("connect to NN")?;
    let (read_half, mut write_half) = stream.into_split();
    write_half.write_all(format!("HEARTBEAT\nSS_ID:{ss_id}\n\n").as_bytes()).await?;
    write_half.flush().await?;

    let mut reader = BufReader::new(read_half);
    let mut status_line = String::new();
    reader.read_line(&mut status_line).await?;
    if status_line.trim() != "SUCCESS" {
        anyhow::bail!("NN rejected heartbeat: {}", status_line.trim());
    }
    Ok(())
}
