//! Storage node TCP servers: the client-facing data channel on `client_port`
//! and the name-node-facing control channel on `ss_port` (spec §6).
//!
//! Grounded in the reference's `process_socket`/`NFSTcp::bind` pair, split
//! into two listeners since this system's data and control channels use two
//! different wire formats on two different ports (spec §6), unlike the
//! reference's single NFS port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Result;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::error::StatusCode;
use crate::protocol::data::{self, DataRequest};
use crate::protocol::verbs::Verb;
use crate::protocol::wire::{read_request, write_response, Request, Response};

use super::registry::FileEntry;
use super::StorageNode;

/// Registers with the name node, then serves both listeners until either
/// fails.
#[allow(clippy::too_many_arguments)]
pub async fn serve(
    node: Arc<StorageNode>,
    client_listener: TcpListener,
    ss_listener: TcpListener,
    nn_address: String,
    nn_port: u16,
    address: String,
    client_port: u16,
    ss_port: u16,
) -> Result<()> {
    register_with_nn(&node, &nn_address, nn_port, &address, client_port, ss_port).await?;

    let client_node = node.clone();
    let client_task = tokio::spawn(async move {
        if let Err(err) = serve_client_channel(client_node, client_listener).await {
            warn!(error = %err, "client channel stopped");
        }
    });

    let ss_node = node.clone();
    let ss_task = tokio::spawn(async move {
        if let Err(err) = serve_control_channel(ss_node, ss_listener).await {
            warn!(error = %err, "control channel stopped");
        }
    });

    let _ = tokio::join!(client_task, ss_task);
    Ok(())
}

async fn register_with_nn(
    node: &StorageNode,
    nn_address: &str,
    nn_port: u16,
    address: &str,
    client_port: u16,
    ss_port: u16,
) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let files = node.scan_files().map_err(|code| anyhow::anyhow!("scan failed: {code}"))?;
    let stream = TcpStream::connect((nn_address, nn_port)).await?;
    let (read_half, mut write_half) = stream.into_split();

    let mut line = format!(
        "SS_REGISTER\nSS_ID:{}\nSS_ADDRESS:{}\nCLIENT_PORT:{}\nSS_PORT:{}\n",
        node.ss_id, address, client_port, ss_port,
    );
    line.push_str(&format!("FILES:{}\n\n", files.join(",")));
    write_half.write_all(line.as_bytes()).await?;
    write_half.flush().await?;

    let mut reader = BufReader::new(read_half);
    let resp = crate::protocol::wire::read_response(&mut reader).await?;
    match resp {
        Response::Success(_) => {
            info!(ss_id = node.ss_id, files = files.len(), "registered with name node");
            Ok(())
        }
        Response::Error(code, _) => Err(anyhow::anyhow!("NN rejected registration: {code}")),
    }
}

async fn serve_client_channel(node: Arc<StorageNode>, listener: TcpListener) -> Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        let node = node.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_client_connection(node, socket, peer).await {
                warn!(%peer, error = %err, "data connection ended with error");
            }
        });
    }
}

async fn handle_client_connection(node: Arc<StorageNode>, socket: TcpStream, peer: SocketAddr) -> Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    let holder = node.new_holder();

    loop {
        let req = match DataRequest::read(&mut reader).await {
            Ok(Some(req)) => req,
            Ok(None) => break,
            Err(err) => {
                warn!(%peer, error = %err, "malformed data request");
                break;
            }
        };

        match req {
            DataRequest::Read { path } => match node.read(&path) {
                Ok(bytes) => data::write_success_payload(&mut write_half, &bytes).await?,
                Err(code) => data::write_error(&mut write_half, code).await?,
            },
            DataRequest::ReadSentence { path, index } => match node.read_sentence(&path, index, holder) {
                Ok(bytes) => data::write_success_payload(&mut write_half, &bytes).await?,
                Err(code) => data::write_error(&mut write_half, code).await?,
            },
            DataRequest::Write { path, index, len } => {
                let payload = data::read_payload(&mut reader, len).await?;
                match node.write_sentence(&path, index, &payload, holder) {
                    Ok(()) => data::write_success(&mut write_half).await?,
                    Err(code) => data::write_error(&mut write_half, code).await?,
                }
            }
            DataRequest::PutFile { path, len } => {
                let payload = data::read_payload(&mut reader, len).await?;
                match node.write_whole(&path, &payload) {
                    Ok(()) => data::write_success(&mut write_half).await?,
                    Err(code) => data::write_error(&mut write_half, code).await?,
                }
            }
            DataRequest::Create { path } => match node.create(&path) {
                Ok(()) => data::write_success(&mut write_half).await?,
                Err(code) => data::write_error(&mut write_half, code).await?,
            },
            DataRequest::Delete { path } => match node.delete(&path) {
                Ok(()) => data::write_success(&mut write_half).await?,
                Err(code) => data::write_error(&mut write_half, code).await?,
            },
            DataRequest::Copy { path, dest_addr, dest_port } => {
                match handle_copy(&node, &path, &dest_addr, dest_port).await {
                    Ok(()) => data::write_success(&mut write_half).await?,
                    Err(code) => data::write_error(&mut write_half, code).await?,
                }
            }
            DataRequest::Info { path } => match node.info(&path) {
                Ok(entry) => data::write_success_fields(&mut write_half, &info_fields(&entry)).await?,
                Err(code) => data::write_error(&mut write_half, code).await?,
            },
        }
    }

    node.release_all(holder);
    Ok(())
}

/// Streams `path`'s content to `dest-sn-addr` over the data channel, which
/// creates the file there and ingests the stream (spec §4.2 `copy`).
async fn handle_copy(node: &StorageNode, path: &str, dest_addr: &str, dest_port: u16) -> Result<(), StatusCode> {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

    let content = node.read(path)?;
    let stream = TcpStream::connect((dest_addr, dest_port)).await.map_err(|_| StatusCode::ConnectionFailed)?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    write_half
        .write_all(format!("CREATE {path}\n").as_bytes())
        .await
        .map_err(|_| StatusCode::ConnectionFailed)?;
    let mut create_status = String::new();
    reader.read_line(&mut create_status).await.map_err(|_| StatusCode::ConnectionFailed)?;
    if create_status.trim() != "SUCCESS" {
        return Err(StatusCode::ConnectionFailed);
    }

    write_half
        .write_all(format!("PUTFILE {path}\n{}\n", content.len()).as_bytes())
        .await
        .map_err(|_| StatusCode::ConnectionFailed)?;
    write_half.write_all(&content).await.map_err(|_| StatusCode::ConnectionFailed)?;
    write_half.flush().await.map_err(|_| StatusCode::ConnectionFailed)?;

    let mut put_status = String::new();
    reader.read_line(&mut put_status).await.map_err(|_| StatusCode::ConnectionFailed)?;
    if put_status.trim() != "SUCCESS" {
        return Err(StatusCode::ConnectionFailed);
    }

    Ok(())
}

fn info_fields(entry: &FileEntry) -> Vec<(&'static str, String)> {
    vec![
        ("PATH", entry.path.clone()),
        ("SIZE", entry.size.to_string()),
        ("SENTENCES", entry.sentence_count.to_string()),
        ("CREATED", epoch_secs(entry.created_at).to_string()),
        ("MODIFIED", epoch_secs(entry.modified_at).to_string()),
        ("IS_DIR", if entry.is_dir { "1".to_string() } else { "0".to_string() }),
    ]
}

fn epoch_secs(t: SystemTime) -> u64 {
    t.duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

async fn serve_control_channel(node: Arc<StorageNode>, listener: TcpListener) -> Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        let node = node.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_control_connection(node, socket).await {
                warn!(%peer, error = %err, "control connection ended with error");
            }
        });
    }
}

async fn handle_control_connection(node: Arc<StorageNode>, socket: TcpStream) -> Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let req: Request = match read_request(&mut reader).await {
            Ok(Some(req)) => req,
            Ok(None) => break,
            Err(_) => {
                write_response(&mut write_half, &Response::error(StatusCode::InvalidCommand)).await.ok();
                break;
            }
        };

        let resp = match req.verb {
            Verb::Create => match req.require("PATH") {
                Ok(path) => match node.create(path) {
                    Ok(()) => Response::ok(),
                    Err(code) => Response::error(code),
                },
                Err(code) => Response::error(code),
            },
            Verb::Delete => match req.require("PATH") {
                Ok(path) => match node.delete(path) {
                    Ok(()) => Response::ok(),
                    Err(code) => Response::error(code),
                },
                Err(code) => Response::error(code),
            },
            _ => Response::error(StatusCode::InvalidCommand),
        };

        if write_response(&mut write_half, &resp).await.is_err() {
            break;
        }
    }
    Ok(())
}
