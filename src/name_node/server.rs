//! Name node TCP server: accepts control connections, identifies each as a
//! client or storage node by its first verb, and dispatches the rest of the
//! connection's requests (spec §6 control channel, §4.1 operations).
//!
//! Grounded in the reference's `NFSTcpListener`/`process_socket` accept loop,
//! generalized from one RPC dispatch table to the verb-tagged line protocol
//! here, plus a periodic liveness-sweep task the reference has no analogue
//! for (spec §5's heartbeat monitor).

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::error::StatusCode;
use crate::protocol::verbs::Verb;
use crate::protocol::wire::{read_request, write_response, Response};

use super::NameNode;

/// Runs the name node forever: the accept loop plus a background liveness
/// sweep. Returns only on a listener error.
pub async fn serve(nn: Arc<NameNode>, listener: TcpListener) -> Result<()> {
    let sweep_nn = nn.clone();
    let t_beat = sweep_nn.config().t_beat;
    tokio::spawn(async move {
        let mut dead = HashSet::new();
        let mut interval = tokio::time::interval(t_beat);
        loop {
            interval.tick().await;
            sweep_nn.sweep_liveness(&mut dead);
        }
    });

    loop {
        let (socket, peer_addr) = listener.accept().await.context("accept failed")?;
        let nn = nn.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(nn, socket, peer_addr.to_string()).await {
                warn!(peer_addr, error = %err, "connection ended with error");
            }
        });
    }
}

async fn handle_connection(nn: Arc<NameNode>, socket: TcpStream, peer_addr: String) -> Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    let mut session: Option<super::registry::SessionId> = None;
    let mut sn_id: Option<u32> = None;

    loop {
        let req = match read_request(&mut reader).await {
            Ok(Some(req)) => req,
            Ok(None) => break, // clean disconnect: spec §7 transport errors are silent
            Err(err) => {
                warn!(peer_addr, error = %err, "malformed request");
                write_response(&mut write_half, &Response::error(StatusCode::InvalidCommand)).await.ok();
                break;
            }
        };

        let resp = dispatch(&nn, &req, &peer_addr, &mut session, &mut sn_id).await;
        if write_response(&mut write_half, &resp).await.is_err() {
            break;
        }
        if matches!(req.verb, Verb::ClientRegister | Verb::SsRegister) && matches!(resp, Response::Error(..))
        {
            break; // protocol error on identification: no point continuing
        }
    }

    if let Some(id) = session {
        nn.drop_client(id);
    }
    if let Some(id) = sn_id {
        info!(sn_id = id, peer_addr, "storage node control connection closed");
    }
    Ok(())
}

async fn dispatch(
    nn: &Arc<NameNode>,
    req: &crate::protocol::wire::Request,
    peer_addr: &str,
    session: &mut Option<super::registry::SessionId>,
    sn_id: &mut Option<u32>,
) -> Response {
    match req.verb {
        Verb::ClientRegister => match req.require("USERNAME") {
            Ok(username) => match nn.register_client(username, peer_addr) {
                Ok(id) => {
                    *session = Some(id);
                    Response::ok()
                }
                Err(code) => Response::error(code),
            },
            Err(code) => Response::error(code),
        },

        Verb::SsRegister => handle_ss_register(nn, req, sn_id).await,

        Verb::Read => with_username(req, |username| {
            let path = req.require("PATH")?;
            nn.read(path, username)
        })
        .map(|(ip, port)| {
            Response::ok_with([("SS_IP".to_string(), ip), ("SS_PORT".to_string(), port.to_string())])
        })
        .unwrap_or_else(Response::error),

        Verb::Write => with_username(req, |username| {
            let path = req.require("PATH")?;
            nn.write(path, username)
        })
        .map(|(ip, port)| {
            Response::ok_with([("SS_IP".to_string(), ip), ("SS_PORT".to_string(), port.to_string())])
        })
        .unwrap_or_else(Response::error),

        Verb::Create => match req.require("PATH").and_then(|p| req.require("USERNAME").map(|u| (p, u))) {
            Ok((path, owner)) => match nn.create(path, owner).await {
                Ok(()) => Response::ok(),
                Err(code) => Response::error(code),
            },
            Err(code) => Response::error(code),
        },

        Verb::Delete => match req.require("PATH").and_then(|p| req.require("USERNAME").map(|u| (p, u))) {
            Ok((path, username)) => match nn.delete(path, username).await {
                Ok(()) => Response::ok(),
                Err(code) => Response::error(code),
            },
            Err(code) => Response::error(code),
        },

        Verb::AddAccess => handle_add_access(nn, req),
        Verb::RemAccess => handle_rem_access(nn, req),

        Verb::Heartbeat => match req.require("SS_ID").and_then(parse_u32) {
            Ok(id) => match nn.heartbeat(id) {
                Ok(()) => Response::ok(),
                Err(code) => Response::error(code),
            },
            Err(code) => Response::error(code),
        },

        // INFO and COPY are served by the SN directly on the data channel
        // (spec §4.2); the NN only ever redirects, it never answers them.
        Verb::Info | Verb::Copy => Response::error(StatusCode::InvalidCommand),
    }
}

fn with_username<T>(
    req: &crate::protocol::wire::Request,
    f: impl FnOnce(&str) -> Result<T, StatusCode>,
) -> Result<T, StatusCode> {
    let username = req.require("USERNAME")?;
    f(username)
}

fn parse_u32(s: &str) -> Result<u32, StatusCode> {
    s.parse().map_err(|_| StatusCode::InvalidCommand)
}

async fn handle_ss_register(
    nn: &Arc<NameNode>,
    req: &crate::protocol::wire::Request,
    sn_id: &mut Option<u32>,
) -> Response {
    let fields = || -> Result<(u32, u16, u16), StatusCode> {
        Ok((
            parse_u32(req.require("SS_ID")?)?,
            req.require("CLIENT_PORT")?.parse().map_err(|_| StatusCode::InvalidCommand)?,
            req.require("SS_PORT")?.parse().map_err(|_| StatusCode::InvalidCommand)?,
        ))
    };
    let (id, client_port, ss_port) = match fields() {
        Ok(v) => v,
        Err(code) => return Response::error(code),
    };
    let address = req.get("SS_ADDRESS").unwrap_or("127.0.0.1").to_string();
    let files: Vec<String> = req
        .get("FILES")
        .map(|s| s.split(',').filter(|p| !p.is_empty()).map(String::from).collect())
        .unwrap_or_default();

    match nn.register_sn(id, address, client_port, ss_port, files) {
        Ok(()) => {
            *sn_id = Some(id);
            Response::ok()
        }
        Err(code) => Response::error(code),
    }
}

fn handle_add_access(nn: &Arc<NameNode>, req: &crate::protocol::wire::Request) -> Response {
    let parsed = (|| -> Result<_, StatusCode> {
        let path = req.require("PATH")?;
        let requester = req.require("USERNAME")?;
        let grantee = req.require("GRANTEE")?;
        let can_read = req.get("CAN_READ") == Some("1");
        let can_write = req.get("CAN_WRITE") == Some("1");
        Ok((path, requester, grantee, can_read, can_write))
    })();
    match parsed {
        Ok((path, requester, grantee, can_read, can_write)) => {
            match nn.add_access(path, requester, grantee, can_read, can_write) {
                Ok(()) => Response::ok(),
                Err(code) => Response::error(code),
            }
        }
        Err(code) => Response::error(code),
    }
}

fn handle_rem_access(nn: &Arc<NameNode>, req: &crate::protocol::wire::Request) -> Response {
    let parsed = (|| -> Result<_, StatusCode> {
        let path = req.require("PATH")?;
        let requester = req.require("USERNAME")?;
        let grantee = req.require("GRANTEE")?;
        Ok((path, requester, grantee))
    })();
    match parsed {
        Ok((path, requester, grantee)) => match nn.remove_access(path, requester, grantee) {
            Ok(()) => Response::ok(),
            Err(code) => Response::error(code),
        },
        Err(code) => Response::error(code),
    }
}

/// Logged once at startup so operators can see the bound address immediately
/// (matches the reference's startup banner style in `main.rs`).
pub fn log_startup(addr: &std::net::SocketAddr) {
    info!(%addr, "name node listening");
}
