//! Outbound control client: the name node's side of talking to an SN's own
//! control port (`ss_port`) to forward `CREATE`/`DELETE` directives (spec
//! §4.1). Reuses the same `protocol::wire` framing as the client-facing
//! control channel, since both sides speak the identical line protocol.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::protocol::verbs::Verb;
use crate::protocol::wire::{read_response, Response};

const SN_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends `CREATE\nPATH:<path>\n\n` to the SN and waits for its reply.
pub async fn send_create(address: &str, port: u16, path: &str) -> Result<()> {
    let mut fields = HashMap::new();
    fields.insert("PATH".to_string(), path.to_string());
    match send_request(address, port, Verb::Create, fields).await? {
        Response::Success(_) => Ok(()),
        Response::Error(code, _) => Err(anyhow!("SN rejected CREATE: {code}")),
    }
}

/// Sends `DELETE\nPATH:<path>\n\n` to the SN and waits for its reply.
pub async fn send_delete(address: &str, port: u16, path: &str) -> Result<()> {
    let mut fields = HashMap::new();
    fields.insert("PATH".to_string(), path.to_string());
    match send_request(address, port, Verb::Delete, fields).await? {
        Response::Success(_) => Ok(()),
        Response::Error(code, _) => Err(anyhow!("SN rejected DELETE: {code}")),
    }
}

async fn send_request(
    address: &str,
    port: u16,
    verb: Verb,
    fields: HashMap<String, String>,
) -> Result<Response> {
    let stream = timeout(SN_CALL_TIMEOUT, TcpStream::connect((address, port))).await??;
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut line = String::new();
    line.push_str(verb.as_str());
    line.push('\n');
    for (k, v) in &fields {
        line.push_str(k);
        line.push(':');
        line.push_str(v);
        line.push('\n');
    }
    line.push('\n');

    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;

    timeout(SN_CALL_TIMEOUT, read_response(&mut reader))
        .await
        .map_err(|_| anyhow!("timed out waiting for SN response"))?
}
