//! Data-channel framing: the lighter-weight protocol used on the direct
//! client↔SN connection after the name node redirects a client (spec §6).
//!
//! Unlike the control channel's `KEY:VALUE` blocks, the data channel carries
//! one positional command line (`VERB <path> [args...]`) optionally followed
//! by a raw byte payload, since the only payloads that ever cross this
//! channel are whole files and single sentences.

use std::fmt;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::StatusCode;

/// A parsed data-channel request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataRequest {
    Read { path: String },
    ReadSentence { path: String, index: usize },
    Write { path: String, index: usize, len: usize },
    PutFile { path: String, len: usize },
    Create { path: String },
    Delete { path: String },
    Copy { path: String, dest_addr: String, dest_port: u16 },
    Info { path: String },
}

impl DataRequest {
    pub async fn read<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<Self>> {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or_else(|| anyhow!("empty data request"))?;

        let req = match verb {
            "READ" => DataRequest::Read { path: next_arg(&mut parts, "path")?.to_string() },
            "READSENT" => DataRequest::ReadSentence {
                path: next_arg(&mut parts, "path")?.to_string(),
                index: next_arg(&mut parts, "idx")?.parse()?,
            },
            "WRITE" => {
                let path = next_arg(&mut parts, "path")?.to_string();
                let index = next_arg(&mut parts, "idx")?.parse()?;
                let mut len_line = String::new();
                reader.read_line(&mut len_line).await?;
                let len: usize = len_line.trim().parse()?;
                DataRequest::Write { path, index, len }
            }
            "PUTFILE" => {
                let path = next_arg(&mut parts, "path")?.to_string();
                let mut len_line = String::new();
                reader.read_line(&mut len_line).await?;
                let len: usize = len_line.trim().parse()?;
                DataRequest::PutFile { path, len }
            }
            "CREATE" => DataRequest::Create { path: next_arg(&mut parts, "path")?.to_string() },
            "DELETE" => DataRequest::Delete { path: next_arg(&mut parts, "path")?.to_string() },
            "COPY" => DataRequest::Copy {
                path: next_arg(&mut parts, "path")?.to_string(),
                dest_addr: next_arg(&mut parts, "dest_addr")?.to_string(),
                dest_port: next_arg(&mut parts, "dest_port")?.parse()?,
            },
            "INFO" => DataRequest::Info { path: next_arg(&mut parts, "path")?.to_string() },
            other => return Err(anyhow!("unknown data verb: {other}")),
        };
        Ok(Some(req))
    }
}

fn next_arg<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    name: &'static str,
) -> Result<&'a str> {
    parts.next().ok_or_else(|| anyhow!("missing argument: {name}"))
}

impl fmt::Display for DataRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataRequest::Read { path } => write!(f, "READ {path}"),
            DataRequest::ReadSentence { path, index } => write!(f, "READSENT {path} {index}"),
            DataRequest::Write { path, index, len } => write!(f, "WRITE {path} {index}\n{len}"),
            DataRequest::PutFile { path, len } => write!(f, "PUTFILE {path}\n{len}"),
            DataRequest::Create { path } => write!(f, "CREATE {path}"),
            DataRequest::Delete { path } => write!(f, "DELETE {path}"),
            DataRequest::Copy { path, dest_addr, dest_port } => {
                write!(f, "COPY {path} {dest_addr} {dest_port}")
            }
            DataRequest::Info { path } => write!(f, "INFO {path}"),
        }
    }
}

/// Reads exactly `len` bytes of payload following a `WRITE` request line.
pub async fn read_payload<R: AsyncRead + Unpin>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Writes `SUCCESS\nSIZE:<n>\n<bytes>`.
pub async fn write_success_payload<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<()> {
    writer.write_all(format!("SUCCESS\nSIZE:{}\n", payload.len()).as_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Writes a bare `SUCCESS` with no payload (CREATE/DELETE acknowledgements).
pub async fn write_success<W: AsyncWrite + Unpin>(writer: &mut W) -> Result<()> {
    writer.write_all(b"SUCCESS\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Writes `SUCCESS` followed by `KEY:VALUE` info fields.
pub async fn write_success_fields<W: AsyncWrite + Unpin>(
    writer: &mut W,
    fields: &[(&str, String)],
) -> Result<()> {
    let mut out = String::from("SUCCESS\n");
    for (k, v) in fields {
        out.push_str(&format!("{k}:{v}\n"));
    }
    writer.write_all(out.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Writes `ERROR:<code>`.
pub async fn write_error<W: AsyncWrite + Unpin>(writer: &mut W, code: StatusCode) -> Result<()> {
    writer.write_all(format!("ERROR:{code}\n").as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
