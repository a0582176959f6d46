//! Control-channel framing: line-oriented ASCII, a verb line followed by zero
//! or more `KEY:VALUE` lines, terminated by a blank line (spec §6).
//!
//! Grounded in the reference's `protocol::rpc::wire` framing module, but
//! reduced to the much simpler line format the spec actually calls for —
//! see `SPEC_FULL.md` [MODULE: Wire Protocol] for why no record-marking or
//! retransmission tracking is needed here.

use std::collections::HashMap;
use std::fmt;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::StatusCode;
use crate::protocol::verbs::Verb;

/// A parsed control-channel request.
#[derive(Debug, Clone)]
pub struct Request {
    pub verb: Verb,
    fields: HashMap<String, String>,
}

impl Request {
    pub fn new(verb: Verb, fields: HashMap<String, String>) -> Self {
        Self { verb, fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Fetches a required field, mapping a miss to `INVALID_COMMAND` so
    /// handlers can propagate it with `?` (spec §7, malformed framing).
    pub fn require(&self, key: &str) -> Result<&str, StatusCode> {
        self.get(key).ok_or(StatusCode::InvalidCommand)
    }
}

/// A control-channel response: `SUCCESS` or `ERROR:<code>`, each optionally
/// followed by fields.
#[derive(Debug, Clone)]
pub enum Response {
    Success(Vec<(String, String)>),
    Error(StatusCode, Vec<(String, String)>),
}

impl Response {
    pub fn ok() -> Self {
        Response::Success(Vec::new())
    }

    pub fn ok_with(fields: impl IntoIterator<Item = (String, String)>) -> Self {
        Response::Success(fields.into_iter().collect())
    }

    pub fn error(code: StatusCode) -> Self {
        Response::Error(code, Vec::new())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Success(fields) => {
                writeln!(f, "SUCCESS")?;
                for (k, v) in fields {
                    writeln!(f, "{k}:{v}")?;
                }
            }
            Response::Error(code, fields) => {
                writeln!(f, "ERROR:{code}")?;
                for (k, v) in fields {
                    writeln!(f, "{k}:{v}")?;
                }
            }
        }
        writeln!(f)
    }
}

/// Reads one `VERB\nKEY:VALUE\n...\n\n` request. Returns `Ok(None)` on a
/// clean EOF before any bytes are read (the peer disconnected), matching
/// spec §7's "transport errors are silent".
pub async fn read_request<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<Request>> {
    let mut verb_line = String::new();
    let n = reader.read_line(&mut verb_line).await?;
    if n == 0 {
        return Ok(None);
    }
    let verb_token = verb_line.trim();
    if verb_token.is_empty() {
        return Err(anyhow!("empty request line"));
    }
    let verb = Verb::from_str(verb_token).ok_or_else(|| anyhow!("unknown verb: {verb_token}"))?;

    let mut fields = HashMap::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            break; // peer closed mid-request; treat as end of fields
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        let (key, value) = trimmed
            .split_once(':')
            .ok_or_else(|| anyhow!("malformed field line: {trimmed}"))?;
        fields.insert(key.to_string(), value.to_string());
    }

    Ok(Some(Request::new(verb, fields)))
}

/// Writes a response and flushes it.
pub async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, resp: &Response) -> Result<()> {
    writer.write_all(resp.to_string().as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads back a response previously written by [`write_response`]. Used by
/// integration tests acting as a client.
pub async fn read_response<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Response> {
    let mut status_line = String::new();
    let n = reader.read_line(&mut status_line).await?;
    if n == 0 {
        return Err(anyhow!("connection closed before response"));
    }
    let status_line = status_line.trim();

    let mut fields = Vec::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((k, v)) = trimmed.split_once(':') {
            fields.push((k.to_string(), v.to_string()));
        }
    }

    if status_line == "SUCCESS" {
        Ok(Response::Success(fields))
    } else if let Some(code_str) = status_line.strip_prefix("ERROR:") {
        let code = StatusCode::from_wire_str(code_str)
            .ok_or_else(|| anyhow!("unknown error code: {code_str}"))?;
        Ok(Response::Error(code, fields))
    } else {
        Err(anyhow!("malformed status line: {status_line}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn reads_request_with_fields() {
        let raw = b"READ\nPATH:notes.txt\n\n".to_vec();
        let mut reader = BufReader::new(&raw[..]);
        let req = read_request(&mut reader).await.unwrap().unwrap();
        assert_eq!(req.verb, Verb::Read);
        assert_eq!(req.get("PATH"), Some("notes.txt"));
    }

    #[tokio::test]
    async fn eof_before_any_bytes_is_none() {
        let raw: Vec<u8> = Vec::new();
        let mut reader = BufReader::new(&raw[..]);
        assert!(read_request(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_verb_errors() {
        let raw = b"BOGUS\n\n".to_vec();
        let mut reader = BufReader::new(&raw[..]);
        assert!(read_request(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn response_round_trips() {
        let resp = Response::ok_with([("SS_IP".to_string(), "127.0.0.1".to_string())]);
        let mut buf = Vec::new();
        write_response(&mut buf, &resp).await.unwrap();
        let mut reader = BufReader::new(&buf[..]);
        let parsed = read_response(&mut reader).await.unwrap();
        match parsed {
            Response::Success(fields) => {
                assert_eq!(fields, vec![("SS_IP".to_string(), "127.0.0.1".to_string())])
            }
            _ => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn error_response_round_trips() {
        let resp = Response::error(StatusCode::FileLocked);
        let mut buf = Vec::new();
        write_response(&mut buf, &resp).await.unwrap();
        let mut reader = BufReader::new(&buf[..]);
        match read_response(&mut reader).await.unwrap() {
            Response::Error(code, _) => assert_eq!(code, StatusCode::FileLocked),
            _ => panic!("expected error"),
        }
    }
}
