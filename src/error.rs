//! Domain error type shared across the name node and storage node.
//!
//! Mirrors the reference's `nfsstat3`/`NFSResult` split: operations that can
//! fail for cluster-visible reasons (bad path, lock contention, dead SN...)
//! return `Result<T, StatusCode>`, while transport and startup failures use
//! `anyhow::Error`. `StatusCode` carries exactly the wire error codes from
//! the control/data protocols.

use std::io;

/// Cluster-wide error codes, written on the wire as `ERROR:<code>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    FileNotFound,
    FileExists,
    FileLocked,
    Unauthorized,
    PermissionDenied,
    SnUnavailable,
    InvalidCommand,
    InvalidOperation,
    Capacity,
    ConnectionFailed,
}

impl StatusCode {
    /// The token written after `ERROR:` on the wire.
    pub fn as_wire_str(self) -> &'static str {
        match self {
            StatusCode::FileNotFound => "FILE_NOT_FOUND",
            StatusCode::FileExists => "FILE_EXISTS",
            StatusCode::FileLocked => "FILE_LOCKED",
            StatusCode::Unauthorized => "UNAUTHORIZED",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::SnUnavailable => "SN_UNAVAILABLE",
            StatusCode::InvalidCommand => "INVALID_COMMAND",
            StatusCode::InvalidOperation => "INVALID_OPERATION",
            StatusCode::Capacity => "CAPACITY",
            StatusCode::ConnectionFailed => "CONNECTION_FAILED",
        }
    }

    /// Parses a wire error token back into a `StatusCode`, for client-side tests.
    pub fn from_wire_str(s: &str) -> Option<Self> {
        Some(match s {
            "FILE_NOT_FOUND" => StatusCode::FileNotFound,
            "FILE_EXISTS" => StatusCode::FileExists,
            "FILE_LOCKED" => StatusCode::FileLocked,
            "UNAUTHORIZED" => StatusCode::Unauthorized,
            "PERMISSION_DENIED" => StatusCode::PermissionDenied,
            "SN_UNAVAILABLE" => StatusCode::SnUnavailable,
            "INVALID_COMMAND" => StatusCode::InvalidCommand,
            "INVALID_OPERATION" => StatusCode::InvalidOperation,
            "CAPACITY" => StatusCode::Capacity,
            "CONNECTION_FAILED" => StatusCode::ConnectionFailed,
            _ => return None,
        })
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire_str())
    }
}

impl std::error::Error for StatusCode {}

/// Result type for domain operations (NN and SN handlers alike).
pub type DResult<T> = Result<T, StatusCode>;

/// Converts an IO failure into a `StatusCode`, for the boundary between
/// filesystem calls and domain logic.
pub trait ResultExt<T> {
    fn or_invalid_op(self) -> DResult<T>;
    fn or_not_found(self) -> DResult<T>;
}

impl<T> ResultExt<T> for Result<T, io::Error> {
    fn or_invalid_op(self) -> DResult<T> {
        self.map_err(|_| StatusCode::InvalidOperation)
    }

    fn or_not_found(self) -> DResult<T> {
        self.map_err(|_| StatusCode::FileNotFound)
    }
}

/// Converts an `Option` into a `DResult`, for registry lookups.
pub trait OptionExt<T> {
    fn ok_or_status(self, err: StatusCode) -> DResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_status(self, err: StatusCode) -> DResult<T> {
        self.ok_or(err)
    }
}
