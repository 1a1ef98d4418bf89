// Copyright 2024 tison <wander4096@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types shared across the crate.
//!
//! Configuration errors ([`ConfigError`]) carry the exact messages the CLI prints to
//! stderr. Handler errors ([`HandlerError`]) exist only to route a failure to the right
//! HTTP status code; they are never surfaced to a caller as a process-fatal condition.

use std::fmt;

use crate::http::StatusCode;

/// Failure to build a [`crate::config::ServerConfig`] from CLI-style arguments.
///
/// The [`fmt::Display`] impl intentionally matches the original program's stderr output
/// verbatim, since the binary prints `Err` values directly.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port: {0}")]
    InvalidPort(String),
    #[error("Invalid thread count: {0}")]
    InvalidThreadCount(String),
    #[error("Usage: server [-t threads] <port>")]
    Usage,
}

/// A per-request failure, always resolved to a [`StatusCode`] before the audit line is
/// written.
///
/// This type is intentionally not `std::error::Error`-only facing: [`HandlerError::status`]
/// is the one place the failure-to-status mapping from the connection handler lives, so the
/// mapping cannot drift between call sites.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The request could not be parsed off the wire at all.
    #[error("malformed request")]
    Parse,
    /// The request parsed, but failed a semantic check (method, version, missing header,
    /// malformed `Content-Length`, a short PUT body) — the status is already known at the
    /// point of failure, with no underlying `io::Error` to classify.
    #[error("invalid request: {0}")]
    Validation(StatusCode),
    /// A filesystem or socket operation failed. The status is resolved by the errno
    /// classification at the call site (see [`Errno::classify`]) since "I/O error" alone
    /// doesn't distinguish a missing file (`404`) from a permission error (`403`) from
    /// anything else (`500`).
    #[error("I/O error ({0}): {1}")]
    Io(StatusCode, #[source] std::io::Error),
}

impl HandlerError {
    /// The status code this failure should be reported to the client as. This is the one
    /// place a [`HandlerError`] is turned into a [`StatusCode`], so every call site maps
    /// failure to status through here instead of re-deriving it.
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::Parse => StatusCode::BadRequest,
            HandlerError::Validation(status) => *status,
            HandlerError::Io(status, _) => *status,
        }
    }
}

/// Errno classes the connection handler maps to HTTP status codes.
///
/// Rust's `std::io::Error` does not expose raw errno on all platforms through a single
/// stable API beyond [`std::io::Error::kind`], so this mirrors the subset the handler
/// actually needs to distinguish, read off `raw_os_error()` on unix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    Access,
    NameTooLong,
    NotPermitted,
    ReadOnlyFs,
    NotFound,
    IsDirectory,
    Other,
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Errno {
    /// Classifies an I/O error the way the handler's errno switch does.
    #[cfg(unix)]
    pub fn classify(err: &std::io::Error) -> Errno {
        match err.raw_os_error() {
            Some(libc_errno::EACCES) => Errno::Access,
            Some(libc_errno::ENAMETOOLONG) => Errno::NameTooLong,
            Some(libc_errno::EPERM) => Errno::NotPermitted,
            Some(libc_errno::EROFS) => Errno::ReadOnlyFs,
            Some(libc_errno::ENOENT) => Errno::NotFound,
            Some(libc_errno::EISDIR) => Errno::IsDirectory,
            _ => Errno::Other,
        }
    }

    #[cfg(not(unix))]
    pub fn classify(err: &std::io::Error) -> Errno {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Errno::Access,
            std::io::ErrorKind::NotFound => Errno::NotFound,
            _ => Errno::Other,
        }
    }
}

/// Minimal errno constants, so [`Errno::classify`] does not need a dependency on `libc`
/// just to read five numbers that are stable across every unix target we care about.
#[cfg(unix)]
mod libc_errno {
    pub const EACCES: i32 = 13;
    pub const ENOENT: i32 = 2;
    pub const EISDIR: i32 = 21;
    pub const ENAMETOOLONG: i32 = 36;
    pub const EPERM: i32 = 1;
    pub const EROFS: i32 = 30;
}
