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

//! The HTTP/1.1 subset this server understands: method/status vocabulary, the
//! incremental request parser ([`request`]), and canned response bodies.
//!
//! See the [module level documentation](self) for the wire format. Only `GET` and `PUT`
//! are ever dispatched; every other method is parsed (so the connection can still be
//! drained and answered) but always resolves to [`StatusCode::NotImplemented`].

pub mod request;

pub use request::Header;
pub use request::Request;

use std::io;
use std::io::Write;

/// One of the two methods this server actually serves.
///
/// A method token that parses but isn't `GET` or `PUT` becomes [`Method::Unsupported`]
/// rather than a parse failure, so the handler can still respond `501` with an audit-free
/// but well-formed connection teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Unsupported,
}

/// HTTP status codes this server can emit.
///
/// The discriminants matter: they're formatted directly into the status line and reused
/// as the audit line's status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Created,
    BadRequest,
    Forbidden,
    NotFound,
    InternalServerError,
    NotImplemented,
    VersionNotSupported,
}

impl StatusCode {
    /// The numeric code, as written on the wire and in the audit line.
    pub fn code(self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::VersionNotSupported => 505,
        }
    }

    /// The reason phrase, used both in the status line and (with a trailing `\n`) as the
    /// canned response body.
    pub fn reason(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::VersionNotSupported => "Version Not Supported",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Writes the canned response for `status`: status line, `Content-Length`, blank line,
/// reason phrase followed by `\n`.
///
/// Errors while writing are the caller's concern (the connection is already being torn
/// down); this never retries and never panics on a broken pipe.
pub fn write_canned_response(mut out: impl Write, status: StatusCode) -> io::Result<()> {
    let body = status.reason();
    write!(out, "HTTP/1.1 {} {}\r\n", status.code(), status.reason())?;
    write!(out, "Content-Length: {}\r\n\r\n", body.len() + 1)?;
    write!(out, "{}\n", body)?;
    Ok(())
}

/// Writes the header block for a streamed `200 OK` GET response (no body).
///
/// The caller streams the file bytes separately; this exists so the handler never builds
/// an intermediate `String` for a response that might be many megabytes long.
pub fn write_get_ok_header(mut out: impl Write, content_length: u64) -> io::Result<()> {
    write!(out, "HTTP/1.1 200 OK\r\n")?;
    write!(out, "Content-Length: {}\r\n\r\n", content_length)
}
