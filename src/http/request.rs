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

//! The incremental request parser and the [`Request`] type that owns a connection's
//! read buffer for its whole lifetime.
//!
//! Parsing proceeds in four phases — method, URI, version, headers — each driven by a
//! pattern compiled once at process start (see the `*_RE` statics below). Whatever bytes
//! remain in the buffer once headers are parsed are the request's *body prefix*: a borrow
//! into the same buffer, never copied out (see the crate-level docs on body-view
//! aliasing).

use std::io::Read;
use std::io::Write;
use std::net::TcpStream;
use std::sync::LazyLock;

use regex::bytes::Regex;

use crate::http::Method;

/// Maximum number of request bytes read off the wire: request line, all headers, and any
/// buffered body prefix, combined.
pub const REQ_MAX_SIZE: usize = 2048;

/// Slack space past [`REQ_MAX_SIZE`] used only to drain residual bytes when a connection
/// is torn down (see [`Request::drain_and_close`]).
const BUF_EXTRA: usize = 256;

static METHOD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([A-Za-z]{1,8}) ").unwrap());
static URI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([A-Za-z0-9.\-]{1,63}) ").unwrap());
static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^HTTP/([0-9])\.([0-9])\r\n").unwrap());
static HEADER_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9.\-]{1,128}: [\x20-\x7E]{1,128}\r\n)*\r\n").unwrap()
});
static HEADER_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9.\-]{1,128}): ([\x20-\x7E]{1,128})\r\n").unwrap());

/// A single HTTP header as parsed off the wire: a null-free key and value, each within
/// the 1-128 character classes the wire format allows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub key: String,
    pub value: String,
}

/// Why [`Request::parse`] failed.
///
/// Every variant maps to `400 Bad Request` at the handler level (see
/// [`crate::error::HandlerError::Parse`]); this type exists to make failures debuggable
/// in logs without being part of the public status-code contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// A phase's pattern did not match within its bounded chunk.
    Malformed,
    /// The socket was closed or errored before the needed bytes arrived.
    Truncated,
}

/// An HTTP request in flight: the connection socket, its fixed-capacity read buffer, and
/// whatever fields [`Request::parse`] has extracted so far.
pub struct Request {
    stream: TcpStream,
    buf: Box<[u8; REQ_MAX_SIZE + BUF_EXTRA]>,
    /// Parse cursor: bytes before this index in `buf` have been consumed by a phase.
    pc: usize,
    /// Write cursor: bytes before this index in `buf` have been read from the socket.
    wc: usize,

    pub method: Method,
    pub uri: String,
    pub http_major: u8,
    pub http_minor: u8,
    pub headers: Vec<Header>,
}

impl Request {
    /// Wraps an already-connected socket. No I/O happens until [`Request::parse`] is
    /// called.
    pub fn new(stream: TcpStream) -> Request {
        Request {
            stream,
            buf: Box::new([0u8; REQ_MAX_SIZE + BUF_EXTRA]),
            pc: 0,
            wc: 0,
            method: Method::Unsupported,
            uri: String::new(),
            http_major: 0,
            http_minor: 0,
            headers: Vec::new(),
        }
    }

    /// The connection socket, for streaming a response body or reading a PUT's tail.
    pub fn stream(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// The value of `key`, matched case-insensitively as the wire format requires.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.key.eq_ignore_ascii_case(key))
            .map(|h| h.value.as_str())
    }

    /// The request body bytes already buffered during header parsing, borrowed from the
    /// request's own read buffer. Never allocates; never copies.
    pub fn body_prefix(&self) -> &[u8] {
        &self.buf[self.pc..self.wc]
    }

    /// Parses the request line, headers, and buffers whatever body bytes arrived
    /// alongside them.
    ///
    /// On success, `self.method`, `self.uri`, `self.http_major`/`http_minor`, and
    /// `self.headers` are populated, and [`Request::body_prefix`] returns the buffered
    /// body bytes (possibly empty).
    pub fn parse(&mut self) -> Result<(), ParseError> {
        self.parse_method()?;
        self.parse_uri()?;
        self.parse_version()?;

        // Read as much as is immediately available before matching headers; a single
        // `read` call, not a loop to a fixed byte count, since we don't know how many
        // header bytes to expect.
        if self.wc < REQ_MAX_SIZE {
            match self.stream.read(&mut self.buf[self.wc..REQ_MAX_SIZE]) {
                Ok(n) => self.wc += n,
                Err(_) => return Err(ParseError::Truncated),
            }
        }

        self.parse_headers()?;
        // Whatever remains in [pc, wc) is the body prefix; parse_body just certifies it.
        Ok(())
    }

    fn fill_to(&mut self, chunk_size: usize) -> Result<(), ParseError> {
        let have = self.wc - self.pc;
        if have >= chunk_size || self.wc >= REQ_MAX_SIZE {
            return Ok(());
        }

        let mut need = chunk_size - have;
        if self.wc + need > REQ_MAX_SIZE {
            need = REQ_MAX_SIZE - self.wc;
        }

        while need > 0 {
            let read = self
                .stream
                .read(&mut self.buf[self.wc..self.wc + need])
                .map_err(|_| ParseError::Truncated)?;
            if read == 0 {
                return Err(ParseError::Truncated);
            }
            self.wc += read;
            need -= read;
        }
        Ok(())
    }

    fn unparsed(&self) -> &[u8] {
        &self.buf[self.pc..self.wc]
    }

    fn parse_method(&mut self) -> Result<(), ParseError> {
        self.fill_to(9)?;
        let caps = METHOD_RE
            .captures(self.unparsed())
            .ok_or(ParseError::Malformed)?;
        let whole = caps.get(0).unwrap();
        let word = caps.get(1).unwrap().as_bytes();

        self.method = if word.eq_ignore_ascii_case(b"GET") {
            Method::Get
        } else if word.eq_ignore_ascii_case(b"PUT") {
            Method::Put
        } else {
            Method::Unsupported
        };

        self.pc += whole.end();
        Ok(())
    }

    fn parse_uri(&mut self) -> Result<(), ParseError> {
        self.fill_to(65)?;
        let caps = URI_RE
            .captures(self.unparsed())
            .ok_or(ParseError::Malformed)?;
        let whole = caps.get(0).unwrap();
        let uri = caps.get(1).unwrap().as_bytes();

        // Safe: the character class [A-Za-z0-9.-] is ASCII-only.
        self.uri = std::str::from_utf8(uri).unwrap().to_string();
        self.pc += whole.end();
        Ok(())
    }

    fn parse_version(&mut self) -> Result<(), ParseError> {
        self.fill_to(11)?;
        let caps = VERSION_RE
            .captures(self.unparsed())
            .ok_or(ParseError::Malformed)?;
        let whole = caps.get(0).unwrap();

        self.http_major = caps.get(1).unwrap().as_bytes()[0] - b'0';
        self.http_minor = caps.get(2).unwrap().as_bytes()[0] - b'0';

        self.pc += whole.end();
        Ok(())
    }

    fn parse_headers(&mut self) -> Result<(), ParseError> {
        let block = HEADER_BLOCK_RE
            .find(self.unparsed())
            .ok_or(ParseError::Malformed)?;
        // The block includes the terminating blank `\r\n`; header lines end 2 bytes
        // earlier.
        let lines_end = block.end() - 2;

        let mut headers = Vec::new();
        let mut offset = 0;
        while offset < lines_end {
            let line = &self.unparsed()[offset..lines_end];
            let caps = HEADER_LINE_RE.captures(line).ok_or(ParseError::Malformed)?;
            let whole = caps.get(0).unwrap();
            let key = caps.get(1).unwrap().as_bytes();
            let value = caps.get(2).unwrap().as_bytes();

            headers.push(Header {
                key: std::str::from_utf8(key).unwrap().to_string(),
                value: std::str::from_utf8(value).unwrap().to_string(),
            });

            offset += whole.end();
        }

        self.headers = headers;
        self.pc += block.end();
        Ok(())
    }

    /// Best-effort drain of any bytes still in flight, then closes the socket.
    ///
    /// Mirrors the original's rationale: a raw, bounded `recv` gives the client a chance
    /// to have read our response before the connection drops, without risking an
    /// unbounded block on a client that never stops sending.
    pub fn drain_and_close(mut self) {
        let mut spill = [0u8; BUF_EXTRA];
        let _ = self.stream.read(&mut spill);
        let _ = self.stream.flush();
    }
}
