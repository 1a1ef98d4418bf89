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

//! The connection handler: one call per accepted socket, run on a worker thread.
//!
//! Order of operations is load-bearing (see the per-step comments): the per-URI lock is
//! acquired before any filesystem syscall and released only after the audit line has
//! been written, so the audit log is a linearization of each URI's GET/PUT history.

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Read;
use std::io::Write;
use std::net::TcpStream;
use std::path::Path;
use std::path::PathBuf;

use log::debug;
use log::warn;

use crate::audit::AuditSink;
use crate::audit::audit_line;
use crate::error::Errno;
use crate::error::HandlerError;
use crate::http;
use crate::http::Method;
use crate::http::Request;
use crate::http::StatusCode;
use crate::registry::UriLockRegistry;

/// Handles one accepted connection end to end. Never panics on a misbehaving client;
/// every failure path resolves to a [`HandlerError`], collapsed to a status code through
/// [`HandlerError::status`] rather than re-deriving the mapping at each call site.
pub fn handle_connection(
    stream: TcpStream,
    registry: &UriLockRegistry,
    audit: &dyn AuditSink,
    document_root: &Path,
) {
    let mut req = Request::new(stream);

    if req.parse().is_err() {
        respond_unsent(&mut req, HandlerError::Parse.status());
        req.drain_and_close();
        return;
    }

    if let Err(err) = validate(&req) {
        respond_unsent(&mut req, err.status());
        req.drain_and_close();
        return;
    }

    // Validated above: exactly one of Get/Put past this point.
    let request_id = req.header("Request-Id").unwrap().to_string();
    let uri = req.uri.clone();
    let method = req.method;

    let handle = match registry.acquire(&uri) {
        Ok(handle) => handle,
        Err(_) => {
            warn!("uri lock registry exhausted for {uri}");
            respond_unsent(&mut req, StatusCode::InternalServerError);
            req.drain_and_close();
            return;
        }
    };

    let status = match method {
        Method::Get => {
            let _guard = handle.lock.read();
            let status = dispatch_get(&mut req, document_root, &uri)
                .unwrap_or_else(|err| err.status());
            audit.record(&audit_line("GET", &uri, status.code(), &request_id));
            status
        }
        Method::Put => {
            let _guard = handle.lock.write();
            let status = dispatch_put(&mut req, document_root, &uri)
                .unwrap_or_else(|err| err.status());
            audit.record(&audit_line("PUT", &uri, status.code(), &request_id));
            status
        }
        Method::Unsupported => unreachable!("validated above"),
    };
    registry.release(&uri);

    // GET already streamed its own header+body on success; every other path still needs
    // the canned response.
    if !(method == Method::Get && status == StatusCode::Ok) {
        respond_unsent(&mut req, status);
    }
    req.drain_and_close();
}

fn validate(req: &Request) -> Result<(), HandlerError> {
    if req.method == Method::Unsupported {
        return Err(HandlerError::Validation(StatusCode::NotImplemented));
    }
    if (req.http_major, req.http_minor) != (1, 1) {
        return Err(HandlerError::Validation(StatusCode::VersionNotSupported));
    }
    if req.method == Method::Get && !req.body_prefix().is_empty() {
        return Err(HandlerError::Validation(StatusCode::BadRequest));
    }
    if req.header("Request-Id").is_none() {
        return Err(HandlerError::Validation(StatusCode::BadRequest));
    }
    Ok(())
}

fn respond_unsent(req: &mut Request, status: StatusCode) {
    let _ = http::write_canned_response(req.stream(), status);
}

fn resolve(document_root: &Path, uri: &str) -> PathBuf {
    document_root.join(uri)
}

fn dispatch_get(req: &mut Request, document_root: &Path, uri: &str) -> Result<StatusCode, HandlerError> {
    let path = resolve(document_root, uri);
    let file = File::open(&path).map_err(|err| HandlerError::Io(status_for_open_error(&err), err))?;

    let metadata = file
        .metadata()
        .map_err(|err| HandlerError::Io(StatusCode::InternalServerError, err))?;
    if metadata.is_dir() {
        return Err(HandlerError::Validation(StatusCode::Forbidden));
    }

    let mut file = file;
    if http::write_get_ok_header(req.stream(), metadata.len()).is_err() {
        return Ok(StatusCode::Ok);
    }
    if let Err(err) = io::copy(&mut file, req.stream()) {
        debug!("short write streaming {uri}: {err}");
    }
    Ok(StatusCode::Ok)
}

fn status_for_open_error(err: &io::Error) -> StatusCode {
    match Errno::classify(err) {
        Errno::Access | Errno::NameTooLong | Errno::NotPermitted | Errno::ReadOnlyFs => {
            StatusCode::Forbidden
        }
        Errno::NotFound => StatusCode::NotFound,
        _ => StatusCode::InternalServerError,
    }
}

fn dispatch_put(req: &mut Request, document_root: &Path, uri: &str) -> Result<StatusCode, HandlerError> {
    let content_length: i64 = match req.header("Content-Length").map(str::parse) {
        Some(Ok(n)) if n >= 0 => n,
        _ => return Err(HandlerError::Validation(StatusCode::BadRequest)),
    };
    let content_length = content_length as u64;

    let path = resolve(document_root, uri);
    let (mut file, status, created) = match OpenOptions::new().write(true).truncate(true).open(&path) {
        Ok(file) => (file, StatusCode::Ok, false),
        Err(err) => match Errno::classify(&err) {
            Errno::NotFound => match File::create(&path) {
                Ok(file) => (file, StatusCode::Created, true),
                Err(err) => return Err(HandlerError::Io(StatusCode::InternalServerError, err)),
            },
            Errno::IsDirectory
            | Errno::Access
            | Errno::NameTooLong
            | Errno::NotPermitted
            | Errno::ReadOnlyFs => return Err(HandlerError::Io(StatusCode::Forbidden, err)),
            _ => return Err(HandlerError::Io(StatusCode::InternalServerError, err)),
        },
    };

    if content_length == 0 {
        return Ok(status);
    }

    let prefix = req.body_prefix();
    let prefix_len = prefix.len() as u64;
    let mut written = 0u64;
    if !prefix.is_empty() {
        if let Err(err) = file.write_all(prefix) {
            rollback(&path, created);
            return Err(HandlerError::Io(StatusCode::InternalServerError, err));
        }
        written = prefix_len;
    }

    if written >= content_length {
        return Ok(status);
    }

    let remaining = content_length - written;
    let copied = match io::copy(&mut req.stream().take(remaining), &mut file) {
        Ok(n) => n,
        Err(err) => {
            rollback(&path, created);
            return Err(HandlerError::Io(StatusCode::BadRequest, err));
        }
    };

    if copied < remaining {
        rollback(&path, created);
        return Err(HandlerError::Validation(StatusCode::BadRequest));
    }
    Ok(status)
}

/// Undoes a short-bodied PUT: unlinks a file this request created, or truncates one it
/// merely overwrote, so no partial write is ever left behind.
fn rollback(path: &Path, created: bool) {
    let result = if created {
        std::fs::remove_file(path)
    } else {
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)
            .map(|_| ())
    };
    if let Err(err) = result {
        warn!("rollback of {} failed: {err}", path.display());
    }
}
