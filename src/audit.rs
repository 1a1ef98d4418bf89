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

//! The audit sink: a process-wide, line-atomic append used for the one audit line each
//! handled request writes (see [`crate::handler`]).
//!
//! This is distinct from the `log`-facade diagnostics the rest of the crate emits.
//! Audit lines are data the operator's tooling parses; log lines are for a human
//! watching the process. The two are never interleaved onto the same sink.

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Something that can durably append one audit line at a time.
///
/// Implementations must make each call to [`AuditSink::record`] atomic with respect to
/// other calls: two concurrent writers must never interleave their bytes.
pub trait AuditSink: Send + Sync {
    /// Appends `line` (without a trailing newline; this adds one) to the sink.
    fn record(&self, line: &str);
}

/// Writes audit lines to stderr, one `write` call per line under an internal mutex.
pub struct StderrAuditSink {
    lock: Mutex<()>,
}

impl StderrAuditSink {
    pub fn new() -> StderrAuditSink {
        StderrAuditSink {
            lock: Mutex::new(()),
        }
    }
}

impl Default for StderrAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for StderrAuditSink {
    fn record(&self, line: &str) {
        let _guard = self.lock.lock().unwrap();
        let mut stderr = io::stderr();
        let _ = writeln!(stderr, "{line}");
    }
}

/// Appends audit lines to a file, opened once at construction and kept open for the
/// life of the server.
pub struct FileAuditSink {
    file: Mutex<File>,
}

impl FileAuditSink {
    pub fn create(path: impl AsRef<Path>) -> io::Result<FileAuditSink> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(FileAuditSink {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, line: &str) {
        let mut file = self.file.lock().unwrap();
        let _ = writeln!(file, "{line}");
    }
}

/// Formats one audit line per §6 of the wire contract: `METHOD,/uri,status,request-id`.
pub fn audit_line(method: &str, uri: &str, status: u16, request_id: &str) -> String {
    format!("{method},/{uri},{status},{request_id}")
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::io::Seek;
    use std::io::SeekFrom;

    use super::*;

    #[test]
    fn audit_line_matches_wire_format() {
        assert_eq!(audit_line("GET", "a", 200, "1"), "GET,/a,200,1");
    }

    #[test]
    fn file_audit_sink_appends_newline_terminated_lines() {
        let path = std::env::temp_dir().join(format!("rwserver-audit-test-{}", std::process::id()));
        let sink = FileAuditSink::create(&path).unwrap();
        sink.record("GET,/a,200,1");
        sink.record("PUT,/b,201,2");

        let mut file = File::open(&path).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "GET,/a,200,1\nPUT,/b,201,2\n");

        let _ = std::fs::remove_file(&path);
    }
}
