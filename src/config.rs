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

//! Server configuration: parsed once from CLI-style arguments, then threaded through
//! [`crate::server::Server`] as a plain value rather than read back out of globals.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Default worker thread count when `-t` is not given.
pub const DEFAULT_THREADS: usize = 4;

/// Everything a [`crate::server::Server`] needs to start: the listening port, the
/// worker pool size, and the directory served as the document root.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub threads: usize,
    /// `None` means the process's current working directory, matching the original
    /// CLI's assumption that the server is launched from the directory it serves.
    pub document_root: Option<PathBuf>,
}

impl ServerConfig {
    /// Parses `server [-t threads] <port>` from `args` (excluding argv\[0\]).
    ///
    /// Error messages are reproduced verbatim from the CLI this replaces, since callers
    /// print [`ConfigError`] directly to stderr.
    pub fn from_args(args: &[String]) -> Result<ServerConfig, ConfigError> {
        let mut threads = DEFAULT_THREADS;
        let mut rest = args;

        if let Some(flag) = rest.first() {
            if flag == "-t" {
                let value = rest.get(1).ok_or(ConfigError::Usage)?;
                threads = value
                    .parse::<usize>()
                    .map_err(|_| ConfigError::InvalidThreadCount(value.clone()))?;
                if threads == 0 {
                    return Err(ConfigError::InvalidThreadCount(value.clone()));
                }
                rest = &rest[2..];
            }
        }

        let port_arg = rest.first().ok_or(ConfigError::Usage)?;
        let port: i64 = port_arg
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port_arg.clone()))?;
        if !(1..=65535).contains(&port) {
            return Err(ConfigError::InvalidPort(port_arg.clone()));
        }

        Ok(ServerConfig {
            port: port as u16,
            threads,
            document_root: None,
        })
    }

    /// Builds a config directly, bypassing argument parsing; used by tests that want a
    /// server bound to an arbitrary document root.
    pub fn new(port: u16, threads: usize, document_root: PathBuf) -> ServerConfig {
        ServerConfig {
            port,
            threads,
            document_root: Some(document_root),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &[&str]) -> Vec<String> {
        s.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_to_four_threads() {
        let cfg = ServerConfig::from_args(&args(&["8080"])).unwrap();
        assert_eq!(cfg.threads, 4);
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn dash_t_overrides_thread_count() {
        let cfg = ServerConfig::from_args(&args(&["-t", "16", "8080"])).unwrap();
        assert_eq!(cfg.threads, 16);
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn rejects_out_of_range_port() {
        let err = ServerConfig::from_args(&args(&["70000"])).unwrap_err();
        assert_eq!(err.to_string(), "Invalid port: 70000");
    }

    #[test]
    fn rejects_non_numeric_port() {
        let err = ServerConfig::from_args(&args(&["abc"])).unwrap_err();
        assert_eq!(err.to_string(), "Invalid port: abc");
    }

    #[test]
    fn rejects_non_numeric_thread_count() {
        let err = ServerConfig::from_args(&args(&["-t", "abc", "8080"])).unwrap_err();
        assert_eq!(err.to_string(), "Invalid thread count: abc");
    }

    #[test]
    fn missing_port_is_a_usage_error() {
        let err = ServerConfig::from_args(&args(&[])).unwrap_err();
        assert_eq!(err.to_string(), "Usage: server [-t threads] <port>");
    }
}
