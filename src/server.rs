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

//! Ties the queue, the worker pool, the URI lock registry, and the accept loop together
//! into one value instead of process-wide globals (per the design notes on global
//! state): construct a [`Server`], call [`Server::run`], and every resource it owns goes
//! away when `run` returns.

use std::io;
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use log::info;
use log::warn;

use crate::audit::AuditSink;
use crate::audit::StderrAuditSink;
use crate::config::ServerConfig;
use crate::handler;
use crate::listener::Listener;
use crate::listener::install_shutdown_signals;
use crate::queue::BoundedQueue;
use crate::registry::UriLockRegistry;
use crate::rwlock::Policy;

/// A running (or not-yet-started) server: one accept thread plus `config.threads`
/// workers, sharing one bounded queue and one URI lock registry.
pub struct Server {
    config: ServerConfig,
    listener: Listener,
    queue: Arc<BoundedQueue<Option<TcpStream>>>,
    registry: Arc<UriLockRegistry>,
    audit: Arc<dyn AuditSink>,
}

impl Server {
    /// Binds the listening socket and builds the shared resources; does not start
    /// accepting connections until [`Server::run`] is called.
    pub fn new(config: ServerConfig, audit: Arc<dyn AuditSink>) -> io::Result<Server> {
        let listener = Listener::bind(config.port)?;
        let queue = Arc::new(BoundedQueue::new(config.threads));
        // Every registry slot starts life as a writer-preferring lock that admits at
        // most one reader between writers, per the fixed startup policy.
        let registry = Arc::new(UriLockRegistry::new(config.threads, Policy::NWay(1)));
        Ok(Server {
            config,
            listener,
            queue,
            registry,
            audit,
        })
    }

    /// Convenience constructor that logs audit lines to stderr, matching the CLI binary.
    pub fn with_stderr_audit(config: ServerConfig) -> io::Result<Server> {
        Server::new(config, Arc::new(StderrAuditSink::new()))
    }

    /// The shared shutdown flag the accept loop polls. [`Server::run`] consumes `self`,
    /// so a caller that wants to stop the server from another thread must clone this out
    /// first.
    pub fn running_flag(&self) -> Arc<std::sync::atomic::AtomicBool> {
        Arc::clone(&self.listener.running)
    }

    /// Runs the accept loop on the calling thread and blocks until shut down by
    /// `SIGINT`/`SIGTERM`. Worker threads are joined before returning.
    pub fn run(self) -> io::Result<()> {
        install_shutdown_signals(Arc::clone(&self.listener.running), self.config.port)?;

        let document_root = self
            .config
            .document_root
            .clone()
            .unwrap_or(PathBuf::from("."));

        let workers = self.spawn_workers(&document_root)?;

        info!(
            "listening on port {} with {} worker threads",
            self.config.port, self.config.threads
        );

        while self.listener.is_running() {
            match self.listener.socket.accept() {
                Ok((stream, _addr)) => self.queue.push(Some(stream)),
                Err(err) => {
                    if !self.listener.is_running() {
                        break;
                    }
                    warn!("accept failed: {err}");
                }
            }
        }

        for _ in 0..self.config.threads {
            self.queue.push(None);
        }
        for worker in workers {
            let _ = worker.join();
        }
        info!("shutdown complete");
        Ok(())
    }

    fn spawn_workers(&self, document_root: &PathBuf) -> io::Result<Vec<JoinHandle<()>>> {
        let mut workers = Vec::with_capacity(self.config.threads);
        for i in 0..self.config.threads {
            let queue = Arc::clone(&self.queue);
            let registry = Arc::clone(&self.registry);
            let audit = Arc::clone(&self.audit);
            let document_root = document_root.clone();
            let handle = thread::Builder::new()
                .name(format!("rwserver-worker-{i}"))
                .spawn(move || {
                    // A `None` is the shutdown poison pill: one is pushed per worker once
                    // the accept loop exits, so every worker sees exactly one and stops.
                    while let Some(stream) = queue.pop() {
                        handler::handle_connection(stream, &registry, audit.as_ref(), &document_root);
                    }
                })?;
            workers.push(handle);
        }
        Ok(workers)
    }
}
