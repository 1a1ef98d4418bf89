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

//! A concurrent HTTP/1.1 file server built on priority-selectable reader/writer locks.
//!
//! The crate is organized bottom-up, each module depending only on the ones before it:
//!
//! - [`internal`] — a blocking counting [`internal::semaphore::Semaphore`], the one
//!   primitive shared by the queue and the rwlock.
//! - [`queue`] — [`queue::BoundedQueue`], the sole hand-off point between the accept
//!   loop and the worker pool.
//! - [`rwlock`] — [`rwlock::RwLock`], a reader/writer lock whose fairness
//!   [`rwlock::Policy`] is chosen per instance rather than baked into the type.
//! - [`registry`] — [`registry::UriLockRegistry`], which interns a URI to one shared
//!   rwlock so that every GET/PUT against that path is totally ordered.
//! - [`http`] — the wire vocabulary and the incremental [`http::Request`] parser.
//! - [`audit`] — the line-oriented sink every handled request appends to.
//! - [`error`] — the error types that route a failure to a status code or a CLI message.
//! - [`config`] — [`config::ServerConfig`], parsed once from CLI-style arguments.
//! - [`handler`] — [`handler::handle_connection`], the per-connection state machine that
//!   ties parsing, locking, I/O, and auditing together.
//! - [`listener`] — the listening socket and the shutdown signal plumbing.
//! - [`server`] — [`server::Server`], which owns the queue, the registry, and the
//!   accept/worker threads as one value instead of process-wide globals.
//!
//! See each module's documentation for the invariants it maintains.

pub mod audit;
pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub(crate) mod internal;
pub mod listener;
pub mod queue;
pub mod registry;
pub mod rwlock;
pub mod server;

pub use config::ServerConfig;
pub use server::Server;
