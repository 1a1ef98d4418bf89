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

//! The accept loop's listener socket and the shutdown flag it watches.
//!
//! `TcpListener::accept` has no portable deadline, so shutdown works by closing the
//! listener out from under a blocked `accept` call: the accept thread always sees either
//! a connection or an error, and checks `running` in either case.

use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// Wraps a bound [`TcpListener`] together with the flag the accept loop polls to decide
/// whether an `accept` failure means "shut down" or "try again".
pub struct Listener {
    pub socket: TcpListener,
    pub running: Arc<AtomicBool>,
}

impl Listener {
    pub fn bind(port: u16) -> std::io::Result<Listener> {
        let socket = TcpListener::bind(("0.0.0.0", port))?;
        Ok(Listener {
            socket,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signals the accept loop to stop. The loop notices either on its next `accept`
    /// error (once the socket itself is torn down by the caller) or the next time it
    /// checks [`Listener::is_running`].
    pub fn shut_down(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Installs `SIGINT`/`SIGTERM` handlers that flip `running` to false and then make a
/// throwaway loopback connection to `port` so a thread blocked in `accept` wakes up
/// immediately instead of waiting for the next real client.
///
/// A dedicated signal-handling thread (rather than an in-signal-handler callback) keeps
/// the handler body out of async-signal-unsafe territory; `signal_hook::iterator` is
/// built for exactly this.
#[cfg(unix)]
pub fn install_shutdown_signals(running: Arc<AtomicBool>, port: u16) -> std::io::Result<()> {
    use signal_hook::consts::SIGINT;
    use signal_hook::consts::SIGTERM;
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    std::thread::spawn(move || {
        for signal in signals.forever() {
            log::info!("received signal {signal}, shutting down");
            running.store(false, Ordering::SeqCst);
            let _ = std::net::TcpStream::connect(("127.0.0.1", port));
            break;
        }
    });
    Ok(())
}

#[cfg(not(unix))]
pub fn install_shutdown_signals(_running: Arc<AtomicBool>, _port: u16) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shut_down_flips_running_flag() {
        let listener = Listener::bind(0).unwrap();
        assert!(listener.is_running());
        listener.shut_down();
        assert!(!listener.is_running());
    }
}
