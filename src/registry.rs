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

//! Interns one [`RwLock`] per URI so that GET/PUT requests against the same path are
//! totally ordered by [`Policy`], while requests against different paths never contend.
//!
//! The table is sized to exactly as many slots as there are worker threads: at most one
//! in-flight request per thread, so at most `threads` distinct URIs can be live at once.
//! Slot exhaustion is therefore a logic error, not a capacity the caller should plan
//! around, and is reported through [`RegistryError`] rather than by panicking.

use std::sync::Arc;
use std::sync::Mutex;

use crate::rwlock::Policy;
use crate::rwlock::RwLock;

/// The registry ran out of slots: more distinct URIs are in flight than worker threads,
/// which cannot happen if every worker holds at most one registry handle at a time.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("uri lock registry exhausted")]
pub struct RegistryError;

struct Slot {
    uri: String,
    lock: Arc<RwLock<()>>,
    users: usize,
}

/// A fixed-capacity table mapping URIs to shared [`RwLock`] handles.
pub struct UriLockRegistry {
    policy: Policy,
    slots: Mutex<Vec<Option<Slot>>>,
}

/// A handle on a URI's lock, returned by [`UriLockRegistry::acquire`]. Dropping it
/// without calling [`UriLockRegistry::release`] leaks the slot; the connection handler
/// always pairs the two.
pub struct UriLockHandle {
    pub uri: String,
    pub lock: Arc<RwLock<()>>,
}

impl UriLockRegistry {
    /// Builds a registry with exactly `capacity` slots (the worker thread count).
    pub fn new(capacity: usize, policy: Policy) -> UriLockRegistry {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        UriLockRegistry {
            policy,
            slots: Mutex::new(slots),
        }
    }

    /// Finds or creates the lock for `uri`, incrementing its user count.
    ///
    /// Pair with [`UriLockRegistry::release`] once the caller is done holding a guard
    /// from the returned lock.
    pub fn acquire(&self, uri: &str) -> Result<UriLockHandle, RegistryError> {
        let mut slots = self.slots.lock().unwrap();

        if let Some(slot) = slots.iter_mut().flatten().find(|s| s.uri == uri) {
            slot.users += 1;
            return Ok(UriLockHandle {
                uri: uri.to_string(),
                lock: Arc::clone(&slot.lock),
            });
        }

        let empty = slots
            .iter_mut()
            .find(|s| s.is_none())
            .ok_or(RegistryError)?;
        let lock = Arc::new(RwLock::new(self.policy, ()));
        *empty = Some(Slot {
            uri: uri.to_string(),
            lock: Arc::clone(&lock),
            users: 1,
        });
        Ok(UriLockHandle {
            uri: uri.to_string(),
            lock,
        })
    }

    /// Drops a user of `uri`'s lock, freeing the slot once no one else holds a handle to
    /// it.
    pub fn release(&self, uri: &str) {
        let mut slots = self.slots.lock().unwrap();
        let mut free_slot = None;
        for (i, slot) in slots.iter_mut().enumerate() {
            if let Some(s) = slot {
                if s.uri == uri {
                    s.users -= 1;
                    if s.users == 0 {
                        free_slot = Some(i);
                    }
                    break;
                }
            }
        }
        if let Some(i) = free_slot {
            slots[i] = None;
        }
    }
}
