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

//! A reader/writer lock with a selectable fairness [`Policy`], unlike
//! [`std::sync::RwLock`] which picks one policy and does not expose it.
//!
//! All three policies share one bookkeeping record behind a single [`Mutex`], but
//! readers and writers park on two distinct [`Condvar`]s. A release that only makes a
//! writer admissible (say, the last reader leaving) must be able to target the writer
//! population alone: with one shared condvar, `notify_one` could just as easily wake a
//! reader that immediately re-parks, leaving the writer it was meant for asleep. Two
//! condvars make each `notify` precise instead of advisory.

use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;

/// Which side of a contended lock gets to go first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Readers never wait behind a merely-waiting writer; only an active writer blocks
    /// them. A steady stream of readers can starve writers indefinitely.
    Readers,
    /// A waiting writer blocks every reader that arrives after it, so writers cannot be
    /// starved, but a steady stream of writers can starve readers.
    Writers,
    /// Readers may cut in front of waiting writers, but only `n` of them per writer
    /// turn; the `n + 1`th arrival waits behind the writer instead.
    NWay(u32),
}

#[derive(Default)]
struct State {
    active_readers: u32,
    active_writer: bool,
    waiting_writers: u32,
    waiting_readers: u32,
    /// Readers admitted since the last writer held the lock; meaningful only under
    /// [`Policy::NWay`].
    readers_passed: u32,
}

/// A reader/writer lock around `T`, guarding access the way [`std::sync::RwLock`] does
/// but with a chosen [`Policy`].
pub struct RwLock<T> {
    policy: Policy,
    state: Mutex<State>,
    reader_cond: Condvar,
    writer_cond: Condvar,
    data: std::cell::UnsafeCell<T>,
}

unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    pub fn new(policy: Policy, value: T) -> RwLock<T> {
        RwLock {
            policy,
            state: Mutex::new(State::default()),
            reader_cond: Condvar::new(),
            writer_cond: Condvar::new(),
            data: std::cell::UnsafeCell::new(value),
        }
    }

    fn reader_admissible(&self, state: &State) -> bool {
        if state.active_writer {
            return false;
        }
        match self.policy {
            Policy::Readers => true,
            Policy::Writers => state.waiting_writers == 0,
            Policy::NWay(n) => state.waiting_writers == 0 || state.readers_passed < n,
        }
    }

    fn writer_admissible(&self, state: &State) -> bool {
        !state.active_writer && state.active_readers == 0
    }

    /// Wakes readers parked on [`Self::reader_cond`], at most `n` of them under
    /// [`Policy::NWay`] rather than all of them, since broadcasting would let every
    /// blocked reader race to recheck the predicate only to park again once the quota
    /// is exhausted.
    fn wake_readers(&self, state: &State, limit: Option<u32>) {
        match limit {
            Some(n) if state.waiting_readers > n => {
                for _ in 0..n {
                    self.reader_cond.notify_one();
                }
            }
            _ => self.reader_cond.notify_all(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Blocks until a shared lock can be taken, then returns a guard releasing it on
    /// drop.
    pub fn read(&self) -> ReadGuard<'_, T> {
        let mut state = self.lock();
        state.waiting_readers += 1;
        while !self.reader_admissible(&state) {
            state = self.reader_cond.wait(state).unwrap();
        }
        state.waiting_readers -= 1;
        state.active_readers += 1;
        if let Policy::NWay(_) = self.policy {
            state.readers_passed += 1;
        }
        drop(state);
        ReadGuard { lock: self }
    }

    /// Blocks until an exclusive lock can be taken, then returns a guard releasing it on
    /// drop.
    pub fn write(&self) -> WriteGuard<'_, T> {
        let mut state = self.lock();
        state.waiting_writers += 1;
        while !self.writer_admissible(&state) {
            state = self.writer_cond.wait(state).unwrap();
        }
        state.waiting_writers -= 1;
        state.active_writer = true;
        drop(state);
        WriteGuard { lock: self }
    }

    /// A reader releasing can only ever flip `writer_admissible` (by dropping
    /// `active_readers` to zero); it never changes any reader's own predicate, so only
    /// [`Self::writer_cond`] is ever worth signaling here.
    fn release_read(&self) {
        let mut state = self.lock();
        state.active_readers -= 1;
        if state.active_readers == 0 && state.waiting_writers > 0 {
            self.writer_cond.notify_one();
        }
    }

    /// A writer releasing always makes some writer admissible again (mutual exclusion
    /// alone guarantees that), and may also make readers admissible depending on the
    /// policy, so each policy below decides what to do with
    /// [`Self::reader_cond`]/[`Self::writer_cond`] independently rather than sharing one
    /// generic rule.
    fn release_write(&self) {
        let mut state = self.lock();
        state.active_writer = false;

        match self.policy {
            Policy::Readers => {
                // Readers are blocked on nothing but `active_writer`, which just
                // cleared: every parked reader is now admissible.
                self.wake_readers(&state, None);
                if state.waiting_writers > 0 {
                    self.writer_cond.notify_one();
                }
            }
            Policy::Writers => {
                // Readers stay blocked as long as any writer is still waiting.
                if state.waiting_writers == 0 {
                    self.wake_readers(&state, None);
                }
                if state.waiting_writers > 0 {
                    self.writer_cond.notify_one();
                }
            }
            Policy::NWay(n) => {
                state.readers_passed = 0;
                if state.waiting_readers > 0 {
                    self.wake_readers(&state, Some(n));
                } else if state.waiting_writers > 0 {
                    self.writer_cond.notify_one();
                }
            }
        }
    }
}

/// RAII guard for a shared lock, released on drop.
pub struct ReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

/// RAII guard for an exclusive lock, released on drop.
pub struct WriteGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn concurrent_readers_see_each_other() {
        let lock = Arc::new(RwLock::new(Policy::Readers, 0));
        let concurrent = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let concurrent = Arc::clone(&concurrent);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    let _guard = lock.read();
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) > 1);
    }

    #[test]
    fn writer_excludes_readers_and_other_writers() {
        let lock = Arc::new(RwLock::new(Policy::Writers, 0));
        {
            let mut w = lock.write();
            *w = 1;
        }
        assert_eq!(*lock.read(), 1);
    }

    #[test]
    fn nway_admits_at_most_n_readers_before_a_waiting_writer() {
        // readers_passed counts every admission in the lock's current generation, the
        // first one included, so with n = 2 only one more reader may cut in once a
        // writer starts waiting.
        let lock = Arc::new(RwLock::new(Policy::NWay(2), 0));
        let first_reader = lock.read();

        let writer_lock = Arc::clone(&lock);
        let writer = thread::spawn(move || {
            let mut w = writer_lock.write();
            *w += 1;
        });
        thread::sleep(Duration::from_millis(20));

        // The quota has one slot left; this reader still cuts in front of the writer.
        let r2 = lock.read();

        // The quota is now exhausted: a third reader must wait for the writer's turn.
        let third_lock = Arc::clone(&lock);
        let third_reader = thread::spawn(move || {
            let _guard = third_lock.read();
        });
        thread::sleep(Duration::from_millis(20));
        assert!(!third_reader.is_finished());

        drop(r2);
        drop(first_reader);

        writer.join().unwrap();
        third_reader.join().unwrap();
        assert_eq!(*lock.read(), 1);
    }
}
