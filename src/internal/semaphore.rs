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

//! A blocking counting semaphore, built on [`Mutex`] and [`Condvar`] rather than a
//! platform primitive.
//!
//! [`crate::queue::BoundedQueue`] uses two of these (`empty_slots`, `full_slots`); the
//! reader/writer lock uses one as its binary write gate. Both want the same thing: a
//! count that blocks `wait` at zero and wakes exactly one waiter per `post`.

use std::sync::Condvar;
use std::sync::Mutex;

pub struct Semaphore {
    count: Mutex<usize>,
    avail: Condvar,
}

impl Semaphore {
    pub fn new(initial: usize) -> Semaphore {
        Semaphore {
            count: Mutex::new(initial),
            avail: Condvar::new(),
        }
    }

    /// Blocks until the count is positive, then decrements it.
    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            count = self.avail.wait(count).unwrap();
        }
        *count -= 1;
    }

    /// Increments the count and wakes one waiter.
    pub fn post(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.avail.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn wait_blocks_until_post() {
        let sem = Arc::new(Semaphore::new(0));
        let waiter = Arc::clone(&sem);
        let handle = thread::spawn(move || waiter.wait());

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        sem.post();
        handle.join().unwrap();
    }

    #[test]
    fn initial_count_allows_immediate_wait() {
        let sem = Semaphore::new(2);
        sem.wait();
        sem.wait();
        assert!(sem.count.lock().unwrap().eq(&0));
    }
}
