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

//! A bounded multi-producer/multi-consumer FIFO, used to hand accepted connections off
//! to the worker pool.
//!
//! Unlike [`std::sync::mpsc`], capacity is fixed at construction and `push` blocks the
//! producer when the queue is full rather than growing unboundedly. Two separate mutexes
//! guard the producer-side and consumer-side cursors so that a slow consumer never
//! contends with the accept loop's own bookkeeping, and vice versa; the two counting
//! semaphores (`empty_slots`, `full_slots`) are what actually blocks either side.

use std::sync::Mutex;

use crate::internal::semaphore::Semaphore;

/// A fixed-capacity FIFO queue safe to share across threads via `Arc`.
pub struct BoundedQueue<T> {
    slots: Mutex<Vec<Option<T>>>,
    capacity: usize,
    head: Mutex<usize>,
    tail: Mutex<usize>,
    empty_slots: Semaphore,
    full_slots: Semaphore,
}

impl<T> BoundedQueue<T> {
    /// Builds a queue holding at most `capacity` items. Panics if `capacity` is zero,
    /// since a zero-capacity queue can never be pushed to.
    pub fn new(capacity: usize) -> BoundedQueue<T> {
        assert!(capacity > 0, "queue capacity must be positive");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        BoundedQueue {
            slots: Mutex::new(slots),
            capacity,
            head: Mutex::new(0),
            tail: Mutex::new(0),
            empty_slots: Semaphore::new(capacity),
            full_slots: Semaphore::new(0),
        }
    }

    /// Blocks until a slot is free, then appends `item`.
    pub fn push(&self, item: T) {
        self.empty_slots.wait();
        {
            let mut tail = self.tail.lock().unwrap();
            let mut slots = self.slots.lock().unwrap();
            slots[*tail] = Some(item);
            *tail = (*tail + 1) % self.capacity;
        }
        self.full_slots.post();
    }

    /// Blocks until an item is available, then removes and returns the oldest one.
    pub fn pop(&self) -> T {
        self.full_slots.wait();
        let item = {
            let mut head = self.head.lock().unwrap();
            let mut slots = self.slots.lock().unwrap();
            let item = slots[*head].take().expect("full_slots accounting broken");
            *head = (*head + 1) % self.capacity;
            item
        };
        self.empty_slots.post();
        item
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn push_then_pop_preserves_fifo_order() {
        let queue = BoundedQueue::new(4);
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.pop(), 1);
        assert_eq!(queue.pop(), 2);
        assert_eq!(queue.pop(), 3);
    }

    #[test]
    fn push_blocks_when_full_until_a_slot_frees() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.push(1);

        let producer = Arc::clone(&queue);
        let handle = thread::spawn(move || producer.push(2));

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        assert_eq!(queue.pop(), 1);
        handle.join().unwrap();
        assert_eq!(queue.pop(), 2);
    }

    #[test]
    fn many_producers_and_consumers_see_every_item_exactly_once() {
        let queue = Arc::new(BoundedQueue::new(8));
        let producers: Vec<_> = (0..4)
            .map(|i| {
                let q = Arc::clone(&queue);
                thread::spawn(move || {
                    for j in 0..25 {
                        q.push(i * 25 + j);
                    }
                })
            })
            .collect();

        let consumer_results: Vec<_> = (0..4)
            .map(|_| {
                let q = Arc::clone(&queue);
                thread::spawn(move || (0..25).map(|_| q.pop()).collect::<Vec<_>>())
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        let mut all: Vec<_> = consumer_results
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }
}
