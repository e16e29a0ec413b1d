//! Thread-safe, unbounded FIFO with blocking dequeue.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// A thread-safe queue for storing and retrieving elements of type `T`.
///
/// Uses a mutex and condition variable to provide safe enqueue/dequeue from
/// any thread. There is no capacity bound and no non-blocking pop: `dequeue`
/// blocks the calling thread until an element is available.
pub struct SafeQueue<T> {
    q: Mutex<VecDeque<T>>,
    cond: Condvar,
}

impl<T> Default for SafeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SafeQueue<T> {
    pub fn new() -> Self {
        Self { q: Mutex::new(VecDeque::new()), cond: Condvar::new() }
    }

    /// Moves `t` onto the back of the queue and wakes one waiting thread.
    pub fn enqueue(&self, t: T) {
        let mut guard = self.q.lock().expect("queue mutex poisoned");
        guard.push_back(t);
        self.cond.notify_one();
    }

    /// Removes and returns the front element, blocking the caller while the
    /// queue is empty.
    pub fn dequeue(&self) -> T {
        let mut guard = self.q.lock().expect("queue mutex poisoned");
        loop {
            if let Some(val) = guard.pop_front() {
                return val;
            }
            guard = self.cond.wait(guard).expect("queue mutex poisoned");
        }
    }

    pub fn size(&self) -> usize {
        self.q.lock().expect("queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fifo_order_preserved() {
        let q = SafeQueue::new();
        q.enqueue(1);
        q.enqueue(2);
        q.enqueue(3);
        assert_eq!(q.dequeue(), 1);
        assert_eq!(q.dequeue(), 2);
        assert_eq!(q.dequeue(), 3);
    }

    #[test]
    fn dequeue_blocks_until_enqueue() {
        let q = Arc::new(SafeQueue::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.dequeue());
        thread::sleep(Duration::from_millis(20));
        q.enqueue(42);
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn size_reflects_pending_items() {
        let q = SafeQueue::new();
        assert_eq!(q.size(), 0);
        q.enqueue("a");
        q.enqueue("b");
        assert_eq!(q.size(), 2);
        q.dequeue();
        assert_eq!(q.size(), 1);
    }
}
