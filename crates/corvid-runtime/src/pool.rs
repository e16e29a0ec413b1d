//! Fixed-size, non-stealing thread pool over a single shared task queue,
//! plus a socket-I/O specialization handing each worker a private scratch
//! buffer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    tasks: Mutex<std::collections::VecDeque<Task>>,
    condition: Condvar,
    stop: std::sync::atomic::AtomicBool,
}

/// A classic worker-thread pool: tasks are `FnOnce() + Send` closures
/// pulled off one shared FIFO by whichever worker wakes first.
///
/// Dropping the pool discards any task still queued, but lets tasks
/// already running on a worker finish before that worker's thread joins.
pub struct ThreadPool {
    num_threads: usize,
    workers: Vec<JoinHandle<()>>,
    shared: std::sync::Arc<Shared>,
}

impl ThreadPool {
    pub fn new(num_threads: usize) -> Self {
        let shared = std::sync::Arc::new(Shared {
            tasks: Mutex::new(std::collections::VecDeque::new()),
            condition: Condvar::new(),
            stop: std::sync::atomic::AtomicBool::new(false),
        });

        let workers = (0..num_threads)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || Self::worker_loop(shared))
            })
            .collect();

        tracing::debug!(num_threads, "thread pool created");
        Self { num_threads, workers, shared }
    }

    fn worker_loop(shared: std::sync::Arc<Shared>) {
        loop {
            let mut tasks = shared.tasks.lock().expect("task queue mutex poisoned");
            while tasks.is_empty() && !shared.stop.load(Ordering::Acquire) {
                tasks = shared.condition.wait(tasks).expect("task queue mutex poisoned");
            }
            if shared.stop.load(Ordering::Acquire) {
                tasks.clear();
                return;
            }
            let Some(task) = tasks.pop_front() else { continue };
            drop(tasks);
            task();
        }
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Enqueues `task`, waking exactly one idle worker. Thread-safe;
    /// callable from any thread, including a pool worker. If the pool is
    /// already stopping, the task is accepted but will never run.
    pub fn enqueue<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.tasks.lock().expect("task queue mutex poisoned").push_back(Box::new(task));
        self.shared.condition.notify_one();
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.condition.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// A [`ThreadPool`] that additionally hands out one pre-allocated scratch
/// buffer per worker, round-robin, to avoid per-call allocation on
/// high-frequency socket I/O paths.
pub struct SocketThreadPool {
    pool: ThreadPool,
    buffer_size: usize,
    buffers: Vec<Arc<Mutex<Vec<u8>>>>,
    next_worker_index: AtomicUsize,
}

impl SocketThreadPool {
    pub fn new(buffer_size: usize, num_threads: usize) -> Self {
        let buffers = (0..num_threads).map(|_| Arc::new(Mutex::new(vec![0u8; buffer_size]))).collect();
        Self { pool: ThreadPool::new(num_threads), buffer_size, buffers, next_worker_index: AtomicUsize::new(0) }
    }

    pub fn num_threads(&self) -> usize {
        self.pool.num_threads()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn enqueue<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.enqueue(task);
    }

    /// Locks and returns the scratch buffer for worker `idx`, wrapping
    /// `idx` into range so any value is safe to pass.
    pub fn buffer(&self, idx: usize) -> MutexGuard<'_, Vec<u8>> {
        self.buffers[idx % self.buffers.len()].lock().expect("scratch buffer mutex poisoned")
    }

    /// An owned handle to the scratch buffer for worker `idx`. Unlike
    /// [`Self::buffer`], this doesn't borrow the pool — a task enqueued
    /// onto the pool can hold this independently of the pool's own
    /// lifetime, which matters because the pool is dropped (joining its
    /// worker threads) from the same actor-shutdown path that waits for
    /// queued tasks to drain; a task holding a borrow of the pool itself
    /// would deadlock that join.
    pub fn buffer_handle(&self, idx: usize) -> Arc<Mutex<Vec<u8>>> {
        self.buffers[idx % self.buffers.len()].clone()
    }

    /// Atomically selects the next worker index, round-robin, relaxed
    /// ordering (no synchronization beyond even distribution is needed).
    pub fn next_worker_index(&self) -> usize {
        self.next_worker_index.fetch_add(1, Ordering::Relaxed) % self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::time::Duration;

    #[test]
    fn thread_pool_runs_all_enqueued_tasks() {
        let pool = ThreadPool::new(4);
        let counter = Arc::new(StdAtomicUsize::new(0));
        for _ in 0..50 {
            let counter = counter.clone();
            pool.enqueue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        // Dropping the pool blocks until in-flight tasks finish, but we
        // need the queue to drain first; give workers a moment.
        std::thread::sleep(Duration::from_millis(100));
        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn socket_thread_pool_round_robins_and_sizes_buffers() {
        let pool = SocketThreadPool::new(256, 3);
        assert_eq!(pool.buffer_size(), 256);
        assert_eq!(pool.buffer(0).len(), 256);

        let indices: Vec<usize> = (0..6).map(|_| pool.next_worker_index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2]);
    }
}
