//! Message-loop daemon: a dedicated thread, a FIFO of dynamically-typed
//! messages, a type-indexed dispatch table, and lifecycle signals.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use corvid_core::{Kind, OnExit, SafeQueue, Signal, Status, is_null, nullmsg};
use corvid_utils::{ThreadPriority, thread_boot};

/// Overridable lifecycle hooks for a [`Worker`]. `on_init` runs once, right
/// after `sig_running` is set and before the message loop starts; `on_exit`
/// runs once the loop drains, but only if `on_init` returned Ok.
pub trait WorkerImpl: Send + 'static {
    fn on_init(&mut self) -> Status {
        Status::ok()
    }

    fn on_exit(&mut self, _final_status: &Status) {}
}

/// Thread placement/priority for a worker's dedicated thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerParams {
    pub core: Option<usize>,
    pub prio: ThreadPriority,
}

type Handler<I> = Box<dyn Fn(&mut I, Box<dyn Any + Send>) + Send + Sync>;

struct Inner<I: WorkerImpl> {
    logic: Mutex<I>,
    queue: SafeQueue<Option<Box<dyn Any + Send>>>,
    handlers: Mutex<HashMap<TypeId, Handler<I>>>,
    sig_running: Signal,
    sig_inited: Signal,
    sig_terminated: Signal,
    thread: Mutex<Option<JoinHandle<()>>>,
    final_status: Mutex<Status>,
    params: WorkerParams,
}

/// A dedicated thread that consumes a FIFO of dynamically-typed messages,
/// dispatching each to a handler registered for its runtime type, and
/// exposing lifecycle edges as [`Signal`]s.
///
/// Lifecycle: Created -> Running (after `run`) -> Inited (after `on_init`)
/// -> Draining (null message received) -> Terminated. The terminal state is
/// absorbing.
pub struct Worker<I: WorkerImpl> {
    inner: Arc<Inner<I>>,
}

impl<I: WorkerImpl> Clone for Worker<I> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<I: WorkerImpl> Worker<I> {
    pub fn new(logic: I, params: WorkerParams) -> Self {
        Self {
            inner: Arc::new(Inner {
                logic: Mutex::new(logic),
                queue: SafeQueue::new(),
                handlers: Mutex::new(HashMap::new()),
                sig_running: Signal::new(),
                sig_inited: Signal::new(),
                sig_terminated: Signal::new(),
                thread: Mutex::new(None),
                final_status: Mutex::new(Status::ok()),
                params,
            }),
        }
    }

    pub fn sig_running(&self) -> &Signal {
        &self.inner.sig_running
    }

    pub fn sig_inited(&self) -> &Signal {
        &self.inner.sig_inited
    }

    pub fn sig_terminated(&self) -> &Signal {
        &self.inner.sig_terminated
    }

    /// Installs (overwriting any prior registration) the handler keyed by
    /// `T`'s runtime type. Internally mutex-guarded; safe to call
    /// concurrently, but must not race with the loop actually dispatching a
    /// message of type `T` unless callers accept the usual register-before-
    /// send ordering.
    pub fn register_callback<T, F>(&self, f: F)
    where
        T: Any,
        F: Fn(&mut I, T) + Send + Sync + 'static,
    {
        let wrapped: Handler<I> = Box::new(move |logic, msg| {
            if let Ok(typed) = msg.downcast::<T>() {
                f(logic, *typed);
            }
        });
        self.inner.handlers.lock().expect("handler table poisoned").insert(TypeId::of::<T>(), wrapped);
    }

    /// Enqueues `msg`, returning whether the worker is (at least not yet
    /// observed to be) terminated. Strict FIFO, no priorities.
    pub fn send<T: Any + Send>(&self, msg: T) -> bool {
        if self.inner.sig_terminated.is_set() {
            return false;
        }
        self.inner.queue.enqueue(Some(Box::new(msg)));
        true
    }

    /// Idempotent against an already-running worker: spawns the thread,
    /// waits for `on_init` to complete, and returns its status. Fails
    /// closed if a prior `terminate` left the instance unusable (the thread
    /// handle was already taken and joined).
    pub fn run(&self) -> Status {
        if self.inner.sig_terminated.is_set() {
            return Status::err(Kind::Invalid, "worker already terminated, cannot be restarted");
        }

        let mut thread_guard = self.inner.thread.lock().expect("thread handle mutex poisoned");
        if thread_guard.is_some() {
            // Already running: wait for the in-flight on_init to finish.
            self.inner.sig_inited.wait();
            return self.inner.final_status.lock().expect("status mutex poisoned").clone();
        }

        let inner = self.inner.clone();
        let handle = std::thread::spawn(move || Self::thread_proc(inner));
        *thread_guard = Some(handle);
        drop(thread_guard);

        self.inner.sig_running.set();
        self.inner.sig_inited.wait();
        self.inner.final_status.lock().expect("status mutex poisoned").clone()
    }

    fn thread_proc(inner: Arc<Inner<I>>) {
        let _on_exit_guard = OnExit::new(&inner.sig_terminated);

        thread_boot(inner.params.core, inner.params.prio);
        inner.sig_running.wait();

        let init_status = {
            let mut logic = inner.logic.lock().expect("logic mutex poisoned");
            let result = panic::catch_unwind(AssertUnwindSafe(|| logic.on_init()));
            match result {
                Ok(status) => status,
                Err(_) => {
                    tracing::error!("worker on_init panicked");
                    Status::err(Kind::Runtime, "on_init panicked")
                }
            }
        };
        inner.sig_inited.set();

        if !init_status.is_ok() {
            *inner.final_status.lock().expect("status mutex poisoned") = init_status;
            return;
        }

        let mut drained_after_stop = 0usize;
        loop {
            let msg = inner.queue.dequeue();
            if is_null(&msg) {
                break;
            }
            let Some(payload) = msg else { break };
            let type_id = (*payload).type_id();
            let handler_present = {
                let handlers = inner.handlers.lock().expect("handler table poisoned");
                handlers.contains_key(&type_id)
            };
            if !handler_present {
                tracing::debug!(?type_id, "message dropped: no registered handler");
                continue;
            }
            let mut logic = inner.logic.lock().expect("logic mutex poisoned");
            let handlers = inner.handlers.lock().expect("handler table poisoned");
            if let Some(handler) = handlers.get(&type_id) {
                let result = panic::catch_unwind(AssertUnwindSafe(|| handler(&mut logic, payload)));
                if result.is_err() {
                    tracing::error!(?type_id, "worker message handler panicked");
                }
            }
        }

        // Drain anything enqueued between the null sentinel and this point;
        // per the spec these are ignored but counted for the log line.
        while inner.queue.size() > 0 {
            let _ = inner.queue.dequeue();
            drained_after_stop += 1;
        }
        if drained_after_stop > 0 {
            tracing::info!(count = drained_after_stop, "dropped messages enqueued after termination");
        }

        let mut logic = inner.logic.lock().expect("logic mutex poisoned");
        let result = panic::catch_unwind(AssertUnwindSafe(|| logic.on_exit(&init_status)));
        if result.is_err() {
            tracing::error!("worker on_exit panicked");
        }
        *inner.final_status.lock().expect("status mutex poisoned") = Status::ok();
    }

    /// Idempotent: sends the null sentinel, joins the thread, and returns
    /// the worker's final status. Never safe to call from inside the
    /// worker thread. Calling before `run` sets `sig_terminated` and
    /// returns Ok without hanging.
    pub fn terminate(&self) -> Status {
        let mut thread_guard = self.inner.thread.lock().expect("thread handle mutex poisoned");
        let Some(handle) = thread_guard.take() else {
            self.inner.sig_terminated.set();
            return Status::ok();
        };
        self.inner.queue.enqueue(nullmsg());
        drop(thread_guard);
        let _ = handle.join();
        self.inner.final_status.lock().expect("status mutex poisoned").clone()
    }

    /// Bounded wait for termination; returns whether it fired in time.
    pub fn wait_terminated(&self, timeout: Duration) -> bool {
        self.inner.sig_terminated.wait_for(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo {
        received: Arc<Mutex<Vec<i32>>>,
        init_calls: Arc<AtomicUsize>,
    }

    impl WorkerImpl for Echo {
        fn on_init(&mut self) -> Status {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            Status::ok()
        }
    }

    #[test]
    fn worker_echo_dispatches_in_order_and_terminates_cleanly() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let init_calls = Arc::new(AtomicUsize::new(0));
        let worker = Worker::new(Echo { received: received.clone(), init_calls: init_calls.clone() }, WorkerParams::default());

        worker.register_callback::<i32, _>(|logic, n| {
            logic.received.lock().unwrap().push(n);
        });

        let status = worker.run();
        assert!(status.is_ok());
        assert!(worker.sig_inited().is_set());

        worker.send(1i32);
        worker.send(2i32);
        worker.send(3i32);

        let status = worker.terminate();
        assert!(status.is_ok());
        assert!(worker.sig_terminated().is_set());
        assert_eq!(init_calls.load(Ordering::SeqCst), 1);
        assert_eq!(*received.lock().unwrap(), vec![1, 2, 3]);
    }

    struct NoOp;
    impl WorkerImpl for NoOp {}

    #[test]
    fn terminate_before_run_is_ok_and_sets_terminated() {
        let worker = Worker::new(NoOp, WorkerParams::default());
        let status = worker.terminate();
        assert!(status.is_ok());
        assert!(worker.sig_terminated().is_set());
    }

    #[test]
    fn unhandled_message_type_is_dropped_silently() {
        let worker = Worker::new(NoOp, WorkerParams::default());
        worker.run();
        assert!(worker.send("no handler registered for &str"));
        let status = worker.terminate();
        assert!(status.is_ok());
    }

    struct FailingInit;
    impl WorkerImpl for FailingInit {
        fn on_init(&mut self) -> Status {
            Status::err(Kind::Runtime, "init failed")
        }
    }

    #[test]
    fn failed_init_skips_loop_and_on_exit() {
        let worker = Worker::new(FailingInit, WorkerParams::default());
        let status = worker.run();
        assert!(!status.is_ok());
        assert!(worker.sig_inited().is_set());
        assert!(worker.wait_terminated(Duration::from_secs(1)));
    }
}
