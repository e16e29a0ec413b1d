//! Asynchronous services with start/shutdown lifecycle and synchronous
//! request-reply, bridged onto the [`crate::worker::Worker`] message loop.

use std::sync::{Arc, Mutex};

use corvid_core::{Kind, OnExit, Reply, Request, Signal, Status};

use crate::worker::{Worker, WorkerImpl, WorkerParams};

/// A long-lived service with explicit startup/shutdown signaling and
/// synchronous request processing.
///
/// `start`, `shutdown`, and `process_request` may all be called from
/// distinct threads concurrently (a dedicated actor thread, a shutdown
/// thread, and the worker's dispatch thread respectively) — implementors
/// synchronize any mutable state internally, the same contract the
/// methods taking `&self` rather than `&mut self` is meant to enforce.
///
/// `start` may return before the service is actually ready; `sig_started`
/// is the real completion signal. Long-running actors (e.g. a socket
/// server's accept loop) are allowed to block in `start` until `shutdown`
/// is called from another thread.
pub trait Actor: Send + Sync + 'static {
    fn start(&self, sig_started: &Signal, status: &Mutex<Status>);
    fn shutdown(&self, sig_stopped: &Signal);
    fn process_request(&self, request: Request, reply: Reply) -> Status;
}

/// An RPC-style message carrying a request/reply pair plus the signal and
/// status slot the synchronous caller is blocked on.
///
/// `ready`/`status` are raw pointers into the caller's stack frame rather
/// than borrows: `ActorWorker::request` always blocks on `ready` before
/// its frame goes out of scope, so every worker-thread use of these
/// pointers happens-before that wait returns, which is what makes the
/// `unsafe impl Send` below sound.
struct Payload {
    ready: *const Signal,
    status: *mut Status,
    request: Request,
    reply: Reply,
}

// SAFETY: see the `ready`/`status` doc comment above.
unsafe impl Send for Payload {}

struct ActorLogic<A: Actor> {
    actor: Arc<A>,
    actor_thread: Option<std::thread::JoinHandle<()>>,
    sig_started: Arc<Signal>,
    status_started: Arc<Mutex<Status>>,
    request_mutex: Mutex<()>,
}

impl<A: Actor> ActorLogic<A> {
    fn new(actor: A) -> Self {
        Self {
            actor: Arc::new(actor),
            actor_thread: None,
            sig_started: Arc::new(Signal::new()),
            status_started: Arc::new(Mutex::new(Status::ok())),
            request_mutex: Mutex::new(()),
        }
    }
}

impl<A: Actor> WorkerImpl for ActorLogic<A> {
    fn on_init(&mut self) -> Status {
        if self.actor_thread.is_some() {
            return Status::err(Kind::Runtime, "actor is already running");
        }

        // The actor runs in its own thread: `start` is allowed to block
        // until `shutdown`, which would otherwise deadlock the worker's
        // control thread waiting on `sig_inited`.
        let actor = self.actor.clone();
        let sig_started = self.sig_started.clone();
        let status_started = self.status_started.clone();
        let handle = std::thread::spawn(move || {
            actor.start(&sig_started, &status_started);
        });
        self.actor_thread = Some(handle);

        self.sig_started.wait();
        self.status_started.lock().expect("actor status mutex poisoned").clone()
    }

    fn on_exit(&mut self, _final_status: &Status) {
        let Some(actor_handle) = self.actor_thread.take() else {
            return;
        };

        // Shutdown runs on its own thread too: if `start` is still
        // blocked (long-running actor), `shutdown` is what unblocks it,
        // so calling it inline here would deadlock against `actor_handle`.
        let actor = self.actor.clone();
        let sig_stopped = Arc::new(Signal::new());
        let sig_stopped_for_thread = sig_stopped.clone();
        let shutdown_handle = std::thread::spawn(move || {
            actor.shutdown(&sig_stopped_for_thread);
        });

        sig_stopped.wait();
        let _ = shutdown_handle.join();
        let _ = actor_handle.join();
    }
}

/// Composes a [`Worker`] with an owned [`Actor`]: the worker's dedicated
/// thread starts the actor, routes synchronous requests to
/// `process_request` under a mutex, and shuts the actor down on
/// `terminate`.
pub struct ActorWorker<A: Actor> {
    actor: Arc<A>,
    worker: Worker<ActorLogic<A>>,
}

impl<A: Actor> ActorWorker<A> {
    pub fn new(actor: A, params: WorkerParams) -> Self {
        let logic = ActorLogic::new(actor);
        let actor = logic.actor.clone();
        let worker = Worker::new(logic, params);
        worker.register_callback::<Payload, _>(|logic, payload| {
            let _request_lock = logic.request_mutex.lock().expect("request mutex poisoned");
            // SAFETY: `ActorWorker::request` blocks on `ready` until this
            // closure returns, so `payload.ready`/`payload.status` are
            // still valid for the duration of this call.
            let on_exit = unsafe { OnExit::new(&*payload.ready) };
            let status = logic.actor.process_request(payload.request, payload.reply);
            unsafe {
                *payload.status = status;
            }
            drop(on_exit);
        });
        Self { actor, worker }
    }

    /// Direct access to the wrapped actor, bypassing the worker's message
    /// queue entirely. Mirrors the original's convenience methods (e.g.
    /// `request_str`) that call straight into the connected socket rather
    /// than going through the dispatch thread.
    pub fn actor(&self) -> &A {
        &self.actor
    }

    pub fn run(&self) -> Status {
        self.worker.run()
    }

    pub fn terminate(&self) -> Status {
        self.worker.terminate()
    }

    pub fn sig_inited(&self) -> &Signal {
        self.worker.sig_inited()
    }

    pub fn sig_terminated(&self) -> &Signal {
        self.worker.sig_terminated()
    }

    /// Synchronously processes one request: blocks until the worker
    /// thread's `process_request` call returns, then hands back its
    /// status. `reply` is consumed the same way `process_request` itself
    /// consumes it; callers that need the result back typically pass a
    /// shared handle (e.g. `Box::new(Arc::new(Mutex::new(...)))`) and keep
    /// their own clone to read after this call returns.
    pub fn request(&self, request: Request, reply: Reply) -> Status {
        let ready = Signal::new();
        let mut status = Status::ok();
        let payload = Payload { ready: &ready, status: &mut status, request, reply };

        if !self.worker.send(payload) {
            return Status::err(Kind::Invalid, "actor worker is terminated");
        }
        ready.wait();
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct Counter {
        total: AtomicI64,
    }

    impl Actor for Counter {
        fn start(&self, sig_started: &Signal, status: &Mutex<Status>) {
            *status.lock().unwrap() = Status::ok();
            sig_started.set();
        }

        fn shutdown(&self, sig_stopped: &Signal) {
            sig_stopped.set();
        }

        fn process_request(&self, request: Request, _reply: Reply) -> Status {
            if let Ok(n) = request.downcast::<i64>() {
                self.total.fetch_add(*n, Ordering::SeqCst);
                Status::ok()
            } else {
                Status::err(Kind::Invalid, "expected i64 request")
            }
        }
    }

    #[test]
    fn actor_worker_starts_processes_and_terminates() {
        let worker = ActorWorker::new(Counter { total: AtomicI64::new(0) }, WorkerParams::default());

        let status = worker.run();
        assert!(status.is_ok());
        assert!(worker.sig_inited().is_set());

        let status = worker.request(Box::new(5i64), Box::new(()));
        assert!(status.is_ok());
        let status = worker.request(Box::new(7i64), Box::new(()));
        assert!(status.is_ok());

        let status = worker.terminate();
        assert!(status.is_ok());
        assert!(worker.sig_terminated().is_set());
    }

    struct RejectAll;
    impl Actor for RejectAll {
        fn start(&self, sig_started: &Signal, status: &Mutex<Status>) {
            *status.lock().unwrap() = Status::ok();
            sig_started.set();
        }
        fn shutdown(&self, sig_stopped: &Signal) {
            sig_stopped.set();
        }
        fn process_request(&self, _request: Request, _reply: Reply) -> Status {
            Status::err(Kind::Invalid, "expected i64 request")
        }
    }

    #[test]
    fn actor_worker_propagates_process_request_error() {
        let worker = ActorWorker::new(RejectAll, WorkerParams::default());
        worker.run();
        let status = worker.request(Box::new("not an i64"), Box::new(()));
        assert!(!status.is_ok());
        worker.terminate();
    }
}
