//! TCP accept loop, per-connection dispatch, and the NetData handler
//! registry a `SocketServerNd`-mode server routes through.

use std::collections::HashMap;
use std::net::{Shutdown, TcpListener, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use socket2::{Domain, Protocol, Socket as Socket2, Type};

use corvid_codec::{NetData, compress, decompress};
use corvid_core::{Bytes, Kind, Signal, Status};
use corvid_runtime::{Actor, ActorWorker, SocketThreadPool, WorkerParams};

use crate::socket::{Mode, Socket, SocketServerParams};

/// Everything a registered NetData handler needs: the socket to reply on
/// (for handlers that stream extra data), the decoded request, a place to
/// write the reply, and an out-parameter status the dispatcher reads back.
pub struct DataInOut<'a> {
    pub status: &'a mut Status,
    pub socket: &'a mut Socket,
    pub request: &'a NetData,
    pub reply: &'a mut NetData,
}

pub type Handler = Box<dyn Fn(DataInOut<'_>) + Send + Sync>;

/// `u16`-keyed NetData handler registry. Id 0 is the default echo handler,
/// installed at construction and replaceable like any other id.
pub struct HandlerRegistry {
    slots: Mutex<HashMap<u16, Arc<Handler>>>,
}

impl HandlerRegistry {
    fn new() -> Self {
        let echo: Handler = Box::new(|dio: DataInOut<'_>| {
            dio.reply.copy_from(dio.request);
            *dio.status = Status::ok();
        });
        let mut slots = HashMap::new();
        slots.insert(0u16, Arc::new(echo));
        Self { slots: Mutex::new(slots) }
    }

    /// Registers `handler` for `id`, replacing any prior entry.
    pub fn register(&self, id: u16, handler: Handler) {
        self.slots.lock().expect("handler registry poisoned").insert(id, Arc::new(handler));
    }

    fn get(&self, id: u16) -> Option<Arc<Handler>> {
        self.slots.lock().expect("handler registry poisoned").get(&id).cloned()
    }
}

/// The dispatch-time state a pool task needs, independent of the
/// server actor's own borrow — see [`SocketThreadPool::buffer_handle`]'s
/// doc comment for why this has to be its own `Arc`, not a borrow of
/// `SocketServer`.
struct ServerInner {
    params: SocketServerParams,
    registry: HandlerRegistry,
}

impl ServerInner {
    fn dispatch_socket(&self, mut socket: Socket, scratch: &mut [u8]) {
        match self.params.mode {
            Mode::CharStream => self.on_string(&mut socket, scratch),
            Mode::NetData => self.on_net_data(&mut socket, scratch),
        }
        let _ = socket.stream.shutdown(Shutdown::Both);
    }

    /// Default character-stream handler: echo.
    fn on_string(&self, socket: &mut Socket, scratch: &mut [u8]) {
        let mut data = Bytes::new();
        let status = socket.recv_chars(&mut data, scratch);
        if status.is_ok() {
            let _ = socket.send(data.data());
        }
    }

    fn on_net_data(&self, socket: &mut Socket, scratch: &mut [u8]) {
        let mut nd_in = NetData::new();
        let recv_status = socket.recv_nd(&mut nd_in);
        if !recv_status.is_ok() {
            if recv_status.kind() == Kind::Invalid {
                // Not a NetData frame -- fall back to char-stream handling
                // so the same port can serve both protocols.
                self.on_string(socket, scratch);
            }
            return;
        }

        let request_id = nd_in.header.id;
        let mut status = decompress(&mut nd_in);
        let mut nd_out = NetData::new();

        if status.is_ok() {
            status = match self.registry.get(request_id) {
                Some(handler) => {
                    let mut handler_status = Status::ok();
                    let dio =
                        DataInOut { status: &mut handler_status, socket, request: &nd_in, reply: &mut nd_out };
                    // A panicking handler must not take the connection
                    // thread (or a pool worker) down with it.
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(dio)));
                    match result {
                        Ok(()) => handler_status,
                        Err(_) => {
                            tracing::error!(id = request_id, "NetData handler panicked");
                            Status::err(Kind::Runtime, format!("handler for id={request_id} panicked"))
                        }
                    }
                }
                None => Status::err(Kind::NotImplemented, format!("no NetData handler registered for id={request_id}")),
            };
        }

        if status.is_ok() {
            status = compress(&mut nd_out, &self.params.common.compression_params());
        }
        if status.is_ok() {
            status = socket.send_nd(&nd_out);
        }

        if !status.is_ok() {
            self.reply_error(&status, request_id, socket);
        }
    }

    fn reply_error(&self, status: &Status, request_id: u16, socket: &mut Socket) {
        let mut nd = NetData::new();
        nd.header.id = request_id;
        nd.header.status = u16::try_from(status.code()).unwrap_or(0xffff);
        let _ = socket.send_nd(&nd);
    }
}

fn resolve_and_bind(params: &SocketServerParams) -> Result<TcpListener, Status> {
    let host = format!("{}:{}", params.common.addr, params.common.port);
    let candidates: Vec<_> = host.to_socket_addrs().map_err(Status::from)?.collect();

    let mut last_err = None;
    for candidate in candidates {
        let domain = if candidate.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = match Socket2::new(domain, Type::STREAM, Some(Protocol::TCP)) {
            Ok(s) => s,
            Err(e) => {
                last_err = Some(Status::from(e));
                continue;
            }
        };
        if params.reuse_addr && socket.set_reuse_address(true).is_err() {
            last_err = Some(Status::err(Kind::Net, "setsockopt SO_REUSEADDR failed"));
            continue;
        }
        #[cfg(unix)]
        if params.reuse_port && socket.set_reuse_port(true).is_err() {
            last_err = Some(Status::err(Kind::Net, "setsockopt SO_REUSEPORT failed"));
            continue;
        }
        if let Err(e) = socket.bind(&candidate.into()) {
            last_err = Some(Status::from(e));
            continue;
        }
        if let Err(e) = socket.listen(params.backlog.try_into().unwrap_or(i32::MAX)) {
            last_err = Some(Status::from(e));
            continue;
        }
        return Ok(socket.into());
    }

    Err(last_err.unwrap_or_else(|| Status::err(Kind::Net, format!("failed to bind to {host}"))))
}

/// Accept-loop actor: bind → listen → accept forever, routing each
/// connection to a thread pool (when configured) or handling it serially
/// on the accept thread.
///
/// State progresses Created → Bound/Listening (inside `start`, before
/// `sig_started` is set) → Polling. Shutdown forces the blocking `accept`
/// to return by shutting down and closing the listening fd directly —
/// mirroring the original's technique exactly, rather than the
/// non-blocking-plus-poll alternative idiomatic async code would reach
/// for (out of scope: no async runtime here, see SPEC_FULL.md §5).
pub struct SocketServer {
    inner: Arc<ServerInner>,
    listener: Mutex<Option<TcpListener>>,
    stop_polling: AtomicBool,
    polling_stopped: Signal,
    pool: Mutex<Option<SocketThreadPool>>,
}

impl SocketServer {
    pub fn new(params: SocketServerParams) -> Self {
        Self {
            inner: Arc::new(ServerInner { params, registry: HandlerRegistry::new() }),
            listener: Mutex::new(None),
            stop_polling: AtomicBool::new(false),
            polling_stopped: Signal::new(),
            pool: Mutex::new(None),
        }
    }

    /// Registers a NetData handler for `id`. Only meaningful in
    /// [`Mode::NetData`]; id 0 (echo) can be overridden like any other.
    pub fn register_handler(&self, id: u16, handler: Handler) {
        self.inner.registry.register(id, handler);
    }

    fn poll(&self, sig_started: &Signal) {
        let listener = self
            .listener
            .lock()
            .expect("listener mutex poisoned")
            .as_ref()
            .expect("listener must be set before polling begins")
            .try_clone()
            .expect("failed to duplicate listener fd");
        let mut serial_buffer = vec![0u8; self.inner.params.common.buffer_size];

        sig_started.set();
        tracing::debug!("server polling for connections");

        while !self.stop_polling.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _peer)) => match Socket::new(stream) {
                    Ok(socket) => {
                        tracing::debug!(addr = %socket.peer_addr, port = socket.peer_port, "accepted connection");
                        self.process_socket(socket, &mut serial_buffer);
                    }
                    Err(e) => tracing::debug!(error = %e, "failed to inspect accepted peer"),
                },
                // Interrupted by shutdown (EINVAL/EINTR/EBADF on the
                // closed listening fd) or a transient accept() failure;
                // either way, the loop condition re-checks `stop_polling`.
                Err(_) => continue,
            }
        }
        self.polling_stopped.set();
    }

    fn process_socket(&self, socket: Socket, serial_buffer: &mut [u8]) {
        let pool_guard = self.pool.lock().expect("pool mutex poisoned");
        match pool_guard.as_ref() {
            Some(pool) => {
                let idx = pool.next_worker_index();
                let buffer = pool.buffer_handle(idx);
                let inner = self.inner.clone();
                pool.enqueue(move || {
                    let mut buf = buffer.lock().expect("scratch buffer mutex poisoned");
                    inner.dispatch_socket(socket, &mut buf);
                });
            }
            None => {
                drop(pool_guard);
                self.inner.dispatch_socket(socket, serial_buffer);
            }
        }
    }
}

impl Actor for SocketServer {
    fn start(&self, sig_started: &Signal, status: &Mutex<Status>) {
        let listener = match resolve_and_bind(&self.inner.params) {
            Ok(listener) => listener,
            Err(e) => {
                *status.lock().expect("status mutex poisoned") = e;
                sig_started.set();
                return;
            }
        };
        *self.listener.lock().expect("listener mutex poisoned") = Some(listener);

        if self.inner.params.use_thread_pool {
            let pool = SocketThreadPool::new(self.inner.params.common.buffer_size, self.inner.params.thread_pool_size);
            tracing::debug!(threads = pool.num_threads(), "socket thread pool ready");
            *self.pool.lock().expect("pool mutex poisoned") = Some(pool);
        }

        *status.lock().expect("status mutex poisoned") = Status::ok();
        self.poll(sig_started);
    }

    fn shutdown(&self, sig_stopped: &Signal) {
        self.stop_polling.store(true, Ordering::SeqCst);
        if let Some(listener) = self.listener.lock().expect("listener mutex poisoned").as_ref() {
            let fd = listener.as_raw_fd();
            // SAFETY: `fd` is the listening socket's own fd, valid for the
            // duration of this call; shutting it down unblocks a thread
            // blocked in `accept()` on the same fd.
            unsafe {
                libc::shutdown(fd, libc::SHUT_RDWR);
                libc::close(fd);
            }
        }
        self.polling_stopped.wait();
        // Dropping the pool discards queued-but-unstarted tasks and joins
        // after in-flight ones finish.
        *self.pool.lock().expect("pool mutex poisoned") = None;
        sig_stopped.set();
    }

    fn process_request(&self, _request: corvid_core::Request, _reply: corvid_core::Reply) -> Status {
        Status::err(Kind::NotImplemented, "SocketServer does not process synchronous requests")
    }
}

pub type SocketServerWorker = ActorWorker<SocketServer>;

pub fn new_server(params: SocketServerParams) -> SocketServerWorker {
    ActorWorker::new(SocketServer::new(params), WorkerParams::default())
}
