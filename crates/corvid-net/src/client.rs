//! Actor-based TCP client: connect/disconnect lifecycle plus char-stream
//! and NetData request/reply.

use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};

use corvid_codec::{NetData, compress, decompress};
use corvid_core::{Bytes, Kind, OnExit, Reply, Request, Signal, Status};
use corvid_runtime::{Actor, ActorWorker, WorkerParams};

use crate::socket::{Socket, SocketClientParams};

/// A NetData request handed through [`ActorWorker::request`]'s message
/// queue; the matching reply slot is `Arc<Mutex<NetData>>`.
pub struct NdRequest(pub NetData);

/// Connects to a server, and exposes both a direct `request_str`/
/// `request_nd` call path and a queued one via [`Actor::process_request`].
///
/// Unlike the original (where the client inherits `Actor::terminate()` and
/// can tear down its own worker on a send failure), this `Actor` has no
/// handle back to the `ActorWorker` that owns it — composition instead of
/// inheritance means the actor can only close its own socket, not stop its
/// worker thread. A send failure here closes the connection and returns a
/// failed `Status`; a caller that wants the whole actor torn down calls
/// `ActorWorker::terminate()` itself on seeing that status.
pub struct SocketClient {
    params: SocketClientParams,
    socket: Mutex<Option<Socket>>,
}

impl SocketClient {
    pub fn new(params: SocketClientParams) -> Self {
        Self { params, socket: Mutex::new(None) }
    }

    fn with_socket<T>(&self, f: impl FnOnce(&mut Socket) -> T) -> Result<T, Status> {
        let mut guard = self.socket.lock().expect("client socket mutex poisoned");
        match guard.as_mut() {
            Some(sock) => Ok(f(sock)),
            None => Err(Status::err(Kind::Invalid, "client is not connected")),
        }
    }

    fn close_socket(&self) {
        let mut guard = self.socket.lock().expect("client socket mutex poisoned");
        if let Some(sock) = guard.take() {
            let _ = sock.stream.shutdown(Shutdown::Both);
        }
    }

    /// Sends a NUL-terminated string request. `want_reply = false` is the
    /// original's notification mode (send only, no recv).
    pub fn request_str(&self, input: &str, want_reply: bool) -> (Status, Option<String>) {
        let mut payload = input.as_bytes().to_vec();
        payload.push(0);
        let send_status = match self.with_socket(|sock| sock.send(&payload)) {
            Ok(status) => status,
            Err(status) => return (status, None),
        };
        if !send_status.is_ok() {
            self.close_socket();
            return (send_status, None);
        }
        if !want_reply {
            return (Status::ok(), None);
        }

        let mut data = Bytes::new();
        let mut scratch = vec![0u8; self.params.common.buffer_size];
        let recv_status = match self.with_socket(|sock| sock.recv_chars(&mut data, &mut scratch)) {
            Ok(status) => status,
            Err(status) => return (status, None),
        };
        if !recv_status.is_ok() {
            return (recv_status, None);
        }
        let mut bytes = data.data().to_vec();
        if bytes.last() == Some(&0) {
            bytes.pop();
        }
        (Status::ok(), Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// `preprocess(in) -> send_nd -> recv_nd -> postprocess(out)`.
    pub fn request_nd(&self, nd_in: &mut NetData, nd_out: &mut NetData) -> Status {
        let params = self.params.common.compression_params();
        let status = compress(nd_in, &params);
        if !status.is_ok() {
            return status;
        }

        let send_status = match self.with_socket(|sock| sock.send_nd(nd_in)) {
            Ok(status) => status,
            Err(status) => return status,
        };
        if !send_status.is_ok() {
            self.close_socket();
            return send_status;
        }

        let recv_status = match self.with_socket(|sock| sock.recv_nd(nd_out)) {
            Ok(status) => status,
            Err(status) => return status,
        };
        if !recv_status.is_ok() {
            return recv_status;
        }

        decompress(nd_out)
    }
}

impl Actor for SocketClient {
    fn start(&self, sig_started: &Signal, status: &Mutex<Status>) {
        let _on_exit = OnExit::new(sig_started);

        let host = format!("{}:{}", self.params.common.addr, self.params.common.port);
        let candidates = match host.to_socket_addrs() {
            Ok(addrs) => addrs.collect::<Vec<_>>(),
            Err(e) => {
                *status.lock().expect("status mutex poisoned") = Status::from(e);
                return;
            }
        };

        let mut last_err = None;
        for candidate in &candidates {
            match TcpStream::connect_timeout(candidate, self.params.connect_timeout) {
                Ok(stream) => match Socket::new(stream) {
                    Ok(socket) => {
                        *self.socket.lock().expect("client socket mutex poisoned") = Some(socket);
                        *status.lock().expect("status mutex poisoned") = Status::ok();
                        return;
                    }
                    Err(e) => last_err = Some(Status::from(e)),
                },
                Err(e) => last_err = Some(Status::from(e)),
            }
        }

        *status.lock().expect("status mutex poisoned") =
            last_err.unwrap_or_else(|| Status::err(Kind::Net, format!("failed to connect to {host}")));
    }

    fn shutdown(&self, sig_stopped: &Signal) {
        self.close_socket();
        sig_stopped.set();
    }

    fn process_request(&self, request: Request, reply: Reply) -> Status {
        if let Ok(input) = request.downcast::<String>() {
            let (status, response) = self.request_str(&input, true);
            if status.is_ok()
                && let Ok(slot) = reply.downcast::<Arc<Mutex<Option<String>>>>()
            {
                *slot.lock().expect("reply slot poisoned") = response;
            }
            return status;
        }

        if let Ok(nd_request) = request.downcast::<NdRequest>() {
            let Ok(slot) = reply.downcast::<Arc<Mutex<NetData>>>() else {
                return Status::err(Kind::Invalid, "NetData request needs an Arc<Mutex<NetData>> reply slot");
            };
            let mut nd_in = nd_request.0;
            let mut nd_out = NetData::new();
            let status = self.request_nd(&mut nd_in, &mut nd_out);
            if status.is_ok() {
                *slot.lock().expect("reply slot poisoned") = nd_out;
            }
            return status;
        }

        Status::err(Kind::NotImplemented, "unsupported request type")
    }
}

/// Convenience alias: a running client actor plus its lifecycle handle.
pub type SocketClientWorker = ActorWorker<SocketClient>;

pub fn new_client(params: SocketClientParams) -> SocketClientWorker {
    ActorWorker::new(SocketClient::new(params), WorkerParams::default())
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    fn echo_server_once(listener: TcpListener) {
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 256];
                if let Ok(n) = stream.read(&mut buf) {
                    let _ = stream.write_all(&buf[..n]);
                }
            }
        });
    }

    #[test]
    fn request_str_round_trips_with_a_real_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        echo_server_once(listener);

        let params = SocketClientParams {
            common: crate::socket::SocketParams { addr: addr.ip().to_string(), port: addr.port(), ..Default::default() },
            ..Default::default()
        };
        let client = new_client(params);
        let status = client.run();
        assert!(status.is_ok(), "{status:?}");

        let (status, reply) = client.actor().request_str("ping", true);
        assert!(status.is_ok(), "{status:?}");
        assert_eq!(reply.as_deref(), Some("ping"));

        client.terminate();
    }

    #[test]
    fn start_fails_cleanly_when_nothing_is_listening() {
        let params = SocketClientParams {
            common: crate::socket::SocketParams { addr: "127.0.0.1".to_string(), port: 1, ..Default::default() },
            connect_timeout: std::time::Duration::from_millis(200),
            ..Default::default()
        };
        let client = new_client(params);
        let status = client.run();
        assert!(!status.is_ok());
    }
}
