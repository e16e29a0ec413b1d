//! Socket parameters, a connected-socket wrapper, and the char-stream /
//! NetData recv-send primitives every client and server is built from.

use std::io::Write;
use std::net::TcpStream;
use std::os::fd::AsRawFd;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use corvid_codec::{Algo, CompressionParams, HEADER_SIZE, Header, NetData};
use corvid_core::{Bytes, Kind, Status};

pub const ANY_ADDR: &str = "0.0.0.0";
pub const LOCAL_ADDR: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 4321;
pub const DEFAULT_BUF_SIZE: usize = 8192;

/// Parameters shared between client and server sockets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketParams {
    pub addr: String,
    pub port: u16,
    pub compression: Algo,
    pub compression_level: u8,
    pub compression_min_size: usize,
    pub buffer_size: usize,
}

impl Default for SocketParams {
    fn default() -> Self {
        Self {
            addr: LOCAL_ADDR.to_string(),
            port: DEFAULT_PORT,
            compression: Algo::None,
            compression_level: CompressionParams::default().level,
            compression_min_size: CompressionParams::default().min_size,
            buffer_size: DEFAULT_BUF_SIZE,
        }
    }
}

impl SocketParams {
    pub fn compression_params(&self) -> CompressionParams {
        CompressionParams { algo: self.compression, level: self.compression_level, min_size: self.compression_min_size }
    }
}

/// Data handling mode for a server's accepted connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    CharStream,
    NetData,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::CharStream
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketClientParams {
    #[serde(flatten)]
    pub common: SocketParams,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub close_timeout: Duration,
}

impl Default for SocketClientParams {
    fn default() -> Self {
        Self { common: SocketParams::default(), connect_timeout: Duration::from_secs(5), close_timeout: Duration::from_secs(10) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketServerParams {
    #[serde(flatten)]
    pub common: SocketParams,
    pub backlog: u32,
    pub reuse_addr: bool,
    pub reuse_port: bool,
    pub mode: Mode,
    pub use_thread_pool: bool,
    pub thread_pool_size: usize,
    #[serde(with = "humantime_serde")]
    pub start_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for SocketServerParams {
    fn default() -> Self {
        Self {
            common: SocketParams { addr: ANY_ADDR.to_string(), ..SocketParams::default() },
            backlog: 128,
            reuse_addr: true,
            reuse_port: false,
            mode: Mode::CharStream,
            use_thread_pool: false,
            thread_pool_size: std::thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(1),
            start_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// A connected TCP socket plus a scratch buffer, wrapping the char-stream
/// and NetData recv/send protocols.
pub struct Socket {
    pub stream: TcpStream,
    pub peer_addr: String,
    pub peer_port: u16,
}

impl Socket {
    pub fn new(stream: TcpStream) -> std::io::Result<Self> {
        let peer = stream.peer_addr()?;
        Ok(Self { stream, peer_addr: peer.ip().to_string(), peer_port: peer.port() })
    }

    fn net_err(&self, msg: impl Into<String>) -> Status {
        tracing::debug!(addr = %self.peer_addr, port = self.peer_port, "{}", msg.into());
        Status::err(Kind::Net, format!("{}:{}", self.peer_addr, self.peer_port))
    }

    /// One `recv(2)` call, optionally with `MSG_PEEK`. Mirrors the
    /// original's raw socket calls directly rather than going through
    /// `std::net`'s buffered `Read` impl, so the header-peek path and the
    /// char-stream EOT-scanning loop share one code path.
    fn raw_recv(&self, buf: &mut [u8], peek: bool) -> std::io::Result<usize> {
        let flags = if peek { libc::MSG_PEEK } else { 0 };
        loop {
            let fd = self.stream.as_raw_fd();
            let n = unsafe { libc::recv(fd, buf.as_mut_ptr().cast(), buf.len(), flags) };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    /// Repeats [`Self::raw_recv`] (never peeking) until `buf` is fully
    /// populated or the peer closes the connection.
    fn raw_recv_exact(&self, buf: &mut [u8]) -> std::io::Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.raw_recv(&mut buf[filled..], false)? {
                0 => return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "peer closed the connection")),
                n => filled += n,
            }
        }
        Ok(())
    }

    /// Character-stream recv (`length == 0` contract): reads into `scratch`
    /// until a NUL terminator ends a chunk or a short read signals EOT,
    /// appending everything read to `data`.
    pub fn recv_chars(&mut self, data: &mut Bytes, scratch: &mut [u8]) -> Status {
        loop {
            let received = match self.raw_recv(scratch, false) {
                Ok(n) => n,
                Err(e) => return Status::from(e),
            };
            if received == 0 {
                return self.net_err("peer closed the connection");
            }
            let eot = scratch[received - 1] == 0;
            data.write(&scratch[..received]);
            if eot || received < scratch.len() {
                return Status::ok();
            }
        }
    }

    /// Length-prefixed recv: reads exactly `length` bytes into `data`.
    pub fn recv_exact(&mut self, data: &mut Bytes, length: usize) -> Status {
        let mut buf = vec![0u8; length];
        match self.raw_recv_exact(&mut buf) {
            Ok(()) => {
                data.write(&buf);
                Status::ok()
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => self.net_err("partial read"),
            Err(e) => Status::from(e),
        }
    }

    /// Single write of `data`; per the wire contract a short write is a
    /// Net error, not silently retried.
    pub fn send(&mut self, data: &[u8]) -> Status {
        if data.is_empty() {
            return Status::ok();
        }
        match self.stream.write(data) {
            Ok(n) if n == data.len() => Status::ok(),
            Ok(_) => self.net_err("partial write"),
            Err(e) => Status::from(e),
        }
    }

    /// Receives one framed NetData message: peeks the 24-byte header
    /// non-destructively, validates it, consumes it for real, then reads
    /// exactly `header.size` payload bytes.
    pub fn recv_nd(&mut self, nd: &mut NetData) -> Status {
        let mut hdr_buf = [0u8; HEADER_SIZE];
        let peeked = match self.raw_recv(&mut hdr_buf, true) {
            Ok(n) => n,
            Err(e) => return Status::from(e),
        };
        if peeked == 0 {
            return self.net_err("peer closed the connection");
        }
        if peeked != HEADER_SIZE {
            return Status::err(Kind::Invalid, "truncated NetData header");
        }
        let header = Header::from_bytes(&hdr_buf);
        if !header.is_valid() {
            return Status::err(Kind::Invalid, "invalid NetData header");
        }

        // Destructive re-read of the same bytes just peeked.
        if let Err(e) = self.raw_recv_exact(&mut hdr_buf) {
            return Status::from(e);
        }

        nd.header = header;
        nd.data_mut().resize(0);
        let status = if header.size > 0 {
            let mut payload = vec![0u8; header.size as usize];
            match self.raw_recv_exact(&mut payload) {
                Ok(()) => {
                    nd.data_mut().write(&payload);
                    Status::ok()
                }
                Err(e) => Status::from(e),
            }
        } else {
            Status::ok()
        };
        nd.rewind();
        status
    }

    /// Sends one framed NetData message: one write for the header, one for
    /// the payload.
    pub fn send_nd(&mut self, nd: &NetData) -> Status {
        let status = self.send(&nd.header.to_bytes());
        if !status.is_ok() {
            return status;
        }
        if nd.size() > 0 { self.send(nd.bytes()) } else { Status::ok() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    fn connected_pair() -> (Socket, Socket) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (Socket::new(client).unwrap(), Socket::new(server).unwrap())
    }

    #[test]
    fn char_stream_round_trips_with_eot() {
        let (mut client, mut server) = connected_pair();
        let status = client.send(b"hello\0");
        assert!(status.is_ok());

        let mut data = Bytes::new();
        let mut scratch = [0u8; 64];
        let status = server.recv_chars(&mut data, &mut scratch);
        assert!(status.is_ok());
        assert_eq!(data.data(), b"hello\0");
    }

    #[test]
    fn net_data_round_trips_over_the_wire() {
        let (mut client, mut server) = connected_pair();

        let mut nd = NetData::new();
        nd.write(&42i32);
        nd.finish_top_level_write();
        nd.rewind();
        nd.header.id = 7;

        let status = client.send_nd(&nd);
        assert!(status.is_ok());

        let mut received = NetData::new();
        let status = server.recv_nd(&mut received);
        assert!(status.is_ok());
        assert_eq!(received.header.id, 7);
        let value: i32 = received.read().unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn recv_nd_rejects_bad_magic() {
        let (mut client, mut server) = connected_pair();
        let mut garbage = [0u8; HEADER_SIZE];
        garbage[0] = 0xFF;
        let status = client.send(&garbage);
        assert!(status.is_ok());

        let mut nd = NetData::new();
        let status = server.recv_nd(&mut nd);
        assert_eq!(status.kind(), Kind::Invalid);
    }
}
