//! TCP transport layer: socket primitives, an actor-based client, and an
//! accept-loop server with char-stream and NetData RPC dispatch.

pub mod client;
pub mod server;
pub mod socket;

pub use client::{NdRequest, SocketClient, SocketClientWorker, new_client};
pub use server::{DataInOut, Handler, HandlerRegistry, SocketServer, SocketServerWorker, new_server};
pub use socket::{ANY_ADDR, DEFAULT_BUF_SIZE, DEFAULT_PORT, LOCAL_ADDR, Mode, Socket, SocketClientParams, SocketParams, SocketServerParams};
