//! The `NetData` wire codec: a self-describing, tagged, length-prefixed
//! binary serialization format with a fixed global header, recursive
//! container/object encoding, and optional DEFLATE compression.

pub mod compress;
pub mod header;
pub mod netdata;
pub mod tag;

pub use compress::{Algo, CompressionParams, compress, decompress};
pub use header::{ELEM_HEADER_SIZE, ElemHeader, HEADER_SIZE, Header, MAGIC};
pub use netdata::{F128, NetCodec, NetData, NetObject, RawBytes};
