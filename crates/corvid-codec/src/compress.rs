//! Optional DEFLATE compression over a [`NetData`] payload.

use std::io::{Read, Write};

use corvid_core::{Kind, Status};
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use serde::{Deserialize, Serialize};

use crate::netdata::NetData;

/// Compression algorithm discriminant, packed into the header's low nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Algo {
    #[default]
    None = 0,
    Deflate = 1,
}

impl Algo {
    fn from_nibble(n: u8) -> Option<Self> {
        match n {
            0 => Some(Algo::None),
            1 => Some(Algo::Deflate),
            _ => None,
        }
    }
}

pub const DEFAULT_LEVEL: u8 = 4;
pub const MIN_LEVEL: u8 = 0;
pub const MAX_LEVEL: u8 = 9;
pub const DEFAULT_MIN_SIZE: usize = 128;

/// Parameters governing when/how a [`NetData`] payload is compressed.
#[derive(Debug, Clone, Copy)]
pub struct CompressionParams {
    pub algo: Algo,
    pub level: u8,
    pub min_size: usize,
}

impl Default for CompressionParams {
    fn default() -> Self {
        Self { algo: Algo::None, level: DEFAULT_LEVEL, min_size: DEFAULT_MIN_SIZE }
    }
}

/// Compresses `nd`'s payload in place according to `params`.
///
/// If the payload is smaller than `params.min_size`, the header's
/// compression algorithm is set to `None` and the payload is left
/// unmodified (Ok). Otherwise the payload is deflated; on success the
/// compressed bytes replace the original, `header.size_uncompressed`
/// records the pre-compression size, and `header.size`/compression flags
/// reflect the new state. On a deflate error the input is left unmodified
/// and a `Runtime` status is returned.
pub fn compress(nd: &mut NetData, params: &CompressionParams) -> Status {
    let original_len = nd.size();
    if original_len < params.min_size || matches!(params.algo, Algo::None) {
        nd.header.set_compression(Algo::None as u8);
        return Status::ok();
    }

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(u32::from(params.level)));
    if let Err(e) = encoder.write_all(nd.bytes()) {
        return Status::err(Kind::Runtime, format!("deflate write failed: {e}"));
    }
    let compressed = match encoder.finish() {
        Ok(c) => c,
        Err(e) => return Status::err(Kind::Runtime, format!("deflate finish failed: {e}")),
    };

    let mut scratch = NetData::new();
    scratch.data_mut().write(&compressed);
    nd.data_mut().move_from(scratch.data_mut(), true);
    nd.header.size_uncompressed = original_len as u32;
    nd.header.size = nd.size() as u32;
    nd.header.set_compression(Algo::Deflate as u8);
    nd.header.set_compression_level(params.level);
    Status::ok()
}

/// Decompresses `nd`'s payload in place.
///
/// When the header's algorithm is `None`, this is a no-op (rewind only,
/// Ok). Unknown algorithms return `Unsupported`.
pub fn decompress(nd: &mut NetData) -> Status {
    let Some(algo) = Algo::from_nibble(nd.header.get_compression()) else {
        return Status::err(Kind::Unsupported, "unknown compression algorithm");
    };
    if matches!(algo, Algo::None) {
        nd.rewind();
        return Status::ok();
    }

    let expected_len = nd.header.size_uncompressed as usize;
    let mut decoder = DeflateDecoder::new(nd.bytes());
    let mut out = Vec::with_capacity(expected_len);
    if let Err(e) = decoder.read_to_end(&mut out) {
        return Status::err(Kind::Runtime, format!("inflate failed: {e}"));
    }

    let mut scratch = NetData::new();
    scratch.data_mut().write(&out);
    nd.data_mut().move_from(scratch.data_mut(), true);
    nd.header.size = nd.size() as u32;
    nd.header.size_uncompressed = 0;
    nd.header.set_compression(Algo::None as u8);
    nd.rewind();
    Status::ok()
}
