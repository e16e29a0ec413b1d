//! Growable byte buffer with seekable-file semantics.

/// Default growth block size, matching the historical `BUFSIZ` default on
/// Linux.
pub const DEFAULT_BLOCK_SIZE: usize = 8192;

/// `seek` origin, mirroring POSIX `SEEK_SET`/`SEEK_CUR`/`SEEK_END`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// A growable byte buffer with the semantics of a seekable file: `size`,
/// `capacity`, `tell`, `rewind`, `seek`, `read` (fails closed past EOF),
/// `write` (grows by block multiples).
///
/// Invariant: `0 <= pos <= size <= capacity`.
#[derive(Debug, Clone)]
pub struct MemFile {
    buf: Vec<u8>,
    size: usize,
    pos: usize,
    blk_size: usize,
}

impl Default for MemFile {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFile {
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(blk_size: usize) -> Self {
        let blk_size = blk_size.max(1);
        Self { buf: Vec::new(), size: 0, pos: 0, blk_size }
    }

    pub fn with_capacity(cap: usize) -> Self {
        let mut mf = Self::new();
        mf.buf.resize(cap, 0);
        mf
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Rounds `required` up to the next multiple of the configured block
    /// size.
    fn calc_required_capacity(&self, required: usize) -> usize {
        if required <= self.buf.len() {
            return self.buf.len();
        }
        required.div_ceil(self.blk_size) * self.blk_size
    }

    /// Repositions the cursor. Returns the resulting absolute position, or
    /// `None` if the requested position is negative.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Option<u64> {
        let base: i64 = match whence {
            Whence::Set => 0,
            Whence::Cur => self.pos as i64,
            Whence::End => self.size as i64,
        };
        let target = base.checked_add(offset)?;
        if target < 0 {
            return None;
        }
        self.pos = target as usize;
        Some(self.pos as u64)
    }

    /// Returns the number of bytes read (0 at EOF or when `n == 0`). Never
    /// moves `pos` past `size`.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        if dst.is_empty() || self.pos >= self.size {
            return 0;
        }
        let avail = self.size - self.pos;
        let n = avail.min(dst.len());
        dst[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    /// Writes `src` at the current cursor, growing the buffer in block
    /// multiples as needed. Extends `size` when the write passes the prior
    /// end. Returns the number of bytes written (0 when `src` is empty).
    pub fn write(&mut self, src: &[u8]) -> usize {
        if src.is_empty() {
            return 0;
        }
        let end = self.pos + src.len();
        if end > self.buf.len() {
            let new_cap = self.calc_required_capacity(end);
            self.buf.resize(new_cap, 0);
        }
        self.buf[self.pos..end].copy_from_slice(src);
        self.pos = end;
        if end > self.size {
            self.size = end;
        }
        src.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[..self.size]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        let size = self.size;
        &mut self.buf[..size]
    }

    /// Copies `other`'s bytes into `self`, leaving `other` untouched.
    pub fn copy_from(&mut self, other: &MemFile) {
        self.buf.clear();
        self.buf.extend_from_slice(&other.buf[..other.size]);
        self.size = other.size;
        self.pos = 0;
        self.blk_size = other.blk_size;
    }

    /// Transfers ownership of `other`'s bytes into `self`, clearing `other`.
    /// When `shrink_to` is true, the backing buffer is truncated to exactly
    /// `size` bytes (dropping unused capacity).
    pub fn move_from(&mut self, other: &mut MemFile, shrink_to: bool) {
        std::mem::swap(&mut self.buf, &mut other.buf);
        self.size = other.size;
        self.pos = 0;
        self.blk_size = other.blk_size;
        if shrink_to {
            self.buf.truncate(self.size);
        }
        other.buf.clear();
        other.size = 0;
        other.pos = 0;
    }

    /// Truncates or extends the logical size to `len`, zero-filling any
    /// newly exposed bytes and growing capacity if needed.
    pub fn resize(&mut self, len: usize) {
        if len > self.buf.len() {
            let new_cap = self.calc_required_capacity(len);
            self.buf.resize(new_cap, 0);
        }
        self.size = len;
        if self.pos > self.size {
            self.pos = self.size;
        }
    }
}

/// Alias matching the original's naming: an arbitrary binary blob.
pub type Blob = MemFile;
/// Alias matching the original's naming: a byte sequence.
pub type Bytes = MemFile;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_advances_pos_and_extends_size() {
        let mut mf = MemFile::new();
        assert_eq!(mf.write(b"hello"), 5);
        assert_eq!(mf.size(), 5);
        assert_eq!(mf.tell(), 5);
        assert!(mf.capacity() >= 5);
    }

    #[test]
    fn read_fails_closed_past_eof() {
        let mut mf = MemFile::new();
        mf.write(b"ab");
        mf.rewind();
        let mut buf = [0u8; 8];
        assert_eq!(mf.read(&mut buf), 2);
        assert_eq!(&buf[..2], b"ab");
        // further read at EOF returns 0 and does not move pos
        let pos_before = mf.tell();
        assert_eq!(mf.read(&mut buf), 0);
        assert_eq!(mf.tell(), pos_before);
    }

    #[test]
    fn seek_end_then_write_grows_size_by_written_len() {
        let mut mf = MemFile::new();
        mf.write(b"0123456789");
        mf.seek(0, Whence::End);
        mf.write(b"abc");
        assert_eq!(mf.size(), 13);
    }

    #[test]
    fn seek_negative_past_start_fails() {
        let mut mf = MemFile::new();
        mf.write(b"abc");
        assert!(mf.seek(-10, Whence::Cur).is_none());
    }

    #[test]
    fn copy_from_clones_without_touching_source() {
        let mut src = MemFile::new();
        src.write(b"payload");
        let mut dst = MemFile::new();
        dst.copy_from(&src);
        assert_eq!(dst.data(), b"payload");
        assert_eq!(src.data(), b"payload");
    }

    #[test]
    fn move_from_transfers_and_clears_source() {
        let mut src = MemFile::new();
        src.write(b"payload");
        let mut dst = MemFile::new();
        dst.move_from(&mut src, true);
        assert_eq!(dst.data(), b"payload");
        assert_eq!(src.size(), 0);
        assert_eq!(dst.capacity(), dst.size());
    }

    #[test]
    fn grows_in_block_multiples() {
        let mut mf = MemFile::with_block_size(16);
        mf.write(&[0u8; 5]);
        assert_eq!(mf.capacity() % 16, 0);
        assert!(mf.capacity() >= 16);
    }

    #[test]
    fn invariant_pos_le_size_le_capacity() {
        let mut mf = MemFile::new();
        mf.write(b"0123456789");
        assert!(mf.tell() as usize <= mf.size());
        assert!(mf.size() <= mf.capacity());
    }
}
