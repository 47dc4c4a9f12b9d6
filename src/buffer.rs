//! Per-connection circular byte buffer.
//!
//! [`Ring`] is a bounded byte ring with one slot permanently reserved so
//! that `read == write` is unambiguously "empty" rather than also being a
//! valid "full" state. It grows by a fixed factor when room runs out and
//! exposes scatter/gather vectors so the read and write paths can hand the
//! kernel exactly the writable or readable region without a copy.

use std::io::{self, IoSlice, IoSliceMut};

/// Ring buffers start at 4 KiB and grow by this factor each time they run
/// out of room.
const INITIAL_CAPACITY: usize = 4 * 1024;
const GROWTH_FACTOR: usize = 8;

/// The result of [`Ring::extract_to_terminator`].
///
/// The common case — the terminator falls in the contiguous tail-side
/// region — borrows directly out of the ring with no copy. Only the
/// wrap-around case, where the frame spans the physical end of the
/// buffer, allocates an owned, linearized copy. The borrow's lifetime
/// ends at the next mutating call on the ring it came from.
#[derive(Debug)]
pub enum Extracted<'a> {
    /// Zero-copy: a slice aliasing the ring's own storage.
    Borrowed(&'a [u8]),
    /// The frame wrapped past the end of the buffer and had to be
    /// linearized into a fresh allocation.
    Owned(Vec<u8>),
}

impl<'a> Extracted<'a> {
    /// The extracted bytes, terminator replaced with a trailing `\0`.
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Extracted::Borrowed(s) => s,
            Extracted::Owned(v) => v,
        }
    }

    /// `true` if this extraction required an allocation (the wrap case).
    pub fn is_owned(&self) -> bool {
        matches!(self, Extracted::Owned(_))
    }
}

/// A growable circular byte buffer with one reserved slot.
pub struct Ring {
    buf: Vec<u8>,
    read: usize,
    write: usize,
}

impl Ring {
    /// A new ring at the default starting capacity (4 KiB).
    pub fn new() -> Ring {
        Ring::with_capacity(INITIAL_CAPACITY)
    }

    /// A new ring with a caller-chosen starting capacity. Mostly useful
    /// for tests that want to exercise growth or wrap-around without
    /// pushing kilobytes of data through first.
    pub fn with_capacity(capacity: usize) -> Ring {
        assert!(capacity >= 2, "ring capacity must leave room for one reserved slot");
        Ring {
            buf: vec![0u8; capacity],
            read: 0,
            write: 0,
        }
    }

    /// Total allocated capacity, including the one reserved slot.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of unread bytes currently held.
    pub fn logical_len(&self) -> usize {
        let cap = self.capacity();
        if self.write >= self.read {
            self.write - self.read
        } else {
            cap - self.read + self.write
        }
    }

    /// Bytes that can be written without overwriting unread data.
    pub fn available_for_write(&self) -> usize {
        self.capacity() - 1 - self.logical_len()
    }

    /// `true` if there are no unread bytes.
    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// Raw cursor positions, exposed for property tests asserting the
    /// `0 <= cursor < capacity` ring invariant.
    #[cfg(test)]
    pub(crate) fn cursors(&self) -> (usize, usize) {
        (self.read, self.write)
    }

    /// Multiply capacity by the fixed growth factor, linearizing existing
    /// content to start at index 0. The only failure mode is allocator
    /// exhaustion, which the caller should treat as fatal to the owning
    /// connection — never to the process.
    pub fn grow(&mut self) -> io::Result<()> {
        let old_cap = self.capacity();
        let new_cap = old_cap
            .checked_mul(GROWTH_FACTOR)
            .ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "ring capacity overflow"))?;
        let len = self.logical_len();

        let mut new_buf: Vec<u8> = Vec::new();
        new_buf
            .try_reserve_exact(new_cap)
            .map_err(|_| io::Error::new(io::ErrorKind::OutOfMemory, "ring growth allocation failed"))?;
        new_buf.resize(new_cap, 0);

        if len > 0 {
            if self.write > self.read {
                new_buf[..len].copy_from_slice(&self.buf[self.read..self.write]);
            } else {
                let tail = old_cap - self.read;
                new_buf[..tail].copy_from_slice(&self.buf[self.read..old_cap]);
                new_buf[tail..len].copy_from_slice(&self.buf[..self.write]);
            }
        }

        self.buf = new_buf;
        self.read = 0;
        self.write = len;
        Ok(())
    }

    /// Grow until at least `n` bytes can be written without wrapping into
    /// unread data.
    fn ensure_free(&mut self, n: usize) -> io::Result<()> {
        while self.available_for_write() < n {
            self.grow()?;
        }
        Ok(())
    }

    /// Copy `data` into the ring, growing as needed.
    pub fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.ensure_free(data.len())?;
        let cap = self.capacity();
        let w = self.write;
        let first = (cap - w).min(data.len());
        self.buf[w..w + first].copy_from_slice(&data[..first]);
        let rest = &data[first..];
        if !rest.is_empty() {
            self.buf[..rest.len()].copy_from_slice(rest);
        }
        self.write = (w + data.len()) % cap;
        Ok(())
    }

    /// Move the write cursor forward by `n` (mod capacity), e.g. after a
    /// successful `readv` filled that many bytes via
    /// [`Ring::setup_readv_vectors`].
    pub fn advance_write(&mut self, n: usize) {
        self.write = (self.write + n) % self.capacity();
    }

    /// Move the read cursor forward by `n` (mod capacity), e.g. after a
    /// successful `writev` drained that many bytes via
    /// [`Ring::setup_writev_vectors`]. Resets both cursors to 0 once the
    /// ring is empty, as a defragmentation hint.
    pub fn advance_read(&mut self, n: usize) {
        self.read = (self.read + n) % self.capacity();
        if self.read == self.write {
            self.read = 0;
            self.write = 0;
        }
    }

    /// Scatter vectors (up to two) describing the writable region, for a
    /// `readv` call filling the ring from a socket. The dead slot is
    /// never included, so summed vector length equals
    /// [`Ring::available_for_write`] exactly.
    pub fn setup_readv_vectors(&mut self) -> Vec<IoSliceMut<'_>> {
        let cap = self.capacity();
        let avail = self.available_for_write();
        if avail == 0 {
            return Vec::new();
        }
        let write = self.write;
        if write + avail <= cap {
            vec![IoSliceMut::new(&mut self.buf[write..write + avail])]
        } else {
            let first_len = cap - write;
            let second_len = avail - first_len;
            let (left, right) = self.buf.split_at_mut(write);
            vec![IoSliceMut::new(right), IoSliceMut::new(&mut left[..second_len])]
        }
    }

    /// Gather vectors (up to two) describing the readable region, for a
    /// `writev` call draining the ring to a socket.
    pub fn setup_writev_vectors(&self) -> Vec<IoSlice<'_>> {
        let cap = self.capacity();
        let len = self.logical_len();
        if len == 0 {
            return Vec::new();
        }
        let read = self.read;
        if read + len <= cap {
            vec![IoSlice::new(&self.buf[read..read + len])]
        } else {
            let first_len = cap - read;
            let second_len = len - first_len;
            vec![IoSlice::new(&self.buf[read..cap]), IoSlice::new(&self.buf[..second_len])]
        }
    }

    /// Scan for the first `terminator` byte in the unread region and, if
    /// found, extract everything up to and including it, replacing the
    /// terminator with a trailing null byte in the returned buffer.
    ///
    /// Returns `None` if the terminator has not arrived yet; cursors are
    /// left untouched in that case so a later call (after more bytes
    /// arrive) re-scans from the same position.
    pub fn extract_to_terminator(&mut self, terminator: u8) -> Option<Extracted<'_>> {
        let cap = self.capacity();
        let read = self.read;
        let write = self.write;
        if read == write {
            return None;
        }

        if write > read {
            let rel = self.buf[read..write].iter().position(|&b| b == terminator)?;
            let pos = read + rel;
            self.buf[pos] = 0;
            let new_read = pos + 1;
            if new_read == write {
                self.read = 0;
                self.write = 0;
            } else {
                self.read = new_read;
            }
            return Some(Extracted::Borrowed(&self.buf[read..new_read]));
        }

        // Wrapped: unread bytes are tail-side [read, cap) then head-side [0, write).
        if let Some(rel) = self.buf[read..cap].iter().position(|&b| b == terminator) {
            let pos = read + rel;
            self.buf[pos] = 0;
            let new_read = pos + 1;
            let new_read_mod = new_read % cap;
            if new_read_mod == write {
                self.read = 0;
                self.write = 0;
            } else {
                self.read = new_read_mod;
            }
            return Some(Extracted::Borrowed(&self.buf[read..new_read]));
        }

        if let Some(q) = self.buf[..write].iter().position(|&b| b == terminator) {
            self.buf[q] = 0;
            let mut owned = Vec::with_capacity((cap - read) + q + 1);
            owned.extend_from_slice(&self.buf[read..cap]);
            owned.extend_from_slice(&self.buf[..=q]);
            let new_read = q + 1;
            if new_read == write {
                self.read = 0;
                self.write = 0;
            } else {
                self.read = new_read;
            }
            return Some(Extracted::Owned(owned));
        }

        None
    }
}

impl Default for Ring {
    fn default() -> Ring {
        Ring::new()
    }
}

impl std::fmt::Debug for Ring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ring")
            .field("capacity", &self.capacity())
            .field("read", &self.read)
            .field("write", &self.write)
            .field("len", &self.logical_len())
            .finish()
    }
}
