//! Single-producer/single-consumer byte ring over a caller-supplied memory
//! region (§4.1).
//!
//! The region is a 64-byte header (`head`, `tail`, `capacity`, each a
//! little-endian `u32` at a fixed offset) followed by `capacity` bytes of
//! data. [`RingBuffer`] never allocates or owns the region; it is a
//! non-owning view, matching the "encapsulate the mapped region in an
//! owning handle; Ring Buffer holds a non-owning view" re-architecture
//! called out in §9. Not thread-safe for multiple producers or multiple
//! consumers — exactly one of each.

use std::sync::atomic::{AtomicU32, Ordering};

const HEAD_OFFSET: usize = 0;
const TAIL_OFFSET: usize = 4;
const CAPACITY_OFFSET: usize = 8;

/// Byte size of the fixed ring buffer header.
pub const HEADER_SIZE: usize = 64;

/// A non-owning view over one ring buffer's header + data region.
///
/// # Safety
///
/// `region` must point to at least `HEADER_SIZE + capacity` valid,
/// writable bytes for the lifetime of this value, and must not be
/// concurrently accessed by more than one producer or more than one
/// consumer. Word-sized stores to naturally aligned header offsets are
/// atomic on every target buntime supports; a release fence follows every
/// `tail` write and an acquire fence precedes every `head` read.
pub struct RingBuffer {
    region: *mut u8,
}

// `RingBuffer` is Send/Sync: all header access goes through atomics, and
// the SPSC contract (exactly one writer thread, exactly one reader thread)
// is enforced by the caller, not the type system.
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// Wrap an existing region. `capacity` is read from the header, which
    /// must already have been initialized by [`RingBuffer::init`].
    ///
    /// # Safety
    /// See the struct-level safety note.
    pub unsafe fn from_region(region: *mut u8) -> Self {
        Self { region }
    }

    /// Zero the cursors and stamp `capacity` into a freshly mapped region.
    /// Must be called exactly once, by whichever side owns the mapping,
    /// before either side begins reading or writing.
    ///
    /// # Safety
    /// `region` must point to `HEADER_SIZE + capacity` valid bytes.
    pub unsafe fn init(region: *mut u8, capacity: u32) {
        let ring = Self { region };
        ring.head_atomic().store(0, Ordering::Relaxed);
        ring.tail_atomic().store(0, Ordering::Relaxed);
        ring.capacity_atomic().store(capacity, Ordering::Release);
    }

    fn header_atomic(&self, offset: usize) -> &AtomicU32 {
        unsafe { &*(self.region.add(offset) as *const AtomicU32) }
    }

    fn head_atomic(&self) -> &AtomicU32 {
        self.header_atomic(HEAD_OFFSET)
    }

    fn tail_atomic(&self) -> &AtomicU32 {
        self.header_atomic(TAIL_OFFSET)
    }

    fn capacity_atomic(&self) -> &AtomicU32 {
        self.header_atomic(CAPACITY_OFFSET)
    }

    fn data(&self) -> *mut u8 {
        unsafe { self.region.add(HEADER_SIZE) }
    }

    /// Capacity of the data area, `C` in the spec (`regionSize - 64`).
    pub fn capacity(&self) -> u32 {
        self.capacity_atomic().load(Ordering::Acquire)
    }

    /// Usable bytes: `C - 1`, the one-slot gap that distinguishes a full
    /// ring from an empty one.
    pub fn usable(&self) -> u32 {
        self.capacity().saturating_sub(1)
    }

    fn head(&self) -> u32 {
        self.head_atomic().load(Ordering::Acquire)
    }

    fn tail(&self) -> u32 {
        self.tail_atomic().load(Ordering::Acquire)
    }

    /// Bytes currently occupied by committed records (header + payload).
    pub fn used(&self) -> u32 {
        let cap = self.capacity();
        let (head, tail) = (self.head(), self.tail());
        if tail >= head {
            tail - head
        } else {
            cap - head + tail
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head() == self.tail()
    }

    /// Attempt to enqueue one length-prefixed record.
    ///
    /// Returns `payload.len()` on success, `0` if there is not enough
    /// room — the ring is left byte-for-byte unchanged on failure.
    pub fn write(&self, payload: &[u8]) -> usize {
        let cap = self.capacity();
        if cap == 0 {
            return 0;
        }
        let len = payload.len() as u32;
        let framed = 4u32.saturating_add(len);
        if framed as u64 > (self.usable() - self.used()) as u64 {
            return 0;
        }

        let tail = self.tail();
        self.write_wrapping(tail, &len.to_le_bytes(), cap);
        let payload_start = (tail + 4) % cap;
        self.write_wrapping(payload_start, payload, cap);

        let new_tail = (tail.wrapping_add(framed)) % cap;
        // Release: all bytes of the record must be visible before the
        // reader can observe the new tail.
        self.tail_atomic().store(new_tail, Ordering::Release);
        payload.len()
    }

    /// Attempt to dequeue one record. Returns `None` if the ring is empty,
    /// or if fewer than a complete framed record is currently available —
    /// the latter can only happen under a protocol violation, since a
    /// well-behaved SPSC writer never publishes a partial record, but a
    /// defensive reader must not assume that.
    pub fn read(&self) -> Option<Vec<u8>> {
        let cap = self.capacity();
        if cap == 0 || self.is_empty() {
            return None;
        }

        let head = self.head();
        if self.used() < 4 {
            return None;
        }
        let mut len_bytes = [0u8; 4];
        self.read_wrapping(head, &mut len_bytes, cap);
        let len = u32::from_le_bytes(len_bytes);
        if len > self.usable() {
            // A well-formed writer never produces this; treat it the same
            // as "not yet" rather than trusting an out-of-range length.
            return None;
        }

        let framed = 4u32.saturating_add(len);
        if self.used() < framed {
            return None;
        }

        let mut payload = vec![0u8; len as usize];
        self.read_wrapping((head + 4) % cap, &mut payload, cap);

        let new_head = (head.wrapping_add(framed)) % cap;
        // Acquire ordering on the read above is already established by
        // `head()`'s load; publish the advance with Release so the writer's
        // next `used()` computation sees it promptly.
        self.head_atomic().store(new_head, Ordering::Release);
        Some(payload)
    }

    fn write_wrapping(&self, pos: u32, bytes: &[u8], cap: u32) {
        let pos = pos as usize;
        let cap = cap as usize;
        let data = self.data();
        let first_chunk = (cap - pos).min(bytes.len());
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), data.add(pos), first_chunk);
            if first_chunk < bytes.len() {
                std::ptr::copy_nonoverlapping(
                    bytes.as_ptr().add(first_chunk),
                    data,
                    bytes.len() - first_chunk,
                );
            }
        }
    }

    fn read_wrapping(&self, pos: u32, buf: &mut [u8], cap: u32) {
        let pos = pos as usize;
        let cap = cap as usize;
        let data = self.data();
        let first_chunk = (cap - pos).min(buf.len());
        unsafe {
            std::ptr::copy_nonoverlapping(data.add(pos), buf.as_mut_ptr(), first_chunk);
            if first_chunk < buf.len() {
                std::ptr::copy_nonoverlapping(
                    data,
                    buf.as_mut_ptr().add(first_chunk),
                    buf.len() - first_chunk,
                );
            }
        }
    }
}
