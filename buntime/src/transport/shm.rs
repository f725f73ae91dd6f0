//! POSIX shared-memory region backing the two rings (§4.2).
//!
//! Grounded on the raw `shm_open`/`mmap`/`munmap` sequence used for
//! cross-process shared memory in the reference corpus: one `shm_open`
//! with `O_CREAT | O_RDWR`, one `ftruncate` to size, one `mmap`, mirrored by
//! `munmap` + `close` + `shm_unlink` on teardown, in that order (§4.2
//! "Teardown").

use std::ffi::CString;
use std::ptr;

use buntime_shared::errors::{BuntimeError, BuntimeResult};

use crate::ring_buffer::{RingBuffer, HEADER_SIZE};

/// An owned, mapped shared-memory region split into two rings: the lower
/// half is supervisor→worker (`s2w`), the upper half is worker→supervisor
/// (`w2s`).
pub struct SharedMemory {
    name: String,
    ptr: *mut u8,
    total_size: usize,
    fd: libc::c_int,
}

// The region is exclusively owned by this handle for mapping/unmapping
// purposes; concurrent ring access is governed by the SPSC contract of
// `RingBuffer` itself, not by `SharedMemory`.
unsafe impl Send for SharedMemory {}
unsafe impl Sync for SharedMemory {}

impl SharedMemory {
    /// Create (or recreate) a shared-memory object of `total_size` bytes
    /// and map both ring halves into it.
    ///
    /// Per §3 "Lifecycle of the transport": any prior segment of the same
    /// name is unlinked first, then both halves' headers are zeroed except
    /// for `capacity`, and both rings start empty.
    pub fn create(name: &str, total_size: usize) -> BuntimeResult<Self> {
        if total_size < 2 * HEADER_SIZE {
            return Err(BuntimeError::Config(format!(
                "shm size {total_size} too small for two {HEADER_SIZE}-byte ring headers"
            )));
        }
        let c_name = CString::new(name)
            .map_err(|_| BuntimeError::Config(format!("shm name {name:?} contains a NUL byte")))?;

        unsafe {
            // Best-effort: a stale segment of the same name may exist from a
            // crashed previous run.
            libc::shm_unlink(c_name.as_ptr());

            let fd = libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_RDWR | libc::O_EXCL,
                0o600,
            );
            if fd < 0 {
                return Err(BuntimeError::Transport(format!(
                    "shm_open({name}) failed: {}",
                    std::io::Error::last_os_error()
                )));
            }
            if libc::ftruncate(fd, total_size as libc::off_t) < 0 {
                let err = std::io::Error::last_os_error();
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
                return Err(BuntimeError::Transport(format!(
                    "ftruncate({name}, {total_size}) failed: {err}"
                )));
            }

            let ptr = libc::mmap(
                ptr::null_mut(),
                total_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            );
            if ptr == libc::MAP_FAILED {
                let err = std::io::Error::last_os_error();
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
                return Err(BuntimeError::Transport(format!("mmap({name}) failed: {err}")));
            }

            let shm = Self {
                name: name.to_string(),
                ptr: ptr as *mut u8,
                total_size,
                fd,
            };

            let ring_size = total_size / 2;
            let ring_capacity = (ring_size - HEADER_SIZE) as u32;
            RingBuffer::init(shm.ptr, ring_capacity);
            RingBuffer::init(shm.ptr.add(ring_size), ring_capacity);

            Ok(shm)
        }
    }

    /// Open an existing shared-memory object by name, mapping it without
    /// re-initializing the rings (the worker side calls this).
    pub fn open(name: &str, total_size: usize) -> BuntimeResult<Self> {
        let c_name = CString::new(name)
            .map_err(|_| BuntimeError::Config(format!("shm name {name:?} contains a NUL byte")))?;
        unsafe {
            let fd = libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0);
            if fd < 0 {
                return Err(BuntimeError::Transport(format!(
                    "shm_open({name}) failed: {}",
                    std::io::Error::last_os_error()
                )));
            }
            let ptr = libc::mmap(
                ptr::null_mut(),
                total_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            );
            if ptr == libc::MAP_FAILED {
                let err = std::io::Error::last_os_error();
                libc::close(fd);
                return Err(BuntimeError::Transport(format!("mmap({name}) failed: {err}")));
            }
            Ok(Self {
                name: name.to_string(),
                ptr: ptr as *mut u8,
                total_size,
                fd,
            })
        }
    }

    /// The supervisor→worker ring (lower half).
    pub fn s2w(&self) -> RingBuffer {
        unsafe { RingBuffer::from_region(self.ptr) }
    }

    /// The worker→supervisor ring (upper half).
    pub fn w2s(&self) -> RingBuffer {
        let ring_size = self.total_size / 2;
        unsafe { RingBuffer::from_region(self.ptr.add(ring_size)) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unmap, close, and unlink the region. Mandated order per §3: unmap
    /// before close before unlink. Idempotent — repeated calls are no-ops.
    pub fn teardown(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.total_size);
            libc::close(self.fd);
            if let Ok(c_name) = CString::new(self.name.clone()) {
                libc::shm_unlink(c_name.as_ptr());
            }
        }
        self.ptr = ptr::null_mut();
    }
}

impl Drop for SharedMemory {
    fn drop(&mut self) {
        self.teardown();
    }
}
