//! The transport: shared-memory rings plus the control socket that signals
//! when a ring has something in it (§4.2).

pub mod shm;
pub mod socket;

use buntime_shared::constants::RING_HEADER_SIZE;
use buntime_shared::errors::{BuntimeError, BuntimeResult};
use buntime_shared::signal::Signal;

use crate::ring_buffer::RingBuffer;
use shm::SharedMemory;
use socket::{pick_socket_path, ControlSocket};

/// The supervisor-side transport handle: owns the shared-memory mapping,
/// the listening control socket, and their cleanup.
///
/// Matches the §4.2 setup contract: `Transport::open` unlinks any stale
/// object of the same name, creates and maps a region of exactly
/// `total_size` bytes, constructs the two rings over it, and binds a
/// listening Unix domain socket at a randomized path.
pub struct Transport {
    shm: SharedMemory,
    control: ControlSocket,
}

impl Transport {
    /// Open a fresh transport under `name`, with shared-memory region of
    /// `total_size` bytes, binding its control socket under `workdir`.
    pub fn open(
        name: &str,
        total_size: usize,
        workdir: &std::path::Path,
    ) -> BuntimeResult<Self> {
        if total_size < 2 * RING_HEADER_SIZE {
            return Err(BuntimeError::Config(format!(
                "transport size {total_size} too small for two ring headers"
            )));
        }
        let shm = SharedMemory::create(name, total_size)?;
        let socket_path = pick_socket_path(workdir, name);
        let control = ControlSocket::bind(socket_path)?;
        Ok(Self { shm, control })
    }

    /// Worker-side counterpart: attach to an already-created region and
    /// connect out to the supervisor's listening socket.
    pub async fn connect(
        name: &str,
        total_size: usize,
        socket_path: &std::path::Path,
    ) -> BuntimeResult<(SharedMemory, tokio::net::UnixStream)> {
        let shm = SharedMemory::open(name, total_size)?;
        let stream = tokio::net::UnixStream::connect(socket_path)
            .await
            .map_err(|e| BuntimeError::Transport(format!("connect: {e}")))?;
        Ok((shm, stream))
    }

    /// The supervisor→worker ring.
    pub fn s2w(&self) -> RingBuffer {
        self.shm.s2w()
    }

    /// The worker→supervisor ring.
    pub fn w2s(&self) -> RingBuffer {
        self.shm.w2s()
    }

    pub fn shm_name(&self) -> &str {
        self.shm.name()
    }

    pub fn socket_path(&self) -> &std::path::Path {
        self.control.path()
    }

    /// Accept the worker's single connection to the control socket.
    pub async fn accept(&mut self) -> BuntimeResult<()> {
        self.control.accept().await
    }

    /// Block until the next control-plane signal arrives, or `None` on
    /// worker disconnect.
    pub async fn recv_signal(&mut self) -> BuntimeResult<Option<Signal>> {
        self.control.recv().await
    }

    /// Run the full teardown sequence: unmap, close, and unlink both the
    /// shared-memory segment and the control socket. Idempotent.
    pub fn teardown(&mut self) {
        self.control.teardown();
        self.shm.teardown();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_empty_rings_and_a_bound_socket() {
        let dir = tempfile::tempdir().unwrap();
        let name = format!("/buntime-transport-test-{}", std::process::id());
        let transport = Transport::open(&name, 4096, dir.path()).unwrap();
        assert!(transport.s2w().is_empty());
        assert!(transport.w2s().is_empty());
        assert!(transport.socket_path().exists());
    }

    #[test]
    fn rejects_undersized_region() {
        let dir = tempfile::tempdir().unwrap();
        let name = format!("/buntime-transport-small-{}", std::process::id());
        assert!(Transport::open(&name, 16, dir.path()).is_err());
    }

    #[test]
    fn teardown_removes_socket_path() {
        let dir = tempfile::tempdir().unwrap();
        let name = format!("/buntime-transport-teardown-{}", std::process::id());
        let mut transport = Transport::open(&name, 4096, dir.path()).unwrap();
        let path = transport.socket_path().to_path_buf();
        transport.teardown();
        assert!(!path.exists());
    }
}
