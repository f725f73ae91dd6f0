//! Unix domain control socket: newline-delimited signals that tell the
//! reader "something is available" without carrying the payload itself
//! (§4.2).

use std::path::{Path, PathBuf};

use buntime_shared::constants::MAX_SOCKET_PATH_LEN;
use buntime_shared::errors::{BuntimeError, BuntimeResult};
use buntime_shared::signal::Signal;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Pick a randomized control-socket path, falling back to `/tmp` when the
/// working-directory candidate would exceed the platform's socket path
/// limit (§3, §9 "Socket path length limit").
pub fn pick_socket_path(workdir: &Path, suffix: &str) -> PathBuf {
    let candidate = workdir.join(format!("buntime-{suffix}.sock"));
    if candidate.as_os_str().len() <= MAX_SOCKET_PATH_LEN {
        return candidate;
    }
    std::env::temp_dir().join(format!("buntime-{suffix}.sock"))
}

/// The supervisor side of the control socket: a listener plus the one
/// accepted connection to the worker.
pub struct ControlSocket {
    path: PathBuf,
    listener: UnixListener,
    conn: Option<UnixStream>,
}

impl ControlSocket {
    /// Bind a fresh listening socket at `path`, removing any stale file
    /// first.
    pub fn bind(path: PathBuf) -> BuntimeResult<Self> {
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)
            .map_err(|e| BuntimeError::Transport(format!("bind {}: {e}", path.display())))?;
        Ok(Self {
            path,
            listener,
            conn: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept the worker's single connection.
    pub async fn accept(&mut self) -> BuntimeResult<()> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| BuntimeError::Transport(format!("accept: {e}")))?;
        self.conn = Some(stream);
        Ok(())
    }

    /// Read and parse the next signal line from the worker. Returns `None`
    /// on EOF (the worker closed its end, i.e. died).
    pub async fn recv(&mut self) -> BuntimeResult<Option<Signal>> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(BuntimeError::Transport("socket not yet connected".into()));
        };
        let mut reader = BufReader::new(conn);
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .await
            .map_err(|e| BuntimeError::Transport(format!("recv: {e}")))?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Signal::parse(line.trim_end()))
    }

    /// Send a signal to the worker (used for test doubles and for the rare
    /// case the supervisor itself needs to prod the worker out-of-band).
    pub async fn send(&mut self, signal: &Signal) -> BuntimeResult<()> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(BuntimeError::Transport("socket not yet connected".into()));
        };
        conn.write_all(signal.to_line().as_bytes())
            .await
            .map_err(|e| BuntimeError::Transport(format!("send: {e}")))?;
        Ok(())
    }

    /// Stop listening and unlink the socket path. Idempotent.
    pub fn teardown(&mut self) {
        self.conn = None;
        let _ = std::fs::remove_file(&self.path);
    }
}

impl Drop for ControlSocket {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_workdir_path_is_used_as_is() {
        let path = pick_socket_path(Path::new("/tmp/short"), "abc123");
        assert!(path.starts_with("/tmp/short"));
    }

    #[test]
    fn overlong_workdir_path_falls_back_to_tmp() {
        let deep = "/".to_string() + &"x".repeat(200);
        let path = pick_socket_path(Path::new(&deep), "abc123");
        assert!(path.starts_with(std::env::temp_dir()));
    }

    #[tokio::test]
    async fn accept_then_recv_ready_signal() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("ctl.sock");
        let mut server = ControlSocket::bind(sock_path.clone()).unwrap();

        let client_path = sock_path.clone();
        let client = tokio::spawn(async move {
            let mut stream = UnixStream::connect(&client_path).await.unwrap();
            stream.write_all(b"READY\n").await.unwrap();
            stream
        });

        server.accept().await.unwrap();
        let signal = server.recv().await.unwrap();
        assert_eq!(signal, Some(Signal::Ready));
        client.await.unwrap();
    }

    #[tokio::test]
    async fn recv_returns_none_on_eof() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("ctl.sock");
        let mut server = ControlSocket::bind(sock_path.clone()).unwrap();

        let client_path = sock_path.clone();
        tokio::spawn(async move {
            let _stream = UnixStream::connect(&client_path).await.unwrap();
            // Drop immediately, closing the connection.
        });

        server.accept().await.unwrap();
        let signal = server.recv().await.unwrap();
        assert_eq!(signal, None);
    }
}
