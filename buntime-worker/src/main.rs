//! Protocol-speaking worker fixture: no real interpreter, just enough of
//! the wire protocol to drive the supervisor through every check path in
//! integration tests. Guest code is a tiny newline-delimited instruction
//! language rather than a real scripting language, since the interpreter
//! itself is opaque to the core (§1 "worker-side interpreter embedding" is
//! out of scope).

use std::path::PathBuf;
use std::time::Duration;

use buntime::transport::Transport;
use buntime_shared::errors::{BuntimeError, BuntimeResult};
use buntime_shared::message::{Message, MessageType};
use buntime_shared::signal::{Signal, StateEvent};
use tokio::net::UnixStream;

const POLL_INTERVAL: Duration = Duration::from_millis(2);
const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> BuntimeResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error")),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    let mut args = std::env::args().skip(1);
    let socket_path = PathBuf::from(args.next().ok_or_else(|| {
        BuntimeError::Config("usage: buntime-worker <socket_path> <shm_name> <shm_size>".into())
    })?);
    let shm_name = args.next().ok_or_else(|| BuntimeError::Config("missing shm_name".into()))?;
    let shm_size: usize = args
        .next()
        .ok_or_else(|| BuntimeError::Config("missing shm_size".into()))?
        .parse()
        .map_err(|_| BuntimeError::Config("shm_size is not a valid integer".into()))?;

    let (shm, mut stream) = Transport::connect(&shm_name, shm_size, &socket_path).await?;
    send_signal(&mut stream, &Signal::Ready).await?;

    let s2w = shm.s2w();
    let w2s = shm.w2s();
    let mut next_request_id: u32 = 1;

    loop {
        let Some(frame) = poll_for(&s2w, Duration::MAX).await else {
            continue;
        };
        let message = Message::decode(&frame)?;
        if message.msg_type != MessageType::Code {
            // Stray ALLOW/DENY with no matching in-flight request; drop.
            continue;
        }
        let script = String::from_utf8_lossy(&message.payload).into_owned();

        send_signal(&mut stream, &Signal::State(StateEvent::new("exec_start"))).await?;
        run_script(&script, &w2s, &s2w, &mut stream, &mut next_request_id).await?;
        send_signal(&mut stream, &Signal::State(StateEvent::new("exec_end"))).await?;
    }
}

async fn run_script(
    script: &str,
    w2s: &buntime::ring_buffer::RingBuffer,
    s2w: &buntime::ring_buffer::RingBuffer,
    stream: &mut UnixStream,
    next_request_id: &mut u32,
) -> BuntimeResult<()> {
    for line in script.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        match verb {
            "PRINT" => {
                let message = Message::fire_and_forget(MessageType::Stdout, rest.as_bytes().to_vec());
                w2s.write(&message.encode());
                send_signal(stream, &Signal::Data).await?;
            }
            "READ" => send_optimistic(w2s, stream, MessageType::FsRead, rest).await?,
            "LISTDIR" => send_optimistic(w2s, stream, MessageType::Listdir, rest).await?,
            "WRITE" => {
                send_synchronous(w2s, s2w, stream, MessageType::FsWrite, rest, next_request_id).await?
            }
            "EXEC" => {
                send_synchronous(w2s, s2w, stream, MessageType::Exec, rest, next_request_id).await?
            }
            "CONNECT" => {
                send_synchronous(w2s, s2w, stream, MessageType::NetConnect, rest, next_request_id)
                    .await?
            }
            other => {
                let message = Message::fire_and_forget(
                    MessageType::Stdout,
                    format!("unknown instruction: {other}").into_bytes(),
                );
                w2s.write(&message.encode());
                send_signal(stream, &Signal::Data).await?;
            }
        }
    }
    Ok(())
}

async fn send_optimistic(
    w2s: &buntime::ring_buffer::RingBuffer,
    stream: &mut UnixStream,
    msg_type: MessageType,
    payload: &str,
) -> BuntimeResult<()> {
    let message = Message::fire_and_forget(msg_type, payload.as_bytes().to_vec());
    w2s.write(&message.encode());
    send_signal(stream, &Signal::Check).await
}

async fn send_synchronous(
    w2s: &buntime::ring_buffer::RingBuffer,
    s2w: &buntime::ring_buffer::RingBuffer,
    stream: &mut UnixStream,
    msg_type: MessageType,
    payload: &str,
    next_request_id: &mut u32,
) -> BuntimeResult<()> {
    let request_id = *next_request_id;
    *next_request_id += 1;

    let message = Message::new(msg_type, request_id, payload.as_bytes().to_vec());
    w2s.write(&message.encode());
    send_signal(stream, &Signal::Check).await?;

    let response = wait_for_response(s2w, request_id, CHECK_TIMEOUT)
        .await
        .ok_or_else(|| BuntimeError::Transport("timed out waiting for permission response".into()))?;
    let verdict = if response.msg_type == MessageType::Allow { "allowed" } else { "denied" };
    let note = Message::fire_and_forget(
        MessageType::Stdout,
        format!("{}: {verdict}", verb_for(msg_type)).into_bytes(),
    );
    w2s.write(&note.encode());
    send_signal(stream, &Signal::Data).await
}

fn verb_for(msg_type: MessageType) -> &'static str {
    match msg_type {
        MessageType::FsWrite => "write",
        MessageType::Exec => "exec",
        MessageType::NetConnect => "connect",
        _ => "check",
    }
}

async fn wait_for_response(
    ring: &buntime::ring_buffer::RingBuffer,
    request_id: u32,
    timeout: Duration,
) -> Option<Message> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(frame) = ring.read() {
            if let Ok(message) = Message::decode(&frame) {
                if message.request_id == request_id {
                    return Some(message);
                }
            }
            continue;
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn poll_for(ring: &buntime::ring_buffer::RingBuffer, timeout: Duration) -> Option<Vec<u8>> {
    let deadline = tokio::time::Instant::now().checked_add(timeout);
    loop {
        if let Some(frame) = ring.read() {
            return Some(frame);
        }
        if let Some(deadline) = deadline {
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn send_signal(stream: &mut UnixStream, signal: &Signal) -> BuntimeResult<()> {
    use tokio::io::AsyncWriteExt;
    stream
        .write_all(signal.to_line().as_bytes())
        .await
        .map_err(|e| BuntimeError::Transport(format!("failed to send {signal:?}: {e}")))?;
    Ok(())
}
