//! Check arbitration: turns a decoded worker message into a decision, given
//! the active policy evaluator (§4.7 "Check arbitration").
//!
//! Deliberately pure and synchronous — no I/O happens here. The caller
//! (supervisor event loop) is responsible for actually writing a response
//! frame or killing the process; this module only decides what to do.

use std::net::IpAddr;
use std::str::FromStr;

use buntime_shared::errors::{BuntimeError, BuntimeResult};
use buntime_shared::message::{Message, MessageType};

use crate::policy::model::{Action, FsPerm, Proto};
use crate::policy::Evaluator;

/// What the supervisor should do in response to one drained `w2s` message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// `STDOUT`: forward to subscribers, send no response.
    Forward(Vec<u8>),
    /// An optimistic check (`FS_READ`/`LISTDIR`) that resolved to `allow`
    /// or `warn` — nothing to send back, the worker already proceeded.
    NoResponse,
    /// An optimistic check that resolved to `deny` — kill the worker.
    Kill,
    /// A synchronous check (`FS_WRITE`/`EXEC`/`NET_CONNECT`) response to
    /// enqueue on `s2w`, echoing the originating `request_id`.
    Respond { request_id: u32, allow: bool },
}

/// Decide the outcome for one message, consulting `evaluator`.
///
/// NET_CONNECT's `host:port` payload carries no explicit protocol; the
/// worker-level connect hook this wire format targets is TCP-only (UDP
/// filtering is an explicit non-goal), so NET_CONNECT is always evaluated
/// as `Proto::Tcp`.
pub fn arbitrate(message: &Message, evaluator: &Evaluator) -> BuntimeResult<Outcome> {
    match message.msg_type {
        MessageType::Stdout => Ok(Outcome::Forward(message.payload.clone())),

        MessageType::FsRead | MessageType::Listdir => {
            let perm = if message.msg_type == MessageType::FsRead {
                FsPerm::ReadFile
            } else {
                FsPerm::ReadDir
            };
            let path = decode_path(&message.payload)?;
            match evaluator.check_fs(&path, perm) {
                Action::Deny => Ok(Outcome::Kill),
                Action::Allow | Action::Warn => Ok(Outcome::NoResponse),
            }
        }

        MessageType::FsWrite => {
            let path = decode_path(&message.payload)?;
            let allow = evaluator.check_fs(&path, FsPerm::WriteFile) != Action::Deny;
            Ok(Outcome::Respond { request_id: message.request_id, allow })
        }

        MessageType::Exec => {
            let path = decode_path(&message.payload)?;
            let allow = evaluator.check_exec(&path) != Action::Deny;
            Ok(Outcome::Respond { request_id: message.request_id, allow })
        }

        MessageType::NetConnect => {
            let (ip, port) = decode_host_port(&message.payload)?;
            let allow = evaluator.check_net(ip, port, Proto::Tcp) != Action::Deny;
            Ok(Outcome::Respond { request_id: message.request_id, allow })
        }

        MessageType::Allow | MessageType::Deny | MessageType::Code => {
            Err(BuntimeError::Codec(format!(
                "{:?} is a supervisor-to-worker message type, not valid on w2s",
                message.msg_type
            )))
        }
    }
}

fn decode_path(payload: &[u8]) -> BuntimeResult<String> {
    String::from_utf8(payload.to_vec())
        .map_err(|e| BuntimeError::Codec(format!("payload is not valid UTF-8: {e}")))
}

fn decode_host_port(payload: &[u8]) -> BuntimeResult<(IpAddr, u16)> {
    let text = decode_path(payload)?;
    let (host, port) = text
        .rsplit_once(':')
        .ok_or_else(|| BuntimeError::Codec(format!("NET_CONNECT payload {text:?} missing port")))?;
    let ip = IpAddr::from_str(host)
        .map_err(|_| BuntimeError::Codec(format!("NET_CONNECT host {host:?} is not an IP literal")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| BuntimeError::Codec(format!("NET_CONNECT port {port:?} out of range")))?;
    Ok((ip, port))
}
