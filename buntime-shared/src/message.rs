//! Wire message framing: a fixed 5-byte header plus a type-specific payload.
//!
//! A [`Message`] is what rides inside one ring-buffer record (see
//! `buntime::ring_buffer`); the ring's own length prefix tells the reader how
//! many payload bytes follow the header, so [`Message`] itself never encodes
//! its own length.

use crate::errors::{BuntimeError, BuntimeResult};

/// Stable wire values for each message type. Never renumber an existing
/// variant; the worker and supervisor are compiled independently and must
/// agree on these values indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// W→S: UTF-8 bytes of worker stdout.
    Stdout = 0x00,
    /// W→S: absolute path, optimistic fs-read check.
    FsRead = 0x01,
    /// W→S: absolute path, synchronous fs-write check.
    FsWrite = 0x02,
    /// W→S: `host:port` ASCII, synchronous net-connect check.
    NetConnect = 0x03,
    /// W→S: absolute executable path, synchronous exec check.
    Exec = 0x04,
    /// W→S: absolute directory path, optimistic listdir check.
    Listdir = 0x05,
    /// S→W: response permitting the checked operation.
    Allow = 0x10,
    /// S→W: response denying the checked operation.
    Deny = 0x11,
    /// S→W: UTF-8 code to execute.
    Code = 0x20,
}

impl MessageType {
    /// Decode a wire byte into a known message type.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Stdout),
            0x01 => Some(Self::FsRead),
            0x02 => Some(Self::FsWrite),
            0x03 => Some(Self::NetConnect),
            0x04 => Some(Self::Exec),
            0x05 => Some(Self::Listdir),
            0x10 => Some(Self::Allow),
            0x11 => Some(Self::Deny),
            0x20 => Some(Self::Code),
            _ => None,
        }
    }

    /// `true` for message types whose failure-remediation is "kill the
    /// worker", because the worker may have already performed the operation
    /// by the time the supervisor observes it (§4.7).
    pub fn is_optimistic_check(&self) -> bool {
        matches!(self, Self::FsRead | Self::Listdir)
    }

    /// `true` for message types the supervisor must answer with an
    /// `ALLOW`/`DENY` response before the worker proceeds.
    pub fn is_synchronous_check(&self) -> bool {
        matches!(self, Self::FsWrite | Self::Exec | Self::NetConnect)
    }
}

/// A decoded `[type: u8][request_id: u32 LE][payload: bytes]` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msg_type: MessageType,
    /// Caller-assigned correlation id. `0` is reserved for fire-and-forget
    /// messages (`STDOUT`, `CODE`); responses must echo the id of the
    /// request they answer.
    pub request_id: u32,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(msg_type: MessageType, request_id: u32, payload: Vec<u8>) -> Self {
        Self {
            msg_type,
            request_id,
            payload,
        }
    }

    /// Build a fire-and-forget message (`request_id = 0`).
    pub fn fire_and_forget(msg_type: MessageType, payload: Vec<u8>) -> Self {
        Self::new(msg_type, crate::constants::FIRE_AND_FORGET_REQUEST_ID, payload)
    }

    /// Encode as `[type][request_id LE][payload]`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(crate::constants::MESSAGE_HEADER_SIZE + self.payload.len());
        out.push(self.msg_type as u8);
        out.extend_from_slice(&self.request_id.to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode a frame previously produced by [`Message::encode`].
    ///
    /// A frame shorter than the 5-byte header, or carrying an unknown type
    /// byte, is malformed; per §7 the caller should drop it and emit an
    /// `error` event rather than treat it as fatal.
    pub fn decode(frame: &[u8]) -> BuntimeResult<Self> {
        if frame.len() < crate::constants::MESSAGE_HEADER_SIZE {
            return Err(BuntimeError::Codec(format!(
                "frame too short: {} bytes, need at least {}",
                frame.len(),
                crate::constants::MESSAGE_HEADER_SIZE
            )));
        }
        let msg_type = MessageType::from_byte(frame[0])
            .ok_or_else(|| BuntimeError::Codec(format!("unknown message type 0x{:02x}", frame[0])))?;
        let request_id = u32::from_le_bytes([frame[1], frame[2], frame[3], frame[4]]);
        let payload = frame[crate::constants::MESSAGE_HEADER_SIZE..].to_vec();
        Ok(Self::new(msg_type, request_id, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_type_and_request_id_and_payload() {
        let msg = Message::new(MessageType::FsWrite, 7, b"/tmp/test.txt".to_vec());
        let encoded = msg.encode();
        let decoded = Message::decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn empty_payload_round_trips() {
        let msg = Message::fire_and_forget(MessageType::Allow, Vec::new());
        let decoded = Message::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.payload.len(), 0);
        assert_eq!(decoded.request_id, 0);
    }

    #[test]
    fn rejects_short_frames() {
        assert!(Message::decode(&[0x00, 0x01, 0x02]).is_err());
    }

    #[test]
    fn rejects_unknown_type() {
        let mut frame = vec![0xffu8, 0, 0, 0, 0];
        frame.extend_from_slice(b"junk");
        assert!(Message::decode(&frame).is_err());
    }

    #[test]
    fn classifies_optimistic_vs_synchronous_checks() {
        assert!(MessageType::FsRead.is_optimistic_check());
        assert!(MessageType::Listdir.is_optimistic_check());
        assert!(!MessageType::FsWrite.is_optimistic_check());

        assert!(MessageType::FsWrite.is_synchronous_check());
        assert!(MessageType::Exec.is_synchronous_check());
        assert!(MessageType::NetConnect.is_synchronous_check());
        assert!(!MessageType::Stdout.is_synchronous_check());
    }

    #[test]
    fn wire_values_are_stable() {
        assert_eq!(MessageType::Stdout as u8, 0x00);
        assert_eq!(MessageType::FsRead as u8, 0x01);
        assert_eq!(MessageType::FsWrite as u8, 0x02);
        assert_eq!(MessageType::NetConnect as u8, 0x03);
        assert_eq!(MessageType::Exec as u8, 0x04);
        assert_eq!(MessageType::Listdir as u8, 0x05);
        assert_eq!(MessageType::Allow as u8, 0x10);
        assert_eq!(MessageType::Deny as u8, 0x11);
        assert_eq!(MessageType::Code as u8, 0x20);
    }
}
