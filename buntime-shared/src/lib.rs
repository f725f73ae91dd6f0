//! Buntime Shared - wire protocol and constants shared between the
//! supervisor and worker.
//!
//! This crate contains the pieces that must agree on both sides of the
//! transport boundary: the message framing (§4.3), the control-plane signal
//! tokens (§4.2), error kinds, and wire constants. It deliberately has no
//! dependency on the ring buffer, policy, or supervisor — those are
//! supervisor-only concerns that live in `buntime`.

pub mod constants;
pub mod errors;
pub mod message;
pub mod signal;

pub use errors::{BuntimeError, BuntimeResult};
pub use message::{Message, MessageType};
pub use signal::{Signal, StateEvent};
