//! `buntime`: the supervisor-side core of a supervisor/worker sandbox.
//!
//! A privileged [`start_supervisor`] spawns an unprivileged worker,
//! wires two shared-memory ring buffers plus a Unix domain socket between
//! them, and arbitrates every filesystem/network/exec permission check the
//! worker sends back through the ring, against a declarative [`policy`].

pub mod env;
pub mod launcher;
pub mod policy;
pub mod ring_buffer;
pub mod supervisor;
pub mod transport;

pub mod active_policy;
pub mod metrics;
pub mod proxy;

pub use buntime_shared::errors::{BuntimeError, BuntimeResult};
pub use policy::Policy;
pub use supervisor::{
    start as start_supervisor, SupervisorConfig, SupervisorEvent, SupervisorHandle, WorkerState,
};
