//! Constants shared between the supervisor and worker halves of buntime.
//!
//! These must agree on both sides of the transport boundary.

/// Byte size of the ring buffer header (`head`, `tail`, `capacity`, each a
/// little-endian `u32`, padded out to a cache-line-sized region).
pub const RING_HEADER_SIZE: usize = 64;

/// Byte size of the length prefix written before each ring record.
pub const RING_LENGTH_PREFIX: usize = 4;

/// Byte size of a wire [`crate::message::Message`] header
/// (`type: u8` + `request_id: u32` little-endian).
pub const MESSAGE_HEADER_SIZE: usize = 5;

/// `request_id` reserved for fire-and-forget messages (`STDOUT`, `CODE`).
pub const FIRE_AND_FORGET_REQUEST_ID: u32 = 0;

/// Maximum length, in bytes, of a Unix domain socket path on the platforms
/// buntime supports. The actual kernel limit is typically 104-108 bytes;
/// callers probe and fall back to `/tmp` when the working-directory path
/// would exceed this.
pub const MAX_SOCKET_PATH_LEN: usize = 100;

/// Maximum length of a POSIX shared-memory object name, chosen for
/// cross-platform portability (macOS caps names well below the Linux
/// `NAME_MAX`).
pub const MAX_SHM_NAME_LEN: usize = 31;

/// Prefix applied to environment variables that mirror CLI flags; every
/// variable with this prefix is consumed and scrubbed before the worker is
/// spawned.
pub const SUPERVISOR_ENV_PREFIX: &str = "POD_";

/// Environment variable carrying a base64-encoded policy document.
pub const POLICY_JSON_ENV: &str = "POD_POLICY_JSON";

/// Prefix stripped from environment variables forwarded to the worker
/// verbatim (`WORKER_FOO=bar` becomes `FOO=bar` in the worker's environment).
pub const WORKER_ENV_PREFIX: &str = "WORKER_";

/// Host proxy address injected into the worker's environment on Linux when
/// sandboxing is enabled.
pub const PROXY_HOST_ADDR: &str = "169.254.1.1";

/// Port the supervisor-side HTTP(S) proxy listens on.
pub const PROXY_PORT: u16 = 8080;

/// Subdirectory, under the working directory, where policy documents and
/// the active-policy sidecar are persisted.
pub const POLICIES_DIR: &str = "policies";

/// Filename of the persisted composite active policy.
pub const ACTIVE_POLICY_FILE: &str = "active.json";

/// Filename of the active policy's metadata sidecar.
pub const ACTIVE_POLICY_META_FILE: &str = "active.meta.json";
