use std::time;

/// How long the acceptor blocks on a single readability poll before
/// re-checking the termination flag.
pub const ACCEPT_POLL_DURATION: time::Duration = time::Duration::from_millis(200);

/// How long a TLS handshake may take before the connection is dropped.
pub const HANDSHAKE_TIMEOUT: time::Duration = time::Duration::from_secs(10);

/// How often the broadcaster retries an empty queue.
pub const BROADCAST_POLL_DURATION: time::Duration = time::Duration::from_millis(200);

/// Authentication deadline: a session that has not sent a valid `/nick`
/// within this long is dropped.
pub const AUTH_TIMEOUT: time::Duration = time::Duration::from_secs(30);

/// Chat idle deadline.
pub const CHAT_IDLE_TIMEOUT: time::Duration = time::Duration::from_secs(3 * 60);

/// Read timeout used for each individual socket read while a session polls
/// for the termination flag and its own deadlines.
pub const READ_POLL_DURATION: time::Duration = time::Duration::from_millis(200);

/// Size of the fixed-capacity per-connection read buffer.
pub const READ_BUF_SIZE: usize = 2048;

/// Maximum content length of a message payload, in bytes.
pub const MAX_CONTENT_SIZE: usize = 1535;

/// Maximum nickname length, in Unicode scalar values.
pub const MAX_NICKNAME_LEN: usize = 15;

/// Default values used when a config file omits a field.
pub const DEFAULT_HOST: &str = "::";
pub const DEFAULT_PORT: u16 = 7778;
pub const DEFAULT_MAX_CONNECTIONS: usize = 100;
