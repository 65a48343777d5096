// Protocol headers, shared with the broker. Must match byte-for-byte.
pub(crate) const MDPW_WORKER: &str = "MDPW01";
pub(crate) const MDP_CLIENT: &str = "MDPC01";

// Heartbeat
pub(crate) const HEARTBEAT_LIVENESS: usize = 3;
pub(crate) const HEARTBEAT_INTERVAL_MS: u64 = 2500;

// Polling
pub(crate) const POLL_TIMEOUT_MS: u64 = 2500;

// Reconnection
pub(crate) const RECONNECT_DELAY_MS: u64 = 2500;
// Slice size for the reconnect pause so an interrupt is noticed promptly.
pub(crate) const INTERRUPT_CHECK_INTERVAL_MS: u64 = 100;

// Message validity: delimiter + protocol header + command.
pub(crate) const MINIMUM_MESSAGE_FRAMES: usize = 3;

// Client half
pub(crate) const DEFAULT_REQUEST_RETRIES: usize = 3;
