use std::time::Duration;

/// How long the agent waits for a keepalive ping to be acknowledged.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Worker tasks draining the inbound queue.
pub const WORKER_COUNT: usize = 10;

/// Size of the UDP receive buffer.
pub const RECV_BUF_SIZE: usize = 8192;

/// Local address the agent binds when none is configured. The proxy is
/// expected on the same host.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:0";
