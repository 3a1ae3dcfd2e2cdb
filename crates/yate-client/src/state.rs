use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

/// Lifecycle of the link to the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session. The initial state, and where timeouts and `stop` land.
    Disconnected,
    /// `connect` sent, nothing heard back yet.
    Connecting,
    /// The proxy is talking to us but has not acknowledged the connect.
    ConnectedUnready,
    /// `connect_ack` received; keepalive running.
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::ConnectedUnready => "connected (unready)",
            Self::Ready => "ready",
        })
    }
}

/// Per-connection protocol state, always accessed under the client's lock.
#[derive(Debug)]
pub(crate) struct Session {
    pub state: ConnectionState,
    pub peer: Option<SocketAddr>,
    pub connect_id: Option<i64>,
    /// Keepalive ids the proxy has acknowledged.
    pub acked: HashSet<i64>,
    /// Bumped on every transition to `Ready` so a keepalive task from an
    /// earlier session notices it is stale.
    pub epoch: u64,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            peer: None,
            connect_id: None,
            acked: HashSet::new(),
            epoch: 0,
        }
    }

    /// Move to `Disconnected`. Returns `true` if the session was `Ready`, in
    /// which case the caller owes one disconnect notification.
    pub fn disconnect(&mut self) -> bool {
        let was_ready = self.state == ConnectionState::Ready;
        self.state = ConnectionState::Disconnected;
        self.acked.clear();
        was_ready
    }

    pub fn is_ready(&self, epoch: u64) -> bool {
        self.state == ConnectionState::Ready && self.epoch == epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_reports_ready_once() {
        let mut session = Session::new();
        session.state = ConnectionState::Ready;
        session.acked.insert(4);
        assert!(session.disconnect());
        assert!(session.acked.is_empty());
        assert!(!session.disconnect());
        assert_eq!(session.state, ConnectionState::Disconnected);
    }

    #[test]
    fn stale_epoch_is_not_ready() {
        let mut session = Session::new();
        session.state = ConnectionState::Ready;
        session.epoch = 2;
        assert!(session.is_ready(2));
        assert!(!session.is_ready(1));
    }
}
