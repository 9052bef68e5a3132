use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// The lifecycle of a [super::Session], independent of the `Publisher`/`Subscriber` split.
///
/// Transitions: `Handshaking -> Established -> Draining -> Closed`. `Draining` is entered as
/// soon as either side sends or receives GOAWAY; `Closed` is entered when the transport itself
/// goes away. There's no path back from `Draining`/`Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionPhase {
    Handshaking = 0,
    Established = 1,
    Draining = 2,
    Closed = 3,
}

impl ConnectionPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Handshaking,
            1 => Self::Established,
            2 => Self::Draining,
            _ => Self::Closed,
        }
    }
}

/// Shared, cheaply-clonable handle to a session's current [ConnectionPhase].
///
/// Held by both the `Publisher` and `Subscriber` halves so that a GOAWAY or transport close
/// observed on one side is immediately visible to the other, without routing it through a
/// message queue.
#[derive(Clone)]
pub struct ConnectionState {
    phase: Arc<AtomicU8>,
}

impl ConnectionState {
    pub fn new(phase: ConnectionPhase) -> Self {
        Self {
            phase: Arc::new(AtomicU8::new(phase as u8)),
        }
    }

    pub fn get(&self) -> ConnectionPhase {
        ConnectionPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn set(&self, phase: ConnectionPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Returns `Ok(())` if new locally-initiated requests are currently allowed.
    pub fn check_connected(&self) -> Result<(), super::SessionError> {
        match self.get() {
            ConnectionPhase::Established => Ok(()),
            _ => Err(super::SessionError::NotConnected),
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(ConnectionPhase::Handshaking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn established_allows_requests() {
        let state = ConnectionState::new(ConnectionPhase::Established);
        assert!(state.check_connected().is_ok());
    }

    #[test]
    fn draining_rejects_requests() {
        let state = ConnectionState::new(ConnectionPhase::Established);
        state.set(ConnectionPhase::Draining);
        assert_eq!(state.get(), ConnectionPhase::Draining);
        assert!(state.check_connected().is_err());
    }

    #[test]
    fn closed_rejects_requests() {
        let state = ConnectionState::new(ConnectionPhase::Established);
        state.set(ConnectionPhase::Closed);
        assert!(state.check_connected().is_err());
    }

    #[test]
    fn handshaking_rejects_requests() {
        let state = ConnectionState::default();
        assert_eq!(state.get(), ConnectionPhase::Handshaking);
        assert!(state.check_connected().is_err());
    }

    #[test]
    fn clone_shares_the_same_phase() {
        let state = ConnectionState::new(ConnectionPhase::Established);
        let clone = state.clone();
        clone.set(ConnectionPhase::Draining);
        assert_eq!(state.get(), ConnectionPhase::Draining);
    }
}
