use crate::{coding, message, serve, setup};

#[derive(thiserror::Error, Debug, Clone)]
pub enum SessionError {
    #[error("webtransport session: {0}")]
    Session(#[from] web_transport::SessionError),

    #[error("webtransport write: {0}")]
    Write(#[from] web_transport::WriteError),

    #[error("webtransport read: {0}")]
    Read(#[from] web_transport::ReadError),

    #[error("encode error: {0}")]
    Encode(#[from] coding::EncodeError),

    #[error("decode error: {0}")]
    Decode(#[from] coding::DecodeError),

    // TODO move to a ConnectError
    #[error("unsupported versions: client={0:?} server={1:?}")]
    Version(setup::Versions, setup::Versions),

    /// TODO SLG - eventually remove or morph into error for incorrect control message for publisher/subscriber
    /// The role negiotiated in the handshake was violated. For example, a publisher sent a SUBSCRIBE, or a subscriber sent an OBJECT.
    #[error("role violation")]
    RoleViolation,

    /// A duplicate ID was used
    #[error("duplicate")]
    Duplicate,

    #[error("internal error")]
    Internal,

    #[error("serve error: {0}")]
    Serve(#[from] serve::ServeError),

    #[error("wrong size")]
    WrongSize,

    /// The peer (or we) sent GOAWAY; the session is draining and should be torn down
    /// once in-flight requests settle.
    #[error("go away: {0:?}")]
    GoAway(message::GoAway),

    /// A new request was attempted while the session is draining or closed.
    #[error("not connected")]
    NotConnected,

    /// The peer didn't complete the SETUP exchange within the configured deadline.
    #[error("setup timed out")]
    SetupTimeout,

    /// The request id allocator for this endpoint has run out of room below 2^62.
    #[error("request id space exhausted")]
    RequestIdsExhausted,

    /// A new request from the peer used a request id with the wrong parity for its role.
    #[error("wrong request id parity: {0}")]
    WrongParity(u64),
}

// Session Termination Error Codes from draft-ietf-moq-transport-14 Section 13.1.1
impl SessionError {
    /// An integer code that is sent over the wire.
    /// Returns Session Termination Error Codes per draft-14.
    pub fn code(&self) -> u64 {
        match self {
            // PROTOCOL_VIOLATION (0x3) - The role negotiated in the handshake was violated
            Self::RoleViolation => 0x3,
            // INTERNAL_ERROR (0x1) - Generic internal errors
            Self::Session(_) => 0x1,
            Self::Read(_) => 0x1,
            Self::Write(_) => 0x1,
            Self::Encode(_) => 0x1,
            Self::Internal => 0x1,
            // VERSION_NEGOTIATION_FAILED (0x15)
            Self::Version(..) => 0x15,
            // PROTOCOL_VIOLATION (0x3) - Malformed messages
            Self::Decode(_) => 0x3,
            Self::WrongSize => 0x3,
            // DUPLICATE_TRACK_ALIAS (0x5)
            Self::Duplicate => 0x5,
            // Delegate to ServeError for per-request error codes
            Self::Serve(err) => err.code(),
            // NO_ERROR (0x0) - graceful session teardown
            Self::GoAway(_) => 0x0,
            // Not a wire error; never sent over the wire.
            Self::NotConnected => 0x0,
            // INTERNAL_ERROR (0x1) - the handshake never completed
            Self::SetupTimeout => 0x1,
            // INTERNAL_ERROR (0x1) - we've exhausted the request id space
            Self::RequestIdsExhausted => 0x1,
            // PROTOCOL_VIOLATION (0x3) - request id parity didn't match the sender's role
            Self::WrongParity(_) => 0x3,
        }
    }

    /// Helper for unimplemented protocol features
    /// Logs a warning and returns a NotImplemented error instead of panicking
    pub fn unimplemented(feature: &str) -> Self {
        Self::Serve(serve::ServeError::not_implemented_ctx(feature))
    }
}

impl From<SessionError> for serve::ServeError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Serve(err) => err,
            SessionError::NotConnected => serve::ServeError::NotConnected,
            _ => serve::ServeError::internal_ctx(format!("session error: {}", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_timeout_maps_to_internal_error_code() {
        assert_eq!(SessionError::SetupTimeout.code(), 0x1);
    }

    #[test]
    fn not_connected_is_not_sent_over_the_wire() {
        assert_eq!(SessionError::NotConnected.code(), 0x0);
    }

    #[test]
    fn not_connected_converts_to_serve_not_connected() {
        let converted: serve::ServeError = SessionError::NotConnected.into();
        assert_eq!(converted, serve::ServeError::NotConnected);
    }

    #[test]
    fn request_ids_exhausted_maps_to_internal_error_code() {
        assert_eq!(SessionError::RequestIdsExhausted.code(), 0x1);
    }

    #[test]
    fn wrong_parity_maps_to_protocol_violation_code() {
        assert_eq!(SessionError::WrongParity(4).code(), 0x3);
    }
}
