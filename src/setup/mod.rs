//! Messages used for the MoQ Transport handshake.
//!
//! After establishing the WebTransport session, the client creates a bidirectional QUIC stream.
//! The client sends the [Client] message and the server responds with the [Server] message.
//! Both sides negotiate the [Version] and exchange setup [KeyValuePairs] (e.g.
//! [ParameterType::MaxSubscribeId] or [ParameterType::MaxTrackAlias]).

mod client;
mod param_types;
mod server;
mod version;

pub use client::*;
pub use param_types::*;
pub use server::*;
pub use version::*;

use crate::coding::KeyValuePairs;

pub const ALPN: &[u8] = b"moq-00";

/// Recognized setup parameters pulled out of a peer's [Client]/[Server] params, per
/// the handshake parsing rules: known keys are extracted, everything else (including
/// keys this crate doesn't recognize) stays reachable on the raw [KeyValuePairs].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetupParams {
    pub max_subscribe_id: Option<u64>,
    pub max_track_alias: Option<u64>,
}

impl SetupParams {
    pub fn parse(params: &KeyValuePairs) -> Self {
        let mut copy = params.clone();
        Self {
            max_subscribe_id: copy
                .get(ParameterType::MaxSubscribeId.into())
                .and_then(|kvp| match &kvp.value {
                    crate::coding::Value::IntValue(v) => Some(*v),
                    _ => None,
                }),
            max_track_alias: copy
                .get(ParameterType::MaxTrackAlias.into())
                .and_then(|kvp| match &kvp.value {
                    crate::coding::Value::IntValue(v) => Some(*v),
                    _ => None,
                }),
        }
    }

    /// Build a raw parameter list carrying only the values that are set.
    pub fn to_params(&self) -> KeyValuePairs {
        let mut params = KeyValuePairs::new();
        if let Some(v) = self.max_subscribe_id {
            params.set_intvalue(ParameterType::MaxSubscribeId.into(), v);
        }
        if let Some(v) = self.max_track_alias {
            params.set_intvalue(ParameterType::MaxTrackAlias.into(), v);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_recognized_params() {
        let params = SetupParams {
            max_subscribe_id: Some(1000),
            max_track_alias: Some(64),
        };
        let encoded = params.to_params();
        let parsed = SetupParams::parse(&encoded);
        assert_eq!(parsed, params);
    }

    #[test]
    fn unset_fields_are_absent() {
        let params = SetupParams::parse(&KeyValuePairs::new());
        assert_eq!(params, SetupParams::default());
    }
}
