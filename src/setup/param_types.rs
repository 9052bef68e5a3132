/// Setup parameters recognized during the CLIENT_SETUP/SERVER_SETUP exchange.
///
/// Unknown parameter keys are not an error: [crate::coding::KeyValuePairs] preserves them
/// opaquely and the application can still read them off the decoded [super::Client]/[super::Server].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u64)]
pub enum ParameterType {
    /// Upper bound the sender is willing to accept for subscribe/request ids.
    MaxSubscribeId = 0x01,
    /// Upper bound the sender is willing to accept for track aliases.
    MaxTrackAlias = 0x02,
    /// Versions the sender supports, echoed as a setup parameter in addition to
    /// the dedicated `versions`/`version` fields already on [super::Client]/[super::Server].
    SupportedVersions = 0x03,
}

impl From<ParameterType> for u64 {
    fn from(value: ParameterType) -> Self {
        value as u64
    }
}
