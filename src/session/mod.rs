mod announce;
mod announced;
mod error;
mod fetch;
mod fetched;
mod publisher;
mod reader;
mod state;
mod subscribe;
mod subscribe_namespace;
mod subscribed;
mod subscriber;
mod writer;

pub use announce::*;
pub use announced::*;
pub use error::*;
pub use fetch::*;
pub use fetched::*;
pub use publisher::*;
pub use state::*;
pub use subscribe::*;
pub use subscribe_namespace::*;
pub use subscribed::*;
pub use subscriber::*;

use reader::*;
use writer::*;

use std::path::PathBuf;
use std::sync::{atomic, Arc, Mutex};
use std::time::Duration;

use futures::{stream::FuturesUnordered, StreamExt};

use crate::message::Message;
use crate::watch::Queue;
use crate::{message, mlog, setup};

/// Negotiable/tunable knobs for a [Session], independent of the wire handshake itself.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Versions advertised/accepted during the SETUP exchange.
    pub supported_versions: setup::Versions,

    /// How long to wait for the peer's half of the SETUP exchange before giving up.
    pub setup_timeout: Duration,

    /// Upper bound offered to the peer for subscribe/request ids, if any.
    pub max_subscribe_id: Option<u64>,

    /// Upper bound offered to the peer for track aliases, if any.
    pub max_track_alias: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            supported_versions: [setup::Version::DRAFT_14].into(),
            setup_timeout: Duration::from_secs(10),
            max_subscribe_id: None,
            max_track_alias: None,
        }
    }
}

#[must_use = "run() must be called"]
pub struct Session {
    webtransport: web_transport::Session,

    sender: Writer,
    recver: Reader,

    publisher: Option<Publisher>,
    subscriber: Option<Subscriber>,

    outgoing: Queue<Message>,
    state: ConnectionState,

    /// Writer halves of the GOAWAY notification queues; `run_recv` pushes onto these as soon
    /// as a GOAWAY is observed, the reader halves live on [Publisher]/[Subscriber] so the
    /// application can be notified independent of which half it's holding.
    goaway_pub: Queue<message::GoAway>,
    goaway_sub: Queue<message::GoAway>,

    /// Recognized setup parameters pulled out of the peer's CLIENT_SETUP/SERVER_SETUP.
    peer_params: setup::SetupParams,
}

impl Session {
    /// The peer's recognized setup parameters (`max_subscribe_id`, `max_track_alias`), parsed
    /// out during the handshake. Unrecognized parameter keys remain on the raw params the peer
    /// sent and are not exposed here.
    pub fn peer_setup_params(&self) -> &setup::SetupParams {
        &self.peer_params
    }

    fn new(
        webtransport: web_transport::Session,
        sender: Writer,
        recver: Reader,
        next_requestid: Arc<atomic::AtomicU64>,
        mlog: Option<Arc<Mutex<mlog::MlogWriter>>>,
        peer_params: setup::SetupParams,
    ) -> (Self, Option<Publisher>, Option<Subscriber>) {
        let outgoing = Queue::default().split();
        let goaway_pub = Queue::default().split();
        let goaway_sub = Queue::default().split();
        let state = ConnectionState::new(ConnectionPhase::Established);
        let publisher = Some(Publisher::new(
            outgoing.0.clone(),
            webtransport.clone(),
            next_requestid.clone(),
            state.clone(),
            goaway_pub.1,
        ));
        let subscriber = Some(Subscriber::new(
            outgoing.0,
            next_requestid,
            state.clone(),
            mlog,
            goaway_sub.1,
        ));

        let session = Self {
            webtransport,
            sender,
            recver,
            publisher: publisher.clone(),
            subscriber: subscriber.clone(),
            outgoing: outgoing.1,
            state,
            goaway_pub: goaway_pub.0,
            goaway_sub: goaway_sub.0,
            peer_params,
        };

        (session, publisher, subscriber)
    }

    /// Open an outbound/client QUIC connection, sending CLIENT_SETUP on a fresh bidirectional stream.
    ///
    /// `mlog_path`, if set, opens a qlog-compatible event log for the session's data plane.
    pub async fn connect(
        session: web_transport::Session,
        mlog_path: Option<PathBuf>,
    ) -> Result<(Session, Publisher, Subscriber), SessionError> {
        Self::connect_with_config(session, mlog_path, SessionConfig::default()).await
    }

    /// Same as [Session::connect], but with explicit [SessionConfig] knobs.
    pub async fn connect_with_config(
        mut session: web_transport::Session,
        mlog_path: Option<PathBuf>,
        config: SessionConfig,
    ) -> Result<(Session, Publisher, Subscriber), SessionError> {
        let setup_timeout = config.setup_timeout;
        let versions = config.supported_versions.clone();

        let handshake = async {
            let control = session.open_bi().await?;
            let mut sender = Writer::new(control.0);
            let mut recver = Reader::new(control.1);

            let advertised = setup::SetupParams {
                max_subscribe_id: config.max_subscribe_id,
                max_track_alias: config.max_track_alias,
            };
            let client = setup::Client {
                versions: versions.clone(),
                params: advertised.to_params(),
            };

            log::debug!("sending CLIENT_SETUP: {:?}", client);
            sender.encode(&client).await?;

            let server: setup::Server = recver.decode().await?;
            log::debug!("received SERVER_SETUP: {:?}", server);

            if !versions.contains(&server.version) {
                return Err(SessionError::Version(versions, [server.version].into()));
            }

            let peer_params = setup::SetupParams::parse(&server.params);

            Ok((sender, recver, peer_params))
        };

        let (sender, recver, peer_params) = tokio::time::timeout(setup_timeout, handshake)
            .await
            .map_err(|_| SessionError::SetupTimeout)??;
        log::debug!("negotiated setup parameters: {:?}", peer_params);

        let mlog = Self::open_mlog(mlog_path);

        // We opened the connection, so we own the even request ids.
        let next_requestid = Arc::new(atomic::AtomicU64::new(0));

        let session = Session::new(session, sender, recver, next_requestid, mlog, peer_params);
        Ok((session.0, session.1.unwrap(), session.2.unwrap()))
    }

    /// Accept an inbound/server QUIC connection, reading CLIENT_SETUP off a fresh bidirectional stream.
    pub async fn accept(
        session: web_transport::Session,
        mlog_path: Option<PathBuf>,
    ) -> Result<(Session, Option<Publisher>, Option<Subscriber>), SessionError> {
        Self::accept_with_config(session, mlog_path, SessionConfig::default()).await
    }

    /// Same as [Session::accept], but with explicit [SessionConfig] knobs.
    pub async fn accept_with_config(
        mut session: web_transport::Session,
        mlog_path: Option<PathBuf>,
        config: SessionConfig,
    ) -> Result<(Session, Option<Publisher>, Option<Subscriber>), SessionError> {
        let setup_timeout = config.setup_timeout;

        let handshake = async {
            let control = session.accept_bi().await?;
            let mut sender = Writer::new(control.0);
            let mut recver = Reader::new(control.1);

            let client: setup::Client = recver.decode().await?;
            log::debug!("received CLIENT_SETUP: {:?}", client);

            if !client.versions.contains(&setup::Version::DRAFT_14) {
                return Err(SessionError::Version(
                    client.versions,
                    [setup::Version::DRAFT_14].into(),
                ));
            }

            let peer_params = setup::SetupParams::parse(&client.params);

            let advertised = setup::SetupParams {
                max_subscribe_id: config.max_subscribe_id,
                max_track_alias: config.max_track_alias,
            };
            let server = setup::Server {
                version: setup::Version::DRAFT_14,
                params: advertised.to_params(),
            };

            log::debug!("sending SERVER_SETUP: {:?}", server);
            sender.encode(&server).await?;

            Ok((sender, recver, peer_params))
        };

        let (sender, recver, peer_params) = tokio::time::timeout(setup_timeout, handshake)
            .await
            .map_err(|_| SessionError::SetupTimeout)??;
        log::debug!("negotiated setup parameters: {:?}", peer_params);

        let mlog = Self::open_mlog(mlog_path);

        // We accepted the connection, so we own the odd request ids.
        let next_requestid = Arc::new(atomic::AtomicU64::new(1));

        Ok(Session::new(session, sender, recver, next_requestid, mlog, peer_params))
    }

    fn open_mlog(mlog_path: Option<PathBuf>) -> Option<Arc<Mutex<mlog::MlogWriter>>> {
        let path = mlog_path?;
        match mlog::MlogWriter::new(&path) {
            Ok(writer) => Some(Arc::new(Mutex::new(writer))),
            Err(err) => {
                log::warn!("failed to open mlog at {:?}: {}", path, err);
                None
            }
        }
    }

    pub async fn run(self) -> Result<(), SessionError> {
        tokio::select! {
            res = Self::run_recv(
                self.recver,
                self.publisher,
                self.subscriber.clone(),
                self.state,
                self.goaway_pub,
                self.goaway_sub,
            ) => res,
            res = Self::run_send(self.sender, self.outgoing) => res,
            res = Self::run_streams(self.webtransport.clone(), self.subscriber.clone()) => res,
            res = Self::run_datagrams(self.webtransport, self.subscriber) => res,
        }
    }

    async fn run_send(
        mut sender: Writer,
        mut outgoing: Queue<message::Message>,
    ) -> Result<(), SessionError> {
        while let Some(msg) = outgoing.pop().await {
            log::debug!("sending message: {:?}", msg);
            sender.encode(&msg).await?;
        }

        Ok(())
    }

    async fn run_recv(
        mut recver: Reader,
        mut publisher: Option<Publisher>,
        mut subscriber: Option<Subscriber>,
        state: ConnectionState,
        mut goaway_pub: Queue<message::GoAway>,
        mut goaway_sub: Queue<message::GoAway>,
    ) -> Result<(), SessionError> {
        loop {
            let msg: message::Message = recver.decode().await?;
            log::debug!("received message: {:?}", msg);

            let msg = match TryInto::<message::Publisher>::try_into(msg) {
                Ok(msg) => {
                    subscriber
                        .as_mut()
                        .ok_or(SessionError::RoleViolation)?
                        .recv_message(msg)?;
                    continue;
                }
                Err(msg) => msg,
            };

            let msg = match TryInto::<message::Subscriber>::try_into(msg) {
                Ok(msg) => {
                    publisher
                        .as_mut()
                        .ok_or(SessionError::RoleViolation)?
                        .recv_message(msg)?;
                    continue;
                }
                Err(msg) => msg,
            };

            match msg {
                message::Message::GoAway(msg) => {
                    log::info!("received GOAWAY: {:?}", msg);
                    // Entering the draining state: no new requests may be sent locally, but
                    // in-flight responses and data streams are still allowed to complete.
                    state.set(ConnectionPhase::Draining);
                    let _ = goaway_pub.push(msg.clone());
                    let _ = goaway_sub.push(msg);
                }
                msg => {
                    log::warn!("ignoring unsupported message in this context: {:?}", msg);
                }
            }
        }
    }

    async fn run_streams(
        mut webtransport: web_transport::Session,
        subscriber: Option<Subscriber>,
    ) -> Result<(), SessionError> {
        let mut tasks = FuturesUnordered::new();

        loop {
            tokio::select! {
                res = webtransport.accept_uni() => {
                    let stream = res?;
                    let subscriber = subscriber.clone().ok_or(SessionError::RoleViolation)?;

                    tasks.push(async move {
                        if let Err(err) = Subscriber::recv_stream(subscriber, stream).await {
                            log::warn!("failed to serve stream: {}", err);
                        };
                    });
                },
                _ = tasks.next(), if !tasks.is_empty() => {},
            };
        }
    }

    async fn run_datagrams(
        mut webtransport: web_transport::Session,
        mut subscriber: Option<Subscriber>,
    ) -> Result<(), SessionError> {
        loop {
            let datagram = webtransport.recv_datagram().await?;
            subscriber
                .as_mut()
                .ok_or(SessionError::RoleViolation)?
                .recv_datagram(datagram)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn session_config_defaults_to_draft_14_and_a_finite_timeout() {
        let config = SessionConfig::default();
        assert!(config.supported_versions.contains(&setup::Version::DRAFT_14));
        assert_eq!(config.setup_timeout, Duration::from_secs(10));
        assert_eq!(config.max_subscribe_id, None);
        assert_eq!(config.max_track_alias, None);
    }
}
