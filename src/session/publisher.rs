use std::{
    collections::{hash_map, HashMap},
    sync::{atomic, Arc, Mutex},
};

use futures::{stream::FuturesUnordered, StreamExt};

use crate::{
    coding::TrackNamespace,
    message::{self, Message},
    serve::{ServeError, TracksReader},
};

use crate::watch::Queue;

use super::{
    Announce, AnnounceRecv, ConnectionState, Fetched, FetchedRecv, Session, SessionError,
    Subscribed, SubscribedRecv,
};

// TODO remove Clone.
#[derive(Clone)]
pub struct Publisher {
    webtransport: web_transport::Session,

    announces: Arc<Mutex<HashMap<TrackNamespace, AnnounceRecv>>>,
    // TODO SLG - consider merging this with `announces` into a single dual-keyed map.
    announces_by_request_id: Arc<Mutex<HashMap<u64, TrackNamespace>>>,
    subscribed: Arc<Mutex<HashMap<u64, SubscribedRecv>>>,
    unknown: Queue<Subscribed>,

    /// Incoming FETCH requests, keyed by request id, so FETCH_CANCEL can be routed back.
    fetches: Arc<Mutex<HashMap<u64, FetchedRecv>>>,
    /// Incoming FETCH requests waiting for the application to serve them.
    unknown_fetches: Queue<Fetched>,

    /// Active SUBSCRIBE_NAMESPACE prefixes registered by the peer, keyed by request id.
    namespace_subscribes: Arc<Mutex<HashMap<u64, TrackNamespace>>>,

    outgoing: Queue<Message>,

    /// Shared lifecycle state (handshaking/established/draining/closed) for this session.
    state: ConnectionState,

    /// Allocator for track aliases handed out in SUBSCRIBE_OK, kept separate from request ids.
    next_track_alias: Arc<atomic::AtomicU64>,

    /// Shared with the Subscriber half of the session so that request ids are unique
    /// across the whole connection. See [Subscriber::next_requestid] for the parity rule.
    next_requestid: Arc<atomic::AtomicU64>,

    /// Read-only half of the session's GOAWAY notification queue; `Session::run_recv`
    /// pushes onto the write half as soon as a GOAWAY is observed.
    goaway: Queue<message::GoAway>,
}

impl Publisher {
    pub(crate) fn new(
        outgoing: Queue<Message>,
        webtransport: web_transport::Session,
        next_requestid: Arc<atomic::AtomicU64>,
        state: ConnectionState,
        goaway: Queue<message::GoAway>,
    ) -> Self {
        Self {
            webtransport,
            announces: Default::default(),
            announces_by_request_id: Default::default(),
            subscribed: Default::default(),
            unknown: Default::default(),
            fetches: Default::default(),
            unknown_fetches: Default::default(),
            namespace_subscribes: Default::default(),
            outgoing,
            state,
            next_track_alias: Arc::new(atomic::AtomicU64::new(0)),
            next_requestid,
            goaway,
        }
    }

    /// Wait for the next GOAWAY notification. Resolves once, permanently, the first time
    /// the peer (or we) sends GOAWAY; further calls after that point return immediately
    /// since the queue is only ever pushed to once per session.
    pub async fn goaway(&mut self) -> Option<message::GoAway> {
        self.goaway.pop().await
    }

    /// Get the current next request id to use and increment the value by 2 for the next request.
    /// Approaching 2^62 is a hard error rather than silently wrapping into the peer's parity space.
    fn get_next_request_id(&self) -> Result<u64, SessionError> {
        let id = self.next_requestid.fetch_add(2, atomic::Ordering::Relaxed);
        if id >= (1u64 << 62) {
            return Err(SessionError::RequestIdsExhausted);
        }
        Ok(id)
    }

    /// Allocate the next track alias to offer in a SUBSCRIBE_OK.
    pub(super) fn get_next_track_alias(&self) -> u64 {
        self.next_track_alias.fetch_add(1, atomic::Ordering::Relaxed)
    }

    /// Validate the parity of a request id on a newly received request. Our own allocator
    /// always steps by 2 from its starting parity, so its current value's parity (stable
    /// across the session) tells us which parity we own and, by elimination, which one
    /// the peer must be using for ids it originates.
    fn check_peer_request_id(&self, id: u64) -> Result<(), SessionError> {
        let own_parity = self.next_requestid.load(atomic::Ordering::Relaxed) % 2;
        if id % 2 == own_parity {
            return Err(SessionError::WrongParity(id));
        }
        Ok(())
    }

    pub async fn accept(
        session: web_transport::Session,
    ) -> Result<(Session, Publisher), SessionError> {
        let (session, publisher, _) = Session::accept(session, None).await?;
        Ok((session, publisher.unwrap()))
    }

    pub async fn connect(
        session: web_transport::Session,
    ) -> Result<(Session, Publisher), SessionError> {
        let (session, publisher, _) = Session::connect(session, None).await?;
        Ok((session, publisher))
    }

    /// Announce a namespace and serve tracks using the provided [serve::TracksReader].
    /// The caller uses [serve::TracksWriter] for static tracks and [serve::TracksRequest] for dynamic tracks.
    pub async fn announce(&mut self, tracks: TracksReader) -> Result<(), SessionError> {
        self.state.check_connected()?;

        let announce = match self
            .announces
            .lock()
            .unwrap()
            .entry(tracks.namespace.clone())
        {
            hash_map::Entry::Occupied(_) => return Err(ServeError::Duplicate.into()),
            hash_map::Entry::Vacant(entry) => {
                let request_id = self.get_next_request_id()?;
                let (send, recv) = Announce::new(self.clone(), request_id, tracks.namespace.clone());
                self.announces_by_request_id
                    .lock()
                    .unwrap()
                    .insert(request_id, tracks.namespace.clone());
                entry.insert(recv);
                send
            }
        };

        let mut subscribe_tasks = FuturesUnordered::new();
        let mut subscribe_done = false;

        loop {
            tokio::select! {
                res = announce.subscribed(), if !subscribe_done => {
                    match res? {
                        Some(subscribed) => {
                            let tracks = tracks.clone();

                            subscribe_tasks.push(async move {
                                let info = subscribed.info.clone();
                                if let Err(err) = Self::serve_subscribe(subscribed, tracks).await {
                                    log::warn!("failed serving subscribe: {:?}, error: {}", info, err)
                                }
                            });
                        },
                        None => subscribe_done = true,
                    }

                },
                Some(res) = subscribe_tasks.next() => res,
                else => return Ok(())
            }
        }
    }

    pub async fn serve_subscribe(
        subscribe: Subscribed,
        mut tracks: TracksReader,
    ) -> Result<(), SessionError> {
        if let Some(track) = tracks.subscribe(&subscribe.name) {
            subscribe.serve(track).await?;
        } else {
            subscribe.close(ServeError::NotFound)?;
        }

        Ok(())
    }

    // Returns subscriptions that do not map to an active announce.
    pub async fn subscribed(&mut self) -> Option<Subscribed> {
        self.unknown.pop().await
    }

    // Returns FETCH requests waiting to be served by the application.
    pub async fn fetched(&mut self) -> Option<Fetched> {
        self.unknown_fetches.pop().await
    }

    pub(crate) fn recv_message(&mut self, msg: message::Subscriber) -> Result<(), SessionError> {
        let res = match msg {
            message::Subscriber::PublishNamespaceOk(msg) => self.recv_publish_namespace_ok(msg),
            message::Subscriber::PublishNamespaceError(msg) => self.recv_publish_namespace_error(msg),
            message::Subscriber::PublishNamespaceCancel(msg) => self.recv_publish_namespace_cancel(msg),
            message::Subscriber::Subscribe(msg) => self.recv_subscribe(msg),
            message::Subscriber::Unsubscribe(msg) => self.recv_unsubscribe(msg),
            message::Subscriber::SubscribeUpdate(msg) => self.recv_subscribe_update(msg),
            message::Subscriber::SubscribeNamespace(msg) => self.recv_subscribe_namespace(msg),
            message::Subscriber::UnsubscribeNamespace(msg) => self.recv_unsubscribe_namespace(msg),
            message::Subscriber::Fetch(msg) => self.recv_fetch(msg),
            message::Subscriber::FetchCancel(msg) => self.recv_fetch_cancel(msg),
        };

        if let Err(err) = res {
            log::warn!("failed to process message: {}", err);
        }

        Ok(())
    }

    fn recv_publish_namespace_ok(&mut self, msg: message::PublishNamespaceOk) -> Result<(), SessionError> {
        let namespace = self
            .announces_by_request_id
            .lock()
            .unwrap()
            .get(&msg.id)
            .cloned();

        if let Some(namespace) = namespace {
            if let Some(announce) = self.announces.lock().unwrap().get_mut(&namespace) {
                announce.recv_ok()?;
            }
        }

        Ok(())
    }

    fn recv_publish_namespace_error(
        &mut self,
        msg: message::PublishNamespaceError,
    ) -> Result<(), SessionError> {
        let namespace = self
            .announces_by_request_id
            .lock()
            .unwrap()
            .remove(&msg.id);

        if let Some(namespace) = namespace {
            if let Some(announce) = self.announces.lock().unwrap().remove(&namespace) {
                announce.recv_error(ServeError::Closed(msg.error_code))?;
            }
        }

        Ok(())
    }

    fn recv_publish_namespace_cancel(
        &mut self,
        msg: message::PublishNamespaceCancel,
    ) -> Result<(), SessionError> {
        // TODO: If a publisher receives new subscriptions for that namespace after receiving
        // PUBLISH_NAMESPACE_CANCEL, it SHOULD close the session as a 'Protocol Violation'.
        if let Some(announce) = self.announces.lock().unwrap().remove(&msg.track_namespace) {
            self.announces_by_request_id
                .lock()
                .unwrap()
                .remove(&announce.request_id);
            announce.recv_error(ServeError::Cancel)?;
        }

        Ok(())
    }

    fn recv_subscribe(&mut self, msg: message::Subscribe) -> Result<(), SessionError> {
        self.check_peer_request_id(msg.id)?;
        let namespace = msg.track_namespace.clone();

        let subscribe = {
            let mut subscribes = self.subscribed.lock().unwrap();

            // Insert the abort handle into the lookup table.
            let entry = match subscribes.entry(msg.id) {
                hash_map::Entry::Occupied(_) => return Err(SessionError::Duplicate),
                hash_map::Entry::Vacant(entry) => entry,
            };

            let track_alias = self.get_next_track_alias();
            let (send, recv) = Subscribed::new(self.clone(), msg, track_alias);
            entry.insert(recv);

            send
        };

        // If we have an announce, route the subscribe to it.
        if let Some(announce) = self.announces.lock().unwrap().get_mut(&namespace) {
            return announce.recv_subscribe(subscribe).map_err(Into::into);
        }

        // Otherwise, put it in the unknown queue.
        // TODO Have some way to detect if the application is not reading from the unknown queue.
        if let Err(err) = self.unknown.push(subscribe) {
            // Default to closing with a not found error I guess.
            err.close(ServeError::NotFound)?;
        }

        Ok(())
    }

    fn recv_subscribe_update(&mut self, msg: message::SubscribeUpdate) -> Result<(), SessionError> {
        if let Some(subscribed) = self.subscribed.lock().unwrap().get_mut(&msg.id) {
            subscribed.recv_update(&msg)?;
        }

        Ok(())
    }

    fn recv_unsubscribe(&mut self, msg: message::Unsubscribe) -> Result<(), SessionError> {
        if let Some(subscribed) = self.subscribed.lock().unwrap().get_mut(&msg.id) {
            subscribed.recv_unsubscribe()?;
        }

        Ok(())
    }

    /// The peer wants to be notified about namespaces matching this prefix. We don't currently
    /// filter PUBLISH_NAMESPACE delivery by registered prefixes, so this just bookkeeps the
    /// registration and accepts it: every namespace we announce is visible to every peer anyway.
    fn recv_subscribe_namespace(&mut self, msg: message::SubscribeNamespace) -> Result<(), SessionError> {
        self.check_peer_request_id(msg.id)?;
        match self
            .namespace_subscribes
            .lock()
            .unwrap()
            .entry(msg.id)
        {
            hash_map::Entry::Occupied(_) => return Err(SessionError::Duplicate),
            hash_map::Entry::Vacant(entry) => {
                entry.insert(msg.track_namespace_prefix.clone());
            }
        }

        self.send_message(message::SubscribeNamespaceOk { id: msg.id });

        Ok(())
    }

    fn recv_unsubscribe_namespace(&mut self, msg: message::UnsubscribeNamespace) -> Result<(), SessionError> {
        self.namespace_subscribes.lock().unwrap().remove(&msg.id);

        Ok(())
    }

    fn recv_fetch(&mut self, msg: message::Fetch) -> Result<(), SessionError> {
        self.check_peer_request_id(msg.id)?;
        let id = msg.id;

        let fetched = {
            let mut fetches = self.fetches.lock().unwrap();

            let entry = match fetches.entry(id) {
                hash_map::Entry::Occupied(_) => return Err(SessionError::Duplicate),
                hash_map::Entry::Vacant(entry) => entry,
            };

            let (send, recv) = Fetched::new(self.clone(), msg);
            entry.insert(recv);

            send
        };

        if let Err(fetched) = self.unknown_fetches.push(fetched) {
            fetched.close(ServeError::NotFound)?;
        }

        Ok(())
    }

    fn recv_fetch_cancel(&mut self, msg: message::FetchCancel) -> Result<(), SessionError> {
        if let Some(fetched) = self.fetches.lock().unwrap().get_mut(&msg.id) {
            fetched.recv_fetch_cancel()?;
        }

        Ok(())
    }

    pub(super) fn send_message<T: Into<message::Publisher> + Into<Message>>(&mut self, msg: T) {
        let msg = msg.into();
        match &msg {
            message::Publisher::PublishDone(msg) => self.drop_subscribe(msg.id),
            message::Publisher::SubscribeError(msg) => self.drop_subscribe(msg.id),
            message::Publisher::PublishNamespaceDone(msg) => self.drop_announce(&msg.track_namespace),
            message::Publisher::FetchOk(_) | message::Publisher::FetchError(_) => {
                // Fetch lifetime is short-lived request/response; cleaned up when the Fetched
                // handle is dropped via drop_fetch below, not here.
            }
            _ => (),
        };

        self.outgoing.push(msg.into()).ok();
    }

    fn drop_subscribe(&mut self, id: u64) {
        self.subscribed.lock().unwrap().remove(&id);
    }

    pub(super) fn drop_fetch(&mut self, id: u64) {
        self.fetches.lock().unwrap().remove(&id);
    }

    fn drop_announce(&mut self, namespace: &TrackNamespace) {
        if let Some(announce) = self.announces.lock().unwrap().remove(namespace) {
            self.announces_by_request_id
                .lock()
                .unwrap()
                .remove(&announce.request_id);
        }
    }

    pub(super) async fn open_uni(&mut self) -> Result<web_transport::SendStream, SessionError> {
        Ok(self.webtransport.open_uni().await?)
    }

    pub(super) async fn send_datagram(&mut self, data: bytes::Bytes) -> Result<(), SessionError> {
        Ok(self.webtransport.send_datagram(data).await?)
    }
}
