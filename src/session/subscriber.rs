use std::{
    collections::{hash_map, HashMap},
    io,
    sync::{atomic, Arc, Mutex},
};

use crate::{
    coding::{Decode, KeyValuePairs, Location, TrackNamespace},
    data,
    message::{self, GroupOrder, Message},
    mlog,
    serve::{self, ServeError},
};

use crate::watch::Queue;

use super::{
    Announced, AnnouncedRecv, ConnectionState, Fetch, FetchRecv, Reader, Session, SessionError,
    Subscribe, SubscribeNamespace, SubscribeNamespaceRecv, SubscribeRecv,
};

// TODO remove Clone.
#[derive(Clone)]
pub struct Subscriber {
    /// The currently active inbound announces, keyed by namespace.
    announced: Arc<Mutex<HashMap<TrackNamespace, AnnouncedRecv>>>,

    /// Queue of announced namespaces we have received from the Publisher, waiting to be processed.
    announced_queue: Queue<Announced>,

    /// Reverse lookup from request id to namespace, so a PUBLISH_NAMESPACE rejection (which only
    /// carries a request id) can still find the announce to drop out of `announced`.
    announced_by_request_id: Arc<Mutex<HashMap<u64, TrackNamespace>>>,

    /// The currently active outbound subscribes, keyed by request id.
    subscribes: Arc<Mutex<HashMap<u64, SubscribeRecv>>>,

    /// Map of track alias to subscription id for quick lookup when receiving streams/datagrams.
    subscribe_alias_map: Arc<Mutex<HashMap<u64, u64>>>,

    /// The currently active outbound FETCH requests, keyed by request id.
    fetches: Arc<Mutex<HashMap<u64, FetchRecv>>>,

    /// The currently active outbound SUBSCRIBE_NAMESPACE registrations, keyed by request id.
    namespace_subscribes: Arc<Mutex<HashMap<u64, SubscribeNamespaceRecv>>>,

    /// The queue we will write any outbound control messages we want to send, the session run_send task
    /// will process the queue and send the message on the control stream.
    outgoing: Queue<Message>,

    /// Shared lifecycle state (handshaking/established/draining/closed) for this session.
    state: ConnectionState,

    /// When we need a new Request Id for sending a request, we can get it from here.  Note:  The instance
    /// of AtomicU64 is shared with the Subscriber, so the session uses unique request ids for all requests
    /// generated.  Note:  If we initiated the QUIC connection then request id's start at 0 and increment by 2
    /// for each request (even numbers).  If we accepted an inbound QUIC connection then request id's start at 1 and
    /// increment by 2 for each request (odd numbers).
    next_requestid: Arc<atomic::AtomicU64>,

    /// Optional mlog writer for logging transport events
    mlog: Option<Arc<Mutex<mlog::MlogWriter>>>,

    /// Read-only half of the session's GOAWAY notification queue; `Session::run_recv`
    /// pushes onto the write half as soon as a GOAWAY is observed.
    goaway: Queue<message::GoAway>,
}

impl Subscriber {
    pub(super) fn new(
        outgoing: Queue<Message>,
        next_requestid: Arc<atomic::AtomicU64>,
        state: ConnectionState,
        mlog: Option<Arc<Mutex<mlog::MlogWriter>>>,
        goaway: Queue<message::GoAway>,
    ) -> Self {
        Self {
            announced: Default::default(),
            announced_queue: Default::default(),
            announced_by_request_id: Default::default(),
            subscribes: Default::default(),
            subscribe_alias_map: Default::default(),
            fetches: Default::default(),
            namespace_subscribes: Default::default(),
            outgoing,
            state,
            next_requestid,
            mlog,
            goaway,
        }
    }

    /// Wait for the next GOAWAY notification. See [Publisher::goaway] for delivery semantics.
    pub async fn goaway(&mut self) -> Option<message::GoAway> {
        self.goaway.pop().await
    }

    /// Create an inbound/server QUIC connection, by accepting a bi-directional QUIC stream for control messages.
    pub async fn accept(session: web_transport::Session) -> Result<(Session, Self), SessionError> {
        let (session, _, subscriber) = Session::accept(session, None).await?;
        Ok((session, subscriber.unwrap()))
    }

    /// Create an outbound/client QUIC connection, by opening a bi-directional QUIC stream for control messages.
    pub async fn connect(session: web_transport::Session) -> Result<(Session, Self), SessionError> {
        let (session, _, subscriber) = Session::connect(session, None).await?;
        Ok((session, subscriber))
    }

    /// Wait for the next announced namespace from the publisher, if any.
    pub async fn announced(&mut self) -> Option<Announced> {
        self.announced_queue.pop().await
    }

    /// Get the current next request id to use and increment the value for by 2 for the next request.
    /// Approaching 2^62 is a hard error rather than silently wrapping into the peer's parity space.
    fn get_next_request_id(&self) -> Result<u64, SessionError> {
        let id = self.next_requestid.fetch_add(2, atomic::Ordering::Relaxed);
        if id >= (1u64 << 62) {
            return Err(SessionError::RequestIdsExhausted);
        }
        Ok(id)
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

    /// Subscribe to a track by creating a new subscribe request to the publisher.  Block until subscription is closed.
    pub async fn subscribe(&mut self, track: serve::TrackWriter) -> Result<(), ServeError> {
        self.state.check_connected().map_err(|_| ServeError::NotConnected)?;

        let request_id = self.get_next_request_id()?;
        let (send, recv) = Subscribe::new(self.clone(), request_id, track);
        self.subscribes.lock().unwrap().insert(request_id, recv);

        send.closed().await
    }

    /// Fetch a bounded range of already-published objects from a track, correlated by request id.
    #[allow(clippy::too_many_arguments)]
    pub fn fetch(
        &mut self,
        namespace: TrackNamespace,
        name: String,
        start_location: Location,
        end_location: Location,
        subscriber_priority: u8,
        group_order: GroupOrder,
        params: KeyValuePairs,
    ) -> Result<Fetch, SessionError> {
        self.state.check_connected()?;

        let request_id = self.get_next_request_id()?;
        let (send, recv) = Fetch::new(
            self.clone(),
            request_id,
            namespace,
            name,
            start_location,
            end_location,
            subscriber_priority,
            group_order,
            params,
        );
        self.fetches.lock().unwrap().insert(request_id, recv);

        Ok(send)
    }

    /// Register interest in namespaces matching a prefix, to be notified via PUBLISH_NAMESPACE.
    pub fn subscribe_namespace(
        &mut self,
        prefix: TrackNamespace,
        params: KeyValuePairs,
    ) -> Result<SubscribeNamespace, SessionError> {
        self.state.check_connected()?;

        let request_id = self.get_next_request_id()?;
        let (send, recv) = SubscribeNamespace::new(self.clone(), request_id, prefix, params);
        self.namespace_subscribes
            .lock()
            .unwrap()
            .insert(request_id, recv);

        Ok(send)
    }

    /// Send a message to the publisher via the control stream.
    pub(super) fn send_message<M: Into<message::Subscriber>>(&mut self, msg: M) {
        let msg = msg.into();

        // Remove our entry on terminal state.
        match &msg {
            message::Subscriber::PublishNamespaceCancel(msg) => {
                self.drop_publish_namespace(&msg.track_namespace)
            }
            message::Subscriber::PublishNamespaceError(msg) => self.drop_publish_namespace_by_id(msg.id),
            message::Subscriber::UnsubscribeNamespace(msg) => {
                self.namespace_subscribes.lock().unwrap().remove(&msg.id);
            }
            message::Subscriber::FetchCancel(msg) => {
                self.fetches.lock().unwrap().remove(&msg.id);
            }
            _ => {}
        }

        // TODO report dropped messages?
        let _ = self.outgoing.push(msg.into());
    }

    /// Receive a message from the publisher via the control stream.
    pub(super) fn recv_message(&mut self, msg: message::Publisher) -> Result<(), SessionError> {
        let res = match &msg {
            message::Publisher::PublishNamespace(msg) => self.recv_publish_namespace(msg),
            message::Publisher::PublishNamespaceDone(msg) => self.recv_publish_namespace_done(msg),
            message::Publisher::PublishDone(msg) => self.recv_publish_done(msg),
            message::Publisher::SubscribeOk(msg) => self.recv_subscribe_ok(msg),
            message::Publisher::SubscribeError(msg) => self.recv_subscribe_error(msg),
            message::Publisher::FetchOk(msg) => self.recv_fetch_ok(msg),
            message::Publisher::FetchError(msg) => self.recv_fetch_error(msg),
            message::Publisher::SubscribeNamespaceOk(msg) => self.recv_subscribe_namespace_ok(msg),
            message::Publisher::SubscribeNamespaceError(msg) => {
                self.recv_subscribe_namespace_error(msg)
            }
        };

        if let Err(SessionError::Serve(err)) = res {
            log::debug!("failed to process message: {:?} {}", msg, err);
            return Ok(());
        }

        res
    }

    /// Handle the reception of a PublishNamespace message from the publisher.
    fn recv_publish_namespace(
        &mut self,
        msg: &message::PublishNamespace,
    ) -> Result<(), SessionError> {
        self.check_peer_request_id(msg.id)?;
        let mut announces = self.announced.lock().unwrap();

        // Check for duplicate namespace announcement
        let entry = match announces.entry(msg.track_namespace.clone()) {
            hash_map::Entry::Occupied(_) => return Err(SessionError::Duplicate),
            hash_map::Entry::Vacant(entry) => entry,
        };

        // Create the announced namespace and insert it into our map of active announces, and the announced queue.
        let (announced, recv) = Announced::new(self.clone(), msg.id, msg.track_namespace.clone());
        if let Err(announced) = self.announced_queue.push(announced) {
            announced.close(ServeError::Cancel)?;
            return Ok(());
        }
        self.announced_by_request_id
            .lock()
            .unwrap()
            .insert(msg.id, msg.track_namespace.clone());
        entry.insert(recv);

        Ok(())
    }

    /// Handle the reception of a PublishNamespaceDone message from the publisher.
    fn recv_publish_namespace_done(
        &mut self,
        msg: &message::PublishNamespaceDone,
    ) -> Result<(), SessionError> {
        if let Some(announce) = self.announced.lock().unwrap().remove(&msg.track_namespace) {
            self.announced_by_request_id
                .lock()
                .unwrap()
                .remove(&announce.request_id);
            announce.recv_unannounce(msg.status_code)?;
        }

        Ok(())
    }

    /// Handle the reception of a FetchOk message from the publisher.
    fn recv_fetch_ok(&mut self, msg: &message::FetchOk) -> Result<(), SessionError> {
        if let Some(fetch) = self.fetches.lock().unwrap().get_mut(&msg.id) {
            fetch.ok(msg.group_order, msg.end_of_track)?;
        }

        Ok(())
    }

    /// Handle the reception of a FetchError message from the publisher.
    fn recv_fetch_error(&mut self, msg: &message::FetchError) -> Result<(), SessionError> {
        if let Some(fetch) = self.fetches.lock().unwrap().remove(&msg.id) {
            fetch.error(ServeError::Closed(msg.error_code))?;
        }

        Ok(())
    }

    /// Handle the reception of a SubscribeNamespaceOk message from the publisher.
    fn recv_subscribe_namespace_ok(
        &mut self,
        msg: &message::SubscribeNamespaceOk,
    ) -> Result<(), SessionError> {
        if let Some(sub) = self.namespace_subscribes.lock().unwrap().get_mut(&msg.id) {
            sub.ok()?;
        }

        Ok(())
    }

    /// Handle the reception of a SubscribeNamespaceError message from the publisher.
    fn recv_subscribe_namespace_error(
        &mut self,
        msg: &message::SubscribeNamespaceError,
    ) -> Result<(), SessionError> {
        if let Some(sub) = self.namespace_subscribes.lock().unwrap().remove(&msg.id) {
            sub.error(ServeError::Closed(msg.error_code))?;
        }

        Ok(())
    }

    /// Handle the reception of a SubscribeOk message from the publisher.
    fn recv_subscribe_ok(&mut self, msg: &message::SubscribeOk) -> Result<(), SessionError> {
        if let Some(subscribe) = self.subscribes.lock().unwrap().get_mut(&msg.id) {
            // Map track alias to subscription id for quick lookup when receiving streams/datagrams
            self.subscribe_alias_map
                .lock()
                .unwrap()
                .insert(msg.track_alias, msg.id);

            // Notify the subscribe of the successful subscription
            subscribe.ok(msg.track_alias)?;
        }

        Ok(())
    }

    /// Remove a subscribe from our map of active subscribes, and the alias map if present.
    fn remove_subscribe(&mut self, id: u64) -> Option<SubscribeRecv> {
        if let Some(subscribe) = self.subscribes.lock().unwrap().remove(&id) {
            // Remove from alias map if present
            if let Some(track_alias) = subscribe.track_alias() {
                self.subscribe_alias_map
                    .lock()
                    .unwrap()
                    .remove(&track_alias);
            };
            Some(subscribe)
        } else {
            None
        }
    }

    /// Handle the reception of a SubscribeError message from the publisher.
    fn recv_subscribe_error(&mut self, msg: &message::SubscribeError) -> Result<(), SessionError> {
        if let Some(subscribe) = self.remove_subscribe(msg.id) {
            subscribe.error(ServeError::Closed(msg.error_code))?;
        }

        Ok(())
    }

    /// Handle the reception of a PublishDone message from the publisher.
    fn recv_publish_done(&mut self, msg: &message::PublishDone) -> Result<(), SessionError> {
        if let Some(subscribe) = self.remove_subscribe(msg.id) {
            subscribe.error(ServeError::Closed(msg.status_code))?;
        }

        Ok(())
    }

    /// Remove an announced namespace from our map of active announces.
    fn drop_publish_namespace(&mut self, namespace: &TrackNamespace) {
        if let Some(announce) = self.announced.lock().unwrap().remove(namespace) {
            self.announced_by_request_id
                .lock()
                .unwrap()
                .remove(&announce.request_id);
        }
    }

    /// Remove an announced namespace from our map of active announces, by request id.
    fn drop_publish_namespace_by_id(&mut self, request_id: u64) {
        if let Some(namespace) = self
            .announced_by_request_id
            .lock()
            .unwrap()
            .remove(&request_id)
        {
            self.announced.lock().unwrap().remove(&namespace);
        }
    }

    /// Get a subscribe id by track alias.
    fn get_subscribe_id_by_alias(&mut self, track_alias: u64) -> Option<u64> {
        self.subscribe_alias_map
            .lock()
            .unwrap()
            .get(&track_alias)
            .cloned()
    }

    /// Handle reception of a new stream from the QUIC session.
    pub(super) async fn recv_stream(
        mut self,
        stream: web_transport::RecvStream,
    ) -> Result<(), SessionError> {
        log::trace!("[SUBSCRIBER] recv_stream: new stream received, decoding header");
        let mut reader = Reader::new(stream);

        // Decode the stream header
        let stream_header: data::StreamHeader = reader.decode().await?;
        log::debug!(
            "[SUBSCRIBER] recv_stream: decoded stream header type={:?}",
            stream_header.header_type
        );

        // Log subgroup header parsed/received
        if let Some(ref subgroup_header) = stream_header.subgroup_header {
            if let Some(ref mlog) = self.mlog {
                if let Ok(mut mlog_guard) = mlog.lock() {
                    let time = mlog_guard.elapsed_ms();
                    let stream_id = 0; // TODO: Placeholder, need actual QUIC stream ID
                    let event = mlog::subgroup_header_parsed(time, stream_id, subgroup_header);
                    let _ = mlog_guard.add_event(event);
                }
            }
        }

        if stream_header.header_type.is_fetch() {
            let request_id = stream_header
                .fetch_header
                .as_ref()
                .expect("fetch stream header carries a fetch_header")
                .request_id;
            log::trace!("[SUBSCRIBER] recv_stream: fetch stream for request_id={}", request_id);

            let res = self.recv_fetch_stream(request_id, reader).await;
            if let Err(SessionError::Serve(err)) = &res {
                log::warn!(
                    "[SUBSCRIBER] recv_stream: fetch stream error for request_id={}: {:?}",
                    request_id,
                    err
                );
                if let Some(fetch) = self.fetches.lock().unwrap().remove(&request_id) {
                    fetch.error(err.clone())?;
                }
            }

            return res;
        }

        let track_alias = stream_header
            .subgroup_header
            .as_ref()
            .ok_or_else(|| SessionError::Serve(ServeError::Internal("missing subgroup header".into())))?
            .track_alias;
        log::trace!(
            "[SUBSCRIBER] recv_stream: stream for subscription track_alias={}",
            track_alias
        );

        let mlog = self.mlog.clone();
        let res = self.recv_stream_inner(reader, stream_header, mlog).await;
        if let Err(SessionError::Serve(err)) = &res {
            log::warn!(
                "[SUBSCRIBER] recv_stream: stream processing error for track_alias={}: {:?}",
                track_alias,
                err
            );
            // The writer is closed, so we should teriminate.
            // TODO it would be nice to do this immediately when the Writer is closed.
            if let Some(subscribe_id) = self.get_subscribe_id_by_alias(track_alias) {
                if let Some(subscribe) = self.remove_subscribe(subscribe_id) {
                    subscribe.error(err.clone())?;
                }
            }
        }

        res
    }

    /// Read FETCH_HEADER-framed objects off a FETCH data stream and hand them to the waiting [Fetch].
    async fn recv_fetch_stream(
        &mut self,
        request_id: u64,
        mut reader: Reader,
    ) -> Result<(), SessionError> {
        while !reader.done().await? {
            let object = reader.decode::<data::FetchObject>().await?;

            let mut fetches = self.fetches.lock().unwrap();
            if let Some(fetch) = fetches.get_mut(&request_id) {
                fetch
                    .push_object(object)
                    .map_err(|_| SessionError::Serve(ServeError::Cancel))?;
            } else {
                return Err(SessionError::Serve(ServeError::NotFound));
            }
        }

        Ok(())
    }

    /// Continue handling the reception of a new stream from the QUIC session.
    async fn recv_stream_inner(
        &mut self,
        reader: Reader,
        stream_header: data::StreamHeader,
        mlog: Option<Arc<Mutex<mlog::MlogWriter>>>,
    ) -> Result<(), SessionError> {
        let track_alias = stream_header
            .subgroup_header
            .as_ref()
            .ok_or_else(|| SessionError::Serve(ServeError::Internal("missing subgroup header".into())))?
            .track_alias;
        log::trace!(
            "[SUBSCRIBER] recv_stream_inner: processing stream for track_alias={}",
            track_alias
        );

        // This is super silly, but I couldn't figure out a way to avoid the mutex guard across awaits.
        enum Writer {
            //Fetch(serve::FetchWriter),
            Subgroup(serve::SubgroupWriter),
        }

        let writer = {
            // Look up the subscribe id for this track alias
            if let Some(subscribe_id) = self.get_subscribe_id_by_alias(track_alias) {
                // Look up the subscribe by id
                let mut subscribes = self.subscribes.lock().unwrap();
                let subscribe = subscribes.get_mut(&subscribe_id).ok_or_else(|| {
                    log::error!(
                        "[SUBSCRIBER] recv_stream_inner: subscribe_id={} not found, track_alias={}",
                        subscribe_id,
                        track_alias
                    );
                    ServeError::NotFound
                })?;

                // Create the appropriate writer based on the stream header type
                if stream_header.header_type.is_subgroup() {
                    log::trace!("[SUBSCRIBER] recv_stream_inner: creating subgroup writer");
                    Writer::Subgroup(subscribe.subgroup(stream_header.subgroup_header.clone().ok_or_else(|| {
                        SessionError::Serve(ServeError::Internal("missing subgroup header".into()))
                    })?)?)
                } else {
                    log::error!(
                        "[SUBSCRIBER] recv_stream_inner: stream header_type={} not supported",
                        stream_header.header_type
                    );
                    return Err(SessionError::Serve(ServeError::Internal(format!(
                        "unsupported stream header type={}",
                        stream_header.header_type
                    ))));
                }
            } else {
                log::error!(
                    "[SUBSCRIBER] recv_stream_inner: subscription track_alias={} not found",
                    track_alias
                );
                return Err(SessionError::Serve(ServeError::NotFound));
            }
        };

        // Handle the stream based on the writer type
        match writer {
            //Writer::Fetch(fetch) => Self::recv_fetch(fetch, reader).await?,
            Writer::Subgroup(subgroup_writer) => {
                log::trace!("[SUBSCRIBER] recv_stream_inner: receiving subgroup data");
                Self::recv_subgroup(stream_header.header_type, subgroup_writer, reader, mlog)
                    .await?
            }
        };

        log::debug!(
            "[SUBSCRIBER] recv_stream_inner: completed processing stream for track_alias={}",
            track_alias
        );
        Ok(())
    }

    /// Handle reception of subgroup objects and payloads on a subgroup data stream.
    async fn recv_subgroup(
        _stream_header_type: data::StreamHeaderType,
        mut subgroup_writer: serve::SubgroupWriter,
        mut reader: Reader,
        mlog: Option<Arc<Mutex<mlog::MlogWriter>>>,
    ) -> Result<(), SessionError> {
        log::debug!(
            "[SUBSCRIBER] recv_subgroup: starting - group_id={}, subgroup_id={}, priority={}",
            subgroup_writer.info.group_id,
            subgroup_writer.info.subgroup_id,
            subgroup_writer.info.priority
        );

        let mut object_count = 0;
        let mut last_object_id: Option<u64> = None;
        while !reader.done().await? {
            let object = reader.decode::<data::SubgroupObject>().await?;
            log::debug!(
                "[SUBSCRIBER] recv_subgroup: object #{} - object_id={}, payload_len={}, status={:?}, extension_headers={:?}",
                object_count + 1,
                object.object_id,
                object.payload.len(),
                object.status,
                object.extension_headers
            );

            // Ordering within a subgroup: object_ids MUST be strictly increasing. A violation
            // is a protocol error reported to the subscription (the caller maps a
            // `SessionError::Serve` return here into `subscribe.error(...)`), but does not
            // terminate the session -- other subscriptions and streams are unaffected.
            if let Some(last) = last_object_id {
                if object.object_id <= last {
                    log::warn!(
                        "[SUBSCRIBER] recv_subgroup: out-of-order object_id={} after last={} on group_id={}, subgroup_id={}",
                        object.object_id,
                        last,
                        subgroup_writer.info.group_id,
                        subgroup_writer.info.subgroup_id
                    );
                    return Err(SessionError::Serve(ServeError::Internal(format!(
                        "out-of-order object_id={} after last={} on group_id={}, subgroup_id={}",
                        object.object_id,
                        last,
                        subgroup_writer.info.group_id,
                        subgroup_writer.info.subgroup_id
                    ))));
                }
            }
            last_object_id = Some(object.object_id);

            if object.extension_headers.has(0xB) {
                log::warn!(
                    "[SUBSCRIBER] recv_subgroup: object #{} contains IMMUTABLE EXTENSIONS (type 0xB) - currently not forwarded/processed",
                    object_count + 1
                );
            }
            if object.extension_headers.has(0x3C) {
                log::info!(
                    "[SUBSCRIBER] recv_subgroup: object #{} contains PRIOR GROUP ID GAP (type 0x3C)",
                    object_count + 1
                );
            }

            if let Some(ref mlog) = mlog {
                if let Ok(mut mlog_guard) = mlog.lock() {
                    let time = mlog_guard.elapsed_ms();
                    let stream_id = 0; // TODO: Placeholder, need actual QUIC stream ID
                    let event = mlog::subgroup_object_parsed(
                        time,
                        stream_id,
                        subgroup_writer.info.group_id,
                        subgroup_writer.info.subgroup_id,
                        object.object_id,
                        &object,
                    );
                    let _ = mlog_guard.add_event(event);
                }
            }

            let mut object_writer =
                subgroup_writer.create(object.object_id, object.status, object.payload.len())?;
            if !object.payload.is_empty() {
                object_writer.write(object.payload)?;
            }

            object_count += 1;
        }

        log::info!(
            "[SUBSCRIBER] recv_subgroup: completed subgroup (group_id={}, subgroup_id={}, {} objects received)",
            subgroup_writer.info.group_id,
            subgroup_writer.info.subgroup_id,
            object_count
        );

        Ok(())
    }

    /// Handle reception of a datagram from the QUIC session.
    pub fn recv_datagram(&mut self, datagram: bytes::Bytes) -> Result<(), SessionError> {
        let mut cursor = io::Cursor::new(datagram);
        let datagram = data::Datagram::decode(&mut cursor)?;

        if let Some(ref mlog) = self.mlog {
            if let Ok(mut mlog_guard) = mlog.lock() {
                let time = mlog_guard.elapsed_ms();
                let stream_id = 0; // TODO: Placeholder, need actual QUIC stream ID
                let _ =
                    mlog_guard.add_event(mlog::object_datagram_parsed(time, stream_id, &datagram));
            }
        }

        // Check for extension headers in the datagram
        if let Some(ref ext_headers) = datagram.extension_headers {
            log::debug!(
                "[SUBSCRIBER] recv_datagram: datagram contains extension headers: {:?}",
                ext_headers
            );

            // Check for known draft-14 extension types

            // Check for Immutable Extensions (type 0xB = 11)
            if ext_headers.has(0xB) {
                log::warn!(
                    "[SUBSCRIBER] recv_datagram: datagram contains IMMUTABLE EXTENSIONS (type 0xB) - currently not forwarded/processed"
                );
                if let Some(immutable_ext) = ext_headers.get(0xB) {
                    log::info!(
                        "[SUBSCRIBER] recv_datagram: immutable extension details: {:?}",
                        immutable_ext
                    );
                }
            }

            // Check for Prior Group ID Gap (type 0x3C = 60)
            if ext_headers.has(0x3C) {
                log::info!(
                    "[SUBSCRIBER] recv_datagram: datagram contains PRIOR GROUP ID GAP (type 0x3C)"
                );
                if let Some(gap_ext) = ext_headers.get(0x3C) {
                    log::debug!(
                        "[SUBSCRIBER] recv_datagram: prior group id gap details: {:?}",
                        gap_ext
                    );
                }
            }
        }

        // Look up the subscribe id for this track alias
        if let Some(subscribe_id) = self.get_subscribe_id_by_alias(datagram.track_alias) {
            // Look up the subscribe by id
            if let Some(subscribe) = self.subscribes.lock().unwrap().get_mut(&subscribe_id) {
                log::trace!(
                    "[SUBSCRIBER] recv_datagram: track_alias={}, group_id={}, object_id={}, publisher_priority={}, status={}, payload_length={}",
                    datagram.track_alias,
                    datagram.group_id,
                    datagram.object_id,
                    datagram.publisher_priority,
                    datagram.status.as_ref().map_or("None".to_string(), |s| format!("{:?}", s)),
                    datagram.payload.as_ref().map_or(0, |p| p.len()));
                subscribe.datagram(datagram)?;
            }
        } else {
            log::warn!(
                "[SUBSCRIBER] recv_datagram: discarded due to unknown track_alias: track_alias={}, group_id={}, object_id={}, publisher_priority={}, status={}, payload_length={}",
                datagram.track_alias,
                datagram.group_id,
                datagram.object_id,
                datagram.publisher_priority,
                datagram.status.as_ref().map_or("None".to_string(), |s| format!("{:?}", s)),
                datagram.payload.as_ref().map_or(0, |p| p.len()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConnectionPhase;

    fn new_subscriber(phase: ConnectionPhase) -> Subscriber {
        let outgoing = Queue::default().split().0;
        let next_requestid = Arc::new(atomic::AtomicU64::new(0));
        let state = ConnectionState::new(phase);
        Subscriber::new(outgoing, next_requestid, state, None, Queue::default().split().1)
    }

    fn namespace() -> TrackNamespace {
        TrackNamespace::from_utf8_path("example/namespace")
    }

    #[test]
    fn fetch_rejected_while_draining() {
        let mut subscriber = new_subscriber(ConnectionPhase::Draining);
        let err = subscriber
            .fetch(
                namespace(),
                "track".to_string(),
                Location::new(0, 0),
                Location::new(10, 0),
                0,
                GroupOrder::Ascending,
                KeyValuePairs::default(),
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
    }

    #[test]
    fn fetch_errors_once_request_ids_approach_2_62() {
        let outgoing = Queue::default().split().0;
        let next_requestid = Arc::new(atomic::AtomicU64::new(1u64 << 62));
        let state = ConnectionState::new(ConnectionPhase::Established);
        let mut subscriber = Subscriber::new(outgoing, next_requestid, state, None, Queue::default().split().1);

        let err = subscriber
            .fetch(
                namespace(),
                "track".to_string(),
                Location::new(0, 0),
                Location::new(10, 0),
                0,
                GroupOrder::Ascending,
                KeyValuePairs::default(),
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::RequestIdsExhausted));
    }

    #[test]
    fn fetch_registers_itself_by_request_id_while_established() {
        let mut subscriber = new_subscriber(ConnectionPhase::Established);
        let fetch = subscriber
            .fetch(
                namespace(),
                "track".to_string(),
                Location::new(0, 0),
                Location::new(10, 0),
                0,
                GroupOrder::Ascending,
                KeyValuePairs::default(),
            )
            .unwrap();

        assert_eq!(subscriber.fetches.lock().unwrap().len(), 1);
        drop(fetch);
    }

    #[test]
    fn subscribe_namespace_rejected_while_closed() {
        let mut subscriber = new_subscriber(ConnectionPhase::Closed);
        let err = subscriber
            .subscribe_namespace(namespace(), KeyValuePairs::default())
            .unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
    }

    #[test]
    fn subscribe_namespace_registers_itself_while_established() {
        let mut subscriber = new_subscriber(ConnectionPhase::Established);
        let sub = subscriber
            .subscribe_namespace(namespace(), KeyValuePairs::default())
            .unwrap();

        assert_eq!(subscriber.namespace_subscribes.lock().unwrap().len(), 1);
        drop(sub);
    }

    #[test]
    fn recv_publish_namespace_rejects_our_own_request_id_parity() {
        // We initiated the connection (next_requestid starts at 0, even), so an incoming
        // PUBLISH_NAMESPACE with an even id has the wrong parity: that's our pool, not the peer's.
        let mut subscriber = new_subscriber(ConnectionPhase::Established);

        let msg = message::PublishNamespace {
            id: 0,
            track_namespace: namespace(),
            params: KeyValuePairs::default(),
        };
        let err = subscriber.recv_publish_namespace(&msg).unwrap_err();
        assert!(matches!(err, SessionError::WrongParity(0)));
    }

    #[test]
    fn recv_publish_namespace_accepts_peers_parity() {
        let mut subscriber = new_subscriber(ConnectionPhase::Established);

        let msg = message::PublishNamespace {
            id: 1,
            track_namespace: namespace(),
            params: KeyValuePairs::default(),
        };
        assert!(subscriber.recv_publish_namespace(&msg).is_ok());
    }
}
