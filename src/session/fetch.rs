use std::ops;

use crate::coding::{KeyValuePairs, Location, TrackNamespace};
use crate::data;
use crate::message::{self, GroupOrder};
use crate::serve::ServeError;
use crate::watch::{Queue, State};

use super::Subscriber;

#[derive(Debug, Clone)]
pub struct FetchInfo {
    pub namespace: TrackNamespace,
    pub name: String,
    pub start_location: Location,
    pub end_location: Location,
}

struct FetchState {
    ok: bool,
    group_order: GroupOrder,
    end_of_track: bool,
    closed: Result<(), ServeError>,
}

impl Default for FetchState {
    fn default() -> Self {
        Self {
            ok: false,
            group_order: GroupOrder::Publisher,
            end_of_track: false,
            closed: Ok(()),
        }
    }
}

/// A single outstanding FETCH request, held by the application.
///
/// Unlike [super::Subscribe], a fetch delivers a bounded range of already-published objects
/// over one dedicated data stream correlated by request id, not track alias, and is cancelled
/// rather than unsubscribed when dropped before completion.
#[must_use = "fetch_cancel on drop"]
pub struct Fetch {
    state: State<FetchState>,
    subscriber: Subscriber,
    id: u64,
    objects: Queue<data::FetchObject>,

    pub info: FetchInfo,
}

impl Fetch {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        mut subscriber: Subscriber,
        id: u64,
        namespace: TrackNamespace,
        name: String,
        start_location: Location,
        end_location: Location,
        subscriber_priority: u8,
        group_order: GroupOrder,
        params: KeyValuePairs,
    ) -> (Fetch, FetchRecv) {
        subscriber.send_message(message::Fetch {
            id,
            subscriber_priority,
            group_order,
            fetch_type: message::FetchType::Standalone,
            standalone_fetch: Some(message::StandaloneFetch {
                track_namespace: namespace.clone(),
                track_name: name.clone(),
                start_location,
                end_location,
            }),
            joining_fetch: None,
            params,
        });

        let info = FetchInfo {
            namespace,
            name,
            start_location,
            end_location,
        };

        let (state_send, state_recv) = State::default().split();
        let (objects_send, objects_recv) = Queue::default().split();

        let send = Fetch {
            state: state_send,
            subscriber,
            id,
            objects: objects_recv,
            info,
        };

        let recv = FetchRecv {
            state: state_recv,
            objects: objects_send,
        };

        (send, recv)
    }

    /// Wait until FETCH_OK or FETCH_ERROR is received, returning the negotiated group order.
    pub async fn ok(&self) -> Result<GroupOrder, ServeError> {
        loop {
            {
                let state = self.state.lock();
                if state.ok {
                    return Ok(state.group_order);
                }
                state.closed.clone()?;

                match state.modified() {
                    Some(notified) => notified,
                    None => return Err(ServeError::Cancel),
                }
            }
            .await;
        }
    }

    /// Receive the next fetched object, or `None` once the stream is exhausted or closed.
    pub async fn next(&mut self) -> Result<Option<data::FetchObject>, ServeError> {
        if let Some(object) = self.objects.pop().await {
            return Ok(Some(object));
        }

        self.state.lock().closed.clone()?;
        Ok(None)
    }

    pub async fn closed(&self) -> Result<(), ServeError> {
        loop {
            {
                let state = self.state.lock();
                state.closed.clone()?;

                match state.modified() {
                    Some(notify) => notify,
                    None => return Ok(()),
                }
            }
            .await;
        }
    }
}

impl Drop for Fetch {
    fn drop(&mut self) {
        self.subscriber.send_message(message::FetchCancel { id: self.id });
    }
}

impl ops::Deref for Fetch {
    type Target = FetchInfo;

    fn deref(&self) -> &FetchInfo {
        &self.info
    }
}

pub(super) struct FetchRecv {
    state: State<FetchState>,
    objects: Queue<data::FetchObject>,
}

impl FetchRecv {
    pub fn ok(&mut self, group_order: GroupOrder, end_of_track: bool) -> Result<(), ServeError> {
        let state = self.state.lock();
        if state.ok {
            return Err(ServeError::Duplicate);
        }
        drop(state);

        if let Some(mut state) = self.state.lock_mut() {
            state.ok = true;
            state.group_order = group_order;
            state.end_of_track = end_of_track;
        }

        Ok(())
    }

    pub fn error(self, err: ServeError) -> Result<(), ServeError> {
        let state = self.state.lock();
        state.closed.clone()?;

        let mut state = state.into_mut().ok_or(ServeError::Done)?;
        state.closed = Err(err);

        Ok(())
    }

    pub fn push_object(&mut self, object: data::FetchObject) -> Result<(), ServeError> {
        self.objects.push(object).map_err(|_| ServeError::Cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ConnectionPhase, ConnectionState, Subscriber};
    use std::sync::{atomic::AtomicU64, Arc};

    fn new_subscriber() -> Subscriber {
        let outgoing = crate::watch::Queue::default().split().0;
        let next_requestid = Arc::new(AtomicU64::new(0));
        let state = ConnectionState::new(ConnectionPhase::Established);
        Subscriber::new(outgoing, next_requestid, state, None, Queue::default().split().1)
    }

    fn new_fetch() -> (Fetch, FetchRecv) {
        Fetch::new(
            new_subscriber(),
            2,
            TrackNamespace::from_utf8_path("a/b"),
            "track".to_string(),
            Location::new(0, 0),
            Location::new(10, 0),
            0,
            GroupOrder::Ascending,
            KeyValuePairs::default(),
        )
    }

    #[tokio::test]
    async fn ok_carries_the_negotiated_group_order() {
        let (send, mut recv) = new_fetch();
        recv.ok(GroupOrder::Descending, true).unwrap();
        assert_eq!(send.ok().await.unwrap(), GroupOrder::Descending);
    }

    #[tokio::test]
    async fn pushed_objects_are_delivered_in_order() {
        let (mut send, mut recv) = new_fetch();
        recv.ok(GroupOrder::Ascending, false).unwrap();
        send.ok().await.unwrap();

        let object = data::FetchObject {
            group_id: 0,
            subgroup_id: 0,
            object_id: 0,
            publisher_priority: 0,
            extension_headers: Default::default(),
            status: data::ObjectStatus::NormalObject,
            payload: Default::default(),
        };
        recv.push_object(object.clone()).unwrap();

        let received = send.next().await.unwrap().unwrap();
        assert_eq!(received.group_id, object.group_id);
        assert_eq!(received.object_id, object.object_id);
    }

    #[tokio::test]
    async fn error_surfaces_to_next_and_closed() {
        let (mut send, recv) = new_fetch();
        recv.error(ServeError::Cancel).unwrap();
        assert_eq!(send.next().await.unwrap_err(), ServeError::Cancel);
    }

    #[test]
    fn dropping_a_fetch_sends_fetch_cancel() {
        let (send, _recv) = new_fetch();
        drop(send);
    }
}
