use std::ops;

use futures::Stream;
use futures::StreamExt;

use crate::coding::{Location, ReasonPhrase, TrackNamespace};
use crate::data;
use crate::message::{self, GroupOrder};
use crate::serve::ServeError;
use crate::watch::State;

use super::{Publisher, SessionError, Writer};

#[derive(Debug, Clone)]
pub struct FetchedInfo {
    pub namespace: TrackNamespace,
    pub name: String,
    pub start_location: Location,
    pub end_location: Location,
}

struct FetchedState {
    closed: Result<(), ServeError>,
}

impl Default for FetchedState {
    fn default() -> Self {
        Self { closed: Ok(()) }
    }
}

/// An incoming FETCH request, held by the application acting as publisher.
///
/// The application answers it by calling [Fetched::serve] with a stream of already-published
/// [data::FetchObject]s in `(group_id, object_id)` order; there's no serve-side cache here, so
/// it's up to the caller to reproduce the requested range from wherever it stores history.
pub struct Fetched {
    publisher: Publisher,
    state: State<FetchedState>,
    msg: message::Fetch,
    ok: bool,

    pub info: FetchedInfo,
}

impl Fetched {
    pub(super) fn new(publisher: Publisher, msg: message::Fetch) -> (Self, FetchedRecv) {
        let standalone = msg
            .standalone_fetch
            .clone()
            .expect("only standalone fetches are routed through Fetched");

        let info = FetchedInfo {
            namespace: standalone.track_namespace,
            name: standalone.track_name,
            start_location: standalone.start_location,
            end_location: standalone.end_location,
        };

        let (send, recv) = State::default().split();

        let send = Self {
            publisher,
            state: send,
            msg,
            ok: false,
            info,
        };

        let recv = FetchedRecv { state: recv };

        (send, recv)
    }

    /// Accept the fetch, sending FETCH_OK, then stream objects out on a dedicated data stream.
    pub async fn serve(
        mut self,
        group_order: GroupOrder,
        end_of_track: bool,
        mut objects: impl Stream<Item = data::FetchObject> + Unpin,
    ) -> Result<(), SessionError> {
        self.publisher.send_message(message::FetchOk {
            id: self.msg.id,
            group_order,
            end_of_track,
            end_location: self.info.end_location,
            params: Default::default(),
        });
        self.ok = true;

        let mut stream = self.publisher.open_uni().await?;
        stream.set_priority(self.msg.subscriber_priority as i32);
        let mut writer = Writer::new(stream);

        let header = data::StreamHeader {
            header_type: data::StreamHeaderType::Fetch,
            subgroup_header: None,
            fetch_header: Some(data::FetchHeader { request_id: self.msg.id }),
        };
        writer.encode(&header).await?;

        while let Some(object) = objects.next().await {
            if self.state.lock().closed.is_err() {
                break;
            }
            writer.encode(&object).await?;
        }

        Ok(())
    }

    pub fn close(mut self, err: ServeError) -> Result<(), ServeError> {
        self.ok = false;
        let state = self.state.lock();
        state.closed.clone()?;

        let mut state = state.into_mut().ok_or(ServeError::Done)?;
        state.closed = Err(err);

        Ok(())
    }
}

impl ops::Deref for Fetched {
    type Target = FetchedInfo;

    fn deref(&self) -> &Self::Target {
        &self.info
    }
}

impl Drop for Fetched {
    fn drop(&mut self) {
        self.publisher.drop_fetch(self.msg.id);

        if !self.ok {
            let state = self.state.lock();
            let err = state.closed.as_ref().err().cloned().unwrap_or(ServeError::Done);
            drop(state);

            self.publisher.send_message(message::FetchError {
                id: self.msg.id,
                error_code: err.code(),
                reason_phrase: ReasonPhrase(err.to_string()),
            });
        }
    }
}

pub(super) struct FetchedRecv {
    state: State<FetchedState>,
}

impl FetchedRecv {
    pub fn recv_fetch_cancel(&mut self) -> Result<(), ServeError> {
        let state = self.state.lock();
        state.closed.clone()?;

        if let Some(mut state) = state.into_mut() {
            state.closed = Err(ServeError::Cancel);
        }

        Ok(())
    }
}
