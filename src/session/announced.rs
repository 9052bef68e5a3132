use std::ops;

use crate::coding::{TrackNamespace, ReasonPhrase};
use crate::watch::State;
use crate::{message, serve::ServeError};

use super::{AnnounceInfo, Subscriber};

struct AnnouncedState {
    closed: Result<(), ServeError>,
}

impl Default for AnnouncedState {
    fn default() -> Self {
        Self { closed: Ok(()) }
    }
}

pub struct Announced {
    session: Subscriber,
    state: State<AnnouncedState>,

    pub info: AnnounceInfo,

    ok: bool,
    error: Option<ServeError>,
}

impl Announced {
    pub(super) fn new(session: Subscriber, request_id: u64, namespace: TrackNamespace) -> (Announced, AnnouncedRecv) {
        let info = AnnounceInfo { request_id, namespace };

        let (send, recv) = State::default().split();
        let send = Self {
            session,
            info,
            ok: false,
            error: None,
            state: send,
        };
        let recv = AnnouncedRecv {
            state: recv,
            request_id,
        };

        (send, recv)
    }

    // Send an ANNOUNCE_OK
    pub fn ok(&mut self) -> Result<(), ServeError> {
        if self.ok {
            return Err(ServeError::Duplicate);
        }

        self.session.send_message(message::PublishNamespaceOk {
            id: self.info.request_id,
        });

        self.ok = true;

        Ok(())
    }

    /// Wait until the peer sends PUBLISH_NAMESPACE_DONE or drops the connection.
    /// A non-zero `status_code` on that message surfaces here instead of the
    /// generic cancellation error.
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

    pub fn close(mut self, err: ServeError) -> Result<(), ServeError> {
        self.error = Some(err);
        Ok(())
    }
}

impl ops::Deref for Announced {
    type Target = AnnounceInfo;

    fn deref(&self) -> &AnnounceInfo {
        &self.info
    }
}

impl Drop for Announced {
    fn drop(&mut self) {
        let err = self.error.clone().unwrap_or(ServeError::Done);

        // TODO SLG - ServeError's do not align with draft-13 Announce error codes (section 8.25)
        if self.ok {
            self.session.send_message(message::PublishNamespaceCancel {
                track_namespace: self.namespace.clone(),
                error_code: err.code(),
                reason_phrase: ReasonPhrase(err.to_string()),
            });
        } else {
            self.session.send_message(message::PublishNamespaceError {
                id: self.info.request_id,
                error_code: err.code(),
                reason_phrase: ReasonPhrase(err.to_string()),
            });
        }
    }
}

pub(super) struct AnnouncedRecv {
    state: State<AnnouncedState>,
    pub request_id: u64,
}

impl AnnouncedRecv {
    /// Handle an inbound PUBLISH_NAMESPACE_DONE. A non-zero `status_code` is
    /// recorded so `Announced::closed()` surfaces it instead of a generic
    /// cancellation once this handle (and its shared state) is dropped.
    pub fn recv_unannounce(self, status_code: u64) -> Result<(), ServeError> {
        if status_code != 0 {
            if let Some(mut state) = self.state.lock_mut() {
                state.closed = Err(ServeError::Closed(status_code));
            }
        }

        // Dropping `self` drops the write half, which causes `Announced::closed()` to stop
        // waiting once it has observed `closed` above.
        Ok(())
    }
}
