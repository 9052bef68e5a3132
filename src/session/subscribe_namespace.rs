use std::ops;

use crate::coding::{KeyValuePairs, TrackNamespace};
use crate::message;
use crate::serve::ServeError;
use crate::watch::State;

use super::Subscriber;

struct SubscribeNamespaceState {
    ok: bool,
    closed: Result<(), ServeError>,
}

impl Default for SubscribeNamespaceState {
    fn default() -> Self {
        Self {
            ok: false,
            closed: Ok(()),
        }
    }
}

/// A registration to be notified about namespaces matching a prefix, held by the application.
#[must_use = "unsubscribe_namespace on drop"]
pub struct SubscribeNamespace {
    state: State<SubscribeNamespaceState>,
    subscriber: Subscriber,
    id: u64,

    pub prefix: TrackNamespace,
}

impl SubscribeNamespace {
    pub(super) fn new(
        mut subscriber: Subscriber,
        id: u64,
        prefix: TrackNamespace,
        params: KeyValuePairs,
    ) -> (Self, SubscribeNamespaceRecv) {
        subscriber.send_message(message::SubscribeNamespace {
            id,
            track_namespace_prefix: prefix.clone(),
            params,
        });

        let (send, recv) = State::default().split();

        let send = Self {
            state: send,
            subscriber,
            id,
            prefix,
        };
        let recv = SubscribeNamespaceRecv { state: recv };

        (send, recv)
    }

    pub async fn ok(&self) -> Result<(), ServeError> {
        loop {
            {
                let state = self.state.lock();
                if state.ok {
                    return Ok(());
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

impl Drop for SubscribeNamespace {
    fn drop(&mut self) {
        self.subscriber
            .send_message(message::UnsubscribeNamespace { id: self.id });
    }
}

impl ops::Deref for SubscribeNamespace {
    type Target = TrackNamespace;

    fn deref(&self) -> &Self::Target {
        &self.prefix
    }
}

pub(super) struct SubscribeNamespaceRecv {
    state: State<SubscribeNamespaceState>,
}

impl SubscribeNamespaceRecv {
    pub fn ok(&mut self) -> Result<(), ServeError> {
        let state = self.state.lock();
        if state.ok {
            return Err(ServeError::Duplicate);
        }
        drop(state);

        if let Some(mut state) = self.state.lock_mut() {
            state.ok = true;
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ConnectionPhase, ConnectionState, Subscriber};
    use crate::watch::Queue;
    use std::sync::{atomic::AtomicU64, Arc};

    fn new_subscriber() -> Subscriber {
        let outgoing = Queue::default().split().0;
        let next_requestid = Arc::new(AtomicU64::new(0));
        let state = ConnectionState::new(ConnectionPhase::Established);
        Subscriber::new(outgoing, next_requestid, state, None, Queue::default().split().1)
    }

    #[tokio::test]
    async fn ok_unblocks_the_waiter() {
        let subscriber = new_subscriber();
        let (send, mut recv) = SubscribeNamespace::new(
            subscriber,
            2,
            TrackNamespace::from_utf8_path("a/b"),
            KeyValuePairs::default(),
        );

        recv.ok().unwrap();
        send.ok().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_ok_is_rejected() {
        let subscriber = new_subscriber();
        let (_send, mut recv) = SubscribeNamespace::new(
            subscriber,
            2,
            TrackNamespace::from_utf8_path("a/b"),
            KeyValuePairs::default(),
        );

        recv.ok().unwrap();
        assert_eq!(recv.ok().unwrap_err(), ServeError::Duplicate);
    }

    #[tokio::test]
    async fn error_surfaces_to_the_waiter() {
        let subscriber = new_subscriber();
        let (send, recv) = SubscribeNamespace::new(
            subscriber,
            2,
            TrackNamespace::from_utf8_path("a/b"),
            KeyValuePairs::default(),
        );

        recv.error(ServeError::Cancel).unwrap();
        assert_eq!(send.ok().await.unwrap_err(), ServeError::Cancel);
    }
}
