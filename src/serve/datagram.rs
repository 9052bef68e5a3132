//! Datagram delivery: each object is sent standalone over an unreliable QUIC datagram,
//! with no ordering or retransmission guarantees.
use bytes::Bytes;
use std::{ops::Deref, sync::Arc};

use crate::data::ObjectStatus;
use crate::watch::State;

use super::{ServeError, Track};

pub struct Datagrams {
    pub track: Arc<Track>,
}

impl Datagrams {
    pub fn produce(self) -> (DatagramsWriter, DatagramsReader) {
        let (writer, reader) = State::default().split();

        let writer = DatagramsWriter::new(writer, self.track.clone());
        let reader = DatagramsReader::new(reader, self.track);

        (writer, reader)
    }
}

impl Deref for Datagrams {
    type Target = Track;

    fn deref(&self) -> &Self::Target {
        &self.track
    }
}

/// A single datagram object: group/object identity plus either a payload or a status.
#[derive(Clone, Debug, PartialEq)]
pub struct Datagram {
    pub group_id: u64,
    pub object_id: u64,
    pub priority: u8,
    pub status: ObjectStatus,
    pub payload: Bytes,
}

struct DatagramsState {
    latest: Option<Datagram>,
    // Only the most recent datagram is kept in `latest`; older ones are still delivered to
    // readers in order via this queue, trimmed as readers catch up.
    queue: Vec<Datagram>,
    epoch: usize,
    closed: Result<(), ServeError>,
}

impl Default for DatagramsState {
    fn default() -> Self {
        Self {
            latest: None,
            queue: Vec::new(),
            epoch: 0,
            closed: Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct DatagramsWriter {
    pub info: Arc<Track>,
    state: State<DatagramsState>,
}

impl DatagramsWriter {
    fn new(state: State<DatagramsState>, track: Arc<Track>) -> Self {
        Self { info: track, state }
    }

    pub fn write(&mut self, datagram: Datagram) -> Result<(), ServeError> {
        let mut state = self.state.lock_mut().ok_or(ServeError::Cancel)?;
        state.latest = Some(datagram.clone());
        state.queue.push(datagram);
        state.epoch += 1;

        Ok(())
    }

    pub fn close(self, err: ServeError) -> Result<(), ServeError> {
        let state = self.state.lock();
        state.closed.clone()?;

        let mut state = state.into_mut().ok_or(ServeError::Cancel)?;
        state.closed = Err(err);

        Ok(())
    }
}

impl Deref for DatagramsWriter {
    type Target = Track;

    fn deref(&self) -> &Self::Target {
        &self.info
    }
}

#[derive(Clone)]
pub struct DatagramsReader {
    pub info: Arc<Track>,
    state: State<DatagramsState>,
    index: usize,
}

impl DatagramsReader {
    fn new(state: State<DatagramsState>, track: Arc<Track>) -> Self {
        let index = state.lock().queue.len();
        Self {
            info: track,
            state,
            index,
        }
    }

    pub async fn read(&mut self) -> Result<Option<Datagram>, ServeError> {
        loop {
            {
                let state = self.state.lock();

                if self.index < state.queue.len() {
                    let datagram = state.queue[self.index].clone();
                    self.index += 1;
                    return Ok(Some(datagram));
                }

                state.closed.clone()?;
                match state.modified() {
                    Some(notify) => notify,
                    None => return Ok(None),
                }
            }
            .await;
        }
    }

    pub fn latest(&self) -> Option<(u64, u64)> {
        let state = self.state.lock();
        state.latest.as_ref().map(|d| (d.group_id, d.object_id))
    }
}

impl Deref for DatagramsReader {
    type Target = Track;

    fn deref(&self) -> &Self::Target {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::TrackNamespace;

    fn track() -> Arc<Track> {
        Arc::new(Track {
            namespace: TrackNamespace::default(),
            name: "test".to_string(),
        })
    }

    #[tokio::test]
    async fn write_then_read() {
        let (mut writer, mut reader) = (Datagrams { track: track() }).produce();

        writer
            .write(Datagram {
                group_id: 0,
                object_id: 0,
                priority: 0,
                status: ObjectStatus::NormalObject,
                payload: Bytes::from_static(b"hello"),
            })
            .unwrap();

        let got = reader.read().await.unwrap().unwrap();
        assert_eq!(got.payload, Bytes::from_static(b"hello"));
        assert_eq!(reader.latest(), Some((0, 0)));
    }

    #[tokio::test]
    async fn close_ends_reader() {
        let (writer, mut reader) = (Datagrams { track: track() }).produce();
        writer.close(ServeError::Done).unwrap();
        assert_eq!(reader.read().await, Err(ServeError::Done));
    }
}
