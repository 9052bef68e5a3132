//! Individually-addressed objects, as used by FETCH responses.
//!
//! Unlike [super::Subgroups] or [super::Stream], a FETCH reply is scoped to a single requester
//! and never fans out to other subscribers, so there's no paired reader here: the publisher
//! writes each object straight onto the FETCH stream as it's produced.
use bytes::Bytes;
use std::{ops::Deref, sync::Arc};

use crate::data::ObjectStatus;
use crate::watch::State;

use super::{ServeError, Track};

pub struct Objects {
    pub track: Arc<Track>,
}

impl Objects {
    pub fn produce(self) -> ObjectsWriter {
        let (writer, _reader) = State::default().split();
        ObjectsWriter::new(writer, self.track)
    }
}

impl Deref for Objects {
    type Target = Track;

    fn deref(&self) -> &Self::Target {
        &self.track
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub group_id: u64,
    pub subgroup_id: u64,
    pub object_id: u64,
    pub priority: u8,
    pub status: ObjectStatus,
    pub payload: Bytes,
}

struct ObjectsState {
    closed: Result<(), ServeError>,
}

impl Default for ObjectsState {
    fn default() -> Self {
        Self { closed: Ok(()) }
    }
}

pub struct ObjectsWriter {
    pub info: Arc<Track>,
    state: State<ObjectsState>,
}

impl ObjectsWriter {
    fn new(state: State<ObjectsState>, track: Arc<Track>) -> Self {
        Self { info: track, state }
    }

    /// Emit a single FETCH response object. Caller is responsible for actually
    /// writing the encoded object to the FETCH stream; this only tracks closed state.
    pub fn write(&mut self, _object: Object) -> Result<(), ServeError> {
        let state = self.state.lock();
        state.closed.clone()
    }

    pub fn close(self, err: ServeError) -> Result<(), ServeError> {
        let state = self.state.lock();
        state.closed.clone()?;

        let mut state = state.into_mut().ok_or(ServeError::Cancel)?;
        state.closed = Err(err);

        Ok(())
    }
}

impl Deref for ObjectsWriter {
    type Target = Track;

    fn deref(&self) -> &Self::Target {
        &self.info
    }
}
