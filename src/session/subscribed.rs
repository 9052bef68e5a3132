use std::ops;

use futures::stream::FuturesUnordered;
use futures::StreamExt;

use crate::coding::{Encode, KeyValuePairs};
use crate::serve::{ServeError, TrackReaderMode};
use crate::watch::State;
use crate::{data, message, serve};

use super::{Publisher, SessionError, SubscribeInfo, Writer};

#[derive(Debug)]
struct SubscribedState {
	max_group_id: Option<(u64, u64)>,
	subscriber_priority: u8,
	forward: bool,
	closed: Result<(), ServeError>,
}

impl SubscribedState {
	fn update_max_group_id(&mut self, group_id: u64, object_id: u64) -> Result<(), ServeError> {
		if let Some((max_group, max_object)) = self.max_group_id {
			if group_id >= max_group && object_id >= max_object {
				self.max_group_id = Some((group_id, object_id));
			}
		}

		Ok(())
	}
}

impl Default for SubscribedState {
	fn default() -> Self {
		Self {
			max_group_id: None,
			subscriber_priority: 127,
			forward: true,
			closed: Ok(()),
		}
	}
}

pub struct Subscribed {
	publisher: Publisher,
	state: State<SubscribedState>,
	msg: message::Subscribe,
	track_alias: u64,
	ok: bool,

	pub info: SubscribeInfo,
}

impl Subscribed {
	pub(super) fn new(publisher: Publisher, msg: message::Subscribe, track_alias: u64) -> (Self, SubscribedRecv) {
		let (send, recv) = State::default().split();
		let info = SubscribeInfo {
			namespace: msg.track_namespace.clone(),
			name: msg.track_name.clone(),
		};

		if let Some(mut state) = send.lock_mut() {
			state.subscriber_priority = msg.subscriber_priority;
			state.forward = msg.forward;
		}

		let send = Self {
			publisher,
			state: send,
			msg,
			track_alias,
			info,
			ok: false,
		};

		// Prevents updates after being closed
		let recv = SubscribedRecv { state: recv };

		(send, recv)
	}

	pub async fn serve(mut self, track: serve::TrackReader) -> Result<(), SessionError> {
		let res = self.serve_inner(track).await;
		if let Err(err) = &res {
			self.close(err.clone().into())?;
		}

		res
	}

	async fn serve_inner(&mut self, track: serve::TrackReader) -> Result<(), SessionError> {
		let latest = track.latest();
		self.state.lock_mut().ok_or(ServeError::Cancel)?.max_group_id = latest;

		self.publisher.send_message(message::SubscribeOk {
			id: self.msg.id,
			track_alias: self.track_alias,
			expires: 0,
			group_order: message::GroupOrder::Descending, // TODO: resolve correct value from publisher / subscriber prefs
			content_exists: latest.is_some(),
			largest_location: latest.map(|(group, object)| crate::coding::Location::new(group, object)),
			params: Default::default(),
		});

		self.ok = true; // So we send PUBLISH_DONE on drop

		match track.mode().await? {
			// TODO cancel track/datagrams on closed
			TrackReaderMode::Subgroups(subgroups) => self.serve_subgroups(subgroups).await,
			TrackReaderMode::Datagrams(datagrams) => self.serve_datagrams(datagrams).await,
		}
	}

	pub fn close(self, err: ServeError) -> Result<(), ServeError> {
		let state = self.state.lock();
		state.closed.clone()?;

		let mut state = state.into_mut().ok_or(ServeError::Done)?;
		state.closed = Err(err);

		Ok(())
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

impl ops::Deref for Subscribed {
	type Target = SubscribeInfo;

	fn deref(&self) -> &Self::Target {
		&self.info
	}
}

impl Drop for Subscribed {
	fn drop(&mut self) {
		let state = self.state.lock();
		let err = state.closed.as_ref().err().cloned().unwrap_or(ServeError::Done);
		let max_group_id = state.max_group_id;
		drop(state); // Important to avoid a deadlock

		if self.ok {
			self.publisher.send_message(message::PublishDone {
				id: self.msg.id,
				status_code: err.code(),
				stream_count: max_group_id.map(|(group, _)| group + 1).unwrap_or(0),
				reason: crate::coding::ReasonPhrase(err.to_string()),
			});
		} else {
			self.publisher.send_message(message::SubscribeError {
				id: self.msg.id,
				error_code: err.code(),
				reason_phrase: crate::coding::ReasonPhrase(err.to_string()),
			});
		};
	}
}

impl Subscribed {
	async fn serve_subgroups(&mut self, mut subgroups: serve::SubgroupsReader) -> Result<(), SessionError> {
		let mut tasks = FuturesUnordered::new();
		let mut done: Option<Result<(), ServeError>> = None;

		loop {
			tokio::select! {
				res = subgroups.next(), if done.is_none() => match res {
					Ok(Some(subgroup)) => {
						let header = data::SubgroupHeader {
							track_alias: self.track_alias,
							group_id: subgroup.group_id,
							subgroup_id: subgroup.subgroup_id,
							publisher_priority: subgroup.priority,
						};

						let publisher = self.publisher.clone();
						let state = self.state.clone();
						let info = subgroup.info.clone();

						tasks.push(async move {
							if let Err(err) = Self::serve_subgroup(header, subgroup, publisher, state).await {
								log::warn!("failed to serve group: {:?}, error: {}", info, err);
							}
						});
					},
					Ok(None) => done = Some(Ok(())),
					Err(err) => done = Some(Err(err)),
				},
				res = self.closed(), if done.is_none() => done = Some(res),
				_ = tasks.next(), if !tasks.is_empty() => {},
				else => return Ok(done.unwrap()?),
			}
		}
	}

	async fn serve_subgroup(
		header: data::SubgroupHeader,
		mut subgroup: serve::SubgroupReader,
		mut publisher: Publisher,
		state: State<SubscribedState>,
	) -> Result<(), SessionError> {
		let mut stream = publisher.open_uni().await?;

		// TODO figure out u32 vs u64 priority
		stream.set_priority(subgroup.priority as i32);

		let mut writer = Writer::new(stream);

		let group_id = header.group_id;
		let stream_header = data::StreamHeader {
			header_type: data::StreamHeaderType::Subgroup,
			subgroup_header: Some(header),
			fetch_header: None,
		};
		writer.encode(&stream_header).await?;

		log::trace!("sent group: {:?}", stream_header);

		while let Some(mut object) = subgroup.next().await? {
			let payload = object.read_all().await?;

			let wire_object = data::SubgroupObject {
				object_id: object.object_id,
				extension_headers: KeyValuePairs::new(),
				status: object.status,
				payload,
			};

			writer.encode(&wire_object).await?;

			state
				.lock_mut()
				.ok_or(ServeError::Done)?
				.update_max_group_id(group_id, object.object_id)?;

			log::trace!("sent group object: {:?}", wire_object);
		}

		Ok(())
	}

	async fn serve_datagrams(&mut self, mut datagrams: serve::DatagramsReader) -> Result<(), SessionError> {
		while let Some(datagram) = datagrams.read().await? {
			let (datagram_type, status, payload) = match datagram.status {
				data::ObjectStatus::NormalObject => {
					(data::DatagramType::NoEndOfGroupNoExtensions, None, Some(datagram.payload.clone()))
				}
				status => (data::DatagramType::StatusNoExtensions, Some(status), None),
			};

			let wire_datagram = data::Datagram {
				datagram_type,
				track_alias: self.track_alias,
				group_id: datagram.group_id,
				object_id: datagram.object_id,
				publisher_priority: datagram.priority,
				extension_headers: None,
				status,
				payload,
			};

			let mut buffer = bytes::BytesMut::with_capacity(datagram.payload.len() + 32);
			wire_datagram.encode(&mut buffer)?;

			self.publisher.send_datagram(buffer.into()).await?;
			log::trace!("sent datagram: {:?}", wire_datagram);

			self.state
				.lock_mut()
				.ok_or(ServeError::Done)?
				.update_max_group_id(datagram.group_id, datagram.object_id)?;
		}

		Ok(())
	}
}

pub(super) struct SubscribedRecv {
	state: State<SubscribedState>,
}

impl SubscribedRecv {
	pub fn recv_unsubscribe(&mut self) -> Result<(), ServeError> {
		let state = self.state.lock();
		state.closed.clone()?;

		if let Some(mut state) = state.into_mut() {
			state.closed = Err(ServeError::Cancel);
		}

		Ok(())
	}

	/// Apply a SUBSCRIBE_UPDATE: narrows priority/forwarding for the remainder of the subscription.
	/// The start/end range in the update only restricts future delivery and is not separately
	/// tracked here since objects are forwarded as they're produced, not replayed from a cache.
	pub fn recv_update(&mut self, msg: &message::SubscribeUpdate) -> Result<(), ServeError> {
		let state = self.state.lock();
		state.closed.clone()?;

		if let Some(mut state) = state.into_mut() {
			state.subscriber_priority = msg.subscriber_priority;
			state.forward = msg.forward;
		}

		Ok(())
	}
}
