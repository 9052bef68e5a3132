//! The underlying network protocol for Media over QUIC (MoQT).
//!
//! This is an implementation of [draft-ietf-moq-transport-14](https://www.ietf.org/archive/id/draft-ietf-moq-transport-14.html).
//!
//! MoQT is a pub/sub protocol that runs over QUIC (or WebTransport).
//! A publisher announces namespaces and tracks, a subscriber asks for the
//! tracks/namespaces it cares about, and the publisher pushes objects as
//! they become available.
//!
//! The [coding] module implements the low level wire format (VarInts,
//! length-prefixed strings, key/value parameters). The [message] module
//! builds control messages on top of that, and [setup] implements the
//! handshake that negotiates a version and parameters. [data] implements
//! the framing used on QUIC streams/datagrams carrying objects. [serve]
//! is the in-memory pub/sub plumbing that decouples the session from
//! whatever is actually producing/consuming media. [session] ties all of
//! the above together into a running MoQT session, and [mlog] emits
//! qlog-compatible structured events for debugging.

pub mod coding;
pub mod data;
pub mod message;
pub mod mlog;
pub mod serve;
pub mod session;
pub mod setup;
pub mod watch;

pub use session::{Session, SessionError};
