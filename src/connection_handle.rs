//! The public handle to one accepted or dialed connection.

use crate::{
    os::windows::{Connection, ConnectionState as InternalState},
    Error,
};
use std::sync::Arc;

/// A live connection to a peer, handed to the `on_message`/`on_close` callbacks passed to
/// [`Server::listen`](crate::Server::listen) or [`Client::connect`](crate::Client::connect), and
/// returned by [`Client::connection`](crate::Client::connection).
///
/// Cloning a handle is cheap and every clone refers to the same underlying connection.
#[derive(Clone)]
pub struct ConnectionHandle(Arc<Connection>);

impl ConnectionHandle {
    pub(crate) fn from_internal(conn: Arc<Connection>) -> Self {
        Self(conn)
    }

    /// This connection's endpoint-local identifier.
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Where this connection currently sits in its read/write cycle.
    pub fn state(&self) -> ConnectionState {
        self.0.state().into()
    }

    /// Queues `msg` for delivery and returns without waiting for it to be sent.
    pub fn post(&self, msg: &[u8]) -> Result<(), Error> {
        self.0.post(msg)
    }

    /// Sends `msg` and blocks for the reply. Must not be called from within an `on_message` or
    /// `on_close` callback for this same connection, since those run on the connection's own I/O
    /// thread.
    pub fn transact_message(&self, msg: &[u8]) -> Result<Vec<u8>, Error> {
        self.0.transact_message(msg)
    }

    /// Tears the connection down. Idempotent.
    pub fn close(&self) {
        self.0.close();
    }
}

/// Where a [`ConnectionHandle`] currently sits in its read/write cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    /// The connection was just established; its first read has not armed yet.
    Unknown,
    /// A write is queued or in flight.
    SendPending,
    /// Idle, with a read outstanding.
    Connected,
}

impl From<InternalState> for ConnectionState {
    fn from(s: InternalState) -> Self {
        match s {
            InternalState::Unknown => Self::Unknown,
            InternalState::SendPending => Self::SendPending,
            InternalState::Connected => Self::Connected,
        }
    }
}
