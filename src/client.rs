//! The client-side facade: dials a server instance and holds the resulting connection.

use crate::{
    connection_handle::ConnectionHandle,
    misc::lock,
    name::EndpointName,
    os::windows::{Connection, Connector, Event, PipeOps},
    Error,
};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

/// Matches the default per-instance timeout `CreateNamedPipeW` is given server-side.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Dials a named-pipe server and holds the single resulting connection.
///
/// `name` is this client's own label, not the server it will connect to — it prefixes the
/// connection's name the way the server prefixes its own accepted connections. Construct with
/// [`new`](Self::new), then call [`connect`](Self::connect) with the server's endpoint name to
/// dial. Dropping a `Client` stops it, equivalent to calling [`stop`](Self::stop).
pub struct Client {
    name: Arc<str>,
    timeout: Duration,
    connection: Arc<Mutex<Option<Arc<Connection>>>>,
    write_event: Arc<Event>,
    close_event: Arc<Event>,
    connector: Mutex<Option<Connector>>,
}

impl Client {
    /// Labels this client `name`, with the default connect timeout. Does not dial yet.
    pub fn new(name: impl Into<String>) -> Result<Self, Error> {
        Self::with_timeout(name, DEFAULT_CONNECT_TIMEOUT)
    }

    /// As [`new`](Self::new), but [`connect`](Self::connect) dials with `timeout` instead of the
    /// default.
    pub fn with_timeout(name: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        let name: String = name.into();
        if name.is_empty() || name.contains('\0') {
            return Err(Error::InvalidName);
        }
        Ok(Self {
            name: Arc::from(name),
            timeout,
            connection: Arc::new(Mutex::new(None)),
            write_event: Arc::new(Event::new_auto_reset().map_err(Error::IoSubmit)?),
            close_event: Arc::new(Event::new_manual_reset(false).map_err(Error::IoSubmit)?),
            connector: Mutex::new(None),
        })
    }

    /// Dials `server_name` on a dedicated background thread. A second call while already
    /// connected or connecting is a no-op.
    ///
    /// `on_message` and `on_close` fire from the connection's own I/O thread. `on_exception`
    /// fires if the dial itself fails (e.g. the server never stopped being busy, or the pipe
    /// mode handshake errored) and the client never connects.
    pub fn connect(
        &self,
        server_name: impl AsRef<str>,
        on_message: impl Fn(&ConnectionHandle, &[u8]) + Send + Sync + 'static,
        on_close: impl Fn(&ConnectionHandle) + Send + Sync + 'static,
        on_exception: impl Fn(&Error) + Send + Sync + 'static,
    ) -> Result<(), Error> {
        let mut slot = lock(&self.connector);
        if slot.is_some() {
            return Ok(());
        }

        let endpoint = EndpointName::new(server_name)?;
        let label = Arc::clone(&self.name);
        let on_message = Arc::new(on_message);
        let on_close = Arc::new(on_close);

        let connect_slot = Arc::clone(&self.connection);
        let connect_write_event = Arc::clone(&self.write_event);
        let connect_msg_cb = Arc::clone(&on_message);
        let connect_close_cb = Arc::clone(&on_close);
        let on_connect = move |pipe: PipeOps| {
            let close_slot = Arc::clone(&connect_slot);
            let msg_cb = Arc::clone(&connect_msg_cb);
            let close_cb = Arc::clone(&connect_close_cb);
            let store_slot = Arc::clone(&connect_slot);

            let conn_name: Arc<str> = Arc::from(format!("{label}#{}", pipe.identity()));
            let conn = Connection::new(
                conn_name,
                pipe,
                Arc::clone(&connect_write_event),
                Box::new(move |conn, data| {
                    msg_cb(&ConnectionHandle::from_internal(Arc::clone(conn)), data);
                }),
                Box::new(move |conn| {
                    *lock(&close_slot) = None;
                    close_cb(&ConnectionHandle::from_internal(Arc::clone(conn)));
                }),
            );
            if let Ok(conn) = conn {
                *lock(&store_slot) = Some(conn);
            }
        };

        let wakeup_slot = Arc::clone(&self.connection);
        let on_write_wakeup = move || {
            let conn = lock(&wakeup_slot).clone();
            if let Some(conn) = conn {
                conn.service_pending_write();
            }
        };

        let connector = Connector::spawn(
            endpoint,
            self.timeout,
            Arc::clone(&self.write_event),
            Arc::clone(&self.close_event),
            on_connect,
            on_write_wakeup,
            on_exception,
        )
        .map_err(Error::IoSubmit)?;
        *slot = Some(connector);
        Ok(())
    }

    /// The current connection, if the dial has completed and it hasn't since closed.
    pub fn connection(&self) -> Option<ConnectionHandle> {
        lock(&self.connection).clone().map(ConnectionHandle::from_internal)
    }

    /// Closes the connection (if any, so its pipe handle is closed by the time this returns)
    /// and joins the connector thread. Idempotent.
    pub fn stop(&self) {
        if let Some(conn) = lock(&self.connection).take() {
            conn.close();
        }
        if let Some(mut connector) = lock(&self.connector).take() {
            connector.stop();
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop();
    }
}
