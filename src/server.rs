//! The server-side facade: accepts any number of concurrent connections on one endpoint name.

use crate::{
    connection_handle::ConnectionHandle,
    misc::lock,
    name::EndpointName,
    os::windows::{Acceptor, Connection, Event, PipeOps},
    Error,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// Listens on a named-pipe endpoint and accepts any number of concurrent client connections.
///
/// Construct with [`new`](Self::new), then call [`listen`](Self::listen) once to start accepting.
/// Dropping a `Server` stops it, equivalent to calling [`stop`](Self::stop).
pub struct Server {
    name: EndpointName,
    connections: Arc<Mutex<HashMap<Arc<str>, Arc<Connection>>>>,
    write_event: Arc<Event>,
    close_event: Arc<Event>,
    acceptor: Mutex<Option<Acceptor>>,
}

impl Server {
    /// Prepares a server for endpoint `name`. Does not bind or listen yet.
    pub fn new(name: impl AsRef<str>) -> Result<Self, Error> {
        Ok(Self {
            name: EndpointName::new(name)?,
            connections: Arc::new(Mutex::new(HashMap::new())),
            write_event: Arc::new(Event::new_auto_reset().map_err(Error::IoSubmit)?),
            close_event: Arc::new(Event::new_manual_reset(false).map_err(Error::IoSubmit)?),
            acceptor: Mutex::new(None),
        })
    }

    /// Starts accepting connections on a dedicated background thread. A second call while the
    /// server is already listening is a no-op.
    ///
    /// `on_message` and `on_close` fire once per connection, from that connection's own I/O
    /// thread. `on_exception` fires if the accept loop itself fails (e.g. the pipe name could
    /// not be created) and the server stops listening.
    pub fn listen(
        &self,
        on_message: impl Fn(&ConnectionHandle, &[u8]) + Send + Sync + 'static,
        on_close: impl Fn(&ConnectionHandle) + Send + Sync + 'static,
        on_exception: impl Fn(&Error) + Send + Sync + 'static,
    ) -> Result<(), Error> {
        let mut slot = lock(&self.acceptor);
        if slot.is_some() {
            return Ok(());
        }

        let on_message = Arc::new(on_message);
        let on_close = Arc::new(on_close);

        let accept_connections = Arc::clone(&self.connections);
        let accept_write_event = Arc::clone(&self.write_event);
        let accept_on_message = Arc::clone(&on_message);
        let accept_on_close = Arc::clone(&on_close);
        let endpoint_label = Arc::<str>::from(self.name.as_str());
        let on_accept = move |pipe: PipeOps| {
            let conn_name: Arc<str> = Arc::from(format!("{endpoint_label}#{}", pipe.identity()));
            let map_key = Arc::clone(&conn_name);
            let close_key = Arc::clone(&conn_name);
            let close_connections = Arc::clone(&accept_connections);
            let msg_cb = Arc::clone(&accept_on_message);
            let close_cb = Arc::clone(&accept_on_close);
            let insert_connections = Arc::clone(&accept_connections);

            let conn = Connection::new(
                conn_name,
                pipe,
                Arc::clone(&accept_write_event),
                Box::new(move |conn, data| {
                    msg_cb(&ConnectionHandle::from_internal(Arc::clone(conn)), data);
                }),
                Box::new(move |conn| {
                    lock(&close_connections).remove(&close_key);
                    close_cb(&ConnectionHandle::from_internal(Arc::clone(conn)));
                }),
            );
            if let Ok(conn) = conn {
                lock(&insert_connections).insert(map_key, conn);
            }
        };

        let wakeup_connections = Arc::clone(&self.connections);
        let on_write_wakeup = move || {
            let snapshot: Vec<Arc<Connection>> = lock(&wakeup_connections).values().cloned().collect();
            for conn in snapshot {
                conn.service_pending_write();
            }
        };

        let acceptor = Acceptor::spawn(
            self.name.clone(),
            Arc::clone(&self.write_event),
            Arc::clone(&self.close_event),
            on_accept,
            on_write_wakeup,
            on_exception,
        )
        .map_err(Error::IoSubmit)?;
        *slot = Some(acceptor);
        Ok(())
    }

    /// Stops accepting new connections, closes every connection currently tracked (so every
    /// owned pipe handle is closed by the time this returns), and joins the accept thread.
    /// Idempotent.
    pub fn stop(&self) {
        let snapshot: Vec<Arc<Connection>> = lock(&self.connections).values().cloned().collect();
        for conn in snapshot {
            conn.close();
        }
        if let Some(mut acceptor) = lock(&self.acceptor).take() {
            acceptor.stop();
        }
    }

    /// Posts `msg` to every connection currently tracked by this server. Returns the first error
    /// encountered, if any, after attempting delivery to every connection.
    pub fn broadcast(&self, msg: &[u8]) -> Result<(), Error> {
        let snapshot: Vec<Arc<Connection>> = lock(&self.connections).values().cloned().collect();
        let mut first_err = None;
        for conn in snapshot {
            if let Err(e) = conn.post(msg) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Force-disconnects the connection named `name`, if one is currently tracked. Returns
    /// whether a matching connection was found.
    pub fn close_connection(&self, name: &str) -> bool {
        let conn = lock(&self.connections).get(name).cloned();
        match conn {
            Some(conn) => {
                conn.close();
                true
            }
            None => false,
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}
