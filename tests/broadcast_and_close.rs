#[path = "util/mod.rs"]
#[macro_use]
mod util;

use pipeline_ipc::{Client, Server};
use std::{sync::mpsc, time::Duration};
use util::{poll_until, test_wrapper, NameGen, TestResult};

/// A server broadcast reaches every connected client.
#[test]
fn broadcast_reaches_every_client() -> TestResult {
    test_wrapper(|| {
        let name = NameGen::new(make_id!()).next().unwrap();

        let server = Server::new(&name)?;
        let (seen_tx, seen_rx) = mpsc::channel();
        server.listen(
            move |_conn, _data| {
                let _ = seen_tx.send(());
            },
            |_conn| {},
            |e| eprintln!("server exception: {e}"),
        )?;

        const N: usize = 3;
        let mut clients = Vec::with_capacity(N);
        let mut got_rxs = Vec::with_capacity(N);
        for _ in 0..N {
            let client = Client::new("client")?;
            let (got_tx, got_rx) = mpsc::channel();
            client.connect(
                &name,
                move |_conn, data| {
                    let _ = got_tx.send(data.to_vec());
                },
                |_conn| {},
                |e| eprintln!("client exception: {e}"),
            )?;
            let conn = poll_until(Duration::from_secs(5), || client.connection())
                .ok_or_else(|| color_eyre::eyre::eyre!("client never connected"))?;
            conn.post(b"hi")?;
            clients.push(client);
            got_rxs.push(got_rx);
        }

        for _ in 0..N {
            seen_rx
                .recv_timeout(Duration::from_secs(5))
                .map_err(|_| color_eyre::eyre::eyre!("server never saw all clients speak"))?;
        }

        server.broadcast(b"hello everyone")?;
        for rx in got_rxs {
            let got = rx
                .recv_timeout(Duration::from_secs(5))
                .map_err(|_| color_eyre::eyre::eyre!("a client never received the broadcast"))?;
            ensure_eq!(got, b"hello everyone".to_vec());
        }
        Ok(())
    })
}

/// `close_connection` forcibly disconnects a named connection, firing that connection's
/// `on_close` on both ends.
#[test]
fn close_connection_disconnects_by_name() -> TestResult {
    test_wrapper(|| {
        let name = NameGen::new(make_id!()).next().unwrap();

        let server = Server::new(&name)?;
        let (conn_name_tx, conn_name_rx) = mpsc::channel();
        server.listen(
            move |conn, _data| {
                let _ = conn_name_tx.send(conn.name().to_string());
            },
            |_conn| {},
            |e| eprintln!("server exception: {e}"),
        )?;

        let client = Client::new("client")?;
        let (client_closed_tx, client_closed_rx) = mpsc::channel();
        client.connect(
            &name,
            |_conn, _data| {},
            move |_conn| {
                let _ = client_closed_tx.send(());
            },
            |e| eprintln!("client exception: {e}"),
        )?;

        let conn = poll_until(Duration::from_secs(5), || client.connection())
            .ok_or_else(|| color_eyre::eyre::eyre!("client never connected"))?;
        conn.post(b"hi")?;

        let conn_name = conn_name_rx
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| color_eyre::eyre::eyre!("server never observed the connection's name"))?;

        let found = server.close_connection(&conn_name);
        ensure_eq!(found, true);

        client_closed_rx
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| color_eyre::eyre::eyre!("client never observed the forced disconnect"))?;

        ensure_eq!(server.close_connection("definitely-not-a-real-connection-name"), false);
        Ok(())
    })
}
