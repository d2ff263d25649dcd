#[path = "util/mod.rs"]
#[macro_use]
mod util;

use pipeline_ipc::{Client, Server};
use std::{sync::mpsc, time::Duration};
use util::{poll_until, test_wrapper, NameGen, TestResult};

/// A client connects, posts a message, and the server's `on_message` callback observes it.
#[test]
fn client_to_server_post() -> TestResult {
    test_wrapper(|| {
        let name = NameGen::new(make_id!()).next().unwrap();

        let server = Server::new(&name)?;
        let (got_tx, got_rx) = mpsc::channel();
        server.listen(
            move |_conn, data| {
                let _ = got_tx.send(data.to_vec());
            },
            |_conn| {},
            |e| eprintln!("server exception: {e}"),
        )?;

        let client = Client::new("client")?;
        client.connect(
            &name,
            |_conn, _data| {},
            |_conn| {},
            |e| eprintln!("client exception: {e}"),
        )?;

        let conn = poll_until(Duration::from_secs(5), || client.connection())
            .ok_or_else(|| color_eyre::eyre::eyre!("client never connected"))?;
        conn.post(b"hello from client")?;

        let got = got_rx
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| color_eyre::eyre::eyre!("server never received the posted message"))?;
        ensure_eq!(got, b"hello from client".to_vec());
        Ok(())
    })
}

/// A message posted by the server reaches the client's `on_message` callback.
#[test]
fn server_to_client_post() -> TestResult {
    test_wrapper(|| {
        let name = NameGen::new(make_id!()).next().unwrap();

        let server = Server::new(&name)?;
        // `on_message` fires once the client speaks first, which doubles as our "accepted"
        // signal — there's no separate on-accept callback.
        let (server_saw_conn_tx, server_saw_conn_rx) = mpsc::channel();
        server.listen(
            move |_conn, _data| {
                let _ = server_saw_conn_tx.send(());
            },
            |_conn| {},
            |e| eprintln!("server exception: {e}"),
        )?;

        let client = Client::new("client")?;
        let (client_got_tx, client_got_rx) = mpsc::channel();
        client.connect(
            &name,
            move |_conn, data| {
                let _ = client_got_tx.send(data.to_vec());
            },
            |_conn| {},
            |e| eprintln!("client exception: {e}"),
        )?;

        let conn = poll_until(Duration::from_secs(5), || client.connection())
            .ok_or_else(|| color_eyre::eyre::eyre!("client never connected"))?;
        conn.post(b"ping")?;
        server_saw_conn_rx
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| color_eyre::eyre::eyre!("server never observed the client's message"))?;

        server.broadcast(b"hello from server")?;
        let got = client_got_rx
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| color_eyre::eyre::eyre!("client never received a message from the server"))?;
        ensure_eq!(got, b"hello from server".to_vec());
        Ok(())
    })
}
