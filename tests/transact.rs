#[path = "util/mod.rs"]
#[macro_use]
mod util;

use pipeline_ipc::{Client, Error, Server};
use std::time::Duration;
use util::{poll_until, test_wrapper, NameGen, TestResult};

/// `transact_message` blocks until the peer's `on_message` callback posts a reply, then returns
/// it to the caller.
#[test]
fn transact_message_round_trip() -> TestResult {
    test_wrapper(|| {
        let name = NameGen::new(make_id!()).next().unwrap();

        let server = Server::new(&name)?;
        server.listen(
            |conn, data| {
                let mut reply = b"echo: ".to_vec();
                reply.extend_from_slice(data);
                let _ = conn.post(&reply);
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

        // transact_message must run off the connection's own I/O thread; a plain test-thread
        // call satisfies that.
        let reply = conn.transact_message(b"ping")?;
        ensure_eq!(reply, b"echo: ping".to_vec());
        Ok(())
    })
}

/// If the peer never replies, `transact_message` gives up with `Error::TransactTimeout` rather
/// than blocking forever.
#[test]
fn transact_message_times_out_without_a_reply() -> TestResult {
    test_wrapper(|| {
        let name = NameGen::new(make_id!()).next().unwrap();

        let server = Server::new(&name)?;
        // Never posts anything back — the transacting client should time out.
        server.listen(|_conn, _data| {}, |_conn| {}, |e| eprintln!("server exception: {e}"))?;

        let client = Client::new("client")?;
        client.connect(&name, |_conn, _data| {}, |_conn| {}, |e| eprintln!("client exception: {e}"))?;

        let conn = poll_until(Duration::from_secs(5), || client.connection())
            .ok_or_else(|| color_eyre::eyre::eyre!("client never connected"))?;

        match conn.transact_message(b"hello?") {
            Err(Error::TransactTimeout) => Ok(()),
            Err(e) => Err(color_eyre::eyre::eyre!("expected TransactTimeout, got {e}")),
            Ok(reply) => {
                Err(color_eyre::eyre::eyre!("expected a timeout, got a reply: {reply:?}"))
            }
        }
    })
}

/// A message larger than the fixed pipe buffer is rejected synchronously, before any I/O is
/// attempted.
#[test]
fn oversized_message_is_rejected() -> TestResult {
    test_wrapper(|| {
        let name = NameGen::new(make_id!()).next().unwrap();

        let server = Server::new(&name)?;
        server.listen(|_conn, _data| {}, |_conn| {}, |e| eprintln!("server exception: {e}"))?;

        let client = Client::new("client")?;
        client.connect(&name, |_conn, _data| {}, |_conn| {}, |e| eprintln!("client exception: {e}"))?;

        let conn = poll_until(Duration::from_secs(5), || client.connection())
            .ok_or_else(|| color_eyre::eyre::eyre!("client never connected"))?;

        let oversized = vec![0u8; 8192];
        match conn.post(&oversized) {
            Err(Error::MessageTooLarge { len, max }) => {
                ensure_eq!(len, 8192);
                ensure_eq!(max, 4096);
                Ok(())
            }
            other => Err(color_eyre::eyre::eyre!("expected MessageTooLarge, got {other:?}")),
        }
    })
}
