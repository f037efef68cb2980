//! End-to-end connection engine coverage over a real loopback socket pair:
//! ident round-trip (Scenario 1), shutdown sentinel (Scenario 2), and a
//! handful of boundary behaviors from §8.

use std::thread;
use std::time::Duration;

use threadnet::connection::socket::{accept, connect, listen};
use threadnet::connection::{AcceptMode, ConnState, ConnectOptions, IpVersion};
use threadnet::error::{Error, TransportError};
use threadnet::messages::{ChatString, Ident};
use threadnet::{codec, messages};

fn loopback_pair() -> (std::sync::Arc<threadnet::Connection>, std::sync::Arc<threadnet::Connection>) {
    let listener = listen(Some("127.0.0.1"), 0, 16, IpVersion::V4Only).unwrap();
    let port = listener.local_addr().port();

    let server_side = thread::spawn(move || {
        accept(&listener, ConnectOptions::default(), AcceptMode::Timeout(Duration::from_secs(5))).unwrap().unwrap()
    });

    let client = connect("127.0.0.1", port, IpVersion::V4Only, ConnectOptions::default()).unwrap();
    let server = server_side.join().unwrap();

    client.start_engine().unwrap();
    server.start_engine().unwrap();
    (client, server)
}

#[test]
fn ident_round_trip() {
    let (client, server) = loopback_pair();

    let request = Ident { id: 0, name: "alice".into(), password: "secret".into() };
    client.enqueue_send(request.encode(messages::TYPE_IDENT_REQUEST)).unwrap();

    let frame = server.wait_receive(Duration::from_millis(10), Duration::from_secs(2)).expect("server should receive ident");
    let mut decoded = codec::decode(&frame).unwrap();
    assert_eq!(decoded.pop_int().unwrap(), messages::TYPE_IDENT_REQUEST);
    let got = Ident::decode(&mut decoded).unwrap();
    assert_eq!(got, request);

    let reply = Ident { id: 42, name: "alice".into(), password: "secret".into() };
    server.enqueue_send(reply.encode(messages::TYPE_IDENT_REPLY_OK)).unwrap();

    let frame = client.wait_receive(Duration::from_millis(10), Duration::from_secs(2)).expect("client should receive reply");
    let mut decoded = codec::decode(&frame).unwrap();
    assert_eq!(decoded.pop_int().unwrap(), messages::TYPE_IDENT_REPLY_OK);
    assert_eq!(Ident::decode(&mut decoded).unwrap(), reply);

    client.wait_close();
    server.wait_close();
}

#[test]
fn shutdown_sentinel_is_observed_by_the_peer() {
    let (client, server) = loopback_pair();

    let chat = ChatString {
        id_from: 1,
        id_to: -1,
        color: 0,
        name: "alice".into(),
        channel: "ALL".into(),
        text: "hello".into(),
    };
    client.enqueue_send(chat.encode()).unwrap();
    let frame = server.wait_receive(Duration::from_millis(10), Duration::from_secs(2)).unwrap();
    let mut decoded = codec::decode(&frame).unwrap();
    assert_eq!(decoded.pop_int().unwrap(), messages::TYPE_CHAT_STRING);
    assert_eq!(ChatString::decode(&mut decoded).unwrap(), chat);

    client.set_state(ConnState::ExitAsked);

    // The server's receiver observes the bare sentinel frame and moves to
    // EXIT_ASKED itself, with no further payload to read.
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while server.state() == ConnState::Run && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(server.state(), ConnState::ExitAsked);

    client.wait_close();
    server.wait_close();
}

#[test]
fn sending_an_empty_payload_is_rejected() {
    let (client, _server) = loopback_pair();
    let err = client.enqueue_send(threadnet::Buffer::empty()).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    client.wait_close();
}

#[test]
fn queue_limit_of_one_rejects_then_accepts_after_drain() {
    let listener = listen(Some("127.0.0.1"), 0, 16, IpVersion::V4Only).unwrap();
    let port = listener.local_addr().port();
    let server_side = thread::spawn(move || {
        accept(&listener, ConnectOptions::default(), AcceptMode::Timeout(Duration::from_secs(5))).unwrap().unwrap()
    });
    let options = ConnectOptions { send_queue_limit: Some(1), ..ConnectOptions::default() };
    let client = connect("127.0.0.1", port, IpVersion::V4Only, options).unwrap();
    let server = server_side.join().unwrap();
    // Pause the client's own sender so the queue actually backs up rather
    // than draining before the second enqueue runs.
    client.set_state(ConnState::Pause);

    client.enqueue_send(threadnet::Buffer::from("a")).unwrap();
    assert!(matches!(client.enqueue_send(threadnet::Buffer::from("b")), Err(Error::QueueFull)));

    client.set_state(ConnState::Run);
    client.start_engine().unwrap();
    server.start_engine().unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while client.queue_depths().0 > 0 && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(client.queue_depths().0, 0);
    client.enqueue_send(threadnet::Buffer::from("c")).unwrap();

    client.wait_close();
    server.wait_close();
}

#[test]
fn close_on_an_already_closed_connection_is_a_no_op() {
    let (client, server) = loopback_pair();
    client.close();
    client.close(); // must not panic or error
    server.wait_close();
}

#[test]
fn peer_closing_after_a_bare_state_word_is_a_short_read() {
    // The server side is a real `Connection` from `accept`; the peer is a
    // raw socket that writes a non-sentinel state word then disappears
    // without the length field the receiver expects next.
    use std::io::Write;
    use std::net::TcpStream;

    let listener = listen(Some("127.0.0.1"), 0, 16, IpVersion::V4Only).unwrap();
    let port = listener.local_addr().port();
    let server_side = thread::spawn(move || {
        accept(&listener, ConnectOptions::default(), AcceptMode::Timeout(Duration::from_secs(5))).unwrap().unwrap()
    });

    let mut raw_client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let conn = server_side.join().unwrap();
    conn.start_engine().unwrap();

    raw_client.write_all(&0u32.to_be_bytes()).unwrap(); // RUN, not the EXIT_ASKED sentinel
    drop(raw_client);

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while conn.state() == ConnState::Run && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(conn.state(), ConnState::Error);
    let _ = TransportError::ShortRead; // documents which classification this drives towards
    conn.wait_close();
}

#[test]
fn start_engine_twice_fails_with_already_started() {
    let (client, server) = loopback_pair();
    assert!(matches!(client.start_engine(), Err(Error::AlreadyStarted)));
    client.wait_close();
    server.wait_close();
}
