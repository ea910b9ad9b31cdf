//! Black-box integration tests driving only the public `Connection` façade:
//! a client connection and a server connection pushed through a full
//! request/response exchange by shuttling bytes between them, with no mock
//! I/O layer since the engine itself never touches I/O.

use h1_engine::{Connection, Event, Role};
use http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::HeaderValue;

fn header(name: http::header::HeaderName, value: &str) -> (http::header::HeaderName, HeaderValue) {
    (name, HeaderValue::from_str(value).unwrap())
}

fn send_head_and_body(conn: &mut Connection, events: Vec<Event>) -> Vec<u8> {
    let mut out = Vec::new();
    for event in events {
        if let Some(bytes) = conn.send(event).unwrap() {
            out.extend_from_slice(&bytes);
        }
    }
    out
}

fn feed(conn: &mut Connection, data: &[u8]) -> Vec<Event> {
    conn.receive_data(Some(data)).unwrap()
}

#[test]
fn minimal_get_then_200_reaches_done_on_both_sides() {
    let mut client = Connection::new(Role::Client);
    let mut server = Connection::new(Role::Server);

    let request_bytes = send_head_and_body(
        &mut client,
        vec![
            Event::Request {
                method: "GET".into(),
                target: "/".into(),
                headers: vec![header(HOST, "localhost")],
                http_version: "1.1".into(),
            },
            Event::EndOfMessage { headers: vec![] },
        ],
    );

    let server_events = feed(&mut server, &request_bytes);
    assert!(matches!(server_events[0], Event::Request { .. }));
    assert!(matches!(server_events[1], Event::EndOfMessage { .. }));

    let response_bytes = send_head_and_body(
        &mut server,
        vec![
            Event::Response {
                status_code: 200,
                headers: vec![header(CONTENT_LENGTH, "5")],
                http_version: "1.1".into(),
            },
            Event::Data {
                data: "hello".into(),
            },
            Event::EndOfMessage { headers: vec![] },
        ],
    );

    let client_events = feed(&mut client, &response_bytes);
    assert!(matches!(client_events[0], Event::Response { .. }));
    assert!(matches!(client_events[1], Event::Data { ref data } if &data[..] == b"hello"));
    assert!(matches!(client_events[2], Event::EndOfMessage { .. }));

    assert_eq!(client.our_state(), h1_engine::State::Done);
    assert_eq!(client.their_state(), h1_engine::State::Done);
    assert_eq!(server.our_state(), h1_engine::State::Done);
    assert_eq!(server.their_state(), h1_engine::State::Done);
}

#[test]
fn chunked_response_wire_shape_and_reassembly() {
    let (mut client, mut server) = get_request_answered_by(vec![]);

    let response_bytes = send_head_and_body(
        &mut server,
        vec![
            Event::Response {
                status_code: 200,
                headers: vec![header(TRANSFER_ENCODING, "chunked")],
                http_version: "1.1".into(),
            },
            Event::Data { data: "abc".into() },
            Event::Data { data: "de".into() },
            Event::EndOfMessage { headers: vec![] },
        ],
    );

    let head_end = response_bytes
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .unwrap()
        + 4;
    assert_eq!(
        &response_bytes[head_end..],
        b"3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n"
    );

    let events = feed(&mut client, &response_bytes);
    let mut body = Vec::new();
    let mut saw_end = false;
    for event in events {
        match event {
            Event::Response { .. } => {}
            Event::Data { data } => body.extend_from_slice(&data),
            Event::EndOfMessage { headers } => {
                assert!(headers.is_empty());
                saw_end = true;
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(body, b"abcde");
    assert!(saw_end);
}

#[test]
fn connection_close_response_forces_must_close_and_blocks_reuse() {
    let (mut client, mut server) = get_request_answered_by(vec![]);

    let response_bytes = send_head_and_body(
        &mut server,
        vec![
            Event::Response {
                status_code: 200,
                headers: vec![
                    header(CONNECTION, "close"),
                    header(CONTENT_LENGTH, "0"),
                ],
                http_version: "1.1".into(),
            },
            Event::EndOfMessage { headers: vec![] },
        ],
    );
    feed(&mut client, &response_bytes);

    assert_eq!(client.client_state(), h1_engine::State::MustClose);
    assert_eq!(client.server_state(), h1_engine::State::MustClose);
    assert_eq!(server.client_state(), h1_engine::State::MustClose);
    assert_eq!(server.server_state(), h1_engine::State::MustClose);

    assert!(client.prepare_to_reuse().is_err());
    assert!(server.prepare_to_reuse().is_err());
}

#[test]
fn http10_response_reads_body_until_peer_closes() {
    let mut client = Connection::new(Role::Client);
    let mut server = Connection::new(Role::Server);

    let request_bytes = send_head_and_body(
        &mut client,
        vec![
            Event::Request {
                method: "GET".into(),
                target: "/".into(),
                headers: vec![header(HOST, "localhost")],
                http_version: "1.1".into(),
            },
            Event::EndOfMessage { headers: vec![] },
        ],
    );
    feed(&mut server, &request_bytes);

    // A peer advertising HTTP/1.0 with no framing header at all; built by
    // hand since this engine never generates HTTP/1.0 output itself.
    let wire = b"HTTP/1.0 200 OK\r\n\r\nhello world";
    let mut events = feed(&mut client, wire);
    assert!(matches!(events.remove(0), Event::Response { .. }));
    let mut body = Vec::new();
    for event in events {
        if let Event::Data { data } = event {
            body.extend_from_slice(&data);
        }
    }
    assert_eq!(body, b"hello world");

    // Half-close: the rest of the body is only known to be complete once
    // the peer signals it will send no more.
    let tail = feed(&mut client, b"");
    assert!(matches!(tail.last(), Some(Event::ConnectionClosed)));
    assert!(tail
        .iter()
        .any(|e| matches!(e, Event::EndOfMessage { headers } if headers.is_empty())));
}

#[test]
fn connect_switches_both_sides_and_exposes_trailing_data() {
    let mut client = Connection::new(Role::Client);
    let mut server = Connection::new(Role::Server);

    let request_bytes = send_head_and_body(
        &mut client,
        vec![
            Event::Request {
                method: "CONNECT".into(),
                target: "example.com:443".into(),
                headers: vec![header(HOST, "example.com:443")],
                http_version: "1.1".into(),
            },
            Event::EndOfMessage { headers: vec![] },
        ],
    );
    feed(&mut server, &request_bytes);
    assert_eq!(server.their_state(), h1_engine::State::MightSwitchProtocol);

    let response_bytes = send_head_and_body(
        &mut server,
        vec![Event::Response {
            status_code: 200,
            headers: vec![],
            http_version: "1.1".into(),
        }],
    );
    assert_eq!(server.our_state(), h1_engine::State::SwitchedProtocol);

    let mut client_events = feed(&mut client, &response_bytes);
    assert_eq!(client_events.len(), 1);
    assert!(matches!(client_events.remove(0), Event::Response { .. }));
    assert_eq!(client.their_state(), h1_engine::State::SwitchedProtocol);
    assert_eq!(client.our_state(), h1_engine::State::SwitchedProtocol);

    // Bytes belonging to the tunneled protocol must not be parsed as HTTP.
    let tunnel_bytes = b"whatever the successor protocol wants";
    let post_switch = feed(&mut client, tunnel_bytes);
    assert!(matches!(
        post_switch.as_slice(),
        [Event::Paused { .. }]
    ));
    let (trailing, closed) = client.trailing_data();
    assert_eq!(trailing, tunnel_bytes);
    assert!(!closed);
}

#[test]
fn oversized_request_head_is_rejected_and_poisons_their_state() {
    let mut server = Connection::with_max_buffer_size(Role::Server, 64);
    // No trailing `\r\n\r\n`: the head never finishes, so the reader must hit
    // the buffer cap while still waiting on the terminator.
    let mut head = b"GET / HTTP/1.1\r\nX-Pad: ".to_vec();
    head.extend(std::iter::repeat(b'a').take(200));

    let err = server.receive_data(Some(&head)).unwrap_err();
    assert_eq!(err.status_hint(), Some(431));
    assert_eq!(server.their_state(), h1_engine::State::Error);
    assert!(server.receive_data(Some(b"more")).is_err());
}

#[test]
fn serializing_then_parsing_a_request_round_trips() {
    let mut client = Connection::new(Role::Client);
    let mut server = Connection::new(Role::Server);

    let bytes = send_head_and_body(
        &mut client,
        vec![
            Event::Request {
                method: "POST".into(),
                target: "/widgets".into(),
                headers: vec![
                    header(HOST, "example.com"),
                    header(CONTENT_LENGTH, "3"),
                ],
                http_version: "1.1".into(),
            },
            Event::Data { data: "abc".into() },
            Event::EndOfMessage { headers: vec![] },
        ],
    );

    let events = feed(&mut server, &bytes);
    match &events[0] {
        Event::Request {
            method,
            target,
            http_version,
            ..
        } => {
            assert_eq!(&method[..], b"POST");
            assert_eq!(&target[..], b"/widgets");
            assert_eq!(&http_version[..], b"1.1");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(events[1], Event::Data { ref data } if &data[..] == b"abc"));
    assert!(matches!(&events[2], Event::EndOfMessage { headers } if headers.is_empty()));
}

#[test]
fn chunked_body_split_arbitrarily_across_sends_reassembles_byte_exact() {
    let (mut client, mut server) = get_request_answered_by(vec![]);

    // Simulate a caller that hands the body to `send` in many small pieces
    // rather than one big one; the wire bytes concatenate the same either
    // way, so feeding them to a receiver must reassemble the original.
    let mut wire = Vec::new();
    wire.extend_from_slice(
        &server
            .send(Event::Response {
                status_code: 200,
                headers: vec![header(TRANSFER_ENCODING, "chunked")],
                http_version: "1.1".into(),
            })
            .unwrap()
            .unwrap(),
    );
    for piece in ["T", "he q", "uick ", "brown fox"] {
        wire.extend_from_slice(
            &server
                .send(Event::Data {
                    data: piece.into(),
                })
                .unwrap()
                .unwrap(),
        );
    }
    wire.extend_from_slice(
        &server
            .send(Event::EndOfMessage { headers: vec![] })
            .unwrap()
            .unwrap(),
    );

    let events = feed(&mut client, &wire);
    let mut body = Vec::new();
    for event in events {
        if let Event::Data { data } = event {
            body.extend_from_slice(&data);
        }
    }
    assert_eq!(body, b"The quick brown fox");
}

#[test]
fn keep_alive_survives_reuse_and_preserves_peer_http_version() {
    let mut client = Connection::new(Role::Client);
    let mut server = Connection::new(Role::Server);

    for _ in 0..2 {
        let request_bytes = send_head_and_body(
            &mut client,
            vec![
                Event::Request {
                    method: "GET".into(),
                    target: "/".into(),
                    headers: vec![header(HOST, "localhost")],
                    http_version: "1.1".into(),
                },
                Event::EndOfMessage { headers: vec![] },
            ],
        );
        feed(&mut server, &request_bytes);
        let response_bytes = send_head_and_body(
            &mut server,
            vec![
                Event::Response {
                    status_code: 200,
                    headers: vec![header(CONTENT_LENGTH, "0")],
                    http_version: "1.1".into(),
                },
                Event::EndOfMessage { headers: vec![] },
            ],
        );
        feed(&mut client, &response_bytes);

        assert!(client.our_state() == h1_engine::State::Done);
        client.prepare_to_reuse().unwrap();
        server.prepare_to_reuse().unwrap();
        assert_eq!(
            client.their_http_version(),
            Some(h1_engine::HttpVersion::HTTP_11)
        );
    }
}

/// Drives a client and server through a bare `GET /` request with the
/// given extra headers, leaving the server in `SEND_RESPONSE` and ready to
/// answer. Used by tests that only care about the response half.
fn get_request_answered_by(
    extra_request_headers: Vec<(http::header::HeaderName, HeaderValue)>,
) -> (Connection, Connection) {
    let mut client = Connection::new(Role::Client);
    let mut server = Connection::new(Role::Server);

    let mut headers = vec![header(HOST, "localhost")];
    headers.extend(extra_request_headers);

    let request_bytes = send_head_and_body(
        &mut client,
        vec![
            Event::Request {
                method: "GET".into(),
                target: "/".into(),
                headers,
                http_version: "1.1".into(),
            },
            Event::EndOfMessage { headers: vec![] },
        ],
    );
    feed(&mut server, &request_bytes);
    (client, server)
}
