//! RTSP dialog and RTP drift reporting against a loopback server.

mod common;

use std::io::Write;
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use common::{SDP, TIMEOUT, read_request, reader, rtp_frame, wait_until};
use tsinspect::{Channel, Connection, ConnectionConfig, InspectError, MemorySink, SourceOptions, Target};

fn start(port: u16) -> (Connection, Arc<MemorySink>) {
    let target = Target::parse(&format!("rtsp://127.0.0.1:{port}/stream1")).unwrap();
    let sink = Arc::new(MemorySink::new());
    let source = target
        .open_source(sink.clone(), &SourceOptions::default())
        .unwrap();
    let connection = Connection::start(
        &target.host,
        target.port,
        source,
        sink.clone(),
        ConnectionConfig::default(),
    );
    (connection, sink)
}

#[test]
fn negotiates_and_reports_rtp_drift() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (done, finished) = mpsc::channel::<()>();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = reader(&stream);
        let replies = [
            "RTSP/1.0 200 OK\r\nCSeq: 1\r\nPublic: OPTIONS, DESCRIBE, SETUP, PLAY\r\n\r\n".to_string(),
            format!(
                "RTSP/1.0 200 OK\r\nCSeq: 2\r\nContent-Base: rtsp://127.0.0.1:{port}/stream1/\r\n\
Content-Type: application/sdp\r\nContent-Length: {}\r\n\r\n{SDP}",
                SDP.len()
            ),
            "RTSP/1.0 200 OK\r\nCSeq: 3\r\nSession: 5150;timeout=60\r\n\
Transport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n"
                .to_string(),
            "RTSP/1.0 200 OK\r\nCSeq: 4\r\nSession: 5150\r\n\r\n".to_string(),
        ];

        let mut requests = Vec::new();
        for reply in replies {
            requests.push(read_request(&mut reader).unwrap());
            stream.write_all(reply.as_bytes()).unwrap();
        }

        let mut frames = rtp_frame(0, 3000, &[0x65, 0x88]);
        frames.extend(rtp_frame(1, 0, &[0x80, 0xc8]));
        frames.extend(rtp_frame(0, 6600, &[0x41, 0x9a]));
        frames.extend_from_slice(b"$\x00\x00\x10");
        stream.write_all(&frames).unwrap();

        let _ = finished.recv_timeout(TIMEOUT);
        requests
    });

    let (mut connection, sink) = start(port);
    assert!(wait_until(TIMEOUT, || sink.entries(Channel::Rtp).len() == 2));
    assert_eq!(
        sink.entries(Channel::Rtp),
        vec![
            "Rtp(type=5, ts=3000, delta=0)",
            "Rtp(type=1, ts=6600, delta=3600)"
        ]
    );
    assert!(connection.is_running());

    connection.stop();
    done.send(()).unwrap();
    let requests = server.join().unwrap();

    let methods: Vec<&str> = requests
        .iter()
        .filter_map(|r| r.split(' ').next())
        .collect();
    assert_eq!(methods, vec!["OPTIONS", "DESCRIBE", "SETUP", "PLAY"]);
    assert!(requests[0].starts_with(&format!("OPTIONS rtsp://127.0.0.1:{port}/stream1 RTSP/1.0\r\n")));
    assert!(requests[2].contains(&format!("rtsp://127.0.0.1:{port}/stream1/trackID=1")));
    assert!(requests[3].contains("Session: 5150\r\n"));
    assert!(connection.take_error().is_none());
    assert!(sink.entries(Channel::Error).is_empty());
}

#[test]
fn error_status_stops_the_session() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = reader(&stream);
        read_request(&mut reader).unwrap();
        stream
            .write_all(b"RTSP/1.0 404 Not Found\r\nCSeq: 1\r\n\r\n")
            .unwrap();
        // Hold the socket until the client gives up on its own.
        let _ = read_request(&mut reader);
    });

    let (connection, sink) = start(port);
    assert!(wait_until(TIMEOUT, || !connection.is_running()));
    assert!(matches!(
        connection.take_error(),
        Some(InspectError::Status { code: 404, .. })
    ));
    assert_eq!(sink.entries(Channel::Error).len(), 1);
    drop(connection);
    server.join().unwrap();
}
