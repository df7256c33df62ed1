//! HTTP/FLV stream with a DVR control connection, over loopback.

mod common;

use std::io::Write;
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use common::{TIMEOUT, flv_tag, read_request, reader, wait_until};
use tsinspect::{
    Action, Channel, Command, Connection, ConnectionConfig, MemorySink, SourceOptions, Target,
};

#[test]
fn reports_tags_and_position() {
    let stream_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let control_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = stream_listener.local_addr().unwrap().port();
    let control_port = control_listener.local_addr().unwrap().port();
    let (done, finished) = mpsc::channel::<()>();

    let stream_server = thread::spawn(move || {
        let (mut stream, _) = stream_listener.accept().unwrap();
        let mut reader = reader(&stream);
        let request = read_request(&mut reader).unwrap();

        let mut bytes = b"HTTP/1.0 200 OK\r\nContent-Type: video/x-flv\r\n\r\n".to_vec();
        bytes.extend_from_slice(&[b'F', b'L', b'V', 1, 0x05, 0, 0, 0, 9]);
        bytes.extend(flv_tag(9, 20, 1000));
        bytes.extend(flv_tag(9, 30, 1040));
        bytes.extend(flv_tag(8, 4, 1040));
        stream.write_all(&bytes).unwrap();

        let _ = finished.recv_timeout(TIMEOUT);
        request
    });

    let control_server = thread::spawn(move || {
        let (mut stream, _) = control_listener.accept().unwrap();
        let mut reader = reader(&stream);
        let request = read_request(&mut reader).unwrap();
        stream
            .write_all(b"HTTP/1.0 200 OK\r\nContent-Type: application/json\r\n\r\n{\"position\": 1523}")
            .unwrap();
        request
    });

    let target = Target::parse(&format!("http://127.0.0.1:{port}/live/7/0/0")).unwrap();
    let sink = Arc::new(MemorySink::new());
    let options = SourceOptions {
        control_port,
        ..SourceOptions::default()
    };
    let source = target.open_source(sink.clone(), &options).unwrap();
    let mut connection = Connection::start(
        &target.host,
        target.port,
        source,
        sink.clone(),
        ConnectionConfig::default(),
    );

    assert!(wait_until(TIMEOUT, || sink.entries(Channel::Flv).len() == 3));
    let records = sink.entries(Channel::Flv);
    assert!(records[0].starts_with("FlvHeader(signature=FLV"));
    assert!(records[0].ends_with("FlvTag(type=9, size=20, ts=1000, delta=0)"));
    assert_eq!(records[1], "FlvTag(type=9, size=30, ts=1040, delta=40)");
    assert_eq!(records[2], "FlvTag(type=8, size=4, ts=1040, delta=0)");

    connection.request_action(Action::new(Command::GetPos));
    assert!(wait_until(TIMEOUT, || !sink.entries(Channel::Position).is_empty()));
    assert_eq!(sink.entries(Channel::Position), vec!["1523"]);

    let control_request = control_server.join().unwrap();
    assert!(control_request.starts_with("GET /?control=7&action=getpos&sec HTTP/1.0\r\n"));
    assert!(control_request.contains(&format!("Host: 127.0.0.1:{control_port}\r\n")));

    // The closed control connection must not end the session.
    assert!(connection.is_running());
    connection.stop();
    done.send(()).unwrap();

    let stream_request = stream_server.join().unwrap();
    assert!(stream_request.starts_with("GET /live/7/0/0 HTTP/1.0\r\n"));
    assert!(connection.take_error().is_none());
    assert!(sink.entries(Channel::Error).is_empty());
}
