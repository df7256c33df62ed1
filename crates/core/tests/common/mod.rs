//! Loopback helpers shared by the integration tests.

#![allow(dead_code)]

use std::io::{self, BufRead, BufReader};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Wrap an accepted stream for line reads with a bounded timeout.
pub fn reader(stream: &TcpStream) -> BufReader<TcpStream> {
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    BufReader::new(stream.try_clone().unwrap())
}

/// Read one body-less request, up to and including the blank line.
pub fn read_request(reader: &mut BufReader<TcpStream>) -> io::Result<String> {
    let mut request = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        let blank = line == "\r\n" || line == "\n";
        request.push_str(&line);
        if blank {
            return Ok(request);
        }
    }
}

/// RTP packet with a fixed 12-byte header inside an interleaved frame.
pub fn rtp_frame(channel: u8, timestamp: u32, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x80, 96, 0, 1];
    packet.extend_from_slice(&timestamp.to_be_bytes());
    packet.extend_from_slice(&[0, 0, 0, 1]);
    packet.extend_from_slice(payload);
    let mut frame = vec![b'$', channel];
    frame.extend_from_slice(&(packet.len() as u16).to_be_bytes());
    frame.extend(packet);
    frame
}

/// Previous-tag-size followed by one FLV tag of `size` payload bytes.
pub fn flv_tag(tag_type: u8, size: u32, timestamp: u32) -> Vec<u8> {
    let len = size.to_be_bytes();
    let ts = timestamp.to_be_bytes();
    let mut bytes = vec![0, 0, 0, 0];
    bytes.extend_from_slice(&[
        tag_type, len[1], len[2], len[3], ts[1], ts[2], ts[3], ts[0], 0, 0, 0,
    ]);
    bytes.resize(bytes.len() + size as usize, 0xab);
    bytes
}

pub const SDP: &str = "v=0\r\n\
o=- 0 0 IN IP4 127.0.0.1\r\n\
s=Stream\r\n\
a=control:*\r\n\
m=video 0 RTP/AVP 96\r\n\
a=rtpmap:96 H264/90000\r\n\
a=control:trackID=1\r\n";
