//! Integration tests: full RTSP handshake and interleaved frame delivery.
//!
//! Each test starts a real server on its own fixed loopback port,
//! connects with plain TCP clients, and verifies responses and frame
//! packets byte-for-byte.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use mirrorcast::{CastError, Server};

fn connect(addr: &str) -> TcpStream {
    let addr = addr.to_socket_addrs().unwrap().next().unwrap();
    let stream = TcpStream::connect_timeout(&addr, Duration::from_secs(2)).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
        .set_write_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
}

fn rtsp_request(stream: &mut TcpStream, request: &str) -> std::io::Result<String> {
    stream.write_all(request.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut response = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        response.push_str(&line);
        if line == "\r\n" || line == "\n" {
            break;
        }
    }

    // Parse Content-Length and read body if present
    if let Some(len) = response
        .lines()
        .find(|l| l.to_lowercase().starts_with("content-length:"))
        .and_then(|l| l.split(':').nth(1))
        .and_then(|v| v.trim().parse::<usize>().ok())
        && len > 0
    {
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body)?;
        response.push_str(&String::from_utf8_lossy(&body));
    }

    Ok(response)
}

/// Registration completes just after the SETUP response is written, so
/// give the server thread a moment before asserting membership.
fn wait_for_viewers(server: &Server, expected: usize) {
    for _ in 0..100 {
        if server.viewer_count() == expected {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(server.viewer_count(), expected);
}

fn read_interleaved_packet(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).expect("packet header");
    assert_eq!(header[0], b'$', "interleaved magic byte");
    assert_eq!(header[1], 0, "interleaved channel");
    let len = u16::from_be_bytes([header[2], header[3]]) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).expect("packet payload");
    payload
}

#[test]
fn full_handshake_and_frame_delivery() {
    const BIND: &str = "127.0.0.1:18554";

    let mut server = Server::new(BIND);
    server.start().expect("server start");
    server.on_parameter_sets(&[0, 0, 0, 1, 0xaa], &[0, 0, 0, 1, 0xbb]);

    let mut stream = connect(BIND);
    let base_uri = format!("rtsp://{}/stream", BIND);

    // OPTIONS
    let resp = rtsp_request(
        &mut stream,
        &format!("OPTIONS {} RTSP/1.0\r\nCSeq: 1\r\n\r\n", base_uri),
    )
    .expect("OPTIONS response");
    assert!(
        resp.starts_with("RTSP/1.0 200 OK\r\nCSeq: 1\r\n"),
        "OPTIONS: bad status/CSeq: {resp}"
    );
    assert!(
        resp.contains("Public: OPTIONS, DESCRIBE, SETUP, PLAY\r\n"),
        "OPTIONS: missing Public header"
    );

    // DESCRIBE
    let resp = rtsp_request(
        &mut stream,
        &format!("DESCRIBE {} RTSP/1.0\r\nCSeq: 2\r\n\r\n", base_uri),
    )
    .expect("DESCRIBE response");
    assert!(resp.starts_with("RTSP/1.0 200 OK\r\nCSeq: 2\r\n"));
    assert!(resp.contains(&format!("Content-Base: {}\r\n", base_uri)));
    assert!(resp.contains("Content-Type: application/sdp\r\n"));
    assert!(resp.contains("m=video 0 RTP/AVP 96\r\n"));
    assert!(
        resp.contains("sprop-parameter-sets=AAAAAao=,AAAAAbs="),
        "DESCRIBE: sprop must be the Base64 of the loaded SPS/PPS: {resp}"
    );

    // SETUP
    let resp = rtsp_request(
        &mut stream,
        &format!("SETUP {} RTSP/1.0\r\nCSeq: 3\r\n\r\n", base_uri),
    )
    .expect("SETUP response");
    assert!(resp.starts_with("RTSP/1.0 200 OK\r\nCSeq: 3\r\n"));
    assert!(
        resp.contains("Transport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n"),
        "SETUP: missing interleaved Transport header"
    );
    assert!(resp.contains("Session: "), "SETUP: missing Session header");
    wait_for_viewers(&server, 1);

    // PLAY
    let resp = rtsp_request(
        &mut stream,
        &format!("PLAY {} RTSP/1.0\r\nCSeq: 4\r\n\r\n", base_uri),
    )
    .expect("PLAY response");
    assert!(resp.starts_with("RTSP/1.0 200 OK\r\nCSeq: 4\r\n"));
    assert!(
        resp.contains(&format!("RTP-Info: url={}/trackID=1;seq=0\r\n", base_uri)),
        "PLAY: missing RTP-Info header: {resp}"
    );

    // Frame delivery
    let frame = [0u8, 0, 0, 1, 0x65, 0x88, 0x80, 0x10];
    assert_eq!(server.on_encoded_frame(&frame, true), 1);
    assert_eq!(read_interleaved_packet(&mut stream), frame.to_vec());

    server.stop();
}

#[test]
fn setup_gates_delivery() {
    const BIND: &str = "127.0.0.1:18560";

    let mut server = Server::new(BIND);
    server.start().expect("server start");
    let base_uri = format!("rtsp://{}/stream", BIND);

    let mut viewer = connect(BIND);
    let resp = rtsp_request(
        &mut viewer,
        &format!("SETUP {} RTSP/1.0\r\nCSeq: 1\r\n\r\n", base_uri),
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"));
    wait_for_viewers(&server, 1);

    let mut bystander = connect(BIND);
    let resp = rtsp_request(
        &mut bystander,
        &format!("DESCRIBE {} RTSP/1.0\r\nCSeq: 1\r\n\r\n", base_uri),
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"));

    let frame = [0u8, 0, 0, 1, 0x41, 0x9a];
    assert_eq!(server.on_encoded_frame(&frame, false), 1);
    assert_eq!(read_interleaved_packet(&mut viewer), frame.to_vec());

    // The DESCRIBE-only connection must see nothing.
    bystander
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    let mut buf = [0u8; 1];
    match bystander.read(&mut buf) {
        Err(e) => assert!(
            matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ),
            "unexpected error kind: {e}"
        ),
        Ok(n) => panic!("bystander received {n} unexpected bytes"),
    }

    server.stop();
}

#[test]
fn teardown_deregisters_immediately() {
    const BIND: &str = "127.0.0.1:18562";

    let mut server = Server::new(BIND);
    server.start().expect("server start");
    let base_uri = format!("rtsp://{}/stream", BIND);

    let mut stream = connect(BIND);
    rtsp_request(
        &mut stream,
        &format!("SETUP {} RTSP/1.0\r\nCSeq: 1\r\n\r\n", base_uri),
    )
    .unwrap();
    wait_for_viewers(&server, 1);

    let resp = rtsp_request(
        &mut stream,
        &format!("TEARDOWN {} RTSP/1.0\r\nCSeq: 2\r\n\r\n", base_uri),
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK\r\nCSeq: 2\r\n"));
    assert_eq!(server.viewer_count(), 0);
    assert_eq!(server.on_encoded_frame(&[0, 0, 0, 1, 0x41], false), 0);

    // The control channel stays usable after TEARDOWN.
    let resp = rtsp_request(
        &mut stream,
        &format!("OPTIONS {} RTSP/1.0\r\nCSeq: 3\r\n\r\n", base_uri),
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK\r\nCSeq: 3\r\n"));

    server.stop();
}

#[test]
fn malformed_request_line_gets_fallback_response() {
    const BIND: &str = "127.0.0.1:18564";

    let mut server = Server::new(BIND);
    server.start().expect("server start");

    let mut stream = connect(BIND);

    // Single-token request line, no CSeq: answered like OPTIONS with the
    // default CSeq instead of dropping the connection.
    let resp = rtsp_request(&mut stream, "GARBAGE\r\n\r\n").unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK\r\nCSeq: 1\r\n"));
    assert!(resp.contains("Public: OPTIONS, DESCRIBE, SETUP, PLAY\r\n"));

    // The session survives and handles a real request afterwards.
    let resp = rtsp_request(
        &mut stream,
        &format!("OPTIONS rtsp://{}/stream RTSP/1.0\r\nCSeq: 5\r\n\r\n", BIND),
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK\r\nCSeq: 5\r\n"));

    server.stop();
}

#[test]
fn start_twice_and_bind_conflict_fail() {
    const BIND: &str = "127.0.0.1:18566";

    let mut server = Server::new(BIND);
    server.start().expect("first start");
    assert!(server.is_running());

    assert!(matches!(server.start(), Err(CastError::AlreadyRunning)));

    let mut conflicting = Server::new(BIND);
    assert!(matches!(conflicting.start(), Err(CastError::Io(_))));

    server.stop();
}

#[test]
fn stop_closes_registered_viewers() {
    const BIND: &str = "127.0.0.1:18568";

    let mut server = Server::new(BIND);
    server.start().expect("server start");

    let mut stream = connect(BIND);
    rtsp_request(
        &mut stream,
        &format!("SETUP rtsp://{}/stream RTSP/1.0\r\nCSeq: 1\r\n\r\n", BIND),
    )
    .unwrap();
    wait_for_viewers(&server, 1);

    server.stop();
    assert_eq!(server.viewer_count(), 0);

    // The viewer observes EOF (or a reset) once its socket is closed.
    let mut buf = [0u8; 16];
    match stream.read(&mut buf) {
        Ok(0) => {}
        Ok(n) => panic!("expected EOF, read {n} bytes"),
        Err(_) => {}
    }
}
