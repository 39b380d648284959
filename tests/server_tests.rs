mod common;

use std::{
    io::{ErrorKind, Read, Write},
    net::TcpStream,
    thread,
    time::Duration,
};

use common::{FixedHost, start_server, wait_until};
use hoststat::{BenchmarkHarness, HostInfoProvider, OPERATIONS, Server, ServerConfig};

fn send_byte(stream: &mut TcpStream, code: u8) -> Vec<u8> {
    stream.write_all(&[code]).unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    response
}

#[test]
fn every_command_gets_its_text() {
    let (mut server, addr) = start_server(4);

    for op in &OPERATIONS {
        let mut stream = TcpStream::connect(addr).unwrap();
        let response = String::from_utf8(send_byte(&mut stream, op.code())).unwrap();
        assert!(!response.is_empty());
        assert_eq!(response, FixedHost.respond(op.command));
    }

    assert!(server.stop(Duration::from_secs(2)));
}

#[test]
fn unknown_command_is_closed_without_reply() {
    let (mut server, addr) = start_server(4);

    let mut stream = TcpStream::connect(addr).unwrap();
    assert!(send_byte(&mut stream, 0xff).is_empty());

    // The server keeps serving afterwards.
    let mut stream = TcpStream::connect(addr).unwrap();
    assert!(!send_byte(&mut stream, 0x11).is_empty());

    assert!(server.stop(Duration::from_secs(2)));
}

#[test]
fn third_client_waits_for_a_free_slot() {
    let (mut server, addr) = start_server(2);

    // Two clients that connect and say nothing hold both slots.
    let first = TcpStream::connect(addr).unwrap();
    let _second = TcpStream::connect(addr).unwrap();
    assert!(wait_until(Duration::from_secs(2), || server.running_handlers() == 2));

    let mut third = TcpStream::connect(addr).unwrap();
    third.write_all(&[0x22]).unwrap();
    third
        .set_read_timeout(Some(Duration::from_millis(300)))
        .unwrap();

    let mut buf = [0u8; 64];
    let err = third.read(&mut buf).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut));
    assert_eq!(server.running_handlers(), 2);

    // Freeing a slot lets the third connection through.
    drop(first);
    third.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut response = String::new();
    third.read_to_string(&mut response).unwrap();
    assert_eq!(response, "1h 02m 03s");

    assert!(server.peak_handlers() <= 2);
    assert!(server.stop(Duration::from_secs(2)));
}

#[test]
fn admission_limit_holds_under_load() {
    let (mut server, addr) = start_server(3);

    let harness = BenchmarkHarness::new(40, addr);
    for op in [&OPERATIONS[0], &OPERATIONS[5]] {
        let results = harness.run(op).unwrap();
        assert_eq!(results.len(), 40);
        assert!(results.iter().all(|r| r.success()));
    }

    assert!(server.peak_handlers() <= server.max_clients());
    assert!(wait_until(Duration::from_secs(2), || server.running_handlers() == 0));
    assert!(server.stop(Duration::from_secs(2)));
}

#[test]
fn single_slot_server_keeps_resuming() {
    let (mut server, addr) = start_server(1);

    for _ in 0..50 {
        let mut stream = TcpStream::connect(addr).unwrap();
        assert_eq!(send_byte(&mut stream, 0x55), b"alice pts/0");
    }

    assert_eq!(server.peak_handlers(), 1);
    assert!(server.stop(Duration::from_secs(2)));
}

#[test]
fn stop_ends_an_idle_listener() {
    let (mut server, _addr) = start_server(2);
    assert!(server.is_running());

    assert!(server.stop(Duration::from_secs(2)));
    assert!(!server.is_running());
}

#[test]
fn stop_wakes_a_paused_listener() {
    let (mut server, addr) = start_server(1);

    let held = TcpStream::connect(addr).unwrap();
    assert!(wait_until(Duration::from_secs(2), || server.running_handlers() == 1));

    assert!(server.stop(Duration::from_secs(2)));
    assert!(!server.is_running());

    // The in-flight handler is untouched and still finishes on its own.
    assert_eq!(server.running_handlers(), 1);
    drop(held);
    assert!(wait_until(Duration::from_secs(2), || server.running_handlers() == 0));
}

#[test]
fn abort_ends_a_blocked_accept() {
    let (mut server, addr) = start_server(2);
    thread::sleep(Duration::from_millis(50));

    server.abort();
    assert!(wait_until(Duration::from_secs(2), || !server.is_running()));

    // Nothing is served after an abort.
    if let Ok(mut stream) = TcpStream::connect(addr) {
        stream
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let _ = stream.write_all(&[0x11]);
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf);
        assert!(buf.is_empty());
    }
}

#[test]
fn zero_clients_is_rejected() {
    let result = Server::bind(
        "127.0.0.1:0",
        ServerConfig { max_clients: 0 },
        std::sync::Arc::new(FixedHost),
    );
    assert_eq!(result.err().map(|e| e.kind()), Some(ErrorKind::InvalidInput));
}

#[test]
fn starting_twice_fails() {
    let (mut server, _addr) = start_server(1);
    assert_eq!(server.start().unwrap_err().kind(), ErrorKind::AlreadyExists);
    assert!(server.stop(Duration::from_secs(2)));
}
