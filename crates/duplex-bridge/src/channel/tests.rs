//! Unit tests for the channel handle and transports.

use std::io::{self, Cursor};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        let bytes = self.0.lock().expect("buffer lock").clone();
        String::from_utf8(bytes).expect("utf8 output")
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[fixture]
fn opened() -> (ChannelHandle, MemoryTransport) {
    let (script, host) = memory_pair();
    let handle = ChannelSlot::with_transport(script)
        .open()
        .expect("slot opens");
    (handle, host)
}

#[rstest]
fn memory_pair_moves_lines_both_ways(opened: (ChannelHandle, MemoryTransport)) {
    let (mut handle, mut host) = opened;
    let rid = handle.rid();

    host.send_line(r#"{"type":"ping"}"#).expect("host sends");
    let line = handle.read_line(rid, None).expect("script reads");
    assert_eq!(line, r#"{"type":"ping"}"#);

    let written = handle.write_line(rid, "pong").expect("script writes");
    assert_eq!(written, 5);
    assert_eq!(host.recv_line(None).expect("host reads"), "pong");
}

#[rstest]
fn foreign_resource_id_is_rejected(opened: (ChannelHandle, MemoryTransport)) {
    let (mut handle, _host) = opened;
    let foreign = handle.rid().wrapping_add(1000);
    let error = handle.read_line(foreign, None).expect_err("bad rid");
    assert!(matches!(
        error,
        ChannelError::BadResource { rid, owned } if rid == foreign && owned == handle.rid()
    ));
    assert!(handle.write_line(foreign, "x").is_err());
}

#[rstest]
fn dropped_peer_closes_the_channel(opened: (ChannelHandle, MemoryTransport)) {
    let (mut handle, host) = opened;
    drop(host);
    let rid = handle.rid();
    assert!(matches!(handle.read_line(rid, None), Err(ChannelError::Closed)));
    assert!(matches!(handle.write_line(rid, "x"), Err(ChannelError::Closed)));
}

#[rstest]
fn read_timeout_is_reported(opened: (ChannelHandle, MemoryTransport)) {
    let (mut handle, _host) = opened;
    let rid = handle.rid();
    let error = handle
        .read_line(rid, Some(Duration::from_millis(20)))
        .expect_err("nothing to read");
    assert!(matches!(error, ChannelError::TimedOut { timeout_ms: 20 }));
}

#[test]
fn empty_slot_is_unavailable() {
    let slot = ChannelSlot::new();
    assert!(matches!(slot.open(), Err(ChannelError::Unavailable { .. })));

    let (script, _host) = memory_pair();
    slot.install(script).expect("install after failed open");
    assert!(slot.open().is_ok());
}

#[test]
fn slot_opens_only_once() {
    let (script, _host) = memory_pair();
    let slot = ChannelSlot::with_transport(script);
    let first = slot.open().expect("first open");
    assert!(matches!(slot.open(), Err(ChannelError::AlreadyOpened)));

    let (other, _peer) = memory_pair();
    assert!(matches!(slot.install(other), Err(ChannelError::AlreadyOpened)));
    drop(first);
}

#[test]
fn handles_get_distinct_resource_ids() {
    let (left, _left_peer) = memory_pair();
    let (right, _right_peer) = memory_pair();
    let first = ChannelSlot::with_transport(left).open().expect("left");
    let second = ChannelSlot::with_transport(right).open().expect("right");
    assert_ne!(first.rid(), second.rid());
}

#[test]
fn stream_transport_reads_lines_then_closes() {
    let input = Cursor::new(b"one\r\ntwo\n".to_vec());
    let mut transport =
        StreamTransport::spawn(input, SharedBuffer::default()).expect("spawn reader");

    let timeout = Some(Duration::from_secs(5));
    assert_eq!(transport.recv_line(timeout).expect("first"), "one");
    assert_eq!(transport.recv_line(timeout).expect("second"), "two");
    assert!(matches!(
        transport.recv_line(timeout),
        Err(ChannelError::Closed)
    ));
}

#[test]
fn stream_transport_terminates_each_line() {
    let output = SharedBuffer::default();
    let mut transport =
        StreamTransport::spawn(Cursor::new(Vec::new()), output.clone()).expect("spawn reader");

    let written = transport.send_line(r#"{"type":"pong"}"#).expect("write");
    transport.send_line("x").expect("write");

    assert_eq!(written, 16);
    assert_eq!(output.contents(), "{\"type\":\"pong\"}\nx\n");
}

#[rstest]
fn split_halves_stay_connected(opened: (ChannelHandle, MemoryTransport)) {
    let (mut handle, host) = opened;
    let rid = handle.rid();
    let (outbound, inbound) = host.split();

    outbound.send(String::from("from host")).expect("send half");
    assert_eq!(handle.read_line(rid, None).expect("script reads"), "from host");

    handle.write_line(rid, "from script").expect("script writes");
    assert_eq!(inbound.recv().expect("receive half"), "from script");

    drop(outbound);
    assert!(matches!(handle.read_line(rid, None), Err(ChannelError::Closed)));
}
