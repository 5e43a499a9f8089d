use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use katana_gdb::{checksum, frame, BreakpointKind, Endianness, GdbServer, GdbTarget};

#[derive(Default)]
struct RecordingTarget {
    regs: Vec<u64>,
    memory: Vec<u8>,
    events: Vec<String>,
    breakpoints: Vec<(BreakpointKind, u32, bool)>,
}

impl GdbTarget for RecordingTarget {
    fn detach(&mut self) {
        self.events.push("detach".into());
    }

    fn stop(&mut self) {
        self.events.push("stop".into());
    }

    fn resume(&mut self) {
        self.events.push("resume".into());
    }

    fn step(&mut self) {
        self.events.push("step".into());
    }

    fn add_bp(&mut self, kind: BreakpointKind, addr: u32) {
        self.breakpoints.push((kind, addr, true));
    }

    fn rem_bp(&mut self, kind: BreakpointKind, addr: u32) {
        self.breakpoints.push((kind, addr, false));
    }

    fn read_mem(&mut self, addr: u32, buf: &mut [u8]) {
        let at = addr as usize;
        buf.copy_from_slice(&self.memory[at..at + buf.len()]);
    }

    fn read_reg(&mut self, n: usize) -> (u64, usize) {
        (self.regs[n], 4)
    }

    fn endian(&self) -> Endianness {
        Endianness::Little
    }

    fn num_regs(&self) -> usize {
        self.regs.len()
    }
}

struct Session {
    server: GdbServer<RecordingTarget>,
    client: TcpStream,
}

impl Session {
    fn new(target: RecordingTarget) -> Self {
        let mut server = GdbServer::new(target, 0).unwrap();
        let client = TcpStream::connect(("127.0.0.1", server.port())).unwrap();
        client
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();

        // let the server pick up the connection
        std::thread::sleep(Duration::from_millis(10));
        server.pump();

        Session { server, client }
    }

    fn send(&mut self, bytes: &[u8]) {
        self.client.write_all(bytes).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        self.server.pump();
    }

    fn recv(&mut self, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        let mut read = 0;
        let deadline = Instant::now() + Duration::from_secs(2);
        while read < len && Instant::now() < deadline {
            self.server.pump();
            match self.client.read(&mut out[read..]) {
                Ok(n) => read += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => panic!("client read failed: {e}"),
            }
        }
        out.truncate(read);
        out
    }
}

fn packet_str(data: &str) -> Vec<u8> {
    frame(data.as_bytes())
}

#[test]
fn read_registers_little_endian() {
    let target = RecordingTarget {
        regs: vec![0xdeadbeef, 0x01234567],
        ..Default::default()
    };
    let mut s = Session::new(target);

    s.send(&packet_str("g"));

    let expect_data = "efbeadde67452301";
    let expect_cs = checksum(expect_data.as_bytes());
    let expect = format!("+${expect_data}#{expect_cs:02x}").into_bytes();

    let reply = s.recv(expect.len());
    assert_eq!(reply, expect);
}

#[test]
fn bad_checksum_gets_nak() {
    let mut s = Session::new(RecordingTarget::default());

    s.send(b"$g#00");
    let reply = s.recv(1);
    assert_eq!(reply, b"-");
}

#[test]
fn read_memory_replies_hex() {
    let target = RecordingTarget {
        memory: vec![0x12, 0x34, 0x56, 0x78],
        ..Default::default()
    };
    let mut s = Session::new(target);

    s.send(&packet_str("m0,4"));
    let reply = s.recv(1 + frame(b"12345678").len());
    assert_eq!(reply[0], b'+');
    assert_eq!(&reply[1..], frame(b"12345678").as_slice());
}

#[test]
fn queries_answer_the_supported_subset() {
    let mut s = Session::new(RecordingTarget::default());

    for (query, reply) in [
        ("qAttached", "1"),
        ("qC", "QC0"),
        ("qfThreadInfo", "m0"),
        ("qsThreadInfo", "l"),
        ("qSupported", ""),
    ] {
        s.send(&packet_str(query));
        let expect = frame(reply.as_bytes());
        let got = s.recv(1 + expect.len());
        assert_eq!(&got[1..], expect.as_slice(), "query {query}");
    }
}

#[test]
fn breakpoints_reach_the_target() {
    let mut s = Session::new(RecordingTarget::default());

    s.send(&packet_str("Z0,8c001000,2"));
    let _ = s.recv(1 + frame(b"OK").len());
    s.send(&packet_str("z0,8c001000,2"));
    let _ = s.recv(1 + frame(b"OK").len());

    assert_eq!(
        s.server.target().breakpoints,
        vec![
            (BreakpointKind::Software, 0x8c001000, true),
            (BreakpointKind::Software, 0x8c001000, false),
        ]
    );
}

#[test]
fn interrupt_byte_stops_target_and_reports_trap() {
    let mut s = Session::new(RecordingTarget::default());

    s.send(b"\x03");
    let expect = frame(b"T05");
    let reply = s.recv(expect.len());
    assert_eq!(reply, expect);
    assert_eq!(s.server.target().events, vec!["stop".to_string()]);
}

#[test]
fn halt_query_reports_t00() {
    let mut s = Session::new(RecordingTarget::default());

    s.send(&packet_str("?"));
    let expect = frame(b"T00");
    let reply = s.recv(1 + expect.len());
    assert_eq!(&reply[1..], expect.as_slice());
    assert_eq!(s.server.target().events, vec!["stop".to_string()]);
}

#[test]
fn step_and_continue_dispatch() {
    let mut s = Session::new(RecordingTarget::default());

    s.send(&packet_str("s"));
    let _ = s.recv(1);
    s.send(&packet_str("c"));
    let _ = s.recv(1);

    assert_eq!(
        s.server.target().events,
        vec!["step".to_string(), "resume".to_string()]
    );
}

#[test]
fn continue_with_address_is_unsupported() {
    let mut s = Session::new(RecordingTarget::default());

    s.send(&packet_str("c8c000000"));
    let expect = frame(b"");
    let reply = s.recv(1 + expect.len());
    assert_eq!(&reply[1..], expect.as_slice());
    assert!(s.server.target().events.is_empty());
}

#[test]
fn nack_resends_the_last_packet() {
    let mut s = Session::new(RecordingTarget::default());

    s.send(&packet_str("qC"));
    let first = s.recv(1 + frame(b"QC0").len());
    assert_eq!(&first[1..], frame(b"QC0").as_slice());

    s.send(b"-");
    let resent = s.recv(frame(b"QC0").len());
    assert_eq!(resent, frame(b"QC0").as_slice());
}

#[test]
fn no_ack_mode_disables_acks() {
    let mut s = Session::new(RecordingTarget::default());

    s.send(&packet_str("QStartNoAckMode"));
    let reply = s.recv(1 + frame(b"OK").len());
    assert_eq!(reply[0], b'+');
    assert_eq!(&reply[1..], frame(b"OK").as_slice());

    // subsequent packets get no ack, just the reply
    s.send(&packet_str("qC"));
    let reply = s.recv(frame(b"QC0").len());
    assert_eq!(reply, frame(b"QC0").as_slice());
}

#[test]
fn set_thread_accepts_zero_and_any() {
    let mut s = Session::new(RecordingTarget::default());

    s.send(&packet_str("Hg0"));
    let reply = s.recv(1 + frame(b"OK").len());
    assert_eq!(&reply[1..], frame(b"OK").as_slice());

    s.send(&packet_str("Hc-1"));
    let reply = s.recv(1 + frame(b"OK").len());
    assert_eq!(&reply[1..], frame(b"OK").as_slice());

    s.send(&packet_str("Hg5"));
    let reply = s.recv(1 + frame(b"E01").len());
    assert_eq!(&reply[1..], frame(b"E01").as_slice());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// checksum(p) sums bytes mod 256, and framing then parsing any payload
    /// yields the original bytes
    #[test]
    fn checksum_round_trip(data in proptest::collection::vec(0u8..=255, 0..128)) {
        let data: Vec<u8> = data.into_iter().filter(|&b| b != b'#' && b != b'$').collect();
        let expect: u8 = data.iter().fold(0u8, |s, &b| s.wrapping_add(b));
        prop_assert_eq!(checksum(&data), expect);

        let framed = frame(&data);
        let mut parser = katana_gdb::Parser::new();
        let mut msgs = framed.iter().filter_map(|&b| parser.push(b));
        match msgs.next() {
            Some(katana_gdb::Message::Packet { data: parsed, valid }) => {
                prop_assert!(valid);
                prop_assert_eq!(parsed, data);
            }
            other => prop_assert!(false, "unexpected message {:?}", other),
        }
    }
}
