//! TCP server and command dispatch.
//!
//! One listen socket, at most one client; a new connection replaces the old
//! one. `pump` is non-blocking and is called from the core loop at
//! suspension points, so target callbacks never run concurrently with guest
//! execution.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};

use thiserror::Error;

use crate::packet::{frame, parse_hex, parse_tid, Message, Parser};
use crate::target::{BreakpointKind, Endianness, GdbTarget};

/// GDB's canonical signal numbering (the subset the stub sends).
pub mod signal {
    pub const NONE: u8 = 0;
    pub const INT: u8 = 2;
    pub const ILL: u8 = 4;
    pub const TRAP: u8 = 5;
    pub const SEGV: u8 = 11;
}

#[derive(Debug, Error)]
pub enum GdbError {
    #[error("failed to bind gdb listen socket: {0}")]
    Bind(#[source] std::io::Error),
}

pub struct GdbServer<T> {
    target: T,
    listener: TcpListener,
    client: Option<TcpStream>,
    parser: Parser,
    last_sent: Vec<u8>,
    ack_disabled: bool,
}

impl<T: GdbTarget> GdbServer<T> {
    /// Bind the listen socket on `port` (0 picks an ephemeral port).
    pub fn new(target: T, port: u16) -> Result<Self, GdbError> {
        let listener = TcpListener::bind(("0.0.0.0", port)).map_err(GdbError::Bind)?;
        listener.set_nonblocking(true).map_err(GdbError::Bind)?;

        tracing::info!(port = listener.local_addr().map(|a| a.port()).unwrap_or(0), "gdb server started");

        Ok(GdbServer {
            target,
            listener,
            client: None,
            parser: Parser::new(),
            last_sent: Vec::new(),
            ack_disabled: false,
        })
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().map(|a| a.port()).unwrap_or(0)
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// Tell the client we halted with `sig`.
    pub fn interrupt(&mut self, sig: u8) {
        self.send_packet(format!("T{sig:02x}").as_bytes());
    }

    /// Accept pending connections and drain available client data.
    pub fn pump(&mut self) {
        self.accept_client();

        while let Some(msg) = self.recv_message() {
            self.handle_message(msg);
        }
    }

    fn accept_client(&mut self) {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                tracing::info!(%peer, "gdb client connected");
                if stream.set_nonblocking(true).is_err() {
                    return;
                }
                // a new connection replaces any existing client
                self.drop_client();
                self.client = Some(stream);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => tracing::warn!(error = %e, "gdb accept failed"),
        }
    }

    fn drop_client(&mut self) {
        if self.client.take().is_some() {
            tracing::info!("gdb client disconnected");
        }
        self.parser.reset();
        self.last_sent.clear();
        self.ack_disabled = false;
    }

    fn recv_message(&mut self) -> Option<Message> {
        loop {
            let client = self.client.as_mut()?;
            let mut byte = [0u8; 1];
            match client.read(&mut byte) {
                Ok(0) => {
                    // peer closed
                    self.drop_client();
                    return None;
                }
                Ok(_) => {
                    if let Some(msg) = self.parser.push(byte[0]) {
                        return Some(msg);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "gdb recv failed");
                    return None;
                }
            }
        }
    }

    fn handle_message(&mut self, msg: Message) {
        match msg {
            // nothing to do, the client acknowledged our last packet
            Message::Ack => {}

            Message::Nack => {
                let last = self.last_sent.clone();
                self.send_raw(&last);
            }

            Message::Interrupt => {
                self.target.stop();
                self.interrupt(signal::TRAP);
            }

            Message::Packet { data, valid } => {
                if !self.ack_disabled {
                    if valid {
                        self.send_raw(b"+");
                    } else {
                        self.send_raw(b"-");
                        return;
                    }
                }
                self.dispatch(&data);
            }
        }
    }

    fn dispatch(&mut self, data: &[u8]) {
        let handled = match data.first().copied() {
            Some(b'D') => {
                self.target.detach();
                self.drop_client();
                true
            }
            Some(b'c') => self.handle_continue(&data[1..]),
            Some(b'g') => self.handle_read_registers(),
            Some(b'H') => self.handle_set_thread(&data[1..]),
            Some(b'm') => self.handle_read_memory(&data[1..]),
            Some(b'p') => self.handle_read_register(&data[1..]),
            Some(b'q') => self.handle_query(data),
            Some(b'Q') => self.handle_set(data),
            Some(b's') => self.handle_step(&data[1..]),
            Some(b'z') => self.handle_breakpoint(&data[1..], false),
            Some(b'Z') => self.handle_breakpoint(&data[1..], true),
            Some(b'?') => {
                self.target.stop();
                self.interrupt(signal::NONE);
                true
            }
            _ => false,
        };

        if !handled {
            tracing::debug!(packet = %String::from_utf8_lossy(data), "unsupported packet");
            self.send_packet(b"");
        }
    }

    // 'c [addr]': resume. Only resuming at the current address is supported.
    fn handle_continue(&mut self, args: &[u8]) -> bool {
        let (addr, _) = parse_hex(args);
        if addr != 0 {
            return false;
        }
        self.target.resume();
        true
    }

    // 'g': read all registers, hex in target byte order
    fn handle_read_registers(&mut self) -> bool {
        let mut reply = String::new();
        for n in 0..self.target.num_regs() {
            let (value, size) = self.target.read_reg(n);
            format_register(&mut reply, value, size, self.target.endian());
        }
        self.send_packet(reply.as_bytes());
        true
    }

    // 'H op tid': set thread; only tid 0 / -1 exist
    fn handle_set_thread(&mut self, args: &[u8]) -> bool {
        if args.is_empty() {
            return false;
        }
        let (tid, _) = parse_tid(&args[1..]);
        if tid != 0 && tid != -1 {
            self.send_packet(b"E01");
        } else {
            self.send_packet(b"OK");
        }
        true
    }

    // 'm addr,len': read guest memory as hex
    fn handle_read_memory(&mut self, args: &[u8]) -> bool {
        let (addr, rest) = parse_hex(args);
        let Some(rest) = rest.strip_prefix(b",") else {
            return false;
        };
        let (len, _) = parse_hex(rest);

        let mut memory = vec![0u8; len as usize];
        self.target.read_mem(addr, &mut memory);

        let mut reply = String::with_capacity(memory.len() * 2);
        for b in &memory {
            reply.push_str(&format!("{b:02x}"));
        }
        self.send_packet(reply.as_bytes());
        true
    }

    // 'p n': read a single register
    fn handle_read_register(&mut self, args: &[u8]) -> bool {
        let (n, _) = parse_hex(args);
        let (value, size) = self.target.read_reg(n as usize);
        let mut reply = String::new();
        format_register(&mut reply, value, size, self.target.endian());
        self.send_packet(reply.as_bytes());
        true
    }

    fn handle_query(&mut self, data: &[u8]) -> bool {
        match data {
            b"qAttached" => self.send_packet(b"1"),
            b"qC" => self.send_packet(b"QC0"),
            b"qfThreadInfo" => self.send_packet(b"m0"),
            b"qsThreadInfo" => self.send_packet(b"l"),
            _ => return false,
        }
        true
    }

    fn handle_set(&mut self, data: &[u8]) -> bool {
        match data {
            b"QStartNoAckMode" => {
                self.send_packet(b"OK");
                self.ack_disabled = true;
                true
            }
            _ => false,
        }
    }

    // 's [addr]': single step at the current address
    fn handle_step(&mut self, args: &[u8]) -> bool {
        let (addr, _) = parse_hex(args);
        if addr != 0 {
            return false;
        }
        self.target.step();
        true
    }

    // 'z/Z type,addr,kind'
    fn handle_breakpoint(&mut self, args: &[u8], insert: bool) -> bool {
        let (ty, rest) = parse_hex(args);
        let Some(rest) = rest.strip_prefix(b",") else {
            return false;
        };
        let (addr, rest) = parse_hex(rest);
        let Some(rest) = rest.strip_prefix(b",") else {
            return false;
        };
        let (_kind, _) = parse_hex(rest);

        let Some(ty) = BreakpointKind::from_u32(ty) else {
            return false;
        };

        if insert {
            self.target.add_bp(ty, addr);
        } else {
            self.target.rem_bp(ty, addr);
        }
        self.send_packet(b"OK");
        true
    }

    fn send_packet(&mut self, data: &[u8]) {
        let framed = frame(data);
        self.last_sent = framed.clone();
        self.send_raw(&framed);
    }

    fn send_raw(&mut self, data: &[u8]) {
        let Some(client) = self.client.as_mut() else {
            return;
        };
        if let Err(e) = client.write_all(data) {
            // the connection is only torn down when the peer closes
            tracing::warn!(error = %e, "gdb send failed");
        }
    }
}

fn format_register(out: &mut String, value: u64, size: usize, endian: Endianness) {
    let bytes = value.to_le_bytes();
    for i in 0..size {
        let b = match endian {
            Endianness::Little => bytes[i],
            Endianness::Big => bytes[size - 1 - i],
        };
        out.push_str(&format!("{b:02x}"));
    }
}
