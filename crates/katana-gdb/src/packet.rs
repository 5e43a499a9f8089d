//! GDB remote serial protocol framing.
//!
//! Packets look like `$<data>#<hex-checksum>`; the checksum is the byte-wise
//! sum of the data mod 256. `+`, `-` and 0x03 arrive bare, outside any
//! frame.

/// Maximum total packet size on the wire.
pub const MAX_PACKET_SIZE: usize = 1024 * 128;
/// Maximum data size: the frame consumes `$`, `#` and two checksum digits.
pub const MAX_DATA_SIZE: usize = MAX_PACKET_SIZE - 5;

pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u32, |sum, &b| sum + b as u32) as u8
}

pub fn xtoi(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(0xa + c - b'a'),
        b'A'..=b'F' => Some(0xa + c - b'A'),
        _ => None,
    }
}

/// Parse leading hex digits, returning the value and the rest of the input.
pub fn parse_hex(buf: &[u8]) -> (u32, &[u8]) {
    let mut value = 0u32;
    let mut idx = 0;
    while idx < buf.len() {
        match xtoi(buf[idx]) {
            Some(d) => {
                value = (value << 4) | d as u32;
                idx += 1;
            }
            None => break,
        }
    }
    (value, &buf[idx..])
}

/// Thread ids additionally allow the literal `-1`.
pub fn parse_tid(buf: &[u8]) -> (i64, &[u8]) {
    if let Some(rest) = buf.strip_prefix(b"-1") {
        return (-1, rest);
    }
    let (v, rest) = parse_hex(buf);
    (v as i64, rest)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ParseState {
    Wait,
    Data,
    ChecksumHigh,
    ChecksumLow,
}

/// A complete inbound message.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Message {
    Ack,
    Nack,
    Interrupt,
    /// Framed packet data plus whether the received checksum matched.
    Packet { data: Vec<u8>, valid: bool },
}

/// Byte-at-a-time parser for the inbound stream.
pub struct Parser {
    state: ParseState,
    data: Vec<u8>,
    checksum: u8,
}

impl Default for Parser {
    fn default() -> Self {
        Parser {
            state: ParseState::Wait,
            data: Vec::new(),
            checksum: 0,
        }
    }
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte; returns a message when one completes.
    pub fn push(&mut self, c: u8) -> Option<Message> {
        match self.state {
            ParseState::Wait => match c {
                b'+' => Some(Message::Ack),
                b'-' => Some(Message::Nack),
                0x03 => Some(Message::Interrupt),
                b'$' => {
                    self.state = ParseState::Data;
                    self.data.clear();
                    None
                }
                other => {
                    tracing::warn!(byte = other, "unexpected byte outside packet");
                    None
                }
            },

            ParseState::Data => {
                if c == b'#' {
                    self.state = ParseState::ChecksumHigh;
                } else if self.data.len() >= MAX_DATA_SIZE {
                    // oversized packet: drop it and NAK via a failed checksum
                    tracing::warn!(len = self.data.len(), "oversized packet dropped");
                    self.state = ParseState::Wait;
                    return Some(Message::Packet {
                        data: Vec::new(),
                        valid: false,
                    });
                } else {
                    self.data.push(c);
                }
                None
            }

            ParseState::ChecksumHigh => {
                self.checksum = xtoi(c).unwrap_or(0) << 4;
                self.state = ParseState::ChecksumLow;
                None
            }

            ParseState::ChecksumLow => {
                self.checksum |= xtoi(c).unwrap_or(0);
                self.state = ParseState::Wait;
                let data = std::mem::take(&mut self.data);
                let valid = checksum(&data) == self.checksum;
                Some(Message::Packet { data, valid })
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = ParseState::Wait;
        self.data.clear();
        self.checksum = 0;
    }
}

/// Frame `data` into a wire packet.
pub fn frame(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 4);
    out.push(b'$');
    out.extend_from_slice(data);
    out.push(b'#');
    let cs = checksum(data);
    out.extend_from_slice(format!("{cs:02x}").as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &mut Parser, bytes: &[u8]) -> Vec<Message> {
        bytes.iter().filter_map(|&b| parser.push(b)).collect()
    }

    #[test]
    fn parses_framed_packet() {
        let mut p = Parser::new();
        let msgs = feed(&mut p, b"$g#67");
        assert_eq!(
            msgs,
            vec![Message::Packet {
                data: b"g".to_vec(),
                valid: true
            }]
        );
    }

    #[test]
    fn detects_bad_checksum() {
        let mut p = Parser::new();
        let msgs = feed(&mut p, b"$g#00");
        assert_eq!(
            msgs,
            vec![Message::Packet {
                data: b"g".to_vec(),
                valid: false
            }]
        );
    }

    #[test]
    fn bare_bytes_parse_between_packets() {
        let mut p = Parser::new();
        let msgs = feed(&mut p, b"+-\x03$?#3f");
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0], Message::Ack);
        assert_eq!(msgs[1], Message::Nack);
        assert_eq!(msgs[2], Message::Interrupt);
    }

    #[test]
    fn frame_round_trips() {
        let data = b"m8c000000,40";
        let mut p = Parser::new();
        let msgs = feed(&mut p, &frame(data));
        assert_eq!(
            msgs,
            vec![Message::Packet {
                data: data.to_vec(),
                valid: true
            }]
        );
    }

    #[test]
    fn parse_hex_and_tid() {
        let (v, rest) = parse_hex(b"8c0010,40");
        assert_eq!(v, 0x8c0010);
        assert_eq!(rest, b",40");

        let (tid, _) = parse_tid(b"-1");
        assert_eq!(tid, -1);
        let (tid, _) = parse_tid(b"0");
        assert_eq!(tid, 0);
    }
}
