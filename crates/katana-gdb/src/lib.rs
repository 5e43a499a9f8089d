//! GDB remote debug stub.
//!
//! Wraps any device exposing a [`GdbTarget`] debug interface and serves the
//! GDB remote serial protocol over TCP to a single client.

mod packet;
mod server;
mod target;

pub use packet::{checksum, frame, Message, Parser, MAX_DATA_SIZE, MAX_PACKET_SIZE};
pub use server::{signal, GdbError, GdbServer};
pub use target::{BreakpointKind, Endianness, GdbTarget};
