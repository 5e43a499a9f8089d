//! Purpose-built SSA IR for the SH-4 recompiler.
//!
//! One [`IrBuilder`] per translation block: the SH-4 frontend emits typed
//! instructions into it, the passes in [`passes`] rewrite them in place, and
//! a backend (or the [`interp`] reference interpreter) consumes the result.

mod builder;
mod ir;

pub mod interp;
pub mod passes;
pub mod verify;

pub use builder::IrBuilder;
pub use ir::{
    Block, BlockId, Const, Edge, EdgeId, Instr, InstrFlags, InstrId, Opcode, Type, Use, Value,
    ValueId, ValueKind, MAX_ARGS,
};
