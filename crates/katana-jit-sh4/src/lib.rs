//! SH-4 dynamic-recompiler frontend.
//!
//! Decodes guest instructions and emits [`katana_jit_ir`] units, one per
//! translation block. Also home to the guest context struct, the
//! translation cache and interrupt-controller bookkeeping.

mod builder;
mod cache;
mod context;
mod disasm;
mod emit;
mod intc;

pub use builder::{FpuState, GuestMemory, Sh4Builder, Sh4Frontend};
pub use cache::{block_key, BlockKey, TranslationCache};
pub use context::{
    Sh4Context, FPSCR_DN, FPSCR_FR, FPSCR_MASK, FPSCR_PR, FPSCR_SZ, SR_BL, SR_FD, SR_I_BIT,
    SR_I_MASK, SR_M, SR_MD, SR_Q, SR_RB, SR_S, SR_T,
};
pub use disasm::{Instr, Op, OpFlags, Sh4Disasm};
pub use intc::{InterruptInfo, Sh4Intc};
