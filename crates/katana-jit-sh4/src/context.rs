//! Guest CPU context.
//!
//! Plain data, `#[repr(C)]` so emitted code addresses fields by byte offset
//! (`core::mem::offset_of!`) and `Pod` so the reference interpreter and the
//! debugger can view the whole struct as bytes.

use bytemuck::{Pod, Zeroable};

// SR bits
pub const SR_T: u32 = 1 << 0;
pub const SR_S: u32 = 1 << 1;
pub const SR_I_MASK: u32 = 0xf << 4;
pub const SR_I_BIT: u32 = 4;
pub const SR_Q: u32 = 1 << 8;
pub const SR_M: u32 = 1 << 9;
pub const SR_FD: u32 = 1 << 15;
pub const SR_BL: u32 = 1 << 28;
pub const SR_RB: u32 = 1 << 29;
pub const SR_MD: u32 = 1 << 30;

// FPSCR bits
pub const FPSCR_DN: u32 = 1 << 18;
pub const FPSCR_PR: u32 = 1 << 19;
pub const FPSCR_SZ: u32 = 1 << 20;
pub const FPSCR_FR: u32 = 1 << 21;
/// Writable FPSCR bits.
pub const FPSCR_MASK: u32 = 0x003f_ffff;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct Sh4Context {
    // host callback tokens. emitted code loads these and passes them to
    // CallExternal, so the embedder decides what they resolve to.
    pub sr_updated: u64,
    pub fpscr_updated: u64,
    pub invalid_instruction: u64,
    pub prefetch: u64,

    pub pc: u32,
    pub pr: u32,
    pub sr: u32,
    pub ssr: u32,
    pub spc: u32,
    pub gbr: u32,
    pub vbr: u32,
    pub sgr: u32,
    pub dbr: u32,
    pub mach: u32,
    pub macl: u32,
    pub fpscr: u32,
    pub fpul: u32,
    /// Divide-step state. The MSB holds !(Q ^ M) so a single arithmetic
    /// shift right by 31 recovers the "Q equals M" mask in DIV1.
    pub sr_qm: u32,

    pub r: [u32; 16],
    /// Alternate bank for R0..R7, swapped on SR.RB changes.
    pub ralt: [u32; 8],
    /// FP registers. 32-bit accesses swizzle the low index bit, see
    /// `Sh4Builder::load_fpr`.
    pub fr: [u32; 16],
    /// Extended bank, swapped on FPSCR.FR changes.
    pub xf: [u32; 16],

    pub pending_interrupts: u64,

    pub num_cycles: i32,
    pub num_instrs: i32,
    pub sleep_mode: u32,
    pub _pad: u32,
}

impl Default for Sh4Context {
    fn default() -> Self {
        Zeroable::zeroed()
    }
}

impl Sh4Context {
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::bytes_of_mut(self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Byte offset of a context field, as a u32 for IR constants.
#[macro_export]
macro_rules! ctx_offset {
    ($field:ident) => {
        core::mem::offset_of!($crate::Sh4Context, $field) as u32
    };
    ($field:ident [ $idx:expr ]) => {
        (core::mem::offset_of!($crate::Sh4Context, $field) + ($idx) * 4) as u32
    };
}
