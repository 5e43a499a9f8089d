//! SH-4 execution driver.
//!
//! Translates blocks on demand, installs them in the translation cache and
//! executes them through the reference interpreter. The host callbacks the
//! emitted code reaches through context tokens (SR/FPSCR writes, invalid
//! instructions, store-queue prefetch) are resolved here.

use katana_jit_ir::interp::{self, ExecEnv};
use katana_jit_ir::passes::run_default_passes;
use katana_jit_ir::{IrBuilder, Type};
use katana_jit_sh4::{
    GuestMemory, Sh4Context, Sh4Frontend, TranslationCache, FPSCR_FR, SR_RB,
};

// callback tokens installed in the context
const TOKEN_SR_UPDATED: u64 = 1;
const TOKEN_FPSCR_UPDATED: u64 = 2;
const TOKEN_INVALID_INSTRUCTION: u64 = 3;
const TOKEN_PREFETCH: u64 = 4;

/// Store queue address range flushed through PREF.
pub const STORE_QUEUE_START: u32 = 0xe000_0000;
pub const STORE_QUEUE_END: u32 = 0xe3ff_ffff;

/// Guest data/instruction memory.
pub trait MemoryBus {
    fn read(&mut self, addr: u32, size: usize) -> u64;
    fn write(&mut self, addr: u32, value: u64, size: usize);
}

/// Events the CPU raises back into the machine.
pub trait CpuHooks {
    /// PREF hit the store queue range; flush it into TA/DMA space.
    fn store_queue_prefetch(&mut self, addr: u32);

    fn invalid_instruction(&mut self, addr: u32) {
        panic!("invalid instruction at {addr:#010x}");
    }
}

pub struct Sh4Cpu<B, H> {
    pub ctx: Sh4Context,
    pub bus: B,
    pub hooks: H,
    frontend: Sh4Frontend,
    cache: TranslationCache<IrBuilder>,
    max_block_instrs: usize,
    breakpoints: Vec<u32>,
}

/// Fetch view over the bus. Translation only reads code bytes, but the bus
/// API is `&mut`, so the reads go through a RefCell.
struct Fetch<'a, B>(std::cell::RefCell<&'a mut B>);

impl<B: MemoryBus> GuestMemory for Fetch<'_, B> {
    fn read16(&self, addr: u32) -> u16 {
        self.0.borrow_mut().read(addr, 2) as u16
    }
}

struct CpuEnv<'a, B, H> {
    ctx: &'a mut Sh4Context,
    bus: &'a mut B,
    hooks: &'a mut H,
}

impl<B: MemoryBus, H: CpuHooks> ExecEnv for CpuEnv<'_, B, H> {
    fn context(&mut self) -> &mut [u8] {
        self.ctx.as_bytes_mut()
    }

    fn load_guest(&mut self, addr: u32, ty: Type) -> u64 {
        self.bus.read(addr, ty.size() as usize)
    }

    fn store_guest(&mut self, addr: u32, bits: u64, ty: Type) {
        self.bus.write(addr, bits, ty.size() as usize);
    }

    fn call_external(&mut self, func: u64, arg: Option<u64>) {
        match func {
            TOKEN_SR_UPDATED => {
                let old = arg.unwrap_or(0) as u32;
                sr_updated(self.ctx, old);
            }
            TOKEN_FPSCR_UPDATED => {
                let old = arg.unwrap_or(0) as u32;
                fpscr_updated(self.ctx, old);
            }
            TOKEN_INVALID_INSTRUCTION => {
                self.hooks.invalid_instruction(arg.unwrap_or(0) as u32);
            }
            TOKEN_PREFETCH => {
                let addr = arg.unwrap_or(0) as u32;
                if (STORE_QUEUE_START..=STORE_QUEUE_END).contains(&addr) {
                    self.hooks.store_queue_prefetch(addr);
                }
            }
            other => panic!("unknown external call token {other}"),
        }
    }
}

/// The RB bit selects which bank backs R0..R7; swap on change.
fn sr_updated(ctx: &mut Sh4Context, old_sr: u32) {
    if (old_sr ^ ctx.sr) & SR_RB != 0 {
        for i in 0..8 {
            std::mem::swap(&mut ctx.r[i], &mut ctx.ralt[i]);
        }
    }
}

/// The FR bit swaps the FP register file with the XF bank.
fn fpscr_updated(ctx: &mut Sh4Context, old_fpscr: u32) {
    if (old_fpscr ^ ctx.fpscr) & FPSCR_FR != 0 {
        std::mem::swap(&mut ctx.fr, &mut ctx.xf);
    }
}

impl<B: MemoryBus, H: CpuHooks> Sh4Cpu<B, H> {
    pub fn new(bus: B, hooks: H, max_block_instrs: usize) -> Self {
        let mut ctx = Sh4Context::default();
        ctx.sr_updated = TOKEN_SR_UPDATED;
        ctx.fpscr_updated = TOKEN_FPSCR_UPDATED;
        ctx.invalid_instruction = TOKEN_INVALID_INSTRUCTION;
        ctx.prefetch = TOKEN_PREFETCH;

        Sh4Cpu {
            ctx,
            bus,
            hooks,
            frontend: Sh4Frontend::new(),
            cache: TranslationCache::new(),
            max_block_instrs,
            breakpoints: Vec::new(),
        }
    }

    /// Drop every compiled block (e.g. after guest code was overwritten).
    pub fn flush_cache(&mut self) {
        self.cache.flush();
    }

    pub fn add_breakpoint(&mut self, addr: u32) {
        if !self.breakpoints.contains(&addr) {
            self.breakpoints.push(addr);
        }
    }

    pub fn remove_breakpoint(&mut self, addr: u32) {
        self.breakpoints.retain(|&a| a != addr);
    }

    pub fn breakpoint_at(&self, addr: u32) -> bool {
        self.breakpoints.contains(&addr)
    }

    fn translate(&mut self, pc: u32, max_instrs: usize) -> IrBuilder {
        let fetch = Fetch(std::cell::RefCell::new(&mut self.bus));
        let mut unit = self
            .frontend
            .translate(&fetch, &self.ctx, pc, max_instrs);
        run_default_passes(&mut unit);
        unit
    }

    fn execute(&mut self, unit: &IrBuilder) {
        let mut env = CpuEnv {
            ctx: &mut self.ctx,
            bus: &mut self.bus,
            hooks: &mut self.hooks,
        };
        interp::run(unit, &mut env);
    }

    /// Execute one translated block at the current PC.
    pub fn run_block(&mut self) {
        let pc = self.ctx.pc;
        let fpscr = self.ctx.fpscr;

        if self.cache.get(pc, fpscr).is_none() {
            let unit = self.translate(pc, self.max_block_instrs);
            self.cache.insert(pc, fpscr, unit);
        }

        let unit = self.cache.get(pc, fpscr).expect("block installed above");
        let mut env = CpuEnv {
            ctx: &mut self.ctx,
            bus: &mut self.bus,
            hooks: &mut self.hooks,
        };
        interp::run(unit, &mut env);
    }

    /// Run until the cycle budget is exhausted.
    pub fn run(&mut self, cycles: i32) {
        self.ctx.num_cycles = cycles;
        while self.ctx.num_cycles > 0 {
            if self.breakpoint_at(self.ctx.pc) {
                break;
            }
            self.run_block();
        }
    }

    /// Execute exactly one instruction, bypassing the cache.
    pub fn step(&mut self) {
        let unit = self.translate(self.ctx.pc, 1);
        self.execute(&unit);
    }
}

/// GDB register numbering for SH: r0..r15 then pc, pr, gbr, vbr, mach,
/// macl, sr.
impl<B: MemoryBus, H: CpuHooks> crate::debugger::DebugInterface for Sh4Cpu<B, H> {
    fn step(&mut self) {
        Sh4Cpu::step(self);
    }

    fn add_bp(&mut self, kind: katana_gdb::BreakpointKind, addr: u32) {
        match kind {
            katana_gdb::BreakpointKind::Software | katana_gdb::BreakpointKind::Hardware => {
                self.add_breakpoint(addr)
            }
            other => tracing::warn!(?other, "watchpoints unsupported"),
        }
    }

    fn rem_bp(&mut self, kind: katana_gdb::BreakpointKind, addr: u32) {
        match kind {
            katana_gdb::BreakpointKind::Software | katana_gdb::BreakpointKind::Hardware => {
                self.remove_breakpoint(addr)
            }
            other => tracing::warn!(?other, "watchpoints unsupported"),
        }
    }

    fn read_mem(&mut self, addr: u32, buf: &mut [u8]) {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.bus.read(addr.wrapping_add(i as u32), 1) as u8;
        }
    }

    fn read_reg(&mut self, n: usize) -> (u64, usize) {
        let value = match n {
            0..=15 => self.ctx.r[n],
            16 => self.ctx.pc,
            17 => self.ctx.pr,
            18 => self.ctx.gbr,
            19 => self.ctx.vbr,
            20 => self.ctx.mach,
            21 => self.ctx.macl,
            22 => self.ctx.sr,
            _ => 0,
        };
        (value as u64, 4)
    }

    fn num_regs(&self) -> usize {
        23
    }
}
