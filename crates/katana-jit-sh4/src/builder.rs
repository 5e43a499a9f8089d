//! SH-4 to IR translation.
//!
//! `Sh4Frontend` holds the state shared by every translation (decode lookup
//! table, FSCA sine/cosine table). `Sh4Builder` wraps one `IrBuilder` and
//! emits a linear window of guest instructions starting at a given PC,
//! stopping at the first branch, SR write, FPSCR write or the instruction
//! cap.

use katana_jit_ir::{InstrFlags, IrBuilder, Type, ValueId};

use crate::context::{Sh4Context, FPSCR_MASK, FPSCR_PR, FPSCR_SZ, SR_T};
use crate::ctx_offset;
use crate::disasm::{Instr, OpFlags, Sh4Disasm};

/// Guest memory as seen by the translator (instruction fetch only).
pub trait GuestMemory {
    fn read16(&self, addr: u32) -> u16;
}

/// FPSCR precision bits captured at translation start. The decision is baked
/// into the emitted IR, which is why an FPSCR write ends the block.
#[derive(Clone, Copy, Default)]
pub struct FpuState {
    pub double_pr: bool,
    pub double_sz: bool,
}

/// Signals that the current block must stop emitting (invalid instruction in
/// a delay slot or at the head of the window).
pub struct BlockEnd;

pub struct Sh4Frontend {
    pub(crate) disasm: Sh4Disasm,
    /// 65536 x [sin, cos] pairs indexed by the low 16 bits of FPUL.
    pub(crate) fsca_table: Box<[f32]>,
}

impl Default for Sh4Frontend {
    fn default() -> Self {
        Self::new()
    }
}

impl Sh4Frontend {
    pub fn new() -> Self {
        let mut fsca_table = vec![0.0f32; 0x20000].into_boxed_slice();
        for i in 0..0x10000usize {
            let angle = i as f64 * (2.0 * std::f64::consts::PI / 65536.0);
            fsca_table[i * 2] = angle.sin() as f32;
            fsca_table[i * 2 + 1] = angle.cos() as f32;
        }

        Sh4Frontend {
            disasm: Sh4Disasm::new(),
            fsca_table,
        }
    }

    /// Translate a block starting at `start_addr`. `max_instrs` of zero
    /// means unbounded.
    pub fn translate(
        &self,
        mem: &dyn GuestMemory,
        ctx: &Sh4Context,
        start_addr: u32,
        max_instrs: usize,
    ) -> IrBuilder {
        let mut sb = Sh4Builder {
            b: IrBuilder::new(),
            frontend: self,
            mem,
            fpu: FpuState {
                double_pr: ctx.fpscr & FPSCR_PR != 0,
                double_sz: ctx.fpscr & FPSCR_SZ != 0,
            },
            pc: start_addr,
        };

        let mut i = 0;
        while max_instrs == 0 || i < max_instrs {
            i += 1;

            let opcode = sb.mem.read16(sb.pc);
            let Some(instr) = self.disasm.decode(sb.pc, opcode) else {
                sb.invalid_instruction(sb.pc);
                break;
            };

            sb.pc = sb.pc.wrapping_add(2);
            sb.b.guest_cycles += instr.cycles as u32;

            if sb.emit_instr(&instr).is_err() {
                break;
            }

            // stop once a branch has been hit. if fpscr changed, stop since
            // the captured fpu state is invalidated; if sr changed, stop as
            // interrupts may need handling
            if instr
                .flags
                .intersects(OpFlags::BRANCH | OpFlags::SET_FPSCR | OpFlags::SET_SR)
            {
                break;
            }
        }

        sb.finish(start_addr)
    }
}

pub struct Sh4Builder<'a> {
    pub b: IrBuilder,
    pub(crate) frontend: &'a Sh4Frontend,
    mem: &'a dyn GuestMemory,
    pub(crate) fpu: FpuState,
    pub(crate) pc: u32,
}

impl Sh4Builder<'_> {
    fn finish(mut self, start_addr: u32) -> IrBuilder {
        // if the block was terminated before a branch instruction, emit a
        // fallthrough branch to the next pc
        let ends_in_pc_store = self.b.tail_instr().is_some_and(|tail| {
            let instr = self.b.instr(tail);
            instr.op == katana_jit_ir::Opcode::StoreContext
                && self
                    .b
                    .value(instr.arg(0))
                    .constant()
                    .map(|c| c.i32_value() as u32 == ctx_offset!(pc))
                    .unwrap_or(false)
        });
        if !ends_in_pc_store {
            let next_pc = self.b.const_u32(self.pc);
            self.branch(next_pc);
        }

        // update remaining cycles
        let cycles = self.b.guest_cycles;
        let num_cycles = self.load_ctx(ctx_offset!(num_cycles), Type::I32);
        let dec = self.b.const_i32(cycles as i32);
        let num_cycles = self.b.sub(num_cycles, dec);
        self.b.store_context(ctx_offset!(num_cycles), num_cycles);

        // update executed instruction count
        let count = (self.pc.wrapping_sub(start_addr) >> 1) as i32;
        let num_instrs = self.load_ctx(ctx_offset!(num_instrs), Type::I32);
        let inc = self.b.const_i32(count);
        let num_instrs = self.b.add(num_instrs, inc);
        self.b.store_context(ctx_offset!(num_instrs), num_instrs);

        self.b
    }

    fn load_ctx(&mut self, offset: u32, ty: Type) -> ValueId {
        self.b.load_context(offset, ty)
    }

    //
    // register access
    //

    pub fn load_gpr(&mut self, n: usize, ty: Type) -> ValueId {
        self.b.load_context(ctx_offset!(r[n]), ty)
    }

    pub fn store_gpr(&mut self, n: usize, v: ValueId) {
        assert_eq!(self.b.ty(v), Type::I32);
        self.b.store_context(ctx_offset!(r[n]), v);
    }

    /// 32-bit accesses swizzle the low index bit to account for the guest's
    /// odd-indexing convention within 64-bit pairs.
    pub fn load_fpr(&mut self, n: usize, ty: Type) -> ValueId {
        let n = if ty.size() == 4 { n ^ 1 } else { n };
        self.b.load_context(ctx_offset!(fr[n]), ty)
    }

    pub fn store_fpr(&mut self, n: usize, v: ValueId) {
        let n = if self.b.ty(v).size() == 4 { n ^ 1 } else { n };
        self.b.store_context(ctx_offset!(fr[n]), v);
    }

    pub fn load_xfr(&mut self, n: usize, ty: Type) -> ValueId {
        let n = if ty.size() == 4 { n ^ 1 } else { n };
        self.b.load_context(ctx_offset!(xf[n]), ty)
    }

    pub fn store_xfr(&mut self, n: usize, v: ValueId) {
        let n = if self.b.ty(v).size() == 4 { n ^ 1 } else { n };
        self.b.store_context(ctx_offset!(xf[n]), v);
    }

    pub fn load_sr(&mut self) -> ValueId {
        self.b.load_context(ctx_offset!(sr), Type::I32)
    }

    /// SR writes trap through the embedder's callback, which may re-bank
    /// R0..R7; the store carries INVALIDATE_CONTEXT so later context loads
    /// are not forwarded across it.
    pub fn store_sr(&mut self, v: ValueId) {
        assert_eq!(self.b.ty(v), Type::I32);

        let sr_updated = self.b.load_context(ctx_offset!(sr_updated), Type::I64);
        let old_sr = self.load_sr();
        self.b
            .store_context_flags(ctx_offset!(sr), v, InstrFlags::INVALIDATE_CONTEXT);
        let old_sr = self.b.zext(old_sr, Type::I64);
        self.b.call_external2(sr_updated, old_sr);
    }

    pub fn load_t(&mut self) -> ValueId {
        let sr = self.load_sr();
        let t = self.b.const_u32(SR_T);
        self.b.and(sr, t)
    }

    pub fn store_t(&mut self, v: ValueId) {
        let sr = self.load_sr();
        let t = self.b.const_u32(SR_T);
        let not_t = self.b.const_u32(!SR_T);
        let sr_t = self.b.or(sr, t);
        let sr_not = self.b.and(sr, not_t);
        let new_sr = self.b.select(v, sr_t, sr_not);
        self.store_sr(new_sr);
    }

    pub fn load_gbr(&mut self) -> ValueId {
        self.b.load_context(ctx_offset!(gbr), Type::I32)
    }

    pub fn store_gbr(&mut self, v: ValueId) {
        self.b.store_context(ctx_offset!(gbr), v);
    }

    pub fn load_fpscr(&mut self) -> ValueId {
        let v = self.b.load_context(ctx_offset!(fpscr), Type::I32);
        let mask = self.b.const_u32(FPSCR_MASK);
        self.b.and(v, mask)
    }

    pub fn store_fpscr(&mut self, v: ValueId) {
        assert_eq!(self.b.ty(v), Type::I32);
        let mask = self.b.const_u32(FPSCR_MASK);
        let v = self.b.and(v, mask);

        let fpscr_updated = self.b.load_context(ctx_offset!(fpscr_updated), Type::I64);
        let old_fpscr = self.load_fpscr();
        self.b
            .store_context_flags(ctx_offset!(fpscr), v, InstrFlags::INVALIDATE_CONTEXT);
        let old_fpscr = self.b.zext(old_fpscr, Type::I64);
        self.b.call_external2(fpscr_updated, old_fpscr);
    }

    pub fn load_pr(&mut self) -> ValueId {
        self.b.load_context(ctx_offset!(pr), Type::I32)
    }

    pub fn store_pr(&mut self, v: ValueId) {
        assert_eq!(self.b.ty(v), Type::I32);
        self.b.store_context(ctx_offset!(pr), v);
    }

    //
    // control flow: branches store the destination PC; the runtime resumes
    // from there after the block returns
    //

    pub fn branch(&mut self, dest: ValueId) {
        self.b.store_context(ctx_offset!(pc), dest);
    }

    pub fn branch_const(&mut self, dest: u32) {
        let dest = self.b.const_u32(dest);
        self.branch(dest);
    }

    pub fn branch_cond(&mut self, cond: ValueId, true_addr: ValueId, false_addr: ValueId) {
        let dest = self.b.select(cond, true_addr, false_addr);
        self.b.store_context(ctx_offset!(pc), dest);
    }

    pub fn invalid_instruction(&mut self, guest_addr: u32) {
        tracing::debug!(addr = format_args!("{guest_addr:#010x}"), "invalid instruction");
        let hook = self
            .b
            .load_context(ctx_offset!(invalid_instruction), Type::I64);
        let addr = self.b.const_u64(guest_addr as u64);
        self.b.call_external2(hook, addr);
    }

    /// Emit the instruction occupying the delay slot of `prev`.
    ///
    /// The caller has already loaded any value the branch needs (source
    /// register, PR, T) into an IR value, so a delay-slot write to the same
    /// context slot cannot clobber the branch destination.
    pub fn emit_delay_slot(&mut self, prev: &Instr) -> Result<(), BlockEnd> {
        debug_assert!(prev.flags.contains(OpFlags::DELAYED));

        let addr = prev.addr.wrapping_add(2);
        let opcode = self.mem.read16(addr);
        let Some(delay) = self.frontend.disasm.decode(addr, opcode) else {
            self.invalid_instruction(addr);
            return Err(BlockEnd);
        };

        assert!(
            !delay.flags.contains(OpFlags::DELAYED),
            "delay slot at {:#010x} holds another delayed branch",
            addr
        );

        self.pc = self.pc.wrapping_add(2);
        self.b.guest_cycles += delay.cycles as u32;

        self.emit_instr(&delay)
    }
}
