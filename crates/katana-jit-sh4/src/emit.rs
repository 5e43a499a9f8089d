//! Per-opcode IR emitters.
//!
//! Each emitter reproduces the architectural effects of one SH-4 instruction
//! on registers, memory and flags. Delayed branches load everything the
//! branch will need before emitting the delay slot, then use those values as
//! the destination, so a delay-slot write to the same register cannot
//! clobber the branch.

use katana_jit_ir::{Type, ValueId};

use crate::builder::{BlockEnd, Sh4Builder};
use crate::context::{SR_S, SR_T};
use crate::ctx_offset;
use crate::disasm::{Instr, Op};

impl Sh4Builder<'_> {
    pub(crate) fn emit_instr(&mut self, i: &Instr) -> Result<(), BlockEnd> {
        match i.op {
            Op::Movi => self.emit_movi(i),
            Op::Movwlpc => self.emit_movwlpc(i),
            Op::Movllpc => self.emit_movllpc(i),
            Op::Mov => self.emit_mov(i),
            Op::Movbs => self.emit_store_reg(i, Type::I8),
            Op::Movws => self.emit_store_reg(i, Type::I16),
            Op::Movls => self.emit_store_reg(i, Type::I32),
            Op::Movbl => self.emit_load_reg(i, Type::I8),
            Op::Movwl => self.emit_load_reg(i, Type::I16),
            Op::Movll => self.emit_load_reg(i, Type::I32),
            Op::Movbm => self.emit_store_predec(i, Type::I8),
            Op::Movwm => self.emit_store_predec(i, Type::I16),
            Op::Movlm => self.emit_store_predec(i, Type::I32),
            Op::Movbp => self.emit_load_postinc(i, Type::I8),
            Op::Movwp => self.emit_load_postinc(i, Type::I16),
            Op::Movlp => self.emit_load_postinc(i, Type::I32),
            Op::Movbs0d => self.emit_store_r0_disp(i, Type::I8, 1),
            Op::Movws0d => self.emit_store_r0_disp(i, Type::I16, 2),
            Op::Movlsmd => self.emit_movlsmd(i),
            Op::Movbld0 => self.emit_load_r0_disp(i, Type::I8, 1),
            Op::Movwld0 => self.emit_load_r0_disp(i, Type::I16, 2),
            Op::Movlldn => self.emit_movlldn(i),
            Op::Movbs0 => self.emit_store_indexed(i, Type::I8),
            Op::Movws0 => self.emit_store_indexed(i, Type::I16),
            Op::Movls0 => self.emit_store_indexed(i, Type::I32),
            Op::Movbl0 => self.emit_load_indexed(i, Type::I8),
            Op::Movwl0 => self.emit_load_indexed(i, Type::I16),
            Op::Movll0 => self.emit_load_indexed(i, Type::I32),
            Op::Movbs0g => self.emit_store_gbr(i, Type::I8, 1),
            Op::Movws0g => self.emit_store_gbr(i, Type::I16, 2),
            Op::Movls0g => self.emit_store_gbr(i, Type::I32, 4),
            Op::Movblg0 => self.emit_load_gbr(i, Type::I8, 1),
            Op::Movwlg0 => self.emit_load_gbr(i, Type::I16, 2),
            Op::Movllg0 => self.emit_load_gbr(i, Type::I32, 4),
            Op::Mova => self.emit_mova(i),
            Op::Movt => self.emit_movt(i),
            Op::Swapb => self.emit_swap(i, 8),
            Op::Swapw => self.emit_swap(i, 16),
            Op::Xtrct => self.emit_xtrct(i),
            Op::Add => self.emit_add(i),
            Op::Addi => self.emit_addi(i),
            Op::Addc => self.emit_addc(i),
            Op::Addv => self.emit_addv(i),
            Op::Cmpeqi => self.emit_cmpeqi(i),
            Op::Cmpeq => self.emit_cmp(i, CmpKind::Eq),
            Op::Cmphs => self.emit_cmp(i, CmpKind::Uge),
            Op::Cmpge => self.emit_cmp(i, CmpKind::Sge),
            Op::Cmphi => self.emit_cmp(i, CmpKind::Ugt),
            Op::Cmpgt => self.emit_cmp(i, CmpKind::Sgt),
            Op::Cmppz => self.emit_cmppz(i),
            Op::Cmppl => self.emit_cmppl(i),
            Op::Cmpstr => self.emit_cmpstr(i),
            Op::Div0s => self.emit_div0s(i),
            Op::Div0u => self.emit_div0u(i),
            Op::Div1 => self.emit_div1(i),
            Op::Dmuls => self.emit_dmul(i, true),
            Op::Dmulu => self.emit_dmul(i, false),
            Op::Dt => self.emit_dt(i),
            Op::Extsb => self.emit_ext(i, Type::I8, true),
            Op::Extsw => self.emit_ext(i, Type::I16, true),
            Op::Extub => self.emit_ext(i, Type::I8, false),
            Op::Extuw => self.emit_ext(i, Type::I16, false),
            Op::Macl => panic!("MAC.L not implemented"),
            Op::Macw => panic!("MAC.W not implemented"),
            Op::Mull => self.emit_mull(i),
            Op::Muls => self.emit_mulw(i, true),
            Op::Mulu => self.emit_mulw(i, false),
            Op::Neg => self.emit_neg(i),
            Op::Negc => self.emit_negc(i),
            Op::Sub => self.emit_sub(i),
            Op::Subc => self.emit_subc(i),
            Op::Subv => self.emit_subv(i),
            Op::And => self.emit_logic(i, LogicKind::And),
            Op::Andi => self.emit_logic_imm(i, LogicKind::And),
            Op::Andb => self.emit_logic_byte(i, LogicKind::And),
            Op::Not => self.emit_not(i),
            Op::Or => self.emit_logic(i, LogicKind::Or),
            Op::Ori => self.emit_logic_imm(i, LogicKind::Or),
            Op::Orb => self.emit_logic_byte(i, LogicKind::Or),
            Op::Tas => self.emit_tas(i),
            Op::Tst => self.emit_tst(i),
            Op::Tsti => self.emit_tsti(i),
            Op::Tstb => self.emit_tstb(i),
            Op::Xor => self.emit_logic(i, LogicKind::Xor),
            Op::Xori => self.emit_logic_imm(i, LogicKind::Xor),
            Op::Xorb => self.emit_logic_byte(i, LogicKind::Xor),
            Op::Rotl => self.emit_rotl(i),
            Op::Rotr => self.emit_rotr(i),
            Op::Rotcl => self.emit_rotcl(i),
            Op::Rotcr => self.emit_rotcr(i),
            Op::Shad => self.emit_shad(i),
            Op::Shal | Op::Shll => self.emit_shll(i),
            Op::Shar => self.emit_shar(i),
            Op::Shld => self.emit_shld(i),
            Op::Shlr => self.emit_shlr(i),
            Op::Shll2 => self.emit_shift_fixed(i, 2, true),
            Op::Shlr2 => self.emit_shift_fixed(i, 2, false),
            Op::Shll8 => self.emit_shift_fixed(i, 8, true),
            Op::Shlr8 => self.emit_shift_fixed(i, 8, false),
            Op::Shll16 => self.emit_shift_fixed(i, 16, true),
            Op::Shlr16 => self.emit_shift_fixed(i, 16, false),
            Op::Bf => self.emit_bf(i),
            Op::Bfs => return self.emit_bfs(i),
            Op::Bt => self.emit_bt(i),
            Op::Bts => return self.emit_bts(i),
            Op::Bra => return self.emit_bra(i),
            Op::Braf => return self.emit_braf(i),
            Op::Bsr => return self.emit_bsr(i),
            Op::Bsrf => return self.emit_bsrf(i),
            Op::Jmp => return self.emit_jmp(i),
            Op::Jsr => return self.emit_jsr(i),
            Op::Rts => return self.emit_rts(i),
            Op::Clrmac => self.emit_clrmac(i),
            Op::Clrs => self.emit_clrs(i),
            Op::Clrt => self.emit_clrt(i),
            Op::Ldcsr => self.emit_ldcsr(i),
            Op::Ldcgbr => self.emit_ldcgbr(i),
            Op::Ldcvbr => self.emit_ldc(i, ctx_offset!(vbr)),
            Op::Ldcssr => self.emit_ldc(i, ctx_offset!(ssr)),
            Op::Ldcspc => self.emit_ldc(i, ctx_offset!(spc)),
            Op::Ldcdbr => self.emit_ldc(i, ctx_offset!(dbr)),
            Op::Ldcrbank => self.emit_ldcrbank(i),
            Op::Ldcmsr => self.emit_ldcmsr(i),
            Op::Ldcmgbr => self.emit_ldcmgbr(i),
            Op::Ldcmvbr => self.emit_ldcm(i, ctx_offset!(vbr)),
            Op::Ldcmssr => self.emit_ldcm(i, ctx_offset!(ssr)),
            Op::Ldcmspc => self.emit_ldcm(i, ctx_offset!(spc)),
            Op::Ldcmdbr => self.emit_ldcm(i, ctx_offset!(dbr)),
            Op::Ldcmrbank => self.emit_ldcmrbank(i),
            Op::Ldsmach => self.emit_lds(i, ctx_offset!(mach)),
            Op::Ldsmacl => self.emit_lds(i, ctx_offset!(macl)),
            Op::Ldspr => self.emit_ldspr(i),
            Op::Ldsmmach => self.emit_ldsm(i, ctx_offset!(mach)),
            Op::Ldsmmacl => self.emit_ldsm(i, ctx_offset!(macl)),
            Op::Ldsmpr => self.emit_ldsmpr(i),
            Op::Movcal => self.emit_movcal(i),
            Op::Nop | Op::Ocbi | Op::Ocbp | Op::Ocbwb => {}
            Op::Pref => self.emit_pref(i),
            Op::Rte => return self.emit_rte(i),
            Op::Sets => self.emit_sets(i),
            Op::Sett => self.emit_sett(i),
            Op::Sleep => panic!("SLEEP not implemented"),
            Op::Stcsr => self.emit_stcsr(i),
            Op::Stcgbr => self.emit_stcgbr(i),
            Op::Stcvbr => self.emit_stc(i, ctx_offset!(vbr)),
            Op::Stcssr => self.emit_stc(i, ctx_offset!(ssr)),
            Op::Stcspc => self.emit_stc(i, ctx_offset!(spc)),
            Op::Stcsgr => self.emit_stc(i, ctx_offset!(sgr)),
            Op::Stcdbr => self.emit_stc(i, ctx_offset!(dbr)),
            Op::Stcrbank => self.emit_stcrbank(i),
            Op::Stcmsr => self.emit_stcmsr(i),
            Op::Stcmgbr => self.emit_stcmgbr(i),
            Op::Stcmvbr => self.emit_stcm(i, ctx_offset!(vbr)),
            Op::Stcmssr => self.emit_stcm(i, ctx_offset!(ssr)),
            Op::Stcmspc => self.emit_stcm(i, ctx_offset!(spc)),
            Op::Stcmsgr => self.emit_stcm(i, ctx_offset!(sgr)),
            Op::Stcmdbr => self.emit_stcm(i, ctx_offset!(dbr)),
            Op::Stcmrbank => self.emit_stcmrbank(i),
            Op::Stsmach => self.emit_sts(i, ctx_offset!(mach)),
            Op::Stsmacl => self.emit_sts(i, ctx_offset!(macl)),
            Op::Stspr => self.emit_stspr(i),
            Op::Stsmmach => self.emit_stsm(i, ctx_offset!(mach)),
            Op::Stsmmacl => self.emit_stsm(i, ctx_offset!(macl)),
            Op::Stsmpr => self.emit_stsmpr(i),
            Op::Trapa => panic!("TRAPA not implemented"),
            Op::Fldi0 => self.emit_fldi(i, 0),
            Op::Fldi1 => self.emit_fldi(i, 0x3f80_0000),
            Op::Fmov => self.emit_fmov(i),
            Op::FmovLoad => self.emit_fmov_load(i),
            Op::FmovIndexLoad => self.emit_fmov_index_load(i),
            Op::FmovStore => self.emit_fmov_store(i),
            Op::FmovIndexStore => self.emit_fmov_index_store(i),
            Op::FmovSave => self.emit_fmov_save(i),
            Op::FmovRestore => self.emit_fmov_restore(i),
            Op::Flds => self.emit_flds(i),
            Op::Fsts => self.emit_fsts(i),
            Op::Fabs => self.emit_fabs(i),
            Op::Fsrra => self.emit_fsrra(i),
            Op::Fadd => self.emit_fbinop(i, FBinKind::Add),
            Op::Fcmpeq => self.emit_fcmp(i, true),
            Op::Fcmpgt => self.emit_fcmp(i, false),
            Op::Fdiv => self.emit_fbinop(i, FBinKind::Div),
            Op::Float => self.emit_float(i),
            Op::Fmac => self.emit_fmac(i),
            Op::Fmul => self.emit_fbinop(i, FBinKind::Mul),
            Op::Fneg => self.emit_fneg(i),
            Op::Fsqrt => self.emit_fsqrt(i),
            Op::Fsub => self.emit_fbinop(i, FBinKind::Sub),
            Op::Ftrc => self.emit_ftrc(i),
            Op::Fcnvds => self.emit_fcnvds(i),
            Op::Fcnvsd => self.emit_fcnvsd(i),
            Op::Ldsfpscr => self.emit_ldsfpscr(i),
            Op::Ldsfpul => self.emit_ldsfpul(i),
            Op::Ldsmfpscr => self.emit_ldsmfpscr(i),
            Op::Ldsmfpul => self.emit_ldsmfpul(i),
            Op::Stsfpscr => self.emit_stsfpscr(i),
            Op::Stsfpul => self.emit_stsfpul(i),
            Op::Stsmfpscr => self.emit_stsmfpscr(i),
            Op::Stsmfpul => self.emit_stsmfpul(i),
            Op::Fipr => self.emit_fipr(i),
            Op::Fsca => self.emit_fsca(i),
            Op::Ftrv => self.emit_ftrv(i),
            Op::Frchg => self.emit_frchg(i),
            Op::Fschg => self.emit_fschg(i),
        }
        Ok(())
    }

    //
    // data movement
    //

    // MOV #imm,Rn
    fn emit_movi(&mut self, i: &Instr) {
        let v = self.b.const_u32(i.imm as u8 as i8 as i32 as u32);
        self.store_gpr(i.rn, v);
    }

    // MOV.W @(disp,PC),Rn
    fn emit_movwlpc(&mut self, i: &Instr) {
        let addr = (i.disp as u32 * 2).wrapping_add(i.addr).wrapping_add(4);
        let addr = self.b.const_u32(addr);
        let v = self.b.load_guest(addr, Type::I16);
        let v = self.b.sext(v, Type::I32);
        self.store_gpr(i.rn, v);
    }

    // MOV.L @(disp,PC),Rn
    fn emit_movllpc(&mut self, i: &Instr) {
        let addr = (i.disp as u32 * 4)
            .wrapping_add(i.addr & !3)
            .wrapping_add(4);
        let addr = self.b.const_u32(addr);
        let v = self.b.load_guest(addr, Type::I32);
        self.store_gpr(i.rn, v);
    }

    // MOV Rm,Rn
    fn emit_mov(&mut self, i: &Instr) {
        let v = self.load_gpr(i.rm, Type::I32);
        self.store_gpr(i.rn, v);
    }

    // MOV.{B,W,L} Rm,@Rn
    fn emit_store_reg(&mut self, i: &Instr, ty: Type) {
        let addr = self.load_gpr(i.rn, Type::I32);
        let v = self.load_gpr(i.rm, ty);
        self.b.store_guest(addr, v);
    }

    // MOV.{B,W,L} @Rm,Rn
    fn emit_load_reg(&mut self, i: &Instr, ty: Type) {
        let addr = self.load_gpr(i.rm, Type::I32);
        let mut v = self.b.load_guest(addr, ty);
        if ty != Type::I32 {
            v = self.b.sext(v, Type::I32);
        }
        self.store_gpr(i.rn, v);
    }

    // MOV.{B,W,L} Rm,@-Rn
    fn emit_store_predec(&mut self, i: &Instr, ty: Type) {
        let addr = self.load_gpr(i.rn, Type::I32);
        let dec = self.b.const_u32(ty.size());
        let addr = self.b.sub(addr, dec);
        self.store_gpr(i.rn, addr);

        let v = self.load_gpr(i.rm, ty);
        self.b.store_guest(addr, v);
    }

    // MOV.{B,W,L} @Rm+,Rn
    fn emit_load_postinc(&mut self, i: &Instr, ty: Type) {
        let addr = self.load_gpr(i.rm, Type::I32);
        let mut v = self.b.load_guest(addr, ty);
        if ty != Type::I32 {
            v = self.b.sext(v, Type::I32);
        }
        self.store_gpr(i.rn, v);

        let inc = self.b.const_u32(ty.size());
        let addr = self.b.add(addr, inc);
        self.store_gpr(i.rm, addr);
    }

    // MOV.{B,W} R0,@(disp,Rn)
    fn emit_store_r0_disp(&mut self, i: &Instr, ty: Type, scale: u32) {
        let addr = self.load_gpr(i.rn, Type::I32);
        let disp = self.b.const_u32(i.disp as u32 * scale);
        let addr = self.b.add(addr, disp);
        let v = self.load_gpr(0, ty);
        self.b.store_guest(addr, v);
    }

    // MOV.L Rm,@(disp,Rn)
    fn emit_movlsmd(&mut self, i: &Instr) {
        let addr = self.load_gpr(i.rn, Type::I32);
        let disp = self.b.const_u32(i.disp as u32 * 4);
        let addr = self.b.add(addr, disp);
        let v = self.load_gpr(i.rm, Type::I32);
        self.b.store_guest(addr, v);
    }

    // MOV.{B,W} @(disp,Rm),R0
    fn emit_load_r0_disp(&mut self, i: &Instr, ty: Type, scale: u32) {
        let addr = self.load_gpr(i.rm, Type::I32);
        let disp = self.b.const_u32(i.disp as u32 * scale);
        let addr = self.b.add(addr, disp);
        let v = self.b.load_guest(addr, ty);
        let v = self.b.sext(v, Type::I32);
        self.store_gpr(0, v);
    }

    // MOV.L @(disp,Rm),Rn
    fn emit_movlldn(&mut self, i: &Instr) {
        let addr = self.load_gpr(i.rm, Type::I32);
        let disp = self.b.const_u32(i.disp as u32 * 4);
        let addr = self.b.add(addr, disp);
        let v = self.b.load_guest(addr, Type::I32);
        self.store_gpr(i.rn, v);
    }

    // MOV.{B,W,L} Rm,@(R0,Rn)
    fn emit_store_indexed(&mut self, i: &Instr, ty: Type) {
        let r0 = self.load_gpr(0, Type::I32);
        let rn = self.load_gpr(i.rn, Type::I32);
        let addr = self.b.add(r0, rn);
        let v = self.load_gpr(i.rm, ty);
        self.b.store_guest(addr, v);
    }

    // MOV.{B,W,L} @(R0,Rm),Rn
    fn emit_load_indexed(&mut self, i: &Instr, ty: Type) {
        let r0 = self.load_gpr(0, Type::I32);
        let rm = self.load_gpr(i.rm, Type::I32);
        let addr = self.b.add(r0, rm);
        let mut v = self.b.load_guest(addr, ty);
        if ty != Type::I32 {
            v = self.b.sext(v, Type::I32);
        }
        self.store_gpr(i.rn, v);
    }

    // MOV.{B,W,L} R0,@(disp,GBR)
    fn emit_store_gbr(&mut self, i: &Instr, ty: Type, scale: u32) {
        let addr = self.load_gbr();
        let disp = self.b.const_u32(i.disp as u32 * scale);
        let addr = self.b.add(addr, disp);
        let v = self.load_gpr(0, ty);
        self.b.store_guest(addr, v);
    }

    // MOV.{B,W,L} @(disp,GBR),R0
    fn emit_load_gbr(&mut self, i: &Instr, ty: Type, scale: u32) {
        let addr = self.load_gbr();
        let disp = self.b.const_u32(i.disp as u32 * scale);
        let addr = self.b.add(addr, disp);
        let mut v = self.b.load_guest(addr, ty);
        if ty != Type::I32 {
            v = self.b.sext(v, Type::I32);
        }
        self.store_gpr(0, v);
    }

    // MOVA (disp,PC),R0
    fn emit_mova(&mut self, i: &Instr) {
        let addr = (i.disp as u32 * 4)
            .wrapping_add(i.addr & !3)
            .wrapping_add(4);
        let addr = self.b.const_u32(addr);
        self.store_gpr(0, addr);
    }

    // MOVT Rn
    fn emit_movt(&mut self, i: &Instr) {
        let t = self.load_t();
        self.store_gpr(i.rn, t);
    }

    // SWAP.B / SWAP.W Rm,Rn
    fn emit_swap(&mut self, i: &Instr, nbits: i32) {
        let v = self.load_gpr(i.rm, Type::I32);
        let mask = self.b.const_u32((1u32 << nbits) - 1);
        let shr = self.b.lshr_imm(v, nbits);
        let x = self.b.xor(v, shr);
        let tmp = self.b.and(x, mask);
        let shl = self.b.shl_imm(tmp, nbits);
        let swap = self.b.or(tmp, shl);
        let res = self.b.xor(v, swap);
        self.store_gpr(i.rn, res);
    }

    // XTRCT Rm,Rn
    fn emit_xtrct(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let hi_mask = self.b.const_u32(0xffff_0000);
        let rn = self.b.and(rn, hi_mask);
        let rn = self.b.lshr_imm(rn, 16);

        let rm = self.load_gpr(i.rm, Type::I32);
        let lo_mask = self.b.const_u32(0xffff);
        let rm = self.b.and(rm, lo_mask);
        let rm = self.b.shl_imm(rm, 16);

        let v = self.b.or(rn, rm);
        self.store_gpr(i.rn, v);
    }

    // MOVCA.L R0,@Rn
    fn emit_movcal(&mut self, i: &Instr) {
        let addr = self.load_gpr(i.rn, Type::I32);
        let r0 = self.load_gpr(0, Type::I32);
        self.b.store_guest(addr, r0);
    }

    //
    // integer arithmetic
    //

    fn emit_add(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let rm = self.load_gpr(i.rm, Type::I32);
        let v = self.b.add(rn, rm);
        self.store_gpr(i.rn, v);
    }

    fn emit_addi(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let imm = self.b.const_u32(i.imm as u8 as i8 as i32 as u32);
        let v = self.b.add(rn, imm);
        self.store_gpr(i.rn, v);
    }

    // ADDC Rm,Rn, carry to T (Hacker's Delight)
    fn emit_addc(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let rm = self.load_gpr(i.rm, Type::I32);
        let v = self.b.add(rn, rm);
        let t = self.load_t();
        let v = self.b.add(v, t);
        self.store_gpr(i.rn, v);

        let and_rnrm = self.b.and(rn, rm);
        let or_rnrm = self.b.or(rn, rm);
        let not_v = self.b.not(v);
        let carry = self.b.and(or_rnrm, not_v);
        let carry = self.b.or(and_rnrm, carry);
        let carry = self.b.lshr_imm(carry, 31);
        self.store_t(carry);
    }

    // ADDV Rm,Rn, overflow to T
    fn emit_addv(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let rm = self.load_gpr(i.rm, Type::I32);
        let v = self.b.add(rn, rm);
        self.store_gpr(i.rn, v);

        let xor_vrn = self.b.xor(v, rn);
        let xor_vrm = self.b.xor(v, rm);
        let overflow = self.b.and(xor_vrn, xor_vrm);
        let overflow = self.b.lshr_imm(overflow, 31);
        self.store_t(overflow);
    }

    fn emit_sub(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let rm = self.load_gpr(i.rm, Type::I32);
        let v = self.b.sub(rn, rm);
        self.store_gpr(i.rn, v);
    }

    // SUBC Rm,Rn, borrow to T
    fn emit_subc(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let rm = self.load_gpr(i.rm, Type::I32);
        let v = self.b.sub(rn, rm);
        let t = self.load_t();
        let v = self.b.sub(v, t);
        self.store_gpr(i.rn, v);

        let not_rn = self.b.not(rn);
        let l = self.b.and(not_rn, rm);
        let or_nm = self.b.or(not_rn, rm);
        let r = self.b.and(or_nm, v);
        let carry = self.b.or(l, r);
        let carry = self.b.lshr_imm(carry, 31);
        self.store_t(carry);
    }

    // SUBV Rm,Rn, underflow to T
    fn emit_subv(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let rm = self.load_gpr(i.rm, Type::I32);
        let v = self.b.sub(rn, rm);
        self.store_gpr(i.rn, v);

        let xor_rnrm = self.b.xor(rn, rm);
        let xor_vrn = self.b.xor(v, rn);
        let overflow = self.b.and(xor_rnrm, xor_vrn);
        let overflow = self.b.lshr_imm(overflow, 31);
        self.store_t(overflow);
    }

    fn emit_neg(&mut self, i: &Instr) {
        let rm = self.load_gpr(i.rm, Type::I32);
        let v = self.b.neg(rm);
        self.store_gpr(i.rn, v);
    }

    fn emit_negc(&mut self, i: &Instr) {
        let rm = self.load_gpr(i.rm, Type::I32);
        let t = self.load_t();
        let neg = self.b.neg(rm);
        let v = self.b.sub(neg, t);
        self.store_gpr(i.rn, v);
        let carry = self.b.or(t, rm);
        self.store_t(carry);
    }

    fn emit_dt(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let one = self.b.const_i32(1);
        let v = self.b.sub(rn, one);
        self.store_gpr(i.rn, v);
        let zero = self.b.const_i32(0);
        let eq = self.b.cmp_eq(v, zero);
        self.store_t(eq);
    }

    fn emit_ext(&mut self, i: &Instr, from: Type, signed: bool) {
        let rm = self.load_gpr(i.rm, from);
        let v = if signed {
            self.b.sext(rm, Type::I32)
        } else {
            self.b.zext(rm, Type::I32)
        };
        self.store_gpr(i.rn, v);
    }

    // MUL.L Rm,Rn
    fn emit_mull(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let rm = self.load_gpr(i.rm, Type::I32);
        let v = self.b.smul(rn, rm);
        self.b.store_context(ctx_offset!(macl), v);
    }

    // MULS.W / MULU.W Rm,Rn
    fn emit_mulw(&mut self, i: &Instr, signed: bool) {
        let rn = self.load_gpr(i.rn, Type::I16);
        let rm = self.load_gpr(i.rm, Type::I16);
        let v = if signed {
            let rn = self.b.sext(rn, Type::I32);
            let rm = self.b.sext(rm, Type::I32);
            self.b.smul(rn, rm)
        } else {
            let rn = self.b.zext(rn, Type::I32);
            let rm = self.b.zext(rm, Type::I32);
            self.b.umul(rn, rm)
        };
        self.b.store_context(ctx_offset!(macl), v);
    }

    // DMULS.L / DMULU.L Rm,Rn
    fn emit_dmul(&mut self, i: &Instr, signed: bool) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let rm = self.load_gpr(i.rm, Type::I32);
        let p = if signed {
            let rn = self.b.sext(rn, Type::I64);
            let rm = self.b.sext(rm, Type::I64);
            self.b.smul(rm, rn)
        } else {
            let rn = self.b.zext(rn, Type::I64);
            let rm = self.b.zext(rm, Type::I64);
            self.b.umul(rm, rn)
        };
        let low = self.b.truncate(p, Type::I32);
        let hi64 = self.b.lshr_imm(p, 32);
        let high = self.b.truncate(hi64, Type::I32);
        self.b.store_context(ctx_offset!(macl), low);
        self.b.store_context(ctx_offset!(mach), high);
    }

    fn emit_clrmac(&mut self, _i: &Instr) {
        let zero = self.b.const_i32(0);
        self.b.store_context(ctx_offset!(mach), zero);
        self.b.store_context(ctx_offset!(macl), zero);
    }

    //
    // comparisons
    //

    fn emit_cmpeqi(&mut self, i: &Instr) {
        let imm = self.b.const_u32(i.imm as u8 as i8 as i32 as u32);
        let r0 = self.load_gpr(0, Type::I32);
        let v = self.b.cmp_eq(r0, imm);
        self.store_t(v);
    }

    fn emit_cmp(&mut self, i: &Instr, kind: CmpKind) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let rm = self.load_gpr(i.rm, Type::I32);
        let v = match kind {
            CmpKind::Eq => self.b.cmp_eq(rn, rm),
            CmpKind::Uge => self.b.cmp_uge(rn, rm),
            CmpKind::Sge => self.b.cmp_sge(rn, rm),
            CmpKind::Ugt => self.b.cmp_ugt(rn, rm),
            CmpKind::Sgt => self.b.cmp_sgt(rn, rm),
        };
        self.store_t(v);
    }

    fn emit_cmppz(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let zero = self.b.const_i32(0);
        let v = self.b.cmp_sge(rn, zero);
        self.store_t(v);
    }

    fn emit_cmppl(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let zero = self.b.const_i32(0);
        let v = self.b.cmp_sgt(rn, zero);
        self.store_t(v);
    }

    // CMP/STR Rm,Rn: T set if any byte matches
    fn emit_cmpstr(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let rm = self.load_gpr(i.rm, Type::I32);
        let diff = self.b.xor(rn, rm);

        let zero = self.b.const_u32(0);
        let mut any = None;
        for mask in [0xff00_0000u32, 0x00ff_0000, 0x0000_ff00, 0x0000_00ff] {
            let m = self.b.const_u32(mask);
            let byte = self.b.and(diff, m);
            let eq = self.b.cmp_eq(byte, zero);
            any = Some(match any {
                None => eq,
                Some(prev) => self.b.or(prev, eq),
            });
        }
        self.store_t(any.unwrap());
    }

    //
    // division steps
    //

    fn emit_div0s(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let rm = self.load_gpr(i.rm, Type::I32);
        let qm = self.b.xor(rn, rm);

        // sr_qm MSB tracks Q == M
        let not_qm = self.b.not(qm);
        self.b.store_context(ctx_offset!(sr_qm), not_qm);

        // msb of Q ^ M -> T
        let t = self.b.lshr_imm(qm, 31);
        self.store_t(t);
    }

    fn emit_div0u(&mut self, _i: &Instr) {
        let qm = self.b.const_u32(0x8000_0000);
        self.b.store_context(ctx_offset!(sr_qm), qm);

        let sr = self.load_sr();
        let not_t = self.b.const_u32(!SR_T);
        let sr = self.b.and(sr, not_t);
        self.store_sr(sr);
    }

    // DIV1 Rm,Rn: one branchless non-restoring division step
    fn emit_div1(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let rm = self.load_gpr(i.rm, Type::I32);

        // if Q == M, r0 = ~Rm and C = 1; else r0 = Rm and C = 0
        let qm_word = self.b.load_context(ctx_offset!(sr_qm), Type::I32);
        let qm = self.b.ashr_imm(qm_word, 31);
        let r0 = self.b.xor(rm, qm);
        let carry = self.b.lshr_imm(qm, 31);

        // initialize the output bit as (Q == M) ^ Rn
        let qm = self.b.xor(qm, rn);

        // shift Rn left by 1 and add T
        let rn = self.b.shl_imm(rn, 1);
        let t = self.load_t();
        let rn = self.b.or(rn, t);

        // add or subtract Rm based on r0 and C
        let rd = self.b.add(rn, r0);
        let rd = self.b.add(rd, carry);
        self.store_gpr(i.rn, rd);

        // if C is cleared, invert the output bit
        let and_rnr0 = self.b.and(rn, r0);
        let or_rnr0 = self.b.or(rn, r0);
        let not_rd = self.b.not(rd);
        let carry = self.b.and(or_rnr0, not_rd);
        let carry = self.b.or(and_rnr0, carry);
        let carry = self.b.lshr_imm(carry, 31);
        let not_qm = self.b.not(qm);
        let qm = self.b.select(carry, qm, not_qm);
        self.b.store_context(ctx_offset!(sr_qm), qm);

        // T gets the output bit (which happens to be Q == M)
        let t = self.b.lshr_imm(qm, 31);
        self.store_t(t);
    }

    //
    // logic
    //

    fn emit_logic(&mut self, i: &Instr, kind: LogicKind) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let rm = self.load_gpr(i.rm, Type::I32);
        let v = match kind {
            LogicKind::And => self.b.and(rn, rm),
            LogicKind::Or => self.b.or(rn, rm),
            LogicKind::Xor => self.b.xor(rn, rm),
        };
        self.store_gpr(i.rn, v);
    }

    fn emit_logic_imm(&mut self, i: &Instr, kind: LogicKind) {
        let r0 = self.load_gpr(0, Type::I32);
        let imm = self.b.const_u32(i.imm as u32);
        let v = match kind {
            LogicKind::And => self.b.and(r0, imm),
            LogicKind::Or => self.b.or(r0, imm),
            LogicKind::Xor => self.b.xor(r0, imm),
        };
        self.store_gpr(0, v);
    }

    // AND.B / OR.B / XOR.B #imm,@(R0,GBR)
    fn emit_logic_byte(&mut self, i: &Instr, kind: LogicKind) {
        let r0 = self.load_gpr(0, Type::I32);
        let gbr = self.load_gbr();
        let addr = self.b.add(r0, gbr);
        let v = self.b.load_guest(addr, Type::I8);
        let imm = self.b.const_i8(i.imm as u8 as i8);
        let v = match kind {
            LogicKind::And => self.b.and(v, imm),
            LogicKind::Or => self.b.or(v, imm),
            LogicKind::Xor => self.b.xor(v, imm),
        };
        self.b.store_guest(addr, v);
    }

    fn emit_not(&mut self, i: &Instr) {
        let rm = self.load_gpr(i.rm, Type::I32);
        let v = self.b.not(rm);
        self.store_gpr(i.rn, v);
    }

    // TAS.B @Rn
    fn emit_tas(&mut self, i: &Instr) {
        let addr = self.load_gpr(i.rn, Type::I32);
        let v = self.b.load_guest(addr, Type::I8);
        let msb = self.b.const_i8(0x80u8 as i8);
        let set = self.b.or(v, msb);
        self.b.store_guest(addr, set);
        let zero = self.b.const_i8(0);
        let eq = self.b.cmp_eq(v, zero);
        self.store_t(eq);
    }

    fn emit_tst(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let rm = self.load_gpr(i.rm, Type::I32);
        let v = self.b.and(rn, rm);
        let zero = self.b.const_u32(0);
        let eq = self.b.cmp_eq(v, zero);
        self.store_t(eq);
    }

    fn emit_tsti(&mut self, i: &Instr) {
        let r0 = self.load_gpr(0, Type::I32);
        let imm = self.b.const_u32(i.imm as u32);
        let v = self.b.and(r0, imm);
        let zero = self.b.const_u32(0);
        let eq = self.b.cmp_eq(v, zero);
        self.store_t(eq);
    }

    // TST.B #imm,@(R0,GBR)
    fn emit_tstb(&mut self, i: &Instr) {
        let r0 = self.load_gpr(0, Type::I32);
        let gbr = self.load_gbr();
        let addr = self.b.add(r0, gbr);
        let data = self.b.load_guest(addr, Type::I8);
        let imm = self.b.const_i8(i.imm as u8 as i8);
        let v = self.b.and(data, imm);
        let zero = self.b.const_i8(0);
        let eq = self.b.cmp_eq(v, zero);
        self.store_t(eq);
    }

    //
    // shifts and rotates
    //

    fn emit_rotl(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let msb = self.b.lshr_imm(rn, 31);
        let one = self.b.const_u32(1);
        let msb = self.b.and(msb, one);
        let shl = self.b.shl_imm(rn, 1);
        let v = self.b.or(shl, msb);
        self.store_gpr(i.rn, v);
        self.store_t(msb);
    }

    fn emit_rotr(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let one = self.b.const_u32(1);
        let lsb = self.b.and(rn, one);
        let hi = self.b.shl_imm(lsb, 31);
        let shr = self.b.lshr_imm(rn, 1);
        let v = self.b.or(hi, shr);
        self.store_gpr(i.rn, v);
        self.store_t(lsb);
    }

    fn emit_rotcl(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let msb = self.b.lshr_imm(rn, 31);
        let one = self.b.const_u32(1);
        let msb = self.b.and(msb, one);
        let shl = self.b.shl_imm(rn, 1);
        let t = self.load_t();
        let v = self.b.or(shl, t);
        self.store_gpr(i.rn, v);
        self.store_t(msb);
    }

    fn emit_rotcr(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let one = self.b.const_u32(1);
        let lsb = self.b.and(rn, one);
        let t = self.load_t();
        let hi = self.b.shl_imm(t, 31);
        let shr = self.b.lshr_imm(rn, 1);
        let v = self.b.or(hi, shr);
        self.store_gpr(i.rn, v);
        self.store_t(lsb);
    }

    fn emit_shad(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let rm = self.load_gpr(i.rm, Type::I32);
        let v = self.b.ashd(rn, rm);
        self.store_gpr(i.rn, v);
    }

    fn emit_shld(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let rm = self.load_gpr(i.rm, Type::I32);
        let v = self.b.lshd(rn, rm);
        self.store_gpr(i.rn, v);
    }

    fn emit_shll(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let msb = self.b.lshr_imm(rn, 31);
        let one = self.b.const_u32(1);
        let msb = self.b.and(msb, one);
        let v = self.b.shl_imm(rn, 1);
        self.store_gpr(i.rn, v);
        self.store_t(msb);
    }

    fn emit_shar(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let one = self.b.const_u32(1);
        let lsb = self.b.and(rn, one);
        let v = self.b.ashr_imm(rn, 1);
        self.store_gpr(i.rn, v);
        self.store_t(lsb);
    }

    fn emit_shlr(&mut self, i: &Instr) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let one = self.b.const_u32(1);
        let lsb = self.b.and(rn, one);
        let v = self.b.lshr_imm(rn, 1);
        self.store_gpr(i.rn, v);
        self.store_t(lsb);
    }

    fn emit_shift_fixed(&mut self, i: &Instr, n: i32, left: bool) {
        let rn = self.load_gpr(i.rn, Type::I32);
        let v = if left {
            self.b.shl_imm(rn, n)
        } else {
            self.b.lshr_imm(rn, n)
        };
        self.store_gpr(i.rn, v);
    }

    //
    // branches
    //

    fn emit_bf(&mut self, i: &Instr) {
        let dest = (i.disp as u8 as i8 as i32 * 2)
            .wrapping_add(i.addr as i32)
            .wrapping_add(4) as u32;
        let cond = self.load_t();
        let taken = self.b.const_u32(i.addr.wrapping_add(2));
        let not_taken = self.b.const_u32(dest);
        self.branch_cond(cond, taken, not_taken);
    }

    fn emit_bfs(&mut self, i: &Instr) -> Result<(), BlockEnd> {
        let cond = self.load_t();
        self.emit_delay_slot(i)?;
        let dest = (i.disp as u8 as i8 as i32 * 2)
            .wrapping_add(i.addr as i32)
            .wrapping_add(4) as u32;
        let taken = self.b.const_u32(i.addr.wrapping_add(4));
        let not_taken = self.b.const_u32(dest);
        self.branch_cond(cond, taken, not_taken);
        Ok(())
    }

    fn emit_bt(&mut self, i: &Instr) {
        let dest = (i.disp as u8 as i8 as i32 * 2)
            .wrapping_add(i.addr as i32)
            .wrapping_add(4) as u32;
        let cond = self.load_t();
        let taken = self.b.const_u32(dest);
        let not_taken = self.b.const_u32(i.addr.wrapping_add(2));
        self.branch_cond(cond, taken, not_taken);
    }

    fn emit_bts(&mut self, i: &Instr) -> Result<(), BlockEnd> {
        let cond = self.load_t();
        self.emit_delay_slot(i)?;
        let dest = (i.disp as u8 as i8 as i32 * 2)
            .wrapping_add(i.addr as i32)
            .wrapping_add(4) as u32;
        let taken = self.b.const_u32(dest);
        let not_taken = self.b.const_u32(i.addr.wrapping_add(4));
        self.branch_cond(cond, taken, not_taken);
        Ok(())
    }

    fn emit_bra(&mut self, i: &Instr) -> Result<(), BlockEnd> {
        self.emit_delay_slot(i)?;
        // 12-bit displacement must be sign extended
        let disp = ((i.disp as i32 & 0xfff) << 20) >> 20;
        let dest = (disp * 2).wrapping_add(i.addr as i32).wrapping_add(4) as u32;
        self.branch_const(dest);
        Ok(())
    }

    fn emit_braf(&mut self, i: &Instr) -> Result<(), BlockEnd> {
        let rn = self.load_gpr(i.rn, Type::I32);
        self.emit_delay_slot(i)?;
        let base = self.b.const_u32(i.addr.wrapping_add(4));
        let dest = self.b.add(base, rn);
        self.branch(dest);
        Ok(())
    }

    fn emit_bsr(&mut self, i: &Instr) -> Result<(), BlockEnd> {
        self.emit_delay_slot(i)?;
        let disp = ((i.disp as i32 & 0xfff) << 20) >> 20;
        let ret = i.addr.wrapping_add(4);
        let dest = ret.wrapping_add((disp * 2) as u32);
        let ret = self.b.const_u32(ret);
        self.store_pr(ret);
        self.branch_const(dest);
        Ok(())
    }

    fn emit_bsrf(&mut self, i: &Instr) -> Result<(), BlockEnd> {
        let rn = self.load_gpr(i.rn, Type::I32);
        self.emit_delay_slot(i)?;
        let ret = self.b.const_u32(i.addr.wrapping_add(4));
        let dest = self.b.add(rn, ret);
        self.store_pr(ret);
        self.branch(dest);
        Ok(())
    }

    fn emit_jmp(&mut self, i: &Instr) -> Result<(), BlockEnd> {
        let dest = self.load_gpr(i.rn, Type::I32);
        self.emit_delay_slot(i)?;
        self.branch(dest);
        Ok(())
    }

    fn emit_jsr(&mut self, i: &Instr) -> Result<(), BlockEnd> {
        let dest = self.load_gpr(i.rn, Type::I32);
        self.emit_delay_slot(i)?;
        let ret = self.b.const_u32(i.addr.wrapping_add(4));
        self.store_pr(ret);
        self.branch(dest);
        Ok(())
    }

    fn emit_rts(&mut self, i: &Instr) -> Result<(), BlockEnd> {
        let dest = self.load_pr();
        self.emit_delay_slot(i)?;
        self.branch(dest);
        Ok(())
    }

    fn emit_rte(&mut self, i: &Instr) -> Result<(), BlockEnd> {
        let spc = self.b.load_context(ctx_offset!(spc), Type::I32);
        let ssr = self.b.load_context(ctx_offset!(ssr), Type::I32);
        self.store_sr(ssr);
        self.emit_delay_slot(i)?;
        self.branch(spc);
        Ok(())
    }

    //
    // system registers
    //

    fn emit_clrs(&mut self, _i: &Instr) {
        let sr = self.load_sr();
        let mask = self.b.const_u32(!SR_S);
        let sr = self.b.and(sr, mask);
        self.store_sr(sr);
    }

    fn emit_clrt(&mut self, _i: &Instr) {
        let zero = self.b.const_i32(0);
        self.store_t(zero);
    }

    fn emit_sets(&mut self, _i: &Instr) {
        let sr = self.load_sr();
        let s = self.b.const_u32(SR_S);
        let sr = self.b.or(sr, s);
        self.store_sr(sr);
    }

    fn emit_sett(&mut self, _i: &Instr) {
        let one = self.b.const_i32(1);
        self.store_t(one);
    }

    fn emit_ldcsr(&mut self, i: &Instr) {
        let rm = self.load_gpr(i.rm, Type::I32);
        self.store_sr(rm);
    }

    fn emit_ldcgbr(&mut self, i: &Instr) {
        let rm = self.load_gpr(i.rm, Type::I32);
        self.store_gbr(rm);
    }

    fn emit_ldc(&mut self, i: &Instr, offset: u32) {
        let rm = self.load_gpr(i.rm, Type::I32);
        self.b.store_context(offset, rm);
    }

    fn emit_ldcrbank(&mut self, i: &Instr) {
        let reg = i.rn & 0x7;
        let rm = self.load_gpr(i.rm, Type::I32);
        self.b.store_context(ctx_offset!(ralt[reg]), rm);
    }

    fn emit_ldcmsr(&mut self, i: &Instr) {
        let addr = self.load_gpr(i.rm, Type::I32);
        let v = self.b.load_guest(addr, Type::I32);
        self.store_sr(v);
        // reload Rm, the sr store could have swapped banks
        let addr = self.load_gpr(i.rm, Type::I32);
        let four = self.b.const_u32(4);
        let addr = self.b.add(addr, four);
        self.store_gpr(i.rm, addr);
    }

    fn emit_ldcmgbr(&mut self, i: &Instr) {
        let addr = self.load_gpr(i.rm, Type::I32);
        let v = self.b.load_guest(addr, Type::I32);
        self.store_gbr(v);
        let four = self.b.const_u32(4);
        let addr = self.b.add(addr, four);
        self.store_gpr(i.rm, addr);
    }

    fn emit_ldcm(&mut self, i: &Instr, offset: u32) {
        let addr = self.load_gpr(i.rm, Type::I32);
        let v = self.b.load_guest(addr, Type::I32);
        self.b.store_context(offset, v);
        let four = self.b.const_u32(4);
        let addr = self.b.add(addr, four);
        self.store_gpr(i.rm, addr);
    }

    fn emit_ldcmrbank(&mut self, i: &Instr) {
        let reg = i.rn & 0x7;
        let addr = self.load_gpr(i.rm, Type::I32);
        let four = self.b.const_u32(4);
        let next = self.b.add(addr, four);
        self.store_gpr(i.rm, next);
        let v = self.b.load_guest(addr, Type::I32);
        self.b.store_context(ctx_offset!(ralt[reg]), v);
    }

    fn emit_lds(&mut self, i: &Instr, offset: u32) {
        let rm = self.load_gpr(i.rm, Type::I32);
        self.b.store_context(offset, rm);
    }

    fn emit_ldspr(&mut self, i: &Instr) {
        let rm = self.load_gpr(i.rm, Type::I32);
        self.store_pr(rm);
    }

    fn emit_ldsm(&mut self, i: &Instr, offset: u32) {
        let addr = self.load_gpr(i.rm, Type::I32);
        let v = self.b.load_guest(addr, Type::I32);
        self.b.store_context(offset, v);
        let four = self.b.const_u32(4);
        let addr = self.b.add(addr, four);
        self.store_gpr(i.rm, addr);
    }

    fn emit_ldsmpr(&mut self, i: &Instr) {
        let addr = self.load_gpr(i.rm, Type::I32);
        let v = self.b.load_guest(addr, Type::I32);
        self.store_pr(v);
        let four = self.b.const_u32(4);
        let addr = self.b.add(addr, four);
        self.store_gpr(i.rm, addr);
    }

    fn emit_stcsr(&mut self, i: &Instr) {
        let v = self.load_sr();
        self.store_gpr(i.rn, v);
    }

    fn emit_stcgbr(&mut self, i: &Instr) {
        let v = self.load_gbr();
        self.store_gpr(i.rn, v);
    }

    fn emit_stc(&mut self, i: &Instr, offset: u32) {
        let v = self.b.load_context(offset, Type::I32);
        self.store_gpr(i.rn, v);
    }

    fn emit_stcrbank(&mut self, i: &Instr) {
        let reg = i.rm & 0x7;
        let v = self.b.load_context(ctx_offset!(ralt[reg]), Type::I32);
        self.store_gpr(i.rn, v);
    }

    fn predec_addr(&mut self, n: usize) -> ValueId {
        let rn = self.load_gpr(n, Type::I32);
        let four = self.b.const_u32(4);
        let addr = self.b.sub(rn, four);
        self.store_gpr(n, addr);
        addr
    }

    fn emit_stcmsr(&mut self, i: &Instr) {
        let addr = self.predec_addr(i.rn);
        let v = self.load_sr();
        self.b.store_guest(addr, v);
    }

    fn emit_stcmgbr(&mut self, i: &Instr) {
        let addr = self.predec_addr(i.rn);
        let v = self.load_gbr();
        self.b.store_guest(addr, v);
    }

    fn emit_stcm(&mut self, i: &Instr, offset: u32) {
        let addr = self.predec_addr(i.rn);
        let v = self.b.load_context(offset, Type::I32);
        self.b.store_guest(addr, v);
    }

    fn emit_stcmrbank(&mut self, i: &Instr) {
        let reg = i.rm & 0x7;
        let addr = self.predec_addr(i.rn);
        let v = self.b.load_context(ctx_offset!(ralt[reg]), Type::I32);
        self.b.store_guest(addr, v);
    }

    fn emit_sts(&mut self, i: &Instr, offset: u32) {
        let v = self.b.load_context(offset, Type::I32);
        self.store_gpr(i.rn, v);
    }

    fn emit_stspr(&mut self, i: &Instr) {
        let v = self.load_pr();
        self.store_gpr(i.rn, v);
    }

    fn emit_stsm(&mut self, i: &Instr, offset: u32) {
        let addr = self.predec_addr(i.rn);
        let v = self.b.load_context(offset, Type::I32);
        self.b.store_guest(addr, v);
    }

    fn emit_stsmpr(&mut self, i: &Instr) {
        let addr = self.predec_addr(i.rn);
        let v = self.load_pr();
        self.b.store_guest(addr, v);
    }

    // PREF @Rn: forwarded to the host hook, which performs the store-queue
    // flush into TA/DMA space for addresses in 0xe0000000..=0xe3ffffff
    fn emit_pref(&mut self, i: &Instr) {
        let hook = self.b.load_context(ctx_offset!(prefetch), Type::I64);
        let addr = self.load_gpr(i.rn, Type::I32);
        let addr = self.b.zext(addr, Type::I64);
        self.b.call_external2(hook, addr);
    }

    //
    // floating point
    //

    fn emit_fldi(&mut self, i: &Instr, bits: u32) {
        let v = self.b.const_u32(bits);
        self.store_fpr(i.rn, v);
    }

    // FMOV FRm,FRn / DRm,DRn / XDm,DRn / DRm,XDn / XDm,XDn
    fn emit_fmov(&mut self, i: &Instr) {
        if self.fpu.double_sz {
            let rm = if i.rm & 1 != 0 {
                self.load_xfr(i.rm & 0xe, Type::I64)
            } else {
                self.load_fpr(i.rm, Type::I64)
            };
            if i.rn & 1 != 0 {
                self.store_xfr(i.rn & 0xe, rm);
            } else {
                self.store_fpr(i.rn, rm);
            }
        } else {
            let v = self.load_fpr(i.rm, Type::I32);
            self.store_fpr(i.rn, v);
        }
    }

    fn fmov_load_pair(&mut self, i: &Instr, addr: ValueId) {
        let v_low = self.b.load_guest(addr, Type::I32);
        let four = self.b.const_u32(4);
        let addr_high = self.b.add(addr, four);
        let v_high = self.b.load_guest(addr_high, Type::I32);
        if i.rn & 1 != 0 {
            self.store_xfr(i.rn & 0xe, v_low);
            self.store_xfr(i.rn, v_high);
        } else {
            self.store_fpr(i.rn, v_low);
            self.store_fpr(i.rn | 1, v_high);
        }
    }

    fn fmov_store_pair(&mut self, i: &Instr, addr: ValueId) {
        let four = self.b.const_u32(4);
        let addr_high = self.b.add(addr, four);
        let (low, high) = if i.rm & 1 != 0 {
            (
                self.load_xfr(i.rm & 0xe, Type::I32),
                self.load_xfr(i.rm, Type::I32),
            )
        } else {
            (
                self.load_fpr(i.rm, Type::I32),
                self.load_fpr(i.rm | 1, Type::I32),
            )
        };
        self.b.store_guest(addr, low);
        self.b.store_guest(addr_high, high);
    }

    // FMOV.S @Rm,FRn / FMOV @Rm,DRn / FMOV @Rm,XDn
    fn emit_fmov_load(&mut self, i: &Instr) {
        let addr = self.load_gpr(i.rm, Type::I32);
        if self.fpu.double_sz {
            self.fmov_load_pair(i, addr);
        } else {
            let v = self.b.load_guest(addr, Type::I32);
            self.store_fpr(i.rn, v);
        }
    }

    // FMOV.S @(R0,Rm),FRn
    fn emit_fmov_index_load(&mut self, i: &Instr) {
        let r0 = self.load_gpr(0, Type::I32);
        let rm = self.load_gpr(i.rm, Type::I32);
        let addr = self.b.add(r0, rm);
        if self.fpu.double_sz {
            self.fmov_load_pair(i, addr);
        } else {
            let v = self.b.load_guest(addr, Type::I32);
            self.store_fpr(i.rn, v);
        }
    }

    // FMOV.S FRm,@Rn
    fn emit_fmov_store(&mut self, i: &Instr) {
        let addr = self.load_gpr(i.rn, Type::I32);
        if self.fpu.double_sz {
            self.fmov_store_pair(i, addr);
        } else {
            let v = self.load_fpr(i.rm, Type::I32);
            self.b.store_guest(addr, v);
        }
    }

    // FMOV.S FRm,@(R0,Rn)
    fn emit_fmov_index_store(&mut self, i: &Instr) {
        let r0 = self.load_gpr(0, Type::I32);
        let rn = self.load_gpr(i.rn, Type::I32);
        let addr = self.b.add(r0, rn);
        if self.fpu.double_sz {
            self.fmov_store_pair(i, addr);
        } else {
            let v = self.load_fpr(i.rm, Type::I32);
            self.b.store_guest(addr, v);
        }
    }

    // FMOV.S FRm,@-Rn
    fn emit_fmov_save(&mut self, i: &Instr) {
        if self.fpu.double_sz {
            let rn = self.load_gpr(i.rn, Type::I32);
            let eight = self.b.const_u32(8);
            let addr = self.b.sub(rn, eight);
            self.store_gpr(i.rn, addr);
            self.fmov_store_pair(i, addr);
        } else {
            let rn = self.load_gpr(i.rn, Type::I32);
            let four = self.b.const_u32(4);
            let addr = self.b.sub(rn, four);
            self.store_gpr(i.rn, addr);
            let v = self.load_fpr(i.rm, Type::I32);
            self.b.store_guest(addr, v);
        }
    }

    // FMOV.S @Rm+,FRn
    fn emit_fmov_restore(&mut self, i: &Instr) {
        let addr = self.load_gpr(i.rm, Type::I32);
        if self.fpu.double_sz {
            self.fmov_load_pair(i, addr);
            let eight = self.b.const_u32(8);
            let next = self.b.add(addr, eight);
            self.store_gpr(i.rm, next);
        } else {
            let v = self.b.load_guest(addr, Type::I32);
            self.store_fpr(i.rn, v);
            let four = self.b.const_u32(4);
            let next = self.b.add(addr, four);
            self.store_gpr(i.rm, next);
        }
    }

    fn emit_flds(&mut self, i: &Instr) {
        let v = self.load_fpr(i.rm, Type::I32);
        self.b.store_context(ctx_offset!(fpul), v);
    }

    fn emit_fsts(&mut self, i: &Instr) {
        let fpul = self.b.load_context(ctx_offset!(fpul), Type::I32);
        self.store_fpr(i.rn, fpul);
    }

    fn emit_fabs(&mut self, i: &Instr) {
        if self.fpu.double_pr {
            let n = i.rn & 0xe;
            let v = self.load_fpr(n, Type::F64);
            let v = self.b.fabs(v);
            self.store_fpr(n, v);
        } else {
            let v = self.load_fpr(i.rn, Type::F32);
            let v = self.b.fabs(v);
            self.store_fpr(i.rn, v);
        }
    }

    // FSRRA FRn: 1 / sqrt(FRn)
    fn emit_fsrra(&mut self, i: &Instr) {
        let frn = self.load_fpr(i.rn, Type::F32);
        let one = self.b.const_f32(1.0);
        let root = self.b.sqrt(frn);
        let v = self.b.fdiv(one, root);
        self.store_fpr(i.rn, v);
    }

    fn emit_fbinop(&mut self, i: &Instr, kind: FBinKind) {
        if self.fpu.double_pr {
            let n = i.rn & 0xe;
            let m = i.rm & 0xe;
            let drn = self.load_fpr(n, Type::F64);
            let drm = self.load_fpr(m, Type::F64);
            let v = self.apply_fbin(kind, drn, drm);
            self.store_fpr(n, v);
        } else {
            let frn = self.load_fpr(i.rn, Type::F32);
            let frm = self.load_fpr(i.rm, Type::F32);
            let v = self.apply_fbin(kind, frn, frm);
            self.store_fpr(i.rn, v);
        }
    }

    fn apply_fbin(&mut self, kind: FBinKind, a: ValueId, b: ValueId) -> ValueId {
        match kind {
            FBinKind::Add => self.b.fadd(a, b),
            FBinKind::Sub => self.b.fsub(a, b),
            FBinKind::Mul => self.b.fmul(a, b),
            FBinKind::Div => self.b.fdiv(a, b),
        }
    }

    fn emit_fcmp(&mut self, i: &Instr, eq: bool) {
        let v = if self.fpu.double_pr {
            let n = i.rn & 0xe;
            let m = i.rm & 0xe;
            let drn = self.load_fpr(n, Type::F64);
            let drm = self.load_fpr(m, Type::F64);
            if eq {
                self.b.fcmp_eq(drn, drm)
            } else {
                self.b.fcmp_gt(drn, drm)
            }
        } else {
            let frn = self.load_fpr(i.rn, Type::F32);
            let frm = self.load_fpr(i.rm, Type::F32);
            if eq {
                self.b.fcmp_eq(frn, frm)
            } else {
                self.b.fcmp_gt(frn, frm)
            }
        };
        self.store_t(v);
    }

    // FLOAT FPUL,FRn
    fn emit_float(&mut self, i: &Instr) {
        let fpul = self.b.load_context(ctx_offset!(fpul), Type::I32);
        if self.fpu.double_pr {
            let n = i.rn & 0xe;
            let wide = self.b.sext(fpul, Type::I64);
            let v = self.b.cast(wide, Type::F64);
            self.store_fpr(n, v);
        } else {
            let v = self.b.cast(fpul, Type::F32);
            self.store_fpr(i.rn, v);
        }
    }

    // FMAC FR0,FRm,FRn
    fn emit_fmac(&mut self, i: &Instr) {
        assert!(!self.fpu.double_pr);
        let frn = self.load_fpr(i.rn, Type::F32);
        let frm = self.load_fpr(i.rm, Type::F32);
        let fr0 = self.load_fpr(0, Type::F32);
        let mul = self.b.fmul(fr0, frm);
        let v = self.b.fadd(mul, frn);
        self.store_fpr(i.rn, v);
    }

    fn emit_fneg(&mut self, i: &Instr) {
        if self.fpu.double_pr {
            let n = i.rn & 0xe;
            let v = self.load_fpr(n, Type::F64);
            let v = self.b.fneg(v);
            self.store_fpr(n, v);
        } else {
            let v = self.load_fpr(i.rn, Type::F32);
            let v = self.b.fneg(v);
            self.store_fpr(i.rn, v);
        }
    }

    fn emit_fsqrt(&mut self, i: &Instr) {
        if self.fpu.double_pr {
            let n = i.rn & 0xe;
            let v = self.load_fpr(n, Type::F64);
            let v = self.b.sqrt(v);
            self.store_fpr(n, v);
        } else {
            let v = self.load_fpr(i.rn, Type::F32);
            let v = self.b.sqrt(v);
            self.store_fpr(i.rn, v);
        }
    }

    // FTRC FRm,FPUL
    fn emit_ftrc(&mut self, i: &Instr) {
        if self.fpu.double_pr {
            let m = i.rm & 0xe;
            let drm = self.load_fpr(m, Type::F64);
            let wide = self.b.cast(drm, Type::I64);
            let v = self.b.truncate(wide, Type::I32);
            self.b.store_context(ctx_offset!(fpul), v);
        } else {
            let frm = self.load_fpr(i.rm, Type::F32);
            let v = self.b.cast(frm, Type::I32);
            self.b.store_context(ctx_offset!(fpul), v);
        }
    }

    // FCNVDS DRm,FPUL
    fn emit_fcnvds(&mut self, i: &Instr) {
        assert!(self.fpu.double_pr);

        // TODO rounding modes

        let m = i.rm & 0xe;
        let dpv = self.load_fpr(m, Type::F64);
        let spv = self.b.ftruncate(dpv);
        self.b.store_context(ctx_offset!(fpul), spv);
    }

    // FCNVSD FPUL,DRn
    fn emit_fcnvsd(&mut self, i: &Instr) {
        assert!(self.fpu.double_pr);

        // TODO rounding modes

        let spv = self.b.load_context(ctx_offset!(fpul), Type::F32);
        let dpv = self.b.fext(spv);
        let n = i.rn & 0xe;
        self.store_fpr(n, dpv);
    }

    fn emit_ldsfpscr(&mut self, i: &Instr) {
        let rm = self.load_gpr(i.rm, Type::I32);
        self.store_fpscr(rm);
    }

    fn emit_ldsfpul(&mut self, i: &Instr) {
        let rm = self.load_gpr(i.rm, Type::I32);
        self.b.store_context(ctx_offset!(fpul), rm);
    }

    fn emit_ldsmfpscr(&mut self, i: &Instr) {
        let addr = self.load_gpr(i.rm, Type::I32);
        let v = self.b.load_guest(addr, Type::I32);
        self.store_fpscr(v);
        let four = self.b.const_u32(4);
        let addr = self.b.add(addr, four);
        self.store_gpr(i.rm, addr);
    }

    fn emit_ldsmfpul(&mut self, i: &Instr) {
        let addr = self.load_gpr(i.rm, Type::I32);
        let v = self.b.load_guest(addr, Type::I32);
        self.b.store_context(ctx_offset!(fpul), v);
        let four = self.b.const_u32(4);
        let addr = self.b.add(addr, four);
        self.store_gpr(i.rm, addr);
    }

    fn emit_stsfpscr(&mut self, i: &Instr) {
        let fpscr = self.load_fpscr();
        self.store_gpr(i.rn, fpscr);
    }

    fn emit_stsfpul(&mut self, i: &Instr) {
        let fpul = self.b.load_context(ctx_offset!(fpul), Type::I32);
        self.store_gpr(i.rn, fpul);
    }

    fn emit_stsmfpscr(&mut self, i: &Instr) {
        let addr = self.predec_addr(i.rn);
        let fpscr = self.load_fpscr();
        self.b.store_guest(addr, fpscr);
    }

    fn emit_stsmfpul(&mut self, i: &Instr) {
        let addr = self.predec_addr(i.rn);
        let fpul = self.b.load_context(ctx_offset!(fpul), Type::I32);
        self.b.store_guest(addr, fpul);
    }

    // FIPR FVm,FVn: dot product into FR[n+3]
    fn emit_fipr(&mut self, i: &Instr) {
        let m = i.rm << 2;
        let n = i.rn << 2;

        let fvn = self.load_fpr(n, Type::V128);
        let fvm = self.load_fpr(m, Type::V128);
        let dp = self.b.vdot(fvn, fvm, Type::F32);
        self.store_fpr(n + 3, dp);
    }

    // FSCA FPUL,DRn: table lookup of sin/cos keyed by the low 16 bits
    fn emit_fsca(&mut self, i: &Instr) {
        let n = i.rn << 1;

        let fpul = self.b.load_context(ctx_offset!(fpul), Type::I16);
        let fpul = self.b.zext(fpul, Type::I64);

        let table = self
            .b
            .const_u64(self.frontend.fsca_table.as_ptr() as u64);
        let offset = self.b.shl_imm(fpul, 3);
        let addr = self.b.add(table, offset);

        let sin = self.b.load_host(addr, Type::F32);
        self.store_fpr(n, sin);
        let four = self.b.const_i64(4);
        let addr = self.b.add(addr, four);
        let cos = self.b.load_host(addr, Type::F32);
        self.store_fpr(n + 1, cos);
    }

    // FTRV XMTRX,FVn: 4x4 matrix (XF bank) by vector multiply
    fn emit_ftrv(&mut self, i: &Instr) {
        let n = i.rn << 2;

        let col0 = self.load_xfr(0, Type::V128);
        let row0 = self.load_fpr(n, Type::F32);
        let row0 = self.b.vbroadcast(row0);
        let mut result = self.b.vmul(col0, row0, Type::F32);

        for c in 1..4 {
            let col = self.load_xfr(c * 4, Type::V128);
            let row = self.load_fpr(n + c, Type::F32);
            let row = self.b.vbroadcast(row);
            let prod = self.b.vmul(col, row, Type::F32);
            result = self.b.vadd(result, prod, Type::F32);
        }

        self.store_fpr(n, result);
    }

    // FRCHG: flip the FP bank bit
    fn emit_frchg(&mut self, _i: &Instr) {
        let fpscr = self.load_fpscr();
        let fr = self.b.const_u32(crate::context::FPSCR_FR);
        let v = self.b.xor(fpscr, fr);
        self.store_fpscr(v);
    }

    // FSCHG: flip the FP transfer-size bit
    fn emit_fschg(&mut self, _i: &Instr) {
        let fpscr = self.load_fpscr();
        let sz = self.b.const_u32(crate::context::FPSCR_SZ);
        let v = self.b.xor(fpscr, sz);
        self.store_fpscr(v);
    }
}

#[derive(Clone, Copy)]
enum CmpKind {
    Eq,
    Uge,
    Sge,
    Ugt,
    Sgt,
}

#[derive(Clone, Copy)]
enum LogicKind {
    And,
    Or,
    Xor,
}

#[derive(Clone, Copy)]
enum FBinKind {
    Add,
    Sub,
    Mul,
    Div,
}
