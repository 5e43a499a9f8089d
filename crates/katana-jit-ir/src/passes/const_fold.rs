//! Integer constant folding.
//!
//! Any integer arithmetic, bitwise, shift, compare, or width-change
//! instruction whose arguments are all constants is evaluated at translation
//! time and its result replaced by an interned constant.

use crate::builder::IrBuilder;
use crate::ir::{Const, Opcode, Type};

fn truncate_to(ty: Type, bits: u64) -> u64 {
    match ty {
        Type::I8 => bits as u8 as u64,
        Type::I16 => bits as u16 as u64,
        Type::I32 => bits as u32 as u64,
        Type::I64 => bits,
        _ => unreachable!(),
    }
}

fn sext_from(ty: Type, bits: u64) -> i64 {
    match ty {
        Type::I8 => bits as u8 as i8 as i64,
        Type::I16 => bits as u16 as i16 as i64,
        Type::I32 => bits as u32 as i32 as i64,
        Type::I64 => bits as i64,
        _ => unreachable!(),
    }
}

fn const_from_bits(ty: Type, bits: u64) -> Const {
    match ty {
        Type::I8 => Const::I8(bits as u8 as i8),
        Type::I16 => Const::I16(bits as u16 as i16),
        Type::I32 => Const::I32(bits as u32 as i32),
        Type::I64 => Const::I64(bits as i64),
        _ => unreachable!(),
    }
}

/// Evaluate `op` on integer constants. `arg_ty` is the type of arg0,
/// `result_ty` the type of the folded result (they differ for compares and
/// width changes). Returns the result bit pattern.
fn eval(op: Opcode, arg_ty: Type, result_ty: Type, a: u64, b: u64) -> Option<u64> {
    let sa = sext_from(arg_ty, a);
    let sb = sext_from(arg_ty, b);
    let shift = (b as u32) & 63;

    let bits = match op {
        Opcode::Add => a.wrapping_add(b),
        Opcode::Sub => a.wrapping_sub(b),
        Opcode::Smul => (sa.wrapping_mul(sb)) as u64,
        Opcode::Umul => a.wrapping_mul(b),
        Opcode::And => a & b,
        Opcode::Or => a | b,
        Opcode::Xor => a ^ b,
        Opcode::Not => !a,
        Opcode::Neg => (sa.wrapping_neg()) as u64,
        Opcode::Abs => (sa.wrapping_abs()) as u64,
        Opcode::Shl => a.wrapping_shl(shift),
        Opcode::Lshr => a.wrapping_shr(shift),
        Opcode::Ashr => (sa.wrapping_shr(shift)) as u64,
        Opcode::CmpEq => (a == b) as u64,
        Opcode::CmpNe => (a != b) as u64,
        Opcode::CmpSge => (sa >= sb) as u64,
        Opcode::CmpSgt => (sa > sb) as u64,
        Opcode::CmpSle => (sa <= sb) as u64,
        Opcode::CmpSlt => (sa < sb) as u64,
        Opcode::CmpUge => (a >= b) as u64,
        Opcode::CmpUgt => (a > b) as u64,
        Opcode::CmpUle => (a <= b) as u64,
        Opcode::CmpUlt => (a < b) as u64,
        Opcode::SExt => sext_from(arg_ty, a) as u64,
        Opcode::ZExt => a,
        Opcode::Truncate => a,
        _ => return None,
    };

    Some(truncate_to(result_ty, bits))
}

pub fn const_fold(b: &mut IrBuilder) {
    let mut folded = 0usize;

    for block in b.block_ids() {
        for id in b.instr_ids(block) {
            let instr = b.instr(id);
            let Some(result) = instr.result else { continue };

            // every present argument must be an integer constant
            let mut args = [0u64; 2];
            let mut nargs = 0usize;
            let mut ok = true;
            let mut arg_ty = None;
            for a in instr.args.iter().flatten() {
                let v = b.value(*a);
                match v.constant() {
                    Some(c) if v.ty.is_int() => {
                        if nargs < 2 {
                            args[nargs] = c.zext_value();
                        }
                        arg_ty.get_or_insert(v.ty);
                        nargs += 1;
                    }
                    _ => {
                        ok = false;
                        break;
                    }
                }
            }
            if !ok || nargs == 0 || nargs > 2 {
                continue;
            }

            let result_ty = b.ty(result);
            if !result_ty.is_int() {
                continue;
            }

            let op = b.instr(id).op;
            let Some(bits) = eval(op, arg_ty.unwrap(), result_ty, args[0], args[1]) else {
                continue;
            };

            let c = b.alloc_constant(const_from_bits(result_ty, bits));
            b.replace_uses_with(result, c);
            b.remove_instr(id);
            folded += 1;
        }
    }

    tracing::debug!(folded, "const_fold");
}
