//! Reference interpreter.
//!
//! Executes a compilation unit directly against a guest context and memory
//! environment. The production path lowers IR to host code through a
//! backend; the interpreter exists so the runtime can execute blocks with no
//! backend present and so tests can check end-to-end guest semantics without
//! one.

use crate::builder::IrBuilder;
use crate::ir::{BlockId, Const, Opcode, Type, ValueId, ValueKind};

/// Host environment a unit executes against.
pub trait ExecEnv {
    /// The guest context struct viewed as bytes.
    fn context(&mut self) -> &mut [u8];

    fn load_guest(&mut self, addr: u32, ty: Type) -> u64;
    fn store_guest(&mut self, addr: u32, bits: u64, ty: Type);

    /// Invoke a host function identified by the opaque token the embedder
    /// installed in the context.
    fn call_external(&mut self, func: u64, arg: Option<u64>);

    /// Read through a raw host pointer baked into the unit (FSCA table).
    fn load_host(&mut self, addr: u64, ty: Type) -> u64 {
        unsafe {
            match ty {
                Type::I8 => (addr as *const u8).read_unaligned() as u64,
                Type::I16 => (addr as *const u16).read_unaligned() as u64,
                Type::I32 | Type::F32 => (addr as *const u32).read_unaligned() as u64,
                Type::I64 | Type::F64 => (addr as *const u64).read_unaligned(),
                _ => panic!("unsupported host load type {:?}", ty),
            }
        }
    }
}

/// How a unit finished executing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunExit {
    /// Fell off the end of the block list.
    FellThrough,
    /// Hit a branch to a non-block destination (a guest address).
    Branched(u64),
}

fn mask_for(ty: Type) -> u128 {
    match ty.size() {
        1 => 0xff,
        2 => 0xffff,
        4 => 0xffff_ffff,
        8 => u64::MAX as u128,
        16 => u128::MAX,
        _ => unreachable!(),
    }
}

fn sext_bits(ty: Type, bits: u64) -> i64 {
    match ty {
        Type::I8 => bits as u8 as i8 as i64,
        Type::I16 => bits as u16 as i16 as i64,
        Type::I32 => bits as u32 as i32 as i64,
        Type::I64 => bits as i64,
        _ => panic!("not an integer type: {:?}", ty),
    }
}

fn f32_of(bits: u64) -> f32 {
    f32::from_bits(bits as u32)
}

fn f64_of(bits: u64) -> f64 {
    f64::from_bits(bits)
}

fn float_of(ty: Type, bits: u64) -> f64 {
    match ty {
        Type::F32 => f32_of(bits) as f64,
        Type::F64 => f64_of(bits),
        _ => panic!("not a float type: {:?}", ty),
    }
}

fn float_bits(ty: Type, v: f64) -> u64 {
    match ty {
        Type::F32 => (v as f32).to_bits() as u64,
        Type::F64 => v.to_bits(),
        _ => panic!("not a float type: {:?}", ty),
    }
}

fn lanes(bits: u128) -> [f32; 4] {
    let mut out = [0.0f32; 4];
    for (i, lane) in out.iter_mut().enumerate() {
        *lane = f32::from_bits((bits >> (32 * i)) as u32);
    }
    out
}

fn pack_lanes(l: [f32; 4]) -> u128 {
    let mut out = 0u128;
    for (i, lane) in l.iter().enumerate() {
        out |= (lane.to_bits() as u128) << (32 * i);
    }
    out
}

struct Interp<'a, 'e> {
    b: &'a IrBuilder,
    env: &'e mut dyn ExecEnv,
    values: Vec<u128>,
    locals: Vec<u8>,
}

impl Interp<'_, '_> {
    fn bits(&self, v: ValueId) -> u128 {
        match self.b.value(v).kind {
            ValueKind::Const(c) => c.zext_value() as u128,
            ValueKind::Def(_) => self.values[v.0 as usize],
        }
    }

    fn block_dest(&self, v: ValueId) -> Option<BlockId> {
        match self.b.value(v).kind {
            ValueKind::Const(Const::Block(blk)) => Some(blk),
            _ => None,
        }
    }

    fn read_mem(buf: &[u8], offset: usize, size: usize) -> u128 {
        let mut out = 0u128;
        for i in (0..size).rev() {
            out = (out << 8) | buf[offset + i] as u128;
        }
        out
    }

    fn write_mem(buf: &mut [u8], offset: usize, size: usize, bits: u128) {
        for i in 0..size {
            buf[offset + i] = (bits >> (8 * i)) as u8;
        }
    }

    /// Execute one instruction. Returns a control transfer if it branched.
    fn step(&mut self, id: crate::ir::InstrId) -> Option<Result<BlockId, u64>> {
        let instr = self.b.instr(id);
        let op = instr.op;
        let result_ty = instr.result.map(|r| self.b.ty(r));

        let out: Option<u128> = match op {
            Opcode::LoadContext | Opcode::LoadLocal => {
                let offset = self.bits(instr.arg(0)) as usize;
                let ty = result_ty.unwrap();
                let bits = if op == Opcode::LoadContext {
                    Self::read_mem(self.env.context(), offset, ty.size() as usize)
                } else {
                    Self::read_mem(&self.locals, offset, ty.size() as usize)
                };
                Some(bits)
            }
            Opcode::StoreContext | Opcode::StoreLocal => {
                let offset = self.bits(instr.arg(0)) as usize;
                let v = instr.arg(1);
                let ty = self.b.ty(v);
                let bits = self.bits(v);
                if op == Opcode::StoreContext {
                    Self::write_mem(self.env.context(), offset, ty.size() as usize, bits);
                } else {
                    Self::write_mem(&mut self.locals, offset, ty.size() as usize, bits);
                }
                None
            }
            Opcode::LoadGuest => {
                let addr = self.bits(instr.arg(0)) as u32;
                let ty = result_ty.unwrap();
                Some(self.env.load_guest(addr, ty) as u128 & mask_for(ty))
            }
            Opcode::StoreGuest => {
                let addr = self.bits(instr.arg(0)) as u32;
                let v = instr.arg(1);
                let ty = self.b.ty(v);
                let bits = self.bits(v) as u64;
                self.env.store_guest(addr, bits, ty);
                None
            }
            Opcode::LoadHost => {
                let addr = self.bits(instr.arg(0)) as u64;
                let ty = result_ty.unwrap();
                Some(self.env.load_host(addr, ty) as u128 & mask_for(ty))
            }

            Opcode::Add
            | Opcode::Sub
            | Opcode::Smul
            | Opcode::Umul
            | Opcode::Div
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor => {
                let ty = result_ty.unwrap();
                let a = self.bits(instr.arg(0)) as u64;
                let b = self.bits(instr.arg(1)) as u64;
                let bits = match op {
                    Opcode::Add => a.wrapping_add(b),
                    Opcode::Sub => a.wrapping_sub(b),
                    Opcode::Smul => {
                        (sext_bits(ty, a).wrapping_mul(sext_bits(ty, b))) as u64
                    }
                    Opcode::Umul => a.wrapping_mul(b),
                    Opcode::Div => {
                        let d = sext_bits(ty, b);
                        if d == 0 { 0 } else { (sext_bits(ty, a).wrapping_div(d)) as u64 }
                    }
                    Opcode::And => a & b,
                    Opcode::Or => a | b,
                    Opcode::Xor => a ^ b,
                    _ => unreachable!(),
                };
                Some(bits as u128 & mask_for(ty))
            }
            Opcode::Neg | Opcode::Abs | Opcode::Not => {
                let ty = result_ty.unwrap();
                let a = self.bits(instr.arg(0)) as u64;
                let bits = match op {
                    Opcode::Neg => sext_bits(ty, a).wrapping_neg() as u64,
                    Opcode::Abs => sext_bits(ty, a).wrapping_abs() as u64,
                    Opcode::Not => !a,
                    _ => unreachable!(),
                };
                Some(bits as u128 & mask_for(ty))
            }

            Opcode::FAdd | Opcode::FSub | Opcode::FMul | Opcode::FDiv => {
                let ty = result_ty.unwrap();
                let a = float_of(ty, self.bits(instr.arg(0)) as u64);
                let b = float_of(ty, self.bits(instr.arg(1)) as u64);
                let v = match op {
                    Opcode::FAdd => a + b,
                    Opcode::FSub => a - b,
                    Opcode::FMul => a * b,
                    Opcode::FDiv => a / b,
                    _ => unreachable!(),
                };
                Some(float_bits(ty, v) as u128)
            }
            Opcode::FNeg | Opcode::FAbs | Opcode::Sqrt | Opcode::Sin | Opcode::Cos => {
                let ty = result_ty.unwrap();
                let a = float_of(ty, self.bits(instr.arg(0)) as u64);
                let v = match op {
                    Opcode::FNeg => -a,
                    Opcode::FAbs => a.abs(),
                    Opcode::Sqrt => a.sqrt(),
                    Opcode::Sin => a.sin(),
                    Opcode::Cos => a.cos(),
                    _ => unreachable!(),
                };
                Some(float_bits(ty, v) as u128)
            }

            Opcode::Shl | Opcode::Lshr | Opcode::Ashr => {
                let ty = result_ty.unwrap();
                let a = self.bits(instr.arg(0)) as u64;
                let n = (self.bits(instr.arg(1)) as u32) & (ty.size() * 8 - 1);
                let bits = match op {
                    Opcode::Shl => a << n,
                    Opcode::Lshr => (a & mask_for(ty) as u64) >> n,
                    Opcode::Ashr => (sext_bits(ty, a) >> n) as u64,
                    _ => unreachable!(),
                };
                Some(bits as u128 & mask_for(ty))
            }
            Opcode::Ashd | Opcode::Lshd => {
                // dynamic shift with SH-4 SHAD/SHLD semantics: positive
                // shifts left, negative shifts right by the complement count
                let ty = result_ty.unwrap();
                let a = self.bits(instr.arg(0)) as u32;
                let n = self.bits(instr.arg(1)) as u32 as i32;
                let bits = if n >= 0 {
                    a.wrapping_shl(n as u32 & 0x1f)
                } else if n & 0x1f == 0 {
                    match op {
                        Opcode::Ashd => ((a as i32) >> 31) as u32,
                        _ => 0,
                    }
                } else {
                    let count = ((!n as u32) & 0x1f) + 1;
                    match op {
                        Opcode::Ashd => ((a as i32) >> count) as u32,
                        _ => a >> count,
                    }
                };
                Some(bits as u128 & mask_for(ty))
            }

            Opcode::CmpEq
            | Opcode::CmpNe
            | Opcode::CmpSge
            | Opcode::CmpSgt
            | Opcode::CmpSle
            | Opcode::CmpSlt
            | Opcode::CmpUge
            | Opcode::CmpUgt
            | Opcode::CmpUle
            | Opcode::CmpUlt => {
                let ty = self.b.ty(instr.arg(0));
                let a = self.bits(instr.arg(0)) as u64 & mask_for(ty) as u64;
                let b = self.bits(instr.arg(1)) as u64 & mask_for(ty) as u64;
                let (sa, sb) = (sext_bits(ty, a), sext_bits(ty, b));
                let r = match op {
                    Opcode::CmpEq => a == b,
                    Opcode::CmpNe => a != b,
                    Opcode::CmpSge => sa >= sb,
                    Opcode::CmpSgt => sa > sb,
                    Opcode::CmpSle => sa <= sb,
                    Opcode::CmpSlt => sa < sb,
                    Opcode::CmpUge => a >= b,
                    Opcode::CmpUgt => a > b,
                    Opcode::CmpUle => a <= b,
                    Opcode::CmpUlt => a < b,
                    _ => unreachable!(),
                };
                Some(r as u128)
            }
            Opcode::FCmpEq | Opcode::FCmpGt => {
                let ty = self.b.ty(instr.arg(0));
                let a = float_of(ty, self.bits(instr.arg(0)) as u64);
                let b = float_of(ty, self.bits(instr.arg(1)) as u64);
                let r = match op {
                    Opcode::FCmpEq => a == b,
                    _ => a > b,
                };
                Some(r as u128)
            }

            Opcode::Cast => {
                let src_ty = self.b.ty(instr.arg(0));
                let dst_ty = result_ty.unwrap();
                let a = self.bits(instr.arg(0)) as u64;
                let bits = if src_ty.is_int() {
                    float_bits(dst_ty, sext_bits(src_ty, a) as f64)
                } else {
                    let v = float_of(src_ty, a);
                    match dst_ty {
                        Type::I32 => v as i32 as u32 as u64,
                        Type::I64 => v as i64 as u64,
                        _ => panic!("unsupported cast target {:?}", dst_ty),
                    }
                };
                Some(bits as u128 & mask_for(dst_ty))
            }
            Opcode::SExt => {
                let src_ty = self.b.ty(instr.arg(0));
                let dst_ty = result_ty.unwrap();
                let a = self.bits(instr.arg(0)) as u64;
                Some((sext_bits(src_ty, a) as u64 as u128) & mask_for(dst_ty))
            }
            Opcode::ZExt | Opcode::Truncate => {
                let src_ty = self.b.ty(instr.arg(0));
                let dst_ty = result_ty.unwrap();
                let a = self.bits(instr.arg(0)) & mask_for(src_ty);
                Some(a & mask_for(dst_ty))
            }
            Opcode::FExt => {
                let a = f32_of(self.bits(instr.arg(0)) as u64);
                Some((a as f64).to_bits() as u128)
            }
            Opcode::FTruncate => {
                let a = f64_of(self.bits(instr.arg(0)) as u64);
                Some((a as f32).to_bits() as u128)
            }

            Opcode::Select => {
                let cond = self.bits(instr.arg(0)) as u8;
                let v = if cond != 0 {
                    self.bits(instr.arg(1))
                } else {
                    self.bits(instr.arg(2))
                };
                Some(v)
            }

            Opcode::Branch => {
                let dest = instr.arg(0);
                return Some(match self.block_dest(dest) {
                    Some(blk) => Ok(blk),
                    None => Err(self.bits(dest) as u64),
                });
            }
            Opcode::BranchCond => {
                let cond = self.bits(instr.arg(0)) as u8;
                let dest = if cond != 0 { instr.arg(1) } else { instr.arg(2) };
                return Some(match self.block_dest(dest) {
                    Some(blk) => Ok(blk),
                    None => Err(self.bits(dest) as u64),
                });
            }
            Opcode::CallExternal => {
                let func = self.bits(instr.arg(0)) as u64;
                let arg = instr.args[1].map(|a| self.bits(a) as u64);
                self.env.call_external(func, arg);
                None
            }

            Opcode::VBroadcast => {
                let v = f32_of(self.bits(instr.arg(0)) as u64);
                Some(pack_lanes([v; 4]))
            }
            Opcode::VAdd | Opcode::VMul => {
                let a = lanes(self.bits(instr.arg(0)));
                let b = lanes(self.bits(instr.arg(1)));
                let mut out = [0.0f32; 4];
                for i in 0..4 {
                    out[i] = match op {
                        Opcode::VAdd => a[i] + b[i],
                        _ => a[i] * b[i],
                    };
                }
                Some(pack_lanes(out))
            }
            Opcode::VDot => {
                let a = lanes(self.bits(instr.arg(0)));
                let b = lanes(self.bits(instr.arg(1)));
                let dp: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
                Some(dp.to_bits() as u128)
            }
        };

        if let (Some(result), Some(bits)) = (instr.result, out) {
            self.values[result.0 as usize] = bits;
        }
        None
    }
}

/// Run a unit to completion against `env`.
pub fn run(b: &IrBuilder, env: &mut dyn ExecEnv) -> RunExit {
    let mut interp = Interp {
        b,
        env,
        values: vec![0u128; b.value_count()],
        locals: vec![0u8; b.locals_size as usize],
    };

    let mut cur = b.head_block();
    while let Some(block) = cur {
        let mut transfer = None;
        for id in b.instr_ids(block) {
            if let Some(t) = interp.step(id) {
                transfer = Some(t);
                break;
            }
        }

        match transfer {
            Some(Ok(next)) => cur = Some(next),
            Some(Err(addr)) => return RunExit::Branched(addr),
            None => cur = b.block(block).next,
        }
    }

    RunExit::FellThrough
}
