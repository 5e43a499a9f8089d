//! Builder for one compilation unit.
//!
//! One `IrBuilder` is created per translation block. It owns the arenas for
//! values, instructions, blocks and edges, the lazily interned constant
//! pool, the local-frame byte count and the accumulated guest cycle count.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::ir::{
    Block, BlockId, Const, Edge, EdgeId, Instr, InstrFlags, InstrId, Opcode, Type, Use, Value,
    ValueId, ValueKind,
};

#[derive(Default)]
pub struct IrBuilder {
    values: Vec<Value>,
    instrs: Vec<Instr>,
    blocks: Vec<Block>,
    edges: Vec<Edge>,

    head_block: Option<BlockId>,
    tail_block: Option<BlockId>,
    current_block: Option<BlockId>,

    const_pool: HashMap<(Type, u64), ValueId>,

    pub locals_size: u32,
    pub guest_cycles: u32,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    //
    // arena accessors
    //

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.0 as usize]
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut Value {
        &mut self.values[id.0 as usize]
    }

    pub fn instr(&self, id: InstrId) -> &Instr {
        &self.instrs[id.0 as usize]
    }

    pub fn instr_mut(&mut self, id: InstrId) -> &mut Instr {
        &mut self.instrs[id.0 as usize]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0 as usize]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0 as usize]
    }

    pub fn ty(&self, id: ValueId) -> Type {
        self.value(id).ty
    }

    /// Number of values allocated in the arena, including removed ones.
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn head_block(&self) -> Option<BlockId> {
        self.head_block
    }

    pub fn tail_block(&self) -> Option<BlockId> {
        self.tail_block
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.current_block
    }

    pub fn set_current_block(&mut self, block: BlockId) {
        self.current_block = Some(block);
    }

    /// Blocks in list order.
    pub fn block_ids(&self) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut cur = self.head_block;
        while let Some(b) = cur {
            out.push(b);
            cur = self.block(b).next;
        }
        out
    }

    /// Instructions of `block` in list order.
    pub fn instr_ids(&self, block: BlockId) -> Vec<InstrId> {
        let mut out = Vec::new();
        let mut cur = self.block(block).head;
        while let Some(i) = cur {
            out.push(i);
            cur = self.instr(i).next;
        }
        out
    }

    /// Last instruction of the last block, if any.
    pub fn tail_instr(&self) -> Option<InstrId> {
        let mut cur = self.tail_block;
        while let Some(b) = cur {
            if let Some(tail) = self.block(b).tail {
                return Some(tail);
            }
            cur = self.block(b).prev;
        }
        None
    }

    //
    // block management
    //

    pub fn insert_block(&mut self, after: Option<BlockId>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::default());

        match after {
            None => {
                // insert at beginning if no after specified
                self.block_mut(id).next = self.head_block;
                if let Some(head) = self.head_block {
                    self.block_mut(head).prev = Some(id);
                }
                self.head_block = Some(id);
                if self.tail_block.is_none() {
                    self.tail_block = Some(id);
                }
            }
            Some(after) => {
                let next = self.block(after).next;
                self.block_mut(id).prev = Some(after);
                self.block_mut(id).next = next;
                self.block_mut(after).next = Some(id);
                match next {
                    Some(next) => self.block_mut(next).prev = Some(id),
                    None => self.tail_block = Some(id),
                }
            }
        }

        id
    }

    pub fn append_block(&mut self) -> BlockId {
        self.insert_block(self.tail_block)
    }

    pub fn remove_block(&mut self, id: BlockId) {
        if self.current_block == Some(id) {
            self.current_block = self.block(id).next.or(self.block(id).prev);
        }

        let (prev, next) = (self.block(id).prev, self.block(id).next);
        match prev {
            Some(prev) => self.block_mut(prev).next = next,
            None => self.head_block = next,
        }
        match next {
            Some(next) => self.block_mut(next).prev = prev,
            None => self.tail_block = prev,
        }
        self.block_mut(id).prev = None;
        self.block_mut(id).next = None;
    }

    pub fn add_edge(&mut self, src: BlockId, dst: BlockId) -> EdgeId {
        assert_ne!(src, dst);
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Edge { src, dst });
        self.block_mut(src).outgoing.push(id);
        self.block_mut(dst).incoming.push(id);
        id
    }

    //
    // instruction management
    //

    fn is_terminator(&self, id: InstrId) -> bool {
        self.instr(id).op.is_terminator()
    }

    fn alloc_instr(&mut self, op: Opcode, flags: InstrFlags) -> InstrId {
        let id = InstrId(self.instrs.len() as u32);
        self.instrs.push(Instr::new(op, flags));
        id
    }

    /// Append an instruction to the current block, lazily opening a new block
    /// if there is none or the current one is already terminated.
    pub fn append_instr(&mut self, op: Opcode, flags: InstrFlags) -> InstrId {
        let needs_block = match self.current_block {
            None => true,
            Some(b) => self
                .block(b)
                .tail
                .map(|t| self.is_terminator(t))
                .unwrap_or(false),
        };
        if needs_block {
            let b = self.insert_block(self.current_block);
            self.current_block = Some(b);
        }

        let block = self.current_block.unwrap();
        let id = self.alloc_instr(op, flags);
        self.link_instr(block, id);
        id
    }

    fn link_instr(&mut self, block: BlockId, id: InstrId) {
        let tail = self.block(block).tail;
        self.instr_mut(id).block = Some(block);
        self.instr_mut(id).prev = tail;
        match tail {
            Some(tail) => self.instr_mut(tail).next = Some(id),
            None => self.block_mut(block).head = Some(id),
        }
        self.block_mut(block).tail = Some(id);
    }

    /// Unlink `id` from its block and drop its argument uses. The result
    /// value, if any, is left orphaned in the arena.
    pub fn remove_instr(&mut self, id: InstrId) {
        for slot in 0..self.instr(id).args.len() {
            self.clear_arg(id, slot);
        }

        let block = self.instr(id).block.expect("instruction not in a block");
        let (prev, next) = (self.instr(id).prev, self.instr(id).next);
        match prev {
            Some(prev) => self.instr_mut(prev).next = next,
            None => self.block_mut(block).head = next,
        }
        match next {
            Some(next) => self.instr_mut(next).prev = prev,
            None => self.block_mut(block).tail = prev,
        }
        let instr = self.instr_mut(id);
        instr.block = None;
        instr.prev = None;
        instr.next = None;
    }

    pub fn set_arg(&mut self, id: InstrId, slot: usize, value: ValueId) {
        self.clear_arg(id, slot);
        self.instr_mut(id).args[slot] = Some(value);
        self.value_mut(value).uses.push(Use {
            instr: id,
            slot: slot as u8,
        });
    }

    fn clear_arg(&mut self, id: InstrId, slot: usize) {
        if let Some(old) = self.instr_mut(id).args[slot].take() {
            self.value_mut(old)
                .uses
                .retain(|u| !(u.instr == id && u.slot == slot as u8));
        }
    }

    fn set_result(&mut self, id: InstrId, value: ValueId) {
        self.instr_mut(id).result = Some(value);
        self.value_mut(value).kind = ValueKind::Def(id);
    }

    /// Redirect every use of `old` to `new`. O(uses of `old`).
    pub fn replace_uses_with(&mut self, old: ValueId, new: ValueId) {
        assert_ne!(old, new);
        let uses = std::mem::take(&mut self.value_mut(old).uses);
        for u in &uses {
            self.instr_mut(u.instr).args[u.slot as usize] = Some(new);
        }
        self.value_mut(new).uses.extend(uses);
    }

    //
    // value construction
    //

    pub fn alloc_constant(&mut self, c: Const) -> ValueId {
        let key = (c.ty(), c.zext_value());
        if let Some(&id) = self.const_pool.get(&key) {
            return id;
        }
        let id = ValueId(self.values.len() as u32);
        self.values.push(Value {
            ty: c.ty(),
            kind: ValueKind::Const(c),
            uses: Vec::new(),
            reg: -1,
        });
        self.const_pool.insert(key, id);
        id
    }

    pub fn const_i8(&mut self, v: i8) -> ValueId {
        self.alloc_constant(Const::I8(v))
    }

    pub fn const_i16(&mut self, v: i16) -> ValueId {
        self.alloc_constant(Const::I16(v))
    }

    pub fn const_i32(&mut self, v: i32) -> ValueId {
        self.alloc_constant(Const::I32(v))
    }

    pub fn const_u32(&mut self, v: u32) -> ValueId {
        self.alloc_constant(Const::I32(v as i32))
    }

    pub fn const_i64(&mut self, v: i64) -> ValueId {
        self.alloc_constant(Const::I64(v))
    }

    pub fn const_u64(&mut self, v: u64) -> ValueId {
        self.alloc_constant(Const::I64(v as i64))
    }

    pub fn const_f32(&mut self, v: f32) -> ValueId {
        self.alloc_constant(Const::F32(v))
    }

    pub fn const_f64(&mut self, v: f64) -> ValueId {
        self.alloc_constant(Const::F64(v))
    }

    pub fn const_block(&mut self, b: BlockId) -> ValueId {
        self.alloc_constant(Const::Block(b))
    }

    /// Rewrite every block-reference constant pointing at `from` to point at
    /// `to`. Used when an empty block is spliced out of the list.
    pub fn remap_block_refs(&mut self, from: BlockId, to: BlockId) {
        for v in &mut self.values {
            if let ValueKind::Const(c @ Const::Block(_)) = &mut v.kind {
                if c.block_value() == from {
                    *c = Const::Block(to);
                }
            }
        }
        self.const_pool.remove(&(Type::Block, from.0 as u64));
    }

    pub fn alloc_dynamic(&mut self, ty: Type) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(Value {
            ty,
            // patched by set_result immediately after
            kind: ValueKind::Def(InstrId(u32::MAX)),
            uses: Vec::new(),
            reg: -1,
        });
        id
    }

    /// Reserve `ty.size()` bytes in the unit's local frame.
    pub fn alloc_local(&mut self, ty: Type) -> u32 {
        let offset = self.locals_size;
        self.locals_size += ty.size();
        offset
    }

    //
    // op construction
    //

    fn push_op(
        &mut self,
        op: Opcode,
        flags: InstrFlags,
        args: &[ValueId],
        result_ty: Option<Type>,
    ) -> Option<ValueId> {
        let id = self.append_instr(op, flags);
        for (slot, &a) in args.iter().enumerate() {
            self.set_arg(id, slot, a);
        }
        result_ty.map(|ty| {
            let v = self.alloc_dynamic(ty);
            self.set_result(id, v);
            v
        })
    }

    pub fn load_context(&mut self, offset: u32, ty: Type) -> ValueId {
        let off = self.const_u32(offset);
        self.push_op(Opcode::LoadContext, InstrFlags::empty(), &[off], Some(ty))
            .unwrap()
    }

    pub fn store_context(&mut self, offset: u32, v: ValueId) {
        self.store_context_flags(offset, v, InstrFlags::empty());
    }

    pub fn store_context_flags(&mut self, offset: u32, v: ValueId, flags: InstrFlags) {
        let off = self.const_u32(offset);
        self.push_op(Opcode::StoreContext, flags, &[off, v], None);
    }

    pub fn load_local(&mut self, offset: u32, ty: Type) -> ValueId {
        let off = self.const_u32(offset);
        self.push_op(Opcode::LoadLocal, InstrFlags::empty(), &[off], Some(ty))
            .unwrap()
    }

    pub fn store_local(&mut self, offset: u32, v: ValueId) {
        let off = self.const_u32(offset);
        self.push_op(Opcode::StoreLocal, InstrFlags::empty(), &[off, v], None);
    }

    pub fn load_guest(&mut self, addr: ValueId, ty: Type) -> ValueId {
        assert_eq!(self.ty(addr), Type::I32);
        self.push_op(Opcode::LoadGuest, InstrFlags::empty(), &[addr], Some(ty))
            .unwrap()
    }

    pub fn store_guest(&mut self, addr: ValueId, v: ValueId) {
        assert_eq!(self.ty(addr), Type::I32);
        self.push_op(Opcode::StoreGuest, InstrFlags::empty(), &[addr, v], None);
    }

    /// Load through a raw host address (I64). Used for baked-in lookup
    /// tables such as the FSCA sin/cos table.
    pub fn load_host(&mut self, addr: ValueId, ty: Type) -> ValueId {
        assert_eq!(self.ty(addr), Type::I64);
        self.push_op(Opcode::LoadHost, InstrFlags::empty(), &[addr], Some(ty))
            .unwrap()
    }

    fn binop(&mut self, op: Opcode, a: ValueId, b: ValueId) -> ValueId {
        assert_eq!(self.ty(a), self.ty(b));
        let ty = self.ty(a);
        self.push_op(op, InstrFlags::empty(), &[a, b], Some(ty)).unwrap()
    }

    fn int_binop(&mut self, op: Opcode, a: ValueId, b: ValueId) -> ValueId {
        assert!(self.ty(a).is_int());
        self.binop(op, a, b)
    }

    fn float_binop(&mut self, op: Opcode, a: ValueId, b: ValueId) -> ValueId {
        assert!(self.ty(a).is_float());
        self.binop(op, a, b)
    }

    fn unop(&mut self, op: Opcode, a: ValueId) -> ValueId {
        let ty = self.ty(a);
        self.push_op(op, InstrFlags::empty(), &[a], Some(ty)).unwrap()
    }

    fn cmp(&mut self, op: Opcode, a: ValueId, b: ValueId) -> ValueId {
        assert_eq!(self.ty(a), self.ty(b));
        self.push_op(op, InstrFlags::empty(), &[a, b], Some(Type::I8))
            .unwrap()
    }

    pub fn add(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.int_binop(Opcode::Add, a, b)
    }

    pub fn sub(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.int_binop(Opcode::Sub, a, b)
    }

    pub fn smul(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.int_binop(Opcode::Smul, a, b)
    }

    pub fn umul(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.int_binop(Opcode::Umul, a, b)
    }

    pub fn div(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.int_binop(Opcode::Div, a, b)
    }

    pub fn neg(&mut self, a: ValueId) -> ValueId {
        assert!(self.ty(a).is_int());
        self.unop(Opcode::Neg, a)
    }

    pub fn abs(&mut self, a: ValueId) -> ValueId {
        assert!(self.ty(a).is_int());
        self.unop(Opcode::Abs, a)
    }

    pub fn fadd(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.float_binop(Opcode::FAdd, a, b)
    }

    pub fn fsub(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.float_binop(Opcode::FSub, a, b)
    }

    pub fn fmul(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.float_binop(Opcode::FMul, a, b)
    }

    pub fn fdiv(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.float_binop(Opcode::FDiv, a, b)
    }

    pub fn fneg(&mut self, a: ValueId) -> ValueId {
        assert!(self.ty(a).is_float());
        self.unop(Opcode::FNeg, a)
    }

    pub fn fabs(&mut self, a: ValueId) -> ValueId {
        assert!(self.ty(a).is_float());
        self.unop(Opcode::FAbs, a)
    }

    pub fn sqrt(&mut self, a: ValueId) -> ValueId {
        assert!(self.ty(a).is_float());
        self.unop(Opcode::Sqrt, a)
    }

    pub fn sin(&mut self, a: ValueId) -> ValueId {
        assert!(self.ty(a).is_float());
        self.unop(Opcode::Sin, a)
    }

    pub fn cos(&mut self, a: ValueId) -> ValueId {
        assert!(self.ty(a).is_float());
        self.unop(Opcode::Cos, a)
    }

    pub fn and(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.int_binop(Opcode::And, a, b)
    }

    pub fn or(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.int_binop(Opcode::Or, a, b)
    }

    pub fn xor(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.int_binop(Opcode::Xor, a, b)
    }

    pub fn not(&mut self, a: ValueId) -> ValueId {
        assert!(self.ty(a).is_int());
        self.unop(Opcode::Not, a)
    }

    fn shift(&mut self, op: Opcode, a: ValueId, n: ValueId) -> ValueId {
        assert!(self.ty(a).is_int());
        assert_eq!(self.ty(n), Type::I32);
        let ty = self.ty(a);
        self.push_op(op, InstrFlags::empty(), &[a, n], Some(ty)).unwrap()
    }

    pub fn shl(&mut self, a: ValueId, n: ValueId) -> ValueId {
        self.shift(Opcode::Shl, a, n)
    }

    pub fn shl_imm(&mut self, a: ValueId, n: i32) -> ValueId {
        let n = self.const_i32(n);
        self.shl(a, n)
    }

    pub fn ashr(&mut self, a: ValueId, n: ValueId) -> ValueId {
        self.shift(Opcode::Ashr, a, n)
    }

    pub fn ashr_imm(&mut self, a: ValueId, n: i32) -> ValueId {
        let n = self.const_i32(n);
        self.ashr(a, n)
    }

    pub fn lshr(&mut self, a: ValueId, n: ValueId) -> ValueId {
        self.shift(Opcode::Lshr, a, n)
    }

    pub fn lshr_imm(&mut self, a: ValueId, n: i32) -> ValueId {
        let n = self.const_i32(n);
        self.lshr(a, n)
    }

    pub fn ashd(&mut self, a: ValueId, n: ValueId) -> ValueId {
        self.shift(Opcode::Ashd, a, n)
    }

    pub fn lshd(&mut self, a: ValueId, n: ValueId) -> ValueId {
        self.shift(Opcode::Lshd, a, n)
    }

    pub fn cmp_eq(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.cmp(Opcode::CmpEq, a, b)
    }

    pub fn cmp_ne(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.cmp(Opcode::CmpNe, a, b)
    }

    pub fn cmp_sge(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.cmp(Opcode::CmpSge, a, b)
    }

    pub fn cmp_sgt(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.cmp(Opcode::CmpSgt, a, b)
    }

    pub fn cmp_sle(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.cmp(Opcode::CmpSle, a, b)
    }

    pub fn cmp_slt(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.cmp(Opcode::CmpSlt, a, b)
    }

    pub fn cmp_uge(&mut self, a: ValueId, b: ValueId) -> ValueId {
        assert!(self.ty(a).is_int());
        self.cmp(Opcode::CmpUge, a, b)
    }

    pub fn cmp_ugt(&mut self, a: ValueId, b: ValueId) -> ValueId {
        assert!(self.ty(a).is_int());
        self.cmp(Opcode::CmpUgt, a, b)
    }

    pub fn cmp_ule(&mut self, a: ValueId, b: ValueId) -> ValueId {
        assert!(self.ty(a).is_int());
        self.cmp(Opcode::CmpUle, a, b)
    }

    pub fn cmp_ult(&mut self, a: ValueId, b: ValueId) -> ValueId {
        assert!(self.ty(a).is_int());
        self.cmp(Opcode::CmpUlt, a, b)
    }

    pub fn fcmp_eq(&mut self, a: ValueId, b: ValueId) -> ValueId {
        assert!(self.ty(a).is_float());
        self.cmp(Opcode::FCmpEq, a, b)
    }

    pub fn fcmp_gt(&mut self, a: ValueId, b: ValueId) -> ValueId {
        assert!(self.ty(a).is_float());
        self.cmp(Opcode::FCmpGt, a, b)
    }

    pub fn cast(&mut self, v: ValueId, dest: Type) -> ValueId {
        let src = self.ty(v);
        assert!(
            (src.is_int() && dest.is_float()) || (src.is_float() && dest.is_int()),
            "cast must be between int and float, got {:?} -> {:?}",
            src,
            dest
        );
        self.push_op(Opcode::Cast, InstrFlags::empty(), &[v], Some(dest))
            .unwrap()
    }

    pub fn sext(&mut self, v: ValueId, dest: Type) -> ValueId {
        assert!(self.ty(v).is_int() && dest.is_int());
        self.push_op(Opcode::SExt, InstrFlags::empty(), &[v], Some(dest))
            .unwrap()
    }

    pub fn zext(&mut self, v: ValueId, dest: Type) -> ValueId {
        assert!(self.ty(v).is_int() && dest.is_int());
        self.push_op(Opcode::ZExt, InstrFlags::empty(), &[v], Some(dest))
            .unwrap()
    }

    pub fn truncate(&mut self, v: ValueId, dest: Type) -> ValueId {
        assert!(self.ty(v).is_int() && dest.is_int());
        self.push_op(Opcode::Truncate, InstrFlags::empty(), &[v], Some(dest))
            .unwrap()
    }

    pub fn fext(&mut self, v: ValueId) -> ValueId {
        assert_eq!(self.ty(v), Type::F32);
        self.push_op(Opcode::FExt, InstrFlags::empty(), &[v], Some(Type::F64))
            .unwrap()
    }

    pub fn ftruncate(&mut self, v: ValueId) -> ValueId {
        assert_eq!(self.ty(v), Type::F64);
        self.push_op(Opcode::FTruncate, InstrFlags::empty(), &[v], Some(Type::F32))
            .unwrap()
    }

    /// Coerce `cond` to I8 via `!= 0` unless it already is.
    fn bool_cond(&mut self, cond: ValueId) -> ValueId {
        if self.ty(cond) == Type::I8 {
            return cond;
        }
        let ty = self.ty(cond);
        let zero = match ty {
            Type::I16 => self.const_i16(0),
            Type::I32 => self.const_i32(0),
            Type::I64 => self.const_i64(0),
            _ => panic!("condition must be an integer, got {:?}", ty),
        };
        self.cmp_ne(cond, zero)
    }

    pub fn select(&mut self, cond: ValueId, t: ValueId, f: ValueId) -> ValueId {
        assert_eq!(self.ty(t), self.ty(f));
        let cond = self.bool_cond(cond);
        let ty = self.ty(t);
        self.push_op(Opcode::Select, InstrFlags::empty(), &[cond, t, f], Some(ty))
            .unwrap()
    }

    pub fn branch(&mut self, dest: ValueId) {
        self.push_op(Opcode::Branch, InstrFlags::empty(), &[dest], None);
    }

    pub fn branch_block(&mut self, dest: BlockId) {
        let dest = self.const_block(dest);
        self.branch(dest);
    }

    /// Branch to `false_dest` when `cond` is zero. A fall-through block is
    /// created automatically and made current, so straight-line code emitted
    /// afterwards lands in it.
    pub fn branch_false(&mut self, cond: ValueId, false_dest: ValueId) -> BlockId {
        let cond = self.bool_cond(cond);
        let true_block = self.insert_block(self.current_block);
        let true_dest = self.const_block(true_block);
        self.push_op(
            Opcode::BranchCond,
            InstrFlags::empty(),
            &[cond, true_dest, false_dest],
            None,
        );
        self.set_current_block(true_block);
        true_block
    }

    /// Branch to `true_dest` when `cond` is non-zero; falls through into a
    /// freshly created block which becomes current.
    pub fn branch_true(&mut self, cond: ValueId, true_dest: ValueId) -> BlockId {
        let cond = self.bool_cond(cond);
        let false_block = self.insert_block(self.current_block);
        let false_dest = self.const_block(false_block);
        self.push_op(
            Opcode::BranchCond,
            InstrFlags::empty(),
            &[cond, true_dest, false_dest],
            None,
        );
        self.set_current_block(false_block);
        false_block
    }

    pub fn branch_cond(&mut self, cond: ValueId, t: BlockId, f: BlockId) {
        let cond = self.bool_cond(cond);
        let t = self.const_block(t);
        let f = self.const_block(f);
        self.push_op(Opcode::BranchCond, InstrFlags::empty(), &[cond, t, f], None);
    }

    /// Call a host function identified by an opaque 64-bit token, no
    /// argument. The call may rewrite the guest context, so context load
    /// caching is invalidated.
    pub fn call_external(&mut self, func: ValueId) {
        assert_eq!(self.ty(func), Type::I64);
        self.push_op(
            Opcode::CallExternal,
            InstrFlags::INVALIDATE_CONTEXT,
            &[func],
            None,
        );
    }

    pub fn call_external2(&mut self, func: ValueId, arg: ValueId) {
        assert_eq!(self.ty(func), Type::I64);
        assert_eq!(self.ty(arg), Type::I64);
        self.push_op(
            Opcode::CallExternal,
            InstrFlags::INVALIDATE_CONTEXT,
            &[func, arg],
            None,
        );
    }

    pub fn vbroadcast(&mut self, v: ValueId) -> ValueId {
        assert_eq!(self.ty(v), Type::F32);
        self.push_op(Opcode::VBroadcast, InstrFlags::empty(), &[v], Some(Type::V128))
            .unwrap()
    }

    pub fn vadd(&mut self, a: ValueId, b: ValueId, el: Type) -> ValueId {
        assert_eq!(el, Type::F32);
        assert_eq!(self.ty(a), Type::V128);
        assert_eq!(self.ty(b), Type::V128);
        self.push_op(Opcode::VAdd, InstrFlags::empty(), &[a, b], Some(Type::V128))
            .unwrap()
    }

    pub fn vmul(&mut self, a: ValueId, b: ValueId, el: Type) -> ValueId {
        assert_eq!(el, Type::F32);
        assert_eq!(self.ty(a), Type::V128);
        assert_eq!(self.ty(b), Type::V128);
        self.push_op(Opcode::VMul, InstrFlags::empty(), &[a, b], Some(Type::V128))
            .unwrap()
    }

    /// Horizontal dot product of two 4 x f32 vectors.
    pub fn vdot(&mut self, a: ValueId, b: ValueId, el: Type) -> ValueId {
        assert_eq!(el, Type::F32);
        assert_eq!(self.ty(a), Type::V128);
        assert_eq!(self.ty(b), Type::V128);
        self.push_op(Opcode::VDot, InstrFlags::empty(), &[a, b], Some(Type::F32))
            .unwrap()
    }

    /// Human-readable listing, one numbered instruction per line.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let mut ic = 0;
        for (bi, b) in self.block_ids().into_iter().enumerate() {
            let _ = writeln!(out, "blk{}:", bi);
            for i in self.instr_ids(b) {
                let instr = self.instr(i);
                let _ = write!(out, "  {}. {:?}", ic, instr.op);
                ic += 1;
                for arg in instr.args.iter().flatten() {
                    match self.value(*arg).kind {
                        ValueKind::Const(c) => {
                            let _ = write!(out, " {:?}", c);
                        }
                        ValueKind::Def(_) => {
                            let _ = write!(out, " %{}", arg.0);
                        }
                    }
                }
                if let Some(r) = instr.result {
                    let _ = write!(out, " -> %{}", r.0);
                }
                let _ = writeln!(out);
            }
        }
        out
    }
}
