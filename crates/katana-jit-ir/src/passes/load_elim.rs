//! Context / local load elimination.
//!
//! Walks each block forward keeping a map from (offset, type) to the most
//! recent value loaded from or stored to that slot. A load whose key is
//! present is replaced by the cached value and removed. A store updates the
//! cache and invalidates any entry whose byte range overlaps the stored
//! range. Instructions flagged `INVALIDATE_CONTEXT` clear everything: their
//! callbacks may re-bank registers or swap FP precision behind our back.
//! Guest memory accesses are never cached, aliasing there is unknowable.

use std::collections::HashMap;

use crate::builder::IrBuilder;
use crate::ir::{Opcode, Type, ValueId};

#[derive(Default)]
struct AvailableSet {
    entries: HashMap<(u32, Type), ValueId>,
}

impl AvailableSet {
    fn get(&self, offset: u32, ty: Type) -> Option<ValueId> {
        self.entries.get(&(offset, ty)).copied()
    }

    fn put(&mut self, offset: u32, ty: Type, v: ValueId) {
        self.entries.insert((offset, ty), v);
    }

    /// Drop every entry overlapping [offset, offset + size).
    fn invalidate_range(&mut self, offset: u32, size: u32) {
        self.entries
            .retain(|&(o, ty), _| o + ty.size() <= offset || offset + size <= o);
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

pub fn load_elim(b: &mut IrBuilder) {
    let mut removed = 0usize;

    for block in b.block_ids() {
        let mut ctx = AvailableSet::default();
        let mut locals = AvailableSet::default();

        for id in b.instr_ids(block) {
            let op = b.instr(id).op;

            if b.instr(id).invalidates_context() {
                ctx.clear();
                locals.clear();
            }

            match op {
                Opcode::LoadContext | Opcode::LoadLocal => {
                    let offset = b
                        .value(b.instr(id).arg(0))
                        .constant()
                        .expect("load offset must be constant")
                        .i32_value() as u32;
                    let result = b.instr(id).result.unwrap();
                    let ty = b.ty(result);
                    let set = if op == Opcode::LoadContext { &mut ctx } else { &mut locals };

                    if let Some(cached) = set.get(offset, ty) {
                        b.replace_uses_with(result, cached);
                        b.remove_instr(id);
                        removed += 1;
                    } else {
                        set.put(offset, ty, result);
                    }
                }

                Opcode::StoreContext | Opcode::StoreLocal => {
                    let offset = b
                        .value(b.instr(id).arg(0))
                        .constant()
                        .expect("store offset must be constant")
                        .i32_value() as u32;
                    let v = b.instr(id).arg(1);
                    let ty = b.ty(v);
                    let set = if op == Opcode::StoreContext { &mut ctx } else { &mut locals };

                    set.invalidate_range(offset, ty.size());
                    set.put(offset, ty, v);
                }

                _ => {}
            }
        }
    }

    tracing::debug!(removed, "load_elim");
}
