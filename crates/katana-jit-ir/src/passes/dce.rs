//! Dead code elimination.
//!
//! Seeds liveness from instructions with side effects (stores, branches,
//! external calls, or the explicit `HAS_SIDE_EFFECTS` flag), walks uses
//! transitively, removes everything unmarked, then splices out blocks left
//! with no instructions, redirecting their incoming edges to the successor.

use std::collections::HashSet;

use crate::builder::IrBuilder;
use crate::ir::{InstrFlags, InstrId, ValueKind};

pub fn dce(b: &mut IrBuilder) {
    let mut live: HashSet<InstrId> = HashSet::new();
    let mut worklist: Vec<InstrId> = Vec::new();

    for block in b.block_ids() {
        for id in b.instr_ids(block) {
            let instr = b.instr(id);
            if instr.op.has_side_effects() || instr.flags.contains(InstrFlags::HAS_SIDE_EFFECTS) {
                live.insert(id);
                worklist.push(id);
            }
        }
    }

    while let Some(id) = worklist.pop() {
        for slot in 0..b.instr(id).args.len() {
            let Some(arg) = b.instr(id).args[slot] else { continue };
            if let ValueKind::Def(def) = b.value(arg).kind {
                if live.insert(def) {
                    worklist.push(def);
                }
            }
        }
    }

    let mut removed = 0usize;
    for block in b.block_ids() {
        for id in b.instr_ids(block) {
            if !live.contains(&id) {
                b.remove_instr(id);
                removed += 1;
            }
        }
    }

    // splice out blocks emptied above
    let mut spliced = 0usize;
    for block in b.block_ids() {
        if b.block(block).head.is_some() {
            continue;
        }
        if let Some(next) = b.block(block).next {
            let incoming = std::mem::take(&mut b.block_mut(block).incoming);
            for e in incoming {
                let src = b.edge(e).src;
                b.block_mut(src).outgoing.retain(|&o| o != e);
                b.add_edge(src, next);
            }
            b.remap_block_refs(block, next);
        }
        b.remove_block(block);
        spliced += 1;
    }

    tracing::debug!(removed, spliced, "dce");
}
