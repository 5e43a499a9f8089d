//! Structural verification of a compilation unit.
//!
//! Checks the invariants that the builder and passes are supposed to
//! preserve: argument definitions dominate their uses (in the reverse
//! post-order implied by block list order), use lists agree with argument
//! slots in both directions, terminators are final, and constant payloads
//! agree with their type tags.

use std::collections::HashSet;

use thiserror::Error;

use crate::builder::IrBuilder;
use crate::ir::{Use, ValueId, ValueKind};

#[derive(Debug, Error, PartialEq)]
pub enum VerifyError {
    #[error("instruction {instr} uses value %{value} before its definition")]
    UseBeforeDef { instr: u32, value: u32 },
    #[error("value %{value} use list does not match argument slots")]
    UseListMismatch { value: u32 },
    #[error("block {block} has an instruction after its terminator")]
    InstrAfterTerminator { block: u32 },
    #[error("constant %{value} payload disagrees with its type tag")]
    ConstTypeMismatch { value: u32 },
}

pub fn verify(b: &IrBuilder) -> Result<(), VerifyError> {
    let mut defined: HashSet<ValueId> = HashSet::new();

    for block in b.block_ids() {
        let mut seen_terminator = false;

        for id in b.instr_ids(block) {
            let instr = b.instr(id);

            if seen_terminator {
                return Err(VerifyError::InstrAfterTerminator { block: block.0 });
            }
            if instr.op.is_terminator() {
                seen_terminator = true;
            }

            for (slot, arg) in instr.args.iter().enumerate() {
                let Some(arg) = arg else { continue };
                let value = b.value(*arg);

                match value.kind {
                    ValueKind::Const(c) => {
                        if c.ty() != value.ty {
                            return Err(VerifyError::ConstTypeMismatch { value: arg.0 });
                        }
                    }
                    ValueKind::Def(_) => {
                        if !defined.contains(arg) {
                            return Err(VerifyError::UseBeforeDef {
                                instr: id.0,
                                value: arg.0,
                            });
                        }
                    }
                }

                let this_use = Use {
                    instr: id,
                    slot: slot as u8,
                };
                if !value.uses.contains(&this_use) {
                    return Err(VerifyError::UseListMismatch { value: arg.0 });
                }
            }

            if let Some(result) = instr.result {
                defined.insert(result);
            }
        }
    }

    // reverse direction: every recorded use is an actual argument slot
    for block in b.block_ids() {
        for id in b.instr_ids(block) {
            if let Some(result) = b.instr(id).result {
                for u in &b.value(result).uses {
                    if b.instr(u.instr).args[u.slot as usize] != Some(result) {
                        return Err(VerifyError::UseListMismatch { value: result.0 });
                    }
                }
            }
        }
    }

    Ok(())
}
