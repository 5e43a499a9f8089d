mod common;

use pretty_assertions::assert_eq;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use common::SimpleEnv;
use katana_jit_ir::interp::run;
use katana_jit_ir::passes::{const_fold, dce, load_elim, run_default_passes};
use katana_jit_ir::verify::verify;
use katana_jit_ir::{IrBuilder, Opcode, Type};

fn count_ops(b: &IrBuilder, op: Opcode) -> usize {
    b.block_ids()
        .into_iter()
        .flat_map(|blk| b.instr_ids(blk))
        .filter(|&i| b.instr(i).op == op)
        .count()
}

#[test]
fn load_elim_reuses_prior_load() {
    let mut b = IrBuilder::new();
    let a = b.load_context(0, Type::I32);
    let c = b.load_context(0, Type::I32);
    let sum = b.add(a, c);
    b.store_context(4, sum);

    load_elim(&mut b);
    assert_eq!(count_ops(&b, Opcode::LoadContext), 1);
    assert_eq!(verify(&b), Ok(()));
}

#[test]
fn load_elim_forwards_stored_value() {
    let mut b = IrBuilder::new();
    let v = b.const_i32(42);
    b.store_context(0, v);
    let loaded = b.load_context(0, Type::I32);
    b.store_context(4, loaded);

    load_elim(&mut b);
    assert_eq!(count_ops(&b, Opcode::LoadContext), 0);
}

#[test]
fn load_elim_invalidates_overlapping_store() {
    let mut b = IrBuilder::new();
    let _a = b.load_context(0, Type::I32);
    let byte = b.const_i8(1);
    b.store_context(2, byte); // overlaps [0, 4)
    let again = b.load_context(0, Type::I32);
    b.store_context(8, again);

    load_elim(&mut b);
    assert_eq!(count_ops(&b, Opcode::LoadContext), 2);
}

#[test]
fn load_elim_cleared_by_invalidate_context() {
    let mut b = IrBuilder::new();
    let a = b.load_context(0, Type::I32);
    b.store_context(4, a);
    let func = b.const_i64(0x1234);
    b.call_external(func);
    let again = b.load_context(0, Type::I32);
    b.store_context(8, again);

    load_elim(&mut b);
    assert_eq!(count_ops(&b, Opcode::LoadContext), 2);
}

#[test]
fn guest_loads_are_never_cached() {
    let mut b = IrBuilder::new();
    let addr = b.const_u32(0x100);
    let a = b.load_guest(addr, Type::I32);
    let c = b.load_guest(addr, Type::I32);
    let sum = b.add(a, c);
    b.store_context(0, sum);

    load_elim(&mut b);
    assert_eq!(count_ops(&b, Opcode::LoadGuest), 2);
}

#[test]
fn fold_after_load_elim_produces_single_constant() {
    let mut b = IrBuilder::new();
    let x = b.const_i32(3);
    b.store_context(0, x);
    let loaded = b.load_context(0, Type::I32);
    let y = b.const_i32(4);
    let sum = b.add(loaded, y);
    b.store_context(4, sum);

    load_elim(&mut b);
    const_fold(&mut b);
    dce(&mut b);

    assert_eq!(count_ops(&b, Opcode::Add), 0);
    assert_eq!(count_ops(&b, Opcode::LoadContext), 0);

    let mut env = SimpleEnv::new(64, 0);
    run(&b, &mut env);
    assert_eq!(env.read_ctx_u32(4), 7);
}

#[test]
fn dce_removes_unused_loads() {
    let mut b = IrBuilder::new();
    let _dead = b.load_context(0, Type::I32);
    let v = b.const_i32(9);
    b.store_context(4, v);

    dce(&mut b);
    assert_eq!(count_ops(&b, Opcode::LoadContext), 0);
    assert_eq!(count_ops(&b, Opcode::StoreContext), 1);
}

#[test]
fn dce_splices_emptied_blocks() {
    let mut b = IrBuilder::new();
    let cond = b.load_context(0, Type::I32);
    let dest = b.const_u32(0x8c00_0100);
    b.branch_true(cond, dest);
    // the fall-through block holds only a dead load
    let _dead = b.load_context(4, Type::I32);

    dce(&mut b);
    assert_eq!(b.block_ids().len(), 1);
}

/// Random straight-line units must execute identically before and after the
/// full pass pipeline.
#[test]
fn random_units_match_after_optimization() {
    const CTX_SIZE: usize = 64;
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED);

    for _ in 0..250 {
        let mut b = IrBuilder::new();
        let mut values = Vec::new();

        for _ in 0..40 {
            match rng.gen_range(0..100u32) {
                0..=19 => {
                    values.push(b.const_i32(rng.gen()));
                }
                20..=39 => {
                    let slot = rng.gen_range(0..CTX_SIZE as u32 / 4) * 4;
                    values.push(b.load_context(slot, Type::I32));
                }
                40..=79 if !values.is_empty() => {
                    let x = values[rng.gen_range(0..values.len())];
                    let y = values[rng.gen_range(0..values.len())];
                    let v = match rng.gen_range(0..6u32) {
                        0 => b.add(x, y),
                        1 => b.sub(x, y),
                        2 => b.smul(x, y),
                        3 => b.and(x, y),
                        4 => b.or(x, y),
                        _ => b.xor(x, y),
                    };
                    values.push(v);
                }
                _ if !values.is_empty() => {
                    let slot = rng.gen_range(0..CTX_SIZE as u32 / 4) * 4;
                    let v = values[rng.gen_range(0..values.len())];
                    b.store_context(slot, v);
                }
                _ => {}
            }
        }

        let mut baseline = SimpleEnv::new(CTX_SIZE, 0);
        for i in 0..CTX_SIZE {
            baseline.context[i] = rng.gen();
        }
        let mut optimized = SimpleEnv::new(CTX_SIZE, 0);
        optimized.context.copy_from_slice(&baseline.context);

        run(&b, &mut baseline);

        run_default_passes(&mut b);
        assert_eq!(verify(&b), Ok(()));
        run(&b, &mut optimized);

        assert_eq!(baseline.context, optimized.context);
    }
}
