use katana_jit_ir::verify::{verify, VerifyError};
use katana_jit_ir::{IrBuilder, Type};

#[test]
fn straight_line_unit_verifies() {
    let mut b = IrBuilder::new();
    let r3 = b.load_context(12, Type::I32);
    let one = b.const_i32(1);
    let sum = b.add(r3, one);
    b.store_context(12, sum);

    assert_eq!(verify(&b), Ok(()));
}

#[test]
fn conditional_branch_creates_fall_through_block() {
    let mut b = IrBuilder::new();
    let cond = b.load_context(0, Type::I32);
    let dest = b.const_u32(0x8c00_0000);
    b.branch_true(cond, dest);
    // lands in the auto-created fall-through block
    let v = b.const_i32(7);
    b.store_context(4, v);

    assert_eq!(b.block_ids().len(), 2);
    assert_eq!(verify(&b), Ok(()));
}

#[test]
fn use_before_def_is_rejected() {
    let mut b = IrBuilder::new();
    let x = b.load_context(0, Type::I32);
    let y = b.load_context(4, Type::I32);
    let sum = b.add(x, y);
    b.store_context(8, sum);

    // move the defining load after its use by removing and re-appending
    let first_block = b.block_ids()[0];
    let load = b.instr_ids(first_block)[0];
    b.remove_instr(load);
    assert!(matches!(verify(&b), Err(VerifyError::UseBeforeDef { .. })));
}

#[test]
fn terminator_opens_new_block_on_next_append() {
    let mut b = IrBuilder::new();
    let dest = b.const_u32(0x8c00_0010);
    b.branch(dest);
    let v = b.const_i32(1);
    b.store_context(0, v);

    let blocks = b.block_ids();
    assert_eq!(blocks.len(), 2);
    assert_eq!(b.instr_ids(blocks[0]).len(), 1);
    assert_eq!(b.instr_ids(blocks[1]).len(), 1);
    assert_eq!(verify(&b), Ok(()));
}
