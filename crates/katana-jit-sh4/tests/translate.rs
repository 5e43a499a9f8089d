use katana_jit_ir::interp::{run, ExecEnv, RunExit};
use katana_jit_ir::passes::run_default_passes;
use katana_jit_ir::verify::verify;
use katana_jit_ir::Type;
use katana_jit_sh4::{GuestMemory, Sh4Context, Sh4Frontend};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const RAM_BASE: u32 = 0x8c00_0000;

/// A context plus a small flat RAM window at `RAM_BASE`.
struct TestMachine {
    ctx: Sh4Context,
    ram: Vec<u8>,
    external_calls: Vec<(u64, Option<u64>)>,
}

impl TestMachine {
    fn new() -> Self {
        let mut ctx = Sh4Context::default();
        ctx.sr_updated = 0x10;
        ctx.fpscr_updated = 0x20;
        ctx.invalid_instruction = 0x30;
        ctx.prefetch = 0x40;
        TestMachine {
            ctx,
            ram: vec![0; 0x10000],
            external_calls: Vec::new(),
        }
    }

    fn load_code(&mut self, addr: u32, opcodes: &[u16]) {
        let mut at = (addr - RAM_BASE) as usize;
        for op in opcodes {
            self.ram[at..at + 2].copy_from_slice(&op.to_le_bytes());
            at += 2;
        }
    }

    /// Translate and execute one block starting at `pc`.
    fn run_block(&mut self, pc: u32, max_instrs: usize) {
        let frontend = Sh4Frontend::new();
        let mut unit = frontend.translate(&Ram(&self.ram), &self.ctx, pc, max_instrs);
        assert_eq!(verify(&unit), Ok(()));
        run_default_passes(&mut unit);
        assert_eq!(verify(&unit), Ok(()));
        assert_eq!(run(&unit, self), RunExit::FellThrough);
    }
}

struct Ram<'a>(&'a [u8]);

impl GuestMemory for Ram<'_> {
    fn read16(&self, addr: u32) -> u16 {
        let at = (addr - RAM_BASE) as usize;
        u16::from_le_bytes(self.0[at..at + 2].try_into().unwrap())
    }
}

impl ExecEnv for TestMachine {
    fn context(&mut self) -> &mut [u8] {
        self.ctx.as_bytes_mut()
    }

    fn load_guest(&mut self, addr: u32, ty: Type) -> u64 {
        let at = (addr - RAM_BASE) as usize;
        let mut out = 0u64;
        for i in (0..ty.size() as usize).rev() {
            out = (out << 8) | self.ram[at + i] as u64;
        }
        out
    }

    fn store_guest(&mut self, addr: u32, bits: u64, ty: Type) {
        let at = (addr - RAM_BASE) as usize;
        for i in 0..ty.size() as usize {
            self.ram[at + i] = (bits >> (8 * i)) as u8;
        }
    }

    fn call_external(&mut self, func: u64, arg: Option<u64>) {
        self.external_calls.push((func, arg));
    }
}

#[test]
fn add_immediate() {
    let mut m = TestMachine::new();
    m.ctx.r[3] = 0x1000;
    m.ctx.num_cycles = 100;
    m.load_code(RAM_BASE, &[0x7301]); // ADD #1,R3

    m.run_block(RAM_BASE, 1);

    assert_eq!(m.ctx.r[3], 0x1001);
    assert_eq!(m.ctx.num_cycles, 99);
    assert_eq!(m.ctx.num_instrs, 1);
    assert_eq!(m.ctx.pc, RAM_BASE + 2);
}

#[test]
fn delay_slot_overwrites_branch_source() {
    let mut m = TestMachine::new();
    m.ctx.r[0] = 0x8c00_0100;
    m.load_code(
        RAM_BASE,
        &[
            0x402b, // JMP @R0
            0xe000, // MOV #0,R0 (delay slot)
        ],
    );

    m.run_block(RAM_BASE, 0);

    // the branch goes to the pre-delay-slot value of R0
    assert_eq!(m.ctx.pc, 0x8c00_0100);
    assert_eq!(m.ctx.r[0], 0);
}

#[test]
fn bsrf_destination_ignores_delay_slot_write() {
    let mut m = TestMachine::new();
    m.ctx.r[1] = 0x200;
    m.load_code(
        RAM_BASE,
        &[
            0x0103, // BSRF R1
            0x7108, // ADD #8,R1 (delay slot)
        ],
    );

    m.run_block(RAM_BASE, 0);

    assert_eq!(m.ctx.pc, RAM_BASE + 4 + 0x200);
    assert_eq!(m.ctx.pr, RAM_BASE + 4);
    assert_eq!(m.ctx.r[1], 0x208);
}

#[test]
fn conditional_branch_with_delay_slot() {
    // BT/S taken: T decides before the delay slot runs
    let mut m = TestMachine::new();
    m.ctx.sr = 1; // T set
    m.load_code(
        RAM_BASE,
        &[
            0x8d04, // BT/S +8 -> dest = base + 4 + 8
            0xe207, // MOV #7,R2 (delay slot)
        ],
    );

    m.run_block(RAM_BASE, 0);

    assert_eq!(m.ctx.pc, RAM_BASE + 4 + 8);
    assert_eq!(m.ctx.r[2], 7);
}

#[test]
fn fallthrough_block_resumes_at_next_pc() {
    let mut m = TestMachine::new();
    m.ctx.r[4] = 5;
    m.load_code(
        RAM_BASE,
        &[
            0x7401, // ADD #1,R4
            0x7401, // ADD #1,R4
            0x7401, // ADD #1,R4
        ],
    );

    // cap the block at two instructions
    m.run_block(RAM_BASE, 2);

    assert_eq!(m.ctx.r[4], 7);
    assert_eq!(m.ctx.pc, RAM_BASE + 4);
    assert_eq!(m.ctx.num_instrs, 2);
}

#[test]
fn block_ends_on_sr_write() {
    let mut m = TestMachine::new();
    m.ctx.r[2] = 0x500000f0;
    m.load_code(
        RAM_BASE,
        &[
            0x420e, // LDC R2,SR
            0x7401, // ADD #1,R4 (must not be part of the block)
        ],
    );

    m.run_block(RAM_BASE, 0);

    assert_eq!(m.ctx.sr, 0x500000f0);
    assert_eq!(m.ctx.r[4], 0);
    assert_eq!(m.ctx.pc, RAM_BASE + 2);
    // sr_updated callback observed the old SR
    assert!(m.external_calls.contains(&(0x10, Some(0))));
}

#[test]
fn block_ends_on_fpscr_write() {
    let mut m = TestMachine::new();
    m.load_code(
        RAM_BASE,
        &[
            0xf3fd, // FSCHG
            0x7401, // ADD #1,R4
        ],
    );

    m.run_block(RAM_BASE, 0);

    assert_eq!(m.ctx.fpscr & katana_jit_sh4::FPSCR_SZ, katana_jit_sh4::FPSCR_SZ);
    assert_eq!(m.ctx.r[4], 0);
    assert_eq!(m.ctx.pc, RAM_BASE + 2);
}

#[test]
fn invalid_opcode_calls_host_hook() {
    let mut m = TestMachine::new();
    m.load_code(RAM_BASE, &[0x0000]);

    m.run_block(RAM_BASE, 0);

    assert!(m
        .external_calls
        .contains(&(0x30, Some(RAM_BASE as u64))));
}

#[test]
fn pref_calls_host_hook_with_address() {
    let mut m = TestMachine::new();
    m.ctx.r[6] = 0xe000_0000;
    m.load_code(RAM_BASE, &[0x0683]); // PREF @R6

    m.run_block(RAM_BASE, 1);

    assert!(m.external_calls.contains(&(0x40, Some(0xe000_0000))));
}

#[test]
fn mov_load_sign_extends() {
    let mut m = TestMachine::new();
    m.ctx.r[1] = RAM_BASE + 0x100;
    m.ram[0x100] = 0x80;
    m.load_code(RAM_BASE, &[0x6210]); // MOV.B @R1,R2

    m.run_block(RAM_BASE, 1);

    assert_eq!(m.ctx.r[2], 0xffff_ff80);
}

#[test]
fn store_predecrement_writes_through_new_address() {
    let mut m = TestMachine::new();
    m.ctx.r[5] = RAM_BASE + 0x104;
    m.ctx.r[3] = 0xdead_beef;
    m.load_code(RAM_BASE, &[0x2536]); // MOV.L R3,@-R5

    m.run_block(RAM_BASE, 1);

    assert_eq!(m.ctx.r[5], RAM_BASE + 0x100);
    assert_eq!(
        &m.ram[0x100..0x104],
        &0xdead_beefu32.to_le_bytes()
    );
}

#[test]
fn movt_copies_t_bit() {
    let mut m = TestMachine::new();
    m.ctx.r[1] = 3;
    m.ctx.r[2] = 3;
    m.load_code(
        RAM_BASE,
        &[
            0x3120, // CMP/EQ R2,R1
            0x0329, // MOVT R3
        ],
    );

    m.run_block(RAM_BASE, 0);

    assert_eq!(m.ctx.sr & 1, 1);
    assert_eq!(m.ctx.r[3], 1);
}

#[test]
fn fmov_load_swizzles_single_registers() {
    let mut m = TestMachine::new();
    m.ctx.r[1] = RAM_BASE + 0x200;
    m.ram[0x200..0x204].copy_from_slice(&1.0f32.to_bits().to_le_bytes());
    m.load_code(RAM_BASE, &[0xf218]); // FMOV.S @R1,FR2

    m.run_block(RAM_BASE, 1);

    // 32-bit stores go through the xor-1 swizzle
    assert_eq!(m.ctx.fr[3], 1.0f32.to_bits());
}

#[test]
fn fsca_reads_sin_cos_table() {
    let mut m = TestMachine::new();
    m.ctx.fpul = 0x4000; // quarter turn
    m.load_code(RAM_BASE, &[0xf0fd]); // FSCA FPUL,DR0

    m.run_block(RAM_BASE, 1);

    let sin = f32::from_bits(m.ctx.fr[1]);
    let cos = f32::from_bits(m.ctx.fr[0]);
    assert!((sin - 1.0).abs() < 1e-6, "sin(pi/2) = {sin}");
    assert!(cos.abs() < 1e-6, "cos(pi/2) = {cos}");
}

#[test]
fn ftrv_multiplies_matrix_by_vector() {
    let mut m = TestMachine::new();
    // XMTRX = 2 * identity, in column-major XF order with the 32-bit swizzle
    for c in 0..4usize {
        for r in 0..4usize {
            let v = if r == c { 2.0f32 } else { 0.0 };
            m.ctx.xf[(c * 4 + r) ^ 1] = v.to_bits();
        }
    }
    for (i, v) in [1.0f32, 2.0, 3.0, 4.0].iter().enumerate() {
        m.ctx.fr[i ^ 1] = v.to_bits();
    }
    m.load_code(RAM_BASE, &[0xf1fd]); // FTRV XMTRX,FV0

    m.run_block(RAM_BASE, 1);

    for (i, expect) in [2.0f32, 4.0, 6.0, 8.0].iter().enumerate() {
        assert_eq!(f32::from_bits(m.ctx.fr[i ^ 1]), *expect, "lane {i}");
    }
}

#[test]
fn div0u_initializes_divide_state() {
    let mut m = TestMachine::new();
    m.ctx.sr = 1;
    m.load_code(RAM_BASE, &[0x0019]); // DIV0U

    m.run_block(RAM_BASE, 1);

    assert_eq!(m.ctx.sr_qm, 0x8000_0000);
    assert_eq!(m.ctx.sr & 1, 0);
}

/// The documented 32/32 unsigned division sequence: DIV0U then 32 iterations
/// of ROTCL dividend / DIV1 divisor, then a final ROTCL to recover the
/// quotient.
fn run_div32(dividend: u32, divisor: u32) -> u32 {
    let mut m = TestMachine::new();
    m.ctx.r[0] = divisor;
    m.ctx.r[1] = dividend;
    m.ctx.r[2] = 0;

    let mut code = vec![0x0019u16]; // DIV0U
    for _ in 0..32 {
        code.push(0x4124); // ROTCL R1
        code.push(0x3204); // DIV1 R0,R2
    }
    code.push(0x4124); // ROTCL R1
    m.load_code(RAM_BASE, &code);

    m.run_block(RAM_BASE, 0);
    m.ctx.r[1]
}

#[test]
fn div1_sequence_divides() {
    assert_eq!(run_div32(100, 3), 33);
    assert_eq!(run_div32(0xffff_ffff, 1), 0xffff_ffff);
    assert_eq!(run_div32(7, 9), 0);
    assert_eq!(run_div32(0x8000_0000, 2), 0x4000_0000);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn div1_matches_host_division(dividend: u32, divisor in 1u32..) {
        prop_assert_eq!(run_div32(dividend, divisor), dividend / divisor);
    }
}

/// Pick a random register-only ALU opcode (no memory, no branches).
fn random_alu_opcode(rng: &mut ChaCha8Rng) -> u16 {
    let n = rng.gen_range(0..16u16) << 8;
    let m = rng.gen_range(0..16u16) << 4;
    let imm = rng.gen_range(0..=0xffu16);

    match rng.gen_range(0..8u32) {
        // MOV / ADD / SUB / AND / OR / XOR Rm,Rn
        0 => 0x6003 | n | m,
        1 => {
            let op = [0x300cu16, 0x3008, 0x2009, 0x200b, 0x200a][rng.gen_range(0..5)];
            op | n | m
        }
        // NOT / NEG / SWAP / EXT
        2 => {
            let op = [0x6007u16, 0x600b, 0x6008, 0x6009, 0x600c, 0x600d, 0x600e, 0x600f]
                [rng.gen_range(0..8)];
            op | n | m
        }
        // single-register shifts, rotates, DT
        3 => {
            let op = [0x4000u16, 0x4001, 0x4008, 0x4009, 0x4010, 0x4021, 0x4024, 0x4025]
                [rng.gen_range(0..8)];
            op | n
        }
        // MOV #imm / ADD #imm
        4 => 0xe000 | n | imm,
        5 => 0x7000 | n | imm,
        // compares + MOVT
        6 => {
            let op = [0x3000u16, 0x3002, 0x3003, 0x3006, 0x3007][rng.gen_range(0..5)];
            op | n | m
        }
        _ => 0x0029 | n,
    }
}

/// Blocks emitted from random ALU sequences must execute identically before
/// and after the pass pipeline.
#[test]
fn random_alu_blocks_optimize_soundly() {
    let mut rng = ChaCha8Rng::seed_from_u64(0xD15EA5E);
    let frontend = Sh4Frontend::new();

    for _ in 0..100 {
        let count = rng.gen_range(1..24usize);
        let code: Vec<u16> = (0..count).map(|_| random_alu_opcode(&mut rng)).collect();

        let mut baseline = TestMachine::new();
        for r in baseline.ctx.r.iter_mut() {
            *r = rng.gen();
        }
        let mut optimized = TestMachine::new();
        optimized.ctx.r = baseline.ctx.r;

        baseline.load_code(RAM_BASE, &code);
        optimized.load_code(RAM_BASE, &code);

        let mut unit = frontend.translate(&Ram(&baseline.ram), &baseline.ctx, RAM_BASE, count);
        assert_eq!(verify(&unit), Ok(()));
        run(&unit, &mut baseline);

        run_default_passes(&mut unit);
        assert_eq!(verify(&unit), Ok(()));
        run(&unit, &mut optimized);

        assert_eq!(baseline.ctx.as_bytes(), optimized.ctx.as_bytes());
    }
}
