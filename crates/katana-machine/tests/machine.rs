use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use pretty_assertions::assert_eq;

use katana_jit_sh4::SR_RB;
use katana_machine::{Config, CpuHooks, Machine, MemoryBus, Sh4Cpu};

const RAM_BASE: u32 = 0x8c00_0000;
const RAM_SIZE: usize = 0x10000;

struct Ram(Vec<u8>);

impl Ram {
    fn new() -> Self {
        Ram(vec![0; RAM_SIZE])
    }

    fn load_code(&mut self, addr: u32, opcodes: &[u16]) {
        let mut at = (addr - RAM_BASE) as usize;
        for op in opcodes {
            self.0[at..at + 2].copy_from_slice(&op.to_le_bytes());
            at += 2;
        }
    }
}

impl MemoryBus for Ram {
    fn read(&mut self, addr: u32, size: usize) -> u64 {
        let at = (addr - RAM_BASE) as usize;
        let mut out = 0u64;
        for i in (0..size).rev() {
            out = (out << 8) | self.0[at + i] as u64;
        }
        out
    }

    fn write(&mut self, addr: u32, value: u64, size: usize) {
        let at = (addr - RAM_BASE) as usize;
        for i in 0..size {
            self.0[at + i] = (value >> (8 * i)) as u8;
        }
    }
}

#[derive(Default)]
struct Hooks {
    prefetches: Vec<u32>,
}

impl CpuHooks for Hooks {
    fn store_queue_prefetch(&mut self, addr: u32) {
        self.prefetches.push(addr);
    }

    fn invalid_instruction(&mut self, addr: u32) {
        panic!("invalid instruction at {addr:#010x}");
    }
}

fn cpu_with(code: &[u16]) -> Sh4Cpu<Ram, Hooks> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut ram = Ram::new();
    ram.load_code(RAM_BASE, code);
    let mut cpu = Sh4Cpu::new(ram, Hooks::default(), 0);
    cpu.ctx.pc = RAM_BASE;
    cpu
}

#[test]
fn cycle_budget_bounds_execution() {
    // BRA . / NOP: a tight idle loop, 3 cycles per block
    let mut cpu = cpu_with(&[0xaffe, 0x0009]);

    cpu.run(10);

    assert_eq!(cpu.ctx.pc, RAM_BASE);
    assert!(cpu.ctx.num_cycles <= 0);
    assert_eq!(cpu.ctx.num_instrs, 8);
}

#[test]
fn blocks_are_reused_from_the_cache() {
    let mut cpu = cpu_with(&[0xaffe, 0x0009]);

    cpu.run(30);
    cpu.flush_cache();
    cpu.run(30);

    assert_eq!(cpu.ctx.pc, RAM_BASE);
}

#[test]
fn sr_bank_swap_on_rb_change() {
    // LDC R2,SR with RB set swaps in the alternate bank
    let mut cpu = cpu_with(&[0x420e]);
    cpu.ctx.r[0] = 0x11;
    cpu.ctx.ralt[0] = 0x22;
    cpu.ctx.r[2] = SR_RB;

    cpu.run_block();

    assert_eq!(cpu.ctx.sr, SR_RB);
    assert_eq!(cpu.ctx.r[0], 0x22);
    assert_eq!(cpu.ctx.ralt[0], 0x11);
}

#[test]
fn store_queue_prefetch_reaches_the_hook() {
    // PREF @R6 twice: once inside the store queue range, once outside
    let mut cpu = cpu_with(&[0x0683, 0x0683]);
    cpu.ctx.r[6] = 0xe000_0020;

    cpu.step();
    cpu.ctx.r[6] = RAM_BASE;
    cpu.ctx.pc = RAM_BASE + 2;
    cpu.step();

    assert_eq!(cpu.hooks.prefetches, vec![0xe000_0020]);
}

#[test]
fn breakpoints_halt_the_run_loop() {
    // ADD, then a branch to an idle loop at +8 where the breakpoint sits
    let mut cpu = cpu_with(&[0x7001, 0xa001, 0x0009, 0x0009, 0xaffe, 0x0009]);
    cpu.add_breakpoint(RAM_BASE + 8);

    cpu.run(1000);

    // stopped at the block boundary before the breakpoint address ran
    assert_eq!(cpu.ctx.pc, RAM_BASE + 8);
    assert_eq!(cpu.ctx.r[0], 1);
    assert!(cpu.ctx.num_cycles > 0);
}

#[test]
fn debugger_suspends_the_machine() {
    let cpu = cpu_with(&[0xaffe, 0x0009]);

    let mut machine: Machine<_, ()> = Machine::new(
        Config {
            gdb_port: 0,
            ..Config::default()
        },
        cpu,
    );
    let port = machine.attach_debugger().unwrap();

    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    client
        .set_read_timeout(Some(Duration::from_millis(50)))
        .unwrap();
    std::thread::sleep(Duration::from_millis(10));
    assert!(machine.tick(|_| {}));

    // halt query suspends the target
    client.write_all(b"$?#3f").unwrap();
    std::thread::sleep(Duration::from_millis(10));
    assert!(machine.tick(|_| {}));
    assert!(machine.suspended());

    // guest time does not advance while suspended
    let before = machine.scheduler.now_ns();
    assert!(machine.tick(|_| {}));
    assert_eq!(machine.scheduler.now_ns(), before);

    // reply: ack + stop packet
    let mut buf = [0u8; 8];
    let mut n = 0;
    while n < buf.len() {
        match client.read(&mut buf[n..]) {
            Ok(0) => break,
            Ok(read) => n += read,
            Err(e) => panic!("read failed: {e}"),
        }
    }
    assert_eq!(&buf[..n], b"+$T00#b4");

    // continue resumes
    client.write_all(b"$c#63").unwrap();
    std::thread::sleep(Duration::from_millis(10));
    assert!(machine.tick(|_| {}));
    assert!(!machine.suspended());
    assert!(machine.scheduler.now_ns() > before);
}

#[test]
fn stopping_the_machine_ends_ticks() {
    let cpu = cpu_with(&[0x0009]);
    let mut machine: Machine<_, ()> = Machine::new(Config::default(), cpu);

    let running = machine.running_flag();
    assert!(machine.tick(|_| {}));

    running.store(false, std::sync::atomic::Ordering::Relaxed);
    assert!(!machine.tick(|_| {}));
}

#[test]
fn timers_fire_during_ticks() {
    let cpu = cpu_with(&[0x0009]);
    let mut machine: Machine<_, &str> = Machine::new(Config::default(), cpu);

    machine.scheduler.start_timer("vblank", 500_000);
    let mut fired = Vec::new();
    machine.tick(|ev| fired.push(ev.payload));

    assert_eq!(fired, vec!["vblank"]);
}
