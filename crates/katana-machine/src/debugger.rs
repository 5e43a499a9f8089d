//! GDB stub wiring.
//!
//! Adapts a device's debug interface to the stub's target trait and couples
//! stop/resume to the machine's suspended state. Everything runs on the core
//! thread: the stub is pumped at tick boundaries, so target callbacks never
//! race guest execution.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use katana_gdb::{signal, BreakpointKind, GdbError, GdbServer, GdbTarget};

/// Debug interface a device exposes to become debuggable.
pub trait DebugInterface {
    fn step(&mut self);
    fn add_bp(&mut self, kind: BreakpointKind, addr: u32);
    fn rem_bp(&mut self, kind: BreakpointKind, addr: u32);
    fn read_mem(&mut self, addr: u32, buf: &mut [u8]);
    fn read_reg(&mut self, n: usize) -> (u64, usize);
    fn num_regs(&self) -> usize;
}

pub struct DebugAdapter<D> {
    dev: Rc<RefCell<D>>,
    suspended: Rc<Cell<bool>>,
}

impl<D: DebugInterface> GdbTarget for DebugAdapter<D> {
    fn detach(&mut self) {
        self.suspended.set(false);
    }

    fn stop(&mut self) {
        self.suspended.set(true);
    }

    fn resume(&mut self) {
        self.suspended.set(false);
    }

    fn step(&mut self) {
        self.dev.borrow_mut().step();
    }

    fn add_bp(&mut self, kind: BreakpointKind, addr: u32) {
        self.dev.borrow_mut().add_bp(kind, addr);
    }

    fn rem_bp(&mut self, kind: BreakpointKind, addr: u32) {
        self.dev.borrow_mut().rem_bp(kind, addr);
    }

    fn read_mem(&mut self, addr: u32, buf: &mut [u8]) {
        self.dev.borrow_mut().read_mem(addr, buf);
    }

    fn read_reg(&mut self, n: usize) -> (u64, usize) {
        self.dev.borrow_mut().read_reg(n)
    }

    fn num_regs(&self) -> usize {
        self.dev.borrow().num_regs()
    }
}

pub struct Debugger<D> {
    server: GdbServer<DebugAdapter<D>>,
    suspended: Rc<Cell<bool>>,
}

impl<D: DebugInterface> Debugger<D> {
    pub fn new(dev: Rc<RefCell<D>>, port: u16) -> Result<Self, GdbError> {
        let suspended = Rc::new(Cell::new(false));
        let server = GdbServer::new(
            DebugAdapter {
                dev,
                suspended: suspended.clone(),
            },
            port,
        )?;
        Ok(Debugger { server, suspended })
    }

    pub fn port(&self) -> u16 {
        self.server.port()
    }

    /// The machine hit a breakpoint: suspend and tell the client.
    pub fn trap(&mut self) {
        self.suspended.set(true);
        self.server.interrupt(signal::TRAP);
    }

    pub fn suspended(&self) -> bool {
        self.suspended.get()
    }

    pub fn pump(&mut self) {
        self.server.pump();
    }
}
