//! Machine glue: the engine object owning the scheduler and the per-machine
//! services the three cores plug into.
//!
//! The core thread drives [`Machine::tick`] in fixed slices; the render/UI
//! thread never touches anything here except the audio ring consumer and
//! the `running` flag.

mod config;
mod cpu;
mod debugger;
mod ringbuf;
mod video;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use katana_gdb::GdbError;
use katana_timers::{Scheduler, TimerEvent};

pub use config::Config;
pub use cpu::{CpuHooks, MemoryBus, Sh4Cpu, STORE_QUEUE_END, STORE_QUEUE_START};
pub use debugger::{DebugAdapter, Debugger, DebugInterface};
pub use ringbuf::{ring_buffer, Consumer, Producer};
pub use video::{frame_channel, FrameReceiver, FrameSender};

pub struct Machine<D: DebugInterface, E> {
    pub config: Config,
    pub scheduler: Scheduler<E>,
    device: Rc<RefCell<D>>,
    debugger: Option<Debugger<D>>,
    running: Arc<AtomicBool>,
}

impl<D: DebugInterface, E> Machine<D, E> {
    pub fn new(config: Config, device: D) -> Self {
        Machine {
            config,
            scheduler: Scheduler::new(),
            device: Rc::new(RefCell::new(device)),
            debugger: None,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn device(&self) -> Rc<RefCell<D>> {
        self.device.clone()
    }

    /// Attach the GDB stub on the configured port.
    pub fn attach_debugger(&mut self) -> Result<u16, GdbError> {
        let debugger = Debugger::new(self.device.clone(), self.config.gdb_port)?;
        let port = debugger.port();
        self.debugger = Some(debugger);
        Ok(port)
    }

    pub fn debugger_mut(&mut self) -> Option<&mut Debugger<D>> {
        self.debugger.as_mut()
    }

    /// Handle other threads use to stop the core loop at the next tick.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn suspended(&self) -> bool {
        self.debugger.as_ref().map(|d| d.suspended()).unwrap_or(false)
    }

    /// Run one time slice: pump the debugger, then fire due timers and
    /// advance guest time unless the target is suspended. Returns false once
    /// the machine should shut down.
    pub fn tick(&mut self, fire: impl FnMut(TimerEvent<E>)) -> bool {
        if !self.is_running() {
            return false;
        }

        if let Some(debugger) = &mut self.debugger {
            debugger.pump();
            if debugger.suspended() {
                return true;
            }
        }

        self.scheduler.tick(self.config.time_slice_ns, fire);
        true
    }
}
