//! Runtime options.

#[derive(Clone, Debug)]
pub struct Config {
    /// TCP port the GDB stub listens on.
    pub gdb_port: u16,
    /// Length of one core-thread time slice in guest nanoseconds.
    pub time_slice_ns: u64,
    /// Instruction cap per translated block; 0 means unbounded.
    pub max_block_instrs: usize,
    /// Audio ring buffer capacity in bytes (rounded up to a power of two).
    pub audio_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            gdb_port: 24690,
            time_slice_ns: 1_000_000,
            max_block_instrs: 0,
            audio_buffer_size: 0x10000,
        }
    }
}
