use katana_jit_ir::interp::ExecEnv;
use katana_jit_ir::Type;

/// Flat test environment: a byte-addressed context and a small guest RAM.
pub struct SimpleEnv {
    pub context: Vec<u8>,
    pub ram: Vec<u8>,
    pub external_calls: Vec<(u64, Option<u64>)>,
}

impl SimpleEnv {
    pub fn new(context_size: usize, ram_size: usize) -> Self {
        SimpleEnv {
            context: vec![0; context_size],
            ram: vec![0; ram_size],
            external_calls: Vec::new(),
        }
    }

    pub fn write_ctx_u32(&mut self, offset: usize, v: u32) {
        self.context[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
    }

    pub fn read_ctx_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.context[offset..offset + 4].try_into().unwrap())
    }
}

impl ExecEnv for SimpleEnv {
    fn context(&mut self) -> &mut [u8] {
        &mut self.context
    }

    fn load_guest(&mut self, addr: u32, ty: Type) -> u64 {
        let mut out = 0u64;
        for i in (0..ty.size() as usize).rev() {
            out = (out << 8) | self.ram[addr as usize + i] as u64;
        }
        out
    }

    fn store_guest(&mut self, addr: u32, bits: u64, ty: Type) {
        for i in 0..ty.size() as usize {
            self.ram[addr as usize + i] = (bits >> (8 * i)) as u8;
        }
    }

    fn call_external(&mut self, func: u64, arg: Option<u64>) {
        self.external_calls.push((func, arg));
    }
}
