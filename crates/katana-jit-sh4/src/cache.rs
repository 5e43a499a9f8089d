//! Translation cache.
//!
//! Compiled blocks are keyed by guest PC plus the FPSCR precision bits that
//! were baked into the translation. Entries are write-once; a flush drops
//! everything (the core thread blocks new translations while flushing).

use std::collections::HashMap;

use crate::context::{FPSCR_PR, FPSCR_SZ};

pub type BlockKey = (u32, u32);

pub fn block_key(pc: u32, fpscr: u32) -> BlockKey {
    (pc, fpscr & (FPSCR_PR | FPSCR_SZ))
}

pub struct TranslationCache<B> {
    blocks: HashMap<BlockKey, B>,
}

impl<B> Default for TranslationCache<B> {
    fn default() -> Self {
        TranslationCache {
            blocks: HashMap::new(),
        }
    }
}

impl<B> TranslationCache<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pc: u32, fpscr: u32) -> Option<&B> {
        self.blocks.get(&block_key(pc, fpscr))
    }

    /// Install a compiled block. Each key is written exactly once between
    /// flushes.
    pub fn insert(&mut self, pc: u32, fpscr: u32, block: B) -> &B {
        let key = block_key(pc, fpscr);
        debug_assert!(!self.blocks.contains_key(&key), "block {key:?} recompiled");
        self.blocks.entry(key).or_insert(block)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn flush(&mut self) {
        tracing::debug!(blocks = self.blocks.len(), "translation cache flush");
        self.blocks.clear();
    }
}
