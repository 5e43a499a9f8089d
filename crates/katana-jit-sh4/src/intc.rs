//! Interrupt controller bookkeeping.
//!
//! Requested interrupts are represented as a bitmask of priority-sorted ids
//! so that pending computation is a single mask. Reprioritizing rebuilds the
//! sorted table (after an IPR write) and re-requests outstanding interrupts
//! under their new sorted ids.

use crate::context::{SR_BL, SR_I_BIT, SR_I_MASK};

#[derive(Clone, Copy, Debug)]
pub struct InterruptInfo {
    pub default_priority: u8,
}

pub struct Sh4Intc {
    infos: Vec<InterruptInfo>,
    /// Priority assigned by guest IPR writes, if any.
    priority: Vec<Option<u8>>,
    requested: u64,
    /// Sorted id assigned to each interrupt, 1 bit each.
    sort_id: Vec<u64>,
    sorted: Vec<usize>,
    /// Mask covering all interrupts at or below each priority level.
    priority_mask: [u64; 16],
}

impl Sh4Intc {
    pub fn new(infos: Vec<InterruptInfo>) -> Self {
        assert!(infos.len() <= 64);
        let n = infos.len();
        let mut intc = Sh4Intc {
            infos,
            priority: vec![None; n],
            requested: 0,
            sort_id: vec![0; n],
            sorted: vec![0; n],
            priority_mask: [0; 16],
        };
        intc.reprioritize();
        intc
    }

    pub fn set_priority(&mut self, id: usize, level: u8) {
        self.priority[id] = Some(level & 0xf);
        self.reprioritize();
    }

    pub fn request(&mut self, id: usize) {
        self.requested |= self.sort_id[id];
    }

    pub fn clear(&mut self, id: usize) {
        self.requested &= !self.sort_id[id];
    }

    pub fn requested(&self) -> u64 {
        self.requested
    }

    /// Highest-priority requested interrupt id, if any is pending under the
    /// given SR.
    pub fn next_pending(&self, sr: u32, sleeping: bool) -> Option<usize> {
        let pending = self.pending(sr, sleeping);
        if pending == 0 {
            return None;
        }
        let bit = 63 - pending.leading_zeros() as usize;
        Some(self.sorted[bit])
    }

    /// Pending mask for the given SR: interrupts above the current IMASK
    /// level, unless blocked by SR.BL (ignored when sleeping).
    pub fn pending(&self, sr: u32, sleeping: bool) -> u64 {
        let min_priority = ((sr & SR_I_MASK) >> SR_I_BIT) as usize;
        let mut mask = !self.priority_mask[min_priority];

        let blocked = (sr & SR_BL) == SR_BL && !sleeping;
        if blocked {
            mask = 0;
        }

        self.requested & mask
    }

    /// Rebuild the sorted interrupt table, giving priority to lower ids when
    /// levels are equal, and re-request outstanding interrupts under their
    /// new sorted ids.
    fn reprioritize(&mut self) {
        let old = self.requested;
        self.requested = 0;

        let mut n = 0;
        for level in 0..16u8 {
            for i in (0..self.infos.len()).rev() {
                let priority = self.priority[i].unwrap_or(self.infos[i].default_priority);
                if priority != level {
                    continue;
                }

                let old_sort_id = self.sort_id[i];
                let was_requested = old_sort_id != 0 && old & old_sort_id == old_sort_id;

                self.sorted[n] = i;
                self.sort_id[i] = 1u64 << n;
                n += 1;

                if was_requested {
                    self.requested |= self.sort_id[i];
                }
            }

            self.priority_mask[level as usize] = (1u64 << n) - 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intc3() -> Sh4Intc {
        Sh4Intc::new(vec![
            InterruptInfo {
                default_priority: 2,
            },
            InterruptInfo {
                default_priority: 9,
            },
            InterruptInfo {
                default_priority: 9,
            },
        ])
    }

    #[test]
    fn higher_priority_wins() {
        let mut intc = intc3();
        intc.request(0);
        intc.request(1);
        assert_eq!(intc.next_pending(0, false), Some(1));
    }

    #[test]
    fn equal_priority_prefers_lower_id() {
        let mut intc = intc3();
        intc.request(1);
        intc.request(2);
        assert_eq!(intc.next_pending(0, false), Some(1));
    }

    #[test]
    fn imask_filters_low_priorities() {
        let mut intc = intc3();
        intc.request(0);
        let sr = 5 << SR_I_BIT; // imask above interrupt 0's priority of 2
        assert_eq!(intc.next_pending(sr, false), None);
        intc.request(1);
        assert_eq!(intc.next_pending(sr, false), Some(1));
    }

    #[test]
    fn block_bit_masks_everything_unless_sleeping() {
        let mut intc = intc3();
        intc.request(1);
        assert_eq!(intc.next_pending(SR_BL, false), None);
        assert_eq!(intc.next_pending(SR_BL, true), Some(1));
    }

    #[test]
    fn requests_survive_reprioritization() {
        let mut intc = intc3();
        intc.request(1);
        intc.set_priority(1, 1); // now below interrupt 0's default of 2
        intc.request(0);
        assert_eq!(intc.next_pending(0, false), Some(0));
        intc.clear(0);
        assert_eq!(intc.next_pending(0, false), Some(1));
    }
}
