//! Physical register slots and register sets.
//!
//! The allocator hands out a small, fixed number of general purpose slots. A slot is an
//! index into the target's allocatable register list, so the same allocation can be
//! printed against any naming the [`TargetConfig`](crate::x64::TargetConfig) chooses.

use std::fmt;

/// Maximum number of slots a [`RegSet`] can track.
pub const MAX_REGISTERS: usize = 64;

/// An allocatable physical register slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysReg(pub u8);

impl PhysReg {
    /// Index into the target's allocatable register list.
    pub fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PhysReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Bit set over physical register slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegSet {
    bits: u64,
}

impl RegSet {
    /// Create empty register set.
    pub const fn new() -> Self {
        Self { bits: 0 }
    }

    pub fn contains(&self, reg: PhysReg) -> bool {
        reg.slot() < MAX_REGISTERS && self.bits & (1u64 << reg.0) != 0
    }

    pub fn insert(&mut self, reg: PhysReg) {
        if reg.slot() < MAX_REGISTERS {
            self.bits |= 1u64 << reg.0;
        }
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Slots in ascending order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = PhysReg> + '_ {
        (0..MAX_REGISTERS as u8).filter(move |&i| self.bits & (1u64 << i) != 0).map(PhysReg)
    }
}

impl FromIterator<PhysReg> for RegSet {
    fn from_iter<I: IntoIterator<Item = PhysReg>>(iter: I) -> Self {
        let mut set = RegSet::new();
        for reg in iter {
            set.insert(reg);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_contains() {
        let mut set = RegSet::new();
        assert!(set.is_empty());
        set.insert(PhysReg(0));
        set.insert(PhysReg(3));
        assert!(set.contains(PhysReg(3)));
        assert!(!set.contains(PhysReg(1)));
        assert_eq!(set.len(), 2);
        set.insert(PhysReg(3));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_iter_order() {
        let set: RegSet = [PhysReg(5), PhysReg(1), PhysReg(2)].into_iter().collect();
        let forward: Vec<_> = set.iter().collect();
        assert_eq!(forward, vec![PhysReg(1), PhysReg(2), PhysReg(5)]);
        let backward: Vec<_> = set.iter().rev().collect();
        assert_eq!(backward, vec![PhysReg(5), PhysReg(2), PhysReg(1)]);
    }
}
