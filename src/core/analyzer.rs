// This module implements the liveness analysis that feeds linear-scan allocation. The IR of a
// function is a single flat list, so a value's live range is one interval over instruction
// positions: the first instruction that references a virtual register opens the interval and
// every later reference extends its end. Every operand counts, including the index register
// of a scaled frame address and the base of a register-offset address. Intervals come out
// sorted by start position, which is the order the allocator consumes them in. No value is
// live across a jump: every statement reloads locals from the frame.

use crate::ir::{Instr, VReg};
use hashbrown::HashMap;

/// Instruction-index span over which a virtual register is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveInterval {
    pub vreg: VReg,
    /// Index of the first instruction referencing the register.
    pub start: usize,
    /// Index of the last instruction referencing the register.
    pub end: usize,
}

impl LiveInterval {
    pub fn overlaps(&self, other: &LiveInterval) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Compute start-sorted live intervals for `instrs`.
pub fn compute_live_intervals(instrs: &[Instr]) -> Vec<LiveInterval> {
    let mut intervals: Vec<LiveInterval> = Vec::new();
    let mut index: HashMap<VReg, usize> = HashMap::new();
    for (position, instr) in instrs.iter().enumerate() {
        for reg in instr.virtual_registers() {
            match index.get(&reg.index) {
                Some(&i) => intervals[i].end = position,
                None => {
                    index.insert(reg.index, intervals.len());
                    intervals.push(LiveInterval { vreg: reg.index, start: position, end: position });
                }
            }
        }
    }
    // Opened in position order, so already sorted by start.
    log::trace!("{} live intervals over {} instructions", intervals.len(), instrs.len());
    intervals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Opcode, Operand, VirtualRegister, Width};

    fn reg(n: u32) -> Operand {
        Operand::vreg(VReg(n))
    }

    #[test]
    fn test_intervals_match_hand_computed_spans() {
        let instrs = vec![
            Instr::new(Opcode::Copy, reg(0), Operand::Literal(5), Width::B4),
            Instr::new(Opcode::Copy, reg(1), Operand::Literal(2), Width::B4),
            Instr::new(Opcode::Add, reg(0), reg(1), Width::B4),
            Instr::new(Opcode::Copy, reg(2), reg(0), Width::B4),
            Instr::new(Opcode::StoreFrame, Operand::frame(4), reg(2), Width::B4),
        ];
        let intervals = compute_live_intervals(&instrs);
        let spans: Vec<_> = intervals.iter().map(|i| (i.vreg.0, i.start, i.end)).collect();
        assert_eq!(spans, vec![(0, 0, 3), (1, 1, 2), (2, 3, 4)]);
    }

    #[test]
    fn test_address_components_are_uses() {
        let instrs = vec![
            Instr::new(Opcode::LoadFrame, reg(0), Operand::frame(4), Width::B4),
            Instr::unary(Opcode::Extend, reg(0), Width::B4),
            Instr::new(
                Opcode::LoadFrame,
                reg(1),
                Operand::FrameOffset { offset: 40, index: Some((VirtualRegister::new(VReg(0)), 4)) },
                Width::B4,
            ),
            Instr::new(
                Opcode::LoadRegOffset,
                reg(2),
                Operand::RegOffset { base: VirtualRegister::new(VReg(1)), offset: 8 },
                Width::B8,
            ),
        ];
        let intervals = compute_live_intervals(&instrs);
        assert_eq!(intervals[0], LiveInterval { vreg: VReg(0), start: 0, end: 2 });
        assert_eq!(intervals[1], LiveInterval { vreg: VReg(1), start: 2, end: 3 });
    }

    #[test]
    fn test_overlap() {
        let a = LiveInterval { vreg: VReg(0), start: 0, end: 3 };
        let b = LiveInterval { vreg: VReg(1), start: 3, end: 5 };
        let c = LiveInterval { vreg: VReg(2), start: 4, end: 4 };
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_empty_function() {
        assert!(compute_live_intervals(&[]).is_empty());
    }
}
