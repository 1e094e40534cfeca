// This module implements linear-scan register allocation over the flat IR of one function.
// Live intervals are processed in start order. Before an interval is handled, every active
// interval that ended before its start returns its slot to a min-heap of free slots, so the
// lowest free slot is always reused first. When every slot is still held the function cannot be
// compiled: there is no spill path, and the allocator reports RegisterExhaustion instead of
// misallocating. The active list stays sorted by increasing end.
//
// Call sites clobber every allocatable register, so the allocator records for each call the
// slots whose intervals are live across it (started before the call, end after it). Once
// every operand carries its slot, a second pass inserts PushReg before and PopReg after each
// call, walking call sites from the last to the first so earlier insertions never shift the
// positions still to be processed. Pops mirror pushes in reverse slot order.

//! Linear-scan register allocation with call-clobber save/restore.

use crate::core::analyzer::{compute_live_intervals, LiveInterval};
use crate::core::error::{CompileError, CompileResult};
use crate::core::register_file::{PhysReg, RegSet};
use crate::ir::{Instr, Opcode, Operand, VReg, Width};
use crate::x64::TargetConfig;
use hashbrown::HashMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Registers saved around one call instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSave {
    /// Position of the call in the IR before save insertion.
    pub position: usize,
    pub slots: RegSet,
}

/// Result of allocating one function.
#[derive(Debug, Clone)]
pub struct Allocation {
    /// Instructions with every virtual register annotated and saves inserted.
    pub instrs: Vec<Instr>,
    pub intervals: Vec<LiveInterval>,
    pub assignment: HashMap<VReg, PhysReg>,
    pub saves: Vec<CallSave>,
}

impl Allocation {
    pub fn slot_of(&self, reg: VReg) -> Option<PhysReg> {
        self.assignment.get(&reg).copied()
    }

    /// Slots used by at least one interval.
    pub fn used_slots(&self) -> RegSet {
        self.assignment.values().copied().collect()
    }

    /// Number of inserted push/pop pairs.
    pub fn save_restore_pairs(&self) -> usize {
        self.saves.iter().map(|save| save.slots.len()).sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LinearScan {
    register_count: usize,
}

impl LinearScan {
    pub fn new(register_count: usize) -> Self {
        Self { register_count }
    }

    pub fn for_target(config: &TargetConfig) -> Self {
        Self::new(config.register_count)
    }

    pub fn register_count(&self) -> usize {
        self.register_count
    }

    pub fn allocate(&self, mut instrs: Vec<Instr>) -> CompileResult<Allocation> {
        let intervals = compute_live_intervals(&instrs);
        let calls: Vec<usize> =
            instrs.iter().enumerate().filter(|(_, i)| i.op == Opcode::Call).map(|(p, _)| p).collect();

        let mut free: BinaryHeap<Reverse<PhysReg>> =
            (0..self.register_count as u8).map(|slot| Reverse(PhysReg(slot))).collect();
        let mut active: Vec<(LiveInterval, PhysReg)> = Vec::new();
        let mut assignment = HashMap::new();
        let mut saves = Vec::with_capacity(calls.len());
        let mut next_call = 0;

        for interval in &intervals {
            while next_call < calls.len() && calls[next_call] <= interval.start {
                saves.push(live_across(calls[next_call], &active));
                next_call += 1;
            }

            let mut kept = Vec::with_capacity(active.len());
            for (live, slot) in active.drain(..) {
                if live.end < interval.start {
                    free.push(Reverse(slot));
                } else {
                    kept.push((live, slot));
                }
            }
            active = kept;

            if active.len() >= self.register_count {
                log::debug!("register exhaustion at {} with {} active intervals", interval.start, active.len());
                return Err(CompileError::RegisterExhaustion {
                    available: self.register_count,
                    position: interval.start,
                });
            }
            let Some(Reverse(slot)) = free.pop() else {
                return Err(CompileError::internal("free slot heap out of sync with active intervals"));
            };
            log::trace!("{} [{}, {}] -> {}", interval.vreg, interval.start, interval.end, slot);
            assignment.insert(interval.vreg, slot);
            let at = active.partition_point(|(live, _)| live.end <= interval.end);
            active.insert(at, (*interval, slot));
        }
        for &call in &calls[next_call..] {
            saves.push(live_across(call, &active));
        }

        for instr in instrs.iter_mut() {
            for reg in instr.virtual_registers_mut() {
                reg.slot = assignment.get(&reg.index).copied();
            }
        }
        insert_saves(&mut instrs, &saves);

        Ok(Allocation { instrs, intervals, assignment, saves })
    }
}

fn live_across(call: usize, active: &[(LiveInterval, PhysReg)]) -> CallSave {
    let slots = active
        .iter()
        .filter(|(live, _)| live.start < call && live.end > call)
        .map(|&(_, slot)| slot)
        .collect();
    CallSave { position: call, slots }
}

fn insert_saves(instrs: &mut Vec<Instr>, saves: &[CallSave]) {
    for save in saves.iter().rev() {
        if save.slots.is_empty() {
            continue;
        }
        let pops: Vec<Instr> =
            save.slots.iter().rev().map(|slot| Instr::unary(Opcode::PopReg, Operand::Physical(slot), Width::B8)).collect();
        let pushes: Vec<Instr> =
            save.slots.iter().map(|slot| Instr::unary(Opcode::PushReg, Operand::Physical(slot), Width::B8)).collect();
        let call = save.position;
        instrs.splice(call + 1..call + 1, pops);
        instrs.splice(call..call, pushes);
    }
}
