// This module implements the fixed integer/pointer calling convention and the frame layout of
// the backend. ArgAssigner hands out argument locations in order: the first N argument positions
// go to the configured argument registers (rdi, rsi, rdx, rcx, r8, r9 by default), every later
// position is a stack slot that the caller pushes in reverse order and frees after the call, and
// the callee reads at [rbp + 16 + 8k]. Struct values are passed as consecutive chunks of 8, 4, 2
// and 1 bytes, greedily largest first, one argument position per chunk. FunctionFrame lays out
// local slots below the frame pointer, reserves an outgoing argument area for every call site
// (one 8-byte slot per argument position) and computes the 16n+8 frame size that keeps rsp
// 16-byte aligned once the prologue has pushed rbp and rbx.

//! Calling convention and frame layout.

use crate::ast::Type;
use crate::ir::Width;
use bumpalo::{collections::Vec as BumpVec, Bump};

/// Where one argument position travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgLocation {
    /// Argument register base name.
    Register(&'static str),
    /// `k`-th stack argument, found at `[rbp + 16 + 8k]` in the callee.
    Stack(u32),
}

/// Argument position assignment.
pub trait ArgAssigner {
    /// Location of the next argument position.
    fn assign_arg(&mut self) -> ArgLocation;

    /// Start over for a new call or function.
    fn reset(&mut self);

    /// Number of positions assigned to the stack so far.
    fn stack_count(&self) -> u32;
}

/// Register arguments first, then stack.
#[derive(Debug, Clone)]
pub struct FixedRegisterAssigner {
    registers: Vec<&'static str>,
    assigned: u32,
}

impl FixedRegisterAssigner {
    pub fn new(registers: &[&'static str]) -> Self {
        Self { registers: registers.to_vec(), assigned: 0 }
    }

    /// Location of argument `position` without advancing.
    pub fn location(&self, position: u32) -> ArgLocation {
        match self.registers.get(position as usize) {
            Some(reg) => ArgLocation::Register(*reg),
            None => ArgLocation::Stack(position - self.registers.len() as u32),
        }
    }

    pub fn register_count(&self) -> u32 {
        self.registers.len() as u32
    }
}

impl ArgAssigner for FixedRegisterAssigner {
    fn assign_arg(&mut self) -> ArgLocation {
        let location = self.location(self.assigned);
        self.assigned += 1;
        location
    }

    fn reset(&mut self) {
        self.assigned = 0;
    }

    fn stack_count(&self) -> u32 {
        self.assigned.saturating_sub(self.register_count())
    }
}

/// Split a `size`-byte value into `(byte offset, width)` chunks, largest first.
pub fn split_chunks(size: u32) -> Vec<(u32, Width)> {
    let mut chunks = Vec::new();
    let mut offset = 0;
    for width in [Width::B8, Width::B4, Width::B2, Width::B1] {
        while size - offset >= width.bytes() {
            chunks.push((offset, width));
            offset += width.bytes();
        }
    }
    chunks
}

/// Number of argument positions a value of type `ty` occupies.
pub fn arg_positions(ty: &Type<'_>) -> u32 {
    if ty.is_struct() {
        split_chunks(ty.size()).len() as u32
    } else {
        1
    }
}

fn align_up(value: i64, align: i64) -> i64 {
    (value + align - 1) / align * align
}

/// Local frame of one function. Offsets are distances below `rbp`.
#[derive(Debug)]
pub struct FunctionFrame<'a> {
    /// Bytes used by locals and outgoing argument areas.
    total: i64,
    /// Outgoing argument areas, by call site.
    arg_areas: BumpVec<'a, i64>,
}

impl<'a> FunctionFrame<'a> {
    pub fn new(arena: &'a Bump) -> Self {
        Self { total: 0, arg_areas: BumpVec::new_in(arena) }
    }

    /// Reserve `size` bytes aligned to `align` (capped at 8); returns the slot's offset.
    pub fn allocate_bytes(&mut self, size: u32, align: u32) -> i64 {
        let align = align.clamp(1, 8) as i64;
        let offset = align_up(self.total + size as i64, align);
        self.total = offset;
        offset
    }

    pub fn allocate(&mut self, ty: &Type<'_>) -> i64 {
        self.allocate_bytes(ty.size(), ty.alignment())
    }

    /// Reserve one 8-byte slot per argument position; slot `p` lives at `area - 8p`.
    pub fn allocate_arg_area(&mut self, positions: u32) -> i64 {
        if positions == 0 {
            return 0;
        }
        let area = self.allocate_bytes(8 * positions, 8);
        self.arg_areas.push(area);
        area
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    pub fn call_site_count(&self) -> usize {
        self.arg_areas.len()
    }

    /// Size subtracted from `rsp` by the prologue: the smallest `16n + 8` above the used bytes.
    pub fn frame_size(&self) -> i64 {
        let mut size = 8;
        while size <= self.total {
            size += 16;
        }
        size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_then_stack_assignment() {
        let mut assigner = FixedRegisterAssigner::new(&crate::x64::ARGUMENT_REGISTERS);
        let expected = ["di", "si", "dx", "cx", "8", "9"];
        for reg in expected {
            assert_eq!(assigner.assign_arg(), ArgLocation::Register(reg));
        }
        assert_eq!(assigner.assign_arg(), ArgLocation::Stack(0));
        assert_eq!(assigner.assign_arg(), ArgLocation::Stack(1));
        assert_eq!(assigner.stack_count(), 2);

        assigner.reset();
        assert_eq!(assigner.stack_count(), 0);
        assert_eq!(assigner.assign_arg(), ArgLocation::Register("di"));
    }

    #[test]
    fn test_split_chunks() {
        assert_eq!(split_chunks(8), vec![(0, Width::B8)]);
        assert_eq!(split_chunks(15), vec![(0, Width::B8), (8, Width::B4), (12, Width::B2), (14, Width::B1)]);
        assert_eq!(split_chunks(20), vec![(0, Width::B8), (8, Width::B8), (16, Width::B4)]);
        assert!(split_chunks(0).is_empty());
    }

    #[test]
    fn test_frame_slots_and_size() {
        let arena = Bump::new();
        let mut frame = FunctionFrame::new(&arena);
        assert_eq!(frame.frame_size(), 8);

        assert_eq!(frame.allocate(&Type::I32), 4);
        assert_eq!(frame.allocate(&Type::I8), 5);
        assert_eq!(frame.allocate(&Type::I64), 16);
        assert_eq!(frame.frame_size(), 24);

        let area = frame.allocate_arg_area(2);
        assert_eq!(area, 32);
        assert_eq!(frame.total(), 32);
        assert_eq!(frame.frame_size(), 40);
        assert_eq!(frame.call_site_count(), 1);
        assert_eq!(frame.allocate_arg_area(0), 0);
        assert_eq!(frame.call_site_count(), 1);
    }

    #[test]
    fn test_frame_size_keeps_alignment() {
        let arena = Bump::new();
        for used in [0u32, 1, 8, 9, 24, 100] {
            let mut frame = FunctionFrame::new(&arena);
            frame.allocate_bytes(used, 1);
            let size = frame.frame_size();
            assert_eq!(size % 16, 8);
            assert!(size > used as i64);
        }
    }
}
