//! x86-64 target: register naming, calling convention, frame layout and NASM text emission.
//!
//! Registers are named by their two-letter base (`ax`, `di`) or their number (`8`) and
//! widened or narrowed per operation width: `ax` prints as `rax`/`eax`/`ax`/`al`,
//! `di` as `rdi`/`edi`/`di`/`dil`, and `8` as `r8`/`r8d`/`r8w`/`r8b`.

pub mod calling_convention;
pub mod emitter;

use crate::core::error::{CompileError, CompileResult};
use crate::core::register_file::PhysReg;
use crate::ir::Width;

pub use calling_convention::{arg_positions, split_chunks, ArgAssigner, ArgLocation, FixedRegisterAssigner, FunctionFrame};
pub use emitter::AsmEmitter;

/// Allocatable registers in slot order.
pub const ALLOCATABLE_REGISTERS: [&str; 6] = ["ax", "bx", "dx", "di", "si", "cx"];

/// Integer argument registers in argument order.
pub const ARGUMENT_REGISTERS: [&str; 6] = ["di", "si", "dx", "cx", "8", "9"];

/// Target configuration shared by the allocator and the emitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    /// Number of physical slots handed to linear scan.
    pub register_count: usize,
    pub registers: Vec<&'static str>,
    pub arg_registers: Vec<&'static str>,
    /// Annotate emitted assembly with the IR it came from.
    pub emit_comments: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            register_count: ALLOCATABLE_REGISTERS.len(),
            registers: ALLOCATABLE_REGISTERS.to_vec(),
            arg_registers: ARGUMENT_REGISTERS.to_vec(),
            emit_comments: false,
        }
    }
}

impl TargetConfig {
    /// Restrict allocation to the first `count` registers.
    pub fn with_register_count(mut self, count: usize) -> CompileResult<Self> {
        if count == 0 || count > self.registers.len() {
            return Err(CompileError::Unsupported {
                feature: format!("{count} allocatable registers (1..={} available)", self.registers.len()),
            });
        }
        self.register_count = count;
        Ok(self)
    }

    pub fn with_comments(mut self, emit_comments: bool) -> Self {
        self.emit_comments = emit_comments;
        self
    }

    /// Base name of a physical slot.
    pub fn slot_base(&self, reg: PhysReg) -> CompileResult<&'static str> {
        self.registers
            .get(reg.slot())
            .copied()
            .ok_or_else(|| CompileError::internal(format!("register slot {reg} out of range")))
    }

    pub fn slot_name(&self, reg: PhysReg, width: Width) -> CompileResult<String> {
        Ok(register_name(self.slot_base(reg)?, width))
    }
}

/// Sized register name for a base name.
pub fn register_name(base: &str, width: Width) -> String {
    if base.starts_with(|c: char| c.is_ascii_digit()) {
        return match width {
            Width::B8 => format!("r{base}"),
            Width::B4 => format!("r{base}d"),
            Width::B2 => format!("r{base}w"),
            Width::B1 => format!("r{base}b"),
        };
    }
    match width {
        Width::B8 => format!("r{base}"),
        Width::B4 => format!("e{base}"),
        Width::B2 => base.to_string(),
        Width::B1 => match base.strip_suffix('x') {
            Some(stem) => format!("{stem}l"),
            None => format!("{base}l"),
        },
    }
}
