//! cube-backend - tree-pattern instruction selection and linear-scan allocation.
//!
//! The crate lowers a typed, arena-allocated AST of a small imperative language to a
//! flat virtual-register IR, chooses instructions with a BURS-style selector driven by a
//! trie automaton over rule templates, assigns physical registers with linear scan and
//! prints x86-64 NASM text.
//!
//! # Primary Usage
//!
//! ```
//! use bumpalo::Bump;
//! use cube_backend::core::{CompilationSession, Compiler};
//! use cube_backend::test_ir::parse_program;
//!
//! # fn main() -> Result<(), cube_backend::CompileError> {
//! let source = "fn answer() -> i32 { (return (+ 40 2)) }";
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let program = parse_program(&session, source)?;
//! let output = Compiler::new(&session).compile_program(&program)?;
//! assert!(output.text.contains("answer:"));
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`ast`] - arena AST, types, frame rewrite
//! - [`select`] - symbol mapper, rule set, automaton, cover DP, emission driver
//! - [`ir`] - the virtual-register instruction list
//! - [`regalloc`] - linear scan with call-clobber save/restore
//! - [`x64`] - register naming, calling convention, frame layout, text emitter
//! - [`core`] - session, errors, register sets, liveness, per-function driver
//! - [`test_ir`] - s-expression input format used by tests and `cubec`

pub mod ast;
pub mod core;
pub mod ir;
pub mod regalloc;
pub mod select;
pub mod test_ir;
pub mod x64;

pub use crate::core::{
    CompilationSession, CompileError, CompileResult, CompiledFunction, Compiler, FunctionContext,
    ProgramOutput, SessionStats,
};
pub use crate::ir::{Instr, Opcode, Operand, VReg, Width};
pub use crate::regalloc::{Allocation, LinearScan};
pub use crate::x64::TargetConfig;
