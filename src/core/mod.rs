// This module serves as the central hub for the backend's core infrastructure: the session
// that owns the arena, the rule set, the automaton and statistics; the per-function context;
// the error taxonomy; physical register slots and register sets; the liveness analysis that
// feeds linear scan; and the compilation driver that lowers statements, runs selection and
// allocation and renders the final text.

//! Core backend infrastructure.
//!
//! # Key Components
//!
//! ## Session Management (`session`)
//! - Arena-based AST allocation using `bumpalo`
//! - Rule set and automaton built once per run
//! - Compilation statistics
//!
//! ## Register Slots (`register_file`)
//! - Physical slot indices and bit sets over them
//!
//! ## Liveness (`analyzer`)
//! - Live intervals over the flat IR of one function
//!
//! ## Driver (`compiler`)
//! - Statement lowering, selection, allocation and emission per function

pub mod analyzer;
pub mod compiler;
pub mod error;
pub mod register_file;
pub mod session;

pub use analyzer::{compute_live_intervals, LiveInterval};
pub use compiler::{CompiledFunction, Compiler, ProgramOutput};
pub use error::{CompileError, CompileResult};
pub use register_file::{PhysReg, RegSet};
pub use session::{CompilationSession, FunctionContext, SessionStats};
