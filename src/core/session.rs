// This module provides arena-based compilation session management using the bumpalo crate.
// CompilationSession is the long-lived half of the compiler state: it owns the node factory
// over the arena, the rule set and the matching automaton (built once and read-only for the
// rest of the run), the target configuration, the string literal pool, the table of known
// callable signatures and the session statistics. Everything that changes while a single
// function is compiled lives in FunctionContext instead, which is created fresh for each
// function so fresh register and label numbering, node decorations, the frame layout and the
// IR list never leak across function boundaries. SessionStats counts compiled and failed
// functions, emitted IR, applied rules, live intervals and inserted save/restore pairs.

//! Arena-based compilation session and per-function context.

use crate::ast::{AstArena, Signature, Type};
use crate::ast::rewrite::Scopes;
use crate::ir::{Instr, LabelId, VReg};
use crate::select::{Automaton, Decorations, RuleSet};
use crate::x64::{FunctionFrame, TargetConfig};
use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// Arena-based compilation session.
///
/// All AST nodes, including the substituted nodes built during emission, are allocated in
/// the session arena and share its lifetime.
pub struct CompilationSession<'arena> {
    /// Arena allocator for compilation objects.
    arena: &'arena Bump,

    ast: AstArena<'arena>,

    rules: RuleSet,

    automaton: Automaton,

    target: TargetConfig,

    /// Session statistics for debugging.
    stats: RefCell<SessionStats>,

    /// String interning for names.
    interned_strings: RefCell<HashMap<String, &'arena str>>,

    /// String literals, by pool index.
    literals: RefCell<Vec<String>>,

    signatures: RefCell<HashMap<&'arena str, Signature<'arena>>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the default target.
    pub fn new(arena: &'arena Bump) -> Self {
        Self::with_target(arena, TargetConfig::default())
    }

    pub fn with_target(arena: &'arena Bump, target: TargetConfig) -> Self {
        let rules = RuleSet::standard();
        let automaton = Automaton::build(&rules);
        Self {
            arena,
            ast: AstArena::new(arena),
            rules,
            automaton,
            target,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
            literals: RefCell::new(Vec::new()),
            signatures: RefCell::new(HashMap::new()),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    pub fn ast(&self) -> &AstArena<'arena> {
        &self.ast
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn automaton(&self) -> &Automaton {
        &self.automaton
    }

    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Add a string literal to the pool; equal literals share an index.
    pub fn intern_string(&self, value: &str) -> u32 {
        let mut literals = self.literals.borrow_mut();
        if let Some(index) = literals.iter().position(|s| s == value) {
            return index as u32;
        }
        literals.push(value.to_string());
        (literals.len() - 1) as u32
    }

    pub fn strings(&self) -> Vec<String> {
        self.literals.borrow().clone()
    }

    pub fn declare_signature(&self, signature: Signature<'arena>) {
        self.signatures.borrow_mut().insert(signature.name, signature);
    }

    pub fn signature(&self, name: &str) -> Option<Signature<'arena>> {
        self.signatures.borrow().get(name).copied()
    }

    /// Record that a function was compiled.
    pub fn record_function_compiled(&self, name: &str, instructions: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_compiled += 1;
        stats.ir_instructions += instructions;

        if stats.largest_function_size < instructions {
            stats.largest_function_size = instructions;
            stats.largest_function_name = name.to_string();
        }
    }

    pub fn record_function_failed(&self) {
        self.stats.borrow_mut().functions_failed += 1;
    }

    pub fn record_rule_applied(&self) {
        self.stats.borrow_mut().rules_applied += 1;
    }

    pub fn record_intervals(&self, count: usize) {
        self.stats.borrow_mut().live_intervals += count;
    }

    /// Record push/pop pairs inserted around call sites.
    pub fn record_save_restore(&self, pairs: usize) {
        self.stats.borrow_mut().save_restore_pairs += pairs;
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of functions compiled.
    pub functions_compiled: usize,

    /// Functions skipped after a recoverable error.
    pub functions_failed: usize,

    /// IR instructions after save/restore insertion.
    pub ir_instructions: usize,

    pub rules_applied: usize,

    pub live_intervals: usize,

    pub save_restore_pairs: usize,

    /// Largest function compiled, in IR instructions.
    pub largest_function_size: usize,

    /// Name of largest function.
    pub largest_function_name: String,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Functions compiled: {}", self.functions_compiled)?;
        writeln!(f, "  Functions failed: {}", self.functions_failed)?;
        writeln!(f, "  IR instructions: {}", self.ir_instructions)?;
        writeln!(f, "  Rules applied: {}", self.rules_applied)?;
        writeln!(f, "  Live intervals: {}", self.live_intervals)?;
        writeln!(f, "  Save/restore pairs: {}", self.save_restore_pairs)?;

        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} instructions)",
                self.largest_function_name, self.largest_function_size
            )?;
        }

        Ok(())
    }
}

/// Mutable state of one function's compilation.
#[derive(Debug)]
pub struct FunctionContext<'a> {
    pub name: &'a str,
    pub ret: Type<'a>,
    pub instrs: Vec<Instr>,
    pub decorations: Decorations,
    pub frame: FunctionFrame<'a>,
    pub scopes: Scopes<'a>,
    next_vreg: u32,
    /// Label 0 is the shared return label.
    next_label: u32,
}

impl<'a> FunctionContext<'a> {
    pub fn new(arena: &'a Bump, name: &'a str, ret: Type<'a>) -> Self {
        Self {
            name,
            ret,
            instrs: Vec::new(),
            decorations: Decorations::new(),
            frame: FunctionFrame::new(arena),
            scopes: Scopes::new(),
            next_vreg: 0,
            next_label: 1,
        }
    }

    pub fn new_vreg(&mut self) -> VReg {
        let reg = VReg(self.next_vreg);
        self.next_vreg += 1;
        reg
    }

    pub fn new_label(&mut self) -> LabelId {
        let label = LabelId(self.next_label);
        self.next_label += 1;
        label
    }

    pub fn vreg_count(&self) -> u32 {
        self.next_vreg
    }

    pub fn emit(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_session_creation() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let stats = session.stats();
        assert_eq!(stats.functions_compiled, 0);
        assert_eq!(stats.ir_instructions, 0);
        assert_eq!(session.rules().len(), session.automaton().rule_count());
        assert_eq!(session.target().register_count, 6);
    }

    #[test]
    fn test_string_interning() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let s1 = session.intern_str("hello");
        let s2 = session.intern_str("hello");
        let s3 = session.intern_str("world");

        assert_eq!(s1.as_ptr(), s2.as_ptr());
        assert_ne!(s1.as_ptr(), s3.as_ptr());
    }

    #[test]
    fn test_string_literal_pool() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        assert_eq!(session.intern_string("%d\n"), 0);
        assert_eq!(session.intern_string("done"), 1);
        assert_eq!(session.intern_string("%d\n"), 0);
        assert_eq!(session.strings(), vec!["%d\n".to_string(), "done".to_string()]);
    }

    #[test]
    fn test_signatures() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let params = arena.alloc_slice_copy(&[Type::I64]);
        session.declare_signature(Signature { name: "printf", params, ret: Type::I32, variadic: true });

        let sig = session.signature("printf").unwrap();
        assert!(sig.variadic);
        assert_eq!(sig.params.len(), 1);
        assert!(session.signature("puts").is_none());
    }

    #[test]
    fn test_statistics_display() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_function_compiled("factorial", 24);
        session.record_function_compiled("main", 9);
        session.record_function_failed();
        session.record_rule_applied();
        session.record_save_restore(2);

        let stats = session.stats();
        assert_eq!(stats.functions_compiled, 2);
        assert_eq!(stats.ir_instructions, 33);
        let output = format!("{}", stats);
        assert!(output.contains("Functions compiled: 2"));
        assert!(output.contains("Functions failed: 1"));
        assert!(output.contains("Save/restore pairs: 2"));
        assert!(output.contains("factorial (24 instructions)"));
    }

    #[test]
    fn test_function_context_counters_start_fresh() {
        let arena = Bump::new();
        let mut first = FunctionContext::new(&arena, "a", Type::I32);
        assert_eq!(first.new_vreg(), VReg(0));
        assert_eq!(first.new_vreg(), VReg(1));
        assert_eq!(first.new_label(), LabelId(1));

        let mut second = FunctionContext::new(&arena, "b", Type::Void);
        assert_eq!(second.new_vreg(), VReg(0));
        assert_eq!(second.new_label(), LabelId(1));
        assert_eq!(first.vreg_count(), 2);
        assert!(format!("{second:?}").starts_with("FunctionContext { name: \"b\""));
    }
}
