// This module is the instruction selector. The symbol mapper turns each AST node into one
// alphabet character, the rule set lists the templates with their costs and construct steps, the
// automaton is the shared trie over all template label paths with Aho-Corasick failure links,
// the labeler runs the bottom-up cover dynamic program over an expression, and the selector
// walks the chosen cover top-down, reducing mismatched children first and invoking each rule's
// construct step to append IR.

//! Tree-pattern instruction selection.

pub mod automaton;
pub mod cover;
pub mod emit;
pub mod rules;
pub mod symbol;

pub use automaton::{Automaton, Label, StateId, ROOT};
pub use cover::{Decoration, Decorations, Labeler};
pub use emit::Selector;
pub use rules::{Rule, RuleKind, RuleSet};
pub use symbol::{selection_children, symbol_of, Pattern, Symbol};
