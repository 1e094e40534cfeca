//! Tree-cover dynamic program.
//!
//! [`Labeler`] walks an expression bottom-up. Each node gets the automaton state of its
//! root-to-node label path, a per-rule bitmask and, for every result symbol, the cheapest rule
//! found so far. Bit `d` of a node's mask for rule `i` means "a partial match of rule `i`
//! rooted `d` levels above this node is consistent with this subtree"; bit 0 therefore means
//! rule `i` matches with this node as the template root. A leaf sets its bit from the state's
//! accepting entry, an inner node ANDs its children's masks shifted by one.
//!
//! When a rule improves the best cost of a node, the node is additionally labelled as if it
//! had already been reduced to the rule's result symbol, which lets ancestor templates use a
//! register placeholder at this position.

use super::automaton::{Automaton, Label, StateId, ROOT};
use super::rules::RuleSet;
use super::symbol::{selection_children, symbol_of, Symbol};
use crate::ast::{Expr, NodeId};
use hashbrown::HashMap;

/// Matcher results for one node.
#[derive(Debug, Clone)]
pub struct Decoration {
    pub state: StateId,
    pub bits: Vec<u32>,
    best: HashMap<Symbol, (u32, usize)>,
}

impl Decoration {
    pub fn new(state: StateId, rule_count: usize) -> Self {
        Self { state, bits: vec![0; rule_count], best: HashMap::new() }
    }

    /// Cheapest `(cost, rule)` producing `symbol`.
    pub fn best(&self, symbol: Symbol) -> Option<(u32, usize)> {
        self.best.get(&symbol).copied()
    }

    /// Record `rule` if it is strictly cheaper than the current best for `symbol`.
    pub fn offer(&mut self, symbol: Symbol, cost: u32, rule: usize) -> bool {
        match self.best.get(&symbol) {
            Some(&(current, _)) if current <= cost => false,
            _ => {
                self.best.insert(symbol, (cost, rule));
                true
            }
        }
    }

    pub fn matches(&self, rule: usize) -> bool {
        self.bits.get(rule).is_some_and(|bits| bits & 1 != 0)
    }
}

/// Side table of decorations keyed by node id.
#[derive(Debug, Default)]
pub struct Decorations {
    map: HashMap<NodeId, Decoration>,
}

impl Decorations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<&Decoration> {
        self.map.get(&id)
    }

    pub fn best(&self, id: NodeId, symbol: Symbol) -> Option<(u32, usize)> {
        self.get(id).and_then(|d| d.best(symbol))
    }

    pub fn insert(&mut self, id: NodeId, decoration: Decoration) {
        self.map.insert(id, decoration);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

pub struct Labeler<'r> {
    rules: &'r RuleSet,
    automaton: &'r Automaton,
}

impl<'r> Labeler<'r> {
    pub fn new(rules: &'r RuleSet, automaton: &'r Automaton) -> Self {
        Self { rules, automaton }
    }

    /// Label `root` and its selection subtree.
    pub fn label(&self, root: &Expr<'_>, decorations: &mut Decorations) {
        self.visit(root, None, decorations);
    }

    /// State reached by `symbol` below `parent` (or at the root).
    fn state_for(&self, parent: Option<(StateId, u8)>, symbol: Symbol) -> StateId {
        match parent {
            None => self.automaton.transition(ROOT, Label::Node(symbol)),
            Some((state, index)) => {
                let position = self.automaton.transition(state, Label::Child(index));
                self.automaton.transition(position, Label::Node(symbol))
            }
        }
    }

    fn visit(&self, expr: &Expr<'_>, parent: Option<(StateId, u8)>, decorations: &mut Decorations) {
        let state = self.state_for(parent, symbol_of(expr));
        let children = selection_children(expr);
        for (index, child) in children.iter().enumerate() {
            self.visit(child, Some((state, index as u8)), decorations);
        }

        let mut decoration = Decoration::new(state, self.rules.len());
        self.set_partial(&mut decoration, state);
        if !children.is_empty() {
            for rule in 0..self.rules.len() {
                let product = children
                    .iter()
                    .map(|child| decorations.get(child.id).map_or(0, |d| d.bits[rule] >> 1))
                    .fold(u32::MAX, |acc, bits| acc & bits);
                decoration.bits[rule] |= product;
            }
        }
        self.reduce(expr, &mut decoration, parent, decorations);
        log::trace!("node {} {} state {}", expr.id.0, symbol_of(expr), state);
        decorations.insert(expr.id, decoration);
    }

    fn set_partial(&self, decoration: &mut Decoration, state: StateId) {
        for (rule, depth) in self.automaton.accepting(state) {
            decoration.bits[rule] |= 1 << depth;
        }
    }

    fn reduce(
        &self,
        expr: &Expr<'_>,
        decoration: &mut Decoration,
        parent: Option<(StateId, u8)>,
        decorations: &Decorations,
    ) {
        for (index, rule) in self.rules.iter().enumerate() {
            if !decoration.matches(index) {
                continue;
            }
            let Some(cost) = rule.cost(expr, decorations) else {
                log::trace!("node {}: {} not applicable", expr.id.0, rule.name);
                continue;
            };
            if decoration.offer(rule.result, cost, index) {
                log::trace!("node {}: {} covers as '{}' at cost {}", expr.id.0, rule.name, rule.result, cost);
                let continuation = self.state_for(parent, rule.result);
                self.set_partial(decoration, continuation);
            }
        }
    }
}
