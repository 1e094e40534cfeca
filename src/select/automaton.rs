// This module builds the pattern matching automaton of the instruction selector. Every rule
// template is spelled as root-to-leaf label paths (node symbol, child position, child symbol, and
// so on) and inserted into one shared trie, so rules with a common prefix share states. A state
// reached when a path is fully consumed accepts the rule and remembers the path length. Failure
// links are then computed breadth first exactly like Aho-Corasick: a state's failure target is the
// longest proper suffix of its path that is also a trie path, and the target's accepting entries
// are merged into the state. transition() follows failure links on a miss and bottoms out at the
// root, which gives amortised linear matching over the label paths of an expression tree.

//! Trie automaton over rule templates.

use super::rules::RuleSet;
use super::symbol::{Pattern, Symbol};
use std::collections::VecDeque;

pub type StateId = usize;

/// The root state; also the "no match" continuation.
pub const ROOT: StateId = 0;

/// Edge label: a node symbol or a child position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Node(Symbol),
    Child(u8),
}

#[derive(Debug, Clone)]
struct TrieState {
    /// Path length from the root.
    depth: u32,
    edges: Vec<(Label, StateId)>,
    failure: StateId,
    /// Per rule: path length at which the rule's template path ends here.
    accepting: Vec<Option<u32>>,
}

impl TrieState {
    fn new(depth: u32, rule_count: usize) -> Self {
        Self { depth, edges: Vec::new(), failure: ROOT, accepting: vec![None; rule_count] }
    }
}

/// Multi-pattern matcher over tree label paths.
#[derive(Debug, Clone)]
pub struct Automaton {
    states: Vec<TrieState>,
    rule_count: usize,
}

impl Automaton {
    pub fn build(rules: &RuleSet) -> Self {
        let rule_count = rules.len();
        let mut automaton = Self { states: vec![TrieState::new(0, rule_count)], rule_count };
        for (index, rule) in rules.iter().enumerate() {
            automaton.insert(&rule.template, index, ROOT);
        }
        automaton.build_failure_links();
        log::debug!("automaton: {} states for {} rules", automaton.states.len(), rule_count);
        automaton
    }

    fn insert(&mut self, pattern: &Pattern, rule: usize, from: StateId) {
        let state = self.ensure_edge(from, Label::Node(pattern.symbol()));
        let children = pattern.children();
        if children.is_empty() {
            let depth = self.states[state].depth;
            self.states[state].accepting[rule] = Some(depth);
        }
        for (index, child) in children.iter().enumerate() {
            let position = self.ensure_edge(state, Label::Child(index as u8));
            self.insert(child, rule, position);
        }
    }

    fn ensure_edge(&mut self, from: StateId, label: Label) -> StateId {
        if let Some(next) = self.edge(from, label) {
            return next;
        }
        let id = self.states.len();
        let depth = self.states[from].depth + 1;
        self.states.push(TrieState::new(depth, self.rule_count));
        self.states[from].edges.push((label, id));
        id
    }

    fn edge(&self, from: StateId, label: Label) -> Option<StateId> {
        self.states[from].edges.iter().find(|(l, _)| *l == label).map(|&(_, next)| next)
    }

    fn build_failure_links(&mut self) {
        let mut queue: VecDeque<StateId> = self.states[ROOT].edges.iter().map(|&(_, s)| s).collect();
        while let Some(current) = queue.pop_front() {
            let edges = self.states[current].edges.clone();
            for (label, child) in edges {
                queue.push_back(child);
                let mut state = self.states[current].failure;
                while self.edge(state, label).is_none() && state != ROOT {
                    state = self.states[state].failure;
                }
                let target = self.edge(state, label).unwrap_or(ROOT);
                self.states[child].failure = target;
                for rule in 0..self.rule_count {
                    if let Some(depth) = self.states[target].accepting[rule] {
                        self.states[child].accepting[rule] = Some(depth);
                    }
                }
            }
        }
    }

    /// Next state after `label`, following failure links on a miss.
    pub fn transition(&self, from: StateId, label: Label) -> StateId {
        let mut state = from;
        loop {
            if let Some(next) = self.edge(state, label) {
                return next;
            }
            if state == ROOT {
                return ROOT;
            }
            state = self.states[state].failure;
        }
    }

    /// Rules accepted at `state` with the tree depth of the accepted leaf below the template root.
    pub fn accepting(&self, state: StateId) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.states[state]
            .accepting
            .iter()
            .enumerate()
            .filter_map(|(rule, depth)| depth.map(|d| (rule, (d - 1) / 2)))
    }

    pub fn failure(&self, state: StateId) -> StateId {
        self.states[state].failure
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn rule_count(&self) -> usize {
        self.rule_count
    }
}
