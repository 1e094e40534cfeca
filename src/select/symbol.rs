//! Symbol mapper: one alphabet character per node shape.

use crate::ast::{BinOp, Expr, ExprKind, LogicalOp};
use std::fmt;

/// A trie alphabet symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(pub char);

impl Symbol {
    pub const REGISTER: Symbol = Symbol('r');
    pub const LITERAL: Symbol = Symbol('l');
    pub const STRING: Symbol = Symbol('s');
    pub const CALL: Symbol = Symbol('c');
    pub const COMPARE: Symbol = Symbol('x');
    pub const NEGATE: Symbol = Symbol('n');
    pub const ADDRESS_OF: Symbol = Symbol('P');
    pub const LOAD: Symbol = Symbol('L');
    pub const ASSIGN: Symbol = Symbol('=');
    pub const FRAME_POINTER: Symbol = Symbol('f');
    pub const EXTEND: Symbol = Symbol('e');
    pub const PLUS: Symbol = Symbol('+');
    pub const MINUS: Symbol = Symbol('-');
    pub const TIMES: Symbol = Symbol('*');
    pub const DIVIDE: Symbol = Symbol('/');
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn symbol_of(expr: &Expr<'_>) -> Symbol {
    match expr.kind {
        ExprKind::Binary { op, .. } => match op {
            BinOp::Add => Symbol::PLUS,
            BinOp::Sub => Symbol::MINUS,
            BinOp::Mul => Symbol::TIMES,
            BinOp::Div => Symbol::DIVIDE,
        },
        ExprKind::Literal(_) => Symbol::LITERAL,
        ExprKind::Str(_) => Symbol::STRING,
        ExprKind::Call { .. } => Symbol::CALL,
        ExprKind::Compare { .. } => Symbol::COMPARE,
        ExprKind::Negate(_) => Symbol::NEGATE,
        ExprKind::AddressOf(_) => Symbol::ADDRESS_OF,
        ExprKind::Deref(_) => Symbol::LOAD,
        ExprKind::Register(_) => Symbol::REGISTER,
        ExprKind::Assign { .. } => Symbol::ASSIGN,
        ExprKind::FramePointer => Symbol::FRAME_POINTER,
        ExprKind::Extend(_) => Symbol::EXTEND,
        ExprKind::Logical { op: LogicalOp::And, .. } => Symbol('&'),
        ExprKind::Logical { op: LogicalOp::Or, .. } => Symbol('|'),
        ExprKind::Var(_) => Symbol('v'),
        ExprKind::Field { .. } => Symbol('.'),
        ExprKind::Index { .. } => Symbol('['),
    }
}

/// Children the matcher walks. Call arguments are selected separately by the call rule.
pub fn selection_children<'a>(expr: &Expr<'a>) -> Vec<&'a Expr<'a>> {
    match expr.kind {
        ExprKind::Binary { lhs, rhs, .. }
        | ExprKind::Compare { lhs, rhs, .. }
        | ExprKind::Logical { lhs, rhs, .. } => vec![lhs, rhs],
        ExprKind::Assign { target, value } => vec![target, value],
        ExprKind::Deref(inner) | ExprKind::Negate(inner) | ExprKind::Extend(inner) | ExprKind::AddressOf(inner) => {
            vec![inner]
        }
        _ => Vec::new(),
    }
}

/// A rule template: an AST skeleton spelled in symbols.
#[derive(Debug, Clone, Copy)]
pub enum Pattern {
    Leaf(Symbol),
    Node(Symbol, &'static [Pattern]),
}

impl Pattern {
    pub fn symbol(&self) -> Symbol {
        match self {
            Pattern::Leaf(symbol) | Pattern::Node(symbol, _) => *symbol,
        }
    }

    pub fn children(&self) -> &'static [Pattern] {
        match self {
            Pattern::Leaf(_) => &[],
            Pattern::Node(_, children) => children,
        }
    }

    /// Number of nodes in the template.
    pub fn size(&self) -> usize {
        1 + self.children().iter().map(Pattern::size).sum::<usize>()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())?;
        for child in self.children() {
            write!(f, " {child}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstArena, Type};
    use crate::ir::VReg;
    use bumpalo::Bump;

    #[test]
    fn test_symbols() {
        let bump = Bump::new();
        let ast = AstArena::new(&bump);
        let lit = ast.literal(3, Type::I32);
        let reg = ast.register(VReg(0), Type::I32);
        assert_eq!(symbol_of(lit), Symbol::LITERAL);
        assert_eq!(symbol_of(reg), Symbol::REGISTER);
        assert_eq!(symbol_of(ast.binary(BinOp::Mul, reg, lit)), Symbol::TIMES);
        assert_eq!(symbol_of(ast.frame_load(8, Type::I32)), Symbol::LOAD);
        assert_eq!(symbol_of(ast.extend(reg)), Symbol::EXTEND);
    }

    #[test]
    fn test_negation_is_not_a_register() {
        let bump = Bump::new();
        let ast = AstArena::new(&bump);
        let neg = ast.negate(ast.register(VReg(1), Type::I32));
        assert_eq!(symbol_of(neg), Symbol::NEGATE);
        assert_ne!(symbol_of(neg), Symbol::REGISTER);
    }

    #[test]
    fn test_call_has_no_selection_children() {
        let bump = Bump::new();
        let ast = AstArena::new(&bump);
        let call = ast.call("f", &[ast.literal(1, Type::I32)], Type::I32);
        assert!(selection_children(call).is_empty());
        assert_eq!(call.children().len(), 1);
    }

    #[test]
    fn test_pattern_display() {
        const R: Pattern = Pattern::Leaf(Symbol::REGISTER);
        const L: Pattern = Pattern::Leaf(Symbol::LITERAL);
        let p = Pattern::Node(Symbol::PLUS, &[R, L]);
        assert_eq!(p.to_string(), "+ r l");
        assert_eq!(p.size(), 3);
    }
}
