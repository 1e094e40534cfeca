//! IR emission driven by the selected cover.
//!
//! [`Selector::emit_expression`] labels an expression and then reduces it to a register:
//! the winning rule's template is compared against the node's children, every child whose
//! symbol differs from the template position is reduced first (depth-first, left to right),
//! and the resulting register placeholders are substituted into a fresh copy of the parent.
//! The original tree is never mutated. Only then does the rule's construct step run.

use super::cover::Labeler;
use super::symbol::{selection_children, symbol_of, Pattern, Symbol};
use crate::ast::{AstArena, Expr, ExprKind, Type};
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::{CompilationSession, FunctionContext};
use crate::ir::{Instr, VReg};
use crate::x64::FunctionFrame;

pub struct Selector<'s, 'a> {
    session: &'s CompilationSession<'a>,
    ctx: &'s mut FunctionContext<'a>,
}

impl<'s, 'a> Selector<'s, 'a> {
    pub fn new(session: &'s CompilationSession<'a>, ctx: &'s mut FunctionContext<'a>) -> Self {
        Self { session, ctx }
    }

    pub fn ast(&self) -> &'s AstArena<'a> {
        self.session.ast()
    }

    pub fn frame(&mut self) -> &mut FunctionFrame<'a> {
        &mut self.ctx.frame
    }

    pub fn emit(&mut self, instr: Instr) {
        log::trace!("{instr}");
        self.ctx.emit(instr);
    }

    /// A fresh virtual register and its placeholder node.
    pub fn fresh(&mut self, ty: Type<'a>) -> (VReg, &'a Expr<'a>) {
        let reg = self.ctx.new_vreg();
        (reg, self.ast().register(reg, ty))
    }

    /// Placeholder node for an existing register.
    pub fn typed(&self, reg: VReg, ty: Type<'a>) -> &'a Expr<'a> {
        self.ast().register(reg, ty)
    }

    /// Select and emit `expr`; returns the register placeholder holding its value.
    pub fn emit_expression(&mut self, expr: &'a Expr<'a>) -> CompileResult<&'a Expr<'a>> {
        let session = self.session;
        Labeler::new(session.rules(), session.automaton()).label(expr, &mut self.ctx.decorations);
        self.reduce(expr, Symbol::REGISTER)
    }

    fn reduce(&mut self, expr: &'a Expr<'a>, goal: Symbol) -> CompileResult<&'a Expr<'a>> {
        let session = self.session;
        let Some((cost, index)) = self.ctx.decorations.best(expr.id, goal) else {
            return Err(self.coverage_gap(expr));
        };
        let rule = session.rules().rule(index);
        log::trace!("reduce {expr} with {} (cost {cost})", rule.name);
        let conformed = self.conform(&rule.template, expr)?;
        session.record_rule_applied();
        rule.construct(conformed, self)
    }

    /// Reduce every child that does not already have the template's shape.
    fn conform(&mut self, template: &Pattern, expr: &'a Expr<'a>) -> CompileResult<&'a Expr<'a>> {
        let children = selection_children(expr);
        if children.is_empty() {
            return Ok(expr);
        }
        let mut replaced = Vec::with_capacity(children.len());
        let mut changed = false;
        for (shape, &child) in template.children().iter().zip(children.iter()) {
            let next = if shape.symbol() != symbol_of(child) {
                self.reduce(child, shape.symbol())?
            } else {
                self.conform(shape, child)?
            };
            changed |= !std::ptr::eq(next, child);
            replaced.push(next);
        }
        if !changed {
            return Ok(expr);
        }
        Ok(self.with_children(expr, &replaced))
    }

    fn with_children(&self, expr: &'a Expr<'a>, children: &[&'a Expr<'a>]) -> &'a Expr<'a> {
        let kind = match (expr.kind, children) {
            (ExprKind::Binary { op, .. }, &[lhs, rhs]) => ExprKind::Binary { op, lhs, rhs },
            (ExprKind::Compare { op, .. }, &[lhs, rhs]) => ExprKind::Compare { op, lhs, rhs },
            (ExprKind::Logical { op, .. }, &[lhs, rhs]) => ExprKind::Logical { op, lhs, rhs },
            (ExprKind::Assign { .. }, &[target, value]) => ExprKind::Assign { target, value },
            (ExprKind::Deref(_), &[inner]) => ExprKind::Deref(inner),
            (ExprKind::Negate(_), &[inner]) => ExprKind::Negate(inner),
            (ExprKind::Extend(_), &[inner]) => ExprKind::Extend(inner),
            (ExprKind::AddressOf(_), &[inner]) => ExprKind::AddressOf(inner),
            (kind, _) => kind,
        };
        self.ast().expr(expr.ty, kind)
    }

    /// Report the deepest node without a cover.
    fn coverage_gap(&self, expr: &Expr<'_>) -> CompileError {
        let node = self.uncovered(expr).unwrap_or(expr);
        log::debug!("no cover for {node} in {expr}");
        CompileError::CoverageGap { kind: node.kind_name(), symbol: symbol_of(node).0 }
    }

    fn uncovered<'e>(&self, expr: &'e Expr<'e>) -> Option<&'e Expr<'e>> {
        for child in selection_children(expr) {
            if let Some(node) = self.uncovered(child) {
                return Some(node);
            }
        }
        let covered =
            expr.register().is_some() || self.ctx.decorations.best(expr.id, Symbol::REGISTER).is_some();
        if covered {
            None
        } else {
            Some(expr)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, CmpOp, LogicalOp};
    use crate::ir::{Opcode, Operand, Width};
    use bumpalo::Bump;

    fn opcodes(ctx: &FunctionContext<'_>) -> Vec<Opcode> {
        ctx.instrs.iter().map(|i| i.op).collect()
    }

    #[test]
    fn test_frame_assignment_reduces_children_first() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut ctx = FunctionContext::new(&arena, "f", Type::Void);
        let ast = session.ast();
        let value = ast.binary(BinOp::Mul, ast.frame_load(8, Type::I32), ast.literal(3, Type::I32));
        let assign = ast.assign(ast.frame_load(4, Type::I32), value);
        let before = assign.to_string();

        let result = Selector::new(&session, &mut ctx).emit_expression(assign).unwrap();
        assert_eq!(opcodes(&ctx), vec![Opcode::LoadFrame, Opcode::Mul, Opcode::StoreFrame]);
        assert_eq!(ctx.instrs[0], Instr::new(Opcode::LoadFrame, Operand::vreg(VReg(0)), Operand::frame(8), Width::B4));
        assert_eq!(ctx.instrs[2], Instr::new(Opcode::StoreFrame, Operand::frame(4), Operand::vreg(VReg(0)), Width::B4));
        assert_eq!(result.register(), Some(VReg(0)));
        assert_eq!(assign.to_string(), before);
        assert_eq!(session.stats().rules_applied, 3);
    }

    #[test]
    fn test_multiply_by_power_of_two_shifts() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut ctx = FunctionContext::new(&arena, "f", Type::Void);
        let ast = session.ast();
        let expr = ast.binary(BinOp::Mul, ast.frame_load(8, Type::I64), ast.literal(8, Type::I64));
        Selector::new(&session, &mut ctx).emit_expression(expr).unwrap();
        assert_eq!(ctx.instrs[1], Instr::new(Opcode::Sal, Operand::vreg(VReg(0)), Operand::Literal(3), Width::B8));
    }

    #[test]
    fn test_increment_for_plus_one() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut ctx = FunctionContext::new(&arena, "f", Type::Void);
        let ast = session.ast();
        let sum = ast.binary(BinOp::Add, ast.frame_load(4, Type::I32), ast.literal(1, Type::I32));
        let expr = ast.assign(ast.frame_load(4, Type::I32), sum);
        Selector::new(&session, &mut ctx).emit_expression(expr).unwrap();
        assert_eq!(opcodes(&ctx), vec![Opcode::LoadFrame, Opcode::Inc, Opcode::StoreFrame]);
    }

    #[test]
    fn test_struct_copy_is_split_into_chunks() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut ctx = FunctionContext::new(&arena, "f", Type::Void);
        let ast = session.ast();
        // a 12-byte value: one 8-byte and one 4-byte chunk
        let ty = Type::Array(ast.ty(Type::I32), 3);
        let expr = ast.assign(ast.frame_load(24, ty), ast.frame_load(12, ty));
        Selector::new(&session, &mut ctx).emit_expression(expr).unwrap();
        assert_eq!(
            ctx.instrs,
            vec![
                Instr::new(Opcode::LoadFrame, Operand::vreg(VReg(0)), Operand::frame(12), Width::B8),
                Instr::new(Opcode::StoreFrame, Operand::frame(24), Operand::vreg(VReg(0)), Width::B8),
                Instr::new(Opcode::LoadFrame, Operand::vreg(VReg(1)), Operand::frame(4), Width::B4),
                Instr::new(Opcode::StoreFrame, Operand::frame(16), Operand::vreg(VReg(1)), Width::B4),
            ]
        );
    }

    #[test]
    fn test_call_evaluates_arguments_left_to_right() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut ctx = FunctionContext::new(&arena, "f", Type::Void);
        let ast = session.ast();
        let args: Vec<_> = (1..=7).map(|v| ast.literal(v, Type::I32)).collect();
        let call = ast.call("g", &args, Type::I32);
        let result = Selector::new(&session, &mut ctx).emit_expression(call).unwrap();

        let pushes: Vec<_> = ctx.instrs.iter().filter(|i| i.op == Opcode::PushArg).collect();
        assert_eq!(pushes.len(), 7);
        assert_eq!(pushes[0].a1, Some(Operand::frame(56)));
        assert_eq!(pushes[6].a1, Some(Operand::frame(8)));
        let last = ctx.instrs.last().unwrap();
        assert_eq!(last.op, Opcode::Call);
        assert_eq!(last.defined_register(), result.register());
        assert_eq!(ctx.frame.call_site_count(), 1);
    }

    #[test]
    fn test_scaled_index_load() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut ctx = FunctionContext::new(&arena, "f", Type::Void);
        let ast = session.ast();
        let index = ast.binary(BinOp::Mul, ast.frame_load(4, Type::I32), ast.literal(4, Type::I32));
        let address = ast.binary_typed(BinOp::Add, ast.frame_address(40, Type::I32), ast.extend(index), Type::I64);
        let load = ast.deref(address, Type::I32);
        Selector::new(&session, &mut ctx).emit_expression(load).unwrap();
        assert_eq!(opcodes(&ctx), vec![Opcode::LoadFrame, Opcode::Extend, Opcode::LoadFrame]);
        match &ctx.instrs[2].a1 {
            Some(Operand::FrameOffset { offset: 40, index: Some((reg, 4)) }) => assert_eq!(reg.index, VReg(0)),
            other => panic!("unexpected address {other:?}"),
        }
    }

    #[test]
    fn test_logical_value_is_a_coverage_gap() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut ctx = FunctionContext::new(&arena, "f", Type::Void);
        let ast = session.ast();
        let a = ast.compare(CmpOp::Lt, ast.frame_load(4, Type::I32), ast.literal(1, Type::I32));
        let b = ast.compare(CmpOp::Gt, ast.frame_load(8, Type::I32), ast.literal(2, Type::I32));
        let both = ast.logical(LogicalOp::Or, a, b);
        let err = Selector::new(&session, &mut ctx).emit_expression(both).unwrap_err();
        assert_eq!(err, CompileError::CoverageGap { kind: "logical", symbol: '|' });
        assert!(ctx.instrs.is_empty());
    }
}
