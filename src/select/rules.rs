// This module holds the rule set of the instruction selector: a closed table of templates, each
// with a cost function and a construct step that appends IR through the Selector and returns a
// register placeholder for the produced value. Table order is the tie-break order of the cover
// DP, since only strictly cheaper rules replace an earlier winner. Costs are a per-rule constant
// plus, for rules that count them, the recorded best costs of the actual children that the
// template leaves as placeholders. Two rules check applicability on top of the shape match:
// scaled addressing needs a scale of 1, 2, 4 or 8, and the register-to-register move only fires
// when the assignment target already is a register.

//! Rule table: templates, costs and IR construction.

use super::cover::Decorations;
use super::emit::Selector;
use super::symbol::{selection_children, symbol_of, Pattern, Symbol};
use crate::ast::{BinOp, Expr, ExprKind, Type};
use crate::core::error::{CompileError, CompileResult};
use crate::ir::{FunctionRef, Instr, Opcode, Operand, VReg, VirtualRegister, Width};
use crate::x64::{arg_positions, split_chunks};

const R: Pattern = Pattern::Leaf(Symbol::REGISTER);
const LIT: Pattern = Pattern::Leaf(Symbol::LITERAL);
const FP: Pattern = Pattern::Leaf(Symbol::FRAME_POINTER);
/// `L - f l`: a frame slot.
const SLOT: Pattern = Pattern::Node(Symbol::LOAD, &[Pattern::Node(Symbol::MINUS, &[FP, LIT])]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    PlusRegReg,
    PlusRegLit,
    PlusLitReg,
    MulLitReg,
    MulRegLit,
    MulRegReg,
    SubRegLit,
    SubRegReg,
    DivRegReg,
    MovOffsetToOffset,
    LoadFromPointer,
    MovRegToReg,
    StoreThroughPointer,
    ExtendTo64Bits,
    FramePointer,
    MovRegToOffset,
    MovFromOffset,
    CompareRegReg,
    MovFromRegOffset,
    MovFromScaledOffset,
    Negate,
    MovPointeeToOffset,
    AddressOfOffset,
    Call,
    LiteralToReg,
    StringToReg,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub kind: RuleKind,
    pub name: &'static str,
    pub template: Pattern,
    pub result: Symbol,
    base_cost: u32,
    counts_children: bool,
}

impl Rule {
    const fn new(kind: RuleKind, name: &'static str, template: Pattern, base_cost: u32, counts_children: bool) -> Self {
        Self { kind, name, template, result: Symbol::REGISTER, base_cost, counts_children }
    }

    /// Cost of covering `expr` with this rule, or `None` when the rule does not apply.
    pub fn cost(&self, expr: &Expr<'_>, decorations: &Decorations) -> Option<u32> {
        match self.kind {
            RuleKind::MovRegToReg => match expr.kind {
                ExprKind::Assign { target, .. } if target.register().is_some() => {}
                _ => return None,
            },
            RuleKind::MovFromScaledOffset => {
                let scale = scaled_parts(expr).ok()?.3;
                if !matches!(scale, 1 | 2 | 4 | 8) {
                    return None;
                }
            }
            // x86-64 arithmetic immediates are sign-extended 32-bit
            RuleKind::PlusRegLit | RuleKind::SubRegLit | RuleKind::MulRegLit => {
                if !fits_immediate(operands(expr)?.1) {
                    return None;
                }
            }
            RuleKind::PlusLitReg | RuleKind::MulLitReg => {
                if !fits_immediate(operands(expr)?.0) {
                    return None;
                }
            }
            _ => {}
        }
        let children = if self.counts_children { subcost(&self.template, expr, decorations)? } else { 0 };
        Some(self.base_cost + children)
    }

    /// Emit IR for `expr`, whose children already conform to the template.
    pub fn construct<'a>(&self, expr: &'a Expr<'a>, sel: &mut Selector<'_, 'a>) -> CompileResult<&'a Expr<'a>> {
        let ty = expr.ty;
        match self.kind {
            RuleKind::PlusRegReg => {
                let (lhs, rhs) = self.binary_regs(expr)?;
                sel.emit(Instr::new(Opcode::Add, reg(lhs), reg(rhs), self.width(ty)?));
                Ok(sel.typed(lhs, ty))
            }
            RuleKind::PlusRegLit | RuleKind::PlusLitReg => {
                let (target, value) = match (self.kind, operands(expr)) {
                    (RuleKind::PlusRegLit, Some((l, r))) => (self.reg_of(l)?, self.lit_of(r)?),
                    (_, Some((l, r))) => (self.reg_of(r)?, self.lit_of(l)?),
                    _ => return Err(self.malformed("expected a binary node")),
                };
                let width = self.width(ty)?;
                if value == 1 {
                    sel.emit(Instr::unary(Opcode::Inc, reg(target), width));
                } else {
                    sel.emit(Instr::new(Opcode::Add, reg(target), Operand::Literal(value), width));
                }
                Ok(sel.typed(target, ty))
            }
            RuleKind::MulLitReg | RuleKind::MulRegLit => {
                let (target, value) = match (self.kind, operands(expr)) {
                    (RuleKind::MulRegLit, Some((l, r))) => (self.reg_of(l)?, self.lit_of(r)?),
                    (_, Some((l, r))) => (self.reg_of(r)?, self.lit_of(l)?),
                    _ => return Err(self.malformed("expected a binary node")),
                };
                multiply_by_literal(sel, target, value, self.width(ty)?);
                Ok(sel.typed(target, ty))
            }
            RuleKind::MulRegReg | RuleKind::SubRegReg | RuleKind::DivRegReg => {
                let (lhs, rhs) = self.binary_regs(expr)?;
                let op = match self.kind {
                    RuleKind::MulRegReg => Opcode::Mul,
                    RuleKind::SubRegReg => Opcode::Sub,
                    _ => Opcode::Div,
                };
                sel.emit(Instr::new(op, reg(lhs), reg(rhs), self.width(ty)?));
                Ok(sel.typed(lhs, ty))
            }
            RuleKind::SubRegLit => {
                let (l, r) = operands(expr).ok_or_else(|| self.malformed("expected a binary node"))?;
                let (target, value) = (self.reg_of(l)?, self.lit_of(r)?);
                let width = self.width(ty)?;
                if value == 1 {
                    sel.emit(Instr::unary(Opcode::Dec, reg(target), width));
                } else {
                    sel.emit(Instr::new(Opcode::Sub, reg(target), Operand::Literal(value), width));
                }
                Ok(sel.typed(target, ty))
            }
            RuleKind::MovOffsetToOffset => {
                let (target, value) = self.assign_parts(expr)?;
                let (to, from) = (self.slot_of(target)?, self.slot_of(value)?);
                let mut last = None;
                for (offset, width) in split_chunks(ty.size()) {
                    let (tmp, node) = sel.fresh(int_type(width));
                    let k = offset as i64;
                    sel.emit(Instr::new(Opcode::LoadFrame, reg(tmp), Operand::frame(from - k), width));
                    sel.emit(Instr::new(Opcode::StoreFrame, Operand::frame(to - k), reg(tmp), width));
                    last = Some(node);
                }
                Ok(self.assignment_result(sel, last, ty))
            }
            RuleKind::LoadFromPointer => {
                let address = self.reg_of(self.inner(expr)?)?;
                let (value, node) = sel.fresh(ty);
                sel.emit(Instr::new(Opcode::LoadDeref, reg(value), reg(address), self.width(ty)?));
                Ok(node)
            }
            RuleKind::MovRegToReg => {
                let (target, value) = self.assign_parts(expr)?;
                let (target, value) = (self.reg_of(target)?, self.reg_of(value)?);
                sel.emit(Instr::new(Opcode::Copy, reg(target), reg(value), self.width(ty)?));
                Ok(sel.typed(target, ty))
            }
            RuleKind::StoreThroughPointer => {
                let (target, value) = self.assign_parts(expr)?;
                let address = self.reg_of(self.inner(target)?)?;
                let value = self.reg_of(value)?;
                sel.emit(Instr::new(Opcode::StoreDeref, reg(address), reg(value), self.width(ty)?));
                Ok(sel.typed(value, ty))
            }
            RuleKind::ExtendTo64Bits => {
                let inner = self.inner(expr)?;
                let value = self.reg_of(inner)?;
                extend(sel, value, self.width(inner.ty)?);
                Ok(sel.typed(value, Type::I64))
            }
            RuleKind::FramePointer => {
                let (value, node) = sel.fresh(Type::I64);
                sel.emit(Instr::new(Opcode::Copy, reg(value), Operand::FramePointer, Width::B8));
                Ok(node)
            }
            RuleKind::MovRegToOffset => {
                let (target, value) = self.assign_parts(expr)?;
                let slot = self.slot_of(target)?;
                let value = self.reg_of(value)?;
                sel.emit(Instr::new(Opcode::StoreFrame, Operand::frame(slot), reg(value), self.width(ty)?));
                Ok(sel.typed(value, ty))
            }
            RuleKind::MovFromOffset => {
                let slot = self.slot_of(expr)?;
                let (value, node) = sel.fresh(ty);
                sel.emit(Instr::new(Opcode::LoadFrame, reg(value), Operand::frame(slot), self.width(ty)?));
                Ok(node)
            }
            RuleKind::CompareRegReg => {
                let (l, r) = operands(expr).ok_or_else(|| self.malformed("expected a comparison"))?;
                let (lhs, rhs) = (self.reg_of(l)?, self.reg_of(r)?);
                sel.emit(Instr::new(Opcode::Compare, reg(lhs), reg(rhs), self.width(l.ty)?));
                Ok(sel.typed(lhs, l.ty))
            }
            RuleKind::MovFromRegOffset => {
                let (base, offset) = match self.inner(expr)?.kind {
                    ExprKind::Binary { op: BinOp::Sub, lhs, rhs } => (self.reg_of(lhs)?, self.lit_of(rhs)?),
                    _ => return Err(self.malformed("expected register minus literal")),
                };
                let (value, node) = sel.fresh(ty);
                let address = Operand::RegOffset { base: VirtualRegister::new(base), offset };
                sel.emit(Instr::new(Opcode::LoadRegOffset, reg(value), address, self.width(ty)?));
                Ok(node)
            }
            RuleKind::MovFromScaledOffset => {
                let (slot, index, index_ty, scale) = scaled_parts(expr).map_err(|reason| self.malformed(reason))?;
                let index = self.reg_of(index)?;
                extend(sel, index, self.width(index_ty)?);
                let (value, node) = sel.fresh(ty);
                let address = Operand::FrameOffset { offset: slot, index: Some((VirtualRegister::new(index), scale as u8)) };
                sel.emit(Instr::new(Opcode::LoadFrame, reg(value), address, self.width(ty)?));
                Ok(node)
            }
            RuleKind::Negate => {
                let value = self.reg_of(self.inner(expr)?)?;
                sel.emit(Instr::unary(Opcode::Neg, reg(value), self.width(ty)?));
                Ok(sel.typed(value, ty))
            }
            RuleKind::MovPointeeToOffset => {
                let (target, value) = self.assign_parts(expr)?;
                let to = self.slot_of(target)?;
                let from = self.slot_of(self.inner(value)?)?;
                let (pointer, _) = sel.fresh(Type::I64);
                sel.emit(Instr::new(Opcode::LoadFrame, reg(pointer), Operand::frame(from), Width::B8));
                let mut last = None;
                for (offset, width) in split_chunks(ty.size()) {
                    let (tmp, node) = sel.fresh(int_type(width));
                    let k = offset as i64;
                    let source = Operand::RegOffset { base: VirtualRegister::new(pointer), offset: -k };
                    sel.emit(Instr::new(Opcode::LoadRegOffset, reg(tmp), source, width));
                    sel.emit(Instr::new(Opcode::StoreFrame, Operand::frame(to - k), reg(tmp), width));
                    last = Some(node);
                }
                Ok(self.assignment_result(sel, last, ty))
            }
            RuleKind::AddressOfOffset => {
                let slot = self.slot_of(self.inner(expr)?)?;
                let (value, node) = sel.fresh(ty);
                sel.emit(Instr::new(Opcode::AddressOf, reg(value), Operand::frame(slot), Width::B8));
                Ok(node)
            }
            RuleKind::Call => self.construct_call(expr, sel),
            RuleKind::LiteralToReg => {
                let value = self.lit_of(expr)?;
                let (target, node) = sel.fresh(ty);
                sel.emit(Instr::new(Opcode::Copy, reg(target), Operand::Literal(value), self.width(ty)?));
                Ok(node)
            }
            RuleKind::StringToReg => {
                let index = match expr.kind {
                    ExprKind::Str(index) => index,
                    _ => return Err(self.malformed("expected a string literal")),
                };
                let (target, node) = sel.fresh(ty);
                sel.emit(Instr::new(Opcode::StringRef, reg(target), Operand::StringRef(index), Width::B8));
                Ok(node)
            }
        }
    }

    fn construct_call<'a>(&self, expr: &'a Expr<'a>, sel: &mut Selector<'_, 'a>) -> CompileResult<&'a Expr<'a>> {
        let (callee, args) = match expr.kind {
            ExprKind::Call { callee, args } => (callee, args),
            _ => return Err(self.malformed("expected a call")),
        };
        if expr.ty.is_struct() {
            return Err(CompileError::Unsupported { feature: format!("struct return value from {callee}") });
        }
        let positions: u32 = args.iter().map(|arg| arg_positions(&arg.ty)).sum();
        let arg_area = sel.frame().allocate_arg_area(positions);
        let func = FunctionRef { name: callee.to_string(), arg_count: positions, arg_area };

        let mut position = 0;
        for &arg in args.iter() {
            if arg.ty.is_struct() {
                let slot = self.slot_of(arg).map_err(|_| CompileError::Unsupported {
                    feature: format!("struct argument to {callee} that is not a local variable"),
                })?;
                for (offset, width) in split_chunks(arg.ty.size()) {
                    let (tmp, _) = sel.fresh(int_type(width));
                    sel.emit(Instr::new(Opcode::LoadFrame, reg(tmp), Operand::frame(slot - offset as i64), width));
                    sel.emit(Instr::new(Opcode::PushArg, reg(tmp), Operand::frame(func.slot_offset(position)), width));
                    position += 1;
                }
            } else {
                let width = Width::of(&arg.ty, "argument")?;
                let value = sel.emit_expression(arg)?;
                let value = self.reg_of(value)?;
                sel.emit(Instr::new(Opcode::PushArg, reg(value), Operand::frame(func.slot_offset(position)), width));
                position += 1;
            }
        }

        if expr.ty == Type::Void {
            sel.emit(Instr::unary(Opcode::Call, Operand::Function(func), Width::B8));
            let (_, node) = sel.fresh(Type::I64);
            return Ok(node);
        }
        let (result, node) = sel.fresh(expr.ty);
        sel.emit(Instr::new(Opcode::Call, Operand::Function(func), reg(result), Width::of(&expr.ty, "call result")?));
        Ok(node)
    }

    fn malformed(&self, reason: impl Into<String>) -> CompileError {
        CompileError::MalformedOperand { rule: self.name, reason: reason.into() }
    }

    fn width(&self, ty: Type<'_>) -> CompileResult<Width> {
        Width::of(&ty, self.name)
    }

    fn reg_of(&self, expr: &Expr<'_>) -> CompileResult<VReg> {
        expr.register().ok_or_else(|| self.malformed(format!("expected a register, found {}", expr.kind_name())))
    }

    fn lit_of(&self, expr: &Expr<'_>) -> CompileResult<i64> {
        expr.literal_value().ok_or_else(|| self.malformed(format!("expected a literal, found {}", expr.kind_name())))
    }

    fn inner<'a>(&self, expr: &Expr<'a>) -> CompileResult<&'a Expr<'a>> {
        match expr.kind {
            ExprKind::Deref(inner) | ExprKind::AddressOf(inner) | ExprKind::Negate(inner) | ExprKind::Extend(inner) => {
                Ok(inner)
            }
            _ => Err(self.malformed(format!("expected a unary node, found {}", expr.kind_name()))),
        }
    }

    fn binary_regs(&self, expr: &Expr<'_>) -> CompileResult<(VReg, VReg)> {
        let (l, r) = operands(expr).ok_or_else(|| self.malformed("expected a binary node"))?;
        Ok((self.reg_of(l)?, self.reg_of(r)?))
    }

    fn assign_parts<'a>(&self, expr: &Expr<'a>) -> CompileResult<(&'a Expr<'a>, &'a Expr<'a>)> {
        match expr.kind {
            ExprKind::Assign { target, value } => Ok((target, value)),
            _ => Err(self.malformed("expected an assignment")),
        }
    }

    /// Offset `o` of a frame slot `L(- f o)`.
    fn slot_of(&self, expr: &Expr<'_>) -> CompileResult<i64> {
        frame_slot(expr).ok_or_else(|| self.malformed(format!("expected a frame slot, found {expr}")))
    }

    /// Value of a chunked copy: the copied register for primitive values.
    fn assignment_result<'a>(&self, sel: &mut Selector<'_, 'a>, last: Option<&'a Expr<'a>>, ty: Type<'a>) -> &'a Expr<'a> {
        match last {
            Some(node) if !ty.is_struct() => match node.register() {
                Some(value) => sel.typed(value, ty),
                None => node,
            },
            Some(node) => node,
            None => sel.fresh(Type::I64).1,
        }
    }
}

fn reg(index: VReg) -> Operand {
    Operand::vreg(index)
}

fn operands<'a>(expr: &Expr<'a>) -> Option<(&'a Expr<'a>, &'a Expr<'a>)> {
    match expr.kind {
        ExprKind::Binary { lhs, rhs, .. } | ExprKind::Compare { lhs, rhs, .. } => Some((lhs, rhs)),
        _ => None,
    }
}

/// A non-literal child is left to the template match to reject.
fn fits_immediate(expr: &Expr<'_>) -> bool {
    expr.literal_value().map_or(true, |value| i32::try_from(value).is_ok())
}

pub(crate) fn int_type(width: Width) -> Type<'static> {
    match width {
        Width::B1 => Type::I8,
        Width::B2 => Type::I16,
        Width::B4 => Type::I32,
        Width::B8 => Type::I64,
    }
}

/// Offset of a frame slot `L(- f o)`.
pub(crate) fn frame_slot(expr: &Expr<'_>) -> Option<i64> {
    match expr.kind {
        ExprKind::Deref(address) => match address.kind {
            ExprKind::Binary { op: BinOp::Sub, lhs, rhs } if matches!(lhs.kind, ExprKind::FramePointer) => {
                rhs.literal_value()
            }
            _ => None,
        },
        _ => None,
    }
}

/// `L(+ (- f o) (e (* i s)))` as `(o, i, type of the scaled index, s)`.
fn scaled_parts<'a>(expr: &Expr<'a>) -> Result<(i64, &'a Expr<'a>, Type<'a>, i64), &'static str> {
    let ExprKind::Deref(address) = expr.kind else { return Err("expected a load") };
    let ExprKind::Binary { op: BinOp::Add, lhs: base, rhs: term } = address.kind else {
        return Err("expected base plus index");
    };
    let ExprKind::Binary { op: BinOp::Sub, rhs: offset, .. } = base.kind else { return Err("expected a frame address") };
    let ExprKind::Extend(product) = term.kind else { return Err("expected an extended index") };
    let ExprKind::Binary { op: BinOp::Mul, lhs: index, rhs: scale } = product.kind else {
        return Err("expected a scaled index");
    };
    let offset = offset.literal_value().ok_or("expected a literal offset")?;
    let scale = scale.literal_value().ok_or("expected a literal scale")?;
    Ok((offset, index, product.ty, scale))
}

fn multiply_by_literal(sel: &mut Selector<'_, '_>, target: VReg, value: i64, width: Width) {
    match value {
        1 => {}
        2 => sel.emit(Instr::new(Opcode::Add, reg(target), reg(target), width)),
        4 => sel.emit(Instr::new(Opcode::Sal, reg(target), Operand::Literal(2), width)),
        8 => sel.emit(Instr::new(Opcode::Sal, reg(target), Operand::Literal(3), width)),
        _ => sel.emit(Instr::new(Opcode::Mul, reg(target), Operand::Literal(value), width)),
    }
}

fn extend(sel: &mut Selector<'_, '_>, value: VReg, width: Width) {
    if width != Width::B8 {
        sel.emit(Instr::unary(Opcode::Extend, reg(value), width));
    }
}

/// Sum of the best costs of the actual children sitting where the template has a placeholder.
fn subcost(pattern: &Pattern, actual: &Expr<'_>, decorations: &Decorations) -> Option<u32> {
    let mut total = 0;
    for (template, child) in pattern.children().iter().zip(selection_children(actual)) {
        total += if template.symbol() != symbol_of(child) {
            decorations.best(child.id, template.symbol())?.0
        } else {
            subcost(template, child, decorations)?
        };
    }
    Some(total)
}

/// The rule table in tie-break order.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn standard() -> Self {
        use Pattern::Node;
        use RuleKind::*;
        let rules = vec![
            Rule::new(PlusRegReg, "PlusRegReg", Node(Symbol::PLUS, &[R, R]), 2, true),
            Rule::new(PlusRegLit, "PlusRegLit", Node(Symbol::PLUS, &[R, LIT]), 2, true),
            Rule::new(PlusLitReg, "PlusLitReg", Node(Symbol::PLUS, &[LIT, R]), 2, true),
            Rule::new(MulLitReg, "MulLitReg", Node(Symbol::TIMES, &[LIT, R]), 3, true),
            Rule::new(MulRegLit, "MulRegLit", Node(Symbol::TIMES, &[R, LIT]), 2, true),
            Rule::new(MulRegReg, "MulRegReg", Node(Symbol::TIMES, &[R, R]), 2, true),
            Rule::new(SubRegLit, "SubRegLit", Node(Symbol::MINUS, &[R, LIT]), 2, true),
            Rule::new(SubRegReg, "SubRegReg", Node(Symbol::MINUS, &[R, R]), 2, true),
            Rule::new(DivRegReg, "DivRegReg", Node(Symbol::DIVIDE, &[R, R]), 3, true),
            Rule::new(MovOffsetToOffset, "MovOffsetToOffset", Node(Symbol::ASSIGN, &[SLOT, SLOT]), 2, false),
            Rule::new(LoadFromPointer, "LoadFromPointer", Node(Symbol::LOAD, &[R]), 2, true),
            Rule::new(MovRegToReg, "MovRegToReg", Node(Symbol::ASSIGN, &[R, R]), 1, true),
            Rule::new(
                StoreThroughPointer,
                "StoreThroughPointer",
                Node(Symbol::ASSIGN, &[Node(Symbol::LOAD, &[R]), R]),
                2,
                true,
            ),
            Rule::new(ExtendTo64Bits, "ExtendTo64Bits", Node(Symbol::EXTEND, &[R]), 1, false),
            Rule::new(FramePointer, "FramePointer", FP, 1, false),
            Rule::new(MovRegToOffset, "MovRegToOffset", Node(Symbol::ASSIGN, &[SLOT, R]), 2, true),
            Rule::new(MovFromOffset, "MovFromOffset", SLOT, 2, false),
            Rule::new(CompareRegReg, "CompareRegReg", Node(Symbol::COMPARE, &[R, R]), 1, true),
            Rule::new(
                MovFromRegOffset,
                "MovFromRegOffset",
                Node(Symbol::LOAD, &[Node(Symbol::MINUS, &[R, LIT])]),
                2,
                true,
            ),
            Rule::new(
                MovFromScaledOffset,
                "MovFromScaledOffset",
                Node(
                    Symbol::LOAD,
                    &[Node(
                        Symbol::PLUS,
                        &[
                            Node(Symbol::MINUS, &[FP, LIT]),
                            Node(Symbol::EXTEND, &[Node(Symbol::TIMES, &[R, LIT])]),
                        ],
                    )],
                ),
                3,
                true,
            ),
            Rule::new(Negate, "Negate", Node(Symbol::NEGATE, &[R]), 1, true),
            Rule::new(MovPointeeToOffset, "MovPointeeToOffset", Node(Symbol::ASSIGN, &[SLOT, Node(Symbol::LOAD, &[SLOT])]), 2, false),
            Rule::new(AddressOfOffset, "AddressOfOffset", Node(Symbol::ADDRESS_OF, &[SLOT]), 2, false),
            Rule::new(Call, "Call", Pattern::Leaf(Symbol::CALL), 1, false),
            Rule::new(LiteralToReg, "LiteralToReg", LIT, 1, false),
            Rule::new(StringToReg, "StringToReg", Pattern::Leaf(Symbol::STRING), 1, false),
        ];
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn rule(&self, index: usize) -> &Rule {
        &self.rules[index]
    }

    pub fn position(&self, kind: RuleKind) -> Option<usize> {
        self.rules.iter().position(|rule| rule.kind == kind)
    }
}
