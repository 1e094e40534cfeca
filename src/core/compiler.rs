// This module defines the per-function compilation driver. Compiler walks the functions of a
// program and, for each one, creates a fresh FunctionContext, lowers the statements to IR,
// runs linear-scan allocation and hands the allocated IR to the NASM emitter. Statement lowering
// lives here rather than in the rule set: declarations reserve frame slots and become
// assignments, blocks open scopes, if/while/for become labels and conditional jumps, and
// return moves the value to the return register and jumps to the shared epilogue label.
// Every expression is first rewritten against the frame layout and then handed to the
// selector. Conditions never produce a value: a comparison emits a compare followed by the
// jump for the inverted condition so the body can fall through, and logical and/or
// short-circuit through extra labels. The prologue is emitted with a placeholder frame size
// that is patched once the body has reserved all of its slots, including the outgoing
// argument areas of every call site.
//
// With keep-going enabled, functions that fail with a recoverable error are reported and
// skipped, and the rest of the batch is still compiled.

//! Per-function compilation driver.

use super::analyzer::LiveInterval;
use super::error::{CompileError, CompileResult};
use super::session::{CompilationSession, FunctionContext};
use crate::ast::rewrite::{FrameRewriter, Slot};
use crate::ast::{Expr, ExprKind, Function, LogicalOp, Program, Signature, Stmt, Type};
use crate::ir::{Condition, Instr, LabelId, Opcode, Operand, Width};
use crate::regalloc::LinearScan;
use crate::select::Selector;
use crate::x64::{split_chunks, AsmEmitter};

/// Allocated IR of one function.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub name: String,
    pub instrs: Vec<Instr>,
    pub frame_size: i64,
    pub intervals: Vec<LiveInterval>,
    pub save_restore_pairs: usize,
}

/// Assembly for a whole program plus the per-function results it was built from.
#[derive(Debug, Default)]
pub struct ProgramOutput {
    pub text: String,
    pub functions: Vec<CompiledFunction>,
    /// Functions skipped in keep-going mode.
    pub failures: Vec<(String, CompileError)>,
}

impl ProgramOutput {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn function(&self, name: &str) -> Option<&CompiledFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

pub struct Compiler<'s, 'a> {
    session: &'s CompilationSession<'a>,
    keep_going: bool,
}

impl<'s, 'a> Compiler<'s, 'a> {
    pub fn new(session: &'s CompilationSession<'a>) -> Self {
        Self { session, keep_going: false }
    }

    pub fn keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    /// Compile every function of `program` and render the NASM text.
    pub fn compile_program(&self, program: &Program<'a>) -> CompileResult<ProgramOutput> {
        let session = self.session;
        for signature in &program.externs {
            session.declare_signature(*signature);
        }
        for func in &program.functions {
            let params = session.arena().alloc_slice_fill_iter(func.params.iter().map(|p| p.ty));
            session.declare_signature(Signature { name: func.name, params, ret: func.ret, variadic: false });
        }

        let mut output = ProgramOutput::default();
        for func in &program.functions {
            match self.compile_function(func) {
                Ok(compiled) => output.functions.push(compiled),
                Err(err) if self.keep_going && err.is_recoverable() => {
                    log::warn!("skipping {}: {}", func.name, err);
                    session.record_function_failed();
                    output.failures.push((func.name.to_string(), err));
                }
                Err(err) => {
                    session.record_function_failed();
                    return Err(err);
                }
            }
        }

        let mut emitter = AsmEmitter::new(session.target());
        let globals: Vec<&str> = output.functions.iter().map(|f| f.name.as_str()).collect();
        let externs: Vec<&str> = program.externs.iter().map(|s| s.name).collect();
        emitter.emit_header(&globals, &externs);
        for func in &output.functions {
            emitter.emit_function(&func.name, &func.instrs)?;
        }
        emitter.emit_strings(&session.strings());
        output.text = emitter.finish();
        Ok(output)
    }

    /// Lower, allocate and return the IR of one function.
    pub fn compile_function(&self, func: &Function<'a>) -> CompileResult<CompiledFunction> {
        let ctx = self.lower_function(func)?;
        let frame_size = ctx.frame.frame_size();
        let allocation = LinearScan::for_target(self.session.target()).allocate(ctx.instrs)?;
        let pairs = allocation.save_restore_pairs();
        log::debug!(
            "{}: frame {} bytes, {} instructions, {} intervals in {} registers, {} saves",
            func.name,
            frame_size,
            allocation.instrs.len(),
            allocation.intervals.len(),
            allocation.used_slots().len(),
            pairs
        );
        self.session.record_intervals(allocation.intervals.len());
        self.session.record_save_restore(pairs);
        self.session.record_function_compiled(func.name, allocation.instrs.len());
        Ok(CompiledFunction {
            name: func.name.to_string(),
            instrs: allocation.instrs,
            frame_size,
            intervals: allocation.intervals,
            save_restore_pairs: pairs,
        })
    }

    /// Lower one function to virtual-register IR.
    pub fn lower_function(&self, func: &Function<'a>) -> CompileResult<FunctionContext<'a>> {
        if func.ret.is_struct() {
            return Err(CompileError::Unsupported { feature: format!("struct return type of {}", func.name) });
        }
        let mut lowering = Lowering {
            session: self.session,
            ctx: FunctionContext::new(self.session.arena(), func.name, func.ret),
        };
        lowering.function(func)?;
        Ok(lowering.ctx)
    }
}

struct Lowering<'s, 'a> {
    session: &'s CompilationSession<'a>,
    ctx: FunctionContext<'a>,
}

impl<'s, 'a> Lowering<'s, 'a> {
    fn function(&mut self, func: &Function<'a>) -> CompileResult<()> {
        self.ctx.emit(Instr::unary(Opcode::Prologue, Operand::Literal(0), Width::B8));
        let mut position = 0;
        for param in func.params {
            let offset = self.declare(param.name, param.ty);
            if param.ty.is_struct() {
                for (k, width) in split_chunks(param.ty.size()) {
                    self.pop_arg(offset - k as i64, position, width);
                    position += 1;
                }
            } else {
                self.pop_arg(offset, position, Width::of(&param.ty, "parameter")?);
                position += 1;
            }
        }

        for stmt in func.body {
            self.statement(stmt)?;
        }

        self.label(LabelId::RETURN);
        self.ctx.emit(Instr::nullary(Opcode::Epilogue));
        let frame_size = self.ctx.frame.frame_size();
        self.ctx.instrs[0] = Instr::unary(Opcode::Prologue, Operand::Literal(frame_size), Width::B8);
        Ok(())
    }

    fn pop_arg(&mut self, offset: i64, position: u32, width: Width) {
        self.ctx.emit(Instr::new(Opcode::PopArg, Operand::frame(offset), Operand::Literal(position as i64), width));
    }

    fn declare(&mut self, name: &'a str, ty: Type<'a>) -> i64 {
        let offset = self.ctx.frame.allocate(&ty);
        self.ctx.scopes.declare(name, Slot { offset, ty });
        offset
    }

    fn label(&mut self, label: LabelId) {
        self.ctx.emit(Instr::unary(Opcode::Label, Operand::Label(label), Width::B8));
    }

    fn jump(&mut self, op: Opcode, label: LabelId) {
        self.ctx.emit(Instr::unary(op, Operand::Label(label), Width::B8));
    }

    fn statement(&mut self, stmt: &Stmt<'a>) -> CompileResult<()> {
        match *stmt {
            Stmt::Expr(expr) => {
                self.value(expr)?;
            }
            Stmt::Let { name, ty, init } => {
                self.declare(name, ty);
                if let Some(init) = init {
                    let ast = self.session.ast();
                    self.value(ast.assign(ast.var(name, ty), init))?;
                }
            }
            Stmt::Block(stmts) => {
                self.ctx.scopes.push();
                let result = stmts.iter().try_for_each(|s| self.statement(s));
                self.ctx.scopes.pop();
                result?;
            }
            Stmt::If { cond, then_branch, else_branch } => {
                let skip = self.ctx.new_label();
                self.branch(cond, skip, false)?;
                self.statement(then_branch)?;
                match else_branch {
                    Some(else_branch) => {
                        let end = self.ctx.new_label();
                        self.jump(Opcode::Jump, end);
                        self.label(skip);
                        self.statement(else_branch)?;
                        self.label(end);
                    }
                    None => self.label(skip),
                }
            }
            Stmt::While { cond, body } => self.lower_loop(Some(cond), None, body)?,
            Stmt::For { init, cond, step, body } => {
                self.ctx.scopes.push();
                let result = match init {
                    Some(init) => self.statement(init),
                    None => Ok(()),
                }
                .and_then(|()| self.lower_loop(cond, step, body));
                self.ctx.scopes.pop();
                result?;
            }
            Stmt::Return(value) => {
                match value {
                    Some(expr) => {
                        let result = self.value(expr)?;
                        let reg = result.register().ok_or_else(|| {
                            CompileError::internal(format!("return value {result} is not a register"))
                        })?;
                        let width = Width::of(&self.ctx.ret, "return value")?;
                        self.ctx.emit(Instr::unary(Opcode::Return, Operand::vreg(reg), width));
                    }
                    None => self.ctx.emit(Instr::nullary(Opcode::Return)),
                }
            }
        }
        Ok(())
    }

    /// `jmp cond; body: body; step; cond: if cond goto body`
    fn lower_loop(
        &mut self,
        cond: Option<&'a Expr<'a>>,
        step: Option<&'a Expr<'a>>,
        body: &Stmt<'a>,
    ) -> CompileResult<()> {
        let top = self.ctx.new_label();
        let test = self.ctx.new_label();
        self.jump(Opcode::Jump, test);
        self.label(top);
        self.statement(body)?;
        if let Some(step) = step {
            self.value(step)?;
        }
        self.label(test);
        match cond {
            Some(cond) => self.branch(cond, top, true),
            None => {
                self.jump(Opcode::Jump, top);
                Ok(())
            }
        }
    }

    /// Jump to `target` when `cond` evaluates to `when`; fall through otherwise.
    fn branch(&mut self, cond: &'a Expr<'a>, target: LabelId, when: bool) -> CompileResult<()> {
        match cond.kind {
            ExprKind::Logical { op, lhs, rhs } => {
                // and: jump-if-true needs both, jump-if-false needs either to fail
                let short_circuits = matches!((op, when), (LogicalOp::Or, true) | (LogicalOp::And, false));
                if short_circuits {
                    self.branch(lhs, target, when)?;
                    self.branch(rhs, target, when)
                } else {
                    let skip = self.ctx.new_label();
                    self.branch(lhs, skip, !when)?;
                    self.branch(rhs, target, when)?;
                    self.label(skip);
                    Ok(())
                }
            }
            ExprKind::Compare { op, .. } => {
                let rewritten = self.rewrite(cond)?;
                for child in rewritten.children() {
                    reject_condition_values(child)?;
                }
                self.select(rewritten)?;
                let condition = Condition::from(op);
                let condition = if when { condition } else { condition.negate() };
                self.jump(Opcode::JumpIf(condition), target);
                Ok(())
            }
            _ => {
                let value = self.value(cond)?;
                let reg = value
                    .register()
                    .ok_or_else(|| CompileError::internal(format!("condition {value} is not a register")))?;
                let width = Width::of(&value.ty, "condition")?;
                self.ctx.emit(Instr::new(Opcode::Compare, Operand::vreg(reg), Operand::Literal(0), width));
                let condition = if when { Condition::Ne } else { Condition::Eq };
                self.jump(Opcode::JumpIf(condition), target);
                Ok(())
            }
        }
    }

    fn rewrite(&self, expr: &'a Expr<'a>) -> CompileResult<&'a Expr<'a>> {
        FrameRewriter::new(self.session.ast(), &self.ctx.scopes).rewrite(expr)
    }

    /// Lower an expression evaluated for its value.
    fn value(&mut self, expr: &'a Expr<'a>) -> CompileResult<&'a Expr<'a>> {
        let rewritten = self.rewrite(expr)?;
        reject_condition_values(rewritten)?;
        self.select(rewritten)
    }

    fn select(&mut self, expr: &'a Expr<'a>) -> CompileResult<&'a Expr<'a>> {
        self.ctx.decorations.clear();
        Selector::new(self.session, &mut self.ctx).emit_expression(expr)
    }
}

/// Comparisons and logical operators only appear as conditions.
fn reject_condition_values(expr: &Expr<'_>) -> CompileResult<()> {
    match expr.kind {
        ExprKind::Compare { .. } | ExprKind::Logical { .. } => {
            Err(CompileError::Unsupported { feature: format!("{} used as a value", expr.kind_name()) })
        }
        _ => expr.children().into_iter().try_for_each(reject_condition_values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, CmpOp, Param};
    use bumpalo::Bump;

    fn ops(instrs: &[Instr]) -> Vec<Opcode> {
        instrs.iter().map(|i| i.op).collect()
    }

    #[test]
    fn test_assignment_function() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let ast = session.ast();
        let sum = ast.binary(BinOp::Add, ast.var("a", Type::I32), ast.literal(1, Type::I32));
        let body = ast.stmts(&[
            Stmt::Let { name: "a", ty: Type::I32, init: Some(ast.literal(5, Type::I32)) },
            Stmt::Return(Some(sum)),
        ]);
        let func = Function { name: "main", params: &[], ret: Type::I32, body };
        let ctx = Compiler::new(&session).lower_function(&func).unwrap();
        assert_eq!(
            ops(&ctx.instrs),
            vec![
                Opcode::Prologue,
                Opcode::Copy,
                Opcode::StoreFrame,
                Opcode::LoadFrame,
                Opcode::Inc,
                Opcode::Return,
                Opcode::Label,
                Opcode::Epilogue,
            ]
        );
        assert_eq!(ctx.instrs[0].a0, Some(Operand::Literal(8)));
    }

    #[test]
    fn test_parameters_are_stored_to_frame() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let params = arena.alloc_slice_copy(&[Param { name: "x", ty: Type::I64 }, Param { name: "y", ty: Type::I32 }]);
        let func = Function { name: "f", params, ret: Type::Void, body: &[] };
        let ctx = Compiler::new(&session).lower_function(&func).unwrap();
        assert_eq!(ctx.instrs[1], Instr::new(Opcode::PopArg, Operand::frame(8), Operand::Literal(0), Width::B8));
        assert_eq!(ctx.instrs[2], Instr::new(Opcode::PopArg, Operand::frame(12), Operand::Literal(1), Width::B4));
        assert_eq!(ctx.instrs[0].a0, Some(Operand::Literal(24)));
    }

    #[test]
    fn test_while_loop_tests_condition_at_bottom() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let ast = session.ast();
        let i = ast.var("i", Type::I32);
        let cond = ast.compare(CmpOp::Lt, i, ast.literal(10, Type::I32));
        let step = ast.assign(i, ast.binary(BinOp::Add, i, ast.literal(1, Type::I32)));
        let body = ast.stmts(&[
            Stmt::Let { name: "i", ty: Type::I32, init: Some(ast.literal(0, Type::I32)) },
            Stmt::While { cond, body: ast.stmt(Stmt::Expr(step)) },
        ]);
        let func = Function { name: "count", params: &[], ret: Type::Void, body };
        let ctx = Compiler::new(&session).lower_function(&func).unwrap();
        let jumps: Vec<_> = ctx.instrs.iter().filter(|i| matches!(i.op, Opcode::Jump | Opcode::JumpIf(_))).collect();
        assert_eq!(jumps[0].op, Opcode::Jump);
        assert_eq!(jumps[0].a0, Some(Operand::Label(LabelId(2))));
        assert_eq!(jumps[1].op, Opcode::JumpIf(Condition::Lt));
        assert_eq!(jumps[1].a0, Some(Operand::Label(LabelId(1))));
    }

    #[test]
    fn test_if_condition_jumps_on_inverted_comparison() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let ast = session.ast();
        let a = ast.var("a", Type::I32);
        let cond = ast.logical(
            LogicalOp::And,
            ast.compare(CmpOp::Eq, a, ast.literal(1, Type::I32)),
            ast.compare(CmpOp::Gt, a, ast.literal(0, Type::I32)),
        );
        let then_branch = ast.stmt(Stmt::Return(None));
        let body = ast.stmts(&[
            Stmt::Let { name: "a", ty: Type::I32, init: None },
            Stmt::If { cond, then_branch, else_branch: None },
        ]);
        let func = Function { name: "g", params: &[], ret: Type::Void, body };
        let ctx = Compiler::new(&session).lower_function(&func).unwrap();
        let conditions: Vec<_> = ctx
            .instrs
            .iter()
            .filter_map(|i| match i.op {
                Opcode::JumpIf(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(conditions, vec![Condition::Ne, Condition::Le]);
    }

    #[test]
    fn test_comparison_value_is_rejected() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let ast = session.ast();
        let a = ast.var("a", Type::I32);
        let body = ast.stmts(&[
            Stmt::Let { name: "a", ty: Type::I32, init: None },
            Stmt::Expr(ast.assign(a, ast.compare(CmpOp::Lt, a, ast.literal(3, Type::I32)))),
        ]);
        let func = Function { name: "h", params: &[], ret: Type::Void, body };
        let err = Compiler::new(&session).lower_function(&func).unwrap_err();
        assert!(matches!(err, CompileError::Unsupported { .. }));
    }

    #[test]
    fn test_block_scope_ends() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let ast = session.ast();
        let inner = ast.stmts(&[Stmt::Let { name: "t", ty: Type::I32, init: None }]);
        let body = ast.stmts(&[Stmt::Block(inner), Stmt::Expr(ast.var("t", Type::I32))]);
        let func = Function { name: "k", params: &[], ret: Type::Void, body };
        let err = Compiler::new(&session).lower_function(&func).unwrap_err();
        assert_eq!(err, CompileError::UnknownVariable { name: "t".to_string() });
    }
}
