//! Frame rewrite: resolves variables, fields and indexing into explicit address arithmetic.
//!
//! After the rewrite an expression only contains the node kinds the rule templates talk
//! about: loads (`L`) of frame-pointer or pointer relative addresses, arithmetic, calls and
//! assignments. A variable at frame offset `o` becomes `L(- f o)`, a struct field at byte `k`
//! folds into the offset, and a non-literal array index becomes the scaled term
//! `e(* i size)` added to the base address.

use super::{AstArena, BinOp, Expr, ExprKind, Type};
use crate::core::error::{CompileError, CompileResult};
use hashbrown::HashMap;

/// A local variable's frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot<'a> {
    /// Distance below the frame pointer.
    pub offset: i64,
    pub ty: Type<'a>,
}

/// Lexical scopes of one function.
#[derive(Debug)]
pub struct Scopes<'a> {
    frames: Vec<HashMap<&'a str, Slot<'a>>>,
}

impl Default for Scopes<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Scopes<'a> {
    pub fn new() -> Self {
        Self { frames: vec![HashMap::new()] }
    }

    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn declare(&mut self, name: &'a str, slot: Slot<'a>) {
        if let Some(scope) = self.frames.last_mut() {
            scope.insert(name, slot);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Slot<'a>> {
        self.frames.iter().rev().find_map(|scope| scope.get(name).copied())
    }
}

/// Where an lvalue lives.
#[derive(Debug, Clone, Copy)]
enum Place<'a> {
    /// `fp - offset (+ dynamic)`
    Frame { offset: i64, dynamic: Option<&'a Expr<'a>> },
    /// `base + offset (+ dynamic)`
    Pointer { base: &'a Expr<'a>, offset: i64, dynamic: Option<&'a Expr<'a>> },
}

pub struct FrameRewriter<'s, 'a> {
    ast: &'s AstArena<'a>,
    scopes: &'s Scopes<'a>,
}

impl<'s, 'a> FrameRewriter<'s, 'a> {
    pub fn new(ast: &'s AstArena<'a>, scopes: &'s Scopes<'a>) -> Self {
        Self { ast, scopes }
    }

    pub fn rewrite(&self, expr: &'a Expr<'a>) -> CompileResult<&'a Expr<'a>> {
        let ast = self.ast;
        Ok(match expr.kind {
            ExprKind::Var(_) | ExprKind::Field { .. } | ExprKind::Index { .. } | ExprKind::Deref(_) => {
                let place = self.place(expr)?;
                self.load(place, expr.ty)
            }
            ExprKind::AddressOf(inner) => {
                let place = self.place(inner)?;
                self.address(place, expr.ty)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                ast.binary_typed(op, self.rewrite(lhs)?, self.rewrite(rhs)?, expr.ty)
            }
            ExprKind::Assign { target, value } => {
                ast.expr(expr.ty, ExprKind::Assign { target: self.rewrite(target)?, value: self.rewrite(value)? })
            }
            ExprKind::Call { callee, args } => {
                let args = args.iter().map(|arg| self.rewrite(arg)).collect::<CompileResult<Vec<_>>>()?;
                ast.expr(expr.ty, ExprKind::Call { callee, args: ast.exprs(&args) })
            }
            ExprKind::Compare { op, lhs, rhs } => {
                ast.expr(expr.ty, ExprKind::Compare { op, lhs: self.rewrite(lhs)?, rhs: self.rewrite(rhs)? })
            }
            ExprKind::Logical { op, lhs, rhs } => {
                ast.expr(expr.ty, ExprKind::Logical { op, lhs: self.rewrite(lhs)?, rhs: self.rewrite(rhs)? })
            }
            ExprKind::Negate(inner) => ast.expr(expr.ty, ExprKind::Negate(self.rewrite(inner)?)),
            ExprKind::Extend(inner) => ast.expr(expr.ty, ExprKind::Extend(self.rewrite(inner)?)),
            ExprKind::Literal(_) | ExprKind::Str(_) | ExprKind::FramePointer | ExprKind::Register(_) => expr,
        })
    }

    fn place(&self, expr: &'a Expr<'a>) -> CompileResult<Place<'a>> {
        match expr.kind {
            ExprKind::Var(name) => {
                let slot = self
                    .scopes
                    .lookup(name)
                    .ok_or_else(|| CompileError::UnknownVariable { name: name.to_string() })?;
                Ok(Place::Frame { offset: slot.offset, dynamic: None })
            }
            ExprKind::Field { base, name } => {
                let (def, through_pointer) = match base.ty {
                    Type::Struct(def) => (def, false),
                    Type::Pointer(Type::Struct(def)) => (*def, true),
                    other => {
                        return Err(CompileError::Unsupported { feature: format!("field access on {other}") })
                    }
                };
                let (field_offset, _) = def.field(name).ok_or_else(|| CompileError::UnknownField {
                    structure: def.name.to_string(),
                    field: name.to_string(),
                })?;
                let k = field_offset as i64;
                if through_pointer {
                    return Ok(Place::Pointer { base: self.rewrite(base)?, offset: k, dynamic: None });
                }
                Ok(match self.place(base)? {
                    Place::Frame { offset, dynamic } => Place::Frame { offset: offset - k, dynamic },
                    Place::Pointer { base, offset, dynamic } => Place::Pointer { base, offset: offset + k, dynamic },
                })
            }
            ExprKind::Index { base, index } => {
                let size = expr.ty.size() as i64;
                let place = match base.ty {
                    Type::Array(..) => self.place(base)?,
                    Type::Pointer(_) => Place::Pointer { base: self.rewrite(base)?, offset: 0, dynamic: None },
                    other => {
                        return Err(CompileError::Unsupported { feature: format!("indexing a value of type {other}") })
                    }
                };
                if let Some(value) = index.literal_value() {
                    let delta = value * size;
                    return Ok(match place {
                        Place::Frame { offset, dynamic } => Place::Frame { offset: offset - delta, dynamic },
                        Place::Pointer { base, offset, dynamic } => {
                            Place::Pointer { base, offset: offset + delta, dynamic }
                        }
                    });
                }
                let term = self.scaled_index(index, size)?;
                Ok(match place {
                    Place::Frame { offset, dynamic } => Place::Frame { offset, dynamic: Some(self.sum(dynamic, term)) },
                    Place::Pointer { base, offset, dynamic } => {
                        Place::Pointer { base, offset, dynamic: Some(self.sum(dynamic, term)) }
                    }
                })
            }
            ExprKind::Deref(inner) => Ok(Place::Pointer { base: self.rewrite(inner)?, offset: 0, dynamic: None }),
            _ => Err(CompileError::Unsupported { feature: format!("{} is not assignable", expr.kind_name()) }),
        }
    }

    /// `e(* index size)`
    fn scaled_index(&self, index: &'a Expr<'a>, size: i64) -> CompileResult<&'a Expr<'a>> {
        let index = self.rewrite(index)?;
        let scale = self.ast.literal(size, index.ty);
        Ok(self.ast.extend(self.ast.binary(BinOp::Mul, index, scale)))
    }

    fn sum(&self, previous: Option<&'a Expr<'a>>, term: &'a Expr<'a>) -> &'a Expr<'a> {
        match previous {
            Some(previous) => self.ast.binary_typed(BinOp::Add, previous, term, Type::I64),
            None => term,
        }
    }

    /// `base - (-offset)`, or `base` itself when the offset is zero.
    fn pointer_base(&self, base: &'a Expr<'a>, offset: i64, ty: Type<'a>) -> &'a Expr<'a> {
        if offset == 0 {
            return base;
        }
        self.ast.binary_typed(BinOp::Sub, base, self.ast.literal(-offset, Type::I64), ty)
    }

    fn load(&self, place: Place<'a>, ty: Type<'a>) -> &'a Expr<'a> {
        let ast = self.ast;
        let address_ty = ast.pointer_to(ty);
        match place {
            Place::Frame { offset, dynamic: None } => ast.frame_load(offset, ty),
            Place::Frame { offset, dynamic: Some(dynamic) } => {
                let address = ast.binary_typed(BinOp::Add, ast.frame_address(offset, ty), dynamic, address_ty);
                ast.deref(address, ty)
            }
            Place::Pointer { base, offset, dynamic: None } => ast.deref(self.pointer_base(base, offset, address_ty), ty),
            Place::Pointer { base, offset, dynamic: Some(dynamic) } => {
                let base = self.pointer_base(base, offset, address_ty);
                ast.deref(ast.binary_typed(BinOp::Add, base, dynamic, address_ty), ty)
            }
        }
    }

    fn address(&self, place: Place<'a>, ty: Type<'a>) -> &'a Expr<'a> {
        let ast = self.ast;
        let pointee = ty.pointee().unwrap_or(Type::I64);
        match place {
            Place::Frame { offset, dynamic: None } => ast.address_of(ast.frame_load(offset, pointee)),
            Place::Frame { offset, dynamic: Some(dynamic) } => {
                ast.binary_typed(BinOp::Add, ast.frame_address(offset, pointee), dynamic, ty)
            }
            Place::Pointer { base, offset, dynamic } => {
                let base = if offset == 0 {
                    base
                } else {
                    ast.binary_typed(BinOp::Add, base, ast.literal(offset, Type::I64), ty)
                };
                match dynamic {
                    Some(dynamic) => ast.binary_typed(BinOp::Add, base, dynamic, ty),
                    None => base,
                }
            }
        }
    }
}
