// This module defines the typed abstract syntax tree consumed by the backend. All nodes live in
// the session's bumpalo arena and are immutable once built: an Expr carries a unique NodeId, its
// resolved Type and an ExprKind. Selection decorations are kept in side tables keyed by NodeId,
// and the emission driver builds replacement nodes instead of rewriting children in place, so a
// tree can always be inspected after compilation. AstArena hands out node ids and provides the
// builder helpers used by the test input format, the frame rewrite and the selector. Statements,
// function definitions, extern signatures and struct layouts complete the program model.

//! Arena-allocated, typed AST.

pub mod rewrite;

use crate::ir::VReg;
use bumpalo::Bump;
use std::cell::Cell;
use std::fmt;

pub use rewrite::{FrameRewriter, Scopes, Slot};

/// Unique identifier of an expression node within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type<'a> {
    Void,
    I8,
    I16,
    I32,
    I64,
    Pointer(&'a Type<'a>),
    Array(&'a Type<'a>, u32),
    Struct(&'a StructDef<'a>),
}

impl<'a> Type<'a> {
    /// Size in bytes. Structs are packed.
    pub fn size(&self) -> u32 {
        match self {
            Type::Void => 0,
            Type::I8 => 1,
            Type::I16 => 2,
            Type::I32 => 4,
            Type::I64 | Type::Pointer(_) => 8,
            Type::Array(elem, count) => elem.size() * count,
            Type::Struct(def) => def.size(),
        }
    }

    /// Natural alignment, used when placing frame slots.
    pub fn alignment(&self) -> u32 {
        match self {
            Type::Void => 1,
            Type::Array(elem, _) => elem.alignment(),
            Type::Struct(def) => def.fields.iter().map(|f| f.ty.alignment()).max().unwrap_or(1),
            other => other.size(),
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::I8 | Type::I16 | Type::I32 | Type::I64)
    }

    pub fn pointee(&self) -> Option<Type<'a>> {
        match self {
            Type::Pointer(inner) => Some(**inner),
            _ => None,
        }
    }
}

impl fmt::Display for Type<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::I8 => write!(f, "i8"),
            Type::I16 => write!(f, "i16"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::Pointer(inner) => write!(f, "{inner}*"),
            Type::Array(elem, count) => write!(f, "[{elem} : {count}]"),
            Type::Struct(def) => write!(f, "{}", def.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    pub name: &'a str,
    pub ty: Type<'a>,
}

/// Struct layout: ordered fields, no padding.
#[derive(Debug, PartialEq, Eq)]
pub struct StructDef<'a> {
    pub name: &'a str,
    pub fields: &'a [Field<'a>],
}

impl<'a> StructDef<'a> {
    pub fn size(&self) -> u32 {
        self.fields.iter().map(|f| f.ty.size()).sum()
    }

    /// Byte offset and type of the named field.
    pub fn field(&self, name: &str) -> Option<(u32, Type<'a>)> {
        let mut offset = 0;
        for field in self.fields {
            if field.name == name {
                return Some((offset, field.ty));
            }
            offset += field.ty.size();
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug)]
pub struct Expr<'a> {
    pub id: NodeId,
    pub ty: Type<'a>,
    pub kind: ExprKind<'a>,
}

#[derive(Debug, Clone, Copy)]
pub enum ExprKind<'a> {
    Binary { op: BinOp, lhs: &'a Expr<'a>, rhs: &'a Expr<'a> },
    Literal(i64),
    /// Index into the session string pool.
    Str(u32),
    Var(&'a str),
    Field { base: &'a Expr<'a>, name: &'a str },
    Index { base: &'a Expr<'a>, index: &'a Expr<'a> },
    Call { callee: &'a str, args: &'a [&'a Expr<'a>] },
    Assign { target: &'a Expr<'a>, value: &'a Expr<'a> },
    Deref(&'a Expr<'a>),
    AddressOf(&'a Expr<'a>),
    FramePointer,
    /// A value already reduced into a virtual register.
    Register(VReg),
    Compare { op: CmpOp, lhs: &'a Expr<'a>, rhs: &'a Expr<'a> },
    Negate(&'a Expr<'a>),
    Logical { op: LogicalOp, lhs: &'a Expr<'a>, rhs: &'a Expr<'a> },
    Extend(&'a Expr<'a>),
}

impl<'a> Expr<'a> {
    /// Short node kind name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ExprKind::Binary { .. } => "binary",
            ExprKind::Literal(_) => "literal",
            ExprKind::Str(_) => "string",
            ExprKind::Var(_) => "variable",
            ExprKind::Field { .. } => "field access",
            ExprKind::Index { .. } => "index",
            ExprKind::Call { .. } => "call",
            ExprKind::Assign { .. } => "assignment",
            ExprKind::Deref(_) => "dereference",
            ExprKind::AddressOf(_) => "address-of",
            ExprKind::FramePointer => "frame pointer",
            ExprKind::Register(_) => "register",
            ExprKind::Compare { .. } => "comparison",
            ExprKind::Negate(_) => "negation",
            ExprKind::Logical { .. } => "logical",
            ExprKind::Extend(_) => "extend",
        }
    }

    pub fn literal_value(&self) -> Option<i64> {
        match self.kind {
            ExprKind::Literal(value) => Some(value),
            _ => None,
        }
    }

    pub fn register(&self) -> Option<VReg> {
        match self.kind {
            ExprKind::Register(reg) => Some(reg),
            _ => None,
        }
    }

    /// Direct subexpressions in evaluation order.
    pub fn children(&self) -> Vec<&'a Expr<'a>> {
        match self.kind {
            ExprKind::Binary { lhs, rhs, .. }
            | ExprKind::Compare { lhs, rhs, .. }
            | ExprKind::Logical { lhs, rhs, .. } => vec![lhs, rhs],
            ExprKind::Assign { target, value } => vec![target, value],
            ExprKind::Field { base, .. } => vec![base],
            ExprKind::Index { base, index } => vec![base, index],
            ExprKind::Call { args, .. } => args.to_vec(),
            ExprKind::Deref(inner)
            | ExprKind::AddressOf(inner)
            | ExprKind::Negate(inner)
            | ExprKind::Extend(inner) => vec![inner],
            ExprKind::Literal(_)
            | ExprKind::Str(_)
            | ExprKind::Var(_)
            | ExprKind::FramePointer
            | ExprKind::Register(_) => Vec::new(),
        }
    }
}

impl fmt::Display for Expr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ExprKind::Binary { op, lhs, rhs } => {
                let sym = match op {
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                    BinOp::Mul => "*",
                    BinOp::Div => "/",
                };
                write!(f, "({sym} {lhs} {rhs})")
            }
            ExprKind::Literal(v) => write!(f, "{v}"),
            ExprKind::Str(n) => write!(f, "str{n}"),
            ExprKind::Var(name) => write!(f, "{name}"),
            ExprKind::Field { base, name } => write!(f, "(. {base} {name})"),
            ExprKind::Index { base, index } => write!(f, "([ {base} {index})"),
            ExprKind::Call { callee, args } => {
                write!(f, "(call {callee}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
            ExprKind::Assign { target, value } => write!(f, "(= {target} {value})"),
            ExprKind::Deref(inner) => write!(f, "(L {inner})"),
            ExprKind::AddressOf(inner) => write!(f, "(P {inner})"),
            ExprKind::FramePointer => write!(f, "fp"),
            ExprKind::Register(reg) => write!(f, "{reg}"),
            ExprKind::Compare { op, lhs, rhs } => write!(f, "({op:?} {lhs} {rhs})"),
            ExprKind::Negate(inner) => write!(f, "(neg {inner})"),
            ExprKind::Logical { op, lhs, rhs } => write!(f, "({op:?} {lhs} {rhs})"),
            ExprKind::Extend(inner) => write!(f, "(e {inner})"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Stmt<'a> {
    Expr(&'a Expr<'a>),
    Let { name: &'a str, ty: Type<'a>, init: Option<&'a Expr<'a>> },
    Block(&'a [Stmt<'a>]),
    If { cond: &'a Expr<'a>, then_branch: &'a Stmt<'a>, else_branch: Option<&'a Stmt<'a>> },
    While { cond: &'a Expr<'a>, body: &'a Stmt<'a> },
    For {
        init: Option<&'a Stmt<'a>>,
        cond: Option<&'a Expr<'a>>,
        step: Option<&'a Expr<'a>>,
        body: &'a Stmt<'a>,
    },
    Return(Option<&'a Expr<'a>>),
}

#[derive(Debug, Clone, Copy)]
pub struct Param<'a> {
    pub name: &'a str,
    pub ty: Type<'a>,
}

/// Callable signature, for both defined functions and externs.
#[derive(Debug, Clone, Copy)]
pub struct Signature<'a> {
    pub name: &'a str,
    pub params: &'a [Type<'a>],
    pub ret: Type<'a>,
    pub variadic: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Function<'a> {
    pub name: &'a str,
    pub params: &'a [Param<'a>],
    pub ret: Type<'a>,
    pub body: &'a [Stmt<'a>],
}

#[derive(Debug, Default)]
pub struct Program<'a> {
    pub structs: Vec<&'a StructDef<'a>>,
    pub externs: Vec<Signature<'a>>,
    pub functions: Vec<Function<'a>>,
}

/// Node factory over the session arena.
pub struct AstArena<'a> {
    bump: &'a Bump,
    next_id: Cell<u32>,
}

impl<'a> AstArena<'a> {
    pub fn new(bump: &'a Bump) -> Self {
        Self { bump, next_id: Cell::new(0) }
    }

    pub fn bump(&self) -> &'a Bump {
        self.bump
    }

    fn next_id(&self) -> NodeId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        NodeId(id)
    }

    /// Number of nodes allocated so far.
    pub fn node_count(&self) -> u32 {
        self.next_id.get()
    }

    pub fn expr(&self, ty: Type<'a>, kind: ExprKind<'a>) -> &'a Expr<'a> {
        self.bump.alloc(Expr { id: self.next_id(), ty, kind })
    }

    pub fn ty(&self, ty: Type<'a>) -> &'a Type<'a> {
        self.bump.alloc(ty)
    }

    pub fn pointer_to(&self, ty: Type<'a>) -> Type<'a> {
        Type::Pointer(self.ty(ty))
    }

    pub fn str(&self, s: &str) -> &'a str {
        self.bump.alloc_str(s)
    }

    pub fn exprs(&self, items: &[&'a Expr<'a>]) -> &'a [&'a Expr<'a>] {
        self.bump.alloc_slice_copy(items)
    }

    pub fn stmt(&self, stmt: Stmt<'a>) -> &'a Stmt<'a> {
        self.bump.alloc(stmt)
    }

    pub fn stmts(&self, items: &[Stmt<'a>]) -> &'a [Stmt<'a>] {
        self.bump.alloc_slice_copy(items)
    }

    pub fn literal(&self, value: i64, ty: Type<'a>) -> &'a Expr<'a> {
        self.expr(ty, ExprKind::Literal(value))
    }

    pub fn var(&self, name: &str, ty: Type<'a>) -> &'a Expr<'a> {
        self.expr(ty, ExprKind::Var(self.str(name)))
    }

    pub fn register(&self, reg: VReg, ty: Type<'a>) -> &'a Expr<'a> {
        self.expr(ty, ExprKind::Register(reg))
    }

    pub fn frame_pointer(&self) -> &'a Expr<'a> {
        self.expr(Type::I64, ExprKind::FramePointer)
    }

    /// Binary arithmetic typed like its left operand.
    pub fn binary(&self, op: BinOp, lhs: &'a Expr<'a>, rhs: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(lhs.ty, ExprKind::Binary { op, lhs, rhs })
    }

    pub fn binary_typed(&self, op: BinOp, lhs: &'a Expr<'a>, rhs: &'a Expr<'a>, ty: Type<'a>) -> &'a Expr<'a> {
        self.expr(ty, ExprKind::Binary { op, lhs, rhs })
    }

    pub fn assign(&self, target: &'a Expr<'a>, value: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(target.ty, ExprKind::Assign { target, value })
    }

    /// Load of a `ty` value from `address`.
    pub fn deref(&self, address: &'a Expr<'a>, ty: Type<'a>) -> &'a Expr<'a> {
        self.expr(ty, ExprKind::Deref(address))
    }

    pub fn address_of(&self, inner: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(self.pointer_to(inner.ty), ExprKind::AddressOf(inner))
    }

    pub fn extend(&self, inner: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(Type::I64, ExprKind::Extend(inner))
    }

    pub fn compare(&self, op: CmpOp, lhs: &'a Expr<'a>, rhs: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(Type::I32, ExprKind::Compare { op, lhs, rhs })
    }

    pub fn logical(&self, op: LogicalOp, lhs: &'a Expr<'a>, rhs: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(Type::I32, ExprKind::Logical { op, lhs, rhs })
    }

    pub fn negate(&self, inner: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(inner.ty, ExprKind::Negate(inner))
    }

    pub fn call(&self, callee: &str, args: &[&'a Expr<'a>], ret: Type<'a>) -> &'a Expr<'a> {
        self.expr(ret, ExprKind::Call { callee: self.str(callee), args: self.exprs(args) })
    }

    /// Frame slot address `fp - offset`.
    pub fn frame_address(&self, offset: i64, pointee: Type<'a>) -> &'a Expr<'a> {
        let ty = self.pointer_to(pointee);
        self.binary_typed(BinOp::Sub, self.frame_pointer(), self.literal(offset, Type::I64), ty)
    }

    /// Load of the frame slot at `offset`.
    pub fn frame_load(&self, offset: i64, ty: Type<'a>) -> &'a Expr<'a> {
        self.deref(self.frame_address(offset, ty), ty)
    }
}
