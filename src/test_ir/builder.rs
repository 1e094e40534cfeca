// This module turns parsed items into the typed arena AST. Struct layouts are resolved first,
// in declaration order, so a field can only name a struct declared above it. Signatures of
// externs and of every defined function are collected next so calls may reference functions
// defined later in the file. Function bodies are then built with a scope stack of variable
// types. Integer literals take the type their context expects: the other operand of an
// arithmetic or comparison node, the target of an assignment or declaration, a parameter of
// the callee, or the function's return type. String literals go to the session pool.

use super::parser::{parse_items, Item, Pos, SExpr, TypeSyntax};
use crate::ast::{
    AstArena, BinOp, CmpOp, Expr, ExprKind, Field, Function, LogicalOp, Param, Program, Signature, Stmt,
    StructDef, Type,
};
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use hashbrown::HashMap;

/// Parse `text` and build a typed program in the session arena.
pub fn parse_program<'a>(session: &CompilationSession<'a>, text: &str) -> CompileResult<Program<'a>> {
    let items = parse_items(text)?;
    ProgramBuilder::new(session).build(&items)
}

pub struct ProgramBuilder<'s, 'a> {
    session: &'s CompilationSession<'a>,
    structs: HashMap<&'a str, &'a StructDef<'a>>,
    signatures: HashMap<&'a str, Signature<'a>>,
    scopes: Vec<HashMap<&'a str, Type<'a>>>,
    ret: Type<'a>,
}

impl<'s, 'a> ProgramBuilder<'s, 'a> {
    pub fn new(session: &'s CompilationSession<'a>) -> Self {
        Self {
            session,
            structs: HashMap::new(),
            signatures: HashMap::new(),
            scopes: Vec::new(),
            ret: Type::Void,
        }
    }

    fn ast(&self) -> &'s AstArena<'a> {
        self.session.ast()
    }

    pub fn build(mut self, items: &[Item<'_>]) -> CompileResult<Program<'a>> {
        let mut program = Program::default();
        for item in items {
            if let Item::Struct { name, fields, pos } = item {
                let def = self.declare_struct(name, fields, *pos)?;
                program.structs.push(def);
            }
        }
        for item in items {
            match item {
                Item::Extern { name, params, variadic, ret, .. } => {
                    let params = params.iter().map(|p| self.resolve_type(p)).collect::<CompileResult<Vec<_>>>()?;
                    let signature = Signature {
                        name: self.session.intern_str(name),
                        params: self.session.arena().alloc_slice_copy(&params),
                        ret: self.resolve_type(ret)?,
                        variadic: *variadic,
                    };
                    self.signatures.insert(signature.name, signature);
                    program.externs.push(signature);
                }
                Item::Function { name, params, ret, .. } => {
                    let params =
                        params.iter().map(|(_, ty)| self.resolve_type(ty)).collect::<CompileResult<Vec<_>>>()?;
                    let signature = Signature {
                        name: self.session.intern_str(name),
                        params: self.session.arena().alloc_slice_copy(&params),
                        ret: self.resolve_type(ret)?,
                        variadic: false,
                    };
                    self.signatures.insert(signature.name, signature);
                }
                Item::Struct { .. } => {}
            }
        }
        for item in items {
            if let Item::Function { name, params, ret, body, .. } = item {
                program.functions.push(self.function(name, params, ret, body)?);
            }
        }
        log::debug!(
            "built {} structs, {} externs, {} functions",
            program.structs.len(),
            program.externs.len(),
            program.functions.len()
        );
        Ok(program)
    }

    fn declare_struct(
        &mut self,
        name: &str,
        fields: &[(&str, TypeSyntax<'_>)],
        pos: Pos,
    ) -> CompileResult<&'a StructDef<'a>> {
        let mut resolved = Vec::with_capacity(fields.len());
        for (field, ty) in fields {
            if resolved.iter().any(|f: &Field<'a>| f.name == *field) {
                return Err(parse_error(pos, format!("duplicate field {} in struct {}", field, name)));
            }
            resolved.push(Field { name: self.session.intern_str(field), ty: self.resolve_type(ty)? });
        }
        let arena = self.session.arena();
        let def: &'a StructDef<'a> =
            arena.alloc(StructDef { name: self.session.intern_str(name), fields: arena.alloc_slice_copy(&resolved) });
        self.structs.insert(def.name, def);
        Ok(def)
    }

    fn resolve_type(&self, syntax: &TypeSyntax<'_>) -> CompileResult<Type<'a>> {
        Ok(match syntax {
            TypeSyntax::Named("void") => Type::Void,
            TypeSyntax::Named("i8") => Type::I8,
            TypeSyntax::Named("i16") => Type::I16,
            TypeSyntax::Named("i32") => Type::I32,
            TypeSyntax::Named("i64") => Type::I64,
            TypeSyntax::Named(name) => match self.structs.get(name) {
                Some(def) => Type::Struct(def),
                None => return Err(CompileError::UnknownStruct { name: name.to_string() }),
            },
            TypeSyntax::Pointer(inner) => self.ast().pointer_to(self.resolve_type(inner)?),
            TypeSyntax::Array(elem, count) => Type::Array(self.ast().ty(self.resolve_type(elem)?), *count),
        })
    }

    /// Type written as an atom inside a statement, e.g. `i32` or `point**`.
    fn type_operand(&self, expr: &SExpr<'_>) -> CompileResult<Type<'a>> {
        match expr {
            SExpr::Type(syntax, _) => self.resolve_type(syntax),
            SExpr::Atom(text, _) => {
                let base = text.trim_end_matches('*');
                let mut syntax = TypeSyntax::Named(base);
                for _ in 0..text.len() - base.len() {
                    syntax = TypeSyntax::Pointer(Box::new(syntax));
                }
                self.resolve_type(&syntax)
            }
            other => Err(parse_error(other.pos(), "expected a type")),
        }
    }

    fn function(
        &mut self,
        name: &str,
        params: &[(&str, TypeSyntax<'_>)],
        ret: &TypeSyntax<'_>,
        body: &[SExpr<'_>],
    ) -> CompileResult<Function<'a>> {
        self.ret = self.resolve_type(ret)?;
        self.scopes.clear();
        self.scopes.push(HashMap::new());
        let mut resolved = Vec::with_capacity(params.len());
        for (param, ty) in params {
            let param = Param { name: self.session.intern_str(param), ty: self.resolve_type(ty)? };
            self.declare(param.name, param.ty);
            resolved.push(param);
        }
        let stmts = body.iter().map(|s| self.stmt(s)).collect::<CompileResult<Vec<_>>>()?;
        self.scopes.clear();
        let arena = self.session.arena();
        Ok(Function {
            name: self.session.intern_str(name),
            params: arena.alloc_slice_copy(&resolved),
            ret: self.ret,
            body: self.ast().stmts(&stmts),
        })
    }

    fn declare(&mut self, name: &'a str, ty: Type<'a>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, ty);
        }
    }

    fn lookup(&self, name: &str) -> Option<Type<'a>> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    fn stmt(&mut self, expr: &SExpr<'_>) -> CompileResult<Stmt<'a>> {
        let SExpr::List(items, pos) = expr else {
            return Ok(Stmt::Expr(self.expr(expr, None)?));
        };
        let pos = *pos;
        let args = items.get(1..).unwrap_or(&[]);
        match items.first().and_then(SExpr::atom) {
            Some("let") => {
                let (name, ty, init) = match args {
                    [name, ty] => (name, ty, None),
                    [name, ty, init] => (name, ty, Some(init)),
                    _ => return Err(parse_error(pos, "expected (let name type [init])")),
                };
                let name = name.atom().ok_or_else(|| parse_error(name.pos(), "expected a variable name"))?;
                let ty = self.type_operand(ty)?;
                let init = init.map(|init| self.expr(init, Some(ty))).transpose()?;
                let name = self.session.intern_str(name);
                self.declare(name, ty);
                Ok(Stmt::Let { name, ty, init })
            }
            Some("block") => {
                self.scopes.push(HashMap::new());
                let stmts = args.iter().map(|s| self.stmt(s)).collect::<CompileResult<Vec<_>>>();
                self.scopes.pop();
                Ok(Stmt::Block(self.ast().stmts(&stmts?)))
            }
            Some("if") => match args {
                [cond, then_branch] => Ok(Stmt::If {
                    cond: self.expr(cond, None)?,
                    then_branch: self.nested(then_branch)?,
                    else_branch: None,
                }),
                [cond, then_branch, else_branch] => Ok(Stmt::If {
                    cond: self.expr(cond, None)?,
                    then_branch: self.nested(then_branch)?,
                    else_branch: Some(self.nested(else_branch)?),
                }),
                _ => Err(parse_error(pos, "expected (if cond then [else])")),
            },
            Some("while") => match args {
                [cond, body] => Ok(Stmt::While { cond: self.expr(cond, None)?, body: self.nested(body)? }),
                _ => Err(parse_error(pos, "expected (while cond body)")),
            },
            Some("for") => {
                let [init, cond, step, body] = args else {
                    return Err(parse_error(pos, "expected (for init cond step body)"));
                };
                self.scopes.push(HashMap::new());
                let result = self.for_loop(init, cond, step, body);
                self.scopes.pop();
                result
            }
            Some("return") => match args {
                [] => Ok(Stmt::Return(None)),
                [value] => {
                    let ret = self.ret;
                    Ok(Stmt::Return(Some(self.expr(value, Some(ret))?)))
                }
                _ => Err(parse_error(pos, "expected (return [value])")),
            },
            _ => Ok(Stmt::Expr(self.expr(expr, None)?)),
        }
    }

    fn for_loop(
        &mut self,
        init: &SExpr<'_>,
        cond: &SExpr<'_>,
        step: &SExpr<'_>,
        body: &SExpr<'_>,
    ) -> CompileResult<Stmt<'a>> {
        let init = match init {
            SExpr::Atom("_", _) => None,
            init => Some(self.nested(init)?),
        };
        let cond = match cond {
            SExpr::Atom("_", _) => None,
            cond => Some(self.expr(cond, None)?),
        };
        let step = match step {
            SExpr::Atom("_", _) => None,
            step => Some(self.expr(step, None)?),
        };
        Ok(Stmt::For { init, cond, step, body: self.nested(body)? })
    }

    fn nested(&mut self, expr: &SExpr<'_>) -> CompileResult<&'a Stmt<'a>> {
        let stmt = self.stmt(expr)?;
        Ok(self.ast().stmt(stmt))
    }

    fn expr(&mut self, expr: &SExpr<'_>, expected: Option<Type<'a>>) -> CompileResult<&'a Expr<'a>> {
        let ast = self.ast();
        match expr {
            SExpr::Int(value, _) => Ok(ast.literal(*value, literal_type(*value, expected))),
            SExpr::Str(value, _) => {
                let index = self.session.intern_string(value);
                Ok(ast.expr(ast.pointer_to(Type::I8), ExprKind::Str(index)))
            }
            SExpr::Atom(name, pos) => {
                if is_operator(name) {
                    return Err(parse_error(*pos, format!("operator '{}' outside of a list", name)));
                }
                match self.lookup(name) {
                    Some(ty) => Ok(ast.var(self.session.intern_str(name), ty)),
                    None => Err(CompileError::UnknownVariable { name: name.to_string() }),
                }
            }
            SExpr::Type(_, pos) => Err(parse_error(*pos, "a type is not an expression")),
            SExpr::List(items, pos) => self.list(items, *pos),
        }
    }

    fn list(&mut self, items: &[SExpr<'_>], pos: Pos) -> CompileResult<&'a Expr<'a>> {
        let ast = self.ast();
        let Some(head) = items.first().and_then(SExpr::atom) else {
            return Err(parse_error(pos, "expected an operator or function name"));
        };
        let args = &items[1..];
        match (head, args) {
            ("-", [inner]) => Ok(ast.negate(self.expr(inner, None)?)),
            ("*", [inner]) => {
                let address = self.expr(inner, None)?;
                match address.ty.pointee() {
                    Some(ty) => Ok(ast.deref(address, ty)),
                    None => Err(CompileError::Unsupported { feature: format!("dereferencing a value of type {}", address.ty) }),
                }
            }
            ("&", [inner]) => Ok(ast.address_of(self.expr(inner, None)?)),
            ("+" | "-" | "*" | "/", [lhs, rhs]) => {
                let op = match head {
                    "+" => BinOp::Add,
                    "-" => BinOp::Sub,
                    "*" => BinOp::Mul,
                    _ => BinOp::Div,
                };
                let (lhs, rhs) = self.operands(lhs, rhs)?;
                let ty = if lhs.literal_value().is_some() { rhs.ty } else { lhs.ty };
                Ok(ast.binary_typed(op, lhs, rhs, ty))
            }
            ("==" | "!=" | "<" | "<=" | ">" | ">=", [lhs, rhs]) => {
                let op = match head {
                    "==" => CmpOp::Eq,
                    "!=" => CmpOp::Ne,
                    "<" => CmpOp::Lt,
                    "<=" => CmpOp::Le,
                    ">" => CmpOp::Gt,
                    _ => CmpOp::Ge,
                };
                let (lhs, rhs) = self.operands(lhs, rhs)?;
                Ok(ast.compare(op, lhs, rhs))
            }
            ("&&" | "||", [lhs, rhs]) => {
                let op = if head == "&&" { LogicalOp::And } else { LogicalOp::Or };
                Ok(ast.logical(op, self.expr(lhs, None)?, self.expr(rhs, None)?))
            }
            ("=", [target, value]) => {
                let target = self.expr(target, None)?;
                let value = self.expr(value, Some(target.ty))?;
                Ok(ast.assign(target, value))
            }
            (".", [base, field]) => {
                let base = self.expr(base, None)?;
                let field = field.atom().ok_or_else(|| parse_error(field.pos(), "expected a field name"))?;
                let def = match base.ty {
                    Type::Struct(def) => def,
                    Type::Pointer(Type::Struct(def)) => *def,
                    other => {
                        return Err(CompileError::Unsupported { feature: format!("field access on {}", other) })
                    }
                };
                let Some((_, ty)) = def.field(field) else {
                    return Err(CompileError::UnknownField { structure: def.name.to_string(), field: field.to_string() });
                };
                Ok(ast.expr(ty, ExprKind::Field { base, name: self.session.intern_str(field) }))
            }
            ("index", [base, index]) => {
                let base = self.expr(base, None)?;
                let index = self.expr(index, None)?;
                let ty = match base.ty {
                    Type::Array(elem, _) | Type::Pointer(elem) => *elem,
                    other => {
                        return Err(CompileError::Unsupported { feature: format!("indexing a value of type {}", other) })
                    }
                };
                Ok(ast.expr(ty, ExprKind::Index { base, index }))
            }
            (name, _) if is_operator(name) => {
                Err(parse_error(pos, format!("wrong number of operands for '{}': {}", name, args.len())))
            }
            (name, _) => self.call(name, args, pos),
        }
    }

    /// Build both operands, giving a literal the type of the other side.
    fn operands(&mut self, lhs: &SExpr<'_>, rhs: &SExpr<'_>) -> CompileResult<(&'a Expr<'a>, &'a Expr<'a>)> {
        match (lhs, rhs) {
            (SExpr::Int(..), SExpr::Int(..)) => Ok((self.expr(lhs, None)?, self.expr(rhs, None)?)),
            (SExpr::Int(..), _) => {
                let rhs = self.expr(rhs, None)?;
                Ok((self.expr(lhs, Some(rhs.ty))?, rhs))
            }
            _ => {
                let lhs = self.expr(lhs, None)?;
                Ok((lhs, self.expr(rhs, Some(lhs.ty))?))
            }
        }
    }

    fn call(&mut self, name: &str, args: &[SExpr<'_>], pos: Pos) -> CompileResult<&'a Expr<'a>> {
        let Some(signature) = self.signatures.get(name).copied() else {
            return Err(CompileError::UnknownFunction { name: name.to_string() });
        };
        let count = signature.params.len();
        if args.len() < count || (args.len() > count && !signature.variadic) {
            return Err(parse_error(pos, format!("{} expects {} arguments, got {}", name, count, args.len())));
        }
        let mut built = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            built.push(self.expr(arg, signature.params.get(i).copied())?);
        }
        Ok(self.ast().call(signature.name, &built, signature.ret))
    }
}

fn parse_error(pos: Pos, message: impl Into<String>) -> CompileError {
    CompileError::Parse { line: pos.line, column: pos.column, message: message.into() }
}

fn is_operator(name: &str) -> bool {
    !name.starts_with(|c: char| c.is_alphanumeric() || c == '_')
}

/// Integer literals default to i32, or i64 when they do not fit.
fn literal_type<'a>(value: i64, expected: Option<Type<'a>>) -> Type<'a> {
    match expected {
        Some(ty) if ty.is_integer() => ty,
        Some(Type::Pointer(_)) => Type::I64,
        _ if i32::try_from(value).is_err() => Type::I64,
        _ => Type::I32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    #[test]
    fn test_literals_take_context_type() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let text = "fn f(a: i64) -> i64 { (let b i16 7) (= a (+ 1 a)) (return 2) }";
        let program = parse_program(&session, text).unwrap();
        let body = program.functions[0].body;

        let Stmt::Let { init: Some(init), ty, .. } = body[0] else { panic!("expected a declaration") };
        assert_eq!(ty, Type::I16);
        assert_eq!(init.ty, Type::I16);

        let Stmt::Expr(assign) = body[1] else { panic!("expected an expression") };
        let ExprKind::Assign { value, .. } = assign.kind else { panic!("expected an assignment") };
        let ExprKind::Binary { lhs, .. } = value.kind else { panic!("expected a sum") };
        assert_eq!(lhs.ty, Type::I64);
        assert_eq!(value.ty, Type::I64);

        let Stmt::Return(Some(ret)) = body[2] else { panic!("expected a return") };
        assert_eq!(ret.ty, Type::I64);
    }

    #[test]
    fn test_struct_field_and_pointer_types() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let text = "struct pair { a: i32, b: i64 }
                    fn f(p: pair*) -> i64 { (let q pair) (= (. q a) 1) (return (. p b)) }";
        let program = parse_program(&session, text).unwrap();
        assert_eq!(program.structs[0].size(), 12);
        assert_eq!(program.functions[0].params[0].ty.to_string(), "pair*");

        let Stmt::Return(Some(field)) = program.functions[0].body[2] else { panic!("expected a return") };
        assert_eq!(field.ty, Type::I64);
    }

    #[test]
    fn test_calls_resolve_against_signatures() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let text = r#"extern printf(i8*, ...) -> i32
                      fn main() -> i32 { (printf "%d %d\n" 1 (g)) (return 0) }
                      fn g() -> i32 { (return 4) }"#;
        let program = parse_program(&session, text).unwrap();
        assert_eq!(program.externs.len(), 1);
        assert_eq!(program.functions.len(), 2);
        let Stmt::Expr(call) = program.functions[0].body[0] else { panic!("expected a call") };
        let ExprKind::Call { callee, args } = call.kind else { panic!("expected a call") };
        assert_eq!(callee, "printf");
        assert_eq!(args.len(), 3);
        assert!(matches!(args[0].kind, ExprKind::Str(0)));
        assert_eq!(session.strings(), vec!["%d %d\n".to_string()]);
    }

    #[test]
    fn test_name_resolution_errors() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        assert_eq!(
            parse_program(&session, "fn f() { (h 1) }").unwrap_err(),
            CompileError::UnknownFunction { name: "h".to_string() }
        );
        assert_eq!(
            parse_program(&session, "fn f(p: node*) { }").unwrap_err(),
            CompileError::UnknownStruct { name: "node".to_string() }
        );
        assert_eq!(
            parse_program(&session, "fn f() { (= y 1) }").unwrap_err(),
            CompileError::UnknownVariable { name: "y".to_string() }
        );
        assert!(matches!(
            parse_program(&session, "struct s { a: i32 } fn f() { (let v s) (= (. v z) 1) }").unwrap_err(),
            CompileError::UnknownField { .. }
        ));
    }

    #[test]
    fn test_block_scope_ends() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let err = parse_program(&session, "fn f() { (block (let t i32 1)) (= t 2) }").unwrap_err();
        assert_eq!(err, CompileError::UnknownVariable { name: "t".to_string() });
    }

    #[test]
    fn test_arity_is_checked() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let err = parse_program(&session, "fn g(a: i32) { } fn f() { (g 1 2) }").unwrap_err();
        assert!(matches!(err, CompileError::Parse { line: 1, column: 27, .. }));
    }

    #[test]
    fn test_loops_and_arrays() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let text = "fn f() {
            (let arr [i32 : 4])
            (for (let i i32 0) (< i 4) (= i (+ i 1)) (= (index arr i) (* i 2)))
            (while (&& (> (index arr 0) 0) (!= (index arr 1) 3)) (= (index arr 0) (- (index arr 0))))
        }";
        let program = parse_program(&session, text).unwrap();
        let body = program.functions[0].body;
        let Stmt::Let { ty, .. } = body[0] else { panic!("expected a declaration") };
        assert_eq!(ty.size(), 16);
        assert!(matches!(body[1], Stmt::For { init: Some(_), cond: Some(_), step: Some(_), .. }));
        let Stmt::While { cond, .. } = body[2] else { panic!("expected a loop") };
        assert!(matches!(cond.kind, ExprKind::Logical { op: LogicalOp::And, .. }));
    }
}
