//! Reader for the cube test input format.
//!
//! Produces untyped [`Item`]s; type resolution and name lookup happen in the builder.

use crate::core::error::{CompileError, CompileResult};

/// 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSyntax<'t> {
    Named(&'t str),
    Pointer(Box<TypeSyntax<'t>>),
    Array(Box<TypeSyntax<'t>>, u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SExpr<'t> {
    Int(i64, Pos),
    Str(String, Pos),
    Atom(&'t str, Pos),
    /// Bracketed array type, e.g. `[i32 : 4]`.
    Type(TypeSyntax<'t>, Pos),
    List(Vec<SExpr<'t>>, Pos),
}

impl<'t> SExpr<'t> {
    pub fn pos(&self) -> Pos {
        match self {
            SExpr::Int(_, pos)
            | SExpr::Str(_, pos)
            | SExpr::Atom(_, pos)
            | SExpr::Type(_, pos)
            | SExpr::List(_, pos) => *pos,
        }
    }

    pub fn atom(&self) -> Option<&'t str> {
        match self {
            SExpr::Atom(name, _) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item<'t> {
    Struct {
        name: &'t str,
        fields: Vec<(&'t str, TypeSyntax<'t>)>,
        pos: Pos,
    },
    Extern {
        name: &'t str,
        params: Vec<TypeSyntax<'t>>,
        variadic: bool,
        ret: TypeSyntax<'t>,
        pos: Pos,
    },
    Function {
        name: &'t str,
        params: Vec<(&'t str, TypeSyntax<'t>)>,
        ret: TypeSyntax<'t>,
        body: Vec<SExpr<'t>>,
        pos: Pos,
    },
}

pub fn parse_items(text: &str) -> CompileResult<Vec<Item<'_>>> {
    Parser::new(text).parse()
}

struct Parser<'t> {
    text: &'t str,
    pos: usize,
    line: usize,
    line_start: usize,
}

impl<'t> Parser<'t> {
    fn new(text: &'t str) -> Self {
        Self { text, pos: 0, line: 1, line_start: 0 }
    }

    fn parse(mut self) -> CompileResult<Vec<Item<'t>>> {
        let mut items = Vec::new();
        self.skip_whitespace();
        while !self.is_eof() {
            match self.parse_item() {
                Ok(item) => items.push(item),
                Err(err) => {
                    let context_start = self.pos.saturating_sub(20);
                    let context_end = (self.pos + 20).min(self.text.len());
                    log::debug!("parse error near '{}'", self.text.get(context_start..context_end).unwrap_or(""));
                    return Err(err);
                }
            }
            self.skip_whitespace();
        }
        Ok(items)
    }

    fn position(&self) -> Pos {
        Pos { line: self.line, column: self.text[self.line_start..self.pos].chars().count() + 1 }
    }

    fn error_at(&self, pos: Pos, message: impl Into<String>) -> CompileError {
        CompileError::Parse { line: pos.line, column: pos.column, message: message.into() }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        self.error_at(self.position(), message)
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.line_start = self.pos;
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                // Comment runs to end of line
                while let Some(ch) = self.current_char() {
                    self.advance();
                    if ch == '\n' {
                        break;
                    }
                }
            } else if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace();
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn try_read_str(&mut self, s: &str) -> bool {
        self.skip_whitespace();
        if self.text[self.pos..].starts_with(s) {
            for _ in s.chars() {
                self.advance();
            }
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> CompileResult<()> {
        if !self.try_read(ch) {
            return Err(self.error(format!("expected '{}' but found {:?}", ch, self.current_char())));
        }
        Ok(())
    }

    fn read_identifier(&mut self) -> CompileResult<&'t str> {
        self.skip_whitespace();
        let start = self.pos;

        match self.current_char() {
            Some(ch) if ch.is_alphabetic() || ch == '_' => {}
            Some(ch) => return Err(self.error(format!("expected identifier but found '{}'", ch))),
            None => return Err(self.error("expected identifier but found end of input")),
        }

        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        Ok(&self.text[start..self.pos])
    }

    fn read_number(&mut self) -> CompileResult<u32> {
        self.skip_whitespace();
        let start = self.pos;
        while matches!(self.current_char(), Some(ch) if ch.is_ascii_digit()) {
            self.advance();
        }
        self.text[start..self.pos].parse().map_err(|_| self.error("expected a number"))
    }

    fn parse_item(&mut self) -> CompileResult<Item<'t>> {
        self.skip_whitespace();
        let pos = self.position();
        match self.read_identifier()? {
            "struct" => self.parse_struct(pos),
            "extern" => self.parse_extern(pos),
            "fn" => self.parse_function(pos),
            other => Err(self.error_at(pos, format!("expected 'struct', 'extern' or 'fn', found '{}'", other))),
        }
    }

    /// `struct name { field: type, ... }`
    fn parse_struct(&mut self, pos: Pos) -> CompileResult<Item<'t>> {
        let name = self.read_identifier()?;
        self.expect('{')?;
        let mut fields = Vec::new();
        while !self.try_read('}') {
            let field = self.read_identifier()?;
            self.expect(':')?;
            fields.push((field, self.read_type()?));
            if !self.try_read(',') {
                self.expect('}')?;
                break;
            }
        }
        if fields.is_empty() {
            return Err(self.error_at(pos, format!("struct {} has no fields", name)));
        }
        Ok(Item::Struct { name, fields, pos })
    }

    /// `extern name(type, ..., ...) -> type`
    fn parse_extern(&mut self, pos: Pos) -> CompileResult<Item<'t>> {
        let name = self.read_identifier()?;
        self.expect('(')?;
        let mut params = Vec::new();
        let mut variadic = false;
        while !self.try_read(')') {
            if self.try_read_str("...") {
                variadic = true;
                self.expect(')')?;
                break;
            }
            params.push(self.read_type()?);
            if !self.try_read(',') {
                self.expect(')')?;
                break;
            }
        }
        let ret = self.read_return_type()?;
        Ok(Item::Extern { name, params, variadic, ret, pos })
    }

    /// `fn name(param: type, ...) -> type { statement... }`
    fn parse_function(&mut self, pos: Pos) -> CompileResult<Item<'t>> {
        let name = self.read_identifier()?;
        self.expect('(')?;
        let mut params = Vec::new();
        while !self.try_read(')') {
            let param = self.read_identifier()?;
            self.expect(':')?;
            params.push((param, self.read_type()?));
            if !self.try_read(',') {
                self.expect(')')?;
                break;
            }
        }
        let ret = self.read_return_type()?;
        self.expect('{')?;
        let mut body = Vec::new();
        while !self.try_read('}') {
            if self.is_eof() {
                return Err(self.error(format!("unterminated body of {}", name)));
            }
            body.push(self.read_sexpr()?);
        }
        Ok(Item::Function { name, params, ret, body, pos })
    }

    fn read_return_type(&mut self) -> CompileResult<TypeSyntax<'t>> {
        if self.try_read_str("->") {
            self.read_type()
        } else {
            Ok(TypeSyntax::Named("void"))
        }
    }

    fn read_type(&mut self) -> CompileResult<TypeSyntax<'t>> {
        let mut ty = if self.try_read('[') {
            let elem = self.read_type()?;
            self.expect(':')?;
            let count = self.read_number()?;
            self.expect(']')?;
            TypeSyntax::Array(Box::new(elem), count)
        } else {
            TypeSyntax::Named(self.read_identifier()?)
        };
        while self.try_read('*') {
            ty = TypeSyntax::Pointer(Box::new(ty));
        }
        Ok(ty)
    }

    fn read_sexpr(&mut self) -> CompileResult<SExpr<'t>> {
        self.skip_whitespace();
        let pos = self.position();
        match self.current_char() {
            Some('(') => {
                self.advance();
                let mut items = Vec::new();
                while !self.try_read(')') {
                    if self.is_eof() {
                        return Err(self.error_at(pos, "unterminated list"));
                    }
                    items.push(self.read_sexpr()?);
                }
                Ok(SExpr::List(items, pos))
            }
            Some('[') => Ok(SExpr::Type(self.read_type()?, pos)),
            Some('"') => self.read_string(pos),
            Some(ch) if is_atom_char(ch) => {
                let start = self.pos;
                while matches!(self.current_char(), Some(ch) if is_atom_char(ch)) {
                    self.advance();
                }
                let text = &self.text[start..self.pos];
                let numeric = text.starts_with(|c: char| c.is_ascii_digit())
                    || (text.len() > 1 && text.starts_with('-') && text[1..].starts_with(|c: char| c.is_ascii_digit()));
                if numeric {
                    let value = text.parse().map_err(|_| self.error_at(pos, format!("invalid integer '{}'", text)))?;
                    Ok(SExpr::Int(value, pos))
                } else {
                    Ok(SExpr::Atom(text, pos))
                }
            }
            Some(ch) => Err(self.error(format!("unexpected character '{}'", ch))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn read_string(&mut self, pos: Pos) -> CompileResult<SExpr<'t>> {
        self.advance();
        let mut value = String::new();
        loop {
            let Some(ch) = self.current_char() else {
                return Err(self.error_at(pos, "unterminated string literal"));
            };
            self.advance();
            match ch {
                '"' => break,
                '\\' => {
                    let escaped = match self.current_char() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('0') => '\0',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        other => return Err(self.error(format!("unknown escape {:?}", other))),
                    };
                    self.advance();
                    value.push(escaped);
                }
                _ => value.push(ch),
            }
        }
        Ok(SExpr::Str(value, pos))
    }
}

fn is_atom_char(ch: char) -> bool {
    ch.is_alphanumeric() || "_+-*/=<>!&|.".contains(ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_item_kinds() {
        let text = r#"
            ; a point
            struct point { x: i32, y: i32 }
            extern printf(i8*, ...) -> i32
            fn main() -> i32 {
                (let p point)
                (printf "%d\n" (. p x))
                (return 0)
            }
        "#;
        let items = parse_items(text).unwrap();
        assert_eq!(items.len(), 3);
        match &items[0] {
            Item::Struct { name, fields, .. } => {
                assert_eq!(*name, "point");
                assert_eq!(fields[1], ("y", TypeSyntax::Named("i32")));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &items[1] {
            Item::Extern { params, variadic, ret, .. } => {
                assert_eq!(params, &vec![TypeSyntax::Pointer(Box::new(TypeSyntax::Named("i8")))]);
                assert!(*variadic);
                assert_eq!(*ret, TypeSyntax::Named("i32"));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &items[2] {
            Item::Function { body, pos, .. } => {
                assert_eq!(body.len(), 3);
                assert_eq!(pos.line, 5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_atoms_numbers_and_strings() {
        let items = parse_items("fn f() { (= x (- -3 y)) (g \"a\\tb\" [i32 : 4]) }").unwrap();
        let Item::Function { body, ret, .. } = &items[0] else { panic!("expected a function") };
        assert_eq!(*ret, TypeSyntax::Named("void"));
        let SExpr::List(assign, _) = &body[0] else { panic!("expected a list") };
        assert_eq!(assign[0].atom(), Some("="));
        let SExpr::List(sub, _) = &assign[2] else { panic!("expected a list") };
        assert!(matches!(sub[1], SExpr::Int(-3, _)));
        let SExpr::List(call, _) = &body[1] else { panic!("expected a list") };
        assert!(matches!(&call[1], SExpr::Str(s, _) if s == "a\tb"));
        assert!(matches!(&call[2], SExpr::Type(TypeSyntax::Array(_, 4), _)));
    }

    #[test]
    fn test_error_position() {
        let err = parse_items("fn f() {\n  (return 1\n").unwrap_err();
        assert_eq!(err, CompileError::Parse { line: 2, column: 3, message: "unterminated list".to_string() });

        let err = parse_items("struct s { a i32 }").unwrap_err();
        assert!(matches!(err, CompileError::Parse { line: 1, column: 14, .. }));
    }

    #[test]
    fn test_unknown_item_keyword() {
        let err = parse_items("global x").unwrap_err();
        assert!(matches!(err, CompileError::Parse { line: 1, column: 1, .. }));
    }
}
