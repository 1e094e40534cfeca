//! Text input format for compiler tests and the `cubec` driver.
//!
//! Programs are a sequence of struct, extern and function items. Function bodies are
//! s-expressions, so tests can spell out exactly the tree shape they want the selector
//! to see.
//!
//! # Format
//!
//! ```text
//! ; Comments start with semicolon
//! struct point { x: i32, y: i64 }
//! extern printf(i8*, ...) -> i32
//!
//! fn sum(p: point*) -> i64 {
//!     (let total i64 (. p y))
//!     (for (let i i32 0) (< i 3) (= i (+ i 1))
//!         (= total (+ total i)))
//!     (if (&& (> total 0) (!= total 7)) (printf "%d\n" total))
//!     (return total)
//! }
//! ```
//!
//! Statements: `(let name type [init])`, `(block stmt...)`, `(if cond then [else])`,
//! `(while cond body)`, `(for init cond step body)` with `_` for an omitted part, and
//! `(return [value])`. Anything else is an expression statement.
//!
//! Expressions: integers, `"strings"`, variables, `(+ a b)` `(- a b)` `(* a b)` `(/ a b)`,
//! comparisons `== != < <= > >=`, `&&` and `||`, `(- a)` negation, `(* p)` dereference,
//! `(& x)` address-of, `(= target value)`, `(. base field)`, `(index base i)` and calls
//! written as `(name args...)`. Types are `i8 i16 i32 i64 void`, struct names, a trailing
//! `*` per pointer level, and `[elem : count]` arrays.

pub mod builder;
pub mod parser;

pub use builder::{parse_program, ProgramBuilder};
pub use parser::{parse_items, Item, Pos, SExpr, TypeSyntax};
