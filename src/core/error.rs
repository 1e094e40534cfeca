// This module defines the error taxonomy of the backend using the thiserror crate. CompileError
// separates three classes of failure. Coverage gaps mean the rule set has no cover for some node
// shape and are fatal for the function being compiled. Register exhaustion is the user-facing
// "expression too complex" diagnostic raised by linear scan; a driver may skip the function and
// continue with the rest of the program. Malformed operands and other internal errors flag an
// inconsistency between the automaton and a rule's construct step. The remaining variants cover
// name resolution, unsupported operand widths and syntax errors in the test input format.
// CompileResult<T> is the usual alias for Result<T, CompileError>.

//! Error types for the backend.

use thiserror::Error;

/// Main error type for compilation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("No rule covers {kind} node (symbol '{symbol}')")]
    CoverageGap { kind: &'static str, symbol: char },

    #[error("Expression too complex; simplify (all {available} registers live at instruction {position})")]
    RegisterExhaustion { available: usize, position: usize },

    #[error("Internal compiler error in rule {rule}: {reason}")]
    MalformedOperand { rule: &'static str, reason: String },

    #[error("Internal compiler error: {reason}")]
    Internal { reason: String },

    #[error("Unsupported {width}-byte {operation}")]
    UnsupportedWidth { operation: &'static str, width: u32 },

    #[error("Unsupported: {feature}")]
    Unsupported { feature: String },

    #[error("Unknown variable: {name}")]
    UnknownVariable { name: String },

    #[error("Unknown function: {name}")]
    UnknownFunction { name: String },

    #[error("Unknown struct: {name}")]
    UnknownStruct { name: String },

    #[error("Struct {structure} has no field {field}")]
    UnknownField { structure: String, field: String },

    #[error("Parse error at {line}:{column}: {message}")]
    Parse { line: usize, column: usize, message: String },
}

impl CompileError {
    /// Errors caused by the input program rather than by the backend itself.
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            CompileError::CoverageGap { .. }
                | CompileError::MalformedOperand { .. }
                | CompileError::Internal { .. }
        )
    }

    /// Whether a driver may skip the failing function and keep compiling the batch.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CompileError::RegisterExhaustion { .. }
                | CompileError::UnsupportedWidth { .. }
                | CompileError::Unsupported { .. }
        )
    }

    pub(crate) fn internal(reason: impl Into<String>) -> Self {
        CompileError::Internal { reason: reason.into() }
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhaustion_is_user_facing_and_recoverable() {
        let err = CompileError::RegisterExhaustion { available: 6, position: 12 };
        assert!(err.is_user_facing());
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("too complex; simplify"));
    }

    #[test]
    fn test_coverage_gap_is_internal() {
        let err = CompileError::CoverageGap { kind: "logical", symbol: '&' };
        assert!(!err.is_user_facing());
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "No rule covers logical node (symbol '&')");
    }

    #[test]
    fn test_malformed_operand_message() {
        let err = CompileError::MalformedOperand {
            rule: "PlusRegLit",
            reason: "expected literal".to_string(),
        };
        assert!(!err.is_user_facing());
        assert!(err.to_string().starts_with("Internal compiler error in rule PlusRegLit"));
    }
}
