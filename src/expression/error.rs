//! Error types for expression evaluation and analysis.

use thiserror::Error;

/// Errors raised while evaluating, folding or analysing expressions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    /// Malformed or unsupported operand at runtime
    #[error("Expression evaluation error in {context}: {message}")]
    Evaluation { context: String, message: String },

    /// A function was asked to build more output than the configured limit allows
    #[error("{function}: requested size {requested} exceeds the limit of {limit}")]
    RangeExceeded {
        function: String,
        requested: u64,
        limit: usize,
    },

    /// Binding variables cannot be renamed without ambiguity
    #[error("Binding variable conflict: {0}")]
    BindingConflict(String),

    /// Duplicate or empty variable names within one set of bindings
    #[error("Invalid bindings: {0}")]
    InvalidBindings(String),

    /// User-requested cancellation; never converted by enclosing layers
    #[error("Abort: {0}")]
    Abort(String),

    #[error("No value for parameter {0}")]
    ParameterNotFound(String),

    #[error("Function {function} expects {min} to {max} arguments, got {actual}")]
    FunctionArgumentCount {
        function: String,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// The execution context does not provide a required service
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl ExpressionError {
    pub fn evaluation(context: impl Into<String>, message: impl Into<String>) -> Self {
        ExpressionError::Evaluation {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Aborts must be re-raised verbatim by any recovery logic.
    pub fn is_abort(&self) -> bool {
        matches!(self, ExpressionError::Abort(_))
    }
}

/// Result type for expression operations
pub type ExpressionResult<T> = Result<T, ExpressionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExpressionError::evaluation("LIKE", "invalid pattern");
        assert_eq!(
            err.to_string(),
            "Expression evaluation error in LIKE: invalid pattern"
        );

        let err = ExpressionError::RangeExceeded {
            function: "ARRAY_RANGE".to_string(),
            requested: 20,
            limit: 10,
        };
        assert_eq!(
            err.to_string(),
            "ARRAY_RANGE: requested size 20 exceeds the limit of 10"
        );

        let err = ExpressionError::FunctionArgumentCount {
            function: "ARRAY_SWAP".to_string(),
            min: 3,
            max: 3,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "Function ARRAY_SWAP expects 3 to 3 arguments, got 2"
        );

        let err = ExpressionError::Abort("stop".to_string());
        assert_eq!(err.to_string(), "Abort: stop");
        assert!(err.is_abort());
        assert!(!ExpressionError::UnknownFunction("f".to_string()).is_abort());
    }
}
