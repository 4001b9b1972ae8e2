//! Value types for the Rebind engine.
//!
//! This module defines the dynamic value model that expressions compute
//! over, plus the error and result types shared by every other module.
//! The value model is deliberately loose (numbers, strings, booleans,
//! arrays, navigable records) because expressions originate in
//! declarative property values, not a statically typed language.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

// ============================================================================
// Values
// ============================================================================

/// A dynamic value produced by expression evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent value; missing nested properties resolve to this, not an error
    Undefined,
    /// Explicit `null` literal
    Null,
    /// `true` / `false`
    Bool(bool),
    /// All numbers are floats, as in the host expression language
    Number(f64),
    /// String literal or concatenation result
    Str(String),
    /// Array value (scopes may bind these; `+` does not concatenate them)
    Array(Vec<Value>),
    /// Navigable record; reference paths step through its fields
    Object(IndexMap<String, Value>),
    /// The `:` operator's branch pair, consumed by `?`
    Pair(Box<Value>, Box<Value>),
}

impl Value {
    /// Human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Pair(_, _) => "pair",
        }
    }

    /// Truthiness, matching the host language's conversion rules
    /// (empty string, `"false"`, zero, `null` and `undefined` are falsy).
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty() && s != "false",
            Value::Array(_) | Value::Object(_) | Value::Pair(_, _) => true,
        }
    }

    /// Coerce to a number for arithmetic, or fail with a type mismatch.
    pub fn as_number(&self) -> Result<f64, EvalError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s
                .parse::<f64>()
                .map_err(|_| EvalError::type_mismatch("number", "string")),
            other => Err(EvalError::type_mismatch("number", other.type_name())),
        }
    }

    /// Loose equality, used by the `==` operator and ternary reversal.
    ///
    /// Same-type values compare structurally; numbers compare with
    /// booleans as 0/1 and with numeric strings by parsed value.
    pub fn loose_eq(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Undefined, Undefined) | (Null, Null) | (Undefined, Null) | (Null, Undefined) => true,
            (Number(a), Number(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Number(n), Bool(b)) | (Bool(b), Number(n)) => *n == if *b { 1.0 } else { 0.0 },
            (Number(n), Str(s)) | (Str(s), Number(n)) => {
                s.parse::<f64>().map(|p| p == *n).unwrap_or(false)
            }
            (Array(a), Array(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            (Pair(a1, a2), Pair(b1, b2)) => a1.loose_eq(b1) && a2.loose_eq(b2),
            _ => false,
        }
    }

    /// Step into a property of this value by segment name.
    ///
    /// Objects navigate by field, arrays by numeric index; anything else
    /// (including a missing field) yields `Undefined`.
    pub fn property(&self, segment: &str) -> Value {
        match self {
            Value::Object(fields) => fields.get(segment).cloned().unwrap_or(Value::Undefined),
            Value::Array(items) => match segment.parse::<usize>() {
                Ok(index) => items.get(index).cloned().unwrap_or(Value::Undefined),
                Err(_) => {
                    if segment == "length" {
                        Value::Number(items.len() as f64)
                    } else {
                        Value::Undefined
                    }
                }
            },
            _ => Value::Undefined,
        }
    }

    /// Display form used for string concatenation.
    pub fn display(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Str(s) => write!(f, "{}", s),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
            Value::Object(_) => write!(f, "[object]"),
            Value::Pair(a, b) => write!(f, "{}:{}", a, b),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

// ============================================================================
// Reverse-write outcomes
// ============================================================================

/// Outcome of a reverse (two-way binding) write.
///
/// `Deny` is a controlled refusal, not an error: an operator's reverse
/// function may decline to satisfy the requested output (e.g. a ternary
/// asked for a value matching neither branch). Callers decide whether to
/// ignore the write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reversal {
    /// The corrected value was routed into a writable input
    Accepted,
    /// The operator refused to satisfy the requested output
    Deny,
}

// ============================================================================
// Errors
// ============================================================================

/// Result alias used throughout the engine.
pub type EvalResult<T> = Result<T, EvalError>;

/// The category of an evaluation error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EvalErrorKind {
    /// A named identifier could not be found in the active scope
    UnresolvedReference(String),
    /// The operator-precedence stack failed to collapse to one value
    ReductionError(String),
    /// Reverse propagation found no writable operand
    UnwritableTarget,
    /// Type mismatch
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },
    /// Invalid operation
    InvalidOperation(String),
    /// Division by zero (forward or reverse)
    DivisionByZero,
}

impl fmt::Display for EvalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalErrorKind::UnresolvedReference(name) => {
                write!(f, "could not find reference \"{}\"", name)
            }
            EvalErrorKind::ReductionError(msg) => {
                write!(f, "could not reduce expression: {}", msg)
            }
            EvalErrorKind::UnwritableTarget => {
                write!(f, "cannot write: no operand exposes a writable target")
            }
            EvalErrorKind::TypeMismatch { expected, got } => {
                write!(f, "type mismatch: expected {}, got {}", expected, got)
            }
            EvalErrorKind::InvalidOperation(msg) => write!(f, "invalid operation: {}", msg),
            EvalErrorKind::DivisionByZero => write!(f, "division by zero"),
        }
    }
}

/// An error raised during evaluation or reverse propagation.
///
/// Genuine errors abort the current evaluation or reverse call; there are
/// no partial results and no retries. The expected "operator declines to
/// invert" outcome is [`Reversal::Deny`], not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalError {
    /// What went wrong
    pub kind: EvalErrorKind,
    /// The expression text being evaluated, when known
    pub source: Option<String>,
}

impl EvalError {
    /// Create a new error from a kind.
    pub fn new(kind: EvalErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Attach the offending expression text to this error.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn unresolved_reference(name: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::UnresolvedReference(name.into()))
    }

    pub fn reduction(msg: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::ReductionError(msg.into()))
    }

    pub fn unwritable() -> Self {
        Self::new(EvalErrorKind::UnwritableTarget)
    }

    pub fn type_mismatch(expected: &'static str, got: &'static str) -> Self {
        Self::new(EvalErrorKind::TypeMismatch { expected, got })
    }

    pub fn invalid_op(msg: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::InvalidOperation(msg.into()))
    }

    pub fn division_by_zero() -> Self {
        Self::new(EvalErrorKind::DivisionByZero)
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{} (in expression \"{}\")", self.kind, source),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for EvalError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_host_rules() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::Str("false".into()).is_truthy());
        assert!(Value::Number(2.0).is_truthy());
        assert!(Value::Str("yes".into()).is_truthy());
        assert!(Value::Array(vec![]).is_truthy());
    }

    #[test]
    fn loose_equality_coerces_numbers() {
        assert!(Value::Number(1.0).loose_eq(&Value::Bool(true)));
        assert!(Value::Number(3.0).loose_eq(&Value::Str("3".into())));
        assert!(!Value::Number(3.0).loose_eq(&Value::Str("x".into())));
        assert!(Value::Undefined.loose_eq(&Value::Null));
    }

    #[test]
    fn property_navigation_short_circuits() {
        let mut fields = IndexMap::new();
        fields.insert("bar".to_string(), Value::Number(4.0));
        let obj = Value::Object(fields);
        assert_eq!(obj.property("bar"), Value::Number(4.0));
        assert_eq!(obj.property("missing"), Value::Undefined);
        assert_eq!(obj.property("missing").property("deeper"), Value::Undefined);
    }

    #[test]
    fn array_indexing_and_length() {
        let arr = Value::Array(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(arr.property("1"), Value::Number(2.0));
        assert_eq!(arr.property("5"), Value::Undefined);
        assert_eq!(arr.property("length"), Value::Number(2.0));
    }

    #[test]
    fn error_display_includes_source() {
        let err = EvalError::unresolved_reference("missing").with_source("missing+1");
        let text = err.to_string();
        assert!(text.contains("missing"));
        assert!(text.contains("missing+1"));
    }
}
