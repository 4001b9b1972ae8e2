//! Rebind: a reactive expression engine with bidirectional evaluation.
//!
//! Given a declarative property value such as `"a + b * 2"`, Rebind
//! evaluates it against a scope of named definitions, tracks which
//! references the result depends on, and, when the expression is built
//! from invertible operators, supports *reversing* the computation:
//! assigning a new value to the output pushes an algebraically corrected
//! value back onto one of the inputs (two-way binding).
//!
//! # Architecture
//!
//! ```text
//! Expression text
//!        │
//!        ▼
//!    ┌───────────┐
//!    │ tokenizer │  (token)
//!    └───────────┘
//!        │
//!        ▼
//!    ┌───────────┐   references   ┌───────┐
//!    │ evaluator │ ─────────────▶ │ scope │
//!    │  (eval)   │                └───────┘
//!    └───────────┘
//!        │  operator lookup (ops)
//!        ▼
//!    ┌────────────────────┐
//!    │ Definition graph   │  (definition, pending)
//!    │ value_of() / put() │
//!    └────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use rebind::{evaluate, RuleScope, Reversal, Value};
//!
//! let scope = RuleScope::new();
//! scope.define_value("a", Value::Number(2.0));
//! let b = scope.define_cell("b", Value::Number(0.0));
//!
//! let def = evaluate(&scope, "a + b").unwrap();
//! assert_eq!(def.put(Value::Number(10.0)), Ok(Reversal::Accepted));
//! assert_eq!(b.value(), Ok(Value::Number(8.0)));
//! ```

mod definition;
mod eval;
mod ops;
mod pending;
mod scope;
mod token;
mod value;

pub use definition::{ContextDimension, DefRef, Definition, ElementId, RuleId};
pub use eval::{evaluate, evaluate_tokens, evaluate_with_warnings, EvalWarning, Evaluation};
pub use ops::{lookup as lookup_operator, Operator, ReverseOutcome, Side};
pub use pending::{when_all, EvalValue, PendingValue};
pub use scope::{Binding, RuleScope, Scope};
pub use token::{tokenize, Token};
pub use value::{EvalError, EvalErrorKind, EvalResult, Reversal, Value};
