//! The operator registry.
//!
//! Operators are a closed set: a static `phf` table maps each surface
//! symbol (including the word aliases `and`/`or`) to an [`Operator`]
//! variant, and forward/reverse behavior is match-based dispatch on that
//! enum. The original engine compiled small expression templates into
//! functions at runtime and cached them process-wide; a static table has
//! the same lookup contract without runtime code generation.
//!
//! Precedence is a small integer where *lower binds tighter*: unary `!`
//! binds tightest, the ternary pair `?`/`:` loosest. The evaluator winds
//! its stack down while the pending operator's precedence is numerically
//! `<=` the incoming one, which makes equal precedence left-associative.

use phf::phf_map;

use crate::value::{EvalError, EvalResult, Value};

/// Synthetic precedence used for the final wind-down at end of input.
pub const MAX_PRECEDENCE: u8 = u8::MAX;

/// A built-in operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    And,
    Or,
    Not,
    /// `:` assembles the two ternary outcomes into a pair
    Branch,
    /// `?` selects a branch of a pair by condition
    Select,
}

/// Which operand side a reverse computation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Result of an operator's reverse function: either the corrected value
/// for the targeted operand, or a refusal to satisfy the output.
#[derive(Debug, Clone, PartialEq)]
pub enum ReverseOutcome {
    Put(Value),
    Deny,
}

static OPERATORS: phf::Map<&'static str, Operator> = phf_map! {
    "+" => Operator::Add,
    "-" => Operator::Sub,
    "*" => Operator::Mul,
    "/" => Operator::Div,
    "%" => Operator::Mod,
    ">" => Operator::Gt,
    ">=" => Operator::Ge,
    "<" => Operator::Lt,
    "<=" => Operator::Le,
    "==" => Operator::Eq,
    "&" => Operator::And,
    "|" => Operator::Or,
    "and" => Operator::And,
    "or" => Operator::Or,
    "!" => Operator::Not,
    "?" => Operator::Select,
    ":" => Operator::Branch,
};

/// Look up an operator by its surface symbol.
///
/// Unknown symbols return `None`; the evaluator then falls through to
/// reference resolution (deliberately permissive).
pub fn lookup(symbol: &str) -> Option<Operator> {
    OPERATORS.get(symbol).copied()
}

impl Operator {
    /// Canonical surface symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Eq => "==",
            Operator::And => "&",
            Operator::Or => "|",
            Operator::Not => "!",
            Operator::Branch => ":",
            Operator::Select => "?",
        }
    }

    /// Precedence level; lower binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            Operator::Not => 1,
            Operator::Mul | Operator::Div | Operator::Mod => 2,
            Operator::Add | Operator::Sub => 3,
            Operator::Gt | Operator::Ge | Operator::Lt | Operator::Le | Operator::Eq => 4,
            Operator::And | Operator::Or => 5,
            Operator::Branch => 6,
            Operator::Select => 7,
        }
    }

    /// Whether the operator sits between two operands.
    pub fn is_infix(&self) -> bool {
        !matches!(self, Operator::Not)
    }

    /// Number of operands consumed during reduction.
    pub fn arity(&self) -> usize {
        if self.is_infix() {
            2
        } else {
            1
        }
    }

    /// Forward evaluation over fully resolved operand values.
    pub fn forward(&self, operands: &[Value]) -> EvalResult<Value> {
        use Operator::*;
        match self {
            Not => Ok(Value::Bool(!operands[0].is_truthy())),
            Add => add(&operands[0], &operands[1]),
            Sub => numeric(operands, |a, b| Ok(a - b)),
            Mul => numeric(operands, |a, b| Ok(a * b)),
            Div => numeric(operands, |a, b| {
                if b == 0.0 {
                    Err(EvalError::division_by_zero())
                } else {
                    Ok(a / b)
                }
            }),
            Mod => numeric(operands, |a, b| {
                if b == 0.0 {
                    Err(EvalError::division_by_zero())
                } else {
                    Ok(a % b)
                }
            }),
            Gt => compare(operands, |a, b| a > b),
            Ge => compare(operands, |a, b| a >= b),
            Lt => compare(operands, |a, b| a < b),
            Le => compare(operands, |a, b| a <= b),
            Eq => Ok(Value::Bool(operands[0].loose_eq(&operands[1]))),
            // `&`/`|` keep the host language's value-selecting semantics;
            // both operands are already resolved by the fan-in join
            And => Ok(if operands[0].is_truthy() {
                operands[1].clone()
            } else {
                operands[0].clone()
            }),
            Or => Ok(if operands[0].is_truthy() {
                operands[0].clone()
            } else {
                operands[1].clone()
            }),
            Branch => Ok(Value::Pair(
                Box::new(operands[0].clone()),
                Box::new(operands[1].clone()),
            )),
            Select => {
                let outcome = &operands[1];
                Ok(match outcome {
                    Value::Pair(first, second) => {
                        if operands[0].is_truthy() {
                            (**first).clone()
                        } else {
                            (**second).clone()
                        }
                    }
                    // `cond ? x` without a `:`; absent alternative is undefined
                    other => {
                        if operands[0].is_truthy() {
                            other.clone()
                        } else {
                            Value::Undefined
                        }
                    }
                })
            }
        }
    }

    /// Whether this operator can be inverted through the given side.
    pub fn is_invertible(&self, side: Side) -> bool {
        use Operator::*;
        match self {
            Add | Sub | Mul | Div => true,
            Not => true,
            // the ternary inverts toward its condition only
            Select => side == Side::Left,
            _ => false,
        }
    }

    /// Reverse evaluation: given the requested output and the *other*
    /// (fixed) operand's value, compute the corrected value for the
    /// operand on `side`.
    ///
    /// For `a + b = out`: reverse of the left side is `out - b`, reverse
    /// of the right side is `out - a`, and so on for `- * /`. `!` is its
    /// own inverse. The ternary checks the requested output against the
    /// two branch outcomes and yields a boolean condition, or
    /// [`ReverseOutcome::Deny`] when the output matches neither.
    pub fn reverse(&self, side: Side, output: &Value, other: &Value) -> EvalResult<ReverseOutcome> {
        use Operator::*;
        if !self.is_invertible(side) {
            return Err(EvalError::unwritable());
        }
        let put = |n: f64| Ok(ReverseOutcome::Put(Value::Number(n)));
        match self {
            Not => Ok(ReverseOutcome::Put(Value::Bool(!output.is_truthy()))),
            Add => put(output.as_number()? - other.as_number()?),
            Sub => match side {
                // a - b = out: a = out + b
                Side::Left => put(output.as_number()? + other.as_number()?),
                // a - b = out: b = a - out
                Side::Right => put(other.as_number()? - output.as_number()?),
            },
            Mul => {
                let divisor = other.as_number()?;
                if divisor == 0.0 {
                    return Err(EvalError::division_by_zero());
                }
                put(output.as_number()? / divisor)
            }
            Div => match side {
                // a / b = out: a = out * b
                Side::Left => put(output.as_number()? * other.as_number()?),
                // a / b = out: b = a / out
                Side::Right => {
                    let out = output.as_number()?;
                    if out == 0.0 {
                        return Err(EvalError::division_by_zero());
                    }
                    put(other.as_number()? / out)
                }
            },
            Select => match other {
                Value::Pair(first, second) => {
                    if output.loose_eq(first) {
                        Ok(ReverseOutcome::Put(Value::Bool(true)))
                    } else if output.loose_eq(second) {
                        Ok(ReverseOutcome::Put(Value::Bool(false)))
                    } else {
                        Ok(ReverseOutcome::Deny)
                    }
                }
                single => {
                    if output.loose_eq(single) {
                        Ok(ReverseOutcome::Put(Value::Bool(true)))
                    } else {
                        Ok(ReverseOutcome::Deny)
                    }
                }
            },
            _ => Err(EvalError::unwritable()),
        }
    }
}

/// `+` is the one polymorphic operator: numeric addition, or string
/// concatenation when either side is a string.
fn add(lhs: &Value, rhs: &Value) -> EvalResult<Value> {
    match (lhs, rhs) {
        (Value::Str(a), b) => Ok(Value::Str(format!("{}{}", a, b))),
        (a, Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
        (a, b) => Ok(Value::Number(a.as_number()? + b.as_number()?)),
    }
}

fn numeric(operands: &[Value], f: impl Fn(f64, f64) -> EvalResult<f64>) -> EvalResult<Value> {
    Ok(Value::Number(f(
        operands[0].as_number()?,
        operands[1].as_number()?,
    )?))
}

fn compare(operands: &[Value], f: impl Fn(f64, f64) -> bool) -> EvalResult<Value> {
    Ok(Value::Bool(f(
        operands[0].as_number()?,
        operands[1].as_number()?,
    )))
}
