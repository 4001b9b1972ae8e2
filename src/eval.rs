//! The expression evaluator.
//!
//! This is the engine's entry point: it tokenizes a declarative value
//! expression, resolves bare words against the enclosing scope, and
//! reduces the token stream with an explicit operand/operator stack.
//!
//! On each incoming operator the stack "winds down": while the pending
//! top-of-stack operator's precedence is numerically `<=` the incoming
//! one (lower binds tighter), the last one or two operands are popped and
//! composed into a new definition. End of input winds down against a
//! synthetic operator of maximal precedence, which must leave exactly one
//! operand; anything else is a structural parse failure.
//!
//! A parenthesized group directly after a reference is a function
//! application and goes through [`apply_call`]; a bare group is a nested
//! sub-expression evaluated recursively and substituted inline.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::definition::{DefRef, Definition};
use crate::ops::{self, Operator, MAX_PRECEDENCE};
use crate::scope::{Binding, Scope};
use crate::token::{tokenize, Token};
use crate::value::{EvalError, EvalResult, Value};

/// A warning collected during evaluation; never fatal.
#[derive(Debug, Clone)]
pub struct EvalWarning {
    /// The warning message
    pub message: String,
}

impl EvalWarning {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An evaluated expression plus anything the evaluator wants to say
/// about it.
#[derive(Debug)]
pub struct Evaluation {
    /// The composed reactive definition
    pub definition: DefRef,
    /// Non-fatal diagnostics (e.g. permissive token fallbacks)
    pub warnings: Vec<EvalWarning>,
}

/// Evaluate an expression against a scope, producing a reactive
/// definition.
pub fn evaluate(scope: &dyn Scope, source: &str) -> EvalResult<DefRef> {
    evaluate_with_warnings(scope, source).map(|evaluation| evaluation.definition)
}

/// Like [`evaluate`], but also surfaces collected warnings.
pub fn evaluate_with_warnings(scope: &dyn Scope, source: &str) -> EvalResult<Evaluation> {
    let mut evaluator = Evaluator {
        scope,
        warnings: Vec::new(),
    };
    let definition = evaluator
        .eval_source(source)
        .map_err(|err| err.with_source(source))?;
    Ok(Evaluation {
        definition,
        warnings: evaluator.warnings,
    })
}

/// Evaluate an already-tokenized expression.
pub fn evaluate_tokens(scope: &dyn Scope, tokens: &[Token]) -> EvalResult<DefRef> {
    let mut evaluator = Evaluator {
        scope,
        warnings: Vec::new(),
    };
    evaluator.eval_tokens(tokens)
}

struct Evaluator<'s> {
    scope: &'s dyn Scope,
    warnings: Vec<EvalWarning>,
}

fn keyword_value(word: &str) -> Option<Value> {
    match word {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        "null" => Some(Value::Null),
        _ => None,
    }
}

impl<'s> Evaluator<'s> {
    fn eval_source(&mut self, source: &str) -> EvalResult<DefRef> {
        let tokens = tokenize(source)?;
        self.eval_tokens(&tokens)
    }

    fn eval_tokens(&mut self, tokens: &[Token]) -> EvalResult<DefRef> {
        if tokens.is_empty() {
            return Err(EvalError::reduction("empty expression"));
        }

        let mut operands: Vec<DefRef> = Vec::new();
        let mut pending_ops: Vec<Operator> = Vec::new();
        let mut inputs: IndexMap<String, DefRef> = IndexMap::new();
        // tracks whether the previous token produced a reference operand,
        // which is what makes a following group a function application
        let mut prev_was_reference = false;

        for token in tokens {
            match token {
                Token::Number(n) => {
                    operands.push(Definition::constant(Value::Number(*n)));
                    prev_was_reference = false;
                }
                Token::Str(s) => {
                    operands.push(Definition::constant(Value::Str(s.clone())));
                    prev_was_reference = false;
                }
                Token::Reference(word) => {
                    if let Some(literal) = keyword_value(word) {
                        operands.push(Definition::constant(literal));
                        prev_was_reference = false;
                    } else if let Some(op) = ops::lookup(word) {
                        // word operators: `and` / `or`
                        wind_down(&mut operands, &mut pending_ops, op.precedence())?;
                        pending_ops.push(op);
                        prev_was_reference = false;
                    } else {
                        let def = self.resolve_reference(word, &mut inputs)?;
                        operands.push(def);
                        prev_was_reference = true;
                    }
                }
                Token::Op(symbol) => match ops::lookup(symbol) {
                    Some(op) => {
                        wind_down(&mut operands, &mut pending_ops, op.precedence())?;
                        pending_ops.push(op);
                        prev_was_reference = false;
                    }
                    None => {
                        // permissive: an unrecognized symbol falls through
                        // to reference resolution
                        self.warnings.push(EvalWarning::new(format!(
                            "unrecognized token \"{}\" treated as a reference",
                            symbol
                        )));
                        let def = self.resolve_reference(symbol, &mut inputs)?;
                        operands.push(def);
                        prev_was_reference = true;
                    }
                },
                Token::Group(items) => {
                    if prev_was_reference {
                        let callee = operands.pop().expect("reference operand on stack");
                        let call = self.apply_call(callee, items, &mut inputs)?;
                        operands.push(call);
                    } else {
                        match items.len() {
                            1 => {
                                let sub = self.eval_tokens(&items[0])?;
                                for (name, def) in sub.inputs() {
                                    inputs.insert(name, def);
                                }
                                operands.push(sub);
                            }
                            0 => return Err(EvalError::reduction("empty group")),
                            _ => return Err(EvalError::reduction("\",\" outside a call")),
                        }
                    }
                    prev_was_reference = false;
                }
            }
        }

        wind_down(&mut operands, &mut pending_ops, MAX_PRECEDENCE)?;
        if operands.len() != 1 || !pending_ops.is_empty() {
            return Err(EvalError::reduction(format!(
                "{} operands and {} operators left on the stack",
                operands.len(),
                pending_ops.len()
            )));
        }

        let result = operands.pop().expect("one operand");
        for (name, def) in inputs {
            // a bare reference reduces to the referenced definition
            // itself; it must not list itself as its own input
            if !Rc::ptr_eq(&result, &def) {
                result.record_input(name, def);
            }
        }
        Ok(result)
    }

    /// Resolve a (possibly slash/dot-delimited) reference path against
    /// the scope.
    fn resolve_reference(
        &mut self,
        path: &str,
        inputs: &mut IndexMap<String, DefRef>,
    ) -> EvalResult<DefRef> {
        let mut segments = path.split(['/', '.']);
        let first = segments.next().unwrap_or(path);
        let rest: Vec<String> = segments.map(String::from).collect();

        let binding = self
            .scope
            .get_definition(first)
            .ok_or_else(|| EvalError::unresolved_reference(first))?;
        let target = match binding {
            Binding::Definition(def) => def,
            // a reference may point at another unparsed expression
            Binding::Source(source) => self.eval_source(&source)?,
        };
        inputs.insert(path.to_string(), Rc::clone(&target));

        if rest.is_empty() {
            Ok(target)
        } else {
            Ok(Definition::property(target, rest))
        }
    }

    /// Resolve a function application.
    ///
    /// A self-resolving callee receives the raw, unevaluated argument
    /// token groups; otherwise each group is evaluated and the callee is
    /// composed as a reactive operator over the resolved arguments.
    fn apply_call(
        &mut self,
        callee: DefRef,
        arg_groups: &[Vec<Token>],
        inputs: &mut IndexMap<String, DefRef>,
    ) -> EvalResult<DefRef> {
        if let Some(resolved) = callee.resolve_raw(arg_groups) {
            return resolved;
        }
        let args: Vec<DefRef> = arg_groups
            .iter()
            .map(|group| {
                let arg = self.eval_tokens(group)?;
                for (name, def) in arg.inputs() {
                    inputs.insert(name, def);
                }
                Ok(arg)
            })
            .collect::<EvalResult<_>>()?;
        Ok(Definition::call(callee, args))
    }
}

/// Reduce the stack while the pending operator binds at least as tightly
/// as the incoming precedence. Equal precedence reduces, which makes the
/// engine left-associative.
fn wind_down(
    operands: &mut Vec<DefRef>,
    pending_ops: &mut Vec<Operator>,
    incoming: u8,
) -> EvalResult<()> {
    while let Some(top) = pending_ops.last().copied() {
        if top.precedence() > incoming {
            break;
        }
        if operands.len() < top.arity() {
            // a prefix operator still waiting for its operand
            break;
        }
        pending_ops.pop();
        let right = operands.pop().expect("operand");
        let composed = if top.arity() == 2 {
            let left = operands.pop().expect("operand");
            Definition::computed(top, vec![left, right])
        } else {
            Definition::computed(top, vec![right])
        };
        operands.push(composed);
    }
    Ok(())
}
