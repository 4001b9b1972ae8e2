//! Reactive definitions: lazily computed, dependency-tracked values.
//!
//! A [`Definition`] wraps one computation in the dependency graph built
//! from an expression. The graph is a DAG of shared, reference-counted
//! nodes: a definition is owned by the expression that produced it and
//! referenced (not owned) by every definition that lists it as an input.
//!
//! Forward reads go through [`Definition::value_of`], which resolves all
//! operand values (any of which may still be pending), fan-in joins them,
//! and runs the operator forward. Reverse writes go through
//! [`Definition::put`], which delegates to the originating operator's
//! reverse function and routes the corrected value into whichever operand
//! exposes a writable target.
//!
//! Contextualization: a definition may vary per rule occurrence or per
//! element occurrence. Projecting with [`Definition::for_rule`] /
//! [`Definition::for_element`] re-binds the whole subgraph to one
//! instance, memoized per instance id, so a single parsed expression is
//! reused across many instances while producing per-instance values.

use std::cell::RefCell;
use std::rc::Rc;

use fxhash::FxHashMap;
use indexmap::IndexMap;

use crate::ops::{Operator, ReverseOutcome, Side};
use crate::pending::{when_all, EvalValue, PendingValue};
use crate::token::Token;
use crate::value::{EvalError, EvalResult, Reversal, Value};

/// Shared handle to a definition node.
pub type DefRef = Rc<Definition>;

/// Opaque handle for one rule occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(pub u64);

/// Opaque handle for one element occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub u64);

/// The two orthogonal contextualization dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextDimension {
    Rule,
    Element,
}

/// A callable bound into the graph by the function-call resolver.
///
/// `reverse` receives the requested output and the (unresolved) argument
/// definitions and performs the callee's own inversion; reverse through a
/// call delegates entirely to it. `self_resolving` is the escape hatch
/// for callees that want the raw, unevaluated argument tokens.
#[derive(Clone)]
pub struct Callable {
    forward: Rc<dyn Fn(&[Value]) -> EvalResult<Value>>,
    reverse: Option<Rc<dyn Fn(&Value, &[DefRef]) -> EvalResult<Reversal>>>,
    self_resolving: Option<Rc<dyn Fn(&[Vec<Token>]) -> EvalResult<DefRef>>>,
}

enum DefKind {
    /// A literal; never writable
    Constant(Value),
    /// A writable leaf slot, possibly still pending
    Cell(RefCell<EvalValue>),
    /// An operator over operand definitions
    Computed { op: Operator, operands: Vec<DefRef> },
    /// Property navigation off a base definition
    Property { base: DefRef, path: Vec<String> },
    /// A resolved function application
    Call { callee: DefRef, args: Vec<DefRef> },
    /// A callable value (only meaningful as a call target)
    Callable(Callable),
    /// A leaf whose value depends on a rule/element instance
    Contextual {
        dimension: ContextDimension,
        project: Rc<dyn Fn(u64) -> DefRef>,
    },
}

/// One node in the reactive dependency graph.
pub struct Definition {
    kind: DefKind,
    inputs: RefCell<IndexMap<String, DefRef>>,
    projections: RefCell<FxHashMap<(ContextDimension, u64), DefRef>>,
}

impl Definition {
    fn with_kind(kind: DefKind) -> DefRef {
        Rc::new(Definition {
            kind,
            inputs: RefCell::new(IndexMap::new()),
            projections: RefCell::new(FxHashMap::default()),
        })
    }

    /// A fixed literal value.
    pub fn constant(value: Value) -> DefRef {
        Self::with_kind(DefKind::Constant(value))
    }

    /// A writable leaf holding `value`.
    pub fn cell(value: Value) -> DefRef {
        Self::with_kind(DefKind::Cell(RefCell::new(EvalValue::Ready(value))))
    }

    /// A writable leaf that has not resolved yet; settle it through the
    /// returned cell.
    pub fn pending_cell() -> (DefRef, PendingValue) {
        let pending = PendingValue::new();
        let def = Self::with_kind(DefKind::Cell(RefCell::new(EvalValue::Pending(
            pending.clone(),
        ))));
        (def, pending)
    }

    /// Compose an operator over operand definitions. Inputs of the
    /// operands are merged into the new node's inputs.
    pub fn computed(op: Operator, operands: Vec<DefRef>) -> DefRef {
        let def = Self::with_kind(DefKind::Computed { op, operands });
        def.merge_child_inputs();
        def
    }

    /// Navigate nested properties off `base`; absent intermediate steps
    /// resolve to `Undefined`, not an error.
    pub fn property(base: DefRef, path: Vec<String>) -> DefRef {
        let def = Self::with_kind(DefKind::Property { base, path });
        def.merge_child_inputs();
        def
    }

    /// A function application of `callee` over already-evaluated
    /// argument definitions.
    pub fn call(callee: DefRef, args: Vec<DefRef>) -> DefRef {
        let def = Self::with_kind(DefKind::Call { callee, args });
        def.merge_child_inputs();
        def
    }

    /// A callable with an optional reverse ("reverse-requested") handler.
    pub fn callable(
        forward: impl Fn(&[Value]) -> EvalResult<Value> + 'static,
        reverse: Option<Rc<dyn Fn(&Value, &[DefRef]) -> EvalResult<Reversal>>>,
    ) -> DefRef {
        Self::with_kind(DefKind::Callable(Callable {
            forward: Rc::new(forward),
            reverse,
            self_resolving: None,
        }))
    }

    /// A self-resolving callable: it receives the raw, unevaluated
    /// argument token groups and builds its own definition.
    pub fn self_resolving(
        resolve: impl Fn(&[Vec<Token>]) -> EvalResult<DefRef> + 'static,
    ) -> DefRef {
        Self::with_kind(DefKind::Callable(Callable {
            forward: Rc::new(|_| {
                Err(EvalError::invalid_op(
                    "self-resolving callable invoked with evaluated arguments",
                ))
            }),
            reverse: None,
            self_resolving: Some(Rc::new(resolve)),
        }))
    }

    /// A leaf that varies per rule/element instance; `project` builds the
    /// definition bound to one instance id.
    pub fn contextual(
        dimension: ContextDimension,
        project: impl Fn(u64) -> DefRef + 'static,
    ) -> DefRef {
        Self::with_kind(DefKind::Contextual {
            dimension,
            project: Rc::new(project),
        })
    }

    // ------------------------------------------------------------------
    // Dependency tracking
    // ------------------------------------------------------------------

    /// The named references this definition depends on.
    pub fn inputs(&self) -> IndexMap<String, DefRef> {
        self.inputs.borrow().clone()
    }

    /// Record a named input (used by the evaluator while scanning).
    pub fn record_input(&self, name: impl Into<String>, def: DefRef) {
        self.inputs.borrow_mut().insert(name.into(), def);
    }

    /// Replace the whole inputs map.
    pub fn set_inputs(&self, inputs: IndexMap<String, DefRef>) {
        *self.inputs.borrow_mut() = inputs;
    }

    fn merge_child_inputs(&self) {
        let children: Vec<DefRef> = match &self.kind {
            DefKind::Computed { operands, .. } => operands.clone(),
            DefKind::Property { base, .. } => vec![Rc::clone(base)],
            DefKind::Call { callee, args } => {
                let mut all = vec![Rc::clone(callee)];
                all.extend(args.iter().cloned());
                all
            }
            _ => Vec::new(),
        };
        let mut inputs = self.inputs.borrow_mut();
        for child in children {
            for (name, def) in child.inputs.borrow().iter() {
                inputs.insert(name.clone(), Rc::clone(def));
            }
        }
    }

    // ------------------------------------------------------------------
    // Forward evaluation
    // ------------------------------------------------------------------

    /// Compute the forward value: a resolved value, or a pending one
    /// that settles once every input has settled (fan-in join).
    pub fn value_of(&self) -> EvalResult<EvalValue> {
        match &self.kind {
            DefKind::Constant(value) => Ok(EvalValue::Ready(value.clone())),
            DefKind::Cell(slot) => Ok(slot.borrow().clone()),
            DefKind::Computed { op, operands } => {
                let op = *op;
                let resolved: Vec<EvalValue> = operands
                    .iter()
                    .map(|operand| operand.value_of())
                    .collect::<EvalResult<_>>()?;
                join_forward(resolved, move |values| op.forward(&values))
            }
            DefKind::Property { base, path } => {
                let path = path.clone();
                let base = base.value_of()?;
                join_forward(vec![base], move |values| {
                    let base = values.into_iter().next().expect("base value");
                    Ok(navigate(base, &path))
                })
            }
            DefKind::Call { callee, args } => {
                let callable = callee.as_callable().ok_or_else(|| {
                    EvalError::type_mismatch("function", "definition")
                })?;
                let forward = Rc::clone(&callable.forward);
                let resolved: Vec<EvalValue> = args
                    .iter()
                    .map(|arg| arg.value_of())
                    .collect::<EvalResult<_>>()?;
                join_forward(resolved, move |values| forward(&values))
            }
            // a bare function reference has no scalar value
            DefKind::Callable(_) => Ok(EvalValue::Ready(Value::Undefined)),
            DefKind::Contextual { .. } => Err(EvalError::invalid_op(
                "context-dependent definition; project with for_rule/for_element first",
            )),
        }
    }

    /// The resolved forward value; fails if the computation is still
    /// waiting on a pending input.
    pub fn value(&self) -> EvalResult<Value> {
        match self.value_of()?.ready() {
            Some(result) => result,
            None => Err(EvalError::invalid_op("value is still pending")),
        }
    }

    // ------------------------------------------------------------------
    // Reverse evaluation
    // ------------------------------------------------------------------

    /// Whether a reverse write can reach a writable target through this
    /// definition.
    pub fn is_writable(&self) -> bool {
        match &self.kind {
            DefKind::Cell(_) => true,
            DefKind::Computed { op, operands } => match op.arity() {
                1 => op.is_invertible(Side::Left) && operands[0].is_writable(),
                _ => {
                    (op.is_invertible(Side::Left) && operands[0].is_writable())
                        || (op.is_invertible(Side::Right) && operands[1].is_writable())
                }
            },
            DefKind::Property { base, .. } => matches!(base.kind, DefKind::Cell(_)),
            DefKind::Call { callee, .. } => callee
                .as_callable()
                .map(|c| c.reverse.is_some())
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Push a new output value back through the computation (two-way
    /// binding). Returns [`Reversal::Deny`] when the operator refuses the
    /// requested output; fails with `UnwritableTarget` when no operand
    /// can receive a write.
    pub fn put(&self, value: Value) -> EvalResult<Reversal> {
        match &self.kind {
            DefKind::Cell(slot) => {
                *slot.borrow_mut() = EvalValue::Ready(value);
                Ok(Reversal::Accepted)
            }
            DefKind::Computed { op, operands } => reverse_computed(*op, operands, value),
            DefKind::Property { base, path } => put_path(base, path, value),
            DefKind::Call { callee, args } => {
                let callable = callee
                    .as_callable()
                    .ok_or_else(|| EvalError::type_mismatch("function", "definition"))?;
                match &callable.reverse {
                    Some(reverse) => reverse(&value, args),
                    None => Err(EvalError::unwritable()),
                }
            }
            _ => Err(EvalError::unwritable()),
        }
    }

    // ------------------------------------------------------------------
    // Contextualization
    // ------------------------------------------------------------------

    /// Whether this subgraph varies along `dimension`.
    pub fn is_contextual(&self, dimension: ContextDimension) -> bool {
        match &self.kind {
            DefKind::Contextual { dimension: own, .. } => *own == dimension,
            DefKind::Computed { operands, .. } => {
                operands.iter().any(|o| o.is_contextual(dimension))
            }
            DefKind::Property { base, .. } => base.is_contextual(dimension),
            DefKind::Call { callee, args } => {
                callee.is_contextual(dimension) || args.iter().any(|a| a.is_contextual(dimension))
            }
            _ => false,
        }
    }

    /// Bind the expression to one rule occurrence.
    pub fn for_rule(self: &Rc<Self>, rule: RuleId) -> DefRef {
        self.project(ContextDimension::Rule, rule.0)
    }

    /// Bind the expression to one element occurrence.
    pub fn for_element(self: &Rc<Self>, element: ElementId) -> DefRef {
        self.project(ContextDimension::Element, element.0)
    }

    fn project(self: &Rc<Self>, dimension: ContextDimension, id: u64) -> DefRef {
        if !self.is_contextual(dimension) {
            return Rc::clone(self);
        }
        if let Some(hit) = self.projections.borrow().get(&(dimension, id)) {
            return Rc::clone(hit);
        }
        let projected = match &self.kind {
            DefKind::Contextual { project, .. } => project(id),
            DefKind::Computed { op, operands } => Definition::computed(
                *op,
                operands.iter().map(|o| o.project(dimension, id)).collect(),
            ),
            DefKind::Property { base, path } => {
                Definition::property(base.project(dimension, id), path.clone())
            }
            DefKind::Call { callee, args } => Definition::call(
                callee.project(dimension, id),
                args.iter().map(|a| a.project(dimension, id)).collect(),
            ),
            // leaves without children are never contextual
            _ => Rc::clone(self),
        };
        projected.set_inputs(self.inputs());
        self.projections
            .borrow_mut()
            .insert((dimension, id), Rc::clone(&projected));
        projected
    }

    // ------------------------------------------------------------------

    pub(crate) fn as_callable(&self) -> Option<&Callable> {
        match &self.kind {
            DefKind::Callable(callable) => Some(callable),
            _ => None,
        }
    }

    /// Whether this definition wants raw argument tokens when called.
    pub fn is_self_resolving(&self) -> bool {
        self.as_callable()
            .map(|c| c.self_resolving.is_some())
            .unwrap_or(false)
    }

    pub(crate) fn resolve_raw(&self, arg_groups: &[Vec<Token>]) -> Option<EvalResult<DefRef>> {
        let callable = self.as_callable()?;
        let resolve = callable.self_resolving.as_ref()?;
        Some(resolve(arg_groups))
    }
}

impl std::fmt::Debug for Definition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            DefKind::Constant(v) => format!("Constant({})", v),
            DefKind::Cell(slot) => format!("Cell({:?})", slot.borrow()),
            DefKind::Computed { op, operands } => {
                format!("Computed({}, {} operands)", op.symbol(), operands.len())
            }
            DefKind::Property { path, .. } => format!("Property(.{})", path.join(".")),
            DefKind::Call { args, .. } => format!("Call({} args)", args.len()),
            DefKind::Callable(_) => "Callable".to_string(),
            DefKind::Contextual { dimension, .. } => format!("Contextual({:?})", dimension),
        };
        write!(f, "Definition[{}]", kind)
    }
}

/// Run `forward` over the operand values once they have all settled; the
/// result is `Ready` when every operand already was.
fn join_forward(
    operands: Vec<EvalValue>,
    forward: impl FnOnce(Vec<Value>) -> EvalResult<Value> + 'static,
) -> EvalResult<EvalValue> {
    let all_ready = operands.iter().all(|ev| matches!(ev, EvalValue::Ready(_)));
    if all_ready {
        let values = operands
            .into_iter()
            .map(|ev| match ev {
                EvalValue::Ready(value) => value,
                EvalValue::Pending(_) => unreachable!(),
            })
            .collect();
        return forward(values).map(EvalValue::Ready);
    }
    let out = PendingValue::new();
    let settle = out.clone();
    when_all(operands, move |result| {
        settle.settle(result.and_then(forward));
    });
    Ok(EvalValue::Pending(out))
}

fn navigate(mut value: Value, path: &[String]) -> Value {
    for segment in path {
        value = value.property(segment);
    }
    value
}

/// Route a reverse write through an operator: pick the writable operand
/// side, resolve the other (fixed) operand, ask the operator for the
/// corrected value, and push it down. A pending fixed operand defers the
/// write until it settles.
fn reverse_computed(op: Operator, operands: &[DefRef], value: Value) -> EvalResult<Reversal> {
    if op.arity() == 1 {
        let operand = &operands[0];
        if !op.is_invertible(Side::Left) || !operand.is_writable() {
            return Err(EvalError::unwritable());
        }
        return match op.reverse(Side::Left, &value, &Value::Undefined)? {
            ReverseOutcome::Put(corrected) => operand.put(corrected),
            ReverseOutcome::Deny => Ok(Reversal::Deny),
        };
    }

    let side = if op.is_invertible(Side::Left) && operands[0].is_writable() {
        Side::Left
    } else if op.is_invertible(Side::Right) && operands[1].is_writable() {
        Side::Right
    } else {
        return Err(EvalError::unwritable());
    };
    let (target, fixed) = match side {
        Side::Left => (&operands[0], &operands[1]),
        Side::Right => (&operands[1], &operands[0]),
    };

    match fixed.value_of()? {
        EvalValue::Ready(fixed_value) => match op.reverse(side, &value, &fixed_value)? {
            ReverseOutcome::Put(corrected) => target.put(corrected),
            ReverseOutcome::Deny => Ok(Reversal::Deny),
        },
        EvalValue::Pending(pending) => {
            // fire-and-forget: apply the write once the fixed side
            // settles; a late Deny or error is dropped
            let target = Rc::clone(target);
            pending.then(move |result| {
                if let Ok(fixed_value) = result {
                    if let Ok(ReverseOutcome::Put(corrected)) =
                        op.reverse(side, &value, &fixed_value)
                    {
                        let _ = target.put(corrected);
                    }
                }
            });
            Ok(Reversal::Accepted)
        }
    }
}

/// Write through a nested property path into a cell-backed record.
fn put_path(base: &DefRef, path: &[String], value: Value) -> EvalResult<Reversal> {
    let slot = match &base.kind {
        DefKind::Cell(slot) => slot,
        _ => return Err(EvalError::unwritable()),
    };
    let current = slot.borrow().clone();
    let mut root = match current {
        EvalValue::Ready(value) => value,
        EvalValue::Pending(_) => {
            return Err(EvalError::invalid_op("cannot write through a pending value"))
        }
    };
    set_path(&mut root, path, value)?;
    *slot.borrow_mut() = EvalValue::Ready(root);
    Ok(Reversal::Accepted)
}

fn set_path(target: &mut Value, path: &[String], value: Value) -> EvalResult<()> {
    let (last, intermediate) = match path.split_last() {
        Some(split) => split,
        None => {
            *target = value;
            return Ok(());
        }
    };
    let mut cursor = target;
    for segment in intermediate {
        cursor = match cursor {
            Value::Object(fields) => fields.get_mut(segment).ok_or_else(|| {
                EvalError::invalid_op(format!("cannot write through missing property \"{}\"", segment))
            })?,
            other => {
                return Err(EvalError::invalid_op(format!(
                    "cannot write through {} at \"{}\"",
                    other.type_name(),
                    segment
                )))
            }
        };
    }
    match cursor {
        Value::Object(fields) => {
            fields.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index: usize = last.parse().map_err(|_| {
                EvalError::invalid_op(format!("cannot index array with \"{}\"", last))
            })?;
            if index >= items.len() {
                items.resize(index + 1, Value::Undefined);
            }
            items[index] = value;
            Ok(())
        }
        other => Err(EvalError::invalid_op(format!(
            "cannot write property \"{}\" of {}",
            last,
            other.type_name()
        ))),
    }
}
