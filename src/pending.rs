//! Deferred values and the fan-in join.
//!
//! Evaluation is single-threaded and cooperative: a computation never
//! blocks, it only *suspends* by handing back a [`PendingValue`] instead
//! of a settled result. The evaluator's one suspension point is "resolve
//! all inputs before running the operator forward", implemented here as
//! [`when_all`]. There is no cancellation and no timeout; once started, a
//! compute chain always runs to completion.

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::{EvalResult, Value};

type Callback = Box<dyn FnOnce(EvalResult<Value>)>;

enum PendingState {
    Unsettled(Vec<Callback>),
    Settled(EvalResult<Value>),
}

/// A single-assignment deferred cell.
///
/// Cloning shares the cell. `settle` may be called once; later callers of
/// [`PendingValue::then`] observe the settled result immediately.
#[derive(Clone)]
pub struct PendingValue {
    state: Rc<RefCell<PendingState>>,
}

impl PendingValue {
    /// Create a new, unsettled cell.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(PendingState::Unsettled(Vec::new()))),
        }
    }

    /// Settle the cell, running every registered callback.
    ///
    /// Settling twice is a no-op; the first result wins.
    pub fn settle(&self, result: EvalResult<Value>) {
        let callbacks = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                PendingState::Settled(_) => return,
                PendingState::Unsettled(callbacks) => {
                    let callbacks = std::mem::take(callbacks);
                    *state = PendingState::Settled(result.clone());
                    callbacks
                }
            }
        };
        for callback in callbacks {
            callback(result.clone());
        }
    }

    /// Register a callback, invoked immediately if already settled.
    pub fn then(&self, callback: impl FnOnce(EvalResult<Value>) + 'static) {
        let settled = match &mut *self.state.borrow_mut() {
            PendingState::Unsettled(callbacks) => {
                callbacks.push(Box::new(callback));
                return;
            }
            PendingState::Settled(result) => result.clone(),
        };
        callback(settled);
    }

    /// Whether the cell has settled.
    pub fn is_settled(&self) -> bool {
        matches!(&*self.state.borrow(), PendingState::Settled(_))
    }

    /// The settled result, if any.
    pub fn settled(&self) -> Option<EvalResult<Value>> {
        match &*self.state.borrow() {
            PendingState::Settled(result) => Some(result.clone()),
            PendingState::Unsettled(_) => None,
        }
    }
}

impl Default for PendingValue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PendingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &*self.state.borrow() {
            PendingState::Unsettled(callbacks) => {
                write!(f, "PendingValue(unsettled, {} waiting)", callbacks.len())
            }
            PendingState::Settled(result) => write!(f, "PendingValue({:?})", result),
        }
    }
}

/// A value that is either already resolved or still pending.
#[derive(Debug, Clone)]
pub enum EvalValue {
    /// Fully resolved
    Ready(Value),
    /// Still computing; settle via the contained cell
    Pending(PendingValue),
}

impl EvalValue {
    /// Run `callback` with the result once this value has settled
    /// (immediately if it is already `Ready`).
    pub fn when(self, callback: impl FnOnce(EvalResult<Value>) + 'static) {
        match self {
            EvalValue::Ready(value) => callback(Ok(value)),
            EvalValue::Pending(pending) => pending.then(callback),
        }
    }

    /// The resolved value, if this is `Ready` or a settled `Pending`.
    pub fn ready(&self) -> Option<EvalResult<Value>> {
        match self {
            EvalValue::Ready(value) => Some(Ok(value.clone())),
            EvalValue::Pending(pending) => pending.settled(),
        }
    }
}

impl From<Value> for EvalValue {
    fn from(value: Value) -> Self {
        EvalValue::Ready(value)
    }
}

/// Fan-in join: wait for every value to settle, then run `callback` with
/// the collected results in order. The first error short-circuits.
///
/// If every input is already resolved the callback runs synchronously,
/// which is the common case.
pub fn when_all(values: Vec<EvalValue>, callback: impl FnOnce(EvalResult<Vec<Value>>) + 'static) {
    struct Join {
        slots: Vec<Option<Value>>,
        remaining: usize,
        failed: bool,
        callback: Option<Box<dyn FnOnce(EvalResult<Vec<Value>>)>>,
    }

    let count = values.len();
    let join = Rc::new(RefCell::new(Join {
        slots: vec![None; count],
        remaining: count,
        failed: false,
        callback: Some(Box::new(callback)),
    }));

    if count == 0 {
        let callback = join.borrow_mut().callback.take();
        if let Some(callback) = callback {
            callback(Ok(Vec::new()));
        }
        return;
    }

    for (index, value) in values.into_iter().enumerate() {
        let join = Rc::clone(&join);
        value.when(move |result| {
            let finished = {
                let mut state = join.borrow_mut();
                if state.failed {
                    return;
                }
                match result {
                    Ok(value) => {
                        state.slots[index] = Some(value);
                        state.remaining -= 1;
                        if state.remaining == 0 {
                            state.callback.take().map(|cb| (cb, Ok(())))
                        } else {
                            None
                        }
                    }
                    Err(err) => {
                        state.failed = true;
                        state.callback.take().map(|cb| (cb, Err(err)))
                    }
                }
            };
            if let Some((callback, outcome)) = finished {
                match outcome {
                    Ok(()) => {
                        let slots = std::mem::take(&mut join.borrow_mut().slots);
                        let values = slots
                            .into_iter()
                            .map(|slot| slot.expect("all join slots settled"))
                            .collect();
                        callback(Ok(values));
                    }
                    Err(err) => callback(Err(err)),
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::EvalError;

    #[test]
    fn settle_then_observe() {
        let pending = PendingValue::new();
        pending.settle(Ok(Value::Number(5.0)));
        assert_eq!(pending.settled(), Some(Ok(Value::Number(5.0))));
    }

    #[test]
    fn observe_then_settle() {
        let pending = PendingValue::new();
        let seen = Rc::new(RefCell::new(None));
        {
            let seen = Rc::clone(&seen);
            pending.then(move |result| *seen.borrow_mut() = Some(result));
        }
        assert!(seen.borrow().is_none());
        pending.settle(Ok(Value::Str("late".into())));
        assert_eq!(*seen.borrow(), Some(Ok(Value::Str("late".into()))));
    }

    #[test]
    fn second_settle_is_ignored() {
        let pending = PendingValue::new();
        pending.settle(Ok(Value::Number(1.0)));
        pending.settle(Ok(Value::Number(2.0)));
        assert_eq!(pending.settled(), Some(Ok(Value::Number(1.0))));
    }

    #[test]
    fn when_all_joins_in_order() {
        let a = PendingValue::new();
        let b = PendingValue::new();
        let seen = Rc::new(RefCell::new(None));
        {
            let seen = Rc::clone(&seen);
            when_all(
                vec![
                    EvalValue::Pending(a.clone()),
                    EvalValue::Ready(Value::Number(2.0)),
                    EvalValue::Pending(b.clone()),
                ],
                move |result| *seen.borrow_mut() = Some(result),
            );
        }
        // joins only once the last input settles
        b.settle(Ok(Value::Number(3.0)));
        assert!(seen.borrow().is_none());
        a.settle(Ok(Value::Number(1.0)));
        assert_eq!(
            *seen.borrow(),
            Some(Ok(vec![
                Value::Number(1.0),
                Value::Number(2.0),
                Value::Number(3.0)
            ]))
        );
    }

    #[test]
    fn when_all_short_circuits_on_error() {
        let a = PendingValue::new();
        let seen = Rc::new(RefCell::new(None));
        {
            let seen = Rc::clone(&seen);
            when_all(
                vec![EvalValue::Pending(a.clone())],
                move |result| *seen.borrow_mut() = Some(result),
            );
        }
        a.settle(Err(EvalError::division_by_zero()));
        assert_eq!(*seen.borrow(), Some(Err(EvalError::division_by_zero())));
    }
}
