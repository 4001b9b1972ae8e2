//! Black-box tests of the public engine surface.

use std::rc::Rc;

use pretty_assertions::assert_eq;

use rebind::{
    evaluate, evaluate_with_warnings, Binding, ContextDimension, Definition, ElementId, EvalError,
    EvalErrorKind, Reversal, RuleScope, Value,
};

fn num(n: f64) -> Value {
    Value::Number(n)
}

fn object(fields: &[(&str, Value)]) -> Value {
    let mut map = indexmap::IndexMap::new();
    for (name, value) in fields {
        map.insert(name.to_string(), value.clone());
    }
    Value::Object(map)
}

#[test]
fn arithmetic_precedence() {
    let scope = RuleScope::new();
    assert_eq!(evaluate(&scope, "1+2*3").unwrap().value(), Ok(num(7.0)));
    assert_eq!(evaluate(&scope, "2*3+1").unwrap().value(), Ok(num(7.0)));
    assert_eq!(evaluate(&scope, "10 - 2 - 3").unwrap().value(), Ok(num(5.0)));
    assert_eq!(evaluate(&scope, "(1+2)*3").unwrap().value(), Ok(num(9.0)));
    assert_eq!(evaluate(&scope, "7 % 4 + 1").unwrap().value(), Ok(num(4.0)));
}

#[test]
fn comparison_and_logic() {
    let scope = RuleScope::new();
    scope.define_value("a", num(3.0));
    scope.define_value("b", num(5.0));
    assert_eq!(
        evaluate(&scope, "a < b").unwrap().value(),
        Ok(Value::Bool(true))
    );
    assert_eq!(
        evaluate(&scope, "a >= b").unwrap().value(),
        Ok(Value::Bool(false))
    );
    assert_eq!(
        evaluate(&scope, "a == 3").unwrap().value(),
        Ok(Value::Bool(true))
    );
    assert_eq!(evaluate(&scope, "a < b & a").unwrap().value(), Ok(num(3.0)));
    assert_eq!(evaluate(&scope, "0 | b").unwrap().value(), Ok(num(5.0)));
}

#[test]
fn string_literals_and_concatenation() {
    let scope = RuleScope::new();
    scope.define_value("name", Value::Str("world".into()));
    let def = evaluate(&scope, "\"hello \" + name").unwrap();
    assert_eq!(def.value(), Ok(Value::Str("hello world".into())));
}

#[test]
fn reverse_recovers_the_other_operand() {
    // a + b = 10 with a = 2 fixed: b becomes 8
    let scope = RuleScope::new();
    scope.define_value("a", num(2.0));
    let b = scope.define_cell("b", num(0.0));
    let def = evaluate(&scope, "a+b").unwrap();
    assert_eq!(def.put(num(10.0)), Ok(Reversal::Accepted));
    assert_eq!(b.value(), Ok(num(8.0)));

    // b * 4 = 12: b becomes 3
    let scope = RuleScope::new();
    let b = scope.define_cell("b", num(1.0));
    let def = evaluate(&scope, "b * 4").unwrap();
    assert_eq!(def.put(num(12.0)), Ok(Reversal::Accepted));
    assert_eq!(b.value(), Ok(num(3.0)));

    // 20 / b = 5: b becomes 4
    let scope = RuleScope::new();
    let b = scope.define_cell("b", num(1.0));
    let def = evaluate(&scope, "20 / b").unwrap();
    assert_eq!(def.put(num(5.0)), Ok(Reversal::Accepted));
    assert_eq!(b.value(), Ok(num(4.0)));

    // 10 - b = 4: b becomes 6
    let scope = RuleScope::new();
    let b = scope.define_cell("b", num(1.0));
    let def = evaluate(&scope, "10 - b").unwrap();
    assert_eq!(def.put(num(4.0)), Ok(Reversal::Accepted));
    assert_eq!(b.value(), Ok(num(6.0)));
}

#[test]
fn reverse_through_nested_expression() {
    // (b + 1) * 3 = 12: b becomes 3
    let scope = RuleScope::new();
    let b = scope.define_cell("b", num(0.0));
    let def = evaluate(&scope, "(b + 1) * 3").unwrap();
    assert_eq!(def.put(num(12.0)), Ok(Reversal::Accepted));
    assert_eq!(b.value(), Ok(num(3.0)));
    // and the forward value reflects the write
    assert_eq!(def.value(), Ok(num(12.0)));
}

#[test]
fn ternary_selects_and_reverses() {
    let scope = RuleScope::new();
    scope.define_value("x", num(1.0));
    scope.define_value("y", num(2.0));
    let cond = scope.define_cell("cond", Value::Bool(true));
    let def = evaluate(&scope, "cond ? x : y").unwrap();
    assert_eq!(def.value(), Ok(num(1.0)));

    // requesting y's value flips the condition to false
    assert_eq!(def.put(num(2.0)), Ok(Reversal::Accepted));
    assert_eq!(cond.value(), Ok(Value::Bool(false)));
    assert_eq!(def.value(), Ok(num(2.0)));

    // requesting a value matching neither branch is denied, untouched
    assert_eq!(def.put(num(9.0)), Ok(Reversal::Deny));
    assert_eq!(cond.value(), Ok(Value::Bool(false)));
}

#[test]
fn negation_is_self_inverse() {
    let scope = RuleScope::new();
    let flag = scope.define_cell("flag", Value::Bool(false));
    let def = evaluate(&scope, "!flag").unwrap();
    assert_eq!(def.value(), Ok(Value::Bool(true)));
    assert_eq!(def.put(Value::Bool(false)), Ok(Reversal::Accepted));
    assert_eq!(flag.value(), Ok(Value::Bool(true)));
}

#[test]
fn non_invertible_operators_never_mutate() {
    let scope = RuleScope::new();
    let a = scope.define_cell("a", num(1.0));
    let b = scope.define_cell("b", num(2.0));
    let def = evaluate(&scope, "a > b").unwrap();
    assert_eq!(def.put(Value::Bool(true)), Err(EvalError::unwritable()));
    assert_eq!(a.value(), Ok(num(1.0)));
    assert_eq!(b.value(), Ok(num(2.0)));
}

#[test]
fn reverse_with_no_writable_operand_fails() {
    let scope = RuleScope::new();
    scope.define_value("a", num(1.0));
    let def = evaluate(&scope, "a + 2").unwrap();
    let err = def.put(num(5.0)).unwrap_err();
    assert_eq!(err.kind, EvalErrorKind::UnwritableTarget);
}

#[test]
fn path_resolution_and_missing_steps() {
    let scope = RuleScope::new();
    scope.define_value(
        "foo",
        object(&[("bar", object(&[("baz", num(42.0))]))]),
    );
    assert_eq!(
        evaluate(&scope, "foo/bar/baz").unwrap().value(),
        Ok(num(42.0))
    );
    // missing intermediate resolves to undefined, not an error
    assert_eq!(
        evaluate(&scope, "foo/nope/baz").unwrap().value(),
        Ok(Value::Undefined)
    );
}

#[test]
fn simple_reference_writes_through_nested_path() {
    let scope = RuleScope::new();
    let root = scope.define_cell("settings", object(&[("volume", num(3.0))]));
    let def = evaluate(&scope, "settings/volume").unwrap();
    assert_eq!(def.value(), Ok(num(3.0)));

    assert_eq!(def.put(num(8.0)), Ok(Reversal::Accepted));
    assert_eq!(def.value(), Ok(num(8.0)));
    assert_eq!(root.value().unwrap().property("volume"), num(8.0));
}

#[test]
fn reduction_error_on_malformed_input() {
    let scope = RuleScope::new();
    scope.define_value("a", num(1.0));
    scope.define_value("b", num(2.0));
    let err = evaluate(&scope, "a b").unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::ReductionError(_)));
    assert!(err.to_string().contains("a b"));
}

#[test]
fn unresolved_reference_names_the_culprit() {
    let scope = RuleScope::new();
    let err = evaluate(&scope, "undefinedName+1").unwrap_err();
    assert_eq!(
        err.kind,
        EvalErrorKind::UnresolvedReference("undefinedName".into())
    );
}

#[test]
fn dependency_tracking_lists_consulted_references() {
    let scope = RuleScope::new();
    scope.define_value("a", num(1.0));
    scope.define_value("b", num(2.0));
    scope.define_source("c", "a * 10");
    let def = evaluate(&scope, "b + c").unwrap();
    let inputs = def.inputs();
    assert!(inputs.contains_key("b"));
    assert!(inputs.contains_key("c"));
}

#[test]
fn idempotent_evaluation_against_unchanged_scope() {
    let scope = RuleScope::new();
    scope.define_value("a", num(2.0));
    scope.define_value("b", num(3.0));
    let first = evaluate(&scope, "a + b * a").unwrap();
    let second = evaluate(&scope, "a + b * a").unwrap();
    assert_eq!(first.value(), second.value());
}

#[test]
fn pending_inputs_join_before_forward_runs() {
    let scope = RuleScope::new();
    let (cell, settle) = Definition::pending_cell();
    scope.define("late", Binding::Definition(cell));
    scope.define_value("base", num(10.0));

    let def = evaluate(&scope, "base + late").unwrap();
    let result = def.value_of().unwrap();
    assert!(result.ready().is_none(), "must wait for the pending input");

    settle.settle(Ok(num(5.0)));
    assert_eq!(result.ready(), Some(Ok(num(15.0))));
}

#[test]
fn pending_errors_propagate_through_the_join() {
    let scope = RuleScope::new();
    let (cell, settle) = Definition::pending_cell();
    scope.define("late", Binding::Definition(cell));

    let def = evaluate(&scope, "late * 2").unwrap();
    let result = def.value_of().unwrap();
    settle.settle(Err(EvalError::division_by_zero()));
    assert_eq!(result.ready(), Some(Err(EvalError::division_by_zero())));
}

#[test]
fn contextual_expression_varies_per_element() {
    let scope = RuleScope::new();
    scope.define(
        "item",
        Binding::Definition(Definition::contextual(ContextDimension::Element, |id| {
            Definition::cell(num(id as f64))
        })),
    );
    scope.define_value("scale", num(100.0));

    let def = evaluate(&scope, "item * scale").unwrap();
    // unprojected computation has no per-element value
    assert!(def.value_of().is_err());

    let first = def.for_element(ElementId(1));
    let second = def.for_element(ElementId(2));
    assert_eq!(first.value(), Ok(num(100.0)));
    assert_eq!(second.value(), Ok(num(200.0)));
    // same element binds to the same computation instance
    assert!(Rc::ptr_eq(&first, &def.for_element(ElementId(1))));
}

#[test]
fn callable_forward_and_reverse_delegation() {
    let scope = RuleScope::new();
    scope.define(
        "half",
        Binding::Definition(Definition::callable(
            |args| Ok(num(args[0].as_number()? / 2.0)),
            Some(Rc::new(|output: &Value, args: &[rebind::DefRef]| {
                args[0].put(num(output.as_number()? * 2.0))
            })),
        )),
    );
    let x = scope.define_cell("x", num(12.0));

    let def = evaluate(&scope, "half(x)").unwrap();
    assert_eq!(def.value(), Ok(num(6.0)));

    // reverse-through-a-call delegates to the callee's inversion
    assert_eq!(def.put(num(4.0)), Ok(Reversal::Accepted));
    assert_eq!(x.value(), Ok(num(8.0)));
}

#[test]
fn warnings_surface_permissive_fallbacks() {
    let scope = RuleScope::new();
    scope.define_value("a", num(1.0));
    scope.define_value("~", num(2.0));
    let evaluation = evaluate_with_warnings(&scope, "a + ~").unwrap();
    assert_eq!(evaluation.definition.value(), Ok(num(3.0)));
    assert_eq!(evaluation.warnings.len(), 1);
    assert!(evaluation.warnings[0].message.contains("~"));
}

#[test]
fn division_by_zero_is_an_error_both_ways() {
    let scope = RuleScope::new();
    assert_eq!(
        evaluate(&scope, "1 / 0").unwrap().value(),
        Err(EvalError::division_by_zero())
    );

    let scope = RuleScope::new();
    let b = scope.define_cell("b", num(1.0));
    let def = evaluate(&scope, "b * 0").unwrap();
    assert_eq!(def.put(num(5.0)), Err(EvalError::division_by_zero()));
    assert_eq!(b.value(), Ok(num(1.0)));
}

#[test]
fn values_serialize_for_embedding_layers() {
    let value = object(&[("n", num(1.0)), ("s", Value::Str("x".into()))]);
    let json = serde_json::to_string(&value).unwrap();
    assert_eq!(json, r#"{"n":1.0,"s":"x"}"#);
}
