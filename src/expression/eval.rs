//! Tree-walking interpreter.
//!
//! Records are `serde_json::Value` objects keyed by member name. Member
//! access on `null` yields `null` (an unloaded navigation member reads as
//! absent rather than failing), and any ordering comparison involving
//! `null` is false.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use crate::errors::{EvaluationError, EvaluationResult};

use super::ast::{BinaryOp, Expr, Lambda, Parameter, UnaryOp};

/// Evaluate a single-parameter lambda against `argument`.
pub fn evaluate(lambda: &Lambda, argument: &Value) -> EvaluationResult<Value> {
    let parameter = bound_parameter(lambda)?;
    eval_expr(lambda.body(), parameter, argument)
}

/// Evaluate a predicate lambda. `null` counts as `false`.
pub fn evaluate_predicate(lambda: &Lambda, argument: &Value) -> EvaluationResult<bool> {
    let value = evaluate(lambda, argument)?;
    as_bool(&value, "predicate")
}

pub(crate) fn bound_parameter(lambda: &Lambda) -> EvaluationResult<&Parameter> {
    match lambda.parameters() {
        [only] => Ok(only),
        other => Err(EvaluationError::ArityMismatch {
            expected: 1,
            found: other.len(),
        }),
    }
}

fn eval_expr(expr: &Expr, parameter: &Parameter, argument: &Value) -> EvaluationResult<Value> {
    match expr {
        Expr::Parameter(p) if p.id() == parameter.id() => Ok(argument.clone()),
        Expr::Parameter(p) => Err(EvaluationError::UnboundParameter {
            name: p.name().to_string(),
        }),
        Expr::Member { base, member, .. } => {
            // parameter.member is the hot path; skip cloning the record
            if let Expr::Parameter(p) = base.as_ref() {
                if p.id() == parameter.id() {
                    return read_member(argument, member);
                }
            }
            let base = eval_expr(base, parameter, argument)?;
            read_member(&base, member)
        }
        Expr::Binary { op, left, right } => {
            let left = eval_expr(left, parameter, argument)?;
            match op {
                BinaryOp::And => {
                    if !as_bool(&left, "&&")? {
                        return Ok(Value::Bool(false));
                    }
                    let right = eval_expr(right, parameter, argument)?;
                    Ok(Value::Bool(as_bool(&right, "&&")?))
                }
                BinaryOp::Or => {
                    if as_bool(&left, "||")? {
                        return Ok(Value::Bool(true));
                    }
                    let right = eval_expr(right, parameter, argument)?;
                    Ok(Value::Bool(as_bool(&right, "||")?))
                }
                op => {
                    let right = eval_expr(right, parameter, argument)?;
                    apply_binary(*op, &left, &right)
                }
            }
        }
        Expr::Unary { op, operand } => {
            let operand = eval_expr(operand, parameter, argument)?;
            apply_unary(*op, &operand)
        }
        Expr::Constant(v) => Ok(v.clone()),
        Expr::Construct { bindings, .. } => {
            let mut object = Map::with_capacity(bindings.len());
            for (name, binding) in bindings {
                object.insert(name.clone(), eval_expr(binding, parameter, argument)?);
            }
            Ok(Value::Object(object))
        }
        Expr::Call { method, .. } => Err(EvaluationError::UnsupportedNode {
            node: format!("call to '{method}'"),
        }),
    }
}

/// Read `member` from a record. `null` propagates.
pub(crate) fn read_member(base: &Value, member: &str) -> EvaluationResult<Value> {
    match base {
        Value::Null => Ok(Value::Null),
        Value::Object(map) => map
            .get(member)
            .cloned()
            .ok_or_else(|| EvaluationError::MissingMember {
                member: member.to_string(),
            }),
        other => Err(EvaluationError::type_mismatch(
            format!("member access '.{member}'"),
            "object",
            kind_of(other),
        )),
    }
}

pub(crate) fn as_bool(value: &Value, operation: &str) -> EvaluationResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(EvaluationError::type_mismatch(
            operation,
            "bool",
            kind_of(other),
        )),
    }
}

pub(crate) fn apply_unary(op: UnaryOp, operand: &Value) -> EvaluationResult<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!as_bool(operand, "!")?)),
    }
}

/// Non-short-circuit binary operators. `And`/`Or` are accepted too and
/// evaluated eagerly.
pub(crate) fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> EvaluationResult<Value> {
    let operation = op.to_string();
    match op {
        BinaryOp::And => Ok(Value::Bool(
            as_bool(left, &operation)? && as_bool(right, &operation)?,
        )),
        BinaryOp::Or => Ok(Value::Bool(
            as_bool(left, &operation)? || as_bool(right, &operation)?,
        )),
        BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let Some(ordering) = compare(left, right, &operation)? else {
                return Ok(Value::Bool(false));
            };
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            arithmetic(op, left, right)
        }
        BinaryOp::Contains | BinaryOp::StartsWith | BinaryOp::EndsWith => {
            string_match(op, left, right)
        }
    }
}

/// Equality as `==` evaluates it: numbers compare by value, so `2 == 2.0`.
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value, operation: &str) -> EvaluationResult<Option<Ordering>> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(None),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => Ok(Some(x.cmp(&y))),
            _ => Ok(a
                .as_f64()
                .zip(b.as_f64())
                .and_then(|(x, y)| x.partial_cmp(&y))),
        },
        (Value::String(a), Value::String(b)) => Ok(Some(a.cmp(b))),
        (Value::Bool(a), Value::Bool(b)) => Ok(Some(a.cmp(b))),
        (a, b) => Err(EvaluationError::type_mismatch(
            operation,
            "two numbers, strings or bools",
            format!("{} and {}", kind_of(a), kind_of(b)),
        )),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> EvaluationResult<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
            Ok(Value::String(format!("{a}{b}")))
        }
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
                let exact = match op {
                    BinaryOp::Add => x.checked_add(y),
                    BinaryOp::Sub => x.checked_sub(y),
                    BinaryOp::Mul => x.checked_mul(y),
                    _ => {
                        if y == 0 {
                            return Err(EvaluationError::DivideByZero);
                        }
                        x.checked_div(y)
                    }
                };
                if let Some(v) = exact {
                    return Ok(Value::from(v));
                }
            }
            let (x, y) = match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => (x, y),
                _ => {
                    return Err(EvaluationError::type_mismatch(
                        op.to_string(),
                        "finite numbers",
                        "non-finite number",
                    ))
                }
            };
            let result = match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                BinaryOp::Mul => x * y,
                _ => {
                    if y == 0.0 {
                        return Err(EvaluationError::DivideByZero);
                    }
                    x / y
                }
            };
            Number::from_f64(result).map(Value::Number).ok_or_else(|| {
                EvaluationError::type_mismatch(op.to_string(), "finite result", "non-finite")
            })
        }
        (a, b) => Err(EvaluationError::type_mismatch(
            op.to_string(),
            "two numbers",
            format!("{} and {}", kind_of(a), kind_of(b)),
        )),
    }
}

fn string_match(op: BinaryOp, left: &Value, right: &Value) -> EvaluationResult<Value> {
    match (left, right) {
        (Value::Null, _) => Ok(Value::Bool(false)),
        (Value::Array(items), needle) if op == BinaryOp::Contains => {
            Ok(Value::Bool(items.iter().any(|item| values_equal(item, needle))))
        }
        (Value::String(haystack), Value::String(needle)) => {
            let found = match op {
                BinaryOp::Contains => haystack.contains(needle.as_str()),
                BinaryOp::StartsWith => haystack.starts_with(needle.as_str()),
                _ => haystack.ends_with(needle.as_str()),
            };
            Ok(Value::Bool(found))
        }
        (a, b) => Err(EvaluationError::type_mismatch(
            op.to_string(),
            "two strings",
            format!("{} and {}", kind_of(a), kind_of(b)),
        )),
    }
}

/// JSON kind name, for error messages.
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
