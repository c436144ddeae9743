//! Closure compiler.
//!
//! Turns a lambda into a tree of boxed closures once, so repeated calls
//! (specification checks, in-memory projection over many rows) skip the
//! per-call match over node kinds. Semantics are identical to
//! [`super::eval`]; both share the same operator helpers.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::errors::{EvaluationError, EvaluationResult};

use super::ast::{BinaryOp, Expr, Lambda, Parameter};
use super::eval::{apply_binary, apply_unary, as_bool, bound_parameter, read_member};

type Node = Arc<dyn Fn(&Value) -> EvaluationResult<Value> + Send + Sync>;

/// The callable form of a lambda. Cheap to clone and shareable.
#[derive(Clone)]
pub struct CompiledLambda {
    parameter: Parameter,
    root: Node,
}

impl fmt::Debug for CompiledLambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledLambda")
            .field("parameter", &self.parameter)
            .finish_non_exhaustive()
    }
}

impl CompiledLambda {
    /// Compile `lambda`. Unsupported nodes fail here, not at call time.
    pub fn compile(lambda: &Lambda) -> EvaluationResult<Self> {
        let parameter = bound_parameter(lambda)?.clone();
        let root = compile_expr(lambda.body(), &parameter)?;
        Ok(Self { parameter, root })
    }

    pub fn parameter(&self) -> &Parameter {
        &self.parameter
    }

    pub fn call(&self, argument: &Value) -> EvaluationResult<Value> {
        (self.root)(argument)
    }

    pub fn call_predicate(&self, argument: &Value) -> EvaluationResult<bool> {
        let value = self.call(argument)?;
        as_bool(&value, "predicate")
    }
}

fn compile_expr(expr: &Expr, parameter: &Parameter) -> EvaluationResult<Node> {
    let node: Node = match expr {
        Expr::Parameter(p) if p.id() == parameter.id() => Arc::new(|arg: &Value| Ok(arg.clone())),
        Expr::Parameter(p) => {
            return Err(EvaluationError::UnboundParameter {
                name: p.name().to_string(),
            })
        }
        Expr::Member { base, member, .. } => {
            let member = member.clone();
            match base.as_ref() {
                Expr::Parameter(p) if p.id() == parameter.id() => {
                    Arc::new(move |arg: &Value| read_member(arg, &member))
                }
                base => {
                    let base = compile_expr(base, parameter)?;
                    Arc::new(move |arg: &Value| read_member(&base(arg)?, &member))
                }
            }
        }
        Expr::Binary { op, left, right } => {
            let left = compile_expr(left, parameter)?;
            let right = compile_expr(right, parameter)?;
            match *op {
                BinaryOp::And => Arc::new(move |arg: &Value| {
                    if !as_bool(&left(arg)?, "&&")? {
                        return Ok(Value::Bool(false));
                    }
                    Ok(Value::Bool(as_bool(&right(arg)?, "&&")?))
                }),
                BinaryOp::Or => Arc::new(move |arg: &Value| {
                    if as_bool(&left(arg)?, "||")? {
                        return Ok(Value::Bool(true));
                    }
                    Ok(Value::Bool(as_bool(&right(arg)?, "||")?))
                }),
                op => Arc::new(move |arg: &Value| apply_binary(op, &left(arg)?, &right(arg)?)),
            }
        }
        Expr::Unary { op, operand } => {
            let operand = compile_expr(operand, parameter)?;
            let op = *op;
            Arc::new(move |arg: &Value| apply_unary(op, &operand(arg)?))
        }
        Expr::Constant(v) => {
            let v = v.clone();
            Arc::new(move |_: &Value| Ok(v.clone()))
        }
        Expr::Construct { bindings, .. } => {
            let compiled = bindings
                .iter()
                .map(|(name, e)| Ok((name.clone(), compile_expr(e, parameter)?)))
                .collect::<EvaluationResult<Vec<(String, Node)>>>()?;
            Arc::new(move |arg: &Value| {
                let mut object = Map::with_capacity(compiled.len());
                for (name, node) in &compiled {
                    object.insert(name.clone(), node(arg)?);
                }
                Ok(Value::Object(object))
            })
        }
        Expr::Call { method, .. } => {
            return Err(EvaluationError::UnsupportedNode {
                node: format!("call to '{method}'"),
            })
        }
    };
    Ok(node)
}
