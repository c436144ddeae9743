//! Tree-to-tree visitor.
//!
//! Implementors override the hooks for the nodes they care about; the
//! defaults rebuild the node from its visited children.

use crate::errors::{ExpressionError, ExpressionResult};
use crate::model::TypeId;

use super::ast::{Expr, Lambda, Parameter};

pub trait ExpressionVisitor {
    fn visit(&mut self, expr: &Expr) -> ExpressionResult<Expr> {
        walk_expr(self, expr)
    }

    fn visit_parameter(&mut self, parameter: &Parameter) -> ExpressionResult<Expr> {
        Ok(Expr::Parameter(parameter.clone()))
    }

    fn visit_member(
        &mut self,
        base: &Expr,
        member: &str,
        declaring_type: &TypeId,
    ) -> ExpressionResult<Expr> {
        walk_member(self, base, member, declaring_type)
    }

    fn visit_call(
        &mut self,
        method: &str,
        target: Option<&Expr>,
        arguments: &[Expr],
    ) -> ExpressionResult<Expr> {
        let target = target.map(|t| self.visit(t)).transpose()?;
        let arguments = arguments
            .iter()
            .map(|a| self.visit(a))
            .collect::<ExpressionResult<Vec<_>>>()?;
        Ok(Expr::call(method, target, arguments))
    }

    fn visit_lambda(&mut self, lambda: &Lambda) -> ExpressionResult<Lambda> {
        let body = self.visit(lambda.body())?;
        Ok(Lambda::with_parameters(lambda.parameters().to_vec(), body))
    }
}

/// Default structural recursion.
pub fn walk_expr<V: ExpressionVisitor + ?Sized>(
    visitor: &mut V,
    expr: &Expr,
) -> ExpressionResult<Expr> {
    match expr {
        Expr::Parameter(p) => visitor.visit_parameter(p),
        Expr::Member {
            base,
            member,
            declaring_type,
        } => visitor.visit_member(base, member, declaring_type),
        Expr::Binary { op, left, right } => Ok(Expr::Binary {
            op: *op,
            left: Box::new(visitor.visit(left)?),
            right: Box::new(visitor.visit(right)?),
        }),
        Expr::Unary { op, operand } => Ok(Expr::Unary {
            op: *op,
            operand: Box::new(visitor.visit(operand)?),
        }),
        Expr::Constant(v) => Ok(Expr::Constant(v.clone())),
        Expr::Construct { ty, bindings } => {
            let bindings = bindings
                .iter()
                .map(|(name, e)| Ok((name.clone(), visitor.visit(e)?)))
                .collect::<ExpressionResult<Vec<_>>>()?;
            Ok(Expr::Construct {
                ty: ty.clone(),
                bindings,
            })
        }
        Expr::Call {
            method,
            target,
            arguments,
        } => visitor.visit_call(method, target.as_deref(), arguments),
    }
}

pub fn walk_member<V: ExpressionVisitor + ?Sized>(
    visitor: &mut V,
    base: &Expr,
    member: &str,
    declaring_type: &TypeId,
) -> ExpressionResult<Expr> {
    Ok(visitor.visit(base)?.member(member, declaring_type.clone()))
}

/// Moves a lambda body from one parameter onto another.
///
/// Any parameter other than `from` is a root mismatch: the body was written
/// against a different input than the one it is being attached to.
pub struct ParameterRebinder<'a> {
    from: &'a Parameter,
    to: &'a Parameter,
}

impl<'a> ParameterRebinder<'a> {
    pub fn new(from: &'a Parameter, to: &'a Parameter) -> Self {
        Self { from, to }
    }
}

impl ExpressionVisitor for ParameterRebinder<'_> {
    fn visit_parameter(&mut self, parameter: &Parameter) -> ExpressionResult<Expr> {
        if parameter.id() == self.from.id() {
            Ok(Expr::param(self.to))
        } else {
            Err(ExpressionError::KeyMismatch {
                expected: format!("{}: {}", self.from.name(), self.from.ty()),
                found: format!("{}: {}", parameter.name(), parameter.ty()),
            })
        }
    }
}
