//! Type-rewrite visitor.
//!
//! Re-targets a lambda written against domain types so that it reads the
//! corresponding members of mapped (data) types. Members are resolved by
//! exact name on the target descriptor; nothing is renamed.

use tracing::{debug, trace};

use crate::errors::{ExpressionError, ExpressionResult};
use crate::model::TypeId;

use super::ast::{Expr, Lambda, Parameter};
use super::mapping::TypeMapping;
use super::visitor::ExpressionVisitor;

/// Rewrites one lambda. Holds the original parameter and its replacement
/// so parameter references in the body are swapped by identity.
pub struct ReplaceTypeVisitor<'a> {
    mapping: &'a TypeMapping,
    original: Parameter,
    replacement: Parameter,
}

impl<'a> ReplaceTypeVisitor<'a> {
    pub fn new(mapping: &'a TypeMapping, original: &Parameter) -> Self {
        let replacement = original.retyped(mapping.resolve(original.ty()));
        Self {
            mapping,
            original: original.clone(),
            replacement,
        }
    }

    pub fn replacement(&self) -> &Parameter {
        &self.replacement
    }
}

impl ExpressionVisitor for ReplaceTypeVisitor<'_> {
    fn visit_parameter(&mut self, parameter: &Parameter) -> ExpressionResult<Expr> {
        if parameter.id() == self.original.id() {
            Ok(Expr::param(&self.replacement))
        } else {
            Err(ExpressionError::unsupported_shape(format!(
                "parameter '{}' is not bound by the lambda being rewritten",
                parameter.name()
            )))
        }
    }

    fn visit_member(
        &mut self,
        base: &Expr,
        member: &str,
        declaring_type: &TypeId,
    ) -> ExpressionResult<Expr> {
        let rewritten_base = self.visit(base)?;
        match self.mapping.target(declaring_type) {
            Some(target) => {
                if !target.has_member(member) {
                    return Err(ExpressionError::MemberNotFoundOnTarget {
                        member: member.to_string(),
                        source_type: declaring_type.to_string(),
                        target_type: target.id.to_string(),
                    });
                }
                trace!(
                    "[EXPR_REWRITE] {}.{} -> {}.{}",
                    declaring_type,
                    member,
                    target.id,
                    member
                );
                Ok(rewritten_base.member(member, target.id.clone()))
            }
            None => Ok(rewritten_base.member(member, declaring_type.clone())),
        }
    }

    fn visit_call(
        &mut self,
        method: &str,
        _target: Option<&Expr>,
        _arguments: &[Expr],
    ) -> ExpressionResult<Expr> {
        Err(ExpressionError::unsupported_shape(format!(
            "method call '{method}' cannot be rewritten"
        )))
    }

    fn visit_lambda(&mut self, lambda: &Lambda) -> ExpressionResult<Lambda> {
        let body = self.visit(lambda.body())?;
        Ok(Lambda::new(self.replacement.clone(), body))
    }
}

/// Rewrite `lambda` against `mapping`.
///
/// # Arguments
/// * `lambda` - single-parameter lambda over a domain type
/// * `mapping` - domain to data type mapping
///
/// # Returns
/// A new lambda over the mapped parameter type. The input is left intact.
///
/// # Errors
/// * `UnsupportedExpressionShape` for multi-parameter lambdas, foreign
///   parameters or method calls
/// * `MemberNotFoundOnTarget` when a mapped member has no same-named member
///   on the target type
pub fn rewrite(lambda: &Lambda, mapping: &TypeMapping) -> ExpressionResult<Lambda> {
    let parameter = lambda.single_parameter()?;
    let mut visitor = ReplaceTypeVisitor::new(mapping, parameter);
    let rewritten = visitor.visit_lambda(lambda)?;
    debug!(
        "[EXPR_REWRITE] {} -> {} ({} nodes)",
        parameter.ty(),
        visitor.replacement().ty(),
        rewritten.body().node_count()
    );
    Ok(rewritten)
}
