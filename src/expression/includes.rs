//! Projection-with-includes fusion.
//!
//! An include factory names the navigation members that must be loaded
//! before a projection runs, either as a single member chain
//! (`x => x.Customer.CustomerDemographics`) or as an anonymous construction
//! of chains (`x => new { x.Customer, x.Employee }`). Fusing it with a
//! projection yields one lambda that computes both, plus the flattened path
//! list the data source needs as eager-load hints.

use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::errors::{EvaluationError, EvaluationResult, ExpressionError, ExpressionResult};
use crate::model::TypeId;

use super::ast::{Expr, Lambda, Parameter};
use super::eval;
use super::visitor::{ExpressionVisitor, ParameterRebinder};

/// Type name of the fused construction.
pub const PROJECTION_WITH_INCLUDES: &str = "ProjectionWithIncludes";
pub const DATA_MEMBER: &str = "Data";
pub const INCLUDES_MEMBER: &str = "Includes";

/// Dotted traversal from the root entity, e.g. `Customer.CustomerDemographics`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IncludePath(Vec<String>);

impl IncludePath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn from_dotted(path: &str) -> Self {
        Self::new(path.split('.').filter(|s| !s.is_empty()))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// First segment and the remainder, if any.
    pub fn split_first(&self) -> Option<(&str, IncludePath)> {
        self.0
            .split_first()
            .map(|(head, tail)| (head.as_str(), IncludePath(tail.to_vec())))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for IncludePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Flatten an include factory into its path list.
///
/// Paths keep the order of the factory's bindings; a repeated path is kept
/// once, at its first position.
pub fn flatten_include_paths(factory: &Lambda) -> ExpressionResult<Vec<IncludePath>> {
    let parameter = factory.single_parameter()?;
    let mut paths: Vec<IncludePath> = Vec::new();
    match factory.body() {
        Expr::Construct { bindings, .. } => {
            if bindings.is_empty() {
                return Err(ExpressionError::unsupported_include(
                    "include construction has no bindings",
                ));
            }
            for (name, binding) in bindings {
                let path = chain_path(binding, parameter).map_err(|e| match e {
                    ExpressionError::UnsupportedIncludePathShape { reason } => {
                        ExpressionError::unsupported_include(format!("binding '{name}': {reason}"))
                    }
                    other => other,
                })?;
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }
        body => paths.push(chain_path(body, parameter)?),
    }
    Ok(paths)
}

fn chain_path(expr: &Expr, parameter: &Parameter) -> ExpressionResult<IncludePath> {
    let Some((root, names)) = expr.member_chain() else {
        return Err(ExpressionError::unsupported_include(format!(
            "'{expr}' is not a member access chain"
        )));
    };
    match root {
        Expr::Parameter(p) if p.id() == parameter.id() => Ok(IncludePath::new(names)),
        Expr::Parameter(p) => Err(ExpressionError::KeyMismatch {
            expected: format!("{}: {}", parameter.name(), parameter.ty()),
            found: format!("{}: {}", p.name(), p.ty()),
        }),
        other => Err(ExpressionError::unsupported_include(format!(
            "chain is rooted at '{other}', not at a parameter"
        ))),
    }
}

/// A projection fused with its include factory.
#[derive(Clone, Debug)]
pub struct FusedProjection {
    lambda: Lambda,
    include_paths: Vec<IncludePath>,
}

impl FusedProjection {
    /// `x => new ProjectionWithIncludes { Data = .., Includes = .. }`
    pub fn lambda(&self) -> &Lambda {
        &self.lambda
    }

    pub fn include_paths(&self) -> &[IncludePath] {
        &self.include_paths
    }

    /// Run the fused lambda against one loaded record.
    pub fn evaluate(&self, record: &Value) -> EvaluationResult<ProjectionWithIncludes> {
        let value = eval::evaluate(&self.lambda, record)?;
        ProjectionWithIncludes::from_value(value)
    }
}

/// Fuse `projection` and `includes` over one shared parameter.
///
/// # Errors
/// * `KeyMismatch` when the two lambdas are over different types, or the
///   include factory reaches a parameter it does not bind
/// * `UnsupportedIncludePathShape` when an include binding is not a pure
///   member chain
pub fn fuse(projection: &Lambda, includes: &Lambda) -> ExpressionResult<FusedProjection> {
    let parameter = projection.single_parameter()?;
    let include_parameter = includes.single_parameter()?;
    if parameter.ty() != include_parameter.ty() {
        return Err(ExpressionError::KeyMismatch {
            expected: parameter.ty().to_string(),
            found: include_parameter.ty().to_string(),
        });
    }

    let include_paths = flatten_include_paths(includes)?;
    let include_body =
        ParameterRebinder::new(include_parameter, parameter).visit(includes.body())?;

    let body = Expr::construct(
        TypeId::from(PROJECTION_WITH_INCLUDES),
        [
            (DATA_MEMBER, projection.body().clone()),
            (INCLUDES_MEMBER, include_body),
        ],
    );
    let lambda = Lambda::new(parameter.clone(), body);

    debug!(
        "[INCLUDE_FUSE] {} with {} include path(s): {}",
        parameter.ty(),
        include_paths.len(),
        include_paths
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(FusedProjection {
        lambda,
        include_paths,
    })
}

/// Evaluated form of a fused projection. Transient; callers keep `data`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectionWithIncludes {
    pub data: Value,
    pub includes: Value,
}

impl ProjectionWithIncludes {
    pub fn from_value(value: Value) -> EvaluationResult<Self> {
        match value {
            Value::Object(mut map) => {
                let data = map
                    .remove(DATA_MEMBER)
                    .ok_or_else(|| EvaluationError::MissingMember {
                        member: DATA_MEMBER.to_string(),
                    })?;
                let includes = map.remove(INCLUDES_MEMBER).unwrap_or(Value::Null);
                Ok(Self { data, includes })
            }
            other => Err(EvaluationError::type_mismatch(
                PROJECTION_WITH_INCLUDES,
                "object",
                eval::kind_of(&other),
            )),
        }
    }

    pub fn into_data(self) -> Value {
        self.data
    }
}
