//! Typed wrappers over [`Lambda`].
//!
//! The AST itself is untyped; these wrappers pin the parameter type to an
//! entity type (and the result type for projections) so repository
//! signatures read like `Predicate<Order>` rather than a bare lambda.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::errors::{EvaluationResult, ExpressionError, ExpressionResult};
use crate::model::{Entity, TypeId};

use super::ast::{Expr, Lambda, Parameter};
use super::eval;
use super::includes::{flatten_include_paths, IncludePath};
use super::mapping::TypeMapping;
use super::rewrite::rewrite;

/// Parameter name used by the closure-style constructors.
pub const DEFAULT_PARAMETER: &str = "x";

fn checked_root<T: Entity>(lambda: Lambda) -> ExpressionResult<Lambda> {
    let parameter = lambda.single_parameter()?;
    if parameter.ty() != &TypeId::of::<T>() {
        return Err(ExpressionError::unsupported_shape(format!(
            "lambda parameter '{}' is of type {}, expected {}",
            parameter.name(),
            parameter.ty(),
            T::TYPE_NAME
        )));
    }
    Ok(lambda)
}

/// Rewrite and check that the mapping lands on `U`.
fn rewrite_onto<U: Entity>(lambda: &Lambda, mapping: &TypeMapping) -> ExpressionResult<Lambda> {
    checked_root::<U>(rewrite(lambda, mapping)?)
}

/// Boolean-valued lambda over `T`.
pub struct Predicate<T> {
    lambda: Lambda,
    _marker: PhantomData<fn(&T) -> bool>,
}

impl<T: Entity> Predicate<T> {
    /// `x => body(x)`
    pub fn new(body: impl FnOnce(Expr) -> Expr) -> Self {
        Self {
            lambda: Lambda::build(DEFAULT_PARAMETER, T::TYPE_NAME, body),
            _marker: PhantomData,
        }
    }

    /// Wrap an existing lambda; its parameter must be of type `T`.
    pub fn from_lambda(lambda: Lambda) -> ExpressionResult<Self> {
        Ok(Self {
            lambda: checked_root::<T>(lambda)?,
            _marker: PhantomData,
        })
    }

    /// `x => true`
    pub fn always() -> Self {
        Self {
            lambda: Lambda::always(T::TYPE_NAME),
            _marker: PhantomData,
        }
    }

    pub fn lambda(&self) -> &Lambda {
        &self.lambda
    }

    pub fn into_lambda(self) -> Lambda {
        self.lambda
    }

    /// Assemble from a parameter already known to be of type `T`.
    pub(crate) fn from_parts(parameter: Parameter, body: Expr) -> Self {
        Self {
            lambda: Lambda::new(parameter, body),
            _marker: PhantomData,
        }
    }

    /// The body with the lambda's parameter replaced by `parameter`.
    pub(crate) fn body_on(&self, parameter: &Parameter) -> Expr {
        match self.lambda.parameters() {
            [own] => self.lambda.body().substitute_parameter(own, parameter),
            _ => self.lambda.body().clone(),
        }
    }

    /// Interpret against one entity.
    pub fn evaluate(&self, entity: &T) -> EvaluationResult<bool> {
        let record = serde_json::to_value(entity)?;
        eval::evaluate_predicate(&self.lambda, &record)
    }

    /// Re-target onto `U` through `mapping`.
    pub fn rewrite<U: Entity>(&self, mapping: &TypeMapping) -> ExpressionResult<Predicate<U>> {
        Ok(Predicate {
            lambda: rewrite_onto::<U>(&self.lambda, mapping)?,
            _marker: PhantomData,
        })
    }
}

/// Lambda over `T` producing an `R`.
pub struct Projection<T, R> {
    lambda: Lambda,
    _marker: PhantomData<fn(&T) -> R>,
}

impl<T: Entity, R: DeserializeOwned> Projection<T, R> {
    pub fn new(body: impl FnOnce(Expr) -> Expr) -> Self {
        Self {
            lambda: Lambda::build(DEFAULT_PARAMETER, T::TYPE_NAME, body),
            _marker: PhantomData,
        }
    }

    pub fn from_lambda(lambda: Lambda) -> ExpressionResult<Self> {
        Ok(Self {
            lambda: checked_root::<T>(lambda)?,
            _marker: PhantomData,
        })
    }

    pub fn lambda(&self) -> &Lambda {
        &self.lambda
    }

    pub fn evaluate(&self, entity: &T) -> EvaluationResult<R> {
        let record = serde_json::to_value(entity)?;
        let value = eval::evaluate(&self.lambda, &record)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn rewrite<U: Entity>(&self, mapping: &TypeMapping) -> ExpressionResult<Projection<U, R>> {
        Ok(Projection {
            lambda: rewrite_onto::<U>(&self.lambda, mapping)?,
            _marker: PhantomData,
        })
    }
}

/// Include-path factory over `T`: a member chain or a construction of
/// member chains.
pub struct IncludeFactory<T> {
    lambda: Lambda,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Entity> IncludeFactory<T> {
    pub fn new(body: impl FnOnce(Expr) -> Expr) -> Self {
        Self {
            lambda: Lambda::build(DEFAULT_PARAMETER, T::TYPE_NAME, body),
            _marker: PhantomData,
        }
    }

    pub fn from_lambda(lambda: Lambda) -> ExpressionResult<Self> {
        Ok(Self {
            lambda: checked_root::<T>(lambda)?,
            _marker: PhantomData,
        })
    }

    pub fn lambda(&self) -> &Lambda {
        &self.lambda
    }

    /// Flattened include paths, in binding order.
    pub fn paths(&self) -> ExpressionResult<Vec<IncludePath>> {
        flatten_include_paths(&self.lambda)
    }

    pub fn rewrite<U: Entity>(&self, mapping: &TypeMapping) -> ExpressionResult<IncludeFactory<U>> {
        Ok(IncludeFactory {
            lambda: rewrite_onto::<U>(&self.lambda, mapping)?,
            _marker: PhantomData,
        })
    }
}

macro_rules! lambda_wrapper_impls {
    ($name:ident < $($param:ident),+ >) => {
        impl<$($param),+> Clone for $name<$($param),+> {
            fn clone(&self) -> Self {
                Self {
                    lambda: self.lambda.clone(),
                    _marker: PhantomData,
                }
            }
        }

        impl<$($param),+> fmt::Debug for $name<$($param),+> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.lambda).finish()
            }
        }

        impl<$($param),+> fmt::Display for $name<$($param),+> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.lambda, f)
            }
        }
    };
}

lambda_wrapper_impls!(Predicate<T>);
lambda_wrapper_impls!(Projection<T, R>);
lambda_wrapper_impls!(IncludeFactory<T>);
