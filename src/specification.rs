//! Composable specifications.
//!
//! A [`Specification`] is a predicate with two views: the lambda handed to a
//! data source, and `is_satisfied_by` for checking entities in memory. The
//! lambda is the only source; the callable form is compiled from the leaf
//! predicates and combined with the same short-circuit rules the tree uses,
//! so the two views cannot disagree.

use std::fmt;
use std::ops;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

use crate::errors::EvaluationResult;
use crate::expression::typed::DEFAULT_PARAMETER;
use crate::expression::{CompiledLambda, Expr, Parameter, Predicate};
use crate::model::Entity;

/// Anything a repository can filter by.
pub trait QueryCommand<T>: Send + Sync {
    fn predicate(&self) -> &Predicate<T>;
}

impl<T: Entity> QueryCommand<T> for Predicate<T> {
    fn predicate(&self) -> &Predicate<T> {
        self
    }
}

impl<T: Entity> QueryCommand<T> for Specification<T> {
    fn predicate(&self) -> &Predicate<T> {
        &self.predicate
    }
}

enum Node<T> {
    Leaf(OnceLock<CompiledLambda>),
    And(Arc<Specification<T>>, Arc<Specification<T>>),
    Or(Arc<Specification<T>>, Arc<Specification<T>>),
    Not(Arc<Specification<T>>),
}

/// Immutable, composable predicate over `T`.
pub struct Specification<T> {
    predicate: Predicate<T>,
    node: Node<T>,
}

impl<T: Entity> Specification<T> {
    pub fn new(predicate: Predicate<T>) -> Self {
        Self {
            predicate,
            node: Node::Leaf(OnceLock::new()),
        }
    }

    /// Specification built directly from a body, `x => body(x)`.
    pub fn from_fn(body: impl FnOnce(Expr) -> Expr) -> Self {
        Self::new(Predicate::new(body))
    }

    pub fn predicate(&self) -> &Predicate<T> {
        &self.predicate
    }

    pub fn and(self, other: Specification<T>) -> Self {
        let predicate = combine(&self.predicate, &other.predicate, Expr::and);
        Self {
            predicate,
            node: Node::And(Arc::new(self), Arc::new(other)),
        }
    }

    pub fn or(self, other: Specification<T>) -> Self {
        let predicate = combine(&self.predicate, &other.predicate, Expr::or);
        Self {
            predicate,
            node: Node::Or(Arc::new(self), Arc::new(other)),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        let parameter = Parameter::new(DEFAULT_PARAMETER, T::TYPE_NAME);
        let body = self.predicate.body_on(&parameter).not();
        Self {
            predicate: Predicate::from_parts(parameter, body),
            node: Node::Not(Arc::new(self)),
        }
    }

    /// Left operand of an `and`/`or` composite.
    pub fn left(&self) -> Option<&Specification<T>> {
        match &self.node {
            Node::And(left, _) | Node::Or(left, _) => Some(left.as_ref()),
            _ => None,
        }
    }

    /// Right operand of an `and`/`or` composite.
    pub fn right(&self) -> Option<&Specification<T>> {
        match &self.node {
            Node::And(_, right) | Node::Or(_, right) => Some(right.as_ref()),
            _ => None,
        }
    }

    /// Operand of a `not` composite.
    pub fn inner(&self) -> Option<&Specification<T>> {
        match &self.node {
            Node::Not(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }

    pub fn is_satisfied_by(&self, entity: &T) -> EvaluationResult<bool> {
        let record = serde_json::to_value(entity)?;
        self.is_satisfied_by_record(&record)
    }

    /// Check a record in its `serde_json::Value` form.
    pub fn is_satisfied_by_record(&self, record: &Value) -> EvaluationResult<bool> {
        match &self.node {
            Node::Leaf(compiled) => match compiled.get() {
                Some(compiled) => compiled.call_predicate(record),
                None => {
                    let fresh = CompiledLambda::compile(self.predicate.lambda())?;
                    let result = fresh.call_predicate(record);
                    let _ = compiled.set(fresh);
                    result
                }
            },
            Node::And(left, right) => Ok(left.is_satisfied_by_record(record)?
                && right.is_satisfied_by_record(record)?),
            Node::Or(left, right) => Ok(left.is_satisfied_by_record(record)?
                || right.is_satisfied_by_record(record)?),
            Node::Not(inner) => Ok(!inner.is_satisfied_by_record(record)?),
        }
    }
}

/// `x => left(x) op right(x)` over one fresh parameter.
fn combine<T: Entity>(
    left: &Predicate<T>,
    right: &Predicate<T>,
    op: impl FnOnce(Expr, Expr) -> Expr,
) -> Predicate<T> {
    let parameter = Parameter::new(DEFAULT_PARAMETER, T::TYPE_NAME);
    let body = op(left.body_on(&parameter), right.body_on(&parameter));
    Predicate::from_parts(parameter, body)
}

impl<T: Entity> From<Predicate<T>> for Specification<T> {
    fn from(predicate: Predicate<T>) -> Self {
        Self::new(predicate)
    }
}

impl<T: Entity> ops::BitAnd for Specification<T> {
    type Output = Specification<T>;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.and(rhs)
    }
}

impl<T: Entity> ops::BitOr for Specification<T> {
    type Output = Specification<T>;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.or(rhs)
    }
}

impl<T: Entity> ops::Not for Specification<T> {
    type Output = Specification<T>;

    fn not(self) -> Self::Output {
        Specification::not(self)
    }
}

impl<T> fmt::Debug for Specification<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.node {
            Node::Leaf(_) => "Leaf",
            Node::And(..) => "And",
            Node::Or(..) => "Or",
            Node::Not(_) => "Not",
        };
        f.debug_struct("Specification")
            .field("kind", &kind)
            .field("predicate", &self.predicate)
            .finish()
    }
}

impl<T> fmt::Display for Specification<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.predicate, f)
    }
}
