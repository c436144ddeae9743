//! Predicate / projection AST.
//!
//! Trees are immutable values: every transformation in this crate builds a
//! new tree and leaves its input untouched, so one predicate can be rewritten
//! against several target types.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::errors::{ExpressionError, ExpressionResult};
use crate::model::{Entity, TypeId};

static NEXT_PARAMETER_ID: AtomicU64 = AtomicU64::new(1);

/// A bound lambda input.
///
/// Identity is the allocation id, not the name: two parameters named `x`
/// of the same type are different parameters unless they share an id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Parameter {
    id: u64,
    name: Arc<str>,
    ty: TypeId,
}

impl Parameter {
    /// Allocate a fresh parameter.
    pub fn new(name: impl AsRef<str>, ty: impl Into<TypeId>) -> Self {
        Self {
            id: NEXT_PARAMETER_ID.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name.as_ref()),
            ty: ty.into(),
        }
    }

    pub fn of<T: Entity>(name: impl AsRef<str>) -> Self {
        Self::new(name, TypeId::of::<T>())
    }

    /// Fresh parameter with the same name and a (possibly) different type.
    pub fn retyped(&self, ty: TypeId) -> Self {
        Self::new(&*self.name, ty)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &TypeId {
        &self.ty
    }
}

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum BinaryOp {
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "contains")]
    Contains,
    #[strum(serialize = "starts_with")]
    StartsWith,
    #[strum(serialize = "ends_with")]
    EndsWith,
}

impl BinaryOp {
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
        )
    }

    pub fn is_string_match(self) -> bool {
        matches!(
            self,
            BinaryOp::Contains | BinaryOp::StartsWith | BinaryOp::EndsWith
        )
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum UnaryOp {
    #[strum(serialize = "!")]
    Not,
}

/// Expression node.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Parameter(Parameter),
    /// Field/property read; `base` is a parameter or another member access.
    Member {
        base: Box<Expr>,
        member: String,
        declaring_type: TypeId,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Constant(Value),
    /// Object/record construction; bindings keep their order.
    Construct {
        ty: TypeId,
        bindings: Vec<(String, Expr)>,
    },
    /// Opaque method call. Representable so it can be rejected loudly.
    Call {
        method: String,
        target: Option<Box<Expr>>,
        arguments: Vec<Expr>,
    },
}

/// Conversion into an expression operand.
pub trait IntoExpr {
    fn into_expr(self) -> Expr;
}

impl IntoExpr for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

impl IntoExpr for &Parameter {
    fn into_expr(self) -> Expr {
        Expr::Parameter(self.clone())
    }
}

impl IntoExpr for Value {
    fn into_expr(self) -> Expr {
        Expr::Constant(self)
    }
}

macro_rules! constant_operand {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoExpr for $ty {
                fn into_expr(self) -> Expr {
                    Expr::Constant(Value::from(self))
                }
            }
        )*
    };
}

constant_operand!(&str, String, bool, i32, i64, u32, u64, f64);

impl Expr {
    pub fn param(parameter: &Parameter) -> Self {
        Expr::Parameter(parameter.clone())
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant(value.into())
    }

    pub fn null() -> Self {
        Expr::Constant(Value::Null)
    }

    /// Member access with an explicit declaring type.
    pub fn member(self, name: impl Into<String>, declaring_type: impl Into<TypeId>) -> Self {
        Expr::Member {
            base: Box::new(self),
            member: name.into(),
            declaring_type: declaring_type.into(),
        }
    }

    /// Member access declared on entity type `D`.
    pub fn field<D: Entity>(self, name: impl Into<String>) -> Self {
        self.member(name, TypeId::of::<D>())
    }

    pub fn construct<I, S>(ty: impl Into<TypeId>, bindings: I) -> Self
    where
        I: IntoIterator<Item = (S, Expr)>,
        S: Into<String>,
    {
        Expr::Construct {
            ty: ty.into(),
            bindings: bindings.into_iter().map(|(n, e)| (n.into(), e)).collect(),
        }
    }

    pub fn call(method: impl Into<String>, target: Option<Expr>, arguments: Vec<Expr>) -> Self {
        Expr::Call {
            method: method.into(),
            target: target.map(Box::new),
            arguments,
        }
    }

    pub fn binary(self, op: BinaryOp, rhs: impl IntoExpr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(rhs.into_expr()),
        }
    }

    pub fn and(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::And, rhs)
    }

    pub fn or(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Or, rhs)
    }

    pub fn eq(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }

    pub fn ne(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Ne, rhs)
    }

    pub fn lt(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Lt, rhs)
    }

    pub fn le(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Le, rhs)
    }

    pub fn gt(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Gt, rhs)
    }

    pub fn ge(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Ge, rhs)
    }

    pub fn add(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Add, rhs)
    }

    pub fn sub(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Sub, rhs)
    }

    pub fn mul(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Mul, rhs)
    }

    pub fn div(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Div, rhs)
    }

    pub fn contains(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Contains, rhs)
    }

    pub fn starts_with(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::StartsWith, rhs)
    }

    pub fn ends_with(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::EndsWith, rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }

    /// Flatten a chained member access into its root and the member names
    /// in root-first order. `None` when `self` is not a member access.
    pub fn member_chain(&self) -> Option<(&Expr, Vec<&str>)> {
        let mut names = Vec::new();
        let mut current = self;
        while let Expr::Member { base, member, .. } = current {
            names.push(member.as_str());
            current = base;
        }
        if names.is_empty() {
            return None;
        }
        names.reverse();
        Some((current, names))
    }

    /// New tree with every occurrence of `from` replaced by `to`.
    pub fn substitute_parameter(&self, from: &Parameter, to: &Parameter) -> Expr {
        match self {
            Expr::Parameter(p) if p.id == from.id => Expr::Parameter(to.clone()),
            Expr::Parameter(p) => Expr::Parameter(p.clone()),
            Expr::Member {
                base,
                member,
                declaring_type,
            } => Expr::Member {
                base: Box::new(base.substitute_parameter(from, to)),
                member: member.clone(),
                declaring_type: declaring_type.clone(),
            },
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(left.substitute_parameter(from, to)),
                right: Box::new(right.substitute_parameter(from, to)),
            },
            Expr::Unary { op, operand } => Expr::Unary {
                op: *op,
                operand: Box::new(operand.substitute_parameter(from, to)),
            },
            Expr::Constant(v) => Expr::Constant(v.clone()),
            Expr::Construct { ty, bindings } => Expr::Construct {
                ty: ty.clone(),
                bindings: bindings
                    .iter()
                    .map(|(n, e)| (n.clone(), e.substitute_parameter(from, to)))
                    .collect(),
            },
            Expr::Call {
                method,
                target,
                arguments,
            } => Expr::Call {
                method: method.clone(),
                target: target
                    .as_ref()
                    .map(|t| Box::new(t.substitute_parameter(from, to))),
                arguments: arguments
                    .iter()
                    .map(|a| a.substitute_parameter(from, to))
                    .collect(),
            },
        }
    }

    /// Node count, used for log summaries.
    pub fn node_count(&self) -> usize {
        1 + match self {
            Expr::Parameter(_) | Expr::Constant(_) => 0,
            Expr::Member { base, .. } => base.node_count(),
            Expr::Binary { left, right, .. } => left.node_count() + right.node_count(),
            Expr::Unary { operand, .. } => operand.node_count(),
            Expr::Construct { bindings, .. } => bindings.iter().map(|(_, e)| e.node_count()).sum(),
            Expr::Call {
                target, arguments, ..
            } => {
                target.as_ref().map_or(0, |t| t.node_count())
                    + arguments.iter().map(Expr::node_count).sum::<usize>()
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Parameter(p) => f.write_str(p.name()),
            Expr::Member { base, member, .. } => write!(f, "{base}.{member}"),
            Expr::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            Expr::Unary { op, operand } => write!(f, "{op}{operand}"),
            Expr::Constant(v) => write!(f, "{v}"),
            Expr::Construct { ty, bindings } => {
                write!(f, "new {ty} {{ ")?;
                for (i, (name, e)) in bindings.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name} = {e}")?;
                }
                f.write_str(" }")
            }
            Expr::Call {
                method,
                target,
                arguments,
            } => {
                if let Some(t) = target {
                    write!(f, "{t}.")?;
                }
                write!(f, "{method}(")?;
                for (i, a) in arguments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{a}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// `(parameters) => body`. The unit of translation.
#[derive(Clone, Debug, PartialEq)]
pub struct Lambda {
    parameters: Vec<Parameter>,
    body: Expr,
}

impl Lambda {
    pub fn new(parameter: Parameter, body: Expr) -> Self {
        Self {
            parameters: vec![parameter],
            body,
        }
    }

    /// Lambda with any number of parameters. Only single-parameter lambdas
    /// can be rewritten, fused or evaluated.
    pub fn with_parameters(parameters: Vec<Parameter>, body: Expr) -> Self {
        Self { parameters, body }
    }

    /// Build a single-parameter lambda from a body factory.
    pub fn build(
        name: impl AsRef<str>,
        ty: impl Into<TypeId>,
        body: impl FnOnce(Expr) -> Expr,
    ) -> Self {
        let parameter = Parameter::new(name, ty);
        let body = body(Expr::param(&parameter));
        Self::new(parameter, body)
    }

    /// `x => true` over `ty`.
    pub fn always(ty: impl Into<TypeId>) -> Self {
        Self::build("x", ty, |_| Expr::constant(true))
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn body(&self) -> &Expr {
        &self.body
    }

    /// The only parameter, or `UnsupportedExpressionShape`.
    pub fn single_parameter(&self) -> ExpressionResult<&Parameter> {
        match self.parameters.as_slice() {
            [only] => Ok(only),
            other => Err(ExpressionError::unsupported_shape(format!(
                "lambda must have exactly one parameter, found {}",
                other.len()
            ))),
        }
    }

    /// Whether the body is the constant `true`.
    pub fn is_always_true(&self) -> bool {
        matches!(self.body, Expr::Constant(Value::Bool(true)))
    }

    /// Structural equality that ignores parameter identity: parameters are
    /// matched positionally and compared by name and type.
    pub fn structurally_eq(&self, other: &Lambda) -> bool {
        if self.parameters.len() != other.parameters.len() {
            return false;
        }
        let mut correspondence = HashMap::new();
        for (a, b) in self.parameters.iter().zip(&other.parameters) {
            if a.name != b.name || a.ty != b.ty {
                return false;
            }
            correspondence.insert(a.id, b.id);
        }
        shape_eq(&self.body, &other.body, &correspondence)
    }
}

fn shape_eq(a: &Expr, b: &Expr, params: &HashMap<u64, u64>) -> bool {
    match (a, b) {
        (Expr::Parameter(pa), Expr::Parameter(pb)) => {
            pa.name == pb.name
                && pa.ty == pb.ty
                && params.get(&pa.id).copied().unwrap_or(pa.id) == pb.id
        }
        (
            Expr::Member {
                base: ba,
                member: ma,
                declaring_type: da,
            },
            Expr::Member {
                base: bb,
                member: mb,
                declaring_type: db,
            },
        ) => ma == mb && da == db && shape_eq(ba, bb, params),
        (
            Expr::Binary {
                op: oa,
                left: la,
                right: ra,
            },
            Expr::Binary {
                op: ob,
                left: lb,
                right: rb,
            },
        ) => oa == ob && shape_eq(la, lb, params) && shape_eq(ra, rb, params),
        (Expr::Unary { op: oa, operand: xa }, Expr::Unary { op: ob, operand: xb }) => {
            oa == ob && shape_eq(xa, xb, params)
        }
        (Expr::Constant(va), Expr::Constant(vb)) => va == vb,
        (
            Expr::Construct {
                ty: ta,
                bindings: ba,
            },
            Expr::Construct {
                ty: tb,
                bindings: bb,
            },
        ) => {
            ta == tb
                && ba.len() == bb.len()
                && ba
                    .iter()
                    .zip(bb)
                    .all(|((na, ea), (nb, eb))| na == nb && shape_eq(ea, eb, params))
        }
        (
            Expr::Call {
                method: ma,
                target: ta,
                arguments: aa,
            },
            Expr::Call {
                method: mb,
                target: tb,
                arguments: ab,
            },
        ) => {
            let targets = match (ta, tb) {
                (Some(x), Some(y)) => shape_eq(x, y, params),
                (None, None) => true,
                _ => false,
            };
            ma == mb
                && targets
                && aa.len() == ab.len()
                && aa.iter().zip(ab).all(|(x, y)| shape_eq(x, y, params))
        }
        _ => false,
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parameters.as_slice() {
            [only] => write!(f, "{} => {}", only.name(), self.body),
            many => {
                let names: Vec<&str> = many.iter().map(Parameter::name).collect();
                write!(f, "({}) => {}", names.join(", "), self.body)
            }
        }
    }
}
