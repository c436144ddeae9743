//! Expression to sea-query translation.
//!
//! Covers the subset a single-table SELECT can express: scalar members of
//! the root parameter, constants, comparisons, boolean logic, arithmetic,
//! concatenation and string matching. Anything else (navigation members,
//! constructions inside predicates, calls, `+` over two members) is
//! reported as [`DataSourceError::Unsupported`] so the caller can decide
//! what to do.
//!
//! Generated SQL keeps the evaluator's value rules: `NULL` equals `NULL`,
//! conditions never evaluate to `NULL`, and string matching is
//! case-sensitive.

use sea_orm::sea_query::{
    Alias, Asterisk, BinOper, DeleteStatement, Expr as SqlExpr, Func, InsertStatement, Query,
    SelectStatement, SimpleExpr, UnOper,
};
use sea_orm::DatabaseBackend;
use serde_json::Value;

use crate::errors::{DataSourceError, DataSourceResult};
use crate::expression::{BinaryOp, Expr, Lambda, Parameter, UnaryOp};
use crate::model::TypeDescriptor;

use super::KeyValues;

/// Alias of the single column produced by a member projection.
pub const VALUE_COLUMN: &str = "value";
/// Alias of the column produced by a count query.
pub const COUNT_COLUMN: &str = "count";

/// Translates lambdas over one entity type into sea-query statements for
/// one backend.
pub struct SqlTranslator<'a> {
    descriptor: &'a TypeDescriptor,
    backend: DatabaseBackend,
}

impl<'a> SqlTranslator<'a> {
    pub fn new(descriptor: &'a TypeDescriptor, backend: DatabaseBackend) -> Self {
        Self {
            descriptor,
            backend,
        }
    }

    /// `SELECT <scalar members> FROM <table> [WHERE <predicate>]`
    pub fn select(&self, predicate: &Lambda) -> DataSourceResult<SelectStatement> {
        let mut query = Query::select();
        query
            .columns(
                self.descriptor
                    .scalar_members()
                    .map(|m| Alias::new(m.name.as_str())),
            )
            .from(Alias::new(self.descriptor.table.as_str()));
        self.apply_filter(&mut query, predicate)?;
        Ok(query)
    }

    /// `SELECT COUNT(*) AS count FROM <table> [WHERE <predicate>]`
    pub fn count(&self, predicate: &Lambda) -> DataSourceResult<SelectStatement> {
        let mut query = Query::select();
        query
            .expr_as(Func::count(SqlExpr::col(Asterisk)), Alias::new(COUNT_COLUMN))
            .from(Alias::new(self.descriptor.table.as_str()));
        self.apply_filter(&mut query, predicate)?;
        Ok(query)
    }

    /// Projection pushed into the SELECT list.
    ///
    /// A construction becomes one aliased column per binding; any other body
    /// becomes a single column aliased [`VALUE_COLUMN`].
    pub fn project(&self, predicate: &Lambda, projection: &Lambda) -> DataSourceResult<SelectStatement> {
        let parameter = self.root_parameter(projection)?;
        let mut query = Query::select();
        match projection.body() {
            Expr::Construct { bindings, .. } => {
                if bindings.is_empty() {
                    return Err(DataSourceError::unsupported(
                        "project",
                        "construction without bindings",
                    ));
                }
                for (name, binding) in bindings {
                    query.expr_as(self.translate(binding, parameter)?, Alias::new(name.as_str()));
                }
            }
            body => {
                query.expr_as(self.translate(body, parameter)?, Alias::new(VALUE_COLUMN));
            }
        }
        query.from(Alias::new(self.descriptor.table.as_str()));
        self.apply_filter(&mut query, predicate)?;
        Ok(query)
    }

    /// `INSERT INTO <table> (<scalar members>) VALUES (...)`
    pub fn insert(&self, record: &Value) -> DataSourceResult<InsertStatement> {
        let mut columns = Vec::new();
        let mut values = Vec::new();
        for member in self.descriptor.scalar_members() {
            let value = record.get(&member.name).unwrap_or(&Value::Null);
            columns.push(Alias::new(member.name.as_str()));
            values.push(SimpleExpr::Value(literal(value)?));
        }
        let mut insert = Query::insert();
        insert
            .into_table(Alias::new(self.descriptor.table.as_str()))
            .columns(columns)
            .values(values)
            .map_err(|e| DataSourceError::translation(e.to_string()))?;
        Ok(insert)
    }

    /// `DELETE FROM <table> WHERE <key members> = <key values>`
    pub fn delete(&self, key: &KeyValues) -> DataSourceResult<DeleteStatement> {
        let predicate = key.to_predicate(self.descriptor)?;
        let parameter = self.root_parameter(&predicate)?;
        let condition = self.translate(predicate.body(), parameter)?;
        let mut delete = Query::delete();
        delete
            .from_table(Alias::new(self.descriptor.table.as_str()))
            .and_where(condition);
        Ok(delete)
    }

    fn apply_filter(&self, query: &mut SelectStatement, predicate: &Lambda) -> DataSourceResult<()> {
        let parameter = self.root_parameter(predicate)?;
        if !predicate.is_always_true() {
            query.and_where(self.condition(predicate.body(), parameter)?);
        }
        Ok(())
    }

    fn root_parameter<'l>(&self, lambda: &'l Lambda) -> DataSourceResult<&'l Parameter> {
        let parameter = lambda
            .single_parameter()
            .map_err(|e| DataSourceError::translation(e.to_string()))?;
        if parameter.ty() != &self.descriptor.id {
            return Err(DataSourceError::translation(format!(
                "lambda is over {}, expected {}",
                parameter.ty(),
                self.descriptor.id
            )));
        }
        Ok(parameter)
    }

    /// Translate one expression node.
    pub fn translate(&self, expr: &Expr, parameter: &Parameter) -> DataSourceResult<SimpleExpr> {
        match expr {
            Expr::Member { base, member, .. } => match base.as_ref() {
                Expr::Parameter(p) if p.id() == parameter.id() => {
                    let descriptor = self.descriptor.member(member).ok_or_else(|| {
                        DataSourceError::translation(format!(
                            "{} has no member '{member}'",
                            self.descriptor.id
                        ))
                    })?;
                    if descriptor.kind.is_navigation() {
                        return Err(DataSourceError::unsupported(
                            "translate",
                            format!("navigation member '{member}' needs a join"),
                        ));
                    }
                    Ok(SqlExpr::col(Alias::new(member.as_str())).into())
                }
                _ => Err(DataSourceError::unsupported(
                    "translate",
                    format!("member chain '{expr}' needs a join"),
                )),
            },
            Expr::Constant(value) => Ok(SimpleExpr::Value(literal(value)?)),
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => Ok(SimpleExpr::Unary(
                UnOper::Not,
                Box::new(self.condition(operand, parameter)?),
            )),
            Expr::Binary { op, left, right } => self.binary(*op, left, right, parameter),
            Expr::Parameter(_) => Err(DataSourceError::unsupported(
                "translate",
                "a bare parameter has no column",
            )),
            Expr::Construct { ty, .. } => Err(DataSourceError::unsupported(
                "translate",
                format!("construction of {ty} inside an expression"),
            )),
            Expr::Call { method, .. } => Err(DataSourceError::unsupported(
                "translate",
                format!("method call '{method}'"),
            )),
        }
    }

    /// Translate an expression in boolean position.
    ///
    /// Every condition is two-valued: a `NULL` member reads as false, as it
    /// does in the evaluator.
    fn condition(&self, expr: &Expr, parameter: &Parameter) -> DataSourceResult<SimpleExpr> {
        let translated = self.translate(expr, parameter)?;
        Ok(match expr {
            Expr::Member { .. } | Expr::Constant(Value::Null) => or_false(translated),
            _ => translated,
        })
    }

    fn binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        parameter: &Parameter,
    ) -> DataSourceResult<SimpleExpr> {
        // null comparisons must become IS [NOT] NULL
        if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
            let operand = match (left, right) {
                (other, Expr::Constant(Value::Null)) | (Expr::Constant(Value::Null), other) => {
                    Some(other)
                }
                _ => None,
            };
            if let Some(operand) = operand {
                let operand = SqlExpr::expr(self.translate(operand, parameter)?);
                return Ok(if op == BinaryOp::Eq {
                    operand.is_null()
                } else {
                    operand.is_not_null()
                });
            }
        }

        if op.is_string_match() {
            return self.string_match(op, left, right, parameter);
        }

        match op {
            BinaryOp::And | BinaryOp::Or => {
                let operator = if op == BinaryOp::And {
                    BinOper::And
                } else {
                    BinOper::Or
                };
                Ok(SimpleExpr::Binary(
                    Box::new(self.condition(left, parameter)?),
                    operator,
                    Box::new(self.condition(right, parameter)?),
                ))
            }
            BinaryOp::Eq | BinaryOp::Ne => Ok(self.null_safe_equal(
                self.translate(left, parameter)?,
                self.translate(right, parameter)?,
                op == BinaryOp::Ne,
            )),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let operator = match op {
                    BinaryOp::Lt => BinOper::SmallerThan,
                    BinaryOp::Le => BinOper::SmallerThanOrEqual,
                    BinaryOp::Gt => BinOper::GreaterThan,
                    _ => BinOper::GreaterThanOrEqual,
                };
                Ok(or_false(SimpleExpr::Binary(
                    Box::new(self.translate(left, parameter)?),
                    operator,
                    Box::new(self.translate(right, parameter)?),
                )))
            }
            BinaryOp::Add => match static_kind(left).or_else(|| static_kind(right)) {
                Some(Kind::Text) => Ok(self.concat(
                    self.translate(left, parameter)?,
                    self.translate(right, parameter)?,
                )),
                Some(Kind::Number) => Ok(SimpleExpr::Binary(
                    Box::new(self.translate(left, parameter)?),
                    BinOper::Add,
                    Box::new(self.translate(right, parameter)?),
                )),
                None => Err(DataSourceError::unsupported(
                    "translate",
                    format!("cannot tell whether '{left} + {right}' adds or concatenates"),
                )),
            },
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                let operator = match op {
                    BinaryOp::Sub => BinOper::Sub,
                    BinaryOp::Mul => BinOper::Mul,
                    _ => BinOper::Div,
                };
                Ok(SimpleExpr::Binary(
                    Box::new(self.translate(left, parameter)?),
                    operator,
                    Box::new(self.translate(right, parameter)?),
                ))
            }
            BinaryOp::Contains | BinaryOp::StartsWith | BinaryOp::EndsWith => {
                Err(DataSourceError::translation(format!("unexpected {op}")))
            }
        }
    }

    /// `=` / `<>` where `NULL` equals `NULL` and nothing else.
    fn null_safe_equal(&self, left: SimpleExpr, right: SimpleExpr, negated: bool) -> SimpleExpr {
        let operator = match (self.backend, negated) {
            (DatabaseBackend::Sqlite, false) => BinOper::Is,
            (DatabaseBackend::Sqlite, true) => BinOper::IsNot,
            (DatabaseBackend::Postgres, false) => BinOper::Custom("IS NOT DISTINCT FROM"),
            (DatabaseBackend::Postgres, true) => BinOper::Custom("IS DISTINCT FROM"),
            (DatabaseBackend::MySql, _) => BinOper::Custom("<=>"),
        };
        let equal = SimpleExpr::Binary(Box::new(left), operator, Box::new(right));
        if negated && self.backend == DatabaseBackend::MySql {
            SimpleExpr::Unary(UnOper::Not, Box::new(equal))
        } else {
            equal
        }
    }

    fn concat(&self, left: SimpleExpr, right: SimpleExpr) -> SimpleExpr {
        match self.backend {
            DatabaseBackend::MySql => Func::cust(Alias::new("CONCAT"))
                .args([left, right])
                .into(),
            DatabaseBackend::Postgres | DatabaseBackend::Sqlite => {
                SimpleExpr::Binary(Box::new(left), BinOper::Custom("||"), Box::new(right))
            }
        }
    }

    /// Case-sensitive `contains` / `starts_with` / `ends_with`.
    ///
    /// LIKE folds ASCII case on SQLite and under MySQL's default collations,
    /// so matching goes through position and substring functions instead.
    fn string_match(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        parameter: &Parameter,
    ) -> DataSourceResult<SimpleExpr> {
        let Expr::Constant(Value::String(needle)) = right else {
            return Err(DataSourceError::unsupported(
                "translate",
                format!("{op} needs a string literal on the right"),
            ));
        };
        let haystack = self.translate(left, parameter)?;
        if needle.is_empty() {
            return Ok(SqlExpr::expr(haystack).is_not_null());
        }
        let haystack = match self.backend {
            DatabaseBackend::MySql => Func::cast_as(haystack, Alias::new("BINARY")).into(),
            DatabaseBackend::Postgres | DatabaseBackend::Sqlite => haystack,
        };
        // MySQL slices the binary cast, so lengths are in bytes there
        let length = match self.backend {
            DatabaseBackend::MySql => needle.len(),
            DatabaseBackend::Postgres | DatabaseBackend::Sqlite => needle.chars().count(),
        };
        let length = i32::try_from(length).map_err(|_| {
            DataSourceError::unsupported("translate", format!("{op} needle too long"))
        })?;
        let needle = SimpleExpr::Value(needle.clone().into());

        let matched = match op {
            BinaryOp::Contains => {
                let position = match self.backend {
                    DatabaseBackend::Postgres => "strpos",
                    DatabaseBackend::MySql | DatabaseBackend::Sqlite => "instr",
                };
                SqlExpr::expr(Func::cust(Alias::new(position)).args([haystack, needle]))
                    .gt(0)
            }
            BinaryOp::StartsWith => {
                let prefix: SimpleExpr = match self.backend {
                    DatabaseBackend::Sqlite => Func::cust(Alias::new("substr"))
                        .args([haystack, 1.into(), length.into()])
                        .into(),
                    DatabaseBackend::MySql | DatabaseBackend::Postgres => {
                        Func::cust(Alias::new("left"))
                            .args([haystack, length.into()])
                            .into()
                    }
                };
                SqlExpr::expr(prefix).eq(needle)
            }
            _ => {
                let suffix: SimpleExpr = match self.backend {
                    DatabaseBackend::Sqlite => Func::cust(Alias::new("substr"))
                        .args([haystack, (-length).into()])
                        .into(),
                    DatabaseBackend::MySql | DatabaseBackend::Postgres => {
                        Func::cust(Alias::new("right"))
                            .args([haystack, length.into()])
                            .into()
                    }
                };
                SqlExpr::expr(suffix).eq(needle)
            }
        };
        Ok(or_false(matched))
    }
}

/// `COALESCE(condition, FALSE)`
fn or_false(condition: SimpleExpr) -> SimpleExpr {
    Func::coalesce([condition, SimpleExpr::Constant(false.into())]).into()
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Kind {
    Text,
    Number,
}

/// Scalar kind of an expression when it can be read off the tree alone.
/// Members carry no scalar type, so they are unknown.
fn static_kind(expr: &Expr) -> Option<Kind> {
    match expr {
        Expr::Constant(Value::String(_)) => Some(Kind::Text),
        Expr::Constant(Value::Number(_)) => Some(Kind::Number),
        Expr::Binary {
            op: BinaryOp::Add,
            left,
            right,
        } => static_kind(left).or_else(|| static_kind(right)),
        Expr::Binary {
            op: BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div,
            ..
        } => Some(Kind::Number),
        _ => None,
    }
}

/// JSON scalar to SQL value.
fn literal(value: &Value) -> DataSourceResult<sea_orm::Value> {
    match value {
        Value::Null => Ok(sea_orm::Value::String(None)),
        Value::Bool(b) => Ok((*b).into()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i.into())
            } else if let Some(f) = n.as_f64() {
                Ok(f.into())
            } else {
                Err(DataSourceError::translation(format!("number {n} out of range")))
            }
        }
        Value::String(s) => Ok(s.clone().into()),
        Value::Array(_) | Value::Object(_) => Err(DataSourceError::unsupported(
            "translate",
            "composite literal",
        )),
    }
}
