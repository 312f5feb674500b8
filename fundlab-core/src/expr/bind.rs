//! Binding: resolve column names against the loaded schemas, pick the one
//! data kind the expression reads, and type-check it.

use super::ast::{BinaryOp, Expr, Literal, Reduction};
use super::types::{ExprType, Scalar};
use super::ExpressionError;
use crate::dataset::DataSet;
use crate::domain::{ColumnType, DataKind, Value};
use crate::schema::ColumnSchema;

/// Plottable kinds, most preferred first.
const PLOT_KINDS: [DataKind; 2] = [DataKind::Indicator, DataKind::Quarter];

/// Expression with column names replaced by schema positions.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundExpr {
    Const(Scalar),
    Column(usize),
    Neg(Box<BoundExpr>),
    Binary {
        op: BinaryOp,
        left: Box<BoundExpr>,
        right: Box<BoundExpr>,
    },
    Reduce {
        func: Reduction,
        index: usize,
        years: Option<u32>,
        strict: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub expr: BoundExpr,
    pub ty: ExprType,
    /// `None` when the expression references no column.
    pub kind: Option<DataKind>,
}

/// Bind a parsed expression against the tables in `data`.
pub fn bind(expr: &Expr, data: &DataSet) -> Result<Bound, ExpressionError> {
    let kind = select_kind(expr, data)?;
    let binder = Binder {
        schema: kind.and_then(|k| data.schema(k)).map(|s| s.as_ref()),
    };
    let (bound, ty) = binder.bind(expr)?;
    Ok(Bound {
        expr: bound,
        ty,
        kind,
    })
}

/// The single kind whose schema defines every referenced column.
///
/// Reductions only apply to quarter data. When quarter and indicator both
/// define every column, indicator wins.
fn select_kind(expr: &Expr, data: &DataSet) -> Result<Option<DataKind>, ExpressionError> {
    let columns = expr.columns();
    if columns.is_empty() {
        return Ok(None);
    }

    let defines = |kind: DataKind, column: &str| {
        data.schema(kind)
            .is_some_and(|schema| schema.contains(column))
    };

    let mut allowed: Vec<DataKind> = if expr.has_call() {
        vec![DataKind::Quarter]
    } else {
        PLOT_KINDS.to_vec()
    };

    for column in columns {
        let defining: Vec<DataKind> = PLOT_KINDS
            .into_iter()
            .filter(|kind| defines(*kind, column))
            .collect();

        if defining.is_empty() {
            if let Some(kind) = [DataKind::Company, DataKind::Daily]
                .into_iter()
                .find(|kind| defines(*kind, column))
            {
                return Err(ExpressionError::NotPlottable {
                    column: column.to_string(),
                    kind,
                });
            }
            return Err(ExpressionError::UnknownColumn(column.to_string()));
        }

        let remaining: Vec<DataKind> = allowed
            .iter()
            .copied()
            .filter(|kind| defining.contains(kind))
            .collect();
        if remaining.is_empty() {
            return Err(ExpressionError::CrossKind {
                first: allowed[0],
                second: defining[0],
                column: column.to_string(),
            });
        }
        allowed = remaining;
    }

    Ok(allowed.first().copied())
}

struct Binder<'a> {
    schema: Option<&'a ColumnSchema>,
}

impl Binder<'_> {
    fn column(&self, name: &str) -> Result<(usize, ColumnType), ExpressionError> {
        let schema = self
            .schema
            .ok_or_else(|| ExpressionError::UnknownColumn(name.to_string()))?;
        let index = schema
            .position(name)
            .ok_or_else(|| ExpressionError::UnknownColumn(name.to_string()))?;
        Ok((index, schema.columns()[index].dtype))
    }

    fn bind(&self, expr: &Expr) -> Result<(BoundExpr, ExprType), ExpressionError> {
        match expr {
            Expr::Literal(Literal::Number(n)) => {
                Ok((BoundExpr::Const(Scalar::Number(*n)), ExprType::Number))
            }
            Expr::Literal(Literal::Text(s)) => {
                Ok((BoundExpr::Const(Scalar::Text(s.clone())), ExprType::Text))
            }
            Expr::Literal(Literal::Bool(b)) => {
                Ok((BoundExpr::Const(Scalar::Bool(*b)), ExprType::Bool))
            }
            Expr::Column(name) => {
                let (index, dtype) = self.column(name)?;
                Ok((BoundExpr::Column(index), ExprType::of_column(dtype)))
            }
            Expr::Call(call) => {
                let (index, dtype) = self.column(&call.column)?;
                if dtype != ColumnType::Number {
                    return Err(ExpressionError::Type(format!(
                        "{}() needs a number column, '{}' holds {}",
                        call.func.name(),
                        call.column,
                        ExprType::of_column(dtype)
                    )));
                }
                let bound = BoundExpr::Reduce {
                    func: call.func,
                    index,
                    years: call.years,
                    strict: call.strict,
                };
                Ok((bound, ExprType::Number))
            }
            Expr::Neg(inner) => {
                let (bound, ty) = self.bind(inner)?;
                if ty != ExprType::Number {
                    return Err(ExpressionError::Type(format!("cannot negate a {ty} value")));
                }
                Ok((BoundExpr::Neg(Box::new(bound)), ExprType::Number))
            }
            Expr::Binary { op, left, right } => {
                let (left, lt) = self.bind(left)?;
                let (right, rt) = self.bind(right)?;
                self.bind_binary(*op, left, lt, right, rt)
            }
        }
    }

    fn bind_binary(
        &self,
        op: BinaryOp,
        mut left: BoundExpr,
        mut lt: ExprType,
        mut right: BoundExpr,
        mut rt: ExprType,
    ) -> Result<(BoundExpr, ExprType), ExpressionError> {
        let mismatch = |lt: ExprType, rt: ExprType| {
            ExpressionError::Type(format!(
                "'{}' cannot combine {lt} and {rt}",
                op.symbol()
            ))
        };

        let ty = if op.is_arithmetic() {
            if lt != ExprType::Number || rt != ExprType::Number {
                return Err(mismatch(lt, rt));
            }
            ExprType::Number
        } else if op.is_logical() {
            if lt != ExprType::Bool || rt != ExprType::Bool {
                return Err(mismatch(lt, rt));
            }
            ExprType::Bool
        } else {
            // A text literal compared with a date reads as a date.
            if lt == ExprType::Date && rt == ExprType::Text {
                right = date_literal(right)?;
                rt = ExprType::Date;
            } else if lt == ExprType::Text && rt == ExprType::Date {
                left = date_literal(left)?;
                lt = ExprType::Date;
            }
            if lt != rt || (op.is_ordering() && lt == ExprType::Bool) {
                return Err(mismatch(lt, rt));
            }
            ExprType::Bool
        };

        let bound = BoundExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        Ok((bound, ty))
    }
}

fn date_literal(expr: BoundExpr) -> Result<BoundExpr, ExpressionError> {
    match expr {
        BoundExpr::Const(Scalar::Text(s)) => match Value::from_cell(&s, ColumnType::Date) {
            Ok(Value::Date(d)) => Ok(BoundExpr::Const(Scalar::Date(d))),
            _ => Err(ExpressionError::Type(format!("'{s}' is not a YYYY-MM-DD date"))),
        },
        _ => Err(ExpressionError::Type(
            "dates compare only with dates or date literals".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::ConsolidatedTable;
    use crate::expr::parser::parse;
    use crate::schema::ColumnDefinition;
    use std::sync::Arc;

    fn table(kind: DataKind, columns: &[(&str, ColumnType)]) -> ConsolidatedTable {
        let schema = ColumnSchema::new(
            kind,
            columns
                .iter()
                .map(|(k, t)| ColumnDefinition::new(*k, *k, *t))
                .collect(),
        )
        .unwrap();
        ConsolidatedTable::new(Arc::new(schema))
    }

    fn data() -> DataSet {
        DataSet::new()
            .with_table(table(
                DataKind::Quarter,
                &[
                    ("fiscal_year", ColumnType::Number),
                    ("fiscal_quarter", ColumnType::Number),
                    ("net_sales", ColumnType::Number),
                    ("market_capital", ColumnType::Number),
                    ("submit_date", ColumnType::Date),
                ],
            ))
            .with_table(table(
                DataKind::Indicator,
                &[
                    ("pbr", ColumnType::Number),
                    ("market_capital", ColumnType::Number),
                    ("market", ColumnType::Category),
                ],
            ))
            .with_table(table(
                DataKind::Company,
                &[("company_name_en", ColumnType::String)],
            ))
    }

    fn bind_src(src: &str) -> Result<Bound, ExpressionError> {
        bind(&parse(src).unwrap(), &data())
    }

    #[test]
    fn picks_the_kind_defining_every_column() {
        assert_eq!(bind_src("net_sales / 2").unwrap().kind, Some(DataKind::Quarter));
        assert_eq!(bind_src("pbr * 2").unwrap().kind, Some(DataKind::Indicator));
        // Defined by both: indicator is preferred...
        assert_eq!(bind_src("market_capital").unwrap().kind, Some(DataKind::Indicator));
        // ...unless another column or a reduction pins quarter.
        assert_eq!(
            bind_src("market_capital / net_sales").unwrap().kind,
            Some(DataKind::Quarter)
        );
        assert_eq!(
            bind_src("mean(market_capital)").unwrap().kind,
            Some(DataKind::Quarter)
        );
        assert_eq!(bind_src("1 + 2").unwrap().kind, None);
    }

    #[test]
    fn mixing_kinds_is_rejected() {
        assert_eq!(
            bind_src("pbr / net_sales").unwrap_err(),
            ExpressionError::CrossKind {
                first: DataKind::Indicator,
                second: DataKind::Quarter,
                column: "net_sales".into(),
            }
        );
        assert!(matches!(
            bind_src("cagr(net_sales) > pbr"),
            Err(ExpressionError::CrossKind { .. })
        ));
    }

    #[test]
    fn unknown_and_unplottable_columns() {
        assert_eq!(
            bind_src("ebitda").unwrap_err(),
            ExpressionError::UnknownColumn("ebitda".into())
        );
        assert_eq!(
            bind_src("company_name_en == 'x'").unwrap_err(),
            ExpressionError::NotPlottable {
                column: "company_name_en".into(),
                kind: DataKind::Company,
            }
        );
    }

    #[test]
    fn static_types() {
        assert_eq!(bind_src("pbr < 1 & market == 'Prime'").unwrap().ty, ExprType::Bool);
        assert_eq!(bind_src("-pbr").unwrap().ty, ExprType::Number);
        for bad in [
            "market + 1",
            "pbr & true",
            "pbr < 'a'",
            "true < false",
            "-market",
            "mean(submit_date)",
        ] {
            assert!(
                matches!(bind_src(bad), Err(ExpressionError::Type(_))),
                "{bad} should not type-check"
            );
        }
    }

    #[test]
    fn text_literals_compare_with_dates() {
        let bound = bind_src("submit_date >= '2020-01-01'").unwrap();
        assert_eq!(bound.ty, ExprType::Bool);
        assert!(matches!(
            bound.expr,
            BoundExpr::Binary { ref right, .. } if matches!(**right, BoundExpr::Const(Scalar::Date(_)))
        ));
        assert!(matches!(
            bind_src("submit_date > 'soon'"),
            Err(ExpressionError::Type(_))
        ));
    }
}
