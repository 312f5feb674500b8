//! Per-ticker evaluation of a bound expression.
//!
//! `None` means undefined: a missing row or value, a division by zero, a
//! non-finite result, a reduction without enough data. Undefined operands
//! make every operator undefined, comparisons and `&`/`|` included.

use std::cmp::Ordering;

use super::ast::{BinaryOp, Reduction};
use super::bind::BoundExpr;
use super::types::Scalar;
use crate::domain::{DataKind, TickerRecord, Value};

/// One ticker's records of the kind an expression reads.
#[derive(Debug, Clone, Copy)]
pub struct TickerView<'a> {
    kind: DataKind,
    records: &'a [TickerRecord],
}

impl<'a> TickerView<'a> {
    pub fn new(kind: DataKind, records: &'a [TickerRecord]) -> Self {
        Self { kind, records }
    }

    /// The record bare column references read: the latest Q4 row for
    /// quarter data, the latest row otherwise.
    fn current(&self) -> Option<&'a TickerRecord> {
        match self.kind {
            DataKind::Quarter => self.records.iter().rev().find(|r| r.period.is_annual()),
            _ => self.records.last(),
        }
    }

    /// Non-null Q4 values of a column as (fiscal_year, value), oldest first.
    fn annual_series(&self, index: usize) -> Vec<(i32, f64)> {
        self.records
            .iter()
            .filter(|r| r.period.is_annual())
            .filter_map(|r| Some((r.period.fiscal_year()?, r.value(index).as_number()?)))
            .collect()
    }
}

/// Evaluate for one ticker. `view` is `None` for expressions that read no
/// column.
pub fn evaluate(expr: &BoundExpr, view: Option<&TickerView<'_>>) -> Option<Scalar> {
    match expr {
        BoundExpr::Const(Scalar::Number(n)) => finite(*n),
        BoundExpr::Const(scalar) => Some(scalar.clone()),
        BoundExpr::Column(index) => cell(view?.current()?.value(*index)),
        BoundExpr::Reduce {
            func,
            index,
            years,
            strict,
        } => {
            let series = view?.annual_series(*index);
            let result = match func {
                Reduction::Mean => mean(series.iter().map(|(_, v)| *v)),
                Reduction::Cagr => cagr(&series, *years, *strict),
            };
            result.and_then(finite)
        }
        BoundExpr::Neg(inner) => match evaluate(inner, view)? {
            Scalar::Number(n) => finite(-n),
            _ => None,
        },
        BoundExpr::Binary { op, left, right } => {
            let l = evaluate(left, view)?;
            let r = evaluate(right, view)?;
            binary(*op, &l, &r)
        }
    }
}

fn finite(n: f64) -> Option<Scalar> {
    n.is_finite().then_some(Scalar::Number(n))
}

fn cell(value: &Value) -> Option<Scalar> {
    match value {
        Value::Null => None,
        Value::Number(n) => finite(*n),
        Value::Text(s) => Some(Scalar::Text(s.clone())),
        Value::Date(d) => Some(Scalar::Date(*d)),
    }
}

fn binary(op: BinaryOp, l: &Scalar, r: &Scalar) -> Option<Scalar> {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            let (a, b) = (l.as_number()?, r.as_number()?);
            let n = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                _ if b == 0.0 => return None,
                _ => a / b,
            };
            finite(n)
        }
        BinaryOp::And => Some(Scalar::Bool(l.as_bool()? && r.as_bool()?)),
        BinaryOp::Or => Some(Scalar::Bool(l.as_bool()? || r.as_bool()?)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne => {
            let ord = compare(l, r)?;
            let result = match op {
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                BinaryOp::Ge => ord != Ordering::Less,
                BinaryOp::Eq => ord == Ordering::Equal,
                _ => ord != Ordering::Equal,
            };
            Some(Scalar::Bool(result))
        }
    }
}

fn compare(l: &Scalar, r: &Scalar) -> Option<Ordering> {
    match (l, r) {
        (Scalar::Number(a), Scalar::Number(b)) => a.partial_cmp(b),
        (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
        (Scalar::Date(a), Scalar::Date(b)) => Some(a.cmp(b)),
        (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Arithmetic mean; `None` for an empty series.
pub fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Compound annual growth rate over a (fiscal_year, value) series sorted by
/// year, as a fraction: `(end / start)^(1 / years) - 1`.
///
/// The end point is the latest one. The start point is the earliest one, or
/// with `years` exactly `years` fiscal years before the end. Both values
/// must be positive. With `strict`, no value in the window may be lower than
/// the one before it.
pub fn cagr(series: &[(i32, f64)], years: Option<u32>, strict: bool) -> Option<f64> {
    let &(end_year, end) = series.last()?;
    let start_pos = match years {
        None => 0,
        Some(n) => {
            let start_year = end_year.checked_sub(i32::try_from(n).ok()?)?;
            series.iter().position(|(year, _)| *year == start_year)?
        }
    };
    let (start_year, start) = series[start_pos];

    let span = end_year - start_year;
    if span <= 0 || !(start > 0.0 && end > 0.0) {
        return None;
    }
    if strict && series[start_pos..].windows(2).any(|w| w[1].1 < w[0].1) {
        return None;
    }

    let rate = (end / start).powf(1.0 / span as f64) - 1.0;
    rate.is_finite().then_some(rate)
}
