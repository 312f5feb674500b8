use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::debug;

use super::ast::Expr;
use super::bind::{bind, Bound};
use super::eval::{evaluate, TickerView};
use super::parser::parse;
use super::types::{ExprType, Scalar};
use super::ExpressionError;
use crate::dataset::DataSet;
use crate::domain::DataKind;

/// A parsed, bound, type-checked expression.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    source: String,
    ast: Expr,
    bound: Bound,
}

impl CompiledExpr {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    pub fn ty(&self) -> ExprType {
        self.bound.ty
    }

    /// The data kind the expression reads; `None` for a constant.
    pub fn kind(&self) -> Option<DataKind> {
        self.bound.kind
    }
}

/// Resolves expressions to per-ticker values over a `DataSet`.
///
/// Tickers are evaluated independently and in parallel. Results only hold
/// tickers whose value is defined.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionResolver<'a> {
    data: &'a DataSet,
}

impl<'a> ExpressionResolver<'a> {
    pub fn new(data: &'a DataSet) -> Self {
        Self { data }
    }

    /// Parse, bind and type-check. Nothing is evaluated.
    pub fn compile(&self, source: &str) -> Result<CompiledExpr, ExpressionError> {
        let ast = parse(source)?;
        let bound = bind(&ast, self.data)?;
        debug!(expr = %ast, kind = ?bound.kind, ty = %bound.ty, "compiled expression");
        Ok(CompiledExpr {
            source: source.to_string(),
            ast,
            bound,
        })
    }

    /// Evaluate for each ticker. Undefined tickers are absent from the result.
    pub fn evaluate(&self, expr: &CompiledExpr, tickers: &[String]) -> BTreeMap<String, Scalar> {
        let bound = &expr.bound;
        let Some(kind) = bound.kind else {
            return tickers
                .iter()
                .filter_map(|t| Some((t.clone(), evaluate(&bound.expr, None)?)))
                .collect();
        };
        let Some(table) = self.data.table(kind) else {
            return BTreeMap::new();
        };

        tickers
            .par_iter()
            .filter_map(|ticker| {
                let view = TickerView::new(kind, table.records(ticker)?);
                let value = evaluate(&bound.expr, Some(&view))?;
                Some((ticker.clone(), value))
            })
            .collect()
    }

    /// Compile and evaluate in one step.
    pub fn resolve(
        &self,
        source: &str,
        tickers: &[String],
    ) -> Result<BTreeMap<String, Scalar>, ExpressionError> {
        let expr = self.compile(source)?;
        Ok(self.evaluate(&expr, tickers))
    }

    /// Resolve an axis or size formula; it must be numeric.
    pub fn resolve_numbers(
        &self,
        source: &str,
        tickers: &[String],
    ) -> Result<BTreeMap<String, f64>, ExpressionError> {
        let expr = self.compile_as(source, ExprType::Number)?;
        Ok(self
            .evaluate(&expr, tickers)
            .into_iter()
            .filter_map(|(t, v)| Some((t, v.as_number()?)))
            .collect())
    }

    /// Resolve a filter predicate; it must be boolean.
    pub fn resolve_filter(
        &self,
        source: &str,
        tickers: &[String],
    ) -> Result<BTreeMap<String, bool>, ExpressionError> {
        let expr = self.compile_as(source, ExprType::Bool)?;
        Ok(self
            .evaluate(&expr, tickers)
            .into_iter()
            .filter_map(|(t, v)| Some((t, v.as_bool()?)))
            .collect())
    }

    /// `compile`, then require the expression to have type `ty`.
    pub fn compile_as(&self, source: &str, ty: ExprType) -> Result<CompiledExpr, ExpressionError> {
        let expr = self.compile(source)?;
        if expr.ty() != ty {
            return Err(ExpressionError::Type(format!(
                "expected a {ty} expression, '{source}' is {}",
                expr.ty()
            )));
        }
        Ok(expr)
    }
}
