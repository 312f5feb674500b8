//! Property tests.
//!
//! 1. Merge idempotence: writing the same batch twice leaves the file
//!    byte-identical and reports the second write as unchanged
//! 2. Merge order: the stored rows are sorted and hold the last value
//!    written for each period
//! 3. Parser robustness: arbitrary input never panics, and a parsed
//!    expression re-parses from its display form

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use fundlab_core::domain::{ColumnType, DataKind, TickerRecord, Value};
use fundlab_core::expr::parser::parse;
use fundlab_core::store::KindLocks;
use fundlab_core::{ColumnDefinition, ColumnSchema, TickerStore, WriteMode};
use tempfile::TempDir;

// ── Strategies (proptest) ────────────────────────────────────────────

fn quarter_schema() -> Arc<ColumnSchema> {
    Arc::new(
        ColumnSchema::new(
            DataKind::Quarter,
            vec![
                ColumnDefinition::new("fiscal_year", "FY", ColumnType::Number),
                ColumnDefinition::new("fiscal_quarter", "FQ", ColumnType::Number),
                ColumnDefinition::new("net_sales", "Sales", ColumnType::Number),
                ColumnDefinition::new("memo", "Memo", ColumnType::String),
            ],
        )
        .unwrap(),
    )
}

/// (year, quarter) → (sales, memo); keys are unique by construction.
fn arb_batch() -> impl Strategy<Value = BTreeMap<(i32, u8), (Option<i64>, Option<String>)>> {
    prop::collection::btree_map(
        (2000..2030i32, 1..=4u8),
        (
            prop::option::of(-1_000_000i64..1_000_000),
            prop::option::of("[a-zA-Z ,\"]{1,12}"),
        ),
        1..12,
    )
}

fn records(
    schema: &ColumnSchema,
    batch: &BTreeMap<(i32, u8), (Option<i64>, Option<String>)>,
) -> Vec<TickerRecord> {
    batch
        .iter()
        .map(|((year, quarter), (sales, memo))| {
            let values = vec![
                Value::Number(f64::from(*year)),
                Value::Number(f64::from(*quarter)),
                sales.map_or(Value::Null, |s| Value::Number(s as f64)),
                memo.clone().map_or(Value::Null, Value::Text),
            ];
            TickerRecord::new(schema, values).unwrap()
        })
        .collect()
}

fn store(tmp: &TempDir) -> TickerStore {
    TickerStore::new(tmp.path(), quarter_schema(), Arc::new(KindLocks::new()))
}

// ── 1. Merge idempotence ─────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn rewriting_a_batch_is_byte_identical(batch in arb_batch()) {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let schema = quarter_schema();

        let first = store.write("T", records(&schema, &batch), WriteMode::Merge).unwrap();
        prop_assert!(first.changed);
        let path = store.dir().join("T.csv");
        let before = fs::read(&path).unwrap();

        let second = store.write("T", records(&schema, &batch), WriteMode::Merge).unwrap();
        prop_assert!(!second.changed);
        prop_assert_eq!(second.replaced, batch.len());
        prop_assert_eq!(fs::read(&path).unwrap(), before);
    }
}

// ── 2. Merge order ───────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn merged_rows_are_sorted_and_last_write_wins(a in arb_batch(), b in arb_batch()) {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let schema = quarter_schema();

        store.write("T", records(&schema, &a), WriteMode::Merge).unwrap();
        store.write("T", records(&schema, &b), WriteMode::Merge).unwrap();

        let mut expected = a.clone();
        expected.extend(b.clone());

        let stored = store.read("T").unwrap();
        prop_assert_eq!(stored.len(), expected.len());
        prop_assert!(stored.windows(2).all(|w| w[0].period < w[1].period));
        prop_assert_eq!(stored, records(&schema, &expected));
    }
}

// ── 3. Parser robustness ─────────────────────────────────────────────

proptest! {
    #[test]
    fn parser_never_panics(src in "\\PC{0,40}") {
        let _ = parse(&src);
    }

    #[test]
    fn parser_never_panics_on_expression_alphabet(src in "[a-z0-9_ +\\-*/&|<>=!().,'\"]{0,40}") {
        let _ = parse(&src);
    }

    #[test]
    fn display_form_reparses(
        a in "[a-z][a-z_]{0,6}",
        b in "[a-z][a-z_]{0,6}",
        n in 0.0..1e6f64,
    ) {
        prop_assume!(!["cagr", "mean", "true", "false"].contains(&a.as_str()));
        prop_assume!(!["cagr", "mean", "true", "false"].contains(&b.as_str()));
        let src = format!("{a} / ({b} + {n}) > 1 | -{a} <= {b}");
        let ast = parse(&src).unwrap();
        let again = parse(&ast.to_string()).unwrap();
        prop_assert_eq!(ast, again);
    }
}
