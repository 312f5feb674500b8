//! Criterion benchmarks for expression resolution.
//!
//! Benchmarks:
//! 1. Parse + bind of a filter predicate
//! 2. Bare quarter column over many tickers (latest Q4 lookup)
//! 3. `cagr` over many tickers (annual series reduction)
//! 4. Full plot build with size and filter

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use fundlab_core::domain::{ColumnType, DataKind, TickerRecord, Value};
use fundlab_core::plot::{PlotDataBuilder, PlotOptions};
use fundlab_core::{
    ColumnDefinition, ColumnSchema, ConsolidatedTable, DataSet, ExpressionResolver, PlotRequest,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_data(tickers: usize, years: i32) -> (DataSet, Vec<String>) {
    let quarter = Arc::new(
        ColumnSchema::new(
            DataKind::Quarter,
            vec![
                ColumnDefinition::new("fiscal_year", "FY", ColumnType::Number),
                ColumnDefinition::new("fiscal_quarter", "FQ", ColumnType::Number),
                ColumnDefinition::new("net_sales", "Sales", ColumnType::Number),
                ColumnDefinition::new("operating_income", "OI", ColumnType::Number),
            ],
        )
        .unwrap(),
    );
    let indicator = Arc::new(
        ColumnSchema::new(
            DataKind::Indicator,
            vec![
                ColumnDefinition::new("pbr", "PBR", ColumnType::Number),
                ColumnDefinition::new("market_capital", "Cap", ColumnType::Number),
            ],
        )
        .unwrap(),
    );

    let mut q_table = ConsolidatedTable::new(Arc::clone(&quarter));
    let mut i_table = ConsolidatedTable::new(Arc::clone(&indicator));
    let mut names = Vec::with_capacity(tickers);

    for t in 0..tickers {
        let ticker = format!("{}", 1000 + t);
        let base = 100.0 + (t as f64 * 0.37).sin() * 50.0;
        let mut rows = Vec::new();
        for y in 0..years {
            for q in 1..=4u8 {
                let sales = base * (1.0 + 0.03 * f64::from(y)) + f64::from(q);
                let values = vec![
                    Value::Number(f64::from(2000 + y)),
                    Value::Number(f64::from(q)),
                    Value::Number(sales),
                    Value::Number(sales * 0.1),
                ];
                rows.push(TickerRecord::new(&quarter, values).unwrap());
            }
        }
        q_table.insert(ticker.as_str(), rows).unwrap();

        let values = vec![
            Value::Number(0.5 + (t % 20) as f64 * 0.1),
            Value::Number(base * 1000.0),
        ];
        i_table
            .insert(ticker.as_str(), vec![TickerRecord::new(&indicator, values).unwrap()])
            .unwrap();
        names.push(ticker);
    }

    let data = DataSet::new().with_table(q_table).with_table(i_table);
    (data, names)
}

// ── 1. Compile ───────────────────────────────────────────────────────

fn bench_compile(c: &mut Criterion) {
    let (data, _) = make_data(10, 5);
    let resolver = ExpressionResolver::new(&data);
    c.bench_function("compile_filter", |b| {
        b.iter(|| {
            resolver
                .compile(black_box(
                    "operating_income / net_sales > 0.05 & cagr(net_sales, 3) >= 0.02",
                ))
                .unwrap()
        })
    });
}

// ── 2/3. Resolve over tickers ────────────────────────────────────────

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    for &n in &[100usize, 1000, 4000] {
        let (data, tickers) = make_data(n, 10);
        let resolver = ExpressionResolver::new(&data);

        let latest = resolver.compile("operating_income / net_sales").unwrap();
        group.bench_with_input(BenchmarkId::new("latest_q4", n), &tickers, |b, t| {
            b.iter(|| resolver.evaluate(black_box(&latest), t))
        });

        let growth = resolver.compile("cagr(net_sales, 5)").unwrap();
        group.bench_with_input(BenchmarkId::new("cagr", n), &tickers, |b, t| {
            b.iter(|| resolver.evaluate(black_box(&growth), t))
        });
    }
    group.finish();
}

// ── 4. Plot build ────────────────────────────────────────────────────

fn bench_plot(c: &mut Criterion) {
    let (data, _) = make_data(2000, 10);
    let builder = PlotDataBuilder::new(&data, PlotOptions::default());
    let request = PlotRequest::new("pbr", "market_capital")
        .size("market_capital")
        .size_scale(0.001)
        .filter("pbr < 1.5");
    c.bench_function("plot_build_2000", |b| {
        b.iter(|| builder.build(black_box(&request)).unwrap())
    });
}

criterion_group!(benches, bench_compile, bench_resolve, bench_plot);
criterion_main!(benches);
