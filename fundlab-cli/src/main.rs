//! FundLab CLI: ingest, rebuild, list and plot commands.
//!
//! Commands:
//! - `columns`: list the column definitions of a data kind
//! - `ingest`: run a fetch against a directory of saved API payloads
//! - `rebuild`: rebuild a kind's consolidated snapshot
//! - `categories`: list sector categories with ticker counts
//! - `plot`: resolve X/Y/size/filter expressions and print plot rows

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use fundlab_core::fetch::{FetchWindow, LogProgress};
use fundlab_core::{
    CategorySelection, DataKind, EngineConfig, FetchSummary, PayloadDirSource, PlotRequest,
    RebuildReport, Session,
};

#[derive(Parser)]
#[command(
    name = "fundlab",
    about = "FundLab CLI: fundamentals consolidation and plot expressions"
)]
struct Cli {
    /// Data root. Overrides `root_dir` from the config file.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the column definitions of a data kind.
    Columns {
        /// company, quarter, indicator or daily.
        kind: DataKind,
    },
    /// Store per-ticker records from saved API payloads, then rebuild.
    Ingest {
        kind: DataKind,

        /// Directory holding `{kind}.json` payload files.
        #[arg(long)]
        payloads: PathBuf,

        /// Tickers to ingest. Defaults to every ticker in the payload.
        #[arg(long, num_args = 1..)]
        tickers: Vec<String>,

        /// Replace stored files instead of skipping stored tickers.
        #[arg(long, default_value_t = false)]
        overwrite: bool,

        /// First fiscal year to keep (quarter data).
        #[arg(long)]
        start_year: Option<i32>,

        /// Last fiscal year to keep (quarter data).
        #[arg(long)]
        end_year: Option<i32>,

        /// Worker threads. Defaults to `fetch_threads` from the config.
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Rebuild a kind's consolidated snapshot from its per-ticker files.
    Rebuild { kind: DataKind },
    /// List sector categories and their ticker counts.
    Categories,
    /// Print one plot row per ticker.
    Plot {
        /// X axis expression.
        #[arg(long)]
        x: String,

        /// Y axis expression.
        #[arg(long)]
        y: String,

        /// Point size expression.
        #[arg(long)]
        size: Option<String>,

        /// Multiplier applied to every point size.
        #[arg(long, default_value_t = 1.0)]
        size_scale: f64,

        /// Boolean filter expression.
        #[arg(long)]
        filter: Option<String>,

        /// Restrict to sectors (repeatable).
        #[arg(long = "category")]
        categories: Vec<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let session = open_session(cli.root, cli.config.as_ref())?;
    debug!(root = %session.root().display(), "session opened");

    match cli.command {
        Commands::Columns { kind } => run_columns(&session, kind),
        Commands::Ingest {
            kind,
            payloads,
            tickers,
            overwrite,
            start_year,
            end_year,
            threads,
        } => {
            let window = FetchWindow {
                start_year,
                end_year,
            };
            run_ingest(&session, kind, payloads, tickers, overwrite, window, threads)
        }
        Commands::Rebuild { kind } => run_rebuild(&session, kind),
        Commands::Categories => run_categories(&session),
        Commands::Plot {
            x,
            y,
            size,
            size_scale,
            filter,
            categories,
            format,
        } => {
            let mut request = PlotRequest::new(x, y)
                .size_scale(size_scale)
                .categories(CategorySelection::only(categories));
            if let Some(size) = size {
                request = request.size(size);
            }
            if let Some(filter) = filter {
                request = request.filter(filter);
            }
            run_plot(&session, &request, format)
        }
    }
}

/// Logs go to stderr so plot rows on stdout stay machine-readable.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "fundlab=debug,fundlab_core=debug"
    } else {
        "fundlab=info,fundlab_core=info"
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn open_session(root: Option<PathBuf>, config_path: Option<&PathBuf>) -> Result<Session> {
    let mut config = match config_path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(root) = root {
        config.root_dir = root;
    }
    Ok(Session::new(config)?)
}

fn run_columns(session: &Session, kind: DataKind) -> Result<()> {
    let schema = session.schema(kind)?;
    let mut out = io::stdout().lock();
    writeln!(out, "{:<28} {:<8} {:<10} label", "key", "dtype", "unit")?;
    for col in schema.columns() {
        let dtype = serde_json::to_value(col.dtype)?;
        writeln!(
            out,
            "{:<28} {:<8} {:<10} {}",
            col.key,
            dtype.as_str().unwrap_or_default(),
            col.unit.as_deref().unwrap_or("-"),
            col.label
        )?;
    }
    Ok(())
}

fn run_ingest(
    session: &Session,
    kind: DataKind,
    payloads: PathBuf,
    tickers: Vec<String>,
    overwrite: bool,
    window: FetchWindow,
    threads: Option<usize>,
) -> Result<()> {
    if !payloads.is_dir() {
        bail!("payload directory does not exist: {}", payloads.display());
    }
    let mut options = session
        .fetch_options(kind)
        .tickers(tickers)
        .overwrite(overwrite)
        .window(window);
    if let Some(threads) = threads {
        options = options.threads(threads);
    }

    let source = Arc::new(PayloadDirSource::new(payloads));
    let summary = session.fetch_task(source, options).run(&LogProgress)?;
    print_fetch_summary(&summary);

    if !summary.failed.is_empty() {
        for (ticker, err) in &summary.failed {
            eprintln!("Error for {ticker}: {err}");
        }
        std::process::exit(1);
    }
    Ok(())
}

fn print_fetch_summary(summary: &FetchSummary) {
    println!("Kind:      {}", summary.kind);
    println!("Requested: {}", summary.total);
    println!("Written:   {}", summary.written);
    println!("Skipped:   {}", summary.skipped);
    println!("Failed:    {}", summary.failed.len());
    if summary.stopped {
        println!("Stopped:   {} not attempted", summary.not_attempted);
    }
    if let Some(report) = &summary.rebuild {
        print_rebuild_report(report);
    }
}

fn run_rebuild(session: &Session, kind: DataKind) -> Result<()> {
    let (_, report) = session.rebuild(kind)?;
    print_rebuild_report(&report);
    Ok(())
}

fn print_rebuild_report(report: &RebuildReport) {
    println!(
        "Snapshot:  {} tickers, {} rows (hash {})",
        report.loaded.len(),
        report.rows,
        &report.meta.data_hash[..report.meta.data_hash.len().min(12)]
    );
    for (ticker, reason) in &report.skipped {
        println!("  skipped {ticker}: {reason}");
    }
}

fn run_categories(session: &Session) -> Result<()> {
    let data = session.load_dataset()?;
    if data.table(DataKind::Company).is_none() {
        bail!("no company data under {}", session.root().display());
    }
    let index = session.categories(&data);
    let mut out = io::stdout().lock();
    for (name, count) in index.counts() {
        writeln!(out, "{count:>5}  {name}")?;
    }
    writeln!(out, "{:>5}  (classified tickers)", index.ticker_count())?;
    Ok(())
}

fn run_plot(session: &Session, request: &PlotRequest, format: OutputFormat) -> Result<()> {
    let data = session.load_dataset()?;
    let plot = session.plot(&data, request)?;

    match format {
        OutputFormat::Csv => plot.write_csv(io::stdout().lock())?,
        OutputFormat::Json => {
            let mut out = io::stdout().lock();
            serde_json::to_writer_pretty(&mut out, &plot)?;
            writeln!(out)?;
        }
    }

    eprintln!(
        "{} points, {} filtered out, {} dropped for missing values",
        plot.points.len(),
        plot.filtered_out,
        plot.dropped_count()
    );
    Ok(())
}
