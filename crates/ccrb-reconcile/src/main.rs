//! CLI entry point for the record reconciliation pipeline.

use anyhow::{Result, anyhow};
use ccrb_reconcile::{
    Pipeline, PipelineConfig, PipelineResult, ReconciliationSummary, TableKind, TableSet,
};
use chrono::NaiveDate;
use clap::Parser;
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Civilian-complaint record reconciliation pipeline",
    long_about = "Reconciles the four civilian-complaint publication tables into a single\n\
                  analysis-ready feature table with zero unresolved missing values.\n\n\
                  EXAMPLES:\n  \
                  # Reconcile with the default ten-year window\n  \
                  reconcile --complaints complaints.csv --allegations allegations.csv \\\n      \
                  --penalties penalties.csv --officers officers.csv\n\n  \
                  # Pin the reference date for reproducible runs\n  \
                  reconcile ... --reference-date 2023-12-31\n\n  \
                  # Preview input issues without reconciling\n  \
                  reconcile ... --dry-run"
)]
struct Args {
    /// Path to the complaints CSV file
    #[arg(long)]
    complaints: String,

    /// Path to the allegations CSV file
    #[arg(long)]
    allegations: String,

    /// Path to the penalties CSV file
    #[arg(long)]
    penalties: String,

    /// Path to the officers roster CSV file
    #[arg(long)]
    officers: String,

    /// Output directory for results
    #[arg(short, long, default_value = "./outputs")]
    output: String,

    /// Output file name (without extension)
    #[arg(long, default_value = "reconciled_complaints")]
    output_name: String,

    /// Recency window in years over the incident date
    #[arg(long, default_value = "10")]
    window_years: u32,

    /// Reference date for the recency window (YYYY-MM-DD)
    ///
    /// Defaults to today when not given; pin it for reproducible runs.
    #[arg(long)]
    reference_date: Option<String>,

    /// Keep rows whose incident date could not be parsed
    #[arg(long)]
    include_unknown_dates: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings and errors)
    #[arg(short, long)]
    quiet: bool,

    /// Output the JSON summary to stdout instead of the human-readable one
    ///
    /// Disables all progress logs; only the summary JSON is written.
    /// Useful for piping to other tools: `... --json | jq .final_rows`
    #[arg(long)]
    json: bool,

    /// Write the JSON summary to the output directory
    ///
    /// The report is saved as <output_name>_report.json
    #[arg(short = 'r', long)]
    emit_report: bool,

    /// Preview per-table issues without reconciling
    ///
    /// Shows row counts, blank and date normalization, per-column missingness,
    /// and the steps a full run would take.
    #[arg(long)]
    dry_run: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    // Validate input files before reading anything
    for kind in TableKind::ALL {
        let path = input_path(&args, kind);
        if !Path::new(path).exists() {
            return Err(anyhow!("{} file not found: {}", kind.name(), path));
        }
    }

    if !args.dry_run && !Path::new(&args.output).exists() {
        std::fs::create_dir_all(&args.output)?;
        info!("Created output directory: {}", args.output);
    }

    let tables = load_tables(&args)?;

    if args.dry_run {
        return run_dry_run(&args, &tables);
    }

    let config = build_config(&args)?;
    let pipeline = Pipeline::builder().config(config).build()?;

    match pipeline.run(tables) {
        Ok(result) => handle_pipeline_output(result, &args),
        Err(e) => Err(anyhow!("Reconciliation failed: {}", e)),
    }
}

fn input_path(args: &Args, kind: TableKind) -> &str {
    match kind {
        TableKind::Complaints => &args.complaints,
        TableKind::Allegations => &args.allegations,
        TableKind::Penalties => &args.penalties,
        TableKind::Officers => &args.officers,
    }
}

/// Load all four input tables.
fn load_tables(args: &Args) -> Result<TableSet> {
    info!("Loading complaints from: {}", args.complaints);
    let complaints = load_csv_with_fallback(&args.complaints)?;
    info!("Loading allegations from: {}", args.allegations);
    let allegations = load_csv_with_fallback(&args.allegations)?;
    info!("Loading penalties from: {}", args.penalties);
    let penalties = load_csv_with_fallback(&args.penalties)?;
    info!("Loading officers from: {}", args.officers);
    let officers = load_csv_with_fallback(&args.officers)?;

    info!(
        "Tables loaded: complaints {:?}, allegations {:?}, penalties {:?}, officers {:?}",
        complaints.shape(),
        allegations.shape(),
        penalties.shape(),
        officers.shape()
    );

    Ok(TableSet {
        complaints,
        allegations,
        penalties,
        officers,
    })
}

/// Load a CSV with a quote-handling fallback.
fn load_csv_with_fallback(path: &str) -> Result<DataFrame> {
    // Standard loading with quote handling
    match CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(Some(b'"')))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => {
            debug!("Quoted parse failed for {}: {}", path, e);
        }
    }

    // Published extracts occasionally carry stray quotes; retry without
    // quote handling before giving up.
    CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(None))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()
        .map_err(|e| anyhow!("Could not parse {}: {}", path, e))
}

/// Build the pipeline configuration from CLI flags.
fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .recency_years(args.window_years)
        .include_unknown_incident_dates(args.include_unknown_dates);

    if let Some(ref raw) = args.reference_date {
        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|e| anyhow!("Invalid --reference-date '{}': {}", raw, e))?;
        builder = builder.reference_date(date);
    }

    Ok(builder.build()?)
}

/// Run dry-run mode - show what a full run would do without reconciling.
///
/// Note: This function uses `println!` intentionally for user-facing CLI
/// output. Unlike logging (`info!`, `debug!`), this output should always be
/// visible regardless of log level settings since it's the primary purpose
/// of --dry-run.
fn run_dry_run(args: &Args, tables: &TableSet) -> Result<()> {
    use ccrb_reconcile::{PipelineStage, ResolutionRule, SchemaNormalizer};

    println!("\n{}", "=".repeat(80));
    println!("DRY RUN - Preview of reconciliation inputs");
    println!("{}\n", "=".repeat(80));

    for kind in TableKind::ALL {
        let raw = tables.get(kind);
        let (normalized, audits) = SchemaNormalizer::normalize(raw.clone(), kind)?;

        let blanks: usize = audits
            .iter()
            .filter(|a| matches!(a.rule, ResolutionRule::BlankNormalized))
            .map(|a| a.values_affected)
            .sum();
        let unknown_dates: usize = audits
            .iter()
            .filter(|a| matches!(a.rule, ResolutionRule::UnknownDate))
            .map(|a| a.values_affected)
            .sum();
        let duplicates = normalized.height()
            - normalized
                .unique_stable::<&str, &str>(None, UniqueKeepStrategy::First, None)?
                .height();

        println!("{}", kind.name().to_uppercase());
        println!("{}", "-".repeat(40));
        println!("  File: {}", input_path(args, kind));
        println!("  Rows: {}", raw.height());
        println!(
            "  Columns: {} ({} after normalization)",
            raw.width(),
            normalized.width()
        );
        println!("  Blank cells nulled: {}", blanks);
        println!("  Unparseable dates: {}", unknown_dates);
        println!("  Exact duplicate rows: {}", duplicates);
        println!();

        println!("  {:<38} {:>8} {:>10}", "Column", "Nulls", "Missing %");
        println!("  {}", "-".repeat(58));
        let height = normalized.height().max(1);
        for name in normalized.get_column_names() {
            let nulls = normalized.column(name.as_str())?.null_count();
            println!(
                "  {:<38} {:>8} {:>9.1}%",
                truncate_str(name.as_str(), 37),
                nulls,
                (nulls as f64 / height as f64) * 100.0
            );
        }
        println!();
    }

    println!("PROPOSED STEPS");
    println!("{}", "-".repeat(40));
    println!("  1. {}", PipelineStage::SchemaNormalization.display_name());
    println!("  2. {}", PipelineStage::Deduplication.display_name());
    println!(
        "  3. {} (complaints x allegations x penalties x officers)",
        PipelineStage::Join.display_name()
    );
    println!(
        "  4. {} (last {} years)",
        PipelineStage::TemporalFilter.display_name(),
        args.window_years
    );
    println!(
        "  5. {}",
        PipelineStage::MissingValueResolution.display_name()
    );
    println!("  6. {}", PipelineStage::FeatureProjection.display_name());
    println!();

    println!("OUTPUT FILES (will be created)");
    println!("{}", "-".repeat(40));
    println!("  - {}/{}.csv", args.output, args.output_name);
    if args.emit_report {
        println!("  - {}/{}_report.json", args.output, args.output_name);
    }
    println!();

    println!("{}", "=".repeat(80));
    println!("To execute the reconciliation, run without --dry-run");
    if !args.emit_report {
        println!("Add --emit-report to save the summary JSON");
    }
    println!("{}", "=".repeat(80));

    Ok(())
}

/// Truncate a string to max length with ellipsis
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}

/// Handle pipeline output based on CLI flags.
///
/// Output behavior:
/// - Default: Write the feature table CSV and print a human-readable summary
/// - `--json`: Write the CSV, then print only the summary JSON to stdout
/// - `--emit-report`: Also write the summary JSON to a file
fn handle_pipeline_output(mut result: PipelineResult, args: &Args) -> Result<()> {
    let output_path = write_feature_table(&mut result.table, args)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result.summary)?);
        return Ok(());
    }

    if args.emit_report {
        let report_path = write_report(&result.summary, args)?;
        info!("Report saved: {}", report_path.display());
    }

    print_human_readable_summary(&result.summary, &output_path, args);

    Ok(())
}

/// Write the reconciled feature table to `<output>/<output_name>.csv`.
fn write_feature_table(table: &mut DataFrame, args: &Args) -> Result<PathBuf> {
    std::fs::create_dir_all(&args.output)?;
    let output_path = PathBuf::from(&args.output).join(format!("{}.csv", args.output_name));
    let mut file = File::create(&output_path)?;

    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .with_quote_char(b'"')
        .finish(table)?;

    info!("Feature table saved: {}", output_path.display());

    Ok(output_path)
}

/// Write the summary JSON to `<output>/<output_name>_report.json`.
fn write_report(summary: &ReconciliationSummary, args: &Args) -> Result<PathBuf> {
    let report_path =
        PathBuf::from(&args.output).join(format!("{}_report.json", args.output_name));
    let mut file = File::create(&report_path)?;
    file.write_all(serde_json::to_string_pretty(summary)?.as_bytes())?;

    Ok(report_path)
}

/// Print a human-readable summary of the reconciliation run.
///
/// This is the default output when neither `--json` nor `--quiet` are
/// specified.
fn print_human_readable_summary(
    summary: &ReconciliationSummary,
    output_path: &Path,
    args: &Args,
) {
    println!();
    println!("{}", "=".repeat(80));
    println!("RECONCILIATION COMPLETE");
    println!("{}", "=".repeat(80));
    println!();

    println!(
        "Inputs: {} complaints, {} allegations, {} penalties, {} officers",
        summary.complaint_rows, summary.allegation_rows, summary.penalty_rows, summary.officer_rows
    );
    println!(
        "Output: {} ({} rows x {} columns)",
        output_path.display(),
        summary.final_rows,
        summary.final_columns
    );
    println!();

    println!("Row Accounting:");
    println!("  Joined: {}", summary.rows_joined);
    println!("  After key dedup: {}", summary.rows_after_dedup);
    println!(
        "  After recency filter: {} ({:.1}% removed)",
        summary.rows_after_filter,
        summary.filter_removed_percentage()
    );
    println!(
        "  Eliminated by resolver: {} ({:.1}%)",
        summary.rows_eliminated,
        summary.elimination_percentage()
    );
    println!("  Final: {}", summary.final_rows);
    println!();

    println!("Processing Summary:");
    println!("  Duration: {}ms", summary.duration_ms);
    println!(
        "  Completeness entering resolution: {:.1}%",
        summary.completeness_before_resolution * 100.0
    );
    println!();

    if !summary.column_audits.is_empty() {
        println!("Column Resolutions:");
        for audit in summary.column_audits.iter().take(10) {
            println!(
                "  - {}: {} ({} values)",
                audit.column,
                audit.rule.display_name(),
                audit.values_affected
            );
        }
        if summary.column_audits.len() > 10 {
            println!("  ... and {} more", summary.column_audits.len() - 10);
        }
        println!();
    }

    if !summary.actions.is_empty() {
        println!("Actions Taken:");
        for action in &summary.actions {
            println!(
                "  - [{}] {}",
                action.action_type.display_name(),
                action.description
            );
        }
        println!();
    }

    if !summary.warnings.is_empty() {
        println!("Warnings:");
        for warning in &summary.warnings {
            println!("  ! {}", warning);
        }
        println!();
    }

    println!("Use --json for machine-readable output");
    if !args.emit_report {
        println!("Use --emit-report to save the summary JSON");
    }
    println!("{}", "=".repeat(80));
}
