//! Operator CLI for the ledger snapshot store.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use polars::prelude::*;
use tracing_subscriber::EnvFilter;

use ledger_timetravel::analytics::{self, DashboardStats};
use ledger_timetravel::config::Config;
use ledger_timetravel::ingest::{FileOutcome, IngestReport, IngestStatus};
use ledger_timetravel::models::ModelSet;
use ledger_timetravel::query::{DataAccess, FilterState};
use ledger_timetravel::refresh::{RefreshManager, RefreshStep};
use ledger_timetravel::time_travel::{AuditFilter, TimeTravel};
use ledger_timetravel::{io, LedgerError, SnapshotSelector};

#[derive(Parser)]
#[command(name = "ledger", about = "Versioned ledger snapshots with time-travel queries", long_about = None)]
struct Cli {
    /// Snapshot directory
    #[arg(long, global = true)]
    warehouse_dir: Option<PathBuf>,

    /// Directory scanned for new source exports
    #[arg(long, global = true)]
    raw_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    marts_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    dataset: Option<String>,

    /// External transformation command, run instead of the built-in models
    #[arg(long, global = true)]
    transform_command: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List snapshots, newest first
    List,

    /// Ingest one source file into a new snapshot
    Ingest {
        file: PathBuf,

        /// Ingest even if the ingestion log already lists the file
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Ingest every new file in the raw directory
    IngestAll {
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Show the data as it was at the end of a date
    AsOf {
        date: NaiveDate,

        /// Write the rows to a .csv or .parquet file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare two snapshots by id
    Compare { from: String, to: String },

    /// Merge snapshots into a new one; later snapshots win on conflicts
    Consolidate {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Snapshots created after the given one
    Changes { since: String },

    /// Every version of matching rows across all snapshots
    Audit {
        #[arg(long)]
        account: Option<String>,

        #[arg(long)]
        from: Option<NaiveDate>,

        #[arg(long)]
        to: Option<NaiveDate>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Ingest pending files and rebuild the marts
    Refresh {
        /// Rebuild from the latest snapshot without ingesting
        #[arg(long, default_value_t = false)]
        quick: bool,
    },

    /// Query a mart with calendar filters
    Query {
        mart: String,

        #[arg(long = "year")]
        years: Vec<i32>,

        #[arg(long = "quarter")]
        quarters: Vec<u32>,

        /// Month number or name
        #[arg(long = "month")]
        months: Vec<String>,

        /// Only rows loaded from this source file; repeatable
        #[arg(long = "source")]
        sources: Vec<String>,

        /// Snapshot id, `latest` or YYYY-MM-DD; the last refresh when omitted
        #[arg(long)]
        snapshot: Option<SnapshotSelector>,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Dashboard figures, largest balances and activity breakdown
    Accounts {
        #[arg(long, default_value_t = 10)]
        top: usize,

        #[arg(long = "source")]
        sources: Vec<String>,

        #[arg(long)]
        snapshot: Option<SnapshotSelector>,
    },

    /// Show the models in execution order with their dependencies
    Models {
        /// Show everything upstream and downstream of one model
        #[arg(long)]
        lineage: Option<String>,
    },
}

fn load_config(cli: &Cli) -> ledger_timetravel::Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(dir) = &cli.warehouse_dir {
        config.warehouse_dir = dir.clone();
    }
    if let Some(dir) = &cli.raw_dir {
        config.raw_dir = dir.clone();
    }
    if let Some(dir) = &cli.marts_dir {
        config.marts_dir = dir.clone();
    }
    if let Some(dataset) = &cli.dataset {
        config.dataset = dataset.trim().to_string();
    }
    if let Some(command) = &cli.transform_command {
        config.transform_command = Some(command.clone());
    }
    config.validate()?;
    Ok(config)
}

fn write_output(df: &mut DataFrame, path: &Path) -> anyhow::Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => {
            let mut file = File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            CsvWriter::new(&mut file)
                .finish(df)
                .with_context(|| format!("writing {}", path.display()))?;
        }
        _ => io::replace_parquet(df, path)?,
    }
    println!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}

fn print_report(report: &IngestReport) {
    match (&report.status, &report.snapshot) {
        (IngestStatus::Ingested, Some(snapshot)) => {
            println!(
                "{}: {} rows -> {}",
                report.source_file, report.rows_written, snapshot.id
            );
            if report.dropped_rows > 0 {
                println!("  dropped {} rows without date or account", report.dropped_rows);
            }
            if report.collisions > 0 {
                println!("  {} duplicate rows kept with disambiguated ids", report.collisions);
            }
            if !report.unknown_columns.is_empty() {
                println!("  ignored columns: {}", report.unknown_columns.join(", "));
            }
        }
        _ => println!("{}: already ingested, skipped", report.source_file),
    }
}

fn print_outcomes(files: &[FileOutcome]) {
    for outcome in files {
        match &outcome.result {
            Ok(report) => print_report(report),
            Err(err) => println!("{}: FAILED: {err}", outcome.path.display()),
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let store = config.store();

    match cli.command {
        Command::List => {
            let listing = store.list()?;
            if listing.snapshots.is_empty() {
                println!("No snapshots in {}", store.root().display());
            }
            for s in &listing.snapshots {
                println!(
                    "{:<60} {:>19} {:>8} rows {:>10} bytes",
                    s.info.id,
                    s.info.created_at().format("%Y-%m-%d %H:%M:%S"),
                    s.row_count,
                    s.size_bytes
                );
            }
            for err in &listing.skipped {
                eprintln!("skipped: {err}");
            }
        }

        Command::Ingest { file, force } => {
            let report = config.ingestor().ingest_file(&file, force)?;
            print_report(&report);
        }

        Command::IngestAll { force } => {
            let batch = config.ingestor().ingest_all(force)?;
            print_outcomes(&batch.files);
            println!(
                "{} ingested, {} skipped, {} failed",
                batch.processed(),
                batch.skipped(),
                batch.failed()
            );
        }

        Command::AsOf { date, output } => {
            let (info, mut df) = TimeTravel::new(store).query_at_date(date)?;
            println!("As of {date}: {info}, {} rows", df.height());
            match output {
                Some(path) => write_output(&mut df, &path)?,
                None => println!("{df}"),
            }
        }

        Command::Compare { from, to } => {
            let diff = TimeTravel::new(store).compare(&from, &to)?;
            println!("{} -> {}", diff.from.id, diff.to.id);
            println!(
                "rows: {} -> {} ({:+})",
                diff.from.rows,
                diff.to.rows,
                diff.row_change()
            );
            println!("dates: {} -> {}", diff.from_dates, diff.to_dates);
            println!(
                "added {}, removed {}, changed {}",
                diff.rows.added.len(),
                diff.rows.removed.len(),
                diff.rows.changed.len()
            );
            if !diff.rows.duplicate_ids.is_empty() {
                println!(
                    "ids shared by several rows (paired by position): {}",
                    diff.rows.duplicate_ids.join(", ")
                );
            }
            if !diff.columns.new_columns.is_empty() {
                println!("new columns: {}", diff.columns.new_columns.join(", "));
            }
            if !diff.columns.removed_columns.is_empty() {
                println!("removed columns: {}", diff.columns.removed_columns.join(", "));
            }
        }

        Command::Consolidate { ids } => {
            let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
            let info = TimeTravel::new(store)
                .consolidate_into_store(&ids, Local::now().naive_local())?;
            println!("Consolidated {} snapshots into {info}", ids.len());
        }

        Command::Changes { since } => {
            let changes = TimeTravel::new(store).changes_since(&since)?;
            if changes.is_empty() {
                println!("No snapshots after {since}");
            }
            for change in &changes {
                println!("{}  {} rows  {}", change.info, change.rows, change.dates);
            }
        }

        Command::Audit {
            account,
            from,
            to,
            output,
        } => {
            let filter = AuditFilter {
                account_code: account,
                from,
                to,
            };
            let mut trail = TimeTravel::new(store).audit_trail(&filter)?;
            for err in &trail.skipped {
                eprintln!("skipped: {err}");
            }
            println!("{} row versions", trail.frame.height());
            match output {
                Some(path) => write_output(&mut trail.frame, &path)?,
                None => println!("{}", trail.frame),
            }
        }

        Command::Refresh { quick } => {
            let manager = RefreshManager::new(config.ingestor(), config.transformer()?);
            let progress = |step: RefreshStep| match step {
                RefreshStep::CheckingSources => println!("Checking for new source files..."),
                RefreshStep::Ingesting { file, index, total } => {
                    println!("Ingesting {file} ({}/{total})", index + 1)
                }
                RefreshStep::Transforming { snapshot_id } => {
                    println!("Transforming {snapshot_id}...")
                }
                RefreshStep::CheckingQuality => println!("Checking data quality..."),
                RefreshStep::Finished => println!("Done"),
            };
            let report = if quick {
                manager.quick_refresh(progress)?
            } else {
                manager.refresh(progress)?
            };
            print_outcomes(&report.files);
            for table in &report.transform.tables {
                println!("  {:<32} {:>8} rows", table.name, table.rows);
            }
            println!(
                "Refresh {} built {} tables from {} in {:.2?}",
                report.run_id,
                report.transform.tables.len(),
                report.snapshot.id,
                report.duration
            );
            if let Some(quality) = &report.quality {
                if quality.is_clean() {
                    println!("Data quality: {} rows, no flags", quality.rows_checked);
                } else {
                    println!(
                        "Data quality: {} of {} rows flagged",
                        quality.flagged_rows(),
                        quality.rows_checked
                    );
                    for (flag, count) in &quality.flagged {
                        println!("  {flag:<24} {count:>8}");
                    }
                }
            }
        }

        Command::Query {
            mart,
            years,
            quarters,
            months,
            sources,
            snapshot,
            limit,
            offset,
        } => {
            let mut filter = FilterState::new()
                .with_calendar(&years, &quarters, &[])?
                .with_source_files(&sources);
            for month in &months {
                filter = match month.parse::<u32>() {
                    Ok(number) => filter.toggle_month(number)?,
                    Err(_) => filter.toggle_month_name(month)?,
                };
            }
            let filter = filter.with_snapshot(snapshot);
            let access = DataAccess::new(config.transformer()?, store)?;
            let page = access.query_page(&mart, &filter, offset, limit)?;
            println!("{}", page.rows);
            println!(
                "rows {}-{} of {}{}",
                page.offset + 1,
                page.offset + page.rows.height(),
                page.total,
                if page.has_more() { " (more)" } else { "" }
            );
        }

        Command::Accounts {
            top,
            sources,
            snapshot,
        } => {
            let filter = FilterState::new()
                .with_source_files(&sources)
                .with_snapshot(snapshot);
            let access = DataAccess::new(config.transformer()?, store)?;

            let stats = DashboardStats::for_filter(&access, &filter)?;
            println!(
                "{} accounts ({} active), assets {}, liabilities {}",
                stats.total_accounts, stats.active_accounts, stats.total_assets, stats.total_liabilities
            );
            println!(
                "{} transactions from {} files, debit {}, credit {}, net {}",
                stats.total_transactions,
                stats.source_files,
                stats.total_debit,
                stats.total_credit,
                stats.net_total
            );
            println!("{}", analytics::top_accounts_for(&access, &filter, top)?);
            for group in analytics::activity_breakdown_for(&access, &filter)? {
                println!(
                    "{:<10} {:>6} accounts  total {:>14}  avg {:>12}",
                    group.activity_status, group.account_count, group.total_balance, group.avg_balance
                );
            }
        }

        Command::Models { lineage } => {
            let models = ModelSet::standard()?;
            match lineage {
                Some(name) => {
                    let graph = models.graph();
                    println!("{name}");
                    println!("  upstream:   {}", graph.upstream(&name)?.join(", "));
                    println!("  downstream: {}", graph.downstream(&name)?.join(", "));
                }
                None => {
                    for name in models.names() {
                        let deps = models.graph().dependencies(name)?;
                        let description = models.get(name).map(|d| d.description).unwrap_or_default();
                        println!("{name:<32} <- {:<40} {description}", deps.join(", "));
                    }
                }
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let log_filter = Config::from_env()
        .map(|c| c.log_filter)
        .unwrap_or_else(|_| Config::default().log_filter);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = err.downcast_ref::<LedgerError>().map_or(1, LedgerError::exit_code);
            ExitCode::from(code)
        }
    }
}
