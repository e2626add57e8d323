//! aw-etl: the AdventureWorks star-schema loader
//!
//! # Usage
//!
//! ```bash
//! # Run once with ./aw-etl.toml
//! aw-etl
//!
//! # Extract and transform, write nothing
//! aw-etl run --dry-run
//!
//! # Override the connections
//! aw-etl run --source "SERVER=db,1433;DATABASE=AdventureWorks2022;UID=sa;PWD=..." \
//!     --destination-url postgres://postgres@localhost/ETL
//! ```

use anyhow::Context;
use aw_etl::entity::Entity;
use aw_etl::extract::query_for;
use aw_etl::prelude::*;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aw-etl")]
#[command(version)]
#[command(about = "Rebuild the AdventureWorks star schema in PostgreSQL", long_about = None)]
#[command(after_help = "EXAMPLES:
    aw-etl
    aw-etl run --dry-run --format json
    aw-etl --config /etc/aw-etl.toml run
    aw-etl queries")]
struct Cli {
    /// Config file (default: ./aw-etl.toml, then the user config dir)
    #[arg(short, long, env = "AW_ETL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Clone)]
struct Overrides {
    /// SQL Server connection string
    #[arg(long, env = "AW_ETL_SOURCE")]
    source: Option<String>,

    /// PostgreSQL connection URL
    #[arg(long, env = "AW_ETL_DESTINATION_URL")]
    destination_url: Option<String>,
}

#[derive(Args, Clone)]
struct RunArgs {
    #[command(flatten)]
    overrides: Overrides,

    /// Extract and transform only; don't touch the destination
    #[arg(short, long)]
    dry_run: bool,

    /// Summary format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once (the default)
    Run(RunArgs),
    /// Show each step's destination table and source query
    Queries,
    /// Show the resolved configuration, passwords redacted
    Config(Overrides),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Some(Commands::Run(ref args)) => run(&cli, args).await,
        Some(Commands::Queries) => {
            show_queries();
            Ok(())
        }
        Some(Commands::Config(ref args)) => show_config(&cli, args),
        None => run(&cli, &cli.run).await,
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("aw_etl=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aw_etl=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file plus command-line overrides.
fn resolve_config(cli: &Cli, args: &Overrides) -> anyhow::Result<EtlConfig> {
    let mut config = EtlConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;
    config.apply_overrides(args.source.clone(), args.destination_url.clone());
    Ok(config)
}

async fn run(cli: &Cli, args: &RunArgs) -> anyhow::Result<()> {
    let config = resolve_config(cli, &args.overrides)?;

    let report = if args.dry_run {
        aw_etl::execute_dry_run(&config).await.context("dry run failed")?
    } else {
        aw_etl::execute(&config).await.context("ETL run failed")?
    };

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => print_report(&report, args.dry_run),
    }
    Ok(())
}

fn print_report(report: &RunReport, dry_run: bool) {
    let headers = ["step", "table", "rows", "ms"];
    let cells: Vec<[String; 4]> = report
        .steps
        .iter()
        .map(|s| {
            [
                s.entity.to_string(),
                s.table.clone(),
                s.rows.to_string(),
                s.elapsed_ms.to_string(),
            ]
        })
        .collect();

    let mut widths = headers.map(str::len);
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let header: Vec<String> = headers
        .iter()
        .zip(widths)
        .map(|(h, w)| format!("{:w$}", h))
        .collect();
    println!("{}", header.join(" │ ").white().bold());
    let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("{}", sep.join("─┼─").dimmed());

    for row in &cells {
        let line: Vec<String> = row
            .iter()
            .zip(widths)
            .map(|(c, w)| format!("{:w$}", c))
            .collect();
        println!("{}", line.join(" │ "));
    }

    println!();
    let verb = if dry_run { "extracted (dry run)" } else { "loaded" };
    println!(
        "{} {} rows {} in {} ms {}",
        "✓".green(),
        report.total_rows().to_string().cyan(),
        verb,
        report.elapsed_ms,
        format!("[run {}]", report.run_id).dimmed()
    );
}

fn show_queries() {
    for entity in Entity::ALL {
        println!("{} {}", entity.to_string().cyan().bold(), format!("→ {}", entity.table()).white());
        match query_for(entity) {
            Some(sql) => {
                for line in sql.lines() {
                    println!("    {}", line.dimmed());
                }
            }
            None => println!("    {}", "(derived from orders.OrderDate)".yellow()),
        }
        println!();
    }
}

fn show_config(cli: &Cli, args: &Overrides) -> anyhow::Result<()> {
    let path = EtlConfig::discover(cli.config.as_deref());
    let config = resolve_config(cli, args)?;

    println!("{}", "Configuration".cyan().bold());
    match &path {
        Some(p) => println!("  {} {}", "file:".dimmed(), p.display()),
        None => println!("  {} {}", "file:".dimmed(), "(none found)".yellow()),
    }

    match config.source.resolve() {
        Ok(params) => println!("  {} {}", "source:".dimmed(), params.redacted()),
        Err(e) => println!("  {} {}", "source:".dimmed(), e.to_string().red()),
    }
    println!("  {} {}", "destination:".dimmed(), config.destination.describe());
    if let Some(schema) = &config.destination.schema {
        println!("  {} {}", "schema:".dimmed(), schema);
    }
    let strategy = match config.load.strategy {
        LoadStrategy::Transactional => "transactional",
        LoadStrategy::Swap => "swap",
    };
    println!("  {} {}", "strategy:".dimmed(), strategy);
    println!("  {} {}", "batch size:".dimmed(), config.load.batch_size);
    Ok(())
}
