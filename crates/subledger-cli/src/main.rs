mod display;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use subledger_import::{BatchOptions, check_batch, import_file, read_rows};
use subledger_store::{ContractGateway, DuckGateway, RestGateway};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "subledger", version, about = "Batch import of subcontracts and addenda")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// DuckDB database file
    #[arg(long, global = true, env = "SUBLEDGER_DB", default_value = "subledger.duckdb")]
    db: PathBuf,

    /// Hosted datastore base URL; overrides --db when set
    #[arg(long, global = true, env = "SUBLEDGER_URL")]
    url: Option<String>,

    /// API key for the hosted datastore
    #[arg(long, global = true, env = "SUBLEDGER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, env = "SUBLEDGER_LOG", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a contract sheet (CSV) into the datastore
    Import {
        file: PathBuf,

        /// Issue date for groups that leave it blank (default: today)
        #[arg(long)]
        run_date: Option<NaiveDate>,

        /// Print the batch report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a contract sheet without touching any datastore
    Check {
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Create the DuckDB schema
    Init,

    /// Register a project in the DuckDB store
    AddProject {
        name: String,

        /// Project code used in contract identifiers
        #[arg(long)]
        code: Option<String>,
    },

    /// Register a subcontractor in the DuckDB store
    AddSubcontractor { name: String },

    /// List stored contracts
    Contracts {
        /// Only headers whose trade items or responsibilities never landed
        #[arg(long)]
        incomplete: bool,
    },

    /// List the addenda of a subcontract
    Addenda { parent: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("subledger v{}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Import {
            file,
            run_date,
            json,
        } => cmd_import(&cli, file, *run_date, *json).await,
        Commands::Check { file, json } => cmd_check(file, *json),
        Commands::Init => {
            DuckGateway::open_persistent(&cli.db)
                .with_context(|| format!("cannot open {}", cli.db.display()))?;
            println!("Schema ready in {}", cli.db.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::AddProject { name, code } => {
            let project = open_duck(&cli)?.insert_project(name, code.as_deref())?;
            println!("Project {} registered with id {}", project.name, project.id);
            Ok(ExitCode::SUCCESS)
        }
        Commands::AddSubcontractor { name } => {
            let sub = open_duck(&cli)?.insert_subcontractor(name)?;
            println!("Subcontractor {} registered with id {}", sub.name, sub.id);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Contracts { incomplete } => {
            let gateway = open_gateway(&cli)?;
            let contracts = if *incomplete {
                gateway.list_incomplete().await?
            } else {
                gateway.list_contracts().await?
            };
            display::print_contracts(&contracts);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Addenda { parent } => {
            let addenda = open_gateway(&cli)?.list_addenda(parent).await?;
            display::print_contracts(&addenda);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn cmd_import(
    cli: &Cli,
    file: &Path,
    run_date: Option<NaiveDate>,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let gateway = open_gateway(cli)?;
    let mut options = BatchOptions::default();
    if let Some(date) = run_date {
        options.run_date = date;
    }
    info!(file = %file.display(), store = %store_label(cli), run_date = %options.run_date, "importing");

    let report = import_file(gateway.as_ref(), file, &options)
        .await
        .with_context(|| format!("cannot read {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        display::print_report(&report);
    }
    info!(
        stored = report.success_count,
        partial = report.partial_count,
        failed = report.error_count,
        "import finished"
    );
    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_check(file: &Path, json: bool) -> anyhow::Result<ExitCode> {
    let rows = read_rows(file).with_context(|| format!("cannot read {}", file.display()))?;
    let checks = check_batch(rows);
    debug!(file = %file.display(), groups = checks.len(), "checked sheet");

    if json {
        println!("{}", serde_json::to_string_pretty(&checks)?);
    } else {
        display::print_checks(&checks);
    }
    Ok(if checks.iter().all(|c| c.is_valid()) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn open_duck(cli: &Cli) -> anyhow::Result<DuckGateway> {
    if cli.url.is_some() {
        bail!("this command only works against a DuckDB store; drop --url");
    }
    DuckGateway::open_persistent(&cli.db)
        .with_context(|| format!("cannot open {}", cli.db.display()))
}

/// Which datastore a command talks to, for logs.
fn store_label(cli: &Cli) -> String {
    match &cli.url {
        Some(url) => format!("rest {url}"),
        None => format!("duckdb {}", cli.db.display()),
    }
}

fn open_gateway(cli: &Cli) -> anyhow::Result<Box<dyn ContractGateway>> {
    match &cli.url {
        Some(url) => {
            let key = cli
                .api_key
                .clone()
                .context("--api-key (or SUBLEDGER_API_KEY) is required with --url")?;
            Ok(Box::new(RestGateway::new(url.clone(), key)))
        }
        None => Ok(Box::new(open_duck(cli)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_label_names_the_backend() {
        let cli = Cli::parse_from(["subledger", "--db", "books.duckdb", "init"]);
        assert_eq!(store_label(&cli), "duckdb books.duckdb");

        let cli = Cli::parse_from(["subledger", "--url", "https://db.example.com", "contracts"]);
        assert_eq!(store_label(&cli), "rest https://db.example.com");
    }
}
