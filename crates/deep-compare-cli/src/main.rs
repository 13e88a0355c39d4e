//! deep-compare CLI - Row-level reconciliation of PostgreSQL tables across two databases.

use clap::{Parser, Subcommand, ValueEnum};
use deep_compare::compare::criteria::DEFAULT_EXCLUDE_FILE;
use deep_compare::compare::load_exclude_columns;
use deep_compare::references::generate_corrective_script;
use deep_compare::{
    CompareError, ComparisonResult, Config, DuplicatePolicy, MatchCriteria, Orchestrator,
    PgDatabase, ReferenceAnalysisReport, ReferenceReport, Side,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "deep-compare")]
#[command(about = "Row-level comparison of PostgreSQL tables across two databases")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (falls back to DB1_*/DB2_* env vars when absent)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Override the number of concurrent workers
    #[arg(long)]
    max_workers: Option<usize>,

    /// Decode Base64-encoded UUIDs in reports (true or false)
    #[arg(long)]
    decode_uuids: Option<bool>,

    /// Override the output directory for reports
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare a table's rows between both databases
    Compare {
        /// Table to compare
        #[arg(short, long)]
        table: String,

        /// Schema of the table
        #[arg(short, long, default_value = "public")]
        schema: String,

        /// Columns to exclude from matching (comma separated)
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,

        /// Only match on these columns (comma separated)
        #[arg(long, value_delimiter = ',')]
        include: Vec<String>,

        /// Keep primary key columns in the matching key
        #[arg(long)]
        include_pk: bool,

        /// Also exclude the columns listed in the exclude file (true or false)
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        exclude_from_file: bool,

        /// Path of the exclude-column file
        #[arg(long, default_value = DEFAULT_EXCLUDE_FILE)]
        exclude_file: PathBuf,

        /// Report duplicate keys as one-sided rows instead of collapsing them
        #[arg(long)]
        surface_duplicates: bool,
    },

    /// Find the columns referencing a table column and compare their values
    FindReferences {
        /// Referenced table
        #[arg(short, long)]
        table: String,

        /// Schema of the table
        #[arg(short, long, default_value = "public")]
        schema: String,

        /// Referenced column
        #[arg(long, default_value = "id")]
        column: String,
    },

    /// Count the rows referencing a single row id on both databases
    AnalyzeReferences {
        /// Referenced table
        #[arg(short, long)]
        table: String,

        /// Schema of the table
        #[arg(short, long, default_value = "public")]
        schema: String,

        /// Row id to look for
        #[arg(long)]
        id: String,
    },

    /// Generate a SQL script repointing references from one id to another
    GenerateScript {
        /// Referenced table
        #[arg(short, long)]
        table: String,

        /// Schema of the table
        #[arg(short, long, default_value = "public")]
        schema: String,

        /// Id to repoint away from and delete
        #[arg(long)]
        id_target: String,

        /// Id the references should point to
        #[arg(long)]
        id_destination: String,

        /// Database whose catalog the script is built from
        #[arg(long, value_enum, default_value = "db1")]
        source_db: SourceDb,
    },

    /// Print the columns listed in the exclude file
    ShowExcludeColumns {
        /// Path of the exclude-column file
        #[arg(long, default_value = DEFAULT_EXCLUDE_FILE)]
        exclude_file: PathBuf,
    },

    /// Test database connections
    HealthCheck,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceDb {
    Db1,
    Db2,
}

impl From<SourceDb> for Side {
    fn from(db: SourceDb) -> Self {
        match db {
            SourceDb::Db1 => Side::Db1,
            SourceDb::Db2 => Side::Db2,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), CompareError> {
    let cli = Cli::parse();
    setup_logging(&cli.verbosity, &cli.log_format);

    match &cli.command {
        // Reads a local file only; no config or database needed
        Commands::ShowExcludeColumns { exclude_file } => {
            let columns = load_exclude_columns(exclude_file)?;
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&columns)?);
            } else {
                println!("Exclude columns from {}:", exclude_file.display());
                for column in &columns {
                    println!("  {}", column);
                }
                println!("Total: {}", columns.len());
            }
        }

        Commands::Compare {
            table,
            schema,
            exclude,
            include,
            include_pk,
            exclude_from_file,
            exclude_file,
            surface_duplicates,
        } => {
            let mut config = load_config(&cli)?;
            if *surface_duplicates {
                config.compare.duplicate_policy = DuplicatePolicy::Surface;
            }
            let criteria = MatchCriteria {
                columns: include.clone(),
                exclude_columns: exclude.clone(),
                include_primary_key: *include_pk,
                exclude_columns_from_file: *exclude_from_file,
                exclude_columns_file: exclude_file.clone(),
            };

            let orchestrator = Orchestrator::connect(&config).await?;
            let result = orchestrator
                .compare_table(schema, table, Some(criteria))
                .await?;

            let json = result.to_json()?;
            let path = write_report(&config.output.directory, &config.output.file, &json)?;
            if cli.output_json {
                println!("{}", json);
            } else {
                print_comparison(&result, &path);
            }
        }

        Commands::FindReferences {
            table,
            schema,
            column,
        } => {
            let config = load_config(&cli)?;
            let orchestrator = Orchestrator::connect(&config).await?;
            let report = orchestrator.find_references(schema, table, column).await?;

            let json = report.to_json()?;
            let path =
                write_report(&config.output.directory, "match_reference_result.json", &json)?;
            if cli.output_json {
                println!("{}", json);
            } else {
                print_references(&report, &path);
            }
        }

        Commands::AnalyzeReferences { table, schema, id } => {
            let config = load_config(&cli)?;
            let orchestrator = Orchestrator::connect(&config).await?;
            let report = orchestrator
                .analyze_references_to_row(schema, table, id)
                .await?;

            let json = report.to_json()?;
            let path = write_report(&config.output.directory, "id_matches_tables.json", &json)?;
            if cli.output_json {
                println!("{}", json);
            } else {
                print_analysis(&report, &path);
            }
        }

        Commands::GenerateScript {
            table,
            schema,
            id_target,
            id_destination,
            source_db,
        } => {
            let config = load_config(&cli)?;
            let side = Side::from(*source_db);
            let db_config = match side {
                Side::Db1 => &config.database1,
                Side::Db2 => &config.database2,
            };
            let db = PgDatabase::connect(db_config, side).await?;
            let script =
                generate_corrective_script(&db, schema, table, id_target, id_destination).await?;

            let path =
                write_report(&config.output.directory, "update_fk_references.sql", &script)?;
            if cli.output_json {
                let summary = serde_json::json!({
                    "table": format!("{}.{}", schema, table),
                    "source_db": side,
                    "script_path": path,
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Script generated from {} catalog: {}", side, path.display());
            }
        }

        Commands::HealthCheck => {
            let config = load_config(&cli)?;
            let orchestrator = Orchestrator::connect(&config).await?;
            let report = orchestrator.health_check().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Health Check Results:");
                print_health_line(
                    "DB1",
                    &config.database1.label(),
                    &report.db1_type,
                    report.db1_error.as_deref(),
                );
                print_health_line(
                    "DB2",
                    &config.database2.label(),
                    &report.db2_type,
                    report.db2_error.as_deref(),
                );
                println!(
                    "\n  Overall: {}",
                    if report.is_healthy() { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !report.is_healthy() {
                return Err(CompareError::pool("health check failed", "health-check"));
            }
        }
    }

    Ok(())
}

/// Load the config and apply the global CLI overrides.
fn load_config(cli: &Cli) -> Result<Config, CompareError> {
    let mut config = Config::load_or_env(&cli.config)?;
    if let Some(workers) = cli.max_workers {
        config.compare.max_workers = workers;
    }
    if let Some(decode) = cli.decode_uuids {
        config.compare.decode_uuids = decode;
    }
    if let Some(ref dir) = cli.output {
        config.output.directory = dir.clone();
    }
    config.validate()?;
    info!(
        "Comparing {} with {}",
        config.database1.label(),
        config.database2.label()
    );
    Ok(config)
}

fn write_report(dir: &Path, file: &str, content: &str) -> Result<PathBuf, CompareError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(file);
    std::fs::write(&path, content)?;
    info!("Wrote {}", path.display());
    Ok(path)
}

fn print_comparison(result: &ComparisonResult, path: &Path) {
    println!("\nComparison of {}.{}:", result.schema, result.table_name);
    println!("  Rows: DB1 {}, DB2 {}", result.total_rows_db1, result.total_rows_db2);
    println!("  Matched: {}", result.matched_rows);
    println!("  Unmatched: {}", result.unmatched_rows);
    println!("  Only in DB1: {}", result.only_in_db1.len());
    println!("  Only in DB2: {}", result.only_in_db2.len());
    println!("  Rows with differences: {}", result.differences.len());

    if !result.foreign_key_results.is_empty() {
        println!("  Foreign keys:");
        for fk in &result.foreign_key_results {
            let target = fk.foreign_key.referenced_full_name();
            match &fk.error {
                Some(err) => {
                    println!("    ✗ {} -> {}: {}", fk.foreign_key.column_name, target, err)
                }
                None => println!(
                    "    ✓ {} -> {} (matched: {}, only DB1: {}, only DB2: {})",
                    fk.foreign_key.column_name,
                    target,
                    fk.comparison_result.matched_rows,
                    fk.comparison_result.only_in_db1.len(),
                    fk.comparison_result.only_in_db2.len()
                ),
            }
        }
    }
    for err in &result.errors {
        println!("  Error: {}", err);
    }
    if result.is_partial() {
        println!("  Result is partial");
    }
    println!("  Report: {}", path.display());
}

fn print_references(report: &ReferenceReport, path: &Path) {
    println!(
        "\nReferences to {}.{}.{}:",
        report.target_schema, report.target_table, report.target_column
    );
    println!("  Referencing columns: {}", report.referencing_tables);
    println!("  Total values: {}", report.total_references);
    for r in &report.references {
        println!(
            "    {}.{}.{} (common: {}, only DB1: {}, only DB2: {})",
            r.schema,
            r.table_name,
            r.column_name,
            r.common_references.len(),
            r.only_in_db1.len(),
            r.only_in_db2.len()
        );
        if let Some(ref err) = r.error {
            println!("      Error: {}", err);
        }
    }
    for err in &report.errors {
        println!("  Error: {}", err);
    }
    println!("  Report: {}", path.display());
}

fn print_analysis(report: &ReferenceAnalysisReport, path: &Path) {
    println!(
        "\nReferences to {}.{} id={}:",
        report.target_schema, report.target_table, report.target_id
    );
    println!(
        "  Candidates with matches: {}/{}",
        report.referencing_tables.len(),
        report.total_constraints
    );
    for t in &report.referencing_tables {
        println!(
            "    {}.{}.{} [{}] (DB1: {}, DB2: {})",
            t.schema, t.table_name, t.column_name, t.constraint_name, t.matches_db1, t.matches_db2
        );
    }
    for err in &report.errors {
        println!("  Error: {}", err);
    }
    println!("  Report: {}", path.display());
}

fn print_health_line(name: &str, label: &str, db_type: &str, error: Option<&str>) {
    println!(
        "  {} ({}, {}): {}",
        name,
        label,
        db_type,
        if error.is_none() { "OK" } else { "FAILED" }
    );
    if let Some(err) = error {
        println!("    Error: {}", err);
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG wins over --verbosity when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
