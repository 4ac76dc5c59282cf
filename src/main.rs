//! CLI entry point for `cohort-store`.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cohort_store::export;
use cohort_store::{CohortStore, IngestMode, Ingestor, Predicate, StoreConfig, Table, Value};

#[derive(Parser)]
#[command(
    name = "cohort-store",
    about = "Load imaging measurement CSVs into SQLite and query study cohorts"
)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, default_value = "cohorts.db")]
    db: String,

    /// Primary table name
    #[arg(long, global = true, default_value = "raw")]
    table: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a CSV file into the table and refresh the studies view
    Ingest {
        /// CSV file to load
        csv: PathBuf,

        /// How incoming rows combine with existing ones
        #[arg(long, value_enum, default_value = "replace")]
        mode: ModeArg,

        /// Key column for upsert (repeatable; defaults to "Image/Patient ID" and "Study Name")
        #[arg(long = "key")]
        keys: Vec<String>,
    },

    /// List the available studies
    Studies,

    /// Query one cohort
    Query {
        /// Study name to select
        #[arg(long)]
        study: Option<String>,

        /// Equality filter, COLUMN=VALUE (repeatable)
        #[arg(long = "eq", value_name = "COLUMN=VALUE")]
        equals: Vec<String>,

        /// Comparison filter: COLUMN OP VALUE (repeatable)
        #[arg(long = "cmp", num_args = 3, value_names = ["COLUMN", "OP", "VALUE"])]
        comparisons: Vec<String>,

        /// Organ token for metric columns (repeatable)
        #[arg(long = "organ")]
        organs: Vec<String>,

        /// Metric kind token (repeatable)
        #[arg(long = "kind")]
        kinds: Vec<String>,

        /// Maximum number of rows
        #[arg(long)]
        limit: Option<u64>,

        /// Print the generated SQL instead of running it
        #[arg(long)]
        sql: bool,

        /// Print the result as JSON records instead of CSV
        #[arg(long)]
        json: bool,

        /// Write the result as CSV
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Write the result as Parquet
        #[arg(long)]
        parquet: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Replace,
    Append,
    Upsert,
}

fn default_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,cohort_store=info,sqlx=warn"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(default_env_filter())
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> cohort_store::Result<()> {
    match cli.command {
        Command::Ingest { csv, mode, keys } => {
            let config = StoreConfig::builder(&cli.db)
                .table(&cli.table)
                .create_if_missing(true)
                .build();
            let mode = match mode {
                ModeArg::Replace => IngestMode::Replace,
                ModeArg::Append => IngestMode::Append,
                ModeArg::Upsert if keys.is_empty() => {
                    IngestMode::upsert(config.upsert_keys.clone())
                }
                ModeArg::Upsert => IngestMode::upsert(keys),
            };

            let mut ingestor = Ingestor::open(config).await?;
            let result = ingestor.ingest_csv(&csv, mode).await;
            ingestor.close().await;

            let report = result?;
            println!(
                "Loaded {} rows into '{}' ({}, {} replaced)",
                report.rows_read, report.table, report.mode, report.rows_deleted
            );
        }
        Command::Studies => {
            let mut store = open_store(&cli.db, &cli.table).await?;
            let result = store.list_studies().await;
            store.close().await;
            print_table(&result?)?;
        }
        Command::Query {
            study,
            equals,
            comparisons,
            organs,
            kinds,
            limit,
            sql,
            json,
            csv,
            parquet,
        } => {
            let mut store = open_store(&cli.db, &cli.table).await?;
            let result = run_query(
                &mut store,
                QueryArgs {
                    study,
                    equals,
                    comparisons,
                    organs,
                    kinds,
                    limit,
                    sql,
                    json,
                    csv,
                    parquet,
                },
            )
            .await;
            store.close().await;
            result?;
        }
    }
    Ok(())
}

struct QueryArgs {
    study: Option<String>,
    equals: Vec<String>,
    comparisons: Vec<String>,
    organs: Vec<String>,
    kinds: Vec<String>,
    limit: Option<u64>,
    sql: bool,
    json: bool,
    csv: Option<PathBuf>,
    parquet: Option<PathBuf>,
}

async fn open_store(db: &str, table: &str) -> cohort_store::Result<CohortStore> {
    let config = StoreConfig::builder(db).table(table).build();
    CohortStore::open(config).await
}

async fn run_query(store: &mut CohortStore, args: QueryArgs) -> cohort_store::Result<()> {
    store.reset();

    if let Some(study) = args.study {
        store.select_cohort(study)?;
    }

    for pair in &args.equals {
        let (column, value) = pair.split_once('=').ok_or_else(|| {
            cohort_store::CohortStoreError::validation(format!(
                "Expected COLUMN=VALUE, got '{}'",
                pair
            ))
        })?;
        store.filter(column, Predicate::Equals(Value::infer(value)))?;
    }

    for triple in args.comparisons.chunks(3) {
        if let [column, op, value] = triple {
            store.filter_op(column, op, Value::infer(value))?;
        }
    }

    if !args.organs.is_empty() || !args.kinds.is_empty() {
        store.metrics(&args.organs, &args.kinds).await?;
    }

    if let Some(limit) = args.limit {
        store.limit(limit)?;
    }

    if args.sql {
        let (sql, params) = store.build();
        println!("{sql}");
        for (i, param) in params.iter().enumerate() {
            println!("  ?{} = {:?}", i + 1, param);
        }
        return Ok(());
    }

    let table = store.execute().await?;

    if let Some(path) = &args.parquet {
        export::write_parquet(&table, path)?;
    }
    match &args.csv {
        Some(path) => export::write_csv(&table, path)?,
        None if args.parquet.is_some() => {}
        None if args.json => {
            serde_json::to_writer_pretty(std::io::stdout().lock(), &table.to_json())?;
            println!();
        }
        None => print_table(&table)?,
    }

    eprintln!("{} rows", table.num_rows());
    Ok(())
}

fn print_table(table: &Table) -> cohort_store::Result<()> {
    export::write_csv_to(table, std::io::stdout().lock())
}
