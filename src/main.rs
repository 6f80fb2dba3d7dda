use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;

use mangetamain::data::{parse_filter_values, FilterSpec, Loader, LoaderConfig, Table};
use mangetamain::logging::{setup_logging, LogConfig};

#[derive(Parser)]
#[command(name = "mangetamain")]
#[command(about = "Load and filter the Mangetamain recipe dataset", long_about = None)]
struct Cli {
    /// Directory for debug.log and error.log
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Most verbose level written to debug.log
    #[arg(long, default_value = "debug")]
    log_level: LevelFilter,

    /// Suffix of the directory archives are extracted into
    #[arg(long, default_value = "_extracted")]
    extract_suffix: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a table and print its shape and first rows
    Load {
        /// .csv, .zip, .xz, .pkl, .parquet or .json file
        path: PathBuf,

        /// Number of rows to preview
        #[arg(long, default_value_t = 5)]
        head: usize,

        /// Print the rows as JSON records instead of a text grid
        #[arg(long)]
        json: bool,
    },

    /// Extract an archive and list its members
    Extract {
        /// .zip or .xz archive
        archive: PathBuf,
    },

    /// Distinct values of one column with their row counts
    Values {
        path: PathBuf,

        #[arg(long)]
        column: String,
    },

    /// Load a table and keep the rows matching every column constraint
    Filter {
        path: PathBuf,

        /// Comma-separated column names
        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,

        /// JSON array with one entry per column: a value, a list of values,
        /// or null for missing (e.g. '["bio", [1, 2, 3]]')
        #[arg(long)]
        values: String,

        #[arg(long, default_value_t = 5)]
        head: usize,

        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&LogConfig {
        dir: cli.log_dir.clone(),
        level: cli.log_level,
        ..LogConfig::default()
    })
    .context("setting up logging")?;

    let mut loader = Loader::builder()
        .config(LoaderConfig {
            extract_suffix: cli.extract_suffix.clone(),
        })
        .build();

    match cli.command {
        Commands::Load { path, head, json } => {
            let table = loader
                .load(&path)
                .with_context(|| format!("loading {}", path.display()))?;
            print_table(&table, head, json)?;
        }
        Commands::Extract { archive } => {
            let members = loader
                .extract(&archive)
                .with_context(|| format!("extracting {}", archive.display()))?;
            for member in members {
                println!("{}", member.display());
            }
        }
        Commands::Values { path, column } => {
            let table = loader
                .load(&path)
                .with_context(|| format!("loading {}", path.display()))?;
            let column = table.column(&column)?;
            for (value, count) in column.value_counts() {
                println!("{value}\t{count}");
            }
        }
        Commands::Filter {
            path,
            columns,
            values,
            head,
            json,
        } => {
            let values: serde_json::Value =
                serde_json::from_str(&values).context("parsing --values as JSON")?;
            let spec = FilterSpec::from_parts(&columns, parse_filter_values(&values)?)?;
            let table = loader
                .load(&path)
                .with_context(|| format!("loading {}", path.display()))?;
            let filtered = spec.apply(&table)?;
            print_table(&filtered, head, json)?;
        }
    }

    Ok(())
}

fn print_table(table: &Table, head: usize, json: bool) -> Result<()> {
    if json {
        let shown = table.take(&(0..head.min(table.num_rows())).collect::<Vec<_>>());
        println!("{}", serde_json::to_string_pretty(&shown)?);
    } else {
        println!(
            "{} rows x {} columns: {}",
            table.num_rows(),
            table.num_columns(),
            table.column_names().join(", ")
        );
        print!("{}", table.preview(head));
    }
    Ok(())
}
