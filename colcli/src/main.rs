//! colcli - inspect and administer a journaled colindex store
//!
//! Every invocation replays the journal under `--data`, runs one command and
//! exits. Values are taken and printed as UTF-8 (lossy for binary cells).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colindex::types::{Column, RowResult};
use colindex::{IndexDefinition, IndexedTable, JournalMode, MemoryStore, Store, StoreConfig, Table};
use colored::Colorize;
use comfy_table::Table as Grid;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "colcli", about = "wide-column tables with transparent secondary indexes")]
struct Args {
    /// Journal directory
    #[arg(long, env = "COLINDEX_DATA", default_value = "./colindex-data")]
    data: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List tables
    Tables,
    /// Create a table with the given column families
    CreateTable {
        name: String,
        #[arg(required = true)]
        families: Vec<String>,
    },
    /// Drop a table together with its indexes
    DropTable { name: String },
    /// Write columns as qualifier=value pairs
    Put {
        table: String,
        row: String,
        family: String,
        #[arg(required = true)]
        columns: Vec<String>,
    },
    /// Read a row (all columns of the family if none given)
    Get {
        table: String,
        row: String,
        family: String,
        qualifiers: Vec<String>,
    },
    /// Delete columns (the whole family of the row if none given)
    Delete {
        table: String,
        row: String,
        family: String,
        qualifiers: Vec<String>,
    },
    /// Scan rows in [start, end)
    Scan {
        table: String,
        family: String,
        #[arg(long, default_value = "")]
        start: String,
        #[arg(long, default_value = "")]
        end: String,
        #[arg(long = "column")]
        qualifiers: Vec<String>,
    },
    /// Create and backfill an index
    CreateIndex {
        table: String,
        name: String,
        family: String,
        #[arg(required = true)]
        columns: Vec<String>,
        #[arg(long)]
        unique: bool,
        #[arg(long = "include")]
        include: Vec<String>,
    },
    /// Drop an index (no-op if absent)
    DropIndex { table: String, name: String },
    /// Show index definitions of a table
    Indexes { table: String },
    /// Base rows whose key columns equal the given values
    Lookup {
        table: String,
        index: String,
        #[arg(required = true)]
        values: Vec<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = StoreConfig::new(JournalMode::Sync).path(&args.data);
    let store = Arc::new(
        MemoryStore::open(&config).with_context(|| format!("opening {}", args.data.display()))?,
    );

    match args.cmd {
        Command::Tables => {
            for name in store.table_names() {
                println!("{name}");
            }
        }
        Command::CreateTable { name, families } => {
            let families: Vec<&str> = families.iter().map(String::as_str).collect();
            store.create_table(&name, &families)?;
            ok(&format!("table '{name}' created"));
        }
        Command::DropTable { name } => {
            // Indexes and their metadata go with the table
            open(&store, &name)?.drop_table()?;
            ok(&format!("table '{name}' dropped"));
        }
        Command::Put { table, row, family, columns } => {
            let columns = columns.iter().map(|c| parse_column(c)).collect::<Result<Vec<_>>>()?;
            open(&store, &table)?.put_columns(row.as_bytes(), &family, &columns)?;
            ok(&format!("{} column(s) written", columns.len()));
        }
        Command::Get { table, row, family, qualifiers } => {
            let qualifiers: Vec<&[u8]> = qualifiers.iter().map(|q| q.as_bytes()).collect();
            let cells = open(&store, &table)?.get(row.as_bytes(), &family, &qualifiers)?;
            let mut result = RowResult::new(row.as_bytes());
            if !cells.is_empty() {
                result.families.insert(family, cells);
            }
            print_rows(&[result]);
        }
        Command::Delete { table, row, family, qualifiers } => {
            let qualifiers: Vec<&[u8]> = qualifiers.iter().map(|q| q.as_bytes()).collect();
            open(&store, &table)?.delete(row.as_bytes(), &family, &qualifiers)?;
            ok("deleted");
        }
        Command::Scan { table, family, start, end, qualifiers } => {
            let qualifiers: Vec<&[u8]> = qualifiers.iter().map(|q| q.as_bytes()).collect();
            let rows = open(&store, &table)?.scan(start.as_bytes(), end.as_bytes(), &family, &qualifiers)?;
            print_rows(&rows);
        }
        Command::CreateIndex { table, name, family, columns, unique, include } => {
            let mut definition = IndexDefinition::new(&name, &family, columns)?.unique(unique);
            if !include.is_empty() {
                definition = definition.include(include)?;
            }
            open(&store, &table)?.create_index(definition)?;
            ok(&format!("index '{name}' created on '{table}'"));
        }
        Command::DropIndex { table, name } => {
            open(&store, &table)?.drop_index(&name)?;
            ok(&format!("index '{name}' dropped"));
        }
        Command::Indexes { table } => {
            let table = open(&store, &table)?;
            let mut grid = Grid::new();
            grid.set_header(vec!["name", "family", "columns", "include", "unique", "entries"]);
            for def in table.indexes() {
                let entries = table
                    .index(def.name())
                    .map(|b| b.cardinality())
                    .transpose()?
                    .unwrap_or(0);
                grid.add_row(vec![
                    def.name().to_string(),
                    def.family().to_string(),
                    def.columns().join(","),
                    def.include_columns().join(","),
                    def.is_unique().to_string(),
                    entries.to_string(),
                ]);
            }
            println!("{grid}");
        }
        Command::Lookup { table, index, values } => {
            let values: Vec<&[u8]> = values.iter().map(|v| v.as_bytes()).collect();
            let rows = open(&store, &table)?.lookup(&index, &values)?;
            let keys: Vec<String> = rows.iter().map(|r| String::from_utf8_lossy(r).into_owned()).collect();
            println!("{}", serde_json::to_string_pretty(&keys)?);
        }
    }

    store.sync()?;
    Ok(())
}

fn open(store: &Arc<MemoryStore>, table: &str) -> Result<IndexedTable> {
    if !store.table_exists(table) {
        bail!("table '{table}' does not exist");
    }
    Ok(IndexedTable::open(store.clone(), table)?)
}

fn parse_column(raw: &str) -> Result<Column> {
    let Some((qualifier, value)) = raw.split_once('=') else {
        bail!("expected qualifier=value, got '{raw}'");
    };
    if qualifier.is_empty() {
        bail!("empty qualifier in '{raw}'");
    }
    Ok(Column::new(qualifier, value))
}

fn print_rows(rows: &[RowResult]) {
    let mut grid = Grid::new();
    grid.set_header(vec!["row", "family", "qualifier", "value", "timestamp"]);
    for row in rows {
        for (family, cells) in &row.families {
            for (qualifier, cell) in cells {
                grid.add_row(vec![
                    String::from_utf8_lossy(&row.row).into_owned(),
                    family.clone(),
                    String::from_utf8_lossy(qualifier).into_owned(),
                    String::from_utf8_lossy(&cell.value).into_owned(),
                    cell.timestamp.to_string(),
                ]);
            }
        }
    }
    println!("{grid}");
}

fn ok(msg: &str) {
    println!("{} {}", "ok".green().bold(), msg);
}
