//! tablekv command-line tool
//!
//! Inspect and edit a tablekv store file from the shell.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use tablekv::{Store, StoreBuilder, StoreConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tablekv")]
#[command(about = "Inspect and edit tablekv store files")]
struct Args {
    /// Path to the store file
    path: PathBuf,

    /// Table to operate on [default: the store's default table]
    #[arg(short, long, global = true)]
    table: Option<String>,

    /// Open the store read-only
    #[arg(long, global = true)]
    readonly: bool,

    /// TOML file with store settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new store file
    Init {
        /// Replace an existing file
        #[arg(long)]
        overwrite: bool,

        /// Kind tag for the new store
        #[arg(long)]
        kind: Option<String>,
    },
    /// Print the value stored under a key
    Get { key: String },
    /// Store a value under a key
    Set { key: String, value: String },
    /// Remove a key
    Del { key: String },
    /// Move a value to a new key
    Rename { old: String, new: String },
    /// List every entry of the table
    List {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Print the number of entries in the table
    Count,
    /// Remove every entry of the table
    Clear,
    /// List table names
    Tables,
    /// Create a table
    CreateTable { name: String },
    /// Drop a table and its entries
    DropTable { name: String },
    /// Rename a table
    RenameTable { old: String, new: String },
    /// Print or change the default table
    DefaultTable { name: Option<String> },
    /// Print or change the store kind
    Kind { value: Option<String> },
}

impl Command {
    fn writes(&self) -> bool {
        match self {
            Command::Set { .. }
            | Command::Del { .. }
            | Command::Rename { .. }
            | Command::Clear
            | Command::CreateTable { .. }
            | Command::DropTable { .. }
            | Command::RenameTable { .. } => true,
            Command::DefaultTable { name } => name.is_some(),
            Command::Kind { value } => value.is_some(),
            _ => false,
        }
    }
}

/// Render bytes as UTF-8 when possible, hex otherwise
fn render(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => format!("0x{}", hex::encode(bytes)),
    }
}

fn load_config(path: Option<&Path>) -> Result<StoreConfig> {
    match path {
        Some(path) => StoreConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(StoreConfig::default()),
    }
}

fn init(args: &Args, overwrite: bool, kind: Option<&str>) -> Result<()> {
    let mut builder = StoreBuilder::from_config(load_config(args.config.as_deref())?);
    if let Some(kind) = kind {
        builder = builder.kind(kind);
    }

    let mut store = builder.build()?;
    if !store.create(&args.path, overwrite)? {
        bail!(
            "Cannot create {}: file exists (use --overwrite) or is not a regular file",
            args.path.display()
        );
    }
    println!(
        "Created {} (table '{}')",
        args.path.display(),
        store.table().unwrap_or_default()
    );
    Ok(())
}

fn open(args: &Args) -> Result<Store> {
    if args.readonly && args.command.writes() {
        bail!("This command modifies the store and cannot run with --readonly");
    }

    let mut store = Store::with_config(load_config(args.config.as_deref())?)?;
    if !store.open(&args.path, args.readonly) {
        bail!("Cannot open {} as a tablekv store", args.path.display());
    }

    if let Some(table) = &args.table {
        if !store.set_table(table) {
            bail!("No table named '{}'", table);
        }
    }
    debug!("Operating on table {:?}", store.table());
    Ok(store)
}

fn run(args: Args) -> Result<()> {
    if let Command::Init { overwrite, kind } = &args.command {
        return init(&args, *overwrite, kind.as_deref());
    }

    let mut store = open(&args)?;

    match &args.command {
        Command::Init { .. } => unreachable!("handled above"),
        Command::Get { key } => match store.get(key) {
            Some(value) => println!("{}", render(&value)),
            None => bail!("Key '{}' not found", key),
        },
        Command::Set { key, value } => {
            if !store.set(key, value) {
                bail!("Failed to set '{}'", key);
            }
        }
        Command::Del { key } => {
            if !store.erase(key) {
                bail!("Key '{}' not found", key);
            }
        }
        Command::Rename { old, new } => {
            if !store.rename(old, new) {
                bail!("Cannot rename '{}' to '{}'", old, new);
            }
        }
        Command::List { json } => {
            let entries = store.entries_vec();
            if *json {
                let rows: Vec<_> = entries
                    .iter()
                    .map(|entry| {
                        json!({
                            "key": render(&entry.key),
                            "value": render(&entry.value),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for entry in &entries {
                    println!("{}\t{}", render(&entry.key), render(&entry.value));
                }
            }
        }
        Command::Count => println!("{}", store.num_values()),
        Command::Clear => {
            if !store.clear() {
                bail!("Failed to clear table");
            }
        }
        Command::Tables => {
            let default = store.default_table();
            for name in store.table_names() {
                let marker = if default.as_deref() == Some(name.as_str()) {
                    " (default)"
                } else {
                    ""
                };
                println!("{}{}", name, marker);
            }
        }
        Command::CreateTable { name } => {
            if !store.create_table(name) {
                bail!("Table '{}' already exists", name);
            }
        }
        Command::DropTable { name } => {
            // The table opened on entry is current; step off it first
            if store.table().as_deref() == Some(name.as_str()) {
                let other = store
                    .table_names()
                    .into_iter()
                    .find(|candidate| candidate != name);
                if let Some(other) = other {
                    store.set_table(&other);
                }
            }
            if !store.erase_table(name) {
                bail!("Cannot drop table '{}' (missing or default)", name);
            }
        }
        Command::RenameTable { old, new } => {
            if !store.rename_table(old, new) {
                bail!("Cannot rename table '{}' to '{}'", old, new);
            }
        }
        Command::DefaultTable { name: Some(name) } => {
            if !store.set_default_table(name) {
                bail!("No table named '{}'", name);
            }
        }
        Command::DefaultTable { name: None } => {
            println!("{}", store.default_table().unwrap_or_default())
        }
        Command::Kind { value: Some(value) } => {
            if !store.set_kind(value) {
                bail!("Failed to set kind");
            }
        }
        Command::Kind { value: None } => println!("{}", store.kind().unwrap_or_default()),
    }

    store.close();
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    run(Args::parse())
}
