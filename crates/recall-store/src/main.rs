// crates/recall-store/src/main.rs
// Recall admin CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use recall::config::{self, EnvConfig, RecallConfig, env::ensure_parent_dir};
use recall::store::operations_from_json;
use recall::types::{IndexMode, ListNamespacesOp, Namespace, SearchOp};
use recall::{Store, StoreOptions};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "recall")]
#[command(about = "Namespaced key-value store with semantic search")]
#[command(version)]
struct Cli {
    /// Database file (overrides DATABASE_URL / RECALL_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file (overrides RECALL_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an item (value is JSON; `null` deletes)
    Put {
        /// Dot-separated namespace, e.g. users.admin
        namespace: String,
        key: String,
        value: String,
        /// Store without embedding
        #[arg(long, conflicts_with = "fields")]
        no_index: bool,
        /// Embed these field paths instead of the configured ones
        #[arg(long, value_delimiter = ',')]
        fields: Option<Vec<String>>,
    },

    /// Read an item
    Get { namespace: String, key: String },

    /// Delete an item
    Delete { namespace: String, key: String },

    /// Search under a namespace prefix
    Search {
        /// Dot-separated prefix (empty searches everything)
        #[arg(default_value = "")]
        prefix: String,
        /// Natural-language query (semantic search)
        #[arg(short, long)]
        query: Option<String>,
        /// JSON filter, e.g. '{"status": "active"}'
        #[arg(short, long)]
        filter: Option<String>,
        #[arg(long, default_value_t = recall::types::DEFAULT_SEARCH_LIMIT)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// List stored namespaces
    ListNamespaces {
        /// Dot-separated prefix condition (`*` matches one segment)
        #[arg(long)]
        prefix: Option<String>,
        /// Dot-separated suffix condition (`*` matches one segment)
        #[arg(long)]
        suffix: Option<String>,
        #[arg(long)]
        max_depth: Option<usize>,
        #[arg(long, default_value_t = recall::types::DEFAULT_LIST_LIMIT)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Run a JSON array of operations from stdin
    Batch,

    /// Rebuild all vector entries
    Reindex,

    /// Show item and vector counts
    Stats,

    /// Validate configuration
    Config,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_json(raw: &str, what: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).with_context(|| format!("{what} is not valid JSON"))
}

async fn open_store(cli_db: Option<PathBuf>, cli_config: Option<PathBuf>) -> Result<Store> {
    let env = EnvConfig::load();
    let file = RecallConfig::load(cli_config.as_deref(), env.config_path.as_deref())?;
    let index = config::resolve_index_config(&file, &env)?;

    let db_path = cli_db.unwrap_or_else(|| env.db_path.clone());
    ensure_parent_dir(&db_path)
        .with_context(|| format!("Failed to create directory for {}", db_path.display()))?;
    info!("Opening store at {}", db_path.display());

    let mut options = StoreOptions::file(&db_path);
    if let Some(index) = index {
        options = options.with_index(index);
    }
    let store = Store::new(options).await?;
    store.setup().await?;
    Ok(store)
}

fn run_config(cli_config: Option<PathBuf>) -> Result<()> {
    let env = EnvConfig::load();
    let mut validation = env.validate();
    match RecallConfig::load(cli_config.as_deref(), env.config_path.as_deref()) {
        Ok(file) => validation.merge(config::validate(&file, &env)),
        Err(e) => validation.add_error(e.to_string()),
    }

    println!("Database: {}", env.db_path.display());
    println!("API keys: {}", env.api_keys.summary());
    println!("{}", validation.report());

    if validation.is_valid() {
        Ok(())
    } else {
        anyhow::bail!("configuration has errors")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env files (global first, then working directory)
    let _ = dotenvy::from_path(config::env::recall_home().join(".env"));
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::Config = cli.command {
        return run_config(cli.config);
    }

    let store = open_store(cli.db, cli.config).await?;

    match cli.command {
        Commands::Put {
            namespace,
            key,
            value,
            no_index,
            fields,
        } => {
            let value = parse_json(&value, "value")?;
            let index = match (no_index, fields) {
                (true, _) => IndexMode::Disabled,
                (false, Some(fields)) => IndexMode::Fields(fields),
                (false, None) => IndexMode::Default,
            };
            store
                .put_with_index(Namespace::parse_dotted(&namespace), key, value, index)
                .await?;
        }
        Commands::Get { namespace, key } => {
            let item = store.get(Namespace::parse_dotted(&namespace), key).await?;
            print_json(&item)?;
        }
        Commands::Delete { namespace, key } => {
            store.delete(Namespace::parse_dotted(&namespace), key).await?;
        }
        Commands::Search {
            prefix,
            query,
            filter,
            limit,
            offset,
        } => {
            let mut op = SearchOp::new(Namespace::parse_dotted(&prefix))
                .limit(limit)
                .offset(offset);
            if let Some(query) = query {
                op = op.query(query);
            }
            if let Some(filter) = filter {
                op = op.filter(parse_json(&filter, "filter")?);
            }
            print_json(&store.search(op).await?)?;
        }
        Commands::ListNamespaces {
            prefix,
            suffix,
            max_depth,
            limit,
            offset,
        } => {
            let mut op = ListNamespacesOp::new().limit(limit).offset(offset);
            if let Some(prefix) = prefix {
                op = op.prefix(Namespace::parse_dotted(&prefix).segments().to_vec());
            }
            if let Some(suffix) = suffix {
                op = op.suffix(Namespace::parse_dotted(&suffix).segments().to_vec());
            }
            if let Some(depth) = max_depth {
                op = op.max_depth(depth);
            }
            print_json(&store.list_namespaces(op).await?)?;
        }
        Commands::Batch => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read batch from stdin")?;
            let operations = operations_from_json(parse_json(&input, "batch")?)?;
            print_json(&store.batch(operations).await?)?;
        }
        Commands::Reindex => {
            print_json(&store.reindex().await?)?;
        }
        Commands::Stats => {
            print_json(&store.stats().await?)?;
        }
        Commands::Config => {}
    }

    Ok(())
}
