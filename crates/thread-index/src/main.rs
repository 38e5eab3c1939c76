#[cfg(feature = "cli")]
use anyhow::{Context, Result};
#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use std::sync::Arc;
#[cfg(feature = "cli")]
use thread_index::{
    config::IndexConfig, telemetry, Address, DistributionType, NewMessage, SqliteDirectory,
    SqliteMessageStore, ThreadDatabase, ThreadFilter,
};

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "thread-index")]
#[command(version, about = "Inspect and maintain a conversation thread index")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// List conversations, newest first
    List {
        /// Show the archive view instead of the inbox
        #[arg(long)]
        archived: bool,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Store a message and update its thread
    Send {
        address: String,
        body: String,

        /// Epoch milliseconds (defaults to now)
        #[arg(long)]
        timestamp: Option<i64>,
    },

    /// Delete a message and update its thread
    DeleteMessage { id: i64 },

    Archive { thread: i64 },

    Unarchive { thread: i64 },

    /// Clear the unread counter
    Read { thread: i64 },

    /// Re-derive a thread summary from its messages
    Recompute { thread: i64 },

    Stats,

    /// Analyze, vacuum and integrity-check the database
    Maintain,
}

#[cfg(feature = "cli")]
fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing_with(if cli.verbose { "debug" } else { telemetry::DEFAULT_FILTER });

    let config = IndexConfig::from_env()?;
    config.print_config();

    let messages = SqliteMessageStore::new();
    let directory = SqliteDirectory::new();
    let db = ThreadDatabase::open(&config, Arc::new(messages), Arc::new(directory))
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;
    db.with_connection(|conn| {
        SqliteMessageStore::install(conn)?;
        SqliteDirectory::install(conn)
    })?;

    match cli.command {
        Commands::List { archived, limit } => {
            let filter = if archived { ThreadFilter::archived() } else { ThreadFilter::inbox() };
            for record in db.reader.open(&filter, limit)? {
                let record = record?;
                let summary = &record.summary;
                println!(
                    "{:>6}  {:<24}  {:>4} msgs  {:>3} unread  {}",
                    summary.thread_id,
                    record.display_name(),
                    summary.message_count,
                    summary.unread_count,
                    summary.snippet.as_deref().unwrap_or(""),
                );
            }
        }
        Commands::Send { address, body, timestamp } => {
            let address = Address::from_serialized(address);
            let timestamp = timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
            let (thread_id, message_id) = db.write(|tx| {
                let thread_id =
                    db.threads
                        .get_or_create_thread_id_with_tx(tx, &address, DistributionType::Default)?;
                let message_id = messages
                    .insert(tx.connection(), &NewMessage::text(&address, timestamp, &body))?;
                db.threads.recompute_with_tx(tx, thread_id, true)?;
                Ok((thread_id, message_id))
            })?;
            println!("message {} stored in thread {}", message_id, thread_id);
        }
        Commands::DeleteMessage { id } => {
            let outcome = db.write(|tx| {
                let Some(address) = messages.delete(tx.connection(), id)? else {
                    return Ok(None);
                };
                match db.threads.thread_id_for_with_tx(tx, &address)? {
                    Some(thread_id) => Ok(Some((
                        thread_id,
                        db.threads.recompute_with_tx(tx, thread_id, false)?,
                    ))),
                    None => Ok(None),
                }
            })?;
            match outcome {
                Some((thread_id, outcome)) => println!("thread {}: {:?}", thread_id, outcome),
                None => println!("message {} not found", id),
            }
        }
        Commands::Archive { thread } => db.threads.set_archived(thread, true)?,
        Commands::Unarchive { thread } => db.threads.set_archived(thread, false)?,
        Commands::Read { thread } => db.threads.mark_read(thread)?,
        Commands::Recompute { thread } => {
            let outcome = db.threads.recompute(thread, false)?;
            println!("thread {}: {:?}", thread, outcome);
        }
        Commands::Stats => {
            let stats = db.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Maintain => db.maintain()?,
    }
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
