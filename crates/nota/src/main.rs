//! Nota CLI - offline-first notes with tags and archiving.

mod config;
mod logging;

use std::future::Future;
use std::io::{self, Read};
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nota_core::{
    ConnectivityMonitor, CreateNote, CreateTag, Error, Note, Reachability,
    ReconcileOutcome, ReconcileReport, SyncEngine, SyncEvent, TagBook, UpdateNote, UpdateTag,
};
use nota_files::FileStore;
use nota_http::{ApiClient, HttpNoteService, HttpTagService};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::Config;
use crate::logging::{init_logging, Verbosity};

type Engine = SyncEngine<HttpNoteService, FileStore>;
type Tags = TagBook<HttpTagService, Rc<FileStore>>;

#[derive(Parser)]
#[command(name = "nota", about = "Offline-first notes with tags and archiving", version)]
struct Cli {
    /// Config file (default: ~/.config/nota/config.toml)
    #[arg(long, global = true, env = "NOTA_CONFIG")]
    config: Option<PathBuf>,
    /// More log output (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List notes
    Ls {
        /// Show archived notes instead of active ones
        #[arg(long)]
        archived: bool,
        /// Only notes carrying any of these comma-separated tag IDs
        #[arg(long)]
        tags: Option<String>,
    },
    /// Show one or more notes
    Show {
        /// Comma-separated note IDs
        #[arg(allow_hyphen_values = true)]
        ids: String,
    },
    /// Add a new note
    Add {
        /// Note title
        #[arg(long)]
        title: String,
        /// Note content (reads from stdin if not provided)
        #[arg(long)]
        content: Option<String>,
        /// Comma-separated tag IDs
        #[arg(long)]
        tags: Option<String>,
    },
    /// Edit a note
    Edit {
        /// Note ID
        #[arg(allow_negative_numbers = true)]
        id: i64,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New content (reads from stdin if not provided and stdin is not a tty)
        #[arg(long)]
        content: Option<String>,
        /// Replace the tags with these comma-separated tag IDs ("" clears them)
        #[arg(long)]
        tags: Option<String>,
    },
    /// Move a note to the archive
    Archive {
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },
    /// Bring a note back from the archive
    Unarchive {
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },
    /// Delete one or more notes
    Rm {
        /// Comma-separated note IDs
        #[arg(allow_hyphen_values = true)]
        ids: String,
    },
    /// Attach a tag to a note
    Tag {
        #[arg(allow_negative_numbers = true)]
        note: i64,
        tag: i64,
    },
    /// Detach a tag from a note
    Untag {
        #[arg(allow_negative_numbers = true)]
        note: i64,
        tag: i64,
    },
    /// Manage tags (lists them by default)
    Tags {
        #[command(subcommand)]
        command: Option<TagCommands>,
    },
    /// Replay changes made while offline
    Sync,
    /// Show connectivity and pending changes
    Status,
    /// Watch connectivity and sync whenever the server comes back
    Watch,
}

#[derive(Subcommand)]
enum TagCommands {
    /// List all tags
    Ls,
    /// Create a tag
    Add {
        name: String,
        /// Hex color, e.g. #ff8800
        #[arg(long)]
        color: String,
    },
    /// Rename or recolor a tag
    Edit {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Delete one or more tags
    Rm {
        /// Comma-separated tag IDs
        ids: String,
    },
}

fn parse_ids(ids: &str) -> Result<Vec<i64>> {
    ids.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().context(format!("Invalid ID: {}", s)))
        .collect()
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read from stdin")?;
    Ok(buf)
}

fn is_stdin_tty() -> bool {
    atty::is(atty::Stream::Stdin)
}

fn note_line(note: &Note) -> String {
    let mut line = format!("{}: {}", note.id, note.title);
    if !note.tags.is_empty() {
        let names: Vec<String> = note.tags.iter().map(|t| t.label()).collect();
        line.push_str(&format!(" [{}]", names.join(",")));
    }
    if note.is_temporary() {
        line.push_str(" (not yet synced)");
    }
    line
}

fn print_note(note: &Note) {
    println!("# {}\n", note.title);
    println!("{}", note.content);
    println!("\n---\n");
    println!("ID: {}", note.id);
    println!("Created: {}", note.created_at);
    println!("Last modified: {}", note.updated_at);
    if note.archived {
        println!("Archived: yes");
    }
    let tags: Vec<String> = note
        .tags
        .iter()
        .map(|t| format!("{} ({})", t.label(), t.id))
        .collect();
    println!("Tags: {}", tags.join(", "));
}

fn print_report(report: &ReconcileReport) {
    println!("Replayed {} pending change(s)", report.replayed);
    for failed in &report.failed {
        eprintln!("Dropped {}: {}", failed.change, failed.reason);
    }
    if report.requeued > 0 {
        println!(
            "Connection lost; {} change(s) kept for the next sync",
            report.requeued
        );
    }
}

fn print_outcome(outcome: &ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::NothingPending => println!("Nothing to sync"),
        ReconcileOutcome::AlreadyRunning => println!("A sync is already running"),
        ReconcileOutcome::Completed(report) | ReconcileOutcome::Interrupted(report) => {
            print_report(report)
        }
    }
}

/// Tell the user when the last command only took effect locally.
fn report_queued(events: &mut broadcast::Receiver<SyncEvent>) {
    let mut queued = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SyncEvent::ChangeQueued { .. }) {
            queued = true;
        }
    }
    if queued {
        eprintln!("Server unreachable: saved locally, will sync when back online");
    }
}

/// Replay leftovers from earlier offline sessions before doing anything else.
async fn catch_up(engine: &Engine) {
    match engine.sync_pending_changes().await {
        Ok(ReconcileOutcome::Completed(report)) => print_report(&report),
        Ok(outcome) => debug!(?outcome, "catch-up sync"),
        Err(e) if e.is_network() => debug!(error = %e, "still offline"),
        Err(e) => warn!(error = %e, "catch-up sync failed"),
    }
}

fn not_found(e: &Error) -> bool {
    matches!(e, Error::NotFound(_))
}

/// Probe the server every interval until `shutdown` resolves.
async fn watch<F>(
    engine: &Engine,
    probe: &HttpNoteService,
    config: &Config,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let monitor = ConnectivityMonitor::new(engine, false);
    let mut interval = tokio::time::interval(config.probe_interval());
    tokio::pin!(shutdown);

    println!(
        "Watching {} every {}s (Ctrl-C to stop)",
        config.server.url, config.sync.probe_interval_secs
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let was_online = monitor.is_online();
                match monitor.poll(probe).await {
                    Ok(Some(outcome)) => print_outcome(&outcome),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "sync failed"),
                }
                if monitor.is_online() != was_online {
                    println!("{}", if monitor.is_online() { "Online" } else { "Offline" });
                }
            }
            _ = &mut shutdown => {
                println!("Stopped watching");
                return Ok(());
            }
        }
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(Verbosity::from_flags(cli.quiet, cli.verbose));

    let config = Config::load_from(cli.config.clone())?;
    let data_dir = config.data_dir();
    let store = Rc::new(FileStore::open(&data_dir).context("Failed to open data directory")?);

    let client = ApiClient::new(config.client_config()?)?;
    let notes = HttpNoteService::new(client.clone());
    let engine: Engine = SyncEngine::with_shared_store(notes.clone(), Rc::clone(&store));
    let tags: Tags = TagBook::new(HttpTagService::new(client), Rc::clone(&store));

    match cli.command {
        Commands::Sync => {
            let outcome = engine.sync_pending_changes().await?;
            print_outcome(&outcome);
            return Ok(());
        }
        Commands::Status => {
            let online = notes.is_reachable().await;
            let pending = engine.pending_changes().await?;
            let cached = engine.cached_notes().await?;

            let state = if online { "online" } else { "offline" };
            println!("Server: {} ({})", config.server.url, state);
            println!("Data: {}", data_dir.display());
            println!("Cached notes: {}", cached.len());
            println!("Pending changes: {}", pending.len());
            for change in &pending {
                println!("  - {}", change);
            }
            return Ok(());
        }
        Commands::Watch => return watch(&engine, &notes, &config, ctrl_c()).await,
        _ => {}
    }

    catch_up(&engine).await;
    let mut events = engine.subscribe();

    match cli.command {
        Commands::Sync | Commands::Status | Commands::Watch => unreachable!(),

        Commands::Ls { archived, tags } => {
            let tag_ids = tags.map(|t| parse_ids(&t)).transpose()?.unwrap_or_default();
            if archived && !tag_ids.is_empty() {
                bail!("--tags only filters active notes");
            }

            let listing = engine.list_notes().await?;
            if listing.is_offline() {
                eprintln!("Server unreachable: showing cached notes");
            }
            let notes = if archived {
                listing.archived_notes()
            } else {
                listing.active_notes(&tag_ids)
            };
            for note in notes {
                println!("{}", note_line(note));
            }
        }

        Commands::Show { ids } => {
            let ids = parse_ids(&ids)?;
            if ids.is_empty() {
                eprintln!("No note IDs provided");
                std::process::exit(1);
            }

            let mut missing = Vec::new();
            let mut first = true;
            for id in &ids {
                match engine.get_note(*id).await {
                    Ok(note) => {
                        if !first {
                            println!("\n{}\n", "=".repeat(40));
                        }
                        first = false;
                        print_note(&note);
                    }
                    Err(e) if not_found(&e) => missing.push(*id),
                    Err(e) => return Err(e.into()),
                }
            }

            if !missing.is_empty() {
                for id in &missing {
                    eprintln!("Note {} not found", id);
                }
                std::process::exit(1);
            }
        }

        Commands::Add {
            title,
            content,
            tags,
        } => {
            let content = match content {
                Some(c) => c,
                None if !is_stdin_tty() => read_stdin()?,
                None => bail!("--content is required when stdin is a terminal"),
            };
            let mut create = CreateNote::new(title, content);
            if let Some(tags) = tags {
                create = create.with_tags(parse_ids(&tags)?);
            }
            let note = engine.create_note(create).await?;
            println!("Added note {}", note.id);
        }

        Commands::Edit {
            id,
            title,
            content,
            tags,
        } => {
            let content = if content.is_none() && !is_stdin_tty() {
                Some(read_stdin()?)
            } else {
                content
            };

            let update = UpdateNote {
                title,
                content,
                archived: None,
                tags: tags.map(|t| parse_ids(&t)).transpose()?,
            };

            let mut updated_fields = Vec::new();
            if update.title.is_some() {
                updated_fields.push("title");
            }
            if update.content.is_some() {
                updated_fields.push("content");
            }
            if update.tags.is_some() {
                updated_fields.push("tags");
            }

            if updated_fields.is_empty() {
                eprintln!("Nothing to update");
                std::process::exit(1);
            }

            match engine.update_note(id, update).await {
                Ok(_) => println!("Edited note {}: Updated {}", id, updated_fields.join(", ")),
                Err(e) if not_found(&e) => {
                    eprintln!("Note {} not found", id);
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Archive { id } => {
            engine.archive_note(id).await?;
            println!("Archived note {}", id);
        }

        Commands::Unarchive { id } => {
            engine.unarchive_note(id).await?;
            println!("Unarchived note {}", id);
        }

        Commands::Rm { ids } => {
            let ids = parse_ids(&ids)?;
            if ids.is_empty() {
                eprintln!("No note IDs provided");
                std::process::exit(1);
            }

            let mut missing = Vec::new();
            for id in &ids {
                match engine.delete_note(*id).await {
                    Ok(()) => println!("Deleted note {}", id),
                    Err(e) if not_found(&e) => missing.push(*id),
                    Err(e) => return Err(e.into()),
                }
            }

            if !missing.is_empty() {
                report_queued(&mut events);
                for id in &missing {
                    eprintln!("Note {} not found", id);
                }
                std::process::exit(1);
            }
        }

        Commands::Tag { note, tag } => {
            let note = engine.add_tag_to_note(note, tag).await?;
            println!("Tagged note {}: {}", note.id, note_line(&note));
        }

        Commands::Untag { note, tag } => {
            let note = engine.remove_tag_from_note(note, tag).await?;
            println!("Untagged note {}: {}", note.id, note_line(&note));
        }

        Commands::Tags { command } => match command.unwrap_or(TagCommands::Ls) {
            TagCommands::Ls => {
                let listing = tags.list_tags().await?;
                if listing.is_offline() {
                    eprintln!("Server unreachable: showing cached tags");
                }
                for tag in listing.items {
                    println!("{}: {} ({})", tag.id, tag.name, tag.color);
                }
            }
            TagCommands::Add { name, color } => {
                let tag = tags.create_tag(CreateTag::new(name, color)).await?;
                println!("Added tag {}: {}", tag.id, tag.name);
            }
            TagCommands::Edit { id, name, color } => {
                let tag = tags.update_tag(id, UpdateTag { name, color }).await?;
                println!("Edited tag {}: {} ({})", tag.id, tag.name, tag.color);
            }
            TagCommands::Rm { ids } => {
                for id in parse_ids(&ids)? {
                    tags.delete_tag(id).await?;
                    println!("Deleted tag {}", id);
                }
            }
        },
    }

    report_queued(&mut events);
    Ok(())
}
