use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use clap::{Parser, Subcommand, ValueEnum};
use revtrack_graph::{Changeset, Direction, Environment, HistoryTree, RedbContainer, RevisionGraph, Timestamp};

/// Inspect and edit the revision history stored in a document container.
#[derive(Parser, Debug)]
#[command(name = "revtrack", version, about)]
struct Cli {
    /// Container file. Defaults to the container in the data directory.
    #[arg(long, short)]
    container: Option<PathBuf>,

    /// Which history to operate on.
    #[arg(long, short, value_enum, default_value_t = DirectionArg::Undo)]
    direction: DirectionArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DirectionArg {
    Undo,
    Redo,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Undo => Direction::Undo,
            DirectionArg::Redo => Direction::Redo,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List changesets, oldest first.
    List,
    /// Show one changeset with its edits.
    Show { id: u64 },
    /// Print the persisted history tree as JSON.
    Export,
    /// Remove a changeset, repair its descendants, and save.
    Remove {
        id: u64,
        /// Drop the removed changeset's edits from the report.
        #[arg(long)]
        clear_edits: bool,
    },
    /// Print counts and check graph consistency.
    Stats,
}

fn format_time(timestamp: Timestamp) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn format_ids<'a>(ids: impl IntoIterator<Item = &'a u64>) -> String {
    let ids: Vec<String> = ids.into_iter().map(u64::to_string).collect();
    if ids.is_empty() {
        "-".to_string()
    } else {
        ids.join(",")
    }
}

fn print_changeset(changeset: &Changeset, with_edits: bool) {
    println!(
        "#{:<5} {}  {:<12} parents={} children={}{}  {}",
        changeset.id(),
        format_time(changeset.timestamp()),
        changeset.author(),
        format_ids(changeset.parents()),
        format_ids(changeset.children()),
        if changeset.is_corrected() { " corrected" } else { "" },
        changeset.comment(),
    );
    if !with_edits {
        return;
    }
    for edit in changeset.edits() {
        let position = edit.position();
        let moved = edit
            .moved_position()
            .map(|m| format!(" -> {:?}..{:?}", m.start(), m.end()))
            .unwrap_or_default();
        let detail = edit.text().or(edit.entity()).unwrap_or("");
        println!(
            "    {:?} {:?}..{:?}{moved} {detail:?}",
            edit.kind(),
            position.start(),
            position.end()
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let env = Arc::new(Environment::with_builtins());
    let path = cli
        .container
        .unwrap_or_else(|| env.config.default_container_path());
    let direction = Direction::from(cli.direction);

    tracing::info!("Opening {}", path.display());
    let container = RedbContainer::open(&path)?;
    let mut graph = RevisionGraph::load_or_new(&container, direction, Arc::clone(&env))
        .with_context(|| format!("Failed to load {direction:?} history from {}", path.display()))?;

    match cli.command {
        Command::List => {
            for changeset in graph.changesets() {
                print_changeset(changeset, false);
            }
        }
        Command::Show { id } => {
            let changeset = graph
                .find_changeset(id)
                .with_context(|| format!("No changeset with id {id}"))?;
            print_changeset(changeset, true);
        }
        Command::Export => {
            let bytes = HistoryTree::from_graph(&graph)?.to_bytes()?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes).context("Failed to write tree")?;
            writeln!(stdout).context("Failed to write tree")?;
        }
        Command::Remove { id, clear_edits } => {
            let removed = graph.remove_changeset(id, clear_edits)?;
            graph.save(&container)?;
            println!("Removed changeset:");
            print_changeset(&removed, true);
        }
        Command::Stats => {
            let edits: usize = graph.changesets().map(|cs| cs.edits().len()).sum();
            let edges: usize = graph.changesets().map(|cs| cs.parents().len()).sum();
            let corrected = graph.changesets().filter(|cs| cs.is_corrected()).count();
            println!("direction:  {direction:?}");
            println!("created:    {}", format_time(graph.created()));
            println!("changesets: {}", graph.current_revision_count());
            println!("edits:      {edits}");
            println!("edges:      {edges}");
            println!("corrected:  {corrected}");
            println!("anchors:    {}", graph.anchors().len());
            match graph.validate() {
                Ok(()) => println!("consistent: yes"),
                Err(e) => println!("consistent: no ({e})"),
            }
        }
    }

    Ok(())
}
