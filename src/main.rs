use clap::{Parser, Subcommand, ValueEnum};
use hierarchy::{
    catalog::{CatalogStorage, HierarchyKind},
    closure::{integrity, NodeId},
    config::HubConfig,
    models::{NoteWithClosure, PlaceWithClosure},
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hierarchy")]
#[command(about = "Inspect and edit the place and note closure tables")]
struct Args {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database, overriding the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Hierarchy {
    Place,
    Note,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Link a stored record that has no hierarchy rows, optionally below a parent
    Insert {
        hierarchy: Hierarchy,
        id: NodeId,
        #[arg(long)]
        parent: Option<NodeId>,
    },
    /// Re-attach a node and its subtree; omit --parent to make it a root
    Move {
        hierarchy: Hierarchy,
        id: NodeId,
        #[arg(long)]
        parent: Option<NodeId>,
    },
    /// Remove a node; with --cascade its whole subtree goes too
    Delete {
        hierarchy: Hierarchy,
        id: NodeId,
        #[arg(long)]
        cascade: bool,
    },
    /// Ancestors of a node, nearest first
    Ancestors { hierarchy: Hierarchy, id: NodeId },
    /// Descendants of a node, breadth first
    Descendants { hierarchy: Hierarchy, id: NodeId },
    /// Whether <ancestor> is a proper ancestor of <descendant>
    IsAncestor {
        hierarchy: Hierarchy,
        ancestor: NodeId,
        descendant: NodeId,
    },
    /// Every closure row
    Edges { hierarchy: Hierarchy },
    /// Verify the closure rows against the parent links they imply
    Check { hierarchy: Hierarchy },
    /// JSON schema of the closure-decorated records
    Schema,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

impl From<Hierarchy> for HierarchyKind {
    fn from(hierarchy: Hierarchy) -> Self {
        match hierarchy {
            Hierarchy::Place => HierarchyKind::Place,
            Hierarchy::Note => HierarchyKind::Note,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (silently ignore if not found)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = HubConfig::load(args.config.as_deref())?;
    if let Some(db) = args.db {
        config.db_path = db;
    }

    // Logs go to stderr so stdout stays parseable JSON
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Command::Schema = args.command {
        return print_json(&json!({
            "place": schemars::schema_for!(PlaceWithClosure),
            "note": schemars::schema_for!(NoteWithClosure),
        }));
    }

    tracing::debug!(db = %config.db_path.display(), "Opening catalog");
    let storage = CatalogStorage::new(&config).await?;

    match args.command {
        Command::Insert { hierarchy, id, parent } => {
            storage.link(hierarchy.into(), id, parent).await?;
            print_json(&json!({ "inserted": id, "parent": parent }))
        }
        Command::Move { hierarchy, id, parent } => {
            match hierarchy {
                Hierarchy::Place => storage.place_move(id, parent).await?,
                Hierarchy::Note => storage.note_move(id, parent).await?,
            }
            print_json(&json!({ "moved": id, "parent": parent }))
        }
        Command::Delete { hierarchy, id, cascade } => {
            let removed = match hierarchy {
                Hierarchy::Place => storage.place_delete(id, cascade).await?,
                Hierarchy::Note => storage.note_delete(id, cascade).await?,
            };
            print_json(&json!({ "removed": removed }))
        }
        Command::Ancestors { hierarchy, id } => {
            print_json(&storage.hierarchy(hierarchy.into()).ancestors(id).await?)
        }
        Command::Descendants { hierarchy, id } => {
            print_json(&storage.hierarchy(hierarchy.into()).descendants(id).await?)
        }
        Command::IsAncestor { hierarchy, ancestor, descendant } => {
            let result = storage
                .hierarchy(hierarchy.into())
                .is_ancestor(ancestor, descendant)
                .await?;
            print_json(&json!({ "is_ancestor": result }))
        }
        Command::Edges { hierarchy } => {
            print_json(&storage.hierarchy(hierarchy.into()).edges().await?)
        }
        Command::Check { hierarchy } => {
            let edges = storage.hierarchy(hierarchy.into()).edges().await?;
            let violations = integrity::check(&edges);
            print_json(&json!({ "ok": violations.is_empty(), "violations": violations }))?;
            if !violations.is_empty() {
                anyhow::bail!("{} closure violation(s)", violations.len());
            }
            Ok(())
        }
        Command::Schema => Ok(()),
    }
}
