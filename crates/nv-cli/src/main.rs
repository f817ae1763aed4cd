mod paths;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use nv_graph::{LinkUpdate, Notebook};
use nv_store::{Folder, Note, SqliteKv};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::settings::Settings;

pub const PASSWORD_ENV: &str = "NOTEVAULT_PASSWORD";

#[derive(Parser)]
#[command(name = "notevault")]
#[command(about = "Encrypted local notes with wiki-links", long_about = None)]
struct Cli {
    /// Vault directory (defaults to $NOTEVAULT_DATA_DIR, then the platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the vault (salt, settings, default folders)
    Init,

    /// Add a note
    Add {
        title: String,
        #[arg(default_value = "")]
        content: String,
        #[arg(short, long)]
        folder: Option<String>,
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },

    /// Replace a note's title or body
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        folder: Option<String>,
    },

    /// Show one note
    Show { id: String },

    /// Find a note by title (case-insensitive)
    Find { title: String },

    /// List notes, most recent first
    List {
        #[arg(short, long)]
        folder: Option<String>,
    },

    /// Delete a note and its edges
    Delete { id: String },

    /// Notes linking to a note
    Backlinks { id: String },

    /// Notes a note links to
    Links { id: String },

    /// Backlinks and forward links together
    Related { id: String },

    /// Neighbourhood graph around a note
    Graph { id: String },

    /// Run a triple-pattern query, e.g. "?s linksTo note:<id>"
    Query { pattern: String },

    /// List folders
    Folders,

    /// Create or rename a folder
    AddFolder { id: String, name: String },

    /// Delete a folder and its edges
    DeleteFolder { id: String },
}

impl Commands {
    /// Queries read only the index, which holds no note content.
    fn needs_key(&self) -> bool {
        !matches!(self, Commands::Query { .. })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = paths::data_dir(cli.data_dir)?;
    let settings_path = paths::settings_path(&data_dir);
    let settings = Settings::load(&settings_path)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    let kv = Arc::new(SqliteKv::open(&paths::database_path(&data_dir)).await?);
    let notebook = Notebook::open(kv.clone(), settings.notebook_options()).await?;

    let command = cli.command;
    let output = if command.needs_key() {
        let password = read_password()?;
        notebook.unlock(&password).await?;
        let result = run(&notebook, &settings, &settings_path, command).await;
        notebook.lock();
        result?
    } else {
        run(&notebook, &settings, &settings_path, command).await?
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    kv.close().await;
    Ok(())
}

async fn run(
    notebook: &Notebook,
    settings: &Settings,
    settings_path: &std::path::Path,
    command: Commands,
) -> Result<Value> {
    let value = match command {
        Commands::Init => {
            if !settings_path.exists() {
                settings.save(settings_path)?;
            }
            let folders = notebook.list_folders().await?;
            info!(folders = folders.len(), "vault ready");
            json!({ "folders": folders.iter().map(folder_json).collect::<Vec<_>>() })
        }

        Commands::Add {
            title,
            content,
            folder,
            tags,
        } => {
            let folder = folder.unwrap_or_else(|| settings.default_folder.clone());
            let mut note = Note::new(folder, title, content);
            note.tags = tags;
            let saved = notebook.save_note(&note).await?;
            json!({ "note": note_json(&saved.note), "links": links_json(&saved.links) })
        }

        Commands::Edit {
            id,
            title,
            content,
            folder,
        } => {
            let mut note = notebook
                .load_note(&id)
                .await?
                .ok_or_else(|| anyhow!("no note with id {id}"))?;
            if let Some(title) = title {
                note.title = title;
            }
            if let Some(content) = content {
                note.content = content;
            }
            if let Some(folder) = folder {
                note.folder_id = folder;
            }
            let saved = notebook.save_note(&note).await?;
            json!({ "note": note_json(&saved.note), "links": links_json(&saved.links) })
        }

        Commands::Show { id } => match notebook.load_note(&id).await? {
            Some(note) => note_json(&note),
            None => return Err(anyhow!("no note with id {id}")),
        },

        Commands::Find { title } => match notebook.find_note(&title).await? {
            Some(note) => note_json(&note),
            None => Value::Null,
        },

        Commands::List { folder } => {
            let notes = notebook.list_notes(folder.as_deref()).await?;
            Value::Array(notes.iter().map(note_json).collect())
        }

        Commands::Delete { id } => json!({ "deleted": notebook.delete_note(&id).await? }),

        Commands::Backlinks { id } => serde_json::to_value(notebook.backlinks(&id).await?)?,
        Commands::Links { id } => serde_json::to_value(notebook.forward_links(&id).await?)?,
        Commands::Related { id } => serde_json::to_value(notebook.related_notes(&id).await?)?,
        Commands::Graph { id } => serde_json::to_value(notebook.graph_view(&id).await?)?,

        Commands::Query { pattern } => serde_json::to_value(notebook.query(&pattern)?)?,

        Commands::Folders => {
            let folders = notebook.list_folders().await?;
            Value::Array(folders.iter().map(folder_json).collect())
        }

        Commands::AddFolder { id, name } => {
            let folder = Folder::new(id, name);
            notebook.save_folder(&folder).await?;
            folder_json(&folder)
        }

        Commands::DeleteFolder { id } => json!({ "deleted": notebook.delete_folder(&id).await? }),
    };
    Ok(value)
}

fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    rpassword::prompt_password("Vault password: ").context("reading password")
}

fn note_json(note: &Note) -> Value {
    json!({
        "id": note.id,
        "folder_id": note.folder_id,
        "title": note.title,
        "content": note.content,
        "tags": note.tags,
        "updated_at": note.updated_at.to_rfc3339(),
    })
}

fn folder_json(folder: &Folder) -> Value {
    json!({
        "id": folder.id,
        "name": folder.name,
        "parent_id": folder.parent_id,
        "created_at": folder.created_at.to_rfc3339(),
    })
}

fn links_json(update: &LinkUpdate) -> Value {
    json!({
        "added": update.added,
        "removed": update.removed,
        "kept": update.kept,
        "created": update.created,
        "failed": update.failed.iter().map(ToString::to_string).collect::<Vec<_>>(),
    })
}
