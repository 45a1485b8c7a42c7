//! # LexVault CLI (`lexv`)
//!
//! The `lexv` binary drives a local vault: account management, encrypted
//! document upload and retrieval, question answering, and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! lexv --config ./config/lexvault.toml <command>
//! ```
//!
//! Commands that act on behalf of a user authenticate with `--username`
//! and `--password` (or `LEXV_USERNAME` / `LEXV_PASSWORD`). Each such
//! invocation is a login followed by a logout, and both are audited.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lexv init` | Create the database, key file, and blob directory |
//! | `lexv register` | Create a user account |
//! | `lexv upload <path>` | Encrypt, store, and index a document |
//! | `lexv documents` | List your documents |
//! | `lexv fetch <id>` | Decrypt a document to stdout or `--out` |
//! | `lexv delete <id>` | Delete a document and its index entries |
//! | `lexv ask "<question>"` | Answer a question from your documents |
//! | `lexv analyze <id>` | List potential risks in a document |
//! | `lexv reindex [<id>]` | Retry indexing one or all pending documents |
//! | `lexv audit` | Show audit entries |
//! | `lexv serve` | Start the HTTP API |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lexvault::config;
use lexvault::server;
use lexvault::vault::{IndexingStatus, Vault};
use lexvault_core::models::{Identity, Role};

/// LexVault CLI: an encrypted document vault with owner-scoped
/// question answering and an append-only audit trail.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lexvault.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lexv",
    about = "LexVault: encrypted document vault with private question answering",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lexvault.toml")]
    config: PathBuf,

    /// Account to act as.
    #[arg(long, global = true, env = "LEXV_USERNAME")]
    username: Option<String>,

    /// Password for `--username`.
    #[arg(long, global = true, env = "LEXV_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database, key file, and blob directory.
    ///
    /// Idempotent. An existing key file is loaded, never replaced.
    Init,

    /// Create a user account with the given `--username` and `--password`.
    Register {
        /// Grant the admin role (can read every audit entry).
        #[arg(long)]
        admin: bool,
    },

    /// Encrypt, store, and index a document (.txt, .md, .pdf, .docx).
    Upload {
        path: PathBuf,

        /// Free-text description stored with the document.
        #[arg(long)]
        description: Option<String>,
    },

    /// List your documents, newest first.
    Documents,

    /// Decrypt one of your documents.
    Fetch {
        id: String,

        /// Write to this file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Delete one of your documents, its ciphertext, and its index entries.
    Delete { id: String },

    /// Answer a question using only your documents.
    Ask { question: String },

    /// List potential risks in one of your documents.
    Analyze { id: String },

    /// Re-run indexing for one document, or for every un-indexed one.
    Reindex {
        /// Document to reindex. Omit to process all pending documents.
        id: Option<String>,
    },

    /// Show audit entries (all entries for admins, your own otherwise).
    Audit {
        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Print oldest entries first.
        #[arg(long)]
        oldest_first: bool,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let vault = Vault::open(cfg).await?;

    match cli.command {
        Commands::Init => {
            println!("Vault initialized.");
        }
        Commands::Register { admin } => {
            let (username, password) = credentials(&cli.username, &cli.password)?;
            let role = if admin { Role::Admin } else { Role::User };
            let identity = vault
                .register_with_role(username, password, role)
                .await
                .map_err(public)?;
            println!(
                "Registered {} ({}) as {}",
                identity.username, identity.user_id, identity.role
            );
        }
        Commands::Serve => {
            server::run_server(Arc::new(vault)).await?;
            return Ok(());
        }
        command => {
            let identity = login(&vault, &cli.username, &cli.password).await?;
            let outcome = run_as(&vault, &identity, command).await;
            vault.logout(&identity).await;
            outcome?;
        }
    }

    vault.close().await;
    Ok(())
}

async fn run_as(vault: &Vault, identity: &Identity, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Upload { path, description } => {
            let content = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let report = vault
                .upload(identity, &filename, &content, description.as_deref())
                .await
                .map_err(public)?;
            println!("Stored {} as {}", report.document.filename, report.document.id);
            match report.indexing {
                IndexingStatus::Indexed { chunks } => println!("Indexed {} chunks", chunks),
                IndexingStatus::Failed { reason } => {
                    println!("Not indexed: {} (run `lexv reindex` to retry)", reason)
                }
            }
        }
        Commands::Documents => {
            let docs = vault.documents(identity).await.map_err(public)?;
            if docs.is_empty() {
                println!("No documents.");
            }
            for doc in docs {
                let uploaded = chrono::DateTime::from_timestamp(doc.uploaded_at, 0)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default();
                let state = if doc.indexed_at.is_some() {
                    "indexed"
                } else {
                    "pending"
                };
                println!("{}  {}  {}  [{}]", doc.id, uploaded, doc.filename, state);
                println!("    {}", doc.description);
            }
        }
        Commands::Fetch { id, out } => {
            let (doc, plaintext) = vault.fetch(&id, identity).await.map_err(public)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, plaintext.as_slice())
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Wrote {} to {}", doc.filename, path.display());
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&plaintext)?;
                }
            }
        }
        Commands::Delete { id } => {
            let doc = vault.delete(&id, identity).await.map_err(public)?;
            println!("Deleted {} ({})", doc.filename, doc.id);
        }
        Commands::Ask { question } => {
            let answer = vault.ask(&question, identity).await.map_err(public)?;
            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!();
                println!("Sources:");
                for source in &answer.sources {
                    println!("  - {}", source);
                }
            }
        }
        Commands::Analyze { id } => {
            let analysis = vault.analyze(&id, identity).await.map_err(public)?;
            println!("{}", analysis);
        }
        Commands::Reindex { id: Some(id) } => {
            let chunks = vault.reindex(&id, identity).await.map_err(public)?;
            println!("Indexed {} chunks", chunks);
        }
        Commands::Reindex { id: None } => {
            let results = vault.reindex_pending(identity).await.map_err(public)?;
            if results.is_empty() {
                println!("Nothing to reindex.");
            }
            for (doc, outcome) in results {
                match outcome {
                    Ok(chunks) => println!("{}  {}  indexed {} chunks", doc.id, doc.filename, chunks),
                    Err(e) => println!("{}  {}  failed: {}", doc.id, doc.filename, e.public_message()),
                }
            }
        }
        Commands::Audit {
            limit,
            oldest_first,
        } => {
            let entries = vault
                .audit_entries(identity, limit, !oldest_first)
                .await
                .map_err(public)?;
            for entry in entries {
                println!(
                    "{}  {}  {:<8}  {}  {}",
                    entry.id,
                    entry.timestamp,
                    entry.action.as_str(),
                    entry.actor_id,
                    entry.details
                );
            }
        }
        Commands::Init | Commands::Register { .. } | Commands::Serve => {}
    }
    Ok(())
}

fn credentials<'a>(
    username: &'a Option<String>,
    password: &'a Option<String>,
) -> anyhow::Result<(&'a str, &'a str)> {
    match (username.as_deref(), password.as_deref()) {
        (Some(u), Some(p)) => Ok((u, p)),
        _ => anyhow::bail!("--username and --password (or LEXV_USERNAME / LEXV_PASSWORD) are required"),
    }
}

async fn login(
    vault: &Vault,
    username: &Option<String>,
    password: &Option<String>,
) -> anyhow::Result<Identity> {
    let (username, password) = credentials(username, password)?;
    vault.login(username, password).await.map_err(public)
}

/// Surface only the user-safe message; details are in the logs.
fn public(e: lexvault::error::VaultError) -> anyhow::Error {
    anyhow::anyhow!("{}", e.public_message())
}
