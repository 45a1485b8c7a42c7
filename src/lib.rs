//! # LexVault
//!
//! An encrypted document vault with owner-scoped retrieval-augmented
//! question answering and an append-only audit trail.
//!
//! Documents are encrypted with AES-256-GCM before they touch disk,
//! chunked and embedded into a semantic index partitioned by owner, and
//! answered from through a pluggable answer model. Every security-relevant
//! action is recorded in the audit log.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────────────┐
//! │  Upload  │──▶│ DocumentStore│──▶│ BlobStore (AES-GCM)│
//! └──────────┘   └──────┬───────┘   └────────────────────┘
//!                       │
//!                       ▼
//!               ┌───────────────┐   ┌──────────────┐
//!               │   Ingestion   │──▶│ SQLite index │
//!               │ extract+chunk │   │ owner-scoped │
//!               │    +embed     │   └──────┬───────┘
//!               └───────────────┘          │
//!                                          ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │──────▶│  Query   │──▶ AuditLog
//!                 │  (lexv)  │       │  Engine  │
//!                 │   HTTP   │       └──────────┘
//!                 └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lexv init
//! lexv register --username alice --password '…'
//! lexv upload lease.pdf --username alice
//! lexv ask "When does the lease terminate?" --username alice
//! lexv serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`crypto`] | Key management, AES-256-GCM envelopes, Argon2id |
//! | [`blobs`] | On-disk ciphertext storage |
//! | [`users`] | Registration and authentication |
//! | [`documents`] | Document lifecycle and authorization |
//! | [`extract`] | Plain-text extraction from .txt/.md/.pdf/.docx |
//! | [`embedding`] | Embedding providers and retry policy |
//! | [`llm`] | Answer model providers |
//! | [`sqlite_index`] | Persistent owner-scoped semantic index |
//! | [`ingest`] | Extract, chunk, embed, index |
//! | [`query`] | Question answering and risk analysis |
//! | [`audit`] | Append-only audit log |
//! | [`vault`] | Facade used by the CLI and the server |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod audit;
pub mod blobs;
pub mod config;
pub mod crypto;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod query;
pub mod server;
pub mod sqlite_index;
pub mod users;
pub mod vault;
