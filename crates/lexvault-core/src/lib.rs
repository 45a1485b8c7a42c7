//! # LexVault Core
//!
//! Pure logic shared by every LexVault surface: data models, the
//! overlapping-window chunker, the embedding and answer-model traits, the
//! semantic index trait with an in-memory implementation, and bounded
//! context assembly.
//!
//! This crate performs no filesystem, database, or network I/O.

pub mod answer;
pub mod chunk;
pub mod embedding;
pub mod index;
pub mod models;
