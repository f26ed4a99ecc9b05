//! Conversational memory for AI chat agents — persistent sessions, hybrid
//! recall, and cross-device sync.
//!
//! mnemo persists chat sessions into SQLite, indexes them for combined
//! vector + keyword retrieval, and reassembles relevant past context on
//! demand. Multiple local replicas stay consistent through optimistic
//! versioning with pluggable conflict resolution.
//!
//! # Architecture
//!
//! - **Storage**: SQLite with FTS5 for the lexical index and
//!   [sqlite-vec](https://github.com/asg017/sqlite-vec) for per-session
//!   embeddings; projections are kept in lock-step with session rows
//! - **Embeddings**: local ONNX Runtime (all-MiniLM-L6-v2, 384 dimensions),
//!   an OpenAI-compatible HTTP endpoint, or a deterministic offline fallback
//! - **Recall**: weighted merge of vector similarity and BM25 keyword score
//!   with exponential recency decay and deterministic ordering
//! - **Sync**: upload/download against a replica directory or HTTP service,
//!   optimistic per-session versioning, last-write-wins by default
//!
//! # Modules
//!
//! - [`config`] — TOML + environment configuration
//! - [`db`] — SQLite initialization, schema, and migrations
//! - [`store`] — the [`store::StorageBackend`] contract and SQLite backend
//! - [`embedding`] — text-to-vector providers
//! - [`index`] — indexing triggers and the keyword/summary/embedding pipeline
//! - [`recall`] — hybrid query execution and context assembly
//! - [`sync`] — replica reconciliation under optimistic versioning
//! - [`service`] — the process-scoped composition root

pub mod cli;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod index;
pub mod locks;
pub mod recall;
pub mod service;
pub mod store;
pub mod sync;
