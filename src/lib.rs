//! # codequery
//!
//! Register a source-code repository, have it ingested into a searchable
//! vector index, and ask natural-language questions answered with citations
//! to the ingested code.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────┐   ┌───────────────┐
//! │ git clone│──▶│ extract + chunk    │──▶│ embed (batch) │
//! └──────────┘   └───────────────────┘   └──────┬────────┘
//!                                               │
//!                                               ▼
//!                 ┌──────────┐          ┌───────────────┐
//!                 │ retrieve │◀─────────│ vector index  │
//!                 │ + chat   │          │ (per-repo     │
//!                 └──────────┘          │  partitions)  │
//!                                       └───────────────┘
//! ```
//!
//! Each registered repository moves through
//! `PENDING → PROCESSING → READY | FAILED`; ingestion runs in the
//! background and always reaches exactly one terminal state.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`acquire`] | Shallow-clone source acquisition |
//! | [`chunker`] | Line-addressed source chunking |
//! | [`extract`] | Working-copy walk and filtering |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Repository-partitioned vector index |
//! | [`ingest`] | Ingestion orchestration and status tracking |
//! | [`retrieve`] | Query-time similarity retrieval |
//! | [`chat`] | Answer generation over retrieved chunks |
//! | [`server`] | HTTP API |
//! | [`repos`] | Repository registry |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod acquire;
pub mod chat;
pub mod chunker;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod repos;
pub mod retrieve;
pub mod server;
