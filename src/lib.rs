//! # Unity Context
//!
//! Semantic indexing and retrieval-augmented context for Unity projects.
//!
//! Unity Context turns a project's C# scripts, prefabs and scenes into a
//! vector index, keeps that index in step with the file system while a
//! project is being edited, and assembles ranked, bounded context for a
//! downstream code-generation request. A style analyzer learns the
//! project's naming, formatting and architecture conventions so generated
//! code can be brought in line with them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ SourceAccess │──▶│     Indexer      │──▶│ VectorStore  │
//! │ read/list/   │   │ extract + chunk  │   │ SQLite or    │
//! │ watch        │   │ + embed          │   │ in-memory    │
//! └──────┬───────┘   └────────▲─────────┘   └──────┬───────┘
//!        │                    │                    │
//!        │           ┌────────┴─────────┐   ┌──────▼───────┐
//!        └──────────▶│ IndexMaintainer  │   │  RagEngine   │
//!        │           │ debounced watch  │   │ intent, band │
//!        │           └──────────────────┘   │ + context    │
//!        │           ┌──────────────────┐   └──────────────┘
//!        └──────────▶│   StyleService   │
//!                    └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`access`] | Allow-listed file read/list/watch |
//! | [`embedding`] | Embedding providers (Ollama, OpenAI, fastembed) |
//! | [`store`] | Vector store selection |
//! | [`sqlite_store`] | SQLite vector store |
//! | [`indexer`] | Whole-project and single-file indexing |
//! | [`watcher`] | Watch sessions and incremental re-indexing |
//! | [`rag`] | Retrieval and context assembly |
//! | [`style_service`] | Project style analysis |

pub mod access;
pub mod config;
pub mod db;
pub mod embedding;
pub mod indexer;
pub mod rag;
pub mod sqlite_store;
pub mod store;
pub mod style_service;
pub mod watcher;

pub use unity_context_core as core;
