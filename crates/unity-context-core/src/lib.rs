//! # Unity Context Core
//!
//! Pure logic shared by the Unity Context pipeline: data models, the
//! heuristic C# metadata extractor, the structural chunker, the
//! [`VectorStore`](store::VectorStore) abstraction, the embedding trait,
//! relevance banding, query intent classification, and the style analyzer.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network code.
//! Everything that touches the outside world lives in the `unity-context`
//! app crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod intent;
pub mod models;
pub mod search;
pub mod store;
pub mod style;

pub use error::Error;
