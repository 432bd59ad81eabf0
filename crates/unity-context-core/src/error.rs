//! Error taxonomy shared across the pipeline.
//!
//! Most functions return [`anyhow::Result`]; the variants below are the
//! failures callers are expected to tell apart, and they survive the trip
//! through `anyhow` via `err.downcast_ref::<Error>()`.
//!
//! Per-file indexing failures are not errors at this level: they are
//! tallied into the `errors` counter of the index report. A pattern scan
//! that finds nothing yields empty output, never an error.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The path lies outside every allow-listed root.
    #[error("access denied: {} is outside the allowed roots", path.display())]
    AccessDenied { path: PathBuf },

    /// A required credential or setting for an external collaborator is missing.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// The embedding provider or vector store call failed.
    #[error("{service} failure: {message}")]
    Upstream { service: String, message: String },

    /// An upsert exceeded the store's per-call record limit.
    #[error("upsert batch of {size} records exceeds the store limit of {max}")]
    BatchTooLarge { size: usize, max: usize },
}

impl Error {
    pub fn upstream(service: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Upstream {
            service: service.into(),
            message: message.to_string(),
        }
    }
}
