//! Core data models used throughout Unity Context.
//!
//! These types represent the source units, chunks, and indexed documents
//! that flow through the indexing and retrieval pipeline.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One file under an indexed root, read fresh for each operation.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub raw_content: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

impl SourceUnit {
    /// Build a unit from in-memory text, stamped with the current time.
    pub fn from_text(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let raw_content = text.into();
        Self {
            path: path.into(),
            size_bytes: raw_content.len() as u64,
            raw_content,
            modified_at: Utc::now(),
        }
    }

    /// File name without extension, or `"unknown"`.
    pub fn base_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Structural facts scanned out of a source unit. Every field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitMetadata {
    pub primary_type_name: Option<String>,
    pub namespace: Option<String>,
    pub member_names: Vec<String>,
    pub imported_dependencies: Vec<String>,
}

/// A bounded slice of a source unit, the unit of embedding and storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub ordinal: usize,
}

/// The category of asset a document was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// C# source script, chunked and embedded.
    Script,
    /// Prefab asset, indexed as a single placeholder document.
    Prefab,
    /// Scene asset, indexed as a single placeholder document.
    Scene,
    /// API or manual documentation page.
    Documentation,
}

impl AssetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Script => "script",
            AssetKind::Prefab => "prefab",
            AssetKind::Scene => "scene",
            AssetKind::Documentation => "documentation",
        }
    }

    pub fn language(self) -> &'static str {
        match self {
            AssetKind::Script => "csharp",
            AssetKind::Prefab | AssetKind::Scene => "unity-yaml",
            AssetKind::Documentation => "markdown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "script" => Some(AssetKind::Script),
            "prefab" => Some(AssetKind::Prefab),
            "scene" => Some(AssetKind::Scene),
            "documentation" => Some(AssetKind::Documentation),
            _ => None,
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload stored alongside each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub project_id: String,
    pub project_name: String,
    pub file_type: AssetKind,
    /// Path relative to the project root, `/`-separated.
    pub file_path: String,
    pub language: String,
    /// Editor version from the project descriptor, or `"unknown"`.
    pub tool_version: String,
    pub chunk_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// The unit of storage: one chunk (or placeholder) with its vector.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: DocumentMetadata,
}

/// Who a project is, resolved once per index or watch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectIdentity {
    pub id: String,
    pub name: String,
    pub root: PathBuf,
    pub unity_version: String,
}

/// Outcome counters of a whole-project index run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    /// Files discovered across every asset category.
    pub total_files: usize,
    /// Files that produced at least one stored document.
    pub indexed: usize,
    /// Files that failed to read, parse, or chunk.
    pub errors: usize,
}

impl IndexReport {
    pub fn merge(&mut self, other: IndexReport) {
        self.total_files += other.total_files;
        self.indexed += other.indexed;
        self.errors += other.errors;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_serializes_camel_case() {
        let meta = DocumentMetadata {
            project_id: "p1".into(),
            project_name: "Demo".into(),
            file_type: AssetKind::Script,
            file_path: "Assets/Scripts/Player.cs".into(),
            language: "csharp".into(),
            tool_version: "2022.3.10f1".into(),
            chunk_index: 0,
            class_name: Some("Player".into()),
            namespace: None,
            methods: vec!["Update".into()],
            dependencies: vec![],
            created_at: 0,
            updated_at: 0,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["projectId"], "p1");
        assert_eq!(json["fileType"], "script");
        assert_eq!(json["className"], "Player");
        assert!(json.get("namespace").is_none());

        let back: DocumentMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_base_name() {
        let unit = SourceUnit::from_text("Assets/Scripts/EnemyAI.cs", "class EnemyAI {}");
        assert_eq!(unit.base_name(), "EnemyAI");
        assert_eq!(unit.size_bytes, 16);
    }

    #[test]
    fn test_report_merge() {
        let mut a = IndexReport {
            total_files: 3,
            indexed: 2,
            errors: 1,
        };
        a.merge(IndexReport {
            total_files: 2,
            indexed: 2,
            errors: 0,
        });
        assert_eq!(
            a,
            IndexReport {
                total_files: 5,
                indexed: 4,
                errors: 1
            }
        );
    }
}
