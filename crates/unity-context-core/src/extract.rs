//! Heuristic C# metadata extractor.
//!
//! This is a lightweight pattern scan, not a parser. Each field is found by
//! an independent regex search over the raw text:
//!
//! | Field | Pattern |
//! |-------|---------|
//! | `primary_type_name` | first `class`/`struct`/`interface`/`enum` + identifier |
//! | `namespace` | first `namespace` declaration |
//! | `member_names` | visibility + return-type-like token + identifier + `(` |
//! | `imported_dependencies` | `using X.Y;` directives |
//!
//! Malformed input yields partial or empty metadata. Extraction never fails.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::UnitMetadata;

static TYPE_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:class|struct|interface|enum)\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap()
});

static NAMESPACE_DECL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bnamespace\s+([A-Za-z_][A-Za-z0-9_.]*)").unwrap());

/// Visibility, optional modifiers, a return-type-like token, then `name(`.
pub(crate) static METHOD_SIG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:public|private|protected|internal)\s+(?:(?:static|virtual|override|abstract|async|sealed|new|extern|unsafe|partial)\s+)*[A-Za-z_][A-Za-z0-9_<>\[\],.?]*\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(",
    )
    .unwrap()
});

static USING_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*using\s+(?:static\s+)?([A-Za-z_][A-Za-z0-9_.]*)\s*;").unwrap()
});

/// Scan `text` for structural metadata.
pub fn extract_metadata(text: &str) -> UnitMetadata {
    let primary_type_name = TYPE_DECL
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let namespace = NAMESPACE_DECL
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let mut member_names: Vec<String> = Vec::new();
    for caps in METHOD_SIG.captures_iter(text) {
        let name = &caps[1];
        if !member_names.iter().any(|n| n == name) {
            member_names.push(name.to_string());
        }
    }

    let mut imported_dependencies: Vec<String> = Vec::new();
    for caps in USING_DIRECTIVE.captures_iter(text) {
        let dep = &caps[1];
        if !imported_dependencies.iter().any(|d| d == dep) {
            imported_dependencies.push(dep.to_string());
        }
    }

    UnitMetadata {
        primary_type_name,
        namespace,
        member_names,
        imported_dependencies,
    }
}
