//! Coding-style detection and re-application.
//!
//! [`analyze_units`] scans a corpus of C# source units and produces a
//! confidence-scored [`StyleProfile`] covering four independent categories:
//! naming, formatting, architecture (design patterns), and engine component
//! usage. [`apply_style`] rewrites generated text to match a profile.
//!
//! Both halves are heuristic text scans. Nothing here parses C#.

mod analyzer;
mod transform;

pub use analyzer::analyze_units;
pub use transform::apply_style;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleCategory {
    Naming,
    Formatting,
    Architecture,
    Component,
}

/// Syntactic position an identifier was collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierPosition {
    Type,
    Method,
    Field,
}

impl IdentifierPosition {
    fn plural(self) -> &'static str {
        match self {
            IdentifierPosition::Type => "Types",
            IdentifierPosition::Method => "Methods",
            IdentifierPosition::Field => "Fields",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Casing {
    /// Leading uppercase, alphanumeric.
    PascalCase,
    /// Leading lowercase, alphanumeric.
    CamelCase,
    /// Underscore, then leading lowercase, alphanumeric.
    UnderscoreCamelCase,
}

impl Casing {
    pub const ALL: [Casing; 3] = [
        Casing::PascalCase,
        Casing::CamelCase,
        Casing::UnderscoreCamelCase,
    ];

    pub fn classify(ident: &str) -> Option<Casing> {
        let mut chars = ident.chars();
        let first = chars.next()?;
        let (rest, casing) = match first {
            'A'..='Z' => (chars.as_str(), Casing::PascalCase),
            'a'..='z' => (chars.as_str(), Casing::CamelCase),
            '_' => {
                let second = chars.next()?;
                if !second.is_ascii_lowercase() {
                    return None;
                }
                (chars.as_str(), Casing::UnderscoreCamelCase)
            }
            _ => return None,
        };
        rest.chars()
            .all(|c| c.is_ascii_alphanumeric())
            .then_some(casing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Casing::PascalCase => "PascalCase",
            Casing::CamelCase => "camelCase",
            Casing::UnderscoreCamelCase => "_camelCase",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BraceStyle {
    /// `) {` on one line.
    SameLine,
    /// `)` then `{` on the following line.
    NextLine,
}

/// The machine-readable rule behind a pattern, used by [`apply_style`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StyleRule {
    Naming {
        position: IdentifierPosition,
        casing: Casing,
    },
    BracePlacement {
        style: BraceStyle,
    },
    Indentation {
        width: usize,
        tabs: bool,
    },
    DesignPattern {
        name: String,
    },
    ComponentUsage {
        component: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StylePattern {
    pub category: StyleCategory,
    pub label: String,
    pub occurrence_count: usize,
    /// In `[0, 1]`.
    pub confidence: f32,
    /// At most three.
    pub example_samples: Vec<String>,
    pub rule: StyleRule,
}

/// Result of one analysis run. A later run supersedes it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleProfile {
    pub patterns: Vec<StylePattern>,
    pub analyzed_unit_count: usize,
    pub overall_confidence: f32,
    pub analyzed_at: DateTime<Utc>,
}

impl StyleProfile {
    pub fn naming_casing(&self, position: IdentifierPosition) -> Option<Casing> {
        self.patterns.iter().find_map(|p| match p.rule {
            StyleRule::Naming { position: pos, casing } if pos == position => Some(casing),
            _ => None,
        })
    }

    pub fn brace_style(&self) -> Option<BraceStyle> {
        self.patterns.iter().find_map(|p| match p.rule {
            StyleRule::BracePlacement { style } => Some(style),
            _ => None,
        })
    }

    /// `(width, tabs)` of the dominant indentation run.
    pub fn indentation(&self) -> Option<(usize, bool)> {
        self.patterns.iter().find_map(|p| match p.rule {
            StyleRule::Indentation { width, tabs } => Some((width, tabs)),
            _ => None,
        })
    }

    pub fn by_category(&self, category: StyleCategory) -> impl Iterator<Item = &StylePattern> {
        self.patterns.iter().filter(move |p| p.category == category)
    }

    /// One line per pattern, highest confidence first, at most `limit` lines.
    pub fn summary(&self, limit: usize) -> String {
        let mut ranked: Vec<&StylePattern> = self.patterns.iter().collect();
        ranked.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
            .iter()
            .take(limit)
            .map(|p| format!("- {} ({:.0}% confidence)", p.label, p.confidence * 100.0))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_casing_predicates() {
        assert_eq!(Casing::classify("PlayerController"), Some(Casing::PascalCase));
        assert_eq!(Casing::classify("moveSpeed"), Some(Casing::CamelCase));
        assert_eq!(Casing::classify("_health"), Some(Casing::UnderscoreCamelCase));
        assert_eq!(Casing::classify("MAX_HP"), None);
        assert_eq!(Casing::classify("_Health"), None);
        assert_eq!(Casing::classify("m_Speed"), None);
        assert_eq!(Casing::classify(""), None);
    }

    #[test]
    fn test_rule_serializes_tagged() {
        let rule = StyleRule::Naming {
            position: IdentifierPosition::Field,
            casing: Casing::UnderscoreCamelCase,
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["kind"], "naming");
        assert_eq!(json["position"], "field");
        assert_eq!(json["casing"], "underscoreCamelCase");
    }
}
