//! Textual rewrites that bring generated code in line with a profile.
//!
//! Each rewrite runs only if the profile carries the matching pattern.
//! Braces inside string literals or comments are treated like code.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{BraceStyle, Casing, IdentifierPosition, StyleProfile};

static BARE_PRIVATE_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^([ \t]*(?:\[[^\]\n]*\][ \t]*)*private[ \t]+(?:(?:static|readonly)[ \t]+)*[A-Za-z_][A-Za-z0-9_<>\[\],.?]*[ \t]+)([a-z][A-Za-z0-9]*)([ \t]*[;=])",
    )
    .unwrap()
});

static SAME_LINE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([ \t]*)(.*\))[ \t]*\{[ \t]*$").unwrap());

/// Rewrite `text` toward `profile`. Output is unchanged when the profile
/// has no naming, brace, or indentation pattern.
pub fn apply_style(text: &str, profile: &StyleProfile) -> String {
    let mut out = text.to_string();

    if profile.naming_casing(IdentifierPosition::Field) == Some(Casing::UnderscoreCamelCase) {
        out = BARE_PRIVATE_FIELD
            .replace_all(&out, "${1}_${2}${3}")
            .into_owned();
    }

    if let Some(style) = profile.brace_style() {
        out = normalize_braces(&out, style);
    }

    if let Some((width, tabs)) = profile.indentation() {
        out = reindent(&out, width, tabs);
    }

    out
}

fn normalize_braces(text: &str, style: BraceStyle) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        match style {
            BraceStyle::NextLine => {
                if let Some(caps) = SAME_LINE_OPEN.captures(line) {
                    let indent = &caps[1];
                    lines.push(format!("{}{}", indent, caps[2].trim_end()));
                    lines.push(format!("{}{{", indent));
                    continue;
                }
            }
            BraceStyle::SameLine => {
                if line.trim() == "{" {
                    if let Some(prev) = lines.last_mut() {
                        if prev.trim_end().ends_with(')') {
                            let head = prev.trim_end().to_string();
                            *prev = format!("{} {{", head);
                            continue;
                        }
                    }
                }
            }
        }
        lines.push(line.to_string());
    }
    join_preserving_newline(text, lines)
}

fn reindent(text: &str, width: usize, tabs: bool) -> String {
    let unit = if tabs {
        "\t".repeat(width.max(1))
    } else {
        " ".repeat(width)
    };

    let mut depth: usize = 0;
    let mut lines = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            lines.push(String::new());
            continue;
        }
        let level = if trimmed.starts_with('}') {
            depth.saturating_sub(1)
        } else {
            depth
        };
        lines.push(format!("{}{}", unit.repeat(level), trimmed));

        let opens = trimmed.matches('{').count();
        let closes = trimmed.matches('}').count();
        depth = (depth + opens).saturating_sub(closes);
    }
    join_preserving_newline(text, lines)
}

fn join_preserving_newline(original: &str, lines: Vec<String>) -> String {
    let mut joined = lines.join("\n");
    if original.ends_with('\n') {
        joined.push('\n');
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{StyleCategory, StylePattern, StyleRule};
    use chrono::Utc;

    fn profile(rules: Vec<StyleRule>) -> StyleProfile {
        StyleProfile {
            patterns: rules
                .into_iter()
                .map(|rule| StylePattern {
                    category: StyleCategory::Formatting,
                    label: String::new(),
                    occurrence_count: 1,
                    confidence: 1.0,
                    example_samples: Vec::new(),
                    rule,
                })
                .collect(),
            analyzed_unit_count: 1,
            overall_confidence: 1.0,
            analyzed_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_profile_is_identity() {
        let text = "public class A {\n  private int hp;\n}\n";
        assert_eq!(apply_style(text, &profile(Vec::new())), text);
    }

    #[test]
    fn test_underscore_prefix_on_private_fields() {
        let p = profile(vec![StyleRule::Naming {
            position: IdentifierPosition::Field,
            casing: Casing::UnderscoreCamelCase,
        }]);
        let text = "private float speed = 2f;\nprivate static int count;\npublic int score;\nprivate int _ok;\n";
        let out = apply_style(text, &p);
        assert_eq!(
            out,
            "private float _speed = 2f;\nprivate static int _count;\npublic int score;\nprivate int _ok;\n"
        );
    }

    #[test]
    fn test_underscore_requires_field_rule() {
        let p = profile(vec![StyleRule::Naming {
            position: IdentifierPosition::Field,
            casing: Casing::CamelCase,
        }]);
        let text = "private float speed;";
        assert_eq!(apply_style(text, &p), text);
    }

    #[test]
    fn test_braces_to_next_line() {
        let p = profile(vec![StyleRule::BracePlacement {
            style: BraceStyle::NextLine,
        }]);
        let text = "    void Update() {\n        Tick();\n    }";
        assert_eq!(
            apply_style(text, &p),
            "    void Update()\n    {\n        Tick();\n    }"
        );
    }

    #[test]
    fn test_braces_to_same_line() {
        let p = profile(vec![StyleRule::BracePlacement {
            style: BraceStyle::SameLine,
        }]);
        let text = "void Update()\n{\n    Tick();\n}\n";
        assert_eq!(apply_style(text, &p), "void Update() {\n    Tick();\n}\n");
    }

    #[test]
    fn test_reindent_by_depth() {
        let p = profile(vec![StyleRule::Indentation {
            width: 4,
            tabs: false,
        }]);
        let text = "class A\n{\nvoid B()\n{\nif (x) { y(); }\nz();\n}\n\n}\n";
        let expected =
            "class A\n{\n    void B()\n    {\n        if (x) { y(); }\n        z();\n    }\n\n}\n";
        assert_eq!(apply_style(text, &p), expected);
    }

    #[test]
    fn test_reindent_with_tabs() {
        let p = profile(vec![StyleRule::Indentation {
            width: 1,
            tabs: true,
        }]);
        let text = "class A {\n  int x;\n}";
        assert_eq!(apply_style(text, &p), "class A {\n\tint x;\n}");
    }
}
