//! Corpus scan producing a [`StyleProfile`].

use std::collections::HashMap;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    BraceStyle, Casing, IdentifierPosition, StyleCategory, StylePattern, StyleProfile, StyleRule,
};
use crate::extract::METHOD_SIG;
use crate::models::SourceUnit;

/// A casing must cover strictly more than this share of identifiers.
const NAMING_THRESHOLD: f32 = 0.5;
/// A component must appear strictly more often than this.
const COMPONENT_MIN_OCCURRENCES: usize = 2;
const INDENTATION_CONFIDENCE: f32 = 0.9;
/// Sample size at which overall confidence stops growing.
const SATURATION_UNITS: f32 = 10.0;
const MAX_SAMPLES: usize = 3;

static TYPE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:class|struct|interface|enum)\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap()
});

static FIELD_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?:\[[^\]\n]*\][ \t]*)*(?:public|private|protected|internal)[ \t]+(?:(?:static|readonly|const|volatile|new)[ \t]+)*[A-Za-z_][A-Za-z0-9_<>\[\],.?]*[ \t]+([A-Za-z_][A-Za-z0-9_]*)[ \t]*[;=]",
    )
    .unwrap()
});

static BRACE_SAME_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\)[ \t]*\{").unwrap());
static BRACE_NEXT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\)[ \t]*\r?\n[ \t]*\{").unwrap());

static SINGLETON_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\bprivate\s+static\s+(?:readonly\s+)?([A-Za-z_][A-Za-z0-9_]*)\s+[A-Za-z_][A-Za-z0-9_]*\s*[;=]",
    )
    .unwrap()
});

/// Design patterns recognised by a single regex hit.
static PATTERN_SIGNATURES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("Observer", r"\bevent\s+[A-Za-z_]|\bUnityEvent\b"),
        (
            "Factory",
            r"\b(?:public|private|protected|internal)\s+(?:static\s+)?[A-Za-z_][A-Za-z0-9_<>\[\]]*\s+(?:Create|Make|Build)[A-Z]?[A-Za-z0-9_]*\s*\(|\bclass\s+[A-Za-z0-9_]*Factory\b",
        ),
        (
            "State Machine",
            r"\benum\s+[A-Za-z0-9_]*State\b|\bswitch\s*\(\s*[A-Za-z0-9_.]*[sS]tate\s*\)",
        ),
        (
            "Object Pool",
            r"\bclass\s+[A-Za-z0-9_]*Pool\b|\bObjectPool<|\b(?:Queue|Stack)<GameObject>",
        ),
        (
            "Command",
            r"\binterface\s+ICommand\b|\bclass\s+[A-Za-z0-9_]+Command\b",
        ),
        ("ScriptableObject Data", r":\s*ScriptableObject\b"),
        ("Service Locator", r"\bServiceLocator\b"),
        ("Dependency Injection", r"\[Inject\]"),
    ]
    .into_iter()
    .map(|(name, pat)| (name, Regex::new(pat).unwrap()))
    .collect()
});

const COMPONENT_VOCABULARY: &[&str] = &[
    "Transform",
    "Rigidbody",
    "Rigidbody2D",
    "Collider",
    "BoxCollider",
    "SphereCollider",
    "CapsuleCollider",
    "MeshCollider",
    "CharacterController",
    "Animator",
    "AudioSource",
    "Camera",
    "Light",
    "NavMeshAgent",
    "ParticleSystem",
    "LineRenderer",
    "MeshRenderer",
    "SpriteRenderer",
    "Canvas",
    "Image",
    "Button",
    "TextMeshProUGUI",
];

static COMPONENT_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    COMPONENT_VOCABULARY
        .iter()
        .map(|name| (*name, Regex::new(&format!(r"\b{}\b", name)).unwrap()))
        .collect()
});

/// Analyze a corpus of source units. Never fails; an empty corpus yields
/// an empty profile with zero confidence.
pub fn analyze_units(units: &[SourceUnit]) -> StyleProfile {
    let mut patterns = Vec::new();
    patterns.extend(naming_patterns(units));
    patterns.extend(formatting_patterns(units));
    patterns.extend(architecture_patterns(units));
    patterns.extend(component_patterns(units));

    let overall_confidence = overall_confidence(&patterns, units.len());

    StyleProfile {
        patterns,
        analyzed_unit_count: units.len(),
        overall_confidence,
        analyzed_at: Utc::now(),
    }
}

/// Mean pattern confidence, scaled by how many units were sampled.
fn overall_confidence(patterns: &[StylePattern], unit_count: usize) -> f32 {
    if patterns.is_empty() {
        return 0.0;
    }
    let mean = patterns.iter().map(|p| p.confidence).sum::<f32>() / patterns.len() as f32;
    mean * (unit_count as f32 / SATURATION_UNITS).min(1.0)
}

fn naming_patterns(units: &[SourceUnit]) -> Vec<StylePattern> {
    let mut by_position: Vec<(IdentifierPosition, Vec<String>)> = vec![
        (IdentifierPosition::Type, Vec::new()),
        (IdentifierPosition::Method, Vec::new()),
        (IdentifierPosition::Field, Vec::new()),
    ];

    for unit in units {
        let text = &unit.raw_content;
        for (position, idents) in by_position.iter_mut() {
            let re: &Regex = match position {
                IdentifierPosition::Type => &TYPE_NAME,
                IdentifierPosition::Method => &METHOD_SIG,
                IdentifierPosition::Field => &FIELD_NAME,
            };
            idents.extend(re.captures_iter(text).map(|c| c[1].to_string()));
        }
    }

    by_position
        .into_iter()
        .filter_map(|(position, idents)| dominant_casing(position, &idents))
        .collect()
}

fn dominant_casing(position: IdentifierPosition, idents: &[String]) -> Option<StylePattern> {
    if idents.is_empty() {
        return None;
    }
    let total = idents.len() as f32;

    let (casing, members) = Casing::ALL
        .iter()
        .map(|&casing| {
            let members: Vec<&String> = idents
                .iter()
                .filter(|i| Casing::classify(i) == Some(casing))
                .collect();
            (casing, members)
        })
        .max_by_key(|(_, members)| members.len())?;

    let proportion = members.len() as f32 / total;
    if proportion <= NAMING_THRESHOLD {
        return None;
    }

    let mut samples: Vec<String> = Vec::new();
    for m in &members {
        if samples.len() == MAX_SAMPLES {
            break;
        }
        if !samples.contains(*m) {
            samples.push((*m).clone());
        }
    }

    Some(StylePattern {
        category: StyleCategory::Naming,
        label: format!("{} use {}", position.plural(), casing.as_str()),
        occurrence_count: members.len(),
        confidence: proportion,
        example_samples: samples,
        rule: StyleRule::Naming { position, casing },
    })
}

fn formatting_patterns(units: &[SourceUnit]) -> Vec<StylePattern> {
    let mut patterns = Vec::new();

    let mut same_line = 0usize;
    let mut next_line = 0usize;
    let mut same_samples = Vec::new();
    let mut next_samples = Vec::new();
    for unit in units {
        let text = &unit.raw_content;
        for m in BRACE_SAME_LINE.find_iter(text) {
            same_line += 1;
            if same_samples.len() < MAX_SAMPLES {
                same_samples.push(line_at(text, m.start()).to_string());
            }
        }
        for m in BRACE_NEXT_LINE.find_iter(text) {
            next_line += 1;
            if next_samples.len() < MAX_SAMPLES {
                next_samples.push(line_at(text, m.start()).to_string());
            }
        }
    }

    let total = same_line + next_line;
    if total > 0 && same_line != next_line {
        let (style, count, samples, label) = if same_line > next_line {
            (
                BraceStyle::SameLine,
                same_line,
                same_samples,
                "Opening braces on the same line",
            )
        } else {
            (
                BraceStyle::NextLine,
                next_line,
                next_samples,
                "Opening braces on a new line",
            )
        };
        patterns.push(StylePattern {
            category: StyleCategory::Formatting,
            label: label.to_string(),
            occurrence_count: count,
            confidence: count as f32 / total as f32,
            example_samples: samples,
            rule: StyleRule::BracePlacement { style },
        });
    }

    // Histogram of leading-whitespace runs over indented, non-blank lines.
    let mut runs: HashMap<(usize, bool), usize> = HashMap::new();
    for unit in units {
        for line in unit.raw_content.lines() {
            let content = line.trim_start_matches([' ', '\t']);
            if content.trim().is_empty() {
                continue;
            }
            let lead = &line[..line.len() - content.len()];
            if lead.is_empty() {
                continue;
            }
            let tabs = lead.contains('\t');
            *runs.entry((lead.chars().count(), tabs)).or_insert(0) += 1;
        }
    }
    if let Some((&(width, tabs), &count)) = runs
        .iter()
        .max_by(|a, b| {
            a.1.cmp(b.1)
                .then_with(|| b.0 .0.cmp(&a.0 .0))
                .then_with(|| b.0 .1.cmp(&a.0 .1))
        })
    {
        let label = if tabs {
            format!("Indentation uses {} tab(s)", width)
        } else {
            format!("Indentation uses {} spaces", width)
        };
        patterns.push(StylePattern {
            category: StyleCategory::Formatting,
            label,
            occurrence_count: count,
            confidence: INDENTATION_CONFIDENCE,
            example_samples: Vec::new(),
            rule: StyleRule::Indentation { width, tabs },
        });
    }

    patterns
}

fn architecture_patterns(units: &[SourceUnit]) -> Vec<StylePattern> {
    if units.is_empty() {
        return Vec::new();
    }
    let total = units.len() as f32;

    let mut hits: Vec<(&'static str, usize, Vec<String>)> = Vec::new();
    let mut record = |name: &'static str, sample: String| {
        match hits.iter_mut().find(|(n, _, _)| *n == name) {
            Some((_, count, samples)) => {
                *count += 1;
                if samples.len() < MAX_SAMPLES {
                    samples.push(sample);
                }
            }
            None => hits.push((name, 1, vec![sample])),
        }
    };

    for unit in units {
        let text = &unit.raw_content;

        let declared: Vec<&str> = TYPE_NAME
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        if let Some(m) = SINGLETON_FIELD
            .captures_iter(text)
            .find(|c| declared.contains(&&c[1]))
        {
            record("Singleton", m[0].trim().to_string());
        }

        for (name, re) in PATTERN_SIGNATURES.iter() {
            if let Some(m) = re.find(text) {
                record(*name, m.as_str().trim().to_string());
            }
        }
    }

    hits.into_iter()
        .map(|(name, count, samples)| StylePattern {
            category: StyleCategory::Architecture,
            label: format!("{} pattern", name),
            occurrence_count: count,
            confidence: (count as f32 / total).min(1.0),
            example_samples: samples,
            rule: StyleRule::DesignPattern {
                name: name.to_string(),
            },
        })
        .collect()
}

fn component_patterns(units: &[SourceUnit]) -> Vec<StylePattern> {
    if units.is_empty() {
        return Vec::new();
    }
    let denom = units.len() as f32 * 2.0;

    COMPONENT_PATTERNS
        .iter()
        .filter_map(|(name, re)| {
            let mut count = 0usize;
            let mut samples = Vec::new();
            for unit in units {
                let n = re.find_iter(&unit.raw_content).count();
                if n > 0 {
                    count += n;
                    if samples.len() < MAX_SAMPLES {
                        samples.push(unit.base_name());
                    }
                }
            }
            (count > COMPONENT_MIN_OCCURRENCES).then(|| StylePattern {
                category: StyleCategory::Component,
                label: format!("Uses {}", name),
                occurrence_count: count,
                confidence: (count as f32 / denom).min(1.0),
                example_samples: samples,
                rule: StyleRule::ComponentUsage {
                    component: name.to_string(),
                },
            })
        })
        .collect()
}

/// The trimmed line of `text` containing byte offset `at`.
fn line_at(text: &str, at: usize) -> &str {
    let start = text[..at].rfind('\n').map_or(0, |i| i + 1);
    let end = text[at..].find('\n').map_or(text.len(), |i| at + i);
    text[start..end].trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, text: &str) -> SourceUnit {
        SourceUnit::from_text(format!("Assets/Scripts/{}.cs", name), text)
    }

    fn consistent_script(i: usize) -> String {
        format!(
            r#"using UnityEngine;

public class Enemy{i} : MonoBehaviour
{{
    private Rigidbody _body;
    private float _speed = 2f;

    private void Awake()
    {{
        _body = GetComponent<Rigidbody>();
    }}

    public void MoveTo(Vector3 target)
    {{
        _body.MovePosition(target * _speed);
    }}
}}
"#
        )
    }

    fn pattern<'a>(profile: &'a StyleProfile, rule: &StyleRule) -> Option<&'a StylePattern> {
        profile.patterns.iter().find(|p| &p.rule == rule)
    }

    #[test]
    fn test_type_naming_nine_of_ten() {
        let mut units: Vec<SourceUnit> = (0..9)
            .map(|i| unit(&format!("Unit{}", i), &format!("public class Unit{} {{ }}", i)))
            .collect();
        units.push(unit("helper", "class helper { }"));

        let profile = analyze_units(&units);
        let p = pattern(
            &profile,
            &StyleRule::Naming {
                position: IdentifierPosition::Type,
                casing: Casing::PascalCase,
            },
        )
        .expect("type naming pattern");
        assert!((p.confidence - 0.9).abs() < 1e-6);
        assert_eq!(p.occurrence_count, 9);
        assert_eq!(p.example_samples.len(), 3);
        assert_eq!(p.label, "Types use PascalCase");
    }

    #[test]
    fn test_no_naming_pattern_without_majority() {
        let units = vec![
            unit("a", "class Alpha {}"),
            unit("b", "class beta {}"),
        ];
        let profile = analyze_units(&units);
        assert!(profile.naming_casing(IdentifierPosition::Type).is_none());
    }

    #[test]
    fn test_field_and_method_naming() {
        let units: Vec<SourceUnit> = (0..3)
            .map(|i| unit(&format!("E{}", i), &consistent_script(i)))
            .collect();
        let profile = analyze_units(&units);
        assert_eq!(
            profile.naming_casing(IdentifierPosition::Field),
            Some(Casing::UnderscoreCamelCase)
        );
        assert_eq!(
            profile.naming_casing(IdentifierPosition::Method),
            Some(Casing::PascalCase)
        );
    }

    #[test]
    fn test_brace_and_indentation() {
        let units = vec![unit("E", &consistent_script(0))];
        let profile = analyze_units(&units);
        assert_eq!(profile.brace_style(), Some(BraceStyle::NextLine));
        assert_eq!(profile.indentation(), Some((4, false)));
        let indent = profile
            .patterns
            .iter()
            .find(|p| matches!(p.rule, StyleRule::Indentation { .. }))
            .unwrap();
        assert!((indent.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_same_line_braces() {
        let text = "void A() {\n}\nvoid B() {\n}\nvoid C()\n{\n}";
        let profile = analyze_units(&[unit("K", text)]);
        assert_eq!(profile.brace_style(), Some(BraceStyle::SameLine));
        let p = profile
            .by_category(StyleCategory::Formatting)
            .find(|p| matches!(p.rule, StyleRule::BracePlacement { .. }))
            .unwrap();
        assert!((p.confidence - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(p.example_samples[0], "void A() {");
    }

    #[test]
    fn test_architecture_signatures() {
        let singleton = "public class GameManager {\n    private static GameManager instance;\n}";
        let not_singleton = "public class Cache {\n    private static Dictionary<int, int> map;\n}";
        let observer = "public class Health {\n    public event Action OnDied;\n}";
        let factory = "public static class EnemyFactory {\n    public static Enemy CreateEnemy(int kind) { return null; }\n}";
        let units = vec![
            unit("GameManager", singleton),
            unit("Cache", not_singleton),
            unit("Health", observer),
            unit("EnemyFactory", factory),
        ];
        let profile = analyze_units(&units);
        let names: Vec<&str> = profile
            .by_category(StyleCategory::Architecture)
            .map(|p| p.label.as_str())
            .collect();
        assert!(names.contains(&"Singleton pattern"));
        assert!(names.contains(&"Observer pattern"));
        assert!(names.contains(&"Factory pattern"));

        let singleton = profile
            .patterns
            .iter()
            .find(|p| p.label == "Singleton pattern")
            .unwrap();
        assert_eq!(singleton.occurrence_count, 1);
        assert!((singleton.confidence - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_component_threshold() {
        let two = unit("A", "Rigidbody a; Rigidbody b;");
        let profile = analyze_units(&[two]);
        assert_eq!(profile.by_category(StyleCategory::Component).count(), 0);

        let three = unit("B", "Rigidbody a; Rigidbody b; Rigidbody c; Rigidbody2D d;");
        let profile = analyze_units(&[three]);
        let comps: Vec<&StylePattern> = profile.by_category(StyleCategory::Component).collect();
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].label, "Uses Rigidbody");
        assert_eq!(comps[0].occurrence_count, 3);
        assert!((comps[0].confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_overall_confidence_grows_with_sample() {
        let few: Vec<SourceUnit> = (0..3)
            .map(|i| unit(&format!("E{}", i), &consistent_script(i)))
            .collect();
        let many: Vec<SourceUnit> = (0..20)
            .map(|i| unit(&format!("E{}", i), &consistent_script(i)))
            .collect();
        let few = analyze_units(&few);
        let many = analyze_units(&many);
        assert!(many.overall_confidence >= few.overall_confidence);
        assert!(many.overall_confidence <= 1.0);
        assert_eq!(many.analyzed_unit_count, 20);
    }

    #[test]
    fn test_empty_corpus() {
        let profile = analyze_units(&[]);
        assert!(profile.patterns.is_empty());
        assert_eq!(profile.overall_confidence, 0.0);
    }
}
