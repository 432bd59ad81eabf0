//! Query intent classification.
//!
//! A fixed keyword-membership test buckets a query into one
//! [`QueryIntent`]. Buckets are tried in priority order
//! (code generation, explanation, debugging, optimization) and the first
//! hit wins; anything else is [`QueryIntent::General`]. Classification is a
//! total function: every string, including the empty one, gets an answer.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryIntent {
    CodeGeneration,
    Explanation,
    Debugging,
    Optimization,
    General,
}

impl QueryIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryIntent::CodeGeneration => "code-generation",
            QueryIntent::Explanation => "explanation",
            QueryIntent::Debugging => "debugging",
            QueryIntent::Optimization => "optimization",
            QueryIntent::General => "general",
        }
    }
}

/// Everything derived from the query text before retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnalysis {
    pub intent: QueryIntent,
    pub keywords: Vec<String>,
    pub domain_specific: bool,
}

const INTENT_TABLE: &[(QueryIntent, &[&str])] = &[
    (
        QueryIntent::CodeGeneration,
        &[
            "create", "generate", "make", "write", "build", "implement", "add",
        ],
    ),
    (
        QueryIntent::Explanation,
        &[
            "explain", "what", "why", "how does", "describe", "understand", "meaning",
        ],
    ),
    (
        QueryIntent::Debugging,
        &[
            "error", "bug", "fix", "debug", "issue", "problem", "crash", "exception",
            "not working", "broken", "null reference",
        ],
    ),
    (
        QueryIntent::Optimization,
        &[
            "optimize", "optimise", "performance", "faster", "improve", "efficient", "lag",
            "fps", "memory", "allocation",
        ],
    ),
];

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "are", "was", "were", "can",
    "could", "should", "would", "will", "how", "what", "why", "when", "where", "which", "who",
    "you", "your", "our", "its", "it's", "his", "her", "their", "them", "they", "have", "has",
    "had", "does", "did", "not", "but", "all", "any", "some", "there", "here", "about", "please",
    "new", "use", "using", "get", "want", "need",
];

const DOMAIN_VOCABULARY: &[&str] = &[
    "unity", "gameobject", "monobehaviour", "monobehavior", "prefab", "scene", "transform",
    "rigidbody", "rigidbody2d", "collider", "component", "coroutine", "scriptableobject",
    "animator", "navmesh", "navmeshagent", "shader", "material", "raycast", "physics",
    "canvas", "sprite", "tilemap", "cinemachine", "urp", "hdrp", "inspector", "serializefield",
    "instantiate", "update", "fixedupdate", "awake", "start", "timeline", "particle",
];

fn tokenize(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '_'))
        .filter(|t| !t.is_empty())
        .collect()
}

fn mentions(lower: &str, tokens: &[&str], term: &str) -> bool {
    if term.contains(' ') {
        lower.contains(term)
    } else {
        tokens.contains(&term)
    }
}

/// Bucket `query` into an intent.
pub fn classify_intent(query: &str) -> QueryIntent {
    let lower = query.to_lowercase();
    let tokens = tokenize(&lower);
    INTENT_TABLE
        .iter()
        .find(|(_, terms)| terms.iter().any(|t| mentions(&lower, &tokens, t)))
        .map(|(intent, _)| *intent)
        .unwrap_or(QueryIntent::General)
}

/// Lowercased content words of `query`, stop words and short tokens removed.
pub fn extract_keywords(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    let mut keywords: Vec<String> = Vec::new();
    for token in tokenize(&lower) {
        if token.chars().count() <= 2 || STOP_WORDS.contains(&token) {
            continue;
        }
        if !keywords.iter().any(|k| k == token) {
            keywords.push(token.to_string());
        }
    }
    keywords
}

/// Whether the query uses engine-specific vocabulary.
pub fn is_domain_specific(query: &str) -> bool {
    let lower = query.to_lowercase();
    tokenize(&lower)
        .iter()
        .any(|t| DOMAIN_VOCABULARY.contains(t))
}

pub fn analyze_query(query: &str) -> QueryAnalysis {
    QueryAnalysis {
        intent: classify_intent(query),
        keywords: extract_keywords(query),
        domain_specific: is_domain_specific(query),
    }
}
