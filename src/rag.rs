//! Retrieval-augmented context assembly.
//!
//! [`RagEngine::enhance`] classifies a query, retrieves the nearest indexed
//! documents (scoped to a project when one is given), and assembles one
//! bounded text block for the downstream generation call, in this order:
//!
//! 1. user profile summary
//! 2. project summary
//! 3. retrieved documents, highest score first, each labeled with its path
//!    and relevance band
//! 4. the literal query
//! 5. instruction fragments selected by intent, hardware and style
//!
//! Embedding-provider and vector-store failures propagate; classification
//! never fails.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use unity_context_core::intent::{analyze_query, extract_keywords, QueryAnalysis, QueryIntent};
use unity_context_core::models::{AssetKind, DocumentMetadata, IndexedDocument, ProjectIdentity};
use unity_context_core::search::{retrieve, RelevanceBand, RetrievalRequest, SearchResult};
use unity_context_core::style::StyleProfile;

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::store::{StoreFilter, VectorStore};

/// Patterns listed in the style instruction fragment.
const STYLE_SUMMARY_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// An error the user hit before, with the fix that worked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    pub solution: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub name: Option<String>,
    pub experience_level: Option<String>,
    /// Target device class, e.g. `"mobile"` or `"Quest 2"`.
    pub hardware: Option<String>,
    pub error_history: Vec<ErrorRecord>,
}

impl UserProfile {
    fn summary(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(name) = &self.name {
            parts.push(format!("Name: {}", name));
        }
        if let Some(level) = &self.experience_level {
            parts.push(format!("Experience: {}", level));
        }
        if let Some(hardware) = &self.hardware {
            parts.push(format!("Target hardware: {}", hardware));
        }
        (!parts.is_empty()).then(|| parts.join("\n"))
    }
}

/// The project a request is scoped to.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectContext {
    pub identity: ProjectIdentity,
    /// Restrict retrieval to one asset kind.
    pub asset_kind: Option<AssetKind>,
    pub style: Option<StyleProfile>,
}

impl ProjectContext {
    pub fn new(identity: ProjectIdentity) -> Self {
        Self {
            identity,
            asset_kind: None,
            style: None,
        }
    }

    fn filter(&self) -> StoreFilter {
        let filter = StoreFilter::project(&self.identity.id);
        match self.asset_kind {
            Some(kind) => filter.with_file_type(kind),
            None => filter,
        }
    }

    fn summary(&self) -> String {
        format!(
            "Project: {}\nUnity version: {}",
            self.identity.name, self.identity.unity_version
        )
    }
}

/// Per-request overrides of the configured retrieval defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RagOptions {
    pub top_k: Option<usize>,
    pub min_score: Option<f32>,
    pub max_context_chars: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct RagRequest {
    pub query: String,
    pub conversation_history: Vec<ConversationTurn>,
    pub project: Option<ProjectContext>,
    pub user_profile: Option<UserProfile>,
    pub options: RagOptions,
}

impl RagRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

/// Output of [`RagEngine::enhance`].
#[derive(Debug, Clone)]
pub struct RagContext {
    pub analysis: QueryAnalysis,
    /// Everything that cleared the threshold, best first.
    pub results: Vec<SearchResult>,
    /// How many of `results` fit into `context`.
    pub included: usize,
    pub instructions: Vec<String>,
    pub context: String,
}

pub struct RagEngine {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
}

impl RagEngine {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    pub async fn enhance(&self, request: &RagRequest) -> Result<RagContext> {
        let mut analysis = analyze_query(&request.query);
        let mut search_text = request.query.clone();

        if analysis.keywords.is_empty() {
            if let Some(turn) = request
                .conversation_history
                .iter()
                .rev()
                .find(|t| t.role == TurnRole::User)
            {
                let fallback = extract_keywords(&turn.content);
                if !fallback.is_empty() {
                    debug!(keywords = ?fallback, "using keywords from conversation history");
                    search_text = format!("{} {}", request.query, fallback.join(" "));
                    analysis.keywords = fallback;
                }
            }
        }

        let retrieval = RetrievalRequest {
            query: &search_text,
            top_k: request.options.top_k.unwrap_or(self.config.top_k),
            min_score: request.options.min_score.unwrap_or(self.config.min_score),
            filter: request.project.as_ref().map(ProjectContext::filter),
        };
        let results = retrieve(self.store.as_ref(), self.embedder.as_ref(), &retrieval).await?;

        let instructions = instructions_for(
            analysis.intent,
            request.user_profile.as_ref(),
            request.project.as_ref().and_then(|p| p.style.as_ref()),
        );
        let budget = request
            .options
            .max_context_chars
            .unwrap_or(self.config.max_context_chars);
        let (context, included) = assemble_context(request, &results, &instructions, budget);

        info!(
            intent = analysis.intent.as_str(),
            domain_specific = analysis.domain_specific,
            results = results.len(),
            included,
            "context assembled"
        );

        Ok(RagContext {
            analysis,
            results,
            included,
            instructions,
            context,
        })
    }

    /// Scripts most similar to `code`.
    pub async fn find_similar_code(
        &self,
        code: &str,
        project: Option<&ProjectContext>,
    ) -> Result<Vec<SearchResult>> {
        let filter = match project {
            Some(p) => p.filter().with_file_type(AssetKind::Script),
            None => StoreFilter::file_type(AssetKind::Script),
        };
        self.search(code, filter).await
    }

    /// Indexed API documentation about `topic`, from any project.
    pub async fn get_api_documentation(&self, topic: &str) -> Result<Vec<SearchResult>> {
        self.search(topic, StoreFilter::file_type(AssetKind::Documentation))
            .await
    }

    /// A fix for `error`. A matching entry in the user's error history wins
    /// outright with score 1.0; otherwise the project's scripts are searched.
    pub async fn find_error_solution(
        &self,
        error: &str,
        user_profile: Option<&UserProfile>,
        project: Option<&ProjectContext>,
    ) -> Result<Vec<SearchResult>> {
        let needle = error.trim();
        if !needle.is_empty() {
            if let Some(record) = user_profile
                .into_iter()
                .flat_map(|p| p.error_history.iter())
                .find(|r| {
                    let message = r.message.trim();
                    !message.is_empty() && (message.contains(needle) || needle.contains(message))
                })
            {
                debug!("error found in user history");
                return Ok(vec![history_hit(record, project)]);
            }
        }

        let filter = project.map(ProjectContext::filter).unwrap_or_default();
        self.search(error, filter).await
    }

    async fn search(&self, query: &str, filter: StoreFilter) -> Result<Vec<SearchResult>> {
        let request = RetrievalRequest {
            query,
            top_k: self.config.top_k,
            min_score: self.config.min_score,
            filter: (!filter.is_empty()).then_some(filter),
        };
        retrieve(self.store.as_ref(), self.embedder.as_ref(), &request).await
    }
}

fn history_hit(record: &ErrorRecord, project: Option<&ProjectContext>) -> SearchResult {
    let now = chrono::Utc::now().timestamp();
    let (project_id, project_name, version) = match project {
        Some(p) => (
            p.identity.id.clone(),
            p.identity.name.clone(),
            p.identity.unity_version.clone(),
        ),
        None => (String::new(), String::new(), "unknown".to_string()),
    };
    SearchResult {
        document: IndexedDocument {
            id: "error-history".to_string(),
            content: format!(
                "Previous error: {}\nSolution: {}",
                record.message, record.solution
            ),
            embedding: Vec::new(),
            metadata: DocumentMetadata {
                project_id,
                project_name,
                file_type: AssetKind::Documentation,
                file_path: "error-history".to_string(),
                language: AssetKind::Documentation.language().to_string(),
                tool_version: version,
                chunk_index: 0,
                class_name: None,
                namespace: None,
                methods: Vec::new(),
                dependencies: Vec::new(),
                created_at: now,
                updated_at: now,
            },
        },
        score: 1.0,
        relevance: RelevanceBand::High,
    }
}

fn instructions_for(
    intent: QueryIntent,
    user: Option<&UserProfile>,
    style: Option<&StyleProfile>,
) -> Vec<String> {
    let mut out = Vec::new();
    let by_intent = match intent {
        QueryIntent::CodeGeneration => {
            Some("Write complete, compilable C# that follows Unity conventions and reuses the project's existing types.")
        }
        QueryIntent::Explanation => {
            Some("Explain step by step and point to the retrieved code where it applies.")
        }
        QueryIntent::Debugging => {
            Some("Name the most likely cause first, then give the smallest fix that resolves it.")
        }
        QueryIntent::Optimization => Some(
            "Focus on per-frame cost: allocations in Update, physics queries and draw calls. State the trade-offs.",
        ),
        QueryIntent::General => None,
    };
    out.extend(by_intent.map(str::to_string));

    if let Some(hardware) = user.and_then(|u| u.hardware.as_deref()) {
        out.push(format!(
            "The target hardware is {}; keep memory and frame-time budgets suitable for it.",
            hardware
        ));
    }

    if let Some(style) = style.filter(|s| !s.patterns.is_empty()) {
        out.push(format!(
            "Match the project's coding style:\n{}",
            style.summary(STYLE_SUMMARY_LIMIT)
        ));
    }
    out
}

/// Build the context block. Documents are appended in score order until the
/// next one would push the block past `budget` characters. Returns the block
/// and how many documents it holds.
fn assemble_context(
    request: &RagRequest,
    results: &[SearchResult],
    instructions: &[String],
    budget: usize,
) -> (String, usize) {
    let mut sections: Vec<String> = Vec::new();

    if let Some(summary) = request.user_profile.as_ref().and_then(UserProfile::summary) {
        sections.push(format!("## User\n{}", summary));
    }
    if let Some(project) = &request.project {
        sections.push(format!("## Project\n{}", project.summary()));
    }

    let mut used: usize = sections.iter().map(|s| s.chars().count()).sum();
    let mut included = 0;
    let mut documents = Vec::new();
    for result in results {
        let block = format!(
            "### {} ({} relevance, {:.2})\n{}",
            result.document.metadata.file_path,
            result.relevance,
            result.score,
            result.document.content
        );
        let size = block.chars().count();
        if used + size > budget {
            break;
        }
        used += size;
        included += 1;
        documents.push(block);
    }
    if !documents.is_empty() {
        sections.push(format!("## Relevant code\n{}", documents.join("\n\n")));
    }

    sections.push(format!("## Request\n{}", request.query));
    if !instructions.is_empty() {
        let lines: Vec<String> = instructions.iter().map(|i| format!("- {}", i)).collect();
        sections.push(format!("## Instructions\n{}", lines.join("\n")));
    }

    (sections.join("\n\n"), included)
}
