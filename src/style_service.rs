//! Project-level style analysis.
//!
//! Reads every script under the configured scripts subpath of a project
//! (default `Assets/Scripts`) and hands the corpus to the core analyzer.
//! Unreadable scripts are skipped; a missing subpath yields an empty
//! profile.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use unity_context_core::style::{analyze_units, apply_style, StyleProfile};

use crate::access::{FileFilter, SourceAccess};
use crate::config::StyleConfig;

pub struct StyleService {
    access: Arc<SourceAccess>,
    scripts_subpath: PathBuf,
}

impl StyleService {
    pub fn new(access: Arc<SourceAccess>, config: &StyleConfig) -> Self {
        Self {
            access,
            scripts_subpath: config.scripts_subpath.clone(),
        }
    }

    pub fn analyze_project(&self, root: &Path) -> Result<StyleProfile> {
        let root = self.access.allow(root)?;
        let scripts = root.join(&self.scripts_subpath);
        let files = self
            .access
            .list_files(&scripts, &FileFilter::include(&["**/*.cs"]))?;

        let mut units = Vec::with_capacity(files.len());
        for path in &files {
            match self.access.read_file(path) {
                Ok(unit) => units.push(unit),
                Err(e) => warn!(path = %path.display(), error = %format!("{:#}", e), "skipping script"),
            }
        }

        let profile = analyze_units(&units);
        info!(
            root = %root.display(),
            units = profile.analyzed_unit_count,
            patterns = profile.patterns.len(),
            confidence = profile.overall_confidence,
            "style analyzed"
        );
        Ok(profile)
    }

    /// Analyze `root` and rewrite `text` to match it.
    pub fn restyle(&self, root: &Path, text: &str) -> Result<String> {
        let profile = self.analyze_project(root)?;
        Ok(apply_style(text, &profile))
    }
}
