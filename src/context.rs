use crate::analyzer::syntax::{Analysis, SyntaxAnalyzer};
use crate::diff::parser::PathFilter;
use crate::sources::SourceProvider;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-build state: file texts and analyses, keyed by workspace-relative path.
///
/// Create one per build and drop it afterwards; nothing here is meant to
/// outlive a single diff snapshot.
pub struct BuildContext<'a> {
    workspace_root: PathBuf,
    sources: &'a dyn SourceProvider,
    filter: PathFilter,
    analyzer: SyntaxAnalyzer,
    revised: HashMap<String, Option<Arc<str>>>,
    original: HashMap<String, Option<Arc<str>>>,
}

impl<'a> BuildContext<'a> {
    pub fn new(workspace_root: impl Into<PathBuf>, sources: &'a dyn SourceProvider) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            sources,
            filter: PathFilter::default(),
            analyzer: SyntaxAnalyzer::new(),
            revised: HashMap::new(),
            original: HashMap::new(),
        }
    }

    pub fn with_filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    pub fn sources(&self) -> &'a dyn SourceProvider {
        self.sources
    }

    /// Working-tree text, or `None` when it cannot be read.
    pub fn revised_text(&mut self, path: &str) -> Option<Arc<str>> {
        if let Some(cached) = self.revised.get(path) {
            return cached.clone();
        }
        let text = match self.sources.read_now(path) {
            Ok(t) => Some(Arc::from(t)),
            Err(e) => {
                warn!("cannot read {}: {}", path, e);
                None
            }
        };
        self.revised.insert(path.to_string(), text.clone());
        text
    }

    /// `HEAD` text, or `None` for files that are new or unreadable.
    pub fn original_text(&mut self, path: &str) -> Option<Arc<str>> {
        if let Some(cached) = self.original.get(path) {
            return cached.clone();
        }
        let text = match self.sources.read_at_head(path) {
            Ok(t) => Some(Arc::from(t)),
            Err(e) => {
                debug!("no HEAD version of {}: {}", path, e);
                None
            }
        };
        self.original.insert(path.to_string(), text.clone());
        text
    }

    pub fn analyze_revised(&mut self, path: &str) -> Arc<Analysis> {
        match self.revised_text(path) {
            Some(text) => self.analyzer.analyze(path, &text),
            None => Arc::new(Analysis::default()),
        }
    }

    pub fn analyze_original(&mut self, path: &str) -> Arc<Analysis> {
        match self.original_text(path) {
            Some(text) => self.analyzer.analyze(path, &text),
            None => Arc::new(Analysis::default()),
        }
    }
}
