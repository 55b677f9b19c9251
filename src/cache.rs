/// Persisted explanations, matched back onto rebuilt steps by key.
///
/// A record is keyed by `"{stepType}|{filePath}|{start}-{end}"`, so an
/// explanation survives a rebuild as long as the step still covers the same
/// lines. Records are only valid for the intent they were generated with.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::tour::models::{StepKind, TourStep};

pub const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub explanation: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    intent: Option<String>,
    #[serde(default)]
    records: Vec<CacheRecord>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExplanationCache {
    intent: Option<String>,
    records: BTreeMap<String, CacheRecord>,
}

/// Cache key of a step.
pub fn step_key(step: &TourStep) -> String {
    let range = step.target.range();
    format!(
        "{}|{}|{}-{}",
        step.kind.as_str(),
        step.target.file_path(),
        range.start_line,
        range.end_line
    )
}

impl ExplanationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`. A missing file gives an empty cache; a corrupt or
    /// incompatible one is logged and ignored.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("no explanation cache at {}", path.display());
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read cache: {}", path.display()))?;
        let doc: CacheDocument = match serde_json::from_str(&data) {
            Ok(d) => d,
            Err(e) => {
                warn!("Ignoring corrupt explanation cache {}: {e}", path.display());
                return Ok(Self::default());
            }
        };
        if doc.version != CACHE_VERSION {
            warn!(
                "Ignoring explanation cache version {} (expected {CACHE_VERSION})",
                doc.version
            );
            return Ok(Self::default());
        }
        info!("Loaded {} cached explanation(s)", doc.records.len());
        Ok(Self {
            intent: doc.intent,
            records: doc
                .records
                .into_iter()
                .map(|r| (r.key.clone(), r))
                .collect(),
        })
    }

    /// Write to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let doc = CacheDocument {
            version: CACHE_VERSION,
            intent: self.intent.clone(),
            records: self.records.values().cloned().collect(),
        };
        let data = serde_json::to_string_pretty(&doc).context("failed to serialize cache")?;
        fs::write(path, data).with_context(|| format!("failed to write cache: {}", path.display()))
    }

    pub fn intent(&self) -> Option<&str> {
        self.intent.as_deref()
    }

    /// Drop every record when `intent` differs from the one they were made for.
    pub fn reset_for_intent(&mut self, intent: Option<&str>) {
        let intent = intent.map(str::trim).filter(|i| !i.is_empty());
        if self.intent.as_deref() != intent {
            if !self.records.is_empty() {
                info!("Intent changed, discarding {} cached explanation(s)", self.records.len());
            }
            self.records.clear();
            self.intent = intent.map(str::to_string);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.records.get(key).map(|r| r.explanation.as_str())
    }

    /// Store the explanation of `step` under its key.
    pub fn put(&mut self, step: &TourStep) {
        let range = step.target.range();
        let key = step_key(step);
        self.records.insert(
            key.clone(),
            CacheRecord {
                key,
                kind: step.kind,
                file_path: step.target.file_path().to_string(),
                start_line: range.start_line,
                end_line: range.end_line,
                explanation: step.explanation.clone(),
                updated_at: Utc::now(),
            },
        );
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tour::models::{ChangeUnit, CodeRegion, LineRange};

    fn main_step() -> TourStep {
        let mut step = TourStep::main(
            "main-1",
            ChangeUnit::operation("src/a.js", LineRange::new(4, 9), String::new()),
        );
        step.explanation = "Adds retries.".to_string();
        step
    }

    #[test]
    fn test_step_key() {
        assert_eq!(step_key(&main_step()), "main|src/a.js|4-9");
        let bg = TourStep::background(
            "bg-1",
            CodeRegion {
                file_path: "b.py".into(),
                range: LineRange::new(1, 2),
                label: "f".into(),
            },
        );
        assert_eq!(step_key(&bg), "background|b.py|1-2");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/cache.json");

        let mut cache = ExplanationCache::new();
        cache.reset_for_intent(Some("speed"));
        cache.put(&main_step());
        cache.save(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["intent"], "speed");
        assert_eq!(json["records"][0]["type"], "main");
        assert_eq!(json["records"][0]["filePath"], "src/a.js");
        assert_eq!(json["records"][0]["startLine"], 4);
        assert!(json["records"][0]["updatedAt"].is_string());

        let loaded = ExplanationCache::load(&path).unwrap();
        assert_eq!(loaded.intent(), Some("speed"));
        assert_eq!(loaded.get("main|src/a.js|4-9"), Some("Adds retries."));
    }

    #[test]
    fn test_intent_change_discards_records() {
        let mut cache = ExplanationCache::new();
        cache.put(&main_step());
        cache.reset_for_intent(None);
        assert_eq!(cache.len(), 1, "same (empty) intent keeps records");
        cache.reset_for_intent(Some("  "));
        assert_eq!(cache.len(), 1, "blank intent counts as none");
        cache.reset_for_intent(Some("other"));
        assert!(cache.is_empty());
        assert_eq!(cache.intent(), Some("other"));
    }

    #[test]
    fn test_missing_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ExplanationCache::load(&dir.path().join("none.json")).unwrap().is_empty());

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, "[1, 2").unwrap();
        assert!(ExplanationCache::load(&corrupt).unwrap().is_empty());

        let future = dir.path().join("future.json");
        fs::write(&future, r#"{"version": 99, "records": []}"#).unwrap();
        assert!(ExplanationCache::load(&future).unwrap().is_empty());
    }
}
