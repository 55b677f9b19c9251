/// MCP Tool handlers for difftour.
///
/// 1. build_tour: ordered, explained tour of the working-tree diff
///    (or of whole files when `paths` is given)
/// 2. list_change_units: change units of the diff, unordered and unexplained
/// 3. clear_explanations: drop every cached explanation
///
/// Builds are synchronous (tree-sitter, git subprocesses, blocking HTTP), so
/// each one runs on tokio's blocking pool.
use crate::cache::ExplanationCache;
use crate::context::BuildContext;
use crate::mcp::server::McpContext;
use crate::sources::{DiskSources, GitSources, SourceProvider};
use crate::tour::models::{ChangeUnit, Tour};
use crate::tour::{GraphMode, TourOptions, build_overview_units, build_tour, collect_change_units};
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct BuildTourParams {
    /// What the reviewer cares about (e.g. 'error handling'); overrides the configured intent
    intent: Option<String>,
    /// Unified diff text to tour instead of `git diff HEAD`
    diff: Option<String>,
    /// Workspace-relative files to tour as they are, ignoring the diff
    paths: Option<Vec<String>>,
}

#[derive(Deserialize, JsonSchema)]
struct ListUnitsParams {
    /// Unified diff text to split instead of `git diff HEAD`
    diff: Option<String>,
}

// ── Response helpers ─────────────────────────────────────────────────

fn json_result(value: serde_json::Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&value).unwrap_or_default(),
    )]))
}

fn internal(context: &str, e: impl std::fmt::Display) -> McpError {
    McpError::internal_error(format!("{context}: {e}"), None)
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct TourTools {
    pub ctx: McpContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for TourTools {}

#[tool_router]
impl TourTools {
    pub fn new(ctx: McpContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    // ── Tool 1: build_tour ──────────────────────────────────────────

    #[tool(
        description = "Build a guided tour of the uncommitted changes: steps ordered so that definitions come before their uses, each with an explanation, plus the dependency graph. Pass `paths` to tour whole files instead of the diff."
    )]
    async fn build_tour(
        &self,
        params: Parameters<BuildTourParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = self.ctx.clone();
        let tour = tokio::task::spawn_blocking(move || run_build(&ctx, params.0))
            .await
            .map_err(|e| internal("build task failed", e))?
            .map_err(|e| internal("build failed", format!("{e:#}")))?;

        let value = serde_json::to_value(&tour).map_err(|e| internal("serialize failed", e))?;
        json_result(value)
    }

    // ── Tool 2: list_change_units ───────────────────────────────────

    #[tool(description = "List the change units (definitions, globals, operations) of the uncommitted diff")]
    async fn list_change_units(
        &self,
        params: Parameters<ListUnitsParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = self.ctx.clone();
        let units = tokio::task::spawn_blocking(move || run_units(&ctx, params.0.diff))
            .await
            .map_err(|e| internal("split task failed", e))?
            .map_err(|e| internal("split failed", format!("{e:#}")))?;

        json_result(serde_json::json!({
            "count": units.len(),
            "units": units,
        }))
    }

    // ── Tool 3: clear_explanations ──────────────────────────────────

    #[tool(description = "Delete every cached step explanation so the next tour regenerates them")]
    async fn clear_explanations(&self) -> Result<CallToolResult, McpError> {
        let mut cache = self.ctx.cache.lock().await;
        let cleared = cache.len();
        cache.clear();
        cache
            .save(&self.ctx.cache_path)
            .map_err(|e| internal("cache save failed", format!("{e:#}")))?;
        info!("Cleared {cleared} cached explanation(s)");

        json_result(serde_json::json!({
            "success": true,
            "cleared": cleared,
        }))
    }
}

// ── Helper functions ─────────────────────────────────────────────────

fn sources_for(root: &Path, diff: Option<String>) -> Box<dyn SourceProvider> {
    match diff {
        Some(diff) => Box::new(DiskSources::new(root, diff)),
        None => Box::new(GitSources::new(root)),
    }
}

fn run_units(ctx: &McpContext, diff: Option<String>) -> anyhow::Result<Vec<ChangeUnit>> {
    let sources = sources_for(&ctx.workspace_root, diff);
    let mut build = BuildContext::new(ctx.workspace_root.clone(), sources.as_ref())
        .with_filter(ctx.config.path_filter()?);
    Ok(collect_change_units(&mut build)?)
}

/// Diff tours share the persisted cache; file overviews get a scratch one so
/// their explanations never shadow diff explanations of the same lines.
fn run_build(ctx: &McpContext, params: BuildTourParams) -> anyhow::Result<Tour> {
    let sources = sources_for(&ctx.workspace_root, params.diff);
    let mut build = BuildContext::new(ctx.workspace_root.clone(), sources.as_ref())
        .with_filter(ctx.config.path_filter()?);
    let intent = params.intent.or_else(|| ctx.config.intent.clone());
    let mut options = TourOptions {
        intent: intent.as_deref(),
        proximity_threshold: ctx.config.proximity_threshold,
        ..TourOptions::default()
    };

    match params.paths.filter(|p| !p.is_empty()) {
        Some(paths) => {
            let units = build_overview_units(&paths, &mut build);
            options.mode = GraphMode::Overall;
            let mut scratch = ExplanationCache::new();
            Ok(build_tour(units, ctx.explainer.as_ref(), &mut scratch, &options))
        }
        None => {
            let units = collect_change_units(&mut build)?;
            let mut cache = ctx.cache.blocking_lock();
            let tour = build_tour(units, ctx.explainer.as_ref(), &mut cache, &options);
            cache.save(&ctx.cache_path)?;
            Ok(tour)
        }
    }
}
