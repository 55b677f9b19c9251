/// MCP Server setup using `rmcp` with stdio transport.
///
/// Provides `McpContext` (shared state) and `McpServer` (startup logic).
use crate::mcp::tools::TourTools;
use anyhow::{Context, Result};
use rmcp::{ServiceExt, handler::server::router::Router, transport::io::stdio};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::{cache::ExplanationCache, config::TourConfig, explain::Explainer};
use tokio::sync::Mutex as TokioMutex;

/// Shared application context available to all tool handlers.
#[derive(Clone)]
pub struct McpContext {
    pub workspace_root: PathBuf,
    pub config: Arc<TourConfig>,
    pub explainer: Arc<dyn Explainer>,
    pub cache: Arc<TokioMutex<ExplanationCache>>,
    pub cache_path: PathBuf,
}

impl McpContext {
    /// Load the explanation cache named by `config` and bundle everything
    /// the tools need.
    pub fn new(
        workspace_root: PathBuf,
        config: TourConfig,
        explainer: Arc<dyn Explainer>,
    ) -> Result<Self> {
        let cache_path = config.cache_file(&workspace_root);
        let cache = ExplanationCache::load(&cache_path)?;
        Ok(Self {
            workspace_root,
            config: Arc::new(config),
            explainer,
            cache: Arc::new(TokioMutex::new(cache)),
            cache_path,
        })
    }
}

/// MCP Server wrapping the context and serving via stdio.
#[derive(Clone)]
pub struct McpServer {
    pub ctx: McpContext,
}

impl McpServer {
    pub fn new(ctx: McpContext) -> Self {
        Self { ctx }
    }

    /// Start the MCP server on stdio transport (blocks until the client disconnects).
    pub async fn start(self) -> Result<()> {
        info!(
            "Starting MCP server on stdio for {}",
            self.ctx.workspace_root.display()
        );
        let (stdin, stdout) = stdio();

        let tools = TourTools::new(self.ctx.clone());
        let router = Router::new(tools.clone()).with_tools(tools.tool_router.clone());

        let service = router
            .serve((stdin, stdout))
            .await
            .context("MCP Server encountered an error during stdio transport")?;
        let reason = service
            .waiting()
            .await
            .context("MCP Server task terminated abnormally")?;
        info!("MCP server stopped: {reason:?}");

        Ok(())
    }
}
