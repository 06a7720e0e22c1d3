//! Generic tool-selecting retrieval handler
//!
//! Catch-all for queries needing live web lookup: a language-model
//! classification step maps the task to zero or more retrieval tools,
//! which are invoked concurrently and their outputs concatenated in
//! invocation order.

use crate::handlers::encyclopedia::EncyclopediaSource;
use crate::handlers::RetrievalHandler;
use crate::llm::{strip_code_fence, LanguageModel};
use crate::models::{Evidence, QueryResolution, RetrievalOutcome};
use crate::search::SearchProvider;
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A single retrieval tool the selector can pick.
#[async_trait]
pub trait SearchTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn run(&self, query: &str) -> crate::Result<Evidence>;
}

/// Tool registry for looking up retrieval tools by name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn SearchTool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn SearchTool>) {
        self.order.push(tool.name().to_string());
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SearchTool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tools in registration order.
    pub fn list(&self) -> Vec<Arc<dyn SearchTool>> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name).cloned())
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct ToolSelection {
    #[serde(default)]
    tools: Vec<String>,
}

pub struct ToolSelectingHandler {
    model: Arc<dyn LanguageModel>,
    registry: ToolRegistry,
    fallback: Arc<dyn SearchTool>,
}

impl ToolSelectingHandler {
    /// `fallback` is used whenever selection fails or comes back empty;
    /// it should be the broadest web-search tool available.
    pub fn new(
        model: Arc<dyn LanguageModel>,
        registry: ToolRegistry,
        fallback: Arc<dyn SearchTool>,
    ) -> Self {
        Self {
            model,
            registry,
            fallback,
        }
    }

    fn selection_system(&self) -> String {
        let tool_lines: Vec<String> = self
            .registry
            .list()
            .iter()
            .map(|tool| format!(" - {} ({})", tool.name(), tool.description()))
            .collect();

        format!(
            "You are a smart assistant that selects the best search tools for a given task. \
You have access to the following tools: \n{}\n\
Return a JSON object with the best tools for this task, STRICTLY in the following format: \
{{\"tools\": [\"<tool1>\", \"<tool2>\"]}}.",
            tool_lines.join("\n")
        )
    }

    /// Map the task description to retrieval tools. Unknown tool names are
    /// dropped; a parse failure or empty selection falls back to the
    /// default broad-web-search tool.
    pub async fn select_tools(&self, task: &str) -> crate::Result<Vec<Arc<dyn SearchTool>>> {
        let user = format!("Given the following user task: {}", task);
        let response = self.model.complete(&self.selection_system(), &user).await?;
        let cleaned = strip_code_fence(&response).replace('\n', "");

        let selected = match serde_json::from_str::<ToolSelection>(cleaned.trim()) {
            Ok(selection) => {
                let tools: Vec<Arc<dyn SearchTool>> = selection
                    .tools
                    .iter()
                    .filter_map(|name| {
                        let tool = self.registry.get(name);
                        if tool.is_none() {
                            warn!(tool = %name, "Selector chose an unregistered tool, dropping");
                        }
                        tool
                    })
                    .collect();
                tools
            }
            Err(e) => {
                warn!(error = %e, "Tool selection did not return valid JSON, using fallback");
                Vec::new()
            }
        };

        if selected.is_empty() {
            return Ok(vec![self.fallback.clone()]);
        }

        Ok(selected)
    }
}

#[async_trait]
impl RetrievalHandler for ToolSelectingHandler {
    fn name(&self) -> &'static str {
        "Web Tools"
    }

    async fn resolve_query(&self, query: &QueryResolution) -> crate::Result<RetrievalOutcome> {
        let tools = self.select_tools(&query.refined_text).await?;

        debug!(
            tools = ?tools.iter().map(|t| t.name()).collect::<Vec<_>>(),
            "Running selected tools concurrently"
        );

        let runs = join_all(
            tools
                .iter()
                .map(|tool| tool.run(&query.refined_text)),
        )
        .await;

        // Results joined back in invocation order for stable attribution.
        let mut pieces = Vec::with_capacity(runs.len());
        for result in runs {
            pieces.push(result?);
        }

        Ok(RetrievalOutcome::Answer(Evidence::merge(
            pieces,
            self.name(),
        )))
    }
}

//
// ================= Concrete tools =================
//

/// Encyclopedic lookup as a selectable tool: first matching article chunk.
pub struct EncyclopediaTool {
    source: Arc<dyn EncyclopediaSource>,
}

impl EncyclopediaTool {
    pub fn new(source: Arc<dyn EncyclopediaSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl SearchTool for EncyclopediaTool {
    fn name(&self) -> &'static str {
        "wikipedia"
    }

    fn description(&self) -> &'static str {
        "structured information like general knowledge, company profiles, historical/product info, location"
    }

    async fn run(&self, query: &str) -> crate::Result<Evidence> {
        let pages = self.source.pages(query).await?;

        match pages.into_iter().next() {
            Some(page) => {
                let url = format!(
                    "https://en.wikipedia.org/wiki/{}",
                    page.title.replace(' ', "_")
                );
                Ok(Evidence::new(page.content, vec![url], self.name()))
            }
            None => Ok(Evidence::new(
                format!("No relevant Wikipedia data found for {}.", query),
                Vec::new(),
                self.name(),
            )),
        }
    }
}

/// A web-search backend as a selectable tool.
pub struct ProviderSearchTool {
    tool_name: &'static str,
    tool_description: &'static str,
    provider: Arc<dyn SearchProvider>,
    max_hits: Option<usize>,
}

impl ProviderSearchTool {
    pub fn new(
        tool_name: &'static str,
        tool_description: &'static str,
        provider: Arc<dyn SearchProvider>,
        max_hits: Option<usize>,
    ) -> Self {
        Self {
            tool_name,
            tool_description,
            provider,
            max_hits,
        }
    }
}

#[async_trait]
impl SearchTool for ProviderSearchTool {
    fn name(&self) -> &'static str {
        self.tool_name
    }

    fn description(&self) -> &'static str {
        self.tool_description
    }

    async fn run(&self, query: &str) -> crate::Result<Evidence> {
        let mut hits = self.provider.search(query).await?;
        if let Some(max) = self.max_hits {
            hits.truncate(max);
        }

        let text = hits
            .iter()
            .map(|hit| hit.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let sources = hits.into_iter().map(|hit| hit.url).collect();

        Ok(Evidence::new(text, sources, self.name()))
    }
}

/// Build the default registry: encyclopedic lookup, Google-style search,
/// and the broad web fallback. Returns the registry and the fallback tool.
pub fn create_default_registry(
    encyclopedia: Arc<dyn EncyclopediaSource>,
    serper: Arc<dyn SearchProvider>,
    tavily: Arc<dyn SearchProvider>,
) -> (ToolRegistry, Arc<dyn SearchTool>) {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(EncyclopediaTool::new(encyclopedia)));
    registry.register(Arc::new(ProviderSearchTool::new(
        "serper_search",
        "up-to-date news, financial queries, Google-like search",
        serper,
        None,
    )));

    let fallback: Arc<dyn SearchTool> = Arc::new(ProviderSearchTool::new(
        "tavily_search",
        "fallback web-wide search, including blogs, analysis, and lists",
        tavily,
        Some(3),
    ));
    registry.register(fallback.clone());

    (registry, fallback)
}
