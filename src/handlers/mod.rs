//! Retrieval handlers and intent routing
//!
//! Three interchangeable retrieval strategies behind one capability
//! interface, selected by intent.

use crate::models::{Intent, QueryResolution, RetrievalOutcome};

pub mod encyclopedia;
pub mod financial;
pub mod generic;

pub use encyclopedia::{EncyclopediaSource, EncyclopedicHandler, Page, WikipediaClient};
pub use financial::{FinanceData, FinancialHandler, YahooQuoteClient};
pub use generic::{
    create_default_registry, EncyclopediaTool, ProviderSearchTool, SearchTool, ToolRegistry,
    ToolSelectingHandler,
};

/// Capability interface implemented by all retrieval handler variants.
#[async_trait::async_trait]
pub trait RetrievalHandler: Send + Sync {
    fn name(&self) -> &'static str;
    async fn resolve_query(&self, query: &QueryResolution) -> crate::Result<RetrievalOutcome>;
}

/// Which handler serves an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Financial,
    Encyclopedic,
    Generic,
}

/// Route an intent to its retrieval strategy: `stock` goes to market data,
/// unrecognized intents go to the tool-selecting catch-all, and everything
/// else is company-profile material served from the encyclopedia.
pub fn route(intent: Intent) -> HandlerKind {
    match intent {
        Intent::Stock => HandlerKind::Financial,
        Intent::Unknown => HandlerKind::Generic,
        _ => HandlerKind::Encyclopedic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route() {
        assert_eq!(route(Intent::Stock), HandlerKind::Financial);
        assert_eq!(route(Intent::Unknown), HandlerKind::Generic);
        assert_eq!(route(Intent::Location), HandlerKind::Encyclopedic);
        assert_eq!(route(Intent::News), HandlerKind::Encyclopedic);
        assert_eq!(route(Intent::History), HandlerKind::Encyclopedic);
    }
}
