//! Verification and reconciliation
//!
//! Runs two independent web searches, optionally validates a candidate
//! ("auxiliary") answer against them, and reconciles the evidence into one
//! final cited answer. The auxiliary answer is either used verbatim with
//! citations or wholly replaced, never partially merged.

use crate::llm::LanguageModel;
use crate::models::{Evidence, Validity};
use crate::search::SearchProvider;
use crate::sources::format_sources;
use std::sync::Arc;
use tracing::{debug, info};

/// At most this many content snippets from each search feed the prompts.
const SNIPPET_LIMIT: usize = 3;

/// At most this many searched sources are cited alongside an answer.
const SOURCE_LIMIT: usize = 5;

const SYNTHESIS_SYSTEM: &str = "You are an assistant that synthesizes and validates search results for a user query. \
Given two separate web searches, your task is to produce a DIRECT, concise (one sentence) \
answer that combines the key information from both results. Follow these rules: \
1. Your answer must address the query directly without additional commentary. \
2. If the query requests a list (e.g., companies), include specific, concrete examples. \
3. At the end of your answer, append the URLs of ALL relevant sources in parentheses, \
comma-separated, e.g. (https://businessinsider.com/article, https://reuters.com/article). \
4. If the two searches conflict, rely on the Second search. \
Provide ONLY the final answer in the specified format.";

const VALIDATION_SYSTEM: &str = "You are an assistant that validates whether an auxiliary response is accurate, \
using search results from web searches First search and Second search. Respond based on the following: \
- If the auxiliary response contains factually correct and relevant information based on the search results, respond with 'valid'. \
- ONLY if the auxiliary response is inaccurate, respond with 'invalid'. \
Respond with either 'valid' or 'invalid'.";

/// A candidate answer from a non-web-search source, pending
/// cross-verification, together with its running source URL.
#[derive(Debug, Clone)]
pub struct AuxiliaryAnswer {
    pub response: String,
    pub source: String,
}

/// Combined search handler over two independent backends.
pub struct VerificationSearchHandler {
    model: Arc<dyn LanguageModel>,
    first: Arc<dyn SearchProvider>,
    second: Arc<dyn SearchProvider>,
}

impl VerificationSearchHandler {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        first: Arc<dyn SearchProvider>,
        second: Arc<dyn SearchProvider>,
    ) -> Self {
        Self {
            model,
            first,
            second,
        }
    }

    /// Run one backend and shape the result: the first three snippets
    /// joined with single spaces, plus the full ordered source list.
    async fn gather(&self, provider: &dyn SearchProvider, query: &str) -> crate::Result<Evidence> {
        let hits = provider.search(query).await?;

        let text = hits
            .iter()
            .take(SNIPPET_LIMIT)
            .map(|hit| hit.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let sources = hits.into_iter().map(|hit| hit.url).collect();

        Ok(Evidence::new(text, sources, provider.name()))
    }

    /// Run both search backends concurrently and reconcile into one final
    /// cited answer.
    ///
    /// With an auxiliary answer, it is first validated against the two
    /// searches: `valid` keeps it verbatim with the auxiliary source cited
    /// first (plus up to five searched sources); `invalid` discards it
    /// entirely and falls back to pure synthesis.
    pub async fn combined_search(
        &self,
        user_query: &str,
        auxiliary: Option<AuxiliaryAnswer>,
    ) -> crate::Result<String> {
        let (first, second) = tokio::join!(
            self.gather(self.first.as_ref(), user_query),
            self.gather(self.second.as_ref(), user_query)
        );
        let first = first?;
        let second = second?;

        // Union with duplicates removed; ordering carries no meaning here.
        let mut all_sources: Vec<String> = Vec::new();
        for url in first.sources.iter().chain(second.sources.iter()) {
            if !all_sources.contains(url) {
                all_sources.push(url.clone());
            }
        }

        debug!(
            first = self.first.name(),
            second = self.second.name(),
            source_count = all_sources.len(),
            "Both searches completed"
        );

        if let Some(aux) = auxiliary {
            match self
                .validate_auxiliary(user_query, &aux.response, &first.text, &second.text)
                .await?
            {
                Validity::Valid => {
                    info!(source = %aux.source, "Auxiliary answer validated");
                    return Ok(cite_auxiliary(&aux, &all_sources));
                }
                Validity::Invalid => {
                    info!("Auxiliary answer contradicted, discarding");
                }
            }
        }

        self.synthesize(user_query, &first.text, &second.text, &all_sources)
            .await
    }

    /// Ask the model to merge the two searches into one direct answer with
    /// a trailing source annotation, then rewrite the annotation into
    /// hyperlinked citations.
    async fn synthesize(
        &self,
        user_query: &str,
        first_text: &str,
        second_text: &str,
        all_sources: &[String],
    ) -> crate::Result<String> {
        let capped: Vec<&str> = all_sources
            .iter()
            .take(SOURCE_LIMIT)
            .map(String::as_str)
            .collect();

        let user = format!(
            "User Query: {}\nFirst search: {}\nSecond search: {}\nSources: {}",
            user_query,
            first_text,
            second_text,
            capped.join(", ")
        );

        let answer = self.model.complete(SYNTHESIS_SYSTEM, &user).await?;

        Ok(format_sources(answer.trim(), None))
    }

    async fn validate_auxiliary(
        &self,
        query: &str,
        auxiliary_response: &str,
        first_text: &str,
        second_text: &str,
    ) -> crate::Result<Validity> {
        let user = format!(
            "Query: {}\nAuxiliary Response: {}\nFirst search: {}\nSecond search: {}",
            query, auxiliary_response, first_text, second_text
        );

        let raw = self.model.complete(VALIDATION_SYSTEM, &user).await?;
        Ok(Validity::parse(&raw))
    }
}

/// Append the auxiliary source plus up to five searched sources to the
/// validated answer, auxiliary source always first so the cap never
/// displaces it, then format the citations.
fn cite_auxiliary(aux: &AuxiliaryAnswer, searched_sources: &[String]) -> String {
    let mut cited: Vec<&str> = Vec::with_capacity(SOURCE_LIMIT + 1);
    cited.push(aux.source.as_str());
    cited.extend(
        searched_sources
            .iter()
            .filter(|url| url.as_str() != aux.source)
            .take(SOURCE_LIMIT)
            .map(String::as_str),
    );

    let body = aux.response.trim_end().trim_end_matches('.');
    let annotated = format!("{} ({})", body, cited.join(", "));

    format_sources(&annotated, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::search::SearchHit;
    use async_trait::async_trait;

    struct StaticProvider {
        name: &'static str,
        hits: Vec<SearchHit>,
    }

    #[async_trait]
    impl SearchProvider for StaticProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn search(&self, _query: &str) -> crate::Result<Vec<SearchHit>> {
            Ok(self.hits.clone())
        }
    }

    fn hit(content: &str, url: &str) -> SearchHit {
        SearchHit {
            content: content.to_string(),
            url: url.to_string(),
        }
    }

    fn providers() -> (Arc<dyn SearchProvider>, Arc<dyn SearchProvider>) {
        let first = Arc::new(StaticProvider {
            name: "Tavily",
            hits: vec![
                hit("Tesla is an EV company.", "https://tesla.com"),
                hit("Tesla was founded in 2003.", "https://example.com/tesla"),
            ],
        });
        let second = Arc::new(StaticProvider {
            name: "Serper",
            hits: vec![
                hit("Tesla's stock is performing well.", "https://finance.com/tesla"),
                hit("Tesla builds EVs.", "https://tesla.com"),
            ],
        });
        (first, second)
    }

    #[tokio::test]
    async fn test_gather_caps_snippets_but_keeps_all_sources() {
        let provider = StaticProvider {
            name: "Tavily",
            hits: vec![
                hit("one.", "https://a.com"),
                hit("two.", "https://b.com"),
                hit("three.", "https://c.com"),
                hit("four.", "https://d.com"),
            ],
        };
        let (first, second) = providers();
        let handler = VerificationSearchHandler::new(
            Arc::new(ScriptedModel::new(Vec::<String>::new())),
            first,
            second,
        );

        let evidence = handler.gather(&provider, "anything").await.unwrap();
        assert_eq!(evidence.text, "one. two. three.");
        assert_eq!(evidence.sources.len(), 4);
    }

    #[tokio::test]
    async fn test_combined_search_synthesizes_and_formats() {
        let (first, second) = providers();
        let model = ScriptedModel::new([
            "Tesla is a leading EV company and its stock is performing well. (https://tesla.com, https://finance.com/tesla)",
        ]);
        let handler = VerificationSearchHandler::new(Arc::new(model), first, second);

        let result = handler.combined_search("Tell me about Tesla", None).await.unwrap();

        assert!(result.starts_with("Tesla is a leading EV company"));
        assert!(result.contains("(Source: "));
        assert!(result.contains("https://tesla.com"));
        assert!(result.contains("\u{1b}]8;;"));
    }

    #[tokio::test]
    async fn test_valid_auxiliary_is_cited_verbatim() {
        let (first, second) = providers();
        let model = ScriptedModel::new(["valid"]);
        let handler = VerificationSearchHandler::new(Arc::new(model), first, second);

        let aux = AuxiliaryAnswer {
            response: "Tesla is an electric vehicle company.".to_string(),
            source: "https://en.wikipedia.org/wiki/Tesla,_Inc.".to_string(),
        };

        let result = handler
            .combined_search("What does Tesla do?", Some(aux.clone()))
            .await
            .unwrap();

        let expected = format_sources(
            "Tesla is an electric vehicle company (https://en.wikipedia.org/wiki/Tesla,_Inc., https://tesla.com, https://example.com/tesla, https://finance.com/tesla)",
            None,
        );
        assert_eq!(result, expected);
    }

    #[tokio::test]
    async fn test_auxiliary_source_survives_the_cap() {
        let first = Arc::new(StaticProvider {
            name: "Tavily",
            hits: (0..6)
                .map(|i| hit("snippet.", &format!("https://site{}.com", i)))
                .collect(),
        });
        let second = Arc::new(StaticProvider {
            name: "Serper",
            hits: vec![hit("snippet.", "https://site6.com")],
        });
        let model = ScriptedModel::new(["valid"]);
        let handler = VerificationSearchHandler::new(Arc::new(model), first, second);

        let result = handler
            .combined_search(
                "What does Tesla do?",
                Some(AuxiliaryAnswer {
                    response: "An answer.".to_string(),
                    source: "https://en.wikipedia.org/wiki/Tesla,_Inc.".to_string(),
                }),
            )
            .await
            .unwrap();

        // Auxiliary source always cited, plus at most five searched ones.
        assert!(result.contains("https://en.wikipedia.org/wiki/Tesla,_Inc."));
        assert!(result.contains("https://site4.com"));
        assert!(!result.contains("https://site5.com"));
    }

    #[tokio::test]
    async fn test_invalid_auxiliary_matches_no_auxiliary_path() {
        let synthesized =
            "Tesla designs and sells electric vehicles. (https://tesla.com, https://finance.com/tesla)";

        let (first_a, second_a) = providers();
        let with_aux = VerificationSearchHandler::new(
            Arc::new(ScriptedModel::new(["invalid", synthesized])),
            first_a,
            second_a,
        );

        let (first_b, second_b) = providers();
        let without_aux = VerificationSearchHandler::new(
            Arc::new(ScriptedModel::new([synthesized])),
            first_b,
            second_b,
        );

        let aux = AuxiliaryAnswer {
            response: "Tesla is a solar panel retailer.".to_string(),
            source: "https://en.wikipedia.org/wiki/Tesla,_Inc.".to_string(),
        };

        let discarded = with_aux
            .combined_search("What does Tesla do?", Some(aux))
            .await
            .unwrap();
        let fresh = without_aux
            .combined_search("What does Tesla do?", None)
            .await
            .unwrap();

        assert_eq!(discarded, fresh);
        assert!(!discarded.contains("solar panel"));
    }
}
