//! Pipeline orchestrator
//!
//! DISAMBIGUATE → RETRIEVE → EVALUATE → VERIFY → RETRY? → ANSWER
//!
//! Owns the query resolution for the session's duration. The stage
//! sequence is strictly sequential; concurrency happens only inside a
//! stage's fan-out. Retries exactly once with a renewed clarification.

use crate::disambiguator::{Clarifier, QueryDisambiguator};
use crate::evaluator::SufficiencyEvaluator;
use crate::handlers::{route, HandlerKind, RetrievalHandler};
use crate::models::{Intent, PipelineOutcome, RetrievalOutcome, Sufficiency};
use crate::verification::{AuxiliaryAnswer, VerificationSearchHandler};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One renewed clarification after a failed verification round; a second
/// failure is terminal.
const MAX_RETRIES: u32 = 1;

pub struct Orchestrator {
    disambiguator: QueryDisambiguator,
    evaluator: SufficiencyEvaluator,
    verifier: VerificationSearchHandler,
    financial: Arc<dyn RetrievalHandler>,
    encyclopedic: Arc<dyn RetrievalHandler>,
    generic: Arc<dyn RetrievalHandler>,
}

impl Orchestrator {
    pub fn new(
        disambiguator: QueryDisambiguator,
        evaluator: SufficiencyEvaluator,
        verifier: VerificationSearchHandler,
        financial: Arc<dyn RetrievalHandler>,
        encyclopedic: Arc<dyn RetrievalHandler>,
        generic: Arc<dyn RetrievalHandler>,
    ) -> Self {
        Self {
            disambiguator,
            evaluator,
            verifier,
            financial,
            encyclopedic,
            generic,
        }
    }

    fn handler_for(&self, kind: HandlerKind) -> &Arc<dyn RetrievalHandler> {
        match kind {
            HandlerKind::Financial => &self.financial,
            HandlerKind::Encyclopedic => &self.encyclopedic,
            HandlerKind::Generic => &self.generic,
        }
    }

    /// Run the full pipeline for one raw question.
    pub async fn run(
        &self,
        user_input: &str,
        clarifier: &dyn Clarifier,
    ) -> crate::Result<PipelineOutcome> {
        info!(input = %user_input, "Pipeline: starting");

        // === DISAMBIGUATE ===
        let mut resolution = self.disambiguator.resolve(user_input, clarifier).await?;
        let mut retries = 0;

        loop {
            let kind = route(resolution.intent);
            let handler = self.handler_for(kind);

            debug!(
                session_id = %resolution.session_id,
                intent = %resolution.intent,
                handler = handler.name(),
                refined = %resolution.refined_text,
                "Pipeline: retrieving"
            );

            // === RETRIEVE ===
            let outcome = handler.resolve_query(&resolution).await?;

            let evidence = match outcome {
                RetrievalOutcome::NotTradable { message } => {
                    info!(session_id = %resolution.session_id, "Pipeline: no ticker");
                    return Ok(PipelineOutcome::NotTradable(message));
                }
                RetrievalOutcome::Answer(evidence) => evidence,
            };

            // Market snapshots are fresher than anything web corroboration
            // could offer; return them as-is.
            if resolution.intent == Intent::Stock {
                info!(session_id = %resolution.session_id, "Pipeline: financial answer");
                return Ok(PipelineOutcome::Answer(evidence.text));
            }

            // === EVALUATE ===
            let verdict = self
                .evaluator
                .evaluate(&resolution.refined_text, &evidence.text)
                .await?;

            debug!(
                session_id = %resolution.session_id,
                verdict = %verdict,
                origin = %evidence.origin,
                "Pipeline: candidate evaluated"
            );

            // === VERIFY ===
            if verdict == Sufficiency::Sufficient {
                let auxiliary = AuxiliaryAnswer {
                    response: evidence.text.clone(),
                    source: evidence
                        .sources
                        .first()
                        .cloned()
                        .unwrap_or_default(),
                };

                let verified = self
                    .verifier
                    .combined_search(&resolution.refined_text, Some(auxiliary))
                    .await?;

                info!(session_id = %resolution.session_id, "Pipeline: verified answer");
                return Ok(PipelineOutcome::Answer(verified));
            }

            debug!(
                session_id = %resolution.session_id,
                origin = %evidence.origin,
                "Pipeline: candidate insufficient, running combined search"
            );

            let candidate = self
                .verifier
                .combined_search(&resolution.refined_text, None)
                .await?;

            let verdict = self
                .evaluator
                .evaluate(&resolution.refined_text, &candidate)
                .await?;

            if verdict == Sufficiency::Sufficient {
                info!(session_id = %resolution.session_id, "Pipeline: combined search answer");
                return Ok(PipelineOutcome::Answer(candidate));
            }

            // === RETRY ===
            if retries >= MAX_RETRIES {
                warn!(
                    session_id = %resolution.session_id,
                    "Pipeline: verification failed twice, giving up"
                );
                return Ok(PipelineOutcome::Unanswerable(format!(
                    "I wasn't able to find a reliable answer for \"{}\". \
You could try rephrasing the question or asking about a different company.",
                    resolution.refined_text
                )));
            }

            retries += 1;
            warn!(
                session_id = %resolution.session_id,
                attempt = retries,
                "Pipeline: verification insufficient, retrying with renewed clarification"
            );

            resolution = self
                .disambiguator
                .resolve_retry(&resolution, clarifier)
                .await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::SearchTool;
    use crate::llm::testing::ScriptedModel;
    use crate::llm::LanguageModel;
    use crate::models::{Evidence, QueryResolution};
    use crate::search::{SearchHit, SearchProvider};
    use async_trait::async_trait;

    struct CannedClarifier(&'static str);

    #[async_trait]
    impl Clarifier for CannedClarifier {
        async fn clarify(&self, _follow_up: &str) -> crate::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct StaticHandler {
        name: &'static str,
        outcome: RetrievalOutcome,
    }

    #[async_trait]
    impl RetrievalHandler for StaticHandler {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn resolve_query(&self, _query: &QueryResolution) -> crate::Result<RetrievalOutcome> {
            Ok(self.outcome.clone())
        }
    }

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

    fn static_handler(name: &'static str, outcome: RetrievalOutcome) -> Arc<dyn RetrievalHandler> {
        Arc::new(StaticHandler { name, outcome })
    }

    fn wiki_answer(text: &str) -> RetrievalOutcome {
        RetrievalOutcome::Answer(Evidence::new(
            text,
            vec!["https://en.wikipedia.org/wiki/Tesla,_Inc.".to_string()],
            "Wikipedia",
        ))
    }

    fn verifier(model: Arc<dyn LanguageModel>) -> VerificationSearchHandler {
        VerificationSearchHandler::new(
            model,
            Arc::new(StaticProvider {
                name: "Tavily",
                hits: vec![SearchHit {
                    content: "Tesla builds EVs.".to_string(),
                    url: "https://tesla.com".to_string(),
                }],
            }),
            Arc::new(StaticProvider {
                name: "Serper",
                hits: vec![SearchHit {
                    content: "Tesla is based in Austin.".to_string(),
                    url: "https://news.com/tesla".to_string(),
                }],
            }),
        )
    }

    fn orchestrator_with(
        model: Arc<dyn LanguageModel>,
        encyclopedic: Arc<dyn RetrievalHandler>,
        financial: Arc<dyn RetrievalHandler>,
    ) -> Orchestrator {
        Orchestrator::new(
            QueryDisambiguator::new(model.clone()),
            SufficiencyEvaluator::new(model.clone()),
            verifier(model),
            financial,
            encyclopedic,
            static_handler("Web Tools", wiki_answer("unused")),
        )
    }

    #[tokio::test]
    async fn test_sufficient_candidate_is_verified_with_citations() {
        // One scripted model drives every stage in call order.
        let model: Arc<dyn LanguageModel> = Arc::new(ScriptedModel::new([
            // disambiguation
            r#"{"ambiguous": false, "follow_up": null}"#,
            r#"{"company": "Tesla Inc.", "intent": "location", "details": "headquarters", "time_reference": ""}"#,
            // evaluation of the wiki candidate
            "sufficient",
            // auxiliary validation inside combined_search
            "valid",
        ]));

        let orchestrator = orchestrator_with(
            model,
            static_handler("Wikipedia", wiki_answer("Tesla is headquartered in Austin, Texas.")),
            static_handler("Yahoo Finance", wiki_answer("unused")),
        );

        let outcome = orchestrator
            .run("Where is Tesla headquartered?", &CannedClarifier("unused"))
            .await
            .unwrap();

        let PipelineOutcome::Answer(text) = outcome else {
            panic!("expected an answer");
        };
        assert!(text.starts_with("Tesla is headquartered in Austin, Texas"));
        assert!(text.contains("(Source: "));
        assert!(text.contains("https://en.wikipedia.org/wiki/Tesla,_Inc."));
    }

    #[tokio::test]
    async fn test_insufficient_candidate_falls_back_to_combined_search() {
        let model: Arc<dyn LanguageModel> = Arc::new(ScriptedModel::new([
            r#"{"ambiguous": false, "follow_up": null}"#,
            r#"{"company": "Tesla Inc.", "intent": "location", "details": "headquarters", "time_reference": ""}"#,
            // candidate judged insufficient
            "incomplete",
            // combined-search synthesis
            "Tesla is headquartered in Austin, Texas. (https://tesla.com, https://news.com/tesla)",
            // synthesized answer judged sufficient
            "sufficient",
        ]));

        let orchestrator = orchestrator_with(
            model,
            static_handler("Wikipedia", wiki_answer("No relevant Wikipedia data found for Tesla Inc. headquarters location.")),
            static_handler("Yahoo Finance", wiki_answer("unused")),
        );

        let outcome = orchestrator
            .run("Where is Tesla headquartered?", &CannedClarifier("unused"))
            .await
            .unwrap();

        let PipelineOutcome::Answer(text) = outcome else {
            panic!("expected an answer");
        };
        assert!(text.starts_with("Tesla is headquartered in Austin, Texas"));
        assert!(text.contains("\u{1b}]8;;"));
    }

    #[tokio::test]
    async fn test_second_verification_failure_is_terminal() {
        let model: Arc<dyn LanguageModel> = Arc::new(ScriptedModel::new([
            r#"{"ambiguous": false, "follow_up": null}"#,
            r#"{"company": "Acme", "intent": "history", "details": "", "time_reference": ""}"#,
            // round 1: candidate insufficient, synthesis insufficient
            "incomplete",
            "Something vague. (https://tesla.com)",
            "incomplete",
            // retry resolution
            "Acme Corporation early history",
            r#"{"company": "Acme Corporation", "intent": "history", "details": "early", "time_reference": ""}"#,
            // round 2: candidate insufficient, synthesis insufficient
            "incomplete",
            "Still vague. (https://tesla.com)",
            "incomplete",
        ]));

        let orchestrator = orchestrator_with(
            model,
            static_handler("Wikipedia", wiki_answer("Unhelpful answer.")),
            static_handler("Yahoo Finance", wiki_answer("unused")),
        );

        let outcome = orchestrator
            .run("Tell me about Acme", &CannedClarifier("the 1950s cartoon company"))
            .await
            .unwrap();

        assert!(matches!(outcome, PipelineOutcome::Unanswerable(_)));
    }

    #[tokio::test]
    async fn test_stock_intent_returns_financial_answer_directly() {
        let model: Arc<dyn LanguageModel> = Arc::new(ScriptedModel::new([
            r#"{"ambiguous": false, "follow_up": null}"#,
            r#"{"company": "Apple, Inc.", "intent": "stock", "details": "price", "time_reference": ""}"#,
            // no evaluation, no verification: the script ends here
        ]));

        let financial_answer = RetrievalOutcome::Answer(Evidence::new(
            "As of March 5, 2025, Apple Inc. ($AAPL) trades at $150.00. (Source: Yahoo Finance).",
            vec!["https://finance.yahoo.com/quote/AAPL".to_string()],
            "Yahoo Finance",
        ));

        let orchestrator = orchestrator_with(
            model,
            static_handler("Wikipedia", wiki_answer("unused")),
            static_handler("Yahoo Finance", financial_answer),
        );

        let outcome = orchestrator
            .run("What is Apple's stock price?", &CannedClarifier("unused"))
            .await
            .unwrap();

        let PipelineOutcome::Answer(text) = outcome else {
            panic!("expected an answer");
        };
        assert!(text.contains("$AAPL"));
    }

    #[tokio::test]
    async fn test_not_tradable_surfaces_as_structured_outcome() {
        let model: Arc<dyn LanguageModel> = Arc::new(ScriptedModel::new([
            r#"{"ambiguous": false, "follow_up": null}"#,
            r#"{"company": "Local Pizza Shop", "intent": "stock", "details": "price", "time_reference": ""}"#,
        ]));

        let orchestrator = orchestrator_with(
            model,
            static_handler("Wikipedia", wiki_answer("unused")),
            static_handler(
                "Yahoo Finance",
                RetrievalOutcome::NotTradable {
                    message: "Not publicly traded".to_string(),
                },
            ),
        );

        let outcome = orchestrator
            .run("Local Pizza Shop stock price", &CannedClarifier("unused"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            PipelineOutcome::NotTradable("Not publicly traded".to_string())
        );
    }
}
