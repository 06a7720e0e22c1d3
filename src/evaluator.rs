//! Sufficiency evaluation
//!
//! Classifies whether a candidate answer adequately and relevantly answers
//! the question. Output is constrained to three tokens; anything else is
//! treated as "needs more evidence".

use crate::llm::LanguageModel;
use crate::models::Sufficiency;
use std::sync::Arc;
use tracing::debug;

const EVALUATION_SYSTEM: &str = "You are an evaluation assistant that determines whether a retrieved response completely and accurately answers the user's question. \
Evaluation Criteria: \
1. Relevance: Does the information directly address the user's specific question (e.g., user question: 'Apple stock price' --> response includes 'Apple', 'stock' and its price in $)? \
2. Completeness: Is the answer detailed enough to answer the user query? \
Decision Rules: \
- If the retrieved response is relevant for and adequately answers the user question, return 'sufficient'. \
- If the retrieved response is not relevant to the user question, return 'irrelevant'. \
- If the retrieved response is not complete or enough to answer the user question, return 'incomplete'. \
ONLY return 'sufficient', 'irrelevant', 'incomplete'.";

pub struct SufficiencyEvaluator {
    model: Arc<dyn LanguageModel>,
}

impl SufficiencyEvaluator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Evaluate a candidate answer against the question. Always yields one
    /// of the three verdicts; unexpected model output coerces to
    /// `Incomplete`.
    pub async fn evaluate(
        &self,
        user_query: &str,
        retrieved_response: &str,
    ) -> crate::Result<Sufficiency> {
        let user = format!(
            "User Question: {}\nRetrieved Response: {}",
            user_query, retrieved_response
        );

        let raw = self.model.complete(EVALUATION_SYSTEM, &user).await?;
        let verdict = Sufficiency::parse(&raw);

        debug!(verdict = %verdict, "Response evaluated");

        Ok(verdict)
    }
}
