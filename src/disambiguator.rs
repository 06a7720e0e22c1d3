//! Query disambiguation and refinement
//!
//! Detects ambiguity in a raw question, collects at most one clarification,
//! extracts structured intent, and compiles the question into an
//! intent-tagged search query.

use crate::error::PipelineError;
use crate::llm::{strip_code_fence, LanguageModel};
use crate::models::{AmbiguityCheck, Intent, QueryResolution, StructuredQuery};
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Relative time expressions resolved to the current calendar year.
const RELATIVE_TIME_WORDS: &[&str] = &["recently", "latest", "current", "today", "this year"];

/// Follow-up relayed to the user when the whole pipeline retries after a
/// failed verification round.
pub const RETRY_FOLLOW_UP: &str =
    "Hmm, your query didn't yield any search results. Could you provide more information?";

const DETECT_AMBIGUITY_SYSTEM: &str = "You are an assistant whose sole task is to determine whether a company-related query is ambiguous. Follow these steps strictly: \
1. Identify the company name mentioned in the query. \
2. Check if this company name could refer to more than one business entity. If so, it is ambiguous. Example: 'Midas' could refer to 'Midas Investments' or 'Midas Automotive Service'. Well-known global corporations (e.g. Apple, Tesla, Google) are never ambiguous by name alone. \
3. Determine if the query is vague about what aspect of the company is being asked (e.g., location, business model, history, etc.). \
4. If any of these conditions are met, the query is ambiguous. Otherwise, it is not. \
If ambiguous, output exactly in JSON format: \
{\"ambiguous\": true, \"follow_up\": \"Clarification question\"}. \
If not ambiguous, output exactly: \
{\"ambiguous\": false, \"follow_up\": null}";

const CLARIFY_SYSTEM: &str = "You are an assistant that refines a user query based on clarification input. \
Ensure that the refined query is clear, precise, and correctly structured.";

const EXTRACT_SYSTEM: &str = "You are an assistant that extracts structured information from user queries about companies. Follow these instructions: \
1. Identify the full company name (e.g., 'Sequoia' -> 'Sequoia Capital', 'Apple' -> 'Apple, Inc.'). \
2. Determine the user's intent from this list: general information, location, business model, investments, stock, news, products, history. \
3. If a specific time, year, or relative time expression (e.g., 'recently', 'latest', 'current') is mentioned, extract it in the 'time_reference' field; otherwise, leave it blank. \
4. For the 'details' field, extract any REMAINING modifier that refines or specifies the main intent (e.g., 'price' in 'stock price', 'headquarters' in 'headquarters location'). Do not repeat the company name or generic phrases. \
Output your answer strictly in JSON format as: \
{\"company\": \"<company>\", \"intent\": \"<intent>\", \"details\": \"<details>\", \"time_reference\": \"<time_reference>\"}";

/// How the pipeline obtains one clarification from the caller. The
/// pipeline cannot proceed until this resolves.
#[async_trait]
pub trait Clarifier: Send + Sync {
    async fn clarify(&self, follow_up: &str) -> crate::Result<String>;
}

pub struct QueryDisambiguator {
    model: Arc<dyn LanguageModel>,
}

impl QueryDisambiguator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Detect whether the query needs clarification before retrieval.
    /// Malformed model output degrades to "not ambiguous".
    pub async fn detect_ambiguity(&self, user_input: &str) -> crate::Result<AmbiguityCheck> {
        let user = format!("Query: {}", user_input);
        let response = self.model.complete(DETECT_AMBIGUITY_SYSTEM, &user).await?;

        match serde_json::from_str::<AmbiguityCheck>(strip_code_fence(&response)) {
            Ok(check) => Ok(check),
            Err(e) => {
                warn!(error = %e, "Ambiguity detection did not return valid JSON, assuming unambiguous");
                Ok(AmbiguityCheck::unambiguous())
            }
        }
    }

    /// Fold the user's clarification back into the original query.
    pub async fn clarify_query(
        &self,
        original_query: &str,
        clarification: &str,
    ) -> crate::Result<String> {
        let user = format!(
            "Original Query: {}\nClarification: {}\nRefined Query:",
            original_query, clarification
        );
        self.model.complete(CLARIFY_SYSTEM, &user).await
    }

    /// Extract company, intent, details, and time reference. A response
    /// that fails to parse as a well-formed record becomes the Unknown
    /// sentinel so the pipeline continues.
    pub async fn extract_structured(&self, user_query: &str) -> crate::Result<StructuredQuery> {
        let user = format!("Query: {}", user_query);
        let response = self.model.complete(EXTRACT_SYSTEM, &user).await?;
        let cleaned = strip_code_fence(&response).replace('\n', "");

        match serde_json::from_str::<StructuredQuery>(cleaned.trim()) {
            Ok(structured) => Ok(structured),
            Err(e) => {
                warn!(error = %e, "Extraction did not return a well-formed record, using sentinel");
                Ok(StructuredQuery::unknown())
            }
        }
    }

    /// Resolve the raw query end to end: one optional clarification
    /// round-trip, structured extraction, and template compilation.
    pub async fn resolve(
        &self,
        user_input: &str,
        clarifier: &dyn Clarifier,
    ) -> crate::Result<QueryResolution> {
        let check = self.detect_ambiguity(user_input).await?;

        let (refined_input, clarification_answer) = if check.ambiguous {
            let follow_up = check
                .follow_up
                .clone()
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| "Could you clarify?".to_string());

            let answer = clarifier.clarify(&follow_up).await?;
            if answer.trim().is_empty() {
                return Err(PipelineError::DisambiguationError(
                    "empty clarification".to_string(),
                ));
            }

            let refined = self.clarify_query(user_input, &answer).await?;
            (refined, Some(answer))
        } else {
            (user_input.to_string(), None)
        };

        let structured = self.extract_structured(&refined_input).await?;
        let (intent, details, time_reference) = normalized_parts(&structured);
        let refined_text = compile_query(&structured, false);

        debug!(
            company = %structured.company,
            intent = %intent,
            refined = %refined_text,
            "Query resolved"
        );

        Ok(QueryResolution {
            session_id: Uuid::new_v4(),
            raw_text: user_input.to_string(),
            refined_text,
            company: structured.company,
            intent,
            detail_modifier: details,
            time_reference,
            is_ambiguous: check.ambiguous,
            clarification_answer,
        })
    }

    /// Retry resolution after a failed verification round: collect a fresh
    /// clarification and compile in raw concatenation mode (no templates).
    pub async fn resolve_retry(
        &self,
        previous: &QueryResolution,
        clarifier: &dyn Clarifier,
    ) -> crate::Result<QueryResolution> {
        let answer = clarifier.clarify(RETRY_FOLLOW_UP).await?;
        let refined = self.clarify_query(&previous.refined_text, &answer).await?;
        let structured = self.extract_structured(&refined).await?;
        let (intent, details, time_reference) = normalized_parts(&structured);
        let refined_text = compile_query(&structured, true);

        debug!(refined = %refined_text, "Retry query compiled");

        Ok(QueryResolution {
            session_id: previous.session_id,
            raw_text: previous.raw_text.clone(),
            refined_text,
            company: structured.company,
            intent,
            detail_modifier: details,
            time_reference,
            is_ambiguous: previous.is_ambiguous,
            clarification_answer: Some(answer),
        })
    }
}

/// Compile the structured record into the final search query.
///
/// Each known intent uses a fixed template; unknown intents fall back to
/// plain concatenation. Retry mode bypasses templates entirely. The result
/// always has whitespace collapsed to single spaces and trimmed.
pub fn compile_query(structured: &StructuredQuery, retry: bool) -> String {
    if retry {
        return collapse(&format!(
            "{} {} {}",
            structured.company, structured.details, structured.time_reference
        ));
    }

    let (intent, details, time_reference) = normalized_parts(structured);
    let company = structured.company.trim();

    let query = match intent {
        Intent::GeneralInformation => format!("{} history and products overview", company),
        Intent::Location => {
            if details.is_empty() {
                format!("{} headquarters location", company)
            } else {
                format!("{} {} location", company, details)
            }
        }
        Intent::BusinessModel => format!("{} revenue model", company),
        Intent::Investments => format!("{} investment portfolio {}", company, time_reference),
        Intent::Stock => format!("{} stock {}", company, details),
        Intent::News => format!("Latest news on {} {}", company, time_reference),
        Intent::Products => format!("{} product lineup {}", company, time_reference),
        Intent::History => format!("{} history overview {}", company, time_reference),
        Intent::Unknown => format!("{} {} {}", company, details, time_reference),
    };

    collapse(&query)
}

/// Parse the intent, strip the intent word out of the details, and resolve
/// relative time references to the current year.
fn normalized_parts(structured: &StructuredQuery) -> (Intent, String, String) {
    let intent = Intent::parse(&structured.intent);
    let details = strip_whole_word(&structured.details, structured.intent.trim());
    let time_reference = resolve_time_reference(&structured.time_reference);
    (intent, details, time_reference)
}

/// Remove every whole-word occurrence of `word` from `text` so the intent
/// is not repeated in the constructed query.
fn strip_whole_word(text: &str, word: &str) -> String {
    if word.is_empty() {
        return text.trim().to_string();
    }

    let pattern = format!(r"(?i)\b{}\b", regex::escape(word));
    match Regex::new(&pattern) {
        Ok(re) => collapse(&re.replace_all(text, "")),
        Err(_) => text.trim().to_string(),
    }
}

/// Relative time expressions become the literal current calendar year;
/// explicit references pass through unchanged.
fn resolve_time_reference(time_reference: &str) -> String {
    let lowered = time_reference.to_lowercase();
    if !lowered.is_empty()
        && RELATIVE_TIME_WORDS
            .iter()
            .any(|word| lowered.contains(word))
    {
        return Utc::now().year().to_string();
    }
    time_reference.trim().to_string()
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
