//! Core data models for the query pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//
// ================= Intent =================
//

/// What aspect of a company the user is asking about.
///
/// Every intent except `Unknown` maps to exactly one deterministic
/// query-construction template in the disambiguator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    GeneralInformation,
    Location,
    BusinessModel,
    Investments,
    Stock,
    News,
    Products,
    History,
    Unknown,
}

impl Intent {
    /// Parse the label emitted by the extraction prompt. Anything
    /// unrecognized becomes `Unknown` rather than an error.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "general information" => Intent::GeneralInformation,
            "location" => Intent::Location,
            "business model" => Intent::BusinessModel,
            "investments" => Intent::Investments,
            "stock" => Intent::Stock,
            "news" => Intent::News,
            "products" => Intent::Products,
            "history" => Intent::History,
            _ => Intent::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::GeneralInformation => "general information",
            Intent::Location => "location",
            Intent::BusinessModel => "business model",
            Intent::Investments => "investments",
            Intent::Stock => "stock",
            Intent::News => "news",
            Intent::Products => "products",
            Intent::History => "history",
            Intent::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//
// ================= Query =================
//

/// Raw fields extracted from a user query by the LLM.
///
/// `details` carries any remaining modifier that refines the intent
/// (e.g. "price" in "stock price").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredQuery {
    pub company: String,
    pub intent: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub time_reference: String,
}

impl StructuredQuery {
    /// Sentinel substituted when extraction output fails to parse.
    pub fn unknown() -> Self {
        Self {
            company: "Unknown".to_string(),
            intent: "Unknown".to_string(),
            details: String::new(),
            time_reference: String::new(),
        }
    }
}

/// The resolution record for one interactive session. Created once per
/// session and mutated only by the disambiguator.
#[derive(Debug, Clone)]
pub struct QueryResolution {
    pub session_id: Uuid,
    pub raw_text: String,
    pub refined_text: String,
    pub company: String,
    pub intent: Intent,
    pub detail_modifier: String,
    pub time_reference: String,
    pub is_ambiguous: bool,
    pub clarification_answer: Option<String>,
}

/// Ambiguity detection output. `follow_up` is the clarification question
/// to relay to the user when `ambiguous` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AmbiguityCheck {
    pub ambiguous: bool,
    #[serde(default)]
    pub follow_up: Option<String>,
}

impl AmbiguityCheck {
    pub fn unambiguous() -> Self {
        Self {
            ambiguous: false,
            follow_up: None,
        }
    }
}

//
// ================= Evidence =================
//

/// The result of one retrieval call: answer text plus ordered source URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub text: String,
    pub sources: Vec<String>,
    pub origin: String,
}

impl Evidence {
    pub fn new(text: impl Into<String>, sources: Vec<String>, origin: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sources,
            origin: origin.into(),
        }
    }

    /// Merge several evidence values: text concatenated in order, sources
    /// unioned with duplicates removed (first-seen order wins).
    pub fn merge(pieces: Vec<Evidence>, origin: impl Into<String>) -> Evidence {
        let mut text_parts = Vec::with_capacity(pieces.len());
        let mut sources = Vec::new();

        for piece in pieces {
            if !piece.text.is_empty() {
                text_parts.push(piece.text);
            }
            for url in piece.sources {
                if !sources.contains(&url) {
                    sources.push(url);
                }
            }
        }

        Evidence {
            text: text_parts.join(" "),
            sources,
            origin: origin.into(),
        }
    }
}

//
// ================= Verdicts =================
//

/// Whether a candidate answer adequately answers the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sufficiency {
    Sufficient,
    Irrelevant,
    Incomplete,
}

impl Sufficiency {
    /// Coerce evaluator output to the three-token enum. Anything outside it
    /// defaults to `Incomplete` so the pipeline gathers more evidence
    /// instead of failing.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "sufficient" => Sufficiency::Sufficient,
            "irrelevant" => Sufficiency::Irrelevant,
            "incomplete" => Sufficiency::Incomplete,
            _ => Sufficiency::Incomplete,
        }
    }
}

impl fmt::Display for Sufficiency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sufficiency::Sufficient => "sufficient",
            Sufficiency::Irrelevant => "irrelevant",
            Sufficiency::Incomplete => "incomplete",
        };
        write!(f, "{}", s)
    }
}

/// Whether an auxiliary answer held up against the web searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid,
}

impl Validity {
    /// Only an exact "valid" counts; everything else is `Invalid`.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("valid") {
            Validity::Valid
        } else {
            Validity::Invalid
        }
    }
}

//
// ================= Financial =================
//

/// Fixed market snapshot for one ticker. Any field may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    #[serde(rename = "52_week_high")]
    pub week_52_high: Option<f64>,
    #[serde(rename = "52_week_low")]
    pub week_52_low: Option<f64>,
}

//
// ================= Outcomes =================
//

/// What a retrieval handler produced for a query.
#[derive(Debug, Clone)]
pub enum RetrievalOutcome {
    /// A candidate answer with its running source.
    Answer(Evidence),
    /// Business condition, not a fault: the company has no market ticker.
    /// Carries the provider's explanation (e.g. "Not publicly traded").
    NotTradable { message: String },
}

/// Final result of one pipeline run, as seen by the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Answer(String),
    /// The caller should offer to start over with a different query.
    NotTradable(String),
    /// Verification failed twice; no reliable answer exists.
    Unanswerable(String),
}
