//! Financial retrieval handler
//!
//! Resolves a company name to a market ticker, fetches a fixed snapshot,
//! and composes a cited one-to-two sentence answer dated to the current
//! day. A company with no ticker is a business condition, not a fault.

use crate::error::PipelineError;
use crate::handlers::RetrievalHandler;
use crate::llm::LanguageModel;
use crate::models::{Evidence, QueryResolution, RetrievalOutcome, StockSnapshot};
use crate::sources::format_sources;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A ticker longer than this is the provider's explanation for why no
/// ticker exists (e.g. "Not publicly traded").
const MAX_TICKER_LEN: usize = 5;

const TICKER_LOOKUP_SYSTEM: &str = "You are an assistant that maps company names to their corresponding stock ticker symbols. \
ONLY respond with the stock ticker (e.g. 'Apple' -> 'AAPL'). \
If the company is not publicly traded, respond with a short explanation instead.";

/// Capability interface for the market-data backend.
#[async_trait]
pub trait FinanceData: Send + Sync {
    async fn snapshot(&self, ticker: &str) -> crate::Result<StockSnapshot>;
}

pub struct FinancialHandler {
    model: Arc<dyn LanguageModel>,
    finance: Arc<dyn FinanceData>,
}

impl FinancialHandler {
    pub fn new(model: Arc<dyn LanguageModel>, finance: Arc<dyn FinanceData>) -> Self {
        Self { model, finance }
    }

    /// LLM lookup of the ticker for a company name. The raw reply is
    /// returned; the caller decides whether it is a ticker at all.
    pub async fn resolve_ticker(&self, company_name: &str) -> crate::Result<String> {
        let user = format!("Company Name: {}\nWhat is the stock ticker?", company_name);
        let reply = self.model.complete(TICKER_LOOKUP_SYSTEM, &user).await?;
        Ok(reply.trim().trim_matches('$').to_string())
    }

    fn analysis_system() -> String {
        let today = Utc::now().format("%B %-d, %Y");
        format!(
            "You are a financial assistant that analyzes stock data and provides insights. \
Provide a succinct, 1-2 sentence summary, that ONLY directly answers the user question. \
Start your response 'As of {}', include the company's name and the ticker in parentheses \
(e.g., Tesla, Inc. ($TSLA) ...), avoid excessive details, and focus only on valuable information. \
End your response with (Source: Yahoo Finance).",
            today
        )
    }
}

#[async_trait]
impl RetrievalHandler for FinancialHandler {
    fn name(&self) -> &'static str {
        "Yahoo Finance"
    }

    async fn resolve_query(&self, query: &QueryResolution) -> crate::Result<RetrievalOutcome> {
        let ticker = self.resolve_ticker(&query.company).await?;

        if ticker.len() > MAX_TICKER_LEN {
            info!(company = %query.company, "No ticker resolved");
            return Ok(RetrievalOutcome::NotTradable { message: ticker });
        }

        debug!(company = %query.company, ticker = %ticker, "Fetching market snapshot");

        let snapshot = self.finance.snapshot(&ticker).await?;
        let data = serde_json::to_string(&snapshot)?;

        let user = format!(
            "Stock Symbol: {}\nCurrent Data: {}\nUser Question: {}",
            ticker, data, query.refined_text
        );

        let answer = self
            .model
            .complete(&Self::analysis_system(), &user)
            .await?;

        let formatted = format_sources(answer.trim(), Some(&ticker));
        let quote_url = format!("https://finance.yahoo.com/quote/{}", ticker);

        Ok(RetrievalOutcome::Answer(Evidence::new(
            formatted,
            vec![quote_url],
            self.name(),
        )))
    }
}

//
// ================= Yahoo quote client =================
//

pub struct YahooQuoteClient {
    client: reqwest::Client,
    base_url: String,
}

impl YahooQuoteClient {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .user_agent("Mozilla/5.0")
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: "https://query1.finance.yahoo.com/v7/finance/quote".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteBody,
}

#[derive(Debug, Deserialize)]
struct QuoteBody {
    #[serde(default)]
    result: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Quote {
    regular_market_price: Option<f64>,
    market_cap: Option<f64>,
    trailing_pe: Option<f64>,
    trailing_annual_dividend_yield: Option<f64>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
}

impl From<Quote> for StockSnapshot {
    fn from(quote: Quote) -> Self {
        StockSnapshot {
            price: quote.regular_market_price,
            market_cap: quote.market_cap,
            pe_ratio: quote.trailing_pe,
            dividend_yield: quote.trailing_annual_dividend_yield,
            week_52_high: quote.fifty_two_week_high,
            week_52_low: quote.fifty_two_week_low,
        }
    }
}

#[async_trait]
impl FinanceData for YahooQuoteClient {
    async fn snapshot(&self, ticker: &str) -> crate::Result<StockSnapshot> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("symbols", ticker)])
            .send()
            .await
            .map_err(|e| {
                PipelineError::RetrievalError(format!("Quote request failed for {}: {}", ticker, e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(PipelineError::RetrievalError(format!(
                "Quote endpoint returned {} for {}",
                status, ticker
            )));
        }

        let envelope: QuoteEnvelope = response.json().await.map_err(|e| {
            PipelineError::RetrievalError(format!("Invalid quote response: {}", e))
        })?;

        envelope
            .quote_response
            .result
            .into_iter()
            .next()
            .map(StockSnapshot::from)
            .ok_or_else(|| {
                PipelineError::RetrievalError(format!("No quote data for {}", ticker))
            })
    }
}
