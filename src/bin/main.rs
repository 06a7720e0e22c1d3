use company_query_orchestrator::{
    config::AgentConfig,
    disambiguator::{Clarifier, QueryDisambiguator},
    evaluator::SufficiencyEvaluator,
    handlers::{
        create_default_registry, EncyclopedicHandler, FinancialHandler, ToolSelectingHandler,
        WikipediaClient, YahooQuoteClient,
    },
    llm::OpenAiClient,
    pipeline::Orchestrator,
    search::{SerperClient, TavilyClient},
    verification::VerificationSearchHandler,
    PipelineOutcome,
};
use async_trait::async_trait;
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const WELCOME: &str = "
Welcome! I am an AI assistant that will help you with your company-related queries.
I can provide information about a company you want, including:
 \u{2022} General information (e.g. location, history, products, investment portfolio)
 \u{2022} Financial information (e.g. stocks, market performance, projections)
 \u{2022} Recent news and updates

After I answer your question, I will cite my sources as hyperlinks so that you can check for more details.
 \u{2022} On Mac: Press \u{1b}[1mCommand (\u{2318}) + Click\u{1b}[0m on a link to open it in your browser.
 \u{2022} On Windows (PowerShell, Windows Terminal): Press \u{1b}[1mCtrl + Click\u{1b}[0m to access the source directly.
 \u{2022} On Windows Command Prompt (cmd.exe): Hyperlinks are not supported, so please \u{1b}[1mcopy and paste\u{1b}[0m the link into your browser.

Start by asking me a question about a company, and I'll do my best to help you out!
";

/// Reads clarifications from the terminal.
struct StdinClarifier;

#[async_trait]
impl Clarifier for StdinClarifier {
    async fn clarify(&self, follow_up: &str) -> company_query_orchestrator::Result<String> {
        println!("\n >> Hmm, I need some clarification. {}", follow_up);
        prompt(" >> Your clarification: ")
    }
}

fn prompt(label: &str) -> company_query_orchestrator::Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn build_orchestrator(config: &AgentConfig) -> Orchestrator {
    let model = Arc::new(OpenAiClient::new(
        config.openai_api_key.clone(),
        config.model.clone(),
        config.request_timeout,
    ));

    let tavily = Arc::new(TavilyClient::new(
        config.tavily_api_key.clone(),
        config.request_timeout,
    ));
    let serper = Arc::new(SerperClient::new(
        config.serper_api_key.clone(),
        config.request_timeout,
    ));
    let wikipedia = Arc::new(WikipediaClient::new(config.request_timeout));
    let quotes = Arc::new(YahooQuoteClient::new(config.request_timeout));

    let (registry, fallback) =
        create_default_registry(wikipedia.clone(), serper.clone(), tavily.clone());

    Orchestrator::new(
        QueryDisambiguator::new(model.clone()),
        SufficiencyEvaluator::new(model.clone()),
        VerificationSearchHandler::new(model.clone(), tavily, serper),
        Arc::new(FinancialHandler::new(model.clone(), quotes)),
        Arc::new(EncyclopedicHandler::new(model.clone(), wikipedia)),
        Arc::new(ToolSelectingHandler::new(model, registry, fallback)),
    )
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if !io::stdin().is_terminal() {
        println!("\n >> Hey there! This program requires user input. You should run it in an interactive terminal.\n");
        std::process::exit(1);
    }

    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(" >> Missing configuration: {}", e);
            std::process::exit(1);
        }
    };

    let orchestrator = build_orchestrator(&config);
    let clarifier = StdinClarifier;

    println!("{}", WELCOME);
    info!("Company query orchestrator started");

    loop {
        let input = match prompt(" >> So, what would you like to look up today?  ") {
            Ok(input) if !input.is_empty() => input,
            Ok(_) => continue,
            Err(e) => {
                error!("Failed to read input: {}", e);
                std::process::exit(1);
            }
        };

        match orchestrator.run(&input, &clarifier).await {
            Ok(PipelineOutcome::Answer(answer)) => {
                println!("\n{}\n", answer);
                break;
            }
            Ok(PipelineOutcome::NotTradable(message)) => {
                println!("\n >> It looks like {}", message);
                match prompt(" >> Would you like to search something else? (y/n)  ") {
                    Ok(reply) if matches!(reply.to_lowercase().as_str(), "y" | "yes") => continue,
                    _ => {
                        println!("\n >> Understood. Have a great day!\n");
                        break;
                    }
                }
            }
            Ok(PipelineOutcome::Unanswerable(message)) => {
                println!("\n >> {}\n", message);
                break;
            }
            Err(e) => {
                // Internal faults never reach the user raw.
                error!("Pipeline failed: {}", e);
                println!("\n >> Sorry, something went wrong on my end. Please try again in a moment.\n");
                break;
            }
        }
    }
}
