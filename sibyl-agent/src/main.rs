//! Interactive command line for the Sibyl query agent.

use std::io::{self, Write};
use std::sync::Arc;

use tracing::warn;

use sibyl_agent::context::AgentContext;
use sibyl_agent::orchestrator::AgentOrchestrator;
use sibyl_agent::providers::completion::OpenAiCompatibleClient;
use sibyl_agent::providers::embedding::{EmbeddingService, HttpEmbeddingClient};
use sibyl_agent::providers::memory::{HttpMemoryProvider, MemoryProvider, NullMemoryProvider};
use sibyl_agent::session::SessionStore;
use sibyl_agent::web::search::SearchProvider;
use sibyl_agent::web::search::neural::NeuralSearchClient;
use sibyl_agent::AgentError;
use sibyl_core::Config;
use sibyl_store::{BackendConnector, EntityStore, HttpConnector, MemoryConnector};

const DEFAULT_NAMESPACE: &str = "general";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();

    sibyl_core::load_dotenv();
    let config = Config::load()?;
    let settings = config.settings.clone();
    let snapshot_path = settings.snapshot_path()?;

    // Without configured namespaces the store runs embedded, which still
    // exercises the full agent path.
    let connector: Arc<dyn BackendConnector> = if settings.namespaces.is_empty() {
        warn!("no namespaces configured, using the embedded in-memory store");
        Arc::new(MemoryConnector::new())
    } else {
        Arc::new(HttpConnector::new(settings.clone()))
    };
    let store = Arc::new(EntityStore::new(
        settings.store.clone(),
        settings.scoring.clone(),
        settings.graph.clone(),
        connector,
    ));

    let embeddings = EmbeddingService::new(
        Box::new(HttpEmbeddingClient::new(&settings.providers.embedding)),
        &settings.providers.embedding,
        &settings.cache,
    );
    let completion = Arc::new(OpenAiCompatibleClient::new(
        &settings.providers.completion,
        config.completion_api_key(),
    ));
    let search: Option<Arc<dyn SearchProvider>> =
        match NeuralSearchClient::new(&settings.providers.search, config.search_api_key()) {
            Ok(client) => Some(Arc::new(client)),
            Err(err) => {
                warn!("web search disabled: {err}");
                None
            }
        };
    let memory: Arc<dyn MemoryProvider> = if settings.providers.memory.enabled {
        Arc::new(HttpMemoryProvider::new(
            &settings.providers.memory,
            config.memory_api_key(),
        ))
    } else {
        Arc::new(NullMemoryProvider)
    };
    let sessions = SessionStore::load(snapshot_path);

    let ctx = Arc::new(AgentContext::new(
        settings, store, embeddings, completion, search, memory, sessions,
    ));
    let orchestrator = AgentOrchestrator::new(ctx);

    let user_id = std::env::var("USER").unwrap_or_else(|_| "local".to_string());
    let mut namespace = DEFAULT_NAMESPACE.to_string();
    println!("sibyl ready (namespace: {namespace}). Type a question, :ns <name> to switch, :quit to exit.");

    let stdin = io::stdin();
    loop {
        print!("sibyl> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == ":quit" || line == ":exit" {
            break;
        }
        if let Some(ns) = line.strip_prefix(":ns ") {
            namespace = ns.trim().to_string();
            println!("namespace set to {namespace}");
            continue;
        }

        match orchestrator.answer(&user_id, &namespace, line).await {
            Ok(reply) => {
                println!("{}", reply.answer);
                println!(
                    "  [source: {}, cached: {}, confidence: {:.2}]",
                    reply.source.tag(),
                    reply.cached,
                    reply.confidence
                );
                for question in &reply.follow_up_questions {
                    println!("  follow-up: {question}");
                }
            }
            Err(AgentError::Validation(message)) => println!("invalid input: {message}"),
            Err(AgentError::RateLimited(wait)) => {
                println!("rate limited, try again in {}s", wait.as_secs().max(1))
            }
            Err(err) => println!("error: {err}"),
        }
    }

    Ok(())
}
