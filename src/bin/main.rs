use finance_ledger_agent::{
    agent::FinanceAgent,
    budget::BudgetStore,
    config::{AppConfig, StorageConfig},
    export::export_csv,
    insights::generate_insights,
    llm::OpenRouterClient,
    memory::MemoryStore,
    models::Budget,
    pipeline::TransactionPipeline,
    session::Session,
    source::PlaidSource,
    store::{FileStore, KeyValueStore, PostgresStore},
    tools::{FinancialContextTool, ToolRegistry},
    LedgerError,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: ledger-agent <command>

commands:
  link-token [user_id]   create a Plaid Link token to start linking an account
  link <public_token>    exchange a Plaid public token and link the account
  transactions           print the processed transactions of the last 30 days
  insights               print budget alerts and the top spending category
  export-csv             print the processed transactions as CSV
  budget                 print the stored budget
  set-budget <json>      replace the budget, e.g. '{\"overall_limit\": 2000}'
  ask <question...>      ask the finance assistant
  clear-cache            drop the cached transactions";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let config = AppConfig::from_env()?;

    let store: Arc<dyn KeyValueStore> = match &config.storage {
        StorageConfig::Directory(dir) => {
            info!(dir = %dir.display(), "Using file store");
            Arc::new(FileStore::open(dir.clone()).await?)
        }
        StorageConfig::Postgres(url) => {
            info!("Using Postgres store");
            Arc::new(PostgresStore::connect_lazy(url)?)
        }
    };

    let session = Arc::new(match &config.access_token {
        Some(token) => Session::with_access_token(store.clone(), token.clone()),
        None => Session::restore(store.clone()).await?,
    });
    let budgets = Arc::new(BudgetStore::new(store.clone()));

    match command.as_str() {
        "link" => {
            let public_token = args.get(1).ok_or("link needs a public token")?;
            let plaid = PlaidSource::new(plaid_config(&config)?)?;
            let (access_token, item_id) = plaid.exchange_public_token(public_token).await?;
            session.link_account(access_token).await?;
            println!("Linked item {}", item_id);
        }
        "link-token" => {
            let client_user_id = args.get(1).map(String::as_str).unwrap_or("ledger-agent-user");
            let plaid = PlaidSource::new(plaid_config(&config)?)?;
            println!("{}", plaid.create_link_token(client_user_id).await?);
        }
        "transactions" => {
            let pipeline = build_pipeline(&config)?;
            let snapshot = pipeline.get_processed_transactions(&session).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        "insights" => {
            let pipeline = build_pipeline(&config)?;
            let snapshot = pipeline.get_processed_transactions(&session).await?;
            let insights = generate_insights(&budgets.get().await?, &snapshot);
            if insights.is_empty() {
                println!("No insights for the last 30 days");
            }
            for insight in &insights {
                println!("{}", insight);
            }
        }
        "export-csv" => {
            let pipeline = build_pipeline(&config)?;
            let snapshot = pipeline.get_processed_transactions(&session).await?;
            print!("{}", export_csv(&snapshot)?);
        }
        "budget" => {
            println!("{}", serde_json::to_string_pretty(&budgets.get().await?)?);
        }
        "set-budget" => {
            let raw = args.get(1).ok_or("set-budget needs a JSON document")?;
            let budget: Budget = serde_json::from_str(raw)?;
            match budgets.set(budget).await {
                Ok(()) => println!("Budget saved"),
                Err(LedgerError::BudgetValidation(errors)) => {
                    for e in &errors {
                        eprintln!("{}", e);
                    }
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        "ask" => {
            let question = args[1..].join(" ");
            if question.trim().is_empty() {
                return Err("ask needs a question".into());
            }

            let pipeline = Arc::new(build_pipeline(&config)?);
            let model = Arc::new(OpenRouterClient::new(&config.llm)?);

            let mut tools = ToolRegistry::new();
            tools.register(Arc::new(FinancialContextTool::new(
                session.clone(),
                pipeline,
                budgets.clone(),
            )));

            let agent = FinanceAgent::new(
                model,
                tools,
                MemoryStore::new(store.clone()),
                config.llm.pricing,
            );

            let reply = agent.ask(&question).await;
            println!("{}", reply.answer);
            if let Some(cost) = reply.cost {
                println!(
                    "\n[{} tokens ({} prompt, {} completion), {}]",
                    cost.total_tokens, cost.prompt_tokens, cost.completion_tokens, cost.total_cost
                );
            }
        }
        "clear-cache" => {
            session.clear_cache().await?;
            println!("Transaction cache cleared");
        }
        other => {
            eprintln!("unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

fn plaid_config(config: &AppConfig) -> Result<&finance_ledger_agent::config::PlaidConfig, LedgerError> {
    config
        .plaid
        .as_ref()
        .ok_or_else(|| LedgerError::Config("PLAID_CLIENT_ID and PLAID_SECRET must be set".to_string()))
}

fn build_pipeline(config: &AppConfig) -> Result<TransactionPipeline, LedgerError> {
    let source = Arc::new(PlaidSource::new(plaid_config(config)?)?);
    let model = Arc::new(OpenRouterClient::new(&config.llm)?);
    Ok(TransactionPipeline::new(source, model))
}
