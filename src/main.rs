//! spend-simple command-line client.
//!
//! Wires the sync core to the configured remote store and runs one command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};

use spend_simple::adapters::ai::{ExtractionSettings, OpenAIConfig};
use spend_simple::adapters::{
    InMemoryStore, LlmExpenseExtractor, OpenAIProvider, PostgresStore, StaticIdentity,
    UnconfiguredExtractor,
};
use spend_simple::application::{
    BudgetStore, ExpenseStream, GroupDirectory, QuickAdd, RetryPolicy, SyncError,
};
use spend_simple::config::AppConfig;
use spend_simple::domain::budget::{validate_amount, validate_budget_name, BudgetView};
use spend_simple::domain::extraction::ExtractionInput;
use spend_simple::domain::foundation::{BudgetId, Money};
use spend_simple::ports::{ExpenseExtractor, RemoteStore};
use spend_simple::telemetry;

#[derive(Parser)]
#[command(name = "spend-simple")]
#[command(author, version, about = "Shared group budgets, kept in sync")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List budgets with their totals (default)
    Budgets,

    /// Create a budget in the group you own
    AddBudget {
        name: String,
        /// Budget amount, e.g. 200 or 49.99
        amount: f64,
    },

    /// List one budget's expenses
    Expenses {
        /// Budget name or id
        budget: String,
    },

    /// Record an expense
    Add {
        /// Budget name or id
        budget: String,
        description: String,
        amount: f64,
        /// Spend date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Record expenses described in free text or shown on a receipt
    Quick {
        /// Text such as "spent 45 on groceries yesterday"
        text: Option<String>,
        /// Receipt image (jpg, png, webp, gif)
        #[arg(short, long)]
        receipt: Option<PathBuf>,
    },

    /// Watch a budget's expenses until interrupted
    Follow {
        /// Budget name or id
        budget: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    telemetry::init(&config.logging).context("Failed to install log subscriber")?;

    let command = cli.command.unwrap_or(Commands::Budgets);
    if config.store.database_url().is_some() {
        let store = PostgresStore::connect(&config.store)
            .await
            .map_err(|e| anyhow!("Failed to connect to the remote store: {e}"))?;
        run(Arc::new(store), &config, command).await
    } else {
        tracing::warn!("No database URL configured, using an empty in-memory store");
        run(Arc::new(InMemoryStore::new()), &config, command).await
    }
}

async fn run<S: RemoteStore + 'static>(
    store: Arc<S>,
    config: &AppConfig,
    command: Commands,
) -> Result<()> {
    let identity = Arc::new(StaticIdentity::new(config.identity.user()?));
    let retry = RetryPolicy::from_config(&config.sync);

    let directory = GroupDirectory::new(identity, store.clone(), retry);
    let budgets = Arc::new(BudgetStore::new(store.clone(), store.clone(), retry));
    let stream = Arc::new(
        ExpenseStream::new(store.clone(), store.clone())
            .with_budget_store(budgets.clone())
            .with_remote_updates(config.sync.merge_remote_updates),
    );

    let result = async {
        let groups = directory.resolve_groups().await.map_err(user_error)?;
        budgets.load(&groups).await.map_err(user_error)?;

        match command {
            Commands::Budgets => {
                let snapshot = budgets.snapshot();
                if snapshot.is_empty() {
                    println!("No budgets yet. Create one with `add-budget`.");
                }
                for view in snapshot.budgets() {
                    print_budget(view);
                }
            }
            Commands::AddBudget { name, amount } => {
                validate_budget_name(&name)?;
                let amount = parse_amount(amount)?;
                let budget = budgets.add_budget(name, amount).await.map_err(user_error)?;
                println!("Created {} ({}) with {}", budget.name, budget.id, budget.amount);
            }
            Commands::Expenses { budget } => {
                let view = find_budget(&budgets, &budget)?;
                print_budget(&view);
                for expense in view.expenses_for_display() {
                    println!(
                        "  {}  {:>10}  {}",
                        expense.expense_date, expense.amount, expense.description
                    );
                }
            }
            Commands::Add {
                budget,
                description,
                amount,
                date,
            } => {
                let view = find_budget(&budgets, &budget)?;
                let amount = parse_amount(amount)?;
                let date = date.unwrap_or_else(|| Local::now().date_naive());
                let expense = stream
                    .add_expense(description, amount, date, Some(view.id()))
                    .await
                    .map_err(user_error)?;
                let remaining = budgets
                    .budget(view.id())
                    .map(|v| v.remaining())
                    .unwrap_or_else(|| view.remaining());
                println!(
                    "{} for {} was added to {}, {} remaining",
                    expense.description,
                    expense.amount,
                    view.budget().name,
                    remaining
                );
            }
            Commands::Quick { text, receipt } => {
                let input = match (text, receipt) {
                    (_, Some(path)) => read_receipt(&path)?,
                    (Some(text), None) => ExtractionInput::Text(text),
                    (None, None) => bail!("Provide some text or --receipt <path>"),
                };
                let quick = QuickAdd::new(extractor(config)?, budgets.clone(), stream.clone());
                for outcome in quick.add(input).await.map_err(user_error)? {
                    println!("{}", outcome.message);
                }
            }
            Commands::Follow { budget } => {
                let view = find_budget(&budgets, &budget)?;
                follow(&stream, view).await?;
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    stream.close().await;
    budgets.shutdown();
    directory.shutdown();
    result
}

async fn follow(stream: &ExpenseStream, view: BudgetView) -> Result<()> {
    let mut changes = stream.changes();
    stream.open(view.id()).await.map_err(user_error)?;
    println!("Following {} (ctrl-c to stop)", view.budget().name);
    print_stream(stream, &view);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = stream.status();
                if let Some(error) = status.error {
                    bail!("Live updates stopped: {error}");
                }
                print_stream(stream, &view);
            }
        }
    }
    Ok(())
}

fn print_stream(stream: &ExpenseStream, view: &BudgetView) {
    let total = stream.total_expenses();
    println!(
        "-- {}: spent {} of {}, {} remaining",
        view.budget().name,
        total,
        view.budget().amount,
        view.budget().amount - total
    );
    for expense in stream.expenses() {
        let marker = if stream.is_pending(expense.id) { "*" } else { " " };
        println!(
            "{} {}  {:>10}  {}",
            marker, expense.expense_date, expense.amount, expense.description
        );
    }
}

fn print_budget(view: &BudgetView) {
    println!(
        "{:<24} spent {:>10} of {:>10}  remaining {:>10}  ({} expenses)",
        view.budget().name,
        view.total_expenses(),
        view.budget().amount,
        view.remaining(),
        view.expenses().len()
    );
}

/// Looks a budget up by id, then by case-insensitive name.
fn find_budget(budgets: &BudgetStore, key: &str) -> Result<BudgetView> {
    if let Ok(id) = key.parse::<BudgetId>() {
        if let Some(view) = budgets.budget(id) {
            return Ok(view);
        }
    }
    budgets
        .snapshot()
        .budgets()
        .iter()
        .find(|v| v.budget().name.eq_ignore_ascii_case(key))
        .cloned()
        .ok_or_else(|| anyhow!("No budget named {key}"))
}

fn parse_amount(value: f64) -> Result<Money> {
    let amount = Money::from_major(value).ok_or_else(|| anyhow!("{value} is not a valid amount"))?;
    validate_amount("amount", amount)?;
    Ok(amount)
}

fn read_receipt(path: &Path) -> Result<ExtractionInput> {
    let media_type = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => bail!("Unsupported receipt format: {}", path.display()),
    };
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read receipt {}", path.display()))?;
    Ok(ExtractionInput::Receipt {
        bytes,
        media_type: media_type.to_string(),
    })
}

fn extractor(config: &AppConfig) -> Result<Arc<dyn ExpenseExtractor>> {
    let Some(key) = config.extraction.api_key() else {
        tracing::warn!("No OpenAI key configured, quick add is unavailable");
        return Ok(Arc::new(UnconfiguredExtractor));
    };
    let provider = OpenAIProvider::new(
        OpenAIConfig::new(key)
            .with_model(config.extraction.model.clone())
            .with_timeout(config.extraction.timeout()),
    )?;
    let settings = ExtractionSettings {
        max_tokens: config.extraction.max_tokens,
        temperature: config.extraction.temperature,
    };
    Ok(Arc::new(LlmExpenseExtractor::new(Arc::new(provider), settings)))
}

fn user_error(err: SyncError) -> anyhow::Error {
    tracing::debug!(error = %err, "Command failed");
    anyhow!(err.user_message())
}
