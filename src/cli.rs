use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;

use crate::ai_provider::AIProviderClient;
use crate::cards::CardDeck;
use crate::config::Config;
use crate::history::DrawHistory;
use crate::ledger::{self, CooldownState};
use crate::messenger::ConsoleMessenger;
use crate::spread::SpreadWorkflow;
use crate::store::UserStore;
use crate::subscription::{BotAction, SubscriptionGate};

#[derive(Parser)]
#[command(name = "arcana")]
#[command(about = "Tarot draw bot with a diamond economy and referral rewards")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive reading session
    Shell {
        #[arg(long, default_value = "local")]
        user_id: String,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
        /// Referral token carried by the first contact
        #[arg(long)]
        referrer: Option<String>,
    },
    /// Draw the card of the day
    Card {
        #[arg(long, default_value = "local")]
        user_id: String,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
    /// Three-card spread over a question
    Spread {
        question: String,
        #[arg(long, default_value = "local")]
        user_id: String,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
    /// Clarifying question about the latest daily card
    Clarify {
        question: String,
        #[arg(long, default_value = "local")]
        user_id: String,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
    /// Claim the daily gift
    Gift {
        #[arg(long, default_value = "local")]
        user_id: String,
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Account balance, cooldowns and draw totals
    Status {
        #[arg(long, default_value = "local")]
        user_id: String,
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

type ConsoleWorkflow = SpreadWorkflow<ConsoleMessenger, AIProviderClient, CardDeck>;

fn build_workflow(
    data_dir: Option<PathBuf>,
    provider: Option<String>,
    model: Option<String>,
) -> Result<ConsoleWorkflow> {
    let config = Config::new(data_dir)?;
    let generator = AIProviderClient::new(config.get_ai_config(provider, model)?);
    let cards = CardDeck::new(config.cards_dir());
    let store = UserStore::open(&config);
    SpreadWorkflow::new(config, store, cards, generator, ConsoleMessenger)
}

async fn gated(workflow: &ConsoleWorkflow, user_id: &str, action: BotAction) -> Result<bool> {
    let gate = SubscriptionGate::new(workflow.config());
    gate.check_action(workflow.store(), workflow.messenger(), user_id, action)
        .await
}

pub async fn handle_card(
    user_id: String,
    data_dir: Option<PathBuf>,
    provider: Option<String>,
    model: Option<String>,
) -> Result<()> {
    let workflow = build_workflow(data_dir, provider, model)?;
    if gated(&workflow, &user_id, BotAction::DailyCard).await? {
        workflow.daily_card(&user_id).await?;
    }
    Ok(())
}

pub async fn handle_spread(
    question: String,
    user_id: String,
    data_dir: Option<PathBuf>,
    provider: Option<String>,
    model: Option<String>,
) -> Result<()> {
    let workflow = build_workflow(data_dir, provider, model)?;
    if gated(&workflow, &user_id, BotAction::ThreeCardSpread).await? {
        workflow.three_card_spread(&user_id, &question).await?;
    }
    Ok(())
}

pub async fn handle_clarify(
    question: String,
    user_id: String,
    data_dir: Option<PathBuf>,
    provider: Option<String>,
    model: Option<String>,
) -> Result<()> {
    let workflow = build_workflow(data_dir, provider, model)?;
    if gated(&workflow, &user_id, BotAction::Clarify).await? {
        workflow.clarify(&user_id, &question).await?;
    }
    Ok(())
}

pub async fn handle_gift(user_id: String, data_dir: Option<PathBuf>) -> Result<()> {
    let workflow = build_workflow(data_dir, None, None)?;
    if gated(&workflow, &user_id, BotAction::DailyGift).await? {
        workflow.daily_gift(&user_id).await?;
    }
    Ok(())
}

pub async fn handle_status(user_id: String, data_dir: Option<PathBuf>) -> Result<()> {
    let config = Config::new(data_dir)?;
    let store = UserStore::open(&config);
    let account = store.get_or_init(&user_id)?;

    println!("{}", "arcana status".cyan().bold());
    println!("User: {}", user_id.cyan());
    println!("Diamonds: {}", account.diamonds.to_string().yellow());
    println!("Draws taken: {}", account.daily_spread_count);
    println!("Friends invited: {}", account.invited_count);

    if let Some(referred_by) = &account.referred_by {
        println!("Invited by: {}", referred_by.dimmed());
    }

    if let Some(card) = &account.last_daily_card {
        println!("Card of the day: {}", card.replace('_', " ").cyan());
    }

    if let Some(status) = account.subscription_status {
        println!("Subscription: {}", status);
    }

    let now = chrono::Utc::now();
    match ledger::check_cooldown(account.last_daily_gift_at, config.gift_cooldown(), now) {
        CooldownState::Ready => println!("Daily gift: {}", "ready".green()),
        CooldownState::Blocked { remaining } => {
            println!("Daily gift: in {}", ledger::format_remaining(remaining).yellow())
        }
    }

    let history = DrawHistory::new(&config)?;
    let stats = history.stats();
    println!(
        "\n{}",
        "Bot totals".cyan().bold()
    );
    println!(
        "Draws: {} total | {} today | {:.0}% fallback",
        stats.total_draws,
        stats.today_draws,
        stats.fallback_rate * 100.0
    );

    for record in history.recent(5) {
        println!(
            "  {} {} {} {}",
            record.timestamp.format("%m-%d %H:%M").to_string().dimmed(),
            record.user_id.cyan(),
            record.kind,
            if record.fallback_used { "(fallback)" } else { "" }
        );
    }

    Ok(())
}
