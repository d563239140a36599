use std::path::PathBuf;

use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::ai_provider::AIProviderClient;
use crate::cards::CardDeck;
use crate::config::Config;
use crate::ledger::{self, CooldownState};
use crate::messenger::ConsoleMessenger;
use crate::referral::ReferralProgram;
use crate::spread::SpreadWorkflow;
use crate::store::UserStore;
use crate::subscription::{BotAction, SubscriptionGate};

pub async fn handle_shell(
    user_id: String,
    data_dir: Option<PathBuf>,
    provider: Option<String>,
    model: Option<String>,
    referrer: Option<String>,
) -> Result<()> {
    let config = Config::new(data_dir)?;
    let generator = AIProviderClient::new(config.get_ai_config(provider, model)?);
    let cards = CardDeck::new(config.cards_dir());
    let store = UserStore::open(&config);
    let gate = SubscriptionGate::new(&config);
    let workflow = SpreadWorkflow::new(config, store, cards, generator, ConsoleMessenger)?;

    // A referral token on the command line plays the role of the token in a
    // first-contact payload.
    if let Some(token) = referrer {
        let program = ReferralProgram::new(workflow.config());
        program
            .process(workflow.store(), workflow.messenger(), &user_id, &token)
            .await?;
    }

    let mut shell = ShellSession {
        workflow,
        gate,
        user_id,
        editor: DefaultEditor::new()?,
    };

    shell.run().await
}

struct ShellSession {
    workflow: SpreadWorkflow<ConsoleMessenger, AIProviderClient, CardDeck>,
    gate: SubscriptionGate,
    user_id: String,
    editor: DefaultEditor,
}

impl ShellSession {
    async fn run(&mut self) -> Result<()> {
        println!("{}", "arcana reading session".cyan().bold());
        println!(
            "Commands: {} {} {} {} {}",
            "/card".green(),
            "/spread <question>".green(),
            "/gift".green(),
            "/status".green(),
            "/exit".green()
        );
        println!("Plain text asks a clarifying question about your daily card.\n");

        loop {
            match self.editor.readline("🔮 > ") {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = self.editor.add_history_entry(&line);
                    if !self.dispatch(&line).await {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }

        println!("{}", "Until next time.".dimmed());
        Ok(())
    }

    /// Returns false when the session should end. A failing handler is
    /// reported and the session keeps running.
    async fn dispatch(&mut self, line: &str) -> bool {
        let (command, rest) = match line.split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "/exit" | "/quit" => return false,
            "/help" => {
                println!(
                    "{} draw the card of the day\n{} three-card spread over a question\n{} claim the daily gift\n{} account overview\n{} leave",
                    "/card  ".green(),
                    "/spread".green(),
                    "/gift  ".green(),
                    "/status".green(),
                    "/exit  ".green()
                );
            }
            "/status" => {
                report(self.show_status().await);
            }
            "/card" => {
                if self.allowed(BotAction::DailyCard).await {
                    report(self.workflow.daily_card(&self.user_id).await);
                }
            }
            "/spread" => {
                if rest.is_empty() {
                    println!("Usage: /spread <your question>");
                } else if self.allowed(BotAction::ThreeCardSpread).await {
                    report(self.workflow.three_card_spread(&self.user_id, rest).await);
                }
            }
            "/gift" => {
                if self.allowed(BotAction::DailyGift).await {
                    report(self.workflow.daily_gift(&self.user_id).await);
                }
            }
            _ if command.starts_with('/') => {
                println!("Unknown command {}, try /help", command);
            }
            // Free text is a clarifying question about the daily card.
            _ => {
                if self.allowed(BotAction::Clarify).await {
                    report(self.workflow.clarify(&self.user_id, line).await);
                }
            }
        }

        true
    }

    async fn allowed(&self, action: BotAction) -> bool {
        match self
            .gate
            .check_action(
                self.workflow.store(),
                self.workflow.messenger(),
                &self.user_id,
                action,
            )
            .await
        {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::error!("Subscription check failed: {:#}", e);
                false
            }
        }
    }

    async fn show_status(&self) -> Result<()> {
        let account = self.workflow.store().get_or_init(&self.user_id)?;

        println!("{}", "Your account".cyan().bold());
        println!("Diamonds: {}", account.diamonds.to_string().yellow());
        println!("Draws taken: {}", account.daily_spread_count);
        println!("Friends invited: {}", account.invited_count);

        if let Some(card) = &account.last_daily_card {
            println!("Card of the day: {}", card.replace('_', " ").cyan());
        }

        let window = self.workflow.config().gift_cooldown();
        match ledger::check_cooldown(account.last_daily_gift_at, window, chrono::Utc::now()) {
            CooldownState::Ready => println!("Daily gift: {}", "ready".green()),
            CooldownState::Blocked { remaining } => {
                println!("Daily gift: in {}", ledger::format_remaining(remaining).yellow())
            }
        }

        let stats = self.workflow.history_stats();
        println!(
            "\n{} {} total | {} today",
            "Draws:".dimmed(),
            stats.total_draws,
            stats.today_draws
        );

        Ok(())
    }
}

fn report<T>(result: Result<T>) {
    if let Err(e) = result {
        tracing::error!("Handler failed: {:#}", e);
        println!(
            "{}",
            "Something went wrong on our side, please try again.".red()
        );
    }
}
