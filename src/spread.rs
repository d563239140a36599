use std::sync::{Mutex, PoisonError};
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::timeout;

use crate::account::UserAccount;
use crate::ai_provider::TextGenerator;
use crate::cards::{draw_cards, Card, CardSource};
use crate::config::Config;
use crate::error::BotError;
use crate::history::{DrawHistory, DrawKind, DrawStats};
use crate::ledger::{self, CooldownState, GiftReward};
use crate::messenger::Messenger;
use crate::prompts::{self, PromptKind};
use crate::store::UserStore;

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOutcome {
    Completed {
        cards: Vec<Card>,
        interpretation: String,
        fallback_used: bool,
    },
    Denied(BotError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GiftOutcome {
    Won {
        roll: u32,
        reward: GiftReward,
        balance: u32,
    },
    Denied(BotError),
}

/// Orchestrates one user-initiated draw end to end: guard, charge, card
/// sampling, presentation, interpretation, persistence.
///
/// Charging policy per action: the daily and three-card draws charge before
/// generation and keep the debit when the generator falls back (payment is
/// for the draw event). The clarify flow charges only once text was actually
/// produced; a fallback answer is free.
pub struct SpreadWorkflow<M, G, C> {
    config: Config,
    store: UserStore,
    cards: C,
    generator: G,
    messenger: M,
    history: Mutex<DrawHistory>,
    rng: Mutex<StdRng>,
}

impl<M, G, C> SpreadWorkflow<M, G, C>
where
    M: Messenger,
    G: TextGenerator,
    C: CardSource,
{
    pub fn new(config: Config, store: UserStore, cards: C, generator: G, messenger: M) -> Result<Self> {
        let history = DrawHistory::new(&config)?;
        Ok(SpreadWorkflow {
            config,
            store,
            cards,
            generator,
            messenger,
            history: Mutex::new(history),
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    /// Fixed randomness for tests and reproducible sessions.
    pub fn reseed(&self, seed: u64) {
        *self.rng.lock().unwrap_or_else(PoisonError::into_inner) = StdRng::seed_from_u64(seed);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &UserStore {
        &self.store
    }

    pub fn messenger(&self) -> &M {
        &self.messenger
    }

    pub fn history_stats(&self) -> DrawStats {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats()
    }

    /// Card of the day: flat diamond cost, one card, records the card id as
    /// context for later clarifying questions.
    pub async fn daily_card(&self, user_id: &str) -> Result<DrawOutcome> {
        let account = self.store.get_or_init(user_id)?;
        let cost = self.config.pricing.daily_card_cost;

        if account.diamonds < cost {
            let err = BotError::InsufficientFunds {
                required: cost,
                available: account.diamonds,
            };
            self.deny(user_id, &err).await;
            return Ok(DrawOutcome::Denied(err));
        }

        let pool = self.cards.list_available()?;
        let drawn = match self.sample(&pool, 1) {
            Ok(drawn) => drawn,
            Err(err) => {
                self.deny(user_id, &err).await;
                return Ok(DrawOutcome::Denied(err));
            }
        };
        let card = drawn[0].clone();

        let now = Utc::now();
        let charge_result = self.store.with_mapping(|users| {
            let account = users
                .entry(user_id.to_string())
                .or_insert_with(|| UserAccount::new(now));
            match ledger::charge_diamonds(account, cost) {
                Ok(()) => {
                    account.last_daily_spread_at = Some(now);
                    account.daily_spread_count += 1;
                    account.last_daily_card = Some(card.id.clone());
                    Ok(())
                }
                Err(err) => Err(err),
            }
        })?;
        if let Err(err) = charge_result {
            self.deny(user_id, &err).await;
            return Ok(DrawOutcome::Denied(err));
        }

        if let Err(e) = self
            .messenger
            .show_image(user_id, &card.image_path, Some(&card.name))
            .await
        {
            tracing::warn!("Failed to show card to {}: {}", user_id, e);
        }

        let names = vec![card.name.clone()];
        let (text, fallback_used) = self.interpret(PromptKind::DailyCard, &names, None).await;
        self.record(user_id, DrawKind::DailyCard, vec![card.id.clone()], None, fallback_used);
        self.show(user_id, &text).await;

        Ok(DrawOutcome::Completed {
            cards: vec![card],
            interpretation: text,
            fallback_used,
        })
    }

    /// Three-card spread over a free-text question: flat diamond cost, three
    /// distinct cards shown as one collage.
    pub async fn three_card_spread(&self, user_id: &str, question: &str) -> Result<DrawOutcome> {
        let account = self.store.get_or_init(user_id)?;
        let cost = self.config.pricing.three_card_cost;

        if account.diamonds < cost {
            let err = BotError::InsufficientFunds {
                required: cost,
                available: account.diamonds,
            };
            self.deny(user_id, &err).await;
            return Ok(DrawOutcome::Denied(err));
        }

        let pool = self.cards.list_available()?;
        let drawn = match self.sample(&pool, 3) {
            Ok(drawn) => drawn,
            Err(err) => {
                self.deny(user_id, &err).await;
                return Ok(DrawOutcome::Denied(err));
            }
        };

        let now = Utc::now();
        let charge_result = self.store.with_mapping(|users| {
            let account = users
                .entry(user_id.to_string())
                .or_insert_with(|| UserAccount::new(now));
            ledger::charge_diamonds(account, cost)
        })?;
        if let Err(err) = charge_result {
            self.deny(user_id, &err).await;
            return Ok(DrawOutcome::Denied(err));
        }

        let names: Vec<String> = drawn.iter().map(|card| card.name.clone()).collect();
        let images: Vec<_> = drawn.iter().map(|card| card.image_path.clone()).collect();
        if let Err(e) = self
            .messenger
            .show_collage(user_id, &images, Some(&names.join(", ")))
            .await
        {
            tracing::warn!("Failed to show spread to {}: {}", user_id, e);
        }

        let (text, fallback_used) = self
            .interpret(PromptKind::ThreeCards, &names, Some(question))
            .await;
        let card_ids = drawn.iter().map(|card| card.id.clone()).collect();
        self.record(
            user_id,
            DrawKind::ThreeCards,
            card_ids,
            Some(question.to_string()),
            fallback_used,
        );
        self.show(user_id, &text).await;

        Ok(DrawOutcome::Completed {
            cards: drawn,
            interpretation: text,
            fallback_used,
        })
    }

    /// Clarifying question about the most recent daily card. Generates
    /// first, charges only for a produced answer.
    pub async fn clarify(&self, user_id: &str, question: &str) -> Result<DrawOutcome> {
        let account = self.store.get_or_init(user_id)?;

        let Some(card_id) = account.last_daily_card.clone() else {
            let err = BotError::NoDailyCard;
            self.deny(user_id, &err).await;
            return Ok(DrawOutcome::Denied(err));
        };

        let cost = self.config.pricing.clarify_cost;
        if account.diamonds < cost {
            let err = BotError::InsufficientFunds {
                required: cost,
                available: account.diamonds,
            };
            self.deny(user_id, &err).await;
            return Ok(DrawOutcome::Denied(err));
        }

        let names = vec![card_id.replace('_', " ")];
        let (text, fallback_used) = self
            .interpret(PromptKind::Clarify, &names, Some(question))
            .await;

        if !fallback_used {
            let charge_result = self.store.with_mapping(|users| {
                let account = users
                    .entry(user_id.to_string())
                    .or_insert_with(|| UserAccount::new(Utc::now()));
                ledger::charge_diamonds(account, cost)
            })?;
            if let Err(err) = charge_result {
                self.deny(user_id, &err).await;
                return Ok(DrawOutcome::Denied(err));
            }
        }

        self.record(
            user_id,
            DrawKind::Clarify,
            vec![card_id],
            Some(question.to_string()),
            fallback_used,
        );
        self.show(user_id, &text).await;

        Ok(DrawOutcome::Completed {
            cards: Vec::new(),
            interpretation: text,
            fallback_used,
        })
    }

    /// Free daily gift on a rolling cooldown: one slot-style roll, tiered
    /// diamond payout.
    pub async fn daily_gift(&self, user_id: &str) -> Result<GiftOutcome> {
        let account = self.store.get_or_init(user_id)?;
        let window = self.config.gift_cooldown();
        let now = Utc::now();

        if let CooldownState::Blocked { remaining } =
            ledger::check_cooldown(account.last_daily_gift_at, window, now)
        {
            let err = BotError::OnCooldown { remaining };
            self.deny(user_id, &err).await;
            return Ok(GiftOutcome::Denied(err));
        }

        let roll = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            rng.gen_range(1..=ledger::GIFT_ROLL_MAX)
        };
        let reward = ledger::resolve_gift_reward(roll);

        // Re-check inside the transaction so a concurrent claim cannot pay
        // the gift twice within one window.
        let claim_result = self.store.with_mapping(|users| {
            let account = users
                .entry(user_id.to_string())
                .or_insert_with(|| UserAccount::new(now));
            match ledger::check_cooldown(account.last_daily_gift_at, window, now) {
                CooldownState::Blocked { remaining } => Err(BotError::OnCooldown { remaining }),
                CooldownState::Ready => {
                    ledger::credit_diamonds(account, reward.amount);
                    account.last_daily_gift_at = Some(now);
                    Ok(account.diamonds)
                }
            }
        })?;

        let balance = match claim_result {
            Ok(balance) => balance,
            Err(err) => {
                self.deny(user_id, &err).await;
                return Ok(GiftOutcome::Denied(err));
            }
        };

        self.record(user_id, DrawKind::Gift, Vec::new(), None, false);
        let text = format!(
            "🎁 {}! You won {} 💎, your balance is now {}.",
            reward.label, reward.amount, balance
        );
        self.show(user_id, &text).await;

        Ok(GiftOutcome::Won {
            roll,
            reward,
            balance,
        })
    }

    fn sample(&self, pool: &[Card], count: usize) -> Result<Vec<Card>, BotError> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        draw_cards(pool, count, &mut *rng)
    }

    /// Ask the generator under an explicit timeout; expiry, errors and empty
    /// responses all collapse into the deterministic fallback.
    async fn interpret(
        &self,
        kind: PromptKind,
        card_names: &[String],
        question: Option<&str>,
    ) -> (String, bool) {
        let system_prompt = prompts::resolve_system_prompt(kind, &self.config.generation);
        let user_prompt =
            prompts::build_user_prompt(kind, card_names, question, &self.config.prompts_dir());
        let max_tokens = prompts::max_tokens(kind, &self.config.generation);
        let window = StdDuration::from_secs(self.config.generation.timeout_secs);

        let generated = timeout(
            window,
            self.generator.generate(&system_prompt, &user_prompt, max_tokens),
        )
        .await;

        match generated {
            Ok(Ok(text)) if !text.trim().is_empty() => (text, false),
            Ok(Ok(_)) => {
                tracing::warn!("Generator returned empty text, using fallback");
                (prompts::fallback_text(kind, card_names), true)
            }
            Ok(Err(e)) => {
                tracing::warn!("Generation failed ({}), using fallback", e);
                (prompts::fallback_text(kind, card_names), true)
            }
            Err(_) => {
                tracing::warn!("Generation timed out, using fallback");
                (prompts::fallback_text(kind, card_names), true)
            }
        }
    }

    fn record(
        &self,
        user_id: &str,
        kind: DrawKind,
        cards: Vec<String>,
        question: Option<String>,
        fallback_used: bool,
    ) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = history.record(user_id, kind, cards, question, fallback_used) {
            tracing::warn!("Failed to journal draw for {}: {}", user_id, e);
        }
    }

    async fn show(&self, user_id: &str, text: &str) {
        if let Err(e) = self.messenger.show_text(user_id, text).await {
            tracing::warn!("Failed to reach user {}: {}", user_id, e);
        }
    }

    async fn deny(&self, user_id: &str, err: &BotError) {
        let text = match err {
            BotError::InsufficientFunds {
                required,
                available,
            } => format!(
                "Not enough diamonds: this costs {} 💎 and you have {}. \
                 Invite a friend or claim the daily gift to top up.",
                required, available
            ),
            BotError::OnCooldown { remaining } => format!(
                "The daily gift will be ready in {}.",
                ledger::format_remaining(*remaining)
            ),
            BotError::InsufficientAssets { .. } => {
                "The deck is being refreshed, please try again later.".to_string()
            }
            BotError::NoDailyCard => {
                "Draw a card of the day first, then ask your question.".to_string()
            }
        };
        self.show(user_id, &text).await;
    }
}
