use anyhow::Result;
use chrono::Utc;

use crate::account::UserAccount;
use crate::config::Config;
use crate::ledger;
use crate::messenger::Messenger;
use crate::store::UserStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferralOutcome {
    /// New account created with `referred_by` set; inviter counted and paid.
    Attributed { inviter_id: String },
    SelfReferral,
    AlreadyRegistered,
    InvalidToken,
}

/// First-contact referral attribution. The token is an opaque numeric string
/// carried in the initial contact payload; nothing about it is trusted
/// beyond parsing as a candidate inviter id.
pub struct ReferralProgram {
    reward: u32,
}

impl ReferralProgram {
    pub fn new(config: &Config) -> Self {
        ReferralProgram {
            reward: config.pricing.referral_reward,
        }
    }

    /// The attribution transaction: both the new account and the inviter
    /// account change in one load → mutate → save cycle, so two first
    /// contacts carrying the same inviter token can never lose an update.
    ///
    /// "New user" is decided by key presence in the store, not by any field
    /// inside the record; re-contact after registration never re-attributes.
    pub fn attribute(
        &self,
        store: &UserStore,
        user_id: &str,
        token: &str,
    ) -> Result<ReferralOutcome> {
        let inviter_id = match token.trim().parse::<u64>() {
            Ok(numeric) => numeric.to_string(),
            Err(_) => return Ok(ReferralOutcome::InvalidToken),
        };

        if inviter_id == user_id {
            return Ok(ReferralOutcome::SelfReferral);
        }

        let reward = self.reward;
        store.with_mapping(|users| {
            if users.contains_key(user_id) {
                return ReferralOutcome::AlreadyRegistered;
            }

            let now = Utc::now();
            let mut account = UserAccount::new(now);
            account.referred_by = Some(inviter_id.clone());
            users.insert(user_id.to_string(), account);

            let inviter = users
                .entry(inviter_id.clone())
                .or_insert_with(|| UserAccount::new(now));
            inviter.invited_count += 1;
            ledger::credit_diamonds(inviter, reward);

            ReferralOutcome::Attributed { inviter_id }
        })
    }

    /// Attribution plus best-effort inviter notification. The credit is
    /// committed before the notification is attempted and stands even when
    /// the message cannot be delivered.
    pub async fn process<M: Messenger>(
        &self,
        store: &UserStore,
        messenger: &M,
        user_id: &str,
        token: &str,
    ) -> Result<ReferralOutcome> {
        let outcome = self.attribute(store, user_id, token)?;

        if let ReferralOutcome::Attributed { inviter_id } = &outcome {
            let text = format!(
                "A friend joined with your invite! {} 💎 added to your balance.",
                self.reward
            );
            if let Err(e) = messenger.show_text(inviter_id, &text).await {
                tracing::warn!("Failed to notify inviter {}: {}", inviter_id, e);
            }
        }

        Ok(outcome)
    }
}
