use anyhow::Result;
use chrono::Utc;

use crate::config::Config;
use crate::ledger;
use crate::messenger::{MembershipStatus, Messenger};
use crate::store::UserStore;

/// Everything a user can ask the bot to do, as seen by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotAction {
    Start,
    CheckSubscription,
    Status,
    DailyCard,
    ThreeCardSpread,
    Clarify,
    DailyGift,
}

/// Declared allow-list: these actions run without a subscription check. The
/// dispatcher consults this before any handler body, so gating is a policy
/// decision in one place rather than an attribute on handlers.
pub const EXEMPT_ACTIONS: &[BotAction] = &[
    BotAction::Start,
    BotAction::CheckSubscription,
    BotAction::Status,
];

pub fn requires_subscription(action: BotAction) -> bool {
    !EXEMPT_ACTIONS.contains(&action)
}

/// An explicit leave or kick blocks; member and any other confirmed status
/// (admin, restricted) pass.
pub fn status_allows(status: MembershipStatus) -> bool {
    !matches!(status, MembershipStatus::Left | MembershipStatus::Kicked)
}

/// Channel-membership gate in front of the paid actions, paying the one-time
/// subscription diamond bonus on first confirmed membership.
pub struct SubscriptionGate {
    channel: String,
    reward: u32,
}

impl SubscriptionGate {
    pub fn new(config: &Config) -> Self {
        SubscriptionGate {
            channel: config.channel.clone(),
            reward: config.pricing.subscription_reward,
        }
    }

    /// Policy entry point for the dispatcher.
    pub async fn check_action<M: Messenger>(
        &self,
        store: &UserStore,
        messenger: &M,
        user_id: &str,
        action: BotAction,
    ) -> Result<bool> {
        if !requires_subscription(action) {
            return Ok(true);
        }
        self.ensure_subscribed(store, messenger, user_id).await
    }

    /// Look up membership, cache the result on the account and grant the
    /// one-time reward on first confirmation. A failed lookup is unknown,
    /// never implicitly subscribed: the action stays blocked and the cached
    /// status is left untouched.
    pub async fn ensure_subscribed<M: Messenger>(
        &self,
        store: &UserStore,
        messenger: &M,
        user_id: &str,
    ) -> Result<bool> {
        let status = match messenger.membership_status(&self.channel, user_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("Membership lookup failed for {}: {}", user_id, e);
                let text = "Could not verify your subscription right now. Please try again.";
                if let Err(e) = messenger.show_text(user_id, text).await {
                    tracing::warn!("Failed to reach user {}: {}", user_id, e);
                }
                return Ok(false);
            }
        };

        let now = Utc::now();

        if !status_allows(status) {
            store.with_mapping(|users| {
                let account = users
                    .entry(user_id.to_string())
                    .or_insert_with(|| crate::account::UserAccount::new(now));
                account.subscription_status = Some(status);
                account.subscription_checked_at = Some(now);
            })?;

            let text = format!("To use the bot, subscribe to {}", self.channel);
            let options = vec!["Subscribe".to_string(), "Check subscription".to_string()];
            if let Err(e) = messenger.prompt_buttons(user_id, &text, &options).await {
                tracing::warn!("Failed to reach user {}: {}", user_id, e);
            }
            return Ok(false);
        }

        let reward = self.reward;
        let (granted, balance) = store.with_mapping(|users| {
            let account = users
                .entry(user_id.to_string())
                .or_insert_with(|| crate::account::UserAccount::new(now));
            account.subscription_status = Some(status);
            account.subscription_checked_at = Some(now);
            let granted = ledger::grant_subscription_reward(account, reward);
            (granted, account.diamonds)
        })?;

        if granted {
            let text = format!(
                "Thanks for subscribing! {} 💎 added, your balance is now {}.",
                reward, balance
            );
            if let Err(e) = messenger.show_text(user_id, &text).await {
                tracing::warn!("Failed to reach user {}: {}", user_id, e);
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::testing::MockMessenger;

    fn gate() -> SubscriptionGate {
        SubscriptionGate {
            channel: "@test_channel".to_string(),
            reward: 5,
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> UserStore {
        UserStore::new(dir.path().join("users.json"))
    }

    #[tokio::test]
    async fn member_passes_and_is_rewarded_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let messenger = MockMessenger::new();
        let gate = gate();

        assert!(gate.ensure_subscribed(&store, &messenger, "1").await.unwrap());
        assert!(gate.ensure_subscribed(&store, &messenger, "1").await.unwrap());

        let account = store.get("1").unwrap().unwrap();
        assert_eq!(account.subscription_status, Some(MembershipStatus::Member));
        assert!(account.free_reward_granted);
        assert_eq!(account.diamonds, 5);

        // The reward announcement went out exactly once.
        assert_eq!(messenger.texts_for("1").len(), 1);
    }

    #[tokio::test]
    async fn left_user_is_blocked_with_subscribe_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let messenger = MockMessenger::with_membership(Some(MembershipStatus::Left));
        let gate = gate();

        assert!(!gate.ensure_subscribed(&store, &messenger, "2").await.unwrap());

        let account = store.get("2").unwrap().unwrap();
        assert_eq!(account.subscription_status, Some(MembershipStatus::Left));
        assert_eq!(account.diamonds, 0);
        assert!(!account.free_reward_granted);

        let prompts = messenger.button_prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].1.contains("@test_channel"));
    }

    #[tokio::test]
    async fn failed_lookup_blocks_without_state_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let messenger = MockMessenger::with_membership(None);
        let gate = gate();

        assert!(!gate.ensure_subscribed(&store, &messenger, "3").await.unwrap());

        // Unknown is not cached as a status and no reward is paid.
        assert_eq!(store.get("3").unwrap(), None);
        let texts = messenger.texts_for("3");
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("try again"));
    }

    #[tokio::test]
    async fn exempt_actions_skip_the_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        // A lookup would fail; exempt actions must not perform one.
        let messenger = MockMessenger::with_membership(None);
        let gate = gate();

        assert!(gate
            .check_action(&store, &messenger, "4", BotAction::Start)
            .await
            .unwrap());
        assert!(!gate
            .check_action(&store, &messenger, "4", BotAction::DailyCard)
            .await
            .unwrap());
    }

    #[test]
    fn allow_list_matches_the_protected_set() {
        assert!(!requires_subscription(BotAction::Start));
        assert!(!requires_subscription(BotAction::CheckSubscription));
        assert!(requires_subscription(BotAction::DailyCard));
        assert!(requires_subscription(BotAction::ThreeCardSpread));
        assert!(requires_subscription(BotAction::Clarify));
        assert!(requires_subscription(BotAction::DailyGift));
    }
}
