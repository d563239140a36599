use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messenger::MembershipStatus;

/// Per-user record persisted in the shared user store. Every field carries a
/// serde default so that records written by older builds normalize cleanly on
/// read: missing fields are filled, known fields are preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    #[serde(default)]
    pub diamonds: u32,
    #[serde(default)]
    pub free_reward_granted: bool,
    #[serde(default)]
    pub invited_count: u32,
    #[serde(default)]
    pub referred_by: Option<String>,
    #[serde(default = "Utc::now")]
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub last_daily_spread_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_daily_gift_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub daily_spread_count: u32,
    #[serde(default)]
    pub last_daily_card: Option<String>,
    #[serde(default)]
    pub subscription_status: Option<MembershipStatus>,
    #[serde(default)]
    pub subscription_checked_at: Option<DateTime<Utc>>,
}

impl UserAccount {
    /// Fresh account for a first contact. `registered_at` is set once here
    /// and never rewritten.
    pub fn new(now: DateTime<Utc>) -> Self {
        UserAccount {
            diamonds: 0,
            free_reward_granted: false,
            invited_count: 0,
            referred_by: None,
            registered_at: now,
            last_daily_spread_at: None,
            last_daily_gift_at: None,
            daily_spread_count: 0,
            last_daily_card: None,
            subscription_status: None,
            subscription_checked_at: None,
        }
    }

    /// Anything but an explicit leave or kick counts as subscribed, matching
    /// the gate's policy.
    pub fn is_subscribed(&self) -> bool {
        matches!(
            self.subscription_status,
            Some(MembershipStatus::Member) | Some(MembershipStatus::Other)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn old_record_normalizes_with_defaults() {
        // A record written before the gift and subscription fields existed.
        let raw = r#"{
            "diamonds": 7,
            "free_reward_granted": true,
            "registered_at": "2024-03-01T12:00:00Z"
        }"#;

        let account: UserAccount = serde_json::from_str(raw).unwrap();
        assert_eq!(account.diamonds, 7);
        assert!(account.free_reward_granted);
        assert_eq!(account.invited_count, 0);
        assert_eq!(account.referred_by, None);
        assert_eq!(account.last_daily_gift_at, None);
        assert_eq!(account.last_daily_card, None);
        assert_eq!(account.subscription_status, None);
    }

    #[test]
    fn round_trips_field_for_field() {
        let now = Utc::now();
        let mut account = UserAccount::new(now);
        account.diamonds = 12;
        account.referred_by = Some("42".to_string());
        account.last_daily_card = Some("the_moon".to_string());
        account.subscription_status = Some(MembershipStatus::Member);

        let json = serde_json::to_string(&account).unwrap();
        let back: UserAccount = serde_json::from_str(&json).unwrap();
        assert_eq!(account, back);
    }
}
