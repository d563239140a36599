use chrono::{DateTime, Duration, Utc};

use crate::account::UserAccount;
use crate::error::BotError;

/// Slot-style gift roll range. The maximum value pays the jackpot tier and
/// the designated triple values pay the middle tier; everything else pays the
/// consolation tier. The values and amounts are a product contract.
pub const GIFT_ROLL_MAX: u32 = 64;
pub const GIFT_TRIPLE_ROLLS: [u32; 3] = [1, 22, 43];

pub const GIFT_JACKPOT_AMOUNT: u32 = 50;
pub const GIFT_TRIPLE_AMOUNT: u32 = 15;
pub const GIFT_BASE_AMOUNT: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GiftReward {
    pub amount: u32,
    pub label: &'static str,
}

/// Explicit tier lookup for the daily gift roll.
pub fn resolve_gift_reward(roll: u32) -> GiftReward {
    match roll {
        GIFT_ROLL_MAX => GiftReward {
            amount: GIFT_JACKPOT_AMOUNT,
            label: "jackpot",
        },
        r if GIFT_TRIPLE_ROLLS.contains(&r) => GiftReward {
            amount: GIFT_TRIPLE_AMOUNT,
            label: "triple",
        },
        _ => GiftReward {
            amount: GIFT_BASE_AMOUNT,
            label: "spark",
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownState {
    Ready,
    Blocked { remaining: Duration },
}

/// Pure cooldown evaluation. A missing anchor is always ready; otherwise the
/// action becomes ready once the full window has elapsed.
pub fn check_cooldown(
    last: Option<DateTime<Utc>>,
    window: Duration,
    now: DateTime<Utc>,
) -> CooldownState {
    match last {
        None => CooldownState::Ready,
        Some(last) => {
            let elapsed = now - last;
            if elapsed >= window {
                CooldownState::Ready
            } else {
                CooldownState::Blocked {
                    remaining: window - elapsed,
                }
            }
        }
    }
}

/// Compact remaining-time label. Minutes are always shown when hours are
/// absent, even at zero, so the user never sees an empty wait.
pub fn format_remaining(remaining: Duration) -> String {
    let total_secs = remaining.num_seconds().max(0);
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// Debit exactly `amount`, or fail without touching the account. The balance
/// can never go negative: the check precedes the subtraction and the
/// subtraction saturates.
pub fn charge_diamonds(account: &mut UserAccount, amount: u32) -> Result<(), BotError> {
    if account.diamonds < amount {
        return Err(BotError::InsufficientFunds {
            required: amount,
            available: account.diamonds,
        });
    }
    account.diamonds = account.diamonds.saturating_sub(amount);
    Ok(())
}

pub fn credit_diamonds(account: &mut UserAccount, amount: u32) {
    account.diamonds = account.diamonds.saturating_add(amount);
}

/// One-time subscription bonus. Returns whether the reward was paid; a
/// second call is a no-op on an unchanged account.
pub fn grant_subscription_reward(account: &mut UserAccount, amount: u32) -> bool {
    if account.free_reward_granted {
        return false;
    }
    account.free_reward_granted = true;
    credit_diamonds(account, amount);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account_with(diamonds: u32) -> UserAccount {
        let mut account = UserAccount::new(Utc::now());
        account.diamonds = diamonds;
        account
    }

    #[test]
    fn charge_debits_exactly() {
        let mut account = account_with(10);
        charge_diamonds(&mut account, 4).unwrap();
        assert_eq!(account.diamonds, 6);
    }

    #[test]
    fn charge_rejects_shortfall_without_mutation() {
        let mut account = account_with(3);
        let err = charge_diamonds(&mut account, 5).unwrap_err();
        assert_eq!(
            err,
            BotError::InsufficientFunds {
                required: 5,
                available: 3
            }
        );
        assert_eq!(account.diamonds, 3);
    }

    #[test]
    fn balance_never_negative_across_sequences() {
        let mut account = account_with(7);
        let amounts = [5, 5, 2, 9, 1, 100];
        for amount in amounts {
            let _ = charge_diamonds(&mut account, amount);
            assert!(account.diamonds <= 7);
        }
        // 5 then 2 succeed, everything else is rejected.
        assert_eq!(account.diamonds, 0);
    }

    #[test]
    fn subscription_reward_pays_exactly_once() {
        let mut account = account_with(0);
        assert!(grant_subscription_reward(&mut account, 5));
        assert_eq!(account.diamonds, 5);
        assert!(account.free_reward_granted);

        let before = account.clone();
        assert!(!grant_subscription_reward(&mut account, 5));
        assert_eq!(account, before);
    }

    #[test]
    fn missing_anchor_is_always_ready() {
        let now = Utc::now();
        assert_eq!(
            check_cooldown(None, Duration::hours(24), now),
            CooldownState::Ready
        );
        assert_eq!(
            check_cooldown(None, Duration::seconds(1), now + Duration::days(365)),
            CooldownState::Ready
        );
    }

    #[test]
    fn fresh_anchor_blocks_for_the_full_window() {
        let now = Utc::now();
        let window = Duration::hours(24);
        match check_cooldown(Some(now), window, now) {
            CooldownState::Blocked { remaining } => {
                assert!((window - remaining).num_seconds().abs() <= 1);
            }
            CooldownState::Ready => panic!("expected blocked"),
        }
    }

    #[test]
    fn elapsed_window_is_ready_again() {
        let now = Utc::now();
        let window = Duration::hours(24);
        assert_eq!(
            check_cooldown(Some(now - Duration::hours(25)), window, now),
            CooldownState::Ready
        );
        assert_eq!(
            check_cooldown(Some(now - window), window, now),
            CooldownState::Ready
        );
    }

    #[test]
    fn remaining_label_shows_minutes_without_hours() {
        assert_eq!(format_remaining(Duration::minutes(125)), "2h 5m");
        assert_eq!(format_remaining(Duration::minutes(45)), "45m");
        assert_eq!(format_remaining(Duration::seconds(30)), "0m");
        assert_eq!(format_remaining(Duration::seconds(-5)), "0m");
        assert_eq!(format_remaining(Duration::hours(24)), "24h 0m");
    }

    #[test]
    fn gift_tiers_match_the_product_contract() {
        assert_eq!(resolve_gift_reward(GIFT_ROLL_MAX).amount, GIFT_JACKPOT_AMOUNT);

        for roll in GIFT_TRIPLE_ROLLS {
            assert_eq!(resolve_gift_reward(roll).amount, GIFT_TRIPLE_AMOUNT);
        }

        for roll in 2..GIFT_ROLL_MAX {
            if GIFT_TRIPLE_ROLLS.contains(&roll) {
                continue;
            }
            assert_eq!(resolve_gift_reward(roll).amount, GIFT_BASE_AMOUNT);
        }
    }
}
