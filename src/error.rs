use chrono::Duration;
use thiserror::Error;

use crate::ledger::format_remaining;

/// Denial outcomes a user can run into. These are normal results of guard
/// evaluation, presented back through the messenger, never process failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BotError {
    #[error("not enough diamonds: need {required}, have {available}")]
    InsufficientFunds { required: u32, available: u32 },

    #[error("available again in {}", format_remaining(*.remaining))]
    OnCooldown { remaining: Duration },

    #[error("not enough card images: need {required}, have {available}")]
    InsufficientAssets { required: usize, available: usize },

    #[error("no daily card on record")]
    NoDailyCard,
}

impl BotError {
    pub fn shortfall(&self) -> Option<u32> {
        match self {
            BotError::InsufficientFunds {
                required,
                available,
            } => Some(required.saturating_sub(*available)),
            _ => None,
        }
    }
}
