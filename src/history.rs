use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawKind {
    DailyCard,
    ThreeCards,
    Clarify,
    Gift,
}

impl std::fmt::Display for DrawKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DrawKind::DailyCard => write!(f, "daily_card"),
            DrawKind::ThreeCards => write!(f, "three_cards"),
            DrawKind::Clarify => write!(f, "clarify"),
            DrawKind::Gift => write!(f, "gift"),
        }
    }
}

/// One completed draw event, journaled after the accounting has been
/// persisted to the user store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawRecord {
    pub id: String,
    pub user_id: String,
    pub kind: DrawKind,
    pub cards: Vec<String>,
    pub question: Option<String>,
    pub fallback_used: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DrawStats {
    pub total_draws: usize,
    pub today_draws: usize,
    pub fallback_rate: f64,
}

/// Append-only journal of draw events, loaded at construction and saved
/// after every append.
pub struct DrawHistory {
    path: PathBuf,
    records: Vec<DrawRecord>,
}

impl DrawHistory {
    pub fn new(config: &Config) -> Result<Self> {
        Self::open(config.history_file())
    }

    pub fn open(path: PathBuf) -> Result<Self> {
        let records = if path.exists() {
            let content =
                std::fs::read_to_string(&path).context("Failed to read draw history")?;
            match serde_json::from_str(&content) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!("Draw history is corrupted ({}), starting empty", e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        Ok(DrawHistory { path, records })
    }

    pub fn record(
        &mut self,
        user_id: &str,
        kind: DrawKind,
        cards: Vec<String>,
        question: Option<String>,
        fallback_used: bool,
    ) -> Result<()> {
        let record = DrawRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind,
            cards,
            question,
            fallback_used,
            timestamp: Utc::now(),
        };

        self.records.push(record);
        self.save()
    }

    pub fn recent(&self, limit: usize) -> Vec<&DrawRecord> {
        let mut records: Vec<_> = self.records.iter().collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        records
    }

    pub fn for_user(&self, user_id: &str) -> Vec<&DrawRecord> {
        self.records
            .iter()
            .filter(|record| record.user_id == user_id)
            .collect()
    }

    pub fn stats(&self) -> DrawStats {
        let today = Utc::now().date_naive();
        let today_draws = self
            .records
            .iter()
            .filter(|record| record.timestamp.date_naive() == today)
            .count();
        let fallbacks = self
            .records
            .iter()
            .filter(|record| record.fallback_used)
            .count();

        let fallback_rate = if self.records.is_empty() {
            0.0
        } else {
            fallbacks as f64 / self.records.len() as f64
        };

        DrawStats {
            total_draws: self.records.len(),
            today_draws,
            fallback_rate,
        }
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create history directory")?;
        }
        let content =
            serde_json::to_string_pretty(&self.records).context("Failed to serialize draw history")?;
        std::fs::write(&self.path, content).context("Failed to write draw history")?;
        Ok(())
    }
}
