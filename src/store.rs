use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::account::UserAccount;
use crate::config::Config;

pub type UserMap = HashMap<String, UserAccount>;

/// Durable mapping from user id to account, backed by a single JSON document.
///
/// Every mutation is one locked load → modify → save cycle, so concurrent
/// flows touching different keys merge into the latest mapping instead of
/// overwriting each other from stale snapshots. The lock is process-wide and
/// never held across an await point (all file work here is synchronous).
pub struct UserStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl UserStore {
    pub fn new(path: PathBuf) -> Self {
        UserStore {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn open(config: &Config) -> Self {
        Self::new(config.users_file())
    }

    fn ensure_file(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create user store directory")?;
        }
        if !self.path.exists() {
            std::fs::write(&self.path, "{}").context("Failed to seed user store")?;
        }
        Ok(())
    }

    /// Full mapping. A corrupted backing file is reset to `{}` with a
    /// warning; callers never see the parse error.
    pub fn load(&self) -> Result<UserMap> {
        self.ensure_file()?;
        let content =
            std::fs::read_to_string(&self.path).context("Failed to read user store")?;

        match serde_json::from_str(&content) {
            Ok(users) => Ok(users),
            Err(e) => {
                tracing::warn!("User store is corrupted ({}), resetting storage", e);
                std::fs::write(&self.path, "{}").context("Failed to reset user store")?;
                Ok(HashMap::new())
            }
        }
    }

    /// Atomic full overwrite.
    pub fn save(&self, users: &UserMap) -> Result<()> {
        self.ensure_file()?;
        let content =
            serde_json::to_string_pretty(users).context("Failed to serialize user store")?;
        std::fs::write(&self.path, content).context("Failed to write user store")?;
        Ok(())
    }

    /// The transaction primitive: one locked load → mutate → save cycle.
    /// Multi-account mutations (referral payouts) and all workflow charges
    /// run through this so sibling keys are never lost.
    pub fn with_mapping<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut UserMap) -> T,
    {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut users = self.load()?;
        let result = f(&mut users);
        self.save(&users)?;
        Ok(result)
    }

    /// Load one record, creating it on first contact and persisting the
    /// normalized form whenever it differs from what is on disk (so schema
    /// additions reach old records exactly once).
    pub fn get_or_init(&self, user_id: &str) -> Result<UserAccount> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_file()?;
        let content =
            std::fs::read_to_string(&self.path).context("Failed to read user store")?;

        let raw: serde_json::Value = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("User store is corrupted ({}), resetting storage", e);
                serde_json::json!({})
            }
        };

        let mut users: UserMap = serde_json::from_value(raw.clone()).unwrap_or_else(|e| {
            tracing::warn!("User store entries are malformed ({}), resetting storage", e);
            HashMap::new()
        });

        let account = users
            .entry(user_id.to_string())
            .or_insert_with(|| UserAccount::new(Utc::now()))
            .clone();

        let normalized =
            serde_json::to_value(&users).context("Failed to normalize user store")?;
        if normalized != raw {
            self.save(&users)?;
        }

        Ok(account)
    }

    pub fn get(&self, user_id: &str) -> Result<Option<UserAccount>> {
        Ok(self.load()?.get(user_id).cloned())
    }

    pub fn contains(&self, user_id: &str) -> Result<bool> {
        Ok(self.load()?.contains_key(user_id))
    }

    /// Merge one record into the latest mapping.
    pub fn put(&self, user_id: &str, account: UserAccount) -> Result<()> {
        self.with_mapping(|users| {
            users.insert(user_id.to_string(), account);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> UserStore {
        UserStore::new(dir.path().join("users.json"))
    }

    #[test]
    fn round_trips_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut account = UserAccount::new(Utc::now());
        account.diamonds = 9;
        account.last_daily_card = Some("the_tower".to_string());
        store.put("100", account.clone()).unwrap();

        let loaded = store.get("100").unwrap().unwrap();
        assert_eq!(loaded, account);
    }

    #[test]
    fn corrupted_file_resets_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(dir.path().join("users.json"), "{not json").unwrap();

        let users = store.load().unwrap();
        assert!(users.is_empty());

        // The backing file was reset, not left corrupted.
        let content = std::fs::read_to_string(dir.path().join("users.json")).unwrap();
        assert_eq!(content, "{}");
    }

    #[test]
    fn put_merges_into_latest_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        // Two handles over the same file, as two logical flows would hold.
        let store_a = UserStore::new(path.clone());
        let store_b = UserStore::new(path);

        store_a.put("1", UserAccount::new(Utc::now())).unwrap();
        store_b.put("2", UserAccount::new(Utc::now())).unwrap();

        let users = store_a.load().unwrap();
        assert!(users.contains_key("1"));
        assert!(users.contains_key("2"));
    }

    #[test]
    fn get_or_init_creates_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let account = store.get_or_init("7").unwrap();
        assert_eq!(account.diamonds, 0);
        assert!(store.contains("7").unwrap());
    }

    #[test]
    fn get_or_init_backfills_old_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(
            &path,
            r#"{"5": {"diamonds": 3, "registered_at": "2024-01-01T00:00:00Z"}}"#,
        )
        .unwrap();

        let store = UserStore::new(path.clone());
        let account = store.get_or_init("5").unwrap();
        assert_eq!(account.diamonds, 3);
        assert_eq!(account.invited_count, 0);

        // The normalized record was written back with the new fields.
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("invited_count"));
        assert!(content.contains("\"diamonds\": 3"));
    }

    #[test]
    fn get_or_init_leaves_current_records_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let first = store.get_or_init("9").unwrap();
        let second = store.get_or_init("9").unwrap();
        assert_eq!(first.registered_at, second.registered_at);
    }
}
