use std::path::PathBuf;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::BotError;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    /// Stable identifier, the image file stem (e.g. `the_high_priestess`).
    pub id: String,
    /// Human-readable name shown in captions and prompts.
    pub name: String,
    pub image_path: PathBuf,
}

/// Source of drawable card assets. Listed fresh on every draw so new card
/// images can be dropped into the deck without a restart.
pub trait CardSource: Send + Sync {
    fn list_available(&self) -> Result<Vec<Card>>;
}

/// Directory-backed deck: every image file under the directory is one card.
pub struct CardDeck {
    dir: PathBuf,
}

impl CardDeck {
    pub fn new(dir: PathBuf) -> Self {
        CardDeck { dir }
    }
}

impl CardSource for CardDeck {
    fn list_available(&self) -> Result<Vec<Card>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.dir).context("Failed to read card directory")?;

        let mut cards = Vec::new();
        for entry in entries {
            let path = entry.context("Failed to read card directory entry")?.path();
            let extension = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_lowercase());
            let is_image = extension
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
                .unwrap_or(false);
            if !is_image {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            cards.push(Card {
                id: stem.to_string(),
                name: stem.replace('_', " "),
                image_path: path.clone(),
            });
        }

        cards.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(cards)
    }
}

/// Sample `count` distinct cards from the pool, or fail distinctly when the
/// pool is too small. No balance is touched by the caller until this
/// succeeds.
pub fn draw_cards<R: Rng>(pool: &[Card], count: usize, rng: &mut R) -> Result<Vec<Card>, BotError> {
    if pool.len() < count {
        return Err(BotError::InsufficientAssets {
            required: count,
            available: pool.len(),
        });
    }
    Ok(pool.choose_multiple(rng, count).cloned().collect())
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// In-memory card source for workflow tests.
    pub struct StaticCards {
        pub cards: Vec<Card>,
    }

    impl StaticCards {
        pub fn named(ids: &[&str]) -> Self {
            StaticCards {
                cards: ids
                    .iter()
                    .map(|id| Card {
                        id: (*id).to_string(),
                        name: id.replace('_', " "),
                        image_path: PathBuf::from(format!("{id}.jpg")),
                    })
                    .collect(),
            }
        }
    }

    impl CardSource for StaticCards {
        fn list_available(&self) -> Result<Vec<Card>> {
            Ok(self.cards.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::testing::StaticCards;
    use super::*;

    #[test]
    fn deck_lists_image_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("the_sun.jpg"), b"img").unwrap();
        std::fs::write(dir.path().join("the_moon.png"), b"img").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"not a card").unwrap();

        let deck = CardDeck::new(dir.path().to_path_buf());
        let cards = deck.list_available().unwrap();

        let ids: Vec<_> = cards.iter().map(|card| card.id.as_str()).collect();
        assert_eq!(ids, vec!["the_moon", "the_sun"]);
        assert_eq!(cards[1].name, "the sun");
    }

    #[test]
    fn deck_picks_up_hot_added_cards() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("strength.jpg"), b"img").unwrap();

        let deck = CardDeck::new(dir.path().to_path_buf());
        assert_eq!(deck.list_available().unwrap().len(), 1);

        std::fs::write(dir.path().join("justice.jpg"), b"img").unwrap();
        assert_eq!(deck.list_available().unwrap().len(), 2);
    }

    #[test]
    fn missing_deck_directory_is_an_empty_pool() {
        let dir = tempfile::tempdir().unwrap();
        let deck = CardDeck::new(dir.path().join("nowhere"));
        assert!(deck.list_available().unwrap().is_empty());
    }

    #[test]
    fn draws_distinct_cards() {
        let pool = StaticCards::named(&["a", "b", "c", "d", "e"]).cards;
        let mut rng = StdRng::seed_from_u64(7);

        let drawn = draw_cards(&pool, 3, &mut rng).unwrap();
        assert_eq!(drawn.len(), 3);

        let mut ids: Vec<_> = drawn.iter().map(|card| card.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn short_pool_fails_distinctly() {
        let pool = StaticCards::named(&["a", "b"]).cards;
        let mut rng = StdRng::seed_from_u64(7);

        let err = draw_cards(&pool, 3, &mut rng).unwrap_err();
        assert_eq!(
            err,
            BotError::InsufficientAssets {
                required: 3,
                available: 2
            }
        );
    }
}
