use std::path::Path;

use crate::config::GenerationConfig;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You interpret tarot cards briefly and neutrally. \
Answer calmly and concisely, without mysticism or pathos.";

const DAY_SYSTEM_PROMPT: &str = "You interpret a single daily tarot card. \
Keep the reading short, grounded and practical.";

const THREE_SYSTEM_PROMPT: &str = "You interpret a three-card tarot spread. \
Describe each card's meaning and close with one combined takeaway.";

/// Which action a prompt is built for. Each kind has its own user template,
/// token budget and system-prompt mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    DailyCard,
    ThreeCards,
    Clarify,
}

/// System prompts are selected per interpretation context, not per action:
/// the clarify flow reuses the single-card context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    Day,
    Three,
}

impl PromptKind {
    pub fn key(&self) -> &'static str {
        match self {
            PromptKind::DailyCard => "card_day",
            PromptKind::ThreeCards => "three_cards",
            PromptKind::Clarify => "clarify",
        }
    }

    pub fn mode(&self) -> PromptMode {
        match self {
            PromptKind::DailyCard | PromptKind::Clarify => PromptMode::Day,
            PromptKind::ThreeCards => PromptMode::Three,
        }
    }
}

pub fn resolve_system_prompt(kind: PromptKind, generation: &GenerationConfig) -> String {
    let fallback = generation
        .base_system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);

    let prompt = match kind.mode() {
        PromptMode::Day => generation
            .day_system_prompt
            .as_deref()
            .unwrap_or_else(|| {
                if generation.base_system_prompt.is_some() {
                    fallback
                } else {
                    DAY_SYSTEM_PROMPT
                }
            }),
        PromptMode::Three => generation
            .three_system_prompt
            .as_deref()
            .unwrap_or_else(|| {
                if generation.base_system_prompt.is_some() {
                    fallback
                } else {
                    THREE_SYSTEM_PROMPT
                }
            }),
    };

    prompt.to_string()
}

pub fn max_tokens(kind: PromptKind, generation: &GenerationConfig) -> u32 {
    match kind {
        PromptKind::DailyCard => generation.daily_max_tokens,
        PromptKind::ThreeCards => generation.three_card_max_tokens,
        PromptKind::Clarify => generation.clarify_max_tokens,
    }
}

/// Build the user prompt for an action. An operator can override any
/// template by dropping `<key>.txt` into the prompts directory; overrides
/// use `{card}`, `{cards}` and `{question}` placeholders.
pub fn build_user_prompt(
    kind: PromptKind,
    card_names: &[String],
    question: Option<&str>,
    prompts_dir: &Path,
) -> String {
    let cards = card_names.join(", ");
    let question = question.unwrap_or("");

    if let Some(template) = load_override(kind, prompts_dir) {
        return template
            .replace("{card}", card_names.first().map(String::as_str).unwrap_or(""))
            .replace("{cards}", &cards)
            .replace("{question}", question)
            .trim()
            .to_string();
    }

    match kind {
        PromptKind::DailyCard => format!(
            "Context: card of the day. Card name: {}. \
             Highlight one key takeaway. Plain text only, no markup.",
            cards
        ),
        PromptKind::ThreeCards => format!(
            "The user asks: {}\nCards: {}. Describe the meaning of each card \
             and the combined conclusion. Plain text only, no markup.",
            question, cards
        ),
        PromptKind::Clarify => format!(
            "Context: a clarifying question about the card of the day.\n\
             Card: {}.\nQuestion: {}.\nPlain text only, no markup.",
            cards, question
        ),
    }
}

fn load_override(kind: PromptKind, prompts_dir: &Path) -> Option<String> {
    let path = prompts_dir.join(format!("{}.txt", kind.key()));
    if !path.exists() {
        return None;
    }
    std::fs::read_to_string(path).ok()
}

/// Deterministic non-empty text shown when the generator is unavailable.
/// The debit policy around fallbacks is handled by the workflow, not here.
pub fn fallback_text(kind: PromptKind, card_names: &[String]) -> String {
    let cards = card_names.join(", ");
    match kind {
        PromptKind::DailyCard => format!(
            "Your card of the day is {}. Take a quiet moment with it — \
             a fuller reading will be available shortly.",
            cards
        ),
        PromptKind::ThreeCards => format!(
            "Your spread is {}. Sit with the sequence from left to right — \
             a fuller reading will be available shortly.",
            cards
        ),
        PromptKind::Clarify => "The cards are quiet on this one right now. \
             Please ask again in a little while."
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn daily_template_names_the_card() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = build_user_prompt(
            PromptKind::DailyCard,
            &names(&["the sun"]),
            None,
            dir.path(),
        );
        assert!(prompt.contains("the sun"));
        assert!(prompt.contains("card of the day"));
    }

    #[test]
    fn three_card_template_carries_the_question() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = build_user_prompt(
            PromptKind::ThreeCards,
            &names(&["the sun", "the moon", "the star"]),
            Some("what about work?"),
            dir.path(),
        );
        assert!(prompt.contains("what about work?"));
        assert!(prompt.contains("the sun, the moon, the star"));
    }

    #[test]
    fn file_override_replaces_the_template() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("card_day.txt"), "Speak about {card} only.").unwrap();

        let prompt = build_user_prompt(
            PromptKind::DailyCard,
            &names(&["the tower"]),
            None,
            dir.path(),
        );
        assert_eq!(prompt, "Speak about the tower only.");
    }

    #[test]
    fn system_prompt_prefers_mode_override() {
        let mut generation = GenerationConfig::default();
        assert_eq!(
            resolve_system_prompt(PromptKind::DailyCard, &generation),
            DAY_SYSTEM_PROMPT
        );

        generation.base_system_prompt = Some("base".to_string());
        assert_eq!(resolve_system_prompt(PromptKind::DailyCard, &generation), "base");

        generation.day_system_prompt = Some("day".to_string());
        assert_eq!(resolve_system_prompt(PromptKind::DailyCard, &generation), "day");
        assert_eq!(resolve_system_prompt(PromptKind::Clarify, &generation), "day");
        assert_eq!(resolve_system_prompt(PromptKind::ThreeCards, &generation), "base");
    }

    #[test]
    fn fallbacks_are_never_empty() {
        for kind in [PromptKind::DailyCard, PromptKind::ThreeCards, PromptKind::Clarify] {
            assert!(!fallback_text(kind, &names(&["the fool"])).trim().is_empty());
        }
    }
}
