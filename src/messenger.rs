use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use colored::*;
use serde::{Deserialize, Serialize};

/// Result of an external channel-membership lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Member,
    Left,
    Kicked,
    Other,
}

impl std::fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MembershipStatus::Member => write!(f, "member"),
            MembershipStatus::Left => write!(f, "left"),
            MembershipStatus::Kicked => write!(f, "kicked"),
            MembershipStatus::Other => write!(f, "other"),
        }
    }
}

/// Outbound chat transport. The engine only ever needs to show text and
/// images, offer a small set of buttons, and ask about channel membership;
/// everything transport-specific stays behind this seam.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn show_text(&self, user_id: &str, text: &str) -> Result<()>;

    async fn show_image(&self, user_id: &str, image: &Path, caption: Option<&str>) -> Result<()>;

    /// Multi-card draws are presented as one composite message.
    async fn show_collage(
        &self,
        user_id: &str,
        images: &[PathBuf],
        caption: Option<&str>,
    ) -> Result<()>;

    async fn prompt_buttons(&self, user_id: &str, text: &str, options: &[String]) -> Result<()>;

    async fn membership_status(&self, channel: &str, user_id: &str) -> Result<MembershipStatus>;
}

/// Console transport used by the interactive shell and the one-shot CLI
/// commands.
pub struct ConsoleMessenger;

#[async_trait]
impl Messenger for ConsoleMessenger {
    async fn show_text(&self, _user_id: &str, text: &str) -> Result<()> {
        println!("{}", text);
        Ok(())
    }

    async fn show_image(&self, _user_id: &str, image: &Path, caption: Option<&str>) -> Result<()> {
        match caption {
            Some(caption) => println!(
                "🎴 {} {}",
                caption.cyan().bold(),
                image.display().to_string().dimmed()
            ),
            None => println!("🎴 {}", image.display().to_string().dimmed()),
        }
        Ok(())
    }

    async fn show_collage(
        &self,
        _user_id: &str,
        images: &[PathBuf],
        caption: Option<&str>,
    ) -> Result<()> {
        if let Some(caption) = caption {
            println!("🎴 {}", caption.cyan().bold());
        }
        for image in images {
            println!("   {}", image.display().to_string().dimmed());
        }
        Ok(())
    }

    async fn prompt_buttons(&self, _user_id: &str, text: &str, options: &[String]) -> Result<()> {
        println!("{}", text);
        for (i, option) in options.iter().enumerate() {
            println!("  {}. {}", (i + 1).to_string().cyan(), option);
        }
        Ok(())
    }

    /// The console session has no channel to check against; the local
    /// operator counts as a member.
    async fn membership_status(&self, _channel: &str, _user_id: &str) -> Result<MembershipStatus> {
        Ok(MembershipStatus::Member)
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use anyhow::anyhow;

    use super::*;

    /// Recording messenger for workflow, referral and subscription tests.
    /// A `membership` of `None` simulates a failing external lookup.
    pub struct MockMessenger {
        pub texts: Mutex<Vec<(String, String)>>,
        pub shown_images: Mutex<Vec<(String, usize)>>,
        pub button_prompts: Mutex<Vec<(String, String, Vec<String>)>>,
        pub membership: Mutex<Option<MembershipStatus>>,
        pub fail_show_text: AtomicBool,
    }

    impl MockMessenger {
        pub fn new() -> Self {
            MockMessenger {
                texts: Mutex::new(Vec::new()),
                shown_images: Mutex::new(Vec::new()),
                button_prompts: Mutex::new(Vec::new()),
                membership: Mutex::new(Some(MembershipStatus::Member)),
                fail_show_text: AtomicBool::new(false),
            }
        }

        pub fn with_membership(status: Option<MembershipStatus>) -> Self {
            let messenger = Self::new();
            *messenger.membership.lock().unwrap() = status;
            messenger
        }

        pub fn texts_for(&self, user_id: &str) -> Vec<String> {
            self.texts
                .lock()
                .unwrap()
                .iter()
                .filter(|(user, _)| user == user_id)
                .map(|(_, text)| text.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Messenger for MockMessenger {
        async fn show_text(&self, user_id: &str, text: &str) -> Result<()> {
            if self.fail_show_text.load(Ordering::SeqCst) {
                return Err(anyhow!("transport unavailable"));
            }
            self.texts
                .lock()
                .unwrap()
                .push((user_id.to_string(), text.to_string()));
            Ok(())
        }

        async fn show_image(
            &self,
            user_id: &str,
            _image: &Path,
            _caption: Option<&str>,
        ) -> Result<()> {
            self.shown_images
                .lock()
                .unwrap()
                .push((user_id.to_string(), 1));
            Ok(())
        }

        async fn show_collage(
            &self,
            user_id: &str,
            images: &[PathBuf],
            _caption: Option<&str>,
        ) -> Result<()> {
            self.shown_images
                .lock()
                .unwrap()
                .push((user_id.to_string(), images.len()));
            Ok(())
        }

        async fn prompt_buttons(
            &self,
            user_id: &str,
            text: &str,
            options: &[String],
        ) -> Result<()> {
            self.button_prompts.lock().unwrap().push((
                user_id.to_string(),
                text.to_string(),
                options.to_vec(),
            ));
            Ok(())
        }

        async fn membership_status(
            &self,
            _channel: &str,
            _user_id: &str,
        ) -> Result<MembershipStatus> {
            (*self.membership.lock().unwrap()).ok_or_else(|| anyhow!("membership lookup failed"))
        }
    }
}
