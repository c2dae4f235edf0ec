use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backoffice::Backoffice;
use crate::backoffice::error::Result;
use crate::backoffice::store::ChatStore;

/// Per-user chat preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSettings {
    pub user_id: String,
    pub notifications_muted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSettings {
    pub fn new(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            notifications_muted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Backoffice {
    pub async fn chat_settings(&self, user_id: &str) -> Result<ChatSettings> {
        self.find_user(user_id).await?;
        Ok(self.store.chat_settings(user_id).await?)
    }

    /// Mutes or unmutes the unread notification sound for `user_id`.
    ///
    /// Widgets read the preference when mounted; a mounted widget changes it through
    /// [`crate::ChatWidget::set_muted`].
    pub async fn set_notifications_muted(&self, user_id: &str, muted: bool) -> Result<()> {
        let mut settings = self.chat_settings(user_id).await?;
        settings.notifications_muted = muted;
        self.store.save_chat_settings(&settings).await?;
        Ok(())
    }
}
