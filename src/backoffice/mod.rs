use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

pub mod change_streams;
pub mod chat_settings;
pub mod chat_widget;
pub mod conversations;
pub mod database;
pub mod error;
pub mod error_events;
pub mod notifications;
pub mod store;
mod subscriptions;
pub mod unread;
pub mod users;

use crate::init_tracing;

use chat_widget::ChatWidget;
use database::Database;
use error::{BackofficeError, Result};
use error_events::{ErrorEvent, ErrorReporter};
use notifications::{Notifier, SoundPlayer};
use store::{ChatStore, SqliteChatStore};

const DEFAULT_EVENT_BUFFER: usize = 64;

#[derive(Clone, Debug)]
pub struct BackofficeConfig {
    /// Directory for application data
    pub data_dir: PathBuf,

    /// Directory for application logs
    pub logs_dir: PathBuf,

    /// Capacity of each chat widget's event channel
    pub event_buffer: usize,
}

impl BackofficeConfig {
    pub fn new(data_dir: &Path, logs_dir: &Path) -> Self {
        let env_suffix = if cfg!(debug_assertions) {
            "dev"
        } else {
            "release"
        };

        Self {
            data_dir: data_dir.join(env_suffix),
            logs_dir: logs_dir.join(env_suffix),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    /// Reads `BACKOFFICE_DATA_DIR` and, optionally, `BACKOFFICE_LOGS_DIR`, loading
    /// a `.env` file first if there is one. Logs default to `<data dir>/logs`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let data_dir = std::env::var("BACKOFFICE_DATA_DIR")
            .map(PathBuf::from)
            .map_err(|_| BackofficeError::Configuration("BACKOFFICE_DATA_DIR is not set".to_string()))?;
        let logs_dir = std::env::var("BACKOFFICE_LOGS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("logs"));

        Ok(Self::new(&data_dir, &logs_dir))
    }

    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer;
        self
    }
}

pub struct Backoffice {
    pub config: BackofficeConfig,
    database: Arc<Database>,
    store: Arc<SqliteChatStore>,
    error_reporter: ErrorReporter,
}

impl std::fmt::Debug for Backoffice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backoffice")
            .field("config", &self.config)
            .field("database", &"<REDACTED>")
            .field("store", &self.store)
            .finish()
    }
}

impl Backoffice {
    /// Initializes the back office with the provided configuration.
    ///
    /// Creates the data and log directories, sets up logging, opens the database
    /// (running any pending migrations) and builds the chat store.
    pub async fn initialize(config: BackofficeConfig) -> Result<Self> {
        let data_dir = &config.data_dir;
        let logs_dir = &config.logs_dir;

        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))
            .map_err(BackofficeError::from)?;
        std::fs::create_dir_all(logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))
            .map_err(BackofficeError::from)?;

        // Only initialize tracing once
        init_tracing(logs_dir);

        tracing::debug!(
            target: "backoffice_chat::initialize",
            "Logging initialized in directory: {:?}",
            logs_dir
        );

        let database = Arc::new(Database::new(data_dir.join("backoffice.sqlite")).await?);
        let store = Arc::new(SqliteChatStore::new(database.clone()));

        tracing::info!(
            target: "backoffice_chat::initialize",
            "Back office initialized with data directory {:?}",
            data_dir
        );

        Ok(Self {
            config,
            database,
            store,
            error_reporter: ErrorReporter::new(),
        })
    }

    /// Mounts a chat widget for `user_id` with their saved mute preference.
    pub async fn mount_chat_widget(&self, user_id: &str, player: Arc<dyn SoundPlayer>) -> Result<ChatWidget> {
        let viewer = self.find_user(user_id).await?;
        let settings = self.store.chat_settings(user_id).await?;
        let store: Arc<dyn ChatStore> = self.store.clone();
        Ok(ChatWidget::mount(
            viewer,
            store,
            Notifier::new(player),
            self.error_reporter.clone(),
            settings.notifications_muted,
            self.config.event_buffer,
        ))
    }

    /// Failures of background writes from every widget mounted on this back office.
    pub fn error_events(&self) -> tokio::sync::broadcast::Receiver<ErrorEvent> {
        self.error_reporter.subscribe()
    }

    /// Deletes every user, conversation, message and setting.
    pub async fn delete_all_data(&self) -> Result<()> {
        tracing::warn!(
            target: "backoffice_chat::delete_all_data",
            "Deleting all chat data in {:?}",
            self.database.path
        );
        self.database.delete_all_data().await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backoffice::notifications::tests::RecordingPlayer;
    use crate::backoffice::users::Role;
    use tempfile::TempDir;

    pub(crate) async fn create_test_backoffice() -> (Backoffice, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = BackofficeConfig::new(&dir.path().join("data"), &dir.path().join("logs"));
        let backoffice = Backoffice::initialize(config).await.unwrap();
        backoffice.register_user("ana", "Ana", Role::Admin).await.unwrap();
        backoffice.register_user("bruno", "Bruno", Role::Staff).await.unwrap();
        backoffice.register_user("caio", "Caio", Role::Supervisor).await.unwrap();
        (backoffice, dir)
    }

    #[test]
    fn test_config_appends_build_suffix() {
        let config = BackofficeConfig::new(Path::new("/tmp/data"), Path::new("/tmp/logs"));
        let suffix = if cfg!(debug_assertions) { "dev" } else { "release" };
        assert_eq!(config.data_dir, Path::new("/tmp/data").join(suffix));
        assert_eq!(config.logs_dir, Path::new("/tmp/logs").join(suffix));
        assert_eq!(config.event_buffer, DEFAULT_EVENT_BUFFER);
        assert_eq!(config.with_event_buffer(8).event_buffer, 8);
    }

    #[tokio::test]
    async fn test_initialize_creates_directories_and_database() {
        let (backoffice, _dir) = create_test_backoffice().await;
        assert!(backoffice.config.data_dir.join("backoffice.sqlite").exists());
        assert!(backoffice.config.logs_dir.exists());
    }

    #[tokio::test]
    async fn test_list_counterparts_follows_roles() {
        let (backoffice, _dir) = create_test_backoffice().await;

        let for_admin: Vec<String> = backoffice
            .list_counterparts("ana")
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(for_admin, vec!["bruno", "caio"]);

        let for_staff: Vec<String> = backoffice
            .list_counterparts("bruno")
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(for_staff, vec!["ana", "caio"]);
    }

    #[tokio::test]
    async fn test_register_user_rejects_separator() {
        let (backoffice, _dir) = create_test_backoffice().await;
        assert!(matches!(
            backoffice.register_user("ana_maria", "Ana Maria", Role::Staff).await,
            Err(BackofficeError::InvalidUserId(_))
        ));
    }

    #[tokio::test]
    async fn test_soft_delete_hidden_for_sender_but_in_audit() {
        let (backoffice, _dir) = create_test_backoffice().await;
        let message = backoffice.send_message("ana", "bruno", "Olá").await.unwrap();
        backoffice
            .soft_delete_message("ana", "bruno", &message.id)
            .await
            .unwrap();

        assert!(backoffice.visible_thread("ana", "bruno").await.unwrap().is_empty());
        assert_eq!(backoffice.visible_thread("bruno", "ana").await.unwrap().len(), 1);
        assert_eq!(backoffice.audit_thread("ana", "ana", "bruno").await.unwrap().len(), 1);
        assert!(matches!(
            backoffice.audit_thread("caio", "ana", "bruno").await,
            Err(BackofficeError::NotAuthorized)
        ));
    }

    #[tokio::test]
    async fn test_mark_conversation_read_is_idempotent() {
        let (backoffice, _dir) = create_test_backoffice().await;
        backoffice.send_message("ana", "bruno", "Olá").await.unwrap();
        backoffice.send_message("ana", "bruno", "Tudo bem?").await.unwrap();

        assert_eq!(backoffice.mark_conversation_read("bruno", "ana").await.unwrap(), 2);
        assert_eq!(backoffice.mark_conversation_read("bruno", "ana").await.unwrap(), 0);
        // The sender reading their own outgoing messages changes nothing
        assert_eq!(backoffice.mark_conversation_read("ana", "bruno").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mount_uses_saved_mute_preference() {
        let (backoffice, _dir) = create_test_backoffice().await;
        backoffice.set_notifications_muted("bruno", true).await.unwrap();

        let widget = backoffice
            .mount_chat_widget("bruno", Arc::new(RecordingPlayer::default()))
            .await
            .unwrap();
        assert!(widget.is_muted());

        assert!(matches!(
            backoffice
                .mount_chat_widget("nobody", Arc::new(RecordingPlayer::default()))
                .await,
            Err(BackofficeError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_all_data() {
        let (backoffice, _dir) = create_test_backoffice().await;
        backoffice.send_message("ana", "bruno", "Olá").await.unwrap();
        backoffice.delete_all_data().await.unwrap();
        assert!(matches!(
            backoffice.find_user("ana").await,
            Err(BackofficeError::UserNotFound(_))
        ));
    }
}
