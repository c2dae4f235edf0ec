use std::sync::{Mutex, OnceLock};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt::Layer, prelude::*, registry::Registry};

mod backoffice;

pub use crate::backoffice::change_streams::{ChangeKind, ChangeNotice, Topic};
pub use crate::backoffice::chat_settings::ChatSettings;
pub use crate::backoffice::chat_widget::{ChatWidget, WidgetEvent, WidgetState};
pub use crate::backoffice::conversations::{
    Conversation, ConversationId, Message, NewMessage, visible_to,
};
pub use crate::backoffice::database::{Database, DatabaseError};
pub use crate::backoffice::error::{BackofficeError, Result};
pub use crate::backoffice::error_events::{ErrorEvent, ErrorReporter, WriteOperation};
pub use crate::backoffice::notifications::{
    NotificationError, Notifier, SoundPlayer, TerminalBell,
};
pub use crate::backoffice::store::{ChatStore, SqliteChatStore, StoreError};
pub use crate::backoffice::unread::{UnreadCounts, UnreadTransition, reduce};
pub use crate::backoffice::users::{Role, User, can_list_counterpart};
pub use crate::backoffice::{Backoffice, BackofficeConfig};

static TRACING_GUARDS: OnceLock<Mutex<Option<(WorkerGuard, WorkerGuard)>>> = OnceLock::new();
static TRACING_INIT: OnceLock<()> = OnceLock::new();

pub(crate) fn init_tracing(logs_dir: &std::path::Path) {
    TRACING_INIT.get_or_init(|| {
        let file_appender = match tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix("backoffice-chat")
            .filename_suffix("log")
            .build(logs_dir)
        {
            Ok(appender) => appender,
            Err(e) => {
                eprintln!("Failed to create log file appender: {e}");
                return;
            }
        };

        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
        let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

        TRACING_GUARDS
            .set(Mutex::new(Some((file_guard, stdout_guard))))
            .ok();

        let stdout_layer = Layer::new()
            .with_writer(non_blocking_stdout)
            .with_ansi(true)
            .with_target(true);

        let file_layer = Layer::new()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_target(true);

        // Another subscriber may already be installed (e.g. by a test harness)
        let _ = Registry::default()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(stdout_layer)
            .with(file_layer)
            .try_init();
    });
}
