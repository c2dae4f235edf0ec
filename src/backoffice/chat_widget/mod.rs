//! The chat widget: presence and unread-message tracking for one signed-in user.
//!
//! The widget owns all of its state. Listeners and write commands run as spawned
//! tasks and report back through a bounded channel; state only changes when the
//! owner applies those events with [`ChatWidget::next_event`],
//! [`ChatWidget::wait_until`] or [`ChatWidget::settle`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::backoffice::change_streams::Topic;
use crate::backoffice::conversations::{Conversation, ConversationId, Message, NewMessage, visible_to};
use crate::backoffice::error::{BackofficeError, Result};
use crate::backoffice::error_events::{ErrorEvent, ErrorReporter, WriteOperation};
use crate::backoffice::notifications::Notifier;
use crate::backoffice::store::{ChatStore, StoreResult};
use crate::backoffice::subscriptions::{self, Subscription};
use crate::backoffice::unread::{UnreadCounts, reduce};
use crate::backoffice::users::{User, can_list_counterpart};


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetState {
    Closed,
    Open { selected: Option<String> },
}

/// Everything that reaches the widget from its background tasks.
#[derive(Debug, Clone)]
pub enum WidgetEvent {
    /// Conversations the viewer takes part in, and their unread counts.
    Conversations {
        conversations: Vec<Conversation>,
        unread: UnreadCounts,
    },

    /// The raw thread of one conversation, oldest first.
    Thread {
        conversation_id: ConversationId,
        messages: Vec<Message>,
    },

    /// A snapshot read failed. The widget keeps what it had.
    SubscriptionFailed { topic: Topic, error: String },

    /// A dispatched write finished. Failures were already reported.
    WriteCompleted {
        operation: WriteOperation,
        conversation_id: Option<ConversationId>,
        result: std::result::Result<(), String>,
    },
}

struct ActiveThread {
    counterpart_id: String,
    conversation_id: ConversationId,
    messages: Vec<Message>,
    subscription: Subscription,
}

pub struct ChatWidget {
    viewer: User,
    store: Arc<dyn ChatStore>,
    notifier: Notifier,
    reporter: ErrorReporter,
    muted: bool,
    open: bool,
    conversations: Vec<Conversation>,
    unread: UnreadCounts,
    last_total: Option<u32>,
    draft: String,
    thread: Option<ActiveThread>,
    events_tx: mpsc::Sender<WidgetEvent>,
    events_rx: mpsc::Receiver<WidgetEvent>,
    _conversations_subscription: Subscription,
}

impl std::fmt::Debug for ChatWidget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatWidget")
            .field("viewer", &self.viewer.id)
            .field("state", &self.state())
            .field("muted", &self.muted)
            .field("total_unread", &self.unread.total())
            .field("store", &"<REDACTED>")
            .finish()
    }
}

impl ChatWidget {
    /// Mounts the widget for `viewer` and starts listening to their conversations.
    /// The widget starts closed; badges update regardless.
    pub fn mount(
        viewer: User,
        store: Arc<dyn ChatStore>,
        notifier: Notifier,
        reporter: ErrorReporter,
        muted: bool,
        event_buffer: usize,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(event_buffer.max(1));
        let conversations_subscription =
            subscriptions::subscribe_conversations(store.clone(), &viewer.id, events_tx.clone());

        tracing::debug!(
            target: "backoffice_chat::chat_widget::mount",
            "Mounted chat widget for {}",
            viewer.id
        );

        Self {
            viewer,
            store,
            notifier,
            reporter,
            muted,
            open: false,
            conversations: Vec::new(),
            unread: UnreadCounts::default(),
            last_total: None,
            draft: String::new(),
            thread: None,
            events_tx,
            events_rx,
            _conversations_subscription: conversations_subscription,
        }
    }

    pub fn viewer(&self) -> &User {
        &self.viewer
    }

    pub fn state(&self) -> WidgetState {
        if !self.open {
            return WidgetState::Closed;
        }
        WidgetState::Open {
            selected: self.thread.as_ref().map(|t| t.counterpart_id.clone()),
        }
    }

    /// Opening only reveals the panel. Nothing is marked read until a conversation is selected.
    pub fn open(&mut self) {
        self.open = true;
    }

    /// Closes the panel, drops the thread listener and clears the selection.
    pub fn close(&mut self) {
        self.open = false;
        if let Some(thread) = self.thread.take() {
            tracing::debug!(
                target: "backoffice_chat::chat_widget::close",
                "Closing thread {} for {}",
                thread.conversation_id,
                self.viewer.id
            );
            thread.subscription.cancel();
        }
    }

    /// Users the viewer may chat with.
    pub async fn counterparts(&self) -> Result<Vec<User>> {
        let users = self.store.list_users().await?;
        Ok(users
            .into_iter()
            .filter(|u| can_list_counterpart(&self.viewer, u))
            .collect())
    }

    /// Selects the conversation with `counterpart_id`, replacing any previous selection.
    pub async fn select_counterpart(&mut self, counterpart_id: &str) -> Result<()> {
        if !self.open {
            return Err(BackofficeError::WidgetClosed);
        }
        if counterpart_id == self.viewer.id {
            return Err(BackofficeError::SelfConversation);
        }
        let counterpart = self
            .store
            .find_user(counterpart_id)
            .await?
            .ok_or_else(|| BackofficeError::UserNotFound(counterpart_id.to_string()))?;
        if !can_list_counterpart(&self.viewer, &counterpart) {
            return Err(BackofficeError::CounterpartNotAllowed {
                viewer: self.viewer.id.clone(),
                counterpart: counterpart.id,
            });
        }

        // The old listener must be gone before the new one starts
        if let Some(previous) = self.thread.take() {
            previous.subscription.cancel();
        }

        let conversation_id = ConversationId::for_pair(&self.viewer.id, &counterpart.id);
        let subscription =
            subscriptions::subscribe_thread(self.store.clone(), &conversation_id, self.events_tx.clone());
        tracing::debug!(
            target: "backoffice_chat::chat_widget::select_counterpart",
            "{} selected conversation {}",
            self.viewer.id,
            conversation_id
        );
        self.thread = Some(ActiveThread {
            counterpart_id: counterpart.id,
            conversation_id,
            messages: Vec::new(),
            subscription,
        });
        Ok(())
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Sends the draft to the selected counterpart. The draft is cleared right away;
    /// the write itself happens in the background. Blank drafts are dropped.
    pub fn submit(&mut self) -> Result<()> {
        if !self.open {
            return Err(BackofficeError::WidgetClosed);
        }
        let thread = self.thread.as_ref().ok_or(BackofficeError::NoConversationSelected)?;
        let text = std::mem::take(&mut self.draft);
        if text.trim().is_empty() {
            return Ok(());
        }

        let new_message = NewMessage::new(&self.viewer.id, &thread.counterpart_id, &text)?;
        let conversation_id = thread.conversation_id.clone();
        let store = self.store.clone();
        self.dispatch(WriteOperation::SendMessage, Some(conversation_id), async move {
            store.append_message(new_message).await.map(|_| ())
        });
        Ok(())
    }

    /// Hides a message of the selected conversation for the viewer only.
    pub fn delete_message(&self, message_id: &str) -> Result<()> {
        let thread = self.thread.as_ref().ok_or(BackofficeError::NoConversationSelected)?;
        let conversation_id = thread.conversation_id.clone();
        let store = self.store.clone();
        let viewer_id = self.viewer.id.clone();
        let message_id = message_id.to_string();
        self.dispatch(WriteOperation::SoftDelete, Some(conversation_id.clone()), async move {
            store.soft_delete(&conversation_id, &message_id, &viewer_id).await
        });
        Ok(())
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Mutes or unmutes the sound locally and persists the preference.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        let store = self.store.clone();
        let user_id = self.viewer.id.clone();
        self.dispatch(WriteOperation::SaveSettings, None, async move {
            let mut settings = store.chat_settings(&user_id).await?;
            settings.notifications_muted = muted;
            store.save_chat_settings(&settings).await
        });
    }

    pub fn unread_from(&self, counterpart_id: &str) -> u32 {
        self.unread.for_counterpart(counterpart_id)
    }

    pub fn total_unread(&self) -> u32 {
        self.unread.total()
    }

    /// Whether the first conversations snapshot has arrived.
    pub fn is_loaded(&self) -> bool {
        self.last_total.is_some()
    }

    /// The selected thread with the viewer's own deletions hidden.
    pub fn visible_thread(&self) -> Vec<&Message> {
        match &self.thread {
            Some(thread) => visible_to(&thread.messages, &self.viewer.id),
            None => Vec::new(),
        }
    }

    /// Waits for the next background event and applies it.
    pub async fn next_event(&mut self) -> Option<WidgetEvent> {
        let event = self.events_rx.recv().await?;
        self.apply(event.clone());
        Some(event)
    }

    /// Applies events until `predicate` holds or `timeout` elapses. Returns whether it held.
    pub async fn wait_until<F>(&mut self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&ChatWidget) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        while !predicate(self) {
            match tokio::time::timeout_at(deadline, self.events_rx.recv()).await {
                Ok(Some(event)) => self.apply(event),
                Ok(None) | Err(_) => return false,
            }
        }
        true
    }

    /// Applies events until none arrives for `quiet`.
    pub async fn settle(&mut self, quiet: Duration) {
        while let Ok(Some(event)) = tokio::time::timeout(quiet, self.events_rx.recv()).await {
            self.apply(event);
        }
    }

    fn apply(&mut self, event: WidgetEvent) {
        match event {
            WidgetEvent::Conversations { conversations, unread } => {
                let transition = reduce(self.last_total, &unread, self.muted);
                if transition.should_notify {
                    self.notifier.notify();
                }
                tracing::trace!(
                    target: "backoffice_chat::chat_widget::apply",
                    "{} has {} unread message(s)",
                    self.viewer.id,
                    transition.total
                );
                self.last_total = Some(transition.total);
                self.conversations = conversations;
                self.unread = unread;
            }
            WidgetEvent::Thread {
                conversation_id,
                messages,
            } => {
                let open = self.open;
                let viewer_id = self.viewer.id.clone();
                let Some(thread) = self
                    .thread
                    .as_mut()
                    .filter(|t| t.conversation_id == conversation_id)
                else {
                    tracing::trace!(
                        target: "backoffice_chat::chat_widget::apply",
                        "Ignoring stale snapshot of {}",
                        conversation_id
                    );
                    return;
                };
                thread.messages = messages;
                let has_unread = thread.messages.iter().any(|m| m.is_unread_for(&viewer_id));
                if open && has_unread {
                    self.mark_selected_read();
                }
            }
            WidgetEvent::SubscriptionFailed { topic, error } => {
                tracing::warn!(
                    target: "backoffice_chat::chat_widget::apply",
                    "Keeping previous state for {:?} after failed snapshot: {}",
                    topic,
                    error
                );
            }
            WidgetEvent::WriteCompleted { .. } => {}
        }
    }

    fn mark_selected_read(&self) {
        let Some(thread) = &self.thread else {
            return;
        };
        let conversation_id = thread.conversation_id.clone();
        let store = self.store.clone();
        let reader_id = self.viewer.id.clone();
        self.dispatch(WriteOperation::MarkRead, Some(conversation_id.clone()), async move {
            store.mark_read(&conversation_id, &reader_id).await.map(|_| ())
        });
    }

    /// Runs a write in the background. Failures go to the error reporter, and the
    /// outcome comes back as [`WidgetEvent::WriteCompleted`].
    fn dispatch<F>(&self, operation: WriteOperation, conversation_id: Option<ConversationId>, write: F)
    where
        F: Future<Output = StoreResult<()>> + Send + 'static,
    {
        let events = self.events_tx.clone();
        let reporter = self.reporter.clone();
        let user_id = self.viewer.id.clone();
        tokio::spawn(async move {
            let result = write.await.map_err(|e| e.to_string());
            if let Err(message) = &result {
                reporter.report(ErrorEvent {
                    operation,
                    user_id,
                    conversation_id: conversation_id.clone(),
                    message: message.clone(),
                    occurred_at: Utc::now(),
                });
            }
            let _ = events
                .send(WidgetEvent::WriteCompleted {
                    operation,
                    conversation_id,
                    result,
                })
                .await;
        });
    }
}
