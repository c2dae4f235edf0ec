//! Snapshot listeners.
//!
//! A listener registers on a [`Topic`], reads a full snapshot, forwards it to the
//! widget's event channel, then waits for the next change notice and repeats.

use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backoffice::change_streams::Topic;
use crate::backoffice::chat_widget::WidgetEvent;
use crate::backoffice::conversations::ConversationId;
use crate::backoffice::store::{ChatStore, StoreResult};
use crate::backoffice::unread::UnreadCounts;

/// Handle to a running listener. Cancelling or dropping it stops the listener.
#[derive(Debug)]
pub(crate) struct Subscription {
    topic: Topic,
    handle: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }

    pub(crate) fn cancel(self) {
        tracing::trace!(
            target: "backoffice_chat::subscriptions",
            "Cancelling listener for {:?} (active: {})",
            self.topic,
            self.is_active()
        );
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

enum Snapshot {
    Conversations { user_id: String },
    Thread { conversation_id: ConversationId },
}

impl Snapshot {
    fn topic(&self) -> Topic {
        match self {
            Snapshot::Conversations { user_id } => Topic::Participant(user_id.clone()),
            Snapshot::Thread { conversation_id } => Topic::Conversation(conversation_id.clone()),
        }
    }

    async fn read(&self, store: &dyn ChatStore) -> StoreResult<WidgetEvent> {
        match self {
            Snapshot::Conversations { user_id } => {
                let conversations = store.conversations_for(user_id).await?;
                let unread_messages = store.unread_messages_for(user_id).await?;
                Ok(WidgetEvent::Conversations {
                    conversations,
                    unread: UnreadCounts::tally(user_id, &unread_messages),
                })
            }
            Snapshot::Thread { conversation_id } => Ok(WidgetEvent::Thread {
                conversation_id: conversation_id.clone(),
                messages: store.thread(conversation_id).await?,
            }),
        }
    }
}

/// Listens to every conversation `user_id` takes part in, and to the unread
/// messages addressed to them.
pub(crate) fn subscribe_conversations(
    store: Arc<dyn ChatStore>,
    user_id: &str,
    events: mpsc::Sender<WidgetEvent>,
) -> Subscription {
    spawn_listener(
        store,
        Snapshot::Conversations {
            user_id: user_id.to_string(),
        },
        events,
    )
}

/// Listens to the messages of one conversation, oldest first.
pub(crate) fn subscribe_thread(
    store: Arc<dyn ChatStore>,
    conversation_id: &ConversationId,
    events: mpsc::Sender<WidgetEvent>,
) -> Subscription {
    spawn_listener(
        store,
        Snapshot::Thread {
            conversation_id: conversation_id.clone(),
        },
        events,
    )
}

fn spawn_listener(
    store: Arc<dyn ChatStore>,
    snapshot: Snapshot,
    events: mpsc::Sender<WidgetEvent>,
) -> Subscription {
    let topic = snapshot.topic();
    // Registered before the first read so no change slips in between
    let mut receiver = store.watch(&topic);
    let listener_topic = topic.clone();

    let handle = tokio::spawn(async move {
        loop {
            let event = match snapshot.read(store.as_ref()).await {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(
                        target: "backoffice_chat::subscriptions",
                        "Snapshot read failed for {:?}: {}",
                        listener_topic,
                        e
                    );
                    WidgetEvent::SubscriptionFailed {
                        topic: listener_topic.clone(),
                        error: e.to_string(),
                    }
                }
            };

            if events.send(event).await.is_err() {
                tracing::debug!(
                    target: "backoffice_chat::subscriptions",
                    "Widget gone, stopping listener for {:?}",
                    listener_topic
                );
                break;
            }

            match receiver.recv().await {
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(
                        target: "backoffice_chat::subscriptions",
                        "Listener for {:?} lagged by {} notices, re-reading",
                        listener_topic,
                        skipped
                    );
                }
                Err(RecvError::Closed) => break,
            }

            // One re-read covers every notice already queued
            loop {
                match receiver.try_recv() {
                    Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
        }
    });

    Subscription { topic, handle }
}
