//! Chat message ingestion.
//!
//! Persists an inbound message, broadcasts it to its room and, for ordinary
//! conversation, hands it to the recommendation pipeline without waiting on
//! the analysis call.

use std::sync::Arc;

use matjip_common::Result;

use crate::dispatch::Dispatcher;
use crate::message::{InboundChatMessage, MessageType, Payload};
use crate::store::{ChatUserStore, MessageStore, NewChatMessage};
use crate::suggest::SuggestionService;

pub struct ChatService {
    messages: Arc<dyn MessageStore>,
    users: Arc<dyn ChatUserStore>,
    dispatcher: Arc<Dispatcher>,
    suggestions: Arc<SuggestionService>,
}

impl ChatService {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        users: Arc<dyn ChatUserStore>,
        dispatcher: Arc<Dispatcher>,
        suggestions: Arc<SuggestionService>,
    ) -> Self {
        Self {
            messages,
            users,
            dispatcher,
            suggestions,
        }
    }

    /// Handle one inbound chat message. Sender identity comes from the
    /// session binding established at connect time.
    ///
    /// Returns as soon as the message is stored and broadcast; any triggered
    /// analysis runs on its own task.
    pub async fn handle_chat_message(
        &self,
        inbound: InboundChatMessage,
        sender_id: &str,
        sender_nickname: &str,
    ) -> Result<()> {
        self.users.upsert(sender_id, sender_nickname).await?;

        let saved = self
            .messages
            .save(NewChatMessage {
                room_id: inbound.room_id,
                sender_id: sender_id.to_string(),
                sender_nickname: sender_nickname.to_string(),
                content: inbound.content,
                message_type: inbound.message_type.unwrap_or(MessageType::Talk),
            })
            .await?;

        self.dispatcher
            .broadcast_to_room(saved.room_id, Payload::Chat(saved.clone()));

        tracing::info!(
            room_id = saved.room_id,
            sender_id = %sender_id,
            message_type = ?saved.message_type,
            "Message broadcasted"
        );

        if saved.message_type == MessageType::Talk {
            self.suggestions.spawn_analysis(saved);
        }

        Ok(())
    }
}
