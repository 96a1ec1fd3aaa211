//! Wire types for chat and recommendation traffic.
//!
//! Everything that crosses the WebSocket is defined here: the broadcast chat
//! message, the two-phase recommendation payloads (prompt, card) and the
//! error notice. Field names follow the frontend contract (camelCase, a
//! `type` discriminator string on every server-originated payload).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Chat Messages
// ============================================================================

/// Chat message type.
///
/// - `Talk`: ordinary conversation, the only type that triggers analysis
/// - `Enter`: user joined the room
/// - `Suggest`: recommendation traffic originated by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Talk,
    Enter,
    Suggest,
}

/// Chat message as broadcast to a room after persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Assigned by the message store.
    pub id: i64,
    pub room_id: i64,
    pub sender_id: String,
    pub sender_nickname: String,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
}

/// Chat message as received from a client. Sender identity comes from the
/// session binding, never from the frame itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundChatMessage {
    pub room_id: i64,
    pub content: String,
    #[serde(rename = "type", default)]
    pub message_type: Option<MessageType>,
}

/// Frames a connected client may send over the socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ClientFrame {
    /// Publish a chat message to a room.
    Message(InboundChatMessage),
    /// Redeem a recommendation token received in a prompt.
    #[serde(rename_all = "camelCase")]
    RequestRecommendation { analysis_id: String },
}

// ============================================================================
// Recommendation Payloads
// ============================================================================

/// "A recommendation is available" notification, sent after a positive
/// analysis verdict. The client uses `analysisId` to redeem it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationPrompt {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
    pub analysis_id: String,
    pub location: Option<String>,
    pub meal_type: Option<String>,
    pub confidence: f64,
    /// Clock label, e.g. "오후 2:30".
    pub time: String,
}

/// One restaurant entry inside a recommendation card.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantCard {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub location_text: Option<String>,
    pub description: Option<String>,
    pub rating: f64,
    /// Duplicate of `locationText` under the name the frontend expects.
    pub address: Option<String>,
    pub image: String,
    pub distance: String,
}

/// Card body: title, header image, restaurant list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardData {
    pub title: String,
    pub image: String,
    pub restaurants: Vec<RestaurantCard>,
}

/// Recommendation result delivered after a successful fulfillment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
    pub card_data: CardData,
    pub time: String,
}

/// User-visible rejection or failure notice. Carries the target user id so
/// broadcast-mode clients can filter out notices meant for someone else.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorNotice {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
    pub user_id: String,
    pub time: String,
}

impl RecommendationPrompt {
    pub const KIND: &'static str = "recommendation-prompt";
}

impl Suggestion {
    pub const KIND: &'static str = "card";
}

impl ErrorNotice {
    pub const KIND: &'static str = "error";

    pub fn new(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: Self::KIND,
            message: message.into(),
            user_id: user_id.into(),
            time: matjip_common::util::now_clock_label(),
        }
    }
}

// ============================================================================
// Unified Outbound Payload
// ============================================================================

/// Everything the dispatcher can put on a room channel or a session queue.
/// Untagged: every variant already carries its own `type` discriminator.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Chat(ChatMessage),
    Prompt(RecommendationPrompt),
    Card(Suggestion),
    Error(ErrorNotice),
}
