//! Storage boundaries: chat history, chat users, restaurant directory.
//!
//! The relational store sits outside this subsystem; it is reachable only
//! through the traits here. The in-memory implementations back the service in
//! demo mode and the tests.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

use matjip_common::Result;

use crate::message::{ChatMessage, MessageType};

// ============================================================================
// Chat Messages
// ============================================================================

/// Message fields before the store assigns an id and timestamp.
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub room_id: i64,
    pub sender_id: String,
    pub sender_nickname: String,
    pub content: String,
    pub message_type: MessageType,
}

/// Persistent chat history, reached through create/read only.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message, assigning id and creation time.
    async fn save(&self, message: NewChatMessage) -> Result<ChatMessage>;

    /// Up to `limit` messages of a room older than `before_id`, newest first.
    async fn recent_before(&self, room_id: i64, before_id: i64, limit: usize)
        -> Result<Vec<ChatMessage>>;
}

/// In-memory message store.
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<ChatMessage>>,
    next_id: AtomicI64,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn save(&self, message: NewChatMessage) -> Result<ChatMessage> {
        let saved = ChatMessage {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            room_id: message.room_id,
            sender_id: message.sender_id,
            sender_nickname: message.sender_nickname,
            content: message.content,
            message_type: message.message_type,
            created_at: Utc::now(),
        };
        self.messages.write().await.push(saved.clone());
        Ok(saved)
    }

    async fn recent_before(
        &self,
        room_id: i64,
        before_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        let messages = self.messages.read().await;
        let mut recent: Vec<ChatMessage> = messages
            .iter()
            .filter(|m| m.room_id == room_id && m.id < before_id)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.id.cmp(&a.id));
        recent.truncate(limit);
        Ok(recent)
    }
}

// ============================================================================
// Chat Users
// ============================================================================

/// Known chat users, created lazily on first message.
#[async_trait]
pub trait ChatUserStore: Send + Sync {
    async fn upsert(&self, user_id: &str, nickname: &str) -> Result<()>;
}

/// In-memory user store.
#[derive(Default)]
pub struct InMemoryChatUserStore {
    users: DashMap<String, String>,
}

impl InMemoryChatUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl ChatUserStore for InMemoryChatUserStore {
    async fn upsert(&self, user_id: &str, nickname: &str) -> Result<()> {
        self.users
            .insert(user_id.to_string(), nickname.to_string());
        Ok(())
    }
}

// ============================================================================
// Restaurants
// ============================================================================

/// Restaurant entry as stored in the directory. `keywords` is a comma-joined
/// keyword string, e.g. "판교,삼겹살,회식".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub location_text: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub rating: Option<f64>,
    pub image_url: Option<String>,
    pub distance_text: Option<String>,
}

impl Restaurant {
    /// Substring match against the keyword string.
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        self.keywords
            .as_deref()
            .is_some_and(|k| k.contains(keyword))
    }
}

/// Lookup collaborator for the recommendation phase.
#[async_trait]
pub trait RestaurantDirectory: Send + Sync {
    /// Every restaurant whose keyword string contains `keyword`.
    async fn find_by_keyword(&self, keyword: &str) -> Result<Vec<Restaurant>>;

    /// Arbitrary bounded sample of the whole directory.
    async fn sample(&self, limit: usize) -> Result<Vec<Restaurant>>;
}

/// In-memory restaurant directory.
pub struct InMemoryRestaurantDirectory {
    restaurants: Vec<Restaurant>,
}

impl InMemoryRestaurantDirectory {
    pub fn new(restaurants: Vec<Restaurant>) -> Self {
        Self { restaurants }
    }

    /// Small built-in directory for demo mode.
    pub fn with_demo_seed() -> Self {
        let seed = [
            ("백년옥 판교점", "한식 • 백반", "판교역 2번 출구", "판교,한식,백반,점심,혼밥"),
            ("스시메모리", "일식 • 스시", "판교 테크원타워 1층", "판교,일식,스시,점심,저녁"),
            ("화로상회", "한식 • 고기", "판교 유스페이스 앞", "판교,한식,삼겹살,회식,저녁"),
            ("퍼기우든", "양식 • 파스타", "강남역 11번 출구", "강남,양식,파스타,데이트,분위기"),
            ("교자만두집", "중식 • 만두", "강남 교보타워 뒤", "강남,중식,만두,저렴한,점심"),
            ("카페 온도", "카페 • 브런치", "합정역 7번 출구", "합정,카페,브런치,디저트"),
        ];

        let restaurants = seed
            .iter()
            .enumerate()
            .map(|(i, (name, category, location, keywords))| Restaurant {
                id: i as i64 + 1,
                name: (*name).into(),
                category: Some((*category).into()),
                location_text: Some((*location).into()),
                description: None,
                keywords: Some((*keywords).into()),
                rating: Some(4.5),
                image_url: None,
                distance_text: None,
            })
            .collect();

        Self::new(restaurants)
    }
}

#[async_trait]
impl RestaurantDirectory for InMemoryRestaurantDirectory {
    async fn find_by_keyword(&self, keyword: &str) -> Result<Vec<Restaurant>> {
        Ok(self
            .restaurants
            .iter()
            .filter(|r| r.matches_keyword(keyword))
            .cloned()
            .collect())
    }

    async fn sample(&self, limit: usize) -> Result<Vec<Restaurant>> {
        use rand::seq::SliceRandom;

        let mut rng = rand::thread_rng();
        Ok(self
            .restaurants
            .choose_multiple(&mut rng, limit)
            .cloned()
            .collect())
    }
}
