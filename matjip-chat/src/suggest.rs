//! Two-phase recommendation orchestrator.
//!
//! Phase 1 (`spawn_analysis`): runs off the ingestion path, asks the analysis
//! gateway whether the conversation wants a restaurant recommendation, and on
//! a confident positive verdict caches a correlation record and notifies the
//! user that a recommendation is available.
//!
//! Phase 2 (`provide_recommendation`): redeems the token exactly once,
//! resolves restaurants through a three-tier fallback and delivers a card.
//! Every failure becomes a user-visible notice; nothing here can take the
//! process down.

use std::sync::Arc;

use tokio::sync::Semaphore;

use matjip_common::util::now_clock_label;

use crate::correlation::{CorrelationStore, TakeError};
use crate::dispatch::Dispatcher;
use crate::gateway::{AnalysisGateway, Verdict};
use crate::message::{
    CardData, ChatMessage, ErrorNotice, Payload, RecommendationPrompt, RestaurantCard, Suggestion,
};
use crate::store::{MessageStore, Restaurant, RestaurantDirectory};

/// How many prior messages feed the analysis context.
pub const CONTEXT_MESSAGE_LIMIT: usize = 10;

/// Minimum confidence for a verdict to become a prompt.
pub const CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Cap applied to each lookup tier.
pub const RESULT_LIMIT: usize = 5;

/// Room that carries recommendation traffic in broadcast mode.
pub const DEFAULT_ROOM_ID: i64 = 1;

/// Upper bound on concurrently running analysis calls, so a message burst
/// cannot grow gateway workers without limit.
const MAX_CONCURRENT_ANALYSES: usize = 8;

const CARD_IMAGE: &str = "/images/restaurant-map.jpg";
const PLACEHOLDER_IMAGE: &str = "/images/placeholder-restaurant.jpg";

/// Drives the two-phase recommendation protocol.
pub struct SuggestionService {
    gateway: Arc<dyn AnalysisGateway>,
    cache: Arc<CorrelationStore>,
    dispatcher: Arc<Dispatcher>,
    messages: Arc<dyn MessageStore>,
    restaurants: Arc<dyn RestaurantDirectory>,
    analysis_permits: Arc<Semaphore>,
}

impl SuggestionService {
    pub fn new(
        gateway: Arc<dyn AnalysisGateway>,
        cache: Arc<CorrelationStore>,
        dispatcher: Arc<Dispatcher>,
        messages: Arc<dyn MessageStore>,
        restaurants: Arc<dyn RestaurantDirectory>,
    ) -> Self {
        Self {
            gateway,
            cache,
            dispatcher,
            messages,
            restaurants,
            analysis_permits: Arc::new(Semaphore::new(MAX_CONCURRENT_ANALYSES)),
        }
    }

    // ------------------------------------------------------------------
    // Phase 1: analysis
    // ------------------------------------------------------------------

    /// Kick off analysis for a freshly ingested message. Fire-and-forget:
    /// the caller returns immediately, the pipeline continues on its own
    /// task. There is no way to cancel an analysis once started; if the user
    /// disconnects meanwhile, the record simply expires unconsumed.
    pub fn spawn_analysis(self: &Arc<Self>, message: ChatMessage) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let Ok(_permit) = service.analysis_permits.clone().acquire_owned().await else {
                return;
            };
            service.analyze_message(&message).await;
        });
    }

    async fn analyze_message(&self, message: &ChatMessage) {
        tracing::info!(message_id = message.id, "Starting conversation analysis");

        let context = self
            .fetch_conversation_context(message.room_id, message.id)
            .await;

        let verdict = match self.gateway.analyze(&context, &message.content).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::error!(error = %e, message_id = message.id, "Analysis gateway failed");
                Verdict::suppressed(format!("Gateway failure: {e}"))
            }
        };

        tracing::info!(
            message_id = message.id,
            should_recommend = verdict.should_recommend,
            confidence = verdict.confidence,
            location = ?verdict.location,
            "Analysis verdict"
        );

        if !verdict.should_recommend {
            tracing::info!(message_id = message.id, "No recommendation needed");
            return;
        }
        if verdict.confidence < CONFIDENCE_THRESHOLD {
            tracing::info!(
                message_id = message.id,
                confidence = verdict.confidence,
                "Confidence below threshold, suppressing"
            );
            return;
        }

        let prompt = RecommendationPrompt {
            kind: RecommendationPrompt::KIND,
            message: "맛집 추천이 가능합니다".into(),
            analysis_id: self
                .cache
                .insert(verdict.clone(), &message.sender_id, message.id),
            location: verdict.location.clone(),
            meal_type: verdict.meal_type.clone(),
            confidence: verdict.confidence,
            time: now_clock_label(),
        };

        tracing::info!(
            analysis_id = %prompt.analysis_id,
            user_id = %message.sender_id,
            "Recommendation prompt sent"
        );
        self.dispatcher
            .deliver(DEFAULT_ROOM_ID, &message.sender_id, Payload::Prompt(prompt));
    }

    async fn fetch_conversation_context(&self, room_id: i64, before_id: i64) -> Vec<String> {
        match self
            .messages
            .recent_before(room_id, before_id, CONTEXT_MESSAGE_LIMIT)
            .await
        {
            Ok(recent) => recent
                .iter()
                .map(|m| format!("{}: {}", m.sender_nickname, m.content))
                .collect(),
            Err(e) => {
                tracing::error!(error = %e, room_id, "Failed to fetch conversation context");
                Vec::new()
            }
        }
    }

    // ------------------------------------------------------------------
    // Phase 2: fulfillment
    // ------------------------------------------------------------------

    /// Redeem a prompt token and deliver the matching restaurants.
    pub async fn provide_recommendation(&self, analysis_id: &str, user_id: &str) {
        tracing::info!(analysis_id = %analysis_id, user_id = %user_id, "Recommendation requested");

        let verdict = match self.cache.take_once(analysis_id, user_id) {
            Ok(verdict) => verdict,
            Err(TakeError::NotFound) => {
                tracing::warn!(analysis_id = %analysis_id, "Analysis not found or expired");
                self.send_error(user_id, "추천 요청이 만료되었습니다. 다시 시도해주세요.");
                return;
            }
            Err(TakeError::AlreadyConsumed) => {
                tracing::warn!(analysis_id = %analysis_id, "Analysis already consumed");
                self.send_error(user_id, "이미 처리된 요청입니다.");
                return;
            }
            Err(TakeError::OwnerMismatch) => {
                // Deliberately generic so the notice leaks nothing about the
                // token's owner.
                tracing::warn!(analysis_id = %analysis_id, user_id = %user_id, "Requester does not own analysis");
                self.send_error(user_id, "잘못된 요청입니다.");
                return;
            }
        };

        let found = lookup_restaurants(self.restaurants.as_ref(), &verdict).await;

        if found.is_empty() {
            tracing::info!(analysis_id = %analysis_id, "No restaurants matched");
            self.send_error(user_id, "추천 가능한 맛집을 찾지 못했습니다.");
        } else {
            tracing::info!(
                analysis_id = %analysis_id,
                user_id = %user_id,
                count = found.len(),
                "Recommendation provided"
            );
            let card = build_suggestion(&verdict, &found);
            self.dispatcher
                .deliver(DEFAULT_ROOM_ID, user_id, Payload::Card(card));
        }

        self.cache.remove(analysis_id);
    }

    fn send_error(&self, user_id: &str, message: &str) {
        self.dispatcher.deliver(
            DEFAULT_ROOM_ID,
            user_id,
            Payload::Error(ErrorNotice::new(user_id, message)),
        );
    }
}

// ============================================================================
// Restaurant Lookup
// ============================================================================

/// Three-tier lookup fallback, each tier capped at [`RESULT_LIMIT`]:
///
/// 1. location keyword, filtered by extracted categories when present
/// 2. each category keyword on its own, in extraction order
/// 3. bounded sample of the whole directory
pub(crate) async fn lookup_restaurants(
    directory: &dyn RestaurantDirectory,
    verdict: &Verdict,
) -> Vec<Restaurant> {
    // Tier 1: location, narrowed by categories.
    if let Some(location) = verdict.location.as_deref().filter(|l| !l.is_empty()) {
        match directory.find_by_keyword(location).await {
            Ok(mut found) => {
                if !verdict.categories.is_empty() {
                    found.retain(|r| verdict.categories.iter().any(|c| r.matches_keyword(c)));
                }
                if !found.is_empty() {
                    found.truncate(RESULT_LIMIT);
                    return found;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, location = %location, "Lookup by location failed");
            }
        }
    }

    // Tier 2: first category with any match.
    for category in &verdict.categories {
        match directory.find_by_keyword(category).await {
            Ok(mut found) if !found.is_empty() => {
                found.truncate(RESULT_LIMIT);
                return found;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, category = %category, "Lookup by category failed");
            }
        }
    }

    // Tier 3: something is better than nothing.
    match directory.sample(RESULT_LIMIT).await {
        Ok(sampled) => sampled,
        Err(e) => {
            tracing::error!(error = %e, "Directory sample failed");
            Vec::new()
        }
    }
}

// ============================================================================
// Card Building
// ============================================================================

fn build_card_title(verdict: &Verdict) -> String {
    let mut title = String::new();
    if let Some(location) = verdict.location.as_deref().filter(|l| !l.is_empty()) {
        title.push_str(location);
        title.push(' ');
    }
    if let Some(category) = verdict.categories.first() {
        title.push_str(category);
        title.push(' ');
    }
    title.push_str("맛집 추천 리스트");
    title
}

fn to_restaurant_card(restaurant: &Restaurant) -> RestaurantCard {
    RestaurantCard {
        id: restaurant.id,
        name: restaurant.name.clone(),
        category: restaurant.category.clone(),
        location_text: restaurant.location_text.clone(),
        description: restaurant.description.clone(),
        rating: restaurant.rating.unwrap_or(4.5),
        address: restaurant.location_text.clone(),
        image: restaurant
            .image_url
            .clone()
            .unwrap_or_else(|| PLACEHOLDER_IMAGE.into()),
        distance: restaurant
            .distance_text
            .clone()
            .unwrap_or_else(|| "거리 정보 없음".into()),
    }
}

fn build_suggestion(verdict: &Verdict, restaurants: &[Restaurant]) -> Suggestion {
    Suggestion {
        kind: Suggestion::KIND,
        message: "맛집을 추천해드릴게요!".into(),
        card_data: CardData {
            title: build_card_title(verdict),
            image: CARD_IMAGE.into(),
            restaurants: restaurants.iter().map(to_restaurant_card).collect(),
        },
        time: now_clock_label(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRestaurantDirectory;

    fn restaurant(id: i64, keywords: &str) -> Restaurant {
        Restaurant {
            id,
            name: format!("식당 {id}"),
            category: Some("한식".into()),
            location_text: Some("어딘가".into()),
            description: None,
            keywords: Some(keywords.into()),
            rating: None,
            image_url: None,
            distance_text: None,
        }
    }

    fn verdict(location: Option<&str>, categories: &[&str]) -> Verdict {
        Verdict {
            should_recommend: true,
            location: location.map(Into::into),
            meal_type: None,
            categories: categories.iter().map(|c| (*c).into()).collect(),
            preferences: vec![],
            confidence: 0.9,
            reasoning: None,
        }
    }

    #[tokio::test]
    async fn test_tier1_location_filtered_by_category() {
        let directory = InMemoryRestaurantDirectory::new(vec![
            restaurant(1, "판교,한식"),
            restaurant(2, "판교,일식"),
            restaurant(3, "강남,한식"),
        ]);

        let found = lookup_restaurants(&directory, &verdict(Some("판교"), &["일식"])).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 2);
    }

    #[tokio::test]
    async fn test_tier1_without_categories_returns_location_matches() {
        let directory = InMemoryRestaurantDirectory::new(vec![
            restaurant(1, "판교,한식"),
            restaurant(2, "판교,일식"),
        ]);

        let found = lookup_restaurants(&directory, &verdict(Some("판교"), &[])).await;
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_tier2_category_only_when_joint_match_is_empty() {
        // Location "잠실" matches nothing together with "중식", but "중식"
        // alone has a hit: tier 2 must win and tier 3 must not run.
        let directory = InMemoryRestaurantDirectory::new(vec![
            restaurant(1, "강남,중식"),
            restaurant(2, "판교,한식"),
        ]);

        let found = lookup_restaurants(&directory, &verdict(Some("잠실"), &["중식"])).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 1);
    }

    #[tokio::test]
    async fn test_tier2_respects_category_extraction_order() {
        let directory = InMemoryRestaurantDirectory::new(vec![
            restaurant(1, "강남,일식"),
            restaurant(2, "강남,중식"),
        ]);

        let found = lookup_restaurants(&directory, &verdict(None, &["중식", "일식"])).await;
        assert_eq!(found[0].id, 2);
    }

    #[tokio::test]
    async fn test_tier3_bounded_sample_when_nothing_matches() {
        let restaurants: Vec<_> = (1..=8).map(|i| restaurant(i, "서울,분식")).collect();
        let directory = InMemoryRestaurantDirectory::new(restaurants);

        let found = lookup_restaurants(&directory, &verdict(Some("판교"), &["양식"])).await;
        assert_eq!(found.len(), RESULT_LIMIT);
    }

    #[tokio::test]
    async fn test_lookup_on_empty_directory_is_empty() {
        let directory = InMemoryRestaurantDirectory::new(vec![]);
        let found = lookup_restaurants(&directory, &verdict(Some("판교"), &["한식"])).await;
        assert!(found.is_empty());
    }

    #[test]
    fn test_card_title_with_location_and_category() {
        let title = build_card_title(&verdict(Some("판교"), &["한식", "일식"]));
        assert_eq!(title, "판교 한식 맛집 추천 리스트");
    }

    #[test]
    fn test_card_title_without_extractions() {
        let title = build_card_title(&verdict(None, &[]));
        assert_eq!(title, "맛집 추천 리스트");
    }

    #[test]
    fn test_restaurant_card_defaults() {
        let card = to_restaurant_card(&restaurant(1, "판교"));
        assert!((card.rating - 4.5).abs() < f64::EPSILON);
        assert_eq!(card.image, PLACEHOLDER_IMAGE);
        assert_eq!(card.distance, "거리 정보 없음");
        assert_eq!(card.address, card.location_text);
    }
}
