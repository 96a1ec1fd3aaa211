//! End-to-end tests for the two-phase recommendation pipeline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::timeout;

use matjip_common::config::DeliveryMode;

use matjip_chat::{
    AnalysisGateway, ChatService, CorrelationStore, Dispatcher, GatewayError, InboundChatMessage,
    InMemoryChatUserStore, InMemoryMessageStore, InMemoryRestaurantDirectory, MessageType, Payload,
    Restaurant, SessionRegistry, SuggestionService, Verdict,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_TIMEOUT: Duration = Duration::from_millis(300);

// ============================================================================
// Test Doubles
// ============================================================================

/// Gateway returning a fixed verdict (or a fixed failure).
struct ScriptedGateway {
    result: Result<Verdict, String>,
}

#[async_trait]
impl AnalysisGateway for ScriptedGateway {
    async fn analyze(&self, _context: &[String], _latest: &str) -> Result<Verdict, GatewayError> {
        self.result.clone().map_err(|message| GatewayError {
            message,
            status_code: None,
        })
    }
}

struct TestHarness {
    chat: Arc<ChatService>,
    suggestions: Arc<SuggestionService>,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<SessionRegistry>,
    cache: Arc<CorrelationStore>,
}

fn harness(
    gateway_result: Result<Verdict, String>,
    mode: DeliveryMode,
    restaurants: Vec<Restaurant>,
) -> TestHarness {
    let registry = Arc::new(SessionRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(mode, registry.clone()));
    let messages = Arc::new(InMemoryMessageStore::new());
    let cache = Arc::new(CorrelationStore::new());

    let suggestions = Arc::new(SuggestionService::new(
        Arc::new(ScriptedGateway {
            result: gateway_result,
        }),
        cache.clone(),
        dispatcher.clone(),
        messages.clone(),
        Arc::new(InMemoryRestaurantDirectory::new(restaurants)),
    ));
    let chat = Arc::new(ChatService::new(
        messages,
        Arc::new(InMemoryChatUserStore::new()),
        dispatcher.clone(),
        suggestions.clone(),
    ));

    TestHarness {
        chat,
        suggestions,
        dispatcher,
        registry,
        cache,
    }
}

fn positive_verdict() -> Verdict {
    Verdict {
        should_recommend: true,
        location: Some("판교".into()),
        meal_type: Some("점심".into()),
        categories: vec!["한식".into()],
        preferences: vec![],
        confidence: 0.9,
        reasoning: Some("직접적인 맛집 요청".into()),
    }
}

fn pangyo_restaurants() -> Vec<Restaurant> {
    vec![Restaurant {
        id: 1,
        name: "백년옥 판교점".into(),
        category: Some("한식 • 백반".into()),
        location_text: Some("판교역 2번 출구".into()),
        description: None,
        keywords: Some("판교,한식,점심".into()),
        rating: Some(4.7),
        image_url: None,
        distance_text: None,
    }]
}

fn talk(content: &str) -> InboundChatMessage {
    InboundChatMessage {
        room_id: 1,
        content: content.into(),
        message_type: Some(MessageType::Talk),
    }
}

async fn recv_json(rx: &mut broadcast::Receiver<Payload>) -> serde_json::Value {
    let payload = timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for payload")
        .expect("room channel closed");
    serde_json::to_value(&payload).unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_two_phase_flow_over_broadcast() {
    let h = harness(
        Ok(positive_verdict()),
        DeliveryMode::Broadcast,
        pangyo_restaurants(),
    );
    let mut room = h.dispatcher.subscribe_room(1);

    h.chat
        .handle_chat_message(talk("판교에서 점심 뭐 먹지?"), "u1", "민수")
        .await
        .unwrap();

    // Raw message reaches the room first.
    let chat_json = recv_json(&mut room).await;
    assert_eq!(chat_json["type"], "TALK");
    assert_eq!(chat_json["content"], "판교에서 점심 뭐 먹지?");

    // Then the prompt from the analysis task.
    let prompt_json = recv_json(&mut room).await;
    assert_eq!(prompt_json["type"], "recommendation-prompt");
    assert_eq!(prompt_json["location"], "판교");
    let analysis_id = prompt_json["analysisId"].as_str().unwrap().to_string();

    // Phase 2: the owner redeems the token.
    h.suggestions.provide_recommendation(&analysis_id, "u1").await;
    let card_json = recv_json(&mut room).await;
    assert_eq!(card_json["type"], "card");
    assert_eq!(card_json["cardData"]["title"], "판교 한식 맛집 추천 리스트");
    let listed = card_json["cardData"]["restaurants"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["name"], "백년옥 판교점");

    // The record is gone; a replay reads as expired.
    h.suggestions.provide_recommendation(&analysis_id, "u1").await;
    let error_json = recv_json(&mut room).await;
    assert_eq!(error_json["type"], "error");
    assert_eq!(
        error_json["message"],
        "추천 요청이 만료되었습니다. 다시 시도해주세요."
    );
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn test_owner_mismatch_rejected_without_consuming() {
    let h = harness(
        Ok(positive_verdict()),
        DeliveryMode::Broadcast,
        pangyo_restaurants(),
    );
    let mut room = h.dispatcher.subscribe_room(1);

    h.chat
        .handle_chat_message(talk("맛집 추천해줘"), "owner", "민수")
        .await
        .unwrap();

    let _chat = recv_json(&mut room).await;
    let prompt_json = recv_json(&mut room).await;
    let analysis_id = prompt_json["analysisId"].as_str().unwrap().to_string();

    // A different user tries to redeem: generic rejection, nothing leaked.
    h.suggestions
        .provide_recommendation(&analysis_id, "intruder")
        .await;
    let error_json = recv_json(&mut room).await;
    assert_eq!(error_json["type"], "error");
    assert_eq!(error_json["userId"], "intruder");
    assert_eq!(error_json["message"], "잘못된 요청입니다.");

    // The rightful owner still gets the card afterwards.
    h.suggestions.provide_recommendation(&analysis_id, "owner").await;
    let card_json = recv_json(&mut room).await;
    assert_eq!(card_json["type"], "card");
}

#[tokio::test]
async fn test_low_confidence_verdict_is_suppressed() {
    let verdict = Verdict {
        confidence: 0.3,
        ..positive_verdict()
    };
    let h = harness(Ok(verdict), DeliveryMode::Broadcast, pangyo_restaurants());
    let mut room = h.dispatcher.subscribe_room(1);

    h.chat
        .handle_chat_message(talk("밥이나 먹을까"), "u1", "민수")
        .await
        .unwrap();

    let _chat = recv_json(&mut room).await;

    // No prompt, no cached record.
    assert!(timeout(QUIET_TIMEOUT, room.recv()).await.is_err());
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn test_gateway_failure_degrades_to_suppression() {
    let h = harness(
        Err("connection refused".into()),
        DeliveryMode::Broadcast,
        pangyo_restaurants(),
    );
    let mut room = h.dispatcher.subscribe_room(1);

    h.chat
        .handle_chat_message(talk("판교 맛집 알려줘"), "u1", "민수")
        .await
        .unwrap();

    let _chat = recv_json(&mut room).await;
    assert!(timeout(QUIET_TIMEOUT, room.recv()).await.is_err());
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn test_enter_message_never_triggers_analysis() {
    let h = harness(
        Ok(positive_verdict()),
        DeliveryMode::Broadcast,
        pangyo_restaurants(),
    );
    let mut room = h.dispatcher.subscribe_room(1);

    h.chat
        .handle_chat_message(
            InboundChatMessage {
                room_id: 1,
                content: "민수님이 입장했습니다".into(),
                message_type: Some(MessageType::Enter),
            },
            "u1",
            "민수",
        )
        .await
        .unwrap();

    let chat_json = recv_json(&mut room).await;
    assert_eq!(chat_json["type"], "ENTER");
    assert!(timeout(QUIET_TIMEOUT, room.recv()).await.is_err());
}

#[tokio::test]
async fn test_no_match_reports_notice_instead_of_card() {
    // Empty directory: every tier comes up empty.
    let h = harness(Ok(positive_verdict()), DeliveryMode::Broadcast, vec![]);
    let mut room = h.dispatcher.subscribe_room(1);

    h.chat
        .handle_chat_message(talk("판교 맛집?"), "u1", "민수")
        .await
        .unwrap();

    let _chat = recv_json(&mut room).await;
    let prompt_json = recv_json(&mut room).await;
    let analysis_id = prompt_json["analysisId"].as_str().unwrap().to_string();

    h.suggestions.provide_recommendation(&analysis_id, "u1").await;
    let error_json = recv_json(&mut room).await;
    assert_eq!(error_json["type"], "error");
    assert_eq!(error_json["message"], "추천 가능한 맛집을 찾지 못했습니다.");
}

#[tokio::test]
async fn test_addressed_mode_targets_only_the_owner_session() {
    let h = harness(
        Ok(positive_verdict()),
        DeliveryMode::Addressed,
        pangyo_restaurants(),
    );

    // Owner connected; room observers must not see recommendation traffic.
    h.registry.bind("s1", "u1", "민수");
    let (tx, mut session_rx) = tokio::sync::mpsc::unbounded_channel();
    h.dispatcher.register_session("s1", tx);
    let mut room = h.dispatcher.subscribe_room(1);

    h.chat
        .handle_chat_message(talk("판교에서 점심 먹자"), "u1", "민수")
        .await
        .unwrap();

    // The chat message itself still fans out on the room channel.
    let chat_json = recv_json(&mut room).await;
    assert_eq!(chat_json["type"], "TALK");

    // The prompt arrives only on the owner's session queue.
    let prompt = timeout(RECV_TIMEOUT, session_rx.recv())
        .await
        .expect("timed out waiting for addressed prompt")
        .expect("session queue closed");
    let prompt_json = serde_json::to_value(&prompt).unwrap();
    assert_eq!(prompt_json["type"], "recommendation-prompt");
    assert!(timeout(QUIET_TIMEOUT, room.recv()).await.is_err());
}

#[tokio::test]
async fn test_addressed_mode_drops_payload_for_disconnected_owner() {
    let h = harness(
        Ok(positive_verdict()),
        DeliveryMode::Addressed,
        pangyo_restaurants(),
    );
    let mut room = h.dispatcher.subscribe_room(1);

    // Nobody is bound for u1: the prompt is silently dropped but the record
    // still exists and can be redeemed later.
    h.chat
        .handle_chat_message(talk("판교에서 점심 먹자"), "u1", "민수")
        .await
        .unwrap();

    let _chat = recv_json(&mut room).await;
    assert!(timeout(QUIET_TIMEOUT, room.recv()).await.is_err());

    // Analysis still ran and cached exactly one record.
    assert_eq!(h.cache.len(), 1);
}
