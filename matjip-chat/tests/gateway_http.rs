//! HTTP-level tests for the Claude analysis gateway against a mock endpoint.

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use matjip_chat::{AnalysisGateway, ClaudeGateway};
use matjip_common::config::AnthropicConfig;

fn test_config() -> AnthropicConfig {
    AnthropicConfig {
        api_key: "test-key".into(),
        ..AnthropicConfig::default()
    }
}

#[tokio::test]
async fn test_analyze_parses_fenced_verdict() {
    let server = MockServer::start().await;

    let reply = json!({
        "content": [{
            "type": "text",
            "text": "```json\n{\"shouldRecommend\": true, \"location\": \"판교\", \"mealType\": \"점심\", \"categories\": [\"한식\"], \"preferences\": [], \"confidence\": 0.85, \"reasoning\": \"지역과 식사 언급\"}\n```"
        }]
    });

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply))
        .mount(&server)
        .await;

    let gateway = ClaudeGateway::with_base_url(&test_config(), server.uri());
    let verdict = gateway
        .analyze(&["민수: 배고프다".into()], "판교에서 점심 먹자")
        .await
        .unwrap();

    assert!(verdict.should_recommend);
    assert_eq!(verdict.location.as_deref(), Some("판교"));
    assert_eq!(verdict.categories, vec!["한식"]);
    assert!((verdict.confidence - 0.85).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_analyze_surfaces_api_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let gateway = ClaudeGateway::with_base_url(&test_config(), server.uri());
    let err = gateway.analyze(&[], "뭐 먹지?").await.unwrap_err();

    assert_eq!(err.status_code, Some(529));
}

#[tokio::test]
async fn test_analyze_with_unparseable_reply_falls_back() {
    let server = MockServer::start().await;

    let reply = json!({
        "content": [{
            "type": "text",
            "text": "죄송하지만 JSON으로 답할 수 없습니다"
        }]
    });

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply))
        .mount(&server)
        .await;

    let gateway = ClaudeGateway::with_base_url(&test_config(), server.uri());
    let verdict = gateway.analyze(&[], "안녕").await.unwrap();

    // Keyword fallback, not an error: the user never sees gateway trouble.
    assert!(!verdict.should_recommend);
    assert!((verdict.confidence - 0.5).abs() < f64::EPSILON);
}
