//! Conversation analysis gateway.
//!
//! Wraps the remote Claude call that decides whether the conversation is
//! asking for a restaurant recommendation. The gateway is a pure function of
//! (recent context, latest message) → verdict; it keeps no state between
//! calls. Callers treat any failure as a non-recommending verdict; gateway
//! trouble is never surfaced to chat users.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use matjip_common::config::AnthropicConfig;

// ============================================================================
// Verdict
// ============================================================================

/// Structured analysis output. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    /// Whether a recommendation should be offered.
    pub should_recommend: bool,
    /// Extracted area, e.g. "판교", "강남".
    #[serde(default)]
    pub location: Option<String>,
    /// Meal slot, e.g. "점심", "저녁".
    #[serde(default)]
    pub meal_type: Option<String>,
    /// Cuisine categories in extraction order, e.g. ["한식", "일식"].
    #[serde(default)]
    pub categories: Vec<String>,
    /// Other preferences, e.g. ["회식", "분위기 좋은"].
    #[serde(default)]
    pub preferences: Vec<String>,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Free-text rationale.
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl Verdict {
    /// Non-recommending verdict used when the remote call fails.
    pub fn suppressed(reasoning: impl Into<String>) -> Self {
        Self {
            should_recommend: false,
            location: None,
            meal_type: None,
            categories: Vec::new(),
            preferences: Vec::new(),
            confidence: 0.0,
            reasoning: Some(reasoning.into()),
        }
    }
}

// ============================================================================
// Gateway Trait
// ============================================================================

/// Remote analysis failure.
#[derive(Debug, thiserror::Error)]
#[error("analysis gateway error: {message}")]
pub struct GatewayError {
    pub message: String,
    pub status_code: Option<u16>,
}

/// Boundary to the remote natural-language analysis.
#[async_trait]
pub trait AnalysisGateway: Send + Sync {
    /// Analyze the conversation. `context` holds recent messages as
    /// "nickname: content" lines, newest first.
    async fn analyze(&self, context: &[String], latest_message: &str)
        -> Result<Verdict, GatewayError>;
}

// ============================================================================
// Claude Gateway
// ============================================================================

const ANTHROPIC_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str = r#"당신은 한국어 대화를 분석하여 맛집 추천이 필요한지 판단하는 AI 어시스턴트입니다.

당신의 역할:
1. 사용자들의 대화를 분석하여 식사 또는 맛집과 관련된 의도를 파악합니다
2. 다음 정보를 추출합니다:
   - 장소/지역 (예: 판교, 강남, 잠실, 건대, 합정)
   - 식사 종류 (예: 점심, 저녁, 브런치, 야식)
   - 음식 카테고리 선호도 (예: 한식, 일식, 중식, 양식, 카페)
   - 기타 선호사항 (예: 회식, 데이트, 분위기, 저렴한)
3. 추천 여부와 신뢰도를 결정합니다

추천이 필요한 경우:
- "어디서 밥 먹을까?", "뭐 먹지?", "맛집 추천해줘" 같은 직접적인 요청
- "배고파", "점심 때 됐다" 같은 간접적인 식사 의도
- 특정 지역과 식사를 함께 언급 (예: "판교에서 점심")

추천이 불필요한 경우:
- 일반 대화나 인사
- 음식과 무관한 주제
- 이미 식사를 마친 경우

응답 형식은 반드시 JSON으로 작성하세요:
{
  "shouldRecommend": boolean,
  "location": "string or null",
  "mealType": "string or null",
  "categories": ["string"],
  "preferences": ["string"],
  "confidence": 0.0-1.0,
  "reasoning": "string"
}

중요: JSON 외에 다른 텍스트는 절대 포함하지 마세요."#;

/// Claude-backed analysis gateway.
pub struct ClaudeGateway {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl ClaudeGateway {
    /// Create a gateway from the service configuration.
    pub fn new(config: &AnthropicConfig) -> Self {
        Self::with_base_url(config, "https://api.anthropic.com")
    }

    /// Create with a custom base URL (used against a local mock in tests).
    pub fn with_base_url(config: &AnthropicConfig, base_url: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&config.api_key)
                .unwrap_or_else(|_| HeaderValue::from_static("")),
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        // Hard timeout so a stalled remote call cannot pile up analysis tasks.
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    fn build_user_prompt(context: &[String], latest_message: &str) -> String {
        let mut prompt = String::from("대화 기록:\n");

        if context.is_empty() {
            prompt.push_str("(대화 기록 없음)\n");
        } else {
            for line in context {
                prompt.push_str("- ");
                prompt.push_str(line);
                prompt.push('\n');
            }
        }

        prompt.push_str(&format!("\n현재 메시지: \"{}\"\n\n", latest_message));
        prompt.push_str("이 대화를 분석하여 맛집 추천이 필요한지 판단하고 JSON 형식으로 응답해주세요.");
        prompt
    }

    /// Parse the model's reply into a verdict.
    ///
    /// The reply should be bare JSON but commonly arrives wrapped in a
    /// markdown fence. If parsing fails entirely, fall back to keyword
    /// sniffing with a mid confidence instead of erroring.
    pub(crate) fn parse_verdict(response: &str) -> Verdict {
        let mut json = response.trim();
        if let Some(stripped) = json.strip_prefix("```json") {
            json = stripped;
        }
        if let Some(stripped) = json.strip_prefix("```") {
            json = stripped;
        }
        if let Some(stripped) = json.strip_suffix("```") {
            json = stripped;
        }
        let json = json.trim();

        match serde_json::from_str::<Verdict>(json) {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::error!(error = %e, raw = %response, "Failed to parse analysis response as JSON");

                let lower = response.to_lowercase();
                let should_recommend = lower.contains("shouldrecommend")
                    && (lower.contains("true") || lower.contains("추천"));

                Verdict {
                    should_recommend,
                    location: None,
                    meal_type: None,
                    categories: Vec::new(),
                    preferences: Vec::new(),
                    confidence: 0.5,
                    reasoning: Some("Fallback keyword detection (JSON parsing failed)".into()),
                }
            }
        }
    }
}

#[async_trait]
impl AnalysisGateway for ClaudeGateway {
    async fn analyze(
        &self,
        context: &[String],
        latest_message: &str,
    ) -> Result<Verdict, GatewayError> {
        let url = format!("{}/v1/messages", self.base_url);
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![ApiMessage {
                role: "user".into(),
                content: Self::build_user_prompt(context, latest_message),
            }],
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError {
                message: format!("Request failed: {}", e),
                status_code: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError {
                message: format!("API error: {}", body),
                status_code: Some(status.as_u16()),
            });
        }

        let body: MessagesResponse = response.json().await.map_err(|e| GatewayError {
            message: format!("Failed to parse response: {}", e),
            status_code: None,
        })?;

        let text = body
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        tracing::debug!(reply = %text, "Analysis response received");
        Ok(Self::parse_verdict(&text))
    }
}

// ============================================================================
// Anthropic Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    system: String,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: String,
}
