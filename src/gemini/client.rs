use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use super::types::{
    ApiError, Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part,
};
use crate::config::{ApiKey, env_value};
use crate::summarize::{ChatMessage, ChatModel, LlmError, Role};

const GEMINI_MODELS_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const FALLBACK_MODEL: &str = "gemini-2.5-flash";
const GENERATE_TIMEOUT: Duration = Duration::from_secs(20);
const TEMPERATURE: f32 = 0.2;

const ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(1000);
const ERROR_SNIPPET_BYTES: usize = 200;

/// Reads `GEMINI_API_KEY` (required) and `GEMINI_MODEL` (optional).
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    key: ApiKey,
    model: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn from_env(http: Client) -> Result<Self, LlmError> {
        let key = env_value("GEMINI_API_KEY").ok_or(LlmError::ApiKeyNotSet)?;
        let model = env_value("GEMINI_MODEL")
            .unwrap_or_else(|| FALLBACK_MODEL.to_string());
        Ok(Self {
            http,
            key: ApiKey(key),
            model,
            endpoint: GEMINI_MODELS_URL.to_string(),
        })
    }

    pub fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            key: ApiKey("test-key".to_string()),
            model: FALLBACK_MODEL.to_string(),
            endpoint: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn build_request(messages: &[ChatMessage]) -> GenerateContentRequest {
        let joined = |role: Role| {
            messages
                .iter()
                .filter(|m| m.role == role)
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let instruction = joined(Role::System);
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: joined(Role::User),
                }],
                role: Some("user".to_string()),
            }],
            system_instruction: (!instruction.is_empty()).then(|| Content {
                parts: vec![Part { text: instruction }],
                role: None,
            }),
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                response_mime_type: "application/json",
            },
        }
    }

    async fn generate_once(&self, request: &GenerateContentRequest) -> Result<String, LlmError> {
        let response = self
            .http
            .post(format!("{}/{}:generateContent", self.endpoint, self.model))
            .header("x-goog-api-key", &self.key.0)
            .json(request)
            .timeout(GENERATE_TIMEOUT)
            .send()
            .await?;

        let body = read_body(response).await?;
        // Gemini can report failures inside a 200 body too.
        if let Some(err) = &body.error {
            let err = LlmError::from(err);
            warn!(error = %err, "Gemini reported an error");
            return Err(err);
        }

        debug!(model = %self.model, "gemini generation finished");
        body.text().ok_or(LlmError::EmptyResponse)
    }
}

async fn read_body(response: Response) -> Result<GenerateContentResponse, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!("Gemini rate limited the request");
        return Err(LlmError::RateLimited);
    }

    let raw = response.text().await.unwrap_or_default();
    match serde_json::from_str::<GenerateContentResponse>(&raw) {
        Ok(body) if body.error.is_some() => Ok(body),
        _ => {
            warn!(status = %status, "Gemini failed without a structured error");
            let cut = raw.floor_char_boundary(ERROR_SNIPPET_BYTES);
            Err(LlmError::Api {
                code: status.as_u16(),
                message: format!("HTTP {status}: {}", &raw[..cut]),
            })
        }
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let request = Self::build_request(messages);
        let mut attempt = 0;
        loop {
            match self.generate_once(&request).await {
                Err(e) if is_transient(&e) && attempt + 1 < ATTEMPTS => {
                    let delay = backoff(attempt);
                    attempt += 1;
                    debug!(attempt, ?delay, error = %e, "retrying Gemini call");
                    tokio::time::sleep(delay).await;
                }
                outcome => return outcome,
            }
        }
    }
}

fn is_transient(e: &LlmError) -> bool {
    match e {
        LlmError::RateLimited => true,
        LlmError::Api { code, .. } => (500..600).contains(code),
        _ => false,
    }
}

/// Exponential with equal jitter: half the window fixed, half random.
fn backoff(attempt: u32) -> Duration {
    let window = BACKOFF_BASE.as_millis() as u64 * 2u64.pow(attempt);
    let half = window / 2;
    Duration::from_millis(half + fastrand::u64(..half.max(1)))
}

impl From<&ApiError> for LlmError {
    fn from(err: &ApiError) -> Self {
        let message = err
            .message
            .clone()
            .unwrap_or_else(|| "no message".to_string());
        match err.code {
            Some(429) => LlmError::RateLimited,
            Some(403) => LlmError::QuotaExhausted(message),
            Some(code) => LlmError::Api { code, message },
            None => LlmError::Api { code: 0, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: Option<u16>, message: &str) -> ApiError {
        ApiError {
            code,
            message: Some(message.into()),
        }
    }

    #[test]
    fn api_error_codes_map_to_variants() {
        assert!(matches!(
            LlmError::from(&api_error(Some(429), "Resource exhausted")),
            LlmError::RateLimited
        ));
        assert!(matches!(
            LlmError::from(&api_error(Some(403), "Quota exceeded")),
            LlmError::QuotaExhausted(m) if m == "Quota exceeded"
        ));
        assert!(matches!(
            LlmError::from(&api_error(None, "odd")),
            LlmError::Api { code: 0, .. }
        ));
    }

    #[test]
    fn only_rate_limits_and_server_errors_are_transient() {
        assert!(is_transient(&LlmError::RateLimited));
        assert!(is_transient(&LlmError::Api {
            code: 503,
            message: String::new()
        }));
        assert!(!is_transient(&LlmError::Api {
            code: 400,
            message: String::new()
        }));
        assert!(!is_transient(&LlmError::EmptyResponse));
    }

    #[test]
    fn backoff_doubles_with_jitter() {
        for attempt in 0..3 {
            let window = 1000 * 2u64.pow(attempt);
            let ms = backoff(attempt).as_millis() as u64;
            assert!(ms >= window / 2 && ms < window, "attempt {attempt}: {ms}ms");
        }
    }

    #[test]
    fn request_splits_system_and_user_messages() {
        let messages = [
            ChatMessage::system("Only use the sources."),
            ChatMessage::user("Sources: ..."),
        ];
        let request = GeminiClient::build_request(&messages);
        let json = serde_json::to_value(&request).unwrap();

        let instruction = &json["systemInstruction"]["parts"][0]["text"];
        assert_eq!(instruction, "Only use the sources.");
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "Sources: ...");
        let config = &json["generationConfig"];
        assert_eq!(config["responseMimeType"], "application/json");
    }

    #[test]
    fn user_only_request_has_no_system_instruction() {
        let request = GeminiClient::build_request(&[ChatMessage::user("hi")]);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("systemInstruction").is_none());
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
    }
}

#[cfg(test)]
mod http_tests {
    use super::*;
    use wiremock::matchers::{header, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn gemini_returning(
        template: ResponseTemplate,
        calls: u64,
    ) -> (MockServer, GeminiClient) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/gemini-2\.5-flash:generateContent$"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(template)
            .expect(calls)
            .mount(&server)
            .await;
        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        (server, client)
    }

    async fn ask(client: &GeminiClient) -> Result<String, LlmError> {
        client
            .complete(&[ChatMessage::user("Summarize Kyoto")])
            .await
    }

    #[tokio::test]
    async fn joins_candidate_parts() {
        let body = serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [{"text": "{\"summary\": "}, {"text": "\"Kyoto.\", \"facts\": []}"}],
                    "role": "model"
                }
            }]
        });
        let template = ResponseTemplate::new(200).set_body_json(body);
        let (_server, client) = gemini_returning(template, 1).await;

        let reply = ask(&client).await.unwrap();
        assert_eq!(reply, r#"{"summary": "Kyoto.", "facts": []}"#);
    }

    #[tokio::test]
    async fn whitespace_only_candidate_is_empty() {
        let body = serde_json::json!({"candidates": [{"content": {"parts": [{"text": "  "}]}}]});
        let template = ResponseTemplate::new(200).set_body_json(body);
        let (_server, client) = gemini_returning(template, 1).await;

        assert!(matches!(ask(&client).await, Err(LlmError::EmptyResponse)));
    }

    #[tokio::test]
    async fn bad_request_fails_without_retry() {
        let body = serde_json::json!({"error": {"code": 400, "message": "bad request"}});
        let template = ResponseTemplate::new(400).set_body_json(body);
        let (_server, client) = gemini_returning(template, 1).await;

        match ask(&client).await {
            Err(LlmError::Api { code: 400, message }) => assert_eq!(message, "bad request"),
            other => panic!("expected Api(400), got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unstructured_server_error_keeps_status() {
        let template = ResponseTemplate::new(404).set_body_string("not here");
        let (_server, client) = gemini_returning(template, 1).await;

        match ask(&client).await {
            Err(LlmError::Api { code: 404, message }) => assert!(message.contains("not here")),
            other => panic!("expected Api(404), got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn quota_error_inside_ok_body() {
        let body = serde_json::json!({"error": {"code": 403, "message": "Quota exceeded"}});
        let template = ResponseTemplate::new(200).set_body_json(body);
        let (_server, client) = gemini_returning(template, 1).await;

        let result = ask(&client).await;
        assert!(matches!(result, Err(LlmError::QuotaExhausted(_))));
    }
}
