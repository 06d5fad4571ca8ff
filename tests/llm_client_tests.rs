use pricewatch::config::LlmConfig;
use pricewatch::summarize::{HttpLlmClient, LlmClient, LlmError, LlmRequest};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request() -> LlmRequest {
    LlmRequest {
        system: "You are a pricing analyst.".to_string(),
        user: "Summarise the sources.".to_string(),
    }
}

#[tokio::test]
async fn sends_model_params_and_parses_content_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "max_tokens": 2000,
            "temperature": 0.2,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"insights\":[]}"}}],
            "usage": {"total_tokens": 321}
        })))
        .mount(&server)
        .await;

    let client = HttpLlmClient::new(
        reqwest::Client::new(),
        server.uri(),
        "sk-test".to_string(),
        LlmConfig::default(),
    );
    let response = client.complete(request()).await.unwrap();
    assert_eq!(response.content, "{\"insights\":[]}");
    assert_eq!(response.tokens_used, 321);
}

#[tokio::test]
async fn upstream_error_status_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let client = HttpLlmClient::new(
        reqwest::Client::new(),
        server.uri(),
        "sk-test".to_string(),
        LlmConfig::default(),
    );
    let err = client.complete(request()).await.unwrap_err();
    assert!(matches!(err, LlmError::Status { status: 500, .. }));
}

#[tokio::test]
async fn missing_choices_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let client = HttpLlmClient::new(
        reqwest::Client::new(),
        server.uri(),
        "sk-test".to_string(),
        LlmConfig::default(),
    );
    let err = client.complete(request()).await.unwrap_err();
    assert!(matches!(err, LlmError::Malformed(_)));
}
