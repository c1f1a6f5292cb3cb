use serde_json::json;
use soullink_generate::{
    ApiConfig, ChatStrategy, ExpressionStrategy, GenerateError, Orchestrator, RemoteChat,
    RemoteExpression, SchemaStore,
};
use soullink_types::{ChatTurn, ParameterRange, ParameterSchema};
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [
            { "index": 0, "message": { "role": "assistant", "content": content }, "finish_reason": "stop" }
        ]
    })
}

fn eye_schema() -> SchemaStore {
    let store = SchemaStore::new();
    let mut schema = ParameterSchema::new();
    schema.insert("ParamEyeLOpen", ParameterRange::new(0.0, 1.0, "Eye L Open"));
    schema.insert("ParamMouthOpenY", ParameterRange::new(0.0, 1.0, ""));
    store.replace(schema);
    store
}

fn api(server: &MockServer) -> ApiConfig {
    ApiConfig::new(server.uri(), "sk-test")
}

#[tokio::test]
async fn remote_expression_parses_fenced_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "model": "gpt-4o-mini" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "Sure!\n```json\n{\"expression\": \"smile\", \"parameters\": {\"ParamEyeLOpen\": 0.6}, \"duration\": 500}\n```",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let strategy = RemoteExpression::new(api(&server), eye_schema()).unwrap();
    let draft = strategy.generate("hello", "").await.unwrap();

    assert_eq!(draft.label.as_deref(), Some("smile"));
    assert_eq!(draft.parameters["ParamEyeLOpen"], 0.6);
    assert_eq!(draft.duration_ms, Some(500));
}

#[tokio::test]
async fn remote_expression_sends_schema_in_system_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(|request: &Request| {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let system = body["messages"][0]["content"].as_str().unwrap_or_default();
            let content = if system.contains("ParamMouthOpenY") {
                r#"{"parameters": {"ParamMouthOpenY": 1.0}}"#
            } else {
                "schema missing"
            };
            ResponseTemplate::new(200).set_body_json(completion(content))
        })
        .mount(&server)
        .await;

    let strategy = RemoteExpression::new(api(&server), eye_schema()).unwrap();
    let draft = strategy.generate("open your mouth", "dentist").await.unwrap();
    assert_eq!(draft.parameters["ParamMouthOpenY"], 1.0);
}

#[tokio::test]
async fn remote_expression_reports_non_success_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let strategy = RemoteExpression::new(api(&server), eye_schema()).unwrap();
    let err = strategy.generate("hello", "").await.unwrap_err();
    match err {
        GenerateError::Backend(msg) => {
            assert!(msg.contains("500"));
            assert!(msg.contains("upstream exploded"));
        }
        other => panic!("expected backend error, got {:?}", other),
    }
}

#[tokio::test]
async fn remote_expression_without_json_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("I feel happy today!")))
        .mount(&server)
        .await;

    let strategy = RemoteExpression::new(api(&server), eye_schema()).unwrap();
    let err = strategy.generate("hello", "").await.unwrap_err();
    assert!(matches!(err, GenerateError::Backend(_)));
}

#[tokio::test]
async fn missing_credentials_fail_without_contacting_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("{}")))
        .expect(0)
        .mount(&server)
        .await;

    let config = ApiConfig::new(server.uri(), "your-api-key-here");
    let strategy = RemoteExpression::new(config.clone(), eye_schema()).unwrap();
    assert!(!strategy.is_available());
    assert!(matches!(
        strategy.generate("hello", "").await,
        Err(GenerateError::Config(_))
    ));

    let chat = RemoteChat::new(config).unwrap();
    assert!(matches!(chat.reply("hello", &[]).await, Err(GenerateError::Config(_))));
}

#[tokio::test]
async fn remote_chat_submits_windowed_history() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(|request: &Request| {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let count = body["messages"].as_array().map(Vec::len).unwrap_or_default();
            ResponseTemplate::new(200).set_body_json(completion(&format!("saw {} messages", count)))
        })
        .mount(&server)
        .await;

    let history: Vec<ChatTurn> = (0..9).map(|i| ChatTurn::user(format!("m{}", i))).collect();
    let chat = RemoteChat::new(api(&server)).unwrap();
    let reply = chat.reply("latest", &history).await.unwrap();
    assert_eq!(reply, "saw 8 messages");
}

#[tokio::test]
async fn chat_with_expression_joins_both_remote_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(|request: &Request| {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let system = body["messages"][0]["content"].as_str().unwrap_or_default();
            let content = if system.contains("ParamEyeLOpen") {
                r#"{"expression": "joy", "parameters": {"ParamEyeLOpen": 3.0, "Bogus": 1.0}}"#
            } else {
                "Hi there!"
            };
            ResponseTemplate::new(200).set_body_json(completion(content))
        })
        .expect(2)
        .mount(&server)
        .await;

    let schema = eye_schema();
    let expression = RemoteExpression::new(api(&server), schema.clone()).unwrap();
    let chat = RemoteChat::new(api(&server)).unwrap();
    let orchestrator = Orchestrator::new(Arc::new(expression), Arc::new(chat), schema);

    let outcome = orchestrator.chat_with_expression("你好", "", &[]).await;
    assert_eq!(outcome.reply, "Hi there!");
    assert!(outcome.reply_error.is_none());
    assert!(outcome.expression_error.is_none());
    assert_eq!(outcome.expression.label, "joy");
    assert_eq!(outcome.expression.parameters.len(), 1);
    assert_eq!(outcome.expression.parameters["ParamEyeLOpen"], 1.0);
}
