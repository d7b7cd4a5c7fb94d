//! Full-stack tests with the HTTP oracle pointed at a stubbed
//! chat-completions endpoint.

use std::sync::Arc;
use std::time::Duration;

use fluent_quiz::{create_router, AppState, Config, HttpOracle, OracleConfig};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-test",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    }))
}

async fn spawn_server(oracle_url: &str) -> String {
    let config = Config {
        oracle: OracleConfig {
            base_url: format!("{oracle_url}/v1"),
            model: "stub-model".to_string(),
            timeout_secs: 5,
            ..OracleConfig::default()
        },
        ..Config::default()
    };
    let oracle = HttpOracle::new(config.oracle.clone(), Some("sk-stub".to_string()))
        .expect("Failed to build oracle");
    let router = create_router(AppState::new(config, Arc::new(oracle)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://{addr}")
}

async fn post(url: String, body: Value) -> (u16, Value) {
    let response = reqwest::Client::new()
        .post(url)
        .json(&body)
        .send()
        .await
        .expect("Request failed");
    let status = response.status().as_u16();
    (status, response.json().await.expect("Invalid JSON"))
}

#[tokio::test]
async fn test_fenced_model_output_becomes_question() {
    let oracle = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("vocabulary question"))
        .respond_with(completion(
            "```json\n{\"type\": \"written\", \"question\": \"¿Cómo se dice 'dog'?\", \"correctAnswer\": \"perro\", \"hint\": \"How do you say 'dog'?\"}\n```",
        ))
        .expect(1)
        .mount(&oracle)
        .await;

    let base = spawn_server(&oracle.uri()).await;
    let (status, body) = post(
        format!("{base}/api/quiz/quiz_spanish/question"),
        json!({"language": "Spanish"}),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["question"]["type"], "written");
    assert_eq!(body["question"]["correctAnswer"], "perro");
    assert_eq!(body["question"]["difficulty"], "beginner");
}

#[tokio::test]
async fn test_chatty_model_output_is_a_generation_failure() {
    let oracle = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(completion("Sure! What would you like to practise today?"))
        .mount(&oracle)
        .await;

    let base = spawn_server(&oracle.uri()).await;
    let (status, body) = post(
        format!("{base}/api/quiz/quiz_spanish/question"),
        json!({"language": "Spanish"}),
    )
    .await;

    assert_eq!(status, 500);
    assert_eq!(body["error"], "Generate question failed");
}

#[tokio::test]
async fn test_feedback_outage_still_records_answer() {
    let oracle = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&oracle)
        .await;

    let base = spawn_server(&oracle.uri()).await;
    let (status, body) = post(
        format!("{base}/api/quiz/quiz_spanish/answer"),
        json!({
            "language": "Spanish",
            "questionText": "¿Cómo se dice 'dog'?",
            "questionId": "q-1",
            "answer": "gato",
            "correctAnswer": "perro",
            "difficulty": "beginner"
        }),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["feedback"]["isCorrect"], false);
    assert_eq!(body["feedback"]["explanation"], "The correct answer is \"perro\".");
    assert_eq!(body["stats"]["total"], 1);
}

#[tokio::test]
async fn test_oracle_outage_on_question_returns_502() {
    let oracle = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&oracle)
        .await;

    let base = spawn_server(&oracle.uri()).await;
    let (status, body) = post(
        format!("{base}/api/quiz/quiz_spanish/question"),
        json!({"language": "Spanish"}),
    )
    .await;

    assert_eq!(status, 502);
    assert!(body["details"].as_str().expect("details").contains("HTTP 500"));
}
