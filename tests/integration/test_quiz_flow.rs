//! End-to-end tests for the quiz API over a real socket.
//!
//! Each test binds the router to an ephemeral port and talks to it with
//! `reqwest`, with a scripted oracle standing in for the model.

use std::sync::Arc;
use std::time::Duration;

use fluent_quiz::{create_router, AppState, Config, MockOracle};
use serde_json::{json, Value};

/// Spawns the server and returns its base URL.
async fn spawn_test_server(state: AppState) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let router = create_router(state);

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://{addr}"), handle)
}

fn demo_state() -> AppState {
    AppState::new(Config::default(), Arc::new(MockOracle::demo()))
}

async fn get(client: &reqwest::Client, url: String) -> Value {
    client
        .get(url)
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid JSON")
}

async fn post(client: &reqwest::Client, url: String, body: Value) -> (u16, Value) {
    let response = client
        .post(url)
        .json(&body)
        .send()
        .await
        .expect("Request failed");
    let status = response.status().as_u16();
    (status, response.json().await.expect("Invalid JSON"))
}

/// Answers `question` correctly or not, echoing its id and difficulty.
fn answer_for(question: &Value, correct: bool) -> Value {
    let expected = question["correctAnswer"].as_str().expect("correctAnswer");
    json!({
        "language": "Spanish",
        "questionText": question["question"],
        "questionId": question["id"],
        "answer": if correct { expected.to_uppercase() } else { "no sé".to_string() },
        "correctAnswer": expected,
        "difficulty": question["difficulty"]
    })
}

#[tokio::test]
async fn test_question_answer_stats_reset_cycle() {
    let (base, _handle) = spawn_test_server(demo_state()).await;
    let client = reqwest::Client::new();
    let quiz = format!("{base}/api/quiz/quiz_spanish");

    let (status, body) = post(&client, format!("{quiz}/question"), json!({"language": "Spanish"})).await;
    assert_eq!(status, 200);
    let question = body["question"].clone();
    assert_eq!(question["difficulty"], "beginner");

    let (status, body) = post(&client, format!("{quiz}/answer"), answer_for(&question, true)).await;
    assert_eq!(status, 200);
    assert_eq!(body["feedback"]["isCorrect"], true);
    assert_eq!(body["feedback"]["correctAnswer"], Value::Null);
    assert_eq!(body["stats"], json!({"correct": 1, "total": 1, "streak": 1}));

    let (_, body) = post(&client, format!("{quiz}/question"), json!({"language": "Spanish"})).await;
    let question = body["question"].clone();
    let (_, body) = post(&client, format!("{quiz}/answer"), answer_for(&question, false)).await;
    assert_eq!(body["feedback"]["isCorrect"], false);
    assert_eq!(body["feedback"]["correctAnswer"], question["correctAnswer"]);
    assert_eq!(body["stats"], json!({"correct": 1, "total": 2, "streak": 0}));

    let history = get(&client, format!("{base}/api/sessions/quiz_spanish/quiz-history")).await;
    let history = history["history"].as_array().expect("history array");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1]["questionId"], question["id"]);
    assert_eq!(history[1]["answered"], true);

    let response = client
        .delete(format!("{quiz}/reset"))
        .send()
        .await
        .expect("Request failed");
    assert!(response.status().is_success());

    let body = get(&client, format!("{quiz}/stats")).await;
    assert_eq!(body["stats"], json!({"correct": 0, "total": 0, "streak": 0}));
}

/// Answers twelve questions correctly and returns the ladder index of each.
async fn climb(state: AppState) -> Vec<usize> {
    let (base, _handle) = spawn_test_server(state).await;
    let client = reqwest::Client::new();
    let quiz = format!("{base}/api/quiz/quiz_spanish");

    let mut levels = Vec::new();
    for _ in 0..12 {
        let (_, body) = post(&client, format!("{quiz}/question"), json!({"language": "Spanish"})).await;
        let question = body["question"].clone();
        levels.push(question["difficulty"].as_str().expect("difficulty").to_string());
        post(&client, format!("{quiz}/answer"), answer_for(&question, true)).await;
    }

    let ladder = [
        "beginner",
        "beginner-intermediate",
        "intermediate",
        "intermediate-advanced",
        "advanced",
    ];
    levels
        .iter()
        .map(|level| ladder.iter().position(|l| l == level).expect("known level"))
        .collect()
}

#[tokio::test]
async fn test_difficulty_capped_when_echo_is_ignored() {
    // generation writes nothing, so answers are recorded as beginner and
    // the cap holds the level one step above
    let indices = climb(demo_state()).await;

    assert_eq!(indices[0], 0);
    assert!(indices.iter().all(|&i| i <= 1));
    assert_eq!(*indices.last().expect("levels"), 1);
}

#[tokio::test]
async fn test_difficulty_climbs_one_level_at_a_time_with_trusted_echo() {
    let mut config = Config::default();
    config.quiz.trust_reported_difficulty = true;
    let indices = climb(AppState::new(config, Arc::new(MockOracle::demo()))).await;

    assert_eq!(indices[0], 0);
    assert!(indices.windows(2).all(|w| w[1] <= w[0] + 1));
    assert_eq!(*indices.last().expect("levels"), 4);
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let (base, _handle) = spawn_test_server(demo_state()).await;
    let client = reqwest::Client::new();

    let answers = ["quiz_spanish", "quiz_french", "quiz_german"].map(|session| {
        let client = client.clone();
        let base = base.clone();
        async move {
            for _ in 0..3 {
                let body = json!({
                    "language": session,
                    "questionText": "Translate 'hello'",
                    "questionId": "q",
                    "answer": "hola",
                    "correctAnswer": "hola"
                });
                post(&client, format!("{base}/api/quiz/{session}/answer"), body).await;
            }
        }
    });
    futures::future::join_all(answers).await;

    for session in ["quiz_spanish", "quiz_french", "quiz_german"] {
        let body = get(&client, format!("{base}/api/quiz/{session}/stats")).await;
        assert_eq!(body["stats"]["total"], 3);
    }
    let body = get(&client, format!("{base}/api/quiz/quiz_italian/stats")).await;
    assert_eq!(body["stats"]["total"], 0);
}

#[tokio::test]
async fn test_fixture_config_selects_atomic_writes() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/fluent.json");
    let config = Config::load_from_file(&path).expect("Failed to load config");
    assert_eq!(config.quiz.answer_writes, fluent_quiz::AnswerWrites::Atomic);

    let state = AppState::new(config, Arc::new(MockOracle::demo()));
    let (base, _handle) = spawn_test_server(state).await;
    let client = reqwest::Client::new();

    let answers = (0..25).map(|_| {
        let client = client.clone();
        let url = format!("{base}/api/quiz/quiz_spanish/answer");
        async move {
            let body = json!({
                "language": "Spanish",
                "questionText": "¿Qué significa 'rojo'?",
                "answer": "red",
                "correctAnswer": "red"
            });
            post(&client, url, body).await
        }
    });
    for (status, _) in futures::future::join_all(answers).await {
        assert_eq!(status, 200);
    }

    let body = get(&client, format!("{base}/api/quiz/quiz_spanish/stats")).await;
    assert_eq!(body["stats"], json!({"correct": 25, "total": 25, "streak": 25}));
}

#[tokio::test]
async fn test_health_endpoint() {
    let (base, _handle) = spawn_test_server(demo_state()).await;
    let body = get(&reqwest::Client::new(), format!("{base}/api/health")).await;
    assert_eq!(body["status"], "ok");
}
