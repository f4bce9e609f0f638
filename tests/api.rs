use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use quiz_battle_back::{
    config::AppConfig,
    dao::realtime_store::{RealtimeStore, memory::MemoryRealtimeStore},
    routes,
    state::{AppState, SharedState},
};
use futures::StreamExt;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn app(config: AppConfig) -> (Router, SharedState, Arc<MemoryRealtimeStore>) {
    let state = AppState::new(config);
    let store = Arc::new(MemoryRealtimeStore::new());
    state.install_store(store.clone()).await;
    (routes::router(state.clone()), state, store)
}

fn quiet_config() -> AppConfig {
    AppConfig {
        bot_backfill_enabled: false,
        ..AppConfig::default()
    }
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Read named SSE events from `uri` until `wanted` of them arrived.
async fn sse_events(app: &Router, uri: &str, wanted: usize) -> Vec<(String, Value)> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    let mut buffer = String::new();
    let mut events = Vec::new();
    while events.len() < wanted {
        let chunk = tokio::time::timeout(Duration::from_secs(1), body.next())
            .await
            .expect("no SSE frame in time")
            .expect("SSE stream ended")
            .unwrap();
        buffer.push_str(std::str::from_utf8(&chunk).unwrap());

        while let Some(end) = buffer.find("\n\n") {
            let frame: String = buffer.drain(..end + 2).collect();
            let mut name = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    name = Some(value.trim_start().to_owned());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data = Some(value.trim_start().to_owned());
                }
            }
            if let (Some(name), Some(data)) = (name, data) {
                events.push((name, serde_json::from_str(&data).unwrap()));
            }
        }
    }
    events
}

async fn open_room(app: &Router, max_players: u8) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/rooms",
        Some(json!({
            "hostId": "ada",
            "hostName": "Ada",
            "name": "Friday quiz",
            "topic": "astronomy",
            "difficulty": "easy",
            "maxPlayers": max_players,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["roomId"].as_str().unwrap().to_owned()
}

async fn ready(app: &Router, room_id: &str, uid: &str) {
    let (status, _) = call(
        app,
        Method::POST,
        &format!("/api/rooms/{room_id}/ready"),
        Some(json!({"uid": uid, "ready": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn healthcheck_reports_store_status() {
    let (app, state, _store) = app(quiet_config()).await;
    let (status, body) = call(&app, Method::GET, "/api/healthcheck", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    state.clear_store().await;
    let (_, body) = call(&app, Method::GET, "/api/healthcheck", None).await;
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn unknown_routes_answer_json_404() {
    let (app, _state, _store) = app(quiet_config()).await;
    let (status, body) = call(&app, Method::GET, "/api/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].as_str().unwrap().contains("no such route"));
}

#[tokio::test]
async fn blank_fields_are_rejected() {
    let (app, _state, _store) = app(quiet_config()).await;
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/rooms",
        Some(json!({"hostId": "  ", "hostName": "Ada", "name": "Room", "topic": "maths"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("validation failed"));
}

#[tokio::test]
async fn degraded_mode_answers_503() {
    let (app, state, _store) = app(quiet_config()).await;
    state.clear_store().await;
    let (status, _) = call(&app, Method::GET, "/api/rooms", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn joining_follows_password_and_capacity() {
    let (app, _state, _store) = app(quiet_config()).await;
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/rooms",
        Some(json!({
            "hostId": "ada",
            "hostName": "Ada",
            "name": "Secret",
            "topic": "maths",
            "password": "hunter2",
            "maxPlayers": 2,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let room_id = body["roomId"].as_str().unwrap().to_owned();

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/rooms/{room_id}/join"),
        Some(json!({"uid": "bob", "displayName": "Bob", "password": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, room) = call(
        &app,
        Method::POST,
        &format!("/api/rooms/{room_id}/join"),
        Some(json!({"uid": "bob", "displayName": "Bob", "password": "hunter2"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(room["currentPlayers"], 2);
    assert_eq!(room["hasPassword"], true);
    assert!(room.get("password").is_none());

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/rooms/{room_id}/join"),
        Some(json!({"uid": "carol", "displayName": "Carol", "password": "hunter2"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // private rooms stay out of the lobby
    let (_, rooms) = call(&app, Method::GET, "/api/rooms", None).await;
    assert_eq!(rooms.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn host_leaving_deletes_the_room() {
    let (app, _state, store) = app(quiet_config()).await;
    let room_id = open_room(&app, 4).await;

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/rooms/{room_id}/leave"),
        Some(json!({"uid": "ada"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["roomDeleted"], true);
    assert!(store.find_room(&room_id).await.unwrap().is_none());

    let (status, _) = call(&app, Method::GET, &format!("/api/rooms/{room_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn full_battle_is_played_evaluated_and_archived() {
    let (app, _state, _store) = app(quiet_config()).await;
    let room_id = open_room(&app, 2).await;

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/rooms/{room_id}/join"),
        Some(json!({"uid": "bob", "displayName": "Bob"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let question_ids: Vec<String> = (1..=10).map(|n| format!("q{n}")).collect();
    let start_uri = format!("/api/rooms/{room_id}/start");
    let start = json!({"requestedBy": "ada", "questionIds": question_ids});

    let (status, _) = call(&app, Method::POST, &start_uri, Some(start.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT, "nobody is ready yet");

    ready(&app, &room_id, "ada").await;
    ready(&app, &room_id, "bob").await;

    let (status, _) = call(
        &app,
        Method::POST,
        &start_uri,
        Some(json!({"requestedBy": "bob", "questionIds": question_ids})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, room) = call(&app, Method::POST, &start_uri, Some(start)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(room["status"], "in_progress");
    assert_eq!(room["questions"].as_array().unwrap().len(), 10);

    let match_uri = format!("/api/matches/{room_id}");
    for (index, question_id) in question_ids.iter().enumerate() {
        let (_, snapshot) = call(&app, Method::GET, &match_uri, None).await;
        assert_eq!(snapshot["phase"], "running");
        assert_eq!(snapshot["currentQuestionIndex"], index);

        for (uid, correct) in [("ada", true), ("bob", index % 2 == 0)] {
            let (status, answer) = call(
                &app,
                Method::POST,
                &format!("{match_uri}/answers"),
                Some(json!({
                    "uid": uid,
                    "questionId": question_id,
                    "answer": "A",
                    "isCorrect": correct,
                    "timeTakenMs": 1200,
                })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(answer["isCorrect"], correct);
        }

        let (_, snapshot) = call(&app, Method::GET, &match_uri, None).await;
        assert_eq!(snapshot["phase"], "answered");

        let (status, advanced) =
            call(&app, Method::POST, &format!("{match_uri}/advance"), None).await;
        assert_eq!(status, StatusCode::OK);
        if index + 1 < question_ids.len() {
            assert_eq!(advanced["phase"], "running");
        } else {
            assert_eq!(advanced["phase"], "finished");
            assert_eq!(advanced["result"]["winnerId"], "ada");
        }
    }

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("{match_uri}/answers"),
        Some(json!({"uid": "ada", "questionId": "q10", "answer": "A"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, room) = call(&app, Method::GET, &format!("/api/rooms/{room_id}"), None).await;
    assert_eq!(room["status"], "completed");

    let evaluate_uri = format!("{match_uri}/evaluate");
    let (status, evaluation) = call(&app, Method::POST, &evaluate_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(evaluation["winnerId"], "ada");
    assert_eq!(evaluation["rankChanges"].as_array().unwrap().len(), 2);

    // evaluating again never credits twice
    call(&app, Method::POST, &evaluate_uri, None).await;
    let (_, board) = call(&app, Method::GET, "/api/leaderboard", None).await;
    assert_eq!(board[0]["uid"], "ada");
    assert_eq!(board[0]["points"], 30);
    assert_eq!(board[0]["wins"], 1);
    assert_eq!(board[1]["uid"], "bob");
    assert_eq!(board[1]["points"], 5);

    let (_, results) = call(&app, Method::GET, "/api/battle-results?uid=bob", None).await;
    assert_eq!(results.as_array().unwrap().len(), 1);
    assert_eq!(results[0]["roomId"], room_id.as_str());
}

#[tokio::test(start_paused = true)]
async fn lonely_host_gets_a_bot_opponent() {
    let (app, state, _store) = app(AppConfig::default()).await;
    let room_id = open_room(&app, 2).await;

    tokio::time::sleep(state.config().bot_backfill_delay + Duration::from_millis(50)).await;

    let (_, room) = call(&app, Method::GET, &format!("/api/rooms/{room_id}"), None).await;
    assert_eq!(room["currentPlayers"], 2);
    let players = room["players"].as_array().unwrap();
    assert!(players.iter().any(|player| player["isBot"] == true && player["isReady"] == true));
}

#[tokio::test(start_paused = true)]
async fn unanswered_questions_time_out_and_advance() {
    let config = AppConfig {
        bot_backfill_enabled: false,
        battle_question_duration: Duration::from_secs(2),
        ..AppConfig::default()
    };
    let (app, _state, _store) = app(config).await;
    let room_id = open_room(&app, 2).await;
    call(
        &app,
        Method::POST,
        &format!("/api/rooms/{room_id}/join"),
        Some(json!({"uid": "bob", "displayName": "Bob"})),
    )
    .await;
    ready(&app, &room_id, "ada").await;
    ready(&app, &room_id, "bob").await;
    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/rooms/{room_id}/start"),
        Some(json!({"requestedBy": "ada", "questionIds": ["q1", "q2"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(2_500)).await;

    let (_, snapshot) = call(&app, Method::GET, &format!("/api/matches/{room_id}"), None).await;
    assert_eq!(snapshot["currentQuestionIndex"], 1);
    assert_eq!(snapshot["phase"], "running");
    let ada_answers = snapshot["playerAnswers"]["ada"].as_array().unwrap();
    assert_eq!(ada_answers.len(), 1);
    assert_eq!(ada_answers[0]["isCorrect"], false);
}

#[tokio::test]
async fn room_stream_sends_repaired_snapshots() {
    let (app, _state, store) = app(quiet_config()).await;
    let room_id = open_room(&app, 4).await;
    let mut room = store.find_room(&room_id).await.unwrap().unwrap();
    room.current_players = 3;
    store.save_room(room).await.unwrap();

    let events = sse_events(&app, &format!("/api/sse/rooms/{room_id}"), 2).await;
    assert_eq!(events[0].0, "handshake");
    assert_eq!(events[0].1["stream"], "room");
    assert_eq!(events[1].0, "room.snapshot");
    assert_eq!(events[1].1["room"]["currentPlayers"], 1);

    let stored = store.find_room(&room_id).await.unwrap().unwrap();
    assert_eq!(stored.current_players, 1);
}

#[tokio::test]
async fn host_leaving_mid_battle_removes_the_match() {
    let (app, _state, store) = app(quiet_config()).await;
    let room_id = open_room(&app, 2).await;
    call(
        &app,
        Method::POST,
        &format!("/api/rooms/{room_id}/join"),
        Some(json!({"uid": "bob", "displayName": "Bob"})),
    )
    .await;
    ready(&app, &room_id, "ada").await;
    ready(&app, &room_id, "bob").await;
    call(
        &app,
        Method::POST,
        &format!("/api/rooms/{room_id}/start"),
        Some(json!({"requestedBy": "ada", "questionIds": ["q1", "q2"]})),
    )
    .await;

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/rooms/{room_id}/leave"),
        Some(json!({"uid": "ada"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["roomDeleted"], true);
    assert!(store.find_match(&room_id).await.unwrap().is_none());

    let (status, _) = call(&app, Method::GET, &format!("/api/matches/{room_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
