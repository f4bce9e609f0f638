//! Match progression: answers, scoring, advancing, timeouts and result evaluation.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    dao::{
        models::{
            BattleResultEntity, BattleRoomEntity, LeaderboardIncrement, MatchEntity, MatchOutcome,
            MatchResultEntity, PlayerAnswerEntity, RankChangeEntity,
        },
        realtime_store::RealtimeStore,
    },
    dto::{
        battle::{
            AdvanceResponse, AnswerResponse, BattleResultSummary, EvaluationResponse,
            MatchResultSummary, MatchSummary, RankChangeSummary, SubmitAnswerRequest,
        },
        common::CountdownDto,
    },
    error::ServiceError,
    services::{
        badge_service, bot,
        countdown::{CountdownView, spawn_ticker},
        ranking,
        sse_events::{broadcast_countdown_tick, broadcast_match_finished, broadcast_room_updated},
    },
    state::{
        GateGuard, MatchCoordinator, SharedState,
        battle::{Advance, MatchError},
        now_ms,
        state_machine::{MatchEvent, MatchPhase},
        transitions::run_transition_with_broadcast,
    },
};

fn match_not_found(room_id: &str) -> ServiceError {
    ServiceError::NotFound(format!("no match for room `{room_id}`"))
}

/// Coordinator of the match in `room_id`, resumed from the stored node when the process
/// has not seen this match yet.
async fn coordinator_for(
    state: &SharedState,
    store: &dyn RealtimeStore,
    room_id: &str,
) -> Result<Arc<MatchCoordinator>, ServiceError> {
    if let Some(coordinator) = state.existing_coordinator(room_id) {
        return Ok(coordinator);
    }
    let node = store
        .find_match(room_id)
        .await?
        .ok_or_else(|| match_not_found(room_id))?;
    Ok(state.coordinator(room_id, || MatchPhase::of(&node)))
}

async fn load_node(store: &dyn RealtimeStore, room_id: &str) -> Result<MatchEntity, ServiceError> {
    store
        .find_match(room_id)
        .await?
        .ok_or_else(|| match_not_found(room_id))
}

/// Create the match node of a room that just moved in progress and open question 0.
pub async fn init_match(
    state: &SharedState,
    room: &BattleRoomEntity,
) -> Result<MatchEntity, ServiceError> {
    let store = state.require_store().await?;
    let node = MatchEntity::begin(room, state.config().battle_question_duration, now_ms());

    let coordinator = state.coordinator(&room.id, || MatchPhase::NotStarted);
    let gate = coordinator.lock().await;
    let saved = node.clone();
    let store_ref = &store;
    run_transition_with_broadcast(state, &coordinator, &gate, MatchEvent::Start, move || {
        async move {
            store_ref.save_match(saved).await?;
            Ok(())
        }
    })
    .await?;

    arm_watchdog(state, &coordinator, &node);
    info!(
        room_id = %room.id,
        participants = node.participants.len(),
        questions = node.questions.len(),
        "match started"
    );
    Ok(node)
}

/// Record an answer for the current question and apply its score delta.
///
/// Correctness comes from the stored question when it exists, otherwise from the
/// submitted flag. Once every human answered, bots answer and the phase becomes
/// `answered`.
pub async fn submit_answer(
    state: &SharedState,
    room_id: &str,
    request: SubmitAnswerRequest,
) -> Result<AnswerResponse, ServiceError> {
    let store = state.require_store().await?;
    let coordinator = coordinator_for(state, store.as_ref(), room_id).await?;
    let outcome = async {
        let gate = coordinator.lock().await;
        let mut node = load_node(store.as_ref(), room_id).await?;

        let question = store.find_question(&request.question_id).await?;
        let is_correct = match &question {
            Some(question) => question.correct_answer == request.answer,
            None => request.is_correct.unwrap_or(false),
        };
        let now = now_ms();
        let score = node.record_answer(
            &request.uid,
            PlayerAnswerEntity {
                question_id: request.question_id.clone(),
                answer: request.answer.clone(),
                is_correct,
                time_taken_ms: request.time_taken_ms,
                submitted_at: now,
            },
        )?;
        debug!(room_id, uid = %request.uid, is_correct, score, "answer recorded");

        let running = matches!(coordinator.phase().await, MatchPhase::Running(_));
        if running && node.humans_answered() {
            answer_for_bots(state, store.as_ref(), &mut node, now).await?;
            let saved = node.clone();
            let store_ref = &store;
            run_transition_with_broadcast(
                state,
                &coordinator,
                &gate,
                MatchEvent::AllAnswered,
                move || async move {
                    store_ref.save_match(saved).await?;
                    Ok(())
                },
            )
            .await?;
        } else {
            store.save_match(node).await?;
        }

        Ok::<_, ServiceError>(AnswerResponse {
            is_correct,
            score,
            phase: coordinator.phase().await.label().to_owned(),
        })
    }
    .await;

    retire_if_finished(state, coordinator).await;
    outcome
}

/// Let every bot without an answer for the current question answer it.
async fn answer_for_bots(
    state: &SharedState,
    store: &dyn RealtimeStore,
    node: &mut MatchEntity,
    now: u64,
) -> Result<(), ServiceError> {
    let Some(question_id) = node.current_question().map(str::to_owned) else {
        return Ok(());
    };
    let bots: Vec<String> = node
        .unanswered()
        .into_iter()
        .filter(|uid| node.is_bot(uid))
        .collect();
    if bots.is_empty() {
        return Ok(());
    }

    let question = store.find_question(&question_id).await?;
    for uid in bots {
        let answer = bot::simulated_answer(
            state.config().bot_accuracy,
            &question_id,
            question.as_ref(),
            node.countdown.duration_ms,
            now,
        );
        node.record_answer(&uid, answer)?;
    }
    Ok(())
}

/// Open the next question, or finish the match when none is left.
pub async fn advance_or_finish(
    state: &SharedState,
    room_id: &str,
) -> Result<AdvanceResponse, ServiceError> {
    let store = state.require_store().await?;
    let coordinator = coordinator_for(state, store.as_ref(), room_id).await?;
    let outcome = async {
        let gate = coordinator.lock().await;
        let node = load_node(store.as_ref(), room_id).await?;
        advance_locked(state, store.as_ref(), &coordinator, &gate, node).await
    }
    .await;

    retire_if_finished(state, coordinator).await;
    outcome
}

/// Submit timeout answers for the open question and advance. Used by the countdown
/// watchdog and by `POST /matches/{id}/timeout`.
pub async fn expire_current_question(
    state: &SharedState,
    room_id: &str,
) -> Result<AdvanceResponse, ServiceError> {
    let store = state.require_store().await?;
    let coordinator = coordinator_for(state, store.as_ref(), room_id).await?;
    let outcome = async {
        let gate = coordinator.lock().await;
        let node = load_node(store.as_ref(), room_id).await?;
        expire_locked(state, store.as_ref(), &coordinator, &gate, node).await
    }
    .await;

    retire_if_finished(state, coordinator).await;
    outcome
}

/// Same as [`expire_current_question`] but only while question `index` is still open.
/// Returns `None` when the match already moved on.
pub async fn expire_question(
    state: &SharedState,
    room_id: &str,
    index: usize,
) -> Result<Option<AdvanceResponse>, ServiceError> {
    let store = state.require_store().await?;
    let coordinator = coordinator_for(state, store.as_ref(), room_id).await?;
    let outcome = async {
        let gate = coordinator.lock().await;
        let node = load_node(store.as_ref(), room_id).await?;

        if node.is_finished() || node.current_question_index != index {
            debug!(room_id, index, "stale question timeout ignored");
            return Ok(None);
        }
        expire_locked(state, store.as_ref(), &coordinator, &gate, node)
            .await
            .map(Some)
    }
    .await;

    retire_if_finished(state, coordinator).await;
    outcome
}

async fn expire_locked(
    state: &SharedState,
    store: &dyn RealtimeStore,
    coordinator: &MatchCoordinator,
    gate: &GateGuard<'_>,
    mut node: MatchEntity,
) -> Result<AdvanceResponse, ServiceError> {
    if node.is_finished() {
        // finishing again completes an interrupted finish
        return advance_locked(state, store, coordinator, gate, node).await;
    }

    let now = now_ms();
    answer_for_bots(state, store, &mut node, now).await?;
    if let Some(question_id) = node.current_question().map(str::to_owned) {
        let missing = node.unanswered();
        for uid in &missing {
            node.record_answer(
                uid,
                PlayerAnswerEntity {
                    question_id: question_id.clone(),
                    answer: String::new(),
                    is_correct: false,
                    time_taken_ms: node.countdown.duration_ms,
                    submitted_at: now,
                },
            )?;
        }
        if !missing.is_empty() {
            info!(
                room_id = %node.room_id,
                question = node.current_question_index,
                timed_out = missing.len(),
                "question timed out"
            );
        }
    }

    advance_locked(state, store, coordinator, gate, node).await
}

async fn advance_locked(
    state: &SharedState,
    store: &dyn RealtimeStore,
    coordinator: &MatchCoordinator,
    gate: &GateGuard<'_>,
    mut node: MatchEntity,
) -> Result<AdvanceResponse, ServiceError> {
    if let Some(result) = node.result.clone() {
        if coordinator.phase().await == MatchPhase::Finished {
            return Err(MatchError::Concluded.into());
        }
        warn!(room_id = %node.room_id, "resuming an interrupted match finish");
        return finish_locked(state, store, coordinator, gate, node, result).await;
    }

    let now = now_ms();
    let index = match node.advance(state.config().battle_question_duration, now)? {
        Advance::Next(index) => index,
        Advance::Finished(result) => {
            return finish_locked(state, store, coordinator, gate, node, result).await;
        }
    };

    let saved = &node;
    run_transition_with_broadcast(state, coordinator, gate, MatchEvent::NextQuestion, move || {
        async move {
            store.save_match(saved.clone()).await?;
            Ok(())
        }
    })
    .await?;

    debug!(room_id = %node.room_id, index, "next question opened");
    arm_watchdog(state, coordinator, &node);
    advance_response(coordinator, &node).await
}

/// Record `result` on the match. The room and archive are written before the node, so a
/// failed attempt leaves the match open and the next advance or timeout retries it.
async fn finish_locked(
    state: &SharedState,
    store: &dyn RealtimeStore,
    coordinator: &MatchCoordinator,
    gate: &GateGuard<'_>,
    node: MatchEntity,
    result: MatchResultEntity,
) -> Result<AdvanceResponse, ServiceError> {
    let saved = &node;
    let concluded = &result;
    run_transition_with_broadcast(state, coordinator, gate, MatchEvent::Finish, move || {
        async move {
            conclude(state, store, saved, concluded).await?;
            store.save_match(saved.clone()).await?;
            Ok(())
        }
    })
    .await?;

    coordinator.disarm_watchdog();
    broadcast_match_finished(state, &node.room_id, &result);
    info!(
        room_id = %node.room_id,
        winner = result.winner_id.as_deref().unwrap_or("draw"),
        "match finished"
    );
    advance_response(coordinator, &node).await
}

async fn advance_response(
    coordinator: &MatchCoordinator,
    node: &MatchEntity,
) -> Result<AdvanceResponse, ServiceError> {
    Ok(AdvanceResponse {
        phase: coordinator.phase().await.label().to_owned(),
        current_question_index: node.current_question_index,
        countdown: CountdownDto::stamped(&node.countdown, now_ms()),
        result: node.result.as_ref().map(MatchResultSummary::from),
    })
}

/// Release the coordinator of a match that reached its final phase.
async fn retire_if_finished(state: &SharedState, coordinator: Arc<MatchCoordinator>) {
    if coordinator.phase().await == MatchPhase::Finished {
        state.retire_coordinator(coordinator);
    }
}

/// Delete the match of a dissolved room and stop its watchdog.
pub async fn discard_match(state: &SharedState, room_id: &str) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    match state.existing_coordinator(room_id) {
        Some(coordinator) => {
            let _gate = coordinator.lock().await;
            coordinator.disarm_watchdog();
            store.delete_match(room_id).await?;
        }
        None => {
            store.delete_match(room_id).await?;
        }
    }
    state.drop_coordinator(room_id);
    debug!(room_id, "match discarded");
    Ok(())
}

/// Mark the room completed and archive the result. Safe to repeat: the archive is keyed
/// by room.
async fn conclude(
    state: &SharedState,
    store: &dyn RealtimeStore,
    node: &MatchEntity,
    result: &MatchResultEntity,
) -> Result<(), ServiceError> {
    {
        let _guard = state.lock_room(&node.room_id).await;
        if let Some(mut room) = store.find_room(&node.room_id).await? {
            if room.complete() {
                store.save_room(room.clone()).await?;
                broadcast_room_updated(state, &room);
            }
        }
    }

    store
        .save_battle_result(BattleResultEntity {
            id: node.room_id.clone(),
            room_id: node.room_id.clone(),
            topic: node.topic.clone(),
            difficulty: node.difficulty,
            participants: node.participants.clone(),
            winner_id: result.winner_id.clone(),
            scores: result.scores.clone(),
            finished_at: result.finished_at,
        })
        .await?;
    Ok(())
}

/// Arm the countdown watchdog of the open question. Each displayed second is broadcast
/// on the lobby stream; expiry submits timeout answers and advances.
fn arm_watchdog(state: &SharedState, coordinator: &MatchCoordinator, node: &MatchEntity) {
    if !state.config().auto_advance_on_timeout || node.is_finished() {
        coordinator.disarm_watchdog();
        return;
    }

    let index = node.current_question_index;
    let room_id = node.room_id.clone();
    let tick_state = state.clone();
    let tick_room = room_id.clone();
    let expire_state = state.clone();

    let handle = spawn_ticker(
        CountdownView::received(node.countdown),
        state.config().countdown_tick_interval,
        move |secs| broadcast_countdown_tick(&tick_state, &tick_room, index, secs),
        move || {
            // separate task: the expiry re-arms the watchdog, which aborts this ticker
            tokio::spawn(async move {
                match expire_question(&expire_state, &room_id, index).await {
                    Ok(Some(_)) => debug!(room_id, index, "question expired"),
                    Ok(None) => {}
                    Err(err) => warn!(room_id, index, error = %err, "question expiry failed"),
                }
            });
        },
    );
    coordinator.arm_watchdog(handle);
}

/// Credit the leaderboard for a finished match, once.
///
/// Later calls return the changes recorded by the first one.
pub async fn evaluate_results(
    state: &SharedState,
    room_id: &str,
    topic: Option<String>,
) -> Result<EvaluationResponse, ServiceError> {
    let store = state.require_store().await?;
    let coordinator = coordinator_for(state, store.as_ref(), room_id).await?;
    let outcome = async {
        let _gate = coordinator.lock().await;
        let mut node = load_node(store.as_ref(), room_id).await?;

        let Some(result) = node.result.clone() else {
            return Err(ServiceError::InvalidState(
                "match has not finished yet".into(),
            ));
        };

        if !node.rank_applied {
            let mut changes = Vec::new();
            let humans: Vec<String> = node.humans().cloned().collect();
            for uid in &humans {
                changes.push(
                    credit(state, store.as_ref(), &node, uid, result.winner_id.as_deref()).await?,
                );
            }
            node.rank_applied = true;
            node.rank_changes = changes;
            store.save_match(node.clone()).await?;
            info!(room_id, credited = humans.len(), "match results evaluated");

            for uid in &humans {
                if let Err(err) = badge_service::evaluate_badges(state, uid).await {
                    warn!(room_id, uid, error = %err, "badge evaluation failed");
                }
            }
        }

        Ok(EvaluationResponse {
            room_id: node.room_id.clone(),
            topic: topic.unwrap_or_else(|| node.topic.clone()),
            winner_id: result.winner_id,
            scores: result.scores,
            rank_changes: node.rank_changes.iter().map(RankChangeSummary::from).collect(),
        })
    }
    .await;

    retire_if_finished(state, coordinator).await;
    outcome
}

async fn credit(
    state: &SharedState,
    store: &dyn RealtimeStore,
    node: &MatchEntity,
    uid: &str,
    winner_id: Option<&str>,
) -> Result<RankChangeEntity, ServiceError> {
    let outcome = ranking::outcome_for(uid, winner_id);
    let points_delta = ranking::points_for(&state.config().ranking, outcome);
    let entry = store
        .increment_leaderboard(
            uid,
            LeaderboardIncrement {
                display_name: node.display_name(uid).to_owned(),
                points: points_delta,
                wins: u32::from(outcome == MatchOutcome::Win),
                battles: 1,
            },
        )
        .await?;

    let previous_points = entry.points.saturating_sub(points_delta);
    Ok(RankChangeEntity {
        uid: uid.to_owned(),
        outcome,
        points_delta,
        previous_points,
        new_points: entry.points,
        previous_tier: ranking::tier_name(state.config(), previous_points),
        new_tier: ranking::tier_name(state.config(), entry.points),
    })
}

/// Snapshot of the match in `room_id`.
pub async fn get_match(state: &SharedState, room_id: &str) -> Result<MatchSummary, ServiceError> {
    let store = state.require_store().await?;
    let node = load_node(store.as_ref(), room_id).await?;
    Ok(MatchSummary::from_node(&node, now_ms()))
}

/// Archived battles, newest first, optionally restricted to those `uid` took part in.
pub async fn list_battle_results(
    state: &SharedState,
    uid: Option<&str>,
) -> Result<Vec<BattleResultSummary>, ServiceError> {
    let store = state.require_store().await?;
    let mut results = store.list_battle_results().await?;
    if let Some(uid) = uid {
        results.retain(|result| result.participants.iter().any(|p| p == uid));
    }
    results.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));
    Ok(results.into_iter().map(BattleResultSummary::from).collect())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{BattlePlayerEntity, Difficulty, QuestionEntity, QuestionSource, RoomStatus},
            realtime_store::memory::MemoryRealtimeStore,
        },
        state::AppState,
    };

    fn config(auto_advance: bool) -> AppConfig {
        AppConfig {
            auto_advance_on_timeout: auto_advance,
            bot_backfill_enabled: false,
            ..AppConfig::default()
        }
    }

    fn player(uid: &str, is_bot: bool) -> BattlePlayerEntity {
        BattlePlayerEntity {
            uid: uid.into(),
            display_name: uid.to_uppercase(),
            is_ready: true,
            is_bot,
            joined_at: 0,
        }
    }

    fn question(id: &str) -> QuestionEntity {
        QuestionEntity {
            id: id.into(),
            topic: "maths".into(),
            difficulty: Difficulty::Easy,
            language: "en".into(),
            prompt: format!("prompt {id}"),
            options: vec!["right".into(), "wrong".into()],
            correct_answer: "right".into(),
            explanation: None,
            source: QuestionSource::Live,
            created_at: 0,
        }
    }

    async fn started(
        config: AppConfig,
        players: Vec<BattlePlayerEntity>,
        questions: usize,
    ) -> (SharedState, Arc<MemoryRealtimeStore>, String) {
        let state = AppState::new(config);
        let store = Arc::new(MemoryRealtimeStore::new());
        state.install_store(store.clone()).await;

        let ids: Vec<String> = (0..questions).map(|i| format!("q{i}")).collect();
        for id in &ids {
            store.save_question(question(id)).await.unwrap();
        }
        let room = store
            .create_room(BattleRoomEntity {
                id: String::new(),
                host_id: players[0].uid.clone(),
                name: "room".into(),
                topic: "maths".into(),
                difficulty: Difficulty::Easy,
                password: None,
                is_public: true,
                max_players: 4,
                current_players: u8::try_from(players.len()).unwrap(),
                players,
                status: RoomStatus::InProgress,
                questions: ids,
                created_at: 0,
                started_at: Some(0),
            })
            .await
            .unwrap();

        init_match(&state, &room).await.unwrap();
        (state, store, room.id)
    }

    fn answer(uid: &str, question_id: &str, answer: &str) -> SubmitAnswerRequest {
        SubmitAnswerRequest {
            uid: uid.into(),
            question_id: question_id.into(),
            answer: answer.into(),
            is_correct: None,
            time_taken_ms: 1_200,
        }
    }

    #[tokio::test]
    async fn correctness_comes_from_the_stored_question() {
        let (state, _store, room_id) =
            started(config(false), vec![player("a", false), player("b", false)], 2).await;

        let right = submit_answer(&state, &room_id, answer("a", "q0", "right"))
            .await
            .unwrap();
        assert!(right.is_correct);
        assert_eq!(right.score, 10);
        assert_eq!(right.phase, "running");

        let mut forged = answer("b", "q0", "wrong");
        forged.is_correct = Some(true);
        let wrong = submit_answer(&state, &room_id, forged).await.unwrap();
        assert!(!wrong.is_correct);
        assert_eq!(wrong.score, 0);
        assert_eq!(wrong.phase, "answered");
    }

    #[tokio::test]
    async fn unstored_questions_trust_the_submitted_flag() {
        let (state, store, room_id) =
            started(config(false), vec![player("a", false), player("b", false)], 1).await;
        let mut node = store.find_match(&room_id).await.unwrap().unwrap();
        node.questions = vec!["external".into()];
        store.save_match(node).await.unwrap();

        let mut request = answer("a", "external", "anything");
        request.is_correct = Some(true);
        let response = submit_answer(&state, &room_id, request).await.unwrap();
        assert!(response.is_correct);

        let missing_flag = submit_answer(&state, &room_id, answer("a", "external", "x"))
            .await
            .unwrap();
        assert!(!missing_flag.is_correct);
        assert_eq!(missing_flag.score, 5);
    }

    #[tokio::test]
    async fn answers_for_foreign_questions_are_rejected() {
        let (state, store, room_id) =
            started(config(false), vec![player("a", false), player("b", false)], 2).await;

        let mut request = answer("a", "elsewhere", "right");
        request.is_correct = Some(true);
        let err = submit_answer(&state, &room_id, request).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let node = store.find_match(&room_id).await.unwrap().unwrap();
        assert!(node.player_answers["a"].is_empty());
        assert_eq!(node.scores["a"], 0);
    }

    #[tokio::test]
    async fn strangers_cannot_answer() {
        let (state, _store, room_id) =
            started(config(false), vec![player("a", false), player("b", false)], 1).await;

        let err = submit_answer(&state, &room_id, answer("mallory", "q0", "right"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn bots_answer_once_humans_are_done() {
        let mut config = config(false);
        config.bot_accuracy = 1.0;
        let (state, store, room_id) =
            started(config, vec![player("a", false), player("bot_x", true)], 2).await;

        let response = submit_answer(&state, &room_id, answer("a", "q0", "right"))
            .await
            .unwrap();
        assert_eq!(response.phase, "answered");

        let node = store.find_match(&room_id).await.unwrap().unwrap();
        assert_eq!(node.scores["bot_x"], 10);
        assert_eq!(node.player_answers["bot_x"][0].answer, "right");
    }

    #[tokio::test]
    async fn advancing_past_the_last_question_finishes_and_archives() {
        let (state, store, room_id) =
            started(config(false), vec![player("a", false), player("b", false)], 2).await;

        submit_answer(&state, &room_id, answer("a", "q0", "right"))
            .await
            .unwrap();
        submit_answer(&state, &room_id, answer("b", "q0", "wrong"))
            .await
            .unwrap();
        let next = advance_or_finish(&state, &room_id).await.unwrap();
        assert_eq!(next.phase, "running");
        assert_eq!(next.current_question_index, 1);

        let done = advance_or_finish(&state, &room_id).await.unwrap();
        assert_eq!(done.phase, "finished");
        let result = done.result.unwrap();
        assert_eq!(result.winner_id.as_deref(), Some("a"));

        let room = store.find_room(&room_id).await.unwrap().unwrap();
        assert_eq!(room.status, RoomStatus::Completed);
        let archived = list_battle_results(&state, Some("b")).await.unwrap();
        assert_eq!(archived.len(), 1);
        assert!(list_battle_results(&state, Some("z")).await.unwrap().is_empty());

        let err = submit_answer(&state, &room_id, answer("a", "q1", "right"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert!(matches!(
            advance_or_finish(&state, &room_id).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_finish_can_be_retried() {
        let mut config = config(false);
        config.transition_timeout = Duration::from_millis(50);
        let (state, store, room_id) =
            started(config, vec![player("a", false), player("b", false)], 1).await;
        submit_answer(&state, &room_id, answer("a", "q0", "right"))
            .await
            .unwrap();

        let busy_room = state.lock_room(&room_id).await;
        let err = advance_or_finish(&state, &room_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout));
        drop(busy_room);

        let node = store.find_match(&room_id).await.unwrap().unwrap();
        assert!(!node.is_finished());
        let room = store.find_room(&room_id).await.unwrap().unwrap();
        assert_eq!(room.status, RoomStatus::InProgress);
        assert!(list_battle_results(&state, None).await.unwrap().is_empty());

        let done = advance_or_finish(&state, &room_id).await.unwrap();
        assert_eq!(done.phase, "finished");
        assert_eq!(done.result.unwrap().winner_id.as_deref(), Some("a"));
        let room = store.find_room(&room_id).await.unwrap().unwrap();
        assert_eq!(room.status, RoomStatus::Completed);
        assert_eq!(list_battle_results(&state, None).await.unwrap().len(), 1);
        assert!(state.existing_coordinator(&room_id).is_none());
    }

    #[tokio::test]
    async fn stored_result_without_finished_phase_is_completed() {
        let (state, store, room_id) =
            started(config(false), vec![player("a", false), player("b", false)], 1).await;
        let mut node = store.find_match(&room_id).await.unwrap().unwrap();
        node.advance(Duration::from_secs(10), now_ms()).unwrap();
        store.save_match(node).await.unwrap();

        let done = expire_current_question(&state, &room_id).await.unwrap();
        assert_eq!(done.phase, "finished");
        let room = store.find_room(&room_id).await.unwrap().unwrap();
        assert_eq!(room.status, RoomStatus::Completed);
        assert_eq!(list_battle_results(&state, None).await.unwrap().len(), 1);

        assert!(matches!(
            advance_or_finish(&state, &room_id).await,
            Err(ServiceError::InvalidState(_))
        ));
        assert_eq!(list_battle_results(&state, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn equal_scores_are_a_draw() {
        let (state, _store, room_id) =
            started(config(false), vec![player("a", false), player("b", false)], 1).await;
        submit_answer(&state, &room_id, answer("a", "q0", "right"))
            .await
            .unwrap();
        submit_answer(&state, &room_id, answer("b", "q0", "right"))
            .await
            .unwrap();

        let done = advance_or_finish(&state, &room_id).await.unwrap();
        assert_eq!(done.result.unwrap().winner_id, None);
    }

    #[tokio::test]
    async fn manual_timeout_fills_missing_answers() {
        let (state, store, room_id) =
            started(config(false), vec![player("a", false), player("b", false)], 2).await;
        submit_answer(&state, &room_id, answer("a", "q0", "right"))
            .await
            .unwrap();

        let advanced = expire_current_question(&state, &room_id).await.unwrap();
        assert_eq!(advanced.current_question_index, 1);

        let node = store.find_match(&room_id).await.unwrap().unwrap();
        let timed_out = &node.player_answers["b"][0];
        assert_eq!(timed_out.answer, "");
        assert!(!timed_out.is_correct);
        assert_eq!(node.scores["b"], 0);
    }

    #[tokio::test]
    async fn stale_expiry_is_ignored() {
        let (state, _store, room_id) =
            started(config(false), vec![player("a", false), player("b", false)], 3).await;
        advance_or_finish(&state, &room_id).await.unwrap();

        assert!(expire_question(&state, &room_id, 0).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_times_out_the_open_question() {
        let (state, store, room_id) =
            started(config(true), vec![player("a", false), player("b", false)], 2).await;

        tokio::time::sleep(Duration::from_secs(11)).await;

        let node = store.find_match(&room_id).await.unwrap().unwrap();
        assert_eq!(node.current_question_index, 1);
        assert_eq!(node.player_answers["a"].len(), 1);
        assert_eq!(node.player_answers["b"].len(), 1);
        drop(state);
    }

    #[tokio::test]
    async fn results_are_credited_once() {
        let (state, store, room_id) = started(
            config(false),
            vec![player("a", false), player("b", false), player("bot_r", true)],
            1,
        )
        .await;
        submit_answer(&state, &room_id, answer("a", "q0", "right"))
            .await
            .unwrap();
        submit_answer(&state, &room_id, answer("b", "q0", "wrong"))
            .await
            .unwrap();

        assert!(matches!(
            evaluate_results(&state, &room_id, None).await,
            Err(ServiceError::InvalidState(_))
        ));

        let mut bot_beaten = store.find_match(&room_id).await.unwrap().unwrap();
        bot_beaten.scores.insert("bot_r".into(), 0);
        store.save_match(bot_beaten).await.unwrap();
        advance_or_finish(&state, &room_id).await.unwrap();

        let first = evaluate_results(&state, &room_id, None).await.unwrap();
        assert_eq!(first.winner_id.as_deref(), Some("a"));
        assert_eq!(first.rank_changes.len(), 2);
        let winner = &first.rank_changes[0];
        assert_eq!(winner.uid, "a");
        assert_eq!(winner.points_delta, 30);
        assert_eq!(first.rank_changes[1].points_delta, 5);

        let again = evaluate_results(&state, &room_id, Some("art".into()))
            .await
            .unwrap();
        assert_eq!(again.topic, "art");
        assert_eq!(again.rank_changes.len(), 2);

        let board = store.list_leaderboard().await.unwrap();
        let a = board.iter().find(|entry| entry.uid == "a").unwrap();
        assert_eq!((a.points, a.wins, a.battles), (30, 1, 1));
        assert!(board.iter().all(|entry| entry.uid != "bot_r"));
    }
}
