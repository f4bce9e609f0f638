//! AI opponents: delayed backfill of lone hosts and simulated answers.

use rand::{Rng, seq::IndexedRandom};
use tracing::{debug, info, warn};

use crate::{
    dao::models::{PlayerAnswerEntity, QuestionEntity},
    error::ServiceError,
    services::sse_events::broadcast_room_updated,
    state::{SharedState, now_ms},
};

/// Arm the backfill timer of `room_id`. No-op when backfill is disabled.
pub fn schedule_backfill(state: &SharedState, room_id: &str) {
    if !state.config().bot_backfill_enabled {
        return;
    }

    let delay = state.config().bot_backfill_delay;
    let task_state = state.clone();
    let task_room = room_id.to_owned();
    let timer = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        // fired: from here on the room gate orders us against start and leave
        task_state.release_bot(&task_room);
        if let Err(err) = backfill(&task_state, &task_room).await {
            warn!(room_id = %task_room, error = %err, "bot backfill failed");
        }
    });
    state.schedule_bot(room_id, timer);
    debug!(room_id, ?delay, "bot backfill scheduled");
}

/// Seat a ready bot when the room still waits with its host alone. Returns whether a bot
/// was added.
pub async fn backfill(state: &SharedState, room_id: &str) -> Result<bool, ServiceError> {
    let _guard = state.lock_room(room_id).await;

    let store = state.require_store().await?;
    let Some(mut room) = store.find_room(room_id).await? else {
        debug!(room_id, "bot backfill skipped: room is gone");
        return Ok(false);
    };
    if !room.needs_bot() {
        debug!(room_id, "bot backfill skipped: room no longer needs a bot");
        return Ok(false);
    }

    room.add_bot(now_ms());
    store.save_room(room.clone()).await?;
    info!(room_id, "bot joined the room");
    broadcast_room_updated(state, &room);
    Ok(true)
}

/// Answer chosen by a bot for `question_id`.
///
/// The bot is right with probability `accuracy`. A wrong answer picks another option of
/// the stored question, or stays empty when the question is unknown.
pub fn simulated_answer(
    accuracy: f64,
    question_id: &str,
    question: Option<&QuestionEntity>,
    max_time_ms: u64,
    now: u64,
) -> PlayerAnswerEntity {
    let mut rng = rand::rng();
    let is_correct = rng.random_bool(accuracy.clamp(0.0, 1.0));

    let answer = match question {
        Some(question) if is_correct => question.correct_answer.clone(),
        Some(question) => {
            let wrong: Vec<&String> = question
                .options
                .iter()
                .filter(|option| **option != question.correct_answer)
                .collect();
            wrong
                .choose(&mut rng)
                .map(|option| (*option).clone())
                .unwrap_or_default()
        }
        None => String::new(),
    };

    PlayerAnswerEntity {
        question_id: question_id.to_owned(),
        answer,
        is_correct,
        time_taken_ms: rng.random_range(0..=max_time_ms.max(1)),
        submitted_at: now,
    }
}
