//! Match rules applied to [`MatchEntity`] records: scoring, answer bookkeeping,
//! question advancement and winner selection.

use std::time::Duration;

use indexmap::IndexMap;
use thiserror::Error;

use crate::dao::models::{
    BattleRoomEntity, CountdownEntity, MatchResultEntity, MatchEntity, PlayerAnswerEntity,
};

/// Points added for a correct answer.
pub const CORRECT_POINTS: u32 = 10;
/// Points removed for an incorrect answer. Scores never drop below zero.
pub const INCORRECT_PENALTY: u32 = 5;

/// Rule violations raised by match mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// A result is already stored.
    #[error("match already finished")]
    Concluded,
    /// The player is not in the match.
    #[error("`{0}` is not a participant of this match")]
    NotParticipant(String),
    /// The question is not one of the match questions.
    #[error("question `{0}` is not part of this match")]
    UnknownQuestion(String),
}

/// Result of moving past the current question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The next question opened at this index.
    Next(usize),
    /// There was no question left; the result has been recorded.
    Finished(MatchResultEntity),
}

/// Apply the score rule for one answer to `score`.
pub fn score_after(score: u32, correct: bool) -> u32 {
    if correct {
        score.saturating_add(CORRECT_POINTS)
    } else {
        score.saturating_sub(INCORRECT_PENALTY)
    }
}

/// Highest score wins; any tie at the top is a draw (`None`).
pub fn compute_winner(scores: &IndexMap<String, u32>) -> Option<String> {
    let top = scores.values().copied().max()?;
    let mut leaders = scores.iter().filter(|(_, score)| **score == top);
    let (winner, _) = leaders.next()?;
    if leaders.next().is_some() {
        None
    } else {
        Some(winner.clone())
    }
}

impl CountdownEntity {
    /// Countdown of `duration` starting at `now`.
    pub fn started(duration: Duration, now: u64) -> Self {
        let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self {
            duration_ms,
            ends_at: now.saturating_add(duration_ms),
            running: true,
            server_now: now,
        }
    }

    /// Frozen countdown reporting zero remaining time.
    pub fn stopped(now: u64) -> Self {
        Self {
            duration_ms: 0,
            ends_at: now,
            running: false,
            server_now: now,
        }
    }
}

impl MatchEntity {
    /// Build the match node of a room that just moved in progress.
    pub fn begin(room: &BattleRoomEntity, question_duration: Duration, now: u64) -> Self {
        let participants: Vec<String> = room.players.iter().map(|p| p.uid.clone()).collect();
        let bots = room
            .players
            .iter()
            .filter(|player| player.is_bot)
            .map(|player| player.uid.clone())
            .collect();
        let display_names = room
            .players
            .iter()
            .map(|player| (player.uid.clone(), player.display_name.clone()))
            .collect();
        let scores = participants.iter().map(|uid| (uid.clone(), 0)).collect();
        let player_answers = participants
            .iter()
            .map(|uid| (uid.clone(), Vec::new()))
            .collect();

        Self {
            room_id: room.id.clone(),
            topic: room.topic.clone(),
            difficulty: room.difficulty,
            participants,
            bots,
            display_names,
            questions: room.questions.clone(),
            scores,
            player_answers,
            current_question_index: 0,
            countdown: CountdownEntity::started(question_duration, now),
            result: None,
            rank_applied: false,
            rank_changes: Vec::new(),
            started_at: now,
        }
    }

    /// Whether a result is stored.
    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    /// Whether `uid` is the bot opponent.
    pub fn is_bot(&self, uid: &str) -> bool {
        self.bots.iter().any(|bot| bot == uid)
    }

    /// Participants that are not bots.
    pub fn humans(&self) -> impl Iterator<Item = &String> {
        self.participants.iter().filter(|uid| !self.is_bot(uid))
    }

    /// Identifier of the question currently open.
    pub fn current_question(&self) -> Option<&str> {
        self.questions
            .get(self.current_question_index)
            .map(String::as_str)
    }

    /// Name shown for `uid`, falling back to the uid itself.
    pub fn display_name<'a>(&'a self, uid: &'a str) -> &'a str {
        self.display_names
            .get(uid)
            .map(String::as_str)
            .unwrap_or(uid)
    }

    /// Whether `uid` already has an answer for the current question.
    pub fn has_answered(&self, uid: &str) -> bool {
        let Some(question_id) = self.current_question() else {
            return false;
        };
        self.player_answers
            .get(uid)
            .is_some_and(|answers| answers.iter().any(|a| a.question_id == question_id))
    }

    /// Participants (humans and bots) without an answer for the current question.
    pub fn unanswered(&self) -> Vec<String> {
        self.participants
            .iter()
            .filter(|uid| !self.has_answered(uid))
            .cloned()
            .collect()
    }

    /// Every human answered the open question.
    pub fn humans_answered(&self) -> bool {
        self.humans().all(|uid| self.has_answered(uid))
    }

    /// Every participant, bot included, answered the open question.
    pub fn everyone_answered(&self) -> bool {
        self.current_question().is_some() && self.unanswered().is_empty()
    }

    /// Record an answer and apply its score delta. Returns the new score of `uid`.
    ///
    /// Repeated submissions for the same question are all recorded and all scored.
    pub fn record_answer(
        &mut self,
        uid: &str,
        answer: PlayerAnswerEntity,
    ) -> Result<u32, MatchError> {
        if self.is_finished() {
            return Err(MatchError::Concluded);
        }
        if !self.participants.iter().any(|participant| participant == uid) {
            return Err(MatchError::NotParticipant(uid.to_owned()));
        }
        if !self.questions.contains(&answer.question_id) {
            return Err(MatchError::UnknownQuestion(answer.question_id));
        }

        let correct = answer.is_correct;
        self.player_answers
            .entry(uid.to_owned())
            .or_default()
            .push(answer);
        let score = self.scores.entry(uid.to_owned()).or_insert(0);
        *score = score_after(*score, correct);
        Ok(*score)
    }

    /// Open the next question, or record the result when none is left.
    pub fn advance(&mut self, question_duration: Duration, now: u64) -> Result<Advance, MatchError> {
        if self.is_finished() {
            return Err(MatchError::Concluded);
        }

        let next = self.current_question_index + 1;
        if next < self.questions.len() {
            self.current_question_index = next;
            self.countdown = CountdownEntity::started(question_duration, now);
            return Ok(Advance::Next(next));
        }

        let result = MatchResultEntity {
            winner_id: compute_winner(&self.scores),
            scores: self.scores.clone(),
            finished_at: now,
        };
        self.countdown = CountdownEntity::stopped(now);
        self.result = Some(result.clone());
        Ok(Advance::Finished(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::models::{BattlePlayerEntity, Difficulty, RoomStatus},
        state::room::bot_id,
    };

    fn player(uid: &str, is_bot: bool) -> BattlePlayerEntity {
        BattlePlayerEntity {
            uid: uid.into(),
            display_name: uid.to_uppercase(),
            is_ready: true,
            is_bot,
            joined_at: 0,
        }
    }

    fn node(questions: usize, with_bot: bool) -> MatchEntity {
        let mut players = vec![player("a", false)];
        if with_bot {
            players.push(player(&bot_id("r1"), true));
        } else {
            players.push(player("b", false));
        }
        let room = BattleRoomEntity {
            id: "r1".into(),
            host_id: "a".into(),
            name: "room".into(),
            topic: "science".into(),
            difficulty: Difficulty::Medium,
            password: None,
            is_public: true,
            max_players: 2,
            current_players: 2,
            players,
            status: RoomStatus::InProgress,
            questions: (0..questions).map(|i| format!("q{i}")).collect(),
            created_at: 0,
            started_at: Some(0),
        };
        MatchEntity::begin(&room, Duration::from_secs(10), 1_000)
    }

    fn answer(question_id: &str, is_correct: bool) -> PlayerAnswerEntity {
        PlayerAnswerEntity {
            question_id: question_id.into(),
            answer: "x".into(),
            is_correct,
            time_taken_ms: 1_500,
            submitted_at: 2_000,
        }
    }

    #[test]
    fn score_is_floored_at_zero() {
        assert_eq!(score_after(0, false), 0);
        assert_eq!(score_after(10, false), 5);
        assert_eq!(score_after(score_after(0, true), false), 5);
    }

    #[test]
    fn winner_is_highest_score_and_ties_draw() {
        let scores: IndexMap<String, u32> = [("a".into(), 80), ("b".into(), 80)].into();
        assert_eq!(compute_winner(&scores), None);

        let scores: IndexMap<String, u32> = [("a".into(), 90), ("b".into(), 60)].into();
        assert_eq!(compute_winner(&scores), Some("a".into()));

        assert_eq!(compute_winner(&IndexMap::new()), None);
    }

    #[test]
    fn begin_seeds_scores_and_countdown() {
        let node = node(3, true);
        assert_eq!(node.scores.len(), 2);
        assert!(node.scores.values().all(|score| *score == 0));
        assert_eq!(node.bots, vec!["bot_r1".to_string()]);
        assert_eq!(node.countdown.ends_at, 11_000);
        assert!(node.countdown.running);
        assert_eq!(node.display_name("a"), "A");
    }

    #[test]
    fn answers_are_scored_and_not_deduplicated() {
        let mut node = node(2, false);
        assert_eq!(node.record_answer("a", answer("q0", true)).unwrap(), 10);
        assert_eq!(node.record_answer("a", answer("q0", true)).unwrap(), 20);
        assert_eq!(node.player_answers["a"].len(), 2);
        assert!(node.has_answered("a"));
        assert!(!node.humans_answered());

        node.record_answer("b", answer("q0", false)).unwrap();
        assert!(node.everyone_answered());
    }

    #[test]
    fn strangers_cannot_answer() {
        let mut node = node(2, false);
        assert_eq!(
            node.record_answer("zed", answer("q0", true)),
            Err(MatchError::NotParticipant("zed".into()))
        );
    }

    #[test]
    fn answers_must_name_a_match_question() {
        let mut node = node(2, false);
        assert_eq!(
            node.record_answer("a", answer("q7", true)),
            Err(MatchError::UnknownQuestion("q7".into()))
        );
        assert!(node.player_answers["a"].is_empty());
        assert_eq!(node.scores["a"], 0);
    }

    #[test]
    fn bots_do_not_count_as_humans() {
        let mut node = node(2, true);
        node.record_answer("a", answer("q0", true)).unwrap();
        assert!(node.humans_answered());
        assert_eq!(node.unanswered(), vec!["bot_r1".to_string()]);
    }

    #[test]
    fn advancing_past_last_question_finishes() {
        let mut node = node(2, false);
        node.record_answer("a", answer("q0", true)).unwrap();

        assert_eq!(
            node.advance(Duration::from_secs(10), 5_000).unwrap(),
            Advance::Next(1)
        );
        assert_eq!(node.countdown.ends_at, 15_000);
        assert!(!node.has_answered("a"));

        match node.advance(Duration::from_secs(10), 9_000).unwrap() {
            Advance::Finished(result) => {
                assert_eq!(result.winner_id, Some("a".into()));
                assert_eq!(result.finished_at, 9_000);
            }
            other => panic!("expected finish, got {other:?}"),
        }
        assert!(!node.countdown.running);
        assert_eq!(
            node.record_answer("b", answer("q1", true)),
            Err(MatchError::Concluded)
        );
        assert_eq!(
            node.advance(Duration::from_secs(10), 9_500),
            Err(MatchError::Concluded)
        );
    }
}
