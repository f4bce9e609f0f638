//! Room lifecycle rules applied to [`BattleRoomEntity`] records before they are written back.

use thiserror::Error;

use crate::dao::models::{BattlePlayerEntity, BattleRoomEntity, Difficulty, RoomStatus};

/// Display name given to backfilled opponents.
pub const BOT_DISPLAY_NAME: &str = "AI Bot";
const BOT_ID_PREFIX: &str = "bot_";
const MIN_PLAYERS_TO_START: usize = 2;

/// Rule violations raised by room mutations. A failed mutation leaves the room untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    /// Wrong password for a private room.
    #[error("invalid room password")]
    InvalidPassword,
    /// Every seat is taken.
    #[error("room is full")]
    RoomFull,
    /// The room left the waiting state.
    #[error("battle already started")]
    AlreadyStarted,
    /// The player holds no seat.
    #[error("player `{0}` is not in the room")]
    NotMember(String),
    /// Only the host may do this.
    #[error("only the host can start the battle")]
    NotHost,
    /// Too few players to start.
    #[error("at least {MIN_PLAYERS_TO_START} players are required")]
    NotEnoughPlayers,
    /// A non-host player is not ready.
    #[error("player `{0}` is not ready")]
    NotReady(String),
    /// The battle has no questions.
    #[error("no questions selected for the battle")]
    NoQuestions,
}

/// What happened when a player asked to join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A seat was taken.
    Joined,
    /// The player was already seated.
    AlreadyMember,
}

/// What happened when a player asked to leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The record must be deleted (host left or room emptied).
    Dissolved,
    /// The seat was freed.
    Left,
    /// The player held no seat.
    NotMember,
}

/// Parameters of a room about to be created.
#[derive(Debug, Clone)]
pub struct NewRoom {
    /// Display name.
    pub name: String,
    /// Question topic.
    pub topic: String,
    /// Question difficulty.
    pub difficulty: Difficulty,
    /// Set for private rooms.
    pub password: Option<String>,
    /// Seat count, clamped to the allowed range.
    pub max_players: u8,
}

/// Identifier given to the backfilled bot of `room_id`.
pub fn bot_id(room_id: &str) -> String {
    format!("{BOT_ID_PREFIX}{room_id}")
}

impl BattleRoomEntity {
    /// Fresh waiting room seeded with its (not ready) host.
    pub fn open(params: NewRoom, host_id: &str, host_name: &str, now: u64) -> Self {
        let password = params.password.filter(|password| !password.is_empty());
        let mut room = Self {
            id: String::new(),
            host_id: host_id.to_owned(),
            name: params.name,
            topic: params.topic,
            difficulty: params.difficulty,
            is_public: password.is_none(),
            password,
            max_players: params.max_players,
            current_players: 0,
            players: vec![BattlePlayerEntity::human(host_id, host_name, now)],
            status: RoomStatus::Waiting,
            questions: Vec::new(),
            created_at: now,
            started_at: None,
        };
        room.sync_player_count();
        room
    }

    /// The seat held by `uid`, if any.
    pub fn player(&self, uid: &str) -> Option<&BattlePlayerEntity> {
        self.players.iter().find(|player| player.uid == uid)
    }

    /// Whether `uid` holds a seat.
    pub fn is_member(&self, uid: &str) -> bool {
        self.player(uid).is_some()
    }

    /// Whether a stranger could take a seat through quick match.
    pub fn is_open(&self) -> bool {
        self.is_public
            && self.status == RoomStatus::Waiting
            && usize::from(self.current_players) < usize::from(self.max_players)
    }

    /// Add `uid` to the room. Checks run in a fixed order and stop at the first failure.
    pub fn join(
        &mut self,
        uid: &str,
        display_name: &str,
        password: Option<&str>,
        now: u64,
    ) -> Result<JoinOutcome, RoomError> {
        if self.is_member(uid) {
            return Ok(JoinOutcome::AlreadyMember);
        }
        if let Some(expected) = self.password.as_deref() {
            if password != Some(expected) {
                return Err(RoomError::InvalidPassword);
            }
        }
        if self.current_players >= self.max_players {
            return Err(RoomError::RoomFull);
        }
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::AlreadyStarted);
        }

        self.players
            .push(BattlePlayerEntity::human(uid, display_name, now));
        self.sync_player_count();
        Ok(JoinOutcome::Joined)
    }

    /// Remove `uid`. The host leaving or the last player leaving dissolves the room.
    pub fn leave(&mut self, uid: &str) -> LeaveOutcome {
        if !self.is_member(uid) {
            return LeaveOutcome::NotMember;
        }
        if uid == self.host_id {
            return LeaveOutcome::Dissolved;
        }

        self.players.retain(|player| player.uid != uid);
        self.sync_player_count();
        if self.players.is_empty() {
            LeaveOutcome::Dissolved
        } else {
            LeaveOutcome::Left
        }
    }

    /// Toggle the ready flag of `uid`. Idempotent.
    pub fn set_ready(&mut self, uid: &str, ready: bool) -> Result<(), RoomError> {
        let player = self
            .players
            .iter_mut()
            .find(|player| player.uid == uid)
            .ok_or_else(|| RoomError::NotMember(uid.to_owned()))?;
        player.is_ready = ready;
        Ok(())
    }

    /// Check that `requested_by` may start the battle now.
    pub fn ensure_startable(&self, requested_by: &str) -> Result<(), RoomError> {
        if requested_by != self.host_id {
            return Err(RoomError::NotHost);
        }
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::AlreadyStarted);
        }
        if self.players.len() < MIN_PLAYERS_TO_START {
            return Err(RoomError::NotEnoughPlayers);
        }
        if let Some(player) = self.players.iter().find(|player| !player.is_ready) {
            return Err(RoomError::NotReady(player.uid.clone()));
        }
        Ok(())
    }

    /// Move the room in progress with its final question list.
    pub fn begin(
        &mut self,
        requested_by: &str,
        questions: Vec<String>,
        now: u64,
    ) -> Result<(), RoomError> {
        self.ensure_startable(requested_by)?;
        if questions.is_empty() {
            return Err(RoomError::NoQuestions);
        }

        self.status = RoomStatus::InProgress;
        self.questions = questions;
        self.started_at = Some(now);
        Ok(())
    }

    /// Mark the room finished. Returns `false` when the status would move backwards.
    pub fn complete(&mut self) -> bool {
        if !self.status.can_move_to(RoomStatus::Completed) {
            return false;
        }
        self.status = RoomStatus::Completed;
        true
    }

    /// Whether a bot should be added to keep a lone host company.
    pub fn needs_bot(&self) -> bool {
        self.status == RoomStatus::Waiting
            && self.players.len() == 1
            && self.players.iter().all(|player| !player.is_bot)
    }

    /// Seat a ready bot opponent.
    pub fn add_bot(&mut self, now: u64) {
        self.players.push(BattlePlayerEntity {
            uid: bot_id(&self.id),
            display_name: BOT_DISPLAY_NAME.to_owned(),
            is_ready: true,
            is_bot: true,
            joined_at: now,
        });
        self.sync_player_count();
    }

    /// Rewrite `current_players` from the player list. Returns whether it changed.
    pub fn sync_player_count(&mut self) -> bool {
        let count = u8::try_from(self.players.len()).unwrap_or(u8::MAX);
        let changed = self.current_players != count;
        self.current_players = count;
        changed
    }
}

impl BattlePlayerEntity {
    fn human(uid: &str, display_name: &str, now: u64) -> Self {
        Self {
            uid: uid.to_owned(),
            display_name: display_name.to_owned(),
            is_ready: false,
            is_bot: false,
            joined_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(max_players: u8, password: Option<&str>) -> BattleRoomEntity {
        let mut room = BattleRoomEntity::open(
            NewRoom {
                name: "Lunch break".into(),
                topic: "geography".into(),
                difficulty: Difficulty::Easy,
                password: password.map(str::to_owned),
                max_players,
            },
            "host",
            "Host",
            10,
        );
        room.id = "r1".into();
        room
    }

    #[test]
    fn open_room_seeds_host() {
        let room = room(4, None);
        assert_eq!(room.current_players, 1);
        assert!(room.is_public);
        assert!(!room.players[0].is_ready);
        assert_eq!(room.status, RoomStatus::Waiting);
    }

    #[test]
    fn empty_password_means_public() {
        let room = room(4, Some(""));
        assert!(room.is_public);
        assert!(room.password.is_none());
    }

    #[test]
    fn joining_a_full_room_changes_nothing() {
        let mut room = room(2, None);
        room.join("p2", "Two", None, 11).unwrap();
        let before = room.clone();

        assert_eq!(room.join("p3", "Three", None, 12), Err(RoomError::RoomFull));
        assert_eq!(room, before);
    }

    #[test]
    fn password_is_checked_before_capacity() {
        let mut room = room(2, Some("secret"));
        assert_eq!(
            room.join("p2", "Two", Some("nope"), 11),
            Err(RoomError::InvalidPassword)
        );
        assert_eq!(
            room.join("p2", "Two", Some("secret"), 11),
            Ok(JoinOutcome::Joined)
        );
        assert_eq!(
            room.join("p3", "Three", Some("wrong"), 12),
            Err(RoomError::InvalidPassword)
        );
        assert_eq!(
            room.join("p3", "Three", Some("secret"), 12),
            Err(RoomError::RoomFull)
        );
    }

    #[test]
    fn rejoining_is_a_no_op() {
        let mut room = room(2, Some("secret"));
        assert_eq!(
            room.join("host", "Host", None, 11),
            Ok(JoinOutcome::AlreadyMember)
        );
        assert_eq!(room.current_players, 1);
    }

    #[test]
    fn started_rooms_refuse_newcomers() {
        let mut room = room(4, None);
        room.status = RoomStatus::InProgress;
        assert_eq!(
            room.join("p2", "Two", None, 11),
            Err(RoomError::AlreadyStarted)
        );
    }

    #[test]
    fn host_leaving_dissolves_the_room() {
        let mut room = room(4, None);
        room.join("p2", "Two", None, 11).unwrap();
        assert_eq!(room.leave("host"), LeaveOutcome::Dissolved);
    }

    #[test]
    fn guest_leaving_keeps_counts_consistent() {
        let mut room = room(4, None);
        room.join("p2", "Two", None, 11).unwrap();
        room.join("p3", "Three", None, 12).unwrap();

        assert_eq!(room.leave("p2"), LeaveOutcome::Left);
        assert_eq!(room.current_players as usize, room.players.len());
        assert_eq!(room.leave("ghost"), LeaveOutcome::NotMember);
    }

    #[test]
    fn start_requires_host_and_ready_players() {
        let mut room = room(4, None);
        assert_eq!(room.ensure_startable("host"), Err(RoomError::NotEnoughPlayers));

        room.join("p2", "Two", None, 11).unwrap();
        room.set_ready("host", true).unwrap();
        assert_eq!(
            room.ensure_startable("host"),
            Err(RoomError::NotReady("p2".into()))
        );

        room.set_ready("p2", true).unwrap();
        assert_eq!(room.ensure_startable("p2"), Err(RoomError::NotHost));
        assert_eq!(room.begin("host", vec![], 20), Err(RoomError::NoQuestions));

        room.begin("host", vec!["q1".into()], 20).unwrap();
        assert_eq!(room.status, RoomStatus::InProgress);
        assert_eq!(room.started_at, Some(20));
        assert!(room.complete());
        assert!(!room.complete());
    }

    #[test]
    fn set_ready_on_unknown_player_fails() {
        let mut room = room(4, None);
        assert_eq!(
            room.set_ready("ghost", true),
            Err(RoomError::NotMember("ghost".into()))
        );
    }

    #[test]
    fn bot_backfill_only_for_lone_host() {
        let mut room = room(4, None);
        assert!(room.needs_bot());

        room.add_bot(30);
        assert!(!room.needs_bot());
        assert_eq!(room.players[1].uid, "bot_r1");
        assert!(room.players[1].is_ready);
        assert_eq!(room.current_players, 2);
    }

    #[test]
    fn sync_repairs_drifted_count() {
        let mut room = room(4, None);
        room.current_players = 3;
        assert!(room.sync_player_count());
        assert!(!room.sync_player_count());
        assert_eq!(room.current_players, 1);
    }
}
