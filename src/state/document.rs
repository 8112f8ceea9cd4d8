use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Shape tag written into every document so future schema migrations can
/// recognise old snapshots.
pub const SCHEMA_VERSION: u32 = 2;

/// Maximum length kept for a team display name.
pub const TEAM_NAME_MAX: usize = 24;
/// Maximum length kept for a player display name.
pub const PLAYER_NAME_MAX: usize = 32;

/// Current wall clock in milliseconds since the Unix epoch, the resolution the
/// wire format uses for `updatedAt`.
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// One of the two fixed team slots of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeamKey {
    /// Team slot "A".
    A,
    /// Team slot "B".
    B,
}

impl TeamKey {
    /// The other team slot.
    pub fn opponent(self) -> TeamKey {
        match self {
            TeamKey::A => TeamKey::B,
            TeamKey::B => TeamKey::A,
        }
    }
}

impl std::fmt::Display for TeamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeamKey::A => f.write_str("A"),
            TeamKey::B => f.write_str("B"),
        }
    }
}

/// Fixed two-slot mapping keyed by [`TeamKey`], serialized as `{"A": .., "B": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamPair<T> {
    /// Value for team A.
    #[serde(rename = "A")]
    pub a: T,
    /// Value for team B.
    #[serde(rename = "B")]
    pub b: T,
}

impl<T> TeamPair<T> {
    /// Borrow the slot for `key`.
    pub fn get(&self, key: TeamKey) -> &T {
        match key {
            TeamKey::A => &self.a,
            TeamKey::B => &self.b,
        }
    }

    /// Mutably borrow the slot for `key`.
    pub fn get_mut(&mut self, key: TeamKey) -> &mut T {
        match key {
            TeamKey::A => &mut self.a,
            TeamKey::B => &mut self.b,
        }
    }
}

/// Score-keeping state for one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamState {
    /// Display name, trimmed and capped at [`TEAM_NAME_MAX`] characters.
    pub name: String,
    /// Accumulated score, never negative.
    pub score: i64,
    /// Strikes collected during the current round.
    pub strikes: u32,
}

/// Default display name for a team slot.
pub fn default_team_name(key: TeamKey) -> String {
    format!("Team {key}")
}

impl TeamState {
    /// Fresh team with the default name and zeroed counters.
    pub fn new(key: TeamKey) -> Self {
        Self {
            name: default_team_name(key),
            score: 0,
            strikes: 0,
        }
    }
}

/// One revealable answer on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    /// Answer text shown when revealed.
    pub text: String,
    /// Points awarded for this answer before the round multiplier.
    pub points: f64,
}

/// A question of the catalog with its ordered answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Stable identifier, defaulted positionally when missing.
    pub id: String,
    /// Question text; the wire format keeps the historical `question` key.
    #[serde(rename = "question")]
    pub text: String,
    /// Answers on the board; a question always has at least one.
    pub answers: Vec<Answer>,
}

/// Phase of the live round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoundStatus {
    /// Nothing in flight; board is at rest.
    Idle,
    /// Buzzers are armed and the first claim wins.
    BuzzOpen,
    /// A team holds the buzzer lock.
    Locked,
    /// The round has been closed out.
    RoundEnd,
}

/// The live trivia-round aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundState {
    /// Index into `questions`, always in range while the catalog is non-empty.
    pub question_index: usize,
    /// Current phase of the round.
    pub status: RoundStatus,
    /// Team holding the buzzer lock, if any.
    pub buzzer_winner: Option<TeamKey>,
    /// Indices of answers currently revealed for the active question.
    pub revealed: BTreeSet<usize>,
    /// Score multiplier for the round, one of 1, 2 or 3.
    pub points_multiplier: u8,
    /// Captain player id per team, only ever an active player of that team.
    pub captains: TeamPair<Option<String>>,
}

impl RoundState {
    fn new() -> Self {
        Self {
            question_index: 0,
            status: RoundStatus::Idle,
            buzzer_winner: None,
            revealed: BTreeSet::new(),
            points_multiplier: 1,
            captains: TeamPair { a: None, b: None },
        }
    }
}

/// A registered player; players are deactivated, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Client-chosen identifier, unique within the room.
    pub id: String,
    /// Display name, capped at [`PLAYER_NAME_MAX`] characters.
    pub name: String,
    /// Team the player registered for.
    pub team: TeamKey,
    /// Whether the player session is still live.
    pub active: bool,
}

/// One-shot audio cue fanned out to every client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SoundCue {
    /// A revealed answer was on the board.
    Correct,
    /// Strike / wrong answer.
    Incorrect,
    /// Round kickoff jingle.
    RoundStart,
    /// End-of-game fanfare.
    Victory,
}

/// Ephemeral cross-client signaling fields.
///
/// Version counters only ever grow; clients remember the last version they
/// acted on so each signal fires at most once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    /// Whether the join-QR overlay is shown on the public display.
    pub show_qr: bool,
    /// Bumped to force every player session to re-authenticate.
    pub logout_all_version: u64,
    /// Team that should see the "your turn is back" modal, if any.
    pub team_back_alert_team: Option<TeamKey>,
    /// Bumped each time the team-back alert is raised.
    pub team_back_alert_version: u64,
    /// Last requested audio cue, if any.
    pub sound_event: Option<SoundCue>,
    /// Bumped each time a cue is requested.
    pub sound_event_version: u64,
}

impl UiState {
    fn new() -> Self {
        Self {
            show_qr: false,
            logout_all_version: 0,
            team_back_alert_team: None,
            team_back_alert_version: 0,
            sound_event: None,
            sound_event_version: 0,
        }
    }
}

/// The single shared aggregate root replicated across every client of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    /// Shape tag, always [`SCHEMA_VERSION`] for documents this crate writes.
    pub schema_version: u32,
    /// Monotonic counter bumped by every locally-applied mutation; primary
    /// tie-break when reconciling concurrent copies.
    pub state_version: u64,
    /// Both team slots.
    pub teams: TeamPair<TeamState>,
    /// Ordered question catalog.
    pub questions: Vec<Question>,
    /// Live round state.
    pub round: RoundState,
    /// Player roster.
    pub players: Vec<Player>,
    /// Cross-client UI signaling.
    pub ui: UiState,
    /// Wall clock of the last mutation (ms epoch), secondary tie-break.
    pub updated_at: i64,
}

impl StateDocument {
    /// Build a freshly-seeded document from an already-normalized question set.
    pub fn seeded(questions: Vec<Question>, now: i64) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            state_version: 0,
            teams: TeamPair {
                a: TeamState::new(TeamKey::A),
                b: TeamState::new(TeamKey::B),
            },
            questions,
            round: RoundState::new(),
            players: Vec::new(),
            ui: UiState::new(),
            updated_at: now,
        }
    }

    /// Pull the question index back into range after the catalog changed.
    pub fn clamp_question_index(&mut self) {
        let max = self.questions.len().saturating_sub(1);
        if self.round.question_index > max {
            self.round.question_index = max;
        }
    }

    /// Full round reset: round phase, reveals, multiplier, captains, strikes
    /// and the pending team-back alert all go back to their rest values.
    /// Scores, roster and catalog are untouched.
    pub fn reset_round(&mut self) {
        self.round.status = RoundStatus::Idle;
        self.round.buzzer_winner = None;
        self.round.revealed.clear();
        self.round.points_multiplier = 1;
        self.round.captains = TeamPair { a: None, b: None };
        self.teams.a.strikes = 0;
        self.teams.b.strikes = 0;
        self.ui.team_back_alert_team = None;
    }

    /// The question currently on the board, if the catalog is non-empty.
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.round.question_index)
    }
}
