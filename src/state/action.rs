//! The closed action vocabulary and the pure transition function.
//!
//! Every mutation of the shared document is expressed as an [`Action`] and
//! applied by [`apply`], an exhaustive match so the compiler guarantees every
//! action is handled. Payloads that survive typing but fail their
//! precondition (negative indices, unknown player ids, out-of-range
//! multipliers) silently no-op: a bad client message must never corrupt the
//! shared state or crash other clients.

use serde::{Deserialize, Serialize};

use crate::state::document::{
    PLAYER_NAME_MAX, Player, RoundStatus, SoundCue, StateDocument, TEAM_NAME_MAX, TeamKey,
    default_team_name,
};
use crate::state::validate::{QuestionDraft, normalize_question, normalize_questions};

/// Wire-compatible action vocabulary, adjacently tagged as
/// `{"action": "LOCK_BUZZ", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "action",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Action {
    /// Arm the buzzers; first claim wins.
    OpenBuzz,
    /// Claim the buzzer for a team. Goes through the remote atomic procedure
    /// when a remote store is connected.
    LockBuzz {
        /// Claiming team.
        team: TeamKey,
    },
    /// Reset the live round without touching scores or the catalog.
    ResetRound,
    /// Toggle whether an answer of the current question is revealed.
    ToggleReveal {
        /// Index into the current question's answers.
        answer_index: i64,
    },
    /// Add (or subtract) points; scores never go below zero.
    AddScore {
        /// Receiving team.
        team: TeamKey,
        /// Point delta; non-finite values count as zero.
        points: f64,
    },
    /// Give a team a strike, alerting the opposing team when the striking team
    /// holds buzzer control with two or more strikes.
    AddStrike {
        /// Team receiving the strike.
        team: TeamKey,
    },
    /// Rename a team; blank names fall back to the default.
    SetTeamName {
        /// Team to rename.
        team: TeamKey,
        /// Proposed name, trimmed and capped.
        name: String,
    },
    /// Register or re-register a player, marking it active.
    RegisterPlayer {
        /// Client-chosen player id.
        id: String,
        /// Display name.
        name: String,
        /// Team the player joins.
        team: TeamKey,
    },
    /// Assign or clear a team's round captain.
    SetRoundCaptain {
        /// Team whose captain changes.
        team: TeamKey,
        /// Player id to assign, or `None`/blank to clear.
        player_id: Option<String>,
    },
    /// Change the round score multiplier (1, 2 or 3).
    SetRoundMultiplier {
        /// Requested multiplier.
        multiplier: u8,
    },
    /// Mark a single player inactive and drop it from any captain slot.
    LogoutPlayer {
        /// Player id to log out.
        id: String,
    },
    /// Mark every player inactive and force all sessions to re-authenticate.
    LogoutAllPlayers,
    /// Show or hide the join-QR overlay; without an explicit value the flag
    /// toggles.
    ToggleQr {
        /// Explicit target value, if any.
        value: Option<bool>,
    },
    /// Jump to a question by index (clamped) and reset the round.
    SetQuestionIndex {
        /// Requested index.
        index: i64,
    },
    /// Advance to the next question and reset the round.
    NextQuestion,
    /// Go back to the previous question and reset the round.
    PrevQuestion,
    /// Replace the whole question catalog.
    SetQuestions {
        /// Replacement drafts; an empty normalized result no-ops.
        questions: Vec<QuestionDraft>,
    },
    /// Replace a question by index, or append when the index is out of range.
    UpsertQuestion {
        /// Target index; `None` or out of range appends.
        index: Option<i64>,
        /// Draft to normalize and store.
        question: QuestionDraft,
    },
    /// Remove a question; the last remaining question is never deleted.
    DeleteQuestion {
        /// Index to remove.
        index: i64,
    },
    /// Zero both scores, jump to the first question and reset the round.
    ResetGame,
    /// Request a one-shot audio cue on every client.
    PlaySound {
        /// Cue to play.
        cue: SoundCue,
    },
}

impl Action {
    /// Whether this action mutates the question catalog and therefore requires
    /// remote durability before it is considered successful.
    pub fn is_catalog(&self) -> bool {
        matches!(
            self,
            Action::SetQuestions { .. }
                | Action::UpsertQuestion { .. }
                | Action::DeleteQuestion { .. }
        )
    }
}

/// Apply `action` to `doc` in place.
///
/// Pure with respect to everything but `doc`: no IO, no clock. Version and
/// timestamp bumps are the dispatcher's responsibility.
pub fn apply(doc: &mut StateDocument, action: &Action) {
    match action {
        Action::OpenBuzz => {
            doc.round.status = RoundStatus::BuzzOpen;
            doc.round.buzzer_winner = None;
        }
        Action::LockBuzz { team } => {
            if doc.round.status == RoundStatus::BuzzOpen && doc.round.buzzer_winner.is_none() {
                doc.round.buzzer_winner = Some(*team);
                doc.round.status = RoundStatus::Locked;
            }
        }
        Action::ResetRound => doc.reset_round(),
        Action::ToggleReveal { answer_index } => {
            let answer_count = doc.current_question().map_or(0, |q| q.answers.len());
            if *answer_index >= 0 && (*answer_index as usize) < answer_count {
                let index = *answer_index as usize;
                if !doc.round.revealed.remove(&index) {
                    doc.round.revealed.insert(index);
                }
            }
        }
        Action::AddScore { team, points } => {
            let points = if points.is_finite() { *points } else { 0.0 };
            let team = doc.teams.get_mut(*team);
            team.score = ((team.score as f64 + points).max(0.0)) as i64;
        }
        Action::AddStrike { team } => {
            let strikes = {
                let slot = doc.teams.get_mut(*team);
                slot.strikes += 1;
                slot.strikes
            };
            if strikes >= 2 && doc.round.buzzer_winner == Some(*team) {
                doc.ui.team_back_alert_team = Some(team.opponent());
                doc.ui.team_back_alert_version += 1;
            }
        }
        Action::SetTeamName { team, name } => {
            let trimmed = name.trim();
            doc.teams.get_mut(*team).name = if trimmed.is_empty() {
                default_team_name(*team)
            } else {
                trimmed.chars().take(TEAM_NAME_MAX).collect()
            };
        }
        Action::RegisterPlayer { id, name, team } => {
            let id = id.trim();
            let name = name.trim();
            if id.is_empty() || name.is_empty() {
                return;
            }
            let player = Player {
                id: id.to_string(),
                name: name.chars().take(PLAYER_NAME_MAX).collect(),
                team: *team,
                active: true,
            };
            match doc.players.iter_mut().find(|existing| existing.id == id) {
                Some(existing) => *existing = player,
                None => doc.players.push(player),
            }
        }
        Action::SetRoundCaptain { team, player_id } => {
            match player_id.as_deref().map(str::trim) {
                None | Some("") => *doc.round.captains.get_mut(*team) = None,
                Some(id) => {
                    let eligible = doc
                        .players
                        .iter()
                        .any(|player| player.id == id && player.active && player.team == *team);
                    if eligible {
                        *doc.round.captains.get_mut(*team) = Some(id.to_string());
                    }
                }
            }
        }
        Action::SetRoundMultiplier { multiplier } => {
            if (1..=3).contains(multiplier) {
                doc.round.points_multiplier = *multiplier;
            }
        }
        Action::LogoutPlayer { id } => {
            let id = id.trim();
            if id.is_empty() {
                return;
            }
            if let Some(player) = doc.players.iter_mut().find(|player| player.id == id) {
                player.active = false;
            }
            for slot in [TeamKey::A, TeamKey::B] {
                let captain = doc.round.captains.get_mut(slot);
                if captain.as_deref() == Some(id) {
                    *captain = None;
                }
            }
        }
        Action::LogoutAllPlayers => {
            for player in &mut doc.players {
                player.active = false;
            }
            doc.round.captains.a = None;
            doc.round.captains.b = None;
            doc.ui.logout_all_version += 1;
        }
        Action::ToggleQr { value } => {
            doc.ui.show_qr = value.unwrap_or(!doc.ui.show_qr);
        }
        Action::SetQuestionIndex { index } => {
            doc.round.question_index = clamp_index(*index, doc.questions.len());
            doc.reset_round();
        }
        Action::NextQuestion => {
            doc.round.question_index =
                clamp_index(doc.round.question_index as i64 + 1, doc.questions.len());
            doc.reset_round();
        }
        Action::PrevQuestion => {
            doc.round.question_index =
                clamp_index(doc.round.question_index as i64 - 1, doc.questions.len());
            doc.reset_round();
        }
        Action::SetQuestions { questions } => {
            let normalized = normalize_questions(questions.clone());
            if normalized.is_empty() {
                return;
            }
            doc.questions = normalized;
            doc.clamp_question_index();
            doc.reset_round();
        }
        Action::UpsertQuestion { index, question } => {
            let Some(question) = normalize_question(question.clone(), doc.questions.len()) else {
                return;
            };
            match index {
                Some(i) if *i >= 0 && (*i as usize) < doc.questions.len() => {
                    doc.questions[*i as usize] = question;
                }
                _ => doc.questions.push(question),
            }
            doc.clamp_question_index();
        }
        Action::DeleteQuestion { index } => {
            if *index < 0
                || (*index as usize) >= doc.questions.len()
                || doc.questions.len() <= 1
            {
                return;
            }
            doc.questions.remove(*index as usize);
            doc.clamp_question_index();
            doc.reset_round();
        }
        Action::ResetGame => {
            doc.teams.a.score = 0;
            doc.teams.b.score = 0;
            doc.round.question_index = 0;
            doc.reset_round();
        }
        Action::PlaySound { cue } => {
            doc.ui.sound_event = Some(*cue);
            doc.ui.sound_event_version += 1;
        }
    }
}

fn clamp_index(requested: i64, question_count: usize) -> usize {
    let max = question_count.saturating_sub(1) as i64;
    requested.clamp(0, max) as usize
}
