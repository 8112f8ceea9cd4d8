//! Coercion of untrusted documents into well-formed [`StateDocument`]s.
//!
//! Anything loaded from disk or the network goes through [`validate`], which
//! defaults and clamps instead of failing so a single malformed payload can
//! never poison the shared state.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::document::{
    Answer, PLAYER_NAME_MAX, Player, Question, RoundState, RoundStatus, SCHEMA_VERSION, SoundCue,
    StateDocument, TEAM_NAME_MAX, TeamKey, TeamPair, TeamState, UiState, default_team_name,
    now_ms,
};

/// Placeholder text for a question submitted without one.
const DEFAULT_QUESTION_TEXT: &str = "Untitled question";
/// Placeholder text for an answer submitted without one.
const DEFAULT_ANSWER_TEXT: &str = "Answer";

/// Untrusted question input as accepted from editors and storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDraft {
    /// Proposed identifier; defaulted positionally when blank.
    #[serde(default)]
    pub id: Option<String>,
    /// Proposed question text, under the historical `question` wire key.
    #[serde(default, rename = "question")]
    pub text: Option<String>,
    /// Proposed answers.
    #[serde(default)]
    pub answers: Vec<AnswerDraft>,
}

/// Untrusted answer input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerDraft {
    /// Proposed answer text.
    #[serde(default)]
    pub text: Option<String>,
    /// Proposed point value; non-finite or missing values become 0.
    #[serde(default)]
    pub points: Option<f64>,
}

/// Normalize a batch of drafts into well-formed questions.
///
/// Missing ids become positional placeholders, empty texts are defaulted,
/// whitespace-only answers are dropped, and any question left without answers
/// is dropped entirely. Running the output back through this function is a
/// no-op.
pub fn normalize_questions<I>(drafts: I) -> Vec<Question>
where
    I: IntoIterator<Item = QuestionDraft>,
{
    drafts
        .into_iter()
        .enumerate()
        .filter_map(|(index, draft)| normalize_question(draft, index))
        .collect()
}

/// Normalize a single draft, using `index` for the positional fallback id.
pub fn normalize_question(draft: QuestionDraft, index: usize) -> Option<Question> {
    let id = match draft.id {
        Some(id) if !id.trim().is_empty() => id,
        _ => format!("q{}", index + 1),
    };

    let text = match draft.text {
        Some(text) if !text.trim().is_empty() => text,
        _ => DEFAULT_QUESTION_TEXT.to_string(),
    };

    let answers: Vec<Answer> = draft
        .answers
        .into_iter()
        .filter_map(|answer| {
            let text = match answer.text {
                None => DEFAULT_ANSWER_TEXT.to_string(),
                Some(text) if text.is_empty() => DEFAULT_ANSWER_TEXT.to_string(),
                Some(text) => text,
            };
            if text.trim().is_empty() {
                return None;
            }
            let points = answer.points.filter(|p| p.is_finite()).unwrap_or(0.0);
            Some(Answer { text, points })
        })
        .collect();

    if answers.is_empty() {
        return None;
    }

    Some(Question { id, text, answers })
}

/// Rebuild a [`StateDocument`] from an arbitrary JSON value.
///
/// Non-object input yields a freshly-seeded document built from
/// `fallback_questions`. Every field is rebuilt independently with allow-lists
/// and clamps; the function never fails and is idempotent.
pub fn validate(raw: &Value, fallback_questions: &[Question]) -> StateDocument {
    let Some(map) = raw.as_object() else {
        return StateDocument::seeded(fallback_questions.to_vec(), now_ms());
    };

    let questions = match map.get("questions").and_then(Value::as_array) {
        Some(items) if !items.is_empty() => {
            normalize_questions(items.iter().map(draft_from_value))
        }
        _ => fallback_questions.to_vec(),
    };

    let players = validate_players(map.get("players"));
    let round = validate_round(map.get("round"), questions.len(), &players);

    StateDocument {
        schema_version: SCHEMA_VERSION,
        state_version: coerce_u64(map.get("stateVersion")).unwrap_or(0),
        teams: TeamPair {
            a: validate_team(team_field(map, "A"), TeamKey::A),
            b: validate_team(team_field(map, "B"), TeamKey::B),
        },
        questions,
        round,
        players,
        ui: validate_ui(map.get("ui")),
        updated_at: coerce_i64(map.get("updatedAt")).unwrap_or_else(now_ms),
    }
}

fn team_field<'a>(map: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get("teams").and_then(|teams| teams.get(key))
}

fn validate_team(raw: Option<&Value>, key: TeamKey) -> TeamState {
    let name = raw
        .and_then(|team| team.get("name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| truncate(name, TEAM_NAME_MAX))
        .unwrap_or_else(|| default_team_name(key));

    TeamState {
        name,
        score: raw
            .and_then(|team| coerce_i64(team.get("score")))
            .unwrap_or(0)
            .max(0),
        strikes: raw
            .and_then(|team| coerce_u64(team.get("strikes")))
            .unwrap_or(0) as u32,
    }
}

fn validate_round(raw: Option<&Value>, question_count: usize, players: &[Player]) -> RoundState {
    let status = raw
        .and_then(|round| round.get("status"))
        .and_then(|status| serde_json::from_value::<RoundStatus>(status.clone()).ok())
        .unwrap_or(RoundStatus::Idle);

    let buzzer_winner = raw
        .and_then(|round| round.get("buzzerWinner"))
        .and_then(team_key_from_value);

    // Keep the winner/status coupling intact: a lock without a winner falls
    // back to idle, an open buzzer cannot already have a winner.
    let (status, buzzer_winner) = match (status, buzzer_winner) {
        (RoundStatus::Locked, None) => (RoundStatus::Idle, None),
        (RoundStatus::BuzzOpen, Some(_)) => (RoundStatus::BuzzOpen, None),
        other => other,
    };

    let max_index = question_count.saturating_sub(1);
    let question_index = raw
        .and_then(|round| coerce_i64(round.get("questionIndex")))
        .unwrap_or(0)
        .clamp(0, max_index as i64) as usize;

    let revealed: BTreeSet<usize> = raw
        .and_then(|round| round.get("revealed"))
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(|value| value.as_i64())
                .filter(|&value| value >= 0)
                .map(|value| value as usize)
                .collect()
        })
        .unwrap_or_default();

    let points_multiplier = raw
        .and_then(|round| coerce_u64(round.get("pointsMultiplier")))
        .filter(|m| (1..=3).contains(m))
        .unwrap_or(1) as u8;

    let captains = TeamPair {
        a: validate_captain(raw, "A", TeamKey::A, players),
        b: validate_captain(raw, "B", TeamKey::B, players),
    };

    RoundState {
        question_index,
        status,
        buzzer_winner,
        revealed,
        points_multiplier,
        captains,
    }
}

fn validate_captain(
    round: Option<&Value>,
    slot: &str,
    team: TeamKey,
    players: &[Player],
) -> Option<String> {
    let id = round
        .and_then(|round| round.get("captains"))
        .and_then(|captains| captains.get(slot))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())?;

    players
        .iter()
        .find(|player| player.id == id && player.active && player.team == team)
        .map(|player| player.id.clone())
}

fn validate_players(raw: Option<&Value>) -> Vec<Player> {
    let Some(items) = raw.and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let id = item
                .get("id")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|id| !id.is_empty())?
                .to_string();
            let team = team_key_from_value(item.get("team")?)?;
            let name = item
                .get("name")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| truncate(name, PLAYER_NAME_MAX))
                .unwrap_or_else(|| "Player".to_string());
            let active = item
                .get("active")
                .and_then(Value::as_bool)
                .unwrap_or(false);

            Some(Player {
                id,
                name,
                team,
                active,
            })
        })
        .collect()
}

fn validate_ui(raw: Option<&Value>) -> UiState {
    UiState {
        show_qr: raw
            .and_then(|ui| ui.get("showQr"))
            .and_then(Value::as_bool)
            .unwrap_or(false),
        logout_all_version: raw
            .and_then(|ui| coerce_u64(ui.get("logoutAllVersion")))
            .unwrap_or(0),
        team_back_alert_team: raw
            .and_then(|ui| ui.get("teamBackAlertTeam"))
            .and_then(team_key_from_value),
        team_back_alert_version: raw
            .and_then(|ui| coerce_u64(ui.get("teamBackAlertVersion")))
            .unwrap_or(0),
        sound_event: raw
            .and_then(|ui| ui.get("soundEvent"))
            .and_then(|cue| serde_json::from_value::<SoundCue>(cue.clone()).ok()),
        sound_event_version: raw
            .and_then(|ui| coerce_u64(ui.get("soundEventVersion")))
            .unwrap_or(0),
    }
}

/// Build a draft from a raw JSON question, coercing loosely typed fields the
/// same way the validator does elsewhere.
pub fn draft_from_value(raw: &Value) -> QuestionDraft {
    QuestionDraft {
        id: raw.get("id").and_then(Value::as_str).map(str::to_string),
        text: raw
            .get("question")
            .and_then(Value::as_str)
            .map(str::to_string),
        answers: raw
            .get("answers")
            .and_then(Value::as_array)
            .map(|answers| {
                answers
                    .iter()
                    .map(|answer| AnswerDraft {
                        text: answer
                            .get("text")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        points: coerce_f64(answer.get("points")),
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn team_key_from_value(value: &Value) -> Option<TeamKey> {
    match value.as_str() {
        Some("A") => Some(TeamKey::A),
        Some("B") => Some(TeamKey::B),
        _ => None,
    }
}

/// Numeric coercion accepting JSON numbers and numeric strings.
fn coerce_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn coerce_i64(value: Option<&Value>) -> Option<i64> {
    coerce_f64(value).map(|f| f as i64)
}

fn coerce_u64(value: Option<&Value>) -> Option<u64> {
    coerce_f64(value).filter(|&f| f >= 0.0).map(|f| f as u64)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_questions() -> Vec<Question> {
        normalize_questions(vec![QuestionDraft {
            id: Some("q1".into()),
            text: Some("Name a fruit".into()),
            answers: vec![AnswerDraft {
                text: Some("Apple".into()),
                points: Some(40.0),
            }],
        }])
    }

    #[test]
    fn non_object_input_yields_seeded_document() {
        let fallback = sample_questions();
        let doc = validate(&json!(null), &fallback);
        assert_eq!(doc.questions, fallback);
        assert_eq!(doc.state_version, 0);
        assert_eq!(doc.round.status, RoundStatus::Idle);
        assert_eq!(doc.teams.a.name, "Team A");
    }

    #[test]
    fn validate_is_idempotent() {
        let fallback = sample_questions();
        let messy = json!({
            "stateVersion": "7",
            "teams": {
                "A": {"name": "  The Sharks  ", "score": -5, "strikes": 1},
                "B": {"score": "30"}
            },
            "questions": [
                {"id": "", "question": "  ", "answers": [
                    {"text": "Kept", "points": "12"},
                    {"text": "   ", "points": 3},
                    {"points": 5}
                ]},
                {"question": "No answers", "answers": []}
            ],
            "round": {
                "questionIndex": 99,
                "status": "bogus",
                "buzzerWinner": "C",
                "revealed": [0, -2, 1, 1],
                "pointsMultiplier": 9,
                "captains": {"A": "ghost", "B": null}
            },
            "players": [
                {"id": " p1 ", "name": "Ana", "team": "A", "active": true},
                {"id": "", "name": "dropped", "team": "B"},
                {"id": "p2", "name": "NoTeam", "team": "X"}
            ],
            "ui": {"showQr": 1, "logoutAllVersion": 2}
        });

        let once = validate(&messy, &fallback);
        let twice = validate(&serde_json::to_value(&once).unwrap(), &fallback);
        assert_eq!(once, twice);
    }

    #[test]
    fn fields_are_clamped_and_allow_listed() {
        let fallback = sample_questions();
        let raw = json!({
            "teams": {"A": {"score": -5}},
            "round": {
                "questionIndex": 42,
                "status": "nonsense",
                "buzzerWinner": "Z",
                "pointsMultiplier": 7
            }
        });

        let doc = validate(&raw, &fallback);
        assert_eq!(doc.teams.a.score, 0);
        assert_eq!(doc.round.question_index, 0);
        assert_eq!(doc.round.status, RoundStatus::Idle);
        assert_eq!(doc.round.buzzer_winner, None);
        assert_eq!(doc.round.points_multiplier, 1);
    }

    #[test]
    fn locked_status_without_winner_falls_back_to_idle() {
        let doc = validate(
            &json!({"round": {"status": "locked", "buzzerWinner": null}}),
            &sample_questions(),
        );
        assert_eq!(doc.round.status, RoundStatus::Idle);

        let doc = validate(
            &json!({"round": {"status": "buzz-open", "buzzerWinner": "A"}}),
            &sample_questions(),
        );
        assert_eq!(doc.round.status, RoundStatus::BuzzOpen);
        assert_eq!(doc.round.buzzer_winner, None);
    }

    #[test]
    fn captains_must_reference_active_players_of_their_team() {
        let raw = json!({
            "players": [
                {"id": "p1", "name": "Ana", "team": "A", "active": true},
                {"id": "p2", "name": "Bo", "team": "B", "active": false}
            ],
            "round": {"captains": {"A": "p1", "B": "p2"}}
        });

        let doc = validate(&raw, &sample_questions());
        assert_eq!(doc.round.captains.a.as_deref(), Some("p1"));
        assert_eq!(doc.round.captains.b, None);
    }

    #[test]
    fn normalize_drops_empty_questions_and_defaults_fields() {
        let normalized = normalize_questions(vec![
            QuestionDraft {
                id: None,
                text: None,
                answers: vec![
                    AnswerDraft {
                        text: None,
                        points: Some(f64::NAN),
                    },
                    AnswerDraft {
                        text: Some("  ".into()),
                        points: Some(10.0),
                    },
                ],
            },
            QuestionDraft::default(),
        ]);

        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].id, "q1");
        assert_eq!(normalized[0].text, DEFAULT_QUESTION_TEXT);
        assert_eq!(normalized[0].answers.len(), 1);
        assert_eq!(normalized[0].answers[0].text, DEFAULT_ANSWER_TEXT);
        assert_eq!(normalized[0].answers[0].points, 0.0);
    }

    #[test]
    fn points_are_coerced_from_numeric_strings() {
        let drafts = json!([{"question": "Q", "answers": [{"text": "A", "points": "25"}]}]);
        let normalized =
            normalize_questions(drafts.as_array().unwrap().iter().map(draft_from_value));
        assert_eq!(normalized[0].answers[0].points, 25.0);
    }

    #[test]
    fn empty_remote_questions_fall_back_to_local_catalog() {
        let fallback = sample_questions();
        let doc = validate(&json!({"questions": []}), &fallback);
        assert_eq!(doc.questions, fallback);
    }
}
