//! Row shapes of the two Supabase tables and the lock procedure result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dao::models::QuestionRecord;
use crate::dao::supabase::error::{SupabaseDaoError, SupabaseResult};
use crate::state::document::Question;

/// Name of the table holding one row per room document.
pub const ROOM_TABLE: &str = "game_rooms";
/// Name of the table holding one row per catalog question.
pub const QUESTION_TABLE: &str = "game_questions";
/// Server-side atomic buzzer-lock procedure.
pub const LOCK_PROCEDURE: &str = "try_lock_buzzer";

/// Row of the `game_rooms` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomRow {
    /// Room code, the table's conflict key.
    pub room_code: String,
    /// The serialized state document.
    pub state: Value,
}

/// Row returned by the `try_lock_buzzer` procedure.
#[derive(Debug, Clone, Deserialize)]
pub struct LockResultRow {
    /// Authoritative room document after the compare-and-set.
    pub state: Value,
}

/// Row of the `game_questions` table, keyed by room and position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRow {
    /// Room code owning this row.
    pub room_code: String,
    /// Zero-based position within the catalog.
    pub position: i64,
    /// Question identifier.
    pub id: String,
    /// Question text.
    pub question: String,
    /// Answers as a JSON array of `{text, points}` objects.
    pub answers: Value,
}

impl QuestionRow {
    /// Build a table row from a catalog record.
    pub fn from_record(room: &str, record: QuestionRecord) -> SupabaseResult<Self> {
        let answers = serde_json::to_value(&record.question.answers).map_err(|_| {
            // Serializing plain data cannot fail in practice; keep the error
            // path total anyway.
            SupabaseDaoError::RequestStatus {
                path: QUESTION_TABLE.into(),
                status: reqwest::StatusCode::UNPROCESSABLE_ENTITY,
            }
        })?;
        Ok(Self {
            room_code: room.to_string(),
            position: record.position as i64,
            id: record.question.id,
            question: record.question.text,
            answers,
        })
    }

    /// Convert a table row back into a catalog record, tolerating malformed
    /// answer payloads by dropping them.
    pub fn into_record(self) -> QuestionRecord {
        let answers = serde_json::from_value(self.answers).unwrap_or_default();
        QuestionRecord {
            position: self.position.max(0) as u32,
            question: Question {
                id: self.id,
                text: self.question,
                answers,
            },
        }
    }
}
