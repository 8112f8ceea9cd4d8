//! Backend-agnostic persistence models shared by every remote adapter.

use serde::{Deserialize, Serialize};

use crate::state::document::Question;

/// One row of the remote question catalog: a question at a position.
///
/// The catalog lives in its own table, keyed by room and position, to keep the
/// room document small; positions define the play order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// Zero-based position within the catalog.
    pub position: u32,
    /// The question stored at that position.
    pub question: Question,
}

/// Enumerate a catalog into positioned records.
pub fn records_from_questions(questions: &[Question]) -> Vec<QuestionRecord> {
    questions
        .iter()
        .cloned()
        .enumerate()
        .map(|(position, question)| QuestionRecord {
            position: position as u32,
            question,
        })
        .collect()
}

/// Rebuild an ordered catalog from records, sorting by position.
pub fn questions_from_records(mut records: Vec<QuestionRecord>) -> Vec<Question> {
    records.sort_by_key(|record| record.position);
    records.into_iter().map(|record| record.question).collect()
}
