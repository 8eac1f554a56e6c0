//! Match outcome recording and persistence hand-off
//!
//! This module accumulates one [`PlayedRecord`] per resolved question during
//! a session and produces the finalized [`MatchResult`] exactly once, when
//! the session ends. The finalized result is handed to the external
//! persistence collaborator; a save failure never rolls the session back.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;
use web_time::SystemTime;

use crate::{
    deck::Flashcard,
    room_id::RoomId,
    roster::{Id, Roster},
};

/// Immutable log entry for one resolved question
///
/// Appended in question order, one entry per card advanced past. A skipped
/// card (no accepted correct answer) leaves `answered_by` and `is_correct`
/// absent. Field names follow the persisted document shape.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayedRecord {
    /// Stable identifier of the source flashcard
    pub id: String,
    /// The question that was asked
    pub question: String,
    /// The expected answer
    pub answer: String,
    /// Points the card was worth
    pub points: u64,
    /// Username of the player whose correct answer was accepted
    pub answered_by: Option<String>,
    /// Whether the accepted answer was correct
    pub is_correct: Option<bool>,
}

impl PlayedRecord {
    /// Builds the record for a card that was answered correctly
    pub fn answered(card: &Flashcard, username: &str) -> Self {
        Self {
            id: card.id.clone(),
            question: card.question.clone(),
            answer: card.answer.clone(),
            points: card.points,
            answered_by: Some(username.to_owned()),
            is_correct: Some(true),
        }
    }

    /// Builds the record for a card nobody answered correctly
    pub fn skipped(card: &Flashcard) -> Self {
        Self {
            id: card.id.clone(),
            question: card.question.clone(),
            answer: card.answer.clone(),
            points: card.points,
            answered_by: None,
            is_correct: None,
        }
    }
}

/// A player's final standing within a match result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResult {
    /// Unique identifier of the player
    pub id: Id,
    /// Display name of the player
    pub username: String,
    /// Final score at the moment of finalization
    pub score: u64,
}

/// The finalized, persisted summary of one match
///
/// Created exactly once, when the session transitions to finished, and
/// immutable thereafter. Field names match the persisted document shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    /// The room this match was played in
    pub room_id: RoomId,
    /// Final roster snapshot with scores
    pub players: Vec<PlayerResult>,
    /// Per-question outcomes in question order
    pub flashcards_played: Vec<PlayedRecord>,
    /// When the match result was finalized
    pub created_at: SystemTime,
}

/// Error reported by the external persistence collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to save match results: {0}")]
pub struct PersistenceError(
    /// Human-readable reason the result could not be stored
    pub String,
);

/// External collaborator that durably stores finalized match results
///
/// Called once per session by [`MatchRecorder::finalize`]. Retry policy
/// belongs to the implementation, not to the session core.
pub trait MatchPersistence {
    /// Saves a finalized match result
    ///
    /// # Errors
    ///
    /// Returns a `PersistenceError` describing why the result could not be
    /// stored.
    fn save(&self, result: &MatchResult) -> Result<(), PersistenceError>;
}

/// Accumulates per-question outcomes and finalizes them once
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MatchRecorder {
    /// One record per question resolved so far, in question order
    played: Vec<PlayedRecord>,

    /// The finalized result (computed once when the session ends)
    #[serde(skip)]
    result: once_cell_serde::sync::OnceCell<MatchResult>,
}

impl MatchRecorder {
    /// Appends the outcome of one resolved question
    pub fn record(&mut self, record: PlayedRecord) {
        self.played.push(record);
    }

    /// The outcomes recorded so far, in question order
    pub fn played(&self) -> &[PlayedRecord] {
        &self.played
    }

    /// Number of questions resolved so far
    pub fn len(&self) -> usize {
        self.played.len()
    }

    /// Whether no questions have been resolved yet
    pub fn is_empty(&self) -> bool {
        self.played.is_empty()
    }

    /// Discards all recorded outcomes and any finalized result
    pub fn clear(&mut self) {
        self.played.clear();
        self.result = once_cell_serde::sync::OnceCell::new();
    }

    /// The finalized result, if the match has ended
    pub fn result(&self) -> Option<&MatchResult> {
        self.result.get()
    }

    /// Finalizes the match and hands the result to the persistence collaborator
    ///
    /// The first call snapshots the roster and played log, stamps the
    /// creation time and attempts the save; subsequent calls return the
    /// cached result without saving again.
    ///
    /// # Errors
    ///
    /// Returns the `PersistenceError` from the collaborator if the save
    /// failed. The result is still finalized and available through
    /// [`MatchRecorder::result`]; the caller treats the failure as a
    /// non-fatal warning.
    pub fn finalize<P: MatchPersistence>(
        &self,
        room_id: RoomId,
        roster: &Roster,
        persistence: &P,
    ) -> Result<&MatchResult, PersistenceError> {
        let mut save_error = None;

        let result = self.result.get_or_init(|| {
            let result = MatchResult {
                room_id,
                players: roster
                    .players()
                    .iter()
                    .map(|p| PlayerResult {
                        id: p.id,
                        username: p.username.clone(),
                        score: p.score,
                    })
                    .collect(),
                flashcards_played: self.played.clone(),
                created_at: SystemTime::now(),
            };

            if let Err(error) = persistence.save(&result) {
                save_error = Some(error);
            }

            result
        });

        match save_error {
            Some(error) => Err(error),
            None => Ok(result),
        }
    }
}
