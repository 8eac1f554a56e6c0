//! Flashcard deck construction and access
//!
//! This module defines the validated input shapes delivered by the external
//! flashcard-set source, the session-scoped [`Flashcard`] with its
//! answered-by annotations, and the ordered, fixed-length [`Deck`] built once
//! at match start.

use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;
use web_time::SystemTime;

/// A flashcard as delivered by the external source
///
/// The question, answer and point value are validated on deck construction;
/// the ID is carried through unchanged so persisted match results can refer
/// back to the source card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RawFlashcard {
    /// Stable identifier carried from the source
    #[garde(skip)]
    pub id: String,
    /// The question shown on the front of the card
    #[garde(length(min = 1, max = crate::constants::flashcard::MAX_QUESTION_LENGTH))]
    pub question: String,
    /// The answer shown on the back of the card
    #[garde(length(min = 1, max = crate::constants::flashcard::MAX_ANSWER_LENGTH))]
    pub answer: String,
    /// Points awarded for answering this card correctly
    #[garde(range(
        min = crate::constants::flashcard::MIN_POINTS,
        max = crate::constants::flashcard::MAX_POINTS,
    ))]
    pub points: u64,
}

/// A named collection of flashcards fetched from the external source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct FlashcardSet {
    /// Cards in this set, in source order
    #[garde(length(max = crate::constants::flashcard::MAX_SET_SIZE), dive)]
    pub flashcards: Vec<RawFlashcard>,
}

/// A flashcard within a running session
///
/// The question, answer and points are immutable once the deck is built.
/// `answered_by` and `answered_at` are session-scoped annotations: they are
/// set by the first accepted submission and cleared whenever the card
/// becomes current again.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    /// Stable identifier carried from the source
    pub id: String,
    /// The question shown on the front of the card
    pub question: String,
    /// The answer shown on the back of the card
    pub answer: String,
    /// Points awarded for answering this card correctly
    pub points: u64,
    /// Username of the player whose correct answer was accepted first
    pub answered_by: Option<String>,
    /// When the most recent submission for this card was accepted
    pub answered_at: Option<SystemTime>,
}

impl Flashcard {
    fn from_raw(raw: RawFlashcard) -> Self {
        Self {
            id: raw.id,
            question: raw.question,
            answer: raw.answer,
            points: raw.points,
            answered_by: None,
            answered_at: None,
        }
    }

    /// Whether a correct answer has already been accepted for this card
    pub fn is_resolved(&self) -> bool {
        self.answered_by.is_some()
    }

    /// Clears the session-scoped annotations
    pub(crate) fn clear_annotations(&mut self) {
        self.answered_by = None;
        self.answered_at = None;
    }
}

/// Errors that can occur when building or accessing a deck
#[derive(Error, Debug)]
pub enum Error {
    /// The flattened source sets contained no flashcards
    #[error("no flashcards available to play")]
    EmptyDeck,
    /// A card was requested at a position outside the deck
    #[error("card index {index} out of range for deck of {len}")]
    IndexOutOfRange {
        /// The requested position
        index: usize,
        /// The deck length
        len: usize,
    },
    /// A source set failed content validation
    #[error("invalid flashcard set: {0}")]
    Invalid(#[from] garde::Report),
}

/// The fixed, ordered sequence of flashcards for one session
///
/// Built once at match start by flattening the source sets in order; never
/// reordered afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Deck {
    cards: Vec<Flashcard>,
}

impl Deck {
    /// Builds a deck by flattening the provided sets in order
    ///
    /// Cards keep set order first, then within-set order.
    ///
    /// # Errors
    ///
    /// Returns `Error::Invalid` if any set fails content validation, or
    /// `Error::EmptyDeck` if the flattened result has no cards.
    pub fn build(sets: Vec<FlashcardSet>) -> Result<Self, Error> {
        for set in &sets {
            set.validate()?;
        }

        let cards: Vec<Flashcard> = sets
            .into_iter()
            .flat_map(|set| set.flashcards)
            .map(Flashcard::from_raw)
            .collect();

        if cards.is_empty() {
            return Err(Error::EmptyDeck);
        }

        Ok(Self { cards })
    }

    /// Gets the card at `index`
    ///
    /// # Errors
    ///
    /// Returns `Error::IndexOutOfRange` if `index` is past the end.
    pub fn at(&self, index: usize) -> Result<&Flashcard, Error> {
        self.cards.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.cards.len(),
        })
    }

    /// Gets the card at `index` mutably, for session annotations
    pub(crate) fn at_mut(&mut self, index: usize) -> Result<&mut Flashcard, Error> {
        let len = self.cards.len();
        self.cards
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })
    }

    /// Total number of cards, fixed after `build`
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Whether the deck has no cards
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}
