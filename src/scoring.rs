//! Pure scoring rules
//!
//! Scoring is a pure function of the current card and the graded submission;
//! all score mutation flows through the roster using the delta computed here.

use crate::deck::Flashcard;

/// Computes the score delta for a graded submission
///
/// A correct answer is worth the card's full point value; an incorrect
/// answer is worth nothing. No side effects.
pub fn award(card: &Flashcard, is_correct: bool) -> u64 {
    if is_correct { card.points } else { 0 }
}
