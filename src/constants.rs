//! Configuration constants for the Flashcard Frenzy session core
//!
//! This module contains all the configuration limits and constraints
//! used throughout the session core to ensure data integrity and
//! provide consistent boundaries for different game components.

/// Room roster configuration constants
pub mod roster {
    /// Maximum number of players allowed in a single room
    pub const MAX_PLAYERS: usize = 8;
    /// Minimum number of ready players required to start a match
    pub const MIN_READY_PLAYERS: usize = 2;
    /// Maximum length of a player username in characters
    pub const MAX_USERNAME_LENGTH: usize = 50;
}

/// Flashcard content configuration constants
pub mod flashcard {
    /// Maximum length of a flashcard question in characters
    pub const MAX_QUESTION_LENGTH: usize = 500;
    /// Maximum length of a flashcard answer in characters
    pub const MAX_ANSWER_LENGTH: usize = 200;
    /// Minimum point value a flashcard may carry
    pub const MIN_POINTS: u64 = 1;
    /// Maximum point value a flashcard may carry
    pub const MAX_POINTS: u64 = 10_000;
    /// Maximum number of flashcards in a single set
    pub const MAX_SET_SIZE: usize = 500;
}

/// Room registry configuration constants
pub mod registry {
    /// Default idle time in seconds before a room is eligible for teardown
    pub const IDLE_TIMEOUT_SECS: u64 = 600;
}
