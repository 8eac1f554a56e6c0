//! Core session state machine
//!
//! This module contains the per-room [`Session`] aggregate and the logic for
//! driving one match through its lifecycle: lobby, question progression,
//! scoring and match-result finalization. Commands arrive as discrete,
//! atomic operations; every committed command emits a state-changed event
//! through a caller-supplied sink, in commit order.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;
use web_time::SystemTime;

use crate::{
    deck::{self, Deck, Flashcard, FlashcardSet},
    recorder::{MatchPersistence, MatchRecorder, PersistenceError, PlayedRecord},
    room_id::RoomId,
    roster::{self, Id, Player, Profile, Roster},
    scoring,
};

/// The lifecycle phase of a room
///
/// A session moves from waiting through in-progress to finished; the only
/// way back to waiting is an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Lobby: players join and mark themselves ready
    Waiting,
    /// A match is running; one card is current at a time
    InProgress,
    /// The match ended and its result has been finalized
    Finished,
}

/// Error reported by the external flashcard-set source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SourceError(
    /// Human-readable reason the sets could not be loaded
    pub String,
);

/// External collaborator supplying the flashcard sets for a match
///
/// Consulted once per match, when the host starts the game.
pub trait FlashcardSetSource {
    /// Fetches every available flashcard set
    ///
    /// # Errors
    ///
    /// Returns a `SourceError` if the sets could not be loaded.
    fn fetch_all(&self) -> Result<Vec<FlashcardSet>, SourceError>;
}

/// Errors produced by rejected session commands
///
/// A rejected command leaves the session unmodified; every variant carries
/// a human-readable message suitable for direct display.
#[derive(Error, Debug)]
pub enum Error {
    /// Fewer than the required number of ready players
    #[error("need at least 2 players ready to start")]
    NotReady,
    /// Start was requested outside the lobby
    #[error("the game has already started")]
    AlreadyStarted,
    /// A gameplay command arrived while no question is active
    #[error("no question is currently active")]
    NoActiveQuestion,
    /// A host-only command came from a non-host player
    #[error("only the host can do that")]
    Forbidden,
    /// A resave was requested before any match finished
    #[error("no finished match to save")]
    NothingToSave,
    /// The flashcard-set source could not be reached
    #[error("could not load flashcard sets: {0}")]
    SourceUnavailable(#[from] SourceError),
    /// A roster operation failed
    #[error(transparent)]
    Roster(#[from] roster::Error),
    /// A deck operation failed
    #[error(transparent)]
    Deck(#[from] deck::Error),
    /// The persistence collaborator reported a failure
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// A discrete command dispatched into a session
///
/// This is the closed set of operations the transport layer may carry;
/// payloads are validated here before any state is touched.
#[derive(Debug, Clone, Deserialize)]
pub enum Command {
    /// A player joins the room
    Join(Profile),
    /// A player toggles their readiness in the lobby
    Ready {
        /// The player changing their readiness
        player: Id,
        /// The new readiness value
        ready: bool,
    },
    /// The host starts the match
    Start {
        /// The player issuing the command
        player: Id,
    },
    /// A player submits a graded answer for the current card
    Answer {
        /// The submitting player
        player: Id,
        /// Whether the submission was graded correct
        is_correct: bool,
    },
    /// The host advances past the current card
    Advance {
        /// The player issuing the command
        player: Id,
    },
    /// A player leaves the room
    Leave {
        /// The departing player
        player: Id,
    },
    /// The room returns to the lobby for another match
    Reset,
}

/// Read-only view of a session, sent to clients after every commit
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// The room this snapshot describes
    pub room_id: RoomId,
    /// Current lifecycle phase
    pub status: Status,
    /// All players in join order
    pub players: Vec<Player>,
    /// Position of the current card, if a match has started
    pub current_index: Option<usize>,
    /// The current card, if a match is in progress
    pub current_card: Option<Flashcard>,
    /// Total number of cards in this match's deck
    pub deck_len: usize,
    /// Number of questions resolved so far
    pub played: usize,
}

/// Events emitted by a session, in the exact order commands commit
#[derive(Debug, Clone, Serialize, derive_more::From)]
pub enum Event {
    /// A command committed and produced this new state
    StateChanged(Snapshot),
    /// The finalized match result was stored durably
    #[from(ignore)]
    MatchSaved {
        /// The room whose result was stored
        room_id: RoomId,
    },
    /// The match ended but its result could not be stored
    #[from(ignore)]
    PersistenceFailed {
        /// The room whose result was not stored
        room_id: RoomId,
        /// Human-readable description of the failure
        message: String,
    },
}

impl Event {
    /// Converts the event to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// One isolated game session, identified by its room ID
///
/// The session exclusively owns its roster, deck and played log. All
/// transition methods are synchronous read-modify-write operations: a room
/// must be driven by a single logical writer at a time, which makes each
/// command atomic and serializes near-simultaneous submissions.
#[derive(Serialize, Deserialize)]
pub struct Session {
    /// The room this session belongs to
    room_id: RoomId,
    /// Current lifecycle phase
    status: Status,
    /// Players in the room
    roster: Roster,
    /// The deck for the running match; empty while waiting
    deck: Deck,
    /// Position of the current card; `None` while waiting
    current_index: Option<usize>,
    /// Per-question outcome log and finalization
    recorder: MatchRecorder,
    /// When the last command committed, for idle teardown
    last_activity: SystemTime,
}

impl Debug for Session {
    /// Custom debug implementation that avoids printing large amounts of data
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("room_id", &self.room_id)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates an empty session in the waiting state
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            status: Status::Waiting,
            roster: Roster::default(),
            deck: Deck::default(),
            current_index: None,
            recorder: MatchRecorder::default(),
            last_activity: SystemTime::now(),
        }
    }

    /// The room this session belongs to
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Current lifecycle phase
    pub fn status(&self) -> Status {
        self.status
    }

    /// The players currently in the room
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// When the last command committed
    pub fn last_activity(&self) -> SystemTime {
        self.last_activity
    }

    /// The card currently being played, if a match is in progress
    pub fn current_card(&self) -> Option<&Flashcard> {
        match (self.status, self.current_index) {
            (Status::InProgress, Some(index)) => self.deck.at(index).ok(),
            _ => None,
        }
    }

    /// Read-only view of the current state
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            room_id: self.room_id,
            status: self.status,
            players: self.roster.players().to_vec(),
            current_index: self.current_index,
            current_card: self.current_card().cloned(),
            deck_len: self.deck.len(),
            played: self.recorder.len(),
        }
    }

    /// Stamps activity, emits the state-changed event and returns the snapshot
    fn commit<E: FnMut(Event)>(&mut self, emit: &mut E) -> Snapshot {
        self.last_activity = SystemTime::now();
        let snapshot = self.snapshot();
        emit(snapshot.clone().into());
        snapshot
    }

    fn require_host(&self, player: Id) -> Result<(), Error> {
        let caller = self.roster.get(player).ok_or(roster::Error::UnknownPlayer)?;
        if caller.is_host {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }

    /// Dispatches a command to the matching transition method
    ///
    /// # Errors
    ///
    /// Returns the typed failure of the underlying transition; the session
    /// is unmodified on any rejected command.
    pub fn apply<S, P, E>(
        &mut self,
        command: Command,
        source: &S,
        persistence: &P,
        emit: &mut E,
    ) -> Result<Snapshot, Error>
    where
        S: FlashcardSetSource,
        P: MatchPersistence,
        E: FnMut(Event),
    {
        match command {
            Command::Join(profile) => self.join(profile, emit),
            Command::Ready { player, ready } => self.set_ready(player, ready, emit),
            Command::Start { player } => self.start(player, source, emit),
            Command::Answer { player, is_correct } => {
                self.submit_answer(player, is_correct, emit)
            }
            Command::Advance { player } => self.advance(player, persistence, emit),
            Command::Leave { player } => self.leave(player, emit),
            Command::Reset => self.reset(emit),
        }
    }

    /// Adds a player to the room
    ///
    /// Idempotent by player ID; the first joiner becomes the host.
    ///
    /// # Errors
    ///
    /// Returns a roster error if the room is full or the username invalid.
    pub fn join<E: FnMut(Event)>(
        &mut self,
        profile: Profile,
        emit: &mut E,
    ) -> Result<Snapshot, Error> {
        let player = self.roster.join(profile)?;
        tracing::info!(room = %self.room_id, player = %player.username, "player joined");
        Ok(self.commit(emit))
    }

    /// Toggles a player's readiness
    ///
    /// # Errors
    ///
    /// Returns `UnknownPlayer` if the ID is not in the roster.
    pub fn set_ready<E: FnMut(Event)>(
        &mut self,
        player: Id,
        ready: bool,
        emit: &mut E,
    ) -> Result<Snapshot, Error> {
        self.roster.set_ready(player, ready)?;
        Ok(self.commit(emit))
    }

    /// Marks a player as connected or disconnected
    ///
    /// Driven by the transport layer, not by client commands. A
    /// disconnected player keeps their seat and score; rejoining with the
    /// same ID reactivates them.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPlayer` if the ID is not in the roster.
    pub fn set_active<E: FnMut(Event)>(
        &mut self,
        player: Id,
        active: bool,
        emit: &mut E,
    ) -> Result<Snapshot, Error> {
        self.roster.set_active(player, active)?;
        Ok(self.commit(emit))
    }

    /// Starts the match: builds the deck and deals the first card
    ///
    /// Resets every score to zero and clears readiness, so a rematch always
    /// starts from a clean slate.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for a non-host caller, `AlreadyStarted` outside
    /// the lobby, `NotReady` without quorum, `SourceUnavailable` if the
    /// sets cannot be fetched, and `EmptyDeck` if they contain no cards.
    pub fn start<S: FlashcardSetSource, E: FnMut(Event)>(
        &mut self,
        player: Id,
        source: &S,
        emit: &mut E,
    ) -> Result<Snapshot, Error> {
        self.require_host(player)?;
        if self.status != Status::Waiting {
            return Err(Error::AlreadyStarted);
        }
        if !self.roster.can_start() {
            return Err(Error::NotReady);
        }

        // Fetch and build fully before mutating any session state, so a
        // failed start leaves the lobby untouched
        let sets = source.fetch_all()?;
        let deck = Deck::build(sets)?;

        self.deck = deck;
        self.current_index = Some(0);
        self.status = Status::InProgress;
        self.recorder.clear();
        self.roster.reset_scores();

        tracing::info!(room = %self.room_id, cards = self.deck.len(), "match started");
        Ok(self.commit(emit))
    }

    /// Submits a graded answer for the current card
    ///
    /// The first accepted correct answer wins the card's points and stamps
    /// `answered_by`; every later submission for the same card is a
    /// committed no-op, which keeps near-simultaneous submissions from
    /// double-scoring. Incorrect submissions score nothing and leave the
    /// card open for other players.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveQuestion` outside a running match and
    /// `UnknownPlayer` if the ID is not in the roster.
    pub fn submit_answer<E: FnMut(Event)>(
        &mut self,
        player: Id,
        is_correct: bool,
        emit: &mut E,
    ) -> Result<Snapshot, Error> {
        let (Status::InProgress, Some(index)) = (self.status, self.current_index) else {
            return Err(Error::NoActiveQuestion);
        };
        let username = self
            .roster
            .get(player)
            .ok_or(roster::Error::UnknownPlayer)?
            .username
            .clone();

        let card = self.deck.at_mut(index)?;
        if card.is_resolved() {
            // Someone already won this card; later submissions are no-ops
            return Ok(self.snapshot());
        }

        card.answered_at = Some(SystemTime::now());
        let delta = scoring::award(card, is_correct);
        if is_correct {
            card.answered_by = Some(username.clone());
            self.roster.add_score(player, delta)?;
            tracing::debug!(
                room = %self.room_id,
                player = %username,
                points = delta,
                "correct answer accepted"
            );
        }

        Ok(self.commit(emit))
    }

    /// Advances past the current card, host only
    ///
    /// Appends exactly one played record for the card being left behind:
    /// the accepted answer if there was one, a skipped entry otherwise.
    /// Advancing past the last card finishes the match and finalizes the
    /// result; a persistence failure at that point is surfaced as a warning
    /// event, never rolled back.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for a non-host caller and `NoActiveQuestion`
    /// outside a running match.
    pub fn advance<P: MatchPersistence, E: FnMut(Event)>(
        &mut self,
        player: Id,
        persistence: &P,
        emit: &mut E,
    ) -> Result<Snapshot, Error> {
        self.require_host(player)?;
        let (Status::InProgress, Some(index)) = (self.status, self.current_index) else {
            return Err(Error::NoActiveQuestion);
        };

        let card = self.deck.at(index)?;
        let record = match &card.answered_by {
            Some(username) => PlayedRecord::answered(card, username),
            None => PlayedRecord::skipped(card),
        };
        self.recorder.record(record);

        let next = index + 1;
        self.current_index = Some(next);

        if next == self.deck.len() {
            self.status = Status::Finished;
            tracing::info!(
                room = %self.room_id,
                questions = self.recorder.len(),
                "match finished"
            );

            let snapshot = self.commit(emit);
            match self.recorder.finalize(self.room_id, &self.roster, persistence) {
                Ok(_) => emit(Event::MatchSaved {
                    room_id: self.room_id,
                }),
                Err(error) => {
                    tracing::warn!(
                        room = %self.room_id,
                        %error,
                        "match ended but results were not saved"
                    );
                    emit(Event::PersistenceFailed {
                        room_id: self.room_id,
                        message: error.to_string(),
                    });
                }
            }
            Ok(snapshot)
        } else {
            self.deck.at_mut(next)?.clear_annotations();
            Ok(self.commit(emit))
        }
    }

    /// Removes a player from the room
    ///
    /// If the host leaves, the earliest-joined remaining player is promoted.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPlayer` if the ID is not in the roster.
    pub fn leave<E: FnMut(Event)>(&mut self, player: Id, emit: &mut E) -> Result<Snapshot, Error> {
        let gone = self.roster.leave(player)?;
        tracing::info!(room = %self.room_id, player = %gone.username, "player left");
        Ok(self.commit(emit))
    }

    /// Returns the room to the lobby for another match
    ///
    /// Discards the deck and played log, resets scores and readiness.
    /// A finished match's persisted result is unaffected.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` keeps the command surface uniform.
    pub fn reset<E: FnMut(Event)>(&mut self, emit: &mut E) -> Result<Snapshot, Error> {
        self.status = Status::Waiting;
        self.current_index = None;
        self.deck = Deck::default();
        self.recorder.clear();
        self.roster.reset_scores();

        tracing::info!(room = %self.room_id, "room returned to lobby");
        Ok(self.commit(emit))
    }

    /// Retries storing the finalized match result
    ///
    /// For manual recovery after a persistence warning; the result itself
    /// is the one finalized when the match ended.
    ///
    /// # Errors
    ///
    /// Returns `NothingToSave` if no match has finished, or the
    /// collaborator's `PersistenceError` if the save failed again.
    pub fn resave<P: MatchPersistence>(&self, persistence: &P) -> Result<(), Error> {
        let result = self.recorder.result().ok_or(Error::NothingToSave)?;
        persistence.save(result)?;
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::{deck::RawFlashcard, recorder::MatchResult};

    struct StubSource(Vec<FlashcardSet>);

    impl FlashcardSetSource for StubSource {
        fn fetch_all(&self) -> Result<Vec<FlashcardSet>, SourceError> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    impl FlashcardSetSource for FailingSource {
        fn fetch_all(&self) -> Result<Vec<FlashcardSet>, SourceError> {
            Err(SourceError("catalog offline".to_owned()))
        }
    }

    struct StubPersistence {
        saved: RefCell<Vec<MatchResult>>,
    }

    impl StubPersistence {
        fn new() -> Self {
            Self {
                saved: RefCell::new(Vec::new()),
            }
        }
    }

    impl MatchPersistence for StubPersistence {
        fn save(&self, result: &MatchResult) -> Result<(), PersistenceError> {
            self.saved.borrow_mut().push(result.clone());
            Ok(())
        }
    }

    struct FailingPersistence;

    impl MatchPersistence for FailingPersistence {
        fn save(&self, _result: &MatchResult) -> Result<(), PersistenceError> {
            Err(PersistenceError("store unavailable".to_owned()))
        }
    }

    fn raw(id: &str, question: &str, answer: &str, points: u64) -> RawFlashcard {
        RawFlashcard {
            id: id.to_owned(),
            question: question.to_owned(),
            answer: answer.to_owned(),
            points,
        }
    }

    fn single_card_source() -> StubSource {
        StubSource(vec![FlashcardSet {
            flashcards: vec![raw("card-1", "2+2?", "4", 50)],
        }])
    }

    fn two_card_source() -> StubSource {
        StubSource(vec![FlashcardSet {
            flashcards: vec![
                raw("card-1", "2+2?", "4", 50),
                raw("card-2", "3+3?", "6", 30),
            ],
        }])
    }

    fn profile(username: &str) -> Profile {
        Profile {
            id: Id::new(),
            username: username.to_owned(),
            avatar: None,
        }
    }

    /// A session with host A and player B, both ready
    fn ready_session() -> (Session, Id, Id) {
        let mut session = Session::new(RoomId::new());
        let alice = profile("A");
        let bob = profile("B");
        let (a, b) = (alice.id, bob.id);

        session.join(alice, &mut |_| {}).unwrap();
        session.join(bob, &mut |_| {}).unwrap();
        session.set_ready(a, true, &mut |_| {}).unwrap();
        session.set_ready(b, true, &mut |_| {}).unwrap();

        (session, a, b)
    }

    fn score_of(session: &Session, id: Id) -> u64 {
        session.roster().get(id).unwrap().score
    }

    #[test]
    fn test_start_requires_ready_quorum() {
        let mut session = Session::new(RoomId::new());
        let alice = profile("A");
        let bob = profile("B");
        let a = alice.id;

        session.join(alice, &mut |_| {}).unwrap();
        session.join(bob, &mut |_| {}).unwrap();
        session.set_ready(a, true, &mut |_| {}).unwrap();

        let result = session.start(a, &single_card_source(), &mut |_| {});
        assert!(matches!(result, Err(Error::NotReady)));
        assert_eq!(session.status(), Status::Waiting);
    }

    #[test]
    fn test_start_requires_host() {
        let (mut session, _, b) = ready_session();

        let result = session.start(b, &single_card_source(), &mut |_| {});
        assert!(matches!(result, Err(Error::Forbidden)));
        assert_eq!(session.status(), Status::Waiting);
    }

    #[test]
    fn test_start_with_no_flashcards() {
        let (mut session, a, _) = ready_session();

        let result = session.start(a, &StubSource(vec![]), &mut |_| {});
        assert!(matches!(result, Err(Error::Deck(deck::Error::EmptyDeck))));
        assert_eq!(session.status(), Status::Waiting);
    }

    #[test]
    fn test_start_source_unavailable() {
        let (mut session, a, _) = ready_session();

        let result = session.start(a, &FailingSource, &mut |_| {});
        assert!(matches!(result, Err(Error::SourceUnavailable(_))));
        assert_eq!(session.status(), Status::Waiting);
        assert!(session.current_card().is_none());
    }

    #[test]
    fn test_start_twice_rejected() {
        let (mut session, a, _) = ready_session();
        session.start(a, &single_card_source(), &mut |_| {}).unwrap();

        let result = session.start(a, &single_card_source(), &mut |_| {});
        assert!(matches!(result, Err(Error::AlreadyStarted)));
    }

    #[test]
    fn test_single_card_match_flow() {
        let (mut session, a, b) = ready_session();
        let persistence = StubPersistence::new();
        let mut events = Vec::new();

        let snapshot = session
            .start(a, &single_card_source(), &mut |e| events.push(e))
            .unwrap();
        assert_eq!(snapshot.status, Status::InProgress);
        assert_eq!(snapshot.current_index, Some(0));

        // First correct answer wins the points
        session
            .submit_answer(a, true, &mut |e| events.push(e))
            .unwrap();
        assert_eq!(score_of(&session, a), 50);
        assert_eq!(
            session.current_card().unwrap().answered_by.as_deref(),
            Some("A")
        );

        // Later submission for the same card is a no-op
        session
            .submit_answer(b, true, &mut |e| events.push(e))
            .unwrap();
        assert_eq!(score_of(&session, b), 0);
        assert_eq!(
            session.current_card().unwrap().answered_by.as_deref(),
            Some("A")
        );

        let snapshot = session
            .advance(a, &persistence, &mut |e| events.push(e))
            .unwrap();
        assert_eq!(snapshot.status, Status::Finished);
        assert_eq!(snapshot.played, 1);

        let saved = persistence.saved.borrow();
        assert_eq!(saved.len(), 1);
        let record = &saved[0].flashcards_played[0];
        assert_eq!(record.points, 50);
        assert_eq!(record.answered_by.as_deref(), Some("A"));
        assert_eq!(record.is_correct, Some(true));

        let scores: Vec<u64> = saved[0].players.iter().map(|p| p.score).collect();
        assert_eq!(scores, vec![50, 0]);

        assert!(
            events
                .iter()
                .any(|e| matches!(e, Event::MatchSaved { .. }))
        );
    }

    #[test]
    fn test_incorrect_answer_leaves_card_open() {
        let (mut session, a, b) = ready_session();
        session.start(a, &single_card_source(), &mut |_| {}).unwrap();

        session.submit_answer(a, false, &mut |_| {}).unwrap();
        assert_eq!(score_of(&session, a), 0);
        assert!(!session.current_card().unwrap().is_resolved());

        // Another player can still win the card
        session.submit_answer(b, true, &mut |_| {}).unwrap();
        assert_eq!(score_of(&session, b), 50);
        assert_eq!(
            session.current_card().unwrap().answered_by.as_deref(),
            Some("B")
        );
    }

    #[test]
    fn test_advance_records_skipped_card() {
        let (mut session, a, _) = ready_session();
        session.start(a, &two_card_source(), &mut |_| {}).unwrap();

        let snapshot = session
            .advance(a, &StubPersistence::new(), &mut |_| {})
            .unwrap();

        assert_eq!(snapshot.status, Status::InProgress);
        assert_eq!(snapshot.current_index, Some(1));
        assert_eq!(snapshot.played, 1);
        // The new current card starts with cleared annotations
        assert!(!session.current_card().unwrap().is_resolved());
    }

    #[test]
    fn test_played_log_tracks_current_index() {
        let (mut session, a, _) = ready_session();
        let persistence = StubPersistence::new();

        let snapshot = session.start(a, &two_card_source(), &mut |_| {}).unwrap();
        assert_eq!(snapshot.played, snapshot.current_index.unwrap());

        session.submit_answer(a, true, &mut |_| {}).unwrap();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.played, snapshot.current_index.unwrap());

        let snapshot = session.advance(a, &persistence, &mut |_| {}).unwrap();
        assert_eq!(snapshot.played, snapshot.current_index.unwrap());

        let snapshot = session.advance(a, &persistence, &mut |_| {}).unwrap();
        assert_eq!(snapshot.status, Status::Finished);
        assert_eq!(snapshot.played, snapshot.current_index.unwrap());

        // Skipped second card logged without an answer
        let saved = persistence.saved.borrow();
        assert_eq!(saved[0].flashcards_played.len(), 2);
        assert!(saved[0].flashcards_played[1].answered_by.is_none());
        assert!(saved[0].flashcards_played[1].is_correct.is_none());
    }

    #[test]
    fn test_advance_by_non_host_forbidden() {
        let (mut session, a, b) = ready_session();
        session.start(a, &single_card_source(), &mut |_| {}).unwrap();
        let before = session.snapshot();

        let result = session.advance(b, &StubPersistence::new(), &mut |_| {});
        assert!(matches!(result, Err(Error::Forbidden)));

        let after = session.snapshot();
        assert_eq!(after.status, before.status);
        assert_eq!(after.current_index, before.current_index);
        assert_eq!(after.played, before.played);
    }

    #[test]
    fn test_submit_answer_outside_match() {
        let (mut session, a, _) = ready_session();

        let result = session.submit_answer(a, true, &mut |_| {});
        assert!(matches!(result, Err(Error::NoActiveQuestion)));
    }

    #[test]
    fn test_submit_answer_unknown_player() {
        let (mut session, a, _) = ready_session();
        session.start(a, &single_card_source(), &mut |_| {}).unwrap();

        let result = session.submit_answer(Id::new(), true, &mut |_| {});
        assert!(matches!(
            result,
            Err(Error::Roster(roster::Error::UnknownPlayer))
        ));
        assert!(!session.current_card().unwrap().is_resolved());
    }

    #[test]
    fn test_reset_returns_to_lobby() {
        let (mut session, a, _) = ready_session();
        session.start(a, &single_card_source(), &mut |_| {}).unwrap();
        session.submit_answer(a, true, &mut |_| {}).unwrap();
        session
            .advance(a, &StubPersistence::new(), &mut |_| {})
            .unwrap();
        assert_eq!(session.status(), Status::Finished);

        let snapshot = session.reset(&mut |_| {}).unwrap();

        assert_eq!(snapshot.status, Status::Waiting);
        assert_eq!(snapshot.current_index, None);
        assert_eq!(snapshot.deck_len, 0);
        assert_eq!(snapshot.played, 0);
        assert_eq!(score_of(&session, a), 0);
        assert!(!session.roster().get(a).unwrap().is_ready);
    }

    #[test]
    fn test_persistence_failure_is_nonfatal() {
        let (mut session, a, _) = ready_session();
        let mut events = Vec::new();
        session.start(a, &single_card_source(), &mut |_| {}).unwrap();
        session.submit_answer(a, true, &mut |_| {}).unwrap();

        let snapshot = session
            .advance(a, &FailingPersistence, &mut |e| events.push(e))
            .unwrap();

        // The match is over regardless of the failed save
        assert_eq!(snapshot.status, Status::Finished);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, Event::PersistenceFailed { .. }))
        );

        // Manual retry against a working store succeeds
        let persistence = StubPersistence::new();
        session.resave(&persistence).unwrap();
        assert_eq!(persistence.saved.borrow().len(), 1);
    }

    #[test]
    fn test_resave_before_finish() {
        let (session, _, _) = ready_session();
        let result = session.resave(&StubPersistence::new());
        assert!(matches!(result, Err(Error::NothingToSave)));
    }

    #[test]
    fn test_apply_dispatches_commands() {
        let mut session = Session::new(RoomId::new());
        let source = single_card_source();
        let persistence = StubPersistence::new();
        let mut emit = |_e: Event| {};

        let alice = profile("A");
        let bob = profile("B");
        let (a, b) = (alice.id, bob.id);

        session
            .apply(Command::Join(alice), &source, &persistence, &mut emit)
            .unwrap();
        session
            .apply(Command::Join(bob), &source, &persistence, &mut emit)
            .unwrap();
        session
            .apply(
                Command::Ready { player: a, ready: true },
                &source,
                &persistence,
                &mut emit,
            )
            .unwrap();
        session
            .apply(
                Command::Ready { player: b, ready: true },
                &source,
                &persistence,
                &mut emit,
            )
            .unwrap();
        session
            .apply(Command::Start { player: a }, &source, &persistence, &mut emit)
            .unwrap();
        session
            .apply(
                Command::Answer { player: b, is_correct: true },
                &source,
                &persistence,
                &mut emit,
            )
            .unwrap();
        let snapshot = session
            .apply(Command::Advance { player: a }, &source, &persistence, &mut emit)
            .unwrap();

        assert_eq!(snapshot.status, Status::Finished);
        assert_eq!(persistence.saved.borrow().len(), 1);

        let snapshot = session
            .apply(Command::Reset, &source, &persistence, &mut emit)
            .unwrap();
        assert_eq!(snapshot.status, Status::Waiting);
    }

    #[test]
    fn test_every_commit_emits_state_changed() {
        let mut events = Vec::new();
        let mut session = Session::new(RoomId::new());
        let alice = profile("A");
        let a = alice.id;

        session.join(alice, &mut |e| events.push(e)).unwrap();
        session
            .set_ready(a, true, &mut |e| events.push(e))
            .unwrap();
        session.leave(a, &mut |e| events.push(e)).unwrap();

        assert_eq!(events.len(), 3);
        assert!(
            events
                .iter()
                .all(|e| matches!(e, Event::StateChanged(_)))
        );
    }

    #[test]
    fn test_host_leaving_promotes_next_player() {
        let (mut session, a, b) = ready_session();

        session.leave(a, &mut |_| {}).unwrap();

        assert_eq!(session.roster().host().unwrap().id, b);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Status::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&Status::Waiting).unwrap(),
            "\"waiting\""
        );
    }

    #[test]
    fn test_event_to_message() {
        let session = Session::new(RoomId::new());
        let event: Event = session.snapshot().into();
        let json = event.to_message();

        assert!(json.contains("StateChanged"));
        assert!(json.contains("waiting"));
    }
}
