//! Room registry and idle teardown
//!
//! This module owns every live [`Session`], keyed by room ID. Rooms are
//! created on first join, removed as soon as the last player leaves, and
//! reaped when abandoned. The reaper is pure bookkeeping: the caller decides
//! when to run it and supplies the current time.

use std::{collections::HashMap, time::Duration};

use itertools::Itertools;
use thiserror::Error;
use web_time::SystemTime;

use crate::{
    game::{self, Command, Event, FlashcardSetSource, Session, Snapshot},
    recorder::MatchPersistence,
    room_id::RoomId,
    roster::{Id, Profile},
};

/// Errors produced by registry operations
#[derive(Error, Debug)]
pub enum Error {
    /// The requested room does not exist
    #[error("room {0} not found")]
    UnknownRoom(RoomId),
    /// A session command failed
    #[error(transparent)]
    Game(#[from] game::Error),
}

/// All live rooms, keyed by room ID
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Session>,
    idle_timeout: Duration,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(
            crate::constants::registry::IDLE_TIMEOUT_SECS,
        ))
    }
}

impl RoomRegistry {
    /// Creates an empty registry with the given idle timeout
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            rooms: HashMap::new(),
            idle_timeout,
        }
    }

    /// Allocates a fresh room with an unused ID
    pub fn create(&mut self) -> RoomId {
        let room_id = loop {
            let candidate = RoomId::new();
            if !self.rooms.contains_key(&candidate) {
                break candidate;
            }
        };

        self.rooms.insert(room_id, Session::new(room_id));
        tracing::info!(room = %room_id, "room created");
        room_id
    }

    /// Looks up a room
    ///
    /// # Errors
    ///
    /// Returns `UnknownRoom` if no session exists for the ID.
    pub fn get(&self, room_id: RoomId) -> Result<&Session, Error> {
        self.rooms.get(&room_id).ok_or(Error::UnknownRoom(room_id))
    }

    /// Looks up a room mutably
    ///
    /// # Errors
    ///
    /// Returns `UnknownRoom` if no session exists for the ID.
    pub fn get_mut(&mut self, room_id: RoomId) -> Result<&mut Session, Error> {
        self.rooms
            .get_mut(&room_id)
            .ok_or(Error::UnknownRoom(room_id))
    }

    /// Adds a player to a room, creating the room on first join
    ///
    /// # Errors
    ///
    /// Returns the session's failure if the join was rejected; a join that
    /// would have created the room leaves no empty room behind.
    pub fn join<E: FnMut(Event)>(
        &mut self,
        room_id: RoomId,
        profile: Profile,
        emit: &mut E,
    ) -> Result<Snapshot, Error> {
        let created = !self.rooms.contains_key(&room_id);
        let session = self
            .rooms
            .entry(room_id)
            .or_insert_with(|| Session::new(room_id));

        match session.join(profile, emit) {
            Ok(snapshot) => {
                if created {
                    tracing::info!(room = %room_id, "room created on first join");
                }
                Ok(snapshot)
            }
            Err(error) => {
                if created {
                    self.rooms.remove(&room_id);
                }
                Err(error.into())
            }
        }
    }

    /// Removes a player from a room, tearing the room down when it empties
    ///
    /// # Errors
    ///
    /// Returns `UnknownRoom` for a missing room or the session's failure
    /// for an unknown player.
    pub fn leave<E: FnMut(Event)>(
        &mut self,
        room_id: RoomId,
        player: Id,
        emit: &mut E,
    ) -> Result<Snapshot, Error> {
        let session = self.get_mut(room_id)?;
        let snapshot = session.leave(player, emit)?;

        if session.roster().is_empty() {
            self.rooms.remove(&room_id);
            tracing::info!(room = %room_id, "last player left, room removed");
        }

        Ok(snapshot)
    }

    /// Dispatches a command into a room's session
    ///
    /// # Errors
    ///
    /// Returns `UnknownRoom` for a missing room or the session's typed
    /// failure for a rejected command.
    pub fn apply<S, P, E>(
        &mut self,
        room_id: RoomId,
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
            Command::Join(profile) => self.join(room_id, profile, emit),
            Command::Leave { player } => self.leave(room_id, player, emit),
            other => Ok(self
                .get_mut(room_id)?
                .apply(other, source, persistence, emit)?),
        }
    }

    /// Removes abandoned rooms and returns their IDs
    ///
    /// A room is abandoned when every player in it is disconnected, or when
    /// no command has committed for longer than the idle timeout. The caller
    /// schedules this sweep and supplies `now`.
    pub fn reap_idle(&mut self, now: SystemTime) -> Vec<RoomId> {
        let timeout = self.idle_timeout;
        let reaped = self
            .rooms
            .iter()
            .filter(|(_, session)| {
                let roster = session.roster();
                let all_disconnected =
                    !roster.is_empty() && roster.players().iter().all(|p| !p.is_active);
                let idle = now
                    .duration_since(session.last_activity())
                    .unwrap_or_default()
                    >= timeout;
                all_disconnected || idle
            })
            .map(|(room_id, _)| *room_id)
            .collect_vec();

        for room_id in &reaped {
            self.rooms.remove(room_id);
            tracing::info!(room = %room_id, "abandoned room reaped");
        }

        reaped
    }

    /// Number of live rooms
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no rooms are live
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
