//! Player roster management
//!
//! This module tracks the set of participants in a room: their identity,
//! readiness, connection status, host flag and running score. The roster is
//! kept in join order, which makes host promotion on departure deterministic.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay, skip_serializing_none};
use thiserror::Error;
use uuid::Uuid;
use web_time::SystemTime;

use crate::constants;

/// A unique identifier for players in a room
///
/// Identity is supplied by an external identity provider; the core trusts
/// it as given and performs no authentication itself.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct Id(Uuid);

impl Id {
    /// Creates a new random player ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Id {
    /// Creates a new random player ID (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Id {
    /// Formats the ID as a UUID string
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Id {
    type Err = uuid::Error;

    /// Parses an ID from a UUID string
    ///
    /// # Errors
    ///
    /// Returns a `uuid::Error` if the string is not a valid UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// The identity handed in by the external identity provider when joining
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Unique identifier of the joining player
    pub id: Id,
    /// Display name of the joining player
    pub username: String,
    /// Optional avatar reference
    pub avatar: Option<String>,
}

/// A participant in a room
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Unique identifier of the player
    pub id: Id,
    /// Display name of the player
    pub username: String,
    /// Optional avatar reference
    pub avatar: Option<String>,
    /// Points accrued in the current match
    pub score: u64,
    /// Whether the player currently has a live connection
    pub is_active: bool,
    /// Whether the player has marked themselves ready in the lobby
    pub is_ready: bool,
    /// Whether the player holds host privileges for the room
    pub is_host: bool,
    /// When the player first joined the room
    pub joined_at: SystemTime,
}

impl Player {
    fn from_profile(profile: Profile, is_host: bool) -> Self {
        Self {
            id: profile.id,
            username: profile.username,
            avatar: profile.avatar,
            score: 0,
            is_active: true,
            is_ready: false,
            is_host,
            joined_at: SystemTime::now(),
        }
    }
}

/// Errors that can occur when managing the roster
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The room has reached the maximum number of allowed players
    #[error("maximum number of players reached")]
    CapacityExceeded,
    /// The referenced player is not part of this room
    #[error("player is not in this room")]
    UnknownPlayer,
    /// The supplied username is empty
    #[error("username cannot be empty")]
    EmptyUsername,
    /// The supplied username exceeds the allowed length
    #[error("username is too long")]
    UsernameTooLong,
}

/// The set of players in a room, kept in join order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roster {
    /// Players in join order; the first joiner is the initial host
    players: Vec<Player>,
    /// Maximum number of players this roster accepts
    capacity: usize,
}

impl Default for Roster {
    /// Creates an empty roster with the default capacity
    fn default() -> Self {
        Self::with_capacity(constants::roster::MAX_PLAYERS)
    }
}

impl Roster {
    /// Creates an empty roster accepting at most `capacity` players
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            players: Vec::new(),
            capacity,
        }
    }

    /// Adds a player to the roster
    ///
    /// The first player to join becomes the host. Joining with an ID that is
    /// already present is idempotent: the existing entry is marked active
    /// again and the roster is otherwise unchanged.
    ///
    /// # Errors
    ///
    /// Returns `Error::CapacityExceeded` if the roster is full, or a
    /// username validation error for an empty or overlong name.
    pub fn join(&mut self, profile: Profile) -> Result<&Player, Error> {
        if let Some(index) = self.position(profile.id) {
            self.players[index].is_active = true;
            return Ok(&self.players[index]);
        }

        if profile.username.trim().is_empty() {
            return Err(Error::EmptyUsername);
        }
        if profile.username.len() > constants::roster::MAX_USERNAME_LENGTH {
            return Err(Error::UsernameTooLong);
        }
        if self.players.len() >= self.capacity {
            return Err(Error::CapacityExceeded);
        }

        let is_host = self.players.is_empty();
        self.players.push(Player::from_profile(profile, is_host));

        Ok(self.players.last().expect("player was just pushed"))
    }

    /// Removes a player from the roster
    ///
    /// If the departing player was the host, the earliest-joined remaining
    /// player is promoted.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownPlayer` if the ID is not present.
    pub fn leave(&mut self, id: Id) -> Result<Player, Error> {
        let index = self.position(id).ok_or(Error::UnknownPlayer)?;
        let removed = self.players.remove(index);

        if removed.is_host {
            if let Some(successor) = self.players.first_mut() {
                successor.is_host = true;
            }
        }

        Ok(removed)
    }

    /// Sets the readiness flag of a player
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownPlayer` if the ID is not present.
    pub fn set_ready(&mut self, id: Id, ready: bool) -> Result<(), Error> {
        self.get_mut(id)?.is_ready = ready;
        Ok(())
    }

    /// Sets the connection/activity flag of a player
    ///
    /// Used by the transport layer to mark disconnects without removing the
    /// player from the room.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownPlayer` if the ID is not present.
    pub fn set_active(&mut self, id: Id, active: bool) -> Result<(), Error> {
        self.get_mut(id)?.is_active = active;
        Ok(())
    }

    /// Increments a player's score and returns the new total
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownPlayer` if the ID is not present.
    pub fn add_score(&mut self, id: Id, delta: u64) -> Result<u64, Error> {
        let player = self.get_mut(id)?;
        player.score += delta;
        Ok(player.score)
    }

    /// Whether the room satisfies the minimum quorum to start a match
    ///
    /// Requires at least two ready players, with a present and active host.
    pub fn can_start(&self) -> bool {
        self.ready_count() >= constants::roster::MIN_READY_PLAYERS
            && self.host().is_some_and(|host| host.is_active)
    }

    /// Number of players currently marked ready
    pub fn ready_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_ready).count()
    }

    /// Resets every player's score to zero and clears readiness
    ///
    /// Applied when a match starts and when the room returns to the lobby.
    pub fn reset_scores(&mut self) {
        for player in &mut self.players {
            player.score = 0;
            player.is_ready = false;
        }
    }

    /// Gets a player by ID
    pub fn get(&self, id: Id) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Gets the current host, if any
    pub fn host(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_host)
    }

    /// All players in join order
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Number of players in the room
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether the room has no players
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    fn position(&self, id: Id) -> Option<usize> {
        self.players.iter().position(|p| p.id == id)
    }

    fn get_mut(&mut self, id: Id) -> Result<&mut Player, Error> {
        self.players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(Error::UnknownPlayer)
    }
}
