//! # Flashcard Frenzy Session Core
//!
//! This library provides the core session logic for Flashcard Frenzy, a
//! multiplayer flashcard race. It manages room membership, the match
//! lifecycle, first-correct-answer scoring and match-result recording, and
//! emits ordered state events for a transport layer to broadcast.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]

pub mod constants;

pub mod deck;
pub mod game;
pub mod recorder;
pub mod registry;
pub mod room_id;
pub mod roster;
pub mod scoring;

pub use game::{Command, Event, Session, Snapshot, Status};
pub use registry::RoomRegistry;
pub use room_id::RoomId;
