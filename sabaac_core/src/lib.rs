//! # Sabaac core logic library
//!
//! This `core` crate holds the whole game-session state machine for the
//! sabaac server: deck and discard management, turn and round sequencing,
//! pot accounting, the Corellian Gambit scoring rules, and the wire
//! message/snapshot types shared with clients. It is decoupled from any
//! transport so the WebSocket edge (or tests) can drive it directly.

mod card;
mod error;
mod logic;
mod message;
mod state;

pub use card::*;

pub use error::*;

pub use logic::*;

pub use message::*;

pub use state::*;
