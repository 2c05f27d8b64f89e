use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::card::{build_deck, Card};
use crate::error::ActionError;

/// Opaque per-browser identity token. Assigned by the edge on first
/// contact; the core trusts it as the player key.
pub type ClientId = Uuid;

/// Session codes avoid characters that read ambiguously ('l', 'o', '0', '1').
pub const CODE_ALPHABET: &[u8] = b"abcdefghijkmnpqrstuvwxyz23456789";
pub const CODE_LEN: usize = 6;

pub const STARTING_CREDITS: i64 = 100;
pub const DEFAULT_ANTE: i64 = 2;
/// Rounds played before scoring. Once `round` passes this the game ends.
pub const MAX_ROUNDS: u32 = 3;
pub const INITIAL_HAND_SIZE: usize = 2;

/// A participant in one session. Owned exclusively by its [`Session`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub identity: ClientId,
    pub username: String,
    /// 1-based, unique and contiguous within the session. Fixed at join time.
    pub turn_order: u32,
    pub hand: Vec<Card>,
    pub credits: i64,
}

impl Player {
    pub fn new(identity: ClientId, turn_order: u32) -> Player {
        Player {
            identity,
            username: "Mr. Mysterious".to_string(),
            turn_order,
            hand: Vec::new(),
            credits: STARTING_CREDITS,
        }
    }
}

/// One line of the append-only action log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub body: String,
}

/// Closed set of rule variants. The state machine only depends on the
/// scoring capability each variant supplies (see `logic.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameVariant {
    CorellianGambit,
}

/// One game in progress: deck, discard, players, turn/round counters,
/// pot accounting and action log.
///
/// Sessions are only mutated through [`Session::apply`] and the lobby
/// events (`join`, `set_username`, `start`, `deal_initial_hands`).
/// Finished sessions are flagged inactive, never destroyed.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub code: String,
    pub is_active: bool,
    /// 0 = lobby, 1..=MAX_ROUNDS = playing, above = finished.
    pub round: u32,
    /// 1-based, indexes into players' `turn_order`.
    pub turn: u32,
    /// Front (index 0) is the next draw.
    pub deck: Vec<Card>,
    /// Back is the top of the pile.
    pub discard: Vec<Card>,
    pub players: Vec<Player>,
    /// Index into `players`. Set exactly once, when scoring completes.
    pub winner: Option<usize>,
    pub action_log: Vec<LogEntry>,
    pub ante_amount: i64,
    pub sabaac_pot: i64,
    pub hand_pot: i64,
    pub variant: GameVariant,
    /// Guards the exactly-once ante collection.
    pub started: bool,
    pub(crate) rng: StdRng,
}

impl Session {
    /// Create a fresh session: shuffled deck, generated code, empty table.
    pub fn new(variant: GameVariant) -> Session {
        Session::with_rng(variant, StdRng::from_os_rng())
    }

    /// Deterministic construction for tests: shuffle, code and dice all
    /// derive from the seed.
    pub fn from_seed(variant: GameVariant, seed: u64) -> Session {
        Session::with_rng(variant, StdRng::seed_from_u64(seed))
    }

    fn with_rng(variant: GameVariant, mut rng: StdRng) -> Session {
        let code = generate_code(&mut rng);
        let mut deck = build_deck();
        deck.shuffle(&mut rng);
        Session {
            id: Uuid::new_v4(),
            code,
            is_active: true,
            round: 0,
            turn: 1,
            deck,
            discard: Vec::new(),
            players: Vec::new(),
            winner: None,
            action_log: Vec::new(),
            ante_amount: DEFAULT_ANTE,
            sabaac_pot: 0,
            hand_pot: 0,
            variant,
            started: false,
            rng,
        }
    }

    /// Add a player for `identity`, or return the existing seat.
    /// Joining is only possible while the session is in the lobby.
    pub fn join(&mut self, identity: ClientId) -> Result<u32, ActionError> {
        if !self.is_active {
            return Err(ActionError::PreconditionFailed(
                "session is no longer active".to_string(),
            ));
        }
        if let Some(player) = self.player_by_identity(&identity) {
            return Ok(player.turn_order);
        }
        if self.round > 0 {
            return Err(ActionError::PreconditionFailed(
                "game already underway".to_string(),
            ));
        }
        let turn_order = self.max_turn_order() + 1;
        self.players.push(Player::new(identity, turn_order));
        Ok(turn_order)
    }

    /// Lobby rename for the player behind `identity`.
    pub fn set_username(&mut self, identity: &ClientId, username: String) -> Result<(), ActionError> {
        let player = self
            .players
            .iter_mut()
            .find(|p| p.identity == *identity)
            .ok_or(ActionError::NotFound)?;
        player.username = username;
        Ok(())
    }

    /// Collect antes and fund both pots. Fires exactly once per game;
    /// repeated start requests are refused.
    pub fn start(&mut self) -> Result<(), ActionError> {
        if !self.is_active {
            return Err(ActionError::PreconditionFailed(
                "session is no longer active".to_string(),
            ));
        }
        if self.started {
            return Err(ActionError::PreconditionFailed(
                "antes already collected".to_string(),
            ));
        }
        let ante = self.ante_amount;
        for player in &mut self.players {
            player.credits -= ante * 2;
            self.sabaac_pot += ante;
            self.hand_pot += ante;
        }
        self.started = true;
        self.log(format!(
            "Each player antes {} credits to the sabaac pot and {} to the hand pot",
            ante, ante
        ));
        Ok(())
    }

    /// Deal the opening hands on the lobby -> playing transition.
    /// No-op once the first round has begun.
    pub fn deal_initial_hands(&mut self) -> bool {
        if !self.is_active || self.round != 0 {
            return false;
        }
        self.round = 1;
        for idx in 0..self.players.len() {
            for _ in 0..INITIAL_HAND_SIZE {
                if let Some(card) = pop_front(&mut self.deck) {
                    self.players[idx].hand.push(card);
                }
            }
        }
        true
    }

    /// The player whose `turn_order` matches the current turn.
    pub fn current_player(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.turn_order == self.turn)
    }

    pub fn player_by_identity(&self, identity: &ClientId) -> Option<&Player> {
        self.players.iter().find(|p| p.identity == *identity)
    }

    pub fn winner_player(&self) -> Option<&Player> {
        self.winner.and_then(|idx| self.players.get(idx))
    }

    pub fn max_turn_order(&self) -> u32 {
        self.players.iter().map(|p| p.turn_order).max().unwrap_or(0)
    }

    pub(crate) fn log(&mut self, body: String) {
        self.action_log.push(LogEntry {
            timestamp: Utc::now(),
            body,
        });
    }

    pub(crate) fn roll_die(&mut self) -> u8 {
        self.rng.random_range(1..=6)
    }
}

fn generate_code(rng: &mut StdRng) -> String {
    (0..CODE_LEN)
        .map(|_| {
            let idx = rng.random_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[idx] as char
        })
        .collect()
}

pub(crate) fn pop_front(deck: &mut Vec<Card>) -> Option<Card> {
    if deck.is_empty() {
        None
    } else {
        Some(deck.remove(0))
    }
}
