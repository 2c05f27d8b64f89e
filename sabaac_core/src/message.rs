use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::card::Card;
use crate::state::{LogEntry, Player, Session};

// --- Client -> server messages ---

/// Player action, carried on the wire as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Action {
    DrawDeck = 1,
    DrawDiscard = 2,
    Pass = 3,
    Discard = 4,
}

impl From<Action> for u8 {
    fn from(action: Action) -> u8 {
        action as u8
    }
}

impl TryFrom<u8> for Action {
    type Error = String;

    fn try_from(value: u8) -> Result<Action, Self::Error> {
        match value {
            1 => Ok(Action::DrawDeck),
            2 => Ok(Action::DrawDiscard),
            3 => Ok(Action::Pass),
            4 => Ok(Action::Discard),
            other => Err(format!("unknown action code {other}")),
        }
    }
}

/// Inbound envelope for both the lobby and gameplay channels.
///
/// Lobby messages carry `username`/`startgame`; gameplay messages carry
/// `action`/`actionValue`. Unknown action codes fail deserialization at
/// the boundary rather than deep in the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    pub code: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub startgame: Option<bool>,
    #[serde(default)]
    pub action: Option<Action>,
    #[serde(rename = "actionValue", default)]
    pub action_value: Option<u8>,
}

// --- Server -> client snapshot ---

/// Lobby view of one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyPlayer {
    pub username: String,
    pub turnorder: u32,
}

/// The client-facing projection of a session at one point in time.
///
/// Built read-only from a session (safe to call concurrently with reads);
/// `playerhand` and `playercredits` are only populated when projecting a
/// specific player's private view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub code: String,
    pub round: u32,
    pub startgame: bool,
    pub username: Option<String>,
    pub players: Option<Vec<LobbyPlayer>>,
    pub winner: Option<String>,
    pub currentplayer: Option<String>,
    pub messages: Vec<LogEntry>,
    pub topdiscard: Option<Card>,
    pub playerhand: Option<Vec<Card>>,
    pub playercredits: Option<i64>,
    pub sabaacpot: i64,
    pub handpot: i64,
}

impl Snapshot {
    /// Project a session into its wire form. With `target`, the snapshot
    /// additionally carries that player's private hand and balance.
    pub fn project(session: &Session, target: Option<&Player>) -> Snapshot {
        Snapshot {
            timestamp: Utc::now(),
            code: session.code.clone(),
            round: session.round,
            startgame: false,
            username: target.map(|p| p.username.clone()),
            players: Some(
                session
                    .players
                    .iter()
                    .map(|p| LobbyPlayer {
                        username: p.username.clone(),
                        turnorder: p.turn_order,
                    })
                    .collect(),
            ),
            winner: session.winner_player().map(|p| p.username.clone()),
            currentplayer: session.current_player().map(|p| p.username.clone()),
            messages: session.action_log.clone(),
            topdiscard: session.discard.last().copied(),
            playerhand: target.map(|p| p.hand.clone()),
            playercredits: target.map(|p| p.credits),
            sabaacpot: session.sabaac_pot,
            handpot: session.hand_pot,
        }
    }
}
