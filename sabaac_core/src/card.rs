use serde::{Deserialize, Serialize};
use std::fmt;

/// Suite of a sabaac card.
///
/// The three numbered suites carry every rank in -10..=10 except 0.
/// Sylops are the two wild zero cards and exist outside the suites.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suite {
    Circle,
    Triangle,
    Square,
    Sylop,
}

/// A single sabaac card.
///
/// `id` is unique within a deck and is what clients reference when
/// discarding; `rank` is the scoring value.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct Card {
    pub id: u8,
    pub suite: Suite,
    pub rank: i8,
}

impl Card {
    pub fn new(id: u8, suite: Suite, rank: i8) -> Card {
        Card { id, suite, rank }
    }
}

/// 3 suites x 20 ranks + 2 sylops.
pub const DECK_SIZE: usize = 62;

/// Build the full 62-card deck, unshuffled, with ids 0..62.
pub fn build_deck() -> Vec<Card> {
    let suites = [Suite::Circle, Suite::Triangle, Suite::Square];
    let mut deck = Vec::with_capacity(DECK_SIZE);
    let mut next_id = 0u8;
    for rank in -10i8..=10 {
        if rank == 0 {
            continue;
        }
        for &suite in &suites {
            deck.push(Card::new(next_id, suite, rank));
            next_id += 1;
        }
    }
    for _ in 0..2 {
        deck.push(Card::new(next_id, Suite::Sylop, 0));
        next_id += 1;
    }
    deck
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Suite::Circle => "circle",
            Suite::Triangle => "triangle",
            Suite::Square => "square",
            Suite::Sylop => "sylop",
        })
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(ID: {}) {} of {}", self.id, self.rank, self.suite)
    }
}
