use crate::card::Card;
use crate::error::ActionError;
use crate::message::Action;
use crate::state::{pop_front, ClientId, GameVariant, Player, Session, MAX_ROUNDS};

// --- Turn processing ---

impl Session {
    /// Apply one player action. This is the only transition function for a
    /// playing session: it moves cards, advances the turn, rolls the
    /// end-of-round dice and, once the final round ends, scores the game.
    ///
    /// Rejections (out of turn, empty piles, unknown card, inactive
    /// session) leave the session untouched and are returned for the
    /// caller to log; they are never fatal.
    pub fn apply(
        &mut self,
        identity: ClientId,
        action: Action,
        action_value: Option<u8>,
    ) -> Result<(), ActionError> {
        if !self.is_active {
            return Err(ActionError::PreconditionFailed(
                "session is no longer active".to_string(),
            ));
        }
        let player_idx = self
            .players
            .iter()
            .position(|p| p.identity == identity)
            .ok_or(ActionError::NotFound)?;
        let username = self.players[player_idx].username.clone();
        if self.players[player_idx].turn_order != self.turn {
            // Stale or duplicate click; refuse without mutating anything.
            return Err(ActionError::InvalidAction(format!(
                "action from {username} out of turn order"
            )));
        }

        match action {
            Action::DrawDeck => {
                let card = pop_front(&mut self.deck).ok_or_else(|| {
                    ActionError::InvalidAction("no cards left in the deck".to_string())
                })?;
                self.players[player_idx].hand.push(card);
                self.log(format!("{username} drew from the deck"));
            }
            Action::DrawDiscard => {
                let card = self.discard.pop().ok_or_else(|| {
                    ActionError::InvalidAction("no cards in the discard pile".to_string())
                })?;
                self.players[player_idx].hand.push(card);
                self.log(format!("{username} drew from the discard pile"));
            }
            Action::Pass => {
                self.log(format!("{username} passed"));
            }
            Action::Discard => {
                let card_id = action_value.ok_or_else(|| {
                    ActionError::InvalidAction("discard requires a card id".to_string())
                })?;
                let hand = &mut self.players[player_idx].hand;
                let pos = hand.iter().position(|c| c.id == card_id).ok_or_else(|| {
                    ActionError::InvalidAction("card not present in hand".to_string())
                })?;
                let card = hand.remove(pos);
                self.discard.push(card);
                self.log(format!("{username} discarded a {card}"));
            }
        }

        self.turn += 1;
        if self.turn > self.max_turn_order() {
            let d1 = self.roll_die();
            let d2 = self.roll_die();
            self.resolve_round_end(d1, d2);
        }
        if self.round > MAX_ROUNDS {
            self.finish();
        }
        Ok(())
    }

    /// End-of-round bookkeeping: log the dice, reshuffle the whole table on
    /// doubles, then advance the round and reset the turn counter.
    fn resolve_round_end(&mut self, d1: u8, d2: u8) {
        self.log(format!("Rolled 2 dice: {d1} and {d2}"));
        if d1 == d2 {
            self.log("Doubles!".to_string());
            for idx in 0..self.players.len() {
                let num_cards = self.players[idx].hand.len();
                while let Some(card) = self.players[idx].hand.pop() {
                    self.discard.push(card);
                }
                for _ in 0..num_cards {
                    if let Some(card) = pop_front(&mut self.deck) {
                        self.players[idx].hand.push(card);
                    }
                }
            }
        }
        self.round += 1;
        self.turn = 1;
    }

    /// Score the game, pay out the hand pot and deactivate the session.
    /// The winner is set exactly once.
    fn finish(&mut self) {
        if self.winner.is_some() {
            return;
        }
        let Some(winner_idx) = self.variant.calculate_scores(&self.players) else {
            self.is_active = false;
            return;
        };
        let payout = self.hand_pot;
        self.players[winner_idx].credits += payout;
        self.hand_pot = 0;
        self.winner = Some(winner_idx);
        let username = self.players[winner_idx].username.clone();
        self.log(format!("{username} wins the game, earning {payout} credits"));
        self.is_active = false;
    }
}

// --- Scoring ---

impl GameVariant {
    /// Pick the winning player index for this variant's rules.
    /// Ties go to the earliest-joined player among the maxima.
    pub fn calculate_scores(&self, players: &[Player]) -> Option<usize> {
        match self {
            GameVariant::CorellianGambit => {
                let mut best: Option<(usize, i64)> = None;
                for (idx, player) in players.iter().enumerate() {
                    let score = score_hand(&player.hand);
                    match best {
                        Some((_, top)) if score <= top => {}
                        _ => best = Some((idx, score)),
                    }
                }
                best.map(|(idx, _)| idx)
            }
        }
    }
}

/// Corellian Gambit hand score.
///
/// 1) Hands summing to 0 beat everything else; the perfect hand
///    [-10, 0, +10] beats other zero hands.
/// 2) Otherwise closest to 0 wins, positives preferred, more cards
///    preferred.
///
/// Encoded as: perfect hand +10,000; zero sum +10,000; -100 per point of
/// distance from 0; +10 per card; +1 per positive point.
pub fn score_hand(hand: &[Card]) -> i64 {
    let mut ranks: Vec<i8> = hand.iter().map(|c| c.rank).collect();
    ranks.sort_unstable();
    let sum: i64 = ranks.iter().map(|&r| i64::from(r)).sum();
    let mut score = 0i64;
    if ranks == [-10, 0, 10] {
        score += 10_000;
    }
    if sum == 0 {
        score += 10_000;
    }
    score -= sum.abs() * 100;
    score += ranks.len() as i64 * 10;
    score += ranks
        .iter()
        .filter(|&&r| r > 0)
        .map(|&r| i64::from(r))
        .sum::<i64>();
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{Suite, DECK_SIZE};
    use crate::state::{INITIAL_HAND_SIZE, STARTING_CREDITS};
    use std::collections::HashSet;
    use uuid::Uuid;

    fn card(id: u8, rank: i8) -> Card {
        Card::new(id, Suite::Circle, rank)
    }

    fn playing_session(player_count: usize) -> (Session, Vec<ClientId>) {
        let mut session = Session::from_seed(GameVariant::CorellianGambit, 7);
        let identities: Vec<ClientId> = (0..player_count).map(|_| Uuid::new_v4()).collect();
        for id in &identities {
            session.join(*id).unwrap();
        }
        session.start().unwrap();
        session.deal_initial_hands();
        (session, identities)
    }

    fn assert_cards_conserved(session: &Session) {
        let total = session.deck.len()
            + session.discard.len()
            + session.players.iter().map(|p| p.hand.len()).sum::<usize>();
        assert_eq!(total, DECK_SIZE);
        let ids: HashSet<u8> = session
            .deck
            .iter()
            .chain(session.discard.iter())
            .chain(session.players.iter().flat_map(|p| p.hand.iter()))
            .map(|c| c.id)
            .collect();
        assert_eq!(ids.len(), DECK_SIZE);
    }

    // --- Hand scoring ---

    #[test]
    fn test_perfect_hand_beats_small_positive_hand() {
        let perfect = [card(0, -10), card(1, 0), card(2, 10)];
        let small = [card(3, 3), card(4, 4)];
        assert_eq!(score_hand(&perfect), 20_040);
        assert_eq!(score_hand(&small), -663);
        assert!(score_hand(&perfect) > score_hand(&small));
    }

    #[test]
    fn test_zero_sum_beats_closest_to_zero() {
        let zero_sum = [card(0, -1), card(1, 1)];
        let near_zero = [card(2, 1)];
        assert!(score_hand(&zero_sum) > score_hand(&near_zero));
    }

    #[test]
    fn test_positive_sum_beats_negative_at_same_distance() {
        let positive = [card(0, 1)];
        let negative = [card(1, -1)];
        assert!(score_hand(&positive) > score_hand(&negative));
    }

    #[test]
    fn test_more_cards_break_zero_sum_tie() {
        let three_cards = [card(0, -4), card(1, 1), card(2, 3)];
        let two_cards = [card(3, -2), card(4, 2)];
        assert!(score_hand(&three_cards) > score_hand(&two_cards));
    }

    #[test]
    fn test_calculate_scores_pairwise() {
        let mut weak = Player::new(Uuid::new_v4(), 1);
        weak.hand = vec![card(0, 3), card(1, 4)];
        let mut strong = Player::new(Uuid::new_v4(), 2);
        strong.hand = vec![card(2, -1), card(3, 1)];

        let variant = GameVariant::CorellianGambit;
        assert_eq!(variant.calculate_scores(&[weak.clone(), strong.clone()]), Some(1));
        assert_eq!(variant.calculate_scores(&[strong, weak]), Some(0));
    }

    #[test]
    fn test_calculate_scores_tie_goes_to_first_player() {
        let mut first = Player::new(Uuid::new_v4(), 1);
        first.hand = vec![card(0, 2), Card::new(1, Suite::Triangle, 5)];
        let mut second = Player::new(Uuid::new_v4(), 2);
        second.hand = vec![Card::new(2, Suite::Square, 2), card(3, 5)];

        assert_eq!(
            GameVariant::CorellianGambit.calculate_scores(&[first, second]),
            Some(0)
        );
    }

    #[test]
    fn test_calculate_scores_empty_table() {
        assert_eq!(GameVariant::CorellianGambit.calculate_scores(&[]), None);
    }

    // --- apply ---

    #[test]
    fn test_draw_deck_moves_front_card_into_hand() {
        let (mut session, ids) = playing_session(2);
        let expected = session.deck[0];
        session.apply(ids[0], Action::DrawDeck, None).unwrap();
        let hand = &session.players[0].hand;
        assert_eq!(hand.len(), INITIAL_HAND_SIZE + 1);
        assert_eq!(*hand.last().unwrap(), expected);
        assert_eq!(session.turn, 2);
        assert_cards_conserved(&session);
    }

    #[test]
    fn test_out_of_turn_action_mutates_nothing() {
        let (mut session, ids) = playing_session(2);
        let deck_before = session.deck.clone();
        let hands_before: Vec<Vec<Card>> =
            session.players.iter().map(|p| p.hand.clone()).collect();

        // Player 2 acts while it is player 1's turn.
        let err = session.apply(ids[1], Action::DrawDeck, None).unwrap_err();
        assert!(matches!(err, ActionError::InvalidAction(_)));
        assert_eq!(session.deck, deck_before);
        assert_eq!(session.turn, 1);
        for (player, before) in session.players.iter().zip(&hands_before) {
            assert_eq!(&player.hand, before);
        }
    }

    #[test]
    fn test_unknown_identity_is_not_found() {
        let (mut session, _) = playing_session(2);
        let err = session
            .apply(Uuid::new_v4(), Action::DrawDeck, None)
            .unwrap_err();
        assert_eq!(err, ActionError::NotFound);
        assert_eq!(session.turn, 1);
    }

    #[test]
    fn test_draw_discard_on_empty_pile_is_refused() {
        let (mut session, ids) = playing_session(2);
        assert!(session.discard.is_empty());
        let hand_before = session.players[0].hand.clone();

        let err = session.apply(ids[0], Action::DrawDiscard, None).unwrap_err();
        assert!(matches!(err, ActionError::InvalidAction(_)));
        assert_eq!(session.players[0].hand, hand_before);
        assert!(session.discard.is_empty());
        assert_eq!(session.turn, 1);
    }

    #[test]
    fn test_discard_then_draw_discard_round_trips_card() {
        let (mut session, ids) = playing_session(2);
        let discarded = session.players[0].hand[0];

        session
            .apply(ids[0], Action::Discard, Some(discarded.id))
            .unwrap();
        assert_eq!(session.discard.last(), Some(&discarded));
        assert_eq!(session.players[0].hand.len(), INITIAL_HAND_SIZE - 1);

        session.apply(ids[1], Action::DrawDiscard, None).unwrap();
        assert!(session.discard.is_empty());
        assert!(session.players[1].hand.contains(&discarded));
        assert_cards_conserved(&session);
    }

    #[test]
    fn test_discard_without_card_id_is_refused() {
        let (mut session, ids) = playing_session(2);
        let err = session.apply(ids[0], Action::Discard, None).unwrap_err();
        assert!(matches!(err, ActionError::InvalidAction(_)));
        assert_eq!(session.players[0].hand.len(), INITIAL_HAND_SIZE);
        assert_eq!(session.turn, 1);
    }

    #[test]
    fn test_discard_of_foreign_card_is_refused() {
        let (mut session, ids) = playing_session(2);
        // A card id that sits in the deck, not in player 1's hand.
        let foreign_id = session.deck[10].id;
        let err = session
            .apply(ids[0], Action::Discard, Some(foreign_id))
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidAction(_)));
        assert_eq!(session.players[0].hand.len(), INITIAL_HAND_SIZE);
        assert_cards_conserved(&session);
    }

    #[test]
    fn test_round_advances_when_turn_passes_last_player() {
        let (mut session, ids) = playing_session(2);
        session.apply(ids[0], Action::Pass, None).unwrap();
        assert_eq!(session.round, 1);
        assert_eq!(session.turn, 2);

        session.apply(ids[1], Action::Pass, None).unwrap();
        assert_eq!(session.round, 2);
        assert_eq!(session.turn, 1);
        assert_cards_conserved(&session);
    }

    #[test]
    fn test_doubles_reshuffle_replaces_every_hand() {
        let (mut session, _) = playing_session(3);
        let hands_before: Vec<Vec<Card>> =
            session.players.iter().map(|p| p.hand.clone()).collect();
        session.turn = 4; // past the last player, as apply would leave it

        session.resolve_round_end(5, 5);

        assert_eq!(session.round, 2);
        assert_eq!(session.turn, 1);
        for (player, before) in session.players.iter().zip(&hands_before) {
            // Same hand size, entirely fresh cards.
            assert_eq!(player.hand.len(), before.len());
            assert!(player.hand.iter().all(|c| !before.contains(c)));
        }
        // The old hands all went to the discard pile.
        assert_eq!(
            session.discard.len(),
            hands_before.iter().map(Vec::len).sum::<usize>()
        );
        assert_cards_conserved(&session);
    }

    #[test]
    fn test_non_doubles_roll_leaves_hands_alone() {
        let (mut session, _) = playing_session(3);
        let hands_before: Vec<Vec<Card>> =
            session.players.iter().map(|p| p.hand.clone()).collect();
        session.turn = 4;

        session.resolve_round_end(2, 6);

        assert_eq!(session.round, 2);
        for (player, before) in session.players.iter().zip(&hands_before) {
            assert_eq!(&player.hand, before);
        }
        assert!(session.discard.is_empty());
    }

    #[test]
    fn test_game_finishes_after_final_round() {
        let (mut session, ids) = playing_session(2);
        let pot = session.hand_pot;
        let credits_before: i64 = session.players.iter().map(|p| p.credits).sum();

        // Three rounds of passes, two players each.
        for _ in 0..3 {
            assert!(session.is_active);
            session.apply(ids[0], Action::Pass, None).unwrap();
            session.apply(ids[1], Action::Pass, None).unwrap();
        }

        assert!(!session.is_active);
        assert_eq!(session.round, 4);
        let winner_idx = session.winner.expect("winner must be set");
        assert_eq!(session.hand_pot, 0);
        // The pot moved to the winner; credits are conserved overall.
        assert_eq!(
            session.players.iter().map(|p| p.credits).sum::<i64>(),
            credits_before + pot
        );
        assert!(session.players[winner_idx].credits > STARTING_CREDITS - 2 * session.ante_amount);
        assert_cards_conserved(&session);

        // A finished session refuses further actions and keeps its winner.
        let err = session.apply(ids[0], Action::Pass, None).unwrap_err();
        assert!(matches!(err, ActionError::PreconditionFailed(_)));
        assert_eq!(session.winner, Some(winner_idx));
    }

    #[test]
    fn test_conservation_across_full_game() {
        let (mut session, ids) = playing_session(3);
        let script = [
            (0, Action::DrawDeck, None),
            (1, Action::Pass, None),
            (2, Action::DrawDeck, None),
            (0, Action::Discard, Some(())),
            (1, Action::DrawDeck, None),
            (2, Action::Pass, None),
            (0, Action::Pass, None),
            (1, Action::DrawDeck, None),
            (2, Action::DrawDeck, None),
        ];
        for (who, action, discard_own) in script {
            let value = if discard_own.is_some() {
                Some(session.players[who].hand[0].id)
            } else {
                None
            };
            session.apply(ids[who], action, value).unwrap();
            assert_cards_conserved(&session);
        }
        assert!(!session.is_active);
        assert!(session.winner.is_some());
    }
}
