//! Per-room game state for one game of Three Thirteen: an 11-round rummy
//! variant where round r deals r+2 cards and makes the rank of face value
//! r+2 wild. All operations run under the owning room's lock and either
//! fully succeed or return a `GameError` with no state change.

use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use tracing::info;

use three_thirteen_protocol::{
    deal_size, wild_rank_for_round, Card, Deck, DrawSource, GamePhase, GameSnapshot,
    LeaderboardEntry, LobbyPlayer, PublicPlayer, Rank, RoundResult, TurnPhase, FINAL_ROUND,
};

use crate::error::GameError;
use crate::evaluator;

pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS: usize = 8;

/// One seated player for the duration of a game.
#[derive(Debug, Clone)]
pub struct Seat {
    pub id: String,
    pub name: String,
    pub hand: Vec<Card>,
    pub cumulative_score: u32,
    pub has_gone_out: bool,
    pub next_round_confirmed: bool,
}

impl Seat {
    fn new(p: &LobbyPlayer) -> Self {
        Seat {
            id: p.id.clone(),
            name: p.name.clone(),
            hand: Vec::new(),
            cumulative_score: 0,
            has_gone_out: false,
            next_round_confirmed: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameState {
    pub round_number: u8,
    pub wild_rank: Rank,
    pub players: Vec<Seat>,
    pub dealer_index: usize,
    pub current_player_index: usize,
    pub turn_phase: TurnPhase,
    pub draw_pile: Vec<Card>,
    pub discard_pile: Vec<Card>,
    pub phase: GamePhase,
    pub went_out_player_id: Option<String>,
    pub final_turns_remaining: usize,
    pub round_results: Vec<RoundResult>,
}

impl GameState {
    /// Seat the lobby roster in random order, pick a random dealer, and
    /// deal round 1.
    pub fn new(roster: &[LobbyPlayer]) -> Result<Self, GameError> {
        let n = roster.len();
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&n) {
            return Err(GameError::WrongPhase("need 2 to 8 players to start"));
        }
        let mut seating: Vec<&LobbyPlayer> = roster.iter().collect();
        seating.shuffle(&mut thread_rng());
        let dealer_index = thread_rng().gen_range(0..n);

        let mut game = GameState {
            round_number: 1,
            wild_rank: wild_rank_for_round(1),
            players: seating.into_iter().map(Seat::new).collect(),
            dealer_index,
            current_player_index: 0,
            turn_phase: TurnPhase::Draw,
            draw_pile: Vec::new(),
            discard_pile: Vec::new(),
            phase: GamePhase::Playing,
            went_out_player_id: None,
            final_turns_remaining: 0,
            round_results: Vec::new(),
        };
        game.deal()?;
        info!(
            "[DEAL] round=1 players={} dealer={} wild={:?}",
            game.players.len(),
            game.dealer_index,
            game.wild_rank
        );
        Ok(game)
    }

    /// Shuffle a fresh composite deck and deal the current round: `round+2`
    /// cards each, clockwise from the dealer's left, then flip one card to
    /// start the discard pile.
    fn deal(&mut self) -> Result<(), GameError> {
        let n = self.players.len();
        let mut deck = Deck::composite_shuffled(n);
        let hand_size = deal_size(self.round_number);

        for p in self.players.iter_mut() {
            p.hand.clear();
            p.has_gone_out = false;
            p.next_round_confirmed = false;
        }
        for _ in 0..hand_size {
            for offset in 1..=n {
                let seat = (self.dealer_index + offset) % n;
                let card = deck.draw().ok_or(GameError::Internal("deck ran out while dealing"))?;
                self.players[seat].hand.push(card);
            }
        }

        self.draw_pile = deck.cards;
        let top = self
            .draw_pile
            .pop()
            .ok_or(GameError::Internal("deck ran out while dealing"))?;
        self.discard_pile = vec![top];

        self.wild_rank = wild_rank_for_round(self.round_number);
        self.current_player_index = (self.dealer_index + 1) % n;
        self.turn_phase = TurnPhase::Draw;
        self.phase = GamePhase::Playing;
        self.went_out_player_id = None;
        self.final_turns_remaining = 0;
        self.round_results.clear();
        Ok(())
    }

    fn seat_of(&self, player_id: &str) -> Option<usize> {
        self.players.iter().position(|p| p.id == player_id)
    }

    fn require_current(&self, player_id: &str) -> Result<usize, GameError> {
        match self.seat_of(player_id) {
            Some(seat) if seat == self.current_player_index => Ok(seat),
            _ => Err(GameError::NotYourTurn),
        }
    }

    fn require_turn_phase(&self, phase: TurnPhase) -> Result<(), GameError> {
        if !matches!(self.phase, GamePhase::Playing | GamePhase::FinalTurns) {
            return Err(GameError::WrongPhase("the hand is not being played"));
        }
        if self.turn_phase != phase {
            return Err(match phase {
                TurnPhase::Draw => GameError::WrongPhase("you have already drawn this turn"),
                TurnPhase::Discard => GameError::WrongPhase("draw a card first"),
            });
        }
        Ok(())
    }

    /// Move one card from the chosen source into the current player's hand.
    /// An empty draw pile is rebuilt from the discard pile, minus its top
    /// card, before the draw.
    pub fn draw(&mut self, player_id: &str, source: DrawSource) -> Result<(), GameError> {
        self.require_turn_phase(TurnPhase::Draw)?;
        let seat = self.require_current(player_id)?;

        let card = match source {
            DrawSource::Discard => self.discard_pile.pop().ok_or(GameError::EmptyDiscard)?,
            DrawSource::Pile => {
                if self.draw_pile.is_empty() {
                    self.recycle_discard()?;
                }
                self.draw_pile
                    .pop()
                    .ok_or(GameError::Internal("draw pile empty after recycle"))?
            }
        };
        info!("[DRAW] seat={} source={:?} card={}", seat, source, card);
        self.players[seat].hand.push(card);
        self.turn_phase = TurnPhase::Discard;
        Ok(())
    }

    /// Shuffle everything under the discard top back into the draw pile.
    fn recycle_discard(&mut self) -> Result<(), GameError> {
        let top = self
            .discard_pile
            .pop()
            .ok_or(GameError::Internal("both piles empty"))?;
        let mut rest = std::mem::take(&mut self.discard_pile);
        rest.shuffle(&mut thread_rng());
        info!("[DRAW] recycled {} discards into the draw pile", rest.len());
        self.draw_pile = rest;
        self.discard_pile.push(top);
        Ok(())
    }

    /// Discard one card and pass the turn. During final turns this also
    /// counts down to scoring.
    pub fn discard(&mut self, player_id: &str, card_id: &str) -> Result<(), GameError> {
        self.require_turn_phase(TurnPhase::Discard)?;
        let seat = self.require_current(player_id)?;

        let pos = self.players[seat]
            .hand
            .iter()
            .position(|c| c.id == card_id)
            .ok_or_else(|| GameError::UnknownCard(card_id.to_string()))?;
        let card = self.players[seat].hand.remove(pos);
        info!("[DISCARD] seat={} card={}", seat, card);
        self.discard_pile.push(card);
        self.finish_turn();
        Ok(())
    }

    /// Discard the nominated card and end the round's normal play, provided
    /// the rest of the hand splits entirely into sets and runs. Rejection
    /// leaves the turn in the discard phase so the player may try again or
    /// discard normally.
    pub fn go_out(&mut self, player_id: &str, card_id: &str) -> Result<(), GameError> {
        if self.phase != GamePhase::Playing {
            return Err(GameError::WrongPhase("someone has already gone out"));
        }
        self.require_turn_phase(TurnPhase::Discard)?;
        let seat = self.require_current(player_id)?;

        let pos = self.players[seat]
            .hand
            .iter()
            .position(|c| c.id == card_id)
            .ok_or_else(|| GameError::UnknownCard(card_id.to_string()))?;

        let mut rest = self.players[seat].hand.clone();
        rest.remove(pos);
        if !evaluator::can_go_out(&rest, self.wild_rank) {
            return Err(GameError::InvalidGoOut);
        }

        let card = self.players[seat].hand.remove(pos);
        self.discard_pile.push(card);
        self.players[seat].has_gone_out = true;
        self.went_out_player_id = Some(player_id.to_string());
        self.final_turns_remaining = self.players.len() - 1;
        self.phase = GamePhase::FinalTurns;
        info!(
            "[GO_OUT] seat={} final_turns={}",
            seat, self.final_turns_remaining
        );
        self.advance_cursor();
        Ok(())
    }

    fn finish_turn(&mut self) {
        match self.phase {
            GamePhase::Playing => self.advance_cursor(),
            GamePhase::FinalTurns => {
                self.final_turns_remaining -= 1;
                if self.final_turns_remaining == 0 {
                    self.score_round();
                } else {
                    self.advance_cursor();
                }
            }
            GamePhase::RoundOver | GamePhase::Finished => {}
        }
    }

    fn advance_cursor(&mut self) {
        self.current_player_index = (self.current_player_index + 1) % self.players.len();
        self.turn_phase = TurnPhase::Draw;
    }

    /// Run the minimum-penalty split for every hand. The player who went
    /// out scores zero; so does anyone whose final turn left a hand that
    /// splits completely.
    fn score_round(&mut self) {
        self.phase = GamePhase::RoundOver;
        let wild = self.wild_rank;
        let mut results = Vec::with_capacity(self.players.len());
        for p in self.players.iter_mut() {
            let (points, penalty_cards) = if p.has_gone_out {
                (0, Vec::new())
            } else {
                let split = evaluator::min_penalty(&p.hand, wild);
                (split.penalty, split.penalty_cards)
            };
            p.cumulative_score += points;
            results.push(RoundResult {
                player_id: p.id.clone(),
                player_name: p.name.clone(),
                round_points: points,
                cumulative_score: p.cumulative_score,
                penalty_cards,
            });
        }
        info!(
            "[SCORE] round={} results={:?}",
            self.round_number,
            results
                .iter()
                .map(|r| (r.player_name.as_str(), r.round_points))
                .collect::<Vec<_>>()
        );
        self.round_results = results;
    }

    /// Record one player's confirmation at the round break. Returns true
    /// once every seat has confirmed and the game has advanced: either into
    /// the next round or, after round 11, into `Finished`.
    pub fn confirm_next_round(&mut self, player_id: &str) -> Result<bool, GameError> {
        if self.phase != GamePhase::RoundOver {
            return Err(GameError::WrongPhase("the round is not over"));
        }
        let seat = self.seat_of(player_id).ok_or(GameError::NotYourTurn)?;
        if self.players[seat].next_round_confirmed {
            // Duplicate click, nothing to do.
            return Ok(false);
        }
        self.players[seat].next_round_confirmed = true;
        if !self.players.iter().all(|p| p.next_round_confirmed) {
            return Ok(false);
        }

        if self.round_number == FINAL_ROUND {
            self.phase = GamePhase::Finished;
            info!("[FINISH] game over after round {}", self.round_number);
            return Ok(true);
        }
        self.round_number += 1;
        self.dealer_index = (self.dealer_index + 1) % self.players.len();
        self.deal()?;
        info!(
            "[DEAL] round={} dealer={} wild={:?}",
            self.round_number, self.dealer_index, self.wild_rank
        );
        Ok(true)
    }

    /// Final standings, ascending by score; seating order breaks ties.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self
            .players
            .iter()
            .map(|p| LeaderboardEntry {
                id: p.id.clone(),
                name: p.name.clone(),
                score: p.cumulative_score,
            })
            .collect();
        entries.sort_by_key(|e| e.score);
        entries
    }

    /// Serializable view for one recipient: their own hand in full, every
    /// other hand reduced to a count, the draw pile reduced to a count, and
    /// only the top of the discard pile.
    pub fn snapshot_for(&self, viewer_id: &str) -> GameSnapshot {
        GameSnapshot {
            round_number: self.round_number,
            wild_rank: self.wild_rank,
            phase: self.phase,
            turn_phase: self.turn_phase,
            dealer_index: self.dealer_index,
            current_player_index: self.current_player_index,
            draw_pile_count: self.draw_pile.len(),
            discard_top: self.discard_pile.last().cloned(),
            went_out_player_id: self.went_out_player_id.clone(),
            final_turns_remaining: self.final_turns_remaining,
            players: self
                .players
                .iter()
                .map(|p| PublicPlayer {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    cumulative_score: p.cumulative_score,
                    has_gone_out: p.has_gone_out,
                    next_round_confirmed: p.next_round_confirmed,
                    hand: if p.id == viewer_id {
                        p.hand.clone()
                    } else {
                        Vec::new()
                    },
                    hand_count: p.hand.len(),
                })
                .collect(),
        }
    }

    /// Total cards across hands and piles; the conservation invariant says
    /// this never changes within a round.
    pub fn card_count(&self) -> usize {
        self.players.iter().map(|p| p.hand.len()).sum::<usize>()
            + self.draw_pile.len()
            + self.discard_pile.len()
    }
}
