use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// ---- Cards ----
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];

    pub fn as_str(self) -> &'static str {
        match self {
            Suit::Hearts => "hearts",
            Suit::Diamonds => "diamonds",
            Suit::Clubs => "clubs",
            Suit::Spades => "spades",
        }
    }
}

/// Ranks in ascending order. Ace is low: it starts runs and never ends them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Ace,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Ace,
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
    ];

    /// Position in the ace-low ordering, 0 (ace) through 12 (king).
    pub fn offset(self) -> usize {
        self as usize
    }

    /// Penalty points for an unmatched card. An unmatched wild counts the
    /// same way, by its rank's face value (wild ranks are never aces).
    pub fn penalty_points(self) -> u32 {
        match self {
            Rank::Ace => 15,
            Rank::Jack | Rank::Queen | Rank::King => 10,
            other => other as u32 + 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rank::Ace => "ace",
            Rank::Two => "two",
            Rank::Three => "three",
            Rank::Four => "four",
            Rank::Five => "five",
            Rank::Six => "six",
            Rank::Seven => "seven",
            Rank::Eight => "eight",
            Rank::Nine => "nine",
            Rank::Ten => "ten",
            Rank::Jack => "jack",
            Rank::Queen => "queen",
            Rank::King => "king",
        }
    }
}

/// Rounds are numbered 1..=11.
pub const FINAL_ROUND: u8 = 11;

/// Cards dealt to each player in the given round.
pub fn deal_size(round: u8) -> usize {
    round as usize + 2
}

/// Wild rank for the round: the rank whose face value is `round + 2`
/// (3s in round 1 up through kings in round 11).
pub fn wild_rank_for_round(round: u8) -> Rank {
    Rank::ALL[round as usize + 1]
}

/// Complete 52-card decks in the composite deck for a player count.
pub fn decks_for_players(n: usize) -> usize {
    if n <= 3 {
        1
    } else if n <= 5 {
        2
    } else {
        3
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    /// Stable identifier, unique within one shuffled composite deck.
    pub id: String,
    pub suit: Suit,
    pub rank: Rank,
}

impl Card {
    pub fn is_wild(&self, wild_rank: Rank) -> bool {
        self.rank == wild_rank
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = match self.rank {
            Rank::Ace => "A",
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
        };
        let s = match self.suit {
            Suit::Hearts => "♥",
            Suit::Diamonds => "♦",
            Suit::Clubs => "♣",
            Suit::Spades => "♠",
        };
        write!(f, "{}{}", r, s)
    }
}

#[derive(Debug, Clone)]
pub struct Deck {
    pub cards: Vec<Card>,
}

impl Deck {
    /// Build the composite deck for `n_players` and Fisher–Yates shuffle it.
    /// Card ids carry the deck index so duplicates across decks stay
    /// distinguishable.
    pub fn composite_shuffled(n_players: usize) -> Self {
        let decks = decks_for_players(n_players);
        let mut cards = Vec::with_capacity(decks * 52);
        for deck_index in 0..decks {
            for &suit in &Suit::ALL {
                for rank in Rank::ALL {
                    cards.push(Card {
                        id: format!("{}-{}-{}", deck_index, suit.as_str(), rank.as_str()),
                        suit,
                        rank,
                    });
                }
            }
        }
        cards.shuffle(&mut thread_rng());
        Deck { cards }
    }

    pub fn draw(&mut self) -> Option<Card> {
        self.cards.pop()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

/// ---- Phases ----
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Playing,
    FinalTurns,
    RoundOver,
    Finished,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Draw,
    Discard,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Empty,
    Gathering,
    InGame,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DrawSource {
    Pile,
    Discard,
}

/// ---- Public views ----
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LobbyPlayer {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSummary {
    pub room_id: String,
    pub room_name: String,
    pub status: RoomStatus,
    pub player_count: usize,
    pub max_players: usize,
}

/// One seat as seen by a particular viewer. `hand` is populated only for
/// the viewer's own seat; everyone else carries `hand_count` alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicPlayer {
    pub id: String,
    pub name: String,
    pub cumulative_score: u32,
    pub has_gone_out: bool,
    pub next_round_confirmed: bool,
    pub hand: Vec<Card>,
    pub hand_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub round_number: u8,
    pub wild_rank: Rank,
    pub phase: GamePhase,
    pub turn_phase: TurnPhase,
    pub dealer_index: usize,
    pub current_player_index: usize,
    pub draw_pile_count: usize,
    pub discard_top: Option<Card>,
    pub went_out_player_id: Option<String>,
    pub final_turns_remaining: usize,
    pub players: Vec<PublicPlayer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundResult {
    pub player_id: String,
    pub player_name: String,
    pub round_points: u32,
    pub cumulative_score: u32,
    pub penalty_cards: Vec<Card>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub id: String,
    pub name: String,
    pub score: u32,
}

/// ---- Wire messages ----
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientToServer {
    JoinLobby { room_id: String, player_name: String },
    LeaveLobby { room_id: String },
    StartGame { room_id: String },
    DrawCard { room_id: String, source: DrawSource },
    DiscardCard { room_id: String, card_id: String },
    GoOut { room_id: String, card_id: String },
    NextRound { room_id: String },
    EndGame { room_id: String },
}

impl ClientToServer {
    /// Room id carried in the payload; the URL-bound room stays authoritative.
    pub fn room_id(&self) -> &str {
        match self {
            ClientToServer::JoinLobby { room_id, .. }
            | ClientToServer::LeaveLobby { room_id }
            | ClientToServer::StartGame { room_id }
            | ClientToServer::DrawCard { room_id, .. }
            | ClientToServer::DiscardCard { room_id, .. }
            | ClientToServer::GoOut { room_id, .. }
            | ClientToServer::NextRound { room_id }
            | ClientToServer::EndGame { room_id } => room_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerToClient {
    RoomsUpdate {
        rooms: Vec<RoomSummary>,
    },
    LobbyUpdate {
        room_id: String,
        players: Vec<LobbyPlayer>,
        status: RoomStatus,
    },
    GameState {
        game: GameSnapshot,
    },
    PlayerWentOut {
        player_name: String,
        final_turns_remaining: usize,
    },
    RoundOver {
        round_number: u8,
        results: Vec<RoundResult>,
    },
    GameFinished {
        leaderboard: Vec<LeaderboardEntry>,
    },
    LobbyReset {
        room_id: String,
    },
    Error {
        message: String,
    },
}
