use thiserror::Error;

/// Command rejections, sent back to the originator as an `error` frame.
/// Every variant leaves room and game state untouched; the kind token
/// leads the message so clients can match on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("RoomBusy: a game is already in progress in this room")]
    RoomBusy,
    #[error("RoomFull: the lobby already has the maximum number of players")]
    RoomFull,
    #[error("DuplicateName: that name is already taken in this room")]
    DuplicateName,
    #[error("NotInLobby: join the room lobby first")]
    NotInLobby,
    #[error("NotYourTurn: it is not your turn")]
    NotYourTurn,
    #[error("WrongPhase: {0}")]
    WrongPhase(&'static str),
    #[error("UnknownCard: no card {0} in your hand")]
    UnknownCard(String),
    #[error("InvalidGoOut: the remaining hand does not split into sets and runs")]
    InvalidGoOut,
    #[error("EmptyDiscard: the discard pile is empty")]
    EmptyDiscard,
    #[error("MalformedCommand: {0}")]
    MalformedCommand(String),
    /// Invariant breach. Logged server-side; the command is aborted and the
    /// room stays usable.
    #[error("Internal: {0}")]
    Internal(&'static str),
}
