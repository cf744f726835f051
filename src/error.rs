use thiserror::Error;

use crate::PlayerId;

/// Rejections and faults surfaced by the table engine.
///
/// Everything except `DeckUnderflow` is a validation error: checked before
/// any state changes, so a rejected command can simply be retried.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("a game is already in progress")]
    GameInProgress,

    #[error("no game is currently running")]
    NoGame,

    #[error("at least {min} players are required")]
    NotEnoughPlayers { min: usize },

    #[error("at most {max} players can be seated")]
    TooManyPlayers { max: usize },

    #[error("it is not your turn")]
    NotYourTurn,

    #[error("player {0} is not part of this game")]
    NotInGame(PlayerId),

    #[error("player {0} has already been eliminated")]
    TargetEliminated(PlayerId),

    #[error("you cannot target yourself")]
    SelfTarget,

    #[error("{action} requires {need} coins, you have {have}")]
    InsufficientCoins {
        action: &'static str,
        need: u8,
        have: u8,
    },

    #[error("holding {coins} coins, you must coup")]
    MustCoup { coins: u8 },

    #[error("player {0} has no coins to steal")]
    NothingToSteal(PlayerId),

    #[error("the court deck ran out of cards")]
    DeckUnderflow,
}

impl GameError {
    /// Integrity faults mean the engine itself went wrong; they are
    /// reported to administrators rather than echoed back as a normal
    /// game message.
    pub fn is_integrity_fault(&self) -> bool {
        matches!(self, GameError::DeckUnderflow)
    }
}
