pub mod action;
pub mod arbiter;
pub mod engine;
pub mod error;
pub mod events;
pub mod registry;
pub mod table;

pub use action::Action;
pub use arbiter::{Emblem, Inbox, PromptId, WindowConfig};
pub use engine::ActionEngine;
pub use error::GameError;
pub use events::{Announcer, DeliveryError, GameEvent, LogAnnouncer, Messenger, SilentMessenger};
pub use registry::{GameRegistry, SeatView, TableView};
pub use table::{Deck, Player, Roster, Table};

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::Character::{Ambassador, Assassin, Captain, Contessa, Duke};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Character {
    Duke,
    Assassin,
    Captain,
    Ambassador,
    Contessa,
}

pub static CHARACTER_VARIANTS: [Character; 5] = [
    Duke,
    Assassin,
    Captain,
    Ambassador,
    Contessa,
];

/// 3 copies of each character
pub const DECK_SIZE: usize = 15;

pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS: usize = 7;

pub const STARTING_COINS: u8 = 2;

/// at 10+ coins the only legal action is a coup
pub const FORCED_COUP_AT: u8 = 10;

/// Opaque handle for a player, assigned by the hosting platform.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u64);

impl Display for PlayerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Identity of one independent game instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub u64);

impl Display for TableId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}
