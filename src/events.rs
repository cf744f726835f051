use async_trait::async_trait;
use log::info;
use serde::Serialize;
use thiserror::Error;

use crate::action::Action;
use crate::arbiter::{Emblem, PromptId};
use crate::{Character, PlayerId, TableId};

/// Structured events emitted at every observable step of a game. How they
/// are rendered and delivered belongs entirely to the hosting application.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    LobbyOpened { prompt: PromptId, window_secs: u64 },
    GameStarted { players: Vec<PlayerId> },
    GameEnded,
    TurnStarted { player: PlayerId, coins: u8, cards: usize, forced_coup: bool },
    ActionDeclared { actor: PlayerId, action: Action, prompt: Option<PromptId>, emblems: Vec<Emblem> },
    BlockDeclared { blocker: PlayerId, claim: Vec<Character>, prompt: PromptId },
    ChallengeDeclared { challenger: PlayerId, accused: PlayerId, claim: Vec<Character> },
    ClaimProven { player: PlayerId, card: Character },
    BluffExposed { player: PlayerId, claim: Vec<Character> },
    InfluenceLost { player: PlayerId, card: Character },
    PlayerEliminated { player: PlayerId },
    PlayerDeparted { player: PlayerId },
    ActionBlocked { actor: PlayerId, blocker: PlayerId },
    CoinsChanged { player: PlayerId, coins: u8, delta: i8 },
    ExchangeCompleted { player: PlayerId },
    SelectionRequested { prompt: PromptId, player: PlayerId, pick: usize, of: usize },
    CountdownTick { prompt: PromptId, remaining: u64 },
    PromptClosed { prompt: PromptId },
    GameOver { winner: PlayerId, hand: Vec<Character> },
    Fault { detail: String },
}

impl GameEvent {
    /// JSON payload for transports that want one.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Outbound, one-way notification channel for public game events.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, table: TableId, event: &GameEvent);
}

/// Announcer that writes events to the log. Good enough for headless runs
/// and tests.
pub struct LogAnnouncer;

#[async_trait]
impl Announcer for LogAnnouncer {
    async fn announce(&self, table: TableId, event: &GameEvent) {
        info!("[table {table}] {}", event.payload());
    }
}

#[derive(Clone, Debug, Error)]
pub enum DeliveryError {
    #[error("recipient has private messages disabled")]
    Disabled,

    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Outbound private channel, one recipient at a time. Failures come back
/// as values; the engine decides what they mean.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Deliver a player's current hand over their private channel.
    async fn notify_hand(&self, player: PlayerId, hand: &[Character]) -> Result<(), DeliveryError>;

    /// Deliver the shuffled pool an exchanging player must pick from.
    async fn notify_exchange_pool(&self, player: PlayerId, pool: &[Character]) -> Result<(), DeliveryError>;
}

/// Messenger for hosts that surface hands some other way.
pub struct SilentMessenger;

#[async_trait]
impl Messenger for SilentMessenger {
    async fn notify_hand(&self, _player: PlayerId, _hand: &[Character]) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn notify_exchange_pool(&self, _player: PlayerId, _pool: &[Character]) -> Result<(), DeliveryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Character::Duke;

    #[test]
    fn events_serialize_with_a_tag() {
        let event = GameEvent::InfluenceLost {
            player: PlayerId(3),
            card: Duke,
        };
        let payload = event.payload();
        assert_eq!(payload["event"], "influence_lost");
        assert_eq!(payload["player"], 3);
        assert_eq!(payload["card"], "Duke");
    }

    #[test]
    fn turn_event_carries_the_forced_coup_flag() {
        let event = GameEvent::TurnStarted {
            player: PlayerId(1),
            coins: 11,
            cards: 2,
            forced_coup: true,
        };
        assert_eq!(event.payload()["forced_coup"], true);
    }
}
