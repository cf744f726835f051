use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info};
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;

use crate::arbiter::{Emblem, Inbox, PromptId, WindowConfig};
use crate::engine::ActionEngine;
use crate::error::GameError;
use crate::events::{Announcer, Messenger};
use crate::table::Table;
use crate::{Character, PlayerId, TableId};

/// One registered table: the game state behind its resolution lock, plus
/// the response intake, which deliberately lives outside that lock so
/// responses can flow in while a resolution is suspended on a window.
struct GameTable {
    state: AsyncMutex<Table>,
    inbox: Inbox,
}

/// Process-wide owner of every table. Tables are created on first
/// reference and torn down by the hosting application's cleanup sweep.
/// Different tables resolve actions fully concurrently; within one table
/// the state lock serializes commands.
pub struct GameRegistry {
    engine: ActionEngine,
    tables: Mutex<HashMap<TableId, Arc<GameTable>>>,
}

/// Read-only view of one table, seats in turn order.
#[derive(Clone, Debug, Serialize)]
pub struct TableView {
    pub started: bool,
    pub seats: Vec<SeatView>,
    pub deck: usize,
    pub discard: Vec<Character>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SeatView {
    pub player: PlayerId,
    pub coins: u8,
    pub cards: usize,
    pub current: bool,
}

impl GameRegistry {
    pub fn new(announcer: Arc<dyn Announcer>, messenger: Arc<dyn Messenger>) -> Self {
        Self::with_windows(announcer, messenger, WindowConfig::default())
    }

    pub fn with_windows(
        announcer: Arc<dyn Announcer>,
        messenger: Arc<dyn Messenger>,
        windows: WindowConfig,
    ) -> Self {
        Self {
            engine: ActionEngine::with_windows(announcer, messenger, windows),
            tables: Mutex::new(HashMap::new()),
        }
    }

    fn table(&self, id: TableId) -> Arc<GameTable> {
        let mut tables = self.tables.lock().expect("registry lock poisoned");
        tables
            .entry(id)
            .or_insert_with(|| {
                info!("creating table {id}");
                Arc::new(GameTable {
                    state: AsyncMutex::new(Table::new(id)),
                    inbox: Inbox::new(),
                })
            })
            .clone()
    }

    pub async fn start(&self, table: TableId) -> Result<(), GameError> {
        let entry = self.table(table);
        let mut state = entry.state.lock().await;
        state.touch();
        self.engine.start(&mut state, &entry.inbox).await
    }

    pub async fn start_seated(&self, table: TableId, players: &[PlayerId]) -> Result<(), GameError> {
        let entry = self.table(table);
        let mut state = entry.state.lock().await;
        state.touch();
        self.engine.start_seated(&mut state, players).await
    }

    pub async fn end(&self, table: TableId) -> Result<(), GameError> {
        let entry = self.table(table);
        let mut state = entry.state.lock().await;
        state.touch();
        self.engine.end(&mut state).await
    }

    pub async fn income(&self, table: TableId, actor: PlayerId) -> Result<(), GameError> {
        let entry = self.table(table);
        let mut state = entry.state.lock().await;
        state.touch();
        self.engine.income(&mut state, &entry.inbox, actor).await
    }

    pub async fn foreign_aid(&self, table: TableId, actor: PlayerId) -> Result<(), GameError> {
        let entry = self.table(table);
        let mut state = entry.state.lock().await;
        state.touch();
        self.engine.foreign_aid(&mut state, &entry.inbox, actor).await
    }

    pub async fn coup(&self, table: TableId, actor: PlayerId, target: PlayerId) -> Result<(), GameError> {
        let entry = self.table(table);
        let mut state = entry.state.lock().await;
        state.touch();
        self.engine.coup(&mut state, &entry.inbox, actor, target).await
    }

    pub async fn tax(&self, table: TableId, actor: PlayerId) -> Result<(), GameError> {
        let entry = self.table(table);
        let mut state = entry.state.lock().await;
        state.touch();
        self.engine.tax(&mut state, &entry.inbox, actor).await
    }

    pub async fn assassinate(&self, table: TableId, actor: PlayerId, target: PlayerId) -> Result<(), GameError> {
        let entry = self.table(table);
        let mut state = entry.state.lock().await;
        state.touch();
        self.engine.assassinate(&mut state, &entry.inbox, actor, target).await
    }

    pub async fn steal(&self, table: TableId, actor: PlayerId, target: PlayerId) -> Result<(), GameError> {
        let entry = self.table(table);
        let mut state = entry.state.lock().await;
        state.touch();
        self.engine.steal(&mut state, &entry.inbox, actor, target).await
    }

    pub async fn exchange(&self, table: TableId, actor: PlayerId) -> Result<(), GameError> {
        let entry = self.table(table);
        let mut state = entry.state.lock().await;
        state.touch();
        self.engine.exchange(&mut state, &entry.inbox, actor).await
    }

    /// A roster member became unreachable; treat it as elimination.
    pub async fn remove_player(&self, table: TableId, player: PlayerId) -> Result<(), GameError> {
        let entry = self.table(table);
        let mut state = entry.state.lock().await;
        state.touch();
        self.engine.remove_player(&mut state, player).await
    }

    /// Routes a reaction to the table's open prompt. Late, duplicate and
    /// stray submissions are dropped.
    pub fn respond(&self, table: TableId, prompt: PromptId, responder: PlayerId, emblem: Emblem) -> bool {
        let accepted = self.table(table).inbox.submit_reaction(prompt, responder, emblem);
        if !accepted {
            debug!("table {table}: ignored {emblem:?} from player {responder} for {prompt}");
        }
        accepted
    }

    /// Routes a choose-k answer to the table's open prompt.
    pub fn choose(&self, table: TableId, prompt: PromptId, player: PlayerId, picks: Vec<usize>) -> bool {
        let accepted = self.table(table).inbox.submit_selection(prompt, player, picks);
        if !accepted {
            debug!("table {table}: ignored selection from player {player} for {prompt}");
        }
        accepted
    }

    pub async fn hand(&self, table: TableId, player: PlayerId) -> Result<Vec<Character>, GameError> {
        let entry = self.table(table);
        let mut state = entry.state.lock().await;
        state.touch();
        let seat = state.roster().get(player).ok_or(GameError::NotInGame(player))?;
        Ok(seat.hand().to_vec())
    }

    pub async fn coins(&self, table: TableId, player: PlayerId) -> Result<u8, GameError> {
        let entry = self.table(table);
        let mut state = entry.state.lock().await;
        state.touch();
        let seat = state.roster().get(player).ok_or(GameError::NotInGame(player))?;
        Ok(seat.coins)
    }

    pub async fn snapshot(&self, table: TableId) -> TableView {
        let entry = self.table(table);
        let mut state = entry.state.lock().await;
        state.touch();
        let current = state.current_player();
        TableView {
            started: state.game_started(),
            seats: state
                .roster()
                .iter()
                .map(|p| SeatView {
                    player: p.id,
                    coins: p.coins,
                    cards: p.hand().len(),
                    current: current == Some(p.id),
                })
                .collect(),
            deck: state.deck().len(),
            discard: state.discard().to_vec(),
        }
    }

    /// Sweep hook for the host's scheduled cleanup: drops tables that have
    /// gone idle, and never-started tables past `unstarted_age`. A table
    /// in the middle of a resolution is never reaped.
    pub fn reap_inactive(&self, idle: Duration, unstarted_age: Duration) -> Vec<TableId> {
        let mut tables = self.tables.lock().expect("registry lock poisoned");
        let mut reaped = Vec::new();
        tables.retain(|&id, entry| {
            let state = match entry.state.try_lock() {
                Ok(state) => state,
                Err(_) => return true,
            };
            let dead = if state.game_started() {
                state.idle_for() >= idle
            } else {
                state.idle_for() >= idle || state.age() >= unstarted_age
            };
            if dead {
                info!("reaping inactive table {id}");
                reaped.push(id);
            }
            !dead
        });
        reaped
    }

    /// Explicit teardown, e.g. when the hosting community goes away.
    pub fn drop_table(&self, id: TableId) -> bool {
        let removed = self.tables.lock().expect("registry lock poisoned").remove(&id);
        if removed.is_some() {
            info!("dropped table {id}");
        }
        removed.is_some()
    }

    pub fn len(&self) -> usize {
        self.tables.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::sleep;

    use crate::events::{LogAnnouncer, SilentMessenger};

    const P1: PlayerId = PlayerId(1);
    const P2: PlayerId = PlayerId(2);

    const T1: TableId = TableId(1);
    const T2: TableId = TableId(2);

    fn registry() -> Arc<GameRegistry> {
        Arc::new(GameRegistry::with_windows(
            Arc::new(LogAnnouncer),
            Arc::new(SilentMessenger),
            WindowConfig {
                response: Duration::from_millis(250),
                lobby: Duration::from_millis(250),
                selection: Duration::from_millis(250),
                tick: Duration::from_millis(50),
            },
        ))
    }

    #[tokio::test]
    async fn tables_are_created_on_first_reference() {
        let r = registry();
        assert!(r.is_empty());

        let view = r.snapshot(T1).await;
        assert!(!view.started);
        assert!(view.seats.is_empty());
        assert_eq!(r.len(), 1);
    }

    #[tokio::test]
    async fn tables_are_independent() {
        let r = registry();
        r.start_seated(T1, &[P1, P2]).await.unwrap();
        r.start_seated(T2, &[P1, P2]).await.unwrap();

        r.income(T1, P1).await.unwrap();

        assert_eq!(r.coins(T1, P1).await.unwrap(), 3);
        assert_eq!(r.coins(T2, P1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn respond_reaches_a_resolution_in_flight() {
        let r = registry();
        r.start_seated(T1, &[P1, P2]).await.unwrap();

        // tax resolves on a task while the test plays the challenger
        let action = {
            let r = r.clone();
            tokio::spawn(async move { r.tax(T1, P1).await })
        };
        sleep(Duration::from_millis(60)).await;
        r.respond(T1, PromptId(1), P2, Emblem::Challenge);
        action.await.unwrap().unwrap();

        let view = r.snapshot(T1).await;
        // one side of the challenge lost a card
        assert_eq!(view.discard.len(), 1);
    }

    #[tokio::test]
    async fn stray_responses_are_ignored() {
        let r = registry();
        r.start_seated(T1, &[P1, P2]).await.unwrap();
        assert!(!r.respond(T1, PromptId(9), P2, Emblem::Challenge));
        assert!(!r.choose(T1, PromptId(9), P2, vec![0]));
    }

    #[tokio::test]
    async fn queries_reject_strangers() {
        let r = registry();
        r.start_seated(T1, &[P1, P2]).await.unwrap();

        assert_eq!(r.hand(T1, PlayerId(9)).await.unwrap_err(), GameError::NotInGame(PlayerId(9)));
        assert_eq!(r.hand(T1, P1).await.unwrap().len(), 2);
        assert_eq!(r.coins(T1, P1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn the_snapshot_lists_seats_in_turn_order() {
        let r = registry();
        r.start_seated(T1, &[P2, P1]).await.unwrap();

        let view = r.snapshot(T1).await;
        assert!(view.started);
        assert_eq!(view.seats.len(), 2);
        assert_eq!(view.seats[0].player, P2);
        assert!(view.seats[0].current);
        assert!(!view.seats[1].current);
        assert_eq!(view.deck, 11);
    }

    #[tokio::test]
    async fn reaping_honours_the_thresholds() {
        let r = registry();
        r.snapshot(T1).await;

        // young and recently touched: kept
        assert!(r.reap_inactive(Duration::from_secs(3600), Duration::from_secs(3600)).is_empty());
        assert_eq!(r.len(), 1);

        // zero idle budget: reaped
        let reaped = r.reap_inactive(Duration::ZERO, Duration::from_secs(3600));
        assert_eq!(reaped, vec![T1]);
        assert!(r.is_empty());
    }

    #[tokio::test]
    async fn dropped_tables_disappear() {
        let r = registry();
        r.snapshot(T1).await;
        assert!(r.drop_table(T1));
        assert!(!r.drop_table(T1));
        assert!(r.is_empty());
    }
}
