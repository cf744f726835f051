//! Self-playing demonstration game: four scripted players at one table,
//! random actions, occasional random disputes. Events stream to stdout as
//! JSON lines.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use rand::Rng;
use tokio::sync::mpsc;

use coup_table::{
    Announcer, Character, DeliveryError, GameEvent, GameRegistry, Messenger, PlayerId, TableId,
    WindowConfig,
};

/// Prints every event and forwards it to the scripted responders.
struct ConsoleAnnouncer {
    tx: mpsc::UnboundedSender<GameEvent>,
}

#[async_trait]
impl Announcer for ConsoleAnnouncer {
    async fn announce(&self, table: TableId, event: &GameEvent) {
        println!("[table {table}] {}", event.payload());
        let _ = self.tx.send(event.clone());
    }
}

struct ConsoleMessenger;

#[async_trait]
impl Messenger for ConsoleMessenger {
    async fn notify_hand(&self, player: PlayerId, hand: &[Character]) -> Result<(), DeliveryError> {
        println!("(dm) player {player}: your hand is {hand:?}");
        Ok(())
    }

    async fn notify_exchange_pool(&self, player: PlayerId, pool: &[Character]) -> Result<(), DeliveryError> {
        println!("(dm) player {player}: pick from {pool:?}");
        Ok(())
    }
}

/// Reacts to prompts on behalf of all seated players: disputes a claim
/// now and then, always answers selection prompts with the lowest picks.
async fn respond_to_prompts(
    registry: Arc<GameRegistry>,
    table: TableId,
    players: Vec<PlayerId>,
    mut rx: mpsc::UnboundedReceiver<GameEvent>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            GameEvent::ActionDeclared { actor, prompt: Some(prompt), emblems, .. } => {
                if rand::thread_rng().gen_bool(0.25) {
                    let emblem = emblems[rand::thread_rng().gen_range(0..emblems.len())];
                    if let Some(&responder) = players.iter().find(|&&p| p != actor) {
                        registry.respond(table, prompt, responder, emblem);
                    }
                }
            }
            GameEvent::BlockDeclared { blocker, prompt, .. } => {
                if rand::thread_rng().gen_bool(0.25) {
                    if let Some(&responder) = players.iter().find(|&&p| p != blocker) {
                        registry.respond(table, prompt, responder, coup_table::Emblem::Challenge);
                    }
                }
            }
            GameEvent::SelectionRequested { prompt, player, pick, .. } => {
                registry.choose(table, prompt, player, (0..pick).collect());
            }
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (tx, rx) = mpsc::unbounded_channel();
    let registry = Arc::new(GameRegistry::with_windows(
        Arc::new(ConsoleAnnouncer { tx }),
        Arc::new(ConsoleMessenger),
        WindowConfig {
            response: Duration::from_millis(400),
            lobby: Duration::from_millis(400),
            selection: Duration::from_millis(400),
            tick: Duration::from_millis(100),
        },
    ));

    let table = TableId(1);
    let players: Vec<PlayerId> = (1..=4).map(PlayerId).collect();

    let responders = tokio::spawn(respond_to_prompts(
        registry.clone(),
        table,
        players.clone(),
        rx,
    ));

    registry
        .start_seated(table, &players)
        .await
        .expect("the demo game should start");

    loop {
        let view = registry.snapshot(table).await;
        if !view.started {
            break;
        }
        let me = match view.seats.iter().find(|s| s.current) {
            Some(seat) => seat,
            None => break,
        };
        let actor = me.player;
        let others: Vec<PlayerId> = view
            .seats
            .iter()
            .filter(|s| s.player != actor)
            .map(|s| s.player)
            .collect();
        let target = others[rand::thread_rng().gen_range(0..others.len())];

        let result = if me.coins >= 10 {
            registry.coup(table, actor, target).await
        } else {
            match rand::thread_rng().gen_range(0..6) {
                0 => registry.income(table, actor).await,
                1 => registry.foreign_aid(table, actor).await,
                2 => registry.tax(table, actor).await,
                3 => {
                    if me.coins >= 7 {
                        registry.coup(table, actor, target).await
                    } else if me.coins >= 3 {
                        registry.assassinate(table, actor, target).await
                    } else {
                        registry.income(table, actor).await
                    }
                }
                4 => registry.steal(table, actor, target).await,
                _ => registry.exchange(table, actor).await,
            }
        };

        if let Err(err) = result {
            info!("rejected: {err}");
        }
    }

    info!("demo game finished");
    responders.abort();
}
