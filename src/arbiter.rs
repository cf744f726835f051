use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::debug;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::{timeout, Instant};

use crate::events::{Announcer, GameEvent};
use crate::table::Roster;
use crate::{PlayerId, TableId};

/// Identity of one response window. Ids are per-table and monotonically
/// increasing, so a stale submission can never match a newer prompt.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct PromptId(pub u64);

impl Display for PromptId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "prompt {}", self.0)
    }
}

/// The finite set of reactions a prompt can accept.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Emblem {
    Join,
    Block,
    Challenge,
}

/// Window budgets. The defaults match the table pacing of a live chat
/// game; tests and benches shrink them.
#[derive(Clone, Debug)]
pub struct WindowConfig {
    /// block/challenge prompts
    pub response: Duration,
    /// the join lobby
    pub lobby: Duration,
    /// choose-k prompts (exchange keep-set, influence loss)
    pub selection: Duration,
    /// countdown granularity
    pub tick: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            response: Duration::from_secs(5),
            lobby: Duration::from_secs(10),
            selection: Duration::from_secs(30),
            tick: Duration::from_secs(1),
        }
    }
}

enum Entry {
    Reaction { emblem: Emblem, from: PlayerId },
    Selection { from: PlayerId, picks: Vec<usize> },
}

struct OpenPrompt {
    id: PromptId,
    entries: Vec<Entry>,
    // a reaction is counted once per (prompt, emblem, responder), no
    // matter how often or through which path it arrives
    seen: HashSet<(Emblem, PlayerId)>,
}

struct InboxState {
    next_prompt: u64,
    open: Option<OpenPrompt>,
}

/// Per-table intake for prompt responses.
///
/// Submissions and the waiting window share one lock, so a response that
/// lands before the window starts polling is found by the buffer drain
/// instead of being lost.
pub struct Inbox {
    state: Mutex<InboxState>,
    notify: Notify,
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Inbox {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InboxState {
                next_prompt: 0,
                open: None,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, InboxState> {
        self.state.lock().expect("inbox lock poisoned")
    }

    pub(crate) fn open(&self) -> PromptId {
        let mut state = self.lock();
        state.next_prompt += 1;
        let id = PromptId(state.next_prompt);
        state.open = Some(OpenPrompt {
            id,
            entries: Vec::new(),
            seen: HashSet::new(),
        });
        id
    }

    pub(crate) fn close(&self) {
        self.lock().open = None;
    }

    /// Returns false when the prompt is no longer open or the reaction was
    /// already counted.
    pub fn submit_reaction(&self, prompt: PromptId, responder: PlayerId, emblem: Emblem) -> bool {
        let accepted = {
            let mut state = self.lock();
            match state.open.as_mut() {
                Some(open) if open.id == prompt => {
                    if open.seen.insert((emblem, responder)) {
                        open.entries.push(Entry::Reaction { emblem, from: responder });
                        true
                    } else {
                        false
                    }
                }
                _ => false,
            }
        };
        if accepted {
            self.notify.notify_one();
        }
        accepted
    }

    /// Returns false when the prompt is no longer open.
    pub fn submit_selection(&self, prompt: PromptId, player: PlayerId, picks: Vec<usize>) -> bool {
        let accepted = {
            let mut state = self.lock();
            match state.open.as_mut() {
                Some(open) if open.id == prompt => {
                    open.entries.push(Entry::Selection { from: player, picks });
                    true
                }
                _ => false,
            }
        };
        if accepted {
            self.notify.notify_one();
        }
        accepted
    }
}

/// Bounded-wait collection of prompt responses, one window at a time per
/// table. The countdown ticks and the listener run in the same loop, so
/// both stop together on every exit path.
pub(crate) struct Arbiter {
    announcer: Arc<dyn Announcer>,
    pub(crate) windows: WindowConfig,
}

impl Arbiter {
    pub(crate) fn new(announcer: Arc<dyn Announcer>, windows: WindowConfig) -> Self {
        Self { announcer, windows }
    }

    /// First valid reaction in arrival order wins; None on timeout.
    pub(crate) async fn reaction_window(
        &self,
        inbox: &Inbox,
        table: TableId,
        roster: &Roster,
        prompt: PromptId,
        emblems: &[Emblem],
        initiator: PlayerId,
    ) -> Option<(Emblem, PlayerId)> {
        let deadline = Instant::now() + self.windows.response;
        let mut last_tick = u64::MAX;

        let hit = loop {
            if let Some(hit) = Self::take_reaction(inbox, roster, prompt, emblems, initiator) {
                break Some(hit);
            }
            if !self.tick_then_wait(inbox, table, prompt, deadline, &mut last_tick).await {
                break Self::take_reaction(inbox, roster, prompt, emblems, initiator);
            }
        };

        inbox.close();
        self.announcer.announce(table, &GameEvent::PromptClosed { prompt }).await;
        hit
    }

    /// Collects every distinct joiner over the whole budget. The lobby
    /// never closes early.
    pub(crate) async fn join_window(&self, inbox: &Inbox, table: TableId, prompt: PromptId) -> Vec<PlayerId> {
        let deadline = Instant::now() + self.windows.lobby;
        let mut joiners: Vec<PlayerId> = Vec::new();
        let mut last_tick = u64::MAX;

        loop {
            Self::drain_joiners(inbox, prompt, &mut joiners);
            if !self.tick_then_wait(inbox, table, prompt, deadline, &mut last_tick).await {
                Self::drain_joiners(inbox, prompt, &mut joiners);
                break;
            }
        }

        inbox.close();
        self.announcer.announce(table, &GameEvent::PromptClosed { prompt }).await;
        joiners
    }

    /// Waits for `player` to pick exactly `pick` distinct cards out of
    /// `of`. Malformed submissions are dropped.
    pub(crate) async fn selection_window(
        &self,
        inbox: &Inbox,
        table: TableId,
        prompt: PromptId,
        player: PlayerId,
        pick: usize,
        of: usize,
    ) -> Option<Vec<usize>> {
        let deadline = Instant::now() + self.windows.selection;
        let mut last_tick = u64::MAX;

        let picks = loop {
            if let Some(picks) = Self::take_selection(inbox, prompt, player, pick, of) {
                break Some(picks);
            }
            if !self.tick_then_wait(inbox, table, prompt, deadline, &mut last_tick).await {
                break Self::take_selection(inbox, prompt, player, pick, of);
            }
        };

        inbox.close();
        self.announcer.announce(table, &GameEvent::PromptClosed { prompt }).await;
        picks
    }

    /// Announces the countdown when it moves, then parks until either a
    /// new submission arrives or one tick elapses. False once the budget
    /// is spent.
    async fn tick_then_wait(
        &self,
        inbox: &Inbox,
        table: TableId,
        prompt: PromptId,
        deadline: Instant,
        last_tick: &mut u64,
    ) -> bool {
        let now = Instant::now();
        if now >= deadline {
            return false;
        }

        let left = deadline - now;
        let tick_ms = self.windows.tick.as_millis().max(1) as u64;
        let remaining = (left.as_millis() as u64).div_ceil(tick_ms);
        if remaining != *last_tick {
            *last_tick = remaining;
            self.announcer
                .announce(table, &GameEvent::CountdownTick { prompt, remaining })
                .await;
        }

        let wait = self.windows.tick.min(left);
        let _ = timeout(wait, inbox.notify.notified()).await;
        true
    }

    fn take_reaction(
        inbox: &Inbox,
        roster: &Roster,
        prompt: PromptId,
        emblems: &[Emblem],
        initiator: PlayerId,
    ) -> Option<(Emblem, PlayerId)> {
        let mut state = inbox.lock();
        let open = state.open.as_mut()?;
        if open.id != prompt {
            return None;
        }
        open.entries.iter().find_map(|entry| match *entry {
            Entry::Reaction { emblem, from }
                if emblems.contains(&emblem)
                    && from != initiator
                    && roster.get(from).map(|p| p.is_alive()).unwrap_or(false) =>
            {
                Some((emblem, from))
            }
            _ => None,
        })
    }

    fn drain_joiners(inbox: &Inbox, prompt: PromptId, joiners: &mut Vec<PlayerId>) {
        let mut state = inbox.lock();
        let open = match state.open.as_mut() {
            Some(open) if open.id == prompt => open,
            _ => return,
        };
        for entry in open.entries.drain(..) {
            if let Entry::Reaction { emblem: Emblem::Join, from } = entry {
                if !joiners.contains(&from) {
                    joiners.push(from);
                }
            }
        }
    }

    fn take_selection(
        inbox: &Inbox,
        prompt: PromptId,
        player: PlayerId,
        pick: usize,
        of: usize,
    ) -> Option<Vec<usize>> {
        let mut state = inbox.lock();
        let open = match state.open.as_mut() {
            Some(open) if open.id == prompt => open,
            _ => return None,
        };
        let mut result = None;
        open.entries.retain(|entry| match entry {
            Entry::Selection { from, picks } if *from == player && result.is_none() => {
                let mut sorted = picks.clone();
                sorted.sort_unstable();
                sorted.dedup();
                if sorted.len() == pick && sorted.iter().all(|&i| i < of) {
                    result = Some(sorted);
                } else {
                    debug!("{prompt}: dropping malformed selection from {from}");
                }
                false
            }
            _ => true,
        });
        result
    }
}
