use std::sync::Arc;

use log::{error, info, warn};

use crate::action::Action;
use crate::arbiter::{Arbiter, Emblem, Inbox, WindowConfig};
use crate::error::GameError;
use crate::events::{Announcer, GameEvent, Messenger};
use crate::table::Table;
use crate::{Character, PlayerId, FORCED_COUP_AT, MAX_PLAYERS, MIN_PLAYERS};

/// Validates and executes the seven actions, orchestrating response
/// windows and challenge resolution over a single table. One resolution
/// runs at a time per table; the registry enforces that with the table
/// lock.
pub struct ActionEngine {
    announcer: Arc<dyn Announcer>,
    messenger: Arc<dyn Messenger>,
    arbiter: Arbiter,
}

/// Where an action ends up after the dispute phase.
enum Flow {
    Proceed,
    Cancelled,
    GameOver,
}

struct ChallengeOutcome {
    upheld: bool,
    game_over: bool,
}

impl ActionEngine {
    pub fn new(announcer: Arc<dyn Announcer>, messenger: Arc<dyn Messenger>) -> Self {
        Self::with_windows(announcer, messenger, WindowConfig::default())
    }

    pub fn with_windows(
        announcer: Arc<dyn Announcer>,
        messenger: Arc<dyn Messenger>,
        windows: WindowConfig,
    ) -> Self {
        let arbiter = Arbiter::new(announcer.clone(), windows);
        Self {
            announcer,
            messenger,
            arbiter,
        }
    }

    async fn announce(&self, t: &Table, event: GameEvent) {
        self.announcer.announce(t.id, &event).await;
    }

    /// Opens the join lobby, seats everyone who reacted in shuffled order,
    /// deals and starts.
    pub async fn start(&self, t: &mut Table, inbox: &Inbox) -> Result<(), GameError> {
        if t.game_started {
            return Err(GameError::GameInProgress);
        }
        t.reset();

        let prompt = inbox.open();
        self.announce(t, GameEvent::LobbyOpened {
            prompt,
            window_secs: self.arbiter.windows.lobby.as_secs(),
        })
        .await;

        let joiners = self.arbiter.join_window(inbox, t.id, prompt).await;
        self.seat_and_begin(t, &joiners, true).await
    }

    /// Starts a game with a caller-provided seating, in the order given,
    /// for hosts that run their own lobby.
    pub async fn start_seated(&self, t: &mut Table, players: &[PlayerId]) -> Result<(), GameError> {
        if t.game_started {
            return Err(GameError::GameInProgress);
        }
        t.reset();
        self.seat_and_begin(t, players, false).await
    }

    async fn seat_and_begin(
        &self,
        t: &mut Table,
        players: &[PlayerId],
        shuffle_seats: bool,
    ) -> Result<(), GameError> {
        for &id in players {
            t.roster.seat(id);
        }
        if t.roster.len() < MIN_PLAYERS {
            t.reset();
            return Err(GameError::NotEnoughPlayers { min: MIN_PLAYERS });
        }
        if t.roster.len() > MAX_PLAYERS {
            t.reset();
            return Err(GameError::TooManyPlayers { max: MAX_PLAYERS });
        }
        if shuffle_seats {
            t.shuffle_seats();
        }

        // deal with delivery verification: a hand that cannot reach its
        // owner goes straight back to the deck and the seat is dropped
        let seated: Vec<PlayerId> = t.roster.iter().map(|p| p.id).collect();
        for id in seated {
            if let Err(err) = t.deal_hand(id) {
                error!("table {}: dealing failed: {err}", t.id);
                self.announce(t, GameEvent::Fault { detail: err.to_string() }).await;
                t.reset();
                return Err(err);
            }
            let hand: Vec<Character> = t.roster.get(id).map(|p| p.hand().to_vec()).unwrap_or_default();
            if let Err(err) = self.messenger.notify_hand(id, &hand).await {
                warn!("table {}: dropping player {id} before start, hand undeliverable: {err}", t.id);
                t.unseat_to_deck(id);
            }
        }
        if t.roster.len() < MIN_PLAYERS {
            t.reset();
            return Err(GameError::NotEnoughPlayers { min: MIN_PLAYERS });
        }

        t.game_started = true;
        t.current_player = t.roster.first();
        let players: Vec<PlayerId> = t.roster.iter().map(|p| p.id).collect();
        info!("table {}: game started with {} players", t.id, players.len());
        self.announce(t, GameEvent::GameStarted { players }).await;
        self.announce_turn(t).await;
        Ok(())
    }

    /// Ends the game on request and resets the table.
    pub async fn end(&self, t: &mut Table) -> Result<(), GameError> {
        if !t.game_started {
            return Err(GameError::NoGame);
        }
        info!("table {}: game ended on request", t.id);
        t.reset();
        self.announce(t, GameEvent::GameEnded).await;
        Ok(())
    }

    pub async fn income(&self, t: &mut Table, inbox: &Inbox, actor: PlayerId) -> Result<(), GameError> {
        self.resolve(t, inbox, actor, Action::Income).await
    }

    pub async fn foreign_aid(&self, t: &mut Table, inbox: &Inbox, actor: PlayerId) -> Result<(), GameError> {
        self.resolve(t, inbox, actor, Action::ForeignAid).await
    }

    pub async fn coup(&self, t: &mut Table, inbox: &Inbox, actor: PlayerId, target: PlayerId) -> Result<(), GameError> {
        self.resolve(t, inbox, actor, Action::Coup(target)).await
    }

    pub async fn tax(&self, t: &mut Table, inbox: &Inbox, actor: PlayerId) -> Result<(), GameError> {
        self.resolve(t, inbox, actor, Action::Tax).await
    }

    pub async fn assassinate(&self, t: &mut Table, inbox: &Inbox, actor: PlayerId, target: PlayerId) -> Result<(), GameError> {
        self.resolve(t, inbox, actor, Action::Assassinate(target)).await
    }

    pub async fn steal(&self, t: &mut Table, inbox: &Inbox, actor: PlayerId, target: PlayerId) -> Result<(), GameError> {
        self.resolve(t, inbox, actor, Action::Steal(target)).await
    }

    pub async fn exchange(&self, t: &mut Table, inbox: &Inbox, actor: PlayerId) -> Result<(), GameError> {
        self.resolve(t, inbox, actor, Action::Exchange).await
    }

    /// Departure mid-game is forced elimination: the hand goes to the
    /// discard pile and the seat is removed.
    pub async fn remove_player(&self, t: &mut Table, player: PlayerId) -> Result<(), GameError> {
        if !t.game_started {
            return Err(GameError::NoGame);
        }
        if !t.roster.contains(player) {
            return Err(GameError::NotInGame(player));
        }
        let was_current = t.current_player == Some(player);
        t.remove_to_discard(player);
        warn!("table {}: player {player} departed and is eliminated", t.id);
        self.announce(t, GameEvent::PlayerDeparted { player }).await;

        if let Some(winner) = t.winner() {
            self.finish_game(t, winner).await;
            return Ok(());
        }
        if was_current {
            t.advance_turn(player);
            self.announce_turn(t).await;
        }
        Ok(())
    }

    /// Every precondition, checked before the first mutation.
    fn validate(&self, t: &Table, actor: PlayerId, action: &Action) -> Result<(), GameError> {
        if !t.game_started {
            return Err(GameError::NoGame);
        }
        if t.current_player != Some(actor) {
            return Err(GameError::NotYourTurn);
        }
        let player = t.roster.get(actor).ok_or(GameError::NotInGame(actor))?;

        if let Some(target) = action.target() {
            if target == actor {
                return Err(GameError::SelfTarget);
            }
            let target_player = t.roster.get(target).ok_or(GameError::NotInGame(target))?;
            if !target_player.is_alive() {
                return Err(GameError::TargetEliminated(target));
            }
            if matches!(action, Action::Steal(_)) && target_player.coins == 0 {
                return Err(GameError::NothingToSteal(target));
            }
        }

        let cost = action.cost();
        if player.coins < cost {
            return Err(GameError::InsufficientCoins {
                action: action.name(),
                need: cost,
                have: player.coins,
            });
        }
        if player.coins >= FORCED_COUP_AT && !matches!(action, Action::Coup(_)) {
            return Err(GameError::MustCoup { coins: player.coins });
        }
        Ok(())
    }

    /// The generic resolution sequence: declare, open the merged response
    /// window, arbitrate blocks and challenges, apply the effect, advance.
    async fn resolve(&self, t: &mut Table, inbox: &Inbox, actor: PlayerId, action: Action) -> Result<(), GameError> {
        self.validate(t, actor, &action)?;

        info!("table {}: player {actor} {action:?}", t.id);

        let mut emblems: Vec<Emblem> = Vec::new();
        if action.claim().is_some() {
            emblems.push(Emblem::Challenge);
        }
        if !action.blocked_by().is_empty() {
            emblems.push(Emblem::Block);
        }

        let prompt = if emblems.is_empty() { None } else { Some(inbox.open()) };
        self.announce(t, GameEvent::ActionDeclared {
            actor,
            action: action.clone(),
            prompt,
            emblems: emblems.clone(),
        })
        .await;

        // up-front payment, kept even if the action is countered
        let cost = action.cost();
        if cost > 0 {
            self.adjust_coins(t, actor, -(cost as i8)).await;
        }

        let flow = match prompt {
            None => Flow::Proceed,
            Some(prompt) => {
                let response = self
                    .arbiter
                    .reaction_window(inbox, t.id, &t.roster, prompt, &emblems, actor)
                    .await;
                match response {
                    None => Flow::Proceed,
                    Some((Emblem::Challenge, challenger)) => match action.claim() {
                        Some(card) => {
                            let outcome = self
                                .resolve_challenge(t, inbox, actor, &[card], challenger)
                                .await?;
                            if outcome.game_over {
                                Flow::GameOver
                            } else if outcome.upheld {
                                Flow::Proceed
                            } else {
                                Flow::Cancelled
                            }
                        }
                        // the emblem is only offered alongside a claim
                        None => Flow::Proceed,
                    },
                    Some((Emblem::Block, blocker)) => {
                        self.resolve_block(t, inbox, actor, &action, blocker).await?
                    }
                    // join reactions never reach an action window
                    Some((Emblem::Join, _)) => Flow::Proceed,
                }
            }
        };

        match flow {
            Flow::GameOver => return Ok(()),
            Flow::Cancelled => {}
            Flow::Proceed => {
                if self.apply_effect(t, inbox, actor, &action).await? {
                    return Ok(());
                }
            }
        }

        self.finish_turn(t, actor).await;
        Ok(())
    }

    /// A declared block gets its own challenge window. An unchallenged or
    /// proven block cancels the action; a defeated block lets it through.
    async fn resolve_block(
        &self,
        t: &mut Table,
        inbox: &Inbox,
        actor: PlayerId,
        action: &Action,
        blocker: PlayerId,
    ) -> Result<Flow, GameError> {
        let claim: Vec<Character> = action.blocked_by().to_vec();
        let prompt = inbox.open();
        self.announce(t, GameEvent::BlockDeclared {
            blocker,
            claim: claim.clone(),
            prompt,
        })
        .await;

        let response = self
            .arbiter
            .reaction_window(inbox, t.id, &t.roster, prompt, &[Emblem::Challenge], blocker)
            .await;
        match response {
            None => {
                info!("table {}: block by player {blocker} stands unchallenged", t.id);
                self.announce(t, GameEvent::ActionBlocked { actor, blocker }).await;
                Ok(Flow::Cancelled)
            }
            Some((_, challenger)) => {
                let outcome = self
                    .resolve_challenge(t, inbox, blocker, &claim, challenger)
                    .await?;
                if outcome.game_over {
                    Ok(Flow::GameOver)
                } else if outcome.upheld {
                    self.announce(t, GameEvent::ActionBlocked { actor, blocker }).await;
                    Ok(Flow::Cancelled)
                } else {
                    Ok(Flow::Proceed)
                }
            }
        }
    }

    /// Whether a hand can prove a claim, and with which card. The verdict
    /// is pure set intersection.
    fn claim_proof(hand: &[Character], claim: &[Character]) -> Option<Character> {
        claim.iter().copied().find(|&card| hand.contains(&card))
    }

    /// Adjudicates a disputed claim: reveal and swap-back on proof, the
    /// loser of the dispute surrenders an influence either way.
    async fn resolve_challenge(
        &self,
        t: &mut Table,
        inbox: &Inbox,
        accused: PlayerId,
        claim: &[Character],
        challenger: PlayerId,
    ) -> Result<ChallengeOutcome, GameError> {
        warn!("table {}: player {challenger} challenges player {accused}'s claim of {claim:?}", t.id);
        self.announce(t, GameEvent::ChallengeDeclared {
            challenger,
            accused,
            claim: claim.to_vec(),
        })
        .await;

        let hand: Vec<Character> = t.roster.get(accused).map(|p| p.hand().to_vec()).unwrap_or_default();
        match Self::claim_proof(&hand, claim) {
            Some(card) => {
                self.announce(t, GameEvent::ClaimProven { player: accused, card }).await;
                self.swap_proven_card(t, accused, card).await?;
                let game_over = self.lose_influence(t, inbox, challenger).await?;
                Ok(ChallengeOutcome { upheld: true, game_over })
            }
            None => {
                self.announce(t, GameEvent::BluffExposed {
                    player: accused,
                    claim: claim.to_vec(),
                })
                .await;
                let game_over = self.lose_influence(t, inbox, accused).await?;
                Ok(ChallengeOutcome { upheld: false, game_over })
            }
        }
    }

    /// The proven card sinks into the deck and a replacement is drawn, so
    /// the table learns nothing about the rest of the hand. The refreshed
    /// hand is re-delivered privately.
    async fn swap_proven_card(&self, t: &mut Table, owner: PlayerId, card: Character) -> Result<(), GameError> {
        t.swap_hand_card(owner, card)?;
        let hand: Vec<Character> = t.roster.get(owner).map(|p| p.hand().to_vec()).unwrap_or_default();
        // mid-game delivery failure is data, not a fault: the player can
        // still query their hand later
        if let Err(err) = self.messenger.notify_hand(owner, &hand).await {
            warn!("table {}: could not deliver refreshed hand to player {owner}: {err}", t.id);
        }
        Ok(())
    }

    /// One influence goes from the hand to the discard pile. With two
    /// cards in hand the choice belongs to the player; the newest card is
    /// surrendered if the selection window lapses. Returns true when this
    /// loss ended the game.
    async fn lose_influence(&self, t: &mut Table, inbox: &Inbox, loser: PlayerId) -> Result<bool, GameError> {
        let hand_len = match t.roster.get(loser) {
            Some(player) => player.hand().len(),
            None => return Ok(false),
        };
        if hand_len == 0 {
            return Ok(false);
        }

        let idx = if hand_len == 1 {
            0
        } else {
            let prompt = inbox.open();
            self.announce(t, GameEvent::SelectionRequested {
                prompt,
                player: loser,
                pick: 1,
                of: hand_len,
            })
            .await;
            match self
                .arbiter
                .selection_window(inbox, t.id, prompt, loser, 1, hand_len)
                .await
            {
                Some(picks) => picks[0],
                None => hand_len - 1,
            }
        };

        let card = match t.lose_influence(loser, idx) {
            Some(card) => card,
            None => return Ok(false),
        };
        self.announce(t, GameEvent::InfluenceLost { player: loser, card }).await;

        let alive = t.roster.get(loser).map(|p| p.is_alive()).unwrap_or(false);
        if !alive {
            t.roster.remove(loser);
            info!("table {}: player {loser} is out of the game", t.id);
            self.announce(t, GameEvent::PlayerEliminated { player: loser }).await;
            if let Some(winner) = t.winner() {
                return Ok(self.finish_game(t, winner).await);
            }
        }
        Ok(false)
    }

    /// Reveals the winner's hand and resets the table.
    async fn finish_game(&self, t: &mut Table, winner: PlayerId) -> bool {
        let hand: Vec<Character> = t.roster.get(winner).map(|p| p.hand().to_vec()).unwrap_or_default();
        info!("table {}: player {winner} wins", t.id);
        self.announce(t, GameEvent::GameOver { winner, hand }).await;
        t.reset();
        true
    }

    /// Applies the surviving action. Returns true when the effect ended
    /// the game.
    async fn apply_effect(&self, t: &mut Table, inbox: &Inbox, actor: PlayerId, action: &Action) -> Result<bool, GameError> {
        match *action {
            Action::Income => {
                self.adjust_coins(t, actor, 1).await;
                Ok(false)
            }
            Action::ForeignAid => {
                self.adjust_coins(t, actor, 2).await;
                Ok(false)
            }
            Action::Tax => {
                self.adjust_coins(t, actor, 3).await;
                Ok(false)
            }
            Action::Coup(target) | Action::Assassinate(target) => {
                // the target may already have fallen during the dispute
                if t.roster.get(target).map(|p| p.is_alive()).unwrap_or(false) {
                    return self.lose_influence(t, inbox, target).await;
                }
                Ok(false)
            }
            Action::Steal(target) => {
                let take = t.roster.get(target).map(|p| p.coins.min(2)).unwrap_or(0);
                if take > 0 {
                    self.adjust_coins(t, target, -(take as i8)).await;
                    self.adjust_coins(t, actor, take as i8).await;
                }
                Ok(false)
            }
            Action::Exchange => self.run_exchange(t, inbox, actor).await,
        }
    }

    /// Draw two, pick `|hand|` out of the shuffled pool, return the rest.
    async fn run_exchange(&self, t: &mut Table, inbox: &Inbox, actor: PlayerId) -> Result<bool, GameError> {
        let keep = match t.roster.get(actor) {
            Some(player) => player.hand().len(),
            None => return Ok(false),
        };
        if keep == 0 {
            return Ok(false);
        }

        // validate before drawing; running dry mid-deal would corrupt the
        // hand
        if t.deck.len() < 2 {
            error!("table {}: deck too small for exchange ({} cards)", t.id, t.deck.len());
            self.announce(t, GameEvent::Fault {
                detail: format!("deck too small for exchange: {} cards", t.deck.len()),
            })
            .await;
            return Err(GameError::DeckUnderflow);
        }

        let drawn = [t.deck.draw()?, t.deck.draw()?];
        let mut pool: Vec<Character> = t.roster.get(actor).map(|p| p.hand().to_vec()).unwrap_or_default();
        pool.extend(drawn);
        // shuffled so the position of a card gives nothing away
        t.shuffle_cards(&mut pool);

        if let Err(err) = self.messenger.notify_exchange_pool(actor, &pool).await {
            warn!("table {}: exchange pool undeliverable to player {actor}: {err}", t.id);
            t.deck.put_back(drawn);
            return Ok(false);
        }

        let prompt = inbox.open();
        self.announce(t, GameEvent::SelectionRequested {
            prompt,
            player: actor,
            pick: keep,
            of: pool.len(),
        })
        .await;

        match self
            .arbiter
            .selection_window(inbox, t.id, prompt, actor, keep, pool.len())
            .await
        {
            Some(picks) => {
                let mut kept = Vec::with_capacity(keep);
                let mut returned = Vec::new();
                for (i, card) in pool.into_iter().enumerate() {
                    if picks.contains(&i) {
                        kept.push(card);
                    } else {
                        returned.push(card);
                    }
                }
                if let Some(player) = t.roster.get_mut(actor) {
                    player.hand = kept;
                }
                t.deck.put_back(returned);
                self.announce(t, GameEvent::ExchangeCompleted { player: actor }).await;
                let hand: Vec<Character> = t.roster.get(actor).map(|p| p.hand().to_vec()).unwrap_or_default();
                if let Err(err) = self.messenger.notify_hand(actor, &hand).await {
                    warn!("table {}: could not deliver exchanged hand to player {actor}: {err}", t.id);
                }
                Ok(false)
            }
            None => {
                info!("table {}: exchange selection lapsed, cards returned", t.id);
                t.deck.put_back(drawn);
                Ok(false)
            }
        }
    }

    async fn adjust_coins(&self, t: &mut Table, player: PlayerId, delta: i8) {
        let coins = match t.roster.get_mut(player) {
            Some(p) => {
                p.coins = if delta < 0 {
                    p.coins.saturating_sub(delta.unsigned_abs())
                } else {
                    p.coins + delta as u8
                };
                p.coins
            }
            None => return,
        };
        self.announce(t, GameEvent::CoinsChanged { player, coins, delta }).await;
    }

    async fn finish_turn(&self, t: &mut Table, from: PlayerId) {
        if !t.game_started {
            return;
        }
        t.advance_turn(from);
        self.announce_turn(t).await;
    }

    async fn announce_turn(&self, t: &Table) {
        let id = match t.current_player {
            Some(id) => id,
            None => return,
        };
        if let Some(player) = t.roster.get(id) {
            self.announce(t, GameEvent::TurnStarted {
                player: id,
                coins: player.coins,
                cards: player.hand().len(),
                forced_coup: t.must_coup(id),
            })
            .await;
        }
    }
}
