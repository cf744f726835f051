use std::time::{Duration, Instant};

use log::debug;
use rand::{Rng, SeedableRng};
use rand::seq::SliceRandom;
use rand_pcg::Pcg64Mcg;

use crate::error::GameError;
use crate::{Character, PlayerId, TableId, CHARACTER_VARIANTS, STARTING_COINS};

/// The court deck. The top of the deck is the last element.
pub struct Deck {
    pub(crate) cards: Vec<Character>,
}

impl Deck {
    pub fn full<R: Rng>(rng: &mut R) -> Self {
        let mut cards: Vec<Character> = CHARACTER_VARIANTS.iter()
            .flat_map(|&card| std::iter::repeat(card).take(3))
            .collect();

        cards.shuffle(rng);

        Self { cards }
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// An empty draw is an engine bug, not a user error: callers validate
    /// sufficiency before they start mutating.
    pub fn draw(&mut self) -> Result<Character, GameError> {
        self.cards.pop().ok_or(GameError::DeckUnderflow)
    }

    pub fn insert_bottom(&mut self, card: Character) {
        self.cards.insert(0, card);
    }

    /// A proven card goes to the bottom and its owner draws off the top.
    /// Card-count-neutral, no full reshuffle needed.
    pub fn swap_back(&mut self, card: Character) -> Result<Character, GameError> {
        self.insert_bottom(card);
        self.draw()
    }

    pub fn put_back(&mut self, cards: impl IntoIterator<Item = Character>) {
        self.cards.extend(cards);
    }
}

pub struct Player {
    pub id: PlayerId,
    pub coins: u8,
    pub(crate) hand: Vec<Character>,
}

impl Player {
    fn new(id: PlayerId) -> Self {
        Self {
            id,
            coins: STARTING_COINS,
            hand: Vec::with_capacity(2),
        }
    }

    pub fn hand(&self) -> &[Character] {
        &self.hand
    }

    /// A player is in the game while they hold at least one card.
    pub fn is_alive(&self) -> bool {
        !self.hand.is_empty()
    }

    pub fn holds(&self, card: Character) -> bool {
        self.hand.contains(&card)
    }

    pub(crate) fn position_of(&self, card: Character) -> Option<usize> {
        self.hand.iter().position(|&c| c == card)
    }
}

/// Insertion order is turn order. Seats are only added during the join
/// phase and removed on elimination or departure.
pub struct Roster {
    players: Vec<Player>,
}

impl Roster {
    pub(crate) fn new() -> Self {
        Self { players: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.iter().any(|p| p.id == id)
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub(crate) fn seat(&mut self, id: PlayerId) {
        if !self.contains(id) {
            self.players.push(Player::new(id));
        }
    }

    pub(crate) fn remove(&mut self, id: PlayerId) -> Option<Player> {
        let idx = self.players.iter().position(|p| p.id == id)?;
        Some(self.players.remove(idx))
    }

    pub fn first(&self) -> Option<PlayerId> {
        self.players.first().map(|p| p.id)
    }

    pub fn alive_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_alive()).count()
    }

    /// Next alive seat circularly after `from`; None if `from` is not
    /// seated.
    pub fn next_alive_after(&self, from: PlayerId) -> Option<PlayerId> {
        let idx = self.players.iter().position(|p| p.id == from)?;
        let n = self.players.len();
        (1..=n)
            .map(|k| &self.players[(idx + k) % n])
            .find(|p| p.is_alive())
            .map(|p| p.id)
    }

    pub(crate) fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        self.players.shuffle(rng);
    }

    pub(crate) fn clear(&mut self) {
        self.players.clear();
    }
}

/// One independent game: seats, deck, discard pile and the turn pointer.
pub struct Table {
    pub id: TableId,
    pub(crate) roster: Roster,
    pub(crate) deck: Deck,
    pub(crate) discard: Vec<Character>,
    pub(crate) game_started: bool,
    pub(crate) current_player: Option<PlayerId>,
    created_at: Instant,
    last_activity: Instant,
    rng: Pcg64Mcg,
}

impl Table {
    pub fn new(id: TableId) -> Self {
        let seed: u64 = rand::thread_rng().gen();
        debug!("table {id}: rng seed {seed}");
        Self::with_seed(id, seed)
    }

    /// Seeded constructor so a game can be replayed from a logged seed.
    pub fn with_seed(id: TableId, seed: u64) -> Self {
        let mut rng = Pcg64Mcg::seed_from_u64(seed);
        let deck = Deck::full(&mut rng);
        let now = Instant::now();

        Self {
            id,
            roster: Roster::new(),
            deck,
            discard: Vec::new(),
            game_started: false,
            current_player: None,
            created_at: now,
            last_activity: now,
            rng,
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    pub fn discard(&self) -> &[Character] {
        &self.discard
    }

    pub fn game_started(&self) -> bool {
        self.game_started
    }

    pub fn current_player(&self) -> Option<PlayerId> {
        self.current_player
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Back to the pre-game state: fresh shuffled deck, no seats, empty
    /// discard pile.
    pub(crate) fn reset(&mut self) {
        self.roster.clear();
        self.deck = Deck::full(&mut self.rng);
        self.discard.clear();
        self.game_started = false;
        self.current_player = None;
    }

    pub(crate) fn shuffle_seats(&mut self) {
        self.roster.shuffle(&mut self.rng);
    }

    pub(crate) fn shuffle_cards(&mut self, cards: &mut [Character]) {
        cards.shuffle(&mut self.rng);
    }

    pub(crate) fn deal_hand(&mut self, id: PlayerId) -> Result<(), GameError> {
        let a = self.deck.draw()?;
        let b = self.deck.draw()?;
        let player = self.roster.get_mut(id).ok_or(GameError::NotInGame(id))?;
        player.hand.push(a);
        player.hand.push(b);
        Ok(())
    }

    /// Start-time rollback: the seat goes away and its cards return to the
    /// deck.
    pub(crate) fn unseat_to_deck(&mut self, id: PlayerId) {
        if let Some(mut player) = self.roster.remove(id) {
            self.deck.put_back(player.hand.drain(..));
        }
    }

    /// Forced elimination on departure: the hand is surrendered to the
    /// discard pile so the card count stays intact.
    pub(crate) fn remove_to_discard(&mut self, id: PlayerId) -> bool {
        match self.roster.remove(id) {
            Some(mut player) => {
                self.discard.extend(player.hand.drain(..));
                true
            }
            None => false,
        }
    }

    /// Moves one card from the hand to the discard pile.
    pub(crate) fn lose_influence(&mut self, id: PlayerId, card_idx: usize) -> Option<Character> {
        let player = self.roster.get_mut(id)?;
        if card_idx >= player.hand.len() {
            return None;
        }
        let card = player.hand.remove(card_idx);
        self.discard.push(card);
        Some(card)
    }

    /// Proven-claim swap: the named card leaves the hand for the deck
    /// bottom and the owner draws the top card.
    pub(crate) fn swap_hand_card(&mut self, id: PlayerId, card: Character) -> Result<(), GameError> {
        let idx = match self.roster.get(id).and_then(|p| p.position_of(card)) {
            Some(idx) => idx,
            None => return Ok(()),
        };
        let removed = match self.roster.get_mut(id) {
            Some(player) => player.hand.remove(idx),
            None => return Ok(()),
        };
        let drawn = self.deck.swap_back(removed)?;
        if let Some(player) = self.roster.get_mut(id) {
            player.hand.push(drawn);
        }
        Ok(())
    }

    /// The sole alive player once everyone else has fallen.
    pub fn winner(&self) -> Option<PlayerId> {
        if !self.game_started {
            return None;
        }
        if self.roster.alive_count() == 1 {
            self.roster.iter().find(|p| p.is_alive()).map(|p| p.id)
        } else {
            None
        }
    }

    pub fn must_coup(&self, id: PlayerId) -> bool {
        self.roster
            .get(id)
            .map(|p| p.coins >= crate::FORCED_COUP_AT)
            .unwrap_or(false)
    }

    /// Iterative advance. `from` may have been removed during resolution,
    /// in which case the first remaining seat takes the turn.
    pub(crate) fn advance_turn(&mut self, from: PlayerId) -> Option<PlayerId> {
        let next = if self.roster.contains(from) {
            self.roster.next_alive_after(from)
        } else {
            self.roster.first()
        };
        self.current_player = next;
        next
    }

    /// Deck + hands + discard pile; 15 whenever a game is running.
    pub fn total_cards(&self) -> usize {
        self.deck.len()
            + self.roster.iter().map(|p| p.hand().len()).sum::<usize>()
            + self.discard.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Character::{Assassin, Duke};
    use crate::DECK_SIZE;

    fn table() -> Table {
        Table::with_seed(TableId(1), 7)
    }

    #[test]
    fn fresh_deck_has_three_of_each() {
        let t = table();
        assert_eq!(t.deck.len(), DECK_SIZE);
        for character in CHARACTER_VARIANTS {
            let count = t.deck.cards.iter().filter(|&&c| c == character).count();
            assert_eq!(count, 3);
        }
    }

    #[test]
    fn draw_from_empty_deck_underflows() {
        let mut t = table();
        for _ in 0..DECK_SIZE {
            t.deck.draw().unwrap();
        }
        assert_eq!(t.deck.draw(), Err(GameError::DeckUnderflow));
    }

    #[test]
    fn swap_back_is_card_count_neutral() {
        let mut deck = Deck { cards: vec![] };
        deck.put_back([Duke]);

        // one card in the deck: the proven card sinks to the bottom and
        // the previous bottom comes off the top
        assert_eq!(deck.swap_back(Assassin), Ok(Duke));
        assert_eq!(deck.len(), 1);
        assert_eq!(deck.swap_back(Duke), Ok(Assassin));
        assert_eq!(deck.len(), 1);
    }

    #[test]
    fn turn_order_wraps_and_skips_the_dead() {
        let mut roster = Roster::new();
        for n in 1..=3 {
            roster.seat(PlayerId(n));
            roster.get_mut(PlayerId(n)).unwrap().hand.push(Duke);
        }

        assert_eq!(roster.next_alive_after(PlayerId(1)), Some(PlayerId(2)));
        assert_eq!(roster.next_alive_after(PlayerId(3)), Some(PlayerId(1)));

        // player 2 loses their only card
        roster.get_mut(PlayerId(2)).unwrap().hand.clear();
        assert_eq!(roster.next_alive_after(PlayerId(1)), Some(PlayerId(3)));
    }

    #[test]
    fn advance_falls_back_to_the_first_seat_when_current_was_removed() {
        let mut t = table();
        for n in 1..=3 {
            t.roster.seat(PlayerId(n));
            t.roster.get_mut(PlayerId(n)).unwrap().hand.push(Duke);
        }
        t.current_player = Some(PlayerId(2));

        t.roster.remove(PlayerId(2));
        assert_eq!(t.advance_turn(PlayerId(2)), Some(PlayerId(1)));
        assert_eq!(t.current_player, Some(PlayerId(1)));
    }

    #[test]
    fn influence_loss_feeds_the_discard_pile() {
        let mut t = table();
        t.roster.seat(PlayerId(1));
        t.roster.seat(PlayerId(2));
        t.deal_hand(PlayerId(1)).unwrap();
        t.deal_hand(PlayerId(2)).unwrap();
        assert_eq!(t.total_cards(), DECK_SIZE);

        let lost = t.lose_influence(PlayerId(1), 0).unwrap();
        assert_eq!(t.discard, vec![lost]);
        assert_eq!(t.roster.get(PlayerId(1)).unwrap().hand().len(), 1);
        assert_eq!(t.total_cards(), DECK_SIZE);
    }

    #[test]
    fn departure_surrenders_the_hand_to_the_discard_pile() {
        let mut t = table();
        t.roster.seat(PlayerId(1));
        t.roster.seat(PlayerId(2));
        t.deal_hand(PlayerId(1)).unwrap();
        t.deal_hand(PlayerId(2)).unwrap();

        assert!(t.remove_to_discard(PlayerId(1)));
        assert_eq!(t.discard.len(), 2);
        assert!(!t.roster.contains(PlayerId(1)));
        assert_eq!(t.total_cards(), DECK_SIZE);
    }

    #[test]
    fn swap_hand_card_keeps_the_hand_size() {
        let mut t = table();
        t.roster.seat(PlayerId(1));
        t.deal_hand(PlayerId(1)).unwrap();
        let card = t.roster.get(PlayerId(1)).unwrap().hand()[0];

        t.swap_hand_card(PlayerId(1), card).unwrap();
        assert_eq!(t.roster.get(PlayerId(1)).unwrap().hand().len(), 2);
        assert_eq!(t.total_cards(), DECK_SIZE);
        // the proven card is at the bottom of the deck
        assert_eq!(t.deck.cards[0], card);
    }

    #[test]
    fn reset_restores_the_pregame_state() {
        let mut t = table();
        t.roster.seat(PlayerId(1));
        t.roster.seat(PlayerId(2));
        t.deal_hand(PlayerId(1)).unwrap();
        t.deal_hand(PlayerId(2)).unwrap();
        t.game_started = true;
        t.current_player = Some(PlayerId(1));
        t.lose_influence(PlayerId(1), 0);

        t.reset();
        assert!(!t.game_started);
        assert_eq!(t.current_player, None);
        assert!(t.roster.is_empty());
        assert!(t.discard.is_empty());
        assert_eq!(t.deck.len(), DECK_SIZE);
    }
}
