use std::fmt::{Debug, Formatter};

use serde::{Deserialize, Serialize};

use crate::Character::{Ambassador, Assassin, Captain, Contessa, Duke};
use crate::{Character, PlayerId};

/// The seven actions a player can declare on their turn. The claim and
/// counter-claim tables below drive the whole resolution protocol.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum Action {
    Income,
    ForeignAid,
    Coup(PlayerId),
    Tax,
    Assassinate(PlayerId),
    Steal(PlayerId),
    Exchange,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Income => "income",
            Action::ForeignAid => "foreign aid",
            Action::Coup(_) => "coup",
            Action::Tax => "tax",
            Action::Assassinate(_) => "assassinate",
            Action::Steal(_) => "steal",
            Action::Exchange => "exchange",
        }
    }

    /// Coins deducted at declaration. They are not refunded if the action
    /// is later blocked or challenged away.
    pub fn cost(&self) -> u8 {
        match self {
            Action::Coup(_) => 7,
            Action::Assassinate(_) => 3,
            _ => 0,
        }
    }

    /// The character the actor claims to hold; the action can be
    /// challenged iff there is one.
    pub fn claim(&self) -> Option<Character> {
        match self {
            Action::Tax => Some(Duke),
            Action::Assassinate(_) => Some(Assassin),
            Action::Steal(_) => Some(Captain),
            Action::Exchange => Some(Ambassador),
            _ => None,
        }
    }

    /// Characters whose claim can block this action.
    pub fn blocked_by(&self) -> &'static [Character] {
        match self {
            Action::ForeignAid => &[Duke],
            Action::Assassinate(_) => &[Contessa],
            Action::Steal(_) => &[Captain, Ambassador],
            _ => &[],
        }
    }

    pub fn target(&self) -> Option<PlayerId> {
        match self {
            Action::Coup(target) | Action::Assassinate(target) | Action::Steal(target) => Some(*target),
            _ => None,
        }
    }

    /// Whether declaring this action opens a response window at all.
    pub fn is_contested(&self) -> bool {
        self.claim().is_some() || !self.blocked_by().is_empty()
    }
}

impl Debug for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Income => f.write_str("takes income"),
            Action::ForeignAid => f.write_str("takes foreign aid"),
            Action::Coup(target) => f.write_fmt(format_args!("launches a coup against {target}")),
            Action::Tax => f.write_str("collects tax as the Duke"),
            Action::Assassinate(target) => f.write_fmt(format_args!("assassinates {target}")),
            Action::Steal(target) => f.write_fmt(format_args!("steals from {target}")),
            Action::Exchange => f.write_str("exchanges cards as the Ambassador"),
        }
    }
}
