use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};

use crate::configuration::CoreConfiguration;
use crate::op::ActionKind;
use crate::prelude::*;

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Reflect, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Character {
    #[default]
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
}

/// Which way the promotion counter of a character counts
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Promotion {
    Promote,
    Demote,
}

/// Per-character modifiers, looked up instead of branched on.
#[derive(Debug)]
pub struct CharacterTraits {
    /// Overrides the configured travel cost
    pub travel_cost: Option<u32>,
    /// Actions only this character may take
    pub unlocks: &'static [ActionKind],
    pub promotion: Option<Promotion>,
}

static CHARACTER_TRAITS: [CharacterTraits; 5] = [
    // Pawn
    CharacterTraits {
        travel_cost: None,
        unlocks: &[],
        promotion: Some(Promotion::Promote),
    },
    // Knight
    CharacterTraits {
        travel_cost: Some(3),
        unlocks: &[],
        promotion: None,
    },
    // Bishop
    CharacterTraits {
        travel_cost: None,
        unlocks: &[ActionKind::Cleanse],
        promotion: None,
    },
    // Rook
    CharacterTraits {
        travel_cost: None,
        unlocks: &[ActionKind::Bulldoze],
        promotion: None,
    },
    // Queen
    CharacterTraits {
        travel_cost: None,
        unlocks: &[],
        promotion: Some(Promotion::Demote),
    },
];

impl Character {
    pub const ALL: [Character; 5] = [
        Character::Pawn,
        Character::Knight,
        Character::Bishop,
        Character::Rook,
        Character::Queen,
    ];

    pub fn traits(self) -> &'static CharacterTraits {
        &CHARACTER_TRAITS[self as usize]
    }

    pub fn unlocks(self, action: ActionKind) -> bool {
        self.traits().unlocks.contains(&action)
    }
}

/// A resource counter the server keeps per player
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ResourceField {
    Mana,
    ActionCount,
    PromoteCount,
}

/// Local mirror of one player's server-side state.
#[derive(Clone, CopyGetters, Debug, Getters, PartialEq)]
pub struct PlayerState {
    #[getset(get = "pub")]
    name: String,
    #[getset(get_copy = "pub")]
    character: Character,
    /// The node whose occupant set holds this player
    #[getset(get_copy = "pub")]
    location: NodeId,
    #[getset(get_copy = "pub")]
    mana: u32,
    #[getset(get_copy = "pub")]
    action_count: u32,
    #[getset(get_copy = "pub")]
    promote_count: u32,
}

impl PlayerState {
    pub(crate) fn new(name: String, character: Character, location: NodeId) -> Self {
        PlayerState {
            name,
            character,
            location,
            mana: 0,
            action_count: 0,
            promote_count: 0,
        }
    }

    pub fn counter(&self, field: ResourceField) -> u32 {
        match field {
            ResourceField::Mana => self.mana,
            ResourceField::ActionCount => self.action_count,
            ResourceField::PromoteCount => self.promote_count,
        }
    }

    /// Steps left until this player's character changes, for characters
    /// that have a promotion counter.
    pub fn promotion_remaining(&self, config: &CoreConfiguration) -> Option<u32> {
        let cost = match self.character.traits().promotion? {
            Promotion::Promote => config.promote_cost,
            Promotion::Demote => config.demote_cost,
        };
        Some(cost.saturating_sub(self.promote_count))
    }

    pub(crate) fn set_location(&mut self, location: NodeId) {
        self.location = location;
    }

    /// Returns the previous character if it differed
    pub(crate) fn set_character(&mut self, character: Character) -> Option<Character> {
        if self.character == character {
            None
        } else {
            Some(std::mem::replace(&mut self.character, character))
        }
    }

    /// Returns the previous value if it differed
    pub(crate) fn set_counter(&mut self, field: ResourceField, value: u32) -> Option<u32> {
        let counter = match field {
            ResourceField::Mana => &mut self.mana,
            ResourceField::ActionCount => &mut self.action_count,
            ResourceField::PromoteCount => &mut self.promote_count,
        };
        if *counter == value {
            None
        } else {
            Some(std::mem::replace(counter, value))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn traits_table_matches_characters() {
        assert_eq!(Some(3), Character::Knight.traits().travel_cost);
        assert_eq!(None, Character::Pawn.traits().travel_cost);
        assert!(Character::Bishop.unlocks(ActionKind::Cleanse));
        assert!(!Character::Bishop.unlocks(ActionKind::Bulldoze));
        assert!(Character::Rook.unlocks(ActionKind::Bulldoze));
        for character in Character::ALL {
            assert!(!character.unlocks(ActionKind::Move));
        }
    }

    #[test]
    fn promotion_counts_down_for_pawn_and_queen() {
        let config = CoreConfiguration::default();
        let mut pawn = PlayerState::new("ana".into(), Character::Pawn, 1);
        pawn.set_counter(ResourceField::PromoteCount, 2);
        assert_eq!(Some(5), pawn.promotion_remaining(&config));

        pawn.set_character(Character::Queen);
        assert_eq!(Some(1), pawn.promotion_remaining(&config));

        pawn.set_character(Character::Rook);
        assert_eq!(None, pawn.promotion_remaining(&config));
    }

    #[test]
    fn counters_report_previous_value_only_on_change() {
        let mut player = PlayerState::new("ana".into(), Character::Pawn, 1);
        assert_eq!(Some(0), player.set_counter(ResourceField::Mana, 4));
        assert_eq!(None, player.set_counter(ResourceField::Mana, 4));
        assert_eq!(4, player.counter(ResourceField::Mana));
        assert_eq!(None, player.set_character(Character::Pawn));
        assert_eq!(Some(Character::Pawn), player.set_character(Character::Knight));
    }

    #[test]
    fn characters_use_wire_names() {
        let rook: Character = serde_json::from_str("\"rook\"").unwrap();
        assert_eq!(Character::Rook, rook);
        assert!(serde_json::from_str::<Character>("\"king\"").is_err());
    }
}
