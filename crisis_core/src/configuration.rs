use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::op::ActionKind;
use crate::player::Character;
use crate::prelude::*;

/// Client-side copies of the server's game constants.
///
/// These only drive what the client offers; the server decides what happens.
#[derive(Clone, Debug, Deserialize, PartialEq, Resource, Serialize)]
pub struct CoreConfiguration {
    #[serde(default = "two")]
    pub max_actions_per_phase: u32,
    #[serde(default = "five")]
    pub travel_cost: u32,
    #[serde(default = "three")]
    pub cleanse_cost: u32,
    #[serde(default = "three")]
    pub bulldoze_cost: u32,
    /// Charge is offered while mana is below this
    #[serde(default = "five")]
    pub charge_mana_ceiling: u32,
    #[serde(default = "ten")]
    pub max_research: u32,
    #[serde(default = "five")]
    pub max_outbreak: u32,
    #[serde(default = "seven")]
    pub promote_cost: u32,
    #[serde(default = "three")]
    pub demote_cost: u32,
    #[serde(default = "one")]
    pub starting_node: NodeId,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unable to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

fn one() -> u32 {
    1
}

fn two() -> u32 {
    2
}

fn three() -> u32 {
    3
}

fn five() -> u32 {
    5
}

fn seven() -> u32 {
    7
}

fn ten() -> u32 {
    10
}

impl Default for CoreConfiguration {
    fn default() -> Self {
        CoreConfiguration {
            max_actions_per_phase: two(),
            travel_cost: five(),
            cleanse_cost: three(),
            bulldoze_cost: three(),
            charge_mana_ceiling: five(),
            max_research: ten(),
            max_outbreak: five(),
            promote_cost: seven(),
            demote_cost: three(),
            starting_node: one(),
        }
    }
}

impl CoreConfiguration {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Mana an action costs for the given character
    pub fn cost_of(&self, action: ActionKind, character: Character) -> u32 {
        match action {
            ActionKind::Travel => character.traits().travel_cost.unwrap_or(self.travel_cost),
            ActionKind::Cleanse => self.cleanse_cost,
            ActionKind::Bulldoze => self.bulldoze_cost,
            ActionKind::Move | ActionKind::Treat | ActionKind::Research | ActionKind::Charge => 0,
        }
    }
}
