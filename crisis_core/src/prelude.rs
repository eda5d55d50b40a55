pub use bevy::prelude::{
    default, resource_exists, App, Event, EventReader, EventWriter, Events,
    IntoSystemConfigs, IntoSystemSetConfigs, Plugin, Reflect, Res, ResMut, Resource, SystemSet,
    Update, World,
};
pub use bevy::utils::HashMap;

pub use crate::common::*;
pub use crate::graph::NodeId;
pub use crate::op::Op;
