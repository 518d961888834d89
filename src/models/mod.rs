//! Core data models for the bot.

mod dataset;
mod ids;
mod settings;
mod snapshot;

pub use dataset::*;
pub use ids::*;
pub use settings::*;
pub use snapshot::*;
