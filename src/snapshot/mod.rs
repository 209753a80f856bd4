//! Versioned, serializable form of a guild's player state.

pub mod codec;
pub mod model;
pub mod schema;

pub use codec::*;
pub use model::*;
pub use schema::SNAPSHOT_VERSION;
