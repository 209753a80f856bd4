pub mod common;
pub mod configs;
pub mod platform;
pub mod player;
pub mod pool;
pub mod relay;
pub mod resume;
pub mod snapshot;
pub mod store;
