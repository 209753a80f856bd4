pub mod base;
pub mod logging;
pub mod player;
pub mod relay;
pub mod rpc;
pub mod storage;

pub use base::*;
pub use logging::*;
pub use player::*;
pub use relay::*;
pub use rpc::*;
pub use storage::*;
