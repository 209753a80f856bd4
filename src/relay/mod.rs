//! Rich-presence relay: the hub that viewers and bots connect to, and the
//! bot-side client that feeds it.

mod backoff;
pub mod client;
pub mod hub;
pub mod protocol;
pub mod server;
pub mod session;

pub use client::{RpcClient, RpcHandle, UpdateRequestHandler, update_frames};
pub use hub::Hub;
pub use server::router;
pub use session::{HubFrame, RelaySession, Role};
