pub mod idle;
pub mod playback;
pub mod registry;
pub mod saver;
pub mod state;
pub mod tasks;
pub mod track;

pub use registry::{PlayerRegistry, SharedPlayer};
pub use state::{MAX_VOLUME, NowPlaying, Player};
pub use tasks::BackgroundTasks;
pub use track::{Playlist, PlaylistCache, Track};
