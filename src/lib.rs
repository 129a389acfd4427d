// subpipe - stream a Subsonic library through a local player
// The session engine is the heart, everything else feeds it

pub mod audio;   // player adapters
pub mod client;  // Subsonic REST client
pub mod config;  // config file and state dir
pub mod error;
pub mod notify;  // cover art + desktop notifications
pub mod session; // queue, playback loop, key capture
pub mod ui;      // console output and prompts

pub use audio::{create_player, Player};
pub use client::{MusicServer, SubsonicClient, TrackDescriptor};
pub use config::Config;
pub use error::{ClientError, PlayerError, SessionError};
pub use session::{PlaybackEngine, SessionEnd, TrackSource};
