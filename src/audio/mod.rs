// Player adapters - one capability set, several ways of making noise
// The session engine only ever talks to `dyn Player`

pub mod ffplay;
pub mod mpv;
#[cfg(feature = "audio")]
pub mod stream;
pub mod vlc;

use std::env;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use tracing::debug;

use crate::client::TrackDescriptor;
use crate::config::Config;
use crate::error::PlayerError;

/// Capability set every playback mechanism provides.
pub trait Player {
    fn name(&self) -> &'static str;

    /// Hand over the whole session queue up front. Only adapters with a
    /// native playlist care.
    fn load(&mut self, _queue: &[TrackDescriptor]) {}

    /// Start playing `track.stream_url` and return without waiting for it.
    fn play(&mut self, track: &TrackDescriptor) -> Result<(), PlayerError>;

    /// True until the track finishes on its own or `stop` is called.
    fn is_playing(&mut self) -> bool;

    /// Tear down whatever is playing. Safe to call when nothing is.
    fn stop(&mut self) -> Result<(), PlayerError>;
}

type Constructor = fn(&Config) -> Result<Box<dyn Player>, PlayerError>;

fn registry() -> Vec<(&'static str, Constructor)> {
    #[allow(unused_mut)]
    let mut players = vec![
        ("ffplay", ffplay::create as Constructor),
        ("mpv", mpv::create as Constructor),
        ("vlc", vlc::create as Constructor),
    ];

    #[cfg(feature = "audio")]
    players.push(("stream", stream::create as Constructor));

    players.sort_by_key(|(name, _)| *name);
    players
}

/// Config keys accepted for `streaming.player`.
pub fn available_players() -> Vec<&'static str> {
    registry().into_iter().map(|(name, _)| name).collect()
}

/// Build the adapter named in the config. Unknown names fail here, at
/// startup, with the list of valid ones.
pub fn create_player(config: &Config) -> Result<Box<dyn Player>, PlayerError> {
    let requested = config.streaming.player.trim().to_lowercase();

    match registry().into_iter().find(|(name, _)| *name == requested) {
        Some((name, constructor)) => {
            debug!("Creating {name} player");
            constructor(config)
        }
        None => Err(PlayerError::Unknown {
            requested: config.streaming.player.clone(),
            available: available_players(),
        }),
    }
}

/// Locate an executable on `PATH`.
pub fn find_binary(binary: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

/// Fail with install guidance when `binary` is not on `PATH`.
pub(crate) fn require_binary(
    player: &'static str,
    binary: &str,
    hint: &'static str,
) -> Result<PathBuf, PlayerError> {
    find_binary(binary).ok_or(PlayerError::Missing { player, hint })
}

/// A player process whose exit status is polled.
#[derive(Debug, Default)]
pub(crate) struct Subprocess {
    child: Option<Child>,
}

impl Subprocess {
    pub(crate) fn spawn(player: &'static str, command: &mut Command) -> Result<Self, PlayerError> {
        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| PlayerError::Launch { player, source })?;

        Ok(Self { child: Some(child) })
    }

    /// No exit status yet means still playing.
    pub(crate) fn is_running(&mut self) -> bool {
        match self.child.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(_))) | Some(Err(_)) | None => false,
        }
    }

    pub(crate) fn terminate(&mut self) -> io::Result<()> {
        if let Some(mut child) = self.child.take() {
            match child.kill() {
                Ok(()) => {}
                // already exited
                Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
                Err(e) => return Err(e),
            }
            child.wait()?;
        }
        Ok(())
    }
}

impl Drop for Subprocess {
    fn drop(&mut self) {
        let _ = self.terminate();
    }
}
