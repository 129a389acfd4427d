use std::process::Command;
use std::thread;
use std::time::Duration;
use tracing::debug;

use super::{require_binary, Player, Subprocess};
use crate::client::TrackDescriptor;
use crate::config::Config;
use crate::error::PlayerError;

const NAME: &str = "vlc";
const BINARY: &str = "cvlc";
const HINT: &str = "https://www.videolan.org/vlc/";

/// Headless VLC. It takes a moment before its state can be trusted, so
/// `play` blocks for the configured settle delay.
pub struct Vlc {
    settle: Duration,
    process: Subprocess,
}

pub fn create(config: &Config) -> Result<Box<dyn Player>, PlayerError> {
    require_binary(NAME, BINARY, HINT)?;
    Ok(Box::new(Vlc::new(Duration::from_secs(config.streaming.vlc.playing_interval))))
}

impl Vlc {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            process: Subprocess::default(),
        }
    }

    pub fn args(track: &TrackDescriptor) -> Vec<String> {
        vec![
            "--intf".to_string(),
            "dummy".to_string(),
            "--play-and-exit".to_string(),
            "--no-video".to_string(),
            "--quiet".to_string(),
            format!("--meta-title={}", track.display_line()),
            track.stream_url.clone(),
        ]
    }
}

impl Player for Vlc {
    fn name(&self) -> &'static str {
        NAME
    }

    fn play(&mut self, track: &TrackDescriptor) -> Result<(), PlayerError> {
        self.process.terminate()?;

        let mut command = Command::new(BINARY);
        command.args(Self::args(track));
        self.process = Subprocess::spawn(NAME, &mut command)?;

        debug!("Waiting {:?} for vlc to settle", self.settle);
        thread::sleep(self.settle);

        Ok(())
    }

    fn is_playing(&mut self) -> bool {
        self.process.is_running()
    }

    fn stop(&mut self) -> Result<(), PlayerError> {
        self.process.terminate()?;
        Ok(())
    }
}
