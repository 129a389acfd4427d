use std::process::Command;
use tracing::debug;

use super::{require_binary, Player, Subprocess};
use crate::client::TrackDescriptor;
use crate::config::{Config, FfplayConfig};
use crate::error::PlayerError;

const NAME: &str = "ffplay";
const HINT: &str = "https://ffmpeg.org/download.html";

/// Spawns one ffplay process per track and polls it for exit.
pub struct Ffplay {
    config: FfplayConfig,
    process: Subprocess,
}

pub fn create(config: &Config) -> Result<Box<dyn Player>, PlayerError> {
    require_binary(NAME, NAME, HINT)?;
    Ok(Box::new(Ffplay::new(config.streaming.ffplay.clone())))
}

impl Ffplay {
    pub fn new(config: FfplayConfig) -> Self {
        Self {
            config,
            process: Subprocess::default(),
        }
    }

    /// Program and arguments, including any `pre_exe` wrapper.
    pub fn command_line(&self, track: &TrackDescriptor) -> Vec<String> {
        let mut args: Vec<String> = self
            .config
            .pre_exe
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let show_mode = self.config.show_mode.to_string();
        let title = track.display_line();

        args.extend(
            [
                NAME,
                "-i",
                track.stream_url.as_str(),
                "-showmode",
                show_mode.as_str(),
                "-window_title",
                title.as_str(),
                "-autoexit",
                "-hide_banner",
                "-x",
                "500",
                "-y",
                "500",
                "-loglevel",
                "fatal",
                "-infbuf",
            ]
            .map(str::to_string),
        );

        if !self.config.display {
            args.push("-nodisp".to_string());
        }

        args
    }
}

impl Player for Ffplay {
    fn name(&self) -> &'static str {
        NAME
    }

    fn play(&mut self, track: &TrackDescriptor) -> Result<(), PlayerError> {
        self.process.terminate()?;

        let args = self.command_line(track);
        debug!("Launching {}", args[0]);

        let mut command = Command::new(&args[0]);
        command.args(&args[1..]);
        self.process = Subprocess::spawn(NAME, &mut command)?;

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

#[cfg(test)]
mod tests {
    use super::*;

    fn track() -> TrackDescriptor {
        TrackDescriptor {
            id: "7".to_string(),
            title: "Windowlicker".to_string(),
            artist: "Aphex Twin".to_string(),
            ..Default::default()
        }
        .with_stream_url("http://host/rest/stream?id=7".to_string())
    }

    #[test]
    fn test_headless_command_line() {
        let player = Ffplay::new(FfplayConfig::default());
        let args = player.command_line(&track());

        assert_eq!(args[0], "ffplay");
        assert_eq!(args[2], "http://host/rest/stream?id=7");
        assert!(args.contains(&"Windowlicker by Aphex Twin".to_string()));
        assert!(args.contains(&"-autoexit".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("-nodisp"));
    }

    #[test]
    fn test_pre_exe_and_display() {
        let player = Ffplay::new(FfplayConfig {
            display: true,
            show_mode: 1,
            pre_exe: "nice -n 10".to_string(),
        });
        let args = player.command_line(&track());

        assert_eq!(&args[..4], &["nice", "-n", "10", "ffplay"]);
        assert!(!args.contains(&"-nodisp".to_string()));
        let mode = args.iter().position(|a| a == "-showmode").unwrap();
        assert_eq!(args[mode + 1], "1");
    }

    #[test]
    fn test_stop_without_play_is_safe() {
        let mut player = Ffplay::new(FfplayConfig::default());
        assert!(!player.is_playing());
        player.stop().unwrap();
        player.stop().unwrap();
    }
}
