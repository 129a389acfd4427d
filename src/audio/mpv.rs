use std::io;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::{require_binary, Player};
use crate::client::TrackDescriptor;
use crate::config::{Config, MpvConfig};
use crate::error::PlayerError;

const NAME: &str = "mpv";
const HINT: &str = "https://mpv.io/installation/";
const WATCH_INTERVAL: Duration = Duration::from_millis(50);

/// mpv with a watcher thread that flips `playing` off when the process ends.
pub struct Mpv {
    config: MpvConfig,
    child: Arc<Mutex<Option<Child>>>,
    playing: Arc<AtomicBool>,
}

pub fn create(config: &Config) -> Result<Box<dyn Player>, PlayerError> {
    require_binary(NAME, NAME, HINT)?;
    Ok(Box::new(Mpv::new(config.streaming.mpv.clone())))
}

impl Mpv {
    pub fn new(config: MpvConfig) -> Self {
        Self {
            config,
            child: Arc::new(Mutex::new(None)),
            playing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn args(&self, track: &TrackDescriptor) -> Vec<String> {
        let mut args = vec![
            "--no-video".to_string(),
            "--really-quiet".to_string(),
            format!("--force-media-title={}", track.display_line()),
        ];
        args.extend(self.config.extra_args.iter().cloned());
        args.push(track.stream_url.clone());
        args
    }

    fn kill_current(&mut self) -> io::Result<()> {
        let child = self
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(mut child) = child {
            match child.kill() {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
                Err(e) => return Err(e),
            }
            child.wait()?;
        }

        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Waits for the process to finish and reports it through `playing`.
fn watch(child: Arc<Mutex<Option<Child>>>, playing: Arc<AtomicBool>) {
    loop {
        thread::sleep(WATCH_INTERVAL);

        let mut guard = child.lock().unwrap_or_else(PoisonError::into_inner);
        let finished = match guard.as_mut() {
            // stopped from the outside
            None => return,
            Some(process) => !matches!(process.try_wait(), Ok(None)),
        };

        if finished {
            guard.take();
            playing.store(false, Ordering::SeqCst);
            debug!("mpv finished");
            return;
        }
    }
}

impl Player for Mpv {
    fn name(&self) -> &'static str {
        NAME
    }

    fn play(&mut self, track: &TrackDescriptor) -> Result<(), PlayerError> {
        self.kill_current()?;

        let process = Command::new(NAME)
            .args(self.args(track))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| PlayerError::Launch { player: NAME, source })?;

        *self.child.lock().unwrap_or_else(PoisonError::into_inner) = Some(process);
        self.playing.store(true, Ordering::SeqCst);

        let child = Arc::clone(&self.child);
        let playing = Arc::clone(&self.playing);
        thread::Builder::new()
            .name("mpv-watch".to_string())
            .spawn(move || watch(child, playing))?;

        Ok(())
    }

    fn is_playing(&mut self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn stop(&mut self) -> Result<(), PlayerError> {
        self.kill_current()?;
        Ok(())
    }
}

impl Drop for Mpv {
    fn drop(&mut self) {
        if let Err(e) = self.kill_current() {
            warn!("Failed to stop mpv: {e}");
        }
    }
}
