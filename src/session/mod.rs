// Playback session engine
// Owns the track queue and cursor, drives the player one track at a time and
// reacts to transport commands captured on the input thread.

pub mod commands;
pub mod input;
pub mod sources;

pub use commands::{Controls, TransportCommand};
pub use input::{InputCapture, InputState, KeyReader, TerminalKeys, POLL_INTERVAL};
pub use sources::{effective_randomise, TrackSource};

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::audio::Player;
use crate::client::{MusicServer, TrackDescriptor};
use crate::error::{ClientError, SessionError};
use crate::notify::Announcer;
use crate::ui;

/// How a play-* call ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Finite queue played through
    Completed,
    /// The user asked to exit
    Exited,
}

#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Sleep between player/command checks
    pub poll_interval: Duration,
    /// Pause after Exit so the player can tear down
    pub exit_grace: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            exit_grace: Duration::from_millis(500),
        }
    }
}

/// Queue plus cursor for one play-* call.
///
/// `cursor == queue.len()` means the queue is used up: a finite session is
/// done, an endless one fetches more.
#[derive(Debug, Default)]
struct SessionState {
    queue: Vec<TrackDescriptor>,
    cursor: usize,
}

impl SessionState {
    fn finite(queue: Vec<TrackDescriptor>, start: usize) -> Self {
        let cursor = start.min(queue.len());
        Self { queue, cursor }
    }

    fn is_exhausted(&self) -> bool {
        self.cursor >= self.queue.len()
    }

    /// Move by `delta`, never below the first track nor past the end marker.
    fn step(&mut self, delta: isize) {
        let target = self.cursor.saturating_add_signed(delta);
        self.cursor = target.min(self.queue.len());
    }
}

/// What happens after the current track stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Advancing(isize),
    Restarting,
    Exiting,
}

/// Result of running the queue from the cursor onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    QueueEnd,
    Exited,
}

pub struct PlaybackEngine<'a> {
    player: Box<dyn Player>,
    server: &'a dyn MusicServer,
    input: Arc<InputState>,
    controls: Controls,
    format: String,
    invert_random: bool,
    announcer: Option<Announcer>,
    timing: Timing,
}

impl<'a> PlaybackEngine<'a> {
    pub fn new(
        player: Box<dyn Player>,
        server: &'a dyn MusicServer,
        input: Arc<InputState>,
        controls: Controls,
    ) -> Self {
        Self {
            player,
            server,
            input,
            controls,
            format: "raw".to_string(),
            invert_random: false,
            announcer: None,
            timing: Timing::default(),
        }
    }

    /// Transcoding format requested in stream URLs.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_invert_random(mut self, invert_random: bool) -> Self {
        self.invert_random = invert_random;
        self
    }

    pub fn with_announcer(mut self, announcer: Announcer) -> Self {
        self.announcer = Some(announcer);
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Play a fixed queue once from the first track.
    pub fn play_finite(&mut self, queue: Vec<TrackDescriptor>) -> Result<SessionEnd, SessionError> {
        self.play_finite_from(queue, 0)
    }

    pub fn play_finite_from(
        &mut self,
        queue: Vec<TrackDescriptor>,
        start: usize,
    ) -> Result<SessionEnd, SessionError> {
        let mut session = SessionState::finite(queue, start);
        info!("Starting finite session with {} tracks", session.queue.len());
        self.player.load(&session.queue);

        match self.guarded(|engine| engine.advance(&mut session))? {
            Step::QueueEnd => {
                info!("Queue finished");
                Ok(SessionEnd::Completed)
            }
            Step::Exited => Ok(SessionEnd::Exited),
        }
    }

    /// Play forever, appending `fetch`'s batch every time the queue runs out.
    /// An empty batch ends the session with `NoMoreTracks`.
    pub fn play_unbounded<F>(&mut self, mode: &'static str, mut fetch: F) -> Result<SessionEnd, SessionError>
    where
        F: FnMut(&dyn MusicServer) -> Result<Vec<TrackDescriptor>, ClientError>,
    {
        let mut session = SessionState::default();
        info!("Starting endless {mode} session");

        loop {
            let batch = fetch(self.server)?;
            if batch.is_empty() {
                warn!("Server returned no more {mode} tracks after {} played", session.queue.len());
                return Err(SessionError::NoMoreTracks { mode });
            }

            info!("Queued {} more {mode} tracks", batch.len());
            session.queue.extend(batch);
            self.player.load(&session.queue);

            match self.guarded(|engine| engine.advance(&mut session))? {
                Step::QueueEnd => continue,
                Step::Exited => return Ok(SessionEnd::Exited),
            }
        }
    }

    /// Run `f`, making sure the player is stopped if it fails.
    fn guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, SessionError>) -> Result<T, SessionError> {
        let result = f(self);
        if result.is_err() {
            if let Err(e) = self.stop_player() {
                warn!("Failed to stop player after error: {e}");
            }
        }
        result
    }

    /// Play from the cursor until the queue runs out or the user exits.
    fn advance(&mut self, session: &mut SessionState) -> Result<Step, SessionError> {
        loop {
            if session.is_exhausted() {
                return Ok(Step::QueueEnd);
            }

            let track = self.resolve(&session.queue[session.cursor])?;
            debug!("Cursor at {} of {}", session.cursor, session.queue.len());
            self.start_track(&track)?;

            match self.poll_track()? {
                Transition::Advancing(delta) => session.step(delta),
                Transition::Restarting => {}
                Transition::Exiting => return Ok(Step::Exited),
            }
        }
    }

    fn resolve(&self, track: &TrackDescriptor) -> Result<TrackDescriptor, SessionError> {
        let url = self.server.stream_url(&track.id, &self.format)?;
        Ok(track.clone().with_stream_url(url))
    }

    fn start_track(&mut self, track: &TrackDescriptor) -> Result<(), SessionError> {
        info!("Playing {} ({})", track.display_line(), track.id);
        ui::now_playing(track);

        if let Some(announcer) = &self.announcer {
            announcer.announce(self.server, track);
        }

        self.player.play(track)?;
        self.input.set_playing(true);

        if let Err(e) = self.server.scrobble(&track.id) {
            warn!("Scrobble failed for {}: {e}", track.id);
        }

        Ok(())
    }

    /// Wait for the current track to end, either on its own or by command.
    fn poll_track(&mut self) -> Result<Transition, SessionError> {
        while self.player.is_playing() {
            let Some(raw) = self.input.take() else {
                thread::sleep(self.timing.poll_interval);
                continue;
            };

            let command = self.controls.interpret(&raw);
            debug!("Input {raw:?} -> {command:?}");

            if let Some(transition) = self.handle(command)? {
                return Ok(transition);
            }
        }

        self.input.set_playing(false);
        // the natural advance wins over a key pressed as the track ended
        if let Some(raw) = self.input.take() {
            debug!("Dropping input {raw:?} received after track end");
        }

        Ok(Transition::Advancing(1))
    }

    fn handle(&mut self, command: TransportCommand) -> Result<Option<Transition>, SessionError> {
        let transition = match command {
            TransportCommand::Previous => Transition::Advancing(-1),
            TransportCommand::Next => Transition::Advancing(1),
            TransportCommand::Restart => Transition::Restarting,
            TransportCommand::Exit => Transition::Exiting,
            TransportCommand::Unrecognized => return Ok(None),
        };

        ui::transport(command);

        if transition == Transition::Exiting {
            self.input.stop_scanning();
            self.stop_player()?;
            thread::sleep(self.timing.exit_grace);
            info!("Exiting playback");
        } else {
            self.stop_player()?;
        }

        Ok(Some(transition))
    }

    /// Stop the player and clear the lock marker, even if stopping fails.
    fn stop_player(&mut self) -> Result<(), SessionError> {
        let result = self.player.stop();
        self.input.set_playing(false);
        result.map_err(SessionError::from)
    }
}

impl Drop for PlaybackEngine<'_> {
    fn drop(&mut self) {
        // lock still held means a track was left running
        if self.input.is_playing() {
            if let Err(e) = self.stop_player() {
                warn!("Failed to stop {} on shutdown: {e}", self.player.name());
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::PlayerError;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Load(usize),
        Play(String),
        Stop,
    }

    /// Scripted player: each track plays for a fixed number of polls, and
    /// commands can be injected at a given poll of a given play.
    #[derive(Clone)]
    pub struct FakePlayer {
        pub calls: Rc<RefCell<Vec<Call>>>,
        input: Arc<InputState>,
        polls_per_track: usize,
        /// (nth play call, poll number) -> raw token
        script: Rc<RefCell<HashMap<(usize, usize), String>>>,
        plays: usize,
        polls: usize,
        playing: bool,
        pub fail_on_play: Option<String>,
    }

    impl FakePlayer {
        pub fn new(input: &Arc<InputState>, polls_per_track: usize) -> Self {
            Self {
                calls: Rc::new(RefCell::new(Vec::new())),
                input: Arc::clone(input),
                polls_per_track,
                script: Rc::new(RefCell::new(HashMap::new())),
                plays: 0,
                polls: 0,
                playing: false,
                fail_on_play: None,
            }
        }

        /// Push `token` during the `play`-th play call (1-based) at its `poll`-th poll.
        pub fn at(self, play: usize, poll: usize, token: &str) -> Self {
            self.script.borrow_mut().insert((play, poll), token.to_string());
            self
        }

        pub fn played(&self) -> Vec<String> {
            self.calls
                .borrow()
                .iter()
                .filter_map(|c| match c {
                    Call::Play(id) => Some(id.clone()),
                    _ => None,
                })
                .collect()
        }

        pub fn stops(&self) -> usize {
            self.calls.borrow().iter().filter(|c| **c == Call::Stop).count()
        }
    }

    impl Player for FakePlayer {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn load(&mut self, queue: &[TrackDescriptor]) {
            self.calls.borrow_mut().push(Call::Load(queue.len()));
        }

        fn play(&mut self, track: &TrackDescriptor) -> Result<(), PlayerError> {
            if self.fail_on_play.as_deref() == Some(track.id.as_str()) {
                return Err(PlayerError::Stream("scripted failure".to_string()));
            }
            assert!(track.stream_url.contains(&track.id), "stream url must be resolved");
            self.calls.borrow_mut().push(Call::Play(track.id.clone()));
            self.plays += 1;
            self.polls = 0;
            self.playing = true;
            Ok(())
        }

        fn is_playing(&mut self) -> bool {
            if !self.playing {
                return false;
            }
            self.polls += 1;
            if let Some(token) = self.script.borrow_mut().remove(&(self.plays, self.polls)) {
                self.input.push(token);
            }
            if self.polls > self.polls_per_track {
                self.playing = false;
            }
            self.playing
        }

        fn stop(&mut self) -> Result<(), PlayerError> {
            self.calls.borrow_mut().push(Call::Stop);
            self.playing = false;
            Ok(())
        }
    }

    pub fn fast() -> Timing {
        Timing {
            poll_interval: Duration::from_millis(1),
            exit_grace: Duration::ZERO,
        }
    }
}
