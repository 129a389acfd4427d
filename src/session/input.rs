// Background key capture while a track is playing.
// The capture thread only ever writes the command slot; the engine only drains it.

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Default cadence for both the capture loop and the engine's poll loop.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// State shared between the engine and the capture thread.
#[derive(Debug)]
pub struct InputState {
    /// Lock marker: set while a track is actively playing.
    playing: AtomicBool,
    /// Cleared by Exit; the capture loop stops on its next check.
    scanning: AtomicBool,
    /// Latest raw token; a newer token replaces an unread one.
    latest: Mutex<Option<String>>,
}

impl InputState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            playing: AtomicBool::new(false),
            scanning: AtomicBool::new(true),
            latest: Mutex::new(None),
        })
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::SeqCst);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    pub fn stop_scanning(&self) {
        self.scanning.store(false, Ordering::SeqCst);
    }

    pub fn push(&self, token: impl Into<String>) {
        let mut slot = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(token.into());
    }

    /// Swap the slot empty and return what was in it.
    pub fn take(&self) -> Option<String> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Source of raw key tokens for the capture thread.
pub trait KeyReader: Send {
    /// Wait up to `timeout` for one key. `Ok(None)` means nothing arrived.
    fn read_key(&mut self, timeout: Duration) -> io::Result<Option<String>>;
}

/// Reads single key presses from the terminal via crossterm.
pub struct TerminalKeys {
    /// Token reported for Ctrl-C, normally the exit binding.
    interrupt: String,
}

impl TerminalKeys {
    pub fn new(interrupt: impl Into<String>) -> Self {
        Self {
            interrupt: interrupt.into(),
        }
    }
}

/// Keeps the terminal in raw mode for the duration of one read.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

impl KeyReader for TerminalKeys {
    fn read_key(&mut self, timeout: Duration) -> io::Result<Option<String>> {
        let _raw = RawModeGuard::enable()?;

        if !event::poll(timeout)? {
            return Ok(None);
        }

        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    Ok(Some(self.interrupt.clone()))
                }
                KeyCode::Char(c) => Ok(Some(c.to_string())),
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }
}

/// Handle to the running capture thread.
pub struct InputCapture {
    state: Arc<InputState>,
    handle: JoinHandle<()>,
}

impl InputCapture {
    pub fn spawn<R>(state: Arc<InputState>, reader: R, interval: Duration) -> io::Result<Self>
    where
        R: KeyReader + 'static,
    {
        let thread_state = Arc::clone(&state);
        let handle = thread::Builder::new()
            .name("input-capture".to_string())
            .spawn(move || capture_loop(&thread_state, reader, interval))?;

        Ok(Self { state, handle })
    }

    /// Stop scanning and wait for the thread to notice.
    pub fn shutdown(self) {
        self.state.stop_scanning();
        if self.handle.join().is_err() {
            warn!("Input capture thread panicked");
        }
    }
}

fn capture_loop<R: KeyReader>(state: &InputState, mut reader: R, interval: Duration) {
    debug!("Input capture started");

    while state.is_scanning() {
        thread::sleep(interval);

        if !state.is_playing() {
            continue;
        }

        match reader.read_key(interval) {
            Ok(Some(token)) => {
                debug!("Captured key {token:?}");
                state.push(token);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Keyboard input unavailable, playback controls disabled: {e}");
                break;
            }
        }
    }

    debug!("Input capture stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    struct ScriptedKeys {
        keys: VecDeque<String>,
        reads: Arc<AtomicUsize>,
    }

    impl KeyReader for ScriptedKeys {
        fn read_key(&mut self, _timeout: Duration) -> io::Result<Option<String>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.keys.pop_front())
        }
    }

    fn scripted(keys: &[&str]) -> (ScriptedKeys, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let reader = ScriptedKeys {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            reads: Arc::clone(&reads),
        };
        (reader, reads)
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..500 {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_latest_token_wins_and_take_drains() {
        let state = InputState::new();
        state.push("n");
        state.push("p");
        state.push("x");

        assert_eq!(state.take().as_deref(), Some("x"));
        assert_eq!(state.take(), None);
    }

    #[test]
    fn test_no_reads_while_nothing_plays() {
        let state = InputState::new();
        let (reader, reads) = scripted(&["n"]);
        let capture = InputCapture::spawn(Arc::clone(&state), reader, Duration::from_millis(1)).unwrap();

        thread::sleep(Duration::from_millis(30));
        assert_eq!(reads.load(Ordering::SeqCst), 0);
        assert_eq!(state.take(), None);

        capture.shutdown();
    }

    #[test]
    fn test_keys_captured_while_playing() {
        let state = InputState::new();
        state.set_playing(true);
        let (reader, _reads) = scripted(&["n"]);
        let capture = InputCapture::spawn(Arc::clone(&state), reader, Duration::from_millis(1)).unwrap();

        let mut seen = None;
        assert!(wait_until(|| {
            seen = state.take();
            seen.is_some()
        }));
        assert_eq!(seen.as_deref(), Some("n"));

        capture.shutdown();
    }

    #[test]
    fn test_loop_exits_when_scanning_cleared() {
        let state = InputState::new();
        state.set_playing(true);
        let (reader, reads) = scripted(&[]);
        let capture = InputCapture::spawn(Arc::clone(&state), reader, Duration::from_millis(1)).unwrap();

        assert!(wait_until(|| reads.load(Ordering::SeqCst) > 0));
        state.stop_scanning();
        assert!(wait_until(|| capture.handle.is_finished()));
        capture.shutdown();
    }
}
