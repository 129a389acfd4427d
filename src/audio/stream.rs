use reqwest::blocking::Client;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::Player;
use crate::client::TrackDescriptor;
use crate::config::Config;
use crate::error::PlayerError;

const NAME: &str = "stream";

/// Built-in player: a worker thread downloads and decodes the stream, then
/// hands it to a rodio sink. `play` returns as soon as the worker is started.
pub struct StreamPlayer {
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
    current: Option<Playback>,
    http: Client,
    volume: f32,
    fade_out_duration: Duration,
}

/// One `play` call. The worker only appends while the sink is still in the
/// slot; `stop` empties the slot so a late download is discarded.
struct Playback {
    sink: Arc<Mutex<Option<Sink>>>,
    loading: Arc<AtomicBool>,
}

impl Playback {
    fn is_active(&self) -> bool {
        if self.loading.load(Ordering::SeqCst) {
            return true;
        }
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|sink| !sink.empty())
    }

    fn take_sink(&self) -> Option<Sink> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

pub fn create(config: &Config) -> Result<Box<dyn Player>, PlayerError> {
    Ok(Box::new(StreamPlayer::new(config.server.verify_ssl)?))
}

impl StreamPlayer {
    pub fn new(verify_ssl: bool) -> Result<Self, PlayerError> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| PlayerError::Stream(format!("No audio output device: {e}")))?;

        let http = Client::builder()
            .danger_accept_invalid_certs(!verify_ssl)
            .build()
            .map_err(|e| PlayerError::Stream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            stream_handle,
            current: None,
            http,
            volume: 1.0,
            fade_out_duration: Duration::from_millis(200),
        })
    }

    /// Quick fade so a skip does not click.
    fn fade_out(&self, sink: &Sink) {
        let fade_steps = 10;
        let step_duration = self.fade_out_duration / fade_steps;
        let volume_step = self.volume / fade_steps as f32;

        for step in 1..=fade_steps {
            sink.set_volume((self.volume - volume_step * step as f32).max(0.0));
            thread::sleep(step_duration);
        }
    }
}

fn fetch(http: &Client, url: &str) -> Result<Vec<u8>, PlayerError> {
    let response = http
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| PlayerError::Stream(format!("Failed to fetch stream: {e}")))?;

    let body = response
        .bytes()
        .map_err(|e| PlayerError::Stream(format!("Failed to read stream: {e}")))?;

    Ok(body.to_vec())
}

fn decode(body: Vec<u8>, label: &str) -> Result<Decoder<Cursor<Vec<u8>>>, PlayerError> {
    Decoder::new(Cursor::new(body)).map_err(|e| {
        PlayerError::Stream(format!(
            "Failed to decode '{label}': {e}. Try a transcoding format such as mp3"
        ))
    })
}

/// Download, decode and queue one track. Runs on the loader thread.
fn load_into(http: &Client, track: &TrackDescriptor, sink: &Mutex<Option<Sink>>) -> Result<(), PlayerError> {
    let body = fetch(http, &track.stream_url)?;
    debug!("Fetched {} bytes for {}", body.len(), track.id);
    let source = decode(body, &track.display_line())?;

    match sink.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
        Some(sink) => sink.append(source),
        None => debug!("Discarding {}, stopped while loading", track.id),
    }
    Ok(())
}

impl Player for StreamPlayer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn play(&mut self, track: &TrackDescriptor) -> Result<(), PlayerError> {
        self.stop()?;

        let sink = Sink::try_new(&self.stream_handle).map_err(|e| PlayerError::Stream(e.to_string()))?;
        sink.set_volume(self.volume);

        let playback = Playback {
            sink: Arc::new(Mutex::new(Some(sink))),
            loading: Arc::new(AtomicBool::new(true)),
        };

        let http = self.http.clone();
        let track = track.clone();
        let slot = Arc::clone(&playback.sink);
        let loading = Arc::clone(&playback.loading);

        thread::Builder::new()
            .name("stream-loader".to_string())
            .spawn(move || {
                if let Err(e) = load_into(&http, &track, &slot) {
                    warn!("{e}");
                }
                // cleared after the append so is_playing never sees a gap
                loading.store(false, Ordering::SeqCst);
            })?;

        self.current = Some(playback);
        Ok(())
    }

    fn is_playing(&mut self) -> bool {
        self.current.as_ref().is_some_and(Playback::is_active)
    }

    fn stop(&mut self) -> Result<(), PlayerError> {
        if let Some(playback) = self.current.take() {
            if let Some(sink) = playback.take_sink() {
                if !sink.empty() {
                    self.fade_out(&sink);
                }
                sink.stop();
            }
        }
        Ok(())
    }
}
