// Where a session's tracks come from, and how each source is played

use rand::seq::SliceRandom;
use tracing::{info, warn};

use super::{PlaybackEngine, SessionEnd};
use crate::client::{MusicServer, TrackDescriptor};
use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSource {
    /// Endless random songs, optionally from one music folder
    Random { music_folder: Option<String> },
    /// Endless songs similar to an artist
    Radio { artist_id: String },
    Artist { artist_id: String, randomise: bool },
    Album { album_id: String, randomise: bool },
    Playlist { playlist_id: String, randomise: bool },
}

impl TrackSource {
    pub fn mode(&self) -> &'static str {
        match self {
            TrackSource::Random { .. } => "random",
            TrackSource::Radio { .. } => "radio",
            TrackSource::Artist { .. } => "artist",
            TrackSource::Album { .. } => "album",
            TrackSource::Playlist { .. } => "playlist",
        }
    }

    pub fn is_endless(&self) -> bool {
        matches!(self, TrackSource::Random { .. } | TrackSource::Radio { .. })
    }

    /// Shuffle requested on the command line; endless sources ignore it.
    pub fn randomise(&self) -> bool {
        match self {
            TrackSource::Artist { randomise, .. }
            | TrackSource::Album { randomise, .. }
            | TrackSource::Playlist { randomise, .. } => *randomise,
            _ => false,
        }
    }
}

/// `invert_random` flips the meaning of the shuffle flag.
pub fn effective_randomise(requested: bool, invert_random: bool) -> bool {
    requested ^ invert_random
}

/// Shuffle `queue` with `shuffle` when the effective policy says so.
/// Returns whether it was shuffled.
pub fn order_queue<F>(queue: &mut [TrackDescriptor], requested: bool, invert_random: bool, shuffle: F) -> bool
where
    F: FnOnce(&mut [TrackDescriptor]),
{
    let randomise = effective_randomise(requested, invert_random);
    if randomise {
        shuffle(queue);
    }
    randomise
}

fn shuffle(queue: &mut [TrackDescriptor]) {
    queue.shuffle(&mut rand::thread_rng());
}

/// Every track of every album by the artist, album order preserved.
pub fn artist_tracks(server: &dyn MusicServer, artist_id: &str) -> Result<Vec<TrackDescriptor>, SessionError> {
    let albums = server.artist_albums(artist_id)?;
    let mut tracks = Vec::new();

    for album in &albums {
        tracks.extend(server.album_tracks(&album.id)?);
    }

    info!("Collected {} tracks from {} albums", tracks.len(), albums.len());
    Ok(tracks)
}

impl PlaybackEngine<'_> {
    pub fn play_source(&mut self, source: &TrackSource) -> Result<SessionEnd, SessionError> {
        self.play_source_with(source, shuffle)
    }

    /// As `play_source`, with the shuffle step supplied by the caller.
    pub fn play_source_with<F>(&mut self, source: &TrackSource, shuffle: F) -> Result<SessionEnd, SessionError>
    where
        F: FnOnce(&mut [TrackDescriptor]),
    {
        let mode = source.mode();

        let mut queue = match source {
            TrackSource::Random { music_folder } => {
                let folder = music_folder.as_deref();
                return self.play_unbounded(mode, |server| server.random_songs(folder));
            }
            TrackSource::Radio { artist_id } => {
                return self.play_unbounded(mode, |server| server.similar_songs(artist_id));
            }
            TrackSource::Artist { artist_id, .. } => {
                let tracks = artist_tracks(self.server, artist_id)?;
                if tracks.is_empty() {
                    return Err(SessionError::NoTracks(format!("artist {artist_id}")));
                }
                tracks
            }
            TrackSource::Album { album_id, .. } => self.server.album_tracks(album_id)?,
            TrackSource::Playlist { playlist_id, .. } => self.server.playlist_tracks(playlist_id)?,
        };

        if queue.is_empty() {
            warn!("Nothing to play for {mode}");
            return Ok(SessionEnd::Completed);
        }

        if order_queue(&mut queue, source.randomise(), self.invert_random, shuffle) {
            info!("Shuffled {} {mode} tracks", queue.len());
        }

        self.play_finite(queue)
    }
}
