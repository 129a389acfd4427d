// In-memory MusicServer for unit tests

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use super::{Album, MusicFolder, MusicServer, Playlist, SearchResults, TrackDescriptor};
use crate::error::ClientError;

pub fn track(id: &str) -> TrackDescriptor {
    TrackDescriptor {
        id: id.to_string(),
        title: format!("Track {id}"),
        artist: "Test Artist".to_string(),
        ..Default::default()
    }
}

pub fn tracks(ids: &[&str]) -> Vec<TrackDescriptor> {
    ids.iter().map(|id| track(id)).collect()
}

#[derive(Default)]
pub struct FakeServer {
    pub albums: HashMap<String, Vec<TrackDescriptor>>,
    pub artist_albums: HashMap<String, Vec<Album>>,
    pub playlists: HashMap<String, Vec<TrackDescriptor>>,
    pub folders: Vec<MusicFolder>,
    /// Served in order by `random_songs` / `similar_songs`; empty once drained.
    pub batches: RefCell<VecDeque<Vec<TrackDescriptor>>>,
    pub art: Option<Vec<u8>>,
    pub fail_scrobble: bool,
    pub scrobbled: RefCell<Vec<String>>,
    pub batch_requests: RefCell<Vec<Option<String>>>,
}

impl FakeServer {
    pub fn with_batches(batches: Vec<Vec<TrackDescriptor>>) -> Self {
        Self {
            batches: RefCell::new(batches.into()),
            ..Self::default()
        }
    }

    fn next_batch(&self, key: Option<&str>) -> Vec<TrackDescriptor> {
        self.batch_requests.borrow_mut().push(key.map(str::to_string));
        self.batches.borrow_mut().pop_front().unwrap_or_default()
    }
}

impl MusicServer for FakeServer {
    fn ping(&self) -> Result<bool, ClientError> {
        Ok(true)
    }

    fn search(&self, _query: &str) -> Result<SearchResults, ClientError> {
        Ok(SearchResults::default())
    }

    fn playlists(&self) -> Result<Vec<Playlist>, ClientError> {
        Ok(self
            .playlists
            .keys()
            .map(|id| Playlist { id: id.clone(), name: id.clone(), song_count: None })
            .collect())
    }

    fn music_folders(&self) -> Result<Vec<MusicFolder>, ClientError> {
        Ok(self.folders.clone())
    }

    fn album_tracks(&self, album_id: &str) -> Result<Vec<TrackDescriptor>, ClientError> {
        Ok(self.albums.get(album_id).cloned().unwrap_or_default())
    }

    fn artist_albums(&self, artist_id: &str) -> Result<Vec<Album>, ClientError> {
        Ok(self.artist_albums.get(artist_id).cloned().unwrap_or_default())
    }

    fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<TrackDescriptor>, ClientError> {
        Ok(self.playlists.get(playlist_id).cloned().unwrap_or_default())
    }

    fn random_songs(&self, folder_id: Option<&str>) -> Result<Vec<TrackDescriptor>, ClientError> {
        Ok(self.next_batch(folder_id))
    }

    fn similar_songs(&self, artist_id: &str) -> Result<Vec<TrackDescriptor>, ClientError> {
        Ok(self.next_batch(Some(artist_id)))
    }

    fn scrobble(&self, track_id: &str) -> Result<(), ClientError> {
        self.scrobbled.borrow_mut().push(track_id.to_string());
        if self.fail_scrobble {
            return Err(ClientError::Url("scrobble refused".to_string()));
        }
        Ok(())
    }

    fn cover_art(&self, _cover_id: &str, _size: u32) -> Result<Option<Vec<u8>>, ClientError> {
        Ok(self.art.clone())
    }

    fn stream_url(&self, track_id: &str, format: &str) -> Result<String, ClientError> {
        Ok(format!("http://fake/rest/stream?id={track_id}&format={format}"))
    }
}
