// Now-playing side channel: cover art on disk plus a desktop notification
// Everything here is best-effort, playback never waits on it

use anyhow::Result;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::client::{MusicServer, TrackDescriptor};

/// Shown when a track has no art or the server will not give it to us.
pub const NO_COVER: &[u8] = include_bytes!("../../assets/no_cover.png");

pub trait Notifier {
    fn notify(&self, track: &TrackDescriptor, icon: Option<&Path>) -> Result<()>;
}

/// Keeps the current track's cover art at a fixed path.
#[derive(Debug, Clone)]
pub struct CoverArtCache {
    path: PathBuf,
    size: u32,
}

impl CoverArtCache {
    pub fn new(size: u32) -> Self {
        Self::with_path(env::temp_dir().join("subpipe-art.jpg"), size)
    }

    pub fn with_path(path: PathBuf, size: u32) -> Self {
        Self { path, size }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `track`'s art (or the placeholder) to the cache path.
    pub fn refresh(&self, server: &dyn MusicServer, track: &TrackDescriptor) -> Result<&Path> {
        let art = match &track.cover_art {
            Some(cover_id) => server.cover_art(cover_id, self.size).unwrap_or_else(|e| {
                warn!("Could not fetch cover art {cover_id}: {e}");
                None
            }),
            None => None,
        };

        if art.is_none() {
            debug!("Using placeholder art for {}", track.id);
        }

        fs::write(&self.path, art.as_deref().unwrap_or(NO_COVER))?;
        Ok(&self.path)
    }
}

/// Refreshes cover art and then notifies.
pub struct Announcer {
    cache: CoverArtCache,
    notifier: Box<dyn Notifier>,
}

impl Announcer {
    pub fn new(cache: CoverArtCache, notifier: Box<dyn Notifier>) -> Self {
        Self { cache, notifier }
    }

    pub fn announce(&self, server: &dyn MusicServer, track: &TrackDescriptor) {
        let icon = match self.cache.refresh(server, track) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Could not write cover art to {}: {e}", self.cache.path().display());
                None
            }
        };

        if let Err(e) = self.notifier.notify(track, icon) {
            warn!("Notification failed: {e}");
        }
    }
}

#[cfg(feature = "notify")]
pub struct DesktopNotifier;

#[cfg(feature = "notify")]
impl Notifier for DesktopNotifier {
    fn notify(&self, track: &TrackDescriptor, icon: Option<&Path>) -> Result<()> {
        let mut notification = notify_rust::Notification::new();
        notification
            .appname("subpipe")
            .summary(if track.title.is_empty() { "No Title" } else { track.title.as_str() })
            .body(if track.artist.is_empty() { "No Artist" } else { track.artist.as_str() })
            .timeout(notify_rust::Timeout::Milliseconds(5000));

        if let Some(icon) = icon.and_then(Path::to_str) {
            notification.icon(icon);
        }

        notification.show()?;
        Ok(())
    }
}

/// The desktop notifier when built with `notify`, otherwise nothing.
pub fn desktop_notifier() -> Option<Box<dyn Notifier>> {
    #[cfg(feature = "notify")]
    {
        Some(Box::new(DesktopNotifier))
    }

    #[cfg(not(feature = "notify"))]
    {
        tracing::info!("Built without the `notify` feature; notifications disabled");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeServer;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        seen: Rc<RefCell<Vec<(String, bool)>>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, track: &TrackDescriptor, icon: Option<&Path>) -> Result<()> {
            self.seen.borrow_mut().push((track.title.clone(), icon.is_some()));
            Ok(())
        }
    }

    fn track_with_art(cover: Option<&str>) -> TrackDescriptor {
        TrackDescriptor {
            id: "1".to_string(),
            title: "Xtal".to_string(),
            cover_art: cover.map(str::to_string),
            ..Default::default()
        }
    }

    fn server_with_art(art: Option<Vec<u8>>) -> FakeServer {
        FakeServer {
            art,
            ..FakeServer::default()
        }
    }

    #[test]
    fn test_refresh_writes_server_art() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CoverArtCache::with_path(dir.path().join("art.jpg"), 256);
        let server = server_with_art(Some(vec![1, 2, 3]));

        let path = cache.refresh(&server, &track_with_art(Some("al-1"))).unwrap();
        assert_eq!(fs::read(path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_refresh_falls_back_to_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CoverArtCache::with_path(dir.path().join("art.jpg"), 256);

        // no cover id on the track
        let server = server_with_art(Some(vec![9]));
        cache.refresh(&server, &track_with_art(None)).unwrap();
        assert_eq!(fs::read(cache.path()).unwrap(), NO_COVER);

        // server has nothing
        let server = server_with_art(None);
        cache.refresh(&server, &track_with_art(Some("al-2"))).unwrap();
        assert_eq!(fs::read(cache.path()).unwrap(), NO_COVER);
    }

    #[test]
    fn test_announce_survives_unwritable_cache() {
        let recorder = RecordingNotifier::default();
        let announcer = Announcer::new(
            CoverArtCache::with_path(PathBuf::from("/nonexistent-dir/for/art.jpg"), 64),
            Box::new(recorder.clone()),
        );

        announcer.announce(&server_with_art(None), &track_with_art(None));
        assert_eq!(*recorder.seen.borrow(), vec![("Xtal".to_string(), false)]);
    }
}
