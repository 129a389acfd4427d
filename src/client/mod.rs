// Subsonic REST client
// Read calls come back empty when the server says "failed"; only transport
// problems surface as errors.

#[cfg(test)]
pub(crate) mod fake;
pub mod models;

pub use models::{Album, Artist, MusicFolder, Playlist, SearchResults, TrackDescriptor};

use md5::{Digest, Md5};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::error::ClientError;

const CLIENT_NAME: &str = "subpipe";
const SALT_LEN: usize = 9;

/// Everything the CLI and the playback session need from the server.
pub trait MusicServer {
    fn ping(&self) -> Result<bool, ClientError>;
    fn search(&self, query: &str) -> Result<SearchResults, ClientError>;
    fn playlists(&self) -> Result<Vec<Playlist>, ClientError>;
    fn music_folders(&self) -> Result<Vec<MusicFolder>, ClientError>;
    fn album_tracks(&self, album_id: &str) -> Result<Vec<TrackDescriptor>, ClientError>;
    fn artist_albums(&self, artist_id: &str) -> Result<Vec<Album>, ClientError>;
    fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<TrackDescriptor>, ClientError>;
    fn random_songs(&self, folder_id: Option<&str>) -> Result<Vec<TrackDescriptor>, ClientError>;
    fn similar_songs(&self, artist_id: &str) -> Result<Vec<TrackDescriptor>, ClientError>;
    /// Tell the server a track started playing.
    fn scrobble(&self, track_id: &str) -> Result<(), ClientError>;
    /// Raw image bytes, `None` when the server has no art for `cover_id`.
    fn cover_art(&self, cover_id: &str, size: u32) -> Result<Option<Vec<u8>>, ClientError>;
    fn stream_url(&self, track_id: &str, format: &str) -> Result<String, ClientError>;
}

pub struct SubsonicClient {
    http: Client,
    config: ServerConfig,
}

impl SubsonicClient {
    pub fn new(config: ServerConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()?;

        Ok(Self { http, config })
    }

    /// `user@host` line shown when testing the connection.
    pub fn describe(&self) -> String {
        format!("{}://{}@{}", self.scheme(), self.config.username, self.config.host)
    }

    fn scheme(&self) -> &'static str {
        if self.config.ssl {
            "https"
        } else {
            "http"
        }
    }

    fn base_url(&self, endpoint: &str) -> String {
        let suffix = if uses_legacy_auth(&self.config.api) { ".view" } else { "" };
        format!("{}://{}/rest/{}{}", self.scheme(), self.config.host, endpoint, suffix)
    }

    /// Full request URL including auth and `extra` query parameters.
    pub fn endpoint_url(&self, endpoint: &str, extra: &[(&str, &str)]) -> Result<Url, ClientError> {
        let mut params: Vec<(&str, String)> = vec![("u", self.config.username.clone())];

        if uses_legacy_auth(&self.config.api) {
            params.push(("p", self.config.password.clone()));
        } else {
            let salt = new_salt();
            params.push(("t", token(&self.config.password, &salt)));
            params.push(("s", salt));
        }

        params.push(("v", self.config.api.clone()));
        params.push(("c", CLIENT_NAME.to_string()));
        params.push(("f", "json".to_string()));
        params.extend(extra.iter().map(|(k, v)| (*k, v.to_string())));

        Url::parse_with_params(&self.base_url(endpoint), &params)
            .map_err(|e| ClientError::Url(format!("{endpoint}: {e}")))
    }

    fn send(&self, endpoint: &str, extra: &[(&str, &str)]) -> Result<reqwest::blocking::Response, ClientError> {
        let url = self.endpoint_url(endpoint, extra)?;
        debug!("GET {}", self.base_url(endpoint));

        let response = self.http.get(url).send().map_err(|source| ClientError::Connection {
            url: self.base_url(endpoint),
            source,
        })?;

        if !response.status().is_success() {
            return Err(ClientError::BadStatus {
                url: self.base_url(endpoint),
                status: response.status(),
            });
        }

        Ok(response)
    }

    /// GET `endpoint` and unwrap the `subsonic-response` envelope.
    fn request(&self, endpoint: &str, extra: &[(&str, &str)]) -> Result<Option<Value>, ClientError> {
        let body = self.send(endpoint, extra)?.text()?;
        Ok(parse_envelope(endpoint, &body))
    }
}

impl MusicServer for SubsonicClient {
    fn ping(&self) -> Result<bool, ClientError> {
        Ok(self.request("ping", &[])?.is_some())
    }

    fn search(&self, query: &str) -> Result<SearchResults, ClientError> {
        Ok(self
            .request("search3", &[("query", query)])?
            .map(|body| models::object_at(&body, &["searchResult3"]))
            .unwrap_or_default())
    }

    fn playlists(&self) -> Result<Vec<Playlist>, ClientError> {
        Ok(self
            .request("getPlaylists", &[])?
            .map(|body| models::list_at(&body, &["playlists", "playlist"]))
            .unwrap_or_default())
    }

    fn music_folders(&self) -> Result<Vec<MusicFolder>, ClientError> {
        Ok(self
            .request("getMusicFolders", &[])?
            .map(|body| models::list_at(&body, &["musicFolders", "musicFolder"]))
            .unwrap_or_default())
    }

    fn album_tracks(&self, album_id: &str) -> Result<Vec<TrackDescriptor>, ClientError> {
        Ok(self
            .request("getAlbum", &[("id", album_id)])?
            .map(|body| playable(models::list_at(&body, &["album", "song"])))
            .unwrap_or_default())
    }

    fn artist_albums(&self, artist_id: &str) -> Result<Vec<Album>, ClientError> {
        Ok(self
            .request("getArtist", &[("id", artist_id)])?
            .map(|body| models::list_at(&body, &["artist", "album"]))
            .unwrap_or_default())
    }

    fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<TrackDescriptor>, ClientError> {
        Ok(self
            .request("getPlaylist", &[("id", playlist_id)])?
            .map(|body| playable(models::list_at(&body, &["playlist", "entry"])))
            .unwrap_or_default())
    }

    fn random_songs(&self, folder_id: Option<&str>) -> Result<Vec<TrackDescriptor>, ClientError> {
        let params: Vec<(&str, &str)> = folder_id.map(|id| ("musicFolderId", id)).into_iter().collect();

        Ok(self
            .request("getRandomSongs", &params)?
            .map(|body| playable(models::list_at(&body, &["randomSongs", "song"])))
            .unwrap_or_default())
    }

    fn similar_songs(&self, artist_id: &str) -> Result<Vec<TrackDescriptor>, ClientError> {
        Ok(self
            .request("getSimilarSongs2", &[("id", artist_id)])?
            .map(|body| playable(models::list_at(&body, &["similarSongs2", "song"])))
            .unwrap_or_default())
    }

    fn scrobble(&self, track_id: &str) -> Result<(), ClientError> {
        self.request("scrobble", &[("id", track_id)])?;
        Ok(())
    }

    fn cover_art(&self, cover_id: &str, size: u32) -> Result<Option<Vec<u8>>, ClientError> {
        let size = size.to_string();
        let response = self.send("getCoverArt", &[("id", cover_id), ("size", &size)])?;

        // errors come back as a JSON/XML envelope with a 200 status
        let is_envelope = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json") || ct.contains("xml"));

        if is_envelope {
            let body = response.text()?;
            parse_envelope("getCoverArt", &body);
            return Ok(None);
        }

        Ok(Some(response.bytes()?.to_vec()))
    }

    fn stream_url(&self, track_id: &str, format: &str) -> Result<String, ClientError> {
        self.endpoint_url("stream", &[("id", track_id), ("format", format)])
            .map(String::from)
    }
}

/// Drop entries the server sent without an id; they cannot be streamed.
fn playable(mut tracks: Vec<TrackDescriptor>) -> Vec<TrackDescriptor> {
    tracks.retain(|t| !t.id.is_empty());
    tracks
}

/// Unwrap `{"subsonic-response": {...}}`. A failed status or an unparseable
/// body is logged and reported as no data.
pub fn parse_envelope(endpoint: &str, body: &str) -> Option<Value> {
    let mut value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => {
            warn!("Command Failed! {endpoint} - 100 {body}");
            return None;
        }
    };

    let envelope = value.get_mut("subsonic-response").map(Value::take)?;
    let status = envelope.get("status").and_then(Value::as_str).unwrap_or("failed");

    if status != "ok" {
        let error = envelope.get("error");
        let code = error.and_then(|e| e.get("code")).map(Value::to_string).unwrap_or_default();
        let message = error
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        warn!("Command Failed! {endpoint} - {code} {message}");
        return None;
    }

    Some(envelope)
}

/// Servers older than API 1.13.0 only understand the clear-text password.
pub fn uses_legacy_auth(api: &str) -> bool {
    let mut parts: Vec<u32> = api.split('.').map(|p| p.trim().parse().unwrap_or(0)).collect();
    parts.resize(3, 0);
    parts < vec![1, 13, 0]
}

/// `md5(password + salt)` as lowercase hex.
pub fn token(password: &str, salt: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn new_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api: &str) -> ServerConfig {
        ServerConfig {
            host: "music.local:4040".to_string(),
            username: "alice".to_string(),
            password: "sesame".to_string(),
            api: api.to_string(),
            ..ServerConfig::default()
        }
    }

    fn query(url: &Url) -> Vec<(String, String)> {
        url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect()
    }

    #[test]
    fn test_token_is_salted_md5() {
        // Example from the Subsonic API documentation
        assert_eq!(token("sesame", "c19b2d"), "26719a1196d2a940705a59634eb18eab");
    }

    #[test]
    fn test_token_auth_url() {
        let client = SubsonicClient::new(config("1.16.1")).unwrap();
        let url = client.endpoint_url("getAlbum", &[("id", "42")]).unwrap();
        let params = query(&url);

        assert_eq!(url.path(), "/rest/getAlbum");
        assert_eq!(url.scheme(), "http");

        let salt = &params.iter().find(|(k, _)| k == "s").unwrap().1;
        let tok = &params.iter().find(|(k, _)| k == "t").unwrap().1;
        assert_eq!(salt.len(), SALT_LEN);
        assert!(salt.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(tok, &token("sesame", salt));
        assert!(!params.iter().any(|(k, _)| k == "p"));
        assert!(params.contains(&("c".to_string(), "subpipe".to_string())));
        assert!(params.contains(&("f".to_string(), "json".to_string())));
        assert!(params.contains(&("id".to_string(), "42".to_string())));
    }

    #[test]
    fn test_legacy_auth_url() {
        let mut cfg = config("1.12.0");
        cfg.ssl = true;
        let client = SubsonicClient::new(cfg).unwrap();
        let url = client.endpoint_url("ping", &[]).unwrap();
        let params = query(&url);

        assert_eq!(url.scheme(), "https");
        assert_eq!(url.path(), "/rest/ping.view");
        assert!(params.contains(&("p".to_string(), "sesame".to_string())));
        assert!(!params.iter().any(|(k, _)| k == "t"));
    }

    #[test]
    fn test_stream_url_carries_id_and_format() {
        let client = SubsonicClient::new(config("1.16.1")).unwrap();
        let url = Url::parse(&client.stream_url("tr-9", "mp3").unwrap()).unwrap();
        let params = query(&url);

        assert_eq!(url.path(), "/rest/stream");
        assert!(params.contains(&("id".to_string(), "tr-9".to_string())));
        assert!(params.contains(&("format".to_string(), "mp3".to_string())));
    }

    #[test]
    fn test_legacy_version_compare() {
        assert!(uses_legacy_auth("1.12.0"));
        assert!(uses_legacy_auth("1.9"));
        assert!(!uses_legacy_auth("1.13"));
        assert!(!uses_legacy_auth("1.13.0"));
        assert!(!uses_legacy_auth("1.16.1"));
        assert!(!uses_legacy_auth("2.0.0"));
    }

    #[test]
    fn test_envelope_ok() {
        let body = r#"{"subsonic-response":{"status":"ok","version":"1.16.1","randomSongs":{"song":[{"id":"1","title":"A"}]}}}"#;
        let envelope = parse_envelope("getRandomSongs", body).unwrap();
        let songs: Vec<TrackDescriptor> = models::list_at(&envelope, &["randomSongs", "song"]);
        assert_eq!(songs[0].title, "A");
    }

    #[test]
    fn test_envelope_failed_is_no_data() {
        let body = r#"{"subsonic-response":{"status":"failed","error":{"code":70,"message":"Album not found"}}}"#;
        assert!(parse_envelope("getAlbum", body).is_none());
        assert!(parse_envelope("getAlbum", "<html>nginx</html>").is_none());
        assert!(parse_envelope("getAlbum", r#"{"other":1}"#).is_none());
    }

    #[test]
    fn test_playable_drops_missing_ids() {
        let tracks = vec![
            TrackDescriptor { id: "1".to_string(), ..Default::default() },
            TrackDescriptor::default(),
        ];
        assert_eq!(playable(tracks).len(), 1);
    }
}
