use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// One playable song as the session engine sees it.
///
/// `stream_url` is never sent by the server; the engine fills it in right
/// before handing the track to a player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDescriptor {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub cover_art: Option<String>,
    /// Seconds
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(skip)]
    pub stream_url: String,
}

impl TrackDescriptor {
    pub fn with_stream_url(mut self, url: String) -> Self {
        self.stream_url = url;
        self
    }

    pub fn display_line(&self) -> String {
        format!("{} by {}", self.title, self.artist)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Artist {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Album {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub song_count: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MusicFolder {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// `search3` results.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchResults {
    #[serde(default, deserialize_with = "one_or_many")]
    pub artist: Vec<Artist>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub album: Vec<Album>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub song: Vec<TrackDescriptor>,
}

/// Some servers send a lone object where a list is expected.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    OneOrMany::deserialize(deserializer).map(Vec::from)
}

/// Ids are strings in the JSON API but some servers send numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Text(String),
    Number(i64),
}

impl From<IdRepr> for String {
    fn from(value: IdRepr) -> Self {
        match value {
            IdRepr::Text(s) => s,
            IdRepr::Number(n) => n.to_string(),
        }
    }
}

fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    IdRepr::deserialize(deserializer).map(String::from)
}

fn opt_id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Option::<IdRepr>::deserialize(deserializer).map(|id| id.map(String::from))
}

/// Walk `path` inside a response body and decode the list found there.
/// Missing keys mean "no data"; undecodable data is logged and treated the same.
pub fn list_at<T: DeserializeOwned>(body: &Value, path: &[&str]) -> Vec<T> {
    let mut node = body;
    for key in path {
        match node.get(key) {
            Some(next) => node = next,
            None => return Vec::new(),
        }
    }

    match serde_json::from_value::<OneOrMany<T>>(node.clone()) {
        Ok(items) => items.into(),
        Err(e) => {
            warn!("Could not decode {}: {}", path.join("."), e);
            Vec::new()
        }
    }
}

/// Decode the object at `path`, falling back to its default.
pub fn object_at<T: DeserializeOwned + Default>(body: &Value, path: &[&str]) -> T {
    let node = path.iter().try_fold(body, |node, key| node.get(key));

    match node {
        Some(node) => serde_json::from_value(node.clone()).unwrap_or_else(|e| {
            warn!("Could not decode {}: {}", path.join("."), e);
            T::default()
        }),
        None => T::default(),
    }
}
