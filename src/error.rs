// Error taxonomy for subpipe
// Typed errors at the module seams, anyhow only at the binary edge

use std::io;
use thiserror::Error;

/// Failures talking to the Subsonic server.
///
/// Protocol-level failures (`"status": "failed"` envelopes) are not errors:
/// the client logs them and hands back empty data instead.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("A request to {url} failed: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Got a bad response from {url}: {status}")]
    BadStatus { url: String, status: reqwest::StatusCode },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Could not build request url: {0}")]
    Url(String),
}

/// Failures constructing or driving a player adapter.
#[derive(Error, Debug)]
pub enum PlayerError {
    #[error(
        "Unable to load a player matching '{requested}'.\nAvailable options are:\n{}\n\nPlease adjust your config file by running:\n  subpipe -c",
        .available.iter().map(|p| format!("  {p}")).collect::<Vec<_>>().join("\n")
    )]
    Unknown {
        requested: String,
        available: Vec<&'static str>,
    },

    #[error("Could not find {player} on your PATH.\nPlease make sure it is installed:\n  {hint}")]
    Missing { player: &'static str, hint: &'static str },

    #[error("Could not run {player}: {source}")]
    Launch {
        player: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Stream playback failed: {0}")]
    Stream(String),

    #[error("Player IO error: {0}")]
    Io(#[from] io::Error),
}

/// Failures that end a playback session abnormally.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to get more {mode} tracks")]
    NoMoreTracks { mode: &'static str },

    #[error("No songs found for {0}")]
    NoTracks(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Player(#[from] PlayerError),
}
