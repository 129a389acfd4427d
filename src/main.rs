// subpipe - pick something from a Subsonic server and stream it
// Search/selection happens here, then the session engine takes over

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use subpipe::{
    audio,
    client::{Album, Artist, MusicServer, SearchResults, SubsonicClient},
    config::{self, Config},
    notify::{self, Announcer, CoverArtCache},
    session::{effective_randomise, InputCapture, InputState, PlaybackEngine, SessionEnd, TerminalKeys, TrackSource, POLL_INTERVAL},
    ui::{self, Selection},
};

#[derive(Parser)]
#[command(name = "subpipe", version)]
#[command(about = "Stream music from a Subsonic server through a local player")]
struct Args {
    /// Open the config file in your editor, then test the connection
    #[arg(short, long)]
    config: bool,

    /// Test the connection to the server
    #[arg(short, long)]
    test: bool,

    /// Enable developer logging (stderr + file)
    #[arg(long)]
    dev: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Endless random tracks
    Random {
        /// Music folder id to draw from
        #[arg(short = 'f', long)]
        music_folder: Option<String>,
    },
    /// Endless tracks similar to an artist
    Radio { search_term: String },
    /// Every album by an artist
    Artist {
        search_term: String,
        /// Shuffle the tracks
        #[arg(short, long)]
        randomise: bool,
    },
    Album {
        search_term: String,
        /// Shuffle the tracks
        #[arg(short, long)]
        randomise: bool,
    },
    Playlist {
        /// Shuffle the tracks
        #[arg(short, long)]
        randomise: bool,
    },
}

fn init_logging(state_dir: &Path, dev: bool) -> Result<WorkerGuard> {
    let log_dir = state_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "subpipe.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let base_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,subpipe=debug"));

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false);

    // dev mode mirrors everything to stderr
    let stderr_layer = dev.then(|| fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(base_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    Ok(guard)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let state_dir = Config::state_dir()?;
    let _guard = init_logging(&state_dir, args.dev)?;
    info!("subpipe {} starting up", env!("CARGO_PKG_VERSION"));

    let config_path = Config::config_path()?;
    let (mut config, created) = Config::load_or_create(&config_path)?;

    if created {
        println!("Welcome to subpipe! A default config was written to {}", config_path.display());
        println!("Fill in your server details, save and close the editor to continue.");
    }
    if created || args.config {
        config::edit_file(&config_path)?;
        config = Config::load_from(&config_path)?;
    }

    config.validate()?;
    let client = SubsonicClient::new(config.server.clone())?;

    if args.test || args.config {
        test_connection(&client)?;
    }

    let Some(command) = args.command else {
        if !(args.test || args.config || created) {
            use clap::CommandFactory;
            Args::command().print_help()?;
        }
        return Ok(());
    };

    let player = audio::create_player(&config)?;
    println!("Using {} for playback", player.name());

    let invert_random = config.streaming.invert_random;
    let Some((source, message)) = choose_source(&client, command, invert_random)? else {
        info!("Nothing selected");
        return Ok(());
    };

    let controls = config.streaming.controls.clone();
    ui::show_banner(&message, &controls);

    let input = InputState::new();
    let capture = InputCapture::spawn(
        Arc::clone(&input),
        TerminalKeys::new(controls.exit.clone()),
        POLL_INTERVAL,
    )?;

    let mut engine = PlaybackEngine::new(player, &client, Arc::clone(&input), controls)
        .with_format(config.streaming.format.clone())
        .with_invert_random(invert_random);

    if config.streaming.notify {
        if let Some(notifier) = notify::desktop_notifier() {
            engine = engine.with_announcer(Announcer::new(
                CoverArtCache::new(config.streaming.image_size),
                notifier,
            ));
        }
    }

    let result = engine.play_source(&source);
    drop(engine);
    capture.shutdown();

    match result? {
        SessionEnd::Completed => info!("Finished playing {}", source.mode()),
        SessionEnd::Exited => info!("Stopped by user"),
    }

    Ok(())
}

fn test_connection(client: &SubsonicClient) -> Result<()> {
    println!("Testing connection to {}", client.describe());
    if !client.ping()? {
        bail!("The server did not accept the ping. Check your credentials with: subpipe -c");
    }
    println!("Connection OK");
    Ok(())
}

/// Turn a subcommand into a track source plus the banner text, prompting as
/// needed. `None` when the user backs out.
fn choose_source(
    client: &SubsonicClient,
    command: Command,
    invert_random: bool,
) -> Result<Option<(TrackSource, String)>> {
    let suffix = |randomise: bool| ui::random_suffix(effective_randomise(randomise, invert_random));

    let chosen = match command {
        Command::Random { music_folder: Some(id) } => Some((
            TrackSource::Random { music_folder: Some(id.clone()) },
            format!("Playing random tracks from folder {id}"),
        )),
        Command::Random { music_folder: None } => choose_folder(client)?.map(|folder| {
            let message = match &folder {
                Some((_, name)) => format!("Playing random tracks from {name}"),
                None => "Playing random tracks".to_string(),
            };
            (TrackSource::Random { music_folder: folder.map(|(id, _)| id) }, message)
        }),
        Command::Radio { search_term } => search_pick(client, search_term, "Artist", |r| r.artist, |a: &Artist| a.name.clone())?
            .map(|artist| {
                (
                    TrackSource::Radio { artist_id: artist.id },
                    format!("Playing radio based on {}", artist.name),
                )
            }),
        Command::Artist { search_term, randomise } => {
            search_pick(client, search_term, "Artist", |r| r.artist, |a: &Artist| a.name.clone())?.map(|artist| {
                (
                    TrackSource::Artist { artist_id: artist.id, randomise },
                    format!("Playing {}{}", artist.name, suffix(randomise)),
                )
            })
        }
        Command::Album { search_term, randomise } => {
            search_pick(client, search_term, "Album", |r| r.album, album_label)?.map(|album| {
                (
                    TrackSource::Album { album_id: album.id.clone(), randomise },
                    format!("Playing {}{}", album_label(&album), suffix(randomise)),
                )
            })
        }
        Command::Playlist { randomise } => {
            let playlists = client.playlists()?;
            if playlists.is_empty() {
                bail!("No playlists found on the server");
            }

            let names: Vec<String> = playlists.iter().map(|p| p.name.clone()).collect();
            match ui::select("Playlist", &names, false)? {
                Selection::Item(i) => Some((
                    TrackSource::Playlist { playlist_id: playlists[i].id.clone(), randomise },
                    format!("Playing playlist {}{}", playlists[i].name, suffix(randomise)),
                )),
                _ => None,
            }
        }
    };

    Ok(chosen)
}

fn album_label(album: &Album) -> String {
    if album.artist.is_empty() {
        album.name.clone()
    } else {
        format!("{} by {}", album.name, album.artist)
    }
}

/// `Some(None)` for all folders, `Some(Some((id, name)))` for one, `None` if cancelled.
#[allow(clippy::type_complexity)]
fn choose_folder(client: &SubsonicClient) -> Result<Option<Option<(String, String)>>> {
    let folders = client.music_folders()?;
    if folders.is_empty() {
        return Ok(Some(None));
    }

    let mut names = vec!["All".to_string()];
    names.extend(folders.iter().map(|f| f.name.clone()));

    Ok(match ui::select("Music folder", &names, false)? {
        Selection::Item(0) => Some(None),
        Selection::Item(i) => Some(Some((folders[i - 1].id.clone(), folders[i - 1].name.clone()))),
        _ => None,
    })
}

/// Search and let the user pick one hit, offering to search again when
/// nothing fits.
fn search_pick<T>(
    client: &SubsonicClient,
    mut term: String,
    kind: &str,
    hits: impl Fn(SearchResults) -> Vec<T>,
    label: impl Fn(&T) -> String,
) -> Result<Option<T>> {
    loop {
        let found = hits(client.search(&term)?);
        debug!("Search for {kind} '{term}' returned {} hits", found.len());

        if found.is_empty() {
            println!("No {} found for '{term}'", kind.to_lowercase());
        } else {
            let names: Vec<String> = found.iter().map(&label).collect();
            match ui::select(kind, &names, true)? {
                Selection::Item(i) => return Ok(found.into_iter().nth(i)),
                Selection::Cancelled => return Ok(None),
                Selection::SearchAgain => {}
            }
        }

        match ui::ask("Search for")? {
            Some(next) => term = next,
            None => return Ok(None),
        }
    }
}
