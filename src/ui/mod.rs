// Console presentation: banner, now-playing lines, selection prompts
// Lines end in "\r\n" since the capture thread may have raw mode on

use crossterm::style::Stylize;
use fuzzy_matcher::{clangd::ClangdMatcher, FuzzyMatcher};
use std::io::{self, BufRead, Write};

use crate::client::TrackDescriptor;
use crate::session::{Controls, TransportCommand};

/// Outcome of a selection prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Item(usize),
    SearchAgain,
    Cancelled,
}

fn line(text: impl std::fmt::Display) {
    let mut stdout = io::stdout();
    // a closed stdout is not worth failing playback over
    let _ = write!(stdout, "\r{text}\r\n");
    let _ = stdout.flush();
}

/// " (random)" when the queue will be shuffled.
pub fn random_suffix(randomise: bool) -> &'static str {
    if randomise {
        " (random)"
    } else {
        ""
    }
}

pub fn banner_lines(message: &str, controls: &Controls) -> Vec<String> {
    let mut lines = vec![message.to_string(), String::new()];
    lines.extend(
        controls
            .bindings()
            .iter()
            .map(|(action, key)| format!("  {key:<4} {action}")),
    );
    lines.push(String::new());
    lines
}

pub fn show_banner(message: &str, controls: &Controls) {
    for (i, text) in banner_lines(message, controls).into_iter().enumerate() {
        if i == 0 {
            line(text.bold().cyan());
        } else {
            line(text.dark_grey());
        }
    }
}

pub fn now_playing(track: &TrackDescriptor) {
    line(format!("{} {}", "▶".green(), track.display_line().bold()));
}

pub fn transport(command: TransportCommand) {
    let label = match command {
        TransportCommand::Previous => "Previous track",
        TransportCommand::Next => "Next track",
        TransportCommand::Restart => "Restarting track",
        TransportCommand::Exit => "Exiting",
        TransportCommand::Unrecognized => return,
    };
    line(label.yellow());
}

/// Index of the best fuzzy match for `query`, ties going to the earlier item.
pub fn best_match(items: &[String], query: &str) -> Option<usize> {
    let matcher = ClangdMatcher::default();
    let mut best: Option<(usize, i64)> = None;

    for (i, item) in items.iter().enumerate() {
        // choice first, pattern second
        if let Some(score) = matcher.fuzzy_match(item, query) {
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((i, score));
            }
        }
    }

    best.map(|(i, _)| i)
}

/// Prompt on the terminal; see `select_from`.
pub fn select(prompt: &str, items: &[String], search_again: bool) -> io::Result<Selection> {
    let stdin = io::stdin();
    select_from(&mut stdin.lock(), &mut io::stdout(), prompt, items, search_again)
}

/// Numbered menu. The answer is a number, or text matched fuzzily against
/// the items. An empty answer or end of input cancels; `0` asks to search
/// again when `search_again` is set.
pub fn select_from<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    prompt: &str,
    items: &[String],
    search_again: bool,
) -> io::Result<Selection> {
    if search_again {
        writeln!(output, "  0) Search again")?;
    }
    for (i, item) in items.iter().enumerate() {
        writeln!(output, "  {}) {item}", i + 1)?;
    }

    loop {
        write!(output, "{prompt}: ")?;
        output.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            return Ok(Selection::Cancelled);
        }

        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(Selection::Cancelled);
        }

        if let Ok(n) = answer.parse::<usize>() {
            match n {
                0 if search_again => return Ok(Selection::SearchAgain),
                n if (1..=items.len()).contains(&n) => return Ok(Selection::Item(n - 1)),
                _ => {
                    writeln!(output, "No entry {n}")?;
                    continue;
                }
            }
        }

        match best_match(items, answer) {
            Some(i) => {
                writeln!(output, "-> {}", items[i])?;
                return Ok(Selection::Item(i));
            }
            None => writeln!(output, "Nothing matches '{answer}'")?,
        }
    }
}

/// Free-text question; `None` on empty answer or end of input.
pub fn ask(prompt: &str) -> io::Result<Option<String>> {
    let mut stdout = io::stdout();
    write!(stdout, "{prompt}: ")?;
    stdout.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    let answer = answer.trim();
    Ok((!answer.is_empty()).then(|| answer.to_string()))
}
