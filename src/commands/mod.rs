//! Prefix text commands and their replies.

pub mod dispatcher;
pub mod format;
pub mod reply;

pub use dispatcher::{CommandContext, Dispatcher};
pub use reply::Reply;

use crate::common::types::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play(String),
    Search(String),
    Next,
    Prev,
    Stop,
    Pause,
    Resume,
    Repeat,
    RepeatAll,
    Leave,
    Queue,
    NowPlaying,
    /// `None` means the caller; `Some(Err(raw))` an argument that is not a user.
    Stats(Option<Result<UserId, String>>),
    Leaderboard,
    Server,
    Help,
}

impl Command {
    /// Parses `content` if it starts with `prefix` and names a known
    /// command. Command names are case-insensitive.
    pub fn parse(prefix: &str, content: &str) -> Option<Self> {
        let body = content.trim().strip_prefix(prefix)?;
        let (name, args) = match body.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (body, ""),
        };

        let command = match name.to_lowercase().as_str() {
            "play" | "p" => Self::Play(args.to_string()),
            "search" => Self::Search(args.to_string()),
            "next" | "n" => Self::Next,
            "prev" => Self::Prev,
            "stop" | "s" => Self::Stop,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "repeat" | "r" => Self::Repeat,
            "repeatall" | "ra" => Self::RepeatAll,
            "leave" | "d" => Self::Leave,
            "queue" => Self::Queue,
            "np" | "now" | "nowplay" => Self::NowPlaying,
            "stats" => Self::Stats((!args.is_empty()).then(|| parse_user(args))),
            "leaderboard" | "lb" => Self::Leaderboard,
            "server" => Self::Server,
            "help" => Self::Help,
            _ => return None,
        };
        Some(command)
    }
}

/// Accepts a raw id or a mention (`<@id>`, `<@!id>`).
fn parse_user(arg: &str) -> Result<UserId, String> {
    let inner = arg
        .strip_prefix("<@")
        .and_then(|s| s.strip_suffix('>'))
        .map(|s| s.trim_start_matches('!'))
        .unwrap_or(arg);
    inner.parse().map_err(|_| arg.to_string())
}
