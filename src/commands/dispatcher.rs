use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::{
    Command,
    format::fmt_time,
    reply::Reply,
};
use crate::{
    common::types::{ChannelId, GuildId, UserId},
    monitoring::HostMonitor,
    player::{PlayOutcome, SessionError, SessionHandle, SessionRegistry},
    protocol::{RepeatMode, Track},
    sources::TrackResolver,
};

const LEADERBOARD_SIZE: usize = 10;
const QUEUE_TEXT_LIMIT: usize = 2000;

const HELP_TEXT: &str = "\
**Play**
{p}play or {p}p
{p}np / {p}now / {p}nowplay
{p}search
{p}queue

**Control**
{p}next / {p}n
{p}prev
{p}pause / {p}resume
{p}stop / {p}s
{p}repeat / {p}r
{p}repeatall / {p}ra

**Voice**
{p}leave / {p}d

**Stats**
{p}server
{p}stats
{p}leaderboard / {p}lb";

/// Who issued a command, and where they are.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub guild_id: GuildId,
    pub user_id: UserId,
    /// Voice channel the caller is in, if any.
    pub voice_channel: Option<ChannelId>,
}

/// Routes parsed commands to sessions, the resolver and the stats store.
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
    resolver: Arc<dyn TrackResolver>,
    host: Arc<HostMonitor>,
    prefix: String,
    search_limit: usize,
    /// Last `search` results per user, selectable with `play <n>`.
    search_results: DashMap<UserId, Vec<Track>>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<SessionRegistry>,
        resolver: Arc<dyn TrackResolver>,
        host: Arc<HostMonitor>,
        prefix: impl Into<String>,
        search_limit: usize,
    ) -> Self {
        Self {
            registry,
            resolver,
            host,
            prefix: prefix.into(),
            search_limit,
            search_results: DashMap::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Handles one chat message. `None` when it is not a command.
    pub async fn dispatch(&self, ctx: &CommandContext, content: &str) -> Option<Reply> {
        let command = Command::parse(&self.prefix, content)?;
        debug!("[{}] {} issued {:?}", ctx.guild_id, ctx.user_id, command);
        Some(self.execute(ctx, command).await)
    }

    pub async fn execute(&self, ctx: &CommandContext, command: Command) -> Reply {
        let result = match command {
            Command::Play(query) => self.play(ctx, &query).await,
            Command::Search(query) => self.search(ctx, &query).await,
            Command::Next => self.next(ctx).await,
            Command::Prev => self.prev(ctx).await,
            Command::Stop => self.stop(ctx).await,
            Command::Pause => self.pause(ctx).await,
            Command::Resume => self.resume(ctx).await,
            Command::Repeat => self.toggle_repeat(ctx, RepeatMode::RepeatOne).await,
            Command::RepeatAll => self.toggle_repeat(ctx, RepeatMode::RepeatAll).await,
            Command::Leave => self.leave(ctx).await,
            Command::Queue => self.queue(ctx).await,
            Command::NowPlaying => self.now_playing(ctx).await,
            Command::Stats(target) => Ok(self.stats(ctx, target)),
            Command::Leaderboard => Ok(self.leaderboard()),
            Command::Server => Ok(self.server()),
            Command::Help => Ok(Reply::new(
                "📘 Commands",
                HELP_TEXT.replace("{p}", &self.prefix),
            )),
        };

        result.unwrap_or_else(|e| {
            if !e.is_precondition() {
                warn!("[{}] command failed: {}", ctx.guild_id, e);
            }
            Reply::error(e.to_string())
        })
    }

    fn session(&self, ctx: &CommandContext) -> SessionHandle {
        self.registry.get_or_create(&ctx.guild_id)
    }

    async fn play(&self, ctx: &CommandContext, query: &str) -> Result<Reply, SessionError> {
        let channel = ctx.voice_channel.ok_or(SessionError::NotInVoice)?;
        if query.is_empty() {
            return Ok(Reply::error(format!("Usage: `{}play <query>`", self.prefix)));
        }

        let session = self.session(ctx);
        session.connect(channel).await?;

        let track = match self.pick_search_result(ctx.user_id, query) {
            Some(track) => track,
            None => match self.resolver.resolve(query, ctx.user_id).await {
                Ok(track) => track,
                Err(e) => {
                    debug!("[{}] resolve '{}' failed: {}", ctx.guild_id, query, e);
                    return Ok(Reply::error(e.to_string()));
                }
            },
        };

        Ok(match session.play(track).await? {
            PlayOutcome::Started(track) => now_playing_card(&track),
            PlayOutcome::Queued { track, position } => Reply::new(
                "➕ Added to Queue",
                format!("**{}**\nPosition: `{}`", track.title, position),
            ),
        })
    }

    /// `play <n>` picks the n-th result of the caller's last search.
    fn pick_search_result(&self, user_id: UserId, query: &str) -> Option<Track> {
        let index = query.parse::<usize>().ok()?.checked_sub(1)?;
        let results = self.search_results.get(&user_id)?;
        let mut track = results.get(index)?.clone();
        track.requested_by = user_id;
        Some(track)
    }

    async fn search(&self, ctx: &CommandContext, query: &str) -> Result<Reply, SessionError> {
        if query.is_empty() {
            return Ok(Reply::error(format!("Usage: `{}search <query>`", self.prefix)));
        }

        let results = match self
            .resolver
            .search(query, ctx.user_id, self.search_limit)
            .await
        {
            Ok(results) => results,
            Err(e) => return Ok(Reply::error(e.to_string())),
        };
        if results.is_empty() {
            return Ok(Reply::new("⚠️ Not found", ""));
        }

        let lines: Vec<String> = results
            .iter()
            .enumerate()
            .map(|(i, t)| format!("**{}.** {}", i + 1, t.title))
            .collect();
        self.search_results.insert(ctx.user_id, results);

        Ok(Reply::new(
            "🎶 Results",
            format!(
                "{}\n\nUse `{}play 1` to select.",
                lines.join("\n"),
                self.prefix
            ),
        ))
    }

    async fn next(&self, ctx: &CommandContext) -> Result<Reply, SessionError> {
        Ok(match self.session(ctx).skip().await? {
            Some(track) => now_playing_card(&track),
            None => Reply::new("⏭️ Skipped", "Queue ended."),
        })
    }

    async fn prev(&self, ctx: &CommandContext) -> Result<Reply, SessionError> {
        Ok(match self.session(ctx).skip_back().await? {
            Some(track) => now_playing_card(&track),
            None => Reply::new("⏮️ Previous", "Queue ended."),
        })
    }

    async fn stop(&self, ctx: &CommandContext) -> Result<Reply, SessionError> {
        self.session(ctx).stop().await?;
        Ok(Reply::new("🛑 Stopped", "Queue cleared."))
    }

    async fn pause(&self, ctx: &CommandContext) -> Result<Reply, SessionError> {
        let track = self.session(ctx).pause().await?;
        Ok(Reply::new("⏸️ Paused", format!("**{}**", track.title)))
    }

    async fn resume(&self, ctx: &CommandContext) -> Result<Reply, SessionError> {
        let track = self.session(ctx).resume(ctx.voice_channel).await?;
        Ok(Reply::new("▶️ Resumed", format!("**{}**", track.title)))
    }

    async fn toggle_repeat(&self, ctx: &CommandContext, mode: RepeatMode) -> Result<Reply, SessionError> {
        let now = self.session(ctx).toggle_repeat(mode).await?;
        let title = match mode {
            RepeatMode::RepeatAll => "🔂 Repeat All",
            _ => "🔁 Repeat One",
        };
        let state = if now == mode { "ON" } else { "OFF" };
        Ok(Reply::new(title, format!("**{}**", state)))
    }

    /// Takes the resume point before tearing down, so `resume` can rejoin.
    async fn leave(&self, ctx: &CommandContext) -> Result<Reply, SessionError> {
        let Some(session) = self.registry.get(&ctx.guild_id) else {
            return Ok(Reply::new("ℹ️ Not connected", ""));
        };
        if !session.status().await?.connected {
            return Ok(Reply::new("ℹ️ Not connected", ""));
        }

        session.snapshot_resume_point().await?;
        session.leave().await?;
        Ok(Reply::new("👋 Left Voice", ""))
    }

    async fn queue(&self, ctx: &CommandContext) -> Result<Reply, SessionError> {
        let view = self.session(ctx).view().await?;
        if view.queue.is_empty() {
            return Ok(Reply::new("📜 Queue", "Empty."));
        }

        let mut text = String::new();
        for (i, track) in view.queue.iter().enumerate() {
            text.push_str(&format!("**{}.** {}\n", i + 1, track.title));
        }
        Ok(Reply::new("📜 Queue", truncate_chars(&text, QUEUE_TEXT_LIMIT)))
    }

    async fn now_playing(&self, ctx: &CommandContext) -> Result<Reply, SessionError> {
        let status = self.session(ctx).status().await?;
        Ok(Reply::now_playing(&status))
    }

    fn stats(&self, ctx: &CommandContext, target: Option<Result<UserId, String>>) -> Reply {
        let user_id = match target {
            None => ctx.user_id,
            Some(Ok(user_id)) => user_id,
            Some(Err(raw)) => return Reply::error(format!("Unknown user '{}'.", raw)),
        };
        let summary = self.registry.stats().read(|s| s.user_summary(user_id));

        Reply::new(
            "📈 Stats",
            format!(
                "User: {}\nTime listened: **{}**\nUnique songs listened: **{}**\nSongs requested: **{}**",
                user_id.mention(),
                fmt_time(summary.time_seconds),
                summary.unique_songs,
                summary.songs_requested
            ),
        )
    }

    fn leaderboard(&self) -> Reply {
        let overview = self.registry.stats().read(|s| s.overview(LEADERBOARD_SIZE));

        let user_lines: Vec<String> = overview
            .top_users
            .iter()
            .enumerate()
            .map(|(i, u)| {
                format!(
                    "**{}.** {} — {} • {} songs",
                    i + 1,
                    u.user_id.mention(),
                    fmt_time(u.time_seconds),
                    u.songs_requested
                )
            })
            .collect();
        let song_lines: Vec<String> = overview
            .top_songs
            .iter()
            .enumerate()
            .map(|(i, s)| format!("**{}.** {} — {} unique listeners", i + 1, s.title, s.unique_listeners))
            .collect();

        let or_no_data = |lines: Vec<String>| {
            if lines.is_empty() {
                "_no data_".to_string()
            } else {
                lines.join("\n")
            }
        };

        Reply::new(
            "🏆 Leaderboard",
            format!(
                "**Top Users (Time Listened):**\n{}\n\n**Top Songs (Unique Listeners):**\n{}",
                or_no_data(user_lines),
                or_no_data(song_lines)
            ),
        )
    }

    fn server(&self) -> Reply {
        let host = self.host.snapshot();
        let (songs, seconds) = self
            .registry
            .stats()
            .read(|s| (s.total_songs_played(), s.total_play_seconds()));
        let gb = |bytes: u64| bytes as f64 / 1e9;

        let mut desc = format!(
            "Uptime: **{}**\nRAM: **{:.2} GB total**, **{:.2} GB used**, **{:.2} GB free**\nLoad avg: **{:.2} {:.2} {:.2}**\n",
            fmt_time(host.uptime_seconds as f64),
            gb(host.ram_total),
            gb(host.ram_used),
            gb(host.ram_free),
            host.load_1m,
            host.load_5m,
            host.load_15m,
        );
        if let Some(temp) = host.cpu_temperature {
            desc.push_str(&format!("CPU temp: **{:.1}°C**\n", temp));
        }
        desc.push_str(&format!(
            "Music time: **{}**\nSongs played: **{}**",
            fmt_time(seconds),
            songs
        ));

        Reply::new("🖥️ Server", desc)
    }
}

fn now_playing_card(track: &Track) -> Reply {
    Reply::new(
        "▶️ Now Playing",
        format!(
            "**{}**\nRequested by {}",
            track.title,
            track.requested_by.mention()
        ),
    )
    .with_thumbnail(track.thumbnail_url.clone())
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}
