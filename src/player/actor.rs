//! One task per guild owning the [`PlaybackSession`] and its voice output.
//!
//! Commands are applied strictly in arrival order. Output notifications are
//! interleaved between commands, never inside one.

use std::sync::Arc;

use tokio::{
    sync::{broadcast, mpsc, oneshot},
    time::Instant,
};
use tracing::{debug, info, warn};

use super::{
    error::SessionError,
    session::{PlaybackSession, ResumePoint, Selection},
};
use crate::{
    audio::{AudioError, AudioOutput, OutputEvent, PlayId, StartRequest, VoiceLink},
    common::types::{ChannelId, GuildId},
    protocol::{PlaybackState, PlayerEvent, RepeatMode, SessionStatus, Track, TrackEndReason},
    stats::StatsHandle,
};

const COMMAND_BUFFER: usize = 64;

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct SessionDeps {
    pub voice: Arc<dyn VoiceLink>,
    pub stats: StatsHandle,
    pub events: broadcast::Sender<PlayerEvent>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    /// The session was idle and started this track.
    Started(Track),
    /// Appended behind the current track, 1-based.
    Queued { track: Track, position: usize },
}

/// Queue contents as shown by the `queue` command.
#[derive(Debug, Clone, Default)]
pub struct QueueView {
    pub current: Option<Track>,
    pub queue: Vec<Track>,
    pub history: Vec<Track>,
    pub resume_point: Option<ResumePoint>,
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

pub(crate) enum SessionCommand {
    Connect { channel_id: ChannelId, reply: Reply<()> },
    Play { track: Track, reply: Reply<PlayOutcome> },
    Enqueue { track: Track, reply: Reply<usize> },
    Advance { reply: Reply<Option<Track>> },
    Pause { reply: Reply<Track> },
    Resume { channel_id: Option<ChannelId>, reply: Reply<Track> },
    Skip { reply: Reply<Option<Track>> },
    SkipBack { reply: Reply<Option<Track>> },
    Stop { reply: Reply<()> },
    SnapshotResumePoint { reply: Reply<Option<ResumePoint>> },
    Leave { reply: Reply<()> },
    SetRepeat { mode: RepeatMode, reply: Reply<RepeatMode> },
    ToggleRepeat { mode: RepeatMode, reply: Reply<RepeatMode> },
    Status { reply: Reply<SessionStatus> },
    View { reply: Reply<QueueView> },
}

/// Cloneable address of a running session.
#[derive(Clone)]
pub struct SessionHandle {
    guild_id: GuildId,
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn guild_id(&self) -> &GuildId {
        &self.guild_id
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| SessionError::SessionClosed(self.guild_id.clone()))?;
        rx.await
            .map_err(|_| SessionError::SessionClosed(self.guild_id.clone()))?
    }

    /// Connects the voice output to `channel_id`, moving it if it is
    /// already connected elsewhere.
    pub async fn connect(&self, channel_id: ChannelId) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Connect { channel_id, reply }).await
    }

    /// Enqueues `track` and starts playback if the session is idle.
    pub async fn play(&self, track: Track) -> Result<PlayOutcome, SessionError> {
        self.request(|reply| SessionCommand::Play { track, reply }).await
    }

    pub async fn enqueue(&self, track: Track) -> Result<usize, SessionError> {
        self.request(|reply| SessionCommand::Enqueue { track, reply }).await
    }

    /// Selects and starts the next track. `None` when the session went idle.
    pub async fn advance(&self) -> Result<Option<Track>, SessionError> {
        self.request(|reply| SessionCommand::Advance { reply }).await
    }

    pub async fn pause(&self) -> Result<Track, SessionError> {
        self.request(|reply| SessionCommand::Pause { reply }).await
    }

    /// Resumes in place, or rejoins `channel_id` (falling back to the last
    /// used channel) and restarts the resume point at its position.
    pub async fn resume(&self, channel_id: Option<ChannelId>) -> Result<Track, SessionError> {
        self.request(|reply| SessionCommand::Resume { channel_id, reply }).await
    }

    pub async fn skip(&self) -> Result<Option<Track>, SessionError> {
        self.request(|reply| SessionCommand::Skip { reply }).await
    }

    pub async fn skip_back(&self) -> Result<Option<Track>, SessionError> {
        self.request(|reply| SessionCommand::SkipBack { reply }).await
    }

    pub async fn stop(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Stop { reply }).await
    }

    /// Records the current track and position as the resume point.
    pub async fn snapshot_resume_point(&self) -> Result<Option<ResumePoint>, SessionError> {
        self.request(|reply| SessionCommand::SnapshotResumePoint { reply })
            .await
    }

    /// Tears down the voice output. Does not take a resume point; callers
    /// that want one call [`snapshot_resume_point`](Self::snapshot_resume_point)
    /// first.
    pub async fn leave(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Leave { reply }).await
    }

    pub async fn set_repeat(&self, mode: RepeatMode) -> Result<RepeatMode, SessionError> {
        self.request(|reply| SessionCommand::SetRepeat { mode, reply }).await
    }

    /// Switches to `mode`, or back to `Off` when `mode` is already active.
    pub async fn toggle_repeat(&self, mode: RepeatMode) -> Result<RepeatMode, SessionError> {
        self.request(|reply| SessionCommand::ToggleRepeat { mode, reply })
            .await
    }

    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        self.request(|reply| SessionCommand::Status { reply }).await
    }

    pub async fn view(&self) -> Result<QueueView, SessionError> {
        self.request(|reply| SessionCommand::View { reply }).await
    }
}

/// Starts the actor of `guild_id` on the current runtime.
pub fn spawn_session(guild_id: GuildId, deps: SessionDeps) -> SessionHandle {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let actor = SessionActor {
        guild_id: guild_id.clone(),
        session: PlaybackSession::new(),
        deps,
        output: None,
        output_rx: None,
        last_channel: None,
        active: None,
        active_offset: 0.0,
        last_play_id: PlayId(0),
    };
    tokio::spawn(actor.run(rx));
    SessionHandle { guild_id, tx }
}

struct SessionActor {
    guild_id: GuildId,
    session: PlaybackSession,
    deps: SessionDeps,
    output: Option<Box<dyn AudioOutput>>,
    /// Notifications of the current output. Every connection gets its own
    /// channel so nothing from an earlier connection leaks in.
    output_rx: Option<mpsc::UnboundedReceiver<OutputEvent>>,
    last_channel: Option<ChannelId>,
    /// Generation whose finish advances the queue.
    active: Option<PlayId>,
    /// Position the active source was started at.
    active_offset: f64,
    last_play_id: PlayId,
}

async fn next_output_event(
    rx: &mut Option<mpsc::UnboundedReceiver<OutputEvent>>,
) -> Option<OutputEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl SessionActor {
    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        debug!("[{}] session started", self.guild_id);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                event = next_output_event(&mut self.output_rx) => match event {
                    Some(OutputEvent::Finished(play_id)) => self.on_finished(play_id).await,
                    Some(OutputEvent::Disconnected) => self.on_disconnected(),
                    None => self.output_rx = None,
                },
            }
        }

        self.active = None;
        if let Some(mut output) = self.output.take() {
            output.disconnect().await;
        }
        debug!("[{}] session closed", self.guild_id);
    }

    async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect { channel_id, reply } => {
                let _ = reply.send(self.connect(channel_id).await);
            }
            SessionCommand::Play { track, reply } => {
                let _ = reply.send(self.play(track).await);
            }
            SessionCommand::Enqueue { track, reply } => {
                let _ = reply.send(Ok(self.session.enqueue(track)));
            }
            SessionCommand::Advance { reply } => {
                let result = match self.require_output() {
                    Ok(()) => {
                        let selection = self.session.advance(Instant::now());
                        self.start_selection(selection).await
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            SessionCommand::Pause { reply } => {
                let _ = reply.send(self.pause().await);
            }
            SessionCommand::Resume { channel_id, reply } => {
                let _ = reply.send(self.resume(channel_id).await);
            }
            SessionCommand::Skip { reply } => {
                let result = match self.session.state() {
                    PlaybackState::Idle => Err(SessionError::NothingPlaying),
                    _ => match self.require_output() {
                        Ok(()) => self.restart_sequence().await,
                        Err(e) => Err(e),
                    },
                };
                let _ = reply.send(result);
            }
            SessionCommand::SkipBack { reply } => {
                let result = match self.require_output().and_then(|()| self.session.skip_back()) {
                    Ok(()) => self.restart_sequence().await,
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            SessionCommand::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(Ok(()));
            }
            SessionCommand::SnapshotResumePoint { reply } => {
                self.session.snapshot_resume_point(Instant::now());
                let _ = reply.send(Ok(self.session.resume_point().cloned()));
            }
            SessionCommand::Leave { reply } => {
                self.leave().await;
                let _ = reply.send(Ok(()));
            }
            SessionCommand::SetRepeat { mode, reply } => {
                self.session.set_repeat_mode(mode);
                let _ = reply.send(Ok(mode));
            }
            SessionCommand::ToggleRepeat { mode, reply } => {
                let next = if self.session.repeat_mode() == mode {
                    RepeatMode::Off
                } else {
                    mode
                };
                self.session.set_repeat_mode(next);
                let _ = reply.send(Ok(next));
            }
            SessionCommand::Status { reply } => {
                let _ = reply.send(Ok(self.status(Instant::now())));
            }
            SessionCommand::View { reply } => {
                let _ = reply.send(Ok(QueueView {
                    current: self.session.current().cloned(),
                    queue: self.session.queue().iter().cloned().collect(),
                    history: self.session.history().to_vec(),
                    resume_point: self.session.resume_point().cloned(),
                }));
            }
        }
    }

    /// Commands that start audio check this before touching the queue, so a
    /// rejected command leaves queue, history and resume point as they were.
    fn require_output(&self) -> Result<(), SessionError> {
        match self.output {
            Some(_) => Ok(()),
            None => Err(SessionError::NotInVoice),
        }
    }

    async fn connect(&mut self, channel_id: ChannelId) -> Result<(), SessionError> {
        self.last_channel = Some(channel_id);

        if let Some(output) = self.output.as_mut() {
            if output.channel_id() != channel_id {
                output.move_to(channel_id).await?;
                info!("[{}] moved to channel {}", self.guild_id, channel_id);
            }
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let output = self
            .deps
            .voice
            .connect(&self.guild_id, channel_id, tx)
            .await?;
        self.output = Some(output);
        self.output_rx = Some(rx);
        info!("[{}] connected to channel {}", self.guild_id, channel_id);
        Ok(())
    }

    async fn play(&mut self, track: Track) -> Result<PlayOutcome, SessionError> {
        self.require_output()?;
        let position = self.session.enqueue(track.clone());
        if self.session.state() != PlaybackState::Idle {
            return Ok(PlayOutcome::Queued { track, position });
        }

        let selection = self.session.advance(Instant::now());
        match self.start_selection(selection).await? {
            Some(started) => Ok(PlayOutcome::Started(started)),
            None => Ok(PlayOutcome::Queued { track, position }),
        }
    }

    /// Starts the audio for `selection`. Statistics are only recorded once
    /// a freshly selected track actually started.
    async fn start_selection(&mut self, selection: Selection) -> Result<Option<Track>, SessionError> {
        let (track, fresh) = match &selection {
            Selection::Fresh(track) => (track.clone(), true),
            Selection::Replay(track) => (track.clone(), false),
            Selection::Idle => {
                self.active = None;
                debug!("[{}] queue ended", self.guild_id);
                self.emit(PlayerEvent::QueueEnd {
                    guild_id: self.guild_id.clone(),
                });
                return Ok(None);
            }
        };

        if let Err(e) = self.start_audio(&track, 0.0).await {
            self.session.abandon_current(&selection);
            warn!("[{}] failed to start '{}': {}", self.guild_id, track.title, e);
            self.emit(PlayerEvent::TrackEnd {
                guild_id: self.guild_id.clone(),
                track,
                reason: TrackEndReason::LoadFailed,
            });
            return Err(e);
        }

        if fresh {
            self.deps.stats.record_song_request(track.requested_by);
            self.deps
                .stats
                .record_song_play(&track.id, &track.title, track.requested_by);
        }

        info!("[{}] now playing '{}' ({})", self.guild_id, track.title, track.id);
        self.emit(PlayerEvent::TrackStart {
            guild_id: self.guild_id.clone(),
            track: track.clone(),
        });
        Ok(Some(track))
    }

    async fn start_audio(&mut self, track: &Track, seek_seconds: f64) -> Result<(), SessionError> {
        self.active = None;
        let Some(output) = self.output.as_mut() else {
            return Err(SessionError::NotInVoice);
        };

        let play_id = self.last_play_id.next();
        self.last_play_id = play_id;
        output
            .start(StartRequest {
                play_id,
                media: track.media_handle.clone(),
                seek_seconds,
                duration_hint: track.duration_seconds,
            })
            .await?;
        self.active = Some(play_id);
        self.active_offset = seek_seconds;
        Ok(())
    }

    /// Advances until a track starts or the session goes idle. Tracks that
    /// fail to start are dropped.
    async fn advance_until_started(&mut self) -> Result<Option<Track>, SessionError> {
        loop {
            let selection = self.session.advance(Instant::now());
            match self.start_selection(selection).await {
                Err(SessionError::Audio(AudioError::Start { .. })) => continue,
                result => return result,
            }
        }
    }

    /// Stops the running source and selects the next track.
    async fn restart_sequence(&mut self) -> Result<Option<Track>, SessionError> {
        self.stop_audio().await;
        if let Some(track) = self.session.current().cloned() {
            self.emit(PlayerEvent::TrackEnd {
                guild_id: self.guild_id.clone(),
                track,
                reason: TrackEndReason::Stopped,
            });
        }
        self.advance_until_started().await
    }

    async fn stop_audio(&mut self) {
        // Cleared first so the finish notification of the stopped source is stale.
        self.active = None;
        if let Some(output) = self.output.as_mut() {
            if let Err(e) = output.stop().await {
                warn!("[{}] failed to stop output: {}", self.guild_id, e);
            }
        }
    }

    async fn pause(&mut self) -> Result<Track, SessionError> {
        self.session.pause(Instant::now())?;
        if let Some(output) = self.output.as_mut() {
            if let Err(e) = output.pause().await {
                warn!("[{}] failed to pause output: {}", self.guild_id, e);
            }
        }
        let track = self.session.current().cloned().ok_or(SessionError::NothingPlaying)?;
        info!("[{}] paused '{}'", self.guild_id, track.title);
        Ok(track)
    }

    async fn resume(&mut self, channel_id: Option<ChannelId>) -> Result<Track, SessionError> {
        let now = Instant::now();

        if self.output.is_some() && self.session.state() == PlaybackState::Paused {
            self.session.resume_in_place(now)?;
            if let Some(output) = self.output.as_mut() {
                if let Err(e) = output.resume().await {
                    warn!("[{}] failed to resume output: {}", self.guild_id, e);
                }
            }
            let track = self.session.current().cloned().ok_or(SessionError::NothingToResume)?;
            info!("[{}] resumed '{}'", self.guild_id, track.title);
            return Ok(track);
        }

        if self.session.state() != PlaybackState::Idle || self.session.resume_point().is_none() {
            return Err(SessionError::NothingToResume);
        }

        let channel_id = channel_id
            .or(self.last_channel)
            .ok_or(SessionError::NotInVoice)?;
        self.connect(channel_id).await?;

        let Some(point) = self.session.restore(Instant::now()) else {
            return Err(SessionError::NothingToResume);
        };
        if let Err(e) = self.start_audio(&point.track, point.position).await {
            self.session.teardown();
            warn!(
                "[{}] failed to restart '{}' at {:.1}s: {}",
                self.guild_id, point.track.title, point.position, e
            );
            return Err(e);
        }
        self.session.clear_resume_point();

        info!(
            "[{}] rejoined and resumed '{}' at {:.1}s",
            self.guild_id, point.track.title, point.position
        );
        self.emit(PlayerEvent::TrackStart {
            guild_id: self.guild_id.clone(),
            track: point.track.clone(),
        });
        Ok(point.track)
    }

    async fn stop(&mut self) {
        self.stop_audio().await;
        if let Some(track) = self.session.current().cloned() {
            self.emit(PlayerEvent::TrackEnd {
                guild_id: self.guild_id.clone(),
                track,
                reason: TrackEndReason::Stopped,
            });
        }
        self.session.stop();
        info!("[{}] stopped and cleared the queue", self.guild_id);
    }

    async fn leave(&mut self) {
        self.active = None;
        if let Some(mut output) = self.output.take() {
            output.disconnect().await;
        }
        self.output_rx = None;
        self.end_current(TrackEndReason::Cleanup);
        info!("[{}] left voice", self.guild_id);
    }

    async fn on_finished(&mut self, play_id: PlayId) {
        if self.active != Some(play_id) {
            debug!("[{}] ignoring finish of stale source {}", self.guild_id, play_id);
            return;
        }

        self.active = None;
        if let Some(track) = self.session.current().cloned() {
            debug!("[{}] '{}' finished", self.guild_id, track.title);
            self.emit(PlayerEvent::TrackEnd {
                guild_id: self.guild_id.clone(),
                track,
                reason: TrackEndReason::Finished,
            });
        }

        if let Err(e) = self.advance_until_started().await {
            warn!("[{}] could not continue playback: {}", self.guild_id, e);
        }
    }

    /// The voice layer dropped us: same path as the `leave` command,
    /// snapshot included.
    fn on_disconnected(&mut self) {
        warn!("[{}] voice connection lost", self.guild_id);
        self.session.snapshot_resume_point(Instant::now());

        self.active = None;
        self.output = None;
        self.output_rx = None;
        self.end_current(TrackEndReason::Cleanup);

        self.emit(PlayerEvent::VoiceDisconnected {
            guild_id: self.guild_id.clone(),
            resumable: self.session.resume_point().is_some(),
        });
    }

    fn end_current(&mut self, reason: TrackEndReason) {
        if let Some(track) = self.session.current().cloned() {
            self.emit(PlayerEvent::TrackEnd {
                guild_id: self.guild_id.clone(),
                track,
                reason,
            });
        }
        self.session.teardown();
    }

    fn status(&self, now: Instant) -> SessionStatus {
        let mut status = SessionStatus::idle(self.guild_id.clone());
        status.state = self.session.state();
        status.repeat_mode = self.session.repeat_mode();
        status.queue_length = self.session.queue().len();
        status.connected = self.output.is_some();

        if let Some(track) = self.session.current() {
            let played = self.session.progress(now);
            status.title = Some(track.title.clone());
            status.track_id = Some(track.id.clone());
            status.thumbnail_url = Some(track.thumbnail_url.clone());
            status.requested_by = Some(track.requested_by);
            status.played_seconds = played;
            status.duration_seconds = track.duration_seconds;
            status.progress_fraction = track
                .known_duration()
                .map(|d| (played / d).clamp(0.0, 1.0))
                .unwrap_or(0.0);
            status.play_id = self.active;
            status.started_from = self.active_offset;
        }
        status
    }

    fn emit(&self, event: PlayerEvent) {
        // No subscribers is fine.
        let _ = self.deps.events.send(event);
    }
}
