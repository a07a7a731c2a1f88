//! In-process voice output that plays nothing and keeps time instead.
//!
//! A track "plays" for its nominal duration and then reports `Finished`,
//! honouring pause, resume, seek and stop. Used by the headless binary and
//! by tests, which can also inspect the calls made, fail specific media and
//! simulate the remote side dropping the connection.

use std::{collections::HashSet, sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::{task::JoinHandle, time::Instant};
use tracing::debug;

use super::output::{AudioError, AudioOutput, OutputEvent, OutputEvents, PlayId, StartRequest, VoiceLink};
use crate::{
    common::types::{ChannelId, GuildId},
    protocol::tracks::MediaHandle,
};

/// Call recorded by a [`ClockVoice`] output.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputCall {
    Connect(ChannelId),
    Move(ChannelId),
    Start { media: MediaHandle, seek_seconds: f64 },
    Pause,
    Resume,
    Stop,
    Disconnect,
}

#[derive(Default)]
struct ClockShared {
    calls: Mutex<Vec<(GuildId, OutputCall)>>,
    live: DashMap<GuildId, OutputEvents>,
    failing: Mutex<HashSet<MediaHandle>>,
}

impl ClockShared {
    fn record(&self, guild_id: &GuildId, call: OutputCall) {
        self.calls.lock().push((guild_id.clone(), call));
    }
}

#[derive(Clone, Default)]
pub struct ClockVoice {
    shared: Arc<ClockShared>,
}

impl ClockVoice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls made by the output of `guild_id`, oldest first.
    pub fn calls(&self, guild_id: &GuildId) -> Vec<OutputCall> {
        self.shared
            .calls
            .lock()
            .iter()
            .filter(|(g, _)| g == guild_id)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Makes every later `start` of `media` fail.
    pub fn fail_media(&self, media: MediaHandle) {
        self.shared.failing.lock().insert(media);
    }

    pub fn is_connected(&self, guild_id: &GuildId) -> bool {
        self.shared.live.contains_key(guild_id)
    }

    /// Simulates the remote side dropping the connection of `guild_id`.
    pub fn drop_connection(&self, guild_id: &GuildId) -> bool {
        match self.shared.live.remove(guild_id) {
            Some((_, events)) => events.send(OutputEvent::Disconnected).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl VoiceLink for ClockVoice {
    async fn connect(
        &self,
        guild_id: &GuildId,
        channel_id: ChannelId,
        events: OutputEvents,
    ) -> Result<Box<dyn AudioOutput>, AudioError> {
        self.shared.record(guild_id, OutputCall::Connect(channel_id));
        self.shared.live.insert(guild_id.clone(), events.clone());
        debug!("[{}] clock output connected to {}", guild_id, channel_id);

        Ok(Box::new(ClockOutput {
            guild_id: guild_id.clone(),
            channel_id,
            events,
            shared: self.shared.clone(),
            current: None,
        }))
    }
}

struct Running {
    play_id: PlayId,
    /// `None` when the duration is unknown: plays until stopped.
    remaining: Option<Duration>,
    resumed_at: Instant,
    paused: bool,
    timer: Option<JoinHandle<()>>,
}

impl Running {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct ClockOutput {
    guild_id: GuildId,
    channel_id: ChannelId,
    events: OutputEvents,
    shared: Arc<ClockShared>,
    current: Option<Running>,
}

impl ClockOutput {
    fn spawn_timer(&self, play_id: PlayId, remaining: Option<Duration>) -> Option<JoinHandle<()>> {
        let remaining = remaining?;
        let events = self.events.clone();
        Some(tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            let _ = events.send(OutputEvent::Finished(play_id));
        }))
    }
}

#[async_trait]
impl AudioOutput for ClockOutput {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn move_to(&mut self, channel_id: ChannelId) -> Result<(), AudioError> {
        self.shared.record(&self.guild_id, OutputCall::Move(channel_id));
        self.channel_id = channel_id;
        Ok(())
    }

    async fn start(&mut self, request: StartRequest) -> Result<(), AudioError> {
        self.shared.record(
            &self.guild_id,
            OutputCall::Start {
                media: request.media.clone(),
                seek_seconds: request.seek_seconds,
            },
        );

        if let Some(mut previous) = self.current.take() {
            previous.cancel_timer();
        }

        if self.shared.failing.lock().contains(&request.media) {
            return Err(AudioError::Start {
                media: request.media,
                reason: "source refused to start".into(),
            });
        }

        let remaining = request
            .duration_hint
            .map(|d| Duration::from_secs_f64((d as f64 - request.seek_seconds.max(0.0)).max(0.0)));
        let timer = self.spawn_timer(request.play_id, remaining);
        self.current = Some(Running {
            play_id: request.play_id,
            remaining,
            resumed_at: Instant::now(),
            paused: false,
            timer,
        });
        Ok(())
    }

    async fn pause(&mut self) -> Result<(), AudioError> {
        self.shared.record(&self.guild_id, OutputCall::Pause);
        if let Some(run) = self.current.as_mut().filter(|r| !r.paused) {
            run.cancel_timer();
            let played = run.resumed_at.elapsed();
            run.remaining = run.remaining.map(|r| r.saturating_sub(played));
            run.paused = true;
        }
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), AudioError> {
        self.shared.record(&self.guild_id, OutputCall::Resume);
        let pending = match self.current.as_ref() {
            Some(run) if run.paused => Some((run.play_id, run.remaining)),
            _ => None,
        };
        if let Some((play_id, remaining)) = pending {
            let timer = self.spawn_timer(play_id, remaining);
            if let Some(run) = self.current.as_mut() {
                run.timer = timer;
                run.resumed_at = Instant::now();
                run.paused = false;
            }
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), AudioError> {
        self.shared.record(&self.guild_id, OutputCall::Stop);
        if let Some(mut run) = self.current.take() {
            run.cancel_timer();
            let _ = self.events.send(OutputEvent::Finished(run.play_id));
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.shared.record(&self.guild_id, OutputCall::Disconnect);
        if let Some(mut run) = self.current.take() {
            run.cancel_timer();
        }
        self.shared.live.remove(&self.guild_id);
    }
}

impl Drop for ClockOutput {
    fn drop(&mut self) {
        if let Some(run) = self.current.as_mut() {
            run.cancel_timer();
        }
    }
}
