//! Sequencing state machine of one guild's playback.
//!
//! Pure state: no I/O happens here. Every time-dependent operation takes
//! the current instant so the owning actor decides what "now" is.

use std::{collections::VecDeque, time::Duration};

use tokio::time::Instant;

use super::error::SessionError;
use crate::protocol::{PlaybackState, RepeatMode, Track};

/// Position retained across a voice teardown so a later resume can pick up
/// where playback left off.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePoint {
    pub track: Track,
    pub position: f64,
}

/// Outcome of [`PlaybackSession::advance`].
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// RepeatOne re-selected the current track.
    Replay(Track),
    /// A track was taken from the queue.
    Fresh(Track),
    /// Nothing left to play.
    Idle,
}

#[derive(Debug, Default)]
pub struct PlaybackSession {
    queue: VecDeque<Track>,
    /// Most recent last; includes the current track once selected.
    history: Vec<Track>,
    current: Option<Track>,
    repeat_mode: RepeatMode,
    started_at: Option<Instant>,
    paused_at: Option<Instant>,
    paused_accumulated: Duration,
    resume_point: Option<ResumePoint>,
}

impl PlaybackSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PlaybackState {
        match (&self.current, self.paused_at) {
            (None, _) => PlaybackState::Idle,
            (Some(_), Some(_)) => PlaybackState::Paused,
            (Some(_), None) => PlaybackState::Playing,
        }
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn queue(&self) -> &VecDeque<Track> {
        &self.queue
    }

    pub fn history(&self) -> &[Track] {
        &self.history
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
    }

    pub fn resume_point(&self) -> Option<&ResumePoint> {
        self.resume_point.as_ref()
    }

    /// Appends to the queue and returns the 1-based queue position.
    pub fn enqueue(&mut self, track: Track) -> usize {
        self.queue.push_back(track);
        self.queue.len()
    }

    /// Selects the next track according to the repeat mode and resets the
    /// timing state for it. Any resume point is discarded.
    pub fn advance(&mut self, now: Instant) -> Selection {
        self.resume_point = None;
        loop {
            if self.repeat_mode == RepeatMode::RepeatOne {
                if let Some(track) = self.current.clone() {
                    self.reset_timing(Some(now));
                    return Selection::Replay(track);
                }
            }

            if let Some(track) = self.queue.pop_front() {
                self.history.push(track.clone());
                self.current = Some(track.clone());
                self.reset_timing(Some(now));
                return Selection::Fresh(track);
            }

            if self.repeat_mode == RepeatMode::RepeatAll && !self.history.is_empty() {
                self.queue.extend(self.history.drain(..));
                continue;
            }

            self.current = None;
            self.reset_timing(None);
            return Selection::Idle;
        }
    }

    /// Undoes a selection whose audio never started. A fresh track is
    /// dropped from the history; the session becomes idle either way.
    pub fn abandon_current(&mut self, selection: &Selection) {
        if let Selection::Fresh(track) = selection {
            if self.history.last() == Some(track) {
                self.history.pop();
            }
        }
        self.current = None;
        self.reset_timing(None);
    }

    /// Elapsed play time of the current track in seconds.
    ///
    /// Frozen while paused, never negative, and capped at the track's
    /// duration when that is known.
    pub fn progress(&self, now: Instant) -> f64 {
        let (Some(track), Some(started_at)) = (&self.current, self.started_at) else {
            return 0.0;
        };

        let end = self.paused_at.unwrap_or(now);
        let elapsed = end
            .saturating_duration_since(started_at)
            .saturating_sub(self.paused_accumulated)
            .as_secs_f64();

        match track.known_duration() {
            Some(duration) => elapsed.min(duration),
            None => elapsed,
        }
    }

    pub fn pause(&mut self, now: Instant) -> Result<(), SessionError> {
        match self.state() {
            PlaybackState::Idle => return Err(SessionError::NothingPlaying),
            PlaybackState::Paused => return Err(SessionError::AlreadyPaused),
            PlaybackState::Playing => {}
        }

        self.paused_at = Some(now);
        self.snapshot_resume_point(now);
        Ok(())
    }

    /// Resumes a paused track whose voice output is still connected.
    pub fn resume_in_place(&mut self, now: Instant) -> Result<(), SessionError> {
        let Some(paused_at) = self.paused_at.filter(|_| self.current.is_some()) else {
            return Err(SessionError::NothingToResume);
        };

        self.paused_accumulated += now.saturating_duration_since(paused_at);
        self.paused_at = None;
        Ok(())
    }

    /// Records the current track and position as the resume point. No-op
    /// when nothing is current.
    pub fn snapshot_resume_point(&mut self, now: Instant) {
        if let Some(track) = self.current.clone() {
            let position = self.progress(now);
            self.resume_point = Some(ResumePoint { track, position });
        }
    }

    /// Makes the resume point current again as if it had been playing
    /// since `now - position`. The point itself is kept until
    /// [`clear_resume_point`](Self::clear_resume_point) so a failed restart
    /// can be retried.
    pub fn restore(&mut self, now: Instant) -> Option<ResumePoint> {
        let point = self.resume_point.clone()?;
        let offset = Duration::from_secs_f64(point.position.max(0.0));

        self.current = Some(point.track.clone());
        self.started_at = Some(now.checked_sub(offset).unwrap_or(now));
        self.paused_at = None;
        self.paused_accumulated = Duration::ZERO;
        Some(point)
    }

    pub fn clear_resume_point(&mut self) {
        self.resume_point = None;
    }

    /// Moves the most recent history entry back to the front of the queue.
    /// Requires at least two history entries, the last being the current
    /// track.
    pub fn skip_back(&mut self) -> Result<(), SessionError> {
        if self.history.len() < 2 {
            return Err(SessionError::NoPreviousTrack);
        }
        if let Some(last) = self.history.pop() {
            self.queue.push_front(last);
        }
        Ok(())
    }

    /// Clears queue, history, repeat mode and any resume point.
    pub fn stop(&mut self) {
        self.queue.clear();
        self.history.clear();
        self.repeat_mode = RepeatMode::Off;
        self.current = None;
        self.resume_point = None;
        self.reset_timing(None);
    }

    /// Drops the current track after the voice output went away. Queue,
    /// history and resume point are kept; callers that want a resume point
    /// take it before calling this.
    pub fn teardown(&mut self) {
        self.current = None;
        self.reset_timing(None);
    }

    fn reset_timing(&mut self, started_at: Option<Instant>) {
        self.started_at = started_at;
        self.paused_at = None;
        self.paused_accumulated = Duration::ZERO;
    }
}
