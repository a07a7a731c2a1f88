mod common;

use std::time::Duration;

use common::{Harness, assert_approx, media, track};
use tokio::time::sleep;
use tunedeck::{
    audio::OutputCall,
    common::types::{ChannelId, GuildId, UserId},
    player::{PlayOutcome, SessionError},
    protocol::{PlaybackState, PlayerEvent, RepeatMode, TrackEndReason},
};

fn ids(tracks: &[tunedeck::protocol::Track]) -> Vec<&str> {
    tracks.iter().map(|t| t.id.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_sequencing_then_skip_back_reselects() {
    let h = Harness::new();
    let session = h.session("1");
    session.connect(ChannelId(10)).await.unwrap();

    let outcome = session.play(track("A", Some(100), 1)).await.unwrap();
    assert_eq!(outcome, PlayOutcome::Started(track("A", Some(100), 1)));
    let outcome = session.play(track("B", Some(200), 1)).await.unwrap();
    assert!(matches!(outcome, PlayOutcome::Queued { position: 1, .. }));

    let view = session.view().await.unwrap();
    assert_eq!(view.current.as_ref().map(|t| t.id.as_str()), Some("A"));
    assert_eq!(ids(&view.queue), vec!["B"]);
    assert_eq!(ids(&view.history), vec!["A"]);

    sleep(Duration::from_millis(100_500)).await;
    let view = session.view().await.unwrap();
    assert_eq!(view.current.as_ref().map(|t| t.id.as_str()), Some("B"));
    assert!(view.queue.is_empty());
    assert_eq!(ids(&view.history), vec!["A", "B"]);

    let restarted = session.skip_back().await.unwrap();
    assert_eq!(restarted.map(|t| t.id), Some("B".to_string()));

    // The finish of the stopped source must not advance past B.
    sleep(Duration::from_secs(1)).await;
    let status = session.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Playing);
    assert_eq!(status.track_id.as_deref(), Some("B"));
    assert_approx(status.played_seconds, 1.0);

    let view = session.view().await.unwrap();
    assert_eq!(ids(&view.history), vec!["A", "B"]);

    h.stats().read(|s| {
        assert_eq!(s.total_songs_played(), 3);
        assert_eq!(s.song("A").map(|r| r.play_count), Some(1));
        assert_eq!(s.song("B").map(|r| r.play_count), Some(2));
        assert_eq!(s.song("B").map(|r| r.listener_ids.len()), Some(1));
    });
}

#[tokio::test(start_paused = true)]
async fn test_skip_back_needs_previous_track() {
    let h = Harness::new();
    let session = h.session("1");
    session.connect(ChannelId(10)).await.unwrap();
    session.play(track("A", Some(100), 1)).await.unwrap();

    assert!(matches!(
        session.skip_back().await,
        Err(SessionError::NoPreviousTrack)
    ));
    let status = session.status().await.unwrap();
    assert_eq!(status.track_id.as_deref(), Some("A"));
}

#[tokio::test(start_paused = true)]
async fn test_skip_moves_on_and_ends_queue() {
    let h = Harness::new();
    let mut events = h.events.subscribe();
    let session = h.session("1");
    session.connect(ChannelId(10)).await.unwrap();
    session.play(track("A", Some(100), 1)).await.unwrap();
    session.play(track("B", Some(100), 2)).await.unwrap();

    let next = session.skip().await.unwrap();
    assert_eq!(next.map(|t| t.id), Some("B".to_string()));
    let next = session.skip().await.unwrap();
    assert!(next.is_none());
    assert_eq!(session.status().await.unwrap().state, PlaybackState::Idle);
    assert!(matches!(session.skip().await, Err(SessionError::NothingPlaying)));

    let mut reasons = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let PlayerEvent::TrackEnd { track, reason, .. } = event {
            reasons.push((track.id, reason));
        }
    }
    assert_eq!(
        reasons,
        vec![
            ("A".to_string(), TrackEndReason::Stopped),
            ("B".to_string(), TrackEndReason::Stopped),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_clears_and_cancels() {
    let h = Harness::new();
    let session = h.session("1");
    session.connect(ChannelId(10)).await.unwrap();
    session.play(track("A", Some(100), 1)).await.unwrap();
    session.play(track("B", Some(100), 1)).await.unwrap();
    session.set_repeat(RepeatMode::RepeatAll).await.unwrap();

    session.stop().await.unwrap();
    sleep(Duration::from_secs(500)).await;

    let status = session.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Idle);
    assert_eq!(status.repeat_mode, RepeatMode::Off);
    assert!(status.connected);
    let view = session.view().await.unwrap();
    assert!(view.queue.is_empty());
    assert!(view.history.is_empty());

    let calls = h.voice.calls(&GuildId::from("1"));
    assert_eq!(
        calls,
        vec![
            OutputCall::Connect(ChannelId(10)),
            OutputCall::Start {
                media: media("A"),
                seek_seconds: 0.0
            },
            OutputCall::Stop,
        ]
    );
    assert!(matches!(session.resume(None).await, Err(SessionError::NothingToResume)));
}

#[tokio::test(start_paused = true)]
async fn test_pause_freezes_progress_and_delays_finish() {
    let h = Harness::new();
    let session = h.session("1");
    session.connect(ChannelId(10)).await.unwrap();
    session.play(track("A", Some(100), 1)).await.unwrap();

    sleep(Duration::from_secs(10)).await;
    assert_approx(session.status().await.unwrap().played_seconds, 10.0);

    session.pause().await.unwrap();
    assert!(matches!(session.pause().await, Err(SessionError::AlreadyPaused)));
    sleep(Duration::from_secs(50)).await;

    let status = session.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Paused);
    assert_approx(status.played_seconds, 10.0);
    assert_approx(status.progress_fraction, 0.1);

    session.resume(None).await.unwrap();
    assert!(matches!(session.resume(None).await, Err(SessionError::NothingToResume)));
    sleep(Duration::from_secs(80)).await;
    let status = session.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Playing);
    assert_approx(status.played_seconds, 90.0);

    sleep(Duration::from_secs(15)).await;
    assert_eq!(session.status().await.unwrap().state, PlaybackState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_pause_preconditions() {
    let h = Harness::new();
    let session = h.session("1");
    assert!(matches!(session.pause().await, Err(SessionError::NothingPlaying)));
    assert!(matches!(session.resume(None).await, Err(SessionError::NothingToResume)));
}

#[tokio::test(start_paused = true)]
async fn test_leave_then_resume_rejoins_at_position() {
    let h = Harness::new();
    let guild = GuildId::from("1");
    let session = h.session("1");
    session.connect(ChannelId(10)).await.unwrap();
    session.play(track("A", Some(100), 1)).await.unwrap();
    sleep(Duration::from_secs(30)).await;

    let point = session.snapshot_resume_point().await.unwrap().unwrap();
    assert_eq!(point.track.id, "A");
    assert_approx(point.position, 30.0);
    session.leave().await.unwrap();

    assert!(!h.voice.is_connected(&guild));
    let status = session.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Idle);
    assert!(!status.connected);

    sleep(Duration::from_secs(1000)).await;
    let resumed = session.resume(Some(ChannelId(11))).await.unwrap();
    assert_eq!(resumed.id, "A");

    let status = session.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Playing);
    assert_approx(status.played_seconds, 30.0);
    assert!(session.view().await.unwrap().resume_point.is_none());

    let calls = h.voice.calls(&guild);
    assert_eq!(calls.last(), Some(&OutputCall::Start {
        media: media("A"),
        seek_seconds: 30.0
    }));
    assert!(calls.contains(&OutputCall::Connect(ChannelId(11))));

    sleep(Duration::from_millis(70_500)).await;
    assert_eq!(session.status().await.unwrap().state, PlaybackState::Idle);
    h.stats().read(|s| assert_eq!(s.song("A").map(|r| r.play_count), Some(1)));
}

#[tokio::test(start_paused = true)]
async fn test_commands_after_leave_keep_queue_and_resume_point() {
    let h = Harness::new();
    let session = h.session("1");
    session.connect(ChannelId(10)).await.unwrap();
    session.play(track("A", Some(100), 1)).await.unwrap();
    session.play(track("B", Some(100), 1)).await.unwrap();
    sleep(Duration::from_secs(130)).await;

    session.snapshot_resume_point().await.unwrap();
    session.leave().await.unwrap();

    assert!(matches!(session.skip_back().await, Err(SessionError::NotInVoice)));
    assert!(matches!(session.advance().await, Err(SessionError::NotInVoice)));
    assert!(matches!(session.skip().await, Err(SessionError::NothingPlaying)));
    assert!(matches!(
        session.play(track("C", Some(100), 1)).await,
        Err(SessionError::NotInVoice)
    ));

    let view = session.view().await.unwrap();
    assert!(view.queue.is_empty());
    assert_eq!(ids(&view.history), vec!["A", "B"]);
    let point = view.resume_point.unwrap();
    assert_eq!(point.track.id, "B");
    assert_approx(point.position, 30.0);

    let resumed = session.resume(None).await.unwrap();
    assert_eq!(resumed.id, "B");
    assert_approx(session.status().await.unwrap().played_seconds, 30.0);
}

#[tokio::test(start_paused = true)]
async fn test_leave_without_snapshot_cannot_resume() {
    let h = Harness::new();
    let session = h.session("1");
    session.connect(ChannelId(10)).await.unwrap();
    session.play(track("A", Some(100), 1)).await.unwrap();

    session.leave().await.unwrap();
    assert!(matches!(
        session.resume(Some(ChannelId(10))).await,
        Err(SessionError::NothingToResume)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_forced_disconnect_snapshots_and_resumes() {
    let h = Harness::new();
    let guild = GuildId::from("1");
    let mut events = h.events.subscribe();
    let session = h.session("1");
    session.connect(ChannelId(10)).await.unwrap();
    session.play(track("A", Some(100), 1)).await.unwrap();
    sleep(Duration::from_secs(20)).await;

    assert!(h.voice.drop_connection(&guild));
    loop {
        match events.recv().await.unwrap() {
            PlayerEvent::VoiceDisconnected { resumable, .. } => {
                assert!(resumable);
                break;
            }
            _ => continue,
        }
    }

    let view = session.view().await.unwrap();
    assert!(view.current.is_none());
    assert_approx(view.resume_point.map(|p| p.position).unwrap_or(-1.0), 20.0);

    // Falls back to the last channel used.
    session.resume(None).await.unwrap();
    let status = session.status().await.unwrap();
    assert!(status.connected);
    assert_approx(status.played_seconds, 20.0);
    assert_eq!(
        h.voice.calls(&guild).iter().filter(|c| **c == OutputCall::Connect(ChannelId(10))).count(),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn test_repeat_one_replays_without_recounting() {
    let h = Harness::new();
    let session = h.session("1");
    session.connect(ChannelId(10)).await.unwrap();
    session.play(track("A", Some(10), 1)).await.unwrap();
    session.play(track("B", Some(10), 1)).await.unwrap();
    assert_eq!(
        session.toggle_repeat(RepeatMode::RepeatOne).await.unwrap(),
        RepeatMode::RepeatOne
    );

    sleep(Duration::from_secs(35)).await;
    let status = session.status().await.unwrap();
    assert_eq!(status.track_id.as_deref(), Some("A"));
    assert_approx(status.played_seconds, 5.0);
    assert_eq!(status.queue_length, 1);

    assert_eq!(
        session.toggle_repeat(RepeatMode::RepeatOne).await.unwrap(),
        RepeatMode::Off
    );
    sleep(Duration::from_secs(6)).await;
    assert_eq!(session.status().await.unwrap().track_id.as_deref(), Some("B"));

    h.stats().read(|s| {
        assert_eq!(s.song("A").map(|r| r.play_count), Some(1));
        assert_eq!(s.total_songs_played(), 2);
    });
}

#[tokio::test(start_paused = true)]
async fn test_repeat_all_cycles_in_play_order() {
    let h = Harness::new();
    let session = h.session("1");
    session.connect(ChannelId(10)).await.unwrap();
    session.set_repeat(RepeatMode::RepeatAll).await.unwrap();
    for id in ["A", "B", "C"] {
        session.play(track(id, Some(10), 1)).await.unwrap();
    }

    sleep(Duration::from_secs(35)).await;
    let view = session.view().await.unwrap();
    assert_eq!(view.current.as_ref().map(|t| t.id.as_str()), Some("A"));
    assert_eq!(ids(&view.queue), vec!["B", "C"]);
    assert_eq!(ids(&view.history), vec!["A"]);

    h.stats().read(|s| assert_eq!(s.song("A").map(|r| r.play_count), Some(2)));
}

#[tokio::test(start_paused = true)]
async fn test_start_failure_records_nothing() {
    let h = Harness::new();
    let mut events = h.events.subscribe();
    let session = h.session("1");
    session.connect(ChannelId(10)).await.unwrap();
    h.voice.fail_media(media("A"));

    assert!(matches!(
        session.play(track("A", Some(10), 1)).await,
        Err(SessionError::Audio(_))
    ));
    let status = session.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Idle);
    let view = session.view().await.unwrap();
    assert!(view.queue.is_empty());
    assert!(view.history.is_empty());
    h.stats().read(|s| {
        assert_eq!(s.total_songs_played(), 0);
        assert!(s.user(UserId(1)).is_none());
    });

    let failed = std::iter::from_fn(|| events.try_recv().ok()).any(|e| {
        matches!(e, PlayerEvent::TrackEnd { reason: TrackEndReason::LoadFailed, .. })
    });
    assert!(failed);

    let outcome = session.play(track("B", Some(10), 1)).await.unwrap();
    assert!(matches!(outcome, PlayOutcome::Started(t) if t.id == "B"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_track_is_skipped_when_advancing() {
    let h = Harness::new();
    let session = h.session("1");
    session.connect(ChannelId(10)).await.unwrap();
    h.voice.fail_media(media("B"));
    for id in ["A", "B", "C"] {
        session.play(track(id, Some(10), 1)).await.unwrap();
    }

    sleep(Duration::from_secs(11)).await;
    let status = session.status().await.unwrap();
    assert_eq!(status.track_id.as_deref(), Some("C"));
}

#[tokio::test(start_paused = true)]
async fn test_play_without_voice_is_rejected() {
    let h = Harness::new();
    let session = h.session("1");

    assert!(matches!(
        session.play(track("A", Some(10), 1)).await,
        Err(SessionError::NotInVoice)
    ));
    let view = session.view().await.unwrap();
    assert!(view.current.is_none());
    assert!(view.history.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sessions_are_independent() {
    let h = Harness::new();
    let one = h.session("1");
    let two = h.session("2");
    one.connect(ChannelId(10)).await.unwrap();
    two.connect(ChannelId(20)).await.unwrap();

    one.play(track("A", Some(100), 1)).await.unwrap();
    two.play(track("B", Some(100), 2)).await.unwrap();
    one.pause().await.unwrap();

    assert_eq!(one.status().await.unwrap().state, PlaybackState::Paused);
    assert_eq!(two.status().await.unwrap().state, PlaybackState::Playing);

    let statuses = h.registry.statuses().await;
    let guilds: Vec<_> = statuses.iter().map(|s| s.guild_id.to_string()).collect();
    assert_eq!(guilds, vec!["1", "2"]);
}
