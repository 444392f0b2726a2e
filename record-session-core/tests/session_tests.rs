use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use record_session_core::capture::tone::ToneStats;
use record_session_core::{
    AudioFormat, Event, RecordConfig, RecordError, RecordSession, RecordState, RecordingStore,
    SessionEvent, SessionOptions, SessionSubscription, ToneBackend, ToneOptions,
};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

fn session_with(
    tmp: &TempDir,
    config: RecordConfig,
    options: ToneOptions,
) -> (RecordSession<ToneBackend>, Arc<ToneStats>) {
    let backend = ToneBackend::new(options);
    let stats = backend.stats();
    let session = RecordSession::new(
        backend,
        config,
        SessionOptions {
            meter_interval: Duration::from_millis(5),
            ..SessionOptions::with_storage_dir(tmp.path())
        },
    );
    (session, stats)
}

fn wait_for_recording(sub: &SessionSubscription) {
    loop {
        match sub.recv_timeout(WAIT) {
            Ok(Event::Next(RecordState::Recording { .. })) => return,
            Ok(event) if event.is_terminal() => panic!("session ended early: {:?}", event),
            Ok(_) => {}
            Err(e) => panic!("no recording state: {e}"),
        }
    }
}

/// Start the session and block until capture is running.
fn start_recording(session: &RecordSession<ToneBackend>) {
    let waiter = session.subscribe();
    session.start();
    wait_for_recording(&waiter);
}

fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Drain the stream and check it is a legal walk ending in one terminal event.
fn drain_checked(sub: &SessionSubscription) -> Vec<SessionEvent> {
    let events: Vec<SessionEvent> = sub.iter().collect();
    let mut state = RecordState::Idle;
    let mut terminals = 0;

    for event in &events {
        assert_eq!(terminals, 0, "event after terminal: {:?}", event);
        match event {
            Event::Next(next) => {
                assert!(state.can_transition_to(next) || *next == state, "{state} -> {next}");
                state = next.clone();
            }
            Event::Error(error) => {
                assert!(state.can_transition_to(&RecordState::Failed(error.clone())));
                terminals += 1;
            }
            Event::Completed => {
                assert!(state.is_final());
                terminals += 1;
            }
        }
    }
    assert_eq!(terminals, 1);
    events
}

fn states(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Next(RecordState::Recording { .. }) => None,
            Event::Next(state) => Some(state.to_string()),
            Event::Error(error) => Some(format!("error: {error}")),
            Event::Completed => Some("completed".into()),
        })
        .collect()
}

fn saw_recording(events: &[SessionEvent]) -> bool {
    events
        .iter()
        .any(|event| matches!(event, Event::Next(RecordState::Recording { .. })))
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[test]
fn finish_while_recording_keeps_file() {
    let tmp = TempDir::new().unwrap();
    let (session, stats) = session_with(&tmp, RecordConfig::default(), ToneOptions::default());
    let sub = session.subscribe();

    start_recording(&session);
    thread::sleep(Duration::from_millis(50));
    session.finish();

    assert_eq!(session.state(), RecordState::Recorded);
    assert_eq!(stats.released(), 1);
    assert!(file_len(session.url()) > 44);

    let events = drain_checked(&sub);
    assert_eq!(states(&events), ["Preparing", "Recorded", "completed"]);

    let reader = hound::WavReader::open(session.url()).unwrap();
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.spec().sample_rate, 44_100);
    assert!(reader.duration() > 0);
}

#[test]
fn cancel_while_preparing_never_records_and_leaves_no_file() {
    let tmp = TempDir::new().unwrap();
    let (session, stats) = session_with(
        &tmp,
        RecordConfig::default(),
        ToneOptions {
            prepare_delay: Duration::from_millis(150),
            ..Default::default()
        },
    );
    let sub = session.subscribe();

    session.start();
    assert_eq!(session.state(), RecordState::Preparing);
    session.cancel();
    assert_eq!(session.state(), RecordState::Cancelled);

    let events = drain_checked(&sub);
    assert!(!saw_recording(&events));
    assert_eq!(states(&events), ["Preparing", "Cancelled", "completed"]);

    // The late preparation result is released and its file removed.
    assert!(wait_until(|| stats.released() == 1 && !session.url().exists()));
    assert_eq!(session.state(), RecordState::Cancelled);
}

#[test]
fn cancel_while_recording_deletes_file() {
    let tmp = TempDir::new().unwrap();
    let (session, stats) = session_with(&tmp, RecordConfig::default(), ToneOptions::default());
    let sub = session.subscribe();

    start_recording(&session);
    assert!(session.url().exists());
    session.cancel();

    assert_eq!(session.state(), RecordState::Cancelled);
    assert!(!session.url().exists());
    assert_eq!(stats.released(), 1);

    let events = drain_checked(&sub);
    assert_eq!(states(&events), ["Preparing", "Cancelled", "completed"]);
}

#[test]
fn finish_while_preparing_cancels() {
    let tmp = TempDir::new().unwrap();
    let (session, _stats) = session_with(
        &tmp,
        RecordConfig::default(),
        ToneOptions {
            prepare_delay: Duration::from_millis(100),
            ..Default::default()
        },
    );
    let sub = session.subscribe();

    session.start();
    session.finish();

    assert_eq!(session.state(), RecordState::Cancelled);
    let events = drain_checked(&sub);
    assert!(!saw_recording(&events));
    assert_eq!(states(&events), ["Preparing", "Cancelled", "completed"]);
}

#[test]
fn start_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let (session, stats) = session_with(&tmp, RecordConfig::default(), ToneOptions::default());
    let sub = session.subscribe();
    let waiter = session.subscribe();

    session.start();
    session.start();
    wait_for_recording(&waiter);
    session.start();
    session.finish();

    assert_eq!(stats.opened(), 1);
    let events = drain_checked(&sub);
    assert_eq!(states(&events), ["Preparing", "Recorded", "completed"]);
}

#[test]
fn commands_after_terminal_are_noops() {
    let tmp = TempDir::new().unwrap();
    let (session, stats) = session_with(&tmp, RecordConfig::default(), ToneOptions::default());
    let sub = session.subscribe();

    start_recording(&session);
    session.finish();
    let size = file_len(session.url());

    session.cancel();
    session.start();
    session.finish();

    assert_eq!(session.state(), RecordState::Recorded);
    assert_eq!(stats.opened(), 1);
    assert!(session.url().exists());
    assert_eq!(file_len(session.url()), size);
    drain_checked(&sub);
}

#[test]
fn idle_commands_are_noops() {
    let tmp = TempDir::new().unwrap();
    let (session, stats) = session_with(&tmp, RecordConfig::default(), ToneOptions::default());
    let sub = session.subscribe();

    session.cancel();
    session.finish();

    assert_eq!(session.state(), RecordState::Idle);
    assert_eq!(stats.opened(), 0);
    assert!(sub.try_recv().is_none());
}

#[test]
fn meter_samples_match_channel_count() {
    for channels in [1u16, 2] {
        let tmp = TempDir::new().unwrap();
        let config = RecordConfig {
            channels,
            ..Default::default()
        };
        let (session, _stats) = session_with(&tmp, config, ToneOptions::default());
        let sub = session.subscribe();

        start_recording(&session);
        thread::sleep(Duration::from_millis(60));
        session.finish();

        let events = drain_checked(&sub);
        let samples: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                Event::Next(state) => state.meters().cloned(),
                _ => None,
            })
            .collect();
        // Tick 0 plus at least one poller tick.
        assert!(samples.len() >= 2, "only {} samples", samples.len());
        assert!(samples.iter().all(|s| s.channels() == channels as usize));
    }
}

#[test]
fn encoder_fault_fails_session() {
    let tmp = TempDir::new().unwrap();
    let (session, stats) = session_with(
        &tmp,
        RecordConfig::default(),
        ToneOptions {
            fail_after: Some(Duration::from_millis(30)),
            ..Default::default()
        },
    );
    let sub = session.subscribe();

    session.start();
    let events = drain_checked(&sub);

    assert!(saw_recording(&events));
    assert_eq!(
        events.last(),
        Some(&Event::Error(RecordError::Encoding("synthetic encoder fault".into())))
    );
    assert!(matches!(session.state(), RecordState::Failed(RecordError::Encoding(_))));
    assert!(wait_until(|| stats.released() == 1));
}

#[test]
fn open_failure_fails_synchronously() {
    let tmp = TempDir::new().unwrap();
    let (session, _stats) = session_with(
        &tmp,
        RecordConfig::default(),
        ToneOptions {
            open_error: Some(RecordError::InitializationFailure("no device".into())),
            ..Default::default()
        },
    );
    let sub = session.subscribe();

    session.start();
    assert_eq!(
        session.state(),
        RecordState::Failed(RecordError::InitializationFailure("no device".into()))
    );
    assert!(!session.url().exists());

    let events = drain_checked(&sub);
    assert_eq!(
        states(&events),
        ["Preparing", "error: failed to initiate recording: no device"]
    );
}

#[test]
fn lossless_is_rejected_by_tone_backend() {
    let tmp = TempDir::new().unwrap();
    let config = RecordConfig {
        format: AudioFormat::Lossless,
        ..Default::default()
    };
    let (session, _stats) = session_with(&tmp, config, ToneOptions::default());

    assert_eq!(session.url().extension().unwrap(), "flac");
    session.start();
    assert!(matches!(
        session.state(),
        RecordState::Failed(RecordError::InitializationFailure(_))
    ));
}

#[test]
fn prepare_failure_fails_session() {
    let tmp = TempDir::new().unwrap();
    let (session, _stats) = session_with(
        &tmp,
        RecordConfig::default(),
        ToneOptions {
            prepare_error: Some(RecordError::UndefinedCaptureError),
            ..Default::default()
        },
    );
    let sub = session.subscribe();

    session.start();
    let events = drain_checked(&sub);

    assert!(!saw_recording(&events));
    assert_eq!(events.last(), Some(&Event::Error(RecordError::UndefinedCaptureError)));
}

#[test]
fn capture_finishing_on_its_own_records() {
    let tmp = TempDir::new().unwrap();
    let (session, stats) = session_with(
        &tmp,
        RecordConfig::default(),
        ToneOptions {
            stop_after: Some(Duration::from_millis(40)),
            ..Default::default()
        },
    );
    let sub = session.subscribe();

    session.start();
    let events = drain_checked(&sub);

    assert_eq!(states(&events), ["Preparing", "Recorded", "completed"]);
    assert!(wait_until(|| stats.released() == 1));
    assert!(file_len(session.url()) > 44);
}

#[test]
fn every_subscriber_sees_the_same_states() {
    let tmp = TempDir::new().unwrap();
    let (session, _stats) = session_with(&tmp, RecordConfig::default(), ToneOptions::default());
    let first = session.subscribe();
    let second = session.subscribe();
    let disposed = session.subscribe();
    disposed.dispose();

    start_recording(&session);
    session.finish();

    let from_first = drain_checked(&first);
    let from_second = drain_checked(&second);
    assert_eq!(states(&from_first), ["Preparing", "Recorded", "completed"]);
    assert_eq!(states(&from_first), states(&from_second));
}

#[test]
fn purge_then_record_in_clean_directory() {
    let tmp = TempDir::new().unwrap();
    let store = RecordingStore::new(tmp.path().join("Recordings"));
    store.ensure_dir().unwrap();
    fs::write(store.dir().join("stale.wav"), b"old").unwrap();
    fs::write(store.dir().join("stale.flac"), b"old").unwrap();

    assert_eq!(store.purge_stale_files(), 2);

    let backend = ToneBackend::default();
    let session = RecordSession::new(
        backend,
        RecordConfig::default(),
        SessionOptions::with_storage_dir(store.dir()),
    );
    start_recording(&session);
    session.finish();

    let remaining: Vec<_> = fs::read_dir(store.dir()).unwrap().flatten().collect();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].path(), session.url());

    let info = session.recording_info().unwrap();
    assert_eq!(info.size_bytes, file_len(session.url()));
}

#[test]
fn storage_directory_is_created_on_start() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("nested").join("Recordings");
    let session = RecordSession::new(
        ToneBackend::default(),
        RecordConfig::default(),
        SessionOptions::with_storage_dir(&dir),
    );

    start_recording(&session);
    session.cancel();

    assert!(dir.is_dir());
    assert!(!session.url().exists());
}
