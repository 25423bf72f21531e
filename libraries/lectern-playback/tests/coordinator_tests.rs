//! Backend switch coordinator tests
//!
//! Both backends are simulated and driven by the paused tokio clock.

use lectern_core::{BackendKind, LecternError};
use lectern_playback::{
    build_segments, BackendEvent, BackendSwitchCoordinator, PlaybackError, SimulatedBackend,
};
use std::time::Duration;
use tokio::sync::mpsc;

mod common;
use common::three_chapter_book;

fn coordinator() -> (BackendSwitchCoordinator, mpsc::UnboundedReceiver<BackendEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        BackendSwitchCoordinator::new(Box::new(SimulatedBackend::local()), tx),
        rx,
    )
}

#[tokio::test(start_paused = true)]
async fn test_switch_preserves_position_speed_and_play_state() {
    let (mut coordinator, _rx) = coordinator();
    let mut session = three_chapter_book("ps_1");
    session.current_time_ms = 450_000;

    coordinator
        .load(&session, build_segments(&session), true, 1.25)
        .unwrap();
    coordinator.attach_remote(Box::new(SimulatedBackend::remote()));

    tokio::time::advance(Duration::from_secs(2)).await;
    let before = coordinator.current_absolute().unwrap();
    assert_eq!(before, 452_500);

    assert!(coordinator.switch_to(BackendKind::Remote, &session).unwrap());

    assert_eq!(coordinator.active_kind(), BackendKind::Remote);
    assert!(coordinator.is_playing());
    assert_eq!(coordinator.speed(), 1.25);
    let after = coordinator.current_absolute().unwrap();
    assert!(
        after.abs_diff(before) <= 250,
        "remote resumed at {after}, local was at {before}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_switch_to_active_backend_is_noop() {
    let (mut coordinator, _rx) = coordinator();
    let session = three_chapter_book("ps_1");
    coordinator
        .load(&session, build_segments(&session), false, 1.0)
        .unwrap();

    assert!(!coordinator.switch_to(BackendKind::Local, &session).unwrap());
    assert_eq!(coordinator.active_kind(), BackendKind::Local);
}

#[tokio::test(start_paused = true)]
async fn test_local_copy_cannot_move_to_remote() {
    let (mut coordinator, _rx) = coordinator();
    let session = three_chapter_book("ps_local").into_local();
    coordinator
        .load(&session, build_segments(&session), true, 1.0)
        .unwrap();
    coordinator.attach_remote(Box::new(SimulatedBackend::remote()));

    let err = coordinator
        .switch_to(BackendKind::Remote, &session)
        .unwrap_err();
    assert!(matches!(
        err,
        PlaybackError::Core(LecternError::IncompatibleBackend {
            kind: BackendKind::Remote,
            ..
        })
    ));
    assert_eq!(coordinator.active_kind(), BackendKind::Local);
    assert!(coordinator.is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_receiver_keeps_local_playing() {
    let (mut coordinator, _rx) = coordinator();
    let mut session = three_chapter_book("ps_1");
    session.current_time_ms = 100_000;
    coordinator
        .load(&session, build_segments(&session), true, 1.0)
        .unwrap();
    coordinator.attach_remote(Box::new(SimulatedBackend::unreachable(BackendKind::Remote)));

    assert!(coordinator.switch_to(BackendKind::Remote, &session).is_err());

    assert_eq!(coordinator.active_kind(), BackendKind::Local);
    assert!(coordinator.is_playing());
    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(coordinator.current_absolute(), Some(101_000));
}

#[tokio::test(start_paused = true)]
async fn test_switch_without_receiver_fails() {
    let (mut coordinator, _rx) = coordinator();
    let session = three_chapter_book("ps_1");
    coordinator
        .load(&session, build_segments(&session), false, 1.0)
        .unwrap();

    let err = coordinator
        .switch_to(BackendKind::Remote, &session)
        .unwrap_err();
    assert!(matches!(
        err,
        PlaybackError::Core(LecternError::BackendUnavailable(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_detach_hands_back_to_local() {
    let (mut coordinator, _rx) = coordinator();
    let mut session = three_chapter_book("ps_1");
    session.current_time_ms = 320_000;
    coordinator
        .load(&session, build_segments(&session), true, 1.0)
        .unwrap();
    coordinator.attach_remote(Box::new(SimulatedBackend::remote()));
    coordinator.switch_to(BackendKind::Remote, &session).unwrap();

    tokio::time::advance(Duration::from_secs(3)).await;
    assert!(coordinator.detach_remote(Some(&session)).unwrap());

    assert_eq!(coordinator.active_kind(), BackendKind::Local);
    assert!(!coordinator.has_remote());
    assert!(coordinator.is_playing());
    assert_eq!(coordinator.current_absolute(), Some(323_000));
}

#[tokio::test(start_paused = true)]
async fn test_load_of_local_copy_falls_back_from_remote() {
    let (mut coordinator, _rx) = coordinator();
    let streamed = three_chapter_book("ps_1");
    coordinator
        .load(&streamed, build_segments(&streamed), false, 1.0)
        .unwrap();
    coordinator.attach_remote(Box::new(SimulatedBackend::remote()));
    coordinator.switch_to(BackendKind::Remote, &streamed).unwrap();

    let local_copy = three_chapter_book("ps_2").into_local();
    coordinator
        .load(&local_copy, build_segments(&local_copy), true, 1.0)
        .unwrap();

    assert_eq!(coordinator.active_kind(), BackendKind::Local);
    assert!(coordinator.is_playing());
}
