//! Producer behaviour: ordering, terminal events, release of the upload, disconnects.

use std::sync::Arc;
use std::time::Duration;
use whisper_relay_core::{
    spawn_segment_stream, EngineAdapter, RawSegment, ScriptedEngine, StreamEvent, StreamOptions,
    Task, UploadedAudio,
};

fn options() -> StreamOptions {
    StreamOptions::new("en", Task::Transcribe)
}

async fn drain(mut rx: tokio::sync::mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }
    events
}

async fn wait_removed(path: &std::path::Path) -> bool {
    for _ in 0..200 {
        if !path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn completed_stream_is_ordered_and_ends_with_done() {
    let dir = tempfile::tempdir().unwrap();
    let audio = UploadedAudio::materialize_in(dir.path(), "clip.wav", b"audio").unwrap();
    let path = audio.path().to_path_buf();
    let engine = ScriptedEngine::new(vec![
        RawSegment::new(0.0, 2.5, "Hello"),
        RawSegment::new(2.5, 5.0, "world"),
    ]);
    let rx = spawn_segment_stream(
        EngineAdapter::new(Arc::new(engine)),
        audio,
        options(),
        4,
        "req-1".to_string(),
    );

    let events = drain(rx).await;
    assert_eq!(events.len(), 3);
    match &events[0] {
        StreamEvent::Segment { segment, full_text } => {
            assert_eq!(segment.id, 0);
            assert_eq!(segment.text, "Hello");
            assert_eq!(full_text, "Hello");
        }
        other => panic!("unexpected {:?}", other),
    }
    match &events[1] {
        StreamEvent::Segment { segment, full_text } => {
            assert_eq!(segment.id, 1);
            assert_eq!(full_text, "Hello\nworld");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(events[2], StreamEvent::Done);
    assert!(wait_removed(&path).await, "upload not released after completion");
}

#[tokio::test]
async fn engine_failure_ends_with_single_error() {
    let dir = tempfile::tempdir().unwrap();
    let audio = UploadedAudio::materialize_in(dir.path(), "clip.wav", b"audio").unwrap();
    let path = audio.path().to_path_buf();
    let engine = ScriptedEngine::new(vec![
        RawSegment::new(0.0, 1.0, "one"),
        RawSegment::new(1.0, 2.0, "two"),
        RawSegment::new(2.0, 3.0, "three"),
    ])
    .fail_after(2, "decoder crashed");
    let rx = spawn_segment_stream(
        EngineAdapter::new(Arc::new(engine)),
        audio,
        options(),
        4,
        "req-2".to_string(),
    );

    let events = drain(rx).await;
    assert_eq!(events.len(), 3);
    assert!(!events[0].is_terminal());
    assert!(!events[1].is_terminal());
    match &events[2] {
        StreamEvent::Error { message } => assert!(message.contains("decoder crashed")),
        other => panic!("unexpected {:?}", other),
    }
    assert!(wait_removed(&path).await, "upload not released after failure");
}

#[tokio::test]
async fn failure_to_open_is_reported_in_stream() {
    let dir = tempfile::tempdir().unwrap();
    let audio = UploadedAudio::materialize_in(dir.path(), "clip.wav", b"audio").unwrap();
    let engine = ScriptedEngine::new(vec![]).fail_on_open("unsupported codec");
    let rx = spawn_segment_stream(
        EngineAdapter::new(Arc::new(engine)),
        audio,
        options(),
        4,
        "req-3".to_string(),
    );
    let events = drain(rx).await;
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], StreamEvent::Error { message } if message.contains("unsupported codec")));
}

#[tokio::test]
async fn dropped_receiver_abandons_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let audio = UploadedAudio::materialize_in(dir.path(), "clip.wav", b"audio").unwrap();
    let path = audio.path().to_path_buf();
    let segments = (0..20)
        .map(|i| RawSegment::new(i as f64, i as f64 + 1.0, format!("segment {}", i)))
        .collect();
    let engine = Arc::new(ScriptedEngine::new(segments).with_delay(Duration::from_millis(20)));
    let mut rx = spawn_segment_stream(
        EngineAdapter::new(engine.clone()),
        audio,
        options(),
        1,
        "req-4".to_string(),
    );

    let first = rx.recv().await.unwrap();
    assert!(!first.is_terminal());
    drop(rx);

    assert!(wait_removed(&path).await, "upload not released after disconnect");
    assert!(engine.pulled() < 20, "engine kept running: {}", engine.pulled());
}

#[tokio::test]
async fn rerun_produces_same_sequence() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        RawSegment::new(0.0, 1.0, "same"),
        RawSegment::new(1.0, 2.0, "words"),
    ]));
    let mut runs = Vec::new();
    for i in 0..2 {
        let audio = UploadedAudio::materialize("clip.wav", b"audio").unwrap();
        let rx = spawn_segment_stream(
            EngineAdapter::new(engine.clone()),
            audio,
            options(),
            4,
            format!("rerun-{}", i),
        );
        runs.push(drain(rx).await);
    }
    assert_eq!(runs[0], runs[1]);
    assert_eq!(engine.runs(), 2);
}
