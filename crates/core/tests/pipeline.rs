use std::time::Duration;

use pulsescope_core::{
    record, CollectingSurface, DrawCommand, DrawingMode, ErrorKind, MediaPlayer, Permissions,
    Runtime, SessionId, SimulatedPlayer, Song, SyntheticBackend, TaskKind, Tone, Viewport,
    VisualizerConfig, VisualizerState,
};

type TestRuntime = Runtime<SimulatedPlayer, SyntheticBackend, CollectingSurface>;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn build(player: SimulatedPlayer, dir: &tempfile::TempDir) -> TestRuntime {
    let mut config = VisualizerConfig::default();
    config.recording.output_dir = dir.path().to_path_buf();
    let backend = SyntheticBackend::new(vec![Tone::new(220.0, 0.6), Tone::new(880.0, 0.3)]);
    Runtime::new(
        &config,
        player,
        backend,
        CollectingSurface::new(Viewport::new(800.0, 600.0)),
        Permissions::granted(),
    )
    .unwrap()
}

#[test]
fn full_track_is_recorded_and_closed_on_completion() {
    let dir = tempfile::tempdir().unwrap();
    let mut runtime = build(SimulatedPlayer::new(), &dir);
    runtime.player_mut().load(Song::new(7, "Road Trip / Part 2", 2_000));

    runtime.advance_to(ms(2_500));

    // Completion pauses playback before the capture due at 2000 ms fires.
    assert!(!runtime.player().is_playing());
    assert_eq!(runtime.lifecycle().state(), VisualizerState::Paused);
    assert!(!runtime.lifecycle().recorder().is_recording());
    assert!(!runtime.progress().is_running());

    let path = runtime.lifecycle().recorder().output_path().unwrap().to_path_buf();
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("Road_Trip___Part_2_"), "{name}");
    assert!(name.ends_with(".pcm"));

    let stats = record::inspect(&path).unwrap();
    assert_eq!(stats.samples, 19 * 512);
    assert!(stats.max > 0 && stats.min < 0);
    assert!(runtime.take_incidents().is_empty());
}

#[test]
fn pause_and_resume_produce_separate_recordings() {
    let dir = tempfile::tempdir().unwrap();
    let mut runtime = build(SimulatedPlayer::new(), &dir);
    runtime.player_mut().load(Song::new(1, "Loop", 60_000));
    runtime.advance_to(ms(500));
    let first = runtime.lifecycle().recorder().output_path().unwrap().to_path_buf();

    runtime.player_mut().pause();
    runtime.advance_to(ms(800));
    assert_eq!(runtime.scheduler().count(TaskKind::Capture), 0);
    assert_eq!(std::fs::metadata(&first).unwrap().len(), 5 * 512);

    runtime.player_mut().play();
    runtime.advance_to(ms(1_200));
    let second = runtime.lifecycle().recorder().output_path().unwrap().to_path_buf();
    assert_ne!(first, second);
    assert_eq!(runtime.lifecycle().recorder().bytes_written(), 4 * 512);
    assert_eq!(runtime.lifecycle().backend().counters().opened(), 1);

    runtime.shutdown();
    assert_eq!(std::fs::metadata(&second).unwrap().len(), 4 * 512);
    assert_eq!(runtime.lifecycle().backend().counters().live(), 0);
}

#[test]
fn drawing_mode_selects_layers() {
    let dir = tempfile::tempdir().unwrap();
    let mut runtime = build(SimulatedPlayer::new(), &dir);
    runtime.player_mut().load(Song::new(1, "Layers", 60_000));
    runtime.advance_to(ms(400));

    let bars = |frame: &[DrawCommand]| {
        frame
            .iter()
            .filter(|command| matches!(command, DrawCommand::RoundRect { .. }))
            .count()
    };
    let rotates = |frame: &[DrawCommand]| {
        frame
            .iter()
            .filter(|command| matches!(command, DrawCommand::Rotate { .. }))
            .count()
    };

    let frame = runtime.surface().last_frame().to_vec();
    assert_eq!(bars(&frame), 128);
    assert_eq!(rotates(&frame), 1);

    runtime.set_drawing_mode(DrawingMode::Spectrum);
    runtime.advance_by(ms(16));
    let frame = runtime.surface().last_frame().to_vec();
    assert_eq!(bars(&frame), 128);
    assert_eq!(rotates(&frame), 0);

    runtime.set_drawing_mode(DrawingMode::Waveform);
    runtime.advance_by(ms(16));
    let frame = runtime.surface().last_frame().to_vec();
    assert_eq!(bars(&frame), 0);
    assert_eq!(rotates(&frame), 1);
    assert_eq!(frame.len(), 7);
}

#[test]
fn invalid_session_never_opens_a_tap() {
    let dir = tempfile::tempdir().unwrap();
    let mut runtime = build(SimulatedPlayer::new().with_session(SessionId::INVALID), &dir);
    runtime.player_mut().load(Song::new(1, "Silent", 60_000));
    runtime.advance_to(ms(1_000));

    assert_eq!(runtime.lifecycle().state(), VisualizerState::Uninitialized);
    assert_eq!(runtime.lifecycle().backend().counters().opened(), 0);
    assert!(!runtime.lifecycle().recorder().is_recording());
    let incidents = runtime.take_incidents();
    assert!(!incidents.is_empty());
    assert!(incidents.iter().all(|incident| incident.kind == ErrorKind::Configuration));
    assert_eq!(runtime.player().position_ms(), 1_000);
}

#[test]
fn release_twice_frees_the_tap_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut runtime = build(SimulatedPlayer::new(), &dir);
    runtime.player_mut().load(Song::new(1, "Once", 60_000));
    runtime.advance_to(ms(300));

    runtime.shutdown();
    runtime.shutdown();
    let counters = runtime.lifecycle().backend().counters();
    assert_eq!(counters.opened(), 1);
    assert_eq!(counters.released(), 1);
    assert_eq!(runtime.lifecycle().state(), VisualizerState::Released);
}
