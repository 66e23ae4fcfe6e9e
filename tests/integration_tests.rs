//! End-to-end scheduling scenarios: real WAV fixtures decoded through
//! the default decoder, played into the offline graph backend, driven
//! by deterministic timeline advances.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use approx::assert_relative_eq;
use attacca::prelude::*;
use attacca::{GraphNode, GraphOp, OfflineBackend};
use parking_lot::Mutex;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Write a sine fixture and return its path.
fn write_wav(dir: &tempfile::TempDir, name: &str, seconds: f64, freq: f32) -> String {
    let path = dir.path().join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    let frames = (8000.0 * seconds) as usize;
    for i in 0..frames {
        let s = (2.0 * std::f32::consts::PI * freq * i as f32 / 8000.0).sin();
        writer.write_sample((s * 0.8 * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
    path.to_str().unwrap().to_string()
}

fn build_scheduler(backend: &OfflineBackend) -> Scheduler {
    Scheduler::builder()
        .backend(Arc::new(backend.clone()))
        .fade_length(0.02)
        .build()
}

/// Step the deterministic clock, yielding to the loader thread between
/// steps so decodes land.
fn settle(scheduler: &Scheduler, target: f64) {
    let mut t = scheduler.now();
    while t < target {
        t = (t + 0.25).min(target);
        std::thread::sleep(std::time::Duration::from_millis(5));
        scheduler.timeline().advance_to(t);
    }
}

fn track(object: &AudioObject) -> Arc<Mutex<Vec<(ObjectStatus, f64)>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for status in [
        ObjectStatus::Loaded,
        ObjectStatus::Scheduled,
        ObjectStatus::Playing,
        ObjectStatus::Stopped,
        ObjectStatus::Disposed,
        ObjectStatus::Freed,
    ] {
        let log = Arc::clone(&log);
        object.on_status(status, Box::new(move |time| log.lock().push((status, time))));
    }
    log
}

#[test]
fn test_full_lifecycle_from_file_to_free() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let uri = write_wav(&dir, "three_seconds.wav", 3.0, 220.0);

    let backend = OfflineBackend::new();
    let scheduler = build_scheduler(&backend);

    let objects = scheduler
        .schedule_audio(&[uri.as_str()], TimePoint::At(5.0), PlaybackMode::default())
        .unwrap();
    let log = track(&objects[0]);

    settle(&scheduler, 20.0);

    let log = log.lock();
    let order: Vec<ObjectStatus> = log.iter().map(|(s, _)| *s).collect();
    assert_eq!(
        order,
        vec![
            ObjectStatus::Loaded,
            ObjectStatus::Scheduled,
            ObjectStatus::Playing,
            ObjectStatus::Stopped,
            ObjectStatus::Disposed,
            ObjectStatus::Freed,
        ]
    );

    // Default connect window 2: requested at 5, audible at 7, three
    // seconds of audio, fade 0.02, dispose/free windows 2 and 5.
    let time_of = |status: ObjectStatus| {
        log.iter()
            .find(|(s, _)| *s == status)
            .map(|(_, t)| *t)
            .unwrap()
    };
    // Loading starts 5s ahead of the audible time; the decode lands on
    // the next poll after that.
    assert_relative_eq!(time_of(ObjectStatus::Loaded), 2.0, epsilon = 0.3);
    assert_relative_eq!(time_of(ObjectStatus::Scheduled), 5.0, epsilon = 0.01);
    assert_relative_eq!(time_of(ObjectStatus::Playing), 7.0, epsilon = 0.01);
    assert_relative_eq!(time_of(ObjectStatus::Stopped), 10.0, epsilon = 0.01);
    assert_relative_eq!(time_of(ObjectStatus::Disposed), 12.02, epsilon = 0.01);
    assert_relative_eq!(time_of(ObjectStatus::Freed), 15.02, epsilon = 0.01);

    let ops = backend.ops_for(0);
    assert!(ops.contains(&GraphOp::Start {
        time: 7.0,
        offset: 0.0
    }));
    assert_eq!(ops.last(), Some(&GraphOp::Dispose));
}

#[test]
fn test_snap_to_boundary_loop_of_uneven_sources() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let long = write_wav(&dir, "long.wav", 2.0, 220.0);
    let short = write_wav(&dir, "short.wav", 1.0, 440.0);

    let backend = OfflineBackend::new();
    let scheduler = build_scheduler(&backend);

    let objects = scheduler
        .schedule_audio(
            &[long.as_str(), short.as_str()],
            TimePoint::At(10.0),
            PlaybackMode {
                kind: PlaybackKind::Loop { times: 2 },
                ..PlaybackMode::default()
            },
        )
        .unwrap();

    // Period is the longer source: both repeat at 10 and 12, the short
    // one keeping its own duration inside each period.
    assert_eq!(objects.len(), 4);
    let starts: Vec<f64> = objects
        .iter()
        .map(|o| o.schedule_time().absolute())
        .collect();
    assert_eq!(starts, vec![10.0, 12.0, 10.0, 12.0]);

    settle(&scheduler, 25.0);
    assert_eq!(backend.graph_count(), 4);
    for object in &objects {
        assert_eq!(object.status(), ObjectStatus::Freed);
    }
}

#[test]
fn test_event_after_audio_fires_at_overlap_point() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let uri = write_wav(&dir, "one_second.wav", 1.0, 330.0);

    let backend = OfflineBackend::new();
    let scheduler = build_scheduler(&backend);

    let objects = scheduler
        .schedule_audio(&[uri.as_str()], TimePoint::At(2.0), PlaybackMode::default())
        .unwrap();
    settle(&scheduler, 2.5);

    let refs: Vec<ObjectRef> = objects
        .iter()
        .map(|o| Arc::new(o.clone()) as ObjectRef)
        .collect();
    let fired_at = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&fired_at);
    let _event = scheduler.schedule_event(
        TimePoint::After(refs),
        Box::new(move |time| seen.lock().push(time)),
    );

    settle(&scheduler, 5.0);

    // Audio requested at 2 with 1s of content ends at 3 in requested
    // time; the event lands a fade early.
    let fired = fired_at.lock();
    assert_eq!(fired.len(), 1);
    assert_relative_eq!(fired[0], 2.98, epsilon = 0.01);
}

#[test]
fn test_segment_playback_with_offset_and_duration() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let uri = write_wav(&dir, "four_seconds.wav", 4.0, 220.0);

    let backend = OfflineBackend::new();
    let scheduler = build_scheduler(&backend);

    let objects = scheduler
        .schedule_audio(
            &[uri.as_str()],
            TimePoint::At(3.0),
            PlaybackMode {
                offset: Some(1.0),
                duration: Some(1.5),
                kind: PlaybackKind::Oneshot,
            },
        )
        .unwrap();
    let log = track(&objects[0]);
    settle(&scheduler, 15.0);

    // Audible at 5, playing 1.5s of the middle of the file.
    let stopped = log
        .lock()
        .iter()
        .find(|(s, _)| *s == ObjectStatus::Stopped)
        .map(|(_, t)| *t)
        .unwrap();
    assert_relative_eq!(stopped, 6.5, epsilon = 0.01);

    // Starting mid-sample, the fade straddles the cut.
    let ops = backend.ops_for(0);
    assert!(ops.iter().any(|op| matches!(
        op,
        GraphOp::Start { time, .. } if (*time - (5.0 - 0.01)).abs() < 1e-6
    )));
}

#[test]
fn test_stop_audio_immediately_frees_pending_objects() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let uri = write_wav(&dir, "one_second.wav", 1.0, 330.0);

    let backend = OfflineBackend::new();
    let scheduler = build_scheduler(&backend);

    let objects = scheduler
        .schedule_audio(&[uri.as_str()], TimePoint::At(50.0), PlaybackMode::default())
        .unwrap();
    let refs: Vec<ObjectRef> = objects
        .iter()
        .map(|o| Arc::new(o.clone()) as ObjectRef)
        .collect();
    scheduler.stop_audio(&refs, TimePoint::Asap, StopMode::Immediate);

    assert_eq!(objects[0].status(), ObjectStatus::Freed);
    // No graph was ever built for it.
    settle(&scheduler, 60.0);
    assert_eq!(backend.graph_count(), 0);
}

#[test]
fn test_wall_clock_driver_fires_scheduled_event() {
    init_tracing();
    let backend = OfflineBackend::new();
    let scheduler = build_scheduler(&backend);

    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    let _event = scheduler.schedule_event(
        TimePoint::In(0.05),
        Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let driver = scheduler.drive(std::time::Duration::from_millis(5));
    driver.run();
    std::thread::sleep(std::time::Duration::from_millis(300));
    assert_eq!(count.load(Ordering::SeqCst), 1);

    // Live params still apply while the driver owns the clock.
    let _ = scheduler.set_tempo(140.0);
    assert_eq!(scheduler.timeline().tempo(), 140.0);
}

#[test]
fn test_live_mix_params_reach_the_graph() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let uri = write_wav(&dir, "two_seconds.wav", 2.0, 220.0);

    let backend = OfflineBackend::new();
    let scheduler = build_scheduler(&backend);

    let objects = scheduler
        .schedule_audio(&[uri.as_str()], TimePoint::At(1.0), PlaybackMode::default())
        .unwrap();
    let object = &objects[0];
    settle(&scheduler, 3.5);
    assert_eq!(object.status(), ObjectStatus::Playing);

    object
        .set(Parameter::Panning, ParamValue::Triple([0.5, 0.0, -1.0]))
        .unwrap();
    object.set(Parameter::Reverb, ParamValue::Single(0.3)).unwrap();

    let ops = backend.ops_for(0);
    assert!(ops.contains(&GraphOp::SetPannerPosition {
        x: 0.5,
        y: 0.0,
        z: -1.0
    }));
    // Reverb sends run hotter than the raw parameter.
    assert!(ops.contains(&GraphOp::SetGain {
        node: GraphNode::Reverb,
        value: 0.6
    }));
}
