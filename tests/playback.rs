mod common;

use std::thread;
use std::time::{Duration, Instant};

use common::{Harness, StubDecoder, frames, indices, names};
use flipbook::core::events::ViewEvent;
use flipbook::core::playback::PlaybackState;
use flipbook::entities::{ImageViewConfig, Property};

fn animation(n: usize, duration_ms: u64, repeat: i64) -> ImageViewConfig {
    ImageViewConfig {
        images: Some(frames(n)),
        duration: Some(duration_ms),
        repeat_count: Some(repeat),
        ..Default::default()
    }
}

#[test]
fn test_repeat_count_is_exact() {
    let h = Harness::new(StubDecoder::new());
    h.view.apply_config(animation(3, 2, 7));
    assert!(h.view.start());

    let shown = h.changes(7, Duration::from_secs(5));
    assert_eq!(shown, vec![0, 1, 2, 0, 1, 2, 0]);

    // Nothing beyond the budget.
    assert!(indices(&h.collect(Duration::from_millis(150))).is_empty());
    assert!(!h.view.is_animating());
    h.view.stop();
}

#[test]
fn test_reverse_order() {
    let h = Harness::new(StubDecoder::new());
    let mut config = animation(3, 2, 3);
    config.reverse = true;
    h.view.apply_config(config);
    assert!(h.view.is_reverse());
    h.view.start();

    assert_eq!(h.changes(3, Duration::from_secs(5)), vec![2, 1, 0]);
    h.view.stop();
}

#[test]
fn test_start_precedes_changes_and_load_fires_once() {
    let h = Harness::new(StubDecoder::new());
    h.view.apply_config(animation(3, 4, 12));
    h.view.start();
    let events = h.collect(Duration::from_millis(300));
    h.view.stop();

    let names = names(&events);
    let first_change = names.iter().position(|n| *n == "change").unwrap();
    let start = names.iter().position(|n| *n == "start").unwrap();
    assert!(start < first_change);

    let loads: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, ViewEvent::Loaded { .. }))
        .collect();
    assert_eq!(loads.len(), 1);
    assert!(matches!(loads[0], ViewEvent::Loaded { state: "images", .. }));
}

#[test]
fn test_load_fires_before_start() {
    let h = Harness::new(StubDecoder::new());
    h.view.apply_config(animation(8, 20, 0));
    let before = h.collect(Duration::from_millis(200));
    assert_eq!(names(&before), vec!["load"]);
    assert!(h.decoder.calls() > 0);
    assert!(h.shown().is_none());

    assert!(h.view.start());
    let after = h.collect(Duration::from_millis(10));
    assert_eq!(names(&after).first(), Some(&"start"));
    let mut shown = indices(&after);
    shown.extend(h.changes(10usize.saturating_sub(shown.len()), Duration::from_secs(5)));
    h.view.stop();
    // The buffered frames play first, then production continues without a gap.
    assert_eq!(shown, vec![0, 1, 2, 3, 4, 5, 6, 7, 0, 1]);
    assert_eq!(names(&h.collect(Duration::from_millis(50))).iter().filter(|n| **n == "load").count(), 0);
}

#[test]
fn test_infinite_until_stop() {
    let h = Harness::new(StubDecoder::new());
    h.view.apply_config(animation(2, 2, 0));
    h.view.start();

    let shown = h.changes(30, Duration::from_secs(5));
    assert_eq!(shown.len(), 30);
    assert!(h.view.is_animating());

    h.view.stop();
    assert_eq!(h.view.playback_state(), PlaybackState::Stopped);
    let after = h.collect(Duration::from_millis(100));
    assert!(names(&after).contains(&"stop"));
    let stop_at = after.iter().position(|e| matches!(e, ViewEvent::Stopped { .. })).unwrap();
    assert!(indices(&after[stop_at..]).is_empty());
}

#[test]
fn test_pause_resume_has_no_gap_or_duplicate() {
    let h = Harness::new(StubDecoder::new());
    h.view.apply_config(animation(4, 5, 0));
    h.view.start();

    let mut shown = h.changes(8, Duration::from_secs(5));
    h.view.pause();
    assert!(!h.view.is_animating());
    // Queued frames still drain while production is blocked.
    shown.extend(indices(&h.collect(Duration::from_millis(120))));
    let paused_count = shown.len();
    assert!(indices(&h.collect(Duration::from_millis(60))).is_empty());

    h.view.resume();
    shown.extend(h.changes(8, Duration::from_secs(5)));
    h.view.stop();

    assert!(shown.len() >= paused_count + 8);
    for pair in shown.windows(2) {
        assert_eq!(pair[1], (pair[0] + 1) % 4, "sequence {:?}", shown);
    }
}

#[test]
fn test_start_while_paused_resumes() {
    let h = Harness::new(StubDecoder::new());
    h.view.apply_config(animation(2, 3, 0));
    h.view.start();
    h.view.pause();
    assert_eq!(h.view.playback_state(), PlaybackState::Paused);
    assert!(h.view.start());
    assert_eq!(h.view.playback_state(), PlaybackState::Playing);

    let events = h.collect(Duration::from_millis(50));
    h.view.stop();
    assert_eq!(names(&events).iter().filter(|n| **n == "start").count(), 1);
}

#[test]
fn test_stop_mid_decode_halts_production() {
    let h = Harness::new(StubDecoder::slow(Duration::from_millis(40)));
    h.view.apply_config(animation(3, 1, 0));
    h.view.start();
    thread::sleep(Duration::from_millis(100));

    let stopped_at = Instant::now();
    h.view.stop();
    // The decode in flight finishes, nothing after it.
    thread::sleep(Duration::from_millis(60));
    let calls = h.decoder.calls();
    let late = h.collect(Duration::from_millis(200));
    assert_eq!(h.decoder.calls(), calls);

    let stop_at = late.iter().position(|e| matches!(e, ViewEvent::Stopped { .. }));
    let after_stop = match stop_at {
        Some(i) => &late[i..],
        None => &late[..],
    };
    assert!(indices(after_stop).is_empty());
    assert!(stopped_at.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_undecodable_frames_are_skipped() {
    let h = Harness::new(StubDecoder::new());
    let config = ImageViewConfig {
        images: Some(flipbook::ImageValue::List(vec![
            frames(1),
            "broken.png".into(),
            flipbook::ImageValue::Bitmap(common::tagged(2)),
        ])),
        duration: Some(2),
        repeat_count: Some(6),
        ..Default::default()
    };
    h.view.apply_config(config);
    h.view.start();

    // The nested list and the broken file never display; they still use up budget.
    let shown = indices(&h.collect(Duration::from_millis(400)));
    h.view.stop();
    assert_eq!(shown, vec![2, 2]);
}

#[test]
fn test_new_images_restart_playback() {
    let h = Harness::new(StubDecoder::new());
    h.view.apply_config(animation(2, 3, 0));
    h.view.start();
    h.changes(2, Duration::from_secs(5));

    h.view.set_property(Property::Images(Some(frames(3))));
    assert_eq!(h.view.sources().len(), 3);
    assert_eq!(h.view.playback_state(), PlaybackState::Playing);
    let events = h.collect(Duration::from_millis(100));
    h.view.stop();

    let names = names(&events);
    let stop = names.iter().position(|n| *n == "stop").unwrap();
    let start = names.iter().position(|n| *n == "start").unwrap();
    assert!(stop < start);
    assert!(indices(&events[start..]).contains(&2));
}

#[test]
fn test_clearing_images_stops_playback() {
    let h = Harness::new(StubDecoder::new());
    h.view.apply_config(animation(2, 3, 0));
    h.view.start();
    h.view.set_property(Property::Images(None));
    assert_eq!(h.view.playback_state(), PlaybackState::Stopped);
    assert!(!h.view.start());
}
