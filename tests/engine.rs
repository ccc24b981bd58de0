// tests/engine.rs  —  End-to-end scenarios across the public surface

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cw_engine::{
    Error, Generator, Key, KeyValue, SoundSystem, Tone, ToneQueue, SlopeShape,
    TONE_QUEUE_CAPACITY,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn paris_plays_in_one_second_at_60_wpm() {
    init_logging();
    let gen = Generator::new(SoundSystem::Null, None).unwrap();
    gen.set_speed(60).unwrap();
    gen.enqueue_string("PARIS ").unwrap();
    assert_eq!(gen.queued_duration(), 1_000_000);

    let started = Instant::now();
    gen.start().unwrap();
    gen.wait_for_tone_queue().unwrap();
    let elapsed = started.elapsed();

    gen.stop().unwrap();
    // Paced by sink back-pressure: one second of audio, plus scheduling slop.
    assert!(elapsed >= Duration::from_millis(950), "finished in {elapsed:?}");
    assert!(elapsed <= Duration::from_millis(1_600), "took {elapsed:?}");
}

#[test]
fn tone_queue_capacity_and_flush() {
    init_logging();
    let tq = ToneQueue::new();
    let tone = Tone::mark(700, 10_000, SlopeShape::RaisedCosine, 2_000);
    for _ in 0..TONE_QUEUE_CAPACITY {
        tq.enqueue(tone).unwrap();
    }
    assert!(tq.is_full());
    assert!(matches!(tq.enqueue(tone), Err(Error::FullQueue)));

    tq.flush();
    assert_eq!(tq.capacity(), TONE_QUEUE_CAPACITY);
    assert_eq!(tq.length(), 0);
    tq.wait_for_empty().unwrap();
}

#[test]
fn held_dot_paddle_streams_thirty_elements() {
    init_logging();
    let gen = Generator::new(SoundSystem::Null, None).unwrap();
    gen.set_speed(60).unwrap();

    let marks = Arc::new(AtomicUsize::new(0));
    let gaps = Arc::new(AtomicUsize::new(0));
    let marks_cb = Arc::clone(&marks);
    let gaps_cb = Arc::clone(&gaps);
    gen.register_key_state_callback(move |state| match state {
        KeyValue::Closed => {
            marks_cb.fetch_add(1, Ordering::SeqCst);
        }
        KeyValue::Open => {
            gaps_cb.fetch_add(1, Ordering::SeqCst);
        }
    });

    let key = Key::new();
    gen.attach_key(&key);
    gen.start().unwrap();

    key.notify_paddle_event(true, false).unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    while marks.load(Ordering::SeqCst) < 30 {
        assert!(Instant::now() < deadline, "keyer stalled before 30 elements");
        std::thread::sleep(Duration::from_millis(5));
    }

    key.notify_paddle_event(false, false).unwrap();
    key.wait_for_keyer().unwrap();
    assert!(!key.is_busy());

    let total_marks = marks.load(Ordering::SeqCst);
    let total_gaps = gaps.load(Ordering::SeqCst);
    assert!(total_marks >= 30, "marks {total_marks}");
    // Every mark is followed by an inter-mark silence.
    assert!(total_gaps + 1 >= total_marks, "gaps {total_gaps} vs marks {total_marks}");

    gen.stop().unwrap();
    gen.detach_key();
}

#[test]
fn straight_key_holds_and_releases() {
    init_logging();
    let gen = Generator::new(SoundSystem::Null, None).unwrap();
    let key = Key::new();
    gen.attach_key(&key);
    gen.start().unwrap();

    key.notify_straight_key_event(KeyValue::Closed).unwrap();
    std::thread::sleep(Duration::from_millis(80));
    // The forever mark keeps the queue busy the whole time.
    assert!(gen.queue_length() >= 1);

    key.notify_straight_key_event(KeyValue::Open).unwrap();
    std::thread::sleep(Duration::from_millis(40));

    gen.flush();
    gen.wait_for_tone_queue().unwrap();
    gen.stop().unwrap();
}

#[test]
fn stop_cancels_blocked_waiters() {
    init_logging();
    let gen = Arc::new(Generator::new(SoundSystem::Null, None).unwrap());
    gen.set_speed(4).unwrap(); // slow: the queue stays busy for seconds
    gen.start().unwrap();
    gen.enqueue_string("PARIS PARIS").unwrap();

    let waiter = Arc::clone(&gen);
    let handle = std::thread::spawn(move || waiter.wait_for_tone_queue());
    std::thread::sleep(Duration::from_millis(100));
    gen.stop().unwrap();

    assert!(matches!(handle.join().unwrap(), Err(Error::Cancelled)));
}

#[cfg(feature = "audio-wav")]
#[test]
fn wav_sink_renders_the_tone_stream() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sidetone.wav");
    let device = path.to_str().unwrap().to_string();

    {
        let gen = Generator::new(SoundSystem::Wav, Some(&device)).unwrap();
        gen.set_speed(60).unwrap();
        gen.set_volume(100).unwrap();
        gen.start().unwrap();
        gen.enqueue_character('E').unwrap();
        gen.wait_for_tone_queue().unwrap();
        gen.stop().unwrap();
        // Dropping the generator closes (finalizes) the sink.
    }

    let mut reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().channels, 1);
    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert!(!samples.is_empty());
    let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap();
    assert!(peak > 30_000, "peak {peak} below full-volume sine");
}
