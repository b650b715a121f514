//! Decode resource integration tests against generated WAV fixtures

mod helpers;

use helpers::{ramp_value, write_ramp_wav};
use tactus_ap::audio::{DecodeContext, FrameDecoder, SampleFormat};
use tactus_ap::error::Error;

#[test]
fn acquire_resolves_stream_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ramp_wav(dir.path(), 44_100, 44_100);

    let context = DecodeContext::acquire(&path).unwrap();
    let params = context.params();

    assert_eq!(params.sample_rate, 44_100);
    assert_eq!(params.channels, 2);
    assert_eq!(params.format, SampleFormat::F32Planar);
    assert!(!context.is_open());
}

#[test]
fn acquire_rejects_non_media_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-audio.wav");
    std::fs::write(&path, b"this is not a wav file at all").unwrap();

    assert!(DecodeContext::acquire(&path).is_err());
}

#[test]
fn decode_aggregates_to_requested_budget() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ramp_wav(dir.path(), 44_100, 44_100);

    let mut context = DecodeContext::acquire(&path).unwrap();
    context.open().unwrap();
    assert!(context.is_open());

    let frame = context.decode(4_096).unwrap().expect("samples available");

    // Whole packets are aggregated: at least the budget, overshooting by
    // less than one packet
    assert!(frame.samples() >= 4_096);
    assert!(frame.samples() < 4_096 + 44_100);
    assert_eq!(frame.channels(), 2);
    assert_eq!(frame.format(), SampleFormat::F32Planar);
    assert_eq!(frame.timestamp(), 0);

    // Content is a faithful copy of the fixture ramp
    let views = frame.typed_float_view();
    assert_eq!(views.len(), 2);
    for i in 0..100 {
        assert!((views[0][i] - ramp_value(i as u32)).abs() < 1e-4);
        assert!((views[1][i] + ramp_value(i as u32)).abs() < 1e-4);
    }
}

#[test]
fn decode_reaches_end_of_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ramp_wav(dir.path(), 8_192, 44_100);

    let mut context = DecodeContext::acquire(&path).unwrap();
    context.open().unwrap();

    let frame = context
        .decode(1_000_000)
        .unwrap()
        .expect("samples available");
    assert_eq!(frame.samples(), 8_192);
    assert!(context.end_of_stream());

    // Exhausted stream yields nothing further
    assert!(context.decode(1_000_000).unwrap().is_none());
    assert!(context.end_of_stream());
}

#[test]
fn seek_positions_decode_at_requested_time() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ramp_wav(dir.path(), 44_100 * 2, 44_100);

    let mut context = DecodeContext::acquire(&path).unwrap();
    context.open().unwrap();

    context.seek_to_time(1.0).unwrap();
    let frame = context.decode(4_096).unwrap().expect("samples available");

    // WAV timestamps are sample-addressed; the frame's content must match
    // the ramp at its own timestamp
    let ts = frame.timestamp();
    assert!(ts > 0);
    let views = frame.typed_float_view();
    assert!((views[0][0] - ramp_value(ts as u32)).abs() < 1e-4);

    // Seeking back clears end of stream
    context.decode(usize::MAX).unwrap();
    assert!(context.end_of_stream());
    context.seek_to_time(0.5).unwrap();
    assert!(!context.end_of_stream());
}

#[test]
fn destroy_is_idempotent_and_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ramp_wav(dir.path(), 8_192, 44_100);

    let mut context = DecodeContext::acquire(&path).unwrap();
    context.open().unwrap();

    context.destroy();
    assert!(!context.is_open());

    // 2nd..Nth destroy calls are no-ops
    context.destroy();
    context.destroy();

    // The closed context refuses further work
    assert!(matches!(
        context.decode(1_024),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        context.seek_to_time(0.0),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(context.open(), Err(Error::InvalidState(_))));
}

#[test]
fn open_is_one_shot() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ramp_wav(dir.path(), 8_192, 44_100);

    let mut context = DecodeContext::acquire(&path).unwrap();
    context.open().unwrap();
    assert!(matches!(context.open(), Err(Error::InvalidState(_))));
}

#[test]
fn decode_before_open_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ramp_wav(dir.path(), 8_192, 44_100);

    let mut context = DecodeContext::acquire(&path).unwrap();
    assert!(matches!(
        context.decode(1_024),
        Err(Error::InvalidState(_))
    ));
}
