use std::path::{Path, PathBuf};

use super::*;
use crate::locator::Protocol;

/// Path to scripts/test.mp4 relative to workspace root (parent of ffmpeg-pump).
fn test_mp4_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("scripts")
        .join("test.mp4")
}

fn test_mp4_locator() -> Option<Locator> {
    let path = test_mp4_path();
    if !path.exists() {
        eprintln!("skip: {} not found", path.display());
        return None;
    }
    Some(Locator::file(&path.to_string_lossy()).unwrap())
}

#[test]
fn ingest_open_missing_file_fails() {
    crate::init().unwrap();
    let mut session = IngestSession::new();
    let locator = Locator::file("/nonexistent/ffmpeg-pump/missing.mp4").unwrap();

    let err = session.open(&locator).unwrap_err();
    assert!(matches!(err, OpenError::Input { .. }), "{}", err);
    assert!(!session.is_open());
    assert!(session.stream().is_none());
}

#[test]
fn closed_session_rejects_reads() {
    let mut session = IngestSession::new();
    assert!(matches!(session.read_unit(), Err(ReadError::Fatal(_))));

    let unit = MediaUnit::new(&[0u8; 4], Some(0), Some(0), 0, ffmpeg_next::Rational(1, 25));
    assert!(matches!(
        session.process_unit(unit),
        Err(PumpError::NotOpen)
    ));

    session.close();
    session.close();
    assert!(!session.is_open());
}

/// Requires scripts/test.mp4 (~5s, 10fps).
#[test]
fn ingest_decodes_first_frame() {
    crate::init().unwrap();
    let Some(locator) = test_mp4_locator() else {
        return;
    };

    let mut session = IngestSession::new();
    let stream = session.open(&locator).unwrap();
    assert!(stream.width > 0 && stream.height > 0);
    assert!(stream.frame_rate > 0.0);
    assert!(matches!(
        session.open(&locator),
        Err(OpenError::AlreadyOpen)
    ));

    let mut decoded = None;
    for _ in 0..200 {
        let unit = session.read_unit().unwrap();
        if unit.track_index() != stream.track_index {
            continue;
        }
        if let Some(frame) = session.process_unit(unit).unwrap() {
            decoded = Some(frame);
            break;
        }
    }
    let frame = decoded.expect("no frame decoded");
    assert_eq!((frame.width(), frame.height()), (stream.width, stream.height));
    assert!(frame.stride() >= stream.width as usize * 3);
    assert_eq!(frame.to_packed().len(), (stream.width * stream.height * 3) as usize);

    session.close();
    assert!(!session.is_open());
    assert!(matches!(session.read_unit(), Err(ReadError::Fatal(_))));
}

/// Requires scripts/test.mp4 (~5s, 10fps).
#[test]
fn ingest_reports_end_of_stream() {
    crate::init().unwrap();
    let Some(locator) = test_mp4_locator() else {
        return;
    };

    let mut session = IngestSession::new();
    session.open(&locator).unwrap();
    let mut units = 0;
    let end = loop {
        match session.read_unit() {
            Ok(_) => units += 1,
            Err(e) => break e,
        }
    };
    assert_eq!(end, ReadError::EndOfStream);
    assert!(units > 0);
}

#[test]
fn egress_open_missing_input_fails() {
    crate::init().unwrap();
    let target = SinkTarget::new(Protocol::Rtmp, "rtmp://127.0.0.1:9/live/test").unwrap();
    let mut session = EgressSession::new(target);
    let locator = Locator::file("/nonexistent/ffmpeg-pump/missing.mp4").unwrap();

    let err = session.open(&locator).unwrap_err();
    assert!(matches!(err, OpenError::Input { .. }), "{}", err);
    assert!(!session.is_open());
    let unit = MediaUnit::new(&[0u8; 4], Some(0), Some(0), 0, ffmpeg_next::Rational(1, 25));
    assert!(matches!(session.write_unit(unit), Err(WriteError::NotOpen)));
}

/// Requires scripts/test.mp4 (~5s, 10fps).
#[test]
fn egress_open_unreachable_sink_fails() {
    crate::init().unwrap();
    let Some(locator) = test_mp4_locator() else {
        return;
    };
    let target = SinkTarget::new(Protocol::Rtmp, "rtmp://127.0.0.1:9/live/test").unwrap();
    let mut session = EgressSession::new(target);

    let err = session.open(&locator).unwrap_err();
    assert!(matches!(err, OpenError::Sink { .. }), "{}", err);
    assert!(!session.is_open());
}
