use std::sync::Arc;

use wipecast_core::hash::hash_frames;
use wipecast_core::{BoundaryPosition, Color, ContainerFormat, FrameBuffer, RevealSide};
use wipecast_encode::{MemoryBackend, StreamConfig};
use wipecast_render::{CompositeStyle, ImageHandle, ImageLoader};
use wipecast_studio::{
    ComparatorView, ImmediateTicker, InputEvent, RecorderConfig, RecordingController,
    WipeSchedule,
};

fn data_uri(color: &Color) -> String {
    ImageHandle::from_frame(FrameBuffer::solid(4, 3, color), "fixture")
        .to_data_uri()
        .unwrap()
}

fn recorder(backend: MemoryBackend, reveal: RevealSide) -> RecordingController {
    let config = RecorderConfig {
        stream: StreamConfig::new(40, 30, 30),
        formats: vec![ContainerFormat::Webm, ContainerFormat::Mp4],
        style: CompositeStyle {
            reveal,
            background: Color::BLACK,
        },
    };
    RecordingController::new(Arc::new(ImageLoader::default()), vec![Arc::new(backend)], config)
        .with_ticker(ImmediateTicker::factory())
}

/// 'r' or 'b' for every column of the middle row.
fn columns(frame: &FrameBuffer) -> String {
    (0..frame.width)
        .map(|x| match frame.get_pixel(x, frame.height / 2) {
            Some([r, _, b, _]) if r > 127 && b < 128 => 'r',
            Some([r, _, b, _]) if b > 127 && r < 128 => 'b',
            _ => '?',
        })
        .collect()
}

#[tokio::test]
async fn test_red_blue_thirty_frame_wipe() {
    let backend = MemoryBackend::new();
    let captured = backend.captured();
    let recorder = recorder(backend, RevealSide::Left);
    let schedule = WipeSchedule::new(30, 0.2, 0.6).unwrap();

    let clip = recorder
        .record_scripted(&data_uri(&Color::RED), &data_uri(&Color::BLUE), &schedule)
        .await
        .unwrap();

    assert_eq!(clip.frame_count, 30);
    assert_eq!(clip.file_name("comparison"), "comparison.webm");

    let percents: Vec<f64> = clip.positions.iter().map(|p| p.percent()).collect();
    assert!(percents[..6].iter().all(|p| *p == 100.0));
    assert!(percents[24..].iter().all(|p| *p == 0.0));
    for (i, window) in percents[6..24].windows(2).enumerate() {
        assert!(window[1] < window[0], "frame {} not decreasing", i + 7);
    }

    let frames = captured.frames();
    assert_eq!(frames.len(), 30);
    let all_after = "b".repeat(40);
    let all_before = "r".repeat(40);
    for frame in &frames[..6] {
        assert_eq!(columns(frame), all_after);
    }
    for frame in &frames[24..] {
        assert_eq!(columns(frame), all_before);
    }
    for (frame, position) in frames.iter().zip(&clip.positions).skip(6).take(18) {
        let edge = position.edge_column(40) as usize;
        let expected = format!("{}{}", "b".repeat(edge), "r".repeat(40 - edge));
        assert_eq!(columns(frame), expected);
    }
}

#[tokio::test]
async fn test_reveal_right_mirrors_frames() {
    let backend = MemoryBackend::new();
    let captured = backend.captured();
    let recorder = recorder(backend, RevealSide::Right);
    let schedule = WipeSchedule::new(10, 0.2, 0.6).unwrap();

    recorder
        .record_scripted(&data_uri(&Color::RED), &data_uri(&Color::BLUE), &schedule)
        .await
        .unwrap();

    let frames = captured.frames();
    assert_eq!(columns(&frames[0]), "r".repeat(40));
    assert_eq!(columns(&frames[9]), "b".repeat(40));
}

#[tokio::test]
async fn test_scripted_recording_is_reproducible() {
    let schedule = WipeSchedule::new(30, 0.2, 0.6).unwrap();
    let before = data_uri(&Color::RED);
    let after = data_uri(&Color::BLUE);

    let mut fingerprints = Vec::new();
    for reveal in [RevealSide::Left, RevealSide::Left, RevealSide::Right] {
        let backend = MemoryBackend::new();
        let captured = backend.captured();
        recorder(backend, reveal)
            .record_scripted(&before, &after, &schedule)
            .await
            .unwrap();
        assert_eq!(captured.len(), 30);
        fingerprints.push(hash_frames(&captured.frames()));
    }

    assert_eq!(fingerprints[0], fingerprints[1]);
    assert_ne!(fingerprints[0], fingerprints[2]);
}

#[tokio::test]
async fn test_comparator_drives_live_recording() {
    let backend = MemoryBackend::new();
    let captured = backend.captured();
    let recorder = recorder(backend, RevealSide::Left);

    let before = ImageHandle::from_frame(FrameBuffer::solid(4, 3, &Color::RED), "before");
    let after = ImageHandle::from_frame(FrameBuffer::solid(4, 3, &Color::BLUE), "after");
    let mut view = ComparatorView::new(
        before,
        after,
        wipecast_core::Rect::new(0.0, 0.0, 200.0, 100.0),
    );
    view.handle(InputEvent::Slider { value: 0.0 });

    recorder
        .start(
            &data_uri(&Color::RED),
            &data_uri(&Color::BLUE),
            view.boundary_handle(),
        )
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    view.handle(InputEvent::PointerDown { x: 10.0 });
    view.handle(InputEvent::PointerMove { x: 150.0 });
    view.handle(InputEvent::PointerUp);
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let clip = recorder.stop().await.unwrap();
    assert_eq!(clip.positions.first(), Some(&BoundaryPosition::MIN));
    assert_eq!(clip.positions.last().map(|p| p.percent()), Some(75.0));

    let frames = captured.frames();
    let last = frames.last().unwrap();
    assert_eq!(columns(last), format!("{}{}", "b".repeat(30), "r".repeat(10)));
}
