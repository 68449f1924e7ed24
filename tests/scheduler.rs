mod support;

use std::sync::Arc;

use codestudio::{
    ChannelState, CodeKind, EncodingInput, GenerationDriver, GenerationResult,
    GenerationScheduler, HistoryStore, ImageOverlayCompositor, InputChange, LinearOptions,
    MatrixOptions, MemoryStore, RenderError, Rgba8, SchedulerConfig, Step,
    payload::{WifiFields, WifiSecurity},
};
use image::RgbaImage;
use support::{FailingCompositor, RecordingRenderer, logo, ms, t0};

fn url(raw: &str) -> InputChange {
    InputChange::Data(EncodingInput::Url { raw: raw.into() })
}

fn text(raw: &str) -> InputChange {
    InputChange::Data(EncodingInput::PlainText { raw: raw.into() })
}

#[test]
fn typing_burst_renders_once_with_last_value() {
    let renderer = RecordingRenderer::new();
    let mut driver = GenerationDriver::new(
        GenerationScheduler::default(),
        &renderer,
        ImageOverlayCompositor,
    );
    let mut published = Vec::<GenerationResult>::new();
    let start = t0();

    for (i, raw) in ["e", "ex", "exa", "example.com"].iter().enumerate() {
        let now = start + ms(100 * i as u64);
        driver.submit(url(raw), now).unwrap();
        assert!(matches!(driver.tick(now, &mut published), Step::Idle));
        assert_eq!(driver.scheduler().state(), ChannelState::Debouncing);
    }

    // 300 ms after the last edit, not after the first.
    assert!(matches!(driver.tick(start + ms(599), &mut published), Step::Idle));
    let step = driver.tick(start + ms(600), &mut published);
    assert!(matches!(step, Step::Published { warning: None, .. }));

    assert_eq!(renderer.calls(), 1);
    assert_eq!(renderer.payloads(), ["https://example.com"]);
    assert_eq!(published.len(), 1);
    assert_eq!(driver.scheduler().state(), ChannelState::Published);
}

#[test]
fn empty_required_field_clears_preview_without_rendering() {
    let renderer = RecordingRenderer::new();
    let mut driver = GenerationDriver::new(
        GenerationScheduler::default(),
        &renderer,
        ImageOverlayCompositor,
    );
    let mut published = Vec::<GenerationResult>::new();
    let start = t0();

    driver.submit(text("hello"), start).unwrap();
    driver.tick(start + ms(300), &mut published);
    assert!(driver.scheduler().preview().is_some());

    let wifi = EncodingInput::Wifi(WifiFields {
        ssid: String::new(),
        password: "secret".into(),
        security: WifiSecurity::Wpa,
    });
    driver
        .submit(InputChange::Data(wifi), start + ms(400))
        .unwrap();
    let step = driver.tick(start + ms(700), &mut published);

    assert!(matches!(step, Step::Cleared { .. }));
    assert!(driver.scheduler().preview().is_none());
    assert_eq!(driver.scheduler().state(), ChannelState::Idle);
    assert_eq!(renderer.calls(), 1);
    assert_eq!(published.len(), 1);
}

#[test]
fn stale_completion_never_overwrites_newer_preview() {
    let mut scheduler = GenerationScheduler::default();
    let mut published = Vec::<GenerationResult>::new();
    let start = t0();

    scheduler.submit(text("first"), start).unwrap();
    let Step::Render(first) = scheduler.poll(start + ms(300)) else {
        panic!("expected a render ticket");
    };
    scheduler.submit(text("second"), start + ms(310)).unwrap();
    let Step::Render(second) = scheduler.poll(start + ms(610)) else {
        panic!("expected a render ticket");
    };
    assert!(second.token > first.token);
    assert_eq!(scheduler.current_token(), second.token);

    // The newer render finishes first, the older one afterwards.
    let step = scheduler.complete_render(second.token, Ok(RgbaImage::new(4, 4)), &mut published);
    assert!(matches!(step, Step::Published { .. }));
    let step = scheduler.complete_render(first.token, Ok(RgbaImage::new(9, 9)), &mut published);
    assert!(matches!(step, Step::Stale { .. }));

    let preview = scheduler.preview().unwrap();
    assert_eq!(preview.payload.as_str(), "second");
    assert_eq!(preview.image.dimensions(), (4, 4));
    assert_eq!(published.len(), 1);
}

#[test]
fn superseded_render_is_dropped_even_if_it_arrives_first() {
    let mut scheduler = GenerationScheduler::default();
    let mut published = Vec::<GenerationResult>::new();
    let start = t0();

    scheduler.submit(text("a"), start).unwrap();
    let Step::Render(old) = scheduler.poll(start + ms(300)) else {
        panic!("expected a render ticket");
    };
    scheduler.submit(text("b"), start + ms(301)).unwrap();
    let Step::Render(new) = scheduler.poll(start + ms(601)) else {
        panic!("expected a render ticket");
    };

    let step = scheduler.complete_render(old.token, Ok(RgbaImage::new(1, 1)), &mut published);
    assert!(matches!(step, Step::Stale { .. }));
    assert!(scheduler.preview().is_none());
    assert_eq!(scheduler.state(), ChannelState::Rendering);

    scheduler.complete_render(new.token, Ok(RgbaImage::new(1, 1)), &mut published);
    assert_eq!(scheduler.preview().unwrap().payload.as_str(), "b");
}

#[test]
fn renderer_failure_keeps_previous_preview() {
    let renderer = RecordingRenderer::new();
    let mut driver = GenerationDriver::new(
        GenerationScheduler::default(),
        &renderer,
        ImageOverlayCompositor,
    );
    let mut published = Vec::<GenerationResult>::new();
    let start = t0();

    driver
        .submit(InputChange::Code(CodeKind::Barcode), start)
        .unwrap();
    driver
        .submit(InputChange::BarcodeText("12345".into()), start)
        .unwrap();
    driver.tick(start + ms(300), &mut published);
    assert_eq!(driver.scheduler().preview().unwrap().payload.as_str(), "12345");

    driver
        .submit(InputChange::BarcodeText("12345INVALID".into()), start + ms(400))
        .unwrap();
    let step = driver.tick(start + ms(700), &mut published);

    assert!(matches!(
        step,
        Step::Failed {
            error: RenderError::Rejected(_),
            ..
        }
    ));
    assert_eq!(driver.scheduler().preview().unwrap().payload.as_str(), "12345");
    assert!(driver.scheduler().last_error().is_some());
    assert_eq!(driver.scheduler().state(), ChannelState::Idle);
    assert_eq!(published.len(), 1);
}

#[test]
fn first_render_failure_leaves_preview_empty() {
    let renderer = RecordingRenderer::new();
    let mut driver = GenerationDriver::new(
        GenerationScheduler::default(),
        &renderer,
        ImageOverlayCompositor,
    );
    let mut published = Vec::<GenerationResult>::new();
    let start = t0();

    driver.submit(text("INVALID"), start).unwrap();
    let step = driver.tick(start + ms(300), &mut published);

    assert!(matches!(
        step,
        Step::Failed {
            error: RenderError::Rejected(_),
            ..
        }
    ));
    assert!(driver.scheduler().preview().is_none());
    assert!(driver.scheduler().last_error().is_some());
    assert_eq!(renderer.calls(), 1);
    assert!(published.is_empty());
}

#[test]
fn overlay_failure_publishes_base_render_with_warning() {
    let renderer = RecordingRenderer::new();
    let mut driver = GenerationDriver::new(
        GenerationScheduler::default(),
        &renderer,
        FailingCompositor,
    );
    let mut published = Vec::<GenerationResult>::new();
    let start = t0();

    driver.submit(text("with logo"), start).unwrap();
    driver
        .submit(InputChange::Overlay(Some(logo(Rgba8::opaque(255, 0, 0)))), start)
        .unwrap();
    let step = driver.tick(start + ms(300), &mut published);

    let Step::Published { warning, .. } = step else {
        panic!("expected a publish");
    };
    assert!(warning.is_some());
    assert!(driver.scheduler().last_warning().is_some());
    let preview = driver.scheduler().preview().unwrap();
    assert_eq!(preview.image.dimensions(), (256, 256));
    assert_eq!(*preview.image.get_pixel(128, 128), Rgba8::WHITE.to_pixel());
    assert_eq!(published.len(), 1);
}

#[test]
fn overlay_is_centered_over_padded_backdrop() {
    let renderer = RecordingRenderer::new();
    let mut driver = GenerationDriver::new(
        GenerationScheduler::default(),
        &renderer,
        ImageOverlayCompositor,
    );
    let mut published = Vec::<GenerationResult>::new();
    let start = t0();

    let red = Rgba8::opaque(255, 0, 0);
    let matrix = MatrixOptions {
        background: Rgba8::opaque(0, 0, 255),
        ..MatrixOptions::default()
    };
    driver.submit(InputChange::Matrix(matrix), start).unwrap();
    driver.submit(text("logo"), start).unwrap();
    driver
        .submit(InputChange::Overlay(Some(logo(red))), start)
        .unwrap();
    driver.tick(start + ms(300), &mut published);

    assert_eq!(driver.scheduler().state(), ChannelState::Published);
    let img = &driver.scheduler().preview().unwrap().image;
    assert_eq!(*img.get_pixel(128, 128), red.to_pixel());
    assert_eq!(*img.get_pixel(0, 0), Rgba8::opaque(0, 0, 255).to_pixel());
}

#[test]
fn overlay_is_ignored_for_linear_codes() {
    let renderer = RecordingRenderer::new();
    let mut driver = GenerationDriver::new(
        GenerationScheduler::default(),
        &renderer,
        FailingCompositor,
    );
    let mut published = Vec::<GenerationResult>::new();
    let start = t0();

    driver
        .submit(InputChange::Overlay(Some(logo(Rgba8::BLACK))), start)
        .unwrap();
    driver
        .submit(InputChange::Code(CodeKind::Barcode), start)
        .unwrap();
    driver
        .submit(InputChange::BarcodeText("4006381333931".into()), start)
        .unwrap();
    let step = driver.tick(start + ms(300), &mut published);

    assert!(matches!(step, Step::Published { warning: None, .. }));
    assert_eq!(published[0].kind, CodeKind::Barcode);
}

#[test]
fn publish_appends_history_synchronously() {
    let store = Arc::new(MemoryStore::new());
    let mut history = HistoryStore::load(store.clone(), 20);
    let renderer = RecordingRenderer::new();
    let mut driver = GenerationDriver::new(
        GenerationScheduler::default(),
        &renderer,
        ImageOverlayCompositor,
    );
    let start = t0();

    driver.submit(text("one"), start).unwrap();
    driver.tick(start + ms(300), &mut history);
    assert_eq!(history.len(), 1);

    driver.submit(text("two"), start + ms(400)).unwrap();
    driver.tick(start + ms(700), &mut history);

    let data: Vec<_> = history
        .list()
        .iter()
        .map(|e| e.result.payload.as_str())
        .collect();
    assert_eq!(data, ["two", "one"]);
    assert_eq!(HistoryStore::load(store, 20).len(), 2);
}

#[test]
fn out_of_range_options_are_rejected_on_submit() {
    let mut scheduler = GenerationScheduler::default();
    let start = t0();
    let err = scheduler.submit(
        InputChange::Linear(LinearOptions {
            bar_height: 10,
            ..LinearOptions::default()
        }),
        start,
    );
    assert!(err.is_err());
    assert_eq!(scheduler.input().linear, LinearOptions::default());
    assert_eq!(scheduler.state(), ChannelState::Idle);
}

#[test]
fn restore_shows_entry_and_schedules_regeneration() {
    let store = Arc::new(MemoryStore::new());
    let mut history = HistoryStore::load(store, 20);
    let renderer = RecordingRenderer::new();
    let mut driver = GenerationDriver::new(
        GenerationScheduler::new(SchedulerConfig {
            debounce: ms(50),
            ..SchedulerConfig::default()
        }),
        &renderer,
        ImageOverlayCompositor,
    );
    let start = t0();

    driver
        .submit(InputChange::Code(CodeKind::Barcode), start)
        .unwrap();
    driver
        .submit(InputChange::BarcodeText("ABC-123".into()), start)
        .unwrap();
    driver.tick(start + ms(50), &mut history);
    let entry = history.list()[0].clone();

    let mut fresh = GenerationScheduler::default();
    fresh.restore(&entry, start + ms(100));
    assert_eq!(fresh.input().code, CodeKind::Barcode);
    assert_eq!(fresh.input().barcode_text, "ABC-123");
    assert_eq!(fresh.preview(), Some(&entry.result));
    assert_eq!(fresh.state(), ChannelState::Debouncing);
    assert!(matches!(fresh.poll(start + ms(400)), Step::Render(_)));
}

#[test]
fn restore_supersedes_render_in_flight() {
    let store = Arc::new(MemoryStore::new());
    let mut history = HistoryStore::load(store, 20);
    let renderer = RecordingRenderer::new();
    let mut driver = GenerationDriver::new(
        GenerationScheduler::default(),
        &renderer,
        ImageOverlayCompositor,
    );
    let start = t0();
    driver.submit(text("saved"), start).unwrap();
    driver.tick(start + ms(300), &mut history);
    let entry = history.list()[0].clone();

    let mut scheduler = GenerationScheduler::default();
    scheduler.submit(text("typing"), start).unwrap();
    let Step::Render(ticket) = scheduler.poll(start + ms(300)) else {
        panic!("expected a render ticket");
    };

    scheduler.restore(&entry, start + ms(350));
    assert!(scheduler.current_token() > ticket.token);

    let mut sink = Vec::<GenerationResult>::new();
    let late = RgbaImage::from_pixel(4, 4, Rgba8::BLACK.to_pixel());
    let step = scheduler.complete_render(ticket.token, Ok(late), &mut sink);

    assert!(matches!(step, Step::Stale { .. }));
    assert_eq!(scheduler.preview(), Some(&entry.result));
    assert!(sink.is_empty());
}
