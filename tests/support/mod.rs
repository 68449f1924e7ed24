#![allow(dead_code)]

use std::{
    io::Cursor,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use codestudio::{
    CanonicalPayload, MatrixOptions, OverlayCompositor, OverlayError, OverlayImage, RenderError,
    RenderOptions, RenderRequest, Rgba8, SymbolRenderer,
};
use image::RgbaImage;

/// Payloads containing this marker are rejected, like a check digit mismatch would be.
pub const REJECT_MARKER: &str = "INVALID";

/// Renders a flat image in the request's background color and remembers every payload it saw.
#[derive(Default)]
pub struct RecordingRenderer {
    calls: AtomicUsize,
    payloads: Mutex<Vec<String>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn payloads(&self) -> Vec<String> {
        self.payloads.lock().unwrap().clone()
    }
}

impl SymbolRenderer for RecordingRenderer {
    fn render(&self, request: &RenderRequest) -> Result<RgbaImage, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let payload = request.payload().as_str();
        self.payloads.lock().unwrap().push(payload.to_owned());
        if payload.contains(REJECT_MARKER) {
            return Err(RenderError::rejected(format!("cannot encode '{payload}'")));
        }
        let (w, h) = match request.options() {
            RenderOptions::Matrix(m) => (m.size, m.size),
            RenderOptions::Linear(l) => (l.bar_width * 11 * payload.len() as u32, l.bar_height),
        };
        Ok(RgbaImage::from_pixel(
            w.max(1),
            h,
            request.options().background().to_pixel(),
        ))
    }

    fn render_vector(
        &self,
        payload: &CanonicalPayload,
        options: &MatrixOptions,
    ) -> Result<String, RenderError> {
        let ns = "http://www.w3.org/2000/svg";
        let size = options.size;
        Ok(format!(
            r#"<svg xmlns="{ns}" width="{size}" height="{size}"><desc>{payload}</desc></svg>"#
        ))
    }
}

pub struct FailingCompositor;

impl OverlayCompositor for FailingCompositor {
    fn compose(
        &self,
        _base: &RgbaImage,
        _overlay: &OverlayImage,
        _fraction: f32,
        _backdrop: Rgba8,
    ) -> Result<RgbaImage, OverlayError> {
        Err(OverlayError::Draw("compositor offline".into()))
    }
}

pub fn png_bytes(width: u32, height: u32, color: Rgba8) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, color.to_pixel());
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

pub fn logo(color: Rgba8) -> OverlayImage {
    OverlayImage::from_bytes(png_bytes(8, 8, color), 2 * 1024 * 1024).unwrap()
}

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// A fixed origin for injected time.
pub fn t0() -> Instant {
    Instant::now()
}
