//! Debounced, token-ordered regeneration for one interactive generation channel.
//!
//! The scheduler is sans-IO. Callers feed it input changes and the current time, and it hands
//! back [`Step`]s: a [`RenderTicket`] to execute, an [`OverlayTicket`] to compose, or the
//! outcome of a completion. Renders and compositions may complete in any order; a completion
//! whose token is not the latest issued is discarded, so the preview always reflects the most
//! recently committed input.
//!
//! ```text
//! Idle -> Debouncing -> Rendering -> (OverlayCompositing)? -> Published
//!              ^  |          |                |
//!              +--+          +--> Idle (error) <+ (overlay errors still publish the base)
//! ```

use std::time::{Duration, Instant};

use chrono::Utc;
use image::RgbaImage;

use crate::{
    foundation::{
        core::{GenerationToken, Rgba8},
        error::{OverlayError, RenderError, StudioResult},
    },
    history::HistoryEntry,
    options::{CodeKind, LinearOptions, MatrixOptions, RenderOptions, RenderRequest},
    overlay::{DEFAULT_OVERLAY_FRACTION, OverlayCompositor, OverlayImage},
    payload::{Encoded, EncodingInput, encode},
    render::{GenerationResult, SymbolRenderer},
};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Receives every non-empty publish, synchronously with it.
pub trait PublishSink {
    fn published(&mut self, result: &GenerationResult);
}

impl PublishSink for Vec<GenerationResult> {
    fn published(&mut self, result: &GenerationResult) {
        self.push(result.clone());
    }
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub debounce: Duration,
    /// Overlay edge as a fraction of the symbol edge.
    pub overlay_fraction: f32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            overlay_fraction: DEFAULT_OVERLAY_FRACTION,
        }
    }
}

/// Everything that affects what the channel renders.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationInput {
    pub code: CodeKind,
    /// Matrix-code input.
    pub data: EncodingInput,
    /// Linear-code input, encoded as plain text.
    pub barcode_text: String,
    pub matrix: MatrixOptions,
    pub linear: LinearOptions,
    /// Matrix codes only.
    pub overlay: Option<OverlayImage>,
}

impl Default for GenerationInput {
    fn default() -> Self {
        Self {
            code: CodeKind::Qr,
            data: EncodingInput::default(),
            barcode_text: String::new(),
            matrix: MatrixOptions::default(),
            linear: LinearOptions::default(),
            overlay: None,
        }
    }
}

impl GenerationInput {
    fn payload(&self) -> Encoded {
        match self.code {
            CodeKind::Qr => encode(&self.data),
            CodeKind::Barcode => encode(&EncodingInput::PlainText {
                raw: self.barcode_text.clone(),
            }),
        }
    }

    fn render_options(&self) -> RenderOptions {
        match self.code {
            CodeKind::Qr => RenderOptions::Matrix(self.matrix.clone()),
            CodeKind::Barcode => RenderOptions::Linear(self.linear.clone()),
        }
    }

    fn active_overlay(&self) -> Option<OverlayImage> {
        match self.code {
            CodeKind::Qr => self.overlay.clone(),
            CodeKind::Barcode => None,
        }
    }
}

/// One input-affecting edit.
#[derive(Clone, Debug)]
pub enum InputChange {
    Code(CodeKind),
    Data(EncodingInput),
    BarcodeText(String),
    Matrix(MatrixOptions),
    Linear(LinearOptions),
    Overlay(Option<OverlayImage>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Debouncing,
    Rendering,
    OverlayCompositing,
    Published,
}

/// A render the caller must execute and report back through
/// [`GenerationScheduler::complete_render`].
#[derive(Clone, Debug)]
pub struct RenderTicket {
    pub token: GenerationToken,
    pub request: RenderRequest,
}

/// A composition the caller must execute and report back through
/// [`GenerationScheduler::complete_overlay`].
#[derive(Clone, Debug)]
pub struct OverlayTicket {
    pub token: GenerationToken,
    pub base: RgbaImage,
    pub overlay: OverlayImage,
    pub fraction: f32,
    pub backdrop: Rgba8,
}

#[derive(Clone, Debug)]
pub enum Step {
    /// Nothing is due.
    Idle,
    Render(RenderTicket),
    Compose(OverlayTicket),
    /// A result became the preview. `warning` is set when the overlay could not be drawn and
    /// the base render was published instead.
    Published {
        token: GenerationToken,
        warning: Option<OverlayError>,
    },
    /// The committed input had no payload; the preview is now empty.
    Cleared { token: GenerationToken },
    /// The renderer rejected the request; the previous preview is untouched.
    Failed {
        token: GenerationToken,
        error: RenderError,
    },
    /// A completion arrived for a superseded token and was dropped.
    Stale { token: GenerationToken },
}

#[derive(Debug)]
enum Stage {
    Rendering,
    Compositing { base: RgbaImage },
}

#[derive(Debug)]
struct InFlight {
    token: GenerationToken,
    request: RenderRequest,
    overlay: Option<OverlayImage>,
    stage: Stage,
}

#[derive(Debug)]
pub struct GenerationScheduler {
    config: SchedulerConfig,
    input: GenerationInput,
    deadline: Option<Instant>,
    issued: GenerationToken,
    in_flight: Option<InFlight>,
    preview: Option<GenerationResult>,
    published: bool,
    last_error: Option<RenderError>,
    last_warning: Option<OverlayError>,
}

impl Default for GenerationScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl GenerationScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            input: GenerationInput::default(),
            deadline: None,
            issued: GenerationToken::default(),
            in_flight: None,
            preview: None,
            published: false,
            last_error: None,
            last_warning: None,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn input(&self) -> &GenerationInput {
        &self.input
    }

    pub fn preview(&self) -> Option<&GenerationResult> {
        self.preview.as_ref()
    }

    /// Latest issued token.
    pub fn current_token(&self) -> GenerationToken {
        self.issued
    }

    /// When the pending debounce window fires, if one is running.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn last_error(&self) -> Option<&RenderError> {
        self.last_error.as_ref()
    }

    pub fn last_warning(&self) -> Option<&OverlayError> {
        self.last_warning.as_ref()
    }

    pub fn state(&self) -> ChannelState {
        if self.deadline.is_some() {
            return ChannelState::Debouncing;
        }
        match &self.in_flight {
            Some(InFlight {
                stage: Stage::Rendering,
                ..
            }) => ChannelState::Rendering,
            Some(InFlight {
                stage: Stage::Compositing { .. },
                ..
            }) => ChannelState::OverlayCompositing,
            None if self.published => ChannelState::Published,
            None => ChannelState::Idle,
        }
    }

    /// Apply an input change and (re)start the debounce window.
    ///
    /// Out-of-range render options are rejected and leave the channel untouched.
    pub fn submit(&mut self, change: InputChange, now: Instant) -> StudioResult<()> {
        match change {
            InputChange::Code(code) => self.input.code = code,
            InputChange::Data(data) => self.input.data = data,
            InputChange::BarcodeText(text) => self.input.barcode_text = text,
            InputChange::Matrix(m) => {
                m.validate()?;
                self.input.matrix = m;
            }
            InputChange::Linear(l) => {
                l.validate()?;
                self.input.linear = l;
            }
            InputChange::Overlay(o) => self.input.overlay = o,
        }
        self.restart_window(now);
        Ok(())
    }

    /// Show a history entry immediately and schedule a regeneration from its data.
    /// Any render in flight is superseded and its completion will be reported as stale.
    pub fn restore(&mut self, entry: &HistoryEntry, now: Instant) {
        self.issued = self.issued.next();
        self.in_flight = None;
        let result = &entry.result;
        self.input.code = result.kind;
        match &result.options {
            RenderOptions::Matrix(m) => {
                self.input.matrix = m.clone();
                self.input.data = EncodingInput::PlainText {
                    raw: result.payload.as_str().to_owned(),
                };
            }
            RenderOptions::Linear(l) => {
                self.input.linear = l.clone();
                self.input.barcode_text = result.payload.as_str().to_owned();
            }
        }
        self.preview = Some(result.clone());
        self.published = true;
        self.last_error = None;
        self.last_warning = None;
        tracing::debug!(id = entry.id, token = %self.issued, "restored history entry");
        self.restart_window(now);
    }

    fn restart_window(&mut self, now: Instant) {
        self.deadline = Some(now + self.config.debounce);
        tracing::trace!(
            debounce_ms = self.config.debounce.as_millis() as u64,
            "debounce restarted"
        );
    }

    /// Fire the debounce window if it has expired.
    pub fn poll(&mut self, now: Instant) -> Step {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.commit()
            }
            _ => Step::Idle,
        }
    }

    fn commit(&mut self) -> Step {
        let token = self.issued.next();
        self.issued = token;
        // Anything still in flight is superseded from here on.
        self.in_flight = None;

        let payload = match self.input.payload() {
            Encoded::Payload(p) => p,
            Encoded::Skipped => {
                tracing::debug!(%token, "input has no payload; clearing preview");
                self.preview = None;
                self.published = false;
                self.last_error = None;
                self.last_warning = None;
                return Step::Cleared { token };
            }
        };

        let request = match RenderRequest::new(payload, self.input.render_options()) {
            Ok(r) => r,
            Err(e) => {
                return self.fail(token, RenderError::InvalidOptions(e.to_string()));
            }
        };

        tracing::debug!(%token, code = request.code_kind().as_str(), "render committed");
        self.in_flight = Some(InFlight {
            token,
            request: request.clone(),
            overlay: self.input.active_overlay(),
            stage: Stage::Rendering,
        });
        Step::Render(RenderTicket { token, request })
    }

    /// Report the outcome of a [`RenderTicket`].
    pub fn complete_render(
        &mut self,
        token: GenerationToken,
        outcome: Result<RgbaImage, RenderError>,
        sink: &mut dyn PublishSink,
    ) -> Step {
        let current = matches!(
            &self.in_flight,
            Some(f) if f.token == token && matches!(f.stage, Stage::Rendering)
        );
        if !current {
            tracing::debug!(%token, latest = %self.issued, "discarding stale render");
            return Step::Stale { token };
        }

        let image = match outcome {
            Ok(img) => img,
            Err(error) => return self.fail(token, error),
        };

        let Some(flight) = self.in_flight.as_mut() else {
            return Step::Stale { token };
        };
        if let Some(overlay) = flight.overlay.clone() {
            flight.stage = Stage::Compositing {
                base: image.clone(),
            };
            return Step::Compose(OverlayTicket {
                token,
                base: image,
                overlay,
                fraction: self.config.overlay_fraction,
                backdrop: flight.request.options().background(),
            });
        }

        self.publish(token, image, None, sink)
    }

    /// Report the outcome of an [`OverlayTicket`]. Failures publish the base render.
    pub fn complete_overlay(
        &mut self,
        token: GenerationToken,
        outcome: Result<RgbaImage, OverlayError>,
        sink: &mut dyn PublishSink,
    ) -> Step {
        let base = match &mut self.in_flight {
            Some(InFlight {
                token: t,
                stage: Stage::Compositing { base },
                ..
            }) if *t == token => std::mem::replace(base, RgbaImage::new(0, 0)),
            _ => {
                tracing::debug!(%token, latest = %self.issued, "discarding stale overlay");
                return Step::Stale { token };
            }
        };

        match outcome {
            Ok(composed) => self.publish(token, composed, None, sink),
            Err(e) => {
                tracing::warn!(%token, error = %e, "overlay failed; publishing base render");
                self.publish(token, base, Some(e), sink)
            }
        }
    }

    fn publish(
        &mut self,
        token: GenerationToken,
        image: RgbaImage,
        warning: Option<OverlayError>,
        sink: &mut dyn PublishSink,
    ) -> Step {
        let Some(flight) = self.in_flight.take() else {
            return Step::Stale { token };
        };
        let result = GenerationResult::new(&flight.request, image, Utc::now());
        sink.published(&result);
        self.preview = Some(result);
        self.published = true;
        self.last_error = None;
        self.last_warning = warning.clone();
        tracing::debug!(%token, "published");
        Step::Published { token, warning }
    }

    fn fail(&mut self, token: GenerationToken, error: RenderError) -> Step {
        tracing::warn!(%token, error = %error, "render failed; keeping previous preview");
        self.in_flight = None;
        self.published = false;
        self.last_error = Some(error.clone());
        Step::Failed { token, error }
    }
}

/// Runs tickets inline against a renderer and compositor.
///
/// Suitable wherever rendering is synchronous; the scheduler's token checks still apply.
#[derive(Debug)]
pub struct GenerationDriver<R, C> {
    scheduler: GenerationScheduler,
    renderer: R,
    compositor: C,
}

impl<R: SymbolRenderer, C: OverlayCompositor> GenerationDriver<R, C> {
    pub fn new(scheduler: GenerationScheduler, renderer: R, compositor: C) -> Self {
        Self {
            scheduler,
            renderer,
            compositor,
        }
    }

    pub fn scheduler(&self) -> &GenerationScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut GenerationScheduler {
        &mut self.scheduler
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn submit(&mut self, change: InputChange, now: Instant) -> StudioResult<()> {
        self.scheduler.submit(change, now)
    }

    /// Poll the scheduler and run any due work to completion.
    pub fn tick(&mut self, now: Instant, sink: &mut dyn PublishSink) -> Step {
        let mut step = self.scheduler.poll(now);
        loop {
            step = match step {
                Step::Render(ticket) => {
                    let outcome = self.renderer.render(&ticket.request);
                    self.scheduler.complete_render(ticket.token, outcome, sink)
                }
                Step::Compose(ticket) => {
                    let outcome = self.compositor.compose(
                        &ticket.base,
                        &ticket.overlay,
                        ticket.fraction,
                        ticket.backdrop,
                    );
                    self.scheduler.complete_overlay(ticket.token, outcome, sink)
                }
                done => return done,
            };
        }
    }
}
