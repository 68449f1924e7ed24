use std::ops::RangeInclusive;

use crate::foundation::core::Rgba8;
use crate::foundation::error::{StudioError, StudioResult};
use crate::payload::CanonicalPayload;

/// Which family of symbol a result belongs to.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CodeKind {
    /// 2D matrix code.
    Qr,
    /// 1D linear code.
    Barcode,
}

impl CodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Qr => "qr",
            Self::Barcode => "barcode",
        }
    }
}

/// Matrix-code error correction level (~7%, ~15%, ~25%, ~30% recovery).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorRobustness {
    #[serde(rename = "L")]
    Low,
    #[default]
    #[serde(rename = "M")]
    Medium,
    #[serde(rename = "Q")]
    Quartile,
    #[serde(rename = "H")]
    High,
}

/// Supported linear symbologies. Each has its own alphabet and length rules, enforced by the
/// renderer.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Symbology {
    #[default]
    Code128,
    Code39,
    Ean13,
    Ean8,
    #[serde(rename = "UPC")]
    UpcA,
    Itf14,
    Msi,
    #[serde(rename = "pharmacode")]
    Pharmacode,
}

pub const MATRIX_SIZE_RANGE: RangeInclusive<u32> = 128..=512;
pub const MATRIX_MARGIN_RANGE: RangeInclusive<u32> = 0..=10;
pub const BAR_WIDTH_RANGE: RangeInclusive<u32> = 1..=4;
pub const BAR_HEIGHT_RANGE: RangeInclusive<u32> = 50..=200;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MatrixOptions {
    /// Output edge length in pixels.
    pub size: u32,
    /// Quiet zone in modules.
    pub margin: u32,
    pub foreground: Rgba8,
    pub background: Rgba8,
    pub robustness: ErrorRobustness,
}

impl Default for MatrixOptions {
    fn default() -> Self {
        Self {
            size: 256,
            margin: 4,
            foreground: Rgba8::BLACK,
            background: Rgba8::WHITE,
            robustness: ErrorRobustness::Medium,
        }
    }
}

impl MatrixOptions {
    pub fn validate(&self) -> StudioResult<()> {
        check_range("matrix size", self.size, &MATRIX_SIZE_RANGE)?;
        check_range("matrix margin", self.margin, &MATRIX_MARGIN_RANGE)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LinearOptions {
    pub symbology: Symbology,
    /// Narrow bar width in pixels.
    pub bar_width: u32,
    pub bar_height: u32,
    pub show_text: bool,
}

impl Default for LinearOptions {
    fn default() -> Self {
        Self {
            symbology: Symbology::Code128,
            bar_width: 2,
            bar_height: 100,
            show_text: true,
        }
    }
}

impl LinearOptions {
    pub fn validate(&self) -> StudioResult<()> {
        check_range("bar width", self.bar_width, &BAR_WIDTH_RANGE)?;
        check_range("bar height", self.bar_height, &BAR_HEIGHT_RANGE)
    }
}

fn check_range(what: &str, v: u32, range: &RangeInclusive<u32>) -> StudioResult<()> {
    if range.contains(&v) {
        Ok(())
    } else {
        Err(StudioError::validation(format!(
            "{what} must be in [{}, {}], got {v}",
            range.start(),
            range.end()
        )))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "code", rename_all = "lowercase")]
pub enum RenderOptions {
    #[serde(rename = "qr")]
    Matrix(MatrixOptions),
    #[serde(rename = "barcode")]
    Linear(LinearOptions),
}

impl RenderOptions {
    pub fn code_kind(&self) -> CodeKind {
        match self {
            Self::Matrix(_) => CodeKind::Qr,
            Self::Linear(_) => CodeKind::Barcode,
        }
    }

    pub fn validate(&self) -> StudioResult<()> {
        match self {
            Self::Matrix(m) => m.validate(),
            Self::Linear(l) => l.validate(),
        }
    }

    /// Color that sits behind the symbol; overlays get a backdrop of this color.
    pub fn background(&self) -> Rgba8 {
        match self {
            Self::Matrix(m) => m.background,
            Self::Linear(_) => Rgba8::WHITE,
        }
    }
}

/// A validated, immutable render job. A new request is built for every regeneration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderRequest {
    payload: CanonicalPayload,
    options: RenderOptions,
}

impl RenderRequest {
    pub fn new(payload: CanonicalPayload, options: RenderOptions) -> StudioResult<Self> {
        options.validate()?;
        Ok(Self { payload, options })
    }

    pub fn payload(&self) -> &CanonicalPayload {
        &self.payload
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn code_kind(&self) -> CodeKind {
        self.options.code_kind()
    }
}
