use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};

use crate::{
    foundation::{
        core::Rgba8,
        error::{ExportError, RenderError},
    },
    history::HistoryEntry,
    options::{CodeKind, RenderOptions},
    render::{GenerationResult, SymbolRenderer},
};

const MM_PER_INCH: f64 = 25.4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ExportFormat {
    Png,
    Jpg,
    Svg,
    Pdf,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Svg => "svg",
            Self::Pdf => "pdf",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpg => "image/jpeg",
            Self::Svg => "image/svg+xml",
            Self::Pdf => "application/pdf",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportedFile {
    pub name: String,
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
}

impl ExportedFile {
    pub fn write_into(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let path = dir.join(&self.name);
        std::fs::write(&path, &self.bytes).map_err(|source| ExportError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(path)
    }
}

/// Outcome of one export request.
///
/// `Unavailable` is a notice for the user, not a failure: the format simply does not apply to
/// this kind of code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Exported {
    File(ExportedFile),
    Unavailable(String),
}

impl Exported {
    pub fn file(self) -> Option<ExportedFile> {
        match self {
            Self::File(f) => Some(f),
            Self::Unavailable(_) => None,
        }
    }
}

pub trait ExportEncoder {
    fn export(
        &self,
        result: &GenerationResult,
        format: ExportFormat,
    ) -> Result<Exported, ExportError>;
}

fn file_stem(kind: CodeKind) -> &'static str {
    match kind {
        CodeKind::Qr => "qrcode",
        CodeKind::Barcode => "barcode",
    }
}

/// `qrcode_<ms>.<ext>` or `barcode_<ms>.<ext>`.
pub fn export_file_name(kind: CodeKind, at: DateTime<Utc>, ext: &str) -> String {
    format!("{}_{}.{ext}", file_stem(kind), at.timestamp_millis())
}

/// Like [`export_file_name`] but keyed by the entry id, which is unique within a history
/// even when two entries share a millisecond.
pub fn history_file_name(entry: &HistoryEntry, ext: &str) -> String {
    format!("{}_{}.{ext}", file_stem(entry.result.kind), entry.id)
}

/// `batch_<qr|barcode>_<n>.png`, `index` is 1-based.
pub fn batch_file_name(kind: CodeKind, index: usize) -> String {
    format!("batch_{}_{index}.png", kind.as_str())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PdfFonts {
    pub dir: PathBuf,
    pub family: String,
}

/// Raster, vector and document exports of a generation result.
///
/// Vector output needs a renderer that implements [`SymbolRenderer::render_vector`]; PDF output
/// needs a font directory for `genpdf`.
#[derive(Default)]
pub struct ImageExporter<'r> {
    vector: Option<&'r dyn SymbolRenderer>,
    pdf_fonts: Option<PdfFonts>,
}

impl<'r> ImageExporter<'r> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vector_renderer(mut self, renderer: &'r dyn SymbolRenderer) -> Self {
        self.vector = Some(renderer);
        self
    }

    pub fn with_pdf_fonts(mut self, fonts: PdfFonts) -> Self {
        self.pdf_fonts = Some(fonts);
        self
    }

    fn svg(&self, result: &GenerationResult) -> Result<Exported, ExportError> {
        let RenderOptions::Matrix(matrix) = &result.options else {
            return Ok(Exported::Unavailable(
                "SVG export is only available for QR codes".to_owned(),
            ));
        };
        let renderer = self
            .vector
            .ok_or(ExportError::Render(RenderError::Unsupported("vector")))?;
        let svg = renderer.render_vector(&result.payload, matrix)?;
        Ok(Exported::File(ExportedFile {
            name: export_file_name(result.kind, result.created_at, "svg"),
            format: ExportFormat::Svg,
            bytes: svg.into_bytes(),
        }))
    }

    fn pdf(&self, result: &GenerationResult) -> Result<Vec<u8>, ExportError> {
        let fonts = self
            .pdf_fonts
            .as_ref()
            .ok_or_else(|| ExportError::Document("no PDF font directory configured".into()))?;
        let family = genpdf::fonts::from_files(&fonts.dir, &fonts.family, None).map_err(|e| {
            ExportError::Document(format!(
                "load font family '{}' from '{}': {e}",
                fonts.family,
                fonts.dir.display()
            ))
        })?;

        let mut doc = genpdf::Document::new(family);
        doc.set_title(match result.kind {
            CodeKind::Qr => "QR code",
            CodeKind::Barcode => "Barcode",
        });
        let mut decorator = genpdf::SimplePageDecorator::new();
        decorator.set_margins(10);
        doc.set_page_decorator(decorator);

        // genpdf rejects alpha channels.
        let rgb = flatten(&result.image, Rgba8::WHITE);
        let png = encode(DynamicImage::ImageRgb8(rgb.clone()), ImageFormat::Png, "png")?;

        let (width_mm, height_mm) = pdf_image_size(result.kind);
        let (px_w, px_h) = rgb.dimensions();
        let dpi = f64::from(px_w.max(1)) * MM_PER_INCH / width_mm;
        let natural_h_mm = f64::from(px_h.max(1)) * MM_PER_INCH / dpi;

        let mut element = genpdf::elements::Image::from_reader(Cursor::new(png))
            .map_err(|e| ExportError::Document(format!("embed image: {e}")))?;
        element.set_dpi(dpi);
        element.set_scale(genpdf::Scale::new(1.0, height_mm / natural_h_mm));
        element.set_alignment(genpdf::Alignment::Center);
        doc.push(element);

        let mut out = Vec::new();
        doc.render(&mut out)
            .map_err(|e| ExportError::Document(format!("render pdf: {e}")))?;
        Ok(out)
    }
}

impl ExportEncoder for ImageExporter<'_> {
    #[tracing::instrument(skip(self, result), fields(kind = result.kind.as_str()))]
    fn export(
        &self,
        result: &GenerationResult,
        format: ExportFormat,
    ) -> Result<Exported, ExportError> {
        let bytes = match format {
            ExportFormat::Png => encode(
                DynamicImage::ImageRgba8(result.image.clone()),
                ImageFormat::Png,
                "png",
            )?,
            ExportFormat::Jpg => encode(
                DynamicImage::ImageRgb8(flatten(&result.image, Rgba8::WHITE)),
                ImageFormat::Jpeg,
                "jpg",
            )?,
            ExportFormat::Svg => return self.svg(result),
            ExportFormat::Pdf => self.pdf(result)?,
        };
        Ok(Exported::File(ExportedFile {
            name: export_file_name(result.kind, result.created_at, format.extension()),
            format,
            bytes,
        }))
    }
}

/// Page placement in millimetres.
fn pdf_image_size(kind: CodeKind) -> (f64, f64) {
    match kind {
        CodeKind::Qr => (100.0, 100.0),
        CodeKind::Barcode => (100.0, 50.0),
    }
}

fn flatten(image: &RgbaImage, backdrop: Rgba8) -> RgbImage {
    let (w, h) = image.dimensions();
    let mut canvas = RgbaImage::from_pixel(w, h, backdrop.to_pixel());
    image::imageops::overlay(&mut canvas, image, 0, 0);
    DynamicImage::ImageRgba8(canvas).to_rgb8()
}

fn encode(
    image: DynamicImage,
    format: ImageFormat,
    label: &'static str,
) -> Result<Vec<u8>, ExportError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), format)
        .map_err(|e| ExportError::Encode {
            format: label,
            reason: e.to_string(),
        })?;
    Ok(buf)
}
