use std::io::Cursor;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use image::RgbaImage;

use crate::{
    foundation::error::{RenderError, StudioError, StudioResult},
    options::{CodeKind, MatrixOptions, RenderOptions, RenderRequest},
    payload::CanonicalPayload,
};

const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Draws a symbol for a canonical payload.
///
/// The drawing algorithm itself (module placement, error correction, check digits) lives
/// outside this crate. Implementations must reject payloads that violate symbology constraints
/// with a [`RenderError`] rather than truncating them.
pub trait SymbolRenderer {
    /// Render the request into a straight-alpha RGBA8 raster.
    fn render(&self, request: &RenderRequest) -> Result<RgbaImage, RenderError>;

    /// Render a matrix code as an SVG document.
    ///
    /// Linear codes never reach this method; vector export is only defined for matrix codes.
    fn render_vector(
        &self,
        _payload: &CanonicalPayload,
        _options: &MatrixOptions,
    ) -> Result<String, RenderError> {
        Err(RenderError::Unsupported("vector"))
    }
}

impl<R: SymbolRenderer + ?Sized> SymbolRenderer for &R {
    fn render(&self, request: &RenderRequest) -> Result<RgbaImage, RenderError> {
        (**self).render(request)
    }

    fn render_vector(
        &self,
        payload: &CanonicalPayload,
        options: &MatrixOptions,
    ) -> Result<String, RenderError> {
        (**self).render_vector(payload, options)
    }
}

/// A successfully rendered symbol. Immutable once created.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationResult {
    pub kind: CodeKind,
    pub payload: CanonicalPayload,
    pub options: RenderOptions,
    pub image: RgbaImage,
    pub created_at: DateTime<Utc>,
}

impl GenerationResult {
    pub fn new(request: &RenderRequest, image: RgbaImage, created_at: DateTime<Utc>) -> Self {
        Self {
            kind: request.code_kind(),
            payload: request.payload().clone(),
            options: request.options().clone(),
            image,
            created_at,
        }
    }

    /// Encode the image as a `data:image/png;base64,...` URI.
    pub fn to_data_uri(&self) -> StudioResult<String> {
        encode_png_data_uri(&self.image)
    }
}

pub fn encode_png(image: &RgbaImage) -> StudioResult<Vec<u8>> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| StudioError::Other(anyhow::Error::new(e).context("encode png")))?;
    Ok(buf)
}

pub fn encode_png_data_uri(image: &RgbaImage) -> StudioResult<String> {
    let png = encode_png(image)?;
    let mut out = String::with_capacity(PNG_DATA_URI_PREFIX.len() + png.len() * 4 / 3 + 4);
    out.push_str(PNG_DATA_URI_PREFIX);
    base64::engine::general_purpose::STANDARD.encode_string(&png, &mut out);
    Ok(out)
}

/// Decode any `data:image/...;base64,` URI back into RGBA8 pixels.
pub fn decode_image_data_uri(uri: &str) -> StudioResult<RgbaImage> {
    let (header, body) = uri
        .split_once(',')
        .ok_or_else(|| StudioError::serde("data uri is missing ','"))?;
    if !header.starts_with("data:image/") || !header.ends_with(";base64") {
        return Err(StudioError::serde(format!(
            "unsupported data uri header '{header}'"
        )));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(body)
        .map_err(|e| StudioError::serde(format!("data uri base64: {e}")))?;
    let img = image::load_from_memory(&bytes)
        .map_err(|e| StudioError::serde(format!("data uri image: {e}")))?;
    Ok(img.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_keeps_pixels() {
        let img = RgbaImage::from_raw(2, 1, vec![10, 20, 30, 255, 0, 0, 0, 0]).unwrap();
        let uri = encode_png_data_uri(&img).unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));

        let back = decode_image_data_uri(&uri).unwrap();
        assert_eq!(back.dimensions(), (2, 1));
        assert_eq!(back.as_raw(), img.as_raw());
    }

    #[test]
    fn malformed_data_uris_fail() {
        assert!(decode_image_data_uri("not a uri").is_err());
        assert!(decode_image_data_uri("data:text/plain;base64,aGk=").is_err());
        assert!(decode_image_data_uri("data:image/png;base64,!!!").is_err());
        assert!(decode_image_data_uri("data:image/png;base64,aGk=").is_err());
    }
}
