use std::io::Cursor;

use tracing::{instrument, trace};

use domain::image::IndexedImage;
use domain::palette::{PALETTE, TRANSPARENT};
use tilehawk_application::{
    error::{AppError, AppResult},
    ports::outgoing::palette_codec::PaletteCodecPort,
};

/// PNG codec for the canonical indexed form. Decoding goes through the
/// `image` crate (expanding whatever PNG variant arrives to RGBA) and then
/// the global palette; encoding writes a paletted PNG directly with the
/// `png` encoder, since the high-level API cannot emit indexed output.
#[derive(Clone, Default)]
pub struct PngPaletteCodec;

impl PngPaletteCodec {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PaletteCodecPort for PngPaletteCodec {
    #[instrument(skip(self, bytes))]
    fn decode_canonical(&self, bytes: &[u8]) -> AppResult<IndexedImage> {
        let decoded = image::load_from_memory(bytes).map_err(|e| AppError::CodecError {
            message: format!("Failed to decode image: {e}"),
        })?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        let image = PALETTE.quantize(width, height, rgba.as_raw())?;
        trace!(width, height, "canonicalized image");
        Ok(image)
    }

    #[instrument(skip(self, image))]
    fn encode_canonical(&self, image: &IndexedImage) -> AppResult<Vec<u8>> {
        let mut bytes = Vec::new();
        let mut encoder = png::Encoder::new(Cursor::new(&mut bytes), image.width(), image.height());
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(PALETTE.rgb_triples());
        encoder.set_trns(vec![TRANSPARENT]);
        let mut writer = encoder.write_header().map_err(|e| AppError::CodecError {
            message: format!("Failed to write PNG header: {e}"),
        })?;
        writer
            .write_image_data(image.as_bytes())
            .map_err(|e| AppError::CodecError {
                message: format!("Failed to write PNG data: {e}"),
            })?;
        writer.finish().map_err(|e| AppError::CodecError {
            message: format!("Failed to finish PNG stream: {e}"),
        })?;
        Ok(bytes)
    }
}
