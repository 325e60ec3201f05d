use std::sync::Arc;

use domain::image::IndexedImage;

use crate::error::AppResult;

/// Converts between encoded image bytes and the canonical indexed form.
/// Decoding canonicalizes through the global palette; a decodable image
/// containing foreign colors is still an error.
pub trait PaletteCodecPort: Send + Sync {
    fn decode_canonical(&self, bytes: &[u8]) -> AppResult<IndexedImage>;

    /// Encodes as a paletted PNG whose decoded bytes are exactly the
    /// canonical form.
    fn encode_canonical(&self, image: &IndexedImage) -> AppResult<Vec<u8>>;
}

pub type DynPaletteCodecPort = Arc<dyn PaletteCodecPort>;
