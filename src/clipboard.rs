//! Clipboard paste primitive.
//!
//! Uses arboard for native clipboard access — the host forwards its paste
//! key combination here, the core persists the raster as a transient and
//! treats it like a local file from then on.

use image::RgbaImage;

#[derive(Debug, thiserror::Error)]
pub enum ClipboardError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),
    #[error("clipboard holds no image")]
    NoImage,
    #[error("clipboard image data is malformed")]
    Malformed,
}

/// Read the current clipboard image as an RGBA buffer.
pub fn read_image() -> Result<RgbaImage, ClipboardError> {
    let mut clipboard =
        arboard::Clipboard::new().map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
    let image = clipboard.get_image().map_err(|_| ClipboardError::NoImage)?;
    let (width, height) = (image.width as u32, image.height as u32);
    RgbaImage::from_raw(width, height, image.bytes.into_owned())
        .ok_or(ClipboardError::Malformed)
}
