//! Frame encoding: `DynamicImage` → JPEG bytes + base64 transport string.
//!
//! The same JPEG bytes are written to the job's `frames/` directory and,
//! base64-wrapped, attached to the vision request, so what the model sees is
//! exactly what the rendered tutorial links to. JPEG is used instead of the
//! lossless PNG the decoder emits: video frames are already lossy, and a
//! step may ship up to eight of them in one request.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

/// An encoded frame.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// JPEG file contents.
    pub jpeg: Vec<u8>,
    /// `jpeg` in standard base64.
    pub base64: String,
}

/// Encode a decoded frame as JPEG at `quality` (1–100).
///
/// The JPEG encoder has no alpha support, so the frame is flattened to RGB
/// first.
pub fn encode_frame(img: &DynamicImage, quality: u8) -> Result<EncodedFrame, image::ImageError> {
    let rgb = img.to_rgb8();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)).encode_image(&rgb)?;

    let base64 = STANDARD.encode(&jpeg);
    debug!(
        "Encoded {}x{} frame → {} bytes JPEG, {} bytes base64",
        rgb.width(),
        rgb.height(),
        jpeg.len(),
        base64.len()
    );

    Ok(EncodedFrame { jpeg, base64 })
}
