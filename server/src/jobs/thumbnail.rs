use image::ColorType;
use image::codecs::jpeg::JpegEncoder;

use crate::jobs::PlateProcessError;

/// Normalizes image bytes into a baseline JPEG rendition.
///
/// Bytes that already are JPEG pass through unchanged. Any other format
/// the decoder understands is re-encoded at the given quality. Pixel
/// dimensions are never altered.
pub(crate) fn ensure_jpeg(bytes: &[u8], quality: u8) -> Result<Vec<u8>, PlateProcessError> {
    let format = image::guess_format(bytes)
        .map_err(|err| PlateProcessError::UnsupportedFormat(err.to_string()))?;
    if format == image::ImageFormat::Jpeg {
        return Ok(bytes.to_vec());
    }

    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(|err| PlateProcessError::UnsupportedFormat(err.to_string()))?;
    let rgb = image.to_rgb8();
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder
        .encode(&rgb, rgb.width(), rgb.height(), ColorType::Rgb8.into())
        .map_err(|err| PlateProcessError::UnsupportedFormat(err.to_string()))?;
    Ok(buffer)
}
