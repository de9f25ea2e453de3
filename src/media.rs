//! Image transcoding helpers.
//!
//! Drafts store their image inline as base64 JPEG (quality 85) so the whole
//! draft fits in one JSON document; platform adapters get the raw bytes back.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;

use crate::error::MediaError;

const JPEG_QUALITY: u8 = 85;

/// Re-encode an image (any supported format) to JPEG quality 85 and return
/// it base64-encoded for storage inside the draft record.
pub fn to_jpeg_base64(image_bytes: &[u8]) -> Result<String, MediaError> {
    let img = image::load_from_memory(image_bytes)?;
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    encoder.encode_image(&rgb)?;
    Ok(BASE64.encode(&out))
}

/// Decode a stored base64 image back to raw bytes. Whitespace is tolerated
/// (the GitHub Contents API wraps base64 payloads in newlines).
pub fn decode_base64(b64: &str) -> Result<Vec<u8>, MediaError> {
    let compact: String = b64.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(BASE64.decode(compact.as_bytes())?)
}

/// Encode raw bytes to base64 without transcoding.
pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Detect the MIME content type from the image's magic bytes. Defaults to
/// JPEG, which is what the draft pipeline stores.
pub fn detect_content_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 100, 50]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn png_is_reencoded_to_jpeg_base64() {
        let b64 = to_jpeg_base64(&tiny_png()).unwrap();
        let jpeg = decode_base64(&b64).unwrap();
        assert!(jpeg.starts_with(&[0xFF, 0xD8]), "expected JPEG magic bytes");
        assert_eq!(detect_content_type(&jpeg), "image/jpeg");
    }

    #[test]
    fn decode_tolerates_whitespace() {
        let encoded = encode_base64(b"hello world");
        let wrapped = format!("{}\n{}", &encoded[..8], &encoded[8..]);
        assert_eq!(decode_base64(&wrapped).unwrap(), b"hello world");
    }

    #[test]
    fn content_type_detection() {
        assert_eq!(detect_content_type(&tiny_png()), "image/png");
        assert_eq!(detect_content_type(&[0xFF, 0xD8, 0xFF]), "image/jpeg");
        assert_eq!(detect_content_type(b"GIF89a..."), "image/gif");
        assert_eq!(
            detect_content_type(b"RIFF\x00\x00\x00\x00WEBPVP8 "),
            "image/webp"
        );
    }

    #[test]
    fn garbage_input_is_an_error() {
        assert!(to_jpeg_base64(b"not an image").is_err());
        assert!(decode_base64("!!!not base64!!!").is_err());
    }
}
