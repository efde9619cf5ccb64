//! Image payload helpers.

use base64::{engine::general_purpose::STANDARD, Engine};

/// MIME type assumed when the payload cannot be recognised.
pub const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Detect the MIME type of a base64-encoded image from its magic bytes.
///
/// Only the first 16 base64 characters are decoded.
pub fn sniff_image_mime(b64: &str) -> &'static str {
    let prefix: String = b64.chars().filter(|c| !c.is_whitespace()).take(16).collect();
    let Ok(bytes) = STANDARD.decode(prefix.as_bytes()) else {
        return DEFAULT_IMAGE_MIME;
    };

    match bytes.as_slice() {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        [b'B', b'M', ..] => "image/bmp",
        _ => DEFAULT_IMAGE_MIME,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_png_and_jpeg() {
        let png = STANDARD.encode([0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0]);
        assert_eq!(sniff_image_mime(&png), "image/png");

        let jpeg = STANDARD.encode([0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F', 0, 1]);
        assert_eq!(sniff_image_mime(&jpeg), "image/jpeg");
    }

    #[test]
    fn detects_webp() {
        let webp = STANDARD.encode(*b"RIFF\x00\x00\x00\x00WEBPVP8 ");
        assert_eq!(sniff_image_mime(&webp), "image/webp");
    }

    #[test]
    fn garbage_defaults_to_png() {
        assert_eq!(sniff_image_mime("not base64 at all!!"), DEFAULT_IMAGE_MIME);
        assert_eq!(sniff_image_mime(""), DEFAULT_IMAGE_MIME);
    }
}
