use std::io::Cursor;

use image::{ImageFormat, ImageReader};

/// Sniff the MIME type of an encoded image from its leading bytes
pub fn detect_mime_type(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Bmp => Some("image/bmp"),
        ImageFormat::Avif => Some("image/avif"),
        _ => None,
    }
}

/// Width and height read from the image header, without decoding pixels
pub fn dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Same type once aliases like `image/jpg` are folded together
pub fn same_mime_type(declared: &str, detected: &str) -> bool {
    let normalize = |value: &str| match value {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        other => other.to_string(),
    };
    normalize(&declared.to_ascii_lowercase()) == normalize(&detected.to_ascii_lowercase())
}
