use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use image::DynamicImage;

use crate::error::DetectError;

/// Standard alphabet, padding optional.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Strip an optional data-URI header (`data:image/jpeg;base64,`).
pub(crate) fn strip_data_uri(payload: &str) -> &str {
    match payload.find(',') {
        Some(idx) => &payload[idx + 1..],
        None => payload,
    }
}

/// Decode a base64 photo, with or without a data-URI header, into a bitmap.
pub fn decode_image(payload: &str) -> Result<DynamicImage, DetectError> {
    let data: String = strip_data_uri(payload)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if data.is_empty() {
        return Err(DetectError::Decode);
    }
    let bytes = LENIENT.decode(data.as_bytes()).map_err(|e| {
        log::debug!("base64 decode failed: {}", e);
        DetectError::Decode
    })?;
    image::load_from_memory(&bytes).map_err(|e| {
        log::debug!("image decode failed: {}", e);
        DetectError::Decode
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_base64() -> String {
        let img = RgbImage::from_pixel(3, 2, Rgb([200, 100, 50]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        STANDARD.encode(bytes)
    }

    #[test]
    fn decodes_plain_and_data_uri_payloads() {
        let b64 = png_base64();
        let plain = decode_image(&b64).unwrap();
        assert_eq!((plain.width(), plain.height()), (3, 2));

        let uri = format!("data:image/png;base64,{}", b64);
        let from_uri = decode_image(&uri).unwrap();
        assert_eq!(from_uri.to_rgb8(), plain.to_rgb8());
    }

    #[test]
    fn tolerates_line_breaks_and_missing_padding() {
        let b64 = png_base64();
        let wrapped: String = b64
            .trim_end_matches('=')
            .as_bytes()
            .chunks(16)
            .map(|chunk| std::str::from_utf8(chunk).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        assert!(decode_image(&wrapped).is_ok());
    }

    #[test]
    fn rejects_non_base64_and_non_images() {
        assert!(matches!(decode_image("%%%not base64%%%"), Err(DetectError::Decode)));
        let text = STANDARD.encode(b"hello, this is not an image");
        assert!(matches!(decode_image(&text), Err(DetectError::Decode)));
        assert!(matches!(decode_image("data:image/png;base64,"), Err(DetectError::Decode)));
    }
}
