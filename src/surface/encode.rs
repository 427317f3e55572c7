use crate::error::CanvasError;
use base64::{engine::general_purpose::STANDARD, Engine};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};
use tracing::debug;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Encode the canvas as a PNG data URL
pub fn to_png_data_url(image: &RgbaImage) -> Result<String, CanvasError> {
    let mut output = Vec::new();
    DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut std::io::Cursor::new(&mut output), ImageFormat::Png)
        .map_err(|e| CanvasError::Encode {
            details: e.to_string(),
        })?;

    debug!(
        "Encoded {}x{} canvas into {} PNG bytes",
        image.width(),
        image.height(),
        output.len()
    );
    Ok(format!("{}{}", PNG_DATA_URL_PREFIX, STANDARD.encode(output)))
}

/// Decode a PNG data URL
pub fn from_png_data_url(data_url: &str) -> Result<RgbaImage, CanvasError> {
    let payload = data_url
        .strip_prefix(PNG_DATA_URL_PREFIX)
        .ok_or(CanvasError::InvalidDataUrl)?;
    let bytes = STANDARD.decode(payload.trim()).map_err(|e| CanvasError::Decode {
        details: e.to_string(),
    })?;

    let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
        .map_err(|e| CanvasError::Decode {
            details: e.to_string(),
        })?
        .to_rgba8();
    Ok(image)
}

/// Stretch `image` to exactly `width` x `height`
pub(crate) fn fit_to(image: RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image;
    }
    imageops::resize(&image, width, height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_data_url_prefix() {
        let image = RgbaImage::from_pixel(4, 2, Rgba([0, 0, 0, 0]));
        let url = to_png_data_url(&image).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));

        let decoded = from_png_data_url(&url).unwrap();
        assert_eq!(decoded.dimensions(), (4, 2));
    }

    #[test]
    fn test_rejects_foreign_urls() {
        assert_eq!(
            from_png_data_url("data:image/jpeg;base64,AAAA"),
            Err(CanvasError::InvalidDataUrl)
        );
        assert!(matches!(
            from_png_data_url("data:image/png;base64,%%%"),
            Err(CanvasError::Decode { .. })
        ));
        assert!(matches!(
            from_png_data_url("data:image/png;base64,AAAA"),
            Err(CanvasError::Decode { .. })
        ));
    }

    #[test]
    fn test_fit_to_stretches() {
        let image = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        assert_eq!(fit_to(image.clone(), 10, 10).dimensions(), (10, 10));
        assert_eq!(fit_to(image, 20, 5).dimensions(), (20, 5));
    }
}
