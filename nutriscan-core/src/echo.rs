//! Re-encodes an uploaded image as an embeddable `data:` URI.

use crate::config::EchoFormat;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageResult};

/// Echo settings for the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoOptions {
    pub format: EchoFormat,
    /// JPEG quality; lossless WebP ignores it.
    pub quality: u8,
}

impl Default for EchoOptions {
    fn default() -> Self {
        Self {
            format: EchoFormat::Jpeg,
            quality: 80,
        }
    }
}

/// Encode `image` with `options` and wrap it as `data:<mime>;base64,<payload>`.
pub fn encode_data_uri(image: &DynamicImage, options: EchoOptions) -> ImageResult<String> {
    let mut buf = Vec::new();
    match options.format {
        EchoFormat::Webp => {
            let encoder = WebPEncoder::new_lossless(&mut buf);
            if image.color().has_alpha() {
                let rgba = image.to_rgba8();
                encoder.write_image(
                    rgba.as_raw(),
                    rgba.width(),
                    rgba.height(),
                    ExtendedColorType::Rgba8,
                )?;
            } else {
                let rgb = image.to_rgb8();
                encoder.write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    ExtendedColorType::Rgb8,
                )?;
            }
        }
        EchoFormat::Jpeg => {
            let rgb = image.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, options.quality.clamp(1, 100)).write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )?;
        }
    }
    Ok(format!(
        "data:{};base64,{}",
        options.format.mime_type(),
        STANDARD.encode(&buf)
    ))
}
