//! Fixed-width resize to JPEG.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use imgproc_core::naming::derived_filename;

use crate::error::TransformError;
use crate::{Transform, TransformOutput};

/// Default output width in pixels.
pub const DEFAULT_TARGET_WIDTH: u32 = 800;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Output encoding name, also used as the derived file extension.
const OUTPUT_FORMAT: &str = "jpeg";

/// Resize to a fixed width, preserving aspect ratio, and re-encode as JPEG.
///
/// Images narrower than the target are scaled up. Alpha is dropped because
/// JPEG has no alpha channel.
#[derive(Debug, Clone, Copy)]
pub struct ResizeTransform {
    pub target_width: u32,
    pub quality: u8,
}

impl Default for ResizeTransform {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_TARGET_WIDTH,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ResizeTransform {
    pub fn new(target_width: u32, quality: u8) -> Result<Self, TransformError> {
        if target_width == 0 {
            return Err(TransformError::InvalidParameters(
                "target width must be positive".into(),
            ));
        }
        if !(1..=100).contains(&quality) {
            return Err(TransformError::InvalidParameters(format!(
                "JPEG quality must be within 1..=100, got {quality}"
            )));
        }
        Ok(Self {
            target_width,
            quality,
        })
    }
}

/// Height that keeps `width x height` proportional at `target_width`.
///
/// Rounded to the nearest pixel and never below 1.
pub fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    if width == 0 {
        return 1;
    }
    let scaled = (u64::from(height) * u64::from(target_width) + u64::from(width) / 2)
        / u64::from(width);
    scaled.clamp(1, u64::from(u32::MAX)) as u32
}

impl Transform for ResizeTransform {
    fn transform(
        &self,
        input: &[u8],
        original_filename: &str,
    ) -> Result<TransformOutput, TransformError> {
        if input.is_empty() {
            return Err(TransformError::EmptyInput);
        }

        let img = image::load_from_memory(input).map_err(TransformError::Decode)?;
        tracing::debug!(
            width = img.width(),
            height = img.height(),
            "Image decoded",
        );

        let width = self.target_width;
        let height = scaled_height(img.width(), img.height(), width);
        let rgb = img
            .resize_exact(width, height, FilterType::Lanczos3)
            .to_rgb8();

        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, self.quality)
            .encode_image(&rgb)
            .map_err(TransformError::Encode)?;

        tracing::debug!(width, height, bytes = bytes.len(), "Image resized and encoded");

        Ok(TransformOutput {
            bytes,
            filename: derived_filename(original_filename, width, height, OUTPUT_FORMAT),
            format: OUTPUT_FORMAT,
            width,
            height,
        })
    }
}
