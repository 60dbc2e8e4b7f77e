//! Image transform stage.
//!
//! A [`Transform`] is a pure, synchronous function from source bytes to a
//! derived image. Workers call it from a blocking thread, so
//! implementations may be CPU-heavy but must not hold state between calls.

pub mod error;
pub mod resize;

pub use error::TransformError;
pub use resize::ResizeTransform;

/// Result of a successful transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    /// Encoded output image.
    pub bytes: Vec<u8>,
    /// Derived file name, e.g. `cat_800x600.jpeg`.
    pub filename: String,
    /// Output encoding name, e.g. `jpeg`.
    pub format: &'static str,
    pub width: u32,
    pub height: u32,
}

impl TransformOutput {
    /// Output dimensions formatted as `WxH`.
    pub fn size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Turns source image bytes into a derived image.
///
/// Must be safe to call concurrently from several workers with independent
/// inputs.
pub trait Transform: Send + Sync {
    fn transform(
        &self,
        input: &[u8],
        original_filename: &str,
    ) -> Result<TransformOutput, TransformError>;
}
