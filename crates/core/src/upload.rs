//! Validation rules for uploaded images.

use crate::error::CoreError;
use crate::naming::split_extension;

/// Default upper bound on an upload request body (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 << 20;

/// Extensions the transform can decode.
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Validate the client-supplied file name of an upload.
///
/// Rules:
/// - Must not be empty or whitespace.
/// - Must not contain path separators.
/// - Extension must be one of [`SUPPORTED_IMAGE_EXTENSIONS`] (case-insensitive).
pub fn validate_image_filename(filename: &str) -> Result<(), CoreError> {
    if filename.trim().is_empty() {
        return Err(CoreError::Validation("Missing file name".into()));
    }
    if filename.contains('/') || filename.contains('\\') {
        return Err(CoreError::Validation(
            "File name must not contain path separators".into(),
        ));
    }

    let (_, ext) = split_extension(filename);
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    if !SUPPORTED_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return Err(CoreError::Validation(format!(
            "Unsupported image format '.{ext}'. Supported: {}",
            SUPPORTED_IMAGE_EXTENSIONS.join(", ")
        )));
    }
    Ok(())
}
