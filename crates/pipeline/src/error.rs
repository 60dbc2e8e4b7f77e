/// Why a transform could not produce an output image.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Source image is empty")]
    EmptyInput,

    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode processed image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Invalid transform parameters: {0}")]
    InvalidParameters(String),
}
