//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod processed_image_repo;
pub mod task_repo;

pub use processed_image_repo::ProcessedImageRepo;
pub use task_repo::TaskRepo;
