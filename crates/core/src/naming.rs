//! File naming rules for stored blobs and derived images.

/// Split a file name into stem and extension (extension keeps its dot).
///
/// Only the final path component is considered, so `"a.b/c"` has no
/// extension. A name without a dot returns an empty extension.
pub fn split_extension(filename: &str) -> (&str, &str) {
    let base_start = filename.rfind('/').map_or(0, |i| i + 1);
    match filename[base_start..].rfind('.') {
        Some(dot) => filename.split_at(base_start + dot),
        None => (filename, ""),
    }
}

/// Name of the derivative produced from `original`, e.g. `cat_800x600.jpeg`.
pub fn derived_filename(original: &str, width: u32, height: u32, extension: &str) -> String {
    let (stem, _) = split_extension(original);
    format!("{stem}_{width}x{height}.{extension}")
}

/// Storage key for `filename` with a nanosecond timestamp embedded before
/// the extension, e.g. `cat_1700000000000000000.png`.
pub fn timestamped_key(filename: &str, nanos: i64) -> String {
    let (stem, ext) = split_extension(filename);
    format!("{stem}_{nanos}{ext}")
}

/// Current UTC time in nanoseconds since the epoch.
///
/// Falls back to microsecond precision scaled up if the nanosecond value
/// does not fit an `i64` (after year 2262).
pub fn now_nanos() -> i64 {
    let now = chrono::Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000))
}

/// HTTP content type for a stored image, derived from its extension.
pub fn content_type_for(key: &str) -> &'static str {
    let (_, ext) = split_extension(key);
    match ext.to_ascii_lowercase().as_str() {
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
