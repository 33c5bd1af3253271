use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Content hash for inline image bytes; stable within one run, which is all
/// a Content-ID needs.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

/// Content-ID for an inline MIME image, derived from the image bytes.
#[must_use]
pub fn content_id(bytes: &[u8]) -> String {
    format!("{:016x}@trendmail", content_hash(bytes))
}
