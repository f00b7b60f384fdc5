/// Content-derived document identity.
use sha2::{Digest as _, Sha256};

/// SHA-256 hex digest of the markup. Identical content always maps to the
/// same id, so re-rendering it counts as the same document.
pub fn document_id(markup: &str) -> String {
    let hash = Sha256::digest(markup.as_bytes());
    return format!("{hash:x}");
}
