//! Reference-code parsing: sigil + 8 hex-like characters into a typed [`Locator`].
//!
//! The external format is not self-describing. `#54b9a1c0` names a marker
//! range from `54b9` to `a1c0`; `#54b954b9` (equal halves) names the first
//! pair of `54b9` markers. For page-oriented kinds only, a code whose length
//! is not 8 but which ends in four decimal digits is read as a zero-based page
//! index (`#0003` is the fourth page). The same string can therefore resolve
//! differently depending on the document kind it is applied to.

use tracing::debug;

use crate::error::Error;
use crate::types::{DocumentKind, Locator};

/// Leading character links carry in front of the code.
pub const SIGIL: char = '#';

/// Length of a full marker-pair code once the sigil is stripped.
const CODE_LEN: usize = 8;

/// Length of one marker id.
const MARKER_ID_LEN: usize = 4;

/// Strip the sigil and surrounding whitespace. Does not validate.
pub fn clean(code: &str) -> &str {
    let trimmed = code.trim();
    return trimmed.strip_prefix(SIGIL).unwrap_or(trimmed);
}

/// Resolve a reference code against a document kind.
///
/// # Errors
///
/// Returns `Error::InvalidReference` when the code has the wrong length for
/// the kind or contains characters outside the hex alphabet. Callers inside
/// the render pipeline treat this as "no highlight", never as a failure.
pub fn resolve(code: &str, kind: DocumentKind) -> Result<Locator, Error> {
    let cleaned = clean(code);
    let len = cleaned.chars().count();

    if len != CODE_LEN {
        if kind.is_page_oriented()
            && let Some(index) = trailing_page_index(cleaned)
        {
            debug!(code = %code, index, "reference resolved as page index");
            return Ok(Locator::Page { index });
        }
        return Err(Error::InvalidReference {
            code: code.to_string(),
            reason: format!("expected {CODE_LEN} characters after the sigil, got {len}"),
        });
    }

    if !cleaned.chars().all(|c| return c.is_ascii_hexdigit()) {
        return Err(Error::InvalidReference {
            code: code.to_string(),
            reason: "only hex characters are allowed".to_string(),
        });
    }

    let lowered = cleaned.to_ascii_lowercase();
    let (head, tail) = lowered.split_at(MARKER_ID_LEN);
    let locator = if head == tail {
        Locator::Single { id: head.to_string() }
    } else {
        Locator::Range {
            start_id: head.to_string(),
            end_id: tail.to_string(),
        }
    };
    debug!(code = %code, ?locator, "reference resolved");
    return Ok(locator);
}

/// Read the last four characters as a decimal page index.
fn trailing_page_index(cleaned: &str) -> Option<usize> {
    let chars: Vec<char> = cleaned.chars().collect();
    let start = chars.len().checked_sub(MARKER_ID_LEN)?;
    let digits: String = chars.get(start..)?.iter().collect();
    if !digits.chars().all(|c| return c.is_ascii_digit()) {
        return None;
    }
    return digits.parse().ok();
}

// ── Marker pairing ─────────────────────────────────────────────────────

/// Consecutive same-id occurrences form semantic pairs: the 1st and 2nd
/// bound one range, the 3rd and 4th the next. Pairing advances by two so a
/// lone marker is never treated as its own zero-width range. Yields indices
/// into `ids`.
pub fn marker_pairs<S: AsRef<str>>(ids: &[S], id: &str) -> Vec<(usize, usize)> {
    let positions: Vec<usize> = ids
        .iter()
        .enumerate()
        .filter(|(_, candidate)| return candidate.as_ref().eq_ignore_ascii_case(id))
        .map(|(i, _)| return i)
        .collect();
    return positions
        .chunks_exact(2)
        .filter_map(|pair| return Some((*pair.first()?, *pair.get(1)?)))
        .collect();
}

/// Resolve a marker locator against the ids of all markers in document
/// order. Returns the `(start, end)` marker indices that bound the span.
/// `Page` locators never resolve against markers.
pub fn resolve_marker_span<S: AsRef<str>>(locator: &Locator, ids: &[S]) -> Option<(usize, usize)> {
    return match locator {
        Locator::Single { id } => marker_pairs(ids, id).first().copied(),
        Locator::Range { start_id, end_id } => {
            let start = ids
                .iter()
                .position(|candidate| return candidate.as_ref().eq_ignore_ascii_case(start_id))?;
            let after = ids.get(start.saturating_add(1)..)?;
            let offset = after
                .iter()
                .position(|candidate| return candidate.as_ref().eq_ignore_ascii_case(end_id))?;
            Some((start, start.saturating_add(1).saturating_add(offset)))
        },
        Locator::Page { .. } => None,
    };
}
