//! Turning a resolved [`Locator`] into highlighted nodes.
//!
//! Documents with per-node identifiers are searched by attribute substring;
//! documents that only carry `[[#xxxx]]` comment markers are searched by
//! marker pairing. Page locators address a page container directly.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::codec;
use crate::config::Config;
use crate::dom::{Document, NodeId};
use crate::error::Error;
use crate::highlight;
use crate::segmenter::page_container;
use crate::surface::RenderSurface;
use crate::types::{DocumentKind, Locator};

/// Attribute spellings that have carried reference ids over the years.
pub const ID_ATTRIBUTES: &[&str] = &["data-ref", "data-reference", "data-refid", "data-highlight-id", "id"];

/// `[[#xxxx]]` inside a comment; the group is the four hex digits.
#[allow(clippy::expect_used, reason = "literal pattern")]
static MARKER_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| return Regex::new(r"\[\[#([0-9A-Fa-f]{4})\]\]").expect("valid regex"));

/// A comment marker found in the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerComment {
    /// Lowercased four-hex-digit id.
    pub id: String,
    /// The comment node.
    pub node: NodeId,
}

/// Clear the previous highlight set, then find and highlight the region
/// the locator names. Returns the scroll candidates: the direct matches for
/// attribute lookup, the highlighted span for marker lookup, or the page
/// container for page locators.
///
/// # Errors
///
/// Returns `Error::NoMatch` when nothing in the document corresponds to the
/// locator. This is a soft failure.
pub fn locate<S: RenderSurface + ?Sized>(
    surface: &mut S,
    code: &str,
    locator: &Locator,
    kind: DocumentKind,
    config: &Config,
) -> Result<Vec<NodeId>, Error> {
    highlight::clear(surface.document_mut());
    let cleaned = codec::clean(code).to_ascii_lowercase();

    let candidates = match locator {
        Locator::Page { index } => page_container(surface.document(), *index).into_iter().collect(),
        Locator::Single { .. } | Locator::Range { .. } if kind.uses_comment_markers() => {
            highlight_between_markers(surface.document_mut(), locator)
        },
        Locator::Single { .. } | Locator::Range { .. } => {
            let matches = find_by_attribute(surface.document(), &cleaned);
            for node in &matches {
                highlight::mark(surface.document_mut(), *node);
            }
            if kind.is_long_form() {
                bridge_matches(surface, &matches, config.bridge_distance_px);
            }
            matches
        },
    };

    if candidates.is_empty() {
        debug!(code = %cleaned, ?locator, ?kind, "reference matched nothing");
        return Err(Error::NoMatch { code: cleaned });
    }
    debug!(code = %cleaned, candidates = candidates.len(), "reference located");
    return Ok(candidates);
}

// ── Attribute lookup ───────────────────────────────────────────────────

/// Elements whose id-like attribute contains the cleaned code, in document
/// order. Bracket-wrapped and prefixed values match because the comparison is
/// a case-insensitive substring test.
pub fn find_by_attribute(doc: &Document, cleaned: &str) -> Vec<NodeId> {
    if cleaned.is_empty() {
        return Vec::new();
    }
    let needle = cleaned.to_ascii_lowercase();
    return doc
        .descendants(doc.root())
        .into_iter()
        .filter(|node| {
            return ID_ATTRIBUTES.iter().any(|name| {
                return doc
                    .attr(*node, name)
                    .is_some_and(|value| return value.to_ascii_lowercase().contains(&needle));
            });
        })
        .collect();
}

/// Highlight the content between consecutive matches that sit close enough
/// on screen to belong to the same passage.
fn bridge_matches<S: RenderSurface + ?Sized>(surface: &mut S, matches: &[NodeId], max_distance: f64) {
    let order = surface.document().order();
    let mut sorted = matches.to_vec();
    sorted.sort_by_key(|node| return order.position(*node));

    let pairs: Vec<(NodeId, NodeId)> = sorted
        .windows(2)
        .filter_map(|pair| {
            let (first, second) = (*pair.first()?, *pair.get(1)?);
            let distance = (surface.rect(second).y - surface.rect(first).y).abs();
            if distance >= max_distance {
                debug!(distance, "matches too far apart to bridge");
                return None;
            }
            return Some((first, second));
        })
        .collect();

    let doc = surface.document_mut();
    for (first, second) in pairs {
        let scope = doc.common_ancestor(first, second);
        highlight::highlight_range(doc, first, second, scope, false);
    }
}

// ── Comment-marker lookup ──────────────────────────────────────────────

/// Every `[[#xxxx]]` comment under the body, in document order. Ids are lowercased.
pub fn marker_comments(doc: &Document) -> Vec<MarkerComment> {
    return doc
        .descendants(doc.body())
        .into_iter()
        .filter_map(|node| {
            let text = doc.comment(node)?;
            let id = MARKER_COMMENT.captures(text)?.get(1)?.as_str().to_ascii_lowercase();
            return Some(MarkerComment { id, node });
        })
        .collect();
}

/// Resolve the locator against the body's markers and highlight the span.
/// Returns the highlighted nodes, empty when no span resolves.
fn highlight_between_markers(doc: &mut Document, locator: &Locator) -> Vec<NodeId> {
    let markers = marker_comments(doc);
    let ids: Vec<&str> = markers.iter().map(|m| return m.id.as_str()).collect();
    let Some((start, end)) = codec::resolve_marker_span(locator, &ids) else {
        warn!(?locator, markers = markers.len(), "no marker pair for reference");
        return Vec::new();
    };
    let (Some(start), Some(end)) = (markers.get(start), markers.get(end)) else {
        return Vec::new();
    };
    let scope = doc.common_ancestor(start.node, end.node);
    highlight::highlight_range(doc, start.node, end.node, scope, true);
    return highlight::highlighted(doc);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::HeadlessSurface;
    use crate::types::Rect;

    fn surface_with(markup: &str) -> HeadlessSurface {
        let mut surface = HeadlessSurface::new(800.0, 600.0);
        surface.inject(markup).unwrap();
        return surface;
    }

    fn by_id(doc: &Document, id: &str) -> NodeId {
        return doc
            .descendants(doc.root())
            .into_iter()
            .find(|node| return doc.attr(*node, "id") == Some(id))
            .unwrap();
    }

    #[test]
    fn attribute_lookup_tolerates_spellings_and_brackets() {
        let doc = Document::parse(
            r#"<p data-ref="54b9a1c0">a</p><p data-highlight-id="[54B9A1C0]">b</p><p id="x-54b9a1c0-2">c</p><p data-ref="ffff0000">d</p>"#,
        )
        .unwrap();
        assert_eq!(find_by_attribute(&doc, "54b9a1c0").len(), 3);
    }

    #[test]
    fn self_paired_code_uses_first_marker_pair() {
        let markup = "<body><p>lead</p><!--[[#54b9]]--><p>first</p><!--[[#54b9]]--><p>middle</p><!--[[#54b9]]--><p>second</p><!--[[#54b9]]--></body>";
        let mut surface = surface_with(markup);
        let locator = codec::resolve("#54b954b9", DocumentKind::InternationalFiling).unwrap();
        let found = locate(&mut surface, "#54b954b9", &locator, DocumentKind::InternationalFiling, &Config::default())
            .unwrap();
        assert!(!found.is_empty());
        let html = surface.html();
        assert!(html.contains(r#"<span class="highlighted" data-highlight-wrap="">first</span>"#));
        assert!(!html.contains(r#"data-highlight-wrap="">second"#));
        assert!(!html.contains(r#"data-highlight-wrap="">middle"#));
        assert!(!html.contains(r#"data-highlight-wrap="">lead"#));
    }

    #[test]
    fn lone_marker_is_no_match() {
        let mut surface = surface_with("<body><!--[[#54b9]]--><p>text</p></body>");
        let locator = Locator::Single { id: "54b9".to_string() };
        let err = locate(&mut surface, "#54b954b9", &locator, DocumentKind::InternationalFiling, &Config::default())
            .unwrap_err();
        assert!(matches!(err, Error::NoMatch { .. }));
    }

    #[test]
    fn long_form_bridges_nearby_matches_only() {
        let markup = r#"<div><p id="a" data-ref="54b9a1c0">hit one</p><p id="between">bridged</p><p id="b" data-ref="54b9a1c0">hit two</p><p id="gap">not bridged</p><p id="c" data-ref="54b9a1c0">hit three</p></div>"#;
        let mut surface = surface_with(markup);
        let (a, b, c) = {
            let doc = surface.document();
            (by_id(doc, "a"), by_id(doc, "b"), by_id(doc, "c"))
        };
        surface.pin_rect(a, Rect::new(0.0, 100.0, 500.0, 20.0));
        surface.pin_rect(b, Rect::new(0.0, 300.0, 500.0, 20.0));
        surface.pin_rect(c, Rect::new(0.0, 2000.0, 500.0, 20.0));
        let locator = codec::resolve("#54b9a1c0", DocumentKind::LongFormFiling).unwrap();
        let found =
            locate(&mut surface, "#54b9a1c0", &locator, DocumentKind::LongFormFiling, &Config::default()).unwrap();
        assert_eq!(found.len(), 3);
        let doc = surface.document();
        assert!(highlight::is_highlighted(doc, by_id(doc, "between")));
        assert!(!highlight::is_highlighted(doc, by_id(doc, "gap")));
    }

    #[test]
    fn new_pass_clears_previous_highlights() {
        let markup = r#"<p id="one" data-ref="11112222">a</p><p id="two" data-ref="33334444">b</p>"#;
        let mut surface = surface_with(markup);
        let config = Config::default();
        let first = codec::resolve("#11112222", DocumentKind::PaginatedFiling).unwrap();
        locate(&mut surface, "#11112222", &first, DocumentKind::PaginatedFiling, &config).unwrap();
        let second = codec::resolve("#33334444", DocumentKind::PaginatedFiling).unwrap();
        locate(&mut surface, "#33334444", &second, DocumentKind::PaginatedFiling, &config).unwrap();
        let doc = surface.document();
        assert!(!highlight::is_highlighted(doc, by_id(doc, "one")));
        assert!(highlight::is_highlighted(doc, by_id(doc, "two")));
    }
}
