//! Choosing which match to bring into view, and how to scroll to it.

use std::time::Duration;

use tracing::debug;

use crate::config::Config;
use crate::dom::{Document, NodeId};
use crate::highlight;
use crate::surface::{RenderSurface, is_block_tag};
use crate::types::{DocumentKind, Point, ScrollBehavior};

/// Class substring that marks a transcript speaker name.
const SPEAKER_MARKER: &str = "speaker";

/// Class substrings of the named transcript sections.
const TRANSCRIPT_SECTIONS: &[&str] = &["qa-part", "remarks-part"];

// ── Target selection ───────────────────────────────────────────────────

/// Pick the one candidate to reveal. `None` only when there are no candidates.
pub fn select<S: RenderSurface + ?Sized>(
    surface: &S,
    candidates: &[NodeId],
    kind: DocumentKind,
    config: &Config,
) -> Option<NodeId> {
    let doc = surface.document();
    let order = doc.order();
    let mut sorted = candidates.to_vec();
    sorted.sort_by_key(|node| return order.position(*node));
    sorted.dedup();

    if sorted.len() <= 1 {
        return sorted.first().copied();
    }

    if kind.is_transcript()
        && let Some(attributed) = sorted.iter().copied().find(|node| return has_speaker_attribution(doc, *node))
    {
        debug!(node = attributed.index(), "transcript target chosen by speaker attribution");
        return Some(attributed);
    }

    let threshold = if kind.is_transcript() {
        config.transcript_cluster_px
    } else {
        config.filing_cluster_px
    };
    let positions: Vec<f64> = sorted.iter().map(|node| return surface.rect(*node).y).collect();
    let pick = pick_from_positions(&positions, threshold, kind.is_transcript())?;
    return sorted.get(pick).copied();
}

/// Cluster vertical positions (already in document order) and return the
/// index of the representative: the first of the largest cluster when
/// `take_first`, else its middle element. Ties go to the earliest cluster.
pub fn pick_from_positions(positions: &[f64], threshold: f64, take_first: bool) -> Option<usize> {
    let mut clusters: Vec<(usize, usize)> = Vec::new();
    let mut previous: Option<f64> = None;
    for (i, y) in positions.iter().enumerate() {
        match (previous, clusters.last_mut()) {
            (Some(prev), Some((_, len))) if (y - prev).abs() < threshold => *len = len.saturating_add(1),
            _ => clusters.push((i, 1)),
        }
        previous = Some(*y);
    }

    let mut best: Option<(usize, usize)> = None;
    for cluster in clusters {
        if best.is_none_or(|(_, len)| return cluster.1 > len) {
            best = Some(cluster);
        }
    }
    let (start, len) = best?;
    let offset = if take_first { 0 } else { len / 2 };
    debug!(start, len, offset, "largest cluster");
    return Some(start.saturating_add(offset));
}

/// Whether the enclosing paragraph names a speaker.
fn has_speaker_attribution(doc: &Document, node: NodeId) -> bool {
    let Some(paragraph) = doc.closest_tag(node, "p") else {
        return false;
    };
    return doc
        .descendants(paragraph)
        .into_iter()
        .any(|inner| return class_contains(doc, inner, SPEAKER_MARKER));
}

/// Case-insensitive substring test over the class attribute.
fn class_contains(doc: &Document, node: NodeId, needle: &str) -> bool {
    return doc
        .attr(node, "class")
        .is_some_and(|classes| return classes.to_ascii_lowercase().contains(needle));
}

// ── Scroll execution ───────────────────────────────────────────────────

/// Whether a scroll landed or must be retried once layout settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollStatus {
    /// The target had a box and the viewport moved to it.
    Settled,
    /// The target had no box yet.
    Unsettled,
}

/// Linear backoff: attempt `n` waits `n * base`.
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    return base.saturating_mul(attempt);
}

/// Scroll to `target` the way its document kind expects.
pub fn execute<S: RenderSurface + ?Sized>(
    surface: &mut S,
    target: NodeId,
    kind: DocumentKind,
    behavior: ScrollBehavior,
    config: &Config,
) -> ScrollStatus {
    if kind.is_transcript() {
        reveal_transcript(surface, target, behavior, config);
        return ScrollStatus::Settled;
    }
    if kind.is_long_form() {
        return reveal_topmost_highlight(surface, behavior);
    }
    reveal_block(surface, target, behavior);
    return ScrollStatus::Settled;
}

/// Scroll to the first highlighted node in document order, provided it has
/// been laid out. Layout can move after highlighting, so the node is looked
/// up fresh on every attempt.
pub fn reveal_topmost_highlight<S: RenderSurface + ?Sized>(surface: &mut S, behavior: ScrollBehavior) -> ScrollStatus {
    let Some(topmost) = highlight::highlighted(surface.document()).first().copied() else {
        return ScrollStatus::Unsettled;
    };
    if surface.rect(topmost).is_collapsed() {
        debug!(node = topmost.index(), "topmost highlight has no box yet");
        return ScrollStatus::Unsettled;
    }
    surface.reveal(topmost, behavior);
    return ScrollStatus::Settled;
}

/// Transcripts: a long speaker turn scrolls to the target itself, otherwise
/// the nearest paragraph or named section sits just below the top edge.
pub fn reveal_transcript<S: RenderSurface + ?Sized>(
    surface: &mut S,
    target: NodeId,
    behavior: ScrollBehavior,
    config: &Config,
) {
    let doc = surface.document();
    let paragraph = doc.closest_tag(target, "p");
    let tall = paragraph.is_some_and(|p| {
        return surface.rect(p).height > config.tall_paragraph_ratio * surface.viewport().height;
    });
    let anchor = if tall {
        target
    } else {
        paragraph
            .or_else(|| {
                return doc.closest(target, |d, node| {
                    return TRANSCRIPT_SECTIONS.iter().any(|section| return class_contains(d, node, section));
                });
            })
            .unwrap_or(target)
    };
    let y = surface.rect(anchor).y - config.transcript_scroll_offset_px;
    let x = surface.viewport().scroll_x;
    surface.scroll_to(Point { x, y }, behavior);
}

/// Bring the nearest block-level ancestor (or the target) to the top edge.
pub fn reveal_block<S: RenderSurface + ?Sized>(surface: &mut S, target: NodeId, behavior: ScrollBehavior) {
    let block = surface
        .document()
        .closest(target, |doc, node| return doc.tag(node).is_some_and(is_block_tag))
        .unwrap_or(target);
    surface.reveal(block, behavior);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::HeadlessSurface;
    use crate::types::Rect;

    fn nodes_by_tag(doc: &Document, tag: &str) -> Vec<NodeId> {
        return doc.descendants(doc.root()).into_iter().filter(|n| return doc.tag(*n) == Some(tag)).collect();
    }

    #[test]
    fn filing_picks_middle_of_largest_cluster() {
        let positions = [0.0, 50.0, 600.0, 640.0, 680.0];
        assert_eq!(pick_from_positions(&positions, 500.0, false), Some(3));
    }

    #[test]
    fn transcript_picks_first_of_largest_cluster() {
        let positions = [0.0, 700.0, 750.0, 790.0];
        assert_eq!(pick_from_positions(&positions, 200.0, true), Some(1));
    }

    #[test]
    fn equal_clusters_prefer_the_first() {
        let positions = [0.0, 10.0, 2000.0, 2010.0];
        assert_eq!(pick_from_positions(&positions, 500.0, false), Some(1));
    }

    #[test]
    fn select_uses_rendered_positions() {
        let mut surface = HeadlessSurface::new(800.0, 600.0);
        surface.inject("<span>a</span><span>b</span><span>c</span><span>d</span><span>e</span>").unwrap();
        let spans = nodes_by_tag(surface.document(), "span");
        for (span, y) in spans.iter().zip([0.0, 50.0, 600.0, 640.0, 680.0]) {
            surface.pin_rect(*span, Rect::new(0.0, y, 10.0, 20.0));
        }
        let reversed: Vec<NodeId> = spans.iter().rev().copied().collect();
        let chosen = select(&surface, &reversed, DocumentKind::PaginatedFiling, &Config::default());
        assert_eq!(chosen, spans.get(3).copied());
    }

    #[test]
    fn speaker_paragraph_overrides_clustering() {
        let mut surface = HeadlessSurface::new(800.0, 600.0);
        surface
            .inject(r#"<p><b>x</b></p><p><b>y</b></p><p><span class="speaker-name">CFO</span><b>z</b></p>"#)
            .unwrap();
        let hits = nodes_by_tag(surface.document(), "b");
        let chosen = select(&surface, &hits, DocumentKind::Transcript, &Config::default());
        assert_eq!(chosen, hits.get(2).copied());
    }

    #[test]
    fn single_and_empty_candidates() {
        let mut surface = HeadlessSurface::new(800.0, 600.0);
        surface.inject("<p>a</p>").unwrap();
        let p = nodes_by_tag(surface.document(), "p");
        assert_eq!(select(&surface, &p, DocumentKind::Transcript, &Config::default()), p.first().copied());
        assert_eq!(select(&surface, &[], DocumentKind::Transcript, &Config::default()), None);
    }

    #[test]
    fn backoff_grows_linearly() {
        let base = Duration::from_millis(100);
        assert_eq!(retry_delay(base, 1), Duration::from_millis(100));
        assert_eq!(retry_delay(base, 3), Duration::from_millis(300));
    }

    #[test]
    fn transcript_offsets_short_paragraphs() {
        let mut surface = HeadlessSurface::new(800.0, 600.0);
        surface.inject("<p>intro</p><p>turn <b>hit</b></p>").unwrap();
        let paragraphs = nodes_by_tag(surface.document(), "p");
        let target = *nodes_by_tag(surface.document(), "b").first().unwrap();
        let second = *paragraphs.get(1).unwrap();
        surface.pin_rect(second, Rect::new(0.0, 300.0, 800.0, 40.0));
        surface.pin_rect(target, Rect::new(0.0, 320.0, 30.0, 20.0));
        reveal_transcript(&mut surface, target, ScrollBehavior::Smooth, &Config::default());
        assert!((surface.viewport().scroll_y - 280.0).abs() < f64::EPSILON);
    }

    #[test]
    fn transcript_long_turn_scrolls_to_target() {
        let mut surface = HeadlessSurface::new(800.0, 600.0);
        surface.inject("<p>long turn <b>hit</b></p>").unwrap();
        let p = *nodes_by_tag(surface.document(), "p").first().unwrap();
        let target = *nodes_by_tag(surface.document(), "b").first().unwrap();
        surface.pin_rect(p, Rect::new(0.0, 100.0, 800.0, 2000.0));
        surface.pin_rect(target, Rect::new(0.0, 1500.0, 30.0, 20.0));
        reveal_transcript(&mut surface, target, ScrollBehavior::Instant, &Config::default());
        assert!((surface.viewport().scroll_y - 1480.0).abs() < f64::EPSILON);
    }

    #[test]
    fn long_form_waits_for_a_laid_out_highlight() {
        let mut surface = HeadlessSurface::new(800.0, 600.0);
        surface.inject(r#"<p class="highlighted">a</p>"#).unwrap();
        let p = *nodes_by_tag(surface.document(), "p").first().unwrap();
        surface.pin_rect(p, Rect::new(0.0, 400.0, 0.0, 0.0));
        assert_eq!(reveal_topmost_highlight(&mut surface, ScrollBehavior::Instant), ScrollStatus::Unsettled);
        surface.pin_rect(p, Rect::new(0.0, 400.0, 800.0, 20.0));
        assert_eq!(reveal_topmost_highlight(&mut surface, ScrollBehavior::Instant), ScrollStatus::Settled);
        assert!((surface.viewport().scroll_y - 400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn transcript_without_paragraph_uses_section_container() {
        let mut surface = HeadlessSurface::new(800.0, 600.0);
        surface.inject(r#"<div class="transcript qa-part"><span>Q:</span> <b>hit</b></div>"#).unwrap();
        let section = *nodes_by_tag(surface.document(), "div").first().unwrap();
        let target = *nodes_by_tag(surface.document(), "b").first().unwrap();
        surface.pin_rect(section, Rect::new(0.0, 500.0, 800.0, 60.0));
        surface.pin_rect(target, Rect::new(0.0, 520.0, 30.0, 20.0));
        reveal_transcript(&mut surface, target, ScrollBehavior::Instant, &Config::default());
        assert!((surface.viewport().scroll_y - 480.0).abs() < f64::EPSILON);
    }
}
