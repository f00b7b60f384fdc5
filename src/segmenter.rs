//! Logical page inference for markup without native pagination.
//!
//! Filers mix page-break conventions freely, so breaks are found by an
//! ordered cascade of rules. Each stage declares when it runs, based on how
//! many breaks earlier stages already found. New filer conventions are added
//! by appending a rule to a stage.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::dom::{Document, NodeId, normalize_style};
use crate::types::LogicalPage;

/// Standardized marker every matched break is rewritten to before splitting.
pub const PAGE_BREAK_TOKEN: &str = "<!--filinglens:page-break-->";

/// Class carried by each page container.
pub const PAGE_CLASS: &str = "logical-page";

/// Attribute carrying a page container's zero-based index.
pub const PAGE_INDEX_ATTR: &str = "data-page-index";

/// Class of the visible page-number badge.
pub const BADGE_CLASS: &str = "page-number-badge";

/// Where the break token goes relative to a rule's match.
#[derive(Debug, Clone, Copy)]
enum Placement {
    /// After the balanced end tag of the element whose start tag matched.
    /// The pattern's first group must capture the tag name.
    AfterElement,
    /// In front of the match.
    Before,
    /// Instead of the match.
    Replace,
}

/// One structural convention for marking a page break.
struct BreakRule {
    /// Rule name for logs.
    name: &'static str,
    /// Case-insensitive pattern over raw markup.
    pattern: Regex,
    /// Where the token goes relative to each match.
    placement: Placement,
}

/// A group of rules applied together, gated on the breaks found so far.
struct BreakStage {
    /// Stage name for logs.
    name: &'static str,
    /// Rules applied in order.
    rules: Vec<BreakRule>,
    /// Gate on the number of breaks found by earlier stages.
    runs_when: fn(usize) -> bool,
}

/// Compile a rule. Patterns are literals, so a bad one is a programming error.
fn rule(name: &'static str, pattern: &str, placement: Placement) -> BreakRule {
    return BreakRule {
        name,
        pattern: Regex::new(pattern).unwrap_or_else(|e| panic!("invalid page-break rule `{name}`: {e}")),
        placement,
    };
}

/// Every break convention, most specific first.
static CASCADE: LazyLock<Vec<BreakStage>> = LazyLock::new(|| {
    return vec![
        BreakStage {
            name: "primary",
            rules: vec![rule(
                "hr-page-break-style",
                r#"(?i)<hr\b[^>]*\bstyle\s*=\s*["'][^"']*page-break[^"']*["'][^>]*>"#,
                Placement::Replace,
            )],
            runs_when: |_| return true,
        },
        BreakStage {
            name: "fallback",
            rules: vec![
                rule(
                    "page-break-class",
                    r#"(?i)<(?:div|p)\b[^>]*\bclass\s*=\s*["'][^"']*\bpage-?break\b[^"']*["'][^>]*>(?:\s|&nbsp;)*</(?:div|p)>"#,
                    Placement::Replace,
                ),
                rule(
                    "page-break-before",
                    r"(?i)<(?:div|p|section|table)\b[^>]*page-break-before\s*:\s*always[^>]*>",
                    Placement::Before,
                ),
                rule(
                    "page-break-after",
                    r"(?i)<(div|p|section|table)\b[^>]*page-break-after\s*:\s*always[^>]*>",
                    Placement::AfterElement,
                ),
                rule(
                    "min-height-spacer",
                    r#"(?i)<div\b[^>]*\bstyle\s*=\s*["'][^"']*min-height\s*:\s*\d+(?:\.\d+)?in\b[^"']*["'][^>]*>(?:\s|&nbsp;)*</div>"#,
                    Placement::Replace,
                ),
                rule("hr-noshade", r"(?i)<hr\b[^>]*\bnoshade\b[^>]*>", Placement::Replace),
            ],
            runs_when: |found| return found < 2,
        },
        BreakStage {
            name: "any-hr",
            rules: vec![rule("hr", r"(?i)<hr\b[^>]*>", Placement::Replace)],
            runs_when: |found| return found == 0,
        },
    ];
});

/// Any start or end tag. Groups: end-tag slash, name, self-closing slash.
#[allow(clippy::expect_used, reason = "literal pattern")]
static TAG: LazyLock<Regex> =
    LazyLock::new(|| return Regex::new(r"(?i)<(/?)([a-z][a-z0-9]*)\b[^>]*?(/?)>").expect("valid regex"));

/// "Exhibit 99" wording in its usual spellings.
#[allow(clippy::expect_used, reason = "literal pattern")]
static EXHIBIT_99: LazyLock<Regex> =
    LazyLock::new(|| return Regex::new(r"(?i)\bex(?:hibit)?[\s\-_.]*99").expect("valid regex"));

/// Any raster image tag.
#[allow(clippy::expect_used, reason = "literal pattern")]
static RASTER_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| return Regex::new(r"(?i)<img\b").expect("valid regex"));

/// Splits raw markup into logical pages.
#[derive(Debug, Clone)]
pub struct PageSegmenter {
    /// Normalized style that marks a slide container.
    slide_fingerprint: String,
}

impl PageSegmenter {
    /// `slide_fingerprint` is compared against normalized inline styles
    /// (see [`normalize_style`]).
    pub fn new(slide_fingerprint: &str) -> Self {
        return Self {
            slide_fingerprint: normalize_style(slide_fingerprint),
        };
    }

    /// Segment markup into ordered pages. The result is computed fresh on
    /// every call and is consumed once.
    pub fn segment(&self, raw: &str) -> Pages {
        if self.looks_like_slide_deck(raw) {
            let slides = self.slide_pages(raw);
            if !slides.is_empty() {
                debug!(pages = slides.len(), "segmented as slide deck");
                return Pages::from_slides(slides);
            }
            debug!("slide deck detected but no slide containers found");
        }
        let (tokenized, breaks) = insert_break_tokens(raw);
        debug!(breaks, "segmented on page-break markers");
        return Pages::from_tokenized(tokenized, raw);
    }

    /// Exhibit-99 wording, a raster image, and the slide style fingerprint
    /// must all be present.
    pub fn looks_like_slide_deck(&self, raw: &str) -> bool {
        return EXHIBIT_99.is_match(raw)
            && RASTER_IMAGE.is_match(raw)
            && normalize_style(raw).contains(&self.slide_fingerprint);
    }

    /// One page per outermost element whose style carries the fingerprint.
    fn slide_pages(&self, raw: &str) -> Vec<LogicalPage> {
        let doc = match Document::parse(raw) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, "slide deck could not be parsed; using page-break markers");
                return Vec::new();
            },
        };
        let mut slides: Vec<NodeId> = Vec::new();
        for node in doc.descendants(doc.root()) {
            let matches = doc
                .attr(node, "style")
                .is_some_and(|style| return normalize_style(style).contains(&self.slide_fingerprint));
            if matches && !slides.iter().any(|outer| return doc.is_ancestor(*outer, node)) {
                slides.push(node);
            }
        }
        return slides
            .into_iter()
            .enumerate()
            .map(|(index, node)| {
                return LogicalPage {
                    content: doc.outer_html(node),
                    index,
                };
            })
            .collect();
    }
}

/// Run the cascade, rewriting every matched break to [`PAGE_BREAK_TOKEN`].
/// Returns the rewritten markup and the number of breaks inserted.
fn insert_break_tokens(raw: &str) -> (String, usize) {
    let mut markup = raw.to_string();
    let mut found = 0_usize;
    for stage in CASCADE.iter() {
        if !(stage.runs_when)(found) {
            continue;
        }
        for rule in &stage.rules {
            let (rewritten, count) = apply_rule(&markup, rule);
            if count > 0 {
                debug!(stage = stage.name, rule = rule.name, count, "page-break rule matched");
            }
            markup = rewritten;
            found = found.saturating_add(count);
        }
    }
    return (markup, found);
}

/// Apply one rule, returning the rewritten markup and its match count.
fn apply_rule(markup: &str, rule: &BreakRule) -> (String, usize) {
    if matches!(rule.placement, Placement::AfterElement) {
        return insert_after_elements(markup, &rule.pattern);
    }
    let mut count = 0_usize;
    let rewritten = rule.pattern.replace_all(markup, |caps: &Captures<'_>| {
        count = count.saturating_add(1);
        let matched = caps.get(0).map_or("", |m| return m.as_str());
        if matches!(rule.placement, Placement::Before) {
            return format!("{PAGE_BREAK_TOKEN}{matched}");
        }
        return PAGE_BREAK_TOKEN.to_string();
    });
    return (rewritten.into_owned(), count);
}

/// Insert a break after the balanced end tag of every element whose start
/// tag `pattern` matches. An element left open until the end of the markup
/// ends the document anyway and gets no break.
fn insert_after_elements(markup: &str, pattern: &Regex) -> (String, usize) {
    let mut offsets: Vec<usize> = pattern
        .captures_iter(markup)
        .filter_map(|caps| {
            let start = caps.get(0)?;
            let name = caps.get(1)?.as_str();
            return element_end(markup, name, start.end());
        })
        .collect();
    offsets.sort_unstable();
    offsets.dedup();

    let mut out = String::with_capacity(markup.len().saturating_add(offsets.len().saturating_mul(PAGE_BREAK_TOKEN.len())));
    let mut copied = 0_usize;
    for offset in &offsets {
        out.push_str(markup.get(copied..*offset).unwrap_or_default());
        out.push_str(PAGE_BREAK_TOKEN);
        copied = *offset;
    }
    out.push_str(markup.get(copied..).unwrap_or_default());
    return (out, offsets.len());
}

/// Byte offset just past the end tag closing an element named `name`
/// whose start tag ends at `from`. Same-name elements nested inside are
/// counted so the matching end tag is the balanced one.
fn element_end(markup: &str, name: &str, from: usize) -> Option<usize> {
    let rest = markup.get(from..)?;
    let mut depth = 1_usize;
    for caps in TAG.captures_iter(rest) {
        let (Some(whole), Some(tag)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        if !tag.as_str().eq_ignore_ascii_case(name) {
            continue;
        }
        let closing = caps.get(1).is_some_and(|m| return !m.as_str().is_empty());
        let self_closing = caps.get(3).is_some_and(|m| return !m.as_str().is_empty());
        if closing {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(from.saturating_add(whole.end()));
            }
        } else if !self_closing {
            depth = depth.saturating_add(1);
        }
    }
    return None;
}

// ── Page sequence ──────────────────────────────────────────────────────

/// Ordered, finite, single-pass sequence of pages. Blank segments are
/// skipped; if nothing survives, the original markup is yielded as page 0.
#[derive(Debug)]
pub struct Pages {
    /// Where the pages come from.
    source: PageSource,
}

/// Backing state of a [`Pages`] sequence.
#[derive(Debug)]
enum PageSource {
    /// Pre-built slide pages.
    Slides(std::vec::IntoIter<LogicalPage>),
    /// Lazy split of tokenized markup.
    Split {
        /// Byte offset of the next unread segment.
        cursor: usize,
        /// Pages yielded so far.
        emitted: usize,
        /// Untouched input, taken for the zero-page fallback.
        original: Option<String>,
        /// Markup with every break rewritten to [`PAGE_BREAK_TOKEN`].
        tokenized: String,
    },
}

impl Pages {
    /// Sequence over already-built slide pages.
    fn from_slides(slides: Vec<LogicalPage>) -> Self {
        return Self {
            source: PageSource::Slides(slides.into_iter()),
        };
    }

    /// Sequence that splits `tokenized` on demand.
    fn from_tokenized(tokenized: String, original: &str) -> Self {
        return Self {
            source: PageSource::Split {
                cursor: 0,
                emitted: 0,
                original: Some(original.to_string()),
                tokenized,
            },
        };
    }
}

impl Iterator for Pages {
    type Item = LogicalPage;

    fn next(&mut self) -> Option<LogicalPage> {
        let (cursor, emitted, original, tokenized) = match &mut self.source {
            PageSource::Slides(slides) => return slides.next(),
            PageSource::Split {
                cursor,
                emitted,
                original,
                tokenized,
            } => (cursor, emitted, original, tokenized),
        };

        while *cursor <= tokenized.len() {
            let rest = tokenized.get(*cursor..).unwrap_or_default();
            let (segment, advance) = match rest.find(PAGE_BREAK_TOKEN) {
                Some(at) => (rest.get(..at).unwrap_or_default(), at.saturating_add(PAGE_BREAK_TOKEN.len())),
                None => (rest, rest.len().saturating_add(1)),
            };
            let segment = segment.to_string();
            *cursor = cursor.saturating_add(advance);
            if segment.trim().is_empty() {
                continue;
            }
            let page = LogicalPage {
                content: segment,
                index: *emitted,
            };
            *emitted = emitted.saturating_add(1);
            return Some(page);
        }

        if *emitted == 0
            && let Some(content) = original.take()
        {
            warn!("segmentation produced no pages; keeping the document as one page");
            *emitted = 1;
            return Some(LogicalPage { content, index: 0 });
        }
        return None;
    }
}

// ── Page containers ────────────────────────────────────────────────────

/// Wrap each page in an addressable container with a page-number badge.
/// Each body is re-balanced on its own so a tag left open by the split
/// cannot swallow the following pages.
pub fn render_pages(pages: impl IntoIterator<Item = LogicalPage>) -> String {
    let mut out = String::new();
    for page in pages {
        let body = Document::parse(&page.content).map_or(page.content.clone(), |doc| return doc.to_html());
        let _ = write!(
            out,
            r#"<div class="{PAGE_CLASS}" {PAGE_INDEX_ATTR}="{index}"><div class="{BADGE_CLASS}">{number}</div>{body}</div>"#,
            index = page.index,
            number = page.index.saturating_add(1),
        );
    }
    return out;
}

/// Find the container for a zero-based page index.
pub fn page_container(doc: &Document, index: usize) -> Option<NodeId> {
    let wanted = index.to_string();
    return doc
        .descendants(doc.root())
        .into_iter()
        .find(|node| return doc.has_class(*node, PAGE_CLASS) && doc.attr(*node, PAGE_INDEX_ATTR) == Some(wanted.as_str()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter() -> PageSegmenter {
        return PageSegmenter::new("position:relative;overflow:hidden");
    }

    const PRIMARY_HR: &str = r#"<hr style="page-break-after: always">"#;

    #[test]
    fn three_primary_breaks_make_four_pages() {
        let raw = format!("<p>one</p>{PRIMARY_HR}<p>two</p>{PRIMARY_HR}<p>three</p>{PRIMARY_HR}<p>four</p>");
        let pages: Vec<LogicalPage> = segmenter().segment(&raw).collect();
        assert_eq!(pages.len(), 4);
        let indices: Vec<usize> = pages.iter().map(|p| return p.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(pages.get(2).unwrap().content, "<p>three</p>");
    }

    #[test]
    fn plain_hr_is_last_resort() {
        let pages: Vec<LogicalPage> = segmenter().segment("<p>one</p><hr><p>two</p>").collect();
        assert_eq!(pages.len(), 2);
    }

    #[test]
    fn plain_hr_ignored_once_breaks_exist() {
        let raw = format!("<p>one</p>{PRIMARY_HR}<p>two</p><hr><p>still two</p>");
        let pages: Vec<LogicalPage> = segmenter().segment(&raw).collect();
        assert_eq!(pages.len(), 2);
    }

    #[test]
    fn fallback_runs_when_primary_is_sparse() {
        let raw = format!(
            r#"<p>one</p>{PRIMARY_HR}<p>two</p><div style="page-break-before: always"><p>three</p></div><hr noshade><p>four</p>"#
        );
        let pages: Vec<LogicalPage> = segmenter().segment(&raw).collect();
        assert_eq!(pages.len(), 4);
        assert!(pages.get(2).unwrap().content.starts_with("<div style"));
    }

    #[test]
    fn fallback_skipped_when_primary_is_enough() {
        let raw = format!("<p>a</p>{PRIMARY_HR}<p>b</p>{PRIMARY_HR}<p>c</p><hr noshade><p>d</p>");
        let pages: Vec<LogicalPage> = segmenter().segment(&raw).collect();
        assert_eq!(pages.len(), 3);
    }

    #[test]
    fn page_break_class_container_is_a_break() {
        let raw = r#"<p>a</p><div class="pagebreak"></div><p>b</p>"#;
        assert_eq!(segmenter().segment(raw).count(), 2);
    }

    #[test]
    fn blank_segments_are_dropped() {
        let raw = format!("{PRIMARY_HR}<p>a</p>{PRIMARY_HR}  \n {PRIMARY_HR}<p>b</p>{PRIMARY_HR}");
        let pages: Vec<LogicalPage> = segmenter().segment(&raw).collect();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages.get(1).unwrap().index, 1);
    }

    #[test]
    fn concatenated_pages_cover_all_content() {
        let raw = format!("<p>a</p>{PRIMARY_HR}<table><tr><td>1</td></tr></table>{PRIMARY_HR}<p>c</p>");
        let joined: String = segmenter().segment(&raw).map(|p| return p.content).collect();
        assert_eq!(joined, raw.replace(PRIMARY_HR, ""));
    }

    #[test]
    fn unsegmentable_markup_is_one_page() {
        let pages: Vec<LogicalPage> = segmenter().segment("<p>just text</p>").collect();
        assert_eq!(pages, vec![LogicalPage { content: "<p>just text</p>".to_string(), index: 0 }]);
    }

    #[test]
    fn degenerate_markup_keeps_original_content() {
        let raw = format!("{PRIMARY_HR}   {PRIMARY_HR}");
        let pages: Vec<LogicalPage> = segmenter().segment(&raw).collect();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages.first().unwrap().content, raw);
    }

    #[test]
    fn slide_deck_emits_one_page_per_slide() {
        let raw = r#"<p>EX-99.1 Investor Presentation</p>
<div style="position: relative; overflow: hidden"><img src="s1.jpg"></div>
<div style="POSITION:relative;overflow:hidden"><img src="s2.jpg"><div style="position:relative;overflow:hidden">inner</div></div>"#;
        let pages: Vec<LogicalPage> = segmenter().segment(raw).collect();
        assert_eq!(pages.len(), 2);
        assert!(pages.first().unwrap().content.contains("s1.jpg"));
        assert!(!pages.first().unwrap().content.contains("Investor"));
        assert!(pages.get(1).unwrap().content.contains("inner"));
    }

    #[test]
    fn slide_deck_needs_an_image() {
        let raw = r#"<p>Exhibit 99</p><div style="position:relative;overflow:hidden">text</div>"#;
        assert!(!segmenter().looks_like_slide_deck(raw));
    }

    #[test]
    fn rendered_pages_are_addressable() {
        let raw = format!("<div><p>a</p>{PRIMARY_HR}<p>b</p></div>");
        let html = render_pages(segmenter().segment(&raw));
        let doc = Document::parse(&html).unwrap();
        let second = page_container(&doc, 1).unwrap();
        assert!(doc.outer_html(second).contains(r#"<div class="page-number-badge">2</div>"#));
        assert!(page_container(&doc, 0).is_some_and(|first| return !doc.is_ancestor(first, second)));
    }

    #[test]
    fn page_break_after_container_with_children_ends_a_page() {
        let raw = r#"<p>a</p><div style="page-break-after: always"><p>b</p></div><p>c</p>"#;
        let pages: Vec<LogicalPage> = segmenter().segment(raw).collect();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages.first().unwrap().content, r#"<p>a</p><div style="page-break-after: always"><p>b</p></div>"#);
        assert_eq!(pages.get(1).unwrap().content, "<p>c</p>");
    }

    #[test]
    fn page_break_after_waits_for_the_balanced_end_tag() {
        let raw = r#"<DIV STYLE="page-break-after:always"><div>b</div><div/>more</DIV><p>c</p>"#;
        let pages: Vec<LogicalPage> = segmenter().segment(raw).collect();
        assert_eq!(pages.len(), 2);
        assert!(pages.first().unwrap().content.ends_with("more</DIV>"));
    }

    #[test]
    fn unclosed_page_break_after_container_is_not_a_break() {
        let raw = r#"<p>a</p><div style="page-break-after: always"><p>b</p>"#;
        assert_eq!(segmenter().segment(raw).count(), 1);
    }

    #[test]
    fn slide_deck_without_slide_containers_uses_break_cascade() {
        let raw = r#"<p>EX-99.1 layout: position: relative; overflow: hidden</p><img src="cover.jpg"><hr><p>two</p>"#;
        assert!(segmenter().looks_like_slide_deck(raw));
        let pages: Vec<LogicalPage> = segmenter().segment(raw).collect();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages.get(1).unwrap().content, "<p>two</p>");
    }
}
