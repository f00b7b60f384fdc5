/// Core domain types: document kinds, locators, pages, and surface geometry.
use serde::Serialize;

use crate::error::Error;

/// The family of document being rendered. Drives segmentation, lookup
/// strategy, scroll-target tie-breaking, and scroll execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Annual/quarterly reports (10-K, 10-Q): one continuous financial narrative.
    LongFormFiling,
    /// Earnings-call transcript with speaker turns.
    Transcript,
    /// Current reports and other filings read page by page (8-K, 6-K).
    PaginatedFiling,
    /// Exhibit 99 press releases and investor decks.
    SlideExhibit,
    /// Proxy statements; some sub-forms are page-oriented.
    ProxyStatement(ProxyForm),
    /// Non-US filings that bound ranges with `[[#xxxx]]` comments instead of node ids.
    InternationalFiling,
    /// Documents rendered by an external binary viewer.
    Binary(BinaryFormat),
}

/// Proxy statement sub-forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyForm {
    /// DEFA14A additional soliciting materials.
    Additional,
    /// DEF 14A definitive proxy.
    Definitive,
    /// PRE 14A preliminary proxy.
    Preliminary,
}

/// Binary formats handed off to external viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryFormat {
    /// Portable document format.
    Pdf,
    /// Excel-style workbook.
    Spreadsheet,
}

impl DocumentKind {
    /// Map a form-type tag to a kind. Comparison is case-insensitive and
    /// ignores surrounding whitespace everywhere.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownDocumentKind` if the tag matches no known form.
    pub fn from_tag(tag: &str) -> Result<Self, Error> {
        let normalized = tag.trim().to_ascii_lowercase();
        let kind = match normalized.as_str() {
            "10-k" | "10-k/a" | "10-kt" | "10-k405" | "10-q" | "10-q/a" | "10-qt" => {
                DocumentKind::LongFormFiling
            },
            "transcript" | "earnings-call" | "earnings call" => DocumentKind::Transcript,
            "8-k" | "8-k/a" | "6-k" | "6-k/a" => DocumentKind::PaginatedFiling,
            "def 14a" | "def14a" => DocumentKind::ProxyStatement(ProxyForm::Definitive),
            "defa14a" | "defa 14a" => DocumentKind::ProxyStatement(ProxyForm::Additional),
            "pre 14a" | "pre14a" => DocumentKind::ProxyStatement(ProxyForm::Preliminary),
            "intl" | "international" | "hkex" | "lse" | "asx" => DocumentKind::InternationalFiling,
            "pdf" => DocumentKind::Binary(BinaryFormat::Pdf),
            "xls" | "xlsx" | "spreadsheet" => DocumentKind::Binary(BinaryFormat::Spreadsheet),
            other if other.starts_with("ex-99") || other.starts_with("exhibit 99") => {
                DocumentKind::SlideExhibit
            },
            _ => {
                return Err(Error::UnknownDocumentKind {
                    tag: tag.to_string(),
                });
            },
        };
        return Ok(kind);
    }

    /// Kinds where a bare trailing page number is a valid reference.
    pub fn is_page_oriented(self) -> bool {
        return matches!(
            self,
            DocumentKind::PaginatedFiling
                | DocumentKind::SlideExhibit
                | DocumentKind::ProxyStatement(ProxyForm::Definitive | ProxyForm::Additional)
                | DocumentKind::Binary(_)
        );
    }

    /// Continuous-narrative kinds whose nearby matches get bridged.
    pub fn is_long_form(self) -> bool {
        return self == DocumentKind::LongFormFiling;
    }

    pub fn is_transcript(self) -> bool {
        return self == DocumentKind::Transcript;
    }

    /// Kinds located through `[[#xxxx]]` comment markers.
    pub fn uses_comment_markers(self) -> bool {
        return self == DocumentKind::InternationalFiling;
    }

    pub fn is_binary(self) -> bool {
        return matches!(self, DocumentKind::Binary(_));
    }

    /// Markup kinds that get restructured into logical page containers.
    pub fn needs_page_containers(self) -> bool {
        return self.is_page_oriented() && !self.is_binary();
    }
}

/// Typed interpretation of a reference code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// Self-paired code: both halves name the same marker id.
    Single {
        /// Four-character marker id.
        id: String,
    },
    /// Distinct start and end marker ids.
    Range {
        /// Marker id that opens the range.
        start_id: String,
        /// Marker id that closes the range.
        end_id: String,
    },
    /// Zero-based logical page.
    Page {
        /// Page index.
        index: usize,
    },
}

/// One inferred page of a document. Pages are produced as a whole set and
/// replaced wholesale on re-segmentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogicalPage {
    /// The markup slice belonging to this page.
    pub content: String,
    /// Zero-based position in the document.
    pub index: usize,
}

/// Axis-aligned box in document coordinates at the current scale.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rect {
    pub height: f64,
    pub width: f64,
    pub x: f64,
    pub y: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        return Self { height, width, x, y };
    }

    /// A box with no rendered area has not been laid out yet (or is hidden).
    pub fn is_collapsed(&self) -> bool {
        return self.width <= 0.0 || self.height <= 0.0;
    }

    pub fn bottom(&self) -> f64 {
        return self.y + self.height;
    }
}

/// A point in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Visible window onto the render surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    /// Visible height in screen pixels.
    pub height: f64,
    /// Horizontal scroll offset.
    pub scroll_x: f64,
    /// Vertical scroll offset.
    pub scroll_y: f64,
    /// Visible width in screen pixels.
    pub width: f64,
}

/// How a scroll is animated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollBehavior {
    /// Jump without animation; used right after a new document mounts.
    Instant,
    /// Animated; used when re-highlighting inside an already-rendered document.
    Smooth,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_case_insensitive() {
        assert_eq!(DocumentKind::from_tag("10-k").unwrap(), DocumentKind::LongFormFiling);
        assert_eq!(DocumentKind::from_tag(" 10-Q ").unwrap(), DocumentKind::LongFormFiling);
        assert_eq!(DocumentKind::from_tag("Ex-99.1").unwrap(), DocumentKind::SlideExhibit);
        assert_eq!(
            DocumentKind::from_tag("DEF 14A").unwrap(),
            DocumentKind::ProxyStatement(ProxyForm::Definitive)
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = DocumentKind::from_tag("S-1").unwrap_err();
        assert!(matches!(err, Error::UnknownDocumentKind { .. }));
    }

    #[test]
    fn preliminary_proxy_is_not_page_oriented() {
        assert!(!DocumentKind::ProxyStatement(ProxyForm::Preliminary).is_page_oriented());
        assert!(DocumentKind::ProxyStatement(ProxyForm::Additional).is_page_oriented());
    }

    #[test]
    fn binary_kinds_skip_page_containers() {
        let pdf = DocumentKind::Binary(BinaryFormat::Pdf);
        assert!(pdf.is_page_oriented());
        assert!(!pdf.needs_page_containers());
        assert!(DocumentKind::PaginatedFiling.needs_page_containers());
    }
}
