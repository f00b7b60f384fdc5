//! Top-level coordination of a viewer: decides per request which engine
//! stages run, and when.
//!
//! A new document is segmented (if its kind needs page containers), mounted,
//! and highlighted after a settle delay with an instant scroll. A new code on
//! the same document is highlighted immediately with a smooth scroll. A zoom
//! change alone only re-applies the viewport transform. Soft failures never
//! escape: they leave the document shown plainly.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::codec;
use crate::config::Config;
use crate::dom::NodeId;
use crate::error::Error;
use crate::highlight;
use crate::locate;
use crate::scheduler::{ManualScheduler, Scheduler, Task, Ticket};
use crate::scroll::{self, ScrollStatus};
use crate::segmenter::{self, PageSegmenter};
use crate::surface::RenderSurface;
use crate::types::{DocumentKind, Locator, ScrollBehavior};
use crate::viewport::{self, ZoomState};

/// What the viewer showed last. Owned by the orchestrator and compared
/// against each incoming request.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerState {
    pub current_reference: Option<String>,
    /// Bumped whenever the document or reference changes; stale scheduled
    /// work carries an older value.
    pub generation: u64,
    pub previous_document_id: Option<String>,
    pub previous_kind: Option<DocumentKind>,
    pub zoom: ZoomState,
}

/// One request to show a document.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub document_id: String,
    pub kind: DocumentKind,
    pub markup: String,
    pub reference: Option<String>,
    pub zoom: f64,
}

/// Immediate result of [`Orchestrator::render`].
#[derive(Debug)]
pub enum RenderOutcome {
    /// Binary kinds are shown by an external viewer, opened at this page.
    BinaryPage { index: usize },
    /// Markup was mounted; highlighting (if any) runs once `highlight_in` elapses.
    Mounted {
        highlight_in: Option<Duration>,
        pages: Option<usize>,
    },
    /// Same document, new reference: highlighted right away.
    Rehighlighted(HighlightOutcome),
    /// Nothing changed besides (possibly) the zoom.
    Unchanged { zoomed: bool },
}

/// Result of one locate/highlight/scroll pass.
#[derive(Debug)]
pub enum HighlightOutcome {
    /// Highlights cleared because the request carries no reference.
    Cleared,
    Highlighted {
        locator: Locator,
        matches: Vec<NodeId>,
        target: NodeId,
    },
    /// A soft failure left the document unhighlighted.
    Unhighlighted { reason: Error },
}

/// Drives the engine for one viewer.
pub struct Orchestrator<S: Scheduler> {
    /// Engine tuning.
    config: Config,
    /// Deferred highlight, retry, and resize work.
    scheduler: S,
    /// Page inference for paginated kinds.
    segmenter: PageSegmenter,
    /// What the viewer showed last.
    state: ViewerState,
}

impl<S: Scheduler> Orchestrator<S> {
    pub fn new(config: Config, scheduler: S) -> Self {
        let segmenter = PageSegmenter::new(&config.slide_style_fingerprint);
        let state = ViewerState {
            current_reference: None,
            generation: 0,
            previous_document_id: None,
            previous_kind: None,
            zoom: ZoomState::new(config.default_zoom),
        };
        return Self {
            config,
            scheduler,
            segmenter,
            state,
        };
    }

    pub fn state(&self) -> &ViewerState {
        return &self.state;
    }

    pub fn scheduler(&self) -> &S {
        return &self.scheduler;
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        return &mut self.scheduler;
    }

    /// Show a document, re-highlight it, or re-zoom it, whichever the
    /// difference from the previous request calls for.
    pub fn render<R: RenderSurface + ?Sized>(&mut self, surface: &mut R, request: &RenderRequest) -> RenderOutcome {
        if request.kind.is_binary() {
            return self.render_binary(request);
        }

        let new_document = self.state.previous_document_id.as_deref() != Some(request.document_id.as_str())
            || self.state.previous_kind != Some(request.kind);
        if new_document {
            return self.mount(surface, request);
        }

        let zoomed = self.zoom_to(surface, request.zoom);
        if self.state.current_reference == request.reference {
            return RenderOutcome::Unchanged { zoomed };
        }

        self.state.current_reference.clone_from(&request.reference);
        self.state.generation = self.state.generation.saturating_add(1);
        let ticket = self.ticket();
        return RenderOutcome::Rehighlighted(self.highlight(surface, &ticket, request.kind, ScrollBehavior::Smooth));
    }

    /// Run every scheduled task that is due, dropping stale ones. Returns
    /// the outcomes of the highlight passes that ran.
    pub fn run_pending<R: RenderSurface + ?Sized>(&mut self, surface: &mut R) -> Vec<HighlightOutcome> {
        let mut outcomes = Vec::new();
        while let Some(task) = self.scheduler.pop_due() {
            match task {
                Task::Highlight { behavior, ticket } => {
                    if !self.is_current(&ticket) {
                        debug!(generation = ticket.generation, "dropping stale highlight");
                        continue;
                    }
                    let Some(kind) = self.state.previous_kind else {
                        continue;
                    };
                    outcomes.push(self.highlight(surface, &ticket, kind, behavior));
                },
                Task::ScrollRetry {
                    attempt,
                    behavior,
                    target,
                    ticket,
                } => {
                    if !self.is_current(&ticket) {
                        debug!(attempt, "dropping stale scroll retry");
                        continue;
                    }
                    self.retry_scroll(surface, ticket, target, behavior, attempt);
                },
                Task::ResizeNotify => surface.notify_resize(),
            }
        }
        return outcomes;
    }

    pub fn zoom_in<R: RenderSurface + ?Sized>(&mut self, surface: &mut R) -> bool {
        let scale = viewport::zoom_in_scale(self.state.zoom.current(), &self.config);
        return self.zoom_to(surface, scale);
    }

    pub fn zoom_out<R: RenderSurface + ?Sized>(&mut self, surface: &mut R) -> bool {
        let scale = viewport::zoom_out_scale(self.state.zoom.current(), &self.config);
        return self.zoom_to(surface, scale);
    }

    pub fn reset_zoom<R: RenderSurface + ?Sized>(&mut self, surface: &mut R) -> bool {
        let scale = self.config.default_zoom;
        return self.zoom_to(surface, scale);
    }

    // ── Stages ─────────────────────────────────────────────────────────

    /// Record the binary document and hand its page to the external viewer.
    fn render_binary(&mut self, request: &RenderRequest) -> RenderOutcome {
        self.state.previous_document_id = Some(request.document_id.clone());
        self.state.previous_kind = Some(request.kind);
        self.state.current_reference.clone_from(&request.reference);
        self.state.generation = self.state.generation.saturating_add(1);
        let index = request
            .reference
            .as_deref()
            .and_then(|code| return codec::resolve(code, request.kind).ok())
            .and_then(|locator| {
                return match locator {
                    Locator::Page { index } => Some(index),
                    Locator::Single { .. } | Locator::Range { .. } => None,
                };
            })
            .unwrap_or(0);
        debug!(index, kind = ?request.kind, "binary document handed to external viewer");
        return RenderOutcome::BinaryPage { index };
    }

    /// Inject a new document and schedule its first highlight.
    fn mount<R: RenderSurface + ?Sized>(&mut self, surface: &mut R, request: &RenderRequest) -> RenderOutcome {
        self.state.previous_document_id = Some(request.document_id.clone());
        self.state.previous_kind = Some(request.kind);
        self.state.current_reference.clone_from(&request.reference);
        self.state.generation = self.state.generation.saturating_add(1);

        let (markup, pages) = if request.kind.needs_page_containers() {
            let pages: Vec<_> = self.segmenter.segment(&request.markup).collect();
            let count = pages.len();
            (segmenter::render_pages(pages), Some(count))
        } else {
            (request.markup.clone(), None)
        };

        if let Err(e) = surface.inject(&markup) {
            warn!(error = %e, document = %request.document_id, "markup shown unparsed");
        }

        let scale = self.config.clamp_zoom(request.zoom);
        self.state.zoom = ZoomState::new(scale);
        surface.set_transform(scale, viewport::compensating_width_percent(scale));
        self.scheduler.schedule(self.config.resize_notify_delay(), Task::ResizeNotify);

        info!(document = %request.document_id, kind = ?request.kind, pages = ?pages, "document mounted");

        if request.reference.is_none() {
            return RenderOutcome::Mounted {
                highlight_in: None,
                pages,
            };
        }
        let delay = self.config.new_document_delay();
        let task = Task::Highlight {
            behavior: ScrollBehavior::Instant,
            ticket: self.ticket(),
        };
        self.scheduler.schedule(delay, task);
        return RenderOutcome::Mounted {
            highlight_in: Some(delay),
            pages,
        };
    }

    /// Apply a scale and schedule the resize notification if it changed.
    fn zoom_to<R: RenderSurface + ?Sized>(&mut self, surface: &mut R, scale: f64) -> bool {
        let changed = viewport::apply_zoom(surface, &mut self.state.zoom, scale, &self.config);
        if changed {
            self.scheduler.schedule(self.config.resize_notify_delay(), Task::ResizeNotify);
        }
        return changed;
    }

    /// Resolve, locate, select, and scroll. Every soft failure becomes
    /// `HighlightOutcome::Unhighlighted`.
    fn highlight<R: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut R,
        ticket: &Ticket,
        kind: DocumentKind,
        behavior: ScrollBehavior,
    ) -> HighlightOutcome {
        let Some(code) = ticket.reference.as_deref() else {
            highlight::clear(surface.document_mut());
            return HighlightOutcome::Cleared;
        };

        let located = codec::resolve(code, kind).and_then(|locator| {
            let matches = locate::locate(surface, code, &locator, kind, &self.config)?;
            return Ok((locator, matches));
        });
        let (locator, matches) = match located {
            Ok(found) => found,
            Err(reason) => {
                highlight::clear(surface.document_mut());
                warn!(code, error = %reason, "document left unhighlighted");
                return HighlightOutcome::Unhighlighted { reason };
            },
        };

        let Some(target) = scroll::select(surface, &matches, kind, &self.config) else {
            return HighlightOutcome::Unhighlighted {
                reason: Error::NoMatch { code: codec::clean(code).to_string() },
            };
        };

        let status = if matches!(locator, Locator::Page { .. }) {
            scroll::reveal_block(surface, target, behavior);
            ScrollStatus::Settled
        } else {
            scroll::execute(surface, target, kind, behavior, &self.config)
        };
        if status == ScrollStatus::Unsettled {
            self.schedule_retry(ticket.clone(), target, behavior, 1);
        }

        info!(code, matches = matches.len(), target = target.index(), "reference highlighted");
        return HighlightOutcome::Highlighted {
            locator,
            matches,
            target,
        };
    }

    /// Scroll again to a target whose box was missing. Falls back to a
    /// plain reveal once the attempts run out.
    fn retry_scroll<R: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut R,
        ticket: Ticket,
        target: NodeId,
        behavior: ScrollBehavior,
        attempt: u32,
    ) {
        if scroll::reveal_topmost_highlight(surface, behavior) == ScrollStatus::Settled {
            debug!(attempt, "scroll settled on retry");
            return;
        }
        if attempt < self.config.scroll_retry_attempts {
            self.schedule_retry(ticket, target, behavior, attempt.saturating_add(1));
            return;
        }
        warn!(attempt, "highlight never laid out; revealing target directly");
        surface.reveal(target, behavior);
    }

    /// Queue the next scroll attempt after its backoff.
    fn schedule_retry(&mut self, ticket: Ticket, target: NodeId, behavior: ScrollBehavior, attempt: u32) {
        let delay = scroll::retry_delay(self.config.scroll_retry_base(), attempt);
        self.scheduler.schedule(
            delay,
            Task::ScrollRetry {
                attempt,
                behavior,
                target,
                ticket,
            },
        );
    }

    /// Snapshot of the state scheduled work must still match.
    fn ticket(&self) -> Ticket {
        return Ticket {
            document_id: self.state.previous_document_id.clone().unwrap_or_default(),
            generation: self.state.generation,
            reference: self.state.current_reference.clone(),
        };
    }

    /// Whether scheduled work still belongs to what is shown.
    fn is_current(&self, ticket: &Ticket) -> bool {
        return ticket.generation == self.state.generation
            && self.state.previous_document_id.as_deref() == Some(ticket.document_id.as_str())
            && self.state.current_reference == ticket.reference;
    }
}

impl Orchestrator<ManualScheduler> {
    /// Let virtual time run until no work is left. Returns the outcome of
    /// the last highlight pass, if any ran.
    pub fn settle<R: RenderSurface + ?Sized>(&mut self, surface: &mut R) -> Option<HighlightOutcome> {
        let mut last = None;
        loop {
            if let Some(outcome) = self.run_pending(surface).pop() {
                last = Some(outcome);
            }
            if !self.scheduler.advance_to_next() {
                return last;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::HeadlessSurface;
    use crate::types::Rect;

    const FILING: &str = r#"<div><p>Intro</p><p data-ref="54b9a1c0">Revenue rose</p><p>Detail</p><p data-ref="54b9a1c0">Margin held</p></div>"#;

    fn request(id: &str, kind: DocumentKind, markup: &str, reference: Option<&str>) -> RenderRequest {
        return RenderRequest {
            document_id: id.to_string(),
            kind,
            markup: markup.to_string(),
            reference: reference.map(str::to_string),
            zoom: 1.0,
        };
    }

    fn setup() -> (Orchestrator<ManualScheduler>, HeadlessSurface) {
        return (
            Orchestrator::new(Config::default(), ManualScheduler::new()),
            HeadlessSurface::new(1024.0, 768.0),
        );
    }

    #[test]
    fn new_document_highlights_after_delay_with_instant_scroll() {
        let (mut orchestrator, mut surface) = setup();
        let outcome = orchestrator.render(
            &mut surface,
            &request("doc-1", DocumentKind::LongFormFiling, FILING, Some("#54b9a1c0")),
        );
        assert!(matches!(
            outcome,
            RenderOutcome::Mounted { highlight_in: Some(delay), pages: None } if delay == Duration::from_millis(500)
        ));
        assert!(highlight::highlighted(surface.document()).is_empty());

        orchestrator.scheduler_mut().advance(Duration::from_millis(499));
        assert!(orchestrator.run_pending(&mut surface).is_empty());
        orchestrator.scheduler_mut().advance(Duration::from_millis(1));
        let outcomes = orchestrator.run_pending(&mut surface);
        assert!(matches!(outcomes.first(), Some(HighlightOutcome::Highlighted { .. })));
        assert_eq!(highlight::highlighted(surface.document()).len(), 3);
        let (_, behavior) = *surface.scroll_history().last().unwrap();
        assert_eq!(behavior, ScrollBehavior::Instant);
    }

    #[test]
    fn same_document_new_code_is_immediate_and_smooth() {
        let (mut orchestrator, mut surface) = setup();
        orchestrator.render(&mut surface, &request("doc-1", DocumentKind::PaginatedFiling, FILING, None));
        orchestrator.settle(&mut surface);
        let outcome = orchestrator.render(
            &mut surface,
            &request("doc-1", DocumentKind::PaginatedFiling, FILING, Some("#54b9a1c0")),
        );
        assert!(matches!(outcome, RenderOutcome::Rehighlighted(HighlightOutcome::Highlighted { .. })));
        let (_, behavior) = *surface.scroll_history().last().unwrap();
        assert_eq!(behavior, ScrollBehavior::Smooth);
    }

    #[test]
    fn stale_highlight_is_dropped() {
        let (mut orchestrator, mut surface) = setup();
        orchestrator.render(
            &mut surface,
            &request("doc-1", DocumentKind::LongFormFiling, FILING, Some("#54b9a1c0")),
        );
        let other = r#"<p data-ref="11112222">other</p>"#;
        orchestrator.render(&mut surface, &request("doc-2", DocumentKind::LongFormFiling, other, None));
        assert!(orchestrator.settle(&mut surface).is_none());
        assert!(highlight::highlighted(surface.document()).is_empty());
    }

    #[test]
    fn malformed_code_renders_plainly() {
        let (mut orchestrator, mut surface) = setup();
        orchestrator.render(
            &mut surface,
            &request("doc-1", DocumentKind::LongFormFiling, FILING, Some("#54b9")),
        );
        let outcome = orchestrator.settle(&mut surface);
        assert!(matches!(
            outcome,
            Some(HighlightOutcome::Unhighlighted { reason: Error::InvalidReference { .. } })
        ));
        assert!(surface.html().contains("Revenue rose"));
    }

    #[test]
    fn zoom_only_change_skips_highlighting() {
        let (mut orchestrator, mut surface) = setup();
        orchestrator.render(
            &mut surface,
            &request("doc-1", DocumentKind::PaginatedFiling, FILING, Some("#54b9a1c0")),
        );
        orchestrator.settle(&mut surface);
        let before = surface.html();
        let notifications = surface.resize_notifications();

        let mut zoomed = request("doc-1", DocumentKind::PaginatedFiling, FILING, Some("#54b9a1c0"));
        zoomed.zoom = 1.5;
        let outcome = orchestrator.render(&mut surface, &zoomed);
        assert!(matches!(outcome, RenderOutcome::Unchanged { zoomed: true }));
        assert!(orchestrator.settle(&mut surface).is_none());
        assert_eq!(surface.html(), before);
        assert!((surface.scale() - 1.5).abs() < f64::EPSILON);
        assert_eq!(surface.resize_notifications(), notifications.saturating_add(1));
    }

    #[test]
    fn paginated_filing_is_segmented_and_page_codes_reveal_pages() {
        let markup = r#"<p>one</p><hr style="page-break-after:always"><p>two</p><hr style="page-break-after:always"><p>three</p>"#;
        let (mut orchestrator, mut surface) = setup();
        let outcome = orchestrator.render(
            &mut surface,
            &request("doc-1", DocumentKind::PaginatedFiling, markup, Some("#0002")),
        );
        assert!(matches!(outcome, RenderOutcome::Mounted { pages: Some(3), .. }));
        let outcome = orchestrator.settle(&mut surface);
        assert!(matches!(
            outcome,
            Some(HighlightOutcome::Highlighted { locator: Locator::Page { index: 2 }, .. })
        ));
        assert!(highlight::highlighted(surface.document()).is_empty());
        assert!(surface.viewport().scroll_y > 0.0);
    }

    #[test]
    fn unsettled_long_form_scroll_retries_then_falls_back() {
        let (mut orchestrator, mut surface) = setup();
        orchestrator.render(
            &mut surface,
            &request("doc-1", DocumentKind::LongFormFiling, FILING, Some("#54b9a1c0")),
        );
        let hits: Vec<NodeId> = {
            let doc = surface.document();
            locate::find_by_attribute(doc, "54b9a1c0")
        };
        for hit in &hits {
            surface.pin_rect(*hit, Rect::new(0.0, 900.0, 0.0, 0.0));
        }
        orchestrator.scheduler_mut().advance(Duration::from_millis(500));
        orchestrator.run_pending(&mut surface);
        assert_eq!(orchestrator.scheduler().pending(), 1);

        // Retries at +100ms, +200ms, +300ms, then the direct reveal.
        for step in [100, 200] {
            orchestrator.scheduler_mut().advance(Duration::from_millis(step));
            orchestrator.run_pending(&mut surface);
            assert_eq!(orchestrator.scheduler().pending(), 1);
        }
        let scrolls = surface.scroll_history().len();
        orchestrator.scheduler_mut().advance(Duration::from_millis(300));
        orchestrator.run_pending(&mut surface);
        assert_eq!(orchestrator.scheduler().pending(), 0);
        assert_eq!(surface.scroll_history().len(), scrolls.saturating_add(1));
    }

    #[test]
    fn zoom_steps_are_clamped_and_reset() {
        let (mut orchestrator, mut surface) = setup();
        orchestrator.render(&mut surface, &request("doc-1", DocumentKind::Transcript, FILING, None));
        for _ in 0..10 {
            orchestrator.zoom_in(&mut surface);
        }
        assert!((surface.scale() - 2.0).abs() < f64::EPSILON);
        assert!(orchestrator.zoom_out(&mut surface));
        assert!((orchestrator.state().zoom.current() - 1.75).abs() < f64::EPSILON);
        assert!(orchestrator.reset_zoom(&mut surface));
        assert!((surface.scale() - 1.0).abs() < f64::EPSILON);
        assert!(!orchestrator.reset_zoom(&mut surface));
    }

    #[test]
    fn binary_kinds_report_page() {
        let (mut orchestrator, mut surface) = setup();
        let outcome = orchestrator.render(
            &mut surface,
            &request("pdf-1", DocumentKind::Binary(crate::types::BinaryFormat::Pdf), "", Some("#0004")),
        );
        assert!(matches!(outcome, RenderOutcome::BinaryPage { index: 4 }));
    }

    #[test]
    fn stale_scroll_retry_is_dropped_after_reference_changes() {
        let (mut orchestrator, mut surface) = setup();
        orchestrator.render(
            &mut surface,
            &request("doc-1", DocumentKind::LongFormFiling, FILING, Some("#54b9a1c0")),
        );
        for hit in locate::find_by_attribute(surface.document(), "54b9a1c0") {
            surface.pin_rect(hit, Rect::new(0.0, 900.0, 0.0, 0.0));
        }
        orchestrator.scheduler_mut().advance(Duration::from_millis(500));
        orchestrator.run_pending(&mut surface);
        assert_eq!(orchestrator.scheduler().pending(), 1);

        let outcome = orchestrator.render(
            &mut surface,
            &request("doc-1", DocumentKind::LongFormFiling, FILING, Some("#11112222")),
        );
        assert!(matches!(
            outcome,
            RenderOutcome::Rehighlighted(HighlightOutcome::Unhighlighted { reason: Error::NoMatch { .. } })
        ));
        let scrolls = surface.scroll_history().len();
        orchestrator.scheduler_mut().advance(Duration::from_millis(100));
        assert!(orchestrator.run_pending(&mut surface).is_empty());
        assert_eq!(orchestrator.scheduler().pending(), 0);
        assert_eq!(surface.scroll_history().len(), scrolls);
    }
}
