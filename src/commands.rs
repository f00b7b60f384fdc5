//! CLI commands for filinglens: segment, resolve, locate.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde::Serialize;

use crate::codec;
use crate::config::Config;
use crate::diagnostics;
use crate::error::Error;
use crate::hasher;
use crate::highlight;
use crate::orchestrator::{HighlightOutcome, Orchestrator, RenderOutcome, RenderRequest};
use crate::scheduler::ManualScheduler;
use crate::segmenter::{self, PageSegmenter};
use crate::surface::{HeadlessSurface, RenderSurface};
use crate::types::{DocumentKind, Locator, LogicalPage};

/// Exit code for a soft failure: the document is still printed, unhighlighted.
const SOFT_FAILURE: u8 = 1;

/// `locate --json` report.
#[derive(Debug, Serialize)]
struct LocateReport {
    /// Size of the highlight set.
    highlighted: usize,
    /// Locator the reference resolved to, when it resolved.
    locator: Option<Locator>,
    /// Final vertical scroll offset.
    scroll_y: f64,
    /// Node index of the scroll target.
    target: Option<usize>,
    /// Scale the document was rendered at.
    zoom: f64,
}

/// Arguments of `filinglens locate`.
#[derive(Debug, Clone)]
pub struct LocateArgs {
    pub code: String,
    pub file: PathBuf,
    pub json: bool,
    pub kind: String,
    pub zoom: Option<f64>,
}

/// Split a document into logical pages and print them as page containers
/// (or as `[{index, content}]` with `json`).
///
/// # Errors
///
/// Returns `Error::FileNotFound`/`Error::Io` if the file cannot be read,
/// config errors from `.filinglens.toml`, or `Error::Json` on serialization failure.
pub fn segment(file: &Path, json: bool) -> Result<ExitCode, Error> {
    let config = Config::load(Path::new("."))?;
    let markup = read_markup(file)?;
    let pages: Vec<LogicalPage> = PageSegmenter::new(&config.slide_style_fingerprint).segment(&markup).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&pages)?);
    } else {
        eprintln!("{} pages", pages.len());
        println!("{}", segmenter::render_pages(pages));
    }
    return Ok(ExitCode::SUCCESS);
}

/// Print the locator a reference code resolves to for a document kind.
///
/// # Errors
///
/// Returns `Error::UnknownDocumentKind` for an unrecognized tag and
/// `Error::InvalidReference` for a malformed code.
pub fn resolve(code: &str, kind: &str) -> Result<ExitCode, Error> {
    let kind = DocumentKind::from_tag(kind)?;
    let locator = codec::resolve(code, kind)?;
    println!("{}", serde_json::to_string(&locator)?);
    return Ok(ExitCode::SUCCESS);
}

/// Render a document headlessly, highlight the reference, and print the
/// highlighted markup (or a JSON report). A reference that cannot be
/// highlighted is diagnosed on stderr and exits 1 with the plain document.
///
/// # Errors
///
/// Returns file, config, and kind errors. Reference failures are not errors here.
pub fn locate(args: &LocateArgs) -> Result<ExitCode, Error> {
    let config = Config::load(Path::new("."))?;
    let markup = read_markup(&args.file)?;
    let kind = DocumentKind::from_tag(&args.kind)?;
    let zoom = args.zoom.unwrap_or(config.default_zoom);

    let mut surface = HeadlessSurface::new(config.viewport_width, config.viewport_height);
    let mut orchestrator = Orchestrator::new(config, ManualScheduler::new());
    let request = RenderRequest {
        document_id: hasher::document_id(&markup),
        kind,
        markup,
        reference: Some(args.code.clone()),
        zoom,
    };

    let outcome = match orchestrator.render(&mut surface, &request) {
        RenderOutcome::BinaryPage { index } => {
            let report = LocateReport {
                highlighted: 0,
                locator: Some(Locator::Page { index }),
                scroll_y: 0.0,
                target: None,
                zoom: orchestrator.state().zoom.current(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(ExitCode::SUCCESS);
        },
        RenderOutcome::Rehighlighted(outcome) => Some(outcome),
        RenderOutcome::Mounted { .. } | RenderOutcome::Unchanged { .. } => orchestrator.settle(&mut surface),
    };

    let mut report = LocateReport {
        highlighted: highlight::highlighted(surface.document()).len(),
        locator: None,
        scroll_y: surface.viewport().scroll_y,
        target: None,
        zoom: orchestrator.state().zoom.current(),
    };
    let mut code = ExitCode::SUCCESS;
    match outcome {
        Some(HighlightOutcome::Highlighted { locator, target, .. }) => {
            report.locator = Some(locator);
            report.target = Some(target.index());
        },
        Some(HighlightOutcome::Unhighlighted { reason }) => {
            diagnostics::print_error(&reason);
            code = ExitCode::from(SOFT_FAILURE);
        },
        Some(HighlightOutcome::Cleared) | None => code = ExitCode::from(SOFT_FAILURE),
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", surface.html());
    }
    return Ok(code);
}

/// Read a markup file.
///
/// # Errors
///
/// Returns `Error::FileNotFound` if the path does not exist, `Error::Io` otherwise.
fn read_markup(path: &Path) -> Result<String, Error> {
    return std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            return Error::FileNotFound { path: path.to_path_buf() };
        }
        return Error::Io(e);
    });
}
