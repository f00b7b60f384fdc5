//! Segmentation and locate engine for financial documents: infers logical
//! pages in unpaginated filings, resolves short reference codes to
//! highlighted regions, picks where to scroll, and keeps zoom anchored.

pub mod codec;
pub mod commands;
pub mod config;
pub mod diagnostics;
pub mod dom;
pub mod error;
pub mod hasher;
pub mod highlight;
pub mod locate;
pub mod orchestrator;
pub mod scheduler;
pub mod scroll;
pub mod segmenter;
pub mod surface;
pub mod types;
pub mod viewport;

pub use error::Error;
