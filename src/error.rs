//! Error taxonomy for the export pipeline.
//!
//! Two tiers: [`SectionError`] covers everything that can go wrong while one
//! section is being resolved — those are caught at the per-section boundary,
//! logged, and downgraded to "section omitted".  [`ExportError`] covers the
//! fatal cases: document assembly and file emission.  An export either fully
//! succeeds (possibly with fewer sections than requested) or fails atomically
//! with no partial output file.

use thiserror::Error;

/// Per-section failures.  Never fatal to the export as a whole.
#[derive(Clone, Debug, Error)]
pub enum SectionError {
    /// The requested chart/panel container, or its expected content, is absent.
    #[error("source not found: {0}")]
    SourceNotFound(String),

    /// Rasterization of prepared vector content failed or timed out.
    #[error("raster decode failed: {0}")]
    DecodeFailure(String),

    /// No drawing surface could be provided for the requested dimensions.
    #[error("drawing surface unavailable: {0}")]
    ContextUnavailable(String),
}

/// Fatal export failures, propagated to the top-level caller.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Document composition failed; carries a short corrective message.
    #[error("report assembly failed: {0}")]
    Assembly(String),

    /// The bundled report fonts could not be loaded.
    #[error("report fonts unavailable: {0}")]
    Font(String),

    /// The finished report could not be written out.
    #[error("could not write report file: {0}")]
    Io(#[from] std::io::Error),
}
