//! Document export.

pub mod pdf;

pub use pdf::DocumentExporter;

/// MIME type of exported documents.
pub const PDF_MIME: &str = "application/pdf";
