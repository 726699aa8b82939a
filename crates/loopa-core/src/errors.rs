use thiserror::Error;

/// Failures that reject an export as a whole.
///
/// These are structural or setup problems: they surface before any frame work
/// begins (bad options, codec negotiation) or when the output stream itself
/// breaks. Per-element and per-frame problems are recorded as warnings instead.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Invalid export options: {0}")]
    InvalidOptions(String),
    #[error("No compatible encoder for {format} (tried: {tried})")]
    CodecUnavailable { format: String, tried: String },
    #[error("Encoder failure: {0:#}")]
    Encoder(anyhow::Error),
    #[error("Export cancelled before frame {0}")]
    Cancelled(u32),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

/// Failures while rasterizing or compositing a single frame.
///
/// The video exporter absorbs these and substitutes a background frame.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to create surface")]
    SurfaceFailure,
    #[error("Markup rasterization failed: {0}")]
    Markup(String),
    #[error("Media error: {0}")]
    Media(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
