//! Exporters. Each takes a [`Scene`](crate::model::Scene) plus format options
//! and returns the artifact together with the warnings collected on the way.

pub mod encoder;
pub mod lottie;
pub mod svg;
pub mod video;

use crate::errors::ExportError;
use crate::model::Scene;

/// Structural checks shared by every exporter.
pub(crate) fn validate_scene(scene: &Scene) -> Result<(), ExportError> {
    if scene.fps == 0 {
        return Err(ExportError::InvalidOptions("fps must be greater than zero".into()));
    }
    Ok(())
}

pub(crate) const EMPTY_EXPORT_WARNING: &str = "The scene has no exportable elements; the export is empty.";
