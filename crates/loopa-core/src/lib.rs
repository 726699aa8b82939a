//! # Loopa Core
//!
//! `loopa-core` computes the state of a keyframed 2D design at any point in
//! time and exports the animation as Lottie JSON, animated SVG, or an encoded
//! video/GIF stream.
//!
//! ## Core Features
//!
//! *   **Frame Evaluation**: type-aware interpolation of numbers and colours,
//!     discrete snapping for everything else, with per-segment easing.
//! *   **Lottie Export**: keyframed shape layers with Bézier easing handles.
//! *   **SVG Export**: a static snapshot or SMIL `<animate>` directives.
//! *   **Video Export**: sequential rasterization through `resvg` or
//!     `tiny-skia`, streamed to a negotiated encoder backend.
//!
//! ## Usage
//!
//! ```rust
//! use loopa_core::easing::Easing;
//! use loopa_core::model::{Element, ElementKind, Keyframe, RectProps, Scene};
//! use loopa_core::patch::{AnimProp, PropertyPatch};
//!
//! let rect = Element::new("box", ElementKind::Rect(RectProps::default()), 0.0, 0.0, 100.0, 100.0)
//!     .with_fill("FF3366");
//! let scene = Scene::new(400, 300, 30, 60)
//!     .with_element(rect)
//!     .with_keyframe(
//!         Keyframe::new("box", 0, PropertyPatch::new().with(AnimProp::X, 0.0))
//!             .with_easing(Easing::parse("ease-in-out")),
//!     )
//!     .with_keyframe(Keyframe::new("box", 30, PropertyPatch::new().with(AnimProp::X, 300.0)));
//!
//! let x = loopa_core::evaluate(&scene.keyframes, 15.0).number(AnimProp::X);
//! assert!(x.is_some_and(|x| (x - 150.0).abs() < 1e-6));
//!
//! let svg = loopa_core::export::svg::export_svg(&scene, &Default::default()).unwrap();
//! assert!(svg.artifact.contains("<animate"));
//! ```

/// Hex colour parsing and interpolation.
pub mod color;

/// Easing presets, CSS-style cubic Béziers and steps, plus the handle table
/// used by the vector exporters.
pub mod easing;

pub mod errors;

/// The keyframe evaluator.
pub mod evaluator;

/// Outline and path-data helpers shared by the exporters.
pub mod geometry;

/// SVG markup for resolved frames.
pub mod markup;

/// Decoding of embedded video clips.
pub mod media;

/// Elements, keyframes and scenes.
pub mod model;

/// Animatable properties and sparse property patches.
pub mod patch;

/// Frame rasterization strategies.
pub mod raster;

/// Keyframe tracks and resolved frame snapshots.
pub mod timeline;

pub mod warnings;

/// Lottie, SVG and video exporters.
pub mod export;

pub use errors::{ExportError, RenderError};
pub use evaluator::{evaluate, evaluate_scene};
pub use model::{Element, Keyframe, Scene};
pub use patch::{AnimProp, PropValue, PropertyPatch};
pub use timeline::{FrameSample, Timeline};
pub use warnings::{Exported, Warnings};
