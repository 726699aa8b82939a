//! Bodymovin 5.x JSON export.
//!
//! Every visible vector element becomes one shape layer. Transform and shape
//! properties are written as static values unless one of the element
//! properties they derive from is keyframed; animated properties get one
//! entry per keyframe with cubic-Bézier handles derived from the keyframe's
//! easing, plus a trailing hold entry at the end of the timeline.

use lottie_data::model::{
    BezierPath, DashProperty, EasingHandle, EllipseShape, FillShape, GroupShape, Keyframe as LottieKeyframe,
    Layer, LottieJson, PathShape, Property, RectShape, Shape, StrokeShape, Transform, TransformShape,
    FILL_RULE_EVENODD, FILL_RULE_NONZERO, LAYER_SHAPE,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::color;
use crate::easing::{HandleTable, LINEAR_HANDLES};
use crate::errors::ExportError;
use crate::export::{validate_scene, EMPTY_EXPORT_WARNING};
use crate::geometry::{self, VertexPath};
use crate::model::{BlendMode, Element, ElementKind, FillKind, FillRule, LineCap, LineJoin, Scene};
use crate::patch::AnimProp;
use crate::timeline::Timeline;
use crate::warnings::{Exported, Warnings};

pub const LOTTIE_VERSION: &str = "5.7.0";
const DOCUMENT_NAME: &str = "Loopa Export";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LottieExportOptions {
    /// Players decide looping; bodymovin has no document-level flag for it.
    #[serde(rename = "loop")]
    pub looping: bool,
    pub pretty_print: bool,
    /// Expand bounce, elastic, spring and stepped segments into per-frame
    /// linear entries instead of approximating them with one Bézier.
    pub bake_non_bezier_easing: bool,
    pub name: Option<String>,
}

impl Default for LottieExportOptions {
    fn default() -> Self {
        Self {
            looping: true,
            pretty_print: false,
            bake_non_bezier_easing: false,
            name: None,
        }
    }
}

impl LottieExportOptions {
    pub fn with_pretty_print(mut self, pretty: bool) -> Self {
        self.pretty_print = pretty;
        self
    }

    pub fn with_baked_easing(mut self, bake: bool) -> Self {
        self.bake_non_bezier_easing = bake;
        self
    }
}

/// Serializes the scene as a Lottie document.
#[instrument(skip_all, fields(elements = scene.elements.len(), frames = scene.total_frames))]
pub fn export_lottie(scene: &Scene, options: &LottieExportOptions) -> Result<Exported<String>, ExportError> {
    let mut warnings = Warnings::new();
    let document = build_document(scene, options, &mut warnings)?;
    let json = if options.pretty_print {
        serde_json::to_string_pretty(&document)?
    } else {
        serde_json::to_string(&document)?
    };
    info!(layers = document.layers.len(), warnings = warnings.len(), "Lottie export finished");
    Ok(Exported::new(json, warnings))
}

/// Builds the document model without serializing it.
pub fn build_document(
    scene: &Scene,
    options: &LottieExportOptions,
    warnings: &mut Warnings,
) -> Result<LottieJson, ExportError> {
    validate_scene(scene)?;
    let timeline = Timeline::new(scene);
    let handles = HandleTable::standard();
    let total = scene.total_frames as f64;

    let mut layers = Vec::new();
    for (index, el) in scene.elements.iter().enumerate() {
        if !el.visible {
            continue;
        }
        let builder = ValueBuilder {
            timeline: &timeline,
            element: el,
            handles: &handles,
            total_frames: scene.total_frames,
            bake: options.bake_non_bezier_easing,
        };
        if let Some(layer) = build_layer(&builder, index as u32 + 1, total, warnings) {
            layers.push(layer);
        }
    }
    if layers.is_empty() {
        warnings.push(EMPTY_EXPORT_WARNING);
    }
    // Lottie paints the first layer on top.
    layers.reverse();

    Ok(LottieJson {
        v: LOTTIE_VERSION.to_string(),
        fr: scene.fps as f64,
        ip: 0.0,
        op: total,
        w: scene.width,
        h: scene.height,
        nm: Some(options.name.clone().unwrap_or_else(|| DOCUMENT_NAME.to_string())),
        ddd: 0,
        assets: Vec::new(),
        layers,
        markers: Vec::new(),
    })
}

fn unsupported_warning(kind: &ElementKind) -> Option<&'static str> {
    match kind {
        ElementKind::Text(_) => Some("Text elements are not supported in Lottie export and were skipped."),
        ElementKind::Image(_) => Some("Image elements are not supported in Lottie export and were skipped."),
        ElementKind::Video(_) => Some("Video elements are not supported in Lottie export and were skipped."),
        ElementKind::Group(_) => {
            Some("Groups are flattened in Lottie export; their children are exported as separate layers.")
        }
        _ => None,
    }
}

fn build_layer(b: &ValueBuilder, ind: u32, total: f64, warnings: &mut Warnings) -> Option<Layer> {
    let el = b.element;
    if let Some(message) = unsupported_warning(&el.kind) {
        warnings.push(message);
        return None;
    }

    let mut items = geometry_shapes(b, warnings)?;
    if el.shadow().is_some() {
        warnings.push("Drop shadows are not supported in Lottie export and were omitted.");
    }
    if el.blur > 0.0 || b.timeline.animates(&el.id, AnimProp::Blur) {
        warnings.push("Layer blur is not supported in Lottie export and was omitted.");
    }
    if let Some(stroke) = stroke_shape(b) {
        items.push(stroke);
    }
    if let Some(fill) = fill_shape(b, warnings) {
        items.push(fill);
    }
    items.push(Shape::Transform(TransformShape::default()));

    debug!(element = %el.id, items = items.len(), "built Lottie layer");
    Some(Layer {
        ddd: 0,
        ind,
        ty: LAYER_SHAPE,
        nm: Some(el.name.clone()),
        sr: 1.0,
        ks: layer_transform(b),
        ao: 0,
        shapes: vec![Shape::Group(GroupShape {
            nm: Some(el.name.clone()),
            it: items,
        })],
        ip: 0.0,
        op: total,
        st: 0.0,
        bm: blend_code(el.blend_mode),
    })
}

/// Produces static or keyframed Lottie properties for one element.
struct ValueBuilder<'a, 't> {
    timeline: &'a Timeline<'t>,
    element: &'a Element,
    handles: &'a HandleTable,
    total_frames: u32,
    bake: bool,
}

impl ValueBuilder<'_, '_> {
    fn animates(&self, sources: &[AnimProp]) -> bool {
        self.timeline.animates_any(&self.element.id, sources)
    }

    fn at(&self, frame: u32) -> Element {
        self.timeline.resolve(self.element, frame as f64)
    }

    /// `getter` reads the value from a resolved element; `sources` lists the
    /// element properties it depends on.
    fn property<T>(&self, sources: &[AnimProp], getter: impl Fn(&Element) -> T) -> Property<T> {
        if !self.animates(sources) {
            return Property::fixed(getter(self.element));
        }
        let kfs = self.timeline.keyframes_for(&self.element.id);
        let mut entries = Vec::with_capacity(kfs.len() + 1);
        for (idx, kf) in kfs.iter().enumerate() {
            let Some(next) = kfs.get(idx + 1) else {
                entries.push(LottieKeyframe::hold(kf.frame as f64, getter(&self.at(kf.frame))));
                continue;
            };
            if next.frame == kf.frame {
                continue;
            }
            if self.bake && !self.handles.is_bezier_representable(&kf.easing) {
                for f in kf.frame..next.frame {
                    entries.push(segment(
                        f as f64,
                        getter(&self.at(f)),
                        getter(&self.at(f + 1)),
                        LINEAR_HANDLES,
                    ));
                }
            } else {
                entries.push(segment(
                    kf.frame as f64,
                    getter(&self.at(kf.frame)),
                    getter(&self.at(next.frame)),
                    self.handles.handles(&kf.easing),
                ));
            }
        }
        if let Some(last) = kfs.last() {
            if last.frame < self.total_frames {
                entries.push(LottieKeyframe::hold(
                    self.total_frames as f64,
                    getter(&self.at(self.total_frames)),
                ));
            }
        }
        Property::animated(entries)
    }
}

fn segment<T>(t: f64, s: T, e: T, [x1, y1, x2, y2]: [f64; 4]) -> LottieKeyframe<T> {
    LottieKeyframe::segment(t, s, e, EasingHandle::new(x1, y1), EasingHandle::new(x2, y2))
}

const BOX_SOURCES: &[AnimProp] = &[AnimProp::Width, AnimProp::Height];
const ANCHOR_SOURCES: &[AnimProp] = &[
    AnimProp::Width,
    AnimProp::Height,
    AnimProp::TransformOriginX,
    AnimProp::TransformOriginY,
];
const POSITION_SOURCES: &[AnimProp] = &[
    AnimProp::X,
    AnimProp::Y,
    AnimProp::Width,
    AnimProp::Height,
    AnimProp::TransformOriginX,
    AnimProp::TransformOriginY,
];

fn layer_transform(b: &ValueBuilder) -> Transform {
    Transform {
        a: b.property(ANCHOR_SOURCES, |e| {
            vec![e.transform_origin.x * e.width, e.transform_origin.y * e.height, 0.0]
        }),
        p: b.property(POSITION_SOURCES, |e| {
            let (px, py) = e.pivot();
            vec![px, py, 0.0]
        }),
        s: b.property(&[AnimProp::ScaleX, AnimProp::ScaleY], |e| {
            let (sx, sy) = e.effective_scale();
            vec![sx * 100.0, sy * 100.0, 100.0]
        }),
        r: b.property(&[AnimProp::Rotation], |e| e.rotation),
        o: b.property(&[AnimProp::Opacity], |e| e.opacity * 100.0),
    }
}

fn box_center(e: &Element) -> Vec<f64> {
    vec![e.width / 2.0, e.height / 2.0]
}

/// Geometry items in layer-local coordinates, where the element box spans
/// `[0, width] x [0, height]`.
fn geometry_shapes(b: &ValueBuilder, warnings: &mut Warnings) -> Option<Vec<Shape>> {
    let el = b.element;
    let shapes = match &el.kind {
        ElementKind::Rect(_) | ElementKind::Line => vec![Shape::Rect(RectShape {
            nm: Some("Rectangle".into()),
            d: 1,
            p: b.property(BOX_SOURCES, box_center),
            s: b.property(BOX_SOURCES, |e| vec![e.width, e.height]),
            r: b.property(&[AnimProp::CornerRadius], |e| match &e.kind {
                ElementKind::Rect(r) => r.rx,
                _ => 0.0,
            }),
        })],
        ElementKind::Circle => vec![Shape::Ellipse(EllipseShape {
            nm: Some("Ellipse".into()),
            d: 1,
            p: b.property(BOX_SOURCES, box_center),
            s: b.property(BOX_SOURCES, |e| {
                let d = e.width.min(e.height);
                vec![d, d]
            }),
        })],
        ElementKind::Ellipse => vec![Shape::Ellipse(EllipseShape {
            nm: Some("Ellipse".into()),
            d: 1,
            p: b.property(BOX_SOURCES, box_center),
            s: b.property(BOX_SOURCES, |e| vec![e.width, e.height]),
        })],
        ElementKind::Polygon(_) | ElementKind::Star(_) => vec![Shape::Path(PathShape {
            nm: Some(el.kind.type_name().to_string()),
            ks: b.property(BOX_SOURCES, |e| {
                let vertices = geometry::shape_vertices(e, 0.0, 0.0).unwrap_or_default();
                let mut contour = VertexPath {
                    v: vertices.iter().map(|p| [p.x, p.y]).collect(),
                    closed: true,
                    ..Default::default()
                };
                contour.i = vec![[0.0, 0.0]; contour.v.len()];
                contour.o = vec![[0.0, 0.0]; contour.v.len()];
                to_bezier(contour)
            }),
        })],
        ElementKind::Path(_) => path_shapes(b, warnings)?,
        ElementKind::Text(_) | ElementKind::Image(_) | ElementKind::Video(_) | ElementKind::Group(_) => {
            return None
        }
    };
    Some(shapes)
}

fn to_bezier(contour: VertexPath) -> BezierPath {
    BezierPath {
        c: contour.closed,
        i: contour.i,
        o: contour.o,
        v: contour.v,
    }
}

/// Path data of a path element: `d` when present, otherwise its points.
fn path_data(el: &Element) -> String {
    match &el.kind {
        ElementKind::Path(p) if p.d.trim().is_empty() => geometry::points_to_path_data(&p.points, p.closed),
        ElementKind::Path(p) => p.d.clone(),
        _ => String::new(),
    }
}

/// Contours in layer-local coordinates, or `None` for unusable path data.
fn local_contours(el: &Element) -> Option<Vec<VertexPath>> {
    let closed = matches!(&el.kind, ElementKind::Path(p) if p.closed);
    let path = geometry::parse_path_data(&path_data(el)).ok()?;
    let contours: Vec<VertexPath> = geometry::path_to_vertices(&path)
        .into_iter()
        .map(|c| {
            let mut c = c.translate(-el.x, -el.y);
            c.closed |= closed;
            c
        })
        .collect();
    (!contours.is_empty()).then_some(contours)
}

const PATH_SOURCES: &[AnimProp] = &[AnimProp::D, AnimProp::Points, AnimProp::X, AnimProp::Y];

fn path_shapes(b: &ValueBuilder, warnings: &mut Warnings) -> Option<Vec<Shape>> {
    let el = b.element;
    let omitted = || {
        format!(
            "Path \"{}\" has empty or malformed path data and was omitted from the Lottie export.",
            el.name
        )
    };
    let Some(contours) = local_contours(el) else {
        warnings.push(omitted());
        return None;
    };

    if !b.animates(PATH_SOURCES) {
        return Some(
            contours
                .into_iter()
                .map(|c| {
                    Shape::Path(PathShape {
                        nm: Some("Path".into()),
                        ks: Property::fixed(to_bezier(c)),
                    })
                })
                .collect(),
        );
    }

    let kfs = b.timeline.keyframes_for(&el.id);
    let frames = kfs.iter().map(|k| k.frame).chain(std::iter::once(b.total_frames));
    let mut multi_contour = contours.len() > 1;
    for frame in frames {
        match local_contours(&b.at(frame)) {
            Some(c) => multi_contour |= c.len() > 1,
            None => {
                warnings.push(omitted());
                return None;
            }
        }
    }
    if multi_contour {
        warnings.push("Animated paths with several subpaths keep only their first subpath in Lottie export.");
    }
    Some(vec![Shape::Path(PathShape {
        nm: Some("Path".into()),
        ks: b.property(PATH_SOURCES, |e| {
            local_contours(e)
                .and_then(|c| c.into_iter().next())
                .map(to_bezier)
                .unwrap_or_default()
        }),
    })])
}

fn line_cap_code(cap: LineCap) -> u8 {
    match cap {
        LineCap::Butt => 1,
        LineCap::Round => 2,
        LineCap::Square => 3,
    }
}

fn line_join_code(join: LineJoin) -> u8 {
    match join {
        LineJoin::Miter => 1,
        LineJoin::Round => 2,
        LineJoin::Bevel => 3,
    }
}

fn stroke_shape(b: &ValueBuilder) -> Option<Shape> {
    let stroke = b.element.stroke()?;
    let mut dashes = Vec::new();
    if !stroke.dash_array.is_empty() {
        let mut pattern = stroke.dash_array.clone();
        if pattern.len() % 2 == 1 {
            pattern.extend_from_within(..);
        }
        for (i, v) in pattern.iter().enumerate() {
            dashes.push(DashProperty {
                n: if i % 2 == 0 { "d" } else { "g" }.to_string(),
                nm: None,
                v: Property::fixed(*v),
            });
        }
        dashes.push(DashProperty {
            n: "o".to_string(),
            nm: None,
            v: Property::fixed(stroke.dash_offset),
        });
    }
    Some(Shape::Stroke(StrokeShape {
        nm: Some("Stroke".into()),
        o: Property::fixed(100.0),
        c: b.property(&[AnimProp::StrokeColor], |e| {
            e.stroke().map(|s| color::to_unit_rgba(&s.color)).unwrap_or_default()
        }),
        w: b.property(&[AnimProp::StrokeWidth], |e| e.stroke().map(|s| s.width).unwrap_or_default()),
        lc: line_cap_code(stroke.cap),
        lj: line_join_code(stroke.join),
        ml: (stroke.join == LineJoin::Miter).then_some(4.0),
        d: dashes,
    }))
}

fn fill_shape(b: &ValueBuilder, warnings: &mut Warnings) -> Option<Shape> {
    let el = b.element;
    let fill = el.fill()?;
    let rule = match &el.kind {
        ElementKind::Path(p) if !p.closed => return None,
        ElementKind::Path(p) if p.fill_rule == FillRule::Evenodd => FILL_RULE_EVENODD,
        _ => FILL_RULE_NONZERO,
    };
    if matches!(fill.kind, FillKind::Linear | FillKind::Radial) {
        warnings.push("Gradient fills are exported as solid colours in Lottie export.");
    }
    Some(Shape::Fill(FillShape {
        nm: Some("Fill".into()),
        o: Property::fixed(fill.opacity * 100.0),
        c: b.property(&[AnimProp::FillColor], |e| {
            e.fill().map(|f| color::to_unit_rgba(&f.color)).unwrap_or_default()
        }),
        r: rule,
    }))
}

fn blend_code(mode: BlendMode) -> u8 {
    match mode {
        BlendMode::Normal => 0,
        BlendMode::Multiply => 1,
        BlendMode::Screen => 2,
        BlendMode::Overlay => 3,
        BlendMode::Darken => 4,
        BlendMode::Lighten => 5,
        BlendMode::ColorDodge => 6,
        BlendMode::ColorBurn => 7,
        BlendMode::HardLight => 8,
        BlendMode::SoftLight => 9,
        BlendMode::Difference => 10,
        BlendMode::Exclusion => 11,
        BlendMode::Hue => 12,
        BlendMode::Saturation => 13,
        BlendMode::Color => 14,
        BlendMode::Luminosity => 15,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::easing::Easing;
    use crate::model::{Keyframe, PathProps, RectProps, TextProps};
    use crate::patch::PropertyPatch;

    fn rect(id: &str) -> Element {
        Element::new(id, ElementKind::Rect(RectProps::default()), 10.0, 20.0, 100.0, 50.0)
            .with_fill("FF0000")
            .with_stroke("000000", 2.0)
    }

    #[test]
    fn static_layer_is_pivot_aware() {
        let mut el = rect("a");
        el.transform_origin.x = 0.0;
        let scene = Scene::new(200, 200, 30, 60).with_element(el);
        let doc = build_document(&scene, &Default::default(), &mut Warnings::new()).unwrap();
        let ks = &doc.layers[0].ks;
        assert_eq!(ks.a.static_value(), Some(&vec![0.0, 25.0, 0.0]));
        assert_eq!(ks.p.static_value(), Some(&vec![10.0, 45.0, 0.0]));
        assert_eq!(ks.o.static_value(), Some(&100.0));
        let Shape::Group(group) = &doc.layers[0].shapes[0] else {
            panic!("expected a group");
        };
        let codes: Vec<&str> = group.it.iter().map(Shape::type_code).collect();
        assert_eq!(codes, vec!["rc", "st", "fl", "tr"]);
    }

    #[test]
    fn keyframed_opacity_uses_easing_handles() {
        let scene = Scene::new(200, 200, 30, 60)
            .with_element(rect("a"))
            .with_keyframe(
                Keyframe::new("a", 0, PropertyPatch::new().with(AnimProp::Opacity, 0.0))
                    .with_easing(Easing::parse("ease-out")),
            )
            .with_keyframe(Keyframe::new("a", 30, PropertyPatch::new().with(AnimProp::Opacity, 1.0)));
        let doc = build_document(&scene, &Default::default(), &mut Warnings::new()).unwrap();
        let o = &doc.layers[0].ks.o;
        let kfs = o.keyframes();
        assert_eq!(kfs.len(), 3);
        assert_eq!((kfs[0].t, kfs[0].s, kfs[0].e), (0.0, 0.0, Some(100.0)));
        assert_eq!(kfs[0].o.as_ref().map(|h| h.x.clone()), Some(vec![0.0]));
        assert_eq!(kfs[0].i.as_ref().map(|h| h.y.clone()), Some(vec![1.0]));
        assert_eq!((kfs[1].t, kfs[1].s, kfs[1].e), (30.0, 100.0, None));
        assert_eq!((kfs[2].t, kfs[2].s), (60.0, 100.0));
        assert!(!doc.layers[0].ks.p.is_animated());
    }

    #[test]
    fn baking_expands_bounce_segments() {
        let scene = Scene::new(200, 200, 10, 10)
            .with_element(rect("a"))
            .with_keyframe(
                Keyframe::new("a", 0, PropertyPatch::new().with(AnimProp::Rotation, 0.0))
                    .with_easing(Easing::parse("ease-out-bounce")),
            )
            .with_keyframe(Keyframe::new("a", 4, PropertyPatch::new().with(AnimProp::Rotation, 90.0)));
        let options = LottieExportOptions::default().with_baked_easing(true);
        let doc = build_document(&scene, &options, &mut Warnings::new()).unwrap();
        let kfs = doc.layers[0].ks.r.keyframes();
        // four per-frame segments, the final keyframe, the trailing hold
        assert_eq!(kfs.len(), 6);
        let bounce = Easing::parse("ease-out-bounce");
        assert!((kfs[1].s - 90.0 * bounce.apply(0.25)).abs() < 1e-9);
        assert_eq!(kfs[1].o.as_ref().map(|h| h.x.clone()), Some(vec![0.0]));
    }

    #[test]
    fn unsupported_kinds_warn_once_and_emit_no_layer() {
        let text = |id: &str| {
            Element::new(
                id,
                ElementKind::Text(TextProps {
                    text: "hi".into(),
                    font_size: 12.0,
                    font_family: "Inter".into(),
                    font_weight: 400,
                    text_align: Default::default(),
                    letter_spacing: 0.0,
                    line_height: 1.2,
                }),
                0.0,
                0.0,
                10.0,
                10.0,
            )
        };
        let scene = Scene::new(100, 100, 30, 30)
            .with_element(text("t1"))
            .with_element(text("t2"));
        let exported = export_lottie(&scene, &Default::default()).unwrap();
        let doc: LottieJson = serde_json::from_str(&exported.artifact).unwrap();
        assert!(doc.layers.is_empty());
        let text_warnings = exported
            .warnings
            .iter()
            .filter(|w| w.starts_with("Text elements"))
            .count();
        assert_eq!(text_warnings, 1);
    }

    #[test]
    fn malformed_path_is_omitted_with_warning() {
        let el = Element::new(
            "p",
            ElementKind::Path(PathProps {
                d: "M 0 0 L".into(),
                closed: true,
                ..Default::default()
            }),
            0.0,
            0.0,
            10.0,
            10.0,
        )
        .named("Squiggle");
        let scene = Scene::new(100, 100, 30, 30).with_element(el);
        let mut warnings = Warnings::new();
        let doc = build_document(&scene, &Default::default(), &mut warnings).unwrap();
        assert!(doc.layers.is_empty());
        assert!(warnings.iter().any(|w| w.contains("\"Squiggle\"")));
    }

    #[test]
    fn path_vertices_are_layer_local() {
        let el = Element::new(
            "p",
            ElementKind::Path(PathProps {
                d: "M 50 50 L 60 50 L 60 60 Z".into(),
                closed: true,
                ..Default::default()
            }),
            50.0,
            50.0,
            10.0,
            10.0,
        )
        .with_fill("00FF00");
        let scene = Scene::new(100, 100, 30, 30).with_element(el);
        let doc = build_document(&scene, &Default::default(), &mut Warnings::new()).unwrap();
        let Shape::Group(group) = &doc.layers[0].shapes[0] else {
            panic!("expected a group");
        };
        let Shape::Path(path) = &group.it[0] else {
            panic!("expected a path");
        };
        let bezier = path.ks.static_value().unwrap();
        assert!(bezier.c);
        assert_eq!(bezier.v, vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0]]);
    }

    #[test]
    fn zero_fps_is_rejected() {
        let scene = Scene::new(100, 100, 0, 30);
        assert!(matches!(
            export_lottie(&scene, &Default::default()),
            Err(ExportError::InvalidOptions(_))
        ));
    }
}
