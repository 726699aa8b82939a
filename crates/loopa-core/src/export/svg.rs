//! SVG export, either a static snapshot of frame 0 or a self-animating
//! document driven by SMIL `<animate>`/`<animateTransform>` directives.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::easing::{HandleTable, LINEAR_HANDLES};
use crate::errors::ExportError;
use crate::export::{validate_scene, EMPTY_EXPORT_WARNING};
use crate::markup::{self, fmt_num, ElementMarkup, Node, Tag};
use crate::model::{Element, ElementKind, Scene};
use crate::patch::AnimProp;
use crate::timeline::{FrameSample, Timeline};
use crate::warnings::{Exported, Warnings};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SvgExportOptions {
    pub animated: bool,
    #[serde(rename = "loop")]
    pub looping: bool,
    /// Sample non-Bézier easings at every frame with linear splines.
    pub bake_non_bezier_easing: bool,
}

impl Default for SvgExportOptions {
    fn default() -> Self {
        Self {
            animated: true,
            looping: true,
            bake_non_bezier_easing: false,
        }
    }
}

impl SvgExportOptions {
    pub fn still() -> Self {
        Self {
            animated: false,
            ..Self::default()
        }
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_baked_easing(mut self, bake: bool) -> Self {
        self.bake_non_bezier_easing = bake;
        self
    }
}

/// Which node of the element's markup a directive animates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveTarget {
    /// The primary shape node.
    Shape,
    /// The wrapper group.
    Wrapper,
    /// The dedicated rotation group.
    Rotate,
    /// The dedicated pivot-scale group.
    Scale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Animate(&'static str),
    Rotate,
    Translate,
    Scale,
}

/// One sampled animation: a value per sample time plus one spline per interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub target: DirectiveTarget,
    pub kind: DirectiveKind,
    pub values: Vec<String>,
    pub key_times: Vec<f64>,
    pub splines: Vec<[f64; 4]>,
}

impl Directive {
    pub fn attribute(&self) -> &'static str {
        match self.kind {
            DirectiveKind::Animate(attr) => attr,
            _ => "transform",
        }
    }

    pub fn to_tag(&self, dur: &str, looping: bool) -> Tag {
        let mut tag = match self.kind {
            DirectiveKind::Animate(attr) => Tag::new("animate").attr("attributeName", attr),
            DirectiveKind::Rotate | DirectiveKind::Translate | DirectiveKind::Scale => {
                let kind = match self.kind {
                    DirectiveKind::Rotate => "rotate",
                    DirectiveKind::Translate => "translate",
                    _ => "scale",
                };
                Tag::new("animateTransform")
                    .attr("attributeName", "transform")
                    .attr("type", kind)
            }
        };
        let key_times: Vec<String> = self.key_times.iter().map(|t| t.to_string()).collect();
        let splines: Vec<String> = self
            .splines
            .iter()
            .map(|s| s.iter().map(|v| fmt_num(*v)).collect::<Vec<_>>().join(" "))
            .collect();
        tag.set("values", self.values.join(";"));
        tag.set("keyTimes", key_times.join(";"));
        tag.set("dur", dur);
        tag.set("calcMode", "spline");
        tag.set("keySplines", splines.join(";"));
        if !matches!(self.kind, DirectiveKind::Animate(_)) {
            tag.set("additive", "sum");
        }
        if looping {
            tag.set("repeatCount", "indefinite");
        } else {
            tag.set("repeatCount", "1");
            tag.set("fill", "freeze");
        }
        tag
    }
}

type AttrSources = &'static [(&'static str, &'static [AnimProp])];

const PAINT_ATTRS: AttrSources = &[
    ("fill", &[AnimProp::FillColor]),
    ("stroke", &[AnimProp::StrokeColor, AnimProp::FillColor]),
    ("stroke-width", &[AnimProp::StrokeWidth]),
];

const BOX_ATTRS: AttrSources = &[
    ("x", &[AnimProp::X]),
    ("y", &[AnimProp::Y]),
    ("width", &[AnimProp::Width]),
    ("height", &[AnimProp::Height]),
];

const PIVOT_SOURCES: &[AnimProp] = &[
    AnimProp::X,
    AnimProp::Y,
    AnimProp::Width,
    AnimProp::Height,
    AnimProp::TransformOriginX,
    AnimProp::TransformOriginY,
];

const UNANIMATED_SOURCES: &[AnimProp] = &[
    AnimProp::Blur,
    AnimProp::ShadowX,
    AnimProp::ShadowY,
    AnimProp::ShadowBlur,
    AnimProp::ShadowOpacity,
    AnimProp::ShadowColor,
];

const RECT_ATTRS: AttrSources = &[
    ("x", &[AnimProp::X]),
    ("y", &[AnimProp::Y]),
    ("width", &[AnimProp::Width]),
    ("height", &[AnimProp::Height]),
    ("rx", &[AnimProp::CornerRadius]),
];

const CIRCLE_ATTRS: AttrSources = &[
    ("cx", &[AnimProp::X, AnimProp::Width]),
    ("cy", &[AnimProp::Y, AnimProp::Height]),
    ("r", &[AnimProp::Width, AnimProp::Height]),
];

const ELLIPSE_ATTRS: AttrSources = &[
    ("cx", &[AnimProp::X, AnimProp::Width]),
    ("cy", &[AnimProp::Y, AnimProp::Height]),
    ("rx", &[AnimProp::Width]),
    ("ry", &[AnimProp::Height]),
];

const LINE_ATTRS: AttrSources = &[
    ("x1", &[AnimProp::X]),
    ("y1", &[AnimProp::Y, AnimProp::Height]),
    ("x2", &[AnimProp::X, AnimProp::Width]),
    ("y2", &[AnimProp::Y, AnimProp::Height]),
];

const POLYGON_ATTRS: AttrSources = &[(
    "points",
    &[AnimProp::X, AnimProp::Y, AnimProp::Width, AnimProp::Height],
)];

const PATH_ATTRS: AttrSources = &[("d", &[AnimProp::D, AnimProp::Points])];

const TEXT_ATTRS: AttrSources = &[
    ("x", &[AnimProp::X]),
    ("y", &[AnimProp::Y, AnimProp::FontSize]),
    ("font-size", &[AnimProp::FontSize]),
];

/// Shape attributes an element kind can animate, with the properties that feed them.
fn shape_attributes(kind: &ElementKind) -> Vec<(&'static str, &'static [AnimProp])> {
    let (geometry, painted) = match kind {
        ElementKind::Rect(_) => (RECT_ATTRS, true),
        ElementKind::Image(_) | ElementKind::Video(_) => (BOX_ATTRS, false),
        ElementKind::Circle => (CIRCLE_ATTRS, true),
        ElementKind::Ellipse => (ELLIPSE_ATTRS, true),
        ElementKind::Line => (LINE_ATTRS, true),
        ElementKind::Polygon(_) | ElementKind::Star(_) => (POLYGON_ATTRS, true),
        ElementKind::Path(_) => (PATH_ATTRS, true),
        ElementKind::Text(_) => (TEXT_ATTRS, true),
        ElementKind::Group(_) => return Vec::new(),
    };
    let paint: AttrSources = if painted { PAINT_ATTRS } else { &[] };
    geometry.iter().chain(paint).copied().collect()
}

fn round_key_time(frame: u32, total: u32) -> f64 {
    ((frame as f64 / total as f64) * 1e6).round() / 1e6
}

/// Sample times for an element: `{0, keyframes.., total}`, plus every integer
/// frame inside baked segments.
fn sample_frames(timeline: &Timeline, element_id: &str, options: &SvgExportOptions, handles: &HandleTable) -> Vec<u32> {
    let frames = timeline.sample_frames(element_id);
    if !options.bake_non_bezier_easing {
        return frames;
    }
    let mut expanded = Vec::with_capacity(frames.len());
    for pair in frames.windows(2) {
        let easing = timeline.easing_at(element_id, pair[0]);
        if handles.is_bezier_representable(&easing) {
            expanded.push(pair[0]);
        } else {
            expanded.extend(pair[0]..pair[1]);
        }
    }
    expanded.extend(frames.last());
    expanded
}

/// Every animation directive the element needs, sampled from the timeline.
pub fn build_directives(timeline: &Timeline, element: &Element, options: &SvgExportOptions) -> Vec<Directive> {
    let id = element.id.as_str();
    let total = timeline.scene().total_frames;
    if !timeline.has_keyframes(id) || total == 0 {
        return Vec::new();
    }
    let handles = HandleTable::standard();
    let frames = sample_frames(timeline, id, options, &handles);
    let states: Vec<Element> = frames.iter().map(|f| timeline.resolve(element, *f as f64)).collect();
    let key_times: Vec<f64> = frames.iter().map(|f| round_key_time(*f, total)).collect();
    let splines: Vec<[f64; 4]> = frames
        .windows(2)
        .map(|pair| {
            let easing = timeline.easing_at(id, pair[0]);
            if options.bake_non_bezier_easing && !handles.is_bezier_representable(&easing) {
                LINEAR_HANDLES
            } else {
                handles.handles(&easing).map(|v| v.clamp(0.0, 1.0))
            }
        })
        .collect();

    let directive = |target, kind, values: Vec<String>| Directive {
        target,
        kind,
        values,
        key_times: key_times.clone(),
        splines: splines.clone(),
    };
    let moves = |values: &[String]| values.iter().any(|v| *v != values[0]);

    let mut out = Vec::new();

    let shapes: Vec<Option<Tag>> = states.iter().map(markup::shape_tag).collect();
    for (attr, sources) in shape_attributes(&element.kind) {
        if !timeline.animates_any(id, sources) {
            continue;
        }
        let values: Option<Vec<String>> = shapes
            .iter()
            .map(|tag| tag.as_ref().and_then(|t| t.get(attr)).map(str::to_string))
            .collect();
        match values {
            Some(values) if moves(&values) => {
                out.push(directive(DirectiveTarget::Shape, DirectiveKind::Animate(attr), values))
            }
            _ => {}
        }
    }

    if timeline.animates(id, AnimProp::Opacity) {
        let values: Vec<String> = states.iter().map(|s| fmt_num(s.opacity)).collect();
        if moves(&values) {
            out.push(directive(DirectiveTarget::Wrapper, DirectiveKind::Animate("opacity"), values));
        }
    }

    let pivot_moves = timeline.animates_any(id, PIVOT_SOURCES);
    let rotated = states.iter().any(|s| s.rotation != 0.0);
    if timeline.animates(id, AnimProp::Rotation) || (pivot_moves && rotated) {
        let values: Vec<String> = states
            .iter()
            .map(|s| {
                let (cx, cy) = s.pivot();
                format!("{} {} {}", fmt_num(s.rotation), fmt_num(cx), fmt_num(cy))
            })
            .collect();
        if moves(&values) {
            out.push(directive(DirectiveTarget::Rotate, DirectiveKind::Rotate, values));
        }
    }

    let scaled = states.iter().any(|s| s.effective_scale() != (1.0, 1.0));
    if timeline.animates_any(id, &[AnimProp::ScaleX, AnimProp::ScaleY]) || (pivot_moves && scaled) {
        let pivots: Vec<(f64, f64)> = states.iter().map(Element::pivot).collect();
        let scales: Vec<String> = states
            .iter()
            .map(|s| {
                let (sx, sy) = s.effective_scale();
                format!("{} {}", fmt_num(sx), fmt_num(sy))
            })
            .collect();
        let to_pivot: Vec<String> = pivots.iter().map(|(x, y)| format!("{} {}", fmt_num(*x), fmt_num(*y))).collect();
        let from_pivot: Vec<String> = pivots
            .iter()
            .map(|(x, y)| format!("{} {}", fmt_num(-x), fmt_num(-y)))
            .collect();
        if moves(&scales) || moves(&to_pivot) {
            out.push(directive(DirectiveTarget::Scale, DirectiveKind::Translate, to_pivot));
            out.push(directive(DirectiveTarget::Scale, DirectiveKind::Scale, scales));
            out.push(directive(DirectiveTarget::Scale, DirectiveKind::Translate, from_pivot));
        }
    }

    out
}

/// Serializes the scene as SVG.
#[instrument(skip_all, fields(animated = options.animated, elements = scene.elements.len()))]
pub fn export_svg(scene: &Scene, options: &SvgExportOptions) -> Result<Exported<String>, ExportError> {
    let mut warnings = Warnings::new();
    let timeline = Timeline::new(scene);
    let sample = timeline.sample(0.0);
    if sample.top_level().next().is_none() {
        warnings.push(EMPTY_EXPORT_WARNING);
    }

    if !options.animated {
        let svg = markup::serialize_frame(&sample, scene.width, scene.height, None);
        info!(bytes = svg.len(), "static SVG export finished");
        return Ok(Exported::new(svg, warnings));
    }

    validate_scene(scene)?;
    if scene.total_frames == 0 {
        return Err(ExportError::InvalidOptions(
            "animated SVG export needs at least one frame of duration".into(),
        ));
    }

    let ctx = AnimatedContext {
        timeline: &timeline,
        sample: &sample,
        options,
        dur: format!("{}s", fmt_num(scene.duration_secs())),
    };
    let mut root = markup::svg_root(scene.width, scene.height).attr("data-duration", ctx.dur.clone());
    for el in sample.top_level() {
        if let Some(node) = ctx.element_node(el, &mut warnings) {
            root.push(node);
        }
    }
    let svg = Node::Tag(root).render();
    info!(bytes = svg.len(), warnings = warnings.len(), "animated SVG export finished");
    Ok(Exported::new(svg, warnings))
}

struct AnimatedContext<'a, 't> {
    timeline: &'a Timeline<'t>,
    sample: &'a FrameSample,
    options: &'a SvgExportOptions,
    dur: String,
}

impl AnimatedContext<'_, '_> {
    /// `base` is the element as resolved at frame 0.
    fn element_node(&self, base: &Element, warnings: &mut Warnings) -> Option<Node> {
        let mut markup = markup::element_markup(base, self.sample)?;
        if matches!(base.kind, ElementKind::Group(_)) {
            markup.content = self
                .sample
                .children_of(base)
                .filter_map(|child| self.element_node(child, warnings))
                .collect();
        }
        let Some(source) = self.timeline.scene().element(&base.id) else {
            return Some(markup.into_node());
        };
        if self.timeline.animates_any(&source.id, UNANIMATED_SOURCES) {
            warnings.push("Animated blur and shadow values are exported at their first-frame value in SVG.");
        }
        let directives = build_directives(self.timeline, source, self.options);
        if !directives.is_empty() && self.overshoots(&source.id) {
            warnings.push("Overshooting easing curves are clamped to the 0-1 range in SVG animations.");
        }
        debug!(element = %base.id, directives = directives.len(), "animated SVG element");
        Some(self.attach(markup, base, &directives))
    }

    /// Whether any keyframe easing leaves the unit square and had to be clamped.
    fn overshoots(&self, element_id: &str) -> bool {
        let handles = HandleTable::standard();
        self.timeline.keyframes_for(element_id).iter().any(|k| {
            let bakes = self.options.bake_non_bezier_easing && !handles.is_bezier_representable(&k.easing);
            !bakes && handles.handles(&k.easing).iter().any(|v| !(0.0..=1.0).contains(v))
        })
    }

    fn attach(&self, mut markup: ElementMarkup, base: &Element, directives: &[Directive]) -> Node {
        let tag = |d: &Directive| d.to_tag(&self.dur, self.options.looping);
        for d in directives {
            match d.target {
                DirectiveTarget::Shape => {
                    if let Some(shape) = markup.shape_mut() {
                        shape.push(tag(d));
                    }
                }
                DirectiveTarget::Wrapper => markup.wrapper.push(tag(d)),
                DirectiveTarget::Rotate | DirectiveTarget::Scale => {}
            }
        }

        let rotations: Vec<&Directive> = directives.iter().filter(|d| d.target == DirectiveTarget::Rotate).collect();
        let scales: Vec<&Directive> = directives.iter().filter(|d| d.target == DirectiveTarget::Scale).collect();
        if rotations.is_empty() && scales.is_empty() {
            return markup.into_node();
        }

        // Rotation and scale move to dedicated groups so each can animate
        // around its own pivot: wrapper > rotate > scale > content.
        markup.wrapper.remove("transform");
        let mut rotate_g = Tag::new("g");
        if rotations.is_empty() {
            if let Some(rotate) = markup::rotate_value(base) {
                rotate_g.set("transform", rotate);
            }
        }
        for d in rotations {
            rotate_g.push(tag(d));
        }
        let mut scale_g = Tag::new("g");
        if scales.is_empty() {
            if let Some(scale) = markup::scale_value(base) {
                scale_g.set("transform", scale);
            }
        }
        for d in scales {
            scale_g.push(tag(d));
        }
        scale_g.children.append(&mut markup.content);
        rotate_g.push(scale_g);
        markup.content = vec![rotate_g.into()];
        markup.primary = None;
        markup.into_node()
    }
}
