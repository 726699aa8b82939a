//! The scene document: elements, keyframes and scene-level settings.

use serde::{Deserialize, Serialize};

use crate::easing::Easing;
use crate::geometry;
use crate::patch::{AnimProp, PropValue, PropertyPatch};

fn one() -> f64 {
    1.0
}

fn yes() -> bool {
    true
}

fn half() -> f64 {
    0.5
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointKind {
    #[default]
    Corner,
    Smooth,
    Symmetric,
}

/// A vertex of a user-drawn path. Handles are absolute coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathPoint {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle_in: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle_out: Option<Point>,
    #[serde(default, rename = "type")]
    pub kind: PointKind,
}

impl PathPoint {
    pub fn corner(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            handle_in: None,
            handle_out: None,
            kind: PointKind::Corner,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillKind {
    #[default]
    Solid,
    Linear,
    Radial,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fill {
    #[serde(default = "yes")]
    pub visible: bool,
    #[serde(default, rename = "type")]
    pub kind: FillKind,
    pub color: String,
    #[serde(default = "one")]
    pub opacity: f64,
}

impl Fill {
    pub fn solid(color: &str) -> Self {
        Self {
            visible: true,
            kind: FillKind::Solid,
            color: color.to_string(),
            opacity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokePosition {
    #[default]
    Center,
    Inside,
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

impl LineCap {
    pub fn name(self) -> &'static str {
        match self {
            LineCap::Butt => "butt",
            LineCap::Round => "round",
            LineCap::Square => "square",
        }
    }
}

impl LineJoin {
    pub fn name(self) -> &'static str {
        match self {
            LineJoin::Miter => "miter",
            LineJoin::Round => "round",
            LineJoin::Bevel => "bevel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    #[serde(default = "yes")]
    pub visible: bool,
    pub color: String,
    #[serde(default = "one")]
    pub width: f64,
    #[serde(default)]
    pub position: StrokePosition,
    #[serde(default)]
    pub cap: LineCap,
    #[serde(default)]
    pub join: LineJoin,
    #[serde(default)]
    pub dash_array: Vec<f64>,
    #[serde(default)]
    pub dash_offset: f64,
}

impl Stroke {
    pub fn solid(color: &str, width: f64) -> Self {
        Self {
            visible: true,
            color: color.to_string(),
            width,
            position: StrokePosition::Center,
            cap: LineCap::Butt,
            join: LineJoin::Miter,
            dash_array: Vec::new(),
            dash_offset: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shadow {
    #[serde(default = "yes")]
    pub visible: bool,
    pub color: String,
    #[serde(default = "one")]
    pub opacity: f64,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub blur: f64,
    #[serde(default)]
    pub spread: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    pub fn css_name(self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
            BlendMode::ColorDodge => "color-dodge",
            BlendMode::ColorBurn => "color-burn",
            BlendMode::HardLight => "hard-light",
            BlendMode::SoftLight => "soft-light",
            BlendMode::Difference => "difference",
            BlendMode::Exclusion => "exclusion",
            BlendMode::Hue => "hue",
            BlendMode::Saturation => "saturation",
            BlendMode::Color => "color",
            BlendMode::Luminosity => "luminosity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformOrigin {
    #[serde(default = "half")]
    pub x: f64,
    #[serde(default = "half")]
    pub y: f64,
}

impl Default for TransformOrigin {
    fn default() -> Self {
        Self { x: 0.5, y: 0.5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectFit {
    #[default]
    Contain,
    Cover,
    Fill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillRule {
    #[default]
    Nonzero,
    Evenodd,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RectProps {
    #[serde(default)]
    pub rx: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolygonProps {
    #[serde(default = "PolygonProps::default_sides")]
    pub sides: u32,
}

impl PolygonProps {
    fn default_sides() -> u32 {
        6
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarProps {
    #[serde(default = "StarProps::default_points")]
    pub star_points: u32,
    /// Inner radius as a fraction of the outer radius.
    #[serde(default = "StarProps::default_inner")]
    pub inner_radius: f64,
}

impl StarProps {
    fn default_points() -> u32 {
        5
    }

    fn default_inner() -> f64 {
        0.4
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextProps {
    #[serde(default)]
    pub text: String,
    #[serde(default = "TextProps::default_font_size")]
    pub font_size: f64,
    #[serde(default = "TextProps::default_font_family")]
    pub font_family: String,
    #[serde(default = "TextProps::default_font_weight")]
    pub font_weight: u32,
    #[serde(default)]
    pub text_align: TextAlign,
    #[serde(default)]
    pub letter_spacing: f64,
    #[serde(default = "TextProps::default_line_height")]
    pub line_height: f64,
}

impl TextProps {
    fn default_font_size() -> f64 {
        16.0
    }

    fn default_font_family() -> String {
        "Inter".to_string()
    }

    fn default_font_weight() -> u32 {
        400
    }

    fn default_line_height() -> f64 {
        1.2
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathProps {
    #[serde(default)]
    pub points: Vec<PathPoint>,
    #[serde(default)]
    pub closed: bool,
    /// Serialized path data in artboard coordinates.
    #[serde(default)]
    pub d: String,
    #[serde(default)]
    pub fill_rule: FillRule,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupProps {
    #[serde(default)]
    pub child_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageProps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub fit: ObjectFit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProps {
    pub source: String,
    #[serde(default)]
    pub trim_start: f64,
    /// Seconds into the source; `0` means "until the end".
    #[serde(default)]
    pub trim_end: f64,
    #[serde(default = "one")]
    pub playback_rate: f64,
    #[serde(default)]
    pub fit: ObjectFit,
}

/// Type-specific element data, tagged by `type` in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElementKind {
    Rect(RectProps),
    Circle,
    Ellipse,
    Line,
    Polygon(PolygonProps),
    Star(StarProps),
    Text(TextProps),
    Path(PathProps),
    Group(GroupProps),
    Image(ImageProps),
    Video(VideoProps),
}

impl ElementKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ElementKind::Rect(_) => "rect",
            ElementKind::Circle => "circle",
            ElementKind::Ellipse => "ellipse",
            ElementKind::Line => "line",
            ElementKind::Polygon(_) => "polygon",
            ElementKind::Star(_) => "star",
            ElementKind::Text(_) => "text",
            ElementKind::Path(_) => "path",
            ElementKind::Group(_) => "group",
            ElementKind::Image(_) => "image",
            ElementKind::Video(_) => "video",
        }
    }
}

/// A drawable object on the artboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub kind: ElementKind,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    /// Degrees, clockwise.
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "one")]
    pub scale_x: f64,
    #[serde(default = "one")]
    pub scale_y: f64,
    #[serde(default)]
    pub transform_origin: TransformOrigin,
    #[serde(default)]
    pub flip_x: bool,
    #[serde(default)]
    pub flip_y: bool,
    #[serde(default = "one")]
    pub opacity: f64,
    #[serde(default)]
    pub blend_mode: BlendMode,
    #[serde(default)]
    pub blur: f64,
    #[serde(default = "yes")]
    pub visible: bool,
    #[serde(default)]
    pub fills: Vec<Fill>,
    #[serde(default)]
    pub strokes: Vec<Stroke>,
    #[serde(default)]
    pub shadows: Vec<Shadow>,
}

impl Element {
    pub fn new(id: &str, kind: ElementKind, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            kind,
            x,
            y,
            width,
            height,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            transform_origin: TransformOrigin::default(),
            flip_x: false,
            flip_y: false,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            blur: 0.0,
            visible: true,
            fills: Vec::new(),
            strokes: Vec::new(),
            shadows: Vec::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_fill(mut self, color: &str) -> Self {
        self.fills.push(Fill::solid(color));
        self
    }

    pub fn with_stroke(mut self, color: &str, width: f64) -> Self {
        self.strokes.push(Stroke::solid(color, width));
        self
    }

    /// First visible fill that paints something.
    pub fn fill(&self) -> Option<&Fill> {
        self.fills
            .iter()
            .find(|f| f.visible && f.kind != FillKind::None)
    }

    pub fn stroke(&self) -> Option<&Stroke> {
        self.strokes.iter().find(|s| s.visible)
    }

    pub fn shadow(&self) -> Option<&Shadow> {
        self.shadows.iter().find(|s| s.visible)
    }

    // Animated paint values land on the same entries the readers above pick.
    fn fill_mut(&mut self) -> Option<&mut Fill> {
        self.fills
            .iter_mut()
            .find(|f| f.visible && f.kind != FillKind::None)
    }

    fn stroke_mut(&mut self) -> Option<&mut Stroke> {
        self.strokes.iter_mut().find(|s| s.visible)
    }

    fn shadow_mut(&mut self) -> Option<&mut Shadow> {
        self.shadows.iter_mut().find(|s| s.visible)
    }

    /// Pivot of rotation and scale, in artboard coordinates.
    pub fn pivot(&self) -> (f64, f64) {
        (
            self.x + self.transform_origin.x * self.width,
            self.y + self.transform_origin.y * self.height,
        )
    }

    pub fn effective_scale(&self) -> (f64, f64) {
        let sx = if self.flip_x { -self.scale_x } else { self.scale_x };
        let sy = if self.flip_y { -self.scale_y } else { self.scale_y };
        (sx, sy)
    }

    pub fn child_ids(&self) -> &[String] {
        match &self.kind {
            ElementKind::Group(g) => &g.child_ids,
            _ => &[],
        }
    }

    /// A copy of this element with `patch` merged over it.
    pub fn with_patch(&self, patch: &PropertyPatch) -> Element {
        let mut el = self.clone();
        for (prop, value) in patch.iter() {
            el.apply(prop, value);
        }
        el
    }

    fn apply(&mut self, prop: AnimProp, value: &PropValue) {
        match (prop, value) {
            (AnimProp::X, PropValue::Number(v)) => self.x = *v,
            (AnimProp::Y, PropValue::Number(v)) => self.y = *v,
            (AnimProp::Width, PropValue::Number(v)) => self.width = *v,
            (AnimProp::Height, PropValue::Number(v)) => self.height = *v,
            (AnimProp::Rotation, PropValue::Number(v)) => self.rotation = *v,
            (AnimProp::ScaleX, PropValue::Number(v)) => self.scale_x = *v,
            (AnimProp::ScaleY, PropValue::Number(v)) => self.scale_y = *v,
            (AnimProp::Opacity, PropValue::Number(v)) => self.opacity = *v,
            (AnimProp::Blur, PropValue::Number(v)) => self.blur = *v,
            (AnimProp::TransformOriginX, PropValue::Number(v)) => self.transform_origin.x = *v,
            (AnimProp::TransformOriginY, PropValue::Number(v)) => self.transform_origin.y = *v,
            (AnimProp::CornerRadius, PropValue::Number(v)) => {
                if let ElementKind::Rect(rect) = &mut self.kind {
                    rect.rx = *v;
                }
            }
            (AnimProp::FontSize, PropValue::Number(v)) => {
                if let ElementKind::Text(text) = &mut self.kind {
                    text.font_size = *v;
                }
            }
            (AnimProp::FillColor, PropValue::Text(c)) => {
                if let Some(fill) = self.fill_mut() {
                    fill.color = c.clone();
                }
            }
            (AnimProp::StrokeColor, PropValue::Text(c)) => {
                if let Some(stroke) = self.stroke_mut() {
                    stroke.color = c.clone();
                }
            }
            (AnimProp::StrokeWidth, PropValue::Number(v)) => {
                if let Some(stroke) = self.stroke_mut() {
                    stroke.width = *v;
                }
            }
            (AnimProp::ShadowX, PropValue::Number(v)) => {
                if let Some(shadow) = self.shadow_mut() {
                    shadow.x = *v;
                }
            }
            (AnimProp::ShadowY, PropValue::Number(v)) => {
                if let Some(shadow) = self.shadow_mut() {
                    shadow.y = *v;
                }
            }
            (AnimProp::ShadowBlur, PropValue::Number(v)) => {
                if let Some(shadow) = self.shadow_mut() {
                    shadow.blur = *v;
                }
            }
            (AnimProp::ShadowOpacity, PropValue::Number(v)) => {
                if let Some(shadow) = self.shadow_mut() {
                    shadow.opacity = *v;
                }
            }
            (AnimProp::ShadowColor, PropValue::Text(c)) => {
                if let Some(shadow) = self.shadow_mut() {
                    shadow.color = c.clone();
                }
            }
            (AnimProp::D, PropValue::Text(d)) => {
                if let ElementKind::Path(path) = &mut self.kind {
                    path.d = d.clone();
                }
            }
            (AnimProp::Points, PropValue::Points(points)) => {
                if let ElementKind::Path(path) = &mut self.kind {
                    path.d = geometry::points_to_path_data(points, path.closed);
                    path.points = points.clone();
                }
            }
            // Values of the wrong shape for their property leave the element untouched.
            _ => {}
        }
    }
}

/// A property patch anchored to one element at one integer frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyframe {
    #[serde(default)]
    pub id: String,
    pub element_id: String,
    pub frame: u32,
    #[serde(default)]
    pub props: PropertyPatch,
    /// Governs the segment that starts at this keyframe.
    #[serde(default)]
    pub easing: Easing,
}

impl Keyframe {
    pub fn new(element_id: &str, frame: u32, props: PropertyPatch) -> Self {
        Self {
            id: format!("kf-{element_id}-{frame}"),
            element_id: element_id.to_string(),
            frame,
            props,
            easing: Easing::default(),
        }
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }
}

/// The complete document handed to evaluators and exporters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    #[serde(default)]
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default = "Scene::default_fps")]
    pub fps: u32,
    #[serde(default = "Scene::default_total_frames")]
    pub total_frames: u32,
    #[serde(default = "Scene::default_background")]
    pub background: String,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub keyframes: Vec<Keyframe>,
}

impl Scene {
    fn default_fps() -> u32 {
        30
    }

    fn default_total_frames() -> u32 {
        60
    }

    fn default_background() -> String {
        "FFFFFF".to_string()
    }

    pub fn new(width: u32, height: u32, fps: u32, total_frames: u32) -> Self {
        Self {
            name: String::new(),
            width,
            height,
            fps,
            total_frames,
            background: Self::default_background(),
            elements: Vec::new(),
            keyframes: Vec::new(),
        }
    }

    pub fn with_element(mut self, element: Element) -> Self {
        self.elements.push(element);
        self
    }

    pub fn with_keyframe(mut self, keyframe: Keyframe) -> Self {
        self.set_keyframe(keyframe);
        self
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn duration_secs(&self) -> f64 {
        if self.fps == 0 {
            0.0
        } else {
            self.total_frames as f64 / self.fps as f64
        }
    }

    /// Inserts a keyframe, replacing any existing one for the same element and frame.
    pub fn set_keyframe(&mut self, mut keyframe: Keyframe) {
        if keyframe.id.is_empty() {
            keyframe.id = format!("kf-{}-{}", keyframe.element_id, keyframe.frame);
        }
        match self
            .keyframes
            .iter_mut()
            .find(|k| k.element_id == keyframe.element_id && k.frame == keyframe.frame)
        {
            Some(existing) => *existing = keyframe,
            None => self.keyframes.push(keyframe),
        }
    }

    pub fn remove_keyframe(&mut self, keyframe_id: &str) -> Option<Keyframe> {
        let idx = self.keyframes.iter().position(|k| k.id == keyframe_id)?;
        Some(self.keyframes.remove(idx))
    }

    /// Removes an element together with its keyframes and any group membership.
    pub fn remove_element(&mut self, element_id: &str) -> Option<Element> {
        let idx = self.elements.iter().position(|e| e.id == element_id)?;
        let removed = self.elements.remove(idx);
        self.keyframes.retain(|k| k.element_id != element_id);
        for el in &mut self.elements {
            if let ElementKind::Group(group) = &mut el.kind {
                group.child_ids.retain(|c| c != element_id);
            }
        }
        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(id: &str) -> Element {
        Element::new(id, ElementKind::Rect(RectProps::default()), 0.0, 0.0, 100.0, 50.0)
    }

    #[test]
    fn element_reads_camel_case_document() {
        let json = r#"{
            "id": "e1",
            "type": "star",
            "x": 10, "y": 20, "width": 100, "height": 80,
            "starPoints": 7,
            "scaleX": 2,
            "fills": [{"color": "FF0000"}],
            "strokes": [{"color": "000000", "width": 3, "cap": "round"}]
        }"#;
        let el: Element = serde_json::from_str(json).unwrap();
        assert_eq!(el.kind.type_name(), "star");
        match &el.kind {
            ElementKind::Star(star) => {
                assert_eq!(star.star_points, 7);
                assert_eq!(star.inner_radius, 0.4);
            }
            other => panic!("unexpected kind {other:?}"),
        }
        assert_eq!(el.scale_x, 2.0);
        assert_eq!(el.scale_y, 1.0);
        assert_eq!(el.opacity, 1.0);
        assert!(el.visible);
        assert_eq!(el.transform_origin, TransformOrigin { x: 0.5, y: 0.5 });
        assert_eq!(el.stroke().map(|s| s.cap), Some(LineCap::Round));
    }

    #[test]
    fn patch_overrides_matching_fields() {
        let el = rect("a").with_fill("000000").with_stroke("111111", 1.0);
        let patch = PropertyPatch::new()
            .with(AnimProp::X, 40.0)
            .with(AnimProp::CornerRadius, 8.0)
            .with(AnimProp::FillColor, "ABCDEF")
            .with(AnimProp::StrokeWidth, 4.0)
            .with(AnimProp::FontSize, 30.0);
        let patched = el.with_patch(&patch);
        assert_eq!(patched.x, 40.0);
        assert_eq!(patched.kind, ElementKind::Rect(RectProps { rx: 8.0 }));
        assert_eq!(patched.fills[0].color, "ABCDEF");
        assert_eq!(patched.strokes[0].width, 4.0);
        // The original is untouched.
        assert_eq!(el.x, 0.0);
    }

    #[test]
    fn paint_patches_skip_hidden_entries() {
        let mut el = rect("a").with_fill("111111").with_fill("222222");
        el.fills[0].visible = false;
        el.strokes = vec![Stroke::solid("333333", 1.0), Stroke::solid("444444", 2.0)];
        el.strokes[0].visible = false;
        let shadow = |visible| Shadow {
            visible,
            color: "000000".into(),
            opacity: 1.0,
            x: 0.0,
            y: 0.0,
            blur: 0.0,
            spread: 0.0,
        };
        el.shadows = vec![shadow(false), shadow(true)];

        let patched = el.with_patch(
            &PropertyPatch::new()
                .with(AnimProp::FillColor, "808080")
                .with(AnimProp::StrokeWidth, 6.0)
                .with(AnimProp::ShadowX, 5.0),
        );
        assert_eq!(patched.fill().map(|f| f.color.as_str()), Some("808080"));
        assert_eq!(patched.fills[0].color, "111111");
        assert_eq!(patched.stroke().map(|s| s.width), Some(6.0));
        assert_eq!(patched.strokes[0].width, 1.0);
        assert_eq!(patched.shadow().map(|s| s.x), Some(5.0));
        assert_eq!(patched.shadows[0].x, 0.0);
    }

    #[test]
    fn points_patch_regenerates_path_data() {
        let el = Element::new("p", ElementKind::Path(PathProps::default()), 0.0, 0.0, 10.0, 10.0);
        let points = vec![PathPoint::corner(0.0, 0.0), PathPoint::corner(10.0, 5.0)];
        let patched = el.with_patch(&PropertyPatch::new().with(AnimProp::Points, points));
        match patched.kind {
            ElementKind::Path(path) => assert_eq!(path.d, "M 0 0 L 10 5"),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn set_keyframe_replaces_same_frame() {
        let mut scene = Scene::new(100, 100, 30, 60).with_element(rect("a"));
        scene.set_keyframe(Keyframe::new("a", 10, PropertyPatch::new().with(AnimProp::X, 1.0)));
        scene.set_keyframe(Keyframe::new("a", 10, PropertyPatch::new().with(AnimProp::X, 2.0)));
        scene.set_keyframe(Keyframe::new("a", 20, PropertyPatch::new()));
        assert_eq!(scene.keyframes.len(), 2);
        assert_eq!(scene.keyframes[0].props.number(AnimProp::X), Some(2.0));
    }

    #[test]
    fn removing_an_element_cascades() {
        let group = Element::new(
            "g",
            ElementKind::Group(GroupProps {
                child_ids: vec!["a".into(), "b".into()],
            }),
            0.0,
            0.0,
            100.0,
            100.0,
        );
        let mut scene = Scene::new(100, 100, 30, 60)
            .with_element(group)
            .with_element(rect("a"))
            .with_element(rect("b"))
            .with_keyframe(Keyframe::new("a", 0, PropertyPatch::new()))
            .with_keyframe(Keyframe::new("b", 0, PropertyPatch::new()));

        assert!(scene.remove_element("a").is_some());
        assert_eq!(scene.keyframes.len(), 1);
        assert_eq!(scene.element("g").map(|g| g.child_ids().to_vec()), Some(vec!["b".to_string()]));
        assert!(scene.remove_keyframe("kf-b-0").is_some());
        assert!(scene.keyframes.is_empty());
    }
}
