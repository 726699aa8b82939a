//! SVG markup for a resolved frame.
//!
//! The same element markup feeds the static SVG export, the animated SVG
//! export (which injects animation directives into it) and the markup raster
//! strategy of the video exporter.

use crate::color;
use crate::model::{Element, ElementKind, FillRule, ObjectFit};
use crate::timeline::FrameSample;

pub const SVG_NS: &str = "http://www.w3.org/2000/svg";
const PLACEHOLDER_FILL: &str = "#111";

/// Rounds to three decimals for output; `-0` prints as `0`.
pub fn fmt_num(v: f64) -> String {
    let rounded = (v * 1000.0).round() / 1000.0;
    if rounded == 0.0 {
        return "0".to_string();
    }
    format!("{rounded}")
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Tag(Tag),
    Text(String),
    Comment(String),
}

impl Node {
    pub fn write(&self, out: &mut String) {
        match self {
            Node::Tag(tag) => tag.write(out),
            Node::Text(text) => out.push_str(&escape(text)),
            Node::Comment(text) => {
                out.push_str("<!-- ");
                out.push_str(&text.replace("--", "- -"));
                out.push_str(" -->");
            }
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.write(&mut out);
        out
    }
}

impl From<Tag> for Node {
    fn from(tag: Tag) -> Self {
        Node::Tag(tag)
    }
}

/// An element node with ordered attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: &'static str,
    pub attrs: Vec<(&'static str, String)>,
    pub children: Vec<Node>,
}

impl Tag {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &'static str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.attrs.iter().position(|(k, _)| *k == key)?;
        Some(self.attrs.remove(idx).1)
    }

    pub fn child(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    pub fn push(&mut self, node: impl Into<Node>) {
        self.children.push(node.into());
    }

    pub fn write(&self, out: &mut String) {
        out.push('<');
        out.push_str(self.name);
        for (k, v) in &self.attrs {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            out.push_str(&escape(v));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            child.write(out);
        }
        out.push_str("</");
        out.push_str(self.name);
        out.push('>');
    }
}

/// The markup of one element: a wrapper group carrying opacity, transform,
/// filter and blend mode around the element's content.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementMarkup {
    pub wrapper: Tag,
    pub content: Vec<Node>,
    /// Index into `content` of the primary shape node, if the element has one.
    pub primary: Option<usize>,
}

impl ElementMarkup {
    pub fn shape(&self) -> Option<&Tag> {
        match self.content.get(self.primary?)? {
            Node::Tag(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn shape_mut(&mut self) -> Option<&mut Tag> {
        match self.content.get_mut(self.primary?)? {
            Node::Tag(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn into_node(self) -> Node {
        let mut wrapper = self.wrapper;
        wrapper.children.extend(self.content);
        Node::Tag(wrapper)
    }
}

/// Pivot-aware `rotate(...)` and `scale(...)` transform, or `None` for identity.
pub fn transform_value(el: &Element) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(rotate) = rotate_value(el) {
        parts.push(rotate);
    }
    if let Some(scale) = scale_value(el) {
        parts.push(scale);
    }
    (!parts.is_empty()).then(|| parts.join(" "))
}

pub fn rotate_value(el: &Element) -> Option<String> {
    if el.rotation == 0.0 {
        return None;
    }
    let (cx, cy) = el.pivot();
    Some(format!(
        "rotate({} {} {})",
        fmt_num(el.rotation),
        fmt_num(cx),
        fmt_num(cy)
    ))
}

pub fn scale_value(el: &Element) -> Option<String> {
    let (sx, sy) = el.effective_scale();
    if sx == 1.0 && sy == 1.0 {
        return None;
    }
    let (cx, cy) = el.pivot();
    Some(format!(
        "translate({} {}) scale({} {}) translate({} {})",
        fmt_num(cx),
        fmt_num(cy),
        fmt_num(sx),
        fmt_num(sy),
        fmt_num(-cx),
        fmt_num(-cy)
    ))
}

fn filter_value(el: &Element) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(shadow) = el.shadow() {
        parts.push(format!(
            "drop-shadow({}px {}px {}px {})",
            fmt_num(shadow.x),
            fmt_num(shadow.y),
            fmt_num(shadow.blur),
            color::rgba_css(&shadow.color, shadow.opacity)
        ));
    }
    if el.blur > 0.0 {
        parts.push(format!("blur({}px)", fmt_num(el.blur)));
    }
    (!parts.is_empty()).then(|| parts.join(" "))
}

pub fn wrapper_tag(el: &Element) -> Tag {
    let mut g = Tag::new("g");
    if el.opacity != 1.0 {
        g.set("opacity", fmt_num(el.opacity));
    }
    if let Some(transform) = transform_value(el) {
        g.set("transform", transform);
    }
    if let Some(filter) = filter_value(el) {
        g.set("filter", filter);
    }
    if el.blend_mode != Default::default() {
        g.set("style", format!("mix-blend-mode:{}", el.blend_mode.css_name()));
    }
    g
}

/// The fill colour as written to `fill`, `none` when nothing paints.
pub fn fill_paint(el: &Element) -> (String, f64) {
    match el.fill() {
        Some(fill) => (color::css(&fill.color), fill.opacity),
        None => ("none".to_string(), 1.0),
    }
}

fn paint(mut tag: Tag, el: &Element) -> Tag {
    let (fill, fill_opacity) = fill_paint(el);
    tag.set("fill", fill);
    if fill_opacity != 1.0 {
        tag.set("fill-opacity", fmt_num(fill_opacity));
    }
    match el.stroke() {
        Some(stroke) => {
            tag.set("stroke", color::css(&stroke.color));
            tag.set("stroke-width", fmt_num(stroke.width));
            if stroke.cap != Default::default() {
                tag.set("stroke-linecap", stroke.cap.name());
            }
            if stroke.join != Default::default() {
                tag.set("stroke-linejoin", stroke.join.name());
            }
            if !stroke.dash_array.is_empty() {
                let dashes: Vec<String> = stroke.dash_array.iter().map(|d| fmt_num(*d)).collect();
                tag.set("stroke-dasharray", dashes.join(" "));
            }
            if stroke.dash_offset != 0.0 {
                tag.set("stroke-dashoffset", fmt_num(stroke.dash_offset));
            }
        }
        None => tag.set("stroke", "none"),
    }
    tag
}

fn points_attr(el: &Element) -> Option<String> {
    let vertices = crate::geometry::shape_vertices(el, el.x, el.y)?;
    let pts: Vec<String> = vertices
        .iter()
        .map(|p| format!("{},{}", fmt_num(p.x), fmt_num(p.y)))
        .collect();
    Some(pts.join(" "))
}

fn placeholder(el: &Element) -> Tag {
    Tag::new("rect")
        .attr("x", fmt_num(el.x))
        .attr("y", fmt_num(el.y))
        .attr("width", fmt_num(el.width))
        .attr("height", fmt_num(el.height))
        .attr("fill", PLACEHOLDER_FILL)
}

/// The primary shape node of a non-group element, or `None` when the element
/// draws nothing (for example a path without data).
pub fn shape_tag(el: &Element) -> Option<Tag> {
    let (x, y, w, h) = (el.x, el.y, el.width, el.height);
    let tag = match &el.kind {
        ElementKind::Rect(rect) => paint(
            Tag::new("rect")
                .attr("x", fmt_num(x))
                .attr("y", fmt_num(y))
                .attr("width", fmt_num(w))
                .attr("height", fmt_num(h))
                .attr("rx", fmt_num(rect.rx)),
            el,
        ),
        ElementKind::Circle => paint(
            Tag::new("circle")
                .attr("cx", fmt_num(x + w / 2.0))
                .attr("cy", fmt_num(y + h / 2.0))
                .attr("r", fmt_num(w.min(h) / 2.0)),
            el,
        ),
        ElementKind::Ellipse => paint(
            Tag::new("ellipse")
                .attr("cx", fmt_num(x + w / 2.0))
                .attr("cy", fmt_num(y + h / 2.0))
                .attr("rx", fmt_num(w / 2.0))
                .attr("ry", fmt_num(h / 2.0)),
            el,
        ),
        ElementKind::Line => {
            let (stroke, width) = match el.stroke() {
                Some(s) => (color::css(&s.color), s.width),
                None => (fill_paint(el).0, 2.0),
            };
            Tag::new("line")
                .attr("x1", fmt_num(x))
                .attr("y1", fmt_num(y + h / 2.0))
                .attr("x2", fmt_num(x + w))
                .attr("y2", fmt_num(y + h / 2.0))
                .attr("stroke", stroke)
                .attr("stroke-width", fmt_num(width))
                .attr("stroke-linecap", "round")
        }
        ElementKind::Polygon(_) | ElementKind::Star(_) => {
            paint(Tag::new("polygon").attr("points", points_attr(el)?), el)
        }
        ElementKind::Text(text) => {
            let (fill, fill_opacity) = fill_paint(el);
            let mut tag = Tag::new("text")
                .attr("x", fmt_num(x))
                .attr("y", fmt_num(y + text.font_size))
                .attr("font-family", text.font_family.clone())
                .attr("font-size", fmt_num(text.font_size))
                .attr("font-weight", text.font_weight.to_string())
                .attr("fill", fill);
            if fill_opacity != 1.0 {
                tag.set("fill-opacity", fmt_num(fill_opacity));
            }
            tag.set("letter-spacing", fmt_num(text.letter_spacing));
            tag.child(Node::Text(text.text.clone()))
        }
        ElementKind::Path(path) => {
            if path.d.trim().is_empty() {
                return None;
            }
            let (fill, fill_opacity) = fill_paint(el);
            let mut tag = Tag::new("path").attr("d", path.d.clone());
            if path.closed {
                tag.set("fill", fill.clone());
                if fill_opacity != 1.0 {
                    tag.set("fill-opacity", fmt_num(fill_opacity));
                }
            } else {
                tag.set("fill", "none");
            }
            let (stroke, width) = match el.stroke() {
                Some(s) => (color::css(&s.color), s.width),
                None if path.closed => ("none".to_string(), 2.0),
                None => (fill, 2.0),
            };
            tag.set("stroke", stroke);
            tag.set("stroke-width", fmt_num(width));
            tag.set("stroke-linecap", "round");
            tag.set(
                "fill-rule",
                match path.fill_rule {
                    FillRule::Nonzero => "nonzero",
                    FillRule::Evenodd => "evenodd",
                },
            );
            tag
        }
        ElementKind::Image(image) => match &image.source {
            Some(source) => Tag::new("image")
                .attr("x", fmt_num(x))
                .attr("y", fmt_num(y))
                .attr("width", fmt_num(w))
                .attr("height", fmt_num(h))
                .attr("href", source.clone())
                .attr(
                    "preserveAspectRatio",
                    match image.fit {
                        ObjectFit::Fill => "none",
                        ObjectFit::Cover => "xMidYMid slice",
                        ObjectFit::Contain => "xMidYMid meet",
                    },
                ),
            None => placeholder(el),
        },
        ElementKind::Video(_) => placeholder(el),
        ElementKind::Group(_) => return None,
    };
    Some(tag)
}

/// Full markup of an element as resolved in `sample`. `None` for invisible
/// elements and elements that draw nothing.
pub fn element_markup(el: &Element, sample: &FrameSample) -> Option<ElementMarkup> {
    if !el.visible {
        return None;
    }
    let wrapper = wrapper_tag(el);
    match &el.kind {
        ElementKind::Group(_) => {
            let content = sample
                .children_of(el)
                .filter_map(|child| element_markup(child, sample))
                .map(ElementMarkup::into_node)
                .collect();
            Some(ElementMarkup {
                wrapper,
                content,
                primary: None,
            })
        }
        ElementKind::Video(_) => Some(ElementMarkup {
            wrapper,
            content: vec![
                Node::Comment(format!("video layer \"{}\" rendered as placeholder", el.name)),
                placeholder(el).into(),
            ],
            primary: Some(1),
        }),
        _ => Some(ElementMarkup {
            wrapper,
            content: vec![shape_tag(el)?.into()],
            primary: Some(0),
        }),
    }
}

pub fn svg_root(width: u32, height: u32) -> Tag {
    Tag::new("svg")
        .attr("xmlns", SVG_NS)
        .attr("width", width.to_string())
        .attr("height", height.to_string())
        .attr("viewBox", format!("0 0 {width} {height}"))
}

/// A self-contained SVG document for one frame. Only top-level elements are
/// emitted; group children are drawn by their group.
pub fn serialize_frame(sample: &FrameSample, width: u32, height: u32, background: Option<&str>) -> String {
    let mut root = svg_root(width, height);
    if let Some(bg) = background {
        root.push(
            Tag::new("rect")
                .attr("width", width.to_string())
                .attr("height", height.to_string())
                .attr("fill", color::css(bg)),
        );
    }
    for el in sample.top_level() {
        if let Some(markup) = element_markup(el, sample) {
            root.push(markup.into_node());
        }
    }
    Node::Tag(root).render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlendMode, GroupProps, PathProps, RectProps, Shadow, TextProps};

    fn sample(elements: Vec<Element>) -> FrameSample {
        FrameSample::new(0.0, elements)
    }

    #[test]
    fn numbers_are_rounded_to_three_places() {
        assert_eq!(fmt_num(1.23456), "1.235");
        assert_eq!(fmt_num(-0.0001), "0");
        assert_eq!(fmt_num(42.0), "42");
    }

    #[test]
    fn rect_with_fill_and_stroke() {
        let el = Element::new("r", ElementKind::Rect(RectProps { rx: 4.0 }), 10.0, 20.0, 30.0, 40.0)
            .with_fill("FF0000")
            .with_stroke("000000", 2.0);
        let node = element_markup(&el, &sample(vec![el.clone()])).unwrap().into_node();
        assert_eq!(
            node.render(),
            r##"<g><rect x="10" y="20" width="30" height="40" rx="4" fill="#FF0000" stroke="#000000" stroke-width="2"/></g>"##
        );
    }

    #[test]
    fn wrapper_carries_pivot_transform_filter_and_blend() {
        let mut el = Element::new("c", ElementKind::Circle, 0.0, 0.0, 100.0, 50.0);
        el.rotation = 45.0;
        el.scale_x = 2.0;
        el.flip_y = true;
        el.opacity = 0.5;
        el.blur = 3.0;
        el.blend_mode = BlendMode::Multiply;
        el.shadows.push(Shadow {
            visible: true,
            color: "000000".into(),
            opacity: 0.25,
            x: 2.0,
            y: 4.0,
            blur: 6.0,
            spread: 0.0,
        });
        let g = wrapper_tag(&el);
        assert_eq!(g.get("opacity"), Some("0.5"));
        assert_eq!(
            g.get("transform"),
            Some("rotate(45 50 25) translate(50 25) scale(2 -1) translate(-50 -25)")
        );
        assert_eq!(
            g.get("filter"),
            Some("drop-shadow(2px 4px 6px rgba(0,0,0,0.25)) blur(3px)")
        );
        assert_eq!(g.get("style"), Some("mix-blend-mode:multiply"));
    }

    #[test]
    fn text_is_escaped_and_offset_by_font_size() {
        let el = Element::new(
            "t",
            ElementKind::Text(TextProps {
                text: "a < b & c".into(),
                font_size: 20.0,
                font_family: "Inter".into(),
                font_weight: 700,
                text_align: Default::default(),
                letter_spacing: 0.0,
                line_height: 1.2,
            }),
            5.0,
            5.0,
            100.0,
            30.0,
        )
        .with_fill("111111");
        let tag = shape_tag(&el).unwrap();
        assert_eq!(tag.get("y"), Some("25"));
        assert!(Node::Tag(tag).render().contains(">a &lt; b &amp; c</text>"));
    }

    #[test]
    fn open_paths_are_not_filled() {
        let el = Element::new(
            "p",
            ElementKind::Path(PathProps {
                d: "M 0 0 L 10 10".into(),
                ..Default::default()
            }),
            0.0,
            0.0,
            10.0,
            10.0,
        )
        .with_fill("00FF00");
        let tag = shape_tag(&el).unwrap();
        assert_eq!(tag.get("fill"), Some("none"));
        assert_eq!(tag.get("stroke"), Some("#00FF00"));

        let empty = Element::new("e", ElementKind::Path(PathProps::default()), 0.0, 0.0, 1.0, 1.0);
        assert!(shape_tag(&empty).is_none());
    }

    #[test]
    fn groups_draw_their_children_once() {
        let child = Element::new("c", ElementKind::Circle, 0.0, 0.0, 10.0, 10.0).with_fill("FFFFFF");
        let group = Element::new(
            "g",
            ElementKind::Group(GroupProps {
                child_ids: vec!["c".into()],
            }),
            0.0,
            0.0,
            10.0,
            10.0,
        );
        let svg = serialize_frame(&sample(vec![child, group]), 10, 10, Some("000000"));
        assert_eq!(svg.matches("<circle").count(), 1);
        assert!(svg.starts_with(r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10" viewBox="0 0 10 10">"#));
        assert!(svg.contains(r##"<rect width="10" height="10" fill="#000000"/>"##));
        assert!(svg.contains("<g><g><circle"));
    }

    #[test]
    fn hidden_elements_emit_nothing() {
        let mut el = Element::new("r", ElementKind::Rect(RectProps::default()), 0.0, 0.0, 1.0, 1.0);
        el.visible = false;
        let svg = serialize_frame(&sample(vec![el]), 5, 5, None);
        assert!(!svg.contains("<rect"));
    }
}
