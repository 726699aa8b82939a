//! Frame rasterization strategies for the video exporter.
//!
//! [`MarkupRenderer`] serializes the frame to SVG and rasterizes it with
//! `resvg`, so video output matches the SVG exporter pixel for pixel.
//! [`DirectRenderer`] draws shape outlines straight into the pixmap with
//! `tiny-skia`; it is faster but does not draw text, shadows or blur.

use kurbo::{BezPath, PathEl};
use tiny_skia::{
    Color, FillRule as SkFillRule, LineCap as SkLineCap, LineJoin as SkLineJoin, Paint, Path, PathBuilder,
    Pixmap, PixmapPaint, StrokeDash, Transform,
};
use tracing::debug;

use crate::color;
use crate::errors::RenderError;
use crate::geometry;
use crate::markup;
use crate::model::{BlendMode, Element, ElementKind, FillRule, LineCap, LineJoin};
use crate::timeline::FrameSample;

/// Everything a renderer needs to draw one frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub sample: &'a FrameSample,
    /// Artboard size in scene units.
    pub width: u32,
    pub height: u32,
    /// Output pixels per scene unit.
    pub scale: f32,
    /// `RRGGBB` background, or `None` for a transparent frame.
    pub background: Option<&'a str>,
}

impl RenderContext<'_> {
    pub fn base_transform(&self) -> Transform {
        Transform::from_scale(self.scale, self.scale)
    }

    pub fn background_color(&self) -> Color {
        match self.background.and_then(color::parse_hex) {
            Some(c) => Color::from_rgba8(c.r, c.g, c.b, 255),
            None => Color::TRANSPARENT,
        }
    }
}

/// Draws one resolved frame into a cleared pixmap.
pub trait FrameRenderer {
    fn name(&self) -> &'static str;

    fn render(&mut self, ctx: &RenderContext, pixmap: &mut Pixmap) -> Result<(), RenderError>;
}

/// SVG markup rasterized through `usvg`/`resvg`.
pub struct MarkupRenderer {
    options: usvg::Options<'static>,
}

impl MarkupRenderer {
    pub fn new() -> Self {
        let mut options = usvg::Options::default();
        options.fontdb_mut().load_system_fonts();
        Self { options }
    }

    /// A renderer that only sees the fonts loaded into `options`.
    pub fn with_options(options: usvg::Options<'static>) -> Self {
        Self { options }
    }
}

impl Default for MarkupRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameRenderer for MarkupRenderer {
    fn name(&self) -> &'static str {
        "markup"
    }

    fn render(&mut self, ctx: &RenderContext, pixmap: &mut Pixmap) -> Result<(), RenderError> {
        let svg = markup::serialize_frame(ctx.sample, ctx.width, ctx.height, ctx.background);
        let tree = usvg::Tree::from_str(&svg, &self.options).map_err(|e| RenderError::Markup(e.to_string()))?;
        resvg::render(&tree, ctx.base_transform(), &mut pixmap.as_mut());
        Ok(())
    }
}

/// Immediate-mode drawing of shape outlines.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectRenderer;

impl FrameRenderer for DirectRenderer {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn render(&mut self, ctx: &RenderContext, pixmap: &mut Pixmap) -> Result<(), RenderError> {
        pixmap.fill(ctx.background_color());
        let base = ctx.base_transform();
        for el in ctx.sample.top_level() {
            draw_element(pixmap, el, ctx.sample, base, 1.0)?;
        }
        Ok(())
    }
}

/// Rotation and scale about the element's pivot, as in the SVG wrapper group.
pub fn element_transform(el: &Element) -> Transform {
    let (cx, cy) = el.pivot();
    let (sx, sy) = el.effective_scale();
    Transform::from_translate(cx as f32, cy as f32)
        .pre_concat(Transform::from_rotate(el.rotation as f32))
        .pre_scale(sx as f32, sy as f32)
        .pre_translate(-cx as f32, -cy as f32)
}

fn draw_element(
    pixmap: &mut Pixmap,
    el: &Element,
    sample: &FrameSample,
    parent: Transform,
    parent_alpha: f32,
) -> Result<(), RenderError> {
    if !el.visible {
        return Ok(());
    }
    let transform = parent.pre_concat(element_transform(el));
    let alpha = sanitize(el.opacity as f32 * parent_alpha);

    if let ElementKind::Group(_) = el.kind {
        let non_normal_blend = el.blend_mode != BlendMode::Normal;
        if alpha >= 1.0 && !non_normal_blend {
            for child in sample.children_of(el) {
                draw_element(pixmap, child, sample, transform, 1.0)?;
            }
            return Ok(());
        }
        // Group opacity and blending apply to the flattened children.
        let mut layer = Pixmap::new(pixmap.width(), pixmap.height()).ok_or(RenderError::SurfaceFailure)?;
        for child in sample.children_of(el) {
            draw_element(&mut layer, child, sample, transform, 1.0)?;
        }
        let paint = PixmapPaint {
            opacity: alpha,
            blend_mode: convert_blend_mode(el.blend_mode),
            ..PixmapPaint::default()
        };
        pixmap.draw_pixmap(0, 0, layer.as_ref(), &paint, Transform::identity(), None);
        return Ok(());
    }

    let Some(outline) = geometry::element_outline(el) else {
        debug!(element = %el.id, kind = el.kind.type_name(), "no outline to draw");
        return Ok(());
    };
    let Some(path) = kurbo_to_skia_path(&outline) else {
        return Ok(());
    };
    let blend = convert_blend_mode(el.blend_mode);

    let (fill_rule, filled) = match &el.kind {
        ElementKind::Path(p) => (convert_fill_rule(p.fill_rule), p.closed),
        ElementKind::Line => (SkFillRule::Winding, false),
        _ => (SkFillRule::Winding, true),
    };
    if filled {
        if let Some(fill) = el.fill() {
            let paint = solid_paint(&fill.color, fill.opacity as f32 * alpha, blend);
            pixmap.fill_path(&path, &paint, fill_rule, transform, None);
        }
    }

    let stroke = match (el.stroke(), &el.kind) {
        (Some(s), _) => Some((s.color.clone(), s.width, s.cap, s.join, s.dash_array.clone(), s.dash_offset)),
        // Lines and open paths fall back to the fill colour, like the markup output.
        (None, ElementKind::Line) => el.fill().map(|f| (f.color.clone(), 2.0, LineCap::Round, LineJoin::Miter, Vec::new(), 0.0)),
        (None, ElementKind::Path(p)) if !p.closed => {
            el.fill().map(|f| (f.color.clone(), 2.0, LineCap::Round, LineJoin::Miter, Vec::new(), 0.0))
        }
        _ => None,
    };
    if let Some((color, width, cap, join, dashes, offset)) = stroke {
        if width > 0.0 {
            let paint = solid_paint(&color, alpha, blend);
            let stroke = tiny_skia::Stroke {
                width: width as f32,
                line_cap: convert_cap(cap),
                line_join: convert_join(join),
                dash: StrokeDash::new(dashes.iter().map(|d| *d as f32).collect(), offset as f32),
                ..tiny_skia::Stroke::default()
            };
            pixmap.stroke_path(&path, &paint, &stroke, transform, None);
        }
    }
    Ok(())
}

fn solid_paint(hex: &str, alpha: f32, blend: tiny_skia::BlendMode) -> Paint<'static> {
    let c = color::parse_hex(hex).unwrap_or(color::Rgb { r: 0, g: 0, b: 0 });
    let mut paint = Paint::default();
    paint.set_color_rgba8(c.r, c.g, c.b, (sanitize(alpha) * 255.0).round() as u8);
    paint.anti_alias = true;
    paint.blend_mode = blend;
    paint
}

fn sanitize(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub(crate) fn kurbo_to_skia_path(bez_path: &BezPath) -> Option<Path> {
    let mut pb = PathBuilder::new();
    for el in bez_path.elements() {
        match el {
            PathEl::MoveTo(p) => pb.move_to(p.x as f32, p.y as f32),
            PathEl::LineTo(p) => pb.line_to(p.x as f32, p.y as f32),
            PathEl::QuadTo(p1, p2) => pb.quad_to(p1.x as f32, p1.y as f32, p2.x as f32, p2.y as f32),
            PathEl::CurveTo(p1, p2, p3) => pb.cubic_to(
                p1.x as f32,
                p1.y as f32,
                p2.x as f32,
                p2.y as f32,
                p3.x as f32,
                p3.y as f32,
            ),
            PathEl::ClosePath => pb.close(),
        }
    }
    pb.finish()
}

fn convert_blend_mode(mode: BlendMode) -> tiny_skia::BlendMode {
    match mode {
        BlendMode::Normal => tiny_skia::BlendMode::SourceOver,
        BlendMode::Multiply => tiny_skia::BlendMode::Multiply,
        BlendMode::Screen => tiny_skia::BlendMode::Screen,
        BlendMode::Overlay => tiny_skia::BlendMode::Overlay,
        BlendMode::Darken => tiny_skia::BlendMode::Darken,
        BlendMode::Lighten => tiny_skia::BlendMode::Lighten,
        BlendMode::ColorDodge => tiny_skia::BlendMode::ColorDodge,
        BlendMode::ColorBurn => tiny_skia::BlendMode::ColorBurn,
        BlendMode::HardLight => tiny_skia::BlendMode::HardLight,
        BlendMode::SoftLight => tiny_skia::BlendMode::SoftLight,
        BlendMode::Difference => tiny_skia::BlendMode::Difference,
        BlendMode::Exclusion => tiny_skia::BlendMode::Exclusion,
        BlendMode::Hue => tiny_skia::BlendMode::Hue,
        BlendMode::Saturation => tiny_skia::BlendMode::Saturation,
        BlendMode::Color => tiny_skia::BlendMode::Color,
        BlendMode::Luminosity => tiny_skia::BlendMode::Luminosity,
    }
}

fn convert_fill_rule(rule: FillRule) -> SkFillRule {
    match rule {
        FillRule::Nonzero => SkFillRule::Winding,
        FillRule::Evenodd => SkFillRule::EvenOdd,
    }
}

fn convert_cap(cap: LineCap) -> SkLineCap {
    match cap {
        LineCap::Butt => SkLineCap::Butt,
        LineCap::Round => SkLineCap::Round,
        LineCap::Square => SkLineCap::Square,
    }
}

fn convert_join(join: LineJoin) -> SkLineJoin {
    match join {
        LineJoin::Miter => SkLineJoin::Miter,
        LineJoin::Round => SkLineJoin::Round,
        LineJoin::Bevel => SkLineJoin::Bevel,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RectProps, Scene};
    use crate::timeline::Timeline;

    fn pixel(pixmap: &Pixmap, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let px = pixmap.pixel(x, y).unwrap().demultiply();
        (px.red(), px.green(), px.blue(), px.alpha())
    }

    fn scene() -> Scene {
        let rect = Element::new("r", ElementKind::Rect(RectProps::default()), 10.0, 10.0, 20.0, 20.0).with_fill("FF0000");
        let mut scene = Scene::new(40, 40, 30, 10).with_element(rect);
        scene.background = "0000FF".into();
        scene
    }

    #[test]
    fn direct_renderer_fills_shapes_over_background() {
        let scene = scene();
        let sample = Timeline::new(&scene).sample(0.0);
        let ctx = RenderContext {
            sample: &sample,
            width: 40,
            height: 40,
            scale: 1.0,
            background: Some(&scene.background),
        };
        let mut pixmap = Pixmap::new(40, 40).unwrap();
        DirectRenderer.render(&ctx, &mut pixmap).unwrap();
        assert_eq!(pixel(&pixmap, 20, 20), (255, 0, 0, 255));
        assert_eq!(pixel(&pixmap, 2, 2), (0, 0, 255, 255));
    }

    #[test]
    fn scale_maps_scene_units_to_pixels() {
        let scene = scene();
        let sample = Timeline::new(&scene).sample(0.0);
        let ctx = RenderContext {
            sample: &sample,
            width: 40,
            height: 40,
            scale: 2.0,
            background: None,
        };
        let mut pixmap = Pixmap::new(80, 80).unwrap();
        DirectRenderer.render(&ctx, &mut pixmap).unwrap();
        assert_eq!(pixel(&pixmap, 50, 50), (255, 0, 0, 255));
        assert_eq!(pixel(&pixmap, 70, 70).3, 0);
    }

    #[test]
    fn markup_renderer_matches_direct_on_solid_shapes() {
        let scene = scene();
        let sample = Timeline::new(&scene).sample(0.0);
        let ctx = RenderContext {
            sample: &sample,
            width: 40,
            height: 40,
            scale: 1.0,
            background: Some(&scene.background),
        };
        let mut pixmap = Pixmap::new(40, 40).unwrap();
        MarkupRenderer::with_options(usvg::Options::default())
            .render(&ctx, &mut pixmap)
            .unwrap();
        assert_eq!(pixel(&pixmap, 20, 20), (255, 0, 0, 255));
        assert_eq!(pixel(&pixmap, 2, 2), (0, 0, 255, 255));
    }

    #[test]
    fn rotation_turns_about_the_pivot() {
        let mut el = Element::new("r", ElementKind::Rect(RectProps::default()), 0.0, 0.0, 10.0, 10.0);
        el.rotation = 90.0;
        let t = element_transform(&el);
        let mut p = [tiny_skia::Point::from_xy(10.0, 0.0)];
        t.map_points(&mut p);
        assert!((p[0].x - 10.0).abs() < 1e-4);
        assert!((p[0].y - 10.0).abs() < 1e-4);
    }
}
