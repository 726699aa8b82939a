//! Element outlines in artboard coordinates, built on `kurbo`.

use std::f64::consts::PI;

use kurbo::{BezPath, Circle, Ellipse, Line, PathEl, Point, Rect, RoundedRect, Shape};
use thiserror::Error;

use crate::markup::fmt_num;
use crate::model::{Element, ElementKind, PathPoint};

const OUTLINE_TOLERANCE: f64 = 0.1;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("path data is empty")]
    Empty,
    #[error("path data is malformed: {0}")]
    Malformed(String),
}

/// Parses SVG path data.
pub fn parse_path_data(d: &str) -> Result<BezPath, GeometryError> {
    let d = d.trim();
    if d.is_empty() {
        return Err(GeometryError::Empty);
    }
    let path = BezPath::from_svg(d).map_err(|e| GeometryError::Malformed(e.to_string()))?;
    if path.elements().is_empty() {
        return Err(GeometryError::Empty);
    }
    Ok(path)
}

/// Serializes path points as SVG path data. Segments without handles become
/// straight lines; any handle makes the segment a cubic.
pub fn points_to_path_data(points: &[PathPoint], closed: bool) -> String {
    let Some(first) = points.first() else {
        return String::new();
    };
    let mut d = format!("M {} {}", fmt_num(first.x), fmt_num(first.y));
    for pair in points.windows(2) {
        push_segment(&mut d, &pair[0], &pair[1]);
    }
    if closed && points.len() > 1 {
        if let Some(last) = points.last() {
            push_segment(&mut d, last, first);
        }
        d.push_str(" Z");
    }
    d
}

fn push_segment(d: &mut String, from: &PathPoint, to: &PathPoint) {
    if from.handle_out.is_none() && to.handle_in.is_none() {
        d.push_str(&format!(" L {} {}", fmt_num(to.x), fmt_num(to.y)));
        return;
    }
    let (c1x, c1y) = from.handle_out.map(|h| (h.x, h.y)).unwrap_or((from.x, from.y));
    let (c2x, c2y) = to.handle_in.map(|h| (h.x, h.y)).unwrap_or((to.x, to.y));
    d.push_str(&format!(
        " C {} {} {} {} {} {}",
        fmt_num(c1x),
        fmt_num(c1y),
        fmt_num(c2x),
        fmt_num(c2y),
        fmt_num(to.x),
        fmt_num(to.y)
    ));
}

/// Vertices of a regular polygon inscribed in the given circle, starting at the top.
pub fn polygon_vertices(cx: f64, cy: f64, radius: f64, sides: u32) -> Vec<Point> {
    let sides = sides.max(3);
    (0..sides)
        .map(|i| {
            let angle = (i as f64 / sides as f64) * 2.0 * PI - PI / 2.0;
            Point::new(cx + radius * angle.cos(), cy + radius * angle.sin())
        })
        .collect()
}

/// Alternating outer and inner vertices of a star, starting at the top.
pub fn star_vertices(cx: f64, cy: f64, outer: f64, inner: f64, points: u32) -> Vec<Point> {
    let count = points.max(2) * 2;
    (0..count)
        .map(|i| {
            let angle = (i as f64 / count as f64) * 2.0 * PI - PI / 2.0;
            let r = if i % 2 == 0 { outer } else { inner };
            Point::new(cx + r * angle.cos(), cy + r * angle.sin())
        })
        .collect()
}

/// Polygon or star vertices for an element whose box starts at `(left, top)`.
pub fn shape_vertices(el: &Element, left: f64, top: f64) -> Option<Vec<Point>> {
    let cx = left + el.width / 2.0;
    let cy = top + el.height / 2.0;
    let outer = el.width.min(el.height) / 2.0;
    match &el.kind {
        ElementKind::Polygon(p) => Some(polygon_vertices(cx, cy, outer, p.sides)),
        ElementKind::Star(s) => Some(star_vertices(cx, cy, outer, outer * s.inner_radius, s.star_points)),
        _ => None,
    }
}

pub fn closed_polyline(vertices: &[Point]) -> BezPath {
    let mut path = BezPath::new();
    let mut iter = vertices.iter();
    if let Some(first) = iter.next() {
        path.move_to(*first);
        for p in iter {
            path.line_to(*p);
        }
        path.close_path();
    }
    path
}

/// One contour as vertices with tangents relative to their vertex.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexPath {
    pub v: Vec<[f64; 2]>,
    pub i: Vec<[f64; 2]>,
    pub o: Vec<[f64; 2]>,
    pub closed: bool,
}

impl VertexPath {
    fn start(p: Point) -> Self {
        Self {
            v: vec![[p.x, p.y]],
            i: vec![[0.0, 0.0]],
            o: vec![[0.0, 0.0]],
            closed: false,
        }
    }

    fn last(&self) -> Option<Point> {
        self.v.last().map(|v| Point::new(v[0], v[1]))
    }

    fn push(&mut self, p: Point, in_tangent: [f64; 2]) {
        self.v.push([p.x, p.y]);
        self.i.push(in_tangent);
        self.o.push([0.0, 0.0]);
    }

    fn set_out(&mut self, tangent: [f64; 2]) {
        if let Some(o) = self.o.last_mut() {
            *o = tangent;
        }
    }

    /// Folds an explicit return to the start point into the closing segment.
    fn close(&mut self) {
        self.closed = true;
        if self.v.len() > 1 && self.v.first() == self.v.last() {
            self.v.pop();
            self.o.pop();
            if let (Some(in_tangent), Some(first)) = (self.i.pop(), self.i.first_mut()) {
                *first = in_tangent;
            }
        }
    }

    pub fn translate(mut self, dx: f64, dy: f64) -> Self {
        for v in &mut self.v {
            v[0] += dx;
            v[1] += dy;
        }
        self
    }
}

/// Splits a path into contours with relative tangents. Quadratic segments
/// are raised to cubics.
pub fn path_to_vertices(path: &BezPath) -> Vec<VertexPath> {
    let mut contours = Vec::new();
    let mut current: Option<VertexPath> = None;
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => {
                contours.extend(current.take());
                current = Some(VertexPath::start(p));
            }
            PathEl::LineTo(p) => {
                current
                    .get_or_insert_with(|| VertexPath::start(Point::ZERO))
                    .push(p, [0.0, 0.0]);
            }
            PathEl::QuadTo(c, p) => {
                let contour = current.get_or_insert_with(|| VertexPath::start(Point::ZERO));
                let from = contour.last().unwrap_or(Point::ZERO);
                let c1 = from + (c - from) * (2.0 / 3.0);
                let c2 = p + (c - p) * (2.0 / 3.0);
                contour.set_out([c1.x - from.x, c1.y - from.y]);
                contour.push(p, [c2.x - p.x, c2.y - p.y]);
            }
            PathEl::CurveTo(c1, c2, p) => {
                let contour = current.get_or_insert_with(|| VertexPath::start(Point::ZERO));
                let from = contour.last().unwrap_or(Point::ZERO);
                contour.set_out([c1.x - from.x, c1.y - from.y]);
                contour.push(p, [c2.x - p.x, c2.y - p.y]);
            }
            PathEl::ClosePath => {
                if let Some(mut contour) = current.take() {
                    contour.close();
                    contours.push(contour);
                }
            }
        }
    }
    contours.extend(current);
    contours
}

/// Untransformed outline of a drawable element. `None` for elements that are
/// not vector shapes (text, groups, media) and for unusable path data.
pub fn element_outline(el: &Element) -> Option<BezPath> {
    let (x, y, w, h) = (el.x, el.y, el.width, el.height);
    let center = Point::new(x + w / 2.0, y + h / 2.0);
    let path = match &el.kind {
        ElementKind::Rect(r) if r.rx > 0.0 => {
            RoundedRect::new(x, y, x + w, y + h, r.rx.min(w / 2.0).min(h / 2.0))
                .to_path(OUTLINE_TOLERANCE)
        }
        ElementKind::Rect(_) => Rect::new(x, y, x + w, y + h).to_path(OUTLINE_TOLERANCE),
        ElementKind::Circle => Circle::new(center, w.min(h) / 2.0).to_path(OUTLINE_TOLERANCE),
        ElementKind::Ellipse => {
            Ellipse::new(center, (w / 2.0, h / 2.0), 0.0).to_path(OUTLINE_TOLERANCE)
        }
        ElementKind::Line => {
            Line::new((x, y + h / 2.0), (x + w, y + h / 2.0)).to_path(OUTLINE_TOLERANCE)
        }
        ElementKind::Polygon(_) | ElementKind::Star(_) => closed_polyline(&shape_vertices(el, x, y)?),
        ElementKind::Path(p) => parse_path_data(&p.d).ok()?,
        ElementKind::Text(_) | ElementKind::Group(_) | ElementKind::Image(_) | ElementKind::Video(_) => {
            return None
        }
    };
    Some(path)
}
