//! Easing curves: named presets, `cubic-bezier(...)` and `steps(n)`.
//!
//! Easing specs travel through documents as strings. Parsing is total: any
//! string that is not understood behaves as `linear`, while still round-tripping
//! through serialization as the canonical name of what it resolved to.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const BACK_C1: f64 = 1.70158;
const BACK_C3: f64 = BACK_C1 + 1.0;
const BOUNCE_N1: f64 = 7.5625;
const BOUNCE_D1: f64 = 2.75;

const NEWTON_ITERATIONS: usize = 8;
const NEWTON_MIN_SLOPE: f64 = 1e-6;

/// Named easing curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EasingPreset {
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    EaseInCubic,
    EaseOutCubic,
    EaseInOutCubic,
    EaseInBack,
    EaseOutBack,
    EaseInOutBack,
    EaseOutBounce,
    EaseOutElastic,
    Spring,
}

impl EasingPreset {
    pub const ALL: [EasingPreset; 13] = [
        EasingPreset::Linear,
        EasingPreset::EaseIn,
        EasingPreset::EaseOut,
        EasingPreset::EaseInOut,
        EasingPreset::EaseInCubic,
        EasingPreset::EaseOutCubic,
        EasingPreset::EaseInOutCubic,
        EasingPreset::EaseInBack,
        EasingPreset::EaseOutBack,
        EasingPreset::EaseInOutBack,
        EasingPreset::EaseOutBounce,
        EasingPreset::EaseOutElastic,
        EasingPreset::Spring,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EasingPreset::Linear => "linear",
            EasingPreset::EaseIn => "ease-in",
            EasingPreset::EaseOut => "ease-out",
            EasingPreset::EaseInOut => "ease-in-out",
            EasingPreset::EaseInCubic => "ease-in-cubic",
            EasingPreset::EaseOutCubic => "ease-out-cubic",
            EasingPreset::EaseInOutCubic => "ease-in-out-cubic",
            EasingPreset::EaseInBack => "ease-in-back",
            EasingPreset::EaseOutBack => "ease-out-back",
            EasingPreset::EaseInOutBack => "ease-in-out-back",
            EasingPreset::EaseOutBounce => "ease-out-bounce",
            EasingPreset::EaseOutElastic => "ease-out-elastic",
            EasingPreset::Spring => "spring",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Evaluates the curve at `t` in `[0, 1]`.
    pub fn y(self, t: f64) -> f64 {
        match self {
            EasingPreset::Linear => t,
            EasingPreset::EaseIn | EasingPreset::EaseInCubic => t * t * t,
            EasingPreset::EaseOut | EasingPreset::EaseOutCubic => 1.0 - (1.0 - t).powi(3),
            EasingPreset::EaseInOut | EasingPreset::EaseInOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            EasingPreset::EaseInBack => BACK_C3 * t * t * t - BACK_C1 * t * t,
            EasingPreset::EaseOutBack => {
                1.0 + BACK_C3 * (t - 1.0).powi(3) + BACK_C1 * (t - 1.0).powi(2)
            }
            EasingPreset::EaseInOutBack => {
                let c2 = BACK_C1 * 1.525;
                if t < 0.5 {
                    ((2.0 * t).powi(2) * ((c2 + 1.0) * 2.0 * t - c2)) / 2.0
                } else {
                    ((2.0 * t - 2.0).powi(2) * ((c2 + 1.0) * (2.0 * t - 2.0) + c2) + 2.0) / 2.0
                }
            }
            EasingPreset::EaseOutBounce => bounce_out(t),
            EasingPreset::EaseOutElastic => {
                if t == 0.0 || t == 1.0 {
                    return t;
                }
                let c4 = (2.0 * PI) / 3.0;
                2f64.powf(-10.0 * t) * ((t * 10.0 - 0.75) * c4).sin() + 1.0
            }
            EasingPreset::Spring => 1.0 - (-8.0 * t).exp() * (PI * t).cos(),
        }
    }
}

fn bounce_out(t: f64) -> f64 {
    if t < 1.0 / BOUNCE_D1 {
        BOUNCE_N1 * t * t
    } else if t < 2.0 / BOUNCE_D1 {
        let t = t - 1.5 / BOUNCE_D1;
        BOUNCE_N1 * t * t + 0.75
    } else if t < 2.5 / BOUNCE_D1 {
        let t = t - 2.25 / BOUNCE_D1;
        BOUNCE_N1 * t * t + 0.9375
    } else {
        let t = t - 2.625 / BOUNCE_D1;
        BOUNCE_N1 * t * t + 0.984375
    }
}

/// A resolved easing curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Easing {
    Preset(EasingPreset),
    /// Control points `(x1, y1, x2, y2)` of a unit cubic Bézier.
    CubicBezier(f64, f64, f64, f64),
    Steps(u32),
}

impl Default for Easing {
    fn default() -> Self {
        Easing::Preset(EasingPreset::Linear)
    }
}

impl Easing {
    pub const LINEAR: Easing = Easing::Preset(EasingPreset::Linear);

    /// Resolves an easing spec string, falling back to linear.
    pub fn parse(spec: &str) -> Easing {
        let spec = spec.trim();
        if let Some(preset) = EasingPreset::from_name(spec) {
            return Easing::Preset(preset);
        }
        parse_cubic_bezier(spec)
            .or_else(|| parse_steps(spec))
            .unwrap_or(Easing::LINEAR)
    }

    /// Maps linear progress `t` to eased progress.
    pub fn apply(&self, t: f64) -> f64 {
        match *self {
            Easing::Preset(preset) => preset.y(t),
            Easing::CubicBezier(x1, y1, x2, y2) => {
                if t == 0.0 || t == 1.0 {
                    return t;
                }
                BezierCurve::new(x1, y1, x2, y2).solve(t)
            }
            Easing::Steps(n) => {
                let n = n as f64;
                ((t * n).floor() / n).min(1.0)
            }
        }
    }

    pub fn is_linear(&self) -> bool {
        *self == Easing::LINEAR
    }
}

fn parse_cubic_bezier(spec: &str) -> Option<Easing> {
    let inner = spec.strip_prefix("cubic-bezier(")?.strip_suffix(')')?;
    let values = inner
        .split(',')
        .map(|v| v.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect::<Option<Vec<f64>>>()?;
    match values.as_slice() {
        &[x1, y1, x2, y2] => Some(Easing::CubicBezier(x1, y1, x2, y2)),
        _ => None,
    }
}

fn parse_steps(spec: &str) -> Option<Easing> {
    let inner = spec.strip_prefix("steps(")?.strip_suffix(')')?;
    let n: u32 = inner.trim().parse().ok()?;
    (n > 0).then_some(Easing::Steps(n))
}

/// Polynomial form of a unit cubic Bézier with endpoints (0,0) and (1,1).
struct BezierCurve {
    ax: f64,
    bx: f64,
    cx: f64,
    ay: f64,
    by: f64,
    cy: f64,
}

impl BezierCurve {
    fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let cx = 3.0 * x1;
        let bx = 3.0 * (x2 - x1) - cx;
        let ax = 1.0 - cx - bx;
        let cy = 3.0 * y1;
        let by = 3.0 * (y2 - y1) - cy;
        let ay = 1.0 - cy - by;
        Self { ax, bx, cx, ay, by, cy }
    }

    fn sample_x(&self, t: f64) -> f64 {
        ((self.ax * t + self.bx) * t + self.cx) * t
    }

    fn sample_y(&self, t: f64) -> f64 {
        ((self.ay * t + self.by) * t + self.cy) * t
    }

    fn slope_x(&self, t: f64) -> f64 {
        (3.0 * self.ax * t + 2.0 * self.bx) * t + self.cx
    }

    fn solve(&self, x: f64) -> f64 {
        let mut t = x;
        for _ in 0..NEWTON_ITERATIONS {
            let slope = self.slope_x(t);
            if slope.abs() < NEWTON_MIN_SLOPE {
                break;
            }
            t -= (self.sample_x(t) - x) / slope;
        }
        self.sample_y(t)
    }
}

impl fmt::Display for Easing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Easing::Preset(p) => f.write_str(p.name()),
            Easing::CubicBezier(x1, y1, x2, y2) => {
                write!(f, "cubic-bezier({x1},{y1},{x2},{y2})")
            }
            Easing::Steps(n) => write!(f, "steps({n})"),
        }
    }
}

impl Serialize for Easing {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Easing {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let spec = String::deserialize(deserializer)?;
        Ok(Easing::parse(&spec))
    }
}

/// Resolves an easing spec string to a callable curve.
pub fn get_easing_fn(spec: &str) -> impl Fn(f64) -> f64 + Clone {
    let easing = Easing::parse(spec);
    move |t| easing.apply(t)
}

/// Cubic-Bézier handle approximations used by the vector exporters.
///
/// Presets that are not cubic curves (bounce, elastic, spring) map to a
/// symmetric ease-in-out approximation; stepped easings map to linear. Both are
/// reported as inexact.
#[derive(Debug, Clone)]
pub struct HandleTable {
    presets: HashMap<EasingPreset, [f64; 4]>,
}

pub const LINEAR_HANDLES: [f64; 4] = [0.0, 0.0, 1.0, 1.0];
const FALLBACK_HANDLES: [f64; 4] = [0.42, 0.0, 0.58, 1.0];

impl HandleTable {
    pub fn standard() -> Self {
        let presets = HashMap::from([
            (EasingPreset::Linear, LINEAR_HANDLES),
            (EasingPreset::EaseIn, [0.42, 0.0, 1.0, 0.58]),
            (EasingPreset::EaseOut, [0.0, 0.42, 0.58, 1.0]),
            (EasingPreset::EaseInOut, [0.42, 0.0, 0.58, 1.0]),
            (EasingPreset::EaseInCubic, [0.55, 0.0, 1.0, 0.45]),
            (EasingPreset::EaseOutCubic, [0.0, 0.55, 0.45, 1.0]),
            (EasingPreset::EaseInOutCubic, [0.65, 0.0, 0.35, 1.0]),
            (EasingPreset::EaseInBack, [0.36, 0.0, 0.66, -0.56]),
            (EasingPreset::EaseOutBack, [0.34, 1.56, 0.64, 1.0]),
            (EasingPreset::EaseInOutBack, [0.68, -0.6, 0.32, 1.6]),
        ]);
        Self { presets }
    }

    /// Overrides the handles used for one preset.
    pub fn with_preset(mut self, preset: EasingPreset, handles: [f64; 4]) -> Self {
        self.presets.insert(preset, handles);
        self
    }

    pub fn handles(&self, easing: &Easing) -> [f64; 4] {
        match easing {
            Easing::Preset(p) => self.presets.get(p).copied().unwrap_or(FALLBACK_HANDLES),
            Easing::CubicBezier(x1, y1, x2, y2) => [*x1, *y1, *x2, *y2],
            Easing::Steps(_) => LINEAR_HANDLES,
        }
    }

    /// Whether `handles` stands for a cubic curve rather than an approximation
    /// of something a single Bézier cannot express.
    pub fn is_bezier_representable(&self, easing: &Easing) -> bool {
        match easing {
            Easing::Preset(p) => self.presets.contains_key(p),
            Easing::CubicBezier(..) => true,
            Easing::Steps(_) => false,
        }
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::standard()
    }
}
