use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type Vec2 = [f64; 2];

/// Root of a bodymovin 5.x document.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LottieJson {
    pub v: String,
    pub fr: f64,
    pub ip: f64,
    pub op: f64,
    pub w: u32,
    pub h: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nm: Option<String>,
    #[serde(default)]
    pub ddd: u8,
    #[serde(default)]
    pub assets: Vec<Asset>,
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub markers: Vec<Marker>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Asset {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nm: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Marker {
    pub cm: String,
    pub tm: f64,
    pub dr: f64,
}

/// Layer types, as stored in `ty`.
pub const LAYER_SHAPE: u8 = 4;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Layer {
    #[serde(default)]
    pub ddd: u8,
    pub ind: u32,
    pub ty: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nm: Option<String>,
    #[serde(default = "default_one")]
    pub sr: f64,
    pub ks: Transform,
    #[serde(default)]
    pub ao: u8,
    #[serde(default)]
    pub shapes: Vec<Shape>,
    pub ip: f64,
    pub op: f64,
    #[serde(default)]
    pub st: f64,
    #[serde(default)]
    pub bm: u8,
}

fn default_one() -> f64 {
    1.0
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Transform {
    pub a: Property<Vec<f64>>, // Anchor
    pub p: Property<Vec<f64>>, // Position
    pub s: Property<Vec<f64>>, // Scale, percent
    #[serde(alias = "rz")]
    pub r: Property<f64>, // Rotation, degrees
    pub o: Property<f64>, // Opacity, 0..100
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            a: Property::fixed(vec![0.0, 0.0, 0.0]),
            p: Property::fixed(vec![0.0, 0.0, 0.0]),
            s: Property::fixed(vec![100.0, 100.0, 100.0]),
            r: Property::fixed(0.0),
            o: Property::fixed(100.0),
        }
    }
}

// Shapes

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "ty")]
pub enum Shape {
    #[serde(rename = "gr")]
    Group(GroupShape),
    #[serde(rename = "rc")]
    Rect(RectShape),
    #[serde(rename = "el")]
    Ellipse(EllipseShape),
    #[serde(rename = "sh")]
    Path(PathShape),
    #[serde(rename = "fl")]
    Fill(FillShape),
    #[serde(rename = "st")]
    Stroke(StrokeShape),
    #[serde(rename = "tr")]
    Transform(TransformShape),
    #[serde(other)]
    Unknown,
}

impl Shape {
    /// The `ty` code this shape serializes with.
    pub fn type_code(&self) -> &'static str {
        match self {
            Shape::Group(_) => "gr",
            Shape::Rect(_) => "rc",
            Shape::Ellipse(_) => "el",
            Shape::Path(_) => "sh",
            Shape::Fill(_) => "fl",
            Shape::Stroke(_) => "st",
            Shape::Transform(_) => "tr",
            Shape::Unknown => "",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GroupShape {
    #[serde(default)]
    pub nm: Option<String>,
    pub it: Vec<Shape>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RectShape {
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default = "default_direction")]
    pub d: u8,
    pub p: Property<Vec<f64>>,
    pub s: Property<Vec<f64>>,
    pub r: Property<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EllipseShape {
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default = "default_direction")]
    pub d: u8,
    pub p: Property<Vec<f64>>,
    pub s: Property<Vec<f64>>,
}

fn default_direction() -> u8 {
    1
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PathShape {
    #[serde(default)]
    pub nm: Option<String>,
    pub ks: Property<BezierPath>,
}

/// Fill rule codes for `FillShape::r`.
pub const FILL_RULE_NONZERO: u8 = 1;
pub const FILL_RULE_EVENODD: u8 = 2;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FillShape {
    #[serde(default)]
    pub nm: Option<String>,
    pub o: Property<f64>,
    pub c: Property<Vec<f64>>,
    #[serde(default = "default_fill_rule")]
    pub r: u8,
}

fn default_fill_rule() -> u8 {
    FILL_RULE_NONZERO
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StrokeShape {
    #[serde(default)]
    pub nm: Option<String>,
    pub o: Property<f64>,
    pub c: Property<Vec<f64>>,
    pub w: Property<f64>,
    #[serde(default)]
    pub lc: u8,
    #[serde(default)]
    pub lj: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub d: Vec<DashProperty>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DashProperty {
    /// "d" dash, "g" gap, "o" offset.
    pub n: String,
    #[serde(default)]
    pub nm: Option<String>,
    pub v: Property<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TransformShape {
    #[serde(flatten)]
    pub t: Transform,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct BezierPath {
    #[serde(default)]
    pub c: bool,
    #[serde(default)]
    pub i: Vec<Vec2>,
    #[serde(default)]
    pub o: Vec<Vec2>,
    #[serde(default)]
    pub v: Vec<Vec2>,
}

// Animatable properties

/// A property that is either a fixed value (`a: 0`) or a keyframe list (`a: 1`).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Property<T> {
    #[serde(default)]
    pub a: u8,
    #[serde(bound(serialize = "T: Serialize", deserialize = "T: DeserializeOwned"))]
    pub k: Value<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ix: Option<u32>,
}

impl<T> Property<T> {
    pub fn fixed(value: T) -> Self {
        Self {
            a: 0,
            k: Value::Static(value),
            ix: None,
        }
    }

    pub fn animated(keyframes: Vec<Keyframe<T>>) -> Self {
        Self {
            a: 1,
            k: Value::Animated(keyframes),
            ix: None,
        }
    }

    pub fn is_animated(&self) -> bool {
        matches!(self.k, Value::Animated(_))
    }

    pub fn static_value(&self) -> Option<&T> {
        match &self.k {
            Value::Static(v) => Some(v),
            Value::Animated(_) => None,
        }
    }

    pub fn keyframes(&self) -> &[Keyframe<T>] {
        match &self.k {
            Value::Static(_) => &[],
            Value::Animated(kfs) => kfs,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
#[serde(untagged)]
pub enum Value<T> {
    Static(T),
    Animated(Vec<Keyframe<T>>),
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Value<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = serde_json::Value::deserialize(deserializer)?;

        let looks_keyframed = v
            .as_array()
            .and_then(|arr| arr.first())
            .map(|first| first.get("t").is_some())
            .unwrap_or(false);
        if looks_keyframed {
            return serde_json::from_value::<Vec<Keyframe<T>>>(v)
                .map(Value::Animated)
                .map_err(D::Error::custom);
        }

        unwrap_value(v)
            .map(Value::Static)
            .ok_or_else(|| D::Error::custom("property value has an unexpected shape"))
    }
}

/// Cubic-bezier easing handle. Each axis carries one entry per value dimension;
/// a single entry applies to all dimensions.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EasingHandle {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl EasingHandle {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: vec![x],
            y: vec![y],
        }
    }
}

/// One entry of an animated property. `s`/`e` are always written in array
/// form, as bodymovin expects (`[50]` for scalars, `[{..}]` for shapes).
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: DeserializeOwned"))]
pub struct Keyframe<T> {
    pub t: f64,
    #[serde(
        serialize_with = "serialize_wrapped",
        deserialize_with = "deserialize_unwrapped"
    )]
    pub s: T,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_wrapped_opt",
        deserialize_with = "deserialize_unwrapped_opt"
    )]
    pub e: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub o: Option<EasingHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i: Option<EasingHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<u8>,
}

impl<T> Keyframe<T> {
    /// A trailing entry: time and start value only.
    pub fn hold(t: f64, s: T) -> Self {
        Self {
            t,
            s,
            e: None,
            o: None,
            i: None,
            h: None,
        }
    }

    /// A segment start with end value and outgoing/incoming handles.
    pub fn segment(t: f64, s: T, e: T, out_handle: EasingHandle, in_handle: EasingHandle) -> Self {
        Self {
            t,
            s,
            e: Some(e),
            o: Some(out_handle),
            i: Some(in_handle),
            h: None,
        }
    }
}

fn serialize_wrapped<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    match serde_json::to_value(value).map_err(serde::ser::Error::custom)? {
        v @ serde_json::Value::Array(_) => v.serialize(serializer),
        v => serde_json::Value::Array(vec![v]).serialize(serializer),
    }
}

fn serialize_wrapped_opt<S, T>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    match value {
        Some(v) => serialize_wrapped(v, serializer),
        None => serializer.serialize_none(),
    }
}

fn deserialize_unwrapped<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    unwrap_value(v).ok_or_else(|| D::Error::custom("keyframe value has an unexpected shape"))
}

fn deserialize_unwrapped_opt<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    if v.is_null() {
        return Ok(None);
    }
    Ok(unwrap_value(v))
}

/// Accepts either `T` itself or a single-element array around it.
fn unwrap_value<T: DeserializeOwned>(v: serde_json::Value) -> Option<T> {
    if let Ok(val) = serde_json::from_value(v.clone()) {
        return Some(val);
    }
    serde_json::from_value::<Vec<T>>(v)
        .ok()
        .and_then(|vec| vec.into_iter().next())
}
